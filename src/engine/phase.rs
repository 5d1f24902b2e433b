//! Processing phases.

use std::fmt;

/// The five phases of a transaction, in the order they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Phase {
    /// Phase 1: request line and headers are known.
    RequestHeaders = 1,
    /// Phase 2: the request body has been processed. Rules without
    /// `phase:` run here.
    RequestBody = 2,
    /// Phase 3: response status and headers are known.
    ResponseHeaders = 3,
    /// Phase 4: the response body has been buffered.
    ResponseBody = 4,
    /// Phase 5: runs once at the end, never interrupts.
    Logging = 5,
}

const ALL: [Phase; 5] = [
    Phase::RequestHeaders,
    Phase::RequestBody,
    Phase::ResponseHeaders,
    Phase::ResponseBody,
    Phase::Logging,
];

impl Phase {
    /// `phase:` number, 1 to 5.
    pub fn number(&self) -> u8 {
        *self as u8
    }

    /// Zero-based position, for per-phase tables.
    pub(crate) fn index(&self) -> usize {
        *self as usize - 1
    }

    /// Upper-case name as shown in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestHeaders => "REQUEST_HEADERS",
            Self::RequestBody => "REQUEST_BODY",
            Self::ResponseHeaders => "RESPONSE_HEADERS",
            Self::ResponseBody => "RESPONSE_BODY",
            Self::Logging => "LOGGING",
        }
    }

    /// Phase for a `phase:` number.
    pub fn from_number(n: u8) -> Option<Self> {
        ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    /// Every phase in execution order.
    pub fn all() -> &'static [Phase] {
        &ALL
    }

    /// Phases 1 and 2, the ones `allow:request` covers.
    pub fn is_request_phase(&self) -> bool {
        matches!(self, Self::RequestHeaders | Self::RequestBody)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.number(), self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers_round_trip_in_order() {
        for (i, phase) in Phase::all().iter().enumerate() {
            assert_eq!(phase.index(), i);
            assert_eq!(Phase::from_number(phase.number()), Some(*phase));
        }
        assert_eq!(Phase::from_number(0), None);
        assert_eq!(Phase::from_number(6), None);
    }

    #[test]
    fn test_request_phases() {
        assert!(Phase::RequestBody.is_request_phase());
        assert!(!Phase::ResponseHeaders.is_request_phase());
        assert!(!Phase::Logging.is_request_phase());
        assert_eq!(Phase::Logging.to_string(), "5 (LOGGING)");
    }
}
