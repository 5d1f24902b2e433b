//! Audit log part selection.

use crate::error::{Error, Result};
use std::fmt;

/// Audit log sections, one bit per letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum AuditPart {
    /// Header.
    A = 1 << 0,
    /// Request line and headers.
    B = 1 << 1,
    /// Request body.
    C = 1 << 2,
    /// Response body.
    E = 1 << 3,
    /// Response headers.
    F = 1 << 4,
    /// Producer, stopwatch and engine mode.
    H = 1 << 5,
    /// Request body without files.
    I = 1 << 6,
    /// Uploaded files.
    J = 1 << 7,
    /// Matched rules.
    K = 1 << 8,
    /// Trailer.
    Z = 1 << 9,
}

impl AuditPart {
    const ALL: [AuditPart; 10] = [
        Self::A,
        Self::B,
        Self::C,
        Self::E,
        Self::F,
        Self::H,
        Self::I,
        Self::J,
        Self::K,
        Self::Z,
    ];

    fn from_letter(c: char) -> Option<Self> {
        Some(match c.to_ascii_uppercase() {
            'A' => Self::A,
            'B' => Self::B,
            'C' => Self::C,
            'E' => Self::E,
            'F' => Self::F,
            'H' => Self::H,
            'I' => Self::I,
            'J' => Self::J,
            'K' => Self::K,
            'Z' => Self::Z,
            _ => return None,
        })
    }

    /// Section letter.
    pub fn letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
            Self::E => 'E',
            Self::F => 'F',
            Self::H => 'H',
            Self::I => 'I',
            Self::J => 'J',
            Self::K => 'K',
            Self::Z => 'Z',
        }
    }
}

/// A set of audit log parts. Part `A` is always present.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AuditLogParts(u16);

impl AuditLogParts {
    /// Parse a string of part letters such as `ABCFHZ`.
    pub fn parse(input: &str) -> Result<Self> {
        let mut bits = AuditPart::A as u16;
        for c in input.trim().chars() {
            let part = AuditPart::from_letter(c).ok_or_else(|| {
                Error::invalid_directive("SecAuditLogParts", format!("unknown part '{}'", c))
            })?;
            bits |= part as u16;
        }
        Ok(Self(bits))
    }

    /// Whether `part` is selected.
    pub fn contains(&self, part: AuditPart) -> bool {
        self.0 & part as u16 != 0
    }

    /// Apply an edit.
    pub fn apply(&mut self, edit: &PartsEdit) {
        match edit {
            PartsEdit::Set(parts) => *self = *parts,
            PartsEdit::Add(parts) => self.0 |= parts.0,
            PartsEdit::Remove(parts) => self.0 = (self.0 & !parts.0) | AuditPart::A as u16,
        }
    }

    /// Selected parts in section order.
    pub fn iter(&self) -> impl Iterator<Item = AuditPart> + '_ {
        AuditPart::ALL.into_iter().filter(|p| self.contains(*p))
    }
}

impl Default for AuditLogParts {
    fn default() -> Self {
        // ABCFHZ
        Self(
            AuditPart::A as u16
                | AuditPart::B as u16
                | AuditPart::C as u16
                | AuditPart::F as u16
                | AuditPart::H as u16
                | AuditPart::Z as u16,
        )
    }
}

impl fmt::Display for AuditLogParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for part in self.iter() {
            write!(f, "{}", part.letter())?;
        }
        Ok(())
    }
}

impl fmt::Debug for AuditLogParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AuditLogParts({})", self)
    }
}

/// A change to the part set, as given to `ctl:auditLogParts`.
#[derive(Debug, Clone, PartialEq)]
pub enum PartsEdit {
    /// `ABC`: replace the set.
    Set(AuditLogParts),
    /// `+E`: add parts.
    Add(AuditLogParts),
    /// `-E`: remove parts.
    Remove(AuditLogParts),
}

impl PartsEdit {
    /// Parse `[+-]LETTERS`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let letters = |s: &str| -> Result<AuditLogParts> {
            let mut bits = 0u16;
            for c in s.chars() {
                let part = AuditPart::from_letter(c).ok_or_else(|| {
                    Error::invalid_action("ctl", format!("unknown audit log part '{}'", c))
                })?;
                bits |= part as u16;
            }
            Ok(AuditLogParts(bits))
        };
        if let Some(rest) = input.strip_prefix('+') {
            Ok(Self::Add(letters(rest)?))
        } else if let Some(rest) = input.strip_prefix('-') {
            Ok(Self::Remove(letters(rest)?))
        } else {
            Ok(Self::Set(AuditLogParts::parse(input)?))
        }
    }
}
