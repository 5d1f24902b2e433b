//! Flow control actions (skip, skipAfter).

/// Skip state of one phase run. Reset at every phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FlowState {
    skip: u32,
    skip_after: Option<String>,
}

impl FlowState {
    /// Record the flow actions of a matched rule.
    pub fn matched(&mut self, skip: Option<u32>, skip_after: Option<&str>) {
        if let Some(n) = skip {
            self.skip = n;
        }
        if let Some(marker) = skip_after {
            self.skip_after = Some(marker.to_string());
        }
    }

    /// Whether the next rule is skipped. Consumes one pending skip.
    pub fn skip_rule(&mut self) -> bool {
        if self.skip_after.is_some() {
            return true;
        }
        if self.skip > 0 {
            self.skip -= 1;
            return true;
        }
        false
    }

    /// A marker was reached; ends a `skipAfter` targeting it.
    pub fn marker(&mut self, name: &str) {
        if self.skip_after.as_deref() == Some(name) {
            self.skip_after = None;
        }
    }

    /// Marker still being searched for.
    pub fn pending_marker(&self) -> Option<&str> {
        self.skip_after.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_counts_rules() {
        let mut flow = FlowState::default();
        flow.matched(Some(2), None);
        assert!(flow.skip_rule());
        assert!(flow.skip_rule());
        assert!(!flow.skip_rule());
    }

    #[test]
    fn test_skip_after_until_marker() {
        let mut flow = FlowState::default();
        flow.matched(None, Some("END"));
        assert!(flow.skip_rule());
        flow.marker("OTHER");
        assert!(flow.skip_rule());
        flow.marker("END");
        assert!(!flow.skip_rule());
        assert_eq!(flow.pending_marker(), None);
    }
}
