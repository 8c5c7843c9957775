use serde::{Deserialize, Serialize};

/// Lifecycle state of a cached entry.
///
/// Valid transitions are `Fresh → Stale → InFlight → Fresh` and
/// `InFlight → Stale` when a refetch fails or is cancelled. Rewriting an
/// entry without changing its state is always allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryState {
    Fresh,
    Stale,
    InFlight,
}

impl EntryState {
    /// Returns true if an entry in this state may move to `next`.
    pub fn can_transition_to(self, next: EntryState) -> bool {
        use EntryState::*;

        self == next
            || matches!(
                (self, next),
                (Fresh, Stale) | (Stale, InFlight) | (InFlight, Fresh) | (InFlight, Stale)
            )
    }

    pub fn is_fresh(self) -> bool {
        matches!(self, EntryState::Fresh)
    }

    pub fn is_stale(self) -> bool {
        matches!(self, EntryState::Stale)
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, EntryState::InFlight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::EntryState::*;

    #[test]
    fn test_valid_transitions() {
        assert!(Fresh.can_transition_to(Stale));
        assert!(Stale.can_transition_to(InFlight));
        assert!(InFlight.can_transition_to(Fresh));
        assert!(InFlight.can_transition_to(Stale));
    }

    #[test]
    fn test_same_state_is_allowed() {
        assert!(Fresh.can_transition_to(Fresh));
        assert!(Stale.can_transition_to(Stale));
        assert!(InFlight.can_transition_to(InFlight));
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(!Fresh.can_transition_to(InFlight));
        assert!(!Stale.can_transition_to(Fresh));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&InFlight).unwrap(), "\"in-flight\"");
        assert_eq!(serde_json::to_string(&Fresh).unwrap(), "\"fresh\"");
    }
}
