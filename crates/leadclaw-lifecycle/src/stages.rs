//! Guarded stage transitions.
//!
//! The lifecycle only moves forward: replayed or out-of-order events must
//! not regress a lead that already progressed further.

use leadclaw_core::types::LeadStage;

/// Compute the stage after an event proposes `target`.
/// Returns `None` when the lead is already at or past the target.
pub fn advance_stage(current: LeadStage, target: LeadStage) -> Option<LeadStage> {
    if target.rank() > current.rank() {
        Some(target)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert_eq!(
            advance_stage(LeadStage::New, LeadStage::FormSubmitted),
            Some(LeadStage::FormSubmitted)
        );
        assert_eq!(
            advance_stage(LeadStage::FormSubmitted, LeadStage::LinkOpened),
            Some(LeadStage::LinkOpened)
        );
    }

    #[test]
    fn test_replays_and_regressions_blocked() {
        assert_eq!(
            advance_stage(LeadStage::LinkOpened, LeadStage::LinkOpened),
            None
        );
        assert_eq!(
            advance_stage(LeadStage::LinkOpened, LeadStage::WebLinkSent),
            None
        );
        assert_eq!(advance_stage(LeadStage::FormSubmitted, LeadStage::New), None);
    }
}
