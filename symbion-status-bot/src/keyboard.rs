//! Inline keyboard model and differential comparison
//!
//! A layout is what one outbound status message currently displays. Layouts
//! are rebuilt from scratch on every aggregation and compared by label text
//! only: the gateway rejects redundant edits, so the comparison decides
//! whether an edit is worth issuing at all.

use crate::probe::ProbeResult;

pub const ACTION_REFRESH: &str = "refresh";
pub const ACTION_SHOW_STATUS: &str = "show_status";
pub const ACTION_SERVICE_DETAIL_PREFIX: &str = "service_detail:";

const REFRESH_LABEL: &str = "🔄 Refresh";

/// One inline button: visible label + opaque callback payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action_id: String,
}

/// Ordered rows of buttons, exactly as rendered for one message.
pub type ButtonLayout = Vec<Vec<Button>>;

/// Build the status keyboard from an aggregation snapshot: one row per
/// service ("<icon> <key>" → service detail) plus a trailing refresh row.
/// Pure function of its input.
pub fn build_layout(entries: &[(String, ProbeResult)]) -> ButtonLayout {
    let mut layout: ButtonLayout = entries
        .iter()
        .map(|(key, result)| {
            vec![Button {
                label: format!("{} {}", result.state.icon(), key),
                action_id: format!("{ACTION_SERVICE_DETAIL_PREFIX}{key}"),
            }]
        })
        .collect();

    layout.push(vec![Button {
        label: REFRESH_LABEL.to_string(),
        action_id: ACTION_REFRESH.to_string(),
    }]);

    layout
}

/// Compare two layouts by label text, position for position. A shape
/// mismatch (row or column counts differ) counts as changed without
/// attempting any partial alignment.
pub fn layouts_match(previous: &ButtonLayout, next: &ButtonLayout) -> bool {
    if previous.len() != next.len() {
        return false;
    }
    for (prev_row, next_row) in previous.iter().zip(next) {
        if prev_row.len() != next_row.len() {
            return false;
        }
        for (prev_btn, next_btn) in prev_row.iter().zip(next_row) {
            if prev_btn.label != next_btn.label {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{ProbeResult, ProbeState};

    fn snapshot(states: &[(&str, ProbeState)]) -> Vec<(String, ProbeResult)> {
        states
            .iter()
            .map(|(key, state)| {
                (key.to_string(), ProbeResult { state: *state, detail: vec![] })
            })
            .collect()
    }

    #[test]
    fn test_build_layout_shape_and_labels() {
        let entries = snapshot(&[("a", ProbeState::Up), ("b", ProbeState::Up)]);
        let layout = build_layout(&entries);

        // two service rows + one refresh row
        assert_eq!(layout.len(), 3);
        assert_eq!(layout[0][0].label, "🟢 a");
        assert_eq!(layout[1][0].label, "🟢 b");
        assert_eq!(layout[0][0].action_id, "service_detail:a");
        assert_eq!(layout[2][0].label, REFRESH_LABEL);
        assert_eq!(layout[2][0].action_id, ACTION_REFRESH);
    }

    #[test]
    fn test_build_layout_is_pure() {
        let entries = snapshot(&[("a", ProbeState::Up), ("b", ProbeState::Down)]);
        let first = build_layout(&entries);
        let second = build_layout(&entries);
        assert!(layouts_match(&first, &second));
    }

    #[test]
    fn test_single_flip_changes_exactly_one_row() {
        let before = build_layout(&snapshot(&[("a", ProbeState::Up), ("b", ProbeState::Up)]));
        let after = build_layout(&snapshot(&[("a", ProbeState::Up), ("b", ProbeState::Down)]));

        assert!(!layouts_match(&before, &after));
        assert_eq!(before[0][0].label, after[0][0].label);
        assert_eq!(after[1][0].label, "🔴 b");
        assert_eq!(before[2], after[2]); // refresh row untouched
    }

    #[test]
    fn test_shape_mismatch_counts_as_changed() {
        let two = build_layout(&snapshot(&[("a", ProbeState::Up), ("b", ProbeState::Up)]));
        let one = build_layout(&snapshot(&[("a", ProbeState::Up)]));
        assert!(!layouts_match(&two, &one));

        // ragged rows must not panic either
        let mut ragged = two.clone();
        ragged[0].push(Button { label: "extra".into(), action_id: "x".into() });
        assert!(!layouts_match(&two, &ragged));
    }

    #[test]
    fn test_empty_layouts_match() {
        let empty: ButtonLayout = Vec::new();
        assert!(layouts_match(&empty, &empty));
    }
}
