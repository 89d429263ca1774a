//! # Flag Engine
//!
//! Derives tri-state status flags from raw telemetry fields.
//!
//! A flag starts out [`TriState::Unknown`] and only changes when its field is
//! present with a numeric value. The lockout flag is additionally derived from
//! the state-name text whenever the line does not carry it explicitly. Once a
//! flag is known it never goes back to unknown until the session is reset.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::config::FlagConfig;
use crate::protocol::Fields;

/// Boolean with an explicit "not yet observed" value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    #[default]
    Unknown,
    False,
    True,
}

impl TriState {
    pub fn is_known(self) -> bool {
        self != TriState::Unknown
    }

    /// `None` for unknown
    pub fn as_bool(self) -> Option<bool> {
        match self {
            TriState::Unknown => None,
            TriState::False => Some(false),
            TriState::True => Some(true),
        }
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value {
            TriState::True
        } else {
            TriState::False
        }
    }
}

impl From<Option<bool>> for TriState {
    fn from(value: Option<bool>) -> Self {
        value.map_or(TriState::Unknown, TriState::from)
    }
}

/// A flag whose value changed during one update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagTransition {
    pub name: String,
    pub previous: TriState,
    pub current: TriState,
}

/// Tracked flags and their current tri-state values
#[derive(Debug, Clone)]
pub struct FlagEngine {
    states: BTreeMap<String, TriState>,
    state_field: String,
    lockout_flag: String,
    lockout_state: String,
}

impl FlagEngine {
    /// Create an engine with every tracked flag unknown
    pub fn new(config: &FlagConfig) -> Self {
        Self {
            states: config
                .tracked
                .iter()
                .map(|name| (name.clone(), TriState::Unknown))
                .collect(),
            state_field: config.state_field.clone(),
            lockout_flag: config.lockout_flag.clone(),
            lockout_state: config.lockout_state.clone(),
        }
    }

    /// Apply one line's fields
    ///
    /// `last_values` must already include this line's fields; the lockout
    /// derivation reads the latest state text from it.
    ///
    /// # Returns
    ///
    /// * `Vec<FlagTransition>` - Every tracked flag whose value changed
    pub fn update(&mut self, fields: &Fields, last_values: &Fields) -> Vec<FlagTransition> {
        let mut transitions = Vec::new();

        // Derived lockout first so an explicit numeric field overrides it below
        if !fields.contains_key(&self.lockout_flag) {
            if let Some(derived) = self.derive_lockout(last_values) {
                let name = self.lockout_flag.clone();
                self.set(&name, derived, &mut transitions);
            }
        }

        let updates: Vec<(String, TriState)> = self
            .states
            .keys()
            .filter_map(|name| {
                let value = fields.get(name)?.as_number()?;
                Some((name.clone(), TriState::from(value != 0.0)))
            })
            .collect();

        for (name, value) in updates {
            self.set(&name, value, &mut transitions);
        }

        transitions
    }

    /// Lockout implied by the last state text, `None` if no text is known
    fn derive_lockout(&self, last_values: &Fields) -> Option<TriState> {
        let text = last_values.get(&self.state_field)?.as_text()?;
        if text.is_empty() {
            return None;
        }
        Some(TriState::from(text.eq_ignore_ascii_case(&self.lockout_state)))
    }

    fn set(&mut self, name: &str, value: TriState, transitions: &mut Vec<FlagTransition>) {
        let Some(slot) = self.states.get_mut(name) else {
            return;
        };
        if *slot != value {
            transitions.push(FlagTransition {
                name: name.to_string(),
                previous: *slot,
                current: value,
            });
            *slot = value;
        }
    }

    /// Current value of a flag; untracked names read as unknown
    pub fn get(&self, name: &str) -> TriState {
        self.states.get(name).copied().unwrap_or_default()
    }

    /// Copy of every tracked flag
    pub fn states(&self) -> BTreeMap<String, TriState> {
        self.states.clone()
    }

    /// Return every flag to unknown
    pub fn reset(&mut self) {
        for state in self.states.values_mut() {
            *state = TriState::Unknown;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FieldValue;

    fn engine() -> FlagEngine {
        FlagEngine::new(&FlagConfig::default())
    }

    fn fields(pairs: &[(&str, FieldValue)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn num(v: f64) -> FieldValue {
        FieldValue::Number(v)
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    /// Apply a line the way the session does: merge into last values first
    fn apply(engine: &mut FlagEngine, last: &mut Fields, line: Fields) -> Vec<FlagTransition> {
        last.extend(line.clone());
        engine.update(&line, last)
    }

    #[test]
    fn test_all_flags_start_unknown() {
        let engine = engine();
        assert_eq!(engine.states().len(), 11);
        assert!(engine.states().values().all(|s| *s == TriState::Unknown));
    }

    #[test]
    fn test_nonzero_is_true() {
        let mut engine = engine();
        let mut last = Fields::new();
        apply(&mut engine, &mut last, fields(&[("tilt_ok", num(1.0)), ("mach_ok", num(0.0))]));
        assert_eq!(engine.get("tilt_ok"), TriState::True);
        assert_eq!(engine.get("mach_ok"), TriState::False);

        apply(&mut engine, &mut last, fields(&[("mach_ok", num(-2.5))]));
        assert_eq!(engine.get("mach_ok"), TriState::True);
    }

    #[test]
    fn test_non_numeric_flag_is_ignored() {
        let mut engine = engine();
        let mut last = Fields::new();
        apply(&mut engine, &mut last, fields(&[("baro_agree", num(1.0))]));
        apply(&mut engine, &mut last, fields(&[("baro_agree", text("yes"))]));
        assert_eq!(engine.get("baro_agree"), TriState::True);
    }

    #[test]
    fn test_flags_are_sticky() {
        let mut engine = engine();
        let mut last = Fields::new();
        apply(&mut engine, &mut last, fields(&[("agl_ready", num(0.0))]));
        for _ in 0..5 {
            apply(&mut engine, &mut last, fields(&[("vbat_v", num(4.0))]));
            assert_eq!(engine.get("agl_ready"), TriState::False);
        }
    }

    #[test]
    fn test_lockout_derived_from_state_text() {
        let mut engine = engine();
        let mut last = Fields::new();

        apply(&mut engine, &mut last, fields(&[("vbat_v", num(4.0))]));
        assert_eq!(engine.get("lockout"), TriState::Unknown);

        apply(&mut engine, &mut last, fields(&[("fc_state_str", text("ASCENT"))]));
        assert_eq!(engine.get("lockout"), TriState::False);

        apply(&mut engine, &mut last, fields(&[("fc_state_str", text("abort_lockout"))]));
        assert_eq!(engine.get("lockout"), TriState::True);

        // Later lines without state keep deriving from the last known text
        apply(&mut engine, &mut last, fields(&[("vbat_v", num(3.9))]));
        assert_eq!(engine.get("lockout"), TriState::True);
    }

    #[test]
    fn test_explicit_lockout_takes_precedence() {
        let mut engine = engine();
        let mut last = Fields::new();
        apply(
            &mut engine,
            &mut last,
            fields(&[("fc_state_str", text("ABORT_LOCKOUT")), ("lockout", num(0.0))]),
        );
        assert_eq!(engine.get("lockout"), TriState::False);

        // No explicit field on the next line: derivation applies again
        apply(&mut engine, &mut last, fields(&[("vbat_v", num(3.9))]));
        assert_eq!(engine.get("lockout"), TriState::True);
    }

    #[test]
    fn test_explicit_non_numeric_lockout_keeps_prior() {
        let mut engine = engine();
        let mut last = Fields::new();
        apply(&mut engine, &mut last, fields(&[("fc_state_str", text("ASCENT"))]));
        apply(
            &mut engine,
            &mut last,
            fields(&[("fc_state_str", text("ABORT_LOCKOUT")), ("lockout", text("?"))]),
        );
        assert_eq!(engine.get("lockout"), TriState::False);
    }

    #[test]
    fn test_empty_state_text_keeps_lockout() {
        let mut engine = engine();
        let mut last = Fields::new();
        apply(&mut engine, &mut last, fields(&[("lockout", num(1.0))]));
        apply(&mut engine, &mut last, fields(&[("fc_state_str", text(""))]));
        assert_eq!(engine.get("lockout"), TriState::True);
    }

    #[test]
    fn test_transitions_report_changes_only() {
        let mut engine = engine();
        let mut last = Fields::new();

        let t = apply(&mut engine, &mut last, fields(&[("liftoff_det", num(0.0))]));
        assert_eq!(
            t,
            vec![FlagTransition {
                name: "liftoff_det".to_string(),
                previous: TriState::Unknown,
                current: TriState::False,
            }]
        );

        let t = apply(&mut engine, &mut last, fields(&[("liftoff_det", num(0.0))]));
        assert!(t.is_empty());

        let t = apply(&mut engine, &mut last, fields(&[("liftoff_det", num(1.0))]));
        assert_eq!(t.len(), 1);
        assert_eq!(t[0].previous, TriState::False);
        assert_eq!(t[0].current, TriState::True);
    }

    #[test]
    fn test_untracked_flag_fields_are_ignored() {
        let mut engine = engine();
        let mut last = Fields::new();
        let t = apply(&mut engine, &mut last, fields(&[("apogee_det", num(1.0))]));
        assert!(t.is_empty());
        assert_eq!(engine.get("apogee_det"), TriState::Unknown);
    }

    #[test]
    fn test_lockout_not_tracked_is_never_derived() {
        let config = FlagConfig {
            tracked: vec!["tilt_ok".to_string()],
            ..FlagConfig::default()
        };
        let mut engine = FlagEngine::new(&config);
        let mut last = Fields::new();
        let t = apply(&mut engine, &mut last, fields(&[("fc_state_str", text("ABORT_LOCKOUT"))]));
        assert!(t.is_empty());
        assert_eq!(engine.states().len(), 1);
    }

    #[test]
    fn test_reset_returns_to_unknown() {
        let mut engine = engine();
        let mut last = Fields::new();
        apply(&mut engine, &mut last, fields(&[("tilt_ok", num(1.0))]));
        engine.reset();
        assert_eq!(engine.get("tilt_ok"), TriState::Unknown);
        assert_eq!(engine.states().len(), 11);
    }

    #[test]
    fn test_tristate_conversions() {
        assert_eq!(TriState::from(Some(true)), TriState::True);
        assert_eq!(TriState::from(None), TriState::Unknown);
        assert_eq!(TriState::False.as_bool(), Some(false));
        assert!(!TriState::Unknown.is_known());
    }
}
