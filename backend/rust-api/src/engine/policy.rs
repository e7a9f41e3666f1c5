use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::ViolationType;

/// What the session does with one kind of violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRule {
    pub warn: bool,
    pub suppress_default: bool,
    pub request_fullscreen: bool,
    pub counts_toward_limit: bool,
}

impl PolicyRule {
    pub const fn warn_and_count() -> Self {
        Self {
            warn: true,
            suppress_default: false,
            request_fullscreen: false,
            counts_toward_limit: true,
        }
    }

    pub const fn warn_and_refullscreen() -> Self {
        Self {
            warn: true,
            suppress_default: false,
            request_fullscreen: true,
            counts_toward_limit: false,
        }
    }

    pub const fn block_and_warn() -> Self {
        Self {
            warn: true,
            suppress_default: true,
            request_fullscreen: false,
            counts_toward_limit: false,
        }
    }

    pub const fn counted(mut self, counts: bool) -> Self {
        self.counts_toward_limit = counts;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyComboParseError {
    #[error("key combination is empty")]
    Empty,
    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),
}

/// Keyboard shortcut blocked during a session. `ctrl` also matches the Meta
/// (Cmd) key; `shift` and `alt` must match exactly; keys compare
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCombo {
    pub key: String,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
}

impl KeyCombo {
    pub fn matches(&self, key: &str, ctrl: bool, shift: bool, alt: bool, meta: bool) -> bool {
        self.ctrl == (ctrl || meta)
            && self.shift == shift
            && self.alt == alt
            && self.key.eq_ignore_ascii_case(key)
    }
}

impl FromStr for KeyCombo {
    type Err = KeyComboParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s
            .split('+')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect();
        let (key, modifiers) = parts.split_last().ok_or(KeyComboParseError::Empty)?;

        let mut combo = KeyCombo {
            key: key.to_string(),
            ctrl: false,
            shift: false,
            alt: false,
        };
        for modifier in modifiers {
            match modifier.to_ascii_lowercase().as_str() {
                "ctrl" | "control" | "cmd" | "meta" => combo.ctrl = true,
                "shift" => combo.shift = true,
                "alt" | "option" => combo.alt = true,
                other => return Err(KeyComboParseError::UnknownModifier(other.to_string())),
            }
        }
        Ok(combo)
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ctrl {
            write!(f, "Ctrl+")?;
        }
        if self.shift {
            write!(f, "Shift+")?;
        }
        if self.alt {
            write!(f, "Alt+")?;
        }
        write!(f, "{}", self.key)
    }
}

/// Copy, cut and paste are left out: the clipboard event itself reports those
/// as `copy_paste`.
pub const DEFAULT_BLOCKED_SHORTCUTS: &[&str] = &[
    "F12",
    "Ctrl+Shift+I",
    "Ctrl+Shift+J",
    "Ctrl+Shift+C",
    "Ctrl+U",
    "Ctrl+S",
    "Ctrl+P",
    "Ctrl+A",
    "Ctrl+R",
    "F5",
];

/// Deployment-wide integrity policy shared by every session.
#[derive(Debug, Clone)]
pub struct ProctoringPolicy {
    pub tab_switch_limit: u32,
    pub auto_submit_on_limit: bool,
    pub fullscreen_required: bool,
    pub pass_threshold: u32,
    pub blocked_shortcuts: Vec<KeyCombo>,
    pub(crate) rules: BTreeMap<ViolationType, PolicyRule>,
}

impl Default for ProctoringPolicy {
    fn default() -> Self {
        let rules = BTreeMap::from([
            (ViolationType::TabSwitch, PolicyRule::warn_and_count()),
            (
                ViolationType::FullscreenExit,
                PolicyRule::warn_and_refullscreen(),
            ),
            (ViolationType::RightClick, PolicyRule::block_and_warn()),
            (ViolationType::BlockedShortcut, PolicyRule::block_and_warn()),
            (ViolationType::CopyPaste, PolicyRule::block_and_warn()),
        ]);

        Self {
            tab_switch_limit: 3,
            auto_submit_on_limit: true,
            fullscreen_required: true,
            pass_threshold: 70,
            blocked_shortcuts: DEFAULT_BLOCKED_SHORTCUTS
                .iter()
                .filter_map(|combo| combo.parse().ok())
                .collect(),
            rules,
        }
    }
}

impl ProctoringPolicy {
    pub fn with_rule(mut self, violation_type: ViolationType, rule: PolicyRule) -> Self {
        self.rules.insert(violation_type, rule);
        self
    }

    pub fn rule(&self, violation_type: ViolationType) -> PolicyRule {
        self.rules
            .get(&violation_type)
            .copied()
            .unwrap_or(PolicyRule {
                warn: true,
                suppress_default: false,
                request_fullscreen: false,
                counts_toward_limit: false,
            })
    }

    pub fn blocked_shortcut(
        &self,
        key: &str,
        ctrl: bool,
        shift: bool,
        alt: bool,
        meta: bool,
    ) -> Option<&KeyCombo> {
        self.blocked_shortcuts
            .iter()
            .find(|combo| combo.matches(key, ctrl, shift, alt, meta))
    }

    /// True once `count` counted violations must end the session.
    pub fn limit_reached(&self, count: u32) -> bool {
        self.auto_submit_on_limit && self.tab_switch_limit > 0 && count >= self.tab_switch_limit
    }

    pub fn passes(&self, percentage: u32) -> bool {
        percentage >= self.pass_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_counts_only_tab_switches() {
        let policy = ProctoringPolicy::default();

        for violation_type in ViolationType::ALL {
            let rule = policy.rule(violation_type);
            assert_eq!(
                rule.counts_toward_limit,
                violation_type == ViolationType::TabSwitch,
                "{:?}",
                violation_type
            );
            assert!(rule.warn);
        }
        assert!(policy.rule(ViolationType::FullscreenExit).request_fullscreen);
        assert!(policy.rule(ViolationType::RightClick).suppress_default);
        assert!(!policy.rule(ViolationType::TabSwitch).suppress_default);
    }

    #[test]
    fn with_rule_overrides_a_single_entry() {
        let policy = ProctoringPolicy::default().with_rule(
            ViolationType::FullscreenExit,
            PolicyRule::warn_and_refullscreen().counted(true),
        );
        assert!(policy.rule(ViolationType::FullscreenExit).counts_toward_limit);
        assert!(!policy.rule(ViolationType::RightClick).counts_toward_limit);
    }

    #[test]
    fn limit_reached_respects_threshold_and_switch() {
        let mut policy = ProctoringPolicy::default();
        assert!(!policy.limit_reached(2));
        assert!(policy.limit_reached(3));
        assert!(policy.limit_reached(4));

        policy.auto_submit_on_limit = false;
        assert!(!policy.limit_reached(10));

        policy.auto_submit_on_limit = true;
        policy.tab_switch_limit = 0;
        assert!(!policy.limit_reached(10));
    }

    #[test]
    fn pass_threshold_is_inclusive() {
        let policy = ProctoringPolicy::default();
        assert!(policy.passes(70));
        assert!(!policy.passes(69));
    }

    #[test]
    fn parses_key_combos() {
        let combo: KeyCombo = "Ctrl+Shift+I".parse().unwrap();
        assert_eq!(
            combo,
            KeyCombo {
                key: "I".to_string(),
                ctrl: true,
                shift: true,
                alt: false
            }
        );
        assert_eq!(combo.to_string(), "Ctrl+Shift+I");

        let f12: KeyCombo = " F12 ".parse().unwrap();
        assert!(!f12.ctrl && !f12.shift && !f12.alt);

        assert_eq!("".parse::<KeyCombo>(), Err(KeyComboParseError::Empty));
        assert_eq!(
            "Hyper+K".parse::<KeyCombo>(),
            Err(KeyComboParseError::UnknownModifier("hyper".to_string()))
        );
    }

    #[test]
    fn key_combo_matching_rules() {
        let devtools: KeyCombo = "Ctrl+Shift+I".parse().unwrap();
        assert!(devtools.matches("i", true, true, false, false));
        assert!(devtools.matches("I", false, true, false, true));
        assert!(!devtools.matches("I", true, false, false, false));

        let save: KeyCombo = "Ctrl+S".parse().unwrap();
        assert!(save.matches("s", true, false, false, false));
        assert!(!save.matches("s", false, false, false, false));
        assert!(!save.matches("s", true, true, false, false));

        let f12: KeyCombo = "F12".parse().unwrap();
        assert!(f12.matches("F12", false, false, false, false));
        assert!(!f12.matches("F12", true, false, false, false));
    }

    #[test]
    fn default_shortcuts_cover_devtools_save_print_and_source() {
        let policy = ProctoringPolicy::default();
        assert!(policy.blocked_shortcut("F12", false, false, false, false).is_some());
        assert!(policy.blocked_shortcut("s", true, false, false, false).is_some());
        assert!(policy.blocked_shortcut("p", false, false, false, true).is_some());
        assert!(policy.blocked_shortcut("u", true, false, false, false).is_some());
        assert!(policy.blocked_shortcut("ArrowDown", false, false, false, false).is_none());
        assert!(policy.blocked_shortcut("b", true, false, false, false).is_none());
    }
}
