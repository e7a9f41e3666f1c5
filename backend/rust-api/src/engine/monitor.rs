use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy::ProctoringPolicy;
use crate::models::{Violation, ViolationType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipboardAction {
    Copy,
    Paste,
    Cut,
}

impl ClipboardAction {
    fn as_str(&self) -> &'static str {
        match self {
            ClipboardAction::Copy => "copy",
            ClipboardAction::Paste => "paste",
            ClipboardAction::Cut => "cut",
        }
    }
}

/// Raw signal reported by the candidate's browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserEvent {
    VisibilityChanged {
        hidden: bool,
    },
    FullscreenChanged {
        active: bool,
    },
    ContextMenu,
    KeyDown {
        key: String,
        #[serde(default)]
        ctrl: bool,
        #[serde(default)]
        shift: bool,
        #[serde(default)]
        alt: bool,
        #[serde(default)]
        meta: bool,
    },
    Clipboard {
        action: ClipboardAction,
    },
    /// The fullscreen API is missing or the request was denied.
    FullscreenUnavailable {
        #[serde(default)]
        reason: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorOutput {
    Violation(Violation),
    CapabilityWarning(String),
    Ignored,
}

/// Classifies browser events into violations. Holds no thresholds: counting
/// and escalation belong to the session controller.
#[derive(Debug, Clone)]
pub struct IntegrityMonitor {
    policy: Arc<ProctoringPolicy>,
    active: bool,
    fullscreen_enforced: bool,
}

impl IntegrityMonitor {
    pub fn new(policy: Arc<ProctoringPolicy>) -> Self {
        let fullscreen_enforced = policy.fullscreen_required;
        Self {
            policy,
            active: false,
            fullscreen_enforced,
        }
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    /// Releases the monitor; every later event is ignored.
    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn fullscreen_enforced(&self) -> bool {
        self.fullscreen_enforced
    }

    pub fn classify(&mut self, event: &BrowserEvent, at: DateTime<Utc>) -> MonitorOutput {
        if !self.active {
            return MonitorOutput::Ignored;
        }

        match event {
            BrowserEvent::VisibilityChanged { hidden: true } => MonitorOutput::Violation(
                Violation::new(ViolationType::TabSwitch, "Page hidden", at),
            ),
            BrowserEvent::VisibilityChanged { hidden: false } => MonitorOutput::Ignored,
            BrowserEvent::FullscreenChanged { active: false } if self.fullscreen_enforced => {
                MonitorOutput::Violation(Violation::new(
                    ViolationType::FullscreenExit,
                    "Exited fullscreen mode",
                    at,
                ))
            }
            BrowserEvent::FullscreenChanged { .. } => MonitorOutput::Ignored,
            BrowserEvent::ContextMenu => MonitorOutput::Violation(Violation::new(
                ViolationType::RightClick,
                "Right-click attempted",
                at,
            )),
            BrowserEvent::Clipboard { action } => MonitorOutput::Violation(Violation::new(
                ViolationType::CopyPaste,
                format!("{} attempted", action.as_str()),
                at,
            )),
            BrowserEvent::KeyDown {
                key,
                ctrl,
                shift,
                alt,
                meta,
            } => match self
                .policy
                .blocked_shortcut(key, *ctrl, *shift, *alt, *meta)
            {
                Some(combo) => MonitorOutput::Violation(Violation::new(
                    ViolationType::BlockedShortcut,
                    format!("Blocked: {}", combo),
                    at,
                )),
                None => MonitorOutput::Ignored,
            },
            BrowserEvent::FullscreenUnavailable { reason } => {
                self.fullscreen_enforced = false;
                MonitorOutput::CapabilityWarning(
                    reason
                        .clone()
                        .unwrap_or_else(|| "fullscreen is not available".to_string()),
                )
            }
        }
    }
}
