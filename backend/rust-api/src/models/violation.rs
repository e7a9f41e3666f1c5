use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    TabSwitch,
    FullscreenExit,
    RightClick,
    BlockedShortcut,
    CopyPaste,
}

impl ViolationType {
    pub const ALL: [ViolationType; 5] = [
        ViolationType::TabSwitch,
        ViolationType::FullscreenExit,
        ViolationType::RightClick,
        ViolationType::BlockedShortcut,
        ViolationType::CopyPaste,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViolationType::TabSwitch => "tab_switch",
            ViolationType::FullscreenExit => "fullscreen_exit",
            ViolationType::RightClick => "right_click",
            ViolationType::BlockedShortcut => "blocked_shortcut",
            ViolationType::CopyPaste => "copy_paste",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ViolationType::TabSwitch => "Tab switch",
            ViolationType::FullscreenExit => "Fullscreen exit",
            ViolationType::RightClick => "Right-click",
            ViolationType::BlockedShortcut => "Blocked shortcut",
            ViolationType::CopyPaste => "Copy/paste",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

impl Violation {
    pub fn new(
        violation_type: ViolationType,
        detail: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            violation_type,
            detail: detail.into(),
            timestamp: at,
        }
    }
}

/// A violation detected outside the browser monitor, e.g. by a proctoring
/// extension.
#[derive(Debug, Deserialize, Validate)]
pub struct ReportViolationRequest {
    #[serde(rename = "type")]
    pub violation_type: ViolationType,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub detail: String,
}
