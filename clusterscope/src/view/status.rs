use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

const HEALTHY: [&str; 5] = ["UP", "HEALTHY", "OK", "ACTIVE", "RUNNING"];
const CRITICAL: [&str; 5] = ["DOWN", "FAILED", "ERROR", "CRITICAL", "CRASHLOOPBACKOFF"];
const WARNING: [&str; 3] = ["WARNING", "DEGRADED", "PENDING"];

/// Display bucket for any status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum StatusClass {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl StatusClass {
    /// Case-insensitive match against the fixed vocabulary; anything unrecognised is `Unknown`.
    pub fn classify(status: &str) -> Self {
        let status = status.trim().to_ascii_uppercase();
        if HEALTHY.contains(&status.as_str()) {
            StatusClass::Healthy
        } else if CRITICAL.contains(&status.as_str()) {
            StatusClass::Critical
        } else if WARNING.contains(&status.as_str()) {
            StatusClass::Warning
        } else {
            StatusClass::Unknown
        }
    }

    fn severity(self) -> u8 {
        match self {
            StatusClass::Healthy => 0,
            StatusClass::Unknown => 1,
            StatusClass::Warning => 2,
            StatusClass::Critical => 3,
        }
    }

    /// Most severe class, ordered critical > warning > unknown > healthy. `None` for no input.
    pub fn worst(classes: impl IntoIterator<Item = StatusClass>) -> Option<StatusClass> {
        classes.into_iter().max_by_key(|class| class.severity())
    }
}

/// A status string as reported, with its bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ClassifiedStatus {
    pub status: String,
    pub class: StatusClass,
}

impl ClassifiedStatus {
    pub fn new(status: impl Into<String>) -> Self {
        let status = status.into();
        let class = StatusClass::classify(&status);
        Self { status, class }
    }
}
