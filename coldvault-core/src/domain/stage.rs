//! Pipeline stages

use serde::{Deserialize, Serialize};

/// A step of the backup pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Init,
    HotSync,
    SafetyCheck,
    ServiceStop,
    ColdSync,
    ServiceStart,
    Archiving,
    Uploading,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::HotSync => "hot-sync",
            Stage::SafetyCheck => "safety-check",
            Stage::ServiceStop => "service-stop",
            Stage::ColdSync => "cold-sync",
            Stage::ServiceStart => "service-start",
            Stage::Archiving => "archiving",
            Stage::Uploading => "uploading",
            Stage::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
