//! Failure classification shared by every layer.

use serde::{Deserialize, Serialize};

/// How a failed operation should be read by callers and operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The caller lacks the permission or manager role required.
    Denied,
    /// The request is a logic error (re-creation, null manager, bad params).
    InvalidConfig,
    /// The host could not execute the call (missing code, depth, re-entry,
    /// module-reported failure).
    Execution,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Denied => "denied",
            Self::InvalidConfig => "invalid_config",
            Self::Execution => "execution",
        })
    }
}
