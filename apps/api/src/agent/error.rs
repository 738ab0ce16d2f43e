use std::fmt;

use thiserror::Error;

use crate::agent::selectors::RoleFailure;
use crate::browser::BrowserError;
use crate::llm_client::LlmError;
use crate::models::progress::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Browser,
    Completion,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Browser => "browser",
            Capability::Completion => "completion",
        };
        f.write_str(name)
    }
}

/// Errors raised inside the browsing loop. Which ones are retried depends on
/// the state the orchestrator is in; see `Orchestrator::step`.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("run cancelled")]
    Cancelled,

    #[error("{capability} call timed out during {operation}")]
    Timeout {
        capability: Capability,
        operation: String,
    },

    #[error("{capability} unavailable: {message}")]
    Unavailable {
        capability: Capability,
        message: String,
    },

    #[error("response did not match the expected schema: {0}")]
    Schema(String),

    #[error("selector validation failed: {}", summarize(.0))]
    Validation(Vec<RoleFailure>),

    #[error("element error: {0}")]
    Element(String),

    #[error("browser command failed: {0}")]
    Command(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<AgentError> },
}

fn summarize(failures: &[RoleFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<BrowserError> for AgentError {
    fn from(error: BrowserError) -> Self {
        match error {
            BrowserError::Unavailable(message) => AgentError::Unavailable {
                capability: Capability::Browser,
                message,
            },
            BrowserError::Timeout(operation) => AgentError::Timeout {
                capability: Capability::Browser,
                operation,
            },
            BrowserError::NoSuchElement(m)
            | BrowserError::StaleElement(m)
            | BrowserError::InvalidSelector(m) => AgentError::Element(m),
            BrowserError::Command(m) => AgentError::Command(m),
        }
    }
}

impl AgentError {
    pub fn from_completion(error: LlmError) -> Self {
        if error.is_unavailable() {
            AgentError::Unavailable {
                capability: Capability::Completion,
                message: error.to_string(),
            }
        } else {
            AgentError::Schema(error.to_string())
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            AgentError::Cancelled => FailureKind::RunCancelled,
            AgentError::Timeout { .. }
            | AgentError::Unavailable { .. }
            | AgentError::Element(_)
            | AgentError::Command(_) => FailureKind::CapabilityUnavailable,
            AgentError::Schema(_) => FailureKind::SchemaViolation,
            AgentError::Validation(_) => FailureKind::SelectorValidationFailure,
            AgentError::Exhausted { last, .. } => last.kind(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AgentError::Cancelled)
    }
}
