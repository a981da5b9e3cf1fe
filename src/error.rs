//! Error taxonomy for the locking pipeline.
//!
//! Every failure is either a collaborator that could not be reached or a
//! collaborator that answered with data of the wrong shape. Both abort the
//! run; the decision to stop is made by `main`, not at the point of failure.
use crate::util::truncate_string;
use std::fmt;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Longest input excerpt carried in a contract error message.
const INPUT_EXCERPT_BYTES: usize = 300;

/// External systems the pipeline talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Inventory,
    Resolver,
    Filesystem,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Inventory => "inventory",
            Self::Resolver => "resolver",
            Self::Filesystem => "filesystem",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum LockError {
    /// Network, subprocess or filesystem failure.
    #[error("{collaborator} call `{call}` failed: {source}")]
    Unreachable {
        collaborator: Collaborator,
        call: String,
        #[source]
        source: BoxError,
    },

    /// The inventory answered with a status other than the one the call requires.
    #[error("inventory call `{call}` returned status {status} (expected {expected})")]
    UnexpectedStatus {
        call: String,
        status: u16,
        expected: u16,
    },

    /// A collaborator returned data that does not match the expected shape.
    #[error("{what}: {reason} (input: {input:?})")]
    Contract {
        what: &'static str,
        reason: String,
        input: String,
    },
}

impl LockError {
    pub fn unreachable(
        collaborator: Collaborator,
        call: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Unreachable {
            collaborator,
            call: call.into(),
            source: source.into(),
        }
    }

    pub fn contract(what: &'static str, reason: impl Into<String>, input: &str) -> Self {
        Self::Contract {
            what,
            reason: reason.into(),
            input: truncate_string(input, INPUT_EXCERPT_BYTES),
        }
    }

    /// Return the collaborator involved, if the error came from a call.
    pub fn collaborator(&self) -> Option<Collaborator> {
        match self {
            Self::Unreachable { collaborator, .. } => Some(*collaborator),
            Self::UnexpectedStatus { .. } => Some(Collaborator::Inventory),
            Self::Contract { .. } => None,
        }
    }
}
