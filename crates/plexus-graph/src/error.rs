use std::fmt;

use plexus_core::IdError;
use thiserror::Error;

/// Which list of a declaration a reference came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefSlot {
    Output,
    Input,
    State,
}

impl fmt::Display for RefSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Output => "output",
            Self::Input => "input",
            Self::State => "state",
        })
    }
}

/// Why a callback registration was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    #[error("callback declares no outputs")]
    NoOutputs,

    #[error("malformed output string {output:?}")]
    MalformedOutput { output: String },

    #[error("{slot} #{position} has no id")]
    MissingId { slot: RefSlot, position: usize },

    #[error("{slot} #{position} has no property")]
    MissingProperty { slot: RefSlot, position: usize },

    #[error("{slot} #{position} has a malformed id: {source}")]
    MalformedId {
        slot: RefSlot,
        position: usize,
        #[source]
        source: IdError,
    },

    #[error("output {output} is listed more than once")]
    DuplicateOutputInCallback { output: String },

    #[error("{key} is both an input and an output of the same callback")]
    InputIsOutput { key: String },

    #[error("output {output} uses ALLSMALLER, which is only valid in inputs and state")]
    AllSmallerInOutput { output: String },

    #[error("outputs use different MATCH keys: [{expected}] vs [{found}] in {output}")]
    MismatchedMatchKeys {
        output: String,
        expected: String,
        found: String,
    },

    #[error("{slot} {reference} uses {wildcard} on key {key:?}, which no output binds with MATCH")]
    UnboundWildcard {
        slot: RefSlot,
        reference: String,
        wildcard: &'static str,
        key: String,
    },

    #[error("output {output} is already set by callback {owner}")]
    DuplicateOutput { output: String, owner: String },
}

/// A rejected registration, by its position in the declared list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphDiagnostic {
    pub index: usize,
    pub output: String,
    pub error: DependencyError,
}

impl fmt::Display for GraphDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "callback #{} ({}): {}", self.index, self.output, self.error)
    }
}
