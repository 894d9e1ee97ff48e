//! Error types for graph assembly.
//!
//! Uses `thiserror` for structured, matchable variants covering every
//! validation the assembler performs on an entry sequence.

use thiserror::Error;

/// Errors produced while assembling entries into a block graph.
#[derive(Debug, Error)]
pub enum GraphError {
    /// An operation trace needs at least an opening and a closing entry.
    #[error("graph assembly needs at least two entries, got {count}")]
    TooFewEntries { count: usize },

    /// The first and last entries must open and close the same scope.
    #[error("first entry opens '{first}' but last entry closes '{last}'")]
    UnbalancedRoot { first: String, last: String },

    /// The trace must begin with a START entry.
    #[error("expected the first entry to be START, got {found}")]
    MissingStart { found: String },

    /// An END entry named a scope other than the innermost open one.
    #[error("END of '{ended}' while block '{open}' is open")]
    MismatchedEnd { ended: String, open: String },

    /// Only the root block may close without a caller on the stack.
    #[error("END of '{name}' has no caller; only the root block may close last")]
    EndWithoutCaller { name: String },

    /// A STORE entry must directly follow a completed call.
    #[error("STORE in '{name}' does not follow a call step")]
    StoreWithoutCall { name: String },

    /// Entries remained after the root block closed.
    #[error("{count} open block(s) remained after the trace ended")]
    UnclosedBlocks { count: usize },
}
