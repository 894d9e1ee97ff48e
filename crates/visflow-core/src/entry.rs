//! Captured trace records.
//!
//! An [`Entry`] is one atomic step in an operation's trace: a scope boundary
//! (`START`/`END`), a plain log line (`LOG`), or a stored return value
//! (`STORE`). Entries are immutable once created and carry a sequence number
//! that is unique and strictly increasing within their operation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of trace step an [`Entry`] records.
///
/// Wire values are the uppercase names (`"START"`, `"END"`, `"STORE"`,
/// `"LOG"`), matching the reporting endpoint's payload contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    /// Opens a named scope. `value` is always absent.
    Start,
    /// Closes the innermost open scope of the same name. `value` is absent.
    End,
    /// A return value consumed by the enclosing scope.
    Store,
    /// A plain log line inside the current scope.
    Log,
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogType::Start => "START",
            LogType::End => "END",
            LogType::Store => "STORE",
            LogType::Log => "LOG",
        };
        write!(f, "{}", s)
    }
}

/// One captured trace step.
///
/// Field names on the wire are snake_case (`operation_id`, `log_type`, ...);
/// a finalized operation ships as a JSON array of these records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Identifier of the operation this entry belongs to.
    pub operation_id: String,
    /// Scope name the entry was logged under.
    pub name: String,
    /// What kind of step this is.
    pub log_type: LogType,
    /// Payload for `LOG` and `STORE` entries; `None` for `START`/`END`.
    pub value: Option<String>,
    /// Position within the operation: 0-based, gapless, in call order.
    pub sequence: u64,
}

impl Entry {
    /// Creates an entry. `START`/`END` entries carry no value by contract;
    /// callers pass `None` for those.
    pub fn new(
        operation_id: impl Into<String>,
        name: impl Into<String>,
        log_type: LogType,
        value: Option<String>,
        sequence: u64,
    ) -> Self {
        Entry {
            operation_id: operation_id.into(),
            name: name.into(),
            log_type,
            value,
            sequence,
        }
    }
}
