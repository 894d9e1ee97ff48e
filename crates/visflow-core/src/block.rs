//! Visualization-facing block graph model.
//!
//! A finished trace is reshaped into named [`Block`]s keyed by id, each
//! holding an ordered flow of typed steps. Call-shaped steps point at the
//! called block through `flow_pointer_id`; the block keyed
//! [`START_BLOCK_ID`] is the root every renderer walks from.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Key of the synthetic root block.
pub const START_BLOCK_ID: &str = "START";

/// The kind of step inside a block's flow.
///
/// Wire values are the PascalCase variant names. The `ExternCall` variants
/// describe calls into code outside the traced program; the recorder never
/// emits them, so they appear only in graphs built from the wire format or
/// constructed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowType {
    /// A plain log line.
    Log,
    /// A call whose return value was stored by the caller.
    CallStore,
    /// A call whose return value the caller did not use.
    Call,
    /// A call leaving the traced program, return value unused.
    ExternCall,
    /// A call leaving the traced program whose return value was stored.
    ExternCallStore,
}

impl FlowType {
    /// Whether steps of this type must carry a block back-reference.
    pub fn is_call(self) -> bool {
        !matches!(self, FlowType::Log)
    }
}

/// One step within a block's flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStep {
    /// Id of the referenced block for call-shaped steps, else `None`.
    /// Consumers tolerate a pointer with no matching block (rendered as an
    /// unnamed placeholder), so lookups through it are fallible.
    pub flow_pointer_id: Option<String>,
    /// Unique id of this step within the whole trace.
    pub flow_id: String,
    /// What kind of step this is.
    pub flow_type: FlowType,
    /// Log line or stored return value, depending on `flow_type`.
    pub value: Option<String>,
}

/// A named grouping of flow steps corresponding to one traced scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Id of the block that called this one; `None` only for the root.
    /// A back-reference for lookup, not ownership.
    pub caller: Option<String>,
    /// The scope name this block was traced under.
    pub name: String,
    /// Steps in the order they executed.
    pub flow: Vec<FlowStep>,
}

impl Block {
    /// An empty block with the given name and caller.
    pub fn new(name: impl Into<String>, caller: Option<String>) -> Self {
        Block {
            caller,
            name: name.into(),
            flow: Vec::new(),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block {{ caller: {:?}, name: {}, steps: {} }}",
            self.caller,
            self.name,
            self.flow.len()
        )
    }
}

/// The whole block graph: blocks keyed by id, rooted at [`START_BLOCK_ID`].
///
/// Serializes transparently as the keyed JSON object every visualizer
/// consumes: `{ "<block id>": { "caller": ..., "name": ..., "flow": [...] } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockGraph {
    pub blocks: HashMap<String, Block>,
}

impl BlockGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// The root block, if the graph has one.
    pub fn root(&self) -> Option<&Block> {
        self.blocks.get(START_BLOCK_ID)
    }

    /// Looks up a block by id. Dangling `flow_pointer_id`s resolve to `None`.
    pub fn get(&self, id: &str) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// Follows a step's pointer to the referenced block, if any exists.
    pub fn resolve(&self, step: &FlowStep) -> Option<&Block> {
        step.flow_pointer_id.as_deref().and_then(|id| self.get(id))
    }
}
