//! Assembly of a linear entry sequence into the block graph.
//!
//! The recorder captures one flat, sequence-numbered list of entries per
//! operation. [`assemble`] reshapes that list into the [`BlockGraph`] the
//! visualizers render: each `START`/`END` pair becomes a [`Block`], nested
//! calls become call-shaped steps in the parent's flow, and a following
//! `STORE` upgrades a call into one whose return value the caller kept.
//!
//! Every invocation gets its own block identity (a fresh UUID key), so
//! self-recursive and mutually-recursive calls never collapse into one node.

use std::collections::HashMap;

use uuid::Uuid;

use crate::block::{Block, BlockGraph, FlowStep, FlowType, START_BLOCK_ID};
use crate::entry::{Entry, LogType};
use crate::error::GraphError;

/// Builds a block graph from one operation's entries.
///
/// Entries are sorted by sequence number first, so callers may pass them in
/// any order (e.g. as reloaded from a store). The first entry must open the
/// scope the last entry closes; that scope becomes the `START` root block.
pub fn assemble(entries: &[Entry]) -> Result<BlockGraph, GraphError> {
    if entries.len() < 2 {
        return Err(GraphError::TooFewEntries {
            count: entries.len(),
        });
    }

    let mut ordered: Vec<&Entry> = entries.iter().collect();
    ordered.sort_by_key(|e| e.sequence);

    let first = ordered[0];
    let last = ordered[ordered.len() - 1];
    if first.log_type != LogType::Start {
        return Err(GraphError::MissingStart {
            found: first.log_type.to_string(),
        });
    }
    if first.name != last.name {
        return Err(GraphError::UnbalancedRoot {
            first: first.name.clone(),
            last: last.name.clone(),
        });
    }

    let mut blocks: HashMap<String, Block> = HashMap::new();
    blocks.insert(
        START_BLOCK_ID.to_string(),
        Block::new(&first.name, None),
    );
    let mut current_id = START_BLOCK_ID.to_string();
    let mut caller_stack: Vec<String> = Vec::new();

    for entry in &ordered[1..] {
        match entry.log_type {
            // A log line lands directly in the open block's flow.
            LogType::Log => {
                let current = block_mut(&mut blocks, &current_id);
                current.flow.push(FlowStep {
                    flow_pointer_id: None,
                    flow_id: new_flow_id(),
                    flow_type: FlowType::Log,
                    value: entry.value.clone(),
                });
            }
            // A nested scope opens: fresh block keyed by its own id, called
            // by the currently open block.
            LogType::Start => {
                let block_id = Uuid::new_v4().to_string();
                blocks.insert(
                    block_id.clone(),
                    Block::new(&entry.name, Some(current_id.clone())),
                );
                caller_stack.push(current_id);
                current_id = block_id;
            }
            // The open block closes; the caller records the call.
            LogType::End => {
                let current = block_mut(&mut blocks, &current_id);
                if current.name != entry.name {
                    return Err(GraphError::MismatchedEnd {
                        ended: entry.name.clone(),
                        open: current.name.clone(),
                    });
                }
                let Some(caller_id) = caller_stack.pop() else {
                    // Only the root may close with an empty stack.
                    if current_id != START_BLOCK_ID {
                        return Err(GraphError::EndWithoutCaller {
                            name: entry.name.clone(),
                        });
                    }
                    break;
                };
                let caller = block_mut(&mut blocks, &caller_id);
                caller.flow.push(FlowStep {
                    flow_pointer_id: Some(current_id),
                    flow_id: new_flow_id(),
                    flow_type: FlowType::Call,
                    value: None,
                });
                current_id = caller_id;
            }
            // The previous step must have been a call; the stored value
            // upgrades it to a call-with-stored-return.
            LogType::Store => {
                let current = block_mut(&mut blocks, &current_id);
                match current.flow.last_mut() {
                    Some(step) if step.flow_type == FlowType::Call => {
                        step.flow_type = FlowType::CallStore;
                        step.value = entry.value.clone();
                    }
                    _ => {
                        return Err(GraphError::StoreWithoutCall {
                            name: entry.name.clone(),
                        });
                    }
                }
            }
        }
    }

    if !caller_stack.is_empty() {
        return Err(GraphError::UnclosedBlocks {
            count: caller_stack.len(),
        });
    }

    Ok(BlockGraph { blocks })
}

fn new_flow_id() -> String {
    Uuid::new_v4().to_string()
}

/// The open block always exists: its id was either inserted as the root or
/// freshly inserted when its START entry was seen.
fn block_mut<'a>(blocks: &'a mut HashMap<String, Block>, id: &str) -> &'a mut Block {
    blocks
        .get_mut(id)
        .unwrap_or_else(|| panic!("open block '{}' missing from graph", id))
}
