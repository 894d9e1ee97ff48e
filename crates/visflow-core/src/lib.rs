pub mod block;
pub mod entry;
pub mod error;
pub mod graph;

// Re-export commonly used types
pub use block::{Block, BlockGraph, FlowStep, FlowType, START_BLOCK_ID};
pub use entry::{Entry, LogType};
pub use error::GraphError;
pub use graph::assemble;
