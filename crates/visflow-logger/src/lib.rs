pub mod context;
pub mod error;
pub mod logger;
pub mod sink;

// Re-export commonly used types
pub use context::OperationContext;
pub use error::{LoggerError, SinkError};
pub use logger::FlowLogger;
pub use sink::{HttpSink, MemorySink, TraceSink};
