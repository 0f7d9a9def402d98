//! Content-stream interpretation.
//!
//! The parser turns decoded content bytes into typed operators; the
//! processor abstraction consumes them. The run processor executes against
//! a device, the buffer processor serializes the stream back out, and the
//! filter processor rewrites streams while passing operators through.

pub mod graphics_state;
pub mod interpreter;
pub mod operators;
pub mod optional_content;
pub mod parser;
pub mod processor;

pub use graphics_state::{ColorState, GraphicsState, Pattern, TextState};
pub use interpreter::RunProcessor;
pub use operators::{Op, TextElement};
pub use optional_content::OptionalContent;
pub use parser::ContentParser;
pub use processor::{BufferProcessor, FilterProcessor, Processor, process_stream};
