//! Frame processors and their registry.

mod command;
mod noop;
mod registry;
mod traits;

pub use command::{CommandProcessor, CommandSpec};
pub use noop::NoopProcessor;
pub use registry::ProcessorRegistry;
pub use traits::FrameProcessor;
