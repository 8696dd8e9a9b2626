//! Built-in tools.
//!
//! The business-logic tool set (shell, file I/O, web search) lives outside
//! the core; what ships here is the channel `message` tool and the memory
//! tools the loop itself relies on.

pub mod memory;
pub mod message;

pub use memory::{MemoryAppendTool, MemoryReadTool, MemoryWriteTool, UserIdProvider};
pub use message::MessageTool;
