//! Inter-agent communication: message bus, shared memory and event hooks.
//!
//! # Module layout
//!
//! - [`message`] — `Message`, `MessageType`, `MessagePriority`
//! - [`bus`] — `InterAgentCommunication`, `MessageHandler`, `CommStats`
//! - [`memory`] — `SharedMemory`
//! - [`hooks`] — `EventHooks`
//! - [`error`] — `CommError`, `CommResult`

pub mod bus;
pub mod error;
pub mod hooks;
pub mod memory;
pub mod message;

pub use bus::{handler_fn, CommStats, InterAgentCommunication, MessageHandler};
pub use error::{CommError, CommResult};
pub use hooks::{EventHooks, EventListener};
pub use memory::SharedMemory;
pub use message::{Message, MessagePriority, MessageType};
