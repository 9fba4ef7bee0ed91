#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! The engine-to-extension dispatch protocol
//!
//! Extensions observe and steer the engine through a synchronous message
//! stream. Every phase transition and package step is announced as a
//! [`Message`] carrying a typed argument record; cancelable messages give
//! the extension a result record to write back into.
//!
//! The message numbering is frozen: core messages own ids below
//! [`Message::EXTENSION_BASE`], extension-private messages live at or
//! above it. Records evolve by appending optional fields gated on the
//! [`ApiVersion`] negotiated when the dispatcher is created; an engine
//! never shows an extension a field newer than what was negotiated.

mod dispatch;
mod message;
pub mod records;
mod version;

pub use dispatch::{Dispatcher, Extension, NullExtension};
pub use message::{ExtensionMessageId, Message};
pub use records::{FailureInfo, MessageArgs, MessageResults};
pub use version::ApiVersion;
