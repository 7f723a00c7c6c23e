//! Command-line surface of the `mpchat` binary.

/// Interactive chat session command.
pub mod chat;
