//! Interactive terminal client for hosted chat and image-generation APIs.

pub mod commands;
pub mod config;
/// Prompting and colored status output.
pub mod console;
pub mod rchain;
/// Turn-taking loop that owns the conversation transcript.
pub mod session;
