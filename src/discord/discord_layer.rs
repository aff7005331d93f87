// Discord layer - commands and event handlers.

#[path = "commands/command_catalog.rs"]
pub mod commands;

pub mod codeblocks;
pub mod events;

// Re-export shared types for convenience
pub use commands::{Context, Data, Error};
