//! Command interpreter for the simulated hacking terminal.
//!
//! Commands implement the `Command` trait and are registered by name. The
//! registry parses input lines (chaining, quoting, redirection), resolves
//! the command name, and dispatches `execute()` against the player's VFS.

mod commands;
mod interpreter;
pub mod mission_commands;
pub mod search_commands;

/// Register all built-in commands (filesystem, search, mission) into a registry.
pub use commands::register_builtins;
/// Placeholder printed by `cat` for an empty file.
pub use commands::EMPTY_FILE_PLACEHOLDER;
/// A single executable command trait.
pub use interpreter::Command;
/// Output produced by a command (text, nothing, clear signal).
pub use interpreter::CommandOutput;
/// Registry of available commands with dispatch.
pub use interpreter::CommandRegistry;
/// Outcome of one command as reported to the player.
pub use interpreter::CommandResult;
/// Shared mutable environment passed to every command.
pub use interpreter::Environment;
/// One leaf command that ran while executing a line.
pub use interpreter::ExecutedCommand;
/// Every leaf result of a line plus the line's overall result.
pub use interpreter::LineOutcome;
/// Quote-aware argument splitting.
pub use interpreter::tokenize;
/// Register mission commands (decrypt, download, hack, exploit) into a registry.
pub use mission_commands::register_mission_commands;
/// Register search commands (find, grep, tree) into a registry.
pub use search_commands::register_search_commands;
