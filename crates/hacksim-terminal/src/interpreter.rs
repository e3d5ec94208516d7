//! Command trait, registry, and dispatch logic.
//!
//! A line is split on `&&` (stop at the first failure) or, failing that,
//! on `;` (run everything). Each segment is handed back to the same entry
//! point, so `a ; b && c` runs `a ; b` and then `c`. Single commands support
//! quoted arguments and output redirection (`>`, `>>`).

use std::collections::HashMap;

use hacksim_types::config::TerminalConfig;
use hacksim_types::error::{ErrorKind, HackError, Result};
use hacksim_vfs::{VirtualFilesystem, path};
use serde::Serialize;

/// Output produced by a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    /// Plain text lines.
    Text(String),
    /// Command produced no visible output.
    None,
    /// Signal to clear the terminal output buffer.
    Clear,
}

impl CommandOutput {
    fn into_text(self) -> String {
        match self {
            Self::Text(t) => t,
            Self::None | Self::Clear => String::new(),
        }
    }
}

/// Shared mutable environment passed to every command.
pub struct Environment<'a> {
    /// Current working directory (absolute VFS path).
    pub cwd: String,
    /// The player's virtual file system.
    pub vfs: &'a mut VirtualFilesystem,
    /// Interpreter settings (user name, mission keys).
    pub config: &'a TerminalConfig,
}

/// A single executable command.
pub trait Command: Send + Sync {
    /// The command name (what the user types).
    fn name(&self) -> &str;

    /// One-line description for `help`.
    fn description(&self) -> &str;

    /// Usage string (e.g. "ls \[-a\] \[path\]").
    fn usage(&self) -> &str;

    /// Command category for grouping in `help` output.
    fn category(&self) -> &str {
        "general"
    }

    /// Execute the command with the given arguments and environment.
    ///
    /// A command that fails must leave `env` untouched.
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput>;
}

/// Outcome of one command, as reported to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub output: String,
    pub new_directory: String,
    pub success: bool,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// Set by `clear`.
    pub cleared: bool,
}

impl CommandResult {
    fn ok(output: CommandOutput, cwd: &str) -> Self {
        let cleared = output == CommandOutput::Clear;
        Self {
            output: output.into_text(),
            new_directory: cwd.to_string(),
            success: true,
            error: None,
            error_kind: None,
            cleared,
        }
    }

    fn failed(err: &HackError, cwd: &str) -> Self {
        Self {
            output: String::new(),
            new_directory: cwd.to_string(),
            success: false,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            cleared: false,
        }
    }
}

/// One leaf command that actually ran while executing a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    /// The segment text, trimmed.
    pub command: String,
    pub result: CommandResult,
}

/// Everything that happened while executing one input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOutcome {
    /// Leaf commands in execution order.
    pub executed: Vec<ExecutedCommand>,
    /// The result reported for the whole line.
    pub result: CommandResult,
}

/// Registry of available commands with dispatch.
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn Command>>,
}

impl CommandRegistry {
    /// Create an empty command registry.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
        }
    }

    /// Register a command. Replaces any existing command with the same name.
    pub fn register(&mut self, cmd: Box<dyn Command>) {
        self.commands.insert(cmd.name().to_string(), cmd);
    }

    /// List `(name, description)` pairs sorted by name.
    pub fn list_commands(&self) -> Vec<(&str, &str)> {
        let mut cmds: Vec<(&str, &str)> = self
            .commands
            .values()
            .map(|c| (c.name(), c.description()))
            .collect();
        cmds.sort_by_key(|(name, _)| *name);
        cmds
    }

    /// Parse and execute a command line.
    ///
    /// The returned outcome lists every leaf command that ran. Under `&&`
    /// the line's result is the first failure (or the last success); under
    /// `;` it is the result of the last segment.
    pub fn execute(&self, line: &str, env: &mut Environment<'_>) -> LineOutcome {
        let mut executed = Vec::new();
        let result = self.run_line(line, env, &mut executed);
        LineOutcome { executed, result }
    }

    fn run_line(
        &self,
        line: &str,
        env: &mut Environment<'_>,
        executed: &mut Vec<ExecutedCommand>,
    ) -> CommandResult {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return CommandResult::ok(CommandOutput::None, &env.cwd);
        }

        if let Some(segments) = split_unquoted(trimmed, "&&") {
            let mut last = CommandResult::ok(CommandOutput::None, &env.cwd);
            for segment in segments {
                last = self.run_line(segment, env, executed);
                if !last.success {
                    log::debug!("&& chain stopped at `{}`", segment.trim());
                    break;
                }
            }
            return last;
        }

        if let Some(segments) = split_unquoted(trimmed, ";") {
            let mut last = CommandResult::ok(CommandOutput::None, &env.cwd);
            for segment in segments {
                last = self.run_line(segment, env, executed);
            }
            return last;
        }

        let result = match self.execute_with_redirect(trimmed, env) {
            Ok(output) => CommandResult::ok(output, &env.cwd),
            Err(e) => {
                log::debug!("`{trimmed}` failed: {e}");
                CommandResult::failed(&e, &env.cwd)
            },
        };
        executed.push(ExecutedCommand {
            command: trimmed.to_string(),
            result: result.clone(),
        });
        result
    }

    /// Execute a command, handling output redirection (`>` and `>>`).
    fn execute_with_redirect(
        &self,
        cmd_str: &str,
        env: &mut Environment<'_>,
    ) -> Result<CommandOutput> {
        let (cmd_part, redirect) = parse_redirect(cmd_str);
        let Some(redir) = redirect else {
            return self.execute_single_cmd(cmd_part, env);
        };

        let target = redir.path.trim();
        if target.is_empty() {
            return Err(HackError::InvalidArgument(
                "missing redirection target".to_string(),
            ));
        }
        let target = path::resolve(&unquote(target), &env.cwd);
        if target == path::ROOT || env.vfs.is_dir(&target) {
            return Err(HackError::InvalidArgument(format!(
                "{target} is a directory"
            )));
        }

        // Two mutations (the command, then the write) must succeed together.
        let backup = env.vfs.clone();
        let cwd_before = env.cwd.clone();
        let outcome = self
            .execute_single_cmd(cmd_part, env)
            .and_then(|output| write_redirect(env, &target, output.into_text(), redir.append));
        if outcome.is_err() {
            *env.vfs = backup;
            env.cwd = cwd_before;
        }
        outcome
    }

    /// Execute a single command (after chaining and redirection).
    fn execute_single_cmd(
        &self,
        cmd_str: &str,
        env: &mut Environment<'_>,
    ) -> Result<CommandOutput> {
        let trimmed = cmd_str.trim();
        if trimmed.is_empty() {
            return Err(HackError::InvalidArgument("empty command".to_string()));
        }

        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((h, r)) => (h, r.trim()),
            None => (trimmed, ""),
        };
        let name_lower = head.to_ascii_lowercase();

        // echo takes its text raw so apostrophes and spacing survive.
        let arg_strings: Vec<String> = if name_lower == "echo" {
            if rest.is_empty() {
                Vec::new()
            } else {
                vec![unquote(rest)]
            }
        } else {
            tokenize(rest)?
        };
        let args: Vec<&str> = arg_strings.iter().map(|s| s.as_str()).collect();

        log::debug!("dispatch `{name_lower}` with {} args", args.len());

        if name_lower == "help" {
            return self.execute_help(&args);
        }

        match self.commands.get(name_lower.as_str()) {
            Some(cmd) => cmd.execute(&args, env),
            None => Err(HackError::UnknownCommand(head.to_string())),
        }
    }

    /// Built-in help with access to the registry.
    fn execute_help(&self, args: &[&str]) -> Result<CommandOutput> {
        if let Some(&name) = args.first() {
            let name_lower = name.to_ascii_lowercase();
            return match self.commands.get(name_lower.as_str()) {
                Some(cmd) => Ok(CommandOutput::Text(format!(
                    "{} ({})\n  {}\n  Usage: {}",
                    cmd.name(),
                    cmd.category(),
                    cmd.description(),
                    cmd.usage()
                ))),
                None => Err(HackError::UnknownCommand(name.to_string())),
            };
        }

        // Group commands by category.
        let mut categories: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
        categories
            .entry("general")
            .or_default()
            .push(("help", "List available commands"));
        for cmd in self.commands.values() {
            categories
                .entry(cmd.category())
                .or_default()
                .push((cmd.name(), cmd.description()));
        }

        let mut cats: Vec<(&str, Vec<(&str, &str)>)> = categories.into_iter().collect();
        cats.sort_by_key(|(cat, _)| *cat);

        let total: usize = cats.iter().map(|(_, v)| v.len()).sum();
        let mut out = format!("Commands ({total}):\n");
        for (cat, mut cmds) in cats {
            cmds.sort_by_key(|(name, _)| *name);
            out.push_str(&format!("\n  [{cat}]\n"));
            for (name, desc) in &cmds {
                out.push_str(&format!("    {name:10} {desc}\n"));
            }
        }
        out.push_str("\nType 'help <command>' for details.");
        Ok(CommandOutput::Text(out))
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn write_redirect(
    env: &mut Environment<'_>,
    target: &str,
    text: String,
    append: bool,
) -> Result<CommandOutput> {
    let content = match env.vfs.content(target) {
        Some(existing) if append && !existing.is_empty() => format!("{existing}\n{text}"),
        _ => text,
    };
    env.vfs.write_file(target, &content)?;
    Ok(CommandOutput::None)
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

/// Split a command string into tokens, handling single and double quotes.
///
/// Inside double quotes, `\"` and `\\` are escapes. Inside single quotes
/// everything is literal.
pub fn tokenize(input: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = input.chars();
    let mut in_single = false;
    let mut in_double = false;

    while let Some(ch) = chars.next() {
        if in_single {
            if ch == '\'' {
                in_single = false;
            } else {
                current.push(ch);
            }
        } else if in_double {
            match ch {
                '"' => in_double = false,
                '\\' => match chars.next() {
                    Some(next @ ('"' | '\\')) => current.push(next),
                    Some(other) => {
                        current.push('\\');
                        current.push(other);
                    },
                    None => current.push('\\'),
                },
                _ => current.push(ch),
            }
        } else {
            match ch {
                '\'' => {
                    in_single = true;
                    in_token = true;
                },
                '"' => {
                    in_double = true;
                    in_token = true;
                },
                c if c.is_whitespace() => {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                },
                _ => {
                    current.push(ch);
                    in_token = true;
                },
            }
        }
    }

    if in_single {
        return Err(HackError::InvalidArgument(
            "unterminated single quote".to_string(),
        ));
    }
    if in_double {
        return Err(HackError::InvalidArgument(
            "unterminated double quote".to_string(),
        ));
    }

    if in_token {
        tokens.push(current);
    }

    Ok(tokens)
}

/// Strip one pair of matching surrounding quotes.
pub fn unquote(text: &str) -> String {
    let t = text.trim();
    for q in ['"', '\''] {
        if t.len() >= 2 && t.starts_with(q) && t.ends_with(q) {
            return t[1..t.len() - 1].to_string();
        }
    }
    t.to_string()
}

// ---------------------------------------------------------------------------
// Chain splitting
// ---------------------------------------------------------------------------

/// Split on every occurrence of `sep` outside double quotes.
///
/// Returns `None` when `sep` does not occur. Empty segments are dropped.
/// Single quotes are not tracked here: mission text is full of apostrophes.
fn split_unquoted<'a>(input: &'a str, sep: &str) -> Option<Vec<&'a str>> {
    let bytes = input.as_bytes();
    let sep_bytes = sep.as_bytes();
    let mut segments = Vec::new();
    let mut in_double = false;
    let mut start = 0;
    let mut i = 0;
    let mut found = false;

    while i < bytes.len() {
        let b = bytes[i];
        if in_double {
            if b == b'\\' {
                i += 1;
            } else if b == b'"' {
                in_double = false;
            }
        } else if b == b'"' {
            in_double = true;
        } else if bytes[i..].starts_with(sep_bytes) {
            found = true;
            segments.push(&input[start..i]);
            i += sep_bytes.len();
            start = i;
            continue;
        }
        i += 1;
    }

    if !found {
        return None;
    }
    segments.push(&input[start.min(input.len())..]);
    Some(
        segments
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect(),
    )
}

// ---------------------------------------------------------------------------
// Redirection parsing
// ---------------------------------------------------------------------------

struct Redirect<'a> {
    path: &'a str,
    append: bool,
}

/// Split at the first `>` or `>>` outside double quotes.
///
/// The text before it is the command; the text after it is the target.
fn parse_redirect(input: &str) -> (&str, Option<Redirect<'_>>) {
    let bytes = input.as_bytes();
    let mut in_double = false;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_double {
            if b == b'\\' {
                i += 1;
            } else if b == b'"' {
                in_double = false;
            }
        } else if b == b'"' {
            in_double = true;
        } else if b == b'>' {
            let append = bytes.get(i + 1) == Some(&b'>');
            let skip = if append { 2 } else { 1 };
            return (
                &input[..i],
                Some(Redirect {
                    path: &input[(i + skip).min(input.len())..],
                    append,
                }),
            );
        }
        i += 1;
    }
    (input, None)
}
