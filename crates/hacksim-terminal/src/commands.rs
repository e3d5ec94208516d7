//! Built-in filesystem and session commands.

use hacksim_types::error::{HackError, Result};
use hacksim_vfs::path;

use crate::interpreter::{Command, CommandOutput, CommandRegistry, Environment};

/// Shown by `cat` for a file with no stored content.
pub const EMPTY_FILE_PLACEHOLDER: &str = "(Fichier vide)";

/// Register all built-in commands into a registry.
///
/// This registers the filesystem and session commands plus the search and
/// mission command modules.
pub fn register_builtins(reg: &mut CommandRegistry) {
    reg.register(Box::new(LsCmd));
    reg.register(Box::new(CdCmd));
    reg.register(Box::new(PwdCmd));
    reg.register(Box::new(CatCmd));
    reg.register(Box::new(MkdirCmd));
    reg.register(Box::new(TouchCmd));
    reg.register(Box::new(RmCmd));
    reg.register(Box::new(EchoCmd));
    reg.register(Box::new(ClearCmd));
    reg.register(Box::new(WhoamiCmd));
    crate::register_search_commands(reg);
    crate::register_mission_commands(reg);
}

// ---------------------------------------------------------------------------
// ls
// ---------------------------------------------------------------------------

struct LsCmd;
impl Command for LsCmd {
    fn name(&self) -> &str {
        "ls"
    }
    fn description(&self) -> &str {
        "List directory contents"
    }
    fn usage(&self) -> &str {
        "ls [-a] [path]"
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let mut show_hidden = false;
        let mut target = None;
        for &arg in args {
            match arg {
                "-a" | "-la" | "-al" => show_hidden = true,
                flag if flag.starts_with('-') => {
                    return Err(HackError::InvalidArgument(format!(
                        "ls: unknown option {flag}"
                    )));
                },
                other => target = Some(other),
            }
        }
        let dir = match target {
            Some(t) => path::resolve(t, &env.cwd),
            None => env.cwd.clone(),
        };
        let Some(kids) = env.vfs.children(&dir) else {
            return Err(not_a_directory(env, &dir));
        };

        let lines: Vec<String> = kids
            .iter()
            .filter(|name| show_hidden || !name.starts_with('.'))
            .map(|name| {
                if env.vfs.is_dir(&path::join(&dir, name)) {
                    format!("{name}/")
                } else {
                    name.clone()
                }
            })
            .collect();
        if lines.is_empty() {
            return Ok(CommandOutput::Text("(empty)".to_string()));
        }
        Ok(CommandOutput::Text(lines.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// cd
// ---------------------------------------------------------------------------

struct CdCmd;
impl Command for CdCmd {
    fn name(&self) -> &str {
        "cd"
    }
    fn description(&self) -> &str {
        "Change working directory"
    }
    fn usage(&self) -> &str {
        "cd [path]"
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let target = match args.first() {
            None | Some(&"~") | Some(&"/") => path::ROOT.to_string(),
            Some(&token) => path::resolve(token, &env.cwd),
        };
        if !env.vfs.is_dir(&target) {
            return Err(not_a_directory(env, &target));
        }
        env.cwd = target;
        Ok(CommandOutput::None)
    }
}

// ---------------------------------------------------------------------------
// pwd
// ---------------------------------------------------------------------------

struct PwdCmd;
impl Command for PwdCmd {
    fn name(&self) -> &str {
        "pwd"
    }
    fn description(&self) -> &str {
        "Print working directory"
    }
    fn usage(&self) -> &str {
        "pwd"
    }
    fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::Text(env.cwd.clone()))
    }
}

// ---------------------------------------------------------------------------
// cat
// ---------------------------------------------------------------------------

struct CatCmd;
impl Command for CatCmd {
    fn name(&self) -> &str {
        "cat"
    }
    fn description(&self) -> &str {
        "Display file contents"
    }
    fn usage(&self) -> &str {
        "cat <file>"
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let Some(&token) = args.first() else {
            return Err(HackError::InvalidArgument("usage: cat <file>".to_string()));
        };
        let file = path::resolve(token, &env.cwd);
        require_file(env, &file)?;
        let text = match env.vfs.content(&file) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => EMPTY_FILE_PLACEHOLDER.to_string(),
        };
        Ok(CommandOutput::Text(text))
    }
}

// ---------------------------------------------------------------------------
// mkdir
// ---------------------------------------------------------------------------

struct MkdirCmd;
impl Command for MkdirCmd {
    fn name(&self) -> &str {
        "mkdir"
    }
    fn description(&self) -> &str {
        "Create a directory (and missing parents)"
    }
    fn usage(&self) -> &str {
        "mkdir <path>"
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let Some(token) = first_operand(args) else {
            return Err(HackError::InvalidArgument("usage: mkdir <path>".to_string()));
        };
        let dir = path::resolve(token, &env.cwd);
        if env.vfs.exists(&dir) {
            return Err(HackError::AlreadyExists(dir));
        }
        env.vfs.materialize(path::parent(&dir))?;
        env.vfs.create_dir(&dir)?;
        Ok(CommandOutput::None)
    }
}

// ---------------------------------------------------------------------------
// touch
// ---------------------------------------------------------------------------

struct TouchCmd;
impl Command for TouchCmd {
    fn name(&self) -> &str {
        "touch"
    }
    fn description(&self) -> &str {
        "Create an empty file"
    }
    fn usage(&self) -> &str {
        "touch <file>"
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let Some(token) = first_operand(args) else {
            return Err(HackError::InvalidArgument("usage: touch <file>".to_string()));
        };
        let file = path::resolve(token, &env.cwd);
        if env.vfs.exists(&file) {
            return Err(HackError::AlreadyExists(file));
        }
        env.vfs.materialize(path::parent(&file))?;
        env.vfs.create_file(&file, "")?;
        Ok(CommandOutput::None)
    }
}

// ---------------------------------------------------------------------------
// rm
// ---------------------------------------------------------------------------

struct RmCmd;
impl Command for RmCmd {
    fn name(&self) -> &str {
        "rm"
    }
    fn description(&self) -> &str {
        "Remove a file or directory"
    }
    fn usage(&self) -> &str {
        "rm <path> [-r|-rf|--recursive]"
    }
    fn category(&self) -> &str {
        "filesystem"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let mut recursive = false;
        let mut target = None;
        for &arg in args {
            match arg {
                "-r" | "-R" | "-rf" | "-fr" | "--recursive" => recursive = true,
                "-f" => {},
                flag if flag.starts_with('-') => {
                    return Err(HackError::InvalidArgument(format!(
                        "rm: unknown option {flag}"
                    )));
                },
                other => target = Some(other),
            }
        }
        let Some(token) = target else {
            return Err(HackError::InvalidArgument("usage: rm <path> [-r]".to_string()));
        };
        let victim = path::resolve(token, &env.cwd);
        env.vfs.remove(&victim, recursive)?;
        // The shell must not stay inside a removed directory.
        if path::is_within(&env.cwd, &victim) {
            log::debug!("cwd {} removed, moving to parent of {victim}", env.cwd);
            env.cwd = path::parent(&victim).to_string();
        }
        Ok(CommandOutput::None)
    }
}

// ---------------------------------------------------------------------------
// echo
// ---------------------------------------------------------------------------

struct EchoCmd;
impl Command for EchoCmd {
    fn name(&self) -> &str {
        "echo"
    }
    fn description(&self) -> &str {
        "Print text, or write it to a file with > / >>"
    }
    fn usage(&self) -> &str {
        "echo <text> [> file]"
    }
    fn execute(&self, args: &[&str], _env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::Text(args.join(" ")))
    }
}

// ---------------------------------------------------------------------------
// clear
// ---------------------------------------------------------------------------

struct ClearCmd;
impl Command for ClearCmd {
    fn name(&self) -> &str {
        "clear"
    }
    fn description(&self) -> &str {
        "Clear terminal output"
    }
    fn usage(&self) -> &str {
        "clear"
    }
    fn execute(&self, _args: &[&str], _env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::Clear)
    }
}

// ---------------------------------------------------------------------------
// whoami
// ---------------------------------------------------------------------------

struct WhoamiCmd;
impl Command for WhoamiCmd {
    fn name(&self) -> &str {
        "whoami"
    }
    fn description(&self) -> &str {
        "Print the current user"
    }
    fn usage(&self) -> &str {
        "whoami"
    }
    fn execute(&self, _args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        Ok(CommandOutput::Text(env.config.user_name.clone()))
    }
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// First argument that is not a flag.
pub(crate) fn first_operand<'a>(args: &[&'a str]) -> Option<&'a str> {
    args.iter().copied().find(|a| !a.starts_with('-'))
}

/// Error for a path that should have been a directory.
pub(crate) fn not_a_directory(env: &Environment<'_>, target: &str) -> HackError {
    if env.vfs.is_file(target) {
        HackError::InvalidArgument(format!("not a directory: {target}"))
    } else {
        HackError::NotFound(target.to_string())
    }
}

/// Fail unless `file` is a file listed by its parent.
pub(crate) fn require_file(env: &Environment<'_>, file: &str) -> Result<()> {
    if env.vfs.is_dir(file) {
        return Err(HackError::InvalidArgument(format!("is a directory: {file}")));
    }
    if !env.vfs.is_file(file) {
        return Err(HackError::NotFound(file.to_string()));
    }
    Ok(())
}
