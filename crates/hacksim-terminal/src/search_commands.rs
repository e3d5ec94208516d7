//! Search commands: find, grep, tree.

use hacksim_types::error::{HackError, Result};
use hacksim_vfs::path;
use regex::Regex;

use crate::commands::{not_a_directory, require_file};
use crate::interpreter::{Command, CommandOutput, CommandRegistry, Environment};

const NO_MATCHES: &str = "No matches found";

/// Register search commands.
pub fn register_search_commands(reg: &mut CommandRegistry) {
    reg.register(Box::new(FindCmd));
    reg.register(Box::new(GrepCmd));
    reg.register(Box::new(TreeCmd));
}

/// Translate a shell glob into an anchored regex (`*` and `?` only).
fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut re = String::from("^");
    for ch in glob.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| HackError::InvalidArgument(format!("bad pattern {glob}: {e}")))
}

// ---------------------------------------------------------------------------
// find
// ---------------------------------------------------------------------------

struct FindCmd;
impl Command for FindCmd {
    fn name(&self) -> &str {
        "find"
    }
    fn description(&self) -> &str {
        "Search for files by name"
    }
    fn usage(&self) -> &str {
        "find [path] -name \"<glob>\""
    }
    fn category(&self) -> &str {
        "search"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let mut root = None;
        let mut glob = None;
        let mut i = 0;
        while i < args.len() {
            match args[i] {
                "-name" => {
                    let Some(&pattern) = args.get(i + 1) else {
                        return Err(HackError::InvalidArgument(
                            "find: -name needs a pattern".to_string(),
                        ));
                    };
                    glob = Some(pattern);
                    i += 2;
                    continue;
                },
                flag if flag.starts_with('-') => {
                    return Err(HackError::InvalidArgument(format!(
                        "find: unknown option {flag}"
                    )));
                },
                other => root = Some(other),
            }
            i += 1;
        }

        let dir = path::resolve(root.unwrap_or("."), &env.cwd);
        if !env.vfs.is_dir(&dir) {
            return Err(not_a_directory(env, &dir));
        }
        let matcher = glob.map(glob_to_regex).transpose()?;

        let hits: Vec<String> = env
            .vfs
            .walk(&dir)
            .into_iter()
            .filter(|p| {
                matcher
                    .as_ref()
                    .is_none_or(|re| re.is_match(path::file_name(p)))
            })
            .collect();
        if hits.is_empty() {
            return Ok(CommandOutput::Text(NO_MATCHES.to_string()));
        }
        Ok(CommandOutput::Text(hits.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// grep
// ---------------------------------------------------------------------------

struct GrepCmd;
impl Command for GrepCmd {
    fn name(&self) -> &str {
        "grep"
    }
    fn description(&self) -> &str {
        "Print lines of a file containing a pattern"
    }
    fn usage(&self) -> &str {
        "grep \"<pattern>\" <file>"
    }
    fn category(&self) -> &str {
        "search"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let (Some(&pattern), Some(&token)) = (args.first(), args.get(1)) else {
            return Err(HackError::InvalidArgument(
                "usage: grep \"<pattern>\" <file>".to_string(),
            ));
        };
        let file = path::resolve(token, &env.cwd);
        require_file(env, &file)?;
        let Some(text) = env.vfs.content(&file).filter(|t| !t.is_empty()) else {
            return Err(HackError::NotFound(format!("{file} has no content")));
        };

        let matches: Vec<&str> = text.lines().filter(|l| l.contains(pattern)).collect();
        if matches.is_empty() {
            return Ok(CommandOutput::Text(NO_MATCHES.to_string()));
        }
        Ok(CommandOutput::Text(matches.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// tree
// ---------------------------------------------------------------------------

struct TreeCmd;
impl Command for TreeCmd {
    fn name(&self) -> &str {
        "tree"
    }
    fn description(&self) -> &str {
        "Show directory tree"
    }
    fn usage(&self) -> &str {
        "tree [path]"
    }
    fn category(&self) -> &str {
        "search"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let dir = match args.first() {
            Some(&token) => path::resolve(token, &env.cwd),
            None => env.cwd.clone(),
        };
        let Some(render) = env.vfs.render_tree(&dir) else {
            return Err(not_a_directory(env, &dir));
        };
        let mut out = render.lines.join("\n");
        out.push_str(&format!(
            "\n\n{} directories, {} files",
            render.dirs, render.files
        ));
        Ok(CommandOutput::Text(out))
    }
}
