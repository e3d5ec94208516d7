//! Objective rules as data.
//!
//! A challenge objective carries a [`Predicate`], a closed tagged union that
//! is deserialized from the catalog and interpreted by [`Predicate::matches`].
//! Predicates see the command just run, the attempt history (which already
//! ends with that command), and a read-only view of the resulting session.

use hacksim_types::error::{HackError, Result};
use hacksim_vfs::VirtualFilesystem;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One gradeable condition within a challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub description: String,
    pub rule: Predicate,
}

/// Rule deciding whether an objective is satisfied.
///
/// In TOML: `rule = { type = "command_starts_with", value = "cd " }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    /// The command, whitespace-normalized, equals `value`.
    CommandEquals { value: String },
    CommandStartsWith { value: String },
    CommandContains { value: String },
    /// The command matches a regular expression.
    CommandMatches { pattern: String },
    /// Some history entry contains `value` as a substring.
    HistoryContains { value: String },
    /// Some history entry, whitespace-normalized, equals `command`.
    HistoryIncludes { command: String },
    /// The working directory after the command is `path`.
    CurrentDirectoryIs { path: String },
    /// `path` exists in the session's file system.
    PathExists { path: String },
    /// The file at `path` contains `text`.
    FileContains { path: String, text: String },
    And { all: Vec<Predicate> },
    Or { any: Vec<Predicate> },
    Not { rule: Box<Predicate> },
    Always,
}

/// Everything a predicate may look at.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// The leaf command that was just executed.
    pub command: &'a str,
    /// Attempt history, oldest first, including `command`.
    pub history: &'a [String],
    /// Working directory after the command.
    pub cwd: &'a str,
    pub vfs: &'a VirtualFilesystem,
}

impl Predicate {
    /// Evaluate against a context. Pure; an invalid regex never matches.
    pub fn matches(&self, ctx: &EvalContext<'_>) -> bool {
        match self {
            Self::CommandEquals { value } => normalize(ctx.command) == normalize(value),
            Self::CommandStartsWith { value } => ctx.command.trim_start().starts_with(value.as_str()),
            Self::CommandContains { value } => ctx.command.contains(value.as_str()),
            Self::CommandMatches { pattern } => match Regex::new(pattern) {
                Ok(re) => re.is_match(ctx.command),
                Err(e) => {
                    log::warn!("Ignoring objective rule with bad regex {pattern:?}: {e}");
                    false
                },
            },
            Self::HistoryContains { value } => {
                ctx.history.iter().any(|h| h.contains(value.as_str()))
            },
            Self::HistoryIncludes { command } => {
                let wanted = normalize(command);
                ctx.history.iter().any(|h| normalize(h) == wanted)
            },
            Self::CurrentDirectoryIs { path } => ctx.cwd == path,
            Self::PathExists { path } => ctx.vfs.exists(path),
            Self::FileContains { path, text } => ctx
                .vfs
                .content(path)
                .is_some_and(|c| c.contains(text.as_str())),
            Self::And { all } => all.iter().all(|p| p.matches(ctx)),
            Self::Or { any } => any.iter().any(|p| p.matches(ctx)),
            Self::Not { rule } => !rule.matches(ctx),
            Self::Always => true,
        }
    }

    /// Reject rules that can never be evaluated (bad regexes, relative paths).
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::CommandMatches { pattern } => Regex::new(pattern)
                .map(|_| ())
                .map_err(|e| HackError::Config(format!("bad regex {pattern:?}: {e}"))),
            Self::CurrentDirectoryIs { path }
            | Self::PathExists { path }
            | Self::FileContains { path, .. } => {
                if path.starts_with('/') {
                    Ok(())
                } else {
                    Err(HackError::Config(format!("rule path {path:?} must be absolute")))
                }
            },
            Self::And { all: rules } | Self::Or { any: rules } => {
                rules.iter().try_for_each(Predicate::validate)
            },
            Self::Not { rule } => rule.validate(),
            _ => Ok(()),
        }
    }
}

/// Collapse runs of whitespace so `cd   ..` equals `cd ..`.
fn normalize(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vfs() -> VirtualFilesystem {
        let mut vfs = VirtualFilesystem::new();
        vfs.create_dir("/rapport").unwrap();
        vfs.create_file("/rapport/rapport.txt", "Mission accomplie")
            .unwrap();
        vfs
    }

    fn check(rule: &Predicate, command: &str, history: &[&str], cwd: &str) -> bool {
        let vfs = vfs();
        let history: Vec<String> = history.iter().map(|s| s.to_string()).collect();
        rule.matches(&EvalContext {
            command,
            history: &history,
            cwd,
            vfs: &vfs,
        })
    }

    fn value(v: &str) -> String {
        v.to_string()
    }

    #[test]
    fn command_rules() {
        let eq = Predicate::CommandEquals { value: value("cd ..") };
        assert!(check(&eq, "cd   ..", &[], "/"));
        assert!(!check(&eq, "cd ../x", &[], "/"));

        let sw = Predicate::CommandStartsWith { value: value("cat ") };
        assert!(check(&sw, "  cat readme", &[], "/"));
        assert!(!check(&sw, "concat", &[], "/"));

        let contains = Predicate::CommandContains { value: value("-name") };
        assert!(check(&contains, "find / -name \"*.log\"", &[], "/"));
    }

    #[test]
    fn regex_rule() {
        let re = Predicate::CommandMatches {
            pattern: value(r"^rm\s+(-rf?|--recursive)\b"),
        };
        assert!(check(&re, "rm -rf logs", &[], "/"));
        assert!(!check(&re, "rm logs", &[], "/"));
    }

    #[test]
    fn bad_regex_never_matches() {
        let re = Predicate::CommandMatches { pattern: value("(") };
        assert!(!check(&re, "(", &[], "/"));
        assert!(re.validate().is_err());
    }

    #[test]
    fn history_rules() {
        let hc = Predicate::HistoryContains { value: value("decrypt") };
        assert!(check(&hc, "ls", &["decrypt K f", "ls"], "/"));
        assert!(!check(&hc, "ls", &["ls"], "/"));

        let hi = Predicate::HistoryIncludes { command: value("hack mainframe") };
        assert!(check(&hi, "ls", &["hack  mainframe", "ls"], "/"));
        assert!(!check(&hi, "ls", &["hack mainframe now", "ls"], "/"));
    }

    #[test]
    fn state_rules() {
        let at_root = Predicate::CurrentDirectoryIs { path: value("/") };
        assert!(check(&at_root, "cd", &[], "/"));
        assert!(!check(&at_root, "cd rapport", &[], "/rapport"));

        let exists = Predicate::PathExists { path: value("/rapport/rapport.txt") };
        assert!(check(&exists, "ls", &[], "/"));

        let text = Predicate::FileContains {
            path: value("/rapport/rapport.txt"),
            text: value("accomplie"),
        };
        assert!(check(&text, "ls", &[], "/"));
        let missing = Predicate::FileContains {
            path: value("/nope.txt"),
            text: value(""),
        };
        assert!(!check(&missing, "ls", &[], "/"));
    }

    #[test]
    fn combinators() {
        let rule = Predicate::And {
            all: vec![
                Predicate::CommandStartsWith { value: value("cd") },
                Predicate::Not {
                    rule: Box::new(Predicate::CurrentDirectoryIs { path: value("/") }),
                },
            ],
        };
        assert!(check(&rule, "cd rapport", &[], "/rapport"));
        assert!(!check(&rule, "cd", &[], "/"));

        let either = Predicate::Or {
            any: vec![
                Predicate::CommandEquals { value: value("ls") },
                Predicate::CommandEquals { value: value("ls -a") },
            ],
        };
        assert!(check(&either, "ls -a", &[], "/"));
        assert!(!check(&Predicate::Or { any: vec![] }, "ls", &[], "/"));
        assert!(check(&Predicate::And { all: vec![] }, "ls", &[], "/"));
        assert!(check(&Predicate::Always, "", &[], "/"));
    }

    #[test]
    fn validate_requires_absolute_paths() {
        let rel = Predicate::Not {
            rule: Box::new(Predicate::PathExists { path: value("rapport") }),
        };
        assert!(matches!(rel.validate(), Err(HackError::Config(_))));
        assert!(Predicate::Always.validate().is_ok());
    }

    #[test]
    fn deserializes_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            objective: Vec<Objective>,
        }
        let w: Wrapper = toml::from_str(
            r#"
[[objective]]
id = "report"
description = "Write the report"
rule = { type = "file_contains", path = "/rapport/rapport.txt", text = "Mission" }

[[objective]]
id = "back"
description = "Return to root"

[objective.rule]
type = "and"
all = [
    { type = "command_starts_with", value = "cd" },
    { type = "current_directory_is", path = "/" },
]
"#,
        )
        .unwrap();
        assert_eq!(w.objective.len(), 2);
        assert_eq!(
            w.objective[0].rule,
            Predicate::FileContains {
                path: value("/rapport/rapport.txt"),
                text: value("Mission"),
            }
        );
        assert!(matches!(&w.objective[1].rule, Predicate::And { all } if all.len() == 2));
    }
}
