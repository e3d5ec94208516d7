//! Line handling for the interactive terminal.

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use hacksim_core::{ExecuteRequest, SessionManager};
use hacksim_types::error::HackError;

/// Whether the loop should keep reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

const ANSI_CLEAR: &str = "\x1b[2J\x1b[H";

const META_HELP: &str = "\
:progress           show objectives and hints
:mission <id>       switch to a challenge
:free               leave the current challenge
:reset              restore the challenge's initial files
:quit               exit";

/// Per-player REPL state.
pub struct Repl {
    manager: Arc<SessionManager>,
    user: String,
    challenge: Option<String>,
    cwd: String,
}

impl Repl {
    pub fn new(manager: Arc<SessionManager>, user: String, challenge: Option<String>) -> Self {
        Self {
            manager,
            user,
            challenge,
            cwd: "/".to_string(),
        }
    }

    pub fn prompt(&self) -> String {
        match &self.challenge {
            Some(c) => format!("{}@{c}:{}$ ", self.user, self.cwd),
            None => format!("{}@hacksim:{}$ ", self.user, self.cwd),
        }
    }

    /// Handle one input line, writing everything the player sees to `out`.
    pub fn handle(&mut self, line: &str, out: &mut impl Write) -> Result<Flow> {
        let line = line.trim();
        if let Some(meta) = line.strip_prefix(':') {
            return match self.meta(meta, out) {
                Err(e) => match e.downcast_ref::<HackError>() {
                    Some(err) => {
                        report(err, out)?;
                        Ok(Flow::Continue)
                    },
                    None => Err(e),
                },
                flow => flow,
            };
        }
        if line.is_empty() {
            return Ok(Flow::Continue);
        }

        let mut req = ExecuteRequest::new(&self.user, line).from_directory(&self.cwd);
        if let Some(c) = &self.challenge {
            req = req.in_challenge(c);
        }
        let resp = match self.manager.execute(req) {
            Ok(resp) => resp,
            Err(e) => {
                report(&e, out)?;
                return Ok(Flow::Continue);
            },
        };
        self.cwd = resp.result.new_directory.clone();

        if resp.result.cleared {
            write!(out, "{ANSI_CLEAR}")?;
        }
        if !resp.result.output.is_empty() {
            writeln!(out, "{}", resp.result.output)?;
        }
        if let Some(err) = &resp.result.error {
            writeln!(out, "error: {err}")?;
        }
        for id in &resp.objectives_completed {
            writeln!(out, "[+] Objective complete: {id}")?;
        }
        if resp.score_awarded > 0 {
            writeln!(out, "[+] Mission accomplished! +{} points", resp.score_awarded)?;
        } else if resp.all_objectives_completed && !resp.objectives_completed.is_empty() {
            writeln!(out, "[+] Mission accomplished again (no new points)")?;
        }
        Ok(Flow::Continue)
    }

    fn meta(&mut self, meta: &str, out: &mut impl Write) -> Result<Flow> {
        let mut parts = meta.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some("quit" | "q" | "exit"), _) => return Ok(Flow::Quit),
            (Some("progress"), _) => self.print_progress(out)?,
            (Some("mission"), Some(id)) => {
                self.manager.get_or_create(&self.user, Some(id))?;
                self.challenge = Some(id.to_string());
                self.cwd = "/".to_string();
                writeln!(out, "Switched to mission {id}")?;
            },
            (Some("free"), _) => {
                self.challenge = None;
                self.cwd = "/".to_string();
            },
            (Some("reset"), _) => match &self.challenge {
                Some(c) => {
                    self.manager.reset(&self.user, c)?;
                    self.cwd = "/".to_string();
                    writeln!(out, "Mission {c} reset")?;
                },
                None => writeln!(out, "No active mission")?,
            },
            _ => writeln!(out, "{META_HELP}")?,
        }
        Ok(Flow::Continue)
    }

    fn print_progress(&self, out: &mut impl Write) -> Result<()> {
        let Some(challenge) = &self.challenge else {
            writeln!(out, "No active mission")?;
            return Ok(());
        };
        let p = self.manager.progress(&self.user, challenge)?;
        writeln!(out, "{} ({} points)", p.title, p.points)?;
        for o in &p.objectives {
            let mark = if o.completed { "x" } else { " " };
            writeln!(out, "  [{mark}] {}", o.description)?;
        }
        if !p.hints.is_empty() {
            writeln!(out, "Hints:")?;
            for hint in &p.hints {
                writeln!(out, "  - {hint}")?;
            }
        }
        writeln!(out, "Score: {}", p.user_score)?;
        Ok(())
    }
}

/// Print an engine error. Store faults are transient: the manager drops the
/// cached session and the next line reloads persisted state.
fn report(err: &HackError, out: &mut impl Write) -> Result<()> {
    if err.is_user_error() {
        writeln!(out, "error: {err}")?;
    } else {
        log::warn!("Engine error: {err}");
        writeln!(out, "error: {err} (try again)")?;
    }
    Ok(())
}
