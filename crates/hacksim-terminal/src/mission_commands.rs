//! Mission flavor commands: decrypt, download, hack, exploit.
//!
//! None of these touch the file system. They only check their arguments
//! against the configured mission values and print flavor text, so that
//! objective rules can recognize them in the command history.

use hacksim_types::error::{HackError, Result};
use hacksim_vfs::path;

use crate::commands::require_file;
use crate::interpreter::{Command, CommandOutput, CommandRegistry, Environment};

/// Register mission commands.
pub fn register_mission_commands(reg: &mut CommandRegistry) {
    reg.register(Box::new(DecryptCmd));
    reg.register(Box::new(DownloadCmd));
    reg.register(Box::new(HackCmd));
    reg.register(Box::new(ExploitCmd));
}

fn is_known_target(env: &Environment<'_>, target: &str) -> bool {
    env.config.hack_targets.iter().any(|t| t == target)
}

// ---------------------------------------------------------------------------
// decrypt
// ---------------------------------------------------------------------------

struct DecryptCmd;
impl Command for DecryptCmd {
    fn name(&self) -> &str {
        "decrypt"
    }
    fn description(&self) -> &str {
        "Decrypt an intercepted file with a key"
    }
    fn usage(&self) -> &str {
        "decrypt <key> <file>"
    }
    fn category(&self) -> &str {
        "mission"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let (Some(&key), Some(&token)) = (args.first(), args.get(1)) else {
            return Err(HackError::InvalidArgument(
                "usage: decrypt <key> <file>".to_string(),
            ));
        };
        let file = path::resolve(token, &env.cwd);
        require_file(env, &file)?;
        if key != env.config.decrypt_key {
            return Err(HackError::InvalidArgument("decryption key rejected".to_string()));
        }
        Ok(CommandOutput::Text(format!(
            "[*] Applying key to {file}...\n[+] Decryption successful. Payload recovered."
        )))
    }
}

// ---------------------------------------------------------------------------
// download
// ---------------------------------------------------------------------------

struct DownloadCmd;
impl Command for DownloadCmd {
    fn name(&self) -> &str {
        "download"
    }
    fn description(&self) -> &str {
        "Exfiltrate a file from the target"
    }
    fn usage(&self) -> &str {
        "download <file> [size-kb]"
    }
    fn category(&self) -> &str {
        "mission"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let Some(&token) = args.first() else {
            return Err(HackError::InvalidArgument(
                "usage: download <file> [size-kb]".to_string(),
            ));
        };
        let file = path::resolve(token, &env.cwd);
        require_file(env, &file)?;
        let size_kb = match args.get(1) {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                HackError::InvalidArgument(format!("download: invalid size {raw}"))
            })?,
            None => env.vfs.content(&file).map_or(0, |c| c.len() as u64).div_ceil(1024),
        };
        Ok(CommandOutput::Text(format!(
            "[*] Opening covert channel...\n[*] Transferring {} ({size_kb} KB)\n[+] Download complete.",
            path::file_name(&file)
        )))
    }
}

// ---------------------------------------------------------------------------
// hack
// ---------------------------------------------------------------------------

struct HackCmd;
impl Command for HackCmd {
    fn name(&self) -> &str {
        "hack"
    }
    fn description(&self) -> &str {
        "Launch an intrusion against a target"
    }
    fn usage(&self) -> &str {
        "hack <target>"
    }
    fn category(&self) -> &str {
        "mission"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let Some(&target) = args.first() else {
            return Err(HackError::InvalidArgument("usage: hack <target>".to_string()));
        };
        if !is_known_target(env, target) {
            return Err(HackError::NotFound(format!("target unreachable: {target}")));
        }
        Ok(CommandOutput::Text(format!(
            "[*] Scanning {target}...\n[*] Bypassing authentication...\n[+] Access granted to {target}."
        )))
    }
}

// ---------------------------------------------------------------------------
// exploit
// ---------------------------------------------------------------------------

struct ExploitCmd;
impl Command for ExploitCmd {
    fn name(&self) -> &str {
        "exploit"
    }
    fn description(&self) -> &str {
        "Run a known CVE exploit against a target"
    }
    fn usage(&self) -> &str {
        "exploit <cve> <target>"
    }
    fn category(&self) -> &str {
        "mission"
    }
    fn execute(&self, args: &[&str], env: &mut Environment<'_>) -> Result<CommandOutput> {
        let (Some(&cve), Some(&target)) = (args.first(), args.get(1)) else {
            return Err(HackError::InvalidArgument(
                "usage: exploit <cve> <target>".to_string(),
            ));
        };
        let Some(known) = env
            .config
            .known_exploits
            .iter()
            .find(|k| k.eq_ignore_ascii_case(cve))
        else {
            return Err(HackError::InvalidArgument(format!("unknown exploit: {cve}")));
        };
        if !is_known_target(env, target) {
            return Err(HackError::NotFound(format!("target unreachable: {target}")));
        }
        Ok(CommandOutput::Text(format!(
            "[*] Loading {known} payload...\n[*] Delivering to {target}...\n[+] Exploit succeeded. Shell opened on {target}."
        )))
    }
}
