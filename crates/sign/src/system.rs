use crate::SigningToolchain;
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::instrument;

const FTPARCHIVE: &str = "apt-ftparchive";
const GPG: &str = "gpg";

/// The `apt-ftparchive` and `gpg` executables found on this system.
///
/// Both tools are resolved once, up front, so a missing tool fails the run
/// before any network traffic happens.
#[derive(Debug, Clone)]
pub struct SystemToolchain {
    ftparchive: PathBuf,
    gpg: PathBuf,
    key_name: Option<String>,
}
impl SystemToolchain {
    /// Locates both tools in `PATH`. Without a `key_name`, `gpg` signs with
    /// its default key.
    pub fn discover(key_name: Option<String>) -> Result<Self> {
        let ftparchive = which::which(FTPARCHIVE).or_raise(|| ErrorKind::ToolNotFound(FTPARCHIVE))?;
        let gpg = which::which(GPG).or_raise(|| ErrorKind::ToolNotFound(GPG))?;
        tracing::debug!(ftparchive = %ftparchive.display(), gpg = %gpg.display(), "Discovered signing toolchain");
        if key_name.is_none() {
            tracing::warn!("No GPG key name configured; gpg will use its default key");
        }
        Ok(Self { ftparchive, gpg, key_name })
    }

    fn gpg(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.gpg);
        command.args(["--batch", "--yes"]);
        if let Some(key) = &self.key_name {
            command.args(["--local-user", key]);
        }
        command.args(args);
        command
    }
}

impl SigningToolchain for SystemToolchain {
    /// Materializes the index files in a scratch directory laid out like the
    /// component directory, then asks `apt-ftparchive` for the digest block.
    fn digest(&self, files: &[(PathBuf, Vec<u8>)]) -> Result<Vec<u8>> {
        let scratch = tempfile::tempdir().or_raise(|| ErrorKind::Io)?;
        for (relative, contents) in files {
            let path = scratch.path().join(relative);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).or_raise(|| ErrorKind::Io)?;
            }
            std::fs::write(&path, contents).or_raise(|| ErrorKind::Io)?;
        }
        let mut command = Command::new(&self.ftparchive);
        command.args(["release", "."]).current_dir(scratch.path());
        run(FTPARCHIVE, command, None)
    }

    fn detach_sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        run(GPG, self.gpg(&["--armor", "--detach-sign", "--output", "-"]), Some(data))
    }

    fn clear_sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        run(GPG, self.gpg(&["--clearsign", "--output", "-"]), Some(data))
    }

    fn export_public_key(&self) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.gpg);
        command.args(["--batch", "--armor", "--export"]);
        if let Some(key) = &self.key_name {
            command.arg(key);
        }
        run(GPG, command, None)
    }
}

/// Runs a tool to completion and returns its standard output.
///
/// Standard input is fed from a separate thread so a tool that writes before
/// it has read everything cannot deadlock against us.
#[instrument(level = "debug", skip(command, input), fields(program = %Path::new(command.get_program()).display()))]
fn run(tool: &'static str, mut command: Command, input: Option<&[u8]>) -> Result<Vec<u8>> {
    command
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn().or_raise(|| ErrorKind::Io)?;
    let stdin = child.stdin.take();
    let output = std::thread::scope(|scope| {
        if let (Some(input), Some(mut stdin)) = (input, stdin) {
            // A tool that exits early closes the pipe; its exit status is what gets reported.
            scope.spawn(move || stdin.write_all(input));
        }
        child.wait_with_output()
    })
    .or_raise(|| ErrorKind::Io)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::warn!(tool, stderr = %stderr.trim(), "Signing tool failed");
        exn::bail!(ErrorKind::ToolFailed { tool, code: output.status.code() });
    }
    if output.stdout.is_empty() {
        exn::bail!(ErrorKind::EmptyOutput(tool));
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_stdout() {
        let Ok(cat) = which::which("cat") else { return };
        let output = run("cat", Command::new(cat), Some(b"Origin: jewel\n")).unwrap();
        assert_eq!(output, b"Origin: jewel\n");
    }

    #[test]
    fn test_run_reports_exit_code() {
        let Ok(sh) = which::which("sh") else { return };
        let mut command = Command::new(sh);
        command.args(["-c", "echo nope >&2; exit 3"]);
        let err = run("sh", command, None).unwrap_err();
        assert!(matches!(&*err, ErrorKind::ToolFailed { tool: "sh", code: Some(3) }));
    }

    #[test]
    fn test_run_rejects_empty_output() {
        let Ok(truth) = which::which("true") else { return };
        let err = run("true", Command::new(truth), None).unwrap_err();
        assert!(matches!(&*err, ErrorKind::EmptyOutput("true")));
    }

    #[test]
    fn test_gpg_arguments() {
        let toolchain = SystemToolchain {
            ftparchive: PathBuf::from("/usr/bin/apt-ftparchive"),
            gpg: PathBuf::from("/usr/bin/gpg"),
            key_name: Some("desktop@example.com".to_string()),
        };
        let command = toolchain.gpg(&["--clearsign"]);
        let args: Vec<_> = command.get_args().filter_map(|arg| arg.to_str()).collect();
        assert_eq!(args, ["--batch", "--yes", "--local-user", "desktop@example.com", "--clearsign"]);
    }
}
