use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};
use which::which;

use crate::config::FtpSettings;
use crate::error::PipelineError;

/// Remote file tree the sequence report lives in.
#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// Every file below `root`, as paths relative to `root`, in listing order.
    async fn list_recursive(&self, root: &str) -> Result<Vec<String>, PipelineError>;

    /// Copies `remote_path` to exactly `local_path`.
    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), PipelineError>;
}

/// Joins a listed directory and a file name with exactly one separator.
pub fn join_remote(dir: &str, file: &str) -> String {
    let file = file.trim_start_matches('/');
    if dir.is_empty() {
        return file.to_string();
    }
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        // dir was only slashes
        return format!("/{}", file);
    }
    if file.is_empty() {
        return dir.to_string();
    }
    format!("{}/{}", dir, file)
}

#[derive(Debug, PartialEq, Eq)]
struct ListEntry {
    name: String,
    is_dir: bool,
}

/// Parses one line of a `LIST` reply, e.g.
/// `drwxr-xr-x   2 ftp  ftp   4096 Jan 01  2020 GCA_000`.
fn parse_list_line(line: &str) -> Option<ListEntry> {
    let mut fields = line.split_whitespace();
    let perms = fields.next()?;
    // links, owner, group, size, month, day, time-or-year
    for _ in 0..7 {
        fields.next()?;
    }
    let name = fields.collect::<Vec<_>>().join(" ");
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    match perms.chars().next()? {
        'd' => Some(ListEntry { name, is_dir: true }),
        '-' => Some(ListEntry { name, is_dir: false }),
        // symlinks and anything exotic are not followed
        _ => None,
    }
}

/// FTP access through the system `curl` binary.
pub struct CurlFtp {
    curl: PathBuf,
    settings: FtpSettings,
}

impl CurlFtp {
    pub fn new(settings: FtpSettings) -> Result<Self, PipelineError> {
        info!("🔍 Checking for 'curl' dependency...");
        let curl = which("curl").map_err(|_| {
            PipelineError::Transport(
                "'curl' is not found in your system PATH; it is required for FTP transfers".into(),
            )
        })?;
        info!("  ✓ curl: {}", curl.display());
        Ok(Self { curl, settings })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "ftp://{}:{}/{}",
            self.settings.host,
            self.settings.port,
            path.trim_start_matches('/')
        )
    }

    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.curl);
        cmd.arg("--silent")
            .arg("--show-error")
            .arg("--fail")
            .arg("--max-time")
            .arg(self.settings.timeout_secs.to_string())
            .arg("--user")
            .arg(format!("{}:{}", self.settings.username, self.settings.password))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, what: &str) -> Result<Vec<u8>, PipelineError> {
        // curl enforces --max-time; this is the backstop if curl itself hangs
        let deadline = self.settings.timeout() + Duration::from_secs(5);
        let output = tokio::time::timeout(deadline, cmd.output())
            .await
            .map_err(|_| PipelineError::Transport(format!("{} timed out", what)))?
            .map_err(|e| PipelineError::Transport(format!("{}: {}", what, e)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Transport(format!(
                "{} failed ({}): {}",
                what,
                output.status,
                stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    async fn list_dir(&self, dir: &str) -> Result<Vec<ListEntry>, PipelineError> {
        let mut cmd = self.base_command();
        // trailing slash makes curl send LIST instead of RETR
        cmd.arg(format!("{}/", self.url(dir).trim_end_matches('/')));
        let stdout = self.run(cmd, &format!("listing {}", dir)).await?;
        Ok(String::from_utf8_lossy(&stdout)
            .lines()
            .filter_map(parse_list_line)
            .collect())
    }
}

#[async_trait]
impl RemoteDirectory for CurlFtp {
    async fn list_recursive(&self, root: &str) -> Result<Vec<String>, PipelineError> {
        let mut files = Vec::new();
        let mut pending = VecDeque::from([String::new()]);
        while let Some(relative) = pending.pop_front() {
            let absolute = join_remote(root, &relative);
            debug!("listing {}", absolute);
            for entry in self.list_dir(&absolute).await? {
                let path = join_remote(&relative, &entry.name);
                if entry.is_dir {
                    pending.push_back(path);
                } else {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    async fn download(&self, remote_path: &str, local_path: &Path) -> Result<(), PipelineError> {
        let mut cmd = self.base_command();
        cmd.arg("--output").arg(local_path).arg(self.url(remote_path));
        self.run(cmd, &format!("download of {}", remote_path)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_remote_handles_odd_directories() {
        let file = "GCA_000001215.2_sequence_report.txt";
        assert_eq!(
            join_remote("/pub/databases/ena/assembly/GCA_000/GCA_000001/", file),
            "/pub/databases/ena/assembly/GCA_000/GCA_000001/GCA_000001215.2_sequence_report.txt"
        );
        assert_eq!(
            join_remote("pub/databases/ena/assembly/GCA_000/GCA_000001", file),
            "pub/databases/ena/assembly/GCA_000/GCA_000001/GCA_000001215.2_sequence_report.txt"
        );
        assert_eq!(join_remote("", file), file);
        assert_eq!(join_remote("////////////", file), format!("/{}", file));
        assert_eq!(join_remote("apath", file), format!("apath/{}", file));
        assert_eq!(join_remote(" ", file), format!(" /{}", file));
    }

    #[test]
    fn join_remote_handles_odd_file_names() {
        let dir = "pub/databases/ena/assembly/GCA_000/GCA_000001/";
        assert_eq!(join_remote(dir, ""), "pub/databases/ena/assembly/GCA_000/GCA_000001");
        assert_eq!(
            join_remote(dir, "a file name"),
            "pub/databases/ena/assembly/GCA_000/GCA_000001/a file name"
        );
        assert_eq!(
            join_remote(dir, "/.filename"),
            "pub/databases/ena/assembly/GCA_000/GCA_000001/.filename"
        );
    }

    #[test]
    fn parses_list_lines() {
        assert_eq!(
            parse_list_line("drwxr-xr-x    2 ftp      ftp          4096 Jan 01  2020 GCA_000"),
            Some(ListEntry { name: "GCA_000".into(), is_dir: true })
        );
        assert_eq!(
            parse_list_line(
                "-rw-r--r--    1 ftp      ftp         19523 Mar 13 10:42 GCA_000001405.15_sequence_report.txt"
            ),
            Some(ListEntry {
                name: "GCA_000001405.15_sequence_report.txt".into(),
                is_dir: false
            })
        );
        assert_eq!(
            parse_list_line("-rw-r--r--    1 ftp ftp 1 Mar 13 10:42 with space.txt"),
            Some(ListEntry { name: "with space.txt".into(), is_dir: false })
        );
        assert_eq!(parse_list_line("lrwxrwxrwx 1 ftp ftp 7 Jan 01 2020 link -> x"), None);
        assert_eq!(parse_list_line("drwxr-xr-x 2 ftp ftp 4096 Jan 01 2020 .."), None);
        assert_eq!(parse_list_line("total 12"), None);
        assert_eq!(parse_list_line(""), None);
    }
}
