//! Audit trail of a verifier run
//!
//! Every line is kept in memory and, when an audit file is configured,
//! appended to it. Write failures are logged and otherwise ignored.

use chrono::Local;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct AuditLog {
    path: Option<PathBuf>,
    lines: Vec<String>,
}

impl AuditLog {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            lines: Vec::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Timestamped lines recorded so far
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Record `msg` as is
    pub fn audit(&mut self, msg: &str) {
        self.record(msg, false);
    }

    /// Record `msg` with a timestamp and echo it to the console
    pub fn banner(&mut self, msg: &str) {
        println!("{} {}", msg, Local::now().format("%Y-%m-%d %H:%M:%S"));
        self.record(msg, true);
    }

    fn record(&mut self, msg: &str, banner: bool) {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        self.lines.push(format!("{}\t{}", stamp, msg));
        info!(audit = %msg);

        let Some(path) = &self.path else {
            return;
        };
        let line = if banner {
            format!("{}\t{}", stamp, msg)
        } else {
            msg.to_string()
        };
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| writeln!(file, "{}", line));
        if let Err(e) = written {
            warn!(path = %path.display(), error = %e, "audit write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lines_go_to_memory_and_file() -> std::io::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("audit.txt");
        let mut log = AuditLog::new(Some(path.clone()));
        log.audit("AP File a not found.");
        log.banner("Error: boom");

        assert_eq!(log.lines().len(), 2);
        assert!(log.lines()[0].ends_with("\tAP File a not found."));

        let text = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "AP File a not found.");
        assert!(lines[1].ends_with("\tError: boom"));
        Ok(())
    }

    #[test]
    fn test_unwritable_file_is_ignored() {
        let mut log = AuditLog::new(Some(PathBuf::from("/no/such/dir/audit.txt")));
        log.audit("still recorded");
        assert_eq!(log.lines().len(), 1);
    }
}
