use chrono::Local;
use parking_lot::Mutex;
use std::io::Write;
use std::path::Path;
use tracing::warn;
use tracing_appender::rolling::{RollingFileAppender, Rotation};

/// Append-only record of every prompt sent and response returned.
///
/// Files rotate daily as `<dir>/llm_calls.<YYYY-MM-DD>.log`. The log is
/// best effort: if the directory cannot be created the gateway keeps working
/// with auditing disabled.
pub struct AuditLog {
    appender: Option<Mutex<RollingFileAppender>>,
}

impl AuditLog {
    pub fn new(dir: &Path) -> Self {
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("Cannot create LLM log directory {}: {}", dir.display(), e);
            return Self::disabled();
        }

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("llm_calls")
            .filename_suffix("log")
            .build(dir);

        match appender {
            Ok(appender) => Self {
                appender: Some(Mutex::new(appender)),
            },
            Err(e) => {
                warn!("Cannot open LLM log in {}: {}", dir.display(), e);
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self { appender: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.appender.is_some()
    }

    pub fn record_prompt(&self, prompt: &str) {
        self.write_entry("PROMPT", prompt);
    }

    pub fn record_response(&self, response: &str) {
        self.write_entry("RESPONSE", response);
    }

    fn write_entry(&self, kind: &str, text: &str) {
        let Some(appender) = &self.appender else {
            return;
        };
        // one record per line
        let line = format!(
            "{} - {}: {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            kind,
            text.replace('\\', "\\\\").replace('\n', "\\n")
        );
        let mut guard = appender.lock();
        if let Err(e) = guard.write_all(line.as_bytes()).and_then(|_| guard.flush()) {
            warn!("Failed to write LLM log entry: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_records_are_single_lines() {
        let dir = TempDir::new().unwrap();
        let log = AuditLog::new(dir.path());
        assert!(log.is_enabled());
        log.record_prompt("line one\nline two");
        log.record_response("ok");

        let entry = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        assert!(name.starts_with("llm_calls."));
        assert!(name.ends_with(".log"));

        let text = std::fs::read_to_string(entry.path()).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("PROMPT: line one\\nline two"));
        assert!(lines[1].contains("RESPONSE: ok"));
    }

    #[test]
    fn test_disabled_log_is_silent() {
        let log = AuditLog::disabled();
        log.record_prompt("ignored");
        assert!(!log.is_enabled());
    }
}
