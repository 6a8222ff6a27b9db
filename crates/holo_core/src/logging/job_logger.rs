//! Per-job log file.
//!
//! A job's log lives at `<logs>/<job_id>.log` and is opened in append mode,
//! so re-running a job id adds a new section below the earlier attempts.
//! External tool output goes into a bounded tail that is replayed into the
//! log when a stage fails.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LineCallback, LogConfig, LogLevel, MessagePrefix};
use crate::jobs::JobStage;

/// Logger owned by one pipeline run.
pub struct JobLogger {
    job_id: String,
    log_path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
    callback: Option<LineCallback>,
    config: LogConfig,
    /// Most recent tool output, newest last.
    tail: Mutex<VecDeque<String>>,
}

impl std::fmt::Debug for JobLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLogger")
            .field("job_id", &self.job_id)
            .field("log_path", &self.log_path)
            .finish_non_exhaustive()
    }
}

impl JobLogger {
    /// Open (or append to) the log for `job_id` in `log_dir`.
    pub fn new(
        job_id: impl Into<String>,
        log_dir: impl AsRef<Path>,
        config: LogConfig,
        callback: Option<LineCallback>,
    ) -> std::io::Result<Self> {
        let job_id = job_id.into();
        let log_dir = log_dir.as_ref();
        fs::create_dir_all(log_dir)?;

        check_log_name(&job_id)?;
        let log_path = log_dir.join(format!("{}.log", job_id));
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let logger = Self {
            tail: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            job_id,
            log_path,
            writer: Mutex::new(Some(BufWriter::new(file))),
            callback,
            config,
        };
        logger.output(&format!(
            "--- job {} opened {} ---",
            logger.job_id,
            Local::now().to_rfc3339()
        ));
        Ok(logger)
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Write `message` if `level` passes the configured minimum.
    pub fn log(&self, level: LogLevel, message: &str) {
        if level >= self.config.level {
            self.output(&self.stamp(message));
        }
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// An external command about to run.
    pub fn command(&self, command: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Command.format(command));
    }

    /// A recorded state transition, with its position in the fixed order.
    pub fn stage(&self, state: JobStage) {
        let marker = format!(
            "{} ({}/{})",
            state,
            state.ordinal() + 1,
            JobStage::ALL.len()
        );
        self.log(LogLevel::Info, &MessagePrefix::Stage.format(&marker));
    }

    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// One line of external tool output.
    ///
    /// Lines always enter the tail; the log only sees them when not compact.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        let line = if is_stderr {
            format!("[stderr] {}", line)
        } else {
            line.to_string()
        };

        if self.config.error_tail > 0 {
            let mut tail = self.tail.lock();
            while tail.len() >= self.config.error_tail {
                tail.pop_front();
            }
            tail.push_back(line.clone());
        }

        if !self.config.compact {
            self.output(&self.stamp(&line));
        }
    }

    /// Replay the tool output tail into the log, under `header`.
    pub fn show_tail(&self, header: &str) {
        let tail = self.tail.lock();
        if tail.is_empty() {
            return;
        }
        self.output(&self.stamp(&format!(
            "[{}] last {} line(s) of tool output:",
            header,
            tail.len()
        )));
        for line in tail.iter() {
            self.output(&format!("    {}", line));
        }
    }

    pub fn get_tail(&self) -> Vec<String> {
        self.tail.lock().iter().cloned().collect()
    }

    pub fn flush(&self) {
        if let Some(writer) = self.writer.lock().as_mut() {
            let _ = writer.flush();
        }
    }

    fn stamp(&self, message: &str) -> String {
        if self.config.show_timestamps {
            format!("[{}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message)
        } else {
            message.to_string()
        }
    }

    fn output(&self, line: &str) {
        if let Some(writer) = self.writer.lock().as_mut() {
            let _ = writeln!(writer, "{}", line);
        }
        if let Some(callback) = &self.callback {
            callback(line);
        }
    }
}

impl Drop for JobLogger {
    fn drop(&mut self) {
        self.flush();
    }
}

/// The job id is the file stem verbatim, so distinct ids never share a log.
/// Ids that would leave the log directory are refused.
fn check_log_name(job_id: &str) -> std::io::Result<()> {
    if job_id.is_empty() || job_id == "." || job_id == ".." || job_id.contains(['/', '\\', '\0'])
    {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("job id '{}' cannot name a log file", job_id),
        ));
    }
    Ok(())
}

/// Builder for loggers that need a callback or non-default config.
pub struct JobLoggerBuilder {
    job_id: String,
    log_dir: PathBuf,
    config: LogConfig,
    callback: Option<LineCallback>,
}

impl JobLoggerBuilder {
    pub fn new(job_id: impl Into<String>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            job_id: job_id.into(),
            log_dir: log_dir.into(),
            config: LogConfig::default(),
            callback: None,
        }
    }

    pub fn config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.config.level = level;
        self
    }

    /// Receive every line written to the log.
    pub fn callback(mut self, callback: LineCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn build(self) -> std::io::Result<JobLogger> {
        JobLogger::new(self.job_id, self.log_dir, self.config, self.callback)
    }
}
