//! Logging for pipeline runs.
//!
//! Two layers:
//! - `tracing` for the process: state transitions and stage failures, with
//!   `job_id`/`plid` fields, filtered by `RUST_LOG`
//! - `JobLogger` for each job: a dedicated file under the logs folder, with
//!   external tool output held in a tail until a stage fails
//!
//! # Example
//!
//! ```no_run
//! use holo_core::jobs::JobStage;
//! use holo_core::logging::{JobLogger, LogConfig};
//!
//! let logger = JobLogger::new("job-42", "/var/log/holo", LogConfig::default(), None).unwrap();
//!
//! logger.stage(JobStage::FetchingInput);
//! logger.command("lungmask /tmp/in.nii /tmp/out");
//! logger.success("Job finished");
//! ```

mod job_logger;
mod types;

pub use job_logger::{JobLogger, JobLoggerBuilder};
pub use types::{LineCallback, LogConfig, LogLevel, MessagePrefix};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the process-wide subscriber on stderr.
///
/// `RUST_LOG` wins over `default_level`. Later calls are no-ops.
pub fn init_tracing(default_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_filter()));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}
