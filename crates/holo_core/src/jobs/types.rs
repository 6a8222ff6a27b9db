//! Job types: the request, its passthrough metadata, and the state vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lifecycle state of a job.
///
/// The order is fixed and shared by every pipeline, so the current value
/// doubles as a coarse progress indicator. There is no failure state: a
/// failed job keeps the last state recorded before the failing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStage {
    Started,
    FetchingInput,
    ReadingInput,
    Preprocessing,
    PerformingSegmentation,
    Postprocessing,
    DispatchingOutput,
    Finished,
}

impl JobStage {
    /// Every state in recording order.
    pub const ALL: [JobStage; 8] = [
        JobStage::Started,
        JobStage::FetchingInput,
        JobStage::ReadingInput,
        JobStage::Preprocessing,
        JobStage::PerformingSegmentation,
        JobStage::Postprocessing,
        JobStage::DispatchingOutput,
        JobStage::Finished,
    ];

    /// The states that open a unit of work (everything between
    /// `Started` and `Finished`).
    pub const WORKING: [JobStage; 6] = [
        JobStage::FetchingInput,
        JobStage::ReadingInput,
        JobStage::Preprocessing,
        JobStage::PerformingSegmentation,
        JobStage::Postprocessing,
        JobStage::DispatchingOutput,
    ];

    /// Canonical upper-snake name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Started => "STARTED",
            JobStage::FetchingInput => "FETCHING_INPUT",
            JobStage::ReadingInput => "READING_INPUT",
            JobStage::Preprocessing => "PREPROCESSING",
            JobStage::PerformingSegmentation => "PERFORMING_SEGMENTATION",
            JobStage::Postprocessing => "POSTPROCESSING",
            JobStage::DispatchingOutput => "DISPATCHING_OUTPUT",
            JobStage::Finished => "FINISHED",
        }
    }

    /// Position in the fixed order, starting at 0.
    pub fn ordinal(&self) -> usize {
        *self as usize
    }

    /// The following state, or `None` after `Finished`.
    pub fn next(&self) -> Option<JobStage> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }

    pub fn is_terminal(&self) -> bool {
        *self == JobStage::Finished
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown job state '{}'", s))
    }
}

/// Caller-supplied metadata forwarded untouched to dispatch.
///
/// The pipeline core never reads fields from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MedicalData(Map<String, Value>);

impl MedicalData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Parse from a JSON object string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl From<Map<String, Value>> for MedicalData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A single request to convert one imaging study into one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    /// URL or path of the source archive.
    pub input_endpoint: String,
    #[serde(default)]
    pub medical_data: MedicalData,
    pub plid: String,
}

impl Job {
    /// Create a job; `job_id` of `None` generates one.
    pub fn new(
        job_id: Option<String>,
        plid: impl Into<String>,
        input_endpoint: impl Into<String>,
        medical_data: MedicalData,
    ) -> Self {
        Self {
            job_id: job_id.unwrap_or_else(Self::generate_id),
            input_endpoint: input_endpoint.into(),
            medical_data,
            plid: plid.into(),
        }
    }

    /// New random job id.
    pub fn generate_id() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

/// One recorded transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub state: JobStage,
    /// RFC 3339 timestamp.
    pub at: String,
}

/// Everything the state store keeps for a job id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    pub job_id: String,
    /// Most recently recorded state.
    pub state: JobStage,
    pub updated_at: String,
    /// Every recorded transition, oldest first. Re-runs append.
    pub history: Vec<StateEntry>,
}

impl StateRecord {
    pub(crate) fn new(job_id: &str, state: JobStage) -> Self {
        let now = chrono::Local::now().to_rfc3339();
        Self {
            job_id: job_id.to_string(),
            state,
            updated_at: now.clone(),
            history: vec![StateEntry { state, at: now }],
        }
    }

    pub(crate) fn push(&mut self, state: JobStage) {
        let now = chrono::Local::now().to_rfc3339();
        self.state = state;
        self.updated_at = now.clone();
        self.history.push(StateEntry { state, at: now });
    }

    /// Transitions since the most recent `STARTED`.
    pub fn current_run(&self) -> Vec<JobStage> {
        let start = self
            .history
            .iter()
            .rposition(|e| e.state == JobStage::Started)
            .unwrap_or(0);
        self.history[start..].iter().map(|e| e.state).collect()
    }
}
