use crate::error::FailureCategory;
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressTick {
    #[serde(deserialize_with = "percent")]
    pub percent: u8,
    pub label: String,
}

impl ProgressTick {
    pub fn new(percent: u8, label: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            label: label.into(),
        }
    }
}

fn percent<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
    let value = u8::deserialize(d)?;
    if value > 100 {
        return Err(D::Error::custom(format!("percent {value} is above 100")));
    }
    Ok(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Succeeded,
    PartialSuccess,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Validating,
    ToolLocating,
    Launching,
    Running,
    Terminated,
    Resolved(Resolution),
}

impl JobState {
    pub fn rank(self) -> u8 {
        match self {
            JobState::Idle => 0,
            JobState::Validating => 1,
            JobState::ToolLocating => 2,
            JobState::Launching => 3,
            JobState::Running => 4,
            JobState::Terminated => 5,
            JobState::Resolved(_) => 6,
        }
    }

    pub fn is_resolved(self) -> bool {
        matches!(self, JobState::Resolved(_))
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Idle => write!(f, "idle"),
            JobState::Validating => write!(f, "validating"),
            JobState::ToolLocating => write!(f, "locating tool"),
            JobState::Launching => write!(f, "launching"),
            JobState::Running => write!(f, "running"),
            JobState::Terminated => write!(f, "terminated"),
            JobState::Resolved(Resolution::Succeeded) => write!(f, "resolved (succeeded)"),
            JobState::Resolved(Resolution::PartialSuccess) => {
                write!(f, "resolved (partial success)")
            }
            JobState::Resolved(Resolution::Failed) => write!(f, "resolved (failed)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConversionJob {
    pub id: String,
    pub source_path: PathBuf,
    pub output_directory: PathBuf,
    pub tool_path: Option<PathBuf>,
    pub started_at: String,
    pub finished_at: Option<String>,
    /// Frozen once the tool has terminated.
    pub captured_output: Vec<u8>,
    pub exit_code: Option<i32>,
}

impl ConversionJob {
    pub fn source_name(&self) -> String {
        self.source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source_path.display().to_string())
    }

    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.captured_output).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConversionResult {
    Succeeded {
        output_path: PathBuf,
    },
    PartialSuccess {
        reason: String,
        expected_path: PathBuf,
    },
    Failed {
        category: FailureCategory,
        excerpt: String,
    },
}

impl ConversionResult {
    pub fn resolution(&self) -> Resolution {
        match self {
            ConversionResult::Succeeded { .. } => Resolution::Succeeded,
            ConversionResult::PartialSuccess { .. } => Resolution::PartialSuccess,
            ConversionResult::Failed { .. } => Resolution::Failed,
        }
    }

    pub fn headline(&self) -> String {
        match self {
            ConversionResult::Succeeded { .. } => "Conversion Successful!".to_string(),
            ConversionResult::PartialSuccess { .. } => "Conversion Completed".to_string(),
            ConversionResult::Failed { category, .. } => category.headline().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    JobStarted { job_id: String, source_name: String },
    Progress { percent: u8, label: String },
    Resolved { result: ConversionResult },
    Rejected { reason: String },
}
