use crate::types::JobState;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DropError {
    #[error("could not process the dropped item (tried: {})", .tried.join(", "))]
    InvalidDropPayload { tried: Vec<String> },

    #[error("please select a .{expected} file (got {})", .path.display())]
    WrongInputType { path: PathBuf, expected: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocateError {
    #[error("{tool} not found in any of: {}", fmt_candidates(.candidates))]
    ToolNotFound {
        tool: String,
        candidates: Vec<PathBuf>,
    },
}

fn fmt_candidates(candidates: &[PathBuf]) -> String {
    candidates
        .iter()
        .map(|c| c.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Rejected(#[from] DropError),

    #[error("a conversion is already {state}; reset before dropping another file")]
    Busy { state: JobState },

    #[error("cannot reset while {state}")]
    ResetNotAllowed { state: JobState },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    ToolNotFound,
    LaunchError,
    MissingDependency,
    PermissionDenied,
    ToolNotOnPath,
    Unclassified,
}

impl FailureCategory {
    pub fn headline(self) -> &'static str {
        match self {
            FailureCategory::ToolNotFound => "Tool Not Found",
            FailureCategory::LaunchError => "Failed to Start",
            FailureCategory::MissingDependency => "Dependency Not Found",
            FailureCategory::PermissionDenied => "Permission Denied",
            FailureCategory::ToolNotOnPath => "Command Not Found",
            FailureCategory::Unclassified => "Conversion Failed",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            FailureCategory::ToolNotFound => {
                "The conversion tool is required but was not found in standard locations."
            }
            FailureCategory::LaunchError => "Could not start the conversion process.",
            FailureCategory::MissingDependency => {
                "A module the conversion tool needs is not installed."
            }
            FailureCategory::PermissionDenied => {
                "The app doesn't have permission to run the conversion process."
            }
            FailureCategory::ToolNotOnPath => {
                "The tool or one of its helpers could not be found. \
                 Please ensure they are installed."
            }
            FailureCategory::Unclassified => {
                "The conversion process encountered an error. See the output excerpt for details."
            }
        }
    }
}
