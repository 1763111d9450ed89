use crate::{config::Config, error::LocateError, util::FileProbe};
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ToolLocator {
    tool: String,
    candidates: Vec<PathBuf>,
}

impl ToolLocator {
    pub fn new(tool: impl Into<String>, candidates: Vec<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            candidates,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.tool.name.clone(), cfg.tool_candidates())
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    pub fn locate(&self, fs: &dyn FileProbe) -> Result<PathBuf, LocateError> {
        for candidate in &self.candidates {
            if fs.exists(candidate) {
                debug!("{} found at {}", self.tool, candidate.display());
                return Ok(candidate.clone());
            }
            debug!("{} not at {}", self.tool, candidate.display());
        }
        Err(LocateError::ToolNotFound {
            tool: self.tool.clone(),
            candidates: self.candidates.clone(),
        })
    }
}
