use crate::{
    classify::excerpt,
    types::{ConversionJob, ConversionResult},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: String,
    pub tool: String,
    pub source: PathBuf,
    pub output_dir: PathBuf,
    pub tool_path: Option<PathBuf>,
    pub started: String,
    pub finished: Option<String>,
    pub exit_code: Option<i32>,
    pub result: ConversionResult,
    pub output_excerpt: String,
}

impl JobReport {
    pub fn new(
        tool: &str,
        job: &ConversionJob,
        result: &ConversionResult,
        excerpt_chars: usize,
    ) -> Self {
        Self {
            job_id: job.id.clone(),
            tool: tool.to_string(),
            source: job.source_path.clone(),
            output_dir: job.output_directory.clone(),
            tool_path: job.tool_path.clone(),
            started: job.started_at.clone(),
            finished: job.finished_at.clone(),
            exit_code: job.exit_code,
            result: result.clone(),
            output_excerpt: excerpt(&job.output_text(), excerpt_chars),
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            crate::util::ensure_dir(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing report: {}", path.display()))
    }
}
