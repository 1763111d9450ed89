use crate::{
    config::Config,
    util::{FileProbe, expand_tilde},
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactCheck {
    Found(PathBuf),
    Missing(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct OutputArtifactLocator {
    extension: String,
}

impl OutputArtifactLocator {
    pub fn new(extension: &str) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(&cfg.artifact.extension)
    }

    pub fn expected_path(&self, source: &Path, output_dir: &Path) -> PathBuf {
        let mut name = source
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_default();
        if !self.extension.is_empty() {
            name.push(".");
            name.push(&self.extension);
        }
        output_dir.join(name)
    }

    /// Polled once after a zero exit; nothing is watched or locked.
    pub fn check(&self, fs: &dyn FileProbe, source: &Path, output_dir: &Path) -> ArtifactCheck {
        let expected = self.expected_path(source, output_dir);
        info!("looking for output at {}", expected.display());
        if fs.exists(&expected) {
            ArtifactCheck::Found(expected)
        } else {
            ArtifactCheck::Missing(expected)
        }
    }
}

pub fn resolve_output_dir(setting: &str, source: &Path) -> PathBuf {
    let source_dir = || {
        source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    };

    match setting.trim() {
        "" | "source" => source_dir(),
        "desktop" => {
            if let Some(desktop) = directories::UserDirs::new()
                .and_then(|dirs| dirs.desktop_dir().map(Path::to_path_buf))
            {
                return desktop;
            }
            if let Some(base) = directories::BaseDirs::new() {
                return base.home_dir().join("Desktop");
            }
            warn!("no desktop directory; writing next to the source instead");
            source_dir()
        }
        other => {
            let p = expand_tilde(other);
            std::path::absolute(&p).unwrap_or(p)
        }
    }
}
