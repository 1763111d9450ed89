use crate::{
    error::FailureCategory,
    types::{ConversionResult, ProgressTick},
    util::expand_tilde,
};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Package a Python script into a one-file executable with PyInstaller.
    Pyinstaller,
    /// Wrap an application bundle into a disk image with app2dmg.
    App2dmg,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub input: Input,
    #[serde(default)]
    pub tool: Tool,
    #[serde(default)]
    pub artifact: Artifact,
    #[serde(default)]
    pub progress: Progress,
    #[serde(default)]
    pub classifier: Classifier,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        cfg.validate().with_context(|| format!("invalid config: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let progress = &self.progress;
        let Some(last) = progress.schedule.last() else {
            bail!("progress.schedule is empty");
        };
        let mut prev = if progress.start_label.is_empty() {
            0
        } else {
            progress.start_percent
        };
        if prev > 100 {
            bail!("progress.start_percent {prev} is above 100");
        }
        for tick in &progress.schedule {
            if tick.percent > 100 {
                bail!("progress tick {:?} is above 100%", tick.label);
            }
            if tick.percent < prev {
                bail!(
                    "progress tick {:?} goes back from {prev}% to {}%",
                    tick.label,
                    tick.percent
                );
            }
            prev = tick.percent;
        }
        if last.percent != 100 {
            bail!("progress.schedule must end at 100%, ends at {}%", last.percent);
        }
        Ok(())
    }

    pub fn preset(profile: Profile) -> Self {
        match profile {
            Profile::Pyinstaller => Self::default(),
            Profile::App2dmg => Self {
                paths: Paths {
                    output_dir: "source".into(),
                    ..Default::default()
                },
                input: Input {
                    extension: "app".into(),
                    ..Default::default()
                },
                tool: Tool::app2dmg(),
                classifier: Classifier {
                    rules: app2dmg_rules(),
                    ..Default::default()
                },
                artifact: Artifact {
                    extension: "dmg".into(),
                },
                progress: Progress {
                    schedule: app2dmg_schedule(),
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    pub fn tool_candidates(&self) -> Vec<PathBuf> {
        self.tool.candidates.iter().map(|c| expand_tilde(c)).collect()
    }

    pub fn failure_headline(&self, category: FailureCategory) -> String {
        if category == FailureCategory::ToolNotFound && !self.tool.not_found_headline.is_empty() {
            return self.tool.not_found_headline.clone();
        }
        self.classifier
            .rules
            .iter()
            .find(|r| r.category == category && !r.headline.is_empty())
            .map(|r| r.headline.clone())
            .unwrap_or_else(|| category.headline().to_string())
    }

    pub fn failure_hint(&self, category: FailureCategory) -> String {
        if category == FailureCategory::ToolNotFound && !self.tool.not_found_hint.is_empty() {
            return self.tool.not_found_hint.clone();
        }
        self.classifier
            .rules
            .iter()
            .find(|r| r.category == category && !r.hint.is_empty())
            .map(|r| r.hint.clone())
            .unwrap_or_else(|| category.hint().to_string())
    }

    pub fn headline(&self, result: &ConversionResult) -> String {
        match result {
            ConversionResult::Failed { category, .. } => self.failure_headline(*category),
            other => other.headline(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// `desktop`, `source` (the dropped file's folder) or a literal path.
    pub output_dir: String,
    pub report_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            output_dir: "desktop".into(),
            report_dir: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Input {
    pub extension: String,
}
impl Default for Input {
    fn default() -> Self {
        Self {
            extension: "py".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tool {
    pub name: String,
    pub candidates: Vec<String>,
    /// Argument template; `{source}` and `{output_dir}` are substituted.
    pub args: Vec<String>,
    pub path_override: Vec<String>,
    pub cleared_env: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub not_found_headline: String,
    pub not_found_hint: String,
}
impl Default for Tool {
    fn default() -> Self {
        Self {
            name: "PyInstaller".into(),
            candidates: vec![
                "/usr/local/bin/python3".into(),
                "/opt/homebrew/bin/python3".into(),
                "/usr/bin/python3".into(),
                "/Library/Frameworks/Python.framework/Versions/3.13/bin/python3".into(),
                "/Library/Frameworks/Python.framework/Versions/3.12/bin/python3".into(),
                "/Library/Frameworks/Python.framework/Versions/3.11/bin/python3".into(),
            ],
            args: vec![
                "-m".into(),
                "PyInstaller".into(),
                "--onefile".into(),
                "--distpath".into(),
                "{output_dir}".into(),
                "--clean".into(),
                "--noconfirm".into(),
                "{source}".into(),
            ],
            path_override: default_path_override(),
            cleared_env: vec!["PYTHONPATH".into()],
            env: Default::default(),
            not_found_headline: "Python Not Found".into(),
            not_found_hint: "Python 3 is required but not found in standard locations.".into(),
        }
    }
}

impl Tool {
    fn app2dmg() -> Self {
        Self {
            name: "app2dmg".into(),
            candidates: vec![
                "/usr/local/bin/app2dmg".into(),
                "/opt/homebrew/bin/app2dmg".into(),
                "~/Desktop/App2DMG/app2dmg".into(),
            ],
            args: vec!["{source}".into()],
            path_override: default_path_override(),
            cleared_env: vec![],
            env: Default::default(),
            not_found_headline: "app2dmg Not Found".into(),
            not_found_hint: "app2dmg is required but not found in standard locations.".into(),
        }
    }
}

fn default_path_override() -> Vec<String> {
    vec![
        "/usr/local/bin".into(),
        "/opt/homebrew/bin".into(),
        "/usr/bin".into(),
        "/bin".into(),
    ]
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Artifact {
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Progress {
    pub initial_delay_ms: u64,
    pub tick_interval_ms: u64,
    pub grace_delay_ms: u64,
    /// Shown as soon as the tool is running; an empty label disables it.
    pub start_percent: u8,
    pub start_label: String,
    pub finishing_label: String,
    pub schedule: Vec<ProgressTick>,
}
impl Default for Progress {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            tick_interval_ms: 800,
            grace_delay_ms: 1000,
            start_percent: 10,
            start_label: "Initializing conversion process...".into(),
            finishing_label: "Finishing conversion...".into(),
            schedule: vec![
                ProgressTick::new(10, "Checking Python environment..."),
                ProgressTick::new(20, "Analyzing script dependencies..."),
                ProgressTick::new(35, "Setting up PyInstaller configuration..."),
                ProgressTick::new(50, "Collecting Python modules..."),
                ProgressTick::new(65, "Building executable structure..."),
                ProgressTick::new(80, "Optimizing executable size..."),
                ProgressTick::new(95, "Finalizing executable..."),
                ProgressTick::new(100, "Conversion complete!"),
            ],
        }
    }
}

fn app2dmg_schedule() -> Vec<ProgressTick> {
    vec![
        ProgressTick::new(10, "Inspecting application bundle..."),
        ProgressTick::new(25, "Preparing disk image layout..."),
        ProgressTick::new(40, "Copying application contents..."),
        ProgressTick::new(60, "Creating disk image..."),
        ProgressTick::new(75, "Compressing disk image..."),
        ProgressTick::new(90, "Finalizing disk image..."),
        ProgressTick::new(100, "Conversion complete!"),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierRule {
    pub marker: String,
    pub category: FailureCategory,
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub hint: String,
}

impl ClassifierRule {
    pub fn new(marker: &str, category: FailureCategory) -> Self {
        Self {
            marker: marker.into(),
            category,
            headline: String::new(),
            hint: String::new(),
        }
    }

    pub fn with_text(mut self, headline: &str, hint: &str) -> Self {
        self.headline = headline.into();
        self.hint = hint.into();
        self
    }
}

fn app2dmg_rules() -> Vec<ClassifierRule> {
    vec![
        ClassifierRule::new("Permission denied", FailureCategory::PermissionDenied),
        ClassifierRule::new("command not found", FailureCategory::ToolNotOnPath).with_text(
            "Command Not Found",
            "app2dmg or hdiutil could not be found. Please ensure they are installed.",
        ),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Classifier {
    pub excerpt_chars: usize,
    pub strip_ansi: bool,
    /// Checked in order; first marker found in the captured output wins.
    pub rules: Vec<ClassifierRule>,
}
impl Default for Classifier {
    fn default() -> Self {
        Self {
            excerpt_chars: 500,
            strip_ansi: true,
            rules: vec![
                ClassifierRule::new(
                    "No module named 'PyInstaller'",
                    FailureCategory::MissingDependency,
                )
                .with_text(
                    "PyInstaller Not Found",
                    "Please install PyInstaller using: pip install pyinstaller",
                ),
                ClassifierRule::new("Permission denied", FailureCategory::PermissionDenied),
                ClassifierRule::new("command not found", FailureCategory::ToolNotOnPath)
                    .with_text(
                        "Command Not Found",
                        "Python or PyInstaller could not be found. \
                         Please ensure they are installed.",
                    ),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: false,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub log_full_output: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            log_full_output: true,
        }
    }
}
