use crate::{
    artifact::{ArtifactCheck, OutputArtifactLocator, resolve_output_dir},
    classify::{Classifier, SubstringClassifier},
    config::Config,
    drop::{DropPayload, DropResolver},
    error::{FailureCategory, RunnerError},
    launch::{Invocation, Launcher, ProcessLauncher, Termination},
    progress::ProgressAnnouncer,
    tool::ToolLocator,
    types::{ConversionJob, ConversionResult, Event, JobState, ProgressTick},
    util::{FileProbe, RealFs, now_rfc3339, sha256_hex},
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

enum Signal {
    Tick(ProgressTick),
    Exited(Termination),
}

pub struct ConversionRunner {
    cfg: Config,
    fs: Arc<dyn FileProbe>,
    launcher: Arc<dyn Launcher>,
    classifier: Arc<dyn Classifier>,
    events: mpsc::UnboundedSender<Event>,
    state: JobState,
    job: Option<ConversionJob>,
    progress: u8,
    result: Option<ConversionResult>,
}

impl ConversionRunner {
    pub fn new(cfg: &Config, events: mpsc::UnboundedSender<Event>) -> Self {
        Self {
            cfg: cfg.clone(),
            fs: Arc::new(RealFs),
            launcher: Arc::new(ProcessLauncher),
            classifier: Arc::new(SubstringClassifier::from_config(cfg)),
            events,
            state: JobState::Idle,
            job: None,
            progress: 0,
            result: None,
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileProbe>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn job(&self) -> Option<&ConversionJob> {
        self.job.as_ref()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn result(&self) -> Option<&ConversionResult> {
        self.result.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// A drop while a previous result awaits `reset` is refused.
    pub async fn handle_drop<P: DropPayload>(
        &mut self,
        payload: &P,
    ) -> Result<ConversionResult, RunnerError> {
        if self.state != JobState::Idle {
            let err = RunnerError::Busy { state: self.state };
            self.emit(Event::Rejected {
                reason: err.to_string(),
            });
            return Err(err);
        }

        let resolver = DropResolver::new(&self.cfg.input.extension, self.fs.clone());
        let source = match resolver.resolve(payload).await {
            Ok(path) => path,
            Err(err) => {
                warn!("drop rejected: {err}");
                self.emit(Event::Rejected {
                    reason: err.to_string(),
                });
                return Err(err.into());
            }
        };

        self.transition(JobState::Validating);
        let job = self.start_job(source);
        info!(
            "job {} converting {} into {}",
            job.id,
            job.source_path.display(),
            job.output_directory.display()
        );
        self.emit(Event::JobStarted {
            job_id: job.id.clone(),
            source_name: job.source_name(),
        });
        let source = job.source_path.clone();
        let output_dir = job.output_directory.clone();
        self.job = Some(job);

        self.transition(JobState::ToolLocating);
        let tool_path = match ToolLocator::from_config(&self.cfg).locate(self.fs.as_ref()) {
            Ok(path) => path,
            Err(err) => {
                error!("{err}");
                return Ok(self.finish(ConversionResult::Failed {
                    category: FailureCategory::ToolNotFound,
                    excerpt: err.to_string(),
                }));
            }
        };
        if let Some(job) = self.job.as_mut() {
            job.tool_path = Some(tool_path.clone());
        }

        self.transition(JobState::Launching);
        let invocation = Invocation::for_job(&self.cfg, &tool_path, &source, &output_dir);
        info!("{} command: {}", self.cfg.tool.name, invocation.command_line());
        let running = match self.launcher.launch(&invocation) {
            Ok(running) => running,
            Err(err) => {
                error!("failed to start {}: {err}", self.cfg.tool.name);
                return Ok(self.finish(ConversionResult::Failed {
                    category: FailureCategory::LaunchError,
                    excerpt: err.to_string(),
                }));
            }
        };

        self.transition(JobState::Running);
        if !self.cfg.progress.start_label.is_empty() {
            let start = ProgressTick::new(
                self.cfg.progress.start_percent,
                self.cfg.progress.start_label.clone(),
            );
            self.announce(start);
        }
        let started = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let tick_tx = tx.clone();
        let announcer = ProgressAnnouncer::from_config(&self.cfg)
            .spawn(move |tick| tick_tx.send(Signal::Tick(tick)).is_ok());

        tokio::spawn(async move {
            let termination = running.await;
            let _ = tx.send(Signal::Exited(termination));
        });

        let termination = loop {
            match rx.recv().await {
                Some(Signal::Tick(tick)) => self.announce(tick),
                Some(Signal::Exited(termination)) => break termination,
                None => {
                    break Termination {
                        exit_code: None,
                        output: b"tool supervisor stopped before reporting an exit".to_vec(),
                    };
                }
            }
        };
        announcer.stop();

        self.transition(JobState::Terminated);
        info!(
            "{} exited with {:?} after {:.1}s",
            self.cfg.tool.name,
            termination.exit_code,
            started.elapsed().as_secs_f32()
        );
        let success = termination.success();
        let output = String::from_utf8_lossy(&termination.output).into_owned();
        if self.cfg.debug.log_full_output {
            info!("{} output:\n{}", self.cfg.tool.name, output.trim_end());
        }
        if let Some(job) = self.job.as_mut() {
            job.exit_code = termination.exit_code;
            job.captured_output = termination.output;
        }

        self.complete_progress().await;

        let result = if success {
            let locator = OutputArtifactLocator::from_config(&self.cfg);
            match locator.check(self.fs.as_ref(), &source, &output_dir) {
                ArtifactCheck::Found(output_path) => ConversionResult::Succeeded { output_path },
                ArtifactCheck::Missing(expected_path) => ConversionResult::PartialSuccess {
                    reason: format!(
                        "{} finished successfully, but {} was not found",
                        self.cfg.tool.name,
                        expected_path.display()
                    ),
                    expected_path,
                },
            }
        } else {
            error!("{} failed", self.cfg.tool.name);
            let classification = self.classifier.classify(&output);
            ConversionResult::Failed {
                category: classification.category,
                excerpt: classification.excerpt,
            }
        };

        Ok(self.finish(result))
    }

    pub fn reset(&mut self) -> Result<(), RunnerError> {
        if !self.state.is_resolved() {
            return Err(RunnerError::ResetNotAllowed { state: self.state });
        }
        debug!("reset from {}", self.state);
        self.job = None;
        self.result = None;
        self.progress = 0;
        self.state = JobState::Idle;
        Ok(())
    }

    fn start_job(&self, source: PathBuf) -> ConversionJob {
        let started_at = now_rfc3339();
        let id = sha256_hex(format!("{}:{}", source.display(), started_at).as_bytes())[..16]
            .to_string();
        let output_directory = resolve_output_dir(&self.cfg.paths.output_dir, &source);
        ConversionJob {
            id,
            source_path: source,
            output_directory,
            tool_path: None,
            started_at,
            finished_at: None,
            captured_output: Vec::new(),
            exit_code: None,
        }
    }

    fn announce(&mut self, tick: ProgressTick) {
        if self.state != JobState::Running {
            return;
        }
        let percent = tick.percent.min(100);
        self.progress = percent;
        self.emit(Event::Progress {
            percent,
            label: tick.label,
        });
    }

    async fn complete_progress(&mut self) {
        if self.progress < 100 {
            self.progress = 100;
            self.emit(Event::Progress {
                percent: 100,
                label: self.cfg.progress.finishing_label.clone(),
            });
        }
        tokio::time::sleep(Duration::from_millis(self.cfg.progress.grace_delay_ms)).await;
    }

    fn finish(&mut self, result: ConversionResult) -> ConversionResult {
        self.transition(JobState::Resolved(result.resolution()));
        if let Some(job) = self.job.as_mut() {
            job.finished_at = Some(now_rfc3339());
        }
        info!("{}", self.cfg.headline(&result));
        self.result = Some(result.clone());
        self.emit(Event::Resolved {
            result: result.clone(),
        });
        result
    }

    fn transition(&mut self, next: JobState) {
        debug_assert!(
            next.rank() > self.state.rank(),
            "backward transition {} -> {}",
            self.state,
            next
        );
        debug!("state {} -> {}", self.state, next);
        self.state = next;
    }

    fn emit(&self, event: Event) {
        if self.events.send(event).is_err() {
            debug!("event receiver dropped");
        }
    }
}
