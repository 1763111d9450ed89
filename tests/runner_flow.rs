#![cfg(unix)]

mod common;

use common::{FakeFs, ScriptedLauncher, TOOL_2, drain, node, percents, test_config};
use dropconv::error::{DropError, FailureCategory, RunnerError};
use dropconv::runner::ConversionRunner;
use dropconv::types::{ConversionResult, Event, JobState, ProgressTick, Resolution};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn runner(
    fs: Arc<FakeFs>,
    launcher: Arc<ScriptedLauncher>,
) -> (ConversionRunner, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let runner = ConversionRunner::new(&test_config(), tx)
        .with_fs(fs)
        .with_launcher(launcher);
    (runner, rx)
}

#[tokio::test(start_paused = true)]
async fn succeeds_when_artifact_exists() {
    let fs = FakeFs::with(["/work/script.py", TOOL_2, "/out/script"]);
    let launcher = ScriptedLauncher::exits(0, "Building EXE ... completed", Duration::from_secs(3));
    let (mut runner, mut rx) = runner(fs, launcher.clone());

    let result = runner.handle_drop(&node("/work/script.py")).await.unwrap();

    assert_eq!(
        result,
        ConversionResult::Succeeded {
            output_path: PathBuf::from("/out/script"),
        }
    );
    assert_eq!(runner.state(), JobState::Resolved(Resolution::Succeeded));

    let inv = launcher.last_invocation().unwrap();
    assert_eq!(inv.program, PathBuf::from(TOOL_2));
    assert_eq!(
        inv.args,
        [
            "-m",
            "PyInstaller",
            "--onefile",
            "--distpath",
            "/out",
            "--clean",
            "--noconfirm",
            "/work/script.py"
        ]
    );
    assert_eq!(inv.working_dir, PathBuf::from("/work"));
    assert_eq!(
        inv.env.get("PATH").map(String::as_str),
        Some("/usr/local/bin:/opt/homebrew/bin:/usr/bin:/bin")
    );
    assert_eq!(inv.env.get("PYTHONPATH").map(String::as_str), Some(""));

    let job = runner.job().unwrap();
    assert_eq!(job.tool_path.as_deref(), Some(PathBuf::from(TOOL_2).as_path()));
    assert_eq!(job.exit_code, Some(0));
    assert_eq!(job.output_text(), "Building EXE ... completed");
    assert!(job.finished_at.is_some());

    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(Event::JobStarted { source_name, .. }) if source_name == "script.py"
    ));
    assert!(matches!(events.last(), Some(Event::Resolved { .. })));
}

#[tokio::test(start_paused = true)]
async fn zero_exit_without_artifact_is_partial_success() {
    let fs = FakeFs::with(["/work/script.py", TOOL_2]);
    let launcher = ScriptedLauncher::exits(0, "", Duration::from_secs(2));
    let (mut runner, _rx) = runner(fs, launcher);

    let result = runner.handle_drop(&node("/work/script.py")).await.unwrap();

    match result {
        ConversionResult::PartialSuccess { expected_path, .. } => {
            assert_eq!(expected_path, PathBuf::from("/out/script"))
        }
        other => panic!("expected partial success, got {other:?}"),
    }
    assert_eq!(runner.state(), JobState::Resolved(Resolution::PartialSuccess));
}

#[tokio::test(start_paused = true)]
async fn command_not_found_output_is_classified() {
    let fs = FakeFs::with(["/work/script.py", TOOL_2]);
    let launcher =
        ScriptedLauncher::exits(1, "sh: pyinstaller: command not found\n", Duration::from_secs(1));
    let (mut runner, _rx) = runner(fs, launcher);

    let result = runner.handle_drop(&node("/work/script.py")).await.unwrap();

    match result {
        ConversionResult::Failed { category, excerpt } => {
            assert_eq!(category, FailureCategory::ToolNotOnPath);
            assert!(excerpt.contains("command not found"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(runner.job().unwrap().exit_code, Some(1));
}

#[tokio::test(start_paused = true)]
async fn missing_tool_fails_without_spawning() {
    let fs = FakeFs::with(["/work/script.py"]);
    let launcher = ScriptedLauncher::exits(0, "", Duration::from_secs(1));
    let (mut runner, mut rx) = runner(fs, launcher.clone());

    let result = runner.handle_drop(&node("/work/script.py")).await.unwrap();

    assert!(matches!(
        result,
        ConversionResult::Failed {
            category: FailureCategory::ToolNotFound,
            ..
        }
    ));
    assert_eq!(launcher.launches(), 0);
    assert_eq!(runner.state(), JobState::Resolved(Resolution::Failed));
    assert!(runner.job().unwrap().tool_path.is_none());
    assert!(percents(&drain(&mut rx)).is_empty());
}

#[tokio::test(start_paused = true)]
async fn spawn_error_is_launch_error() {
    let fs = FakeFs::with(["/work/script.py", TOOL_2]);
    let launcher = ScriptedLauncher::failing_spawn();
    let (mut runner, _rx) = runner(fs, launcher.clone());

    let result = runner.handle_drop(&node("/work/script.py")).await.unwrap();

    match result {
        ConversionResult::Failed { category, excerpt } => {
            assert_eq!(category, FailureCategory::LaunchError);
            assert!(excerpt.contains("not permitted"));
        }
        other => panic!("expected launch error, got {other:?}"),
    }
    assert_eq!(launcher.launches(), 1);
}

#[tokio::test(start_paused = true)]
async fn early_exit_forces_full_progress_before_result() {
    // Start tick at launch, schedule ticks at 500ms (10%) and 1300ms (20%);
    // the tool exits at 1500ms.
    let fs = FakeFs::with(["/work/script.py", TOOL_2, "/out/script"]);
    let launcher = ScriptedLauncher::exits(0, "", Duration::from_millis(1500));
    let (mut runner, mut rx) = runner(fs, launcher);

    let started = tokio::time::Instant::now();
    runner.handle_drop(&node("/work/script.py")).await.unwrap();
    let elapsed = started.elapsed();

    let events = drain(&mut rx);
    assert_eq!(percents(&events), vec![10, 10, 20, 100]);

    let resolved_at = events
        .iter()
        .position(|e| matches!(e, Event::Resolved { .. }))
        .unwrap();
    assert!(matches!(
        &events[resolved_at - 1],
        Event::Progress { percent: 100, label } if label == "Finishing conversion..."
    ));
    assert!(elapsed >= Duration::from_millis(1500 + 1000));
    assert_eq!(runner.progress(), 100);
}

#[tokio::test(start_paused = true)]
async fn long_job_plays_whole_schedule_once() {
    let fs = FakeFs::with(["/work/script.py", TOOL_2, "/out/script"]);
    let launcher = ScriptedLauncher::exits(0, "", Duration::from_secs(30));
    let (mut runner, mut rx) = runner(fs, launcher);

    runner.handle_drop(&node("/work/script.py")).await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(percents(&events), vec![10, 10, 20, 35, 50, 65, 80, 95, 100]);
    assert!(matches!(
        &events[events.len() - 2],
        Event::Progress { percent: 100, label } if label == "Conversion complete!"
    ));
}

#[tokio::test(start_paused = true)]
async fn rejected_drop_stays_idle() {
    let fs = FakeFs::with(["/work/notes.txt", TOOL_2]);
    let launcher = ScriptedLauncher::exits(0, "", Duration::from_secs(1));
    let (mut runner, mut rx) = runner(fs, launcher.clone());

    let err = runner.handle_drop(&node("/work/notes.txt")).await.unwrap_err();

    assert!(matches!(
        err,
        RunnerError::Rejected(DropError::WrongInputType { .. })
    ));
    assert_eq!(runner.state(), JobState::Idle);
    assert!(runner.job().is_none());
    assert_eq!(launcher.launches(), 0);
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::Rejected { .. }));
}

#[tokio::test(start_paused = true)]
async fn reset_after_success_starts_clean() {
    let fs = FakeFs::with(["/work/script.py", "/work/other.py", TOOL_2, "/out/script"]);
    let launcher = ScriptedLauncher::exits(0, "tool output", Duration::from_secs(1));
    let (mut runner, mut rx) = runner(fs, launcher);

    runner.handle_drop(&node("/work/script.py")).await.unwrap();
    let first_id = runner.job().unwrap().id.clone();

    runner.reset().unwrap();
    assert_eq!(runner.state(), JobState::Idle);
    assert!(runner.job().is_none());
    assert!(runner.result().is_none());
    assert_eq!(runner.progress(), 0);
    drain(&mut rx);

    let second = runner.handle_drop(&node("/work/other.py")).await.unwrap();
    assert!(matches!(second, ConversionResult::PartialSuccess { .. }));
    let job = runner.job().unwrap();
    assert_ne!(job.id, first_id);
    assert_eq!(job.source_path, PathBuf::from("/work/other.py"));
    assert_eq!(job.output_text(), "tool output");
    assert!(matches!(
        drain(&mut rx).first(),
        Some(Event::JobStarted { source_name, .. }) if source_name == "other.py"
    ));
}

#[tokio::test(start_paused = true)]
async fn reset_after_failure_is_allowed() {
    let fs = FakeFs::with(["/work/script.py"]);
    let launcher = ScriptedLauncher::exits(0, "", Duration::from_secs(1));
    let (mut runner, _rx) = runner(fs, launcher);

    runner.handle_drop(&node("/work/script.py")).await.unwrap();
    assert_eq!(runner.state(), JobState::Resolved(Resolution::Failed));
    runner.reset().unwrap();
    assert_eq!(runner.state(), JobState::Idle);
}

#[tokio::test(start_paused = true)]
async fn reset_requires_a_resolved_job() {
    let fs = FakeFs::with([]);
    let launcher = ScriptedLauncher::exits(0, "", Duration::from_secs(1));
    let (mut runner, _rx) = runner(fs, launcher);

    assert_eq!(
        runner.reset(),
        Err(RunnerError::ResetNotAllowed {
            state: JobState::Idle
        })
    );
}

#[tokio::test(start_paused = true)]
async fn drop_before_reset_is_busy() {
    let fs = FakeFs::with(["/work/script.py", TOOL_2, "/out/script"]);
    let launcher = ScriptedLauncher::exits(0, "", Duration::from_secs(1));
    let (mut runner, mut rx) = runner(fs, launcher.clone());

    runner.handle_drop(&node("/work/script.py")).await.unwrap();
    drain(&mut rx);

    let err = runner.handle_drop(&node("/work/script.py")).await.unwrap_err();
    assert_eq!(
        err,
        RunnerError::Busy {
            state: JobState::Resolved(Resolution::Succeeded)
        }
    );
    assert_eq!(launcher.launches(), 1);
    assert!(matches!(drain(&mut rx).as_slice(), [Event::Rejected { .. }]));
}

#[tokio::test(start_paused = true)]
async fn start_tick_follows_job_started_immediately() {
    let fs = FakeFs::with(["/work/script.py", TOOL_2, "/out/script"]);
    let launcher = ScriptedLauncher::exits(0, "", Duration::from_millis(100));
    let (mut runner, mut rx) = runner(fs, launcher);

    runner.handle_drop(&node("/work/script.py")).await.unwrap();

    let events = drain(&mut rx);
    assert!(matches!(events[0], Event::JobStarted { .. }));
    assert!(matches!(
        &events[1],
        Event::Progress { percent: 10, label } if label == "Initializing conversion process..."
    ));
    assert_eq!(percents(&events), vec![10, 100]);
}

#[tokio::test(start_paused = true)]
async fn schedule_ending_short_of_full_is_still_completed() {
    let fs = FakeFs::with(["/work/script.py", TOOL_2, "/out/script"]);
    let launcher = ScriptedLauncher::exits(0, "", Duration::from_secs(10));
    let mut cfg = test_config();
    cfg.progress.start_label.clear();
    cfg.progress.schedule = vec![ProgressTick::new(10, "a"), ProgressTick::new(40, "b")];
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut runner = ConversionRunner::new(&cfg, tx)
        .with_fs(fs)
        .with_launcher(launcher);

    runner.handle_drop(&node("/work/script.py")).await.unwrap();

    assert_eq!(percents(&drain(&mut rx)), vec![10, 40, 100]);
}
