#![allow(dead_code)]

use dropconv::{
    config::Config,
    drop::{PayloadItem, Representation, StaticPayload},
    launch::{Invocation, Launcher, Termination},
    types::Event,
    util::FileProbe,
};
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// In-memory set of existing paths.
#[derive(Default)]
pub struct FakeFs {
    paths: Mutex<HashSet<PathBuf>>,
}

impl FakeFs {
    pub fn with<'a>(paths: impl IntoIterator<Item = &'a str>) -> Arc<Self> {
        let fs = Self::default();
        for p in paths {
            fs.add(p);
        }
        Arc::new(fs)
    }

    pub fn add(&self, path: &str) {
        self.paths.lock().unwrap().insert(PathBuf::from(path));
    }
}

impl FileProbe for FakeFs {
    fn exists(&self, path: &Path) -> bool {
        self.paths.lock().unwrap().contains(path)
    }
}

/// Pretends to run the tool: sleeps, then exits with a fixed code and output.
pub struct ScriptedLauncher {
    after: Duration,
    exit_code: Option<i32>,
    output: String,
    fail_spawn: bool,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedLauncher {
    pub fn exits(code: i32, output: &str, after: Duration) -> Arc<Self> {
        Arc::new(Self {
            after,
            exit_code: Some(code),
            output: output.to_string(),
            fail_spawn: false,
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn failing_spawn() -> Arc<Self> {
        Arc::new(Self {
            after: Duration::ZERO,
            exit_code: None,
            output: String::new(),
            fail_spawn: true,
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn launches(&self) -> usize {
        self.invocations.lock().unwrap().len()
    }

    pub fn last_invocation(&self) -> Option<Invocation> {
        self.invocations.lock().unwrap().last().cloned()
    }
}

impl Launcher for ScriptedLauncher {
    fn launch(&self, invocation: &Invocation) -> std::io::Result<BoxFuture<'static, Termination>> {
        self.invocations.lock().unwrap().push(invocation.clone());
        if self.fail_spawn {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "operation not permitted",
            ));
        }
        let after = self.after;
        let exit_code = self.exit_code;
        let output = self.output.clone().into_bytes();
        Ok(async move {
            tokio::time::sleep(after).await;
            Termination { exit_code, output }
        }
        .boxed())
    }
}

pub const TOOL_1: &str = "/opt/tool-a/bin/python3";
pub const TOOL_2: &str = "/opt/tool-b/bin/python3";
pub const TOOL_3: &str = "/opt/tool-c/bin/python3";

/// Default PyInstaller setup with fake tool locations and a fixed output dir.
pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.tool.candidates = vec![TOOL_1.into(), TOOL_2.into(), TOOL_3.into()];
    cfg.paths.output_dir = "/out".into();
    cfg
}

pub fn node(path: &str) -> StaticPayload {
    StaticPayload::new().with(Representation::FinderNode, PayloadItem::Path(PathBuf::from(path)))
}

pub fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn percents(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect()
}
