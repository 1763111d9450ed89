use crate::config::Config;
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl Invocation {
    pub fn for_job(cfg: &Config, tool_path: &Path, source: &Path, output_dir: &Path) -> Self {
        let source_str = source.to_string_lossy();
        let output_str = output_dir.to_string_lossy();
        let args = cfg
            .tool
            .args
            .iter()
            .map(|a| {
                a.replace("{source}", &source_str)
                    .replace("{output_dir}", &output_str)
            })
            .collect();

        let working_dir = source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut env = cfg.tool.env.clone();
        if !cfg.tool.path_override.is_empty() {
            env.insert("PATH".to_string(), cfg.tool.path_override.join(":"));
        }
        for var in &cfg.tool.cleared_env {
            env.insert(var.clone(), String::new());
        }

        Self {
            program: tool_path.to_path_buf(),
            args,
            working_dir,
            env,
        }
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// How the tool ended. `exit_code` is `None` when it was killed by a signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub exit_code: Option<i32>,
    pub output: Vec<u8>,
}

impl Termination {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub trait Launcher: Send + Sync {
    fn launch(&self, invocation: &Invocation) -> std::io::Result<BoxFuture<'static, Termination>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, invocation: &Invocation) -> std::io::Result<BoxFuture<'static, Termination>> {
        debug!("spawning {}", invocation.command_line());
        debug!("working directory {}", invocation.working_dir.display());
        debug!(env = ?invocation.env, "environment overrides");

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .envs(&invocation.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn()?;

        // Both streams append to the same buffer; interleaving across them
        // follows read order, not strict chronology.
        let captured = Arc::new(Mutex::new(Vec::new()));
        let readers: Vec<_> = [
            child.stdout.take().map(|s| spawn_drain(s, captured.clone())),
            child.stderr.take().map(|s| spawn_drain(s, captured.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();

        Ok(async move {
            let exit_code = match child.wait().await {
                Ok(status) => status.code(),
                Err(err) => {
                    warn!("waiting for tool failed: {err}");
                    None
                }
            };
            for reader in readers {
                if let Err(err) = reader.await {
                    warn!("output reader task failed: {err}");
                }
            }
            let output = std::mem::take(&mut *captured.lock().unwrap_or_else(|e| e.into_inner()));
            Termination { exit_code, output }
        }
        .boxed())
    }
}

fn spawn_drain<R>(reader: R, sink: Arc<Mutex<Vec<u8>>>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = reader;
        let mut buf = [0u8; 8192];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => sink
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .extend_from_slice(&buf[..n]),
                Err(err) => {
                    warn!("reading tool output failed: {err}");
                    break;
                }
            }
        }
    })
}
