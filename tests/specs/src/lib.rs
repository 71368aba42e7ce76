// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `scenehub` binary as a subprocess and exercises it
//! over its WebSocket and HTTP transports.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Resolve the path to the compiled `scenehub` binary.
pub fn scenehub_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("scenehub")
}

/// Find a free TCP port by binding to :0 then releasing.
pub fn free_port() -> anyhow::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// A running `scenehub` process that is killed on drop.
pub struct ScenehubProcess {
    child: Child,
    port: u16,
    auth_token: Option<String>,
    data_dir: PathBuf,
}

/// Builder for configuring a [`ScenehubProcess`] before spawning it.
pub struct ScenehubBuilder {
    data_dir: Option<PathBuf>,
    auth_token: Option<String>,
    compaction_threshold: Option<u64>,
    egress_queue_capacity: Option<usize>,
}

impl Default for ScenehubBuilder {
    fn default() -> Self {
        Self {
            data_dir: None,
            auth_token: None,
            compaction_threshold: None,
            egress_queue_capacity: None,
        }
    }
}

impl ScenehubBuilder {
    /// Persist session logs under `dir` instead of a fresh temp directory.
    /// Used to restart a process against the same data for recovery tests.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn compaction_threshold(mut self, n: u64) -> Self {
        self.compaction_threshold = Some(n);
        self
    }

    pub fn egress_queue_capacity(mut self, n: usize) -> Self {
        self.egress_queue_capacity = Some(n);
        self
    }

    pub fn spawn(self) -> anyhow::Result<ScenehubProcess> {
        let binary = scenehub_binary();
        anyhow::ensure!(binary.exists(), "scenehub binary not found at {}", binary.display());

        let port = free_port()?;
        let data_dir = match self.data_dir {
            Some(dir) => dir,
            None => tempfile::tempdir()?.into_path(),
        };

        let mut args: Vec<String> = vec![
            "--host".into(),
            "127.0.0.1".into(),
            "--port".into(),
            port.to_string(),
            "--data-dir".into(),
            data_dir.to_string_lossy().into_owned(),
            "--log-format".into(),
            "text".into(),
            "--log-level".into(),
            "warn".into(),
        ];
        if let Some(ref token) = self.auth_token {
            args.extend(["--auth-token".into(), token.clone()]);
        }
        if let Some(n) = self.compaction_threshold {
            args.extend(["--compaction-threshold".into(), n.to_string()]);
        }
        if let Some(n) = self.egress_queue_capacity {
            args.extend(["--egress-queue-capacity".into(), n.to_string()]);
        }

        let child = Command::new(&binary)
            .args(&args)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        Ok(ScenehubProcess {
            child,
            port,
            auth_token: self.auth_token,
            data_dir,
        })
    }
}

impl ScenehubProcess {
    /// Spawn scenehub with a fresh temp data directory and no auth.
    pub fn start() -> anyhow::Result<Self> {
        ScenehubBuilder::default().spawn()
    }

    /// Create a builder for custom configuration.
    pub fn build() -> ScenehubBuilder {
        ScenehubBuilder::default()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The directory this process persists session logs under. Pass back
    /// into [`ScenehubBuilder::data_dir`] to restart against the same state.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn ws_url(&self) -> String {
        match &self.auth_token {
            Some(token) => format!("ws://127.0.0.1:{}/ws?token={token}", self.port),
            None => format!("ws://127.0.0.1:{}/ws", self.port),
        }
    }

    pub fn metrics_url(&self) -> String {
        format!("{}/metrics", self.base_url())
    }

    /// Poll `/metrics` until it responds successfully.
    pub async fn wait_healthy(&self, timeout: Duration) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        let client = reqwest::Client::new();
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("scenehub did not become healthy within {timeout:?}");
            }
            let mut request = client.get(self.metrics_url());
            if let Some(ref token) = self.auth_token {
                request = request.bearer_auth(token);
            }
            if let Ok(resp) = request.send().await {
                if resp.status().is_success() {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Wait for the process to exit within `timeout`.
    pub async fn wait_exit(&mut self, timeout: Duration) -> anyhow::Result<std::process::ExitStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if tokio::time::Instant::now() > deadline {
                anyhow::bail!("scenehub did not exit within {timeout:?}");
            }
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Kill the process immediately, without giving it a chance to drain.
    /// Used by recovery tests: durability must hold even across an unclean
    /// stop, not just a graceful shutdown.
    pub fn kill(&mut self) -> anyhow::Result<()> {
        self.child.kill()?;
        Ok(())
    }
}

impl Drop for ScenehubProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
