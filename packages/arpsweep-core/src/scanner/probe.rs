//! ARP probing through the platform's ARP tool

use super::{NetworkContext, ScanError, hidden_command};
use crate::config::ScanConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;

/// Why a single probe did not produce a usable answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeFailure {
    #[error("probe tool '{tool}' not found")]
    ToolNotFound { tool: String },

    #[error("failed to start probe: {message}")]
    Spawn { message: String },

    #[error("probe exited with status {}", status_text(.code))]
    ExitStatus { code: Option<i32> },

    #[error("probe timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },

    #[error("probe panicked: {message}")]
    Panicked { message: String },
}

fn status_text(code: &Option<i32>) -> String {
    code.map_or_else(|| "unknown".to_string(), |c| c.to_string())
}

/// Outcome of one ARP request against one address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub target: Ipv4Addr,
    /// Combined stdout and stderr of the probe tool, uninterpreted
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<ProbeFailure>,
}

impl ProbeResult {
    pub fn success(target: Ipv4Addr, output: String) -> Self {
        Self {
            target,
            output,
            failure: None,
        }
    }

    pub fn failed(target: Ipv4Addr, output: String, failure: ProbeFailure) -> Self {
        Self {
            target,
            output,
            failure: Some(failure),
        }
    }
}

/// Something that can send one ARP request and report what happened.
#[async_trait]
pub trait ProbeCapability: Send + Sync {
    /// Name of the underlying tool, for logs and progress messages
    fn tool(&self) -> &str;

    /// Send a single ARP request for `target`. Never fails outright; any
    /// problem is recorded on the returned result.
    async fn request_arp(&self, target: Ipv4Addr) -> ProbeResult;
}

/// `arping -c 1 -I <interface> <target>` (Linux, macOS, BSD)
#[derive(Debug, Clone)]
pub struct ArpingProbe {
    interface: String,
    program: String,
}

impl ArpingProbe {
    pub fn new(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            program: crate::config::DEFAULT_ARPING_PROGRAM.to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn args(&self, target: Ipv4Addr) -> Vec<String> {
        vec![
            "-c".to_string(),
            "1".to_string(),
            "-I".to_string(),
            self.interface.clone(),
            target.to_string(),
        ]
    }
}

#[async_trait]
impl ProbeCapability for ArpingProbe {
    fn tool(&self) -> &str {
        &self.program
    }

    async fn request_arp(&self, target: Ipv4Addr) -> ProbeResult {
        let mut cmd = hidden_command(&self.program);
        cmd.args(self.args(target));
        run_probe_command(cmd, &self.program, target).await
    }
}

/// `nping --arp --arp-type request --dest-ip <target>` (Windows)
#[derive(Debug, Clone)]
pub struct NpingProbe {
    program: String,
}

impl NpingProbe {
    pub fn new() -> Self {
        Self {
            program: crate::config::DEFAULT_NPING_PROGRAM.to_string(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn args(&self, target: Ipv4Addr) -> Vec<String> {
        vec![
            "--arp".to_string(),
            "--arp-type".to_string(),
            "request".to_string(),
            "--dest-ip".to_string(),
            target.to_string(),
        ]
    }
}

impl Default for NpingProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeCapability for NpingProbe {
    fn tool(&self) -> &str {
        &self.program
    }

    async fn request_arp(&self, target: Ipv4Addr) -> ProbeResult {
        let mut cmd = hidden_command(&self.program);
        cmd.args(self.args(target));
        run_probe_command(cmd, &self.program, target).await
    }
}

/// Run a probe command to completion and map its exit into a result.
///
/// The child is killed if the returned future is dropped, so a caller-side
/// deadline also ends the external process.
async fn run_probe_command(mut cmd: Command, tool: &str, target: Ipv4Addr) -> ProbeResult {
    cmd.stdin(Stdio::null()).kill_on_drop(true);

    match cmd.output().await {
        Ok(output) => {
            let text = combined_output(&output.stdout, &output.stderr);
            if output.status.success() {
                tracing::trace!("{} {} exited successfully", tool, target);
                ProbeResult::success(target, text)
            } else {
                tracing::trace!("{} {} exited with {}", tool, target, output.status);
                ProbeResult::failed(
                    target,
                    text,
                    ProbeFailure::ExitStatus {
                        code: output.status.code(),
                    },
                )
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => ProbeResult::failed(
            target,
            String::new(),
            ProbeFailure::ToolNotFound {
                tool: tool.to_string(),
            },
        ),
        Err(e) => ProbeResult::failed(
            target,
            String::new(),
            ProbeFailure::Spawn {
                message: e.to_string(),
            },
        ),
    }
}

/// Stdout followed by stderr, lossily decoded
fn combined_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(stderr));
    text
}

/// Select the probe capability for the running platform.
pub fn platform_probe(
    network: &NetworkContext,
    config: &ScanConfig,
) -> Result<Arc<dyn ProbeCapability>, ScanError> {
    #[cfg(unix)]
    {
        Ok(Arc::new(
            ArpingProbe::new(&network.interface).with_program(&config.arping_program),
        ))
    }

    #[cfg(windows)]
    {
        let _ = network;
        Ok(Arc::new(
            NpingProbe::new().with_program(&config.nping_program),
        ))
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (network, config);
        Err(ScanError::UnsupportedPlatform(
            std::env::consts::OS.to_string(),
        ))
    }
}
