//! Probe executors for monitored resources
//!
//! Handles:
//! - systemd unit state (systemctl is-active / status) with timeout
//! - Public IP lookup over HTTP
//!
//! Probes never retry: an interactive query reports the current instant,
//! and a slow or broken probe is reported as DOWN rather than awaited.

use anyhow::{Context, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

const IP_LOOKUP_URL: &str = "https://api.ipify.org";

/// Short-form state of one probed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Up,
    Down,
}

impl ProbeState {
    pub fn icon(&self) -> &'static str {
        match self {
            ProbeState::Up => "🟢",
            ProbeState::Down => "🔴",
        }
    }
}

/// Result of one probe. Produced fresh on every call, never cached.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub state: ProbeState,
    pub detail: Vec<String>,
}

impl ProbeResult {
    fn down(reason: impl Into<String>) -> Self {
        Self { state: ProbeState::Down, detail: vec![reason.into()] }
    }
}

/// Quick liveness probe for one systemd unit.
///
/// Infallible by construction: a missing systemctl binary, an unknown unit
/// or a timeout all come back as DOWN with the cause in the detail lines.
pub async fn probe_unit(unit: &str, timeout: Duration) -> ProbeResult {
    debug!("probing unit {unit}");
    match run_with_timeout("systemctl", &["is-active", unit], timeout).await {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let state = classify_is_active(stdout.trim());
            ProbeResult { state, detail: vec![stdout.trim().to_string()] }
        }
        Err(e) => ProbeResult::down(format!("probe failed: {e}")),
    }
}

/// Richer, slower probe: a few lines of `systemctl status` output.
/// Does not touch any displayed layout, used for transient detail replies.
pub async fn probe_unit_detail(unit: &str, timeout: Duration) -> ProbeResult {
    debug!("probing unit detail {unit}");
    let args = ["status", "--no-pager", "-n", "3", unit];
    match run_with_timeout("systemctl", &args, timeout).await {
        Ok(output) => {
            let state = if output.status.success() { ProbeState::Up } else { ProbeState::Down };
            let stdout = String::from_utf8_lossy(&output.stdout);
            let mut detail: Vec<String> =
                stdout.lines().take(6).map(|l| l.trim_end().to_string()).collect();
            if detail.is_empty() {
                // `systemctl status` prints to stderr for unknown units
                let stderr = String::from_utf8_lossy(&output.stderr);
                detail = stderr.lines().take(3).map(|l| l.trim_end().to_string()).collect();
            }
            if detail.is_empty() {
                detail.push("no status output".to_string());
            }
            ProbeResult { state, detail }
        }
        Err(e) => ProbeResult::down(format!("probe failed: {e}")),
    }
}

/// Resolve the host's public IP address. Failures propagate so the caller
/// can format an explicit failure message instead of an empty address.
pub async fn probe_public_ip(http: &reqwest::Client, timeout: Duration) -> Result<String> {
    let response = http
        .get(IP_LOOKUP_URL)
        .timeout(timeout)
        .send()
        .await
        .context("IP lookup request failed")?
        .error_for_status()
        .context("IP lookup returned an error status")?;

    let ip = response.text().await.context("IP lookup body unreadable")?;
    let ip = ip.trim().to_string();
    if ip.is_empty() {
        anyhow::bail!("IP lookup returned an empty body");
    }
    Ok(ip)
}

/// Map `systemctl is-active` stdout to a probe state. Anything that is not
/// exactly "active" (inactive, failed, unknown, error text) counts as DOWN.
fn classify_is_active(stdout: &str) -> ProbeState {
    if stdout == "active" {
        ProbeState::Up
    } else {
        ProbeState::Down
    }
}

async fn run_with_timeout(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<std::process::Output> {
    tokio::time::timeout(
        timeout,
        AsyncCommand::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output(),
    )
    .await
    .context("command timed out")?
    .with_context(|| format!("failed to execute {program}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_is_active() {
        assert_eq!(classify_is_active("active"), ProbeState::Up);
        assert_eq!(classify_is_active("inactive"), ProbeState::Down);
        assert_eq!(classify_is_active("failed"), ProbeState::Down);
        assert_eq!(classify_is_active(""), ProbeState::Down);
        assert_eq!(classify_is_active("Unit not found"), ProbeState::Down);
    }

    #[test]
    fn test_icons() {
        assert_eq!(ProbeState::Up.icon(), "🟢");
        assert_eq!(ProbeState::Down.icon(), "🔴");
    }

    #[tokio::test]
    async fn test_run_with_timeout_success() {
        let output = run_with_timeout("echo", &["hello"], Duration::from_secs(5)).await.unwrap();
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("hello"));
    }

    #[tokio::test]
    async fn test_run_with_timeout_expires() {
        let result = run_with_timeout("sleep", &["10"], Duration::from_millis(200)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_probe_unknown_unit_is_down_not_a_crash() {
        let result =
            probe_unit("definitely-not-a-real-unit.service", Duration::from_secs(5)).await;
        assert_eq!(result.state, ProbeState::Down);
        assert!(!result.detail.is_empty());
    }

    #[tokio::test]
    async fn test_probe_detail_unknown_unit() {
        let result =
            probe_unit_detail("definitely-not-a-real-unit.service", Duration::from_secs(5)).await;
        assert_eq!(result.state, ProbeState::Down);
        assert!(!result.detail.is_empty());
    }
}
