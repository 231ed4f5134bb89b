//! Fan-out of a target list across per-host scans with bounded concurrency,
//! plus the request-level entry point that classifies the target text and
//! routes single literals down the fast path.

use std::net::Ipv4Addr;
use std::time::Instant;

use log::{debug, info};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use host_scan::{scan_host, ProbeTimeouts};
use ipsweep_core::ports::DEFAULT_PROBE_PORTS;
use ipsweep_core::{ScanError, ScanMode, ScanReport, ScanResult, TargetSpec};

/// Log a progress line only for scans bigger than this.
const PROGRESS_LOG_THRESHOLD: usize = 50;

fn default_quick() -> bool {
    true
}

/// One scan invocation as received from a caller. `target` takes precedence
/// over `ip_range`, which takes precedence over `single_ip`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRequest {
    pub target: Option<String>,
    pub ip_range: Option<String>,
    pub single_ip: Option<String>,
    pub ports: Option<Vec<u16>>,
    #[serde(default = "default_quick")]
    pub quick_mode: bool,
}

impl ScanRequest {
    pub fn for_target(target: impl Into<String>) -> Self {
        ScanRequest {
            target: Some(target.into()),
            quick_mode: true,
            ..Default::default()
        }
    }
}

/// Scan every address in `targets`, `mode.chunk_size()` hosts at a time.
///
/// Hosts inside a chunk race each other and land in the report in completion
/// order; chunks themselves are strictly sequential, which caps peak
/// concurrency no matter how long the target list is. Each chunk collects
/// into a local vector merged at the chunk barrier, so the hot path needs no
/// shared state. `progress` observes hosts completed so far.
pub async fn scan_many(
    targets: &[Ipv4Addr],
    ports: &[u16],
    mode: ScanMode,
    timeouts: ProbeTimeouts,
    cancel: &CancellationToken,
    progress: Option<watch::Sender<usize>>,
) -> ScanReport {
    let started = Instant::now();
    let mut results: Vec<ScanResult> = Vec::with_capacity(targets.len());
    let mut completed = 0usize;

    for chunk in targets.chunks(mode.chunk_size()) {
        if cancel.is_cancelled() {
            debug!("scan cancelled after {completed} hosts");
            break;
        }

        let (tx, mut rx) = mpsc::channel::<ScanResult>(chunk.len());
        for &ip in chunk {
            let tx = tx.clone();
            let ports = ports.to_vec();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let result = scan_host(ip, &ports, mode, timeouts, &cancel).await;
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        let mut chunk_results = Vec::with_capacity(chunk.len());
        while let Some(result) = rx.recv().await {
            chunk_results.push(result);
        }
        completed += chunk_results.len();
        results.extend(chunk_results);

        if let Some(tx) = &progress {
            let _ = tx.send(completed);
        }
        if targets.len() > PROGRESS_LOG_THRESHOLD {
            info!("progress: {completed}/{} hosts scanned", targets.len());
        }
    }

    let active_hosts = results.iter().filter(|r| r.is_active()).count();
    ScanReport {
        total_hosts: results.len(),
        active_hosts,
        scan_duration: started.elapsed().as_millis() as u64,
        scan_method: None,
        results,
    }
}

/// Entry point for one scan request: resolve the target text, pick the mode,
/// and aggregate. Fails only before probing begins; a report with zero active
/// hosts is a success.
///
/// A single literal IP bypasses batching and always runs a full sweep of the
/// configured port list, since one host is already bounded in cost; its
/// report carries `scan_method`.
pub async fn handle_scan(
    request: &ScanRequest,
    timeouts: ProbeTimeouts,
    cancel: &CancellationToken,
) -> Result<ScanReport, ScanError> {
    let target = request
        .target
        .as_deref()
        .or(request.ip_range.as_deref())
        .or(request.single_ip.as_deref())
        .ok_or(ScanError::MissingTarget)?;

    let ports: Vec<u16> = request
        .ports
        .clone()
        .unwrap_or_else(|| DEFAULT_PROBE_PORTS.to_vec());
    let mode = if request.quick_mode { ScanMode::Quick } else { ScanMode::Full };

    info!(
        "scan request: {target} ({} ports, {mode:?} mode)",
        ports.len()
    );

    let spec = range_parse::classify(target)?;
    if let TargetSpec::Single(ip) = spec {
        let started = Instant::now();
        let result = scan_host(ip, &ports, ScanMode::Full, timeouts, cancel).await;
        return Ok(ScanReport {
            total_hosts: 1,
            active_hosts: result.is_active() as usize,
            scan_duration: started.elapsed().as_millis() as u64,
            scan_method: Some(result.method),
            results: vec![result],
        });
    }

    let ips = range_parse::expand(&spec);
    info!("scanning {} addresses in {mode:?} mode", ips.len());
    Ok(scan_many(&ips, &ports, mode, timeouts, cancel, None).await)
}
