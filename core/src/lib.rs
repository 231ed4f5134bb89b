//! Shared types for the ipsweep engine: target specifications, scan records,
//! the error taxonomy, and the default probe port set.

pub mod error;
pub mod ports;

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

pub use error::ScanError;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Classified scan target, built once from user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSpec {
    /// A single literal address.
    Single(Ipv4Addr),
    /// Manual `start-end` range, both endpoints inclusive.
    Range(Ipv4Addr, Ipv4Addr),
    /// CIDR block: base address and prefix length.
    Cidr(Ipv4Addr, u8),
}

/// Probing strategy for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Race a short list of commonly-open ports, return on first success.
    Quick,
    /// Sweep the whole configured port list in batches.
    Full,
}

impl ScanMode {
    /// How many hosts are scanned concurrently per orchestrator chunk.
    /// Full mode is far more expensive per host, so its chunks are smaller.
    pub fn chunk_size(self) -> usize {
        match self {
            ScanMode::Quick => 20,
            ScanMode::Full => 10,
        }
    }

    pub fn method(self) -> ScanMethod {
        match self {
            ScanMode::Quick => ScanMethod::QuickTcp,
            ScanMode::Full => ScanMethod::FullTcp,
        }
    }
}

/// Wire label for the probing strategy that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanMethod {
    #[serde(rename = "tcp-quick")]
    QuickTcp,
    #[serde(rename = "tcp-full")]
    FullTcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Active,
    Inactive,
}

/// Outcome of probing one host. `status` is `Active` iff at least one port
/// answered; `response_time` is set iff the host is active.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub ip: Ipv4Addr,
    pub status: ScanStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_ports: Option<Vec<u16>>,
    /// Unix epoch milliseconds at result construction.
    pub timestamp: i64,
    pub method: ScanMethod,
}

impl ScanResult {
    pub fn is_active(&self) -> bool {
        self.status == ScanStatus::Active
    }
}

/// Aggregate over one scan invocation. Doubles as the success response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub results: Vec<ScanResult>,
    pub total_hosts: usize,
    pub active_hosts: usize,
    /// Wall-clock duration of the whole invocation in milliseconds.
    pub scan_duration: u64,
    /// Present only for the single-IP fast path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_method: Option<ScanMethod>,
}

/// Collaborator record consumed by history persistence and export.
/// The engine itself never stores these; callers build them from a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanHistory {
    pub id: String,
    pub target: String,
    pub results: Vec<ScanResult>,
    pub total_scanned: usize,
    pub active_count: usize,
    pub inactive_count: usize,
    pub start_time: i64,
    pub end_time: i64,
    pub duration: u64,
}

/// Current time as unix epoch milliseconds.
pub fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
