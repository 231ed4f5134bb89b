use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use env_logger::Env;
use host_scan::ProbeTimeouts;
use ipsweep_core::{now_ms, ports, ScanHistory, ScanReport, ScanStatus};
use orchestrate::ScanRequest;
use tokio_util::sync::CancellationToken;

mod config;
mod server;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Jsonl,
}

#[derive(Debug, Parser)]
#[command(name = "ipsweep", version, about = "IPv4 range and port discovery over TCP connect")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./ipsweep.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Scan a single IP, a start-end range, or a CIDR block
    Scan {
        /// Target: 10.0.0.5, 10.0.0.1-10.0.0.50, or 192.168.1.0/24
        target: String,
        /// Ports: comma/range list (e.g., 22,80,443 or 1-1024,8080). Default: common ports.
        #[arg(long)]
        ports: Option<String>,
        /// Sweep every configured port per host instead of the quick liveness race
        #[arg(long, default_value_t = false)]
        full: bool,
        /// Timeout per probe in milliseconds
        #[arg(long, default_value_t = 800)]
        timeout_ms: u64,
        /// Output format: text, json, or jsonl
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Output file (overwrites)
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,
        /// Write CSV instead of text/json when --out is provided
        #[arg(long, default_value_t = false)]
        csv: bool,
        /// Append a scan-history record (JSON line) to this file
        #[arg(long, value_name = "FILE")]
        history: Option<PathBuf>,
    },
    /// Serve the scan engine over HTTP/JSON
    Serve {
        /// Bind address
        #[arg(long, default_value = "127.0.0.1:8787")]
        bind: String,
        /// Timeout per probe in milliseconds
        #[arg(long, default_value_t = 800)]
        timeout_ms: u64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let loaded_cfg = config::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Version => {
            println!("ipsweep {} (core {})", env!("CARGO_PKG_VERSION"), ipsweep_core::version());
        }
        Commands::Scan { target, mut ports, mut full, mut timeout_ms, mut format, out, csv, mut history } => {
            if let Some(cfg) = &loaded_cfg {
                if let Some(s) = &cfg.scan {
                    if ports.is_none() { ports = s.ports.clone(); }
                    if let Some(q) = s.quick { full = !q; }
                    if let Some(t) = s.timeout_ms { timeout_ms = t; }
                    if history.is_none() { history = s.history.clone(); }
                    if let Some(f) = &s.format {
                        format = match f.as_str() {
                            "json" => OutputFormat::Json,
                            "jsonl" => OutputFormat::Jsonl,
                            _ => OutputFormat::Text,
                        };
                    }
                }
            }

            let ports_vec = ports.as_deref().map(ports::parse_ports).transpose()?;
            let timeouts = probe_timeouts(timeout_ms);
            let request = ScanRequest {
                target: Some(target.clone()),
                ports: ports_vec,
                quick_mode: !full,
                ..Default::default()
            };

            let rt = tokio::runtime::Runtime::new()?;
            let started_ms = now_ms();
            let report = rt.block_on(async move {
                let cancel = CancellationToken::new();
                let cancel_on_signal = cancel.clone();
                tokio::spawn(async move {
                    tokio::signal::ctrl_c().await.ok();
                    cancel_on_signal.cancel();
                });
                orchestrate::handle_scan(&request, timeouts, &cancel).await
            })?;

            if let Some(path) = &history {
                append_history(path, &target, &report, started_ms)?;
            }

            if csv {
                let path = out.ok_or_else(|| anyhow!("--csv requires --out <file>"))?;
                return write_csv(&path, &report);
            }
            let rendered = render_report(&target, &report, format)?;
            if let Some(path) = out {
                let file = OpenOptions::new().create(true).truncate(true).write(true).open(&path)?;
                let mut w = BufWriter::new(file);
                writeln!(w, "{rendered}")?;
            } else {
                println!("{rendered}");
            }
        }
        Commands::Serve { mut bind, mut timeout_ms } => {
            if let Some(cfg) = &loaded_cfg {
                if let Some(s) = &cfg.serve {
                    if let Some(b) = &s.bind { bind = b.clone(); }
                    if let Some(t) = s.timeout_ms { timeout_ms = t; }
                }
            }
            let timeouts = probe_timeouts(timeout_ms);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async move {
                let cancel = CancellationToken::new();
                let cancel_on_signal = cancel.clone();
                tokio::spawn(async move {
                    tokio::signal::ctrl_c().await.ok();
                    cancel_on_signal.cancel();
                });
                server::serve(&bind, timeouts, cancel).await
            })?;
        }
    }
    Ok(())
}

fn probe_timeouts(timeout_ms: u64) -> ProbeTimeouts {
    ProbeTimeouts {
        quick: Duration::from_millis(timeout_ms),
        full: Duration::from_millis(timeout_ms),
    }
}

fn render_report(target: &str, report: &ScanReport, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Text => {
            let mut lines = Vec::with_capacity(report.results.len() + 1);
            for r in &report.results {
                if r.status == ScanStatus::Active {
                    let ports = r
                        .open_ports
                        .as_deref()
                        .unwrap_or_default()
                        .iter()
                        .map(|p| p.to_string())
                        .collect::<Vec<_>>()
                        .join(",");
                    lines.push(format!(
                        "{} active [{}] ({} ms)",
                        r.ip,
                        ports,
                        r.response_time.unwrap_or_default()
                    ));
                }
            }
            lines.push(format!(
                "{}: {}/{} hosts active ({} ms)",
                target, report.active_hosts, report.total_hosts, report.scan_duration
            ));
            lines.join("\n")
        }
        OutputFormat::Json => serde_json::to_string(report)?,
        OutputFormat::Jsonl => report
            .results
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?
            .join("\n"),
    })
}

fn write_csv(path: &PathBuf, report: &ScanReport) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::fs::File::create(path)?);
    wtr.write_record(["ip", "status", "responseTime", "openPorts", "method", "scannedAt"])?;
    for r in &report.results {
        let ports = r
            .open_ports
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join("|");
        wtr.write_record([
            r.ip.to_string(),
            match r.status {
                ScanStatus::Active => "active".to_string(),
                ScanStatus::Inactive => "inactive".to_string(),
            },
            r.response_time.map(|v| v.to_string()).unwrap_or_default(),
            ports,
            serde_json::to_value(r.method)?
                .as_str()
                .unwrap_or_default()
                .to_string(),
            rfc3339_from_ms(r.timestamp),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Append one ScanHistory record as a JSON line; the engine stays stateless,
/// this is caller-side export of the collaborator record.
fn append_history(path: &PathBuf, target: &str, report: &ScanReport, started_ms: i64) -> Result<()> {
    let record = ScanHistory {
        id: uuid::Uuid::now_v7().to_string(),
        target: target.to_string(),
        results: report.results.clone(),
        total_scanned: report.total_hosts,
        active_count: report.active_hosts,
        inactive_count: report.total_hosts - report.active_hosts,
        start_time: started_ms,
        end_time: now_ms(),
        duration: report.scan_duration,
    };
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut w = BufWriter::new(file);
    writeln!(w, "{}", serde_json::to_string(&record)?)?;
    Ok(())
}

fn rfc3339_from_ms(ms: i64) -> String {
    time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipsweep_core::{ScanMethod, ScanResult};
    use std::net::Ipv4Addr;

    fn sample_report() -> ScanReport {
        ScanReport {
            results: vec![
                ScanResult {
                    ip: Ipv4Addr::new(10, 0, 0, 1),
                    status: ScanStatus::Active,
                    response_time: Some(8),
                    open_ports: Some(vec![22, 80]),
                    timestamp: 1_700_000_000_000,
                    method: ScanMethod::FullTcp,
                },
                ScanResult {
                    ip: Ipv4Addr::new(10, 0, 0, 2),
                    status: ScanStatus::Inactive,
                    response_time: None,
                    open_ports: None,
                    timestamp: 1_700_000_000_000,
                    method: ScanMethod::FullTcp,
                },
            ],
            total_hosts: 2,
            active_hosts: 1,
            scan_duration: 120,
            scan_method: None,
        }
    }

    #[test]
    fn text_output_lists_active_hosts_and_summary() {
        let text = render_report("10.0.0.0/30", &sample_report(), OutputFormat::Text).unwrap();
        assert!(text.contains("10.0.0.1 active [22,80] (8 ms)"));
        assert!(text.contains("10.0.0.0/30: 1/2 hosts active (120 ms)"));
        assert!(!text.contains("10.0.0.2 active"));
    }

    #[test]
    fn jsonl_output_is_one_result_per_line() {
        let jsonl = render_report("x", &sample_report(), OutputFormat::Jsonl).unwrap();
        assert_eq!(jsonl.lines().count(), 2);
        assert!(jsonl.lines().next().unwrap().contains("\"openPorts\":[22,80]"));
    }

    #[test]
    fn rfc3339_renders_epoch_ms() {
        assert!(rfc3339_from_ms(1_700_000_000_000).starts_with("2023-11-14T"));
        assert_eq!(rfc3339_from_ms(0), "1970-01-01T00:00:00Z");
    }
}
