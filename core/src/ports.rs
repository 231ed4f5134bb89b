//! Default probe port sets and timing constants.

use std::time::Duration;

use crate::ScanError;

/// Ports probed by default in full mode, grouped by service family.
/// Callers may override the list per request.
pub const DEFAULT_PROBE_PORTS: &[u16] = &[
    // Web
    80, 443, 8080, 8443, 8000, 8888, 3000, 5000,
    // Remote access
    22, 23, 3389, 5900, 5901,
    // Email
    25, 110, 143, 465, 587, 993, 995,
    // File sharing
    21, 20, 445, 139, 2049,
    // Database
    3306, 5432, 1433, 27017, 6379,
    // DNS & DHCP
    53, 67, 68,
    // Printers & IoT
    9100, 515, 631, 1883, 8883,
    // Network services
    161, 162, 179, 389, 636,
    // Other common
    111, 135, 137, 138, 1723, 1812,
];

/// Priority-ordered short list raced in quick mode. A single handshake on any
/// of these proves L4 reachability without sweeping the whole port list.
pub const QUICK_CHECK_PORTS: &[u16] = &[80, 443, 22, 445, 139, 21, 23, 3389, 8080];

/// Per-port connect deadline in quick mode.
pub const QUICK_PROBE_TIMEOUT: Duration = Duration::from_millis(800);

/// Per-port connect deadline in full mode.
pub const FULL_PROBE_TIMEOUT: Duration = Duration::from_millis(800);

/// Ports probed concurrently per batch in full mode.
pub const PORT_BATCH_SIZE: usize = 15;

/// Parse a comma-separated list of ports/ranges (e.g., "22,80,443", "1-1024,8080").
pub fn parse_ports(spec: &str) -> Result<Vec<u16>, ScanError> {
    let mut ports = Vec::new();
    for part in spec.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if let Some((start, end)) = part.split_once('-') {
            let s: u16 = start
                .trim()
                .parse()
                .map_err(|_| ScanError::invalid(part))?;
            let e: u16 = end.trim().parse().map_err(|_| ScanError::invalid(part))?;
            if s == 0 || e == 0 || s > e {
                return Err(ScanError::invalid(part));
            }
            ports.extend(s..=e);
        } else {
            let p: u16 = part.parse().map_err(|_| ScanError::invalid(part))?;
            if p == 0 {
                return Err(ScanError::invalid(part));
            }
            ports.push(p);
        }
    }
    ports.sort_unstable();
    ports.dedup();
    Ok(ports)
}
