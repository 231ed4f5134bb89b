//! Target specification parsing: single IPs, manual `start-end` ranges, and
//! CIDR blocks, expanded into a bounded, ordered address list.
//!
//! All range arithmetic happens on the `u32` form of the address, never on the
//! dotted string, so octet carries and the high bit of the top octet behave.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use ipsweep_core::{ScanError, TargetSpec};

/// Widest manual range accepted, as an integer difference between endpoints.
const MAX_RANGE_SPAN: i64 = 254;

/// Classify a textual target without expanding it. Classification is by shape
/// only: `/` means CIDR, `-` means manual range, anything else is a literal.
pub fn classify(input: &str) -> Result<TargetSpec, ScanError> {
    let input = input.trim();
    if let Some((base, prefix)) = input.split_once('/') {
        let prefix: u32 = prefix
            .trim()
            .parse()
            .map_err(|_| ScanError::invalid(input))?;
        if !(24..=32).contains(&prefix) {
            return Err(ScanError::cidr_prefix_out_of_range());
        }
        let base: Ipv4Addr = base.trim().parse().map_err(|_| ScanError::invalid(input))?;
        Ok(TargetSpec::Cidr(base, prefix as u8))
    } else if let Some((start, end)) = input.split_once('-') {
        let start: Ipv4Addr = start.trim().parse().map_err(|_| ScanError::invalid(input))?;
        let end: Ipv4Addr = end.trim().parse().map_err(|_| ScanError::invalid(input))?;
        if i64::from(u32::from(end)) - i64::from(u32::from(start)) > MAX_RANGE_SPAN {
            return Err(ScanError::span_too_large());
        }
        Ok(TargetSpec::Range(start, end))
    } else {
        let ip: Ipv4Addr = input.parse().map_err(|_| ScanError::invalid(input))?;
        Ok(TargetSpec::Single(ip))
    }
}

/// Expand a classified target into its candidate addresses, in ascending
/// enumeration order.
///
/// CIDR expansion excludes the network and broadcast addresses, so a /31 or
/// /32 block yields no usable hosts; callers wanting exactly one host use the
/// single-IP form instead. A manual range with `end < start` is empty, not an
/// error.
pub fn expand(spec: &TargetSpec) -> Vec<Ipv4Addr> {
    match *spec {
        TargetSpec::Single(ip) => vec![ip],
        TargetSpec::Range(start, end) => {
            let (start, end) = (u32::from(start), u32::from(end));
            (start..=end).map(Ipv4Addr::from).collect()
        }
        TargetSpec::Cidr(base, prefix) => {
            let net = Ipv4Net::new(base, prefix).expect("prefix validated at classify");
            let network = u32::from(net.network());
            let host_bits = 32 - u32::from(prefix);
            let num_hosts: u64 = 1u64 << host_bits;
            // Skip i=0 (network) and i=num_hosts-1 (broadcast).
            (1..num_hosts.saturating_sub(1))
                .map(|i| Ipv4Addr::from(network + i as u32))
                .collect()
        }
    }
}

/// Parse and expand in one step.
pub fn parse(input: &str) -> Result<Vec<Ipv4Addr>, ScanError> {
    Ok(expand(&classify(input)?))
}
