use thiserror::Error;

/// Errors surfaced to the caller before any probing begins. Probe failures
/// (refused, timed out, unreachable) are never errors; they are a negative
/// liveness signal on that probe.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    /// Unparseable IP, range, or CIDR text.
    #[error("invalid target format: {0}")]
    InvalidFormat(String),

    /// CIDR prefix outside /24../32, or a manual range spanning >254 addresses.
    #[error("{0}")]
    RangeTooLarge(String),

    /// No target/ipRange/singleIp supplied in the request.
    #[error("Target IP/range is required. Use 'target', 'ipRange', or 'singleIp' parameter.")]
    MissingTarget,
}

impl ScanError {
    pub fn invalid(input: impl Into<String>) -> Self {
        ScanError::InvalidFormat(input.into())
    }

    pub fn cidr_prefix_out_of_range() -> Self {
        ScanError::RangeTooLarge("CIDR range must be between /24 and /32".to_string())
    }

    pub fn span_too_large() -> Self {
        ScanError::RangeTooLarge("Range too large. Maximum 254 IPs allowed.".to_string())
    }
}
