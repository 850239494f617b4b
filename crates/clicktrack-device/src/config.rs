//! Resolved settings for the device commands.

/// Settings for `clicktrack listen`.
#[derive(Clone, Debug)]
pub struct ListenConfig {
    /// Hub HTTP base URL.
    pub server: String,
    pub device: Option<String>,
    pub output_rate: u32,
    /// Delay before the self-resync that follows a scheduled start.
    pub settle_ms: u64,
    /// Sync requests per connection; the lowest-RTT reply wins.
    pub sync_samples: u32,
    pub request_timeout_ms: u64,
    pub reconnect_ms: u64,
}

/// Settings for the one-shot operator commands.
#[derive(Clone, Debug)]
pub struct OperatorConfig {
    pub server: String,
    pub request_timeout_ms: u64,
}
