use clap::{Parser, Subcommand};

use crate::config::{ListenConfig, OperatorConfig};

#[derive(Parser, Debug)]
#[command(name = "clicktrack", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// Hub HTTP base URL
    #[arg(long, global = true, default_value = "http://127.0.0.1:3000")]
    pub server: String,

    /// Use a specific output device by substring match
    #[arg(long, global = true)]
    pub device: Option<String>,

    /// Preferred output sample rate (Hz); tracks are resampled to what the device accepts
    #[arg(long, global = true, default_value_t = 48_000)]
    pub output_rate: u32,

    /// Self-resync delay after a scheduled start fires (ms)
    #[arg(long, global = true, default_value_t = 1_000)]
    pub settle_ms: u64,

    /// Clock sync requests per connection
    #[arg(long, global = true, default_value_t = 1)]
    pub sync_samples: u32,

    /// Give up on an unanswered sync/resync after this long (ms)
    #[arg(long, global = true, default_value_t = 5_000)]
    pub request_timeout_ms: u64,

    /// Wait before reconnecting to the hub (ms)
    #[arg(long, global = true, default_value_t = 2_000)]
    pub reconnect_ms: u64,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Follow the hub as a listening device (default)
    Listen,
    /// List the hub catalog
    Tracks,
    /// Start a track on every device
    Play { track_id: String },
    /// Stop playback everywhere
    Stop,
    /// Move the live track
    Seek {
        /// Absolute position in seconds
        #[arg(long, conflicts_with = "fraction", required_unless_present = "fraction")]
        seconds: Option<f64>,
        /// Position as a fraction of the track, 0.0 to 1.0
        #[arg(long)]
        fraction: Option<f64>,
    },
    /// Show what is playing
    Status,
}

impl Args {
    pub fn listen_config(&self) -> ListenConfig {
        ListenConfig {
            server: self.server.clone(),
            device: normalize_device_name(self.device.clone()),
            output_rate: self.output_rate,
            settle_ms: self.settle_ms,
            sync_samples: self.sync_samples.max(1),
            request_timeout_ms: self.request_timeout_ms,
            reconnect_ms: self.reconnect_ms,
        }
    }

    pub fn operator_config(&self) -> OperatorConfig {
        OperatorConfig {
            server: self.server.clone(),
            request_timeout_ms: self.request_timeout_ms,
        }
    }
}

fn normalize_device_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}
