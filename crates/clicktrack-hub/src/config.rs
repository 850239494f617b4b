//! Configuration loading and parsing.
//!
//! Defines the hub config schema and resolves defaults.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_BIND: &str = "0.0.0.0:3000";
pub const DEFAULT_MEDIA_DIR: &str = "public/audio";
pub const DEFAULT_LEAD_TIME_MS: u64 = 2000;

/// Top-level hub configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Directory holding the playable audio files.
    pub media_dir: Option<String>,
    /// Public base URL advertised to operators and devices.
    pub public_base_url: Option<String>,
    /// Delay between accepting `play` and the shared start instant.
    pub lead_time_ms: Option<u64>,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Load `--config` when given, else `config.toml` beside the executable if it exists.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let auto_path = std::env::current_exe()
            .ok()
            .and_then(|path| path.parent().map(|dir| dir.join("config.toml")));
        match auto_path {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// Parse an optional bind address from config.
pub fn bind_from_config(cfg: &ServerConfig) -> Result<Option<SocketAddr>> {
    let Some(bind) = cfg.bind.as_deref() else {
        return Ok(None);
    };
    let addr = bind.parse().with_context(|| format!("parse bind {bind}"))?;
    Ok(Some(addr))
}

/// Extract the media directory from config, falling back to `public/audio`.
pub fn media_dir_from_config(cfg: &ServerConfig) -> PathBuf {
    cfg.media_dir
        .as_deref()
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_DIR))
}

/// Derive the public base URL from config or the bind address.
///
/// An unspecified bind (`0.0.0.0`) advertises the first routable local address,
/// or `localhost` when none can be found.
pub fn public_base_url_from_config(cfg: &ServerConfig, bind: SocketAddr) -> String {
    if let Some(url) = cfg.public_base_url.as_ref() {
        return url.trim_end_matches('/').to_string();
    }

    if bind.ip().is_unspecified() {
        let host = local_ip()
            .filter(|ip| !ip.is_loopback())
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "localhost".to_string());
        return format!("http://{}:{}", host, bind.port());
    }

    format!("http://{}", bind)
}

/// WebSocket endpoint for a public base URL.
pub fn ws_url_for(base_url: &str) -> String {
    let trimmed = base_url.trim_end_matches('/');
    let ws = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{trimmed}")
    };
    format!("{ws}/ws")
}

/// Determine a best-effort local IP for advertisement.
fn local_ip() -> Option<IpAddr> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    if socket.connect("8.8.8.8:80").is_err() && socket.connect("1.1.1.1:80").is_err() {
        return None;
    }
    socket.local_addr().ok().map(|addr| addr.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_base_url_uses_config_when_present() {
        let cfg = ServerConfig {
            public_base_url: Some("http://example.com/".to_string()),
            ..ServerConfig::default()
        };
        let bind: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(public_base_url_from_config(&cfg, bind), "http://example.com");
    }

    #[test]
    fn public_base_url_uses_specific_bind() {
        let cfg = ServerConfig::default();
        let bind: SocketAddr = "192.168.1.20:3000".parse().unwrap();
        assert_eq!(
            public_base_url_from_config(&cfg, bind),
            "http://192.168.1.20:3000"
        );
    }

    #[test]
    fn public_base_url_keeps_port_for_unspecified_bind() {
        let cfg = ServerConfig::default();
        let bind: SocketAddr = "0.0.0.0:3000".parse().unwrap();
        let url = public_base_url_from_config(&cfg, bind);
        assert!(url.starts_with("http://"));
        assert!(url.ends_with(":3000"));
        assert!(!url.contains("0.0.0.0"));
    }

    #[test]
    fn bind_from_config_parses_when_present() {
        let cfg = ServerConfig {
            bind: Some("127.0.0.1:9000".to_string()),
            ..ServerConfig::default()
        };
        let addr = bind_from_config(&cfg).unwrap().unwrap();
        assert_eq!(addr, "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn bind_from_config_rejects_garbage() {
        let cfg = ServerConfig {
            bind: Some("not-an-addr".to_string()),
            ..ServerConfig::default()
        };
        assert!(bind_from_config(&cfg).is_err());
    }

    #[test]
    fn media_dir_defaults_when_blank() {
        let cfg = ServerConfig {
            media_dir: Some("  ".to_string()),
            ..ServerConfig::default()
        };
        assert_eq!(media_dir_from_config(&cfg), PathBuf::from(DEFAULT_MEDIA_DIR));
    }

    #[test]
    fn ws_url_switches_scheme() {
        assert_eq!(ws_url_for("http://10.0.0.2:3000/"), "ws://10.0.0.2:3000/ws");
        assert_eq!(ws_url_for("https://hub.example"), "wss://hub.example/ws");
    }

    #[test]
    fn load_parses_toml_file() {
        let dir = std::env::temp_dir().join(format!(
            "clicktrack-hub-config-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "bind = \"127.0.0.1:4000\"\nlead_time_ms = 500\n").unwrap();
        let cfg = ServerConfig::load_or_default(Some(&path)).unwrap();
        assert_eq!(cfg.lead_time_ms, Some(500));
        assert_eq!(cfg.bind.as_deref(), Some("127.0.0.1:4000"));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
