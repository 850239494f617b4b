//! Blocking HTTP calls to the hub.

use anyhow::{Context, Result};
use clicktrack_types::{TrackSummary, TracksResponse};
use serde::de::DeserializeOwned;

const MAX_AUDIO_BYTES: u64 = 256 * 1024 * 1024;

/// `GET /tracks`.
pub fn fetch_tracks(server: &str) -> Result<Vec<TrackSummary>> {
    let url = format!("{}/tracks", server.trim_end_matches('/'));
    let resp: TracksResponse = read_json(
        ureq::get(&url).call().context("request /tracks")?,
        "tracks",
    )?;
    Ok(resp.tracks)
}

/// Download an audio file named by a catalog URL.
pub fn fetch_audio(server: &str, track_url: &str) -> Result<Vec<u8>> {
    let url = resolve_url(server, track_url);
    let resp = ureq::get(&url)
        .call()
        .with_context(|| format!("request {url}"))?;
    resp.into_body()
        .with_config()
        .limit(MAX_AUDIO_BYTES)
        .read_to_vec()
        .with_context(|| format!("read {url}"))
}

/// Join a hub-relative URL onto the server base; absolute URLs pass through.
pub fn resolve_url(server: &str, track_url: &str) -> String {
    if track_url.starts_with("http://") || track_url.starts_with("https://") {
        return track_url.to_string();
    }
    format!(
        "{}/{}",
        server.trim_end_matches('/'),
        track_url.trim_start_matches('/')
    )
}

/// WebSocket endpoint for an HTTP server base.
pub fn ws_url(server: &str) -> String {
    let trimmed = server.trim_end_matches('/');
    let base = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("ws://{trimmed}")
    };
    format!("{base}/ws")
}

/// Lowercased file extension of a URL path, ignoring any query string.
pub fn extension_hint(track_url: &str) -> Option<String> {
    let path = track_url.split(['?', '#']).next().unwrap_or(track_url);
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

fn read_json<T: DeserializeOwned>(
    mut resp: ureq::http::Response<ureq::Body>,
    label: &str,
) -> Result<T> {
    let body = resp
        .body_mut()
        .read_to_string()
        .with_context(|| format!("read /{label} response body"))?;
    serde_json::from_str(&body).with_context(|| format!("decode /{label} response"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_url_joins_relative_paths() {
        assert_eq!(
            resolve_url("http://hub:3000/", "/audio/a%20b.mp3"),
            "http://hub:3000/audio/a%20b.mp3"
        );
        assert_eq!(
            resolve_url("http://hub:3000", "https://cdn/x.mp3"),
            "https://cdn/x.mp3"
        );
    }

    #[test]
    fn ws_url_maps_scheme() {
        assert_eq!(ws_url("http://127.0.0.1:3000"), "ws://127.0.0.1:3000/ws");
        assert_eq!(ws_url("https://hub.example/"), "wss://hub.example/ws");
    }

    #[test]
    fn extension_hint_reads_last_segment() {
        assert_eq!(extension_hint("/audio/Intro.MP3"), Some("mp3".to_string()));
        assert_eq!(extension_hint("/audio/track.flac?v=2"), Some("flac".to_string()));
        assert_eq!(extension_hint("/audio/noext"), None);
    }
}
