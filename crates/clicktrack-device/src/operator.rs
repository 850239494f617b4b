//! One-shot operator commands: `tracks`, `play`, `stop`, `seek`, `status`.
//!
//! Each command opens its own WebSocket, sends one request and waits for the
//! reply carrying the same `request_id`.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clicktrack_types::{ClientMessage, PlaybackSession, ServerMessage, TrackSummary, unix_millis};
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use crate::clock;
use crate::config::OperatorConfig;
use crate::error::DeviceError;
use crate::net::{http, ws};
use crate::timeline::{self, SeekGesture};

/// Where a `seek` should land.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SeekTarget {
    Seconds(f64),
    /// Fraction of the live track's duration.
    Fraction(f64),
}

pub fn tracks(config: &OperatorConfig) -> Result<()> {
    let tracks = http::fetch_tracks(&config.server)?;
    if tracks.is_empty() {
        println!("No tracks available.");
    }
    for track in &tracks {
        println!("{}", track_line(track));
    }
    Ok(())
}

pub fn play(config: &OperatorConfig, track_id: &str) -> Result<()> {
    let reply = block_on(async {
        let mut session = OperatorSession::connect(config).await?;
        let reply = session
            .request("play", |request_id| ClientMessage::Play {
                request_id,
                track_id: track_id.to_string(),
            })
            .await?;
        session.close().await;
        Ok(reply)
    })?;
    match reply {
        ServerMessage::PlayAccepted {
            track_id, start_at, ..
        } => {
            println!("Playing {track_id} at {start_at}");
            Ok(())
        }
        ServerMessage::PlayRejected { error, .. } => bail!("{error}"),
        other => Err(unexpected(&other)),
    }
}

pub fn stop(config: &OperatorConfig) -> Result<()> {
    block_on(async {
        let mut session = OperatorSession::connect(config).await?;
        session.send(&ClientMessage::Stop).await?;
        session.close().await;
        Ok(())
    })?;
    println!("Stopped.");
    Ok(())
}

pub fn seek(config: &OperatorConfig, target: SeekTarget) -> Result<()> {
    let mut gesture = SeekGesture::new();
    let target_seconds = match target {
        SeekTarget::Seconds(seconds) => seconds,
        SeekTarget::Fraction(fraction) => {
            let live = block_on(async {
                let mut session = OperatorSession::connect(config).await?;
                let live = session.resync().await?;
                session.close().await;
                Ok(live)
            })?;
            let live = live.ok_or_else(|| anyhow!("{}", timeline::NOTHING_PLAYING))?;
            let duration_ms = track_duration(&config.server, &live.track_id)?
                .ok_or_else(|| anyhow!("Duration of {} is unknown.", live.track_id))?;
            gesture
                .begin(fraction, duration_ms)
                .ok_or_else(|| anyhow!("A seek is already in progress."))?
        }
    };

    let reply = block_on(async {
        let mut session = OperatorSession::connect(config).await?;
        let reply = session
            .request("seek", |request_id| ClientMessage::Seek {
                request_id,
                target_seconds,
            })
            .await?;
        session.close().await;
        Ok(reply)
    });
    gesture.release();
    match reply? {
        ServerMessage::SeekAccepted { .. } => {
            println!("Seeked to {}", timeline::format_time(target_seconds));
            Ok(())
        }
        ServerMessage::SeekRejected { error, .. } => bail!("{error}"),
        other => Err(unexpected(&other)),
    }
}

pub fn status(config: &OperatorConfig) -> Result<()> {
    let (offset_ms, live) = block_on(async {
        let mut session = OperatorSession::connect(config).await?;
        let offset_ms = session.sync_clock().await?;
        let live = session.resync().await?;
        session.close().await;
        Ok((offset_ms, live))
    })?;
    let duration_ms = match &live {
        Some(live) => track_duration(&config.server, &live.track_id)?,
        None => None,
    };
    println!(
        "{}",
        timeline::status_line(live.as_ref(), unix_millis() + offset_ms, duration_ms)
    );
    Ok(())
}

struct OperatorSession {
    ws: ws::WsStream,
    next_id: u64,
    timeout: Duration,
}

impl OperatorSession {
    async fn connect(config: &OperatorConfig) -> Result<Self> {
        let ws = ws::connect(&http::ws_url(&config.server)).await?;
        Ok(Self {
            ws,
            next_id: 1,
            timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        ws::send(&mut self.ws, msg).await
    }

    /// Send the request built for a fresh id and wait for its reply.
    ///
    /// `hello`, broadcasts and replies to other ids are skipped.
    async fn request(
        &mut self,
        kind: &'static str,
        build: impl FnOnce(u64) -> ClientMessage,
    ) -> Result<ServerMessage> {
        let request_id = self.next_id;
        self.next_id += 1;
        self.send(&build(request_id)).await?;

        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.ws.next())
                .await
                .map_err(|_| DeviceError::SyncTimeout { kind, request_id })?;
            match frame {
                None => bail!("hub closed the connection"),
                Some(Err(err)) => return Err(err).context("read frame"),
                Some(Ok(Message::Text(text))) => {
                    if let Some(msg) = ws::decode_text(&text) {
                        if msg.request_id() == Some(request_id) {
                            return Ok(msg);
                        }
                    }
                }
                Some(Ok(_)) => {}
            }
        }
    }

    /// One `sync` round trip; returns the estimated offset in ms.
    async fn sync_clock(&mut self) -> Result<i64> {
        let sent_at = unix_millis();
        let reply = self
            .request("sync", |request_id| ClientMessage::Sync {
                request_id,
                sent_at,
            })
            .await?;
        match reply {
            ServerMessage::SyncReply {
                coordinator_now, ..
            } => clock::estimate(sent_at, unix_millis(), coordinator_now)
                .map(|est| est.offset_ms)
                .ok_or_else(|| anyhow!("local clock went backwards during sync")),
            other => Err(unexpected(&other)),
        }
    }

    async fn resync(&mut self) -> Result<Option<PlaybackSession>> {
        match self
            .request("resync", |request_id| ClientMessage::Resync { request_id })
            .await?
        {
            ServerMessage::ResyncReply { session, .. } => Ok(session),
            other => Err(unexpected(&other)),
        }
    }

    async fn close(mut self) {
        if let Err(err) = self.ws.close(None).await {
            tracing::debug!(error = %err, "websocket close");
        }
    }
}

fn block_on<F, T>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?
        .block_on(fut)
}

fn track_duration(server: &str, track_id: &str) -> Result<Option<u64>> {
    let tracks = http::fetch_tracks(server)?;
    Ok(tracks
        .into_iter()
        .find(|t| t.id == track_id)
        .and_then(|t| t.duration_ms))
}

fn track_line(track: &TrackSummary) -> String {
    let duration = track
        .duration_ms
        .map(|ms| timeline::format_time(ms as f64 / 1000.0))
        .unwrap_or_else(|| "--:--".to_string());
    format!("{}\t{}\t{duration}", track.id, track.title)
}

fn unexpected(msg: &ServerMessage) -> anyhow::Error {
    anyhow!("unexpected reply from hub: {msg:?}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_line_shows_duration_when_known() {
        let mut track = TrackSummary {
            id: "intro".into(),
            title: "intro".into(),
            url: "/audio/intro.mp3".into(),
            duration_ms: Some(125_400),
        };
        assert_eq!(track_line(&track), "intro\tintro\t2:05");
        track.duration_ms = None;
        assert_eq!(track_line(&track), "intro\tintro\t--:--");
    }
}
