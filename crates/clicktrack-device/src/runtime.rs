//! `clicktrack listen`: follow the hub as a playback device.
//!
//! [`DeviceCore`] holds the protocol logic and returns the frames to send, so it
//! runs without a socket. [`Listener`] owns the socket and drives one
//! current-thread `select!` loop over hub frames, the machine's single deadline,
//! engine events, stdin commands, request expiry and tracks arriving from the
//! background catalog preload.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use clicktrack_types::{ClientMessage, PlaybackSession, ServerMessage, TrackSummary, unix_millis};
use futures_util::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};

use crate::clock::ClockSync;
use crate::config::ListenConfig;
use crate::engine::cpal_engine::{CpalEngine, LoadedTrack, prepare_track};
use crate::engine::{EngineEvent, PlaybackEngine, device};
use crate::error::DeviceError;
use crate::machine::{MachineRequest, PlaybackMachine, PlaybackView};
use crate::net::requests::{PendingKind, PendingRequests};
use crate::net::{http, ws};
use crate::timeline::{self, SeekGesture, Timeline};

const EXPIRY_TICK: Duration = Duration::from_millis(500);

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)
}

/// Open the output device and follow the hub until interrupted.
pub fn run_listen(config: ListenConfig) -> Result<()> {
    if let Err(err) = ctrlc::set_handler(|| std::process::exit(130)) {
        tracing::warn!(error = %err, "failed to install ctrl-c handler");
    }

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let (preload_tx, preload_rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = CpalEngine::open(
        &config.server,
        config.device.as_deref(),
        config.output_rate,
        events_tx,
    )?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    let listener = Listener::new(config, engine, preload_tx);
    runtime.block_on(listener.run(events_rx, preload_rx))
}

/// Progress of a background catalog preload.
enum Preload {
    Loaded(LoadedTrack),
    Finished { loaded: usize },
}

/// Prepare every catalog track not in `skip` and hand each one to `deliver`.
///
/// Failures are per track and never fatal. Stops once `deliver` returns `false`.
/// Returns how many tracks were delivered.
pub fn preload_catalog<T>(
    tracks: &[TrackSummary],
    skip: &HashSet<String>,
    mut prepare: impl FnMut(&TrackSummary) -> Result<T>,
    mut deliver: impl FnMut(T) -> bool,
) -> usize {
    let mut loaded = 0;
    for track in tracks.iter().filter(|t| !skip.contains(&t.id)) {
        match prepare(track) {
            Ok(prepared) => {
                if !deliver(prepared) {
                    break;
                }
                loaded += 1;
            }
            Err(err) => tracing::warn!(track_id = %track.id, "preload failed: {err:#}"),
        }
    }
    loaded
}

/// Protocol state of one listening device.
pub struct DeviceCore<E> {
    machine: PlaybackMachine<E>,
    clock: ClockSync,
    requests: PendingRequests,
    syncing: bool,
    seek: SeekGesture,
}

impl<E: PlaybackEngine> DeviceCore<E> {
    pub fn new(engine: E, config: &ListenConfig) -> Self {
        Self {
            machine: PlaybackMachine::new(engine, config.settle_ms),
            clock: ClockSync::new(config.sync_samples),
            requests: PendingRequests::new(config.request_timeout_ms),
            syncing: false,
            seek: SeekGesture::new(),
        }
    }

    pub fn machine(&self) -> &PlaybackMachine<E> {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut PlaybackMachine<E> {
        &mut self.machine
    }

    /// Fresh connection: start a sync burst, then resync.
    pub fn on_connected(&mut self, local_now: i64) -> Vec<ClientMessage> {
        self.requests.clear();
        self.clock.begin_burst();
        self.syncing = true;
        vec![self.sync_request(local_now)]
    }

    pub fn on_disconnected(&mut self) {
        self.requests.clear();
        self.syncing = false;
        self.seek.release();
    }

    /// Tracks finished loading in the background. An idle device resyncs so a
    /// session it could not join earlier starts now.
    pub fn on_tracks_ready(&mut self, local_now: i64) -> Vec<ClientMessage> {
        if self.syncing || *self.machine.view() != PlaybackView::Idle {
            return Vec::new();
        }
        vec![self.resync_request(local_now)]
    }

    /// `seek <fraction>` typed on stdin. Only one seek is in flight at a time;
    /// the latch is released by the hub's answer or the request timeout.
    pub fn seek_request(&mut self, fraction: f64, local_now: i64) -> Result<ClientMessage, String> {
        let track_id = self
            .machine
            .view()
            .track_id()
            .ok_or_else(|| timeline::NOTHING_PLAYING.to_string())?;
        let duration_ms = self
            .machine
            .engine()
            .duration(track_id)
            .map(|d| d.as_millis() as u64)
            .ok_or_else(|| format!("Duration of {track_id} is unknown."))?;
        let target_seconds = self
            .seek
            .begin(fraction, duration_ms)
            .ok_or_else(|| "A seek is already in progress.".to_string())?;
        let request_id = self.requests.issue(PendingKind::Seek, local_now);
        Ok(ClientMessage::Seek {
            request_id,
            target_seconds,
        })
    }

    pub fn on_server_message(&mut self, msg: ServerMessage, local_now: i64) -> Vec<ClientMessage> {
        match msg {
            ServerMessage::Hello { connection_id } => {
                tracing::info!(connection_id = %connection_id, "hub hello");
                Vec::new()
            }
            ServerMessage::SyncReply {
                request_id,
                coordinator_now,
                echoed_sent_at,
            } => match self.requests.resolve(request_id) {
                Some(PendingKind::Sync { sent_at }) => {
                    if sent_at != echoed_sent_at {
                        tracing::debug!(sent_at, echoed_sent_at, "sync echo mismatch");
                    }
                    if let Some(est) = self.clock.record(sent_at, local_now, coordinator_now) {
                        tracing::info!(offset_ms = est.offset_ms, rtt_ms = est.rtt_ms, "clock offset");
                        self.machine.set_clock_offset(self.clock.offset_ms());
                    }
                    self.advance_burst(local_now)
                }
                _ => {
                    tracing::debug!(request_id, "unmatched sync reply");
                    Vec::new()
                }
            },
            ServerMessage::ResyncReply {
                request_id,
                session,
                ..
            } => {
                if self.requests.resolve(request_id).is_none() {
                    tracing::debug!(request_id, "unmatched resync reply");
                    return Vec::new();
                }
                let result = self.machine.on_resync(session, local_now);
                report(result);
                Vec::new()
            }
            ServerMessage::Play { track_id, start_at } => {
                tracing::info!(track_id = %track_id, start_at, "play broadcast");
                let result = self
                    .machine
                    .on_play(PlaybackSession::new(track_id, start_at), local_now);
                report(result);
                Vec::new()
            }
            ServerMessage::Stop => {
                self.machine.on_stop();
                Vec::new()
            }
            ServerMessage::Seek { track_id, start_at } => {
                tracing::info!(track_id = %track_id, start_at, "seek broadcast");
                let result = self
                    .machine
                    .on_seek(PlaybackSession::new(track_id, start_at), local_now);
                report(result);
                Vec::new()
            }
            ServerMessage::SeekAccepted { request_id, .. } => {
                if self.claim_seek(request_id) {
                    if let Some(target) = self.seek.release() {
                        tracing::info!("Seeked to {}", timeline::format_time(target));
                    }
                }
                Vec::new()
            }
            ServerMessage::SeekRejected { request_id, error } => {
                if self.claim_seek(request_id) {
                    self.seek.release();
                    tracing::warn!(error = %error, "seek rejected");
                }
                Vec::new()
            }
            other => {
                tracing::debug!(reply = ?other, "ignoring operator reply");
                Vec::new()
            }
        }
    }

    pub fn on_timer(&mut self, local_now: i64) -> Vec<ClientMessage> {
        match self.machine.poll_timer(local_now) {
            Ok(Some(MachineRequest::Resync)) => vec![self.resync_request(local_now)],
            Ok(None) => Vec::new(),
            Err(err) => {
                report(Err(err));
                Vec::new()
            }
        }
    }

    pub fn on_engine_event(&mut self, event: EngineEvent) {
        self.machine.on_engine_event(event);
    }

    /// Forget requests past the timeout; a timed-out sync still advances the burst.
    pub fn on_expiry(&mut self, local_now: i64) -> Vec<ClientMessage> {
        let mut out = Vec::new();
        for (request_id, kind) in self.requests.expire(local_now) {
            let err = DeviceError::SyncTimeout {
                kind: kind.label(),
                request_id,
            };
            tracing::warn!("{err}");
            match kind {
                PendingKind::Sync { .. } => {
                    self.clock.record_timeout();
                    out.extend(self.advance_burst(local_now));
                }
                PendingKind::Seek => {
                    self.seek.release();
                }
                PendingKind::Resync => {}
            }
        }
        out
    }

    pub fn resync_request(&mut self, local_now: i64) -> ClientMessage {
        let request_id = self.requests.issue(PendingKind::Resync, local_now);
        ClientMessage::Resync { request_id }
    }

    /// What `status` on stdin prints.
    pub fn status_line(&self, local_now: i64) -> String {
        let corrected_now = self.clock.corrected_now(local_now);
        match self.machine.view() {
            PlaybackView::Idle => timeline::NOTHING_PLAYING.to_string(),
            PlaybackView::Scheduled { track_id, start_at } => format!(
                "Scheduled: {track_id} in {}",
                timeline::format_time(start_at.saturating_sub(corrected_now) as f64 / 1000.0)
            ),
            PlaybackView::Playing { track_id, start_at } => {
                let duration_ms = self
                    .machine
                    .engine()
                    .duration(track_id)
                    .map(|d| d.as_millis() as u64);
                let session = PlaybackSession::new(track_id.clone(), *start_at);
                let timeline = Timeline::at(&session, corrected_now, duration_ms);
                match timeline.progress() {
                    _ if timeline.finished() => timeline::NOTHING_PLAYING.to_string(),
                    Some(progress) => format!("{} ({:.0}%)", timeline.render(), progress * 100.0),
                    None => timeline.render(),
                }
            }
        }
    }

    fn claim_seek(&mut self, request_id: u64) -> bool {
        match self.requests.resolve(request_id) {
            Some(PendingKind::Seek) => true,
            _ => {
                tracing::debug!(request_id, "unmatched seek reply");
                false
            }
        }
    }

    fn sync_request(&mut self, local_now: i64) -> ClientMessage {
        let request_id = self
            .requests
            .issue(PendingKind::Sync { sent_at: local_now }, local_now);
        ClientMessage::Sync {
            request_id,
            sent_at: local_now,
        }
    }

    fn advance_burst(&mut self, local_now: i64) -> Vec<ClientMessage> {
        if !self.syncing {
            return Vec::new();
        }
        if !self.clock.burst_complete() {
            return vec![self.sync_request(local_now)];
        }
        self.syncing = false;
        vec![self.resync_request(local_now)]
    }
}

fn report(result: Result<(), DeviceError>) {
    if let Err(err) = result {
        tracing::warn!("{err}");
    }
}

struct Listener {
    config: ListenConfig,
    ws_url: String,
    core: DeviceCore<CpalEngine>,
    ws: Option<ws::WsStream>,
    preload_tx: UnboundedSender<Preload>,
    preload: Option<JoinHandle<()>>,
}

impl Listener {
    fn new(config: ListenConfig, engine: CpalEngine, preload_tx: UnboundedSender<Preload>) -> Self {
        let core = DeviceCore::new(engine, &config);
        Self {
            ws_url: http::ws_url(&config.server),
            config,
            core,
            ws: None,
            preload_tx,
            preload: None,
        }
    }

    async fn run(
        mut self,
        mut events: UnboundedReceiver<EngineEvent>,
        mut preloads: UnboundedReceiver<Preload>,
    ) -> Result<()> {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        let mut stdin_open = true;
        let mut expiry = tokio::time::interval(EXPIRY_TICK);
        let reconnect_delay = Duration::from_millis(self.config.reconnect_ms);
        let mut reconnect_at = Some(Instant::now());

        loop {
            if self.ws.is_none() && reconnect_at.is_none() {
                reconnect_at = Some(Instant::now() + reconnect_delay);
            }
            let deadline = self.core.machine().next_deadline();

            tokio::select! {
                frame = next_frame(&mut self.ws) => self.on_frame(frame).await,
                _ = sleep_until_local(deadline), if deadline.is_some() => {
                    let out = self.core.on_timer(unix_millis());
                    self.send_all(out).await;
                }
                Some(event) = events.recv() => self.core.on_engine_event(event),
                Some(preload) = preloads.recv() => self.on_preload(preload).await,
                line = stdin.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => self.on_command(line.trim()).await,
                    Ok(None) => stdin_open = false,
                    Err(err) => {
                        tracing::warn!(error = %err, "stdin closed");
                        stdin_open = false;
                    }
                },
                _ = expiry.tick() => {
                    let out = self.core.on_expiry(unix_millis());
                    self.send_all(out).await;
                }
                _ = tokio::time::sleep_until(reconnect_at.unwrap_or_else(Instant::now)),
                    if self.ws.is_none() =>
                {
                    reconnect_at = None;
                    self.connect().await;
                }
            }
        }
    }

    async fn connect(&mut self) {
        match ws::connect(&self.ws_url).await {
            Ok(stream) => {
                tracing::info!(url = %self.ws_url, "connected");
                self.ws = Some(stream);
                self.spawn_preload();
                let out = self.core.on_connected(unix_millis());
                self.send_all(out).await;
            }
            Err(err) => tracing::warn!(
                reconnect_ms = self.config.reconnect_ms,
                "hub unreachable: {err:#}"
            ),
        }
    }

    /// Fetch the catalog and prepare missing tracks on the blocking pool.
    fn spawn_preload(&mut self) {
        if self.preload.as_ref().is_some_and(|task| !task.is_finished()) {
            tracing::debug!("catalog preload still running");
            return;
        }
        let server = self.config.server.clone();
        let engine = self.core.machine().engine();
        let output_rate = engine.output_rate();
        let skip = engine.loaded_ids();
        let tx = self.preload_tx.clone();
        self.preload = Some(tokio::task::spawn_blocking(move || {
            let tracks = match http::fetch_tracks(&server) {
                Ok(tracks) => tracks,
                Err(err) => {
                    tracing::warn!("catalog unavailable: {err:#}");
                    return;
                }
            };
            let loaded = preload_catalog(
                &tracks,
                &skip,
                |track| prepare_track(&server, output_rate, &track.id, &track.url),
                |track| tx.send(Preload::Loaded(track)).is_ok(),
            );
            tracing::info!(loaded, catalog = tracks.len(), "catalog preloaded");
            if tx.send(Preload::Finished { loaded }).is_err() {
                tracing::debug!("listener gone before preload finished");
            }
        }));
    }

    async fn on_preload(&mut self, preload: Preload) {
        match preload {
            Preload::Loaded(track) => self.core.machine_mut().engine_mut().insert_track(track),
            Preload::Finished { loaded } => {
                if loaded > 0 && self.ws.is_some() {
                    let out = self.core.on_tracks_ready(unix_millis());
                    self.send_all(out).await;
                }
            }
        }
    }

    fn disconnect(&mut self, reason: &str) {
        self.ws = None;
        self.core.on_disconnected();
        tracing::warn!(reason, reconnect_ms = self.config.reconnect_ms, "disconnected from hub");
    }

    async fn on_frame(&mut self, frame: Option<Result<Message, tungstenite::Error>>) {
        match frame {
            Some(Ok(Message::Text(text))) => {
                if let Some(msg) = ws::decode_text(&text) {
                    let out = self.core.on_server_message(msg, unix_millis());
                    self.send_all(out).await;
                }
            }
            Some(Ok(Message::Close(_))) | None => self.disconnect("closed"),
            Some(Err(err)) => self.disconnect(&err.to_string()),
            Some(Ok(_)) => {}
        }
    }

    async fn on_command(&mut self, line: &str) {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (None, _) => {}
            (Some("resync"), None) => {
                let msg = self.core.resync_request(unix_millis());
                self.send_all(vec![msg]).await;
            }
            (Some("status"), None) => println!("{}", self.core.status_line(unix_millis())),
            (Some("seek"), Some(arg)) => {
                let Ok(fraction) = arg.parse::<f64>() else {
                    println!("Usage: seek <fraction 0..1>");
                    return;
                };
                if self.ws.is_none() {
                    println!("Not connected to the hub.");
                    return;
                }
                match self.core.seek_request(fraction, unix_millis()) {
                    Ok(msg) => self.send_all(vec![msg]).await,
                    Err(reason) => println!("{reason}"),
                }
            }
            _ => println!("Unknown command: {line} (try `resync`, `status` or `seek <fraction>`)"),
        }
    }

    async fn send_all(&mut self, out: Vec<ClientMessage>) {
        for msg in out {
            let Some(stream) = self.ws.as_mut() else {
                return;
            };
            if let Err(err) = ws::send(stream, &msg).await {
                self.disconnect(&format!("{err:#}"));
                return;
            }
        }
    }
}

async fn next_frame(
    ws: &mut Option<ws::WsStream>,
) -> Option<Result<Message, tungstenite::Error>> {
    match ws.as_mut() {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Sleep until a local wall-clock deadline in ms.
async fn sleep_until_local(deadline: Option<i64>) {
    let Some(deadline) = deadline else {
        return std::future::pending().await;
    };
    let delay_ms = deadline.saturating_sub(unix_millis()).max(0) as u64;
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Default)]
    struct FakeEngine {
        tracks: HashMap<String, Duration>,
        playing: Option<(String, Duration)>,
    }

    impl PlaybackEngine for FakeEngine {
        fn load(&mut self, track_id: &str, _url: &str) -> Result<(), DeviceError> {
            self.tracks
                .insert(track_id.to_string(), Duration::from_secs(100));
            Ok(())
        }

        fn is_loaded(&self, track_id: &str) -> bool {
            self.tracks.contains_key(track_id)
        }

        fn duration(&self, track_id: &str) -> Option<Duration> {
            self.tracks.get(track_id).copied()
        }

        fn play(&mut self, track_id: &str, position: Duration) -> Result<u64, DeviceError> {
            self.playing = Some((track_id.to_string(), position));
            Ok(1)
        }

        fn seek(&mut self, position: Duration) -> Result<(), DeviceError> {
            if let Some((_, pos)) = self.playing.as_mut() {
                *pos = position;
            }
            Ok(())
        }

        fn stop(&mut self) {
            self.playing = None;
        }
    }

    fn config(sync_samples: u32) -> ListenConfig {
        ListenConfig {
            server: "http://127.0.0.1:3000".into(),
            device: None,
            output_rate: 48_000,
            settle_ms: 1_000,
            sync_samples,
            request_timeout_ms: 5_000,
            reconnect_ms: 2_000,
        }
    }

    fn core(sync_samples: u32) -> DeviceCore<FakeEngine> {
        let mut engine = FakeEngine::default();
        engine.load("trackA", "/audio/trackA.mp3").unwrap();
        DeviceCore::new(engine, &config(sync_samples))
    }

    fn sync_id(msg: &ClientMessage) -> u64 {
        match msg {
            ClientMessage::Sync { request_id, .. } => *request_id,
            other => panic!("expected sync, got {other:?}"),
        }
    }

    fn resync_id(msg: &ClientMessage) -> u64 {
        match msg {
            ClientMessage::Resync { request_id } => *request_id,
            other => panic!("expected resync, got {other:?}"),
        }
    }

    #[test]
    fn connect_syncs_then_resyncs_and_joins_session() {
        let mut core = core(1);
        let out = core.on_connected(1_000);
        assert_eq!(out.len(), 1);
        let sync = sync_id(&out[0]);

        let out = core.on_server_message(
            ServerMessage::SyncReply {
                request_id: sync,
                coordinator_now: 6_050,
                echoed_sent_at: 1_000,
            },
            1_100,
        );
        assert_eq!(core.machine().clock_offset(), 5_000);
        let resync = resync_id(&out[0]);

        core.on_server_message(
            ServerMessage::ResyncReply {
                request_id: resync,
                coordinator_now: 6_100,
                session: Some(PlaybackSession::new("trackA", 3_100)),
            },
            1_100,
        );
        assert_eq!(
            core.machine().engine().playing,
            Some(("trackA".to_string(), Duration::from_secs(3)))
        );
    }

    #[test]
    fn burst_sends_every_sample_before_resync() {
        let mut core = core(2);
        let first = sync_id(&core.on_connected(0)[0]);
        let out = core.on_server_message(
            ServerMessage::SyncReply {
                request_id: first,
                coordinator_now: 100,
                echoed_sent_at: 0,
            },
            20,
        );
        let second = sync_id(&out[0]);
        let out = core.on_server_message(
            ServerMessage::SyncReply {
                request_id: second,
                coordinator_now: 130,
                echoed_sent_at: 20,
            },
            30,
        );
        resync_id(&out[0]);
        // second sample had the lower rtt
        assert_eq!(core.machine().clock_offset(), 105);
    }

    #[test]
    fn sync_timeout_still_moves_on_to_resync() {
        let mut core = core(1);
        core.machine_mut().set_clock_offset(42);
        core.on_connected(0);
        assert!(core.on_expiry(4_999).is_empty());
        let out = core.on_expiry(5_000);
        resync_id(&out[0]);
        assert_eq!(core.machine().clock_offset(), 42);
        assert!(core.on_expiry(20_000).is_empty());
    }

    #[test]
    fn broadcasts_drive_the_machine() {
        let mut core = core(1);
        core.on_server_message(
            ServerMessage::Play {
                track_id: "trackA".into(),
                start_at: 3_000,
            },
            1_000,
        );
        assert!(matches!(
            core.machine().view(),
            PlaybackView::Scheduled { .. }
        ));
        assert!(core.on_timer(2_000).is_empty());
        assert!(core.on_timer(3_000).is_empty());
        assert!(matches!(core.machine().view(), PlaybackView::Playing { .. }));
        resync_id(&core.on_timer(4_000)[0]);

        core.on_server_message(ServerMessage::Stop, 4_100);
        assert_eq!(core.machine().view(), &PlaybackView::Idle);
        assert_eq!(core.machine().engine().playing, None);
    }

    #[test]
    fn unmatched_replies_are_ignored() {
        let mut core = core(1);
        let out = core.on_server_message(
            ServerMessage::ResyncReply {
                request_id: 99,
                coordinator_now: 0,
                session: Some(PlaybackSession::new("trackA", 0)),
            },
            1_000,
        );
        assert!(out.is_empty());
        assert_eq!(core.machine().view(), &PlaybackView::Idle);
    }

    #[test]
    fn status_line_tracks_view() {
        let mut core = core(1);
        assert_eq!(core.status_line(0), timeline::NOTHING_PLAYING);
        core.on_server_message(
            ServerMessage::Play {
                track_id: "trackA".into(),
                start_at: 65_000,
            },
            0,
        );
        assert_eq!(core.status_line(0), "Scheduled: trackA in 1:05");
        core.on_timer(65_000);
        assert_eq!(
            core.status_line(75_000),
            "Now playing: trackA 0:10 / 1:40 (10%)"
        );
        assert_eq!(core.status_line(165_000), timeline::NOTHING_PLAYING);
    }

    fn playing_core() -> DeviceCore<FakeEngine> {
        let mut core = core(1);
        core.on_server_message(
            ServerMessage::Play {
                track_id: "trackA".into(),
                start_at: 0,
            },
            0,
        );
        core.on_timer(0);
        core
    }

    fn seek_of(msg: ClientMessage) -> (u64, f64) {
        match msg {
            ClientMessage::Seek {
                request_id,
                target_seconds,
            } => (request_id, target_seconds),
            other => panic!("expected seek, got {other:?}"),
        }
    }

    #[test]
    fn seek_needs_a_live_track() {
        let mut core = core(1);
        assert_eq!(
            core.seek_request(0.5, 0),
            Err(timeline::NOTHING_PLAYING.to_string())
        );
    }

    #[test]
    fn seek_latch_holds_until_the_hub_answers() {
        let mut core = playing_core();
        let (id, target) = seek_of(core.seek_request(0.5, 1_000).unwrap());
        assert_eq!(target, 50.0);
        assert_eq!(
            core.seek_request(0.9, 1_100),
            Err("A seek is already in progress.".to_string())
        );

        // a reply for another id leaves the latch closed
        core.on_server_message(
            ServerMessage::SeekAccepted {
                request_id: id + 100,
                start_at: 0,
            },
            1_200,
        );
        assert!(core.seek_request(0.9, 1_200).is_err());

        core.on_server_message(
            ServerMessage::SeekAccepted {
                request_id: id,
                start_at: -50_000,
            },
            1_300,
        );
        let (_, target) = seek_of(core.seek_request(0.25, 1_400).unwrap());
        assert_eq!(target, 25.0);
    }

    #[test]
    fn seek_latch_released_by_rejection_timeout_and_disconnect() {
        let mut core = playing_core();
        let (id, _) = seek_of(core.seek_request(0.1, 1_000).unwrap());
        core.on_server_message(
            ServerMessage::SeekRejected {
                request_id: id,
                error: "No active session.".into(),
            },
            1_100,
        );

        core.seek_request(0.2, 2_000).unwrap();
        assert!(core.on_expiry(7_000).is_empty());
        assert!(core.seek_request(0.3, 7_000).is_ok());

        core.on_disconnected();
        assert!(core.seek_request(0.4, 8_000).is_ok());
    }

    #[test]
    fn tracks_ready_resyncs_only_when_idle_and_not_syncing() {
        let mut core = core(1);
        resync_id(&core.on_tracks_ready(0)[0]);

        core.on_connected(0);
        assert!(core.on_tracks_ready(10).is_empty());

        let mut core = playing_core();
        assert!(core.on_tracks_ready(1_000).is_empty());
    }

    #[test]
    fn preload_skips_loaded_and_survives_failures() {
        let tracks: Vec<TrackSummary> = ["a", "b", "c", "d"]
            .iter()
            .map(|id| TrackSummary {
                id: id.to_string(),
                title: id.to_string(),
                url: format!("/audio/{id}.mp3"),
                duration_ms: None,
            })
            .collect();
        let skip: HashSet<String> = ["b".to_string()].into_iter().collect();
        let mut prepared = Vec::new();
        let mut delivered = Vec::new();
        let loaded = preload_catalog(
            &tracks,
            &skip,
            |track| {
                prepared.push(track.id.clone());
                if track.id == "c" {
                    anyhow::bail!("decode failed");
                }
                Ok(track.url.clone())
            },
            |url| {
                delivered.push(url);
                true
            },
        );
        assert_eq!(loaded, 2);
        assert_eq!(prepared, vec!["a", "c", "d"]);
        assert_eq!(delivered, vec!["/audio/a.mp3", "/audio/d.mp3"]);
    }

    #[test]
    fn preload_stops_when_nobody_listens() {
        let tracks: Vec<TrackSummary> = ["a", "b"]
            .iter()
            .map(|id| TrackSummary {
                id: id.to_string(),
                title: id.to_string(),
                url: format!("/audio/{id}.mp3"),
                duration_ms: None,
            })
            .collect();
        let mut prepared = 0;
        let loaded = preload_catalog(
            &tracks,
            &HashSet::new(),
            |_| {
                prepared += 1;
                Ok(())
            },
            |()| false,
        );
        assert_eq!(loaded, 0);
        assert_eq!(prepared, 1);
    }
}
