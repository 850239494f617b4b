//! CPAL-backed [`PlaybackEngine`].
//!
//! One output stream stays open for the life of the engine. Tracks are decoded
//! and resampled to the stream rate at load time; playing swaps the cursor the
//! audio callback reads from, so starts and seeks take effect on the next buffer.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use tokio::sync::mpsc::UnboundedSender;

use super::{EngineEvent, PlaybackEngine, decode, device, resample};
use crate::error::DeviceError;
use crate::net::http;

/// Track decoded at the output rate.
#[derive(Debug)]
pub struct LoadedTrack {
    pub id: String,
    pub channels: usize,
    pub samples: Vec<f32>,
    pub duration: Duration,
}

impl LoadedTrack {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }
}

/// What the audio callback is reading.
#[derive(Default)]
struct OutputCursor {
    track: Option<Arc<LoadedTrack>>,
    pos_frame: usize,
    generation: u64,
}

pub struct CpalEngine {
    server: String,
    output_rate: u32,
    tracks: HashMap<String, Arc<LoadedTrack>>,
    cursor: Arc<Mutex<OutputCursor>>,
    generation: u64,
    _stream: cpal::Stream,
}

impl CpalEngine {
    /// Open the output device and start a silent stream.
    pub fn open(
        server: &str,
        device_needle: Option<&str>,
        target_rate: u32,
        events: UnboundedSender<EngineEvent>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, device_needle)?;
        let config = device::pick_output_config(&device, Some(target_rate))?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = device::pick_buffer_size(&config) {
            stream_config.buffer_size = buf;
        }
        tracing::info!(
            device = %device.description()?,
            output_rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            buffer_size = ?stream_config.buffer_size,
            "device output config"
        );

        let cursor = Arc::new(Mutex::new(OutputCursor::default()));
        let stream = build_output_stream(
            &device,
            &stream_config,
            config.sample_format(),
            cursor.clone(),
            events,
        )?;
        stream.play()?;

        Ok(Self {
            server: server.to_string(),
            output_rate: stream_config.sample_rate,
            tracks: HashMap::new(),
            cursor,
            generation: 0,
            _stream: stream,
        })
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Ids of every track ready to play.
    pub fn loaded_ids(&self) -> HashSet<String> {
        self.tracks.keys().cloned().collect()
    }

    /// Make a track prepared off the loop playable.
    pub fn insert_track(&mut self, track: LoadedTrack) {
        self.tracks.insert(track.id.clone(), Arc::new(track));
    }

    fn frames_for(&self, position: Duration) -> usize {
        (position.as_secs_f64() * self.output_rate as f64).round() as usize
    }
}

impl PlaybackEngine for CpalEngine {
    fn load(&mut self, track_id: &str, url: &str) -> Result<(), DeviceError> {
        let track = prepare_track(&self.server, self.output_rate, track_id, url)
            .map_err(|err| DeviceError::load_failure(track_id, format!("{err:#}")))?;
        self.insert_track(track);
        Ok(())
    }

    fn is_loaded(&self, track_id: &str) -> bool {
        self.tracks.contains_key(track_id)
    }

    fn duration(&self, track_id: &str) -> Option<Duration> {
        self.tracks.get(track_id).map(|t| t.duration)
    }

    fn play(&mut self, track_id: &str, position: Duration) -> Result<u64, DeviceError> {
        let track = self
            .tracks
            .get(track_id)
            .cloned()
            .ok_or_else(|| DeviceError::NotReady(track_id.to_string()))?;
        let pos_frame = self.frames_for(position).min(track.frames());
        self.generation += 1;
        let mut cursor = self
            .cursor
            .lock()
            .map_err(|_| DeviceError::load_failure(track_id, "output cursor poisoned"))?;
        cursor.track = Some(track);
        cursor.pos_frame = pos_frame;
        cursor.generation = self.generation;
        Ok(self.generation)
    }

    fn seek(&mut self, position: Duration) -> Result<(), DeviceError> {
        let pos_frame = self.frames_for(position);
        let mut cursor = self
            .cursor
            .lock()
            .map_err(|_| DeviceError::load_failure("", "output cursor poisoned"))?;
        let Some(total) = cursor.track.as_ref().map(|t| t.frames()) else {
            return Err(DeviceError::NotReady(String::new()));
        };
        cursor.pos_frame = pos_frame.min(total);
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut cursor) = self.cursor.lock() {
            cursor.track = None;
            cursor.pos_frame = 0;
        }
    }
}

/// Fetch, decode and resample one track to `output_rate`. Blocks on HTTP and DSP.
pub fn prepare_track(
    server: &str,
    output_rate: u32,
    track_id: &str,
    url: &str,
) -> Result<LoadedTrack> {
    let bytes = http::fetch_audio(server, url)?;
    let ext = http::extension_hint(url);
    let decoded = decode::decode_bytes(bytes, ext.as_deref())?;
    let source_frames = decoded.frames();
    let declared_ms = decoded.declared_duration_ms;
    let channels = decoded.channels;
    let source_rate = decoded.sample_rate;
    let samples =
        resample::resample_interleaved(decoded.samples, channels, source_rate, output_rate)?;
    let frames = samples.len() / channels.max(1);
    let duration = Duration::from_secs_f64(frames as f64 / output_rate as f64);
    tracing::info!(
        track_id,
        source_rate_hz = source_rate,
        output_rate_hz = output_rate,
        source_frames,
        declared_ms = ?declared_ms,
        duration_ms = duration.as_millis() as u64,
        "track loaded"
    );
    Ok(LoadedTrack {
        id: track_id.to_string(),
        channels,
        samples,
        duration,
    })
}

fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    cursor: Arc<Mutex<OutputCursor>>,
    events: UnboundedSender<EngineEvent>,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, cursor, events),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, cursor, events),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, cursor, events),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, cursor, events),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    cursor: Arc<Mutex<OutputCursor>>,
    events: UnboundedSender<EngineEvent>,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels_out = (config.channels as usize).max(1);
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let Ok(mut guard) = cursor.lock() else {
                data.fill(silence);
                return;
            };
            if let Some(ended) = fill_buffer(&mut guard, data, channels_out, silence) {
                let _ = events.send(ended);
            }
        },
        err_fn,
        None,
    )?;
    Ok(stream)
}

/// Write one callback buffer. Returns `Ended` when the track ran out during it.
fn fill_buffer<T: cpal::Sample + cpal::FromSample<f32>>(
    cursor: &mut OutputCursor,
    data: &mut [T],
    channels_out: usize,
    silence: T,
) -> Option<EngineEvent> {
    let OutputCursor {
        track,
        pos_frame,
        generation,
    } = cursor;
    let Some(current) = track.as_ref() else {
        data.fill(silence);
        return None;
    };

    let src_channels = current.channels.max(1);
    let total = current.frames();
    for (i, out_frame) in data.chunks_mut(channels_out).enumerate() {
        let src = *pos_frame + i;
        if src >= total {
            out_frame.fill(silence);
            continue;
        }
        let frame = &current.samples[src * src_channels..(src + 1) * src_channels];
        for (ch, sample) in out_frame.iter_mut().enumerate() {
            *sample = <T as cpal::Sample>::from_sample::<f32>(mapped_sample(frame, channels_out, ch));
        }
    }
    *pos_frame = (*pos_frame + data.len() / channels_out).min(total);

    if *pos_frame >= total {
        let ended = EngineEvent::Ended {
            track_id: current.id.clone(),
            generation: *generation,
        };
        *track = None;
        *pos_frame = 0;
        return Some(ended);
    }
    None
}

/// Map one source frame to output channel `dst_ch`.
///
/// mono fans out, stereo folds to mono by averaging, anything else clamps to the
/// last available source channel.
fn mapped_sample(frame: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    match (frame.len(), dst_channels) {
        (0, _) => 0.0,
        (1, _) => frame[0],
        (2, 1) => 0.5 * (frame[0] + frame[1]),
        (n, _) => frame[dst_ch.min(n - 1)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(frames: usize, channels: usize) -> Arc<LoadedTrack> {
        Arc::new(LoadedTrack {
            id: "clip".into(),
            channels,
            samples: (0..frames * channels).map(|i| i as f32).collect(),
            duration: Duration::from_millis(frames as u64),
        })
    }

    #[test]
    fn idle_cursor_outputs_silence() {
        let mut cursor = OutputCursor::default();
        let mut data = vec![1.0f32; 8];
        assert!(fill_buffer(&mut cursor, &mut data, 2, 0.0).is_none());
        assert!(data.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn mono_source_fans_out_to_stereo() {
        let mut cursor = OutputCursor {
            track: Some(track(10, 1)),
            pos_frame: 2,
            generation: 1,
        };
        let mut data = vec![0.0f32; 4];
        assert!(fill_buffer(&mut cursor, &mut data, 2, 0.0).is_none());
        assert_eq!(data, vec![2.0, 2.0, 3.0, 3.0]);
        assert_eq!(cursor.pos_frame, 4);
    }

    #[test]
    fn end_of_track_reports_generation_once() {
        let mut cursor = OutputCursor {
            track: Some(track(3, 2)),
            pos_frame: 1,
            generation: 7,
        };
        let mut data = vec![9.0f32; 8];
        let ended = fill_buffer(&mut cursor, &mut data, 2, 0.0);
        assert_eq!(
            ended,
            Some(EngineEvent::Ended {
                track_id: "clip".into(),
                generation: 7,
            })
        );
        assert_eq!(&data[..4], &[2.0, 3.0, 4.0, 5.0]);
        assert!(data[4..].iter().all(|s| *s == 0.0));
        assert!(cursor.track.is_none());
        assert!(fill_buffer(&mut cursor, &mut data, 2, 0.0).is_none());
    }

    #[test]
    fn stereo_folds_to_mono() {
        assert_eq!(mapped_sample(&[1.0, 3.0], 1, 0), 2.0);
        assert_eq!(mapped_sample(&[1.0, 3.0], 2, 1), 3.0);
        assert_eq!(mapped_sample(&[1.0, 3.0, 5.0], 2, 1), 3.0);
        assert_eq!(mapped_sample(&[1.0, 3.0], 6, 5), 3.0);
    }
}
