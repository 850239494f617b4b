//! Offline resample to the output device rate.
//!
//! Runs Rubato's sinc resampler over a fully decoded track in fixed input chunks,
//! then flushes the tail with a partial chunk.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

const CHUNK_FRAMES: usize = 1024;

/// Convert interleaved `input` from `src_rate` to `dst_rate`.
///
/// Returns the input unchanged when the rates already match.
pub fn resample_interleaved(
    input: Vec<f32>,
    channels: usize,
    src_rate: u32,
    dst_rate: u32,
) -> Result<Vec<f32>> {
    if src_rate == dst_rate || input.is_empty() {
        return Ok(input);
    }
    if channels == 0 || src_rate == 0 || dst_rate == 0 {
        return Err(anyhow!("invalid resample shape: {channels}ch {src_rate}->{dst_rate}"));
    }

    let f_ratio = dst_rate as f64 / src_rate as f64;
    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };

    let mut resampler = Async::<f32>::new_sinc(
        f_ratio,
        1.1,
        &params,
        CHUNK_FRAMES,
        channels,
        FixedAsync::Input,
    )
    .map_err(|e| anyhow!("resampler init: {e}"))?;

    let out_capacity_frames = (CHUNK_FRAMES as f64 * f_ratio * 1.1).ceil() as usize + 64;
    let mut out_chunk = vec![0.0f32; out_capacity_frames * channels];
    let total_frames = input.len() / channels;
    let expected_frames = (total_frames as f64 * f_ratio).round() as usize;
    let mut output = Vec::with_capacity((expected_frames + out_capacity_frames) * channels);

    let mut indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: None,
    };

    let mut frame = 0usize;
    // Keep feeding silence after the input runs out so the filter delay is flushed.
    let mut flush_chunks = 2usize;
    loop {
        let remaining = total_frames.saturating_sub(frame);
        let (chunk, partial) = if remaining >= CHUNK_FRAMES {
            let start = frame * channels;
            (input[start..start + CHUNK_FRAMES * channels].to_vec(), None)
        } else if remaining > 0 {
            let start = frame * channels;
            let mut padded = input[start..].to_vec();
            padded.resize(CHUNK_FRAMES * channels, 0.0);
            (padded, Some(remaining))
        } else if flush_chunks > 0 {
            flush_chunks -= 1;
            (vec![0.0f32; CHUNK_FRAMES * channels], None)
        } else {
            break;
        };

        let input_adapter = InterleavedSlice::new(&chunk, channels, CHUNK_FRAMES)
            .map_err(|e| anyhow!("interleaved slice (input): {e}"))?;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut out_chunk, channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (output): {e}"))?;

        indexing.input_offset = 0;
        indexing.output_offset = 0;
        indexing.partial_len = partial;

        let (_nbr_in, nbr_out) = resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .map_err(|e| anyhow!("resampler process: {e}"))?;
        output.extend_from_slice(&out_chunk[..nbr_out * channels]);
        frame += remaining.min(CHUNK_FRAMES);
    }

    // drop the filter's leading delay and trim to the expected length
    let delay_frames = resampler.output_delay();
    let start = (delay_frames * channels).min(output.len());
    let end = (start + expected_frames * channels).min(output.len());
    Ok(output[start..end].to_vec())
}
