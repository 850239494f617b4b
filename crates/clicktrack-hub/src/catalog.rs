//! Track catalog backed by the media directory.
//!
//! Lists audio files sitting directly in the media root; the file stem is the
//! track id and the URL points at the static `/audio` route. When two files
//! share a stem, the one whose file name sorts first wins.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clicktrack_types::TrackSummary;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Source of playable tracks.
pub trait TrackCatalog: Send + Sync {
    /// Enumerate every track, with durations when they can be read.
    fn list_tracks(&self) -> Result<Vec<TrackSummary>>;

    /// Whether `track_id` is currently playable.
    fn contains(&self, track_id: &str) -> Result<bool> {
        Ok(self.list_tracks()?.iter().any(|t| t.id == track_id))
    }
}

/// Catalog that reads a flat directory of audio files.
#[derive(Clone, Debug)]
pub struct DirCatalog {
    root: PathBuf,
    url_prefix: String,
}

impl DirCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            url_prefix: "/audio".to_string(),
        }
    }

    /// Scan the directory without opening any file.
    fn scan(&self) -> Result<Vec<(PathBuf, TrackSummary)>> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(read_dir) => read_dir,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read_dir {:?}", self.root));
            }
        };

        let mut tracks = Vec::new();
        for entry in read_dir {
            let entry = entry.context("read_dir entry")?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(ext) = extension_of(&path) else { continue };
            if !is_supported_extension(&ext) {
                continue;
            }
            let (Some(file_name), Some(stem)) = (
                path.file_name().and_then(|n| n.to_str()),
                path.file_stem().and_then(|n| n.to_str()),
            ) else {
                continue;
            };
            let summary = TrackSummary {
                id: stem.to_string(),
                title: stem.to_string(),
                url: format!("{}/{}", self.url_prefix, urlencoding::encode(file_name)),
                duration_ms: None,
            };
            tracks.push((path.clone(), summary));
        }
        tracks.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));

        let mut seen = HashSet::new();
        tracks.retain(|(path, summary)| {
            let first = seen.insert(summary.id.clone());
            if !first {
                tracing::warn!(
                    track_id = %summary.id,
                    path = %path.display(),
                    "duplicate track id; keeping the first file"
                );
            }
            first
        });
        Ok(tracks)
    }
}

impl TrackCatalog for DirCatalog {
    fn list_tracks(&self) -> Result<Vec<TrackSummary>> {
        Ok(self
            .scan()?
            .into_iter()
            .map(|(path, mut summary)| {
                let ext = extension_of(&path).unwrap_or_default();
                summary.duration_ms = header_duration_ms(&path, &ext);
                summary
            })
            .collect())
    }

    fn contains(&self, track_id: &str) -> Result<bool> {
        Ok(self.scan()?.iter().any(|(_, t)| t.id == track_id))
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn is_supported_extension(ext: &str) -> bool {
    matches!(
        ext,
        "mp3" | "flac" | "wav" | "ogg" | "m4a" | "aac" | "aiff" | "aif"
    )
}

/// Read the duration from the container header, if it declares one.
fn header_duration_ms(path: &Path, ext_hint: &str) -> Option<u64> {
    let file = File::open(path).ok()?;
    let mut hint = Hint::new();
    if !ext_hint.is_empty() {
        hint.with_extension(ext_hint);
    }
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let detected = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;
    let track = detected.format.default_track()?;
    let params = &track.codec_params;
    match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Some(frames.saturating_mul(1000) / rate as u64),
        _ => None,
    }
}
