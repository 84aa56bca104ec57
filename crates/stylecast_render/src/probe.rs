use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use stylecast_core::registry::AssetRegistry;
use stylecast_core::types::{Asset, AssetKind, TimeMs};

use crate::error::{RenderError, Result};

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    side_data_list: Vec<FfprobeSideData>,
}

#[derive(Debug, Deserialize)]
struct FfprobeSideData {
    rotation: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// What one probe invocation yields, before kind-dependent filtering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProbeData {
    pub duration: TimeMs,
    pub width: u32,
    pub height: u32,
    pub rotation: u32,
    pub has_video: bool,
    pub has_audio: bool,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Runs ffprobe on one media file.
pub fn probe_file(path: impl AsRef<Path>) -> Result<ProbeData> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(RenderError::AssetMissingFile(vec![path.to_path_buf()]));
    }

    let output = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RenderError::EngineNotInstalled
            } else {
                RenderError::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RenderError::ProbeFailed(stderr.into_owned()));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    Ok(parse_probe_output(&probe))
}

/// Probes one declared asset and fills in its metadata. Images skip
/// duration and audio, audio-only assets skip dimensions.
pub fn probe_asset(asset: &mut Asset) -> Result<()> {
    let data = probe_file(&asset.path)?;
    debug!(asset = %asset.name, ?data, "probed");

    match asset.kind {
        AssetKind::Image => {
            asset.width = data.width;
            asset.height = data.height;
            asset.rotation = data.rotation;
            asset.duration = TimeMs::ZERO;
            asset.has_video = true;
            asset.has_audio = false;
        }
        AssetKind::Audio => {
            asset.duration = data.duration;
            asset.has_video = false;
            asset.has_audio = data.has_audio;
        }
        AssetKind::Video => {
            asset.duration = data.duration;
            asset.width = data.width;
            asset.height = data.height;
            asset.rotation = data.rotation;
            asset.has_video = data.has_video;
            asset.has_audio = data.has_audio;
        }
    }
    Ok(())
}

/// Probes every declared asset, in declaration order.
pub fn probe_registry(registry: &mut AssetRegistry) -> Result<()> {
    for asset in registry.iter_mut() {
        probe_asset(asset)?;
    }
    Ok(())
}

/// Asserts that every declared asset path exists on disk, reporting the
/// full list of missing files at once.
pub fn preflight(registry: &AssetRegistry) -> Result<()> {
    let missing: Vec<_> = registry
        .iter()
        .filter(|a| !a.path.exists())
        .map(|a| a.path.clone())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(RenderError::AssetMissingFile(missing))
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn parse_probe_output(probe: &FfprobeOutput) -> ProbeData {
    let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
    let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .map(TimeMs::from_seconds)
        .unwrap_or(TimeMs::ZERO);

    let rotation = video_stream
        .and_then(|s| s.side_data_list.iter().find_map(|d| d.rotation))
        .map(normalize_rotation)
        .unwrap_or(0);

    ProbeData {
        duration,
        width: video_stream.and_then(|s| s.width).unwrap_or(0),
        height: video_stream.and_then(|s| s.height).unwrap_or(0),
        rotation,
        has_video: video_stream.is_some(),
        has_audio: audio_stream.is_some(),
    }
}

/// ffprobe reports display-matrix rotation as a signed degree count; the
/// compiler wants a positive angle modulo 360.
fn normalize_rotation(rotation: f64) -> u32 {
    (((rotation.round() as i64 % 360) + 360) % 360) as u32
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_rotation_values() {
        assert_eq!(normalize_rotation(0.0), 0);
        assert_eq!(normalize_rotation(-90.0), 270);
        assert_eq!(normalize_rotation(90.0), 90);
        assert_eq!(normalize_rotation(-180.0), 180);
        assert_eq!(normalize_rotation(450.0), 90);
    }

    #[test]
    fn parse_probe_output_video_and_audio() {
        let json = r#"{
            "streams": [
                {
                    "codec_type": "video",
                    "width": 1920,
                    "height": 1080,
                    "side_data_list": [
                        {"side_data_type": "Display Matrix", "rotation": -90}
                    ]
                },
                {
                    "codec_type": "audio",
                    "channels": 2
                }
            ],
            "format": {"duration": "10.5"}
        }"#;
        let output: FfprobeOutput = serde_json::from_str(json).unwrap();
        let data = parse_probe_output(&output);

        assert_eq!(data.duration, TimeMs(10_500));
        assert_eq!(data.width, 1920);
        assert_eq!(data.height, 1080);
        assert_eq!(data.rotation, 270);
        assert!(data.has_video);
        assert!(data.has_audio);
    }

    #[test]
    fn parse_probe_output_audio_only() {
        let json = r#"{
            "streams": [{"codec_type": "audio", "channels": 2}],
            "format": {"duration": "180.04"}
        }"#;
        let output: FfprobeOutput = serde_json::from_str(json).unwrap();
        let data = parse_probe_output(&output);

        assert_eq!(data.duration, TimeMs(180_040));
        assert_eq!(data.width, 0);
        assert!(!data.has_video);
        assert!(data.has_audio);
    }

    #[test]
    fn parse_probe_output_missing_everything() {
        let json = r#"{"streams": [], "format": {}}"#;
        let output: FfprobeOutput = serde_json::from_str(json).unwrap();
        let data = parse_probe_output(&output);
        assert_eq!(data.duration, TimeMs::ZERO);
        assert!(!data.has_video);
        assert!(!data.has_audio);
    }

    #[test]
    fn probe_missing_file_reports_path() {
        let result = probe_file("/tmp/does_not_exist_stylecast_probe_test.mp4");
        assert!(matches!(
            result.unwrap_err(),
            RenderError::AssetMissingFile(paths) if paths.len() == 1
        ));
    }

    #[test]
    fn preflight_collects_all_missing_paths() {
        let mut registry = AssetRegistry::new();
        registry
            .insert(Asset::declare(
                "a",
                "/tmp/stylecast-missing-a.mp4",
                AssetKind::Video,
                None,
            ))
            .unwrap();
        registry
            .insert(Asset::declare(
                "b",
                "/tmp/stylecast-missing-b.mp4",
                AssetKind::Video,
                None,
            ))
            .unwrap();

        match preflight(&registry).unwrap_err() {
            RenderError::AssetMissingFile(paths) => assert_eq!(paths.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn preflight_passes_for_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("real.mp4");
        std::fs::write(&file, b"x").unwrap();

        let mut registry = AssetRegistry::new();
        registry
            .insert(Asset::declare("real", &file, AssetKind::Video, None))
            .unwrap();
        assert!(preflight(&registry).is_ok());
    }
}
