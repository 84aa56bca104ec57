use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

use stylecast_core::compile::CompiledOutput;
use stylecast_core::types::Project;

use crate::error::{RenderError, Result};

/// Engine arguments used when the project selects no option preset.
pub const DEFAULT_PRESET_ARGS: &str = "-c:v libx264 -crf 23 -pix_fmt yuv420p -c:a aac -b:a 192k";

const MAX_MUXING_QUEUE_SIZE: u32 = 4096;

// ---------------------------------------------------------------------------
// RenderPlan
// ---------------------------------------------------------------------------

/// A fully emitted engine invocation, serializable so it can be inspected
/// without running anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPlan {
    pub inputs: Vec<RenderInput>,
    pub filter_graph: String,
    pub output_args: Vec<String>,
    pub output_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderInput {
    pub path: PathBuf,
    pub index: usize,
}

/// Composes the invocation for one compiled output: inputs in asset-index
/// order, the filter-complex text, stream maps, output geometry, then the
/// selected preset's raw args (or the documented default).
pub fn emit_plan(
    project: &Project,
    compiled: &CompiledOutput,
    preset: Option<&str>,
) -> Result<RenderPlan> {
    let preset_args = match preset {
        Some(name) => project.find_preset(name)?.args.clone(),
        None => DEFAULT_PRESET_ARGS.to_string(),
    };

    let inputs = project
        .registry
        .iter()
        .enumerate()
        .map(|(index, asset)| RenderInput {
            path: asset.path.clone(),
            index,
        })
        .collect();

    let output = &compiled.output;
    let mut output_args = vec![
        "-max_muxing_queue_size".to_string(),
        MAX_MUXING_QUEUE_SIZE.to_string(),
        "-map".to_string(),
        "[outv]".to_string(),
    ];
    if compiled.filter_graph.contains("[outa]") {
        output_args.push("-map".to_string());
        output_args.push("[outa]".to_string());
    }
    output_args.push("-s".to_string());
    output_args.push(format!("{}x{}", output.width, output.height));
    output_args.push("-r".to_string());
    output_args.push(output.fps.to_string());
    output_args.extend(preset_args.split_whitespace().map(str::to_string));

    Ok(RenderPlan {
        inputs,
        filter_graph: compiled.filter_graph.clone(),
        output_args,
        output_path: output.path.clone(),
    })
}

/// The argv handed to the engine binary.
pub fn build_engine_args(plan: &RenderPlan) -> Vec<String> {
    let mut args = vec!["-y".to_string()];
    for input in &plan.inputs {
        args.push("-i".to_string());
        args.push(input.path.to_string_lossy().to_string());
    }
    args.push("-filter_complex".to_string());
    args.push(plan.filter_graph.clone());
    args.extend(plan.output_args.clone());
    args.push(plan.output_path.to_string_lossy().to_string());
    args
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Progress published while the engine runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderProgress {
    pub percent: f64,
    pub frame: u64,
    pub fps: f64,
    pub speed: String,
    pub eta_seconds: Option<f64>,
}

/// Spawns ffmpeg on the plan, streaming stderr progress updates into the
/// channel. The total timeline duration drives the percent estimate.
pub async fn execute(
    plan: &RenderPlan,
    progress_tx: tokio::sync::watch::Sender<RenderProgress>,
    total_duration_secs: f64,
) -> Result<()> {
    use std::process::Stdio;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::process::Command;

    let args = build_engine_args(plan);
    info!(output = %plan.output_path.display(), "starting engine");

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RenderError::EngineNotInstalled
            } else {
                RenderError::Io(e)
            }
        })?;

    if let Some(stderr) = child.stderr.take() {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = reader.read_until(b'\r', &mut buf).await?;
            if n == 0 {
                break;
            }
            let chunk = String::from_utf8_lossy(&buf);
            for segment in chunk.split(['\r', '\n']) {
                if let Some(progress) = parse_progress(segment.trim(), total_duration_secs) {
                    let _ = progress_tx.send(progress);
                }
            }
        }
    }

    let status = child.wait().await?;
    if !status.success() {
        return Err(RenderError::EngineFailed(status.code().unwrap_or(-1)));
    }
    Ok(())
}

/// Parses one engine stderr status line, e.g.
/// `frame=  123 fps= 60 ... time=00:01:02.05 speed=1.50x`.
pub fn parse_progress(line: &str, total_secs: f64) -> Option<RenderProgress> {
    if !line.contains("time=") {
        return None;
    }

    let frame = field(line, "frame=")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    let fps = field(line, "fps=")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0);
    let speed = field(line, "speed=").unwrap_or_default();
    let elapsed = field(line, "time=")
        .and_then(|v| parse_clock(&v))
        .unwrap_or(0.0);

    let percent = if total_secs > 0.0 {
        (elapsed / total_secs * 100.0).min(100.0)
    } else {
        0.0
    };

    let speed_factor = speed.trim_end_matches('x').parse::<f64>().unwrap_or(0.0);
    let eta_seconds = (speed_factor > 0.0 && total_secs > elapsed)
        .then(|| (total_secs - elapsed) / speed_factor);

    Some(RenderProgress {
        percent,
        frame,
        fps,
        speed,
        eta_seconds,
    })
}

/// Pulls the whitespace-delimited value following `key` out of a status
/// line, tolerating padding between key and value.
fn field(line: &str, key: &str) -> Option<String> {
    let rest = &line[line.find(key)? + key.len()..];
    let value = rest.trim_start();
    let end = value
        .find(|c: char| c.is_whitespace())
        .unwrap_or(value.len());
    let value = &value[..end];
    (!value.is_empty()).then(|| value.to_string())
}

/// `HH:MM:SS.cc` into seconds.
fn parse_clock(value: &str) -> Option<f64> {
    let mut parts = value.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let mins: f64 = parts.next()?.parse().ok()?;
    let secs: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + mins * 60.0 + secs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use stylecast_core::registry::AssetRegistry;
    use stylecast_core::types::{Asset, AssetKind, OptionPreset, Output, Project};

    fn project_with_assets(names: &[&str]) -> Project {
        let mut registry = AssetRegistry::new();
        for name in names {
            registry
                .insert(Asset::declare(
                    *name,
                    format!("/media/{name}.mp4"),
                    AssetKind::Video,
                    None,
                ))
                .unwrap();
        }
        Project {
            registry,
            outputs: vec![output()],
            presets: vec![OptionPreset {
                name: "hq".to_string(),
                args: "-c:v libx265 -crf 18".to_string(),
            }],
            ..Default::default()
        }
    }

    fn output() -> Output {
        Output {
            name: "main".to_string(),
            path: "/renders/main.mp4".into(),
            width: 1920,
            height: 1080,
            fps: 30,
        }
    }

    fn compiled(graph: &str) -> CompiledOutput {
        CompiledOutput {
            output: output(),
            filter_graph: graph.to_string(),
            total_duration: stylecast_core::types::TimeMs(10_000),
        }
    }

    #[test]
    fn inputs_follow_asset_index_order() {
        let project = project_with_assets(&["a", "b", "c"]);
        let plan = emit_plan(&project, &compiled("[0:v]null[outv]"), None).unwrap();
        let paths: Vec<_> = plan
            .inputs
            .iter()
            .map(|i| i.path.to_string_lossy().to_string())
            .collect();
        assert_eq!(paths, ["/media/a.mp4", "/media/b.mp4", "/media/c.mp4"]);
        assert_eq!(plan.inputs[2].index, 2);
    }

    #[test]
    fn engine_args_order() {
        let project = project_with_assets(&["a"]);
        let plan = emit_plan(
            &project,
            &compiled("[0:v]null[outv];[0:a]anull[outa]"),
            None,
        )
        .unwrap();
        let args = build_engine_args(&plan);

        assert_eq!(args[0], "-y");
        assert_eq!(args[1], "-i");
        assert_eq!(args[2], "/media/a.mp4");
        assert_eq!(args[3], "-filter_complex");
        assert_eq!(args[4], "[0:v]null[outv];[0:a]anull[outa]");

        let flat = args.join(" ");
        assert!(flat.contains("-max_muxing_queue_size 4096"));
        assert!(flat.contains("-map [outv] -map [outa]"));
        assert!(flat.contains("-s 1920x1080 -r 30"));
        assert!(flat.contains(DEFAULT_PRESET_ARGS));
        assert_eq!(args.last().unwrap(), "/renders/main.mp4");

        // maps come before geometry, geometry before preset args
        let pos = |needle: &str| args.iter().position(|a| a == needle).unwrap();
        assert!(pos("-max_muxing_queue_size") < pos("-map"));
        assert!(pos("-map") < pos("-s"));
        assert!(pos("-s") < pos("-c:v"));
    }

    #[test]
    fn video_only_graph_maps_only_outv() {
        let project = project_with_assets(&["a"]);
        let plan = emit_plan(&project, &compiled("[0:v]null[outv]"), None).unwrap();
        let flat = build_engine_args(&plan).join(" ");
        assert!(flat.contains("-map [outv]"));
        assert!(!flat.contains("[outa]"));
    }

    #[test]
    fn named_preset_replaces_default_args() {
        let project = project_with_assets(&["a"]);
        let plan = emit_plan(&project, &compiled("[0:v]null[outv]"), Some("hq")).unwrap();
        let flat = build_engine_args(&plan).join(" ");
        assert!(flat.contains("-c:v libx265 -crf 18"));
        assert!(!flat.contains("libx264"));
    }

    #[test]
    fn unknown_preset_fails() {
        let project = project_with_assets(&["a"]);
        let err = emit_plan(&project, &compiled("[0:v]null[outv]"), Some("nope")).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Compile(stylecast_core::CompileError::UnknownPreset(_))
        ));
    }

    #[test]
    fn plan_serializes_for_dry_runs() {
        let project = project_with_assets(&["a"]);
        let plan = emit_plan(&project, &compiled("[0:v]null[outv]"), None).unwrap();
        let json = serde_json::to_string(&plan).unwrap();
        let back: RenderPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.filter_graph, plan.filter_graph);
        assert_eq!(back.inputs.len(), 1);
    }

    #[test]
    fn progress_line_parses() {
        let line = "frame=  150 fps= 30 q=28.0 size= 1024kB time=00:00:05.00 bitrate=200kbits/s speed=1.50x";
        let progress = parse_progress(line, 10.0).unwrap();
        assert_eq!(progress.frame, 150);
        assert!((progress.fps - 30.0).abs() < 0.01);
        assert!((progress.percent - 50.0).abs() < 0.1);
        assert_eq!(progress.speed, "1.50x");
        assert!((progress.eta_seconds.unwrap() - 3.33).abs() < 0.1);
    }

    #[test]
    fn non_progress_lines_are_ignored() {
        assert!(parse_progress("Input #0, mov,mp4...", 10.0).is_none());
        assert!(parse_progress("", 10.0).is_none());
    }

    #[test]
    fn zero_total_duration_yields_zero_percent() {
        let line = "frame=  10 fps= 30 time=00:00:01.00 speed=1.00x";
        let progress = parse_progress(line, 0.0).unwrap();
        assert!(progress.percent.abs() < 0.01);
        assert!(progress.eta_seconds.is_none());
    }

    #[test]
    fn clock_parsing() {
        assert!((parse_clock("00:01:02.05").unwrap() - 62.05).abs() < 0.001);
        assert!((parse_clock("01:00:00.00").unwrap() - 3600.0).abs() < 0.001);
        assert!(parse_clock("00:00").is_none());
        assert!(parse_clock("bogus").is_none());
    }

    #[test]
    fn cr_delimited_chunks_yield_multiple_updates() {
        let raw = "frame= 10 fps= 30 time=00:00:01.00 speed=1.00x\rframe= 20 fps= 30 time=00:00:02.00 speed=1.00x\r";
        let updates: Vec<_> = raw
            .split(['\r', '\n'])
            .filter_map(|s| parse_progress(s.trim(), 10.0))
            .collect();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[1].frame, 20);
    }
}
