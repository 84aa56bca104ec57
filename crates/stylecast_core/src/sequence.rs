use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::error::{CompileError, Result};
use crate::graph::FilterGraph;
use crate::registry::AssetRegistry;
use crate::stream::{FadeDirection, PadMode, Stream, StreamKind, TRANSPARENT};
use crate::timing::{FragmentTiming, TimingEnv};
use crate::types::{Asset, AssetKind, FitPolicy, Fragment, Output, Sequence, TimeMs};

// ---------------------------------------------------------------------------
// Sequence compiler
// ---------------------------------------------------------------------------

/// The (video, audio) pair a sequence compiles to. Both builders point into
/// the shared per-output graph.
#[derive(Debug)]
pub struct CompiledSequence {
    pub video: Stream,
    pub audio: Stream,
}

/// Compiles one sequence left to right over its enabled fragments.
///
/// Zero-offset fragments accumulate and flush as a single concat edge;
/// a nonzero offset composites the fragment onto the running streams via
/// overlay (video) and mix (audio). Timing windows are recorded into `env`
/// as each fragment is placed, so later fragments and sequences can resolve
/// lazy offsets against them.
pub fn compile_sequence(
    sequence: &Sequence,
    output: &Output,
    registry: &AssetRegistry,
    env: &mut TimingEnv,
    graph: &Rc<RefCell<FilterGraph>>,
) -> Result<CompiledSequence> {
    let mut pending: Vec<(Stream, Stream)> = Vec::new();
    let mut time_cursor = TimeMs::ZERO;
    let mut first = true;

    for fragment in sequence.enabled_fragments() {
        let overlay_left = fragment.overlay_left.resolve(env)?;
        let source = fragment.source_name().ok_or_else(|| {
            CompileError::ProjectStructural(format!(
                "fragment `{}` has neither an asset nor a container",
                fragment.id
            ))
        })?;
        let asset = registry.expect(&source)?;
        let duration = fragment.duration;

        debug!(
            fragment = %fragment.id,
            asset = %source,
            offset = overlay_left.millis(),
            duration = duration.millis(),
            "placing fragment"
        );

        let video = build_video_stream(fragment, asset, &source, output, registry, graph)?;
        let audio = build_audio_stream(fragment, &source, registry, graph)?;
        let (video, audio) = apply_fades(fragment, video, audio)?;

        if first {
            first = false;
            let slotted = if overlay_left.is_positive() {
                (
                    video.pad_start(overlay_left, PadMode::Add, Some(TRANSPARENT))?,
                    audio.pad_start(overlay_left, PadMode::Add, None)?,
                )
            } else if overlay_left.is_negative() {
                return Err(CompileError::OverlayNegativeAtStart(fragment.id.clone()));
            } else {
                (video, audio)
            };
            pending.push(slotted);
        } else if overlay_left == TimeMs::ZERO {
            pending.push((video, audio));
        } else {
            let (main_video, main_audio) = Stream::concat(&std::mem::take(&mut pending))?;
            let flip_layers = fragment.overlay_z_index < 0;
            let main_video =
                main_video.overlay_with_offset(&video, time_cursor, overlay_left, flip_layers)?;
            let main_audio =
                main_audio.overlay_with_offset(&audio, time_cursor, overlay_left, false)?;
            pending.push((main_video, main_audio));
        }

        let start = time_cursor + overlay_left;
        env.record(
            fragment.id.as_str(),
            FragmentTiming {
                start,
                end: start + duration,
                duration,
            },
        );
        time_cursor = time_cursor + duration + overlay_left;
    }

    if pending.is_empty() {
        return Err(CompileError::ProjectStructural(
            "sequence has no enabled fragments".to_string(),
        ));
    }
    let (video, audio) = Stream::concat(&pending)?;
    Ok(CompiledSequence { video, audio })
}

/// The video side of one fragment: either the asset's real video stream
/// with trim, still extension, rotation, fit and chromakey applied, or a
/// synthetic transparent source at the output's geometry.
fn build_video_stream(
    fragment: &Fragment,
    asset: &Asset,
    source: &str,
    output: &Output,
    registry: &AssetRegistry,
    graph: &Rc<RefCell<FilterGraph>>,
) -> Result<Stream> {
    if !asset.has_video {
        return Stream::color_source(
            graph,
            output.width,
            output.height,
            output.fps,
            fragment.duration,
        );
    }

    let mut stream = Stream::input(graph, registry.video_label(source)?, StreamKind::Video);

    if needs_trim(fragment, asset) {
        stream = stream.trim(fragment.trim_left, fragment.trim_left + fragment.duration)?;
    }
    if asset.kind == AssetKind::Image && fragment.duration.is_positive() {
        stream = stream.pad_start(fragment.duration, PadMode::Clone, None)?;
    }

    stream = stream.rotate_correct(asset.rotation)?;
    stream = match &fragment.fit {
        FitPolicy::Cover => stream.fit_cover(output.width, output.height)?,
        FitPolicy::ContainAmbient {
            blur,
            brightness,
            saturation,
        } => stream.fit_contain_ambient(
            output.width,
            output.height,
            *blur,
            *brightness,
            *saturation,
        )?,
        FitPolicy::ContainPillarbox { color } => {
            stream.fit_contain_pillarbox(output.width, output.height, color)?
        }
    };
    stream = stream.fps(output.fps)?;

    if fragment.chromakey.enabled {
        let key = &fragment.chromakey;
        stream = stream.colorkey(&key.color, key.similarity, key.blend)?;
    }
    Ok(stream)
}

/// The audio side: the asset's real audio stream with trim applied, or
/// synthesized silence when the asset has none.
fn build_audio_stream(
    fragment: &Fragment,
    source: &str,
    registry: &AssetRegistry,
    graph: &Rc<RefCell<FilterGraph>>,
) -> Result<Stream> {
    let asset = registry.expect(source)?;
    match registry.audio_label(source)? {
        Some(label) => {
            let mut stream = Stream::input(graph, label, StreamKind::Audio);
            if needs_trim(fragment, asset) {
                stream =
                    stream.trim(fragment.trim_left, fragment.trim_left + fragment.duration)?;
            }
            Ok(stream)
        }
        None => Stream::silence_source(graph, fragment.duration),
    }
}

fn needs_trim(fragment: &Fragment, asset: &Asset) -> bool {
    fragment.trim_left.is_positive() || fragment.duration < asset.duration
}

fn apply_fades(fragment: &Fragment, video: Stream, audio: Stream) -> Result<(Stream, Stream)> {
    let mut video = video;
    let mut audio = audio;
    if let Some(transition) = &fragment.transition_in {
        if transition.name == "fade" {
            video = video.fade(FadeDirection::In, TimeMs::ZERO, transition.duration)?;
            audio = audio.fade(FadeDirection::In, TimeMs::ZERO, transition.duration)?;
        }
    }
    if let Some(transition) = &fragment.transition_out {
        if transition.name == "fade" {
            let start = fragment.duration - transition.duration;
            video = video.fade(FadeDirection::Out, start, transition.duration)?;
            audio = audio.fade(FadeDirection::Out, start, transition.duration)?;
        }
    }
    Ok((video, audio))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
