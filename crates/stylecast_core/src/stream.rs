use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{CompileError, Result};
use crate::graph::FilterGraph;
use crate::types::TimeMs;

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

/// How prepended frames are produced by a start pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadMode {
    /// Repeat the first frame.
    Clone,
    /// Add solid frames of a color.
    Add,
}

/// Transparent, for padding streams that will be overlaid.
pub const TRANSPARENT: &str = "black@0.0";

/// A handle to one stream label inside a shared filter graph. Every
/// operation appends exactly one edge (composites append a few) and returns
/// a new handle pointing at the fresh output label, so calls chain.
#[derive(Debug, Clone)]
pub struct Stream {
    graph: Rc<RefCell<FilterGraph>>,
    pub label: String,
    pub kind: StreamKind,
}

impl Stream {
    /// Wraps an existing input label such as `0:v` or `3:a`.
    pub fn input(
        graph: &Rc<RefCell<FilterGraph>>,
        label: impl Into<String>,
        kind: StreamKind,
    ) -> Stream {
        let label = label.into();
        graph.borrow_mut().add_node(label.clone());
        Stream {
            graph: Rc::clone(graph),
            label,
            kind,
        }
    }

    /// A blank transparent color source used when an asset lacks video.
    pub fn color_source(
        graph: &Rc<RefCell<FilterGraph>>,
        width: u32,
        height: u32,
        fps: u32,
        duration: TimeMs,
    ) -> Result<Stream> {
        let op = format!(
            "color=c={TRANSPARENT}:s={width}x{height}:r={fps}:d={}",
            duration.millis()
        );
        Self::source(graph, op, StreamKind::Video)
    }

    /// A silent audio source used when an asset lacks audio.
    pub fn silence_source(graph: &Rc<RefCell<FilterGraph>>, duration: TimeMs) -> Result<Stream> {
        let src = Self::source(
            graph,
            "anullsrc=channel_layout=stereo:sample_rate=44100",
            StreamKind::Audio,
        )?;
        src.trim(TimeMs::ZERO, duration)
    }

    fn source(
        graph: &Rc<RefCell<FilterGraph>>,
        op: impl Into<String>,
        kind: StreamKind,
    ) -> Result<Stream> {
        let label = {
            let mut g = graph.borrow_mut();
            let out = g.make_label();
            g.add_filter(op, vec![], vec![out.clone()])?;
            out
        };
        Ok(Stream {
            graph: Rc::clone(graph),
            label,
            kind,
        })
    }

    fn at(&self, label: String) -> Stream {
        Stream {
            graph: Rc::clone(&self.graph),
            label,
            kind: self.kind,
        }
    }

    /// Appends a single-input, single-output edge.
    fn push(&self, op: impl Into<String>) -> Result<Stream> {
        let label = {
            let mut g = self.graph.borrow_mut();
            let out = g.make_label();
            g.add_filter(op, vec![self.label.clone()], vec![out.clone()])?;
            out
        };
        Ok(self.at(label))
    }

    fn is_video(&self) -> bool {
        self.kind == StreamKind::Video
    }

    // -- primitive ops ------------------------------------------------------

    /// Appends an arbitrary single-input filter, for op shapes without a
    /// dedicated method (`setpts`, `format`, `drawtext`, ...).
    pub fn apply(&self, op: impl Into<String>) -> Result<Stream> {
        self.push(op)
    }

    pub fn trim(&self, start: TimeMs, end: TimeMs) -> Result<Stream> {
        let name = if self.is_video() { "trim" } else { "atrim" };
        self.push(format!(
            "{name}=start={}:end={}",
            start.millis(),
            end.millis()
        ))
    }

    pub fn fps(&self, fps: u32) -> Result<Stream> {
        self.push(format!("fps={fps}"))
    }

    pub fn fade(&self, direction: FadeDirection, start: TimeMs, duration: TimeMs) -> Result<Stream> {
        let name = if self.is_video() { "fade" } else { "afade" };
        let t = match direction {
            FadeDirection::In => "in",
            FadeDirection::Out => "out",
        };
        self.push(format!(
            "{name}=t={t}:st={}:d={}",
            start.millis(),
            duration.millis()
        ))
    }

    /// Prepends frames (video) or delay (audio) at the stream start.
    pub fn pad_start(&self, amount: TimeMs, mode: PadMode, color: Option<&str>) -> Result<Stream> {
        let ms = amount.millis();
        if !self.is_video() {
            return self.push(format!("adelay={ms}|{ms}"));
        }
        let op = match mode {
            PadMode::Clone => format!("tpad=start={ms}:start_mode=clone"),
            PadMode::Add => format!(
                "tpad=start={ms}:start_mode=add:color={}",
                color.unwrap_or(TRANSPARENT)
            ),
        };
        self.push(op)
    }

    pub fn colorkey(&self, color: &str, similarity: f64, blend: f64) -> Result<Stream> {
        self.push(format!("colorkey={color}:{similarity}:{blend}"))
    }

    pub fn gblur(&self, sigma: f64) -> Result<Stream> {
        self.push(format!("gblur=sigma={sigma}"))
    }

    pub fn eq(&self, brightness: f64, saturation: f64) -> Result<Stream> {
        self.push(format!("eq=brightness={brightness}:saturation={saturation}"))
    }

    pub fn split(&self) -> Result<(Stream, Stream)> {
        let (first, second) = {
            let mut g = self.graph.borrow_mut();
            let first = g.make_label();
            let second = g.make_label();
            g.add_filter(
                "split",
                vec![self.label.clone()],
                vec![first.clone(), second.clone()],
            )?;
            (first, second)
        };
        Ok((self.at(first), self.at(second)))
    }

    /// Lays `other` over this stream. For video the second input sits on
    /// top; audio streams are mixed instead and have no layer order.
    pub fn overlay(&self, other: &Stream) -> Result<Stream> {
        let op = if self.is_video() {
            "overlay".to_string()
        } else {
            "amix=inputs=2:duration=longest:dropout_transition=0".to_string()
        };
        let label = {
            let mut g = self.graph.borrow_mut();
            let out = g.make_label();
            g.add_filter(
                op,
                vec![self.label.clone(), other.label.clone()],
                vec![out.clone()],
            )?;
            out
        };
        Ok(self.at(label))
    }

    /// Cross-fades into `other`. Durations and offsets are emitted in
    /// seconds, as the engine expects for this filter.
    pub fn crossfade(
        &self,
        other: &Stream,
        transition: &str,
        duration: TimeMs,
        offset: TimeMs,
    ) -> Result<Stream> {
        let op = format!(
            "xfade=transition={transition}:duration={}:offset={}",
            duration.as_seconds(),
            offset.as_seconds()
        );
        let label = {
            let mut g = self.graph.borrow_mut();
            let out = g.make_label();
            g.add_filter(
                op,
                vec![self.label.clone(), other.label.clone()],
                vec![out.clone()],
            )?;
            out
        };
        Ok(self.at(label))
    }

    // -- composite policies -------------------------------------------------

    /// Aspect-preserving enlargement, then center crop to exactly (w, h).
    pub fn fit_cover(&self, width: u32, height: u32) -> Result<Stream> {
        self.push(format!(
            "scale={width}:{height}:force_original_aspect_ratio=increase"
        ))?
        .push(format!("crop={width}:{height}"))
    }

    /// Aspect-preserving shrink, padded to (w, h) with a solid color.
    pub fn fit_contain_pillarbox(&self, width: u32, height: u32, color: &str) -> Result<Stream> {
        self.push(format!(
            "scale={width}:{height}:force_original_aspect_ratio=decrease"
        ))?
        .push(format!(
            "pad={width}:{height}:(ow-iw)/2:(oh-ih)/2:{color}"
        ))
    }

    /// Aspect-preserving shrink over a blurred, dimmed cover of itself.
    pub fn fit_contain_ambient(
        &self,
        width: u32,
        height: u32,
        blur: f64,
        brightness: f64,
        saturation: f64,
    ) -> Result<Stream> {
        let (background, foreground) = self.split()?;
        let background = background
            .fit_cover(width, height)?
            .gblur(blur)?
            .eq(brightness, saturation)?;
        let foreground = foreground.fit_contain_pillarbox(width, height, TRANSPARENT)?;
        background.overlay(&foreground)
    }

    /// Compensates the probed display rotation.
    pub fn rotate_correct(&self, degrees: u32) -> Result<Stream> {
        match degrees % 360 {
            90 => self.push("transpose=2"),
            180 => self.push("hflip")?.push("vflip"),
            270 => self.push("transpose=1"),
            _ => Ok(self.clone()),
        }
    }

    /// Composites `other` onto this stream at a relative offset.
    ///
    /// A negative `other_offset_left` means `other` starts before this
    /// stream ends: its start is padded with `other_offset_left +
    /// self_duration` of transparent frames (or audio delay) so both
    /// timelines align, then the two are overlaid. Zero overlays directly.
    /// Positive offsets are not supported between composited streams.
    pub fn overlay_with_offset(
        &self,
        other: &Stream,
        self_duration: TimeMs,
        other_offset_left: TimeMs,
        flip_layers: bool,
    ) -> Result<Stream> {
        if other_offset_left.is_positive() {
            return Err(CompileError::ProjectStructural(format!(
                "positive overlay offset {} is not supported between composited streams",
                other_offset_left.millis()
            )));
        }

        let other = if other_offset_left.is_negative() {
            let pad = TimeMs((other_offset_left + self_duration).millis().abs());
            other.pad_start(pad, PadMode::Add, Some(TRANSPARENT))?
        } else {
            other.clone()
        };

        if flip_layers && self.is_video() {
            other.overlay(self)
        } else {
            self.overlay(&other)
        }
    }

    /// Concatenates fragment (video, audio) pairs into one pair with a
    /// single `concat=n=K:v=1:a=1` edge.
    pub fn concat(pairs: &[(Stream, Stream)]) -> Result<(Stream, Stream)> {
        let (first_video, first_audio) = match pairs {
            [] => {
                return Err(CompileError::ProjectStructural(
                    "concat of zero streams".to_string(),
                ))
            }
            [(v, a)] => return Ok((v.clone(), a.clone())),
            [(v, a), ..] => (v, a),
        };

        let graph = Rc::clone(&first_video.graph);
        let mut inputs = Vec::with_capacity(pairs.len() * 2);
        for (video, audio) in pairs {
            inputs.push(video.label.clone());
            inputs.push(audio.label.clone());
        }

        let (video_out, audio_out) = {
            let mut g = graph.borrow_mut();
            let video_out = g.make_label();
            let audio_out = g.make_label();
            g.add_filter(
                format!("concat=n={}:v=1:a=1", pairs.len()),
                inputs,
                vec![video_out.clone(), audio_out.clone()],
            )?;
            (video_out, audio_out)
        };

        Ok((first_video.at(video_out), first_audio.at(audio_out)))
    }

    // -- terminal ops -------------------------------------------------------

    /// Binds this stream to a user-supplied final label via a null edge.
    pub fn end_to(&self, label: &str) -> Result<Stream> {
        let name = if self.is_video() { "null" } else { "anull" };
        self.bind(name, label)
    }

    /// Like [`Stream::end_to`] but with a copy edge.
    pub fn copy_to(&self, label: &str) -> Result<Stream> {
        let name = if self.is_video() { "copy" } else { "acopy" };
        self.bind(name, label)
    }

    fn bind(&self, op: &str, label: &str) -> Result<Stream> {
        self.graph.borrow_mut().add_filter(
            op,
            vec![self.label.clone()],
            vec![label.to_string()],
        )?;
        Ok(self.at(label.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn graph() -> Rc<RefCell<FilterGraph>> {
        Rc::new(RefCell::new(FilterGraph::new()))
    }

    fn render(g: &Rc<RefCell<FilterGraph>>) -> String {
        g.borrow().render()
    }

    #[test]
    fn chained_ops_allocate_sequential_labels() {
        let g = graph();
        let s = Stream::input(&g, "0:v", StreamKind::Video);
        s.fit_cover(1920, 1080)
            .unwrap()
            .fps(30)
            .unwrap()
            .end_to("outv")
            .unwrap();
        assert_eq!(
            render(&g),
            "[0:v]scale=1920:1080:force_original_aspect_ratio=increase[a0];\
             [a0]crop=1920:1080[a1];[a1]fps=30[a2];[a2]null[outv]"
                .replace(char::is_whitespace, "")
        );
    }

    #[test]
    fn audio_ops_use_audio_filter_names() {
        let g = graph();
        let s = Stream::input(&g, "0:a", StreamKind::Audio);
        let s = s.trim(TimeMs(1_000), TimeMs(3_000)).unwrap();
        let s = s.fade(FadeDirection::Out, TimeMs(2_500), TimeMs(500)).unwrap();
        s.end_to("outa").unwrap();
        assert_eq!(
            render(&g),
            "[0:a]atrim=start=1000:end=3000[a0];[a0]afade=t=out:st=2500:d=500[a1];[a1]anull[outa]"
        );
    }

    #[test]
    fn trim_emits_millisecond_bounds() {
        let g = graph();
        let s = Stream::input(&g, "0:v", StreamKind::Video);
        s.trim(TimeMs(2_000), TimeMs(5_000)).unwrap();
        assert!(render(&g).contains("trim=start=2000:end=5000"));
    }

    #[test]
    fn pad_start_modes() {
        let g = graph();
        let s = Stream::input(&g, "0:v", StreamKind::Video);
        s.pad_start(TimeMs(4_000), PadMode::Clone, None).unwrap();
        assert!(render(&g).contains("tpad=start=4000:start_mode=clone"));

        let g = graph();
        let s = Stream::input(&g, "0:v", StreamKind::Video);
        s.pad_start(TimeMs(500), PadMode::Add, None).unwrap();
        assert!(render(&g).contains("tpad=start=500:start_mode=add:color=black@0.0"));

        let g = graph();
        let s = Stream::input(&g, "0:a", StreamKind::Audio);
        s.pad_start(TimeMs(2_000), PadMode::Add, None).unwrap();
        assert!(render(&g).contains("adelay=2000|2000"));
    }

    #[test]
    fn contain_pillarbox_scales_then_pads() {
        let g = graph();
        let s = Stream::input(&g, "0:v", StreamKind::Video);
        s.fit_contain_pillarbox(1920, 1080, "0x101010").unwrap();
        assert_eq!(
            render(&g),
            "[0:v]scale=1920:1080:force_original_aspect_ratio=decrease[a0];\
             [a0]pad=1920:1080:(ow-iw)/2:(oh-ih)/2:0x101010[a1]"
                .replace(char::is_whitespace, "")
        );
    }

    #[test]
    fn contain_ambient_splits_into_two_branches() {
        let g = graph();
        let s = Stream::input(&g, "0:v", StreamKind::Video);
        s.fit_contain_ambient(1920, 1080, 20.0, -0.3, 0.8).unwrap();
        let text = render(&g);
        assert!(text.contains("split"));
        assert!(text.contains("gblur=sigma=20"));
        assert!(text.contains("eq=brightness=-0.3:saturation=0.8"));
        assert!(text.contains("force_original_aspect_ratio=increase"));
        assert!(text.contains("force_original_aspect_ratio=decrease"));
        assert!(text.contains("overlay"));
        assert!(text.contains(&format!("pad=1920:1080:(ow-iw)/2:(oh-ih)/2:{TRANSPARENT}")));
    }

    #[test]
    fn rotate_correct_maps_angles() {
        for (deg, expected) in [(90u32, "transpose=2"), (270, "transpose=1")] {
            let g = graph();
            let s = Stream::input(&g, "0:v", StreamKind::Video);
            s.rotate_correct(deg).unwrap();
            assert!(render(&g).contains(expected), "{deg} -> {expected}");
        }

        let g = graph();
        let s = Stream::input(&g, "0:v", StreamKind::Video);
        s.rotate_correct(180).unwrap();
        assert!(render(&g).contains("hflip"));
        assert!(render(&g).contains("vflip"));

        let g = graph();
        let s = Stream::input(&g, "0:v", StreamKind::Video);
        let out = s.rotate_correct(0).unwrap();
        assert_eq!(out.label, "0:v");
        assert_eq!(render(&g), "");
    }

    #[test]
    fn chromakey_edge_shape() {
        let g = graph();
        let s = Stream::input(&g, "0:v", StreamKind::Video);
        s.colorkey("0x00FF00", 0.3, 0.1).unwrap();
        assert!(render(&g).contains("colorkey=0x00FF00:0.3:0.1"));
    }

    #[test]
    fn overlay_with_negative_offset_pads_other_stream() {
        let g = graph();
        let main = Stream::input(&g, "0:v", StreamKind::Video);
        let other = Stream::input(&g, "1:v", StreamKind::Video);
        // Scenario: main has run for 5000ms, other starts 500ms early.
        main.overlay_with_offset(&other, TimeMs(5_000), TimeMs(-500), false)
            .unwrap();
        let text = render(&g);
        assert!(text.contains("tpad=start=4500:start_mode=add:color=black@0.0"));
        assert!(text.contains("[0:v][a0]overlay[a1]"));
    }

    #[test]
    fn overlay_with_zero_offset_is_direct() {
        let g = graph();
        let main = Stream::input(&g, "0:v", StreamKind::Video);
        let other = Stream::input(&g, "1:v", StreamKind::Video);
        main.overlay_with_offset(&other, TimeMs(5_000), TimeMs::ZERO, false)
            .unwrap();
        assert_eq!(render(&g), "[0:v][1:v]overlay[a0]");
    }

    #[test]
    fn overlay_with_positive_offset_is_rejected() {
        let g = graph();
        let main = Stream::input(&g, "0:v", StreamKind::Video);
        let other = Stream::input(&g, "1:v", StreamKind::Video);
        assert!(main
            .overlay_with_offset(&other, TimeMs(5_000), TimeMs(300), false)
            .is_err());
    }

    #[test]
    fn flip_layers_swaps_video_overlay_order() {
        let g = graph();
        let main = Stream::input(&g, "0:v", StreamKind::Video);
        let other = Stream::input(&g, "1:v", StreamKind::Video);
        main.overlay_with_offset(&other, TimeMs(1_000), TimeMs::ZERO, true)
            .unwrap();
        assert_eq!(render(&g), "[1:v][0:v]overlay[a0]");
    }

    #[test]
    fn audio_overlay_mixes_and_ignores_layers() {
        let g = graph();
        let main = Stream::input(&g, "0:a", StreamKind::Audio);
        let other = Stream::input(&g, "1:a", StreamKind::Audio);
        main.overlay_with_offset(&other, TimeMs(5_000), TimeMs(-500), true)
            .unwrap();
        let text = render(&g);
        assert!(text.contains("adelay=4500|4500"));
        assert!(text.contains("[0:a][a0]amix=inputs=2:duration=longest:dropout_transition=0[a1]"));
    }

    #[test]
    fn concat_interleaves_pairs() {
        let g = graph();
        let pairs = vec![
            (
                Stream::input(&g, "v0", StreamKind::Video),
                Stream::input(&g, "x0", StreamKind::Audio),
            ),
            (
                Stream::input(&g, "v1", StreamKind::Video),
                Stream::input(&g, "x1", StreamKind::Audio),
            ),
        ];
        let (video, audio) = Stream::concat(&pairs).unwrap();
        assert_eq!(render(&g), "[v0][x0][v1][x1]concat=n=2:v=1:a=1[a0][a1]");
        assert_eq!(video.kind, StreamKind::Video);
        assert_eq!(audio.kind, StreamKind::Audio);
    }

    #[test]
    fn concat_of_single_pair_adds_no_edge() {
        let g = graph();
        let pairs = vec![(
            Stream::input(&g, "v0", StreamKind::Video),
            Stream::input(&g, "x0", StreamKind::Audio),
        )];
        let (video, _) = Stream::concat(&pairs).unwrap();
        assert_eq!(video.label, "v0");
        assert_eq!(render(&g), "");
    }

    #[test]
    fn crossfade_emits_seconds() {
        let g = graph();
        let a = Stream::input(&g, "0:v", StreamKind::Video);
        let b = Stream::input(&g, "1:v", StreamKind::Video);
        a.crossfade(&b, "fade", TimeMs(500), TimeMs(4_500)).unwrap();
        assert!(render(&g).contains("xfade=transition=fade:duration=0.5:offset=4.5"));
    }

    #[test]
    fn sources_have_no_inputs() {
        let g = graph();
        Stream::color_source(&g, 1920, 1080, 30, TimeMs(4_000)).unwrap();
        assert_eq!(render(&g), "color=c=black@0.0:s=1920x1080:r=30:d=4000[a0]");

        let g = graph();
        Stream::silence_source(&g, TimeMs(4_000)).unwrap();
        assert_eq!(
            render(&g),
            "anullsrc=channel_layout=stereo:sample_rate=44100[a0];[a0]atrim=start=0:end=4000[a1]"
        );
    }

    #[test]
    fn apply_passes_op_text_through() {
        let g = graph();
        let s = Stream::input(&g, "0:v", StreamKind::Video);
        s.apply("setpts=PTS-STARTPTS")
            .unwrap()
            .apply("format=rgba")
            .unwrap();
        assert_eq!(render(&g), "[0:v]setpts=PTS-STARTPTS[a0];[a0]format=rgba[a1]");
    }

    #[test]
    fn copy_to_binds_with_copy_edge() {
        let g = graph();
        let s = Stream::input(&g, "0:v", StreamKind::Video);
        s.copy_to("outv").unwrap();
        assert_eq!(render(&g), "[0:v]copy[outv]");
    }
}
