use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};
use std::path::PathBuf;

use crate::expr::Offset;

// ---------------------------------------------------------------------------
// TimeMs
// ---------------------------------------------------------------------------

/// A point or span on a timeline, in whole milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub const ZERO: Self = Self(0);

    pub fn from_seconds(s: f64) -> Self {
        Self((s * 1000.0).round() as i64)
    }

    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / 1000.0
    }

    pub fn millis(&self) -> i64 {
        self.0
    }

    /// Clamps negative spans to zero.
    pub fn max_zero(&self) -> Self {
        Self(self.0.max(0))
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Add for TimeMs {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for TimeMs {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for TimeMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_ms = self.0.unsigned_abs();
        let ms = total_ms % 1_000;
        let total_secs = total_ms / 1_000;
        let secs = total_secs % 60;
        let total_mins = total_secs / 60;
        let mins = total_mins % 60;
        let hours = total_mins / 60;
        if self.0 < 0 {
            write!(f, "-{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        } else {
            write!(f, "{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        }
    }
}

// ---------------------------------------------------------------------------
// AssetKind / Asset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssetKind {
    Video,
    Image,
    Audio,
}

/// A probed media file. Fields beyond `name`/`path`/`kind`/`author` are
/// filled in by the probe step and never change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Asset {
    pub name: String,
    pub path: PathBuf,
    pub kind: AssetKind,
    /// Natural duration; zero for still images.
    pub duration: TimeMs,
    pub width: u32,
    pub height: u32,
    /// Display rotation in degrees, one of 0/90/180/270.
    pub rotation: u32,
    pub has_video: bool,
    pub has_audio: bool,
    pub author: Option<String>,
}

impl Asset {
    /// An asset as declared in markup, before probing.
    pub fn declare(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        kind: AssetKind,
        author: Option<String>,
    ) -> Self {
        let (has_video, has_audio) = match kind {
            AssetKind::Video => (true, true),
            AssetKind::Image => (true, false),
            AssetKind::Audio => (false, true),
        };
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            duration: TimeMs::ZERO,
            width: 0,
            height: 0,
            rotation: 0,
            has_video,
            has_audio,
            author,
        }
    }

    /// Guess the asset kind from a path extension.
    pub fn kind_from_path(path: &std::path::Path) -> AssetKind {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp" | "tiff" => AssetKind::Image,
            "mp3" | "wav" | "flac" | "aac" | "ogg" | "m4a" | "wma" => AssetKind::Audio,
            _ => AssetKind::Video,
        }
    }
}

/// Registry name of the virtual asset produced by rasterizing a container.
pub fn container_asset_name(container_id: &str) -> String {
    format!("container_{container_id}")
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// A named render target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Output {
    pub name: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

// ---------------------------------------------------------------------------
// OptionPreset
// ---------------------------------------------------------------------------

/// A named raw argument string passed to the engine verbatim, between the
/// stream maps and the output path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionPreset {
    pub name: String,
    pub args: String,
}

// ---------------------------------------------------------------------------
// Upload
// ---------------------------------------------------------------------------

/// An upload descriptor. Carried through for the emitter step; the upload
/// flows themselves live outside the compilation core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Upload {
    Youtube {
        name: String,
        output_name: String,
        title: Option<String>,
        tags: Option<String>,
        description: Option<String>,
        privacy: Option<String>,
    },
    S3 {
        name: String,
        output_name: String,
        bucket: String,
        region: Option<String>,
        title: Option<String>,
    },
    Instagram {
        name: String,
        output_name: String,
        account: Option<String>,
        title: Option<String>,
        tags: Option<String>,
    },
}

impl Upload {
    pub fn name(&self) -> &str {
        match self {
            Upload::Youtube { name, .. } => name,
            Upload::S3 { name, .. } => name,
            Upload::Instagram { name, .. } => name,
        }
    }

    pub fn output_name(&self) -> &str {
        match self {
            Upload::Youtube { output_name, .. } => output_name,
            Upload::S3 { output_name, .. } => output_name,
            Upload::Instagram { output_name, .. } => output_name,
        }
    }
}

// ---------------------------------------------------------------------------
// Transition / FitPolicy / Chromakey
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transition {
    pub name: String,
    pub duration: TimeMs,
}

/// How a source frame is mapped onto the output resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FitPolicy {
    /// Aspect-preserving enlargement, then center crop.
    Cover,
    /// Aspect-preserving shrink over a blurred, dimmed copy of itself.
    ContainAmbient {
        blur: f64,
        brightness: f64,
        saturation: f64,
    },
    /// Aspect-preserving shrink padded with a solid color.
    ContainPillarbox { color: String },
}

impl Default for FitPolicy {
    fn default() -> Self {
        FitPolicy::Cover
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chromakey {
    pub enabled: bool,
    pub blend: f64,
    pub similarity: f64,
    pub color: String,
}

impl Default for Chromakey {
    fn default() -> Self {
        Self {
            enabled: false,
            blend: 0.1,
            similarity: 0.3,
            color: "0x00FF00".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// An HTML snippet rasterized to a transparent PNG ahead of compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub id: String,
    pub html: String,
}

// ---------------------------------------------------------------------------
// Fragment / Sequence
// ---------------------------------------------------------------------------

/// A contiguous piece of a sequence. Immutable once built; `overlay_left`
/// already has the previous fragment's end offset folded in.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub id: String,
    pub enabled: bool,
    pub asset_name: Option<String>,
    pub duration: TimeMs,
    pub trim_left: TimeMs,
    pub overlay_left: Offset,
    pub overlay_z_index: i32,
    pub transition_in: Option<Transition>,
    pub transition_out: Option<Transition>,
    pub fit: FitPolicy,
    pub chromakey: Chromakey,
    pub visual_filter: Option<String>,
    pub container: Option<Container>,
    pub timecode_label: Option<String>,
}

impl Fragment {
    /// The registry name this fragment draws its visual source from.
    /// A container inside the fragment takes precedence over `-asset`.
    pub fn source_name(&self) -> Option<String> {
        if let Some(container) = &self.container {
            return Some(container_asset_name(&container.id));
        }
        self.asset_name.clone()
    }
}

/// An ordered list of fragments producing one (video, audio) timeline.
#[derive(Debug, Clone, Default)]
pub struct Sequence {
    pub fragments: Vec<Fragment>,
}

impl Sequence {
    pub fn enabled_fragments(&self) -> impl Iterator<Item = &Fragment> {
        self.fragments.iter().filter(|f| f.enabled)
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

use crate::registry::AssetRegistry;

/// The in-memory project built from the markup tree. The first sequence is
/// the spine; later sequences are overlaid on it.
#[derive(Debug, Clone, Default)]
pub struct Project {
    pub title: Option<String>,
    pub date: Option<String>,
    pub tags: Vec<String>,
    pub css: String,
    pub registry: AssetRegistry,
    pub outputs: Vec<Output>,
    pub presets: Vec<OptionPreset>,
    pub uploads: Vec<Upload>,
    pub sequences: Vec<Sequence>,
}

impl Project {
    pub fn find_output(&self, name: &str) -> crate::error::Result<&Output> {
        self.outputs
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| crate::error::CompileError::UnknownOutput(name.to_string()))
    }

    pub fn find_preset(&self, name: &str) -> crate::error::Result<&OptionPreset> {
        self.presets
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| crate::error::CompileError::UnknownPreset(name.to_string()))
    }

    /// Every container declared by a fragment of any sequence, in order.
    pub fn containers(&self) -> Vec<&Container> {
        self.sequences
            .iter()
            .flat_map(|s| s.fragments.iter())
            .filter_map(|f| f.container.as_ref())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
