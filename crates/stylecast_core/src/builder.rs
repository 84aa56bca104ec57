//! Builds the in-memory project from the markup tree handed over by the
//! external parser. Asset declarations are extracted first (so the probe
//! step can fill in their metadata), then the full project is assembled
//! against the probed registry.

use uuid::Uuid;

use crate::error::{CompileError, Result};
use crate::expr::Offset;
use crate::markup::Node;
use crate::props;
use crate::registry::AssetRegistry;
use crate::types::{
    Asset, AssetKind, Container, Fragment, OptionPreset, Output, Project, Sequence, Upload,
};

// ---------------------------------------------------------------------------
// Asset declarations
// ---------------------------------------------------------------------------

/// Collects the declared assets so they can be probed before the project is
/// assembled.
pub fn build_registry(root: &Node) -> Result<AssetRegistry> {
    let project_node = find_project(root)?;
    let mut registry = AssetRegistry::new();

    if let Some(assets) = project_node.find("assets") {
        for node in assets.find_all("asset") {
            let name = require_attr(node, "asset", "data-name")?;
            let path = require_attr(node, "asset", "data-path")?;
            let kind = match node.attr("data-type") {
                Some("video") => AssetKind::Video,
                Some("image") => AssetKind::Image,
                Some("audio") => AssetKind::Audio,
                _ => Asset::kind_from_path(std::path::Path::new(&path)),
            };
            let author = node.attr("data-author").map(str::to_string);
            registry.insert(Asset::declare(name, path, kind, author))?;
        }
    }

    Ok(registry)
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// Assembles the project from the markup tree and the probed registry.
pub fn build_project(root: &Node, registry: AssetRegistry) -> Result<Project> {
    let project_node = find_project(root)?;

    let title = project_node
        .find("title")
        .map(|n| n.text_content().trim().to_string())
        .filter(|t| !t.is_empty());
    let date = project_node.attr("data-date").map(str::to_string);

    let tags = project_node
        .find_all("tag")
        .map(|n| n.text_content().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let mut css = String::new();
    collect_styles(root, &mut css);

    let outputs = build_outputs(project_node)?;
    if outputs.is_empty() {
        return Err(CompileError::ProjectStructural(
            "no outputs defined".to_string(),
        ));
    }

    let presets = build_presets(project_node);
    let uploads = build_uploads(project_node, &outputs)?;

    let mut sequences = Vec::new();
    for sequence_node in project_node.find_all("sequence") {
        sequences.push(build_sequence(sequence_node, &registry)?);
    }

    Ok(Project {
        title,
        date,
        tags,
        css,
        registry,
        outputs,
        presets,
        uploads,
        sequences,
    })
}

fn find_project(root: &Node) -> Result<&Node> {
    root.descendant("project").ok_or_else(|| {
        CompileError::ProjectStructural("missing <project> element".to_string())
    })
}

fn require_attr(node: &Node, tag: &str, attr: &str) -> Result<String> {
    node.attr(attr).map(str::to_string).ok_or_else(|| {
        CompileError::ProjectStructural(format!("<{tag}> is missing the `{attr}` attribute"))
    })
}

fn collect_styles(node: &Node, out: &mut String) {
    if node.is_tag("style") {
        out.push_str(&node.text_content());
    }
    for child in &node.children {
        collect_styles(child, out);
    }
}

fn build_outputs(project_node: &Node) -> Result<Vec<Output>> {
    let mut outputs = Vec::new();
    if let Some(outputs_node) = project_node.find("outputs") {
        for node in outputs_node.find_all("output") {
            let name = require_attr(node, "output", "name")?;
            let path = require_attr(node, "output", "path")?;
            let resolution = require_attr(node, "output", "resolution")?;
            let (width, height) = parse_resolution(&resolution).ok_or_else(|| {
                CompileError::ProjectStructural(format!(
                    "output `{name}` has invalid resolution `{resolution}`"
                ))
            })?;
            let fps = node
                .attr("fps")
                .and_then(|f| f.parse().ok())
                .unwrap_or(30);
            outputs.push(Output {
                name,
                path: path.into(),
                width,
                height,
                fps,
            });
        }
    }
    Ok(outputs)
}

fn parse_resolution(value: &str) -> Option<(u32, u32)> {
    let (w, h) = value.split_once('x')?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

fn build_presets(project_node: &Node) -> Vec<OptionPreset> {
    let Some(ffmpeg_node) = project_node.find("ffmpeg") else {
        return Vec::new();
    };
    ffmpeg_node
        .find_all("option")
        .filter_map(|node| {
            let name = node.attr("name")?.to_string();
            Some(OptionPreset {
                name,
                args: node.text_content().trim().to_string(),
            })
        })
        .collect()
}

fn build_uploads(project_node: &Node, outputs: &[Output]) -> Result<Vec<Upload>> {
    let Some(uploads_node) = project_node.find("uploads") else {
        return Ok(Vec::new());
    };

    let mut uploads = Vec::new();
    for node in &uploads_node.children {
        if !matches!(node.name.as_str(), "youtube" | "s3" | "instagram") {
            continue;
        }
        let name = require_attr(node, &node.name, "data-name")?;
        let output_name = require_attr(node, &node.name, "data-output")?;
        if !outputs.iter().any(|o| o.name == output_name) {
            return Err(CompileError::ProjectStructural(format!(
                "upload `{name}` references unknown output `{output_name}`"
            )));
        }
        let attr = |key: &str| node.attr(key).map(str::to_string);

        uploads.push(match node.name.as_str() {
            "youtube" => Upload::Youtube {
                name,
                output_name,
                title: attr("data-title"),
                tags: attr("data-tags"),
                description: attr("data-description"),
                privacy: attr("data-privacy"),
            },
            "s3" => Upload::S3 {
                name: name.clone(),
                output_name,
                bucket: require_attr(node, "s3", "data-bucket")?,
                region: attr("data-region"),
                title: attr("data-title"),
            },
            _ => Upload::Instagram {
                name,
                output_name,
                account: attr("data-account"),
                title: attr("data-title"),
                tags: attr("data-tags"),
            },
        });
    }
    Ok(uploads)
}

// ---------------------------------------------------------------------------
// Sequences and fragments
// ---------------------------------------------------------------------------

/// A fragment as declared, before overlay-pair normalization: it still
/// carries its own end-side offset and z-index.
struct RawFragment {
    fragment: Fragment,
    offset_end: Offset,
    end_z_index: i32,
}

fn build_sequence(sequence_node: &Node, registry: &AssetRegistry) -> Result<Sequence> {
    let mut raw: Vec<RawFragment> = Vec::new();
    for node in sequence_node.find_all("fragment") {
        raw.push(build_fragment(node, registry)?);
    }

    // Overlay-pair normalization: the end offset of fragment i-1 folds into
    // the start offset of fragment i; the first fragment keeps its own
    // offset verbatim. The prior fragment's negated end z-index applies only
    // when the fragment's own z-index is 0.
    for i in 1..raw.len() {
        let folded = Offset::fold_add(&raw[i].fragment.overlay_left, &raw[i - 1].offset_end)?;
        raw[i].fragment.overlay_left = folded;
        if raw[i].fragment.overlay_z_index == 0 {
            raw[i].fragment.overlay_z_index = -raw[i - 1].end_z_index;
        }
    }

    Ok(Sequence {
        fragments: raw.into_iter().map(|r| r.fragment).collect(),
    })
}

fn build_fragment(node: &Node, registry: &AssetRegistry) -> Result<RawFragment> {
    let id = node
        .attr("id")
        .map(str::to_string)
        .unwrap_or_else(|| format!("fragment-{}", Uuid::new_v4().simple()));

    let asset_name = Some(node.prop("-asset"))
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let asset = asset_name.as_deref().and_then(|n| registry.get(n));

    let trim_left = props::parse_trim_start(node.prop("-trim-start"));
    let mut duration = props::parse_duration_spec(node.prop("-duration"), asset, trim_left);
    if let Some(asset) = asset {
        if asset.duration.is_positive() {
            duration = duration.min((asset.duration - trim_left).max_zero());
        }
    }

    let container = node.find("container").map(|c| Container {
        id: c.attr("id").map(str::to_string).unwrap_or_else(|| id.clone()),
        html: c.inner_html(),
    });

    let fragment = Fragment {
        id,
        enabled: props::parse_enabled(node.prop("display")),
        asset_name,
        duration,
        trim_left,
        overlay_left: props::parse_offset(node.prop("-offset-start"))?,
        overlay_z_index: props::parse_z_index(node.prop("-overlay-start-z-index")),
        transition_in: props::parse_transition_spec(node.prop("-transition-start")),
        transition_out: props::parse_transition_spec(node.prop("-transition-end")),
        fit: props::parse_object_fit_spec(node.prop("-object-fit")),
        chromakey: props::parse_chromakey_spec(node.prop("-chromakey")),
        visual_filter: Some(node.prop("filter"))
            .filter(|v| !v.is_empty())
            .map(str::to_string),
        container,
        timecode_label: node.attr("data-timecode").map(str::to_string),
    };

    Ok(RawFragment {
        fragment,
        offset_end: props::parse_offset(node.prop("-offset-end"))?,
        end_z_index: props::parse_z_index(node.prop("-overlay-end-z-index")),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
