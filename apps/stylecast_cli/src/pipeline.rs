//! Drives the whole run: load the parsed document, preflight and probe the
//! assets, build the project, stage container rasterizations, compile each
//! requested output, emit the engine invocation and execute it. Active
//! cache keys accumulate across outputs; the sweep runs once at the end.

use std::path::PathBuf;

use anyhow::Context as _;
use tracing::{debug, info};

use stylecast_core::builder;
use stylecast_core::compile::compile_output;
use stylecast_core::markup::{self, Node};
use stylecast_core::types::{container_asset_name, Asset, AssetKind, Output, Project};
use stylecast_render::cache::ContainerCache;
use stylecast_render::command::{self, RenderProgress};
use stylecast_render::probe;
use stylecast_render::rasterize::{ChromiumRasterizer, Rasterizer};

pub struct RenderOptions {
    pub project_path: PathBuf,
    /// Output names to render; empty renders all declared outputs.
    pub outputs: Vec<String>,
    pub preset: Option<String>,
    pub cache_dir: PathBuf,
    pub dry_run: bool,
    pub debug: bool,
}

/// Loads the parser-produced document and assembles the probed project.
pub fn load_project(project_path: &PathBuf) -> anyhow::Result<Project> {
    let json = std::fs::read_to_string(project_path)
        .with_context(|| format!("reading {}", project_path.display()))?;
    let document: Node = markup::from_json(&json).context("deserializing the document tree")?;

    let mut registry = builder::build_registry(&document)?;
    probe::preflight(&registry)?;
    probe::probe_registry(&mut registry)?;

    let project = builder::build_project(&document, registry)?;
    info!(
        assets = project.registry.len(),
        sequences = project.sequences.len(),
        outputs = project.outputs.len(),
        "project built"
    );
    Ok(project)
}

/// Rasterizes (or merely locates, when no rasterizer is given) every
/// container for one output and registers the virtual assets.
fn stage_containers(
    project: &mut Project,
    cache: &mut ContainerCache,
    output: &Output,
    rasterizer: Option<&dyn Rasterizer>,
) -> anyhow::Result<()> {
    let containers: Vec<_> = project.containers().into_iter().cloned().collect();
    for container in containers {
        let png = match rasterizer {
            Some(rasterizer) => cache.get_or_render(
                &container,
                &project.css,
                &output.name,
                output.width,
                output.height,
                rasterizer,
            )?,
            None => cache.locate(&container, &project.css, &output.name),
        };
        let mut asset = Asset::declare(
            container_asset_name(&container.id),
            png,
            AssetKind::Image,
            None,
        );
        asset.width = output.width;
        asset.height = output.height;
        project.registry.register_virtual(asset);
    }
    Ok(())
}

/// The `render` subcommand.
pub async fn run_render(opts: RenderOptions) -> anyhow::Result<()> {
    let mut project = load_project(&opts.project_path)?;

    let output_names: Vec<String> = if opts.outputs.is_empty() {
        project.outputs.iter().map(|o| o.name.clone()).collect()
    } else {
        opts.outputs.clone()
    };

    let mut cache = ContainerCache::new(&opts.cache_dir);
    let rasterizer = ChromiumRasterizer::default();

    for name in &output_names {
        let output = project.find_output(name)?.clone();
        info!(output = %name, "rendering");

        let rasterizer: Option<&dyn Rasterizer> =
            if opts.dry_run { None } else { Some(&rasterizer) };
        stage_containers(&mut project, &mut cache, &output, rasterizer)?;

        let compiled = compile_output(&project, name)?;
        if opts.debug {
            println!("# filter-complex [{name}]\n{}", compiled.filter_graph);
        }

        let plan = command::emit_plan(&project, &compiled, opts.preset.as_deref())?;
        if opts.dry_run {
            println!("ffmpeg {}", command::build_engine_args(&plan).join(" "));
            continue;
        }

        let (tx, mut rx) = tokio::sync::watch::channel(RenderProgress::default());
        let reporter = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let progress = rx.borrow().clone();
                info!(
                    percent = %format!("{:.1}", progress.percent),
                    frame = progress.frame,
                    speed = %progress.speed,
                    "engine progress"
                );
            }
        });

        let result = command::execute(&plan, tx, compiled.total_duration.as_seconds()).await;
        let _ = reporter.await;
        result.with_context(|| format!("rendering output `{name}`"))?;
        info!(output = %name, path = %plan.output_path.display(), "render complete");
    }

    if !opts.dry_run {
        cache.sweep()?;
    }
    Ok(())
}

/// The `graph` subcommand: print one output's filter-complex text without
/// touching the engine or the rasterizer.
pub fn run_graph(project_path: &PathBuf, output_name: &str, cache_dir: &PathBuf) -> anyhow::Result<()> {
    let mut project = load_project(project_path)?;
    let output = project.find_output(output_name)?.clone();

    let mut cache = ContainerCache::new(cache_dir);
    stage_containers(&mut project, &mut cache, &output, None)?;

    let compiled = compile_output(&project, output_name)?;
    debug!(
        duration_ms = compiled.total_duration.millis(),
        "graph compiled"
    );
    println!("{}", compiled.filter_graph);
    Ok(())
}

/// The `probe` subcommand: print probe metadata for each file as JSON.
pub fn run_probe(paths: &[PathBuf]) -> anyhow::Result<()> {
    for path in paths {
        let data = probe::probe_file(path)
            .with_context(|| format!("probing {}", path.display()))?;
        let json = serde_json::json!({
            "path": path,
            "duration_ms": data.duration.millis(),
            "width": data.width,
            "height": data.height,
            "rotation": data.rotation,
            "has_video": data.has_video,
            "has_audio": data.has_audio,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
