use std::cell::RefCell;
use std::rc::Rc;

use tracing::info;

use crate::error::{CompileError, Result};
use crate::graph::FilterGraph;
use crate::sequence::{compile_sequence, CompiledSequence};
use crate::timing::TimingEnv;
use crate::types::{Output, Project, TimeMs};

// ---------------------------------------------------------------------------
// Project compiler
// ---------------------------------------------------------------------------

/// The compiled form of one output: the final filter-complex text plus the
/// output parameters the emitter needs.
#[derive(Debug, Clone)]
pub struct CompiledOutput {
    pub output: Output,
    pub filter_graph: String,
    /// Furthest fragment end across all sequences: the timeline length.
    pub total_duration: TimeMs,
}

/// Compiles every sequence of the project into one shared graph for the
/// named output. The first sequence is the spine; each later sequence is
/// overlaid onto it. The spine's streams are bound to `outv` and `outa`.
///
/// Fragments that reference a container expect its rasterized virtual asset
/// to be registered before compilation.
pub fn compile_output(project: &Project, output_name: &str) -> Result<CompiledOutput> {
    let output = project.find_output(output_name)?;

    let graph = Rc::new(RefCell::new(FilterGraph::new()));
    let mut env = TimingEnv::new();

    let mut sequences = project.sequences.iter();
    let first = sequences.next().ok_or_else(|| {
        CompileError::ProjectStructural("project has no sequences".to_string())
    })?;
    let mut spine = compile_sequence(first, output, &project.registry, &mut env, &graph)?;

    for sequence in sequences {
        let overlaid = compile_sequence(sequence, output, &project.registry, &mut env, &graph)?;
        spine = CompiledSequence {
            video: spine.video.overlay_with_offset(
                &overlaid.video,
                TimeMs::ZERO,
                TimeMs::ZERO,
                false,
            )?,
            audio: spine.audio.overlay_with_offset(
                &overlaid.audio,
                TimeMs::ZERO,
                TimeMs::ZERO,
                false,
            )?,
        };
    }

    spine.video.end_to("outv")?;
    spine.audio.end_to("outa")?;

    let filter_graph = graph.borrow().render();
    info!(
        output = %output.name,
        edges = graph.borrow().edges().len(),
        "compiled filter graph"
    );

    Ok(CompiledOutput {
        output: output.clone(),
        filter_graph,
        total_duration: env.max_end(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
