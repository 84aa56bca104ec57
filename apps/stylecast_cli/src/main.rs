mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "stylecast", version, about = "Compile styled-markup video projects into engine invocations")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render project outputs through the engine.
    Render(RenderArgs),
    /// Print the compiled filter-complex for one output.
    Graph(GraphArgs),
    /// Probe media files and print their metadata as JSON.
    Probe(ProbeArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Parsed project document (JSON tree from the markup parser).
    #[arg(long = "project")]
    project: PathBuf,

    /// Output name to render; repeatable. Defaults to every output.
    #[arg(long = "output")]
    outputs: Vec<String>,

    /// Engine option preset name declared in the project.
    #[arg(long)]
    preset: Option<String>,

    /// Container rasterization cache directory.
    #[arg(long, default_value = "cache/containers")]
    cache_dir: PathBuf,

    /// Print the engine invocation instead of executing it.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Dump the generated filter graph for each output.
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[derive(Parser, Debug)]
struct GraphArgs {
    /// Parsed project document (JSON tree from the markup parser).
    #[arg(long = "project")]
    project: PathBuf,

    /// Output name to compile.
    #[arg(long = "output")]
    output: String,

    /// Container rasterization cache directory.
    #[arg(long, default_value = "cache/containers")]
    cache_dir: PathBuf,
}

#[derive(Parser, Debug)]
struct ProbeArgs {
    /// Media files to probe.
    paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => {
            pipeline::run_render(pipeline::RenderOptions {
                project_path: args.project,
                outputs: args.outputs,
                preset: args.preset,
                cache_dir: args.cache_dir,
                dry_run: args.dry_run,
                debug: args.debug,
            })
            .await
        }
        Command::Graph(args) => pipeline::run_graph(&args.project, &args.output, &args.cache_dir),
        Command::Probe(args) => pipeline::run_probe(&args.paths),
    }
}
