use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("engine not installed (ffmpeg/ffprobe not found on PATH)")]
    EngineNotInstalled,

    #[error("engine exited with code {0}")]
    EngineFailed(i32),

    #[error("probe failed: {0}")]
    ProbeFailed(String),

    #[error("missing asset files: {}", format_paths(.0))]
    AssetMissingFile(Vec<PathBuf>),

    #[error("rasterizer not installed ({0} not found on PATH)")]
    RasterizerNotInstalled(String),

    #[error("rasterizer failed: {0}")]
    RasterizerFailed(String),

    #[error("cache IO error at {path}: {source}")]
    CacheIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Compile(#[from] stylecast_core::CompileError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T> = std::result::Result<T, RenderError>;
