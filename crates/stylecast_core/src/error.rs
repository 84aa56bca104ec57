use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("invalid project structure: {0}")]
    ProjectStructural(String),

    #[error("unknown asset: {0}")]
    UnknownAsset(String),

    #[error("asset has no video stream: {0}")]
    AssetLacksVideo(String),

    #[error("unknown output: {0}")]
    UnknownOutput(String),

    #[error("unknown option preset: {0}")]
    UnknownPreset(String),

    #[error("failed to parse expression `{source_text}`: {message}")]
    ExpressionParse { source_text: String, message: String },

    #[error("expression `{source_text}` references unknown fragment `{id}`")]
    MissingFragment { source_text: String, id: String },

    #[error("expression `{source_text}` references undefined property `{path}`")]
    MissingProperty { source_text: String, path: String },

    #[error("first fragment of a sequence resolves to a negative offset: {0}")]
    OverlayNegativeAtStart(String),

    #[error("concat expects {expected} inputs for n={n}:v={v}:a={a}, got {actual}")]
    ConcatArityMismatch {
        n: usize,
        v: usize,
        a: usize,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T> = std::result::Result<T, CompileError>;
