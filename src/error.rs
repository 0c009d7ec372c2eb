use thiserror::Error;

/// How the agent reacts when a tool raises a given error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Eligible for the single in-band repair attempt.
    Repairable,
    /// The step is skipped and the turn continues.
    Skippable,
    /// The turn ends with a user-visible message.
    Fatal,
}

/// Custom error type for cadforge operations.
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Completion provider returned an error or an unusable response.
    #[error("LLM failure: {0}")]
    LlmFailure(String),

    /// Vector index could not be reached or rejected the query.
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// Sentence-embedding model failed to load or encode.
    #[error("Embedding failure: {0}")]
    EmbeddingFailure(String),

    /// Script ran to completion but wrote no `.vtp` artifact.
    #[error("Script produced no .vtp artifact in {0}")]
    NoArtifact(String),

    /// Container exited with a non-zero status.
    #[error("Container exited with code {exit_code}: {}", summarize_output(.stderr, .stdout))]
    ContainerFailure {
        exit_code: i64,
        stdout: String,
        stderr: String,
    },

    /// Container did not finish inside its deadline.
    #[error("Container exceeded its {seconds}s deadline")]
    TimeoutExceeded { seconds: u64 },

    /// Object-store transport failure.
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Required credentials are not configured.
    #[error("Missing credentials: {0}")]
    AuthMissing(String),

    /// DXF or VTP content could not be interpreted.
    #[error("Corrupt structure: {0}")]
    StructureCorrupt(String),

    /// Input file could not be read.
    #[error("Cannot read {path}: {message}")]
    FileUnreadable { path: String, message: String },

    /// Polygonal artifact has no points.
    #[error("Model is empty: {0}")]
    EmptyModel(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A per-turn invocation budget was exhausted.
    #[error("Turn limit reached: {0}")]
    TurnLimit(String),

    /// Host-side I/O failure outside the typed cases above.
    #[error("I/O error: {0}")]
    Io(String),
}

fn summarize_output(stderr: &str, stdout: &str) -> String {
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    let text = text.trim();
    // Tracebacks put the useful line last
    match text.lines().last() {
        Some(last) if text.lines().count() > 1 => last.to_string(),
        _ => text.to_string(),
    }
}

impl ForgeError {
    /// Stable label used in tool-result messages.
    pub fn label(&self) -> &'static str {
        match self {
            ForgeError::LlmFailure(_) => "LLM_FAILURE",
            ForgeError::IndexUnavailable(_) => "INDEX_UNAVAILABLE",
            ForgeError::EmbeddingFailure(_) => "EMBEDDING_FAILURE",
            ForgeError::NoArtifact(_) => "NO_ARTIFACT",
            ForgeError::ContainerFailure { .. } => "CONTAINER_FAILURE",
            ForgeError::TimeoutExceeded { .. } => "TIMEOUT_EXCEEDED",
            ForgeError::UploadFailed(_) => "UPLOAD_FAILED",
            ForgeError::AuthMissing(_) => "AUTH_MISSING",
            ForgeError::StructureCorrupt(_) => "STRUCTURE_CORRUPT",
            ForgeError::FileUnreadable { .. } => "FILE_UNREADABLE",
            ForgeError::EmptyModel(_) => "EMPTY_MODEL",
            ForgeError::Config(_) => "CONFIG_ERROR",
            ForgeError::Validation(_) => "VALIDATION_ERROR",
            ForgeError::TurnLimit(_) => "TURN_LIMIT",
            ForgeError::Io(_) => "IO_ERROR",
        }
    }

    /// Agent response when this error comes out of the code executor.
    ///
    /// Converter failures are always fatal regardless of kind; callers on that
    /// path do not consult this.
    pub fn disposition(&self) -> Disposition {
        match self {
            ForgeError::NoArtifact(_)
            | ForgeError::ContainerFailure { .. }
            | ForgeError::TimeoutExceeded { .. } => Disposition::Repairable,
            ForgeError::IndexUnavailable(_)
            | ForgeError::EmbeddingFailure(_)
            | ForgeError::EmptyModel(_) => Disposition::Skippable,
            _ => Disposition::Fatal,
        }
    }

    /// Text handed back to the code generator on a repair attempt.
    pub fn repair_context(&self) -> String {
        match self {
            ForgeError::ContainerFailure {
                exit_code,
                stdout,
                stderr,
            } => {
                let mut text = format!("Process exited with code {}.", exit_code);
                if !stderr.trim().is_empty() {
                    text.push_str("\nstderr:\n");
                    text.push_str(stderr.trim());
                }
                if !stdout.trim().is_empty() {
                    text.push_str("\nstdout:\n");
                    text.push_str(stdout.trim());
                }
                text
            }
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for ForgeError {
    fn from(err: std::io::Error) -> Self {
        ForgeError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for ForgeError {
    fn from(err: reqwest::Error) -> Self {
        ForgeError::Io(format!("HTTP transport error: {}", err))
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        ForgeError::Validation(format!("JSON serialization error: {}", err))
    }
}
