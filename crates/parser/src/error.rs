use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a file could not be parsed. The file still contributes a file node.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    #[error("binary content")]
    BinaryContent,

    #[error("no parser available for language")]
    ParserUnavailable,

    #[error("syntax could not be recovered")]
    SyntaxUnrecoverable,
}

/// A recovered per-file parse failure, reported alongside the build rather than thrown
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("failed to parse {path}: {reason}")]
pub struct ParseFailure {
    pub path: String,
    pub reason: FailureReason,
}
