use std::path::PathBuf;

use thiserror::Error;

/// Main error type for callseq operations
#[derive(Error, Debug)]
pub enum CallseqError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parser error: {0}")]
    Parser(String),

    #[error("Syntax error in {}:{line}:{column}: {message}", .file.display())]
    Syntax {
        file: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Type check failed for package {package}: {message}")]
    TypeCheck { package: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Invalid registration pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("No Go packages found under {}", .0.display())]
    NoPackages(PathBuf),

    #[error("Analysis cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, CallseqError>;
