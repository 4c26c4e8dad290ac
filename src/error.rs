use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single translation call. Both variants abort the whole job.
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("language code not recognized by the translation model: {0}")]
    InvalidLanguageCode(String),

    #[error("translation model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("generation failed: {0}")]
    Generation(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingField {
    File,
    SourceLanguage,
    TargetLanguages,
}

impl fmt::Display for MissingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::File => "please provide a Word or PDF file for translation",
            Self::SourceLanguage => "please select a source language",
            Self::TargetLanguages => "please select at least one target language",
        };
        f.write_str(msg)
    }
}

/// Where in a job a failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Validation,
    Load,
    Conversion,
    Translation,
    Save,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Validation => "validation",
            Self::Load => "load",
            Self::Conversion => "conversion",
            Self::Translation => "translation",
            Self::Save => "save",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error("missing input: {0}")]
    MissingInput(MissingField),

    #[error("unknown language: {0}")]
    UnknownLanguage(String),

    #[error("unsupported input (expected .docx or .pdf): {}", .0.display())]
    UnsupportedInput(PathBuf),

    #[error("conversion failed: {0:#}")]
    Conversion(anyhow::Error),

    #[error("translation into {language} failed: {source}")]
    Translation {
        language: String,
        #[source]
        source: TranslateError,
    },

    #[error("document error: {0:#}")]
    Document(anyhow::Error),

    #[error("filesystem error: {0:#}")]
    Filesystem(anyhow::Error),
}

impl JobError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::MissingInput(_) | Self::UnknownLanguage(_) | Self::UnsupportedInput(_) => {
                Stage::Validation
            }
            Self::Conversion(_) => Stage::Conversion,
            Self::Translation { .. } => Stage::Translation,
            Self::Document(_) => Stage::Load,
            Self::Filesystem(_) => Stage::Save,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{JobError, MissingField, Stage, TranslateError};

    #[test]
    fn stage_follows_variant() {
        assert_eq!(
            JobError::MissingInput(MissingField::File).stage(),
            Stage::Validation
        );
        assert_eq!(
            JobError::Conversion(anyhow::anyhow!("bad pdf")).stage(),
            Stage::Conversion
        );
        let err = JobError::Translation {
            language: "French".to_string(),
            source: TranslateError::ModelUnavailable("gone".to_string()),
        };
        assert_eq!(err.stage(), Stage::Translation);
        assert!(err.to_string().contains("French"));
        assert_eq!(
            JobError::Filesystem(anyhow::anyhow!("disk full")).stage(),
            Stage::Save
        );
    }
}
