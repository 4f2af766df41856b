//! Domain-specific error types for sflow-report.
//!
//! Uses `thiserror` for the typed failures of loading and rendering; the
//! pipeline itself propagates them through `anyhow`.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while decoding the flow-record file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Malformed flow record on line {line}: {source}")]
    MalformedRecord {
        line: u64,
        #[source]
        source: csv::Error,
    },
}

/// Errors that can occur while rendering the pair graph.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("no usable TrueType font found (searched: {})", display_paths(.searched))]
    FontUnavailable { searched: Vec<PathBuf> },

    #[error("Failed to read font '{}': {source}", .path.display())]
    FontRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{}' is not a valid TrueType/OpenType font", .path.display())]
    InvalidFont { path: PathBuf },

    #[error("Failed to write image '{}': {source}", .path.display())]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

impl RenderError {
    /// True when the error means rendering is not possible on this host,
    /// as opposed to a failure while producing the image.
    pub fn is_capability_missing(&self) -> bool {
        matches!(
            self,
            Self::FontUnavailable { .. } | Self::FontRead { .. } | Self::InvalidFont { .. }
        )
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "none".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias using anyhow for application-level error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_unavailable_lists_searched_paths() {
        let err = RenderError::FontUnavailable {
            searched: vec![PathBuf::from("/a.ttf"), PathBuf::from("/b.ttf")],
        };
        assert_eq!(
            err.to_string(),
            "no usable TrueType font found (searched: /a.ttf, /b.ttf)"
        );
        assert!(err.is_capability_missing());
    }

    #[test]
    fn test_font_unavailable_empty_search() {
        let err = RenderError::FontUnavailable { searched: vec![] };
        assert!(err.to_string().ends_with("(searched: none)"));
    }
}
