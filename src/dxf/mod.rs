//! DXF geometry descriptor.
//!
//! Reads the ENTITIES section of an ASCII DXF, drops annotation and
//! construction content, and renders a deterministic summary document that
//! the code generator consumes.

pub mod entity;
pub mod filter;
pub mod reader;
pub mod summary;

use std::path::Path;

use tracing::{debug, instrument};

use crate::error::ForgeError;

pub use entity::{BoundingBox, EntityKind, GeometryEntity, Point3};
pub use filter::{apply_filters, FilterConfig, FilterOutcome};
pub use summary::{GeometrySummary, DETAIL_THRESHOLD, EMPTY_DOCUMENT_MARKER};

/// Describe DXF text already in memory. `source` is only used in the header.
pub fn describe_text(
    source: &str,
    text: &str,
    config: &FilterConfig,
) -> Result<GeometrySummary, ForgeError> {
    let entities = reader::read_entities(text)?;
    let total = entities.len();
    let outcome = apply_filters(entities, config);
    debug!(
        total,
        retained = outcome.retained.len(),
        dropped = outcome.dropped_count(),
        "DXF entities filtered"
    );
    Ok(summary::summarize(source, total, outcome, config))
}

/// Describe a DXF file on disk.
#[instrument(name = "dxf.describe", skip(config), fields(path = %path.display()))]
pub fn describe_file(path: &Path, config: &FilterConfig) -> Result<GeometrySummary, ForgeError> {
    let bytes = std::fs::read(path).map_err(|e| ForgeError::FileUnreadable {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    // DXF from older converters is frequently Latin-1; lossy decode keeps group codes intact
    let text = String::from_utf8_lossy(&bytes);
    describe_text(&path.display().to_string(), &text, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "0\nSECTION\n2\nENTITIES\n\
0\nLINE\n5\nA1\n8\ngeom\n10\n0.0\n20\n0.0\n30\n0.0\n11\n10.0\n21\n0.0\n31\n0.0\n\
0\nCIRCLE\n5\nA2\n8\ngeom\n10\n5.0\n20\n5.0\n30\n0.0\n40\n2.5\n\
0\nDIMENSION\n5\nA3\n8\ngeom\n\
0\nLINE\n5\nA4\n8\nDIMENSIONS\n10\n0.0\n20\n0.0\n30\n0.0\n11\n1.0\n21\n1.0\n31\n0.0\n\
0\nENDSEC\n0\nEOF\n";

    #[test]
    fn test_describe_text_filters_and_counts() {
        let summary = describe_text("part.dxf", SAMPLE, &FilterConfig::default()).unwrap();
        assert_eq!(summary.total_entities, 4);
        assert_eq!(summary.retained_entities, 2);
        assert_eq!(summary.entity_ids(), vec!["A1", "A2"]);
        assert!(summary.document.contains("Source: part.dxf"));
        assert!(summary.document.contains("- DIMENSIONS (1 entities)"));
    }

    #[test]
    fn test_describe_is_deterministic() {
        let a = describe_text("part.dxf", SAMPLE, &FilterConfig::default()).unwrap();
        let b = describe_text("part.dxf", SAMPLE, &FilterConfig::default()).unwrap();
        assert_eq!(a.document, b.document);
    }

    #[test]
    fn test_describe_file_missing_is_unreadable() {
        let err = describe_file(Path::new("/nonexistent/part.dxf"), &FilterConfig::default())
            .unwrap_err();
        assert_eq!(err.label(), "FILE_UNREADABLE");
    }

    #[test]
    fn test_describe_file_reads_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".dxf").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let summary = describe_file(file.path(), &FilterConfig::all()).unwrap();
        assert_eq!(summary.retained_entities, 4);
        assert!(summary.document.contains("filtering disabled"));
        assert!(summary
            .document
            .contains(&format!("Source: {}", file.path().display())));
        assert_eq!(summary.source, file.path().display().to_string());
    }
}
