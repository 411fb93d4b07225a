//! CSV persistence shared by every pipeline stage.

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, warn};

/// Write rows to a CSV file with a header line, creating parent directories.
///
/// Returns the number of rows written. The header comes from the first
/// serialized row, so an empty slice leaves an empty file; any earlier
/// output at `path` is replaced either way.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    if rows.is_empty() {
        warn!(path = %path.display(), "No rows to save; truncating output");
        File::create(path)?;
        return Ok(0);
    }

    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;

    info!(path = %path.display(), rows = rows.len(), "Saved CSV");
    Ok(rows.len())
}

/// Read every row of a headed CSV file; unknown columns are ignored.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = File::open(path)?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let rows = rdr.deserialize().collect::<std::result::Result<Vec<T>, _>>()?;
    debug!(path = %path.display(), rows = rows.len(), "Loaded CSV");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LitError;
    use crate::paper::Paper;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_is_io_error() {
        let result: Result<Vec<Paper>> = read_csv(Path::new("/nonexistent/papers.csv"));
        assert!(matches!(result, Err(LitError::Io(_))));
    }

    #[test]
    fn test_empty_rows_leave_empty_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.csv");
        let written = write_csv::<Paper>(&path, &[])?;
        assert_eq!(written, 0);

        let loaded: Vec<Paper> = read_csv(&path)?;
        assert!(loaded.is_empty());
        Ok(())
    }

    #[test]
    fn test_empty_rerun_replaces_previous_output() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("raw.csv");
        let old = Paper {
            id: Some("OLD".to_string()),
            abstract_text: Some("stale".to_string()),
            ..Default::default()
        };
        write_csv(&path, &[old])?;

        write_csv::<Paper>(&path, &[])?;
        let loaded: Vec<Paper> = read_csv(&path)?;
        assert!(loaded.is_empty());
        Ok(())
    }

    #[test]
    fn test_multiline_abstract_survives() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("nested").join("papers.csv");
        let paper = Paper {
            id: Some("PMC1".to_string()),
            title: Some("Quoted, \"title\"".to_string()),
            abstract_text: Some("line one\nline two".to_string()),
            year: Some(2001),
            ..Default::default()
        };
        write_csv(&path, std::slice::from_ref(&paper))?;

        let loaded: Vec<Paper> = read_csv(&path)?;
        assert_eq!(loaded, vec![paper]);
        Ok(())
    }
}
