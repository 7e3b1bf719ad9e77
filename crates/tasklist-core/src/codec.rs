pub mod csv;
pub mod json;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::anyhow;
use tracing::{debug, info};
use uuid::Uuid;

use crate::task::Todo;

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("unsupported import file '{path}': expected a .json or .csv file")]
    UnsupportedExtension { path: PathBuf },
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid JSON: expected an array of items")]
    NotAnArray,
    #[error("invalid CSV header: expected '{expected}', found '{found}'", expected = csv::HEADER)]
    CsvHeader { found: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Csv,
}

impl Format {
    /// Picks the codec from the file extension, ignoring case.
    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("csv") => Ok(Self::Csv),
            _ => Err(ImportError::UnsupportedExtension {
                path: path.to_path_buf(),
            }),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    pub fn default_file_name(self) -> String {
        format!("todos.{}", self.extension())
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(anyhow!("unknown format: {other} (expected json or csv)")),
        }
    }
}

/// Records that passed decoding, plus counts of what didn't.
#[derive(Debug, Default)]
pub struct Decoded {
    pub candidates: Vec<Todo>,
    /// Rows that failed the shape check.
    pub dropped: usize,
    /// CSV lines that could not be tokenized into three fields.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub added: usize,
    pub duplicates: usize,
}

pub fn encode(todos: &[Todo], format: Format) -> anyhow::Result<String> {
    match format {
        Format::Json => json::encode(todos),
        Format::Csv => Ok(csv::encode(todos)),
    }
}

pub fn decode(text: &str, format: Format) -> Result<Decoded, ImportError> {
    match format {
        Format::Json => json::decode(text),
        Format::Csv => csv::decode(text),
    }
}

#[tracing::instrument]
pub fn read_import_file(path: &Path) -> Result<Decoded, ImportError> {
    let format = Format::from_path(path)?;
    let text = fs::read_to_string(path).map_err(|source| ImportError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = decode(&text, format)?;
    debug!(
        %format,
        candidates = decoded.candidates.len(),
        dropped = decoded.dropped,
        skipped = decoded.skipped,
        "decoded import file"
    );
    Ok(decoded)
}

/// Same title and same detail text; absent detail equals empty detail.
pub fn is_duplicate(a: &Todo, b: &Todo) -> bool {
    a.title == b.title && a.detail_text() == b.detail_text()
}

/// Appends every candidate not already present. Candidates are checked
/// against records appended earlier in the same batch too.
#[tracing::instrument(skip(existing, candidates))]
pub fn merge_imported(existing: &mut Vec<Todo>, candidates: Vec<Todo>) -> MergeReport {
    let mut report = MergeReport::default();
    for mut candidate in candidates {
        if existing.iter().any(|todo| is_duplicate(todo, &candidate)) {
            report.duplicates += 1;
            continue;
        }
        if candidate.id.is_none() {
            candidate.id = Some(Uuid::new_v4());
        }
        existing.push(candidate);
        report.added += 1;
    }
    info!(added = report.added, duplicates = report.duplicates, "merged import");
    report
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{Format, ImportError, merge_imported};
    use crate::task::Todo;

    fn todo(title: &str, detail: Option<&str>) -> Todo {
        let mut t = Todo::new(title.to_string());
        t.detail = detail.map(str::to_string);
        t
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(
            Format::from_path(Path::new("a/b/todos.JSON")).expect("json"),
            Format::Json
        );
        assert_eq!(
            Format::from_path(Path::new("x.csv")).expect("csv"),
            Format::Csv
        );
        assert!(matches!(
            Format::from_path(Path::new("notes.txt")),
            Err(ImportError::UnsupportedExtension { .. })
        ));
        assert!(Format::from_path(Path::new("noext")).is_err());
    }

    #[test]
    fn merge_skips_duplicates_including_empty_detail() {
        let mut existing = vec![todo("a", None), todo("b", Some("x"))];
        let before = existing.clone();

        let report = merge_imported(
            &mut existing,
            vec![todo("a", Some("")), todo("b", Some("x"))],
        );
        assert_eq!(report.added, 0);
        assert_eq!(report.duplicates, 2);
        assert_eq!(existing, before);

        let mut fresh = todo("c", None);
        fresh.id = None;
        let report = merge_imported(
            &mut existing,
            vec![fresh.clone(), fresh, todo("b", Some("y"))],
        );
        assert_eq!(report.added, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(existing.len(), 4);
        assert!(existing[2].id.is_some());
    }
}
