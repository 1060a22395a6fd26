//! # Disk Export
//!
//! Writes output tables below the run's output directory, one directory per node
//! and slot: `<output_path>/<node>/<slot>/`. The file layout inside a slot directory
//! belongs to the [`DataExporter`]; [`JsonDataExporter`] writes a single
//! `data.json`.

use crate::data::DataTable;
use crate::error::ExportError;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Writes a data table into a directory.
pub trait DataExporter: Send + Sync {
  /// Exports `table` into `directory`, creating it if needed.
  fn export(&self, table: &DataTable, directory: &Path) -> Result<(), ExportError>;
}

/// [`DataExporter`] that writes the table as pretty-printed JSON to `data.json`.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonDataExporter;

impl JsonDataExporter {
  /// File name written into each slot directory.
  pub const FILE_NAME: &'static str = "data.json";
}

impl DataExporter for JsonDataExporter {
  fn export(&self, table: &DataTable, directory: &Path) -> Result<(), ExportError> {
    trace!(directory = %directory.display(), rows = table.len(), "JsonDataExporter::export()");
    create_dir_all(directory)?;
    let path = directory.join(Self::FILE_NAME);
    let json = serde_json::to_string_pretty(table)?;
    std::fs::write(&path, json).map_err(|source| ExportError::Io { path, source })
  }
}

/// Creates a directory and its parents, mapping failures to [`ExportError::Io`].
pub(crate) fn create_dir_all(directory: &Path) -> Result<(), ExportError> {
  std::fs::create_dir_all(directory).map_err(|source| ExportError::Io {
    path: directory.to_path_buf(),
    source,
  })
}

/// Turns an arbitrary name into a single, portable path component.
///
/// Characters other than ASCII alphanumerics, `-`, `_` and `.` become `-`; an empty
/// or dot-only result becomes `_`.
pub fn safe_path_component(name: &str) -> String {
  let safe: String = name
    .chars()
    .map(|c| {
      if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
        c
      } else {
        '-'
      }
    })
    .collect();
  if safe.chars().all(|c| c == '.') {
    "_".to_string()
  } else {
    safe
  }
}

/// Returns the directory an output slot is exported to.
pub fn slot_directory(output_path: &Path, node: &str, slot: &str) -> PathBuf {
  output_path
    .join(safe_path_component(node))
    .join(safe_path_component(slot))
}
