
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{RagError, Result};

/// A tabular source file together with the natural-language description
/// attached to every chunk produced from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub filename: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct DescriptorDocument {
    #[serde(default)]
    files: Vec<DatasetDescriptor>,
}

impl DatasetDescriptor {
    #[inline]
    pub fn new(filename: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            description: description.into(),
        }
    }

    /// Resolve the file against the data directory unless it is absolute
    #[inline]
    pub fn path_in(&self, data_dir: &Path) -> PathBuf {
        let path = Path::new(&self.filename);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            data_dir.join(path)
        }
    }
}

/// Read the `files:` list from a YAML descriptor document.
///
/// ```yaml
/// files:
///   - filename: visitors_by_region.csv
///     description: Monthly visitor counts per region
/// ```
#[inline]
pub fn read_file_descriptions<P: AsRef<Path>>(yaml_file: P) -> Result<Vec<DatasetDescriptor>> {
    let path = yaml_file.as_ref();
    let content = fs::read_to_string(path).map_err(|e| {
        RagError::Config(format!(
            "Failed to read descriptor file {}: {}",
            path.display(),
            e
        ))
    })?;

    let descriptors = parse_file_descriptions(&content).map_err(|e| {
        RagError::Config(format!(
            "Failed to parse descriptor file {}: {}",
            path.display(),
            e
        ))
    })?;

    debug!(
        "Loaded {} dataset descriptors from {}",
        descriptors.len(),
        path.display()
    );
    Ok(descriptors)
}

fn parse_file_descriptions(content: &str) -> std::result::Result<Vec<DatasetDescriptor>, String> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let document: DescriptorDocument = serde_yaml::from_str(content).map_err(|e| e.to_string())?;

    if let Some(empty) = document
        .files
        .iter()
        .find(|d| d.filename.trim().is_empty())
    {
        return Err(format!(
            "descriptor with description '{}' has an empty filename",
            empty.description
        ));
    }

    Ok(document.files)
}
