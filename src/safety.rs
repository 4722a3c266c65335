//! Guards against a batch run clobbering its own input.
//!
//! The batch writer deletes and recreates its output file, so the output path
//! is validated before anything is removed.

use anyhow::{bail, Result};
use std::path::Path;

/// Extensions that only ever belong to inputs (tracklists, configs).
const INPUT_EXTENSIONS: [&str; 2] = ["json", "toml"];

/// Validates that an output path is safe to overwrite.
///
/// The file name must contain `required_pattern`, must not carry an input
/// extension, and must differ from every path in `source_paths`.
pub fn validate_output_path(
    output: &Path,
    required_pattern: &str,
    source_paths: &[&Path],
) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    for source in source_paths {
        if output == *source {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if INPUT_EXTENSIONS.contains(&extension.as_str()) {
        bail!(
            "Safety check failed: output '{}' looks like an input file (.{})",
            output.display(),
            extension
        );
    }

    Ok(())
}
