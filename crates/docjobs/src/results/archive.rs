use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::StorageError;

use super::NamedArtifact;

/// Packs artifacts into an in-memory zip, one flat entry per artifact.
pub fn build_zip(artifacts: &[NamedArtifact]) -> Result<Vec<u8>, StorageError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(6));

    for artifact in artifacts {
        writer
            .start_file(artifact.name.as_str(), options)
            .map_err(|e| StorageError::Archive(format!("{}: {}", artifact.name, e)))?;
        writer
            .write_all(&artifact.bytes)
            .map_err(|e| StorageError::Archive(format!("{}: {}", artifact.name, e)))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| StorageError::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}
