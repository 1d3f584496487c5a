use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::to_writer_pretty;

use crate::errors::StoreError;

/// Reads a JSON document, treating a missing or empty file as absent.
pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(StoreError::io(path, err)),
    };
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|err| StoreError::Corrupt {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
}

/// Writes through a sibling temp file and renames it into place so readers
/// never observe a half-written document.
pub(crate) fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
        }
    }
    let tmp = path.with_extension("json.tmp");
    let file = File::create(&tmp).map_err(|err| StoreError::io(&tmp, err))?;
    let mut writer = BufWriter::new(file);
    to_writer_pretty(&mut writer, value).map_err(|err| StoreError::Corrupt {
        path: tmp.clone(),
        message: err.to_string(),
    })?;
    writer.flush().map_err(|err| StoreError::io(&tmp, err))?;
    drop(writer);
    fs::rename(&tmp, path).map_err(|err| StoreError::io(path, err))
}
