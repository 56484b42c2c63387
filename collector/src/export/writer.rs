//! Atomic JSON file replacement

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;

/// Write `value` as compact JSON to `dir/name`, going through a sibling
/// temporary file so readers never see a partial document.
pub fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    let tmp = dir.join(format!("{}.tmp", name));

    let bytes = serde_json::to_vec(value)?;
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, &path)?;

    debug!("wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(path)
}
