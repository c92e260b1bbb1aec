use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::fs;
use tracing::warn;

use crate::error::StoreResult;

/// Reads a text file, replacing invalid UTF-8 instead of failing.
pub async fn read_text_lossy(path: &Path) -> StoreResult<String> {
    let bytes = fs::read(path).await?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!("Decoding {} lossily: {}", path.display(), e.utf8_error());
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    })
}

/// Reads a JSON array of records. A missing file is empty.
///
/// Records that don't match `T` are logged and skipped. A file that is not a
/// JSON array at all is an error, so callers never write over it.
pub async fn read_json_records<T: DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
    let data = match fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let values: Vec<Value> = serde_json::from_str(&data)?;
    let total = values.len();
    let records: Vec<T> = values
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();

    if records.len() < total {
        warn!(
            "Skipped {} malformed records in {}",
            total - records.len(),
            path.display()
        );
    }
    Ok(records)
}

/// Pretty-prints `value` to a sibling temp file, then renames it over `path`.
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let body = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
