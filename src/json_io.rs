use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JsonFileError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("expected a JSON object in {}", .0.display())]
    NotObject(PathBuf),
}

fn read_text(path: &Path) -> Result<String, JsonFileError> {
    std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == ErrorKind::NotFound {
            JsonFileError::NotFound(path.to_path_buf())
        } else {
            JsonFileError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })
}

/// JSON ファイルを型付きで読み込む
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, JsonFileError> {
    let content = read_text(path)?;
    serde_json::from_str(&content).map_err(|source| JsonFileError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// トップレベルがオブジェクトの JSON を読み込む。空ファイルは空オブジェクト扱い。
pub fn read_json_object(path: &Path) -> Result<Map<String, Value>, JsonFileError> {
    let content = read_text(path)?;

    if content.trim().is_empty() {
        return Ok(Map::new());
    }

    let value: Value = serde_json::from_str(&content).map_err(|source| JsonFileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(JsonFileError::NotObject(path.to_path_buf())),
    }
}

/// 整形済み JSON を書き込む (アトミック: tmp → rename)。親ディレクトリがなければ作成。
pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {:?}", parent))?;
        }
    }

    let mut content = serde_json::to_string_pretty(value).context("Failed to serialize JSON")?;
    content.push('\n');

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &content)
        .with_context(|| format!("Failed to write temp file: {:?}", tmp_path))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to rename temp file: {:?}", tmp_path))?;

    Ok(())
}
