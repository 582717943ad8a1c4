//! Small filesystem helpers for the JSON stores.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Replace `path` with `contents` via a sibling temp file and rename, so
/// readers never observe a partially written file.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    replace(path, contents, false).await
}

/// Like `write_atomic`, but the file is readable by its owner only, from the
/// moment the temp file is created.
pub async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    replace(path, contents, true).await
}

#[cfg_attr(not(unix), allow(unused_variables))]
async fn replace(path: &Path, contents: &[u8], private: bool) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    // A leftover temp file would keep its old mode
    remove_if_exists(&tmp_path).await?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    if private {
        options.mode(0o600);
    }

    let written = async {
        let mut file = options.open(&tmp_path).await?;
        file.write_all(contents).await?;
        file.sync_all().await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

/// Read a file, treating a missing file as `None`.
pub async fn read_optional(path: &Path) -> std::io::Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Delete a file, treating a missing file as already deleted.
pub async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
