//! Writing results to disk.

use crate::error::FormEaseError;
use std::path::Path;

/// Write `bytes` to `path` atomically: a sibling temp file is written first
/// and renamed over the target, so a crash never leaves half a file behind.
///
/// Missing parent directories are created.
pub async fn write_atomic(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), FormEaseError> {
    let path = path.as_ref();
    let fail = |e: std::io::Error| FormEaseError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(fail(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_parents_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nested/guide.md");
        write_atomic(&path, b"# Guide\n").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"# Guide\n");
        assert!(!dir.path().join("out/nested/guide.md.tmp").exists());
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filled_w4.pdf");
        std::fs::write(&path, b"old").unwrap();
        write_atomic(&path, b"new").await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[tokio::test]
    async fn unwritable_target_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be replaced by a file.
        let target = dir.path().join("taken");
        std::fs::create_dir_all(target.join("inner")).unwrap();
        let err = write_atomic(&target, b"x").await.unwrap_err();
        match err {
            FormEaseError::OutputWriteFailed { path, .. } => assert_eq!(path, target),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("taken");
        std::fs::create_dir_all(target.join("inner")).unwrap();
        assert!(write_atomic(&target, b"x").await.is_err());
        assert!(!dir.path().join("taken.tmp").exists());
    }
}
