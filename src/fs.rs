//! Filesystem helpers.

use std::io;
use std::path::Path;
use tempfile::NamedTempFile;

/// Writes `content` to `target` through a temp file in the same directory
/// and a rename, so readers never observe a half-written file.
pub async fn atomic_write(target: &Path, content: &[u8]) -> io::Result<()> {
    let parent = target
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "target has no parent"))?;
    tokio::fs::create_dir_all(parent).await?;

    let temp = NamedTempFile::new_in(parent)?;
    tokio::fs::write(temp.path(), content).await?;
    temp.persist(target)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_atomic_write_creates_parents() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested/dir/file.json");

        atomic_write(&target, b"{}").await.unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_atomic_write_replaces_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("file.txt");

        atomic_write(&target, b"first").await.unwrap();
        atomic_write(&target, b"second").await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
        let entries = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }
}
