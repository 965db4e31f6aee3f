use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;

use crate::{
    application::ports::{BlobError, BlobStore},
    util::paths::{safe_relative, to_blob_path},
};

/// Blobs stored as plain files below a root directory.
#[derive(Debug, Clone)]
pub struct FilesystemBlobStore {
    root: PathBuf,
}

impl FilesystemBlobStore {
    /// Initialise storage rooted at `root`, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, BlobError> {
        safe_relative(path)
            .map(|relative| self.root.join(relative))
            .ok_or_else(|| BlobError::InvalidPath(path.to_string()))
    }

    /// Deepest directory that can contain every blob matching `prefix`.
    fn list_base(&self, prefix: &str) -> Result<PathBuf, BlobError> {
        match prefix.rfind('/') {
            None => Ok(self.root.clone()),
            Some(index) => self.resolve(&prefix[..index]),
        }
    }
}

#[async_trait]
impl BlobStore for FilesystemBlobStore {
    async fn get(&self, path: &str) -> Result<Bytes, BlobError> {
        let absolute = self.resolve(path)?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(path.to_string()))
            }
            Err(err) => Err(BlobError::Io(err)),
        }
    }

    async fn put(&self, path: &str, data: Bytes) -> Result<(), BlobError> {
        let absolute = self.resolve(path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&absolute, &data).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobError> {
        let base = self.list_base(prefix)?;
        let mut found = Vec::new();
        let mut pending = vec![base];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => return Err(BlobError::Io(err)),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                let Some(blob) = path
                    .strip_prefix(&self.root)
                    .ok()
                    .and_then(to_blob_path)
                else {
                    continue;
                };
                if blob.starts_with(prefix) {
                    found.push(blob);
                }
            }
        }

        found.sort();
        Ok(found)
    }

    async fn copy(&self, from: &str, to: &str) -> Result<(), BlobError> {
        let source = self.resolve(from)?;
        let target = self.resolve(to)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        match fs::copy(&source, &target).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(from.to_string()))
            }
            Err(err) => Err(BlobError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn store() -> (TempDir, FilesystemBlobStore) {
        let dir = TempDir::new().expect("temp dir");
        let store = FilesystemBlobStore::new(dir.path().join("blobs")).expect("store");
        (dir, store)
    }

    #[tokio::test]
    async fn put_get_and_list_by_prefix() {
        let (_dir, store) = store();
        store
            .put("templates/report/main.tex", Bytes::from_static(b"main"))
            .await
            .expect("put main");
        store
            .put("templates/report/figures/logo.png", Bytes::from_static(b"png"))
            .await
            .expect("put logo");
        store
            .put("templates/reporting/other.tex", Bytes::from_static(b"other"))
            .await
            .expect("put other");

        assert_eq!(
            store.get("templates/report/main.tex").await.expect("get"),
            Bytes::from_static(b"main")
        );
        assert_eq!(
            store.list("templates/report/").await.expect("list"),
            vec![
                "templates/report/figures/logo.png".to_string(),
                "templates/report/main.tex".to_string(),
            ]
        );
        assert_eq!(store.list("templates/report").await.expect("list").len(), 3);
        assert!(store.list("missing/").await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn copy_creates_parents_and_reports_missing_sources() {
        let (_dir, store) = store();
        store
            .put("a/main.tex", Bytes::from_static(b"x"))
            .await
            .expect("put");
        store
            .copy("a/main.tex", "jobs/1/input/main.tex")
            .await
            .expect("copy");
        assert_eq!(
            store.get("jobs/1/input/main.tex").await.expect("get"),
            Bytes::from_static(b"x")
        );

        assert!(matches!(
            store.copy("a/none.tex", "b/none.tex").await,
            Err(BlobError::NotFound(_))
        ));
        assert!(matches!(store.get("a/none.tex").await, Err(BlobError::NotFound(_))));
    }

    #[tokio::test]
    async fn rejects_paths_escaping_the_root() {
        let (_dir, store) = store();
        assert!(matches!(
            store.put("../outside", Bytes::new()).await,
            Err(BlobError::InvalidPath(_))
        ));
        assert!(matches!(
            store.get("/etc/passwd").await,
            Err(BlobError::InvalidPath(_))
        ));
    }
}
