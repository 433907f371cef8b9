use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};
use uuid::Uuid;

use crate::application::storage::{ObjectStore, StorageError, StoredObject};

/// Object store rooted at a local directory. Object paths map to files below
/// the root; directories are implicit.
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, object_path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(object_path);
        if object_path.is_empty() {
            return Err(StorageError::invalid_path(object_path, "path is empty"));
        }
        if relative.is_absolute()
            || relative.components().any(|component| {
                matches!(
                    component,
                    Component::ParentDir | Component::Prefix(_) | Component::RootDir
                )
            })
        {
            return Err(StorageError::invalid_path(
                object_path,
                "path escapes the storage root",
            ));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StorageError> {
        let mut objects = Vec::new();
        let mut pending = vec![(self.root.clone(), String::new())];

        while let Some((directory, relative)) = pending.pop() {
            let mut entries = fs::read_dir(&directory).await?;
            while let Some(entry) = entries.next_entry().await? {
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                // In-flight uploads and editor droppings.
                if name.starts_with('.') {
                    continue;
                }

                let path = if relative.is_empty() {
                    name
                } else {
                    format!("{relative}/{name}")
                };
                let file_type = entry.file_type().await?;

                if file_type.is_dir() {
                    if prefix.starts_with(&format!("{path}/")) || path.starts_with(prefix) {
                        pending.push((entry.path(), path));
                    }
                } else if file_type.is_file() && path.starts_with(prefix) {
                    let size = entry.metadata().await?.len();
                    objects.push(StoredObject { path, size });
                }
            }
        }

        objects.sort_by(|left, right| left.path.cmp(&right.path));
        Ok(objects)
    }

    async fn download(&self, path: &str) -> Result<Bytes, StorageError> {
        let absolute = self.resolve(path)?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Writes go to a sibling temp file first so readers never see a partial object.
    async fn upload(&self, path: &str, body: Bytes) -> Result<(), StorageError> {
        let absolute = self.resolve(path)?;
        let parent = absolute
            .parent()
            .ok_or_else(|| StorageError::invalid_path(path, "path has no parent"))?;
        fs::create_dir_all(parent).await?;

        let file_name = absolute
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StorageError::invalid_path(path, "path has no file name"))?;
        let temp = parent.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let mut file = fs::File::create(&temp).await?;
        if let Err(err) = file.write_all(&body).await {
            drop(file);
            let _ = fs::remove_file(&temp).await;
            return Err(err.into());
        }
        file.flush().await?;
        drop(file);

        if let Err(err) = fs::rename(&temp, &absolute).await {
            let _ = fs::remove_file(&temp).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Missing files are treated as success.
    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        let absolute = self.resolve(path)?;
        match fs::remove_file(&absolute).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn store() -> (TempDir, FsObjectStore) {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path().join("objects")).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn rejects_paths_outside_root() {
        let (_dir, store) = store();

        for path in ["../secret.png", "/etc/passwd", "clubs/../../x.jpg", ""] {
            let err = store.download(path).await.unwrap_err();
            assert!(
                matches!(err, StorageError::InvalidPath { .. }),
                "{path} should be rejected, got {err:?}"
            );
        }
        assert!(
            store
                .upload("../escape.jpg", Bytes::from_static(b"x"))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn lists_nested_objects_under_prefix() {
        let (_dir, store) = store();
        store
            .upload("clubs/drivers/titleist.png", Bytes::from_static(b"12345"))
            .await
            .unwrap();
        store
            .upload("clubs/irons/ping.jpg", Bytes::from_static(b"123"))
            .await
            .unwrap();
        store
            .upload("hero/bay.jpg", Bytes::from_static(b"1"))
            .await
            .unwrap();

        let all = store.list("").await.unwrap();
        let paths: Vec<_> = all.iter().map(|object| object.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["clubs/drivers/titleist.png", "clubs/irons/ping.jpg", "hero/bay.jpg"]
        );
        assert_eq!(all[0].size, 5);

        let clubs = store.list("clubs/dr").await.unwrap();
        assert_eq!(clubs.len(), 1);
        assert_eq!(clubs[0].path, "clubs/drivers/titleist.png");
    }

    #[tokio::test]
    async fn upload_replaces_and_delete_is_idempotent() {
        let (_dir, store) = store();
        store
            .upload("a.png", Bytes::from_static(b"first"))
            .await
            .unwrap();
        store
            .upload("a.png", Bytes::from_static(b"second"))
            .await
            .unwrap();
        assert_eq!(store.download("a.png").await.unwrap(), Bytes::from_static(b"second"));

        store.delete("a.png").await.unwrap();
        store.delete("a.png").await.unwrap();
        assert!(matches!(
            store.download("a.png").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(store.list("").await.unwrap().is_empty());
    }
}
