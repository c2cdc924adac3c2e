use std::{
    ops::Deref,
    path::{Path, PathBuf},
    sync::Arc,
};

use uuid::Uuid;

pub(crate) type ArcTmpDir = Arc<TmpDir>;

/// A per-process scratch directory that uploads are buffered into
#[derive(Debug)]
pub(crate) struct TmpDir {
    path: Option<PathBuf>,
}

impl TmpDir {
    pub(crate) async fn init<P: AsRef<Path>>(path: P) -> std::io::Result<Arc<Self>> {
        tokio::fs::create_dir_all(path.as_ref()).await?;

        let path = path.as_ref().join(Uuid::now_v7().to_string());
        tokio::fs::create_dir(&path).await?;

        Ok(Arc::new(TmpDir { path: Some(path) }))
    }

    pub(crate) fn path(&self) -> &Path {
        self.path.as_deref().expect("tmp path exists")
    }

    fn build_tmp_file(&self, ext: Option<&str>) -> PathBuf {
        if let Some(ext) = ext {
            self.path().join(format!("{}{}", Uuid::now_v7(), ext))
        } else {
            self.path().join(Uuid::now_v7().to_string())
        }
    }

    /// Reserve a uniquely named path in the scratch directory
    ///
    /// Nothing is created on disk until the caller writes to the path
    pub(crate) fn tmp_file(&self, ext: Option<&str>) -> TmpFile {
        TmpFile(Some(self.build_tmp_file(ext)))
    }

    pub(crate) async fn cleanup(self: Arc<Self>) -> std::io::Result<()> {
        if let Some(path) = Arc::into_inner(self).and_then(|mut this| this.path.take()) {
            tokio::fs::remove_dir_all(path).await?;
        }

        Ok(())
    }
}

impl Drop for TmpDir {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            let _ = std::fs::remove_dir_all(path);
        }
    }
}

/// A scratch file that's removed when it's cleaned up or dropped
#[must_use]
#[derive(Debug)]
pub(crate) struct TmpFile(Option<PathBuf>);

impl TmpFile {
    /// Take responsibility for removing a file some other step created
    pub(crate) fn adopt(path: PathBuf) -> Self {
        TmpFile(Some(path))
    }

    /// Remove the file, treating an already-missing file as removed
    pub(crate) async fn cleanup(mut self) -> std::io::Result<()> {
        if let Some(path) = self.0.take() {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

impl AsRef<Path> for TmpFile {
    fn as_ref(&self) -> &Path {
        self
    }
}

impl Deref for TmpFile {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        self.0.as_deref().expect("tmp file path exists")
    }
}

impl Drop for TmpFile {
    fn drop(&mut self) {
        if let Some(path) = self.0.take() {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::TmpDir;

    #[actix_web::test]
    async fn tmp_files_are_removed() {
        let tmp_dir = TmpDir::init(std::env::temp_dir().join("tubely-tmp-file-tests"))
            .await
            .expect("created tmp dir");

        let file = tmp_dir.tmp_file(Some(".mp4"));
        assert_eq!(file.extension().and_then(|ext| ext.to_str()), Some("mp4"));

        tokio::fs::write(&file, b"hello").await.expect("wrote file");
        let path = file.to_path_buf();
        assert!(path.exists());

        file.cleanup().await.expect("removed file");
        assert!(!path.exists());

        let dropped = tmp_dir.tmp_file(None);
        tokio::fs::write(&dropped, b"hello").await.expect("wrote file");
        let path = dropped.to_path_buf();
        drop(dropped);
        assert!(!path.exists());

        let dir = tmp_dir.path().to_path_buf();
        tmp_dir.cleanup().await.expect("removed tmp dir");
        assert!(!dir.exists());
    }

    #[actix_web::test]
    async fn cleanup_of_unwritten_file_succeeds() {
        let tmp_dir = TmpDir::init(std::env::temp_dir().join("tubely-tmp-file-tests"))
            .await
            .expect("created tmp dir");

        tmp_dir
            .tmp_file(None)
            .cleanup()
            .await
            .expect("missing file counts as removed");
    }
}
