use std::path::{Path, PathBuf};

/// A TemporaryFile owns a path on disk and will attempt to delete the file
/// when dropped.
#[derive(Debug)]
pub struct TemporaryFile {
    path: PathBuf,
}

impl TemporaryFile {
    /// Take ownership of an existing file on disk. When this struct is
    /// dropped, the path provided will be unlinked from the filesystem.
    pub fn new(path: &Path) -> Self {
        TemporaryFile { path: path.to_owned() }
    }

    /// Return the path on the filesystem.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TemporaryFile {
    fn drop(&mut self) {
        tracing::trace!(path = format!("{:?}", self.path), "removing dropped file");
        let _ = std::fs::remove_file(&self.path);
    }
}

/// A project archive made available by a
/// [ModelProvider](crate::ModelProvider).
#[derive(Debug)]
pub enum ArchiveFile {
    /// A file that already existed and is left alone.
    Existing(PathBuf),
    /// A file fetched for this print, removed once it is no longer needed.
    Temporary(TemporaryFile),
}

impl ArchiveFile {
    /// Return the path on the filesystem.
    pub fn path(&self) -> &Path {
        match self {
            ArchiveFile::Existing(path) => path,
            ArchiveFile::Temporary(file) => file.path(),
        }
    }
}
