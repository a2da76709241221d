//! File storage for cached tiles with advisory locking.
//!
//! Readers take a blocking shared lock; writers take a non-blocking
//! exclusive lock and give up immediately when another writer holds it.
//! Deleting a tile also takes the exclusive lock first, so a file that is
//! being written is never removed from under its writer.
//!
//! Locks belong to the open file, so they coordinate threads that open the
//! file independently as well as separate processes sharing the root.

use std::fs::{self, File, Metadata, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

use crate::cache::key::TileKey;
use crate::cache::path::{address_path, tile_path};

/// Storage-level failures.
///
/// None of these escalate past the cache facade: `NotFound` becomes a
/// miss, `Busy` and `Io` during a write become a skipped write, and any
/// failure to delete stalls eviction.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No readable file for this tile
    #[error("Tile file not found")]
    NotFound,

    /// Another handle holds a conflicting lock
    #[error("Tile file is locked by another writer")]
    Busy,

    /// Any other I/O failure
    #[error("Tile storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// An open tile file together with the advisory lock taken on it.
///
/// The lock is released when the handle is dropped.
#[derive(Debug)]
pub struct LockedFile {
    file: File,
    path: PathBuf,
}

impl LockedFile {
    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file from the current position.
    pub fn read_all(&mut self) -> io::Result<Vec<u8>> {
        let mut data = Vec::new();
        self.file.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Write all bytes and flush them to the OS.
    pub fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.write_all(data)?;
        self.file.flush()
    }

    /// On-disk allocation of the file, see [`size_on_disk`].
    pub fn allocated_size(&self) -> io::Result<u64> {
        Ok(allocated_size(&self.file.metadata()?))
    }

    /// Delete the file while still holding its lock.
    pub fn unlink(&self) -> Result<(), StorageError> {
        fs::remove_file(&self.path)?;
        Ok(())
    }
}

/// Tile file storage rooted at the cache directory.
#[derive(Debug, Clone)]
pub struct TileStorage {
    root: PathBuf,
}

impl TileStorage {
    /// Create storage rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `key`.
    pub fn path_for(&self, key: &TileKey) -> PathBuf {
        tile_path(&self.root, key)
    }

    /// Open a tile for reading under a shared lock.
    ///
    /// Blocks while a writer holds the exclusive lock. Any failure to open
    /// the file is reported as [`StorageError::NotFound`].
    pub fn open_for_read(&self, key: &TileKey) -> Result<LockedFile, StorageError> {
        let path = self.path_for(key);
        let file = File::open(&path).map_err(|_| StorageError::NotFound)?;
        FileExt::lock_shared(&file)?;

        Ok(LockedFile { file, path })
    }

    /// Open or create a tile file for writing under an exclusive lock.
    ///
    /// The lock attempt never blocks. A missing parent directory is created
    /// and the open retried once. Existing content is only truncated once
    /// the lock is held, so a losing writer never clobbers the winner.
    pub fn create_for_write(&self, path: &Path) -> Result<LockedFile, StorageError> {
        match try_create(path) {
            Err(StorageError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    if let Err(e) = fs::create_dir_all(parent) {
                        if e.kind() != io::ErrorKind::AlreadyExists {
                            return Err(e.into());
                        }
                    }
                }
                try_create(path)
            }
            other => other,
        }
    }

    /// Delete the file stored under a content address.
    ///
    /// Takes the exclusive lock first without waiting: a file held by a
    /// reader or writer is left alone and reported as
    /// [`StorageError::Busy`].
    pub fn remove(&self, address: &str) -> Result<(), StorageError> {
        let path = address_path(&self.root, address);
        let file = File::open(&path)?;
        try_lock_exclusive(&file)?;
        if !still_linked(&file, &path)? {
            return Err(StorageError::Busy);
        }

        fs::remove_file(&path)?;
        Ok(())
    }
}

fn try_create(path: &Path) -> Result<LockedFile, StorageError> {
    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    try_lock_exclusive(&file)?;
    // Lost a race with a deletion: the locked inode is no longer the tile
    if !still_linked(&file, path)? {
        return Err(StorageError::Busy);
    }
    file.set_len(0)?;

    Ok(LockedFile {
        file,
        path: path.to_path_buf(),
    })
}

fn try_lock_exclusive(file: &File) -> Result<(), StorageError> {
    match FileExt::try_lock_exclusive(file) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == fs2::lock_contended_error().kind() => Err(StorageError::Busy),
        Err(e) => Err(e.into()),
    }
}

/// Whether `path` still names the file behind `file`.
#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}

/// Disk space allocated to a file, in bytes.
///
/// This is the block allocation (`st_blocks * 512`), not the logical
/// length, so budget accounting reflects real disk pressure. When the
/// filesystem has not allocated blocks yet for a non-empty file (delayed
/// allocation), the logical length is used instead.
pub fn size_on_disk(path: &Path) -> io::Result<u64> {
    Ok(allocated_size(&fs::metadata(path)?))
}

#[cfg(unix)]
fn allocated_size(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;

    match metadata.blocks() * 512 {
        0 => metadata.len(),
        allocated => allocated,
    }
}

#[cfg(not(unix))]
fn allocated_size(metadata: &Metadata) -> u64 {
    metadata.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_storage() -> (TileStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        (TileStorage::new(temp_dir.path()), temp_dir)
    }

    #[test]
    fn test_open_missing_tile_is_not_found() {
        let (storage, _temp) = create_storage();
        let result = storage.open_for_read(&TileKey::new(0, 0, 5));
        assert!(matches!(result, Err(StorageError::NotFound)));
    }

    #[test]
    fn test_create_makes_parent_directories() {
        let (storage, _temp) = create_storage();
        let key = TileKey::new(3, 2, 7);
        let path = storage.path_for(&key);

        let mut file = storage.create_for_write(&path).unwrap();
        file.write_all(b"tile").unwrap();
        drop(file);

        assert!(path.is_file());
        let mut reader = storage.open_for_read(&key).unwrap();
        assert_eq!(reader.read_all().unwrap(), b"tile");
    }

    #[test]
    fn test_create_truncates_previous_content() {
        let (storage, _temp) = create_storage();
        let key = TileKey::new(1, 1, 1);
        let path = storage.path_for(&key);

        storage
            .create_for_write(&path)
            .unwrap()
            .write_all(b"a much longer payload")
            .unwrap();
        storage
            .create_for_write(&path)
            .unwrap()
            .write_all(b"short")
            .unwrap();

        let mut reader = storage.open_for_read(&key).unwrap();
        assert_eq!(reader.read_all().unwrap(), b"short");
    }

    #[test]
    fn test_second_writer_is_busy() {
        let (storage, _temp) = create_storage();
        let path = storage.path_for(&TileKey::new(4, 4, 4));

        let mut winner = storage.create_for_write(&path).unwrap();
        winner.write_all(b"winner").unwrap();

        let loser = storage.create_for_write(&path);
        assert!(matches!(loser, Err(StorageError::Busy)));

        // Losing attempt must not have truncated the winner's bytes
        drop(winner);
        assert_eq!(fs::read(&path).unwrap(), b"winner");
    }

    #[test]
    fn test_writer_lock_released_on_drop() {
        let (storage, _temp) = create_storage();
        let path = storage.path_for(&TileKey::new(4, 4, 4));

        drop(storage.create_for_write(&path).unwrap());
        assert!(storage.create_for_write(&path).is_ok());
    }

    #[test]
    fn test_reader_blocks_writer() {
        let (storage, _temp) = create_storage();
        let key = TileKey::new(9, 9, 9);
        let path = storage.path_for(&key);
        storage
            .create_for_write(&path)
            .unwrap()
            .write_all(b"data")
            .unwrap();

        let reader = storage.open_for_read(&key).unwrap();
        assert!(matches!(
            storage.create_for_write(&path),
            Err(StorageError::Busy)
        ));
        drop(reader);
        assert!(storage.create_for_write(&path).is_ok());
    }

    #[test]
    fn test_size_on_disk_never_zero_for_content() {
        let (storage, _temp) = create_storage();
        let path = storage.path_for(&TileKey::new(0, 0, 1));
        let mut file = storage.create_for_write(&path).unwrap();
        file.write_all(&[7u8; 400]).unwrap();

        let allocated = file.allocated_size().unwrap();
        assert!(allocated > 0);
        assert_eq!(size_on_disk(&path).unwrap(), allocated);
    }

    #[test]
    fn test_remove_by_address() {
        let (storage, _temp) = create_storage();
        let key = TileKey::new(2, 0, 5);
        let path = storage.path_for(&key);
        storage
            .create_for_write(&path)
            .unwrap()
            .write_all(b"x")
            .unwrap();

        storage.remove("5/0/2").unwrap();
        assert!(!path.exists());
        assert!(storage.remove("5/0/2").is_err());
    }

    #[test]
    fn test_remove_leaves_locked_file_alone() {
        let (storage, _temp) = create_storage();
        let key = TileKey::new(6, 1, 4);
        let path = storage.path_for(&key);

        let mut writer = storage.create_for_write(&path).unwrap();
        writer.write_all(b"in flight").unwrap();

        assert!(matches!(storage.remove("4/1/6"), Err(StorageError::Busy)));
        assert!(path.is_file());

        drop(writer);
        storage.remove("4/1/6").unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_waits_for_no_reader() {
        let (storage, _temp) = create_storage();
        let key = TileKey::new(6, 2, 4);
        storage
            .create_for_write(&storage.path_for(&key))
            .unwrap()
            .write_all(b"x")
            .unwrap();

        let reader = storage.open_for_read(&key).unwrap();
        assert!(matches!(storage.remove("4/2/6"), Err(StorageError::Busy)));
        drop(reader);
        assert!(storage.remove("4/2/6").is_ok());
    }

    #[test]
    fn test_unlink_while_holding_lock() {
        let (storage, _temp) = create_storage();
        let path = storage.path_for(&TileKey::new(1, 2, 3));

        let file = storage.create_for_write(&path).unwrap();
        file.unlink().unwrap();

        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_replaced_file_is_not_still_linked() {
        let (storage, _temp) = create_storage();
        let path = storage.path_for(&TileKey::new(8, 8, 8));
        drop(storage.create_for_write(&path).unwrap());

        let stale = File::open(&path).unwrap();
        assert!(still_linked(&stale, &path).unwrap());

        fs::remove_file(&path).unwrap();
        assert!(!still_linked(&stale, &path).unwrap());

        fs::write(&path, b"new tile").unwrap();
        assert!(!still_linked(&stale, &path).unwrap());
    }
}
