//! Workload files driven by an [`IoTactic`].

use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use nfv_config::{log_io_debug, log_io_info};
use rand::Rng;
use tracing::instrument;

use crate::engine::{read_region, verify_region, write_region, IoReport};
use crate::integrity::IntegrityStore;
use crate::tactic::IoTactic;
use crate::{IoError, Result};

/// Characters used for generated file names.
pub const NAME_CHARSET: &str = "abcdefghijklmnopqrstuvwxyz";

/// Default length of generated file names.
pub const DEFAULT_NAME_LEN: usize = 8;

const CHECKSUM_CHUNK: usize = 4096;

/// Random name of `len` characters drawn from `charset`.
pub fn random_name(len: usize, charset: &str) -> String {
    let chars: Vec<char> = charset.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| chars[rng.gen_range(0..chars.len())])
        .collect()
}

#[derive(Debug, Clone)]
pub struct IoFile {
    path: PathBuf,
    size: u64,
    checksum: Option<String>,
}

impl IoFile {
    /// Create (or truncate) `path` and fill `size` bytes with `tactic`.
    ///
    /// Verifies the written data when the tactic has data check enabled.
    pub fn create(
        path: impl AsRef<Path>,
        size: u64,
        tactic: &mut IoTactic,
        store: &mut IntegrityStore,
    ) -> Result<Self> {
        let mut file = Self {
            path: path.as_ref().to_path_buf(),
            size,
            checksum: None,
        };
        let handle = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&file.path)?;
        let report = file.write_pass(handle, tactic, store)?;
        log_io_info!(
            "File created",
            path = tracing::field::display(file.path.display()),
            bytes = report.bytes,
            ops = report.ops,
        );
        Ok(file)
    }

    /// Load `path` if it exists, otherwise create it.
    pub fn open_or_create(
        path: impl AsRef<Path>,
        size: u64,
        tactic: &mut IoTactic,
        store: &mut IntegrityStore,
    ) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Self::create(path, size, tactic, store)
        }
    }

    /// Wrap an existing file; its size is taken from the filesystem.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = fs::metadata(&path)?;
        if !meta.is_file() {
            return Err(IoError::InvalidArgument(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        Ok(Self {
            path,
            size: meta.len(),
            checksum: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    pub fn directory(&self) -> Option<&Path> {
        self.path.parent()
    }

    /// Checksum from the last [`checksum`](IoFile::checksum) call.
    pub fn cached_checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    fn write_pass(
        &mut self,
        mut handle: File,
        tactic: &mut IoTactic,
        store: &mut IntegrityStore,
    ) -> Result<IoReport> {
        let mut report = write_region(&mut handle, tactic, store, 0, self.size)?;
        drop(handle);
        if tactic.data_check() {
            report.merge(self.verify(tactic, store)?);
        }
        Ok(report)
    }

    /// Rewrite the whole file in place without truncating it first.
    ///
    /// A previously computed checksum is refreshed.
    #[instrument(
        skip(self, tactic, store),
        fields(path = %self.path.display()),
        level = "debug"
    )]
    pub fn overwrite(
        &mut self,
        tactic: &mut IoTactic,
        store: &mut IntegrityStore,
    ) -> Result<IoReport> {
        let handle = File::options().read(true).write(true).open(&self.path)?;
        let report = self.write_pass(handle, tactic, store)?;
        if self.checksum.is_some() {
            self.checksum()?;
        }
        Ok(report)
    }

    /// Read the file following the tactic's plan.
    pub fn read(&self, tactic: &IoTactic) -> Result<IoReport> {
        let mut handle = File::open(&self.path)?;
        read_region(&mut handle, tactic, 0, self.size)
    }

    /// Check every full unit against `store`, then clear it.
    pub fn verify(&self, tactic: &IoTactic, store: &mut IntegrityStore) -> Result<IoReport> {
        let mut handle = File::open(&self.path)?;
        verify_region(&mut handle, tactic, store, 0, self.size)
    }

    pub fn truncate(&mut self, size: u64) -> Result<()> {
        let handle = File::options().write(true).open(&self.path)?;
        handle.set_len(size)?;
        self.size = handle.metadata()?.len();
        log_io_debug!(
            "File truncated",
            path = tracing::field::display(self.path.display()),
            size = self.size,
        );
        Ok(())
    }

    /// BLAKE3 of the file contents as hex, read in 4 KiB chunks.
    pub fn checksum(&mut self) -> Result<String> {
        let mut handle = File::open(&self.path)?;
        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; CHECKSUM_CHUNK];
        loop {
            let n = handle.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        let hex = hasher.finalize().to_hex().to_string();
        self.checksum = Some(hex.clone());
        Ok(hex)
    }

    /// Copy to `dest`, or to a random sibling name when `dest` is `None`.
    pub fn copy_to(&self, dest: Option<&Path>) -> Result<IoFile> {
        let dest = match dest {
            Some(dest) => dest.to_path_buf(),
            None => self.sibling(DEFAULT_NAME_LEN),
        };
        fs::copy(&self.path, &dest)?;
        IoFile::load(dest)
    }

    /// Move the file to a random name in the same directory.
    pub fn rename_random(&mut self, name_len: usize) -> Result<()> {
        let dest = self.sibling(name_len);
        fs::rename(&self.path, &dest)?;
        log_io_debug!(
            "File renamed",
            from = tracing::field::display(self.path.display()),
            to = tracing::field::display(dest.display()),
        );
        self.path = dest;
        Ok(())
    }

    pub fn remove(self) -> Result<()> {
        fs::remove_file(&self.path)?;
        Ok(())
    }

    fn sibling(&self, name_len: usize) -> PathBuf {
        let dir = self.directory().unwrap_or_else(|| Path::new("."));
        loop {
            let candidate = dir.join(random_name(name_len.max(1), NAME_CHARSET));
            if !candidate.exists() {
                return candidate;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{PatternKind, PatternSpec};
    use crate::pool::RandomPool;
    use crate::seek::SeekOrder;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn tactic(pattern: PatternSpec, seek: SeekOrder) -> IoTactic {
        let pool = Arc::new(RandomPool::new(128 * 1024).unwrap());
        IoTactic::new(4096, pattern, seek, true, pool).unwrap()
    }

    #[test]
    fn test_random_name() {
        let name = random_name(12, NAME_CHARSET);
        assert_eq!(name.len(), 12);
        assert!(name.chars().all(|c| c.is_ascii_lowercase()));
        assert_eq!(random_name(4, ""), "");
    }

    #[test]
    fn test_create_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        let mut t = tactic(
            PatternSpec::default_for(PatternKind::Fixed).unwrap(),
            SeekOrder::Sequential,
        );
        let mut store = IntegrityStore::new();

        let file = IoFile::create(&path, 10240, &mut t, &mut store).unwrap();
        assert_eq!(file.size(), 10240);
        assert_eq!(file.name(), Some("f"));
        assert!(store.is_empty());

        let loaded = IoFile::load(&path).unwrap();
        assert_eq!(loaded.size(), 10240);
    }

    #[test]
    fn test_load_rejects_directory() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            IoFile::load(temp.path()),
            Err(IoError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_overwrite_refreshes_checksum() {
        let temp = TempDir::new().unwrap();
        let mut t = tactic(PatternSpec::Random, SeekOrder::Random);
        let mut store = IntegrityStore::new();
        let mut file = IoFile::create(temp.path().join("r"), 3 * 4096, &mut t, &mut store).unwrap();

        let before = file.checksum().unwrap();
        file.overwrite(&mut t, &mut store).unwrap();
        let after = file.cached_checksum().unwrap().to_string();
        assert_ne!(before, after);
        assert_eq!(file.size(), 3 * 4096);
    }

    #[test]
    fn test_truncate_copy_rename_remove() {
        let temp = TempDir::new().unwrap();
        let mut t = tactic(
            PatternSpec::Hex {
                value: "ab".to_string(),
            },
            SeekOrder::Reverse,
        );
        let mut store = IntegrityStore::new();
        let mut file = IoFile::create(temp.path().join("t"), 9000, &mut t, &mut store).unwrap();

        file.truncate(100).unwrap();
        assert_eq!(file.size(), 100);

        let copy = file.copy_to(None).unwrap();
        assert_eq!(copy.directory(), file.directory());
        assert_eq!(fs::read(copy.path()).unwrap(), vec![0xab; 100]);

        let old = file.path().to_path_buf();
        file.rename_random(6).unwrap();
        assert!(!old.exists());
        assert_eq!(file.name().map(str::len), Some(6));

        let path = file.path().to_path_buf();
        file.remove().unwrap();
        assert!(!path.exists());
    }
}
