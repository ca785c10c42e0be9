//! A set of byte-range locks bound to one file.
//!
//! All locks a manager holds share one open handle. POSIX drops every
//! record lock a process holds on a file when any of its descriptors is
//! closed, so per-lock handles would silently release each other.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use nfv_config::{log_lock_debug, log_lock_info};
use tracing::field::display;

use crate::backend::{create_backend, LockBackend};
use crate::lock::ByteRangeLock;
use crate::mode::LockMode;
use crate::region::LockStrategy;
use crate::{LockError, Result};

pub struct LockManager {
    backend: Arc<dyn LockBackend>,
    target: Option<(PathBuf, Arc<File>)>,
    locks: Vec<ByteRangeLock>,
}

impl LockManager {
    pub fn new() -> Result<Self> {
        Ok(Self::with_backend(create_backend()?))
    }

    pub fn with_backend(backend: Arc<dyn LockBackend>) -> Self {
        Self {
            backend,
            target: None,
            locks: Vec::new(),
        }
    }

    pub fn backend(&self) -> &dyn LockBackend {
        self.backend.as_ref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.target.as_ref().map(|(path, _)| path.as_path())
    }

    pub fn is_attached(&self) -> bool {
        self.target.is_some()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ByteRangeLock> {
        self.locks.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, ByteRangeLock> {
        self.locks.iter_mut()
    }

    /// Bind the manager, and every lock it holds, to `path`.
    pub fn attach(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if let Some((current, _)) = &self.target {
            return Err(LockError::InvalidState(format!(
                "lock manager is already attached to {}",
                current.display()
            )));
        }
        let path = path.as_ref().to_path_buf();
        let file = Arc::new(File::options().read(true).write(true).open(&path)?);
        for lock in &mut self.locks {
            lock.attach_handle(&path, Arc::clone(&file))?;
        }
        self.target = Some((path, file));
        Ok(())
    }

    /// Detach every lock and the manager. Fails if any lock is still on.
    pub fn detach(&mut self) -> Result<()> {
        if self.target.is_none() {
            return Ok(());
        }
        if let Some(lock) = self.locks.iter().find(|l| l.is_locked()) {
            return Err(LockError::InvalidState(format!(
                "lock {} is on, switch it off before detaching",
                lock.id()
            )));
        }
        for lock in &mut self.locks {
            lock.detach()?;
        }
        self.target = None;
        Ok(())
    }

    /// Take ownership of a detached lock, attaching it if the manager is attached.
    pub fn add_lock(&mut self, mut lock: ByteRangeLock) -> Result<()> {
        if lock.is_attached() {
            return Err(LockError::InvalidState(format!(
                "lock {} is attached elsewhere, detach it before adding",
                lock.id()
            )));
        }
        if let Some((path, file)) = &self.target {
            lock.attach_handle(path, Arc::clone(file))?;
        }
        self.locks.push(lock);
        Ok(())
    }

    /// Switch off, detach and hand back the first lock with `id`.
    pub fn remove_lock(&mut self, id: u64) -> Result<Option<ByteRangeLock>> {
        let Some(pos) = self.locks.iter().position(|l| l.id() == id) else {
            return Ok(None);
        };
        let lock = &mut self.locks[pos];
        lock.off()?;
        lock.detach()?;
        Ok(Some(self.locks.remove(pos)))
    }

    /// Create a lock for every region `strategy` lays out over the attached file.
    ///
    /// The step is dropped to zero on backends that keep adjacent ranges
    /// apart. Returns how many locks were added.
    pub fn deploy(
        &mut self,
        strategy: &LockStrategy,
        mode: LockMode,
        data: Option<&[u8]>,
    ) -> Result<usize> {
        let (path, file) = self.target.as_ref().ok_or_else(|| {
            LockError::InvalidState("lock manager must be attached before deploying".to_string())
        })?;
        let file_size = file.metadata()?.len();

        let strategy = if self.backend.merges_adjacent() {
            *strategy
        } else {
            strategy.with_step(0)
        };

        let mut deployed = Vec::new();
        for region in strategy.locate(file_size) {
            let mut lock = ByteRangeLock::with_backend(
                region,
                mode,
                data.map(<[u8]>::to_vec),
                Arc::clone(&self.backend),
            )?;
            lock.attach_handle(path, Arc::clone(file))?;
            deployed.push(lock);
        }

        let count = deployed.len();
        self.locks.extend(deployed);
        log_lock_info!(
            "Locks deployed",
            path = display(path.display()),
            strategy = display(&strategy),
            mode = display(mode),
            count = count,
        );
        Ok(count)
    }

    /// Switch on every lock that is off. Stops at the first failure.
    pub fn switch_on_all(&mut self) -> Result<usize> {
        let mut switched = 0;
        for lock in self.locks.iter_mut().filter(|l| !l.is_locked()) {
            lock.on()?;
            switched += 1;
        }
        log_lock_debug!("Locks switched on", count = switched);
        Ok(switched)
    }

    /// Switch off every lock that is on. Keeps going past failures and
    /// returns the first one.
    pub fn switch_off_all(&mut self) -> Result<usize> {
        let mut switched = 0;
        let mut first_err = None;
        for lock in self.locks.iter_mut().filter(|l| l.is_locked()) {
            match lock.off() {
                Ok(()) => switched += 1,
                Err(err) => {
                    first_err.get_or_insert(err);
                }
            }
        }
        log_lock_debug!("Locks switched off", count = switched);
        match first_err {
            Some(err) => Err(err),
            None => Ok(switched),
        }
    }

    /// Release and drop every lock, then detach.
    pub fn wipe(&mut self) -> Result<()> {
        let mut first_err = None;
        for mut lock in self.locks.drain(..) {
            if let Err(err) = lock.wipe() {
                first_err.get_or_insert(err);
            }
        }
        self.target = None;
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl<'a> IntoIterator for &'a LockManager {
    type Item = &'a ByteRangeLock;
    type IntoIter = std::slice::Iter<'a, ByteRangeLock>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("backend", &self.backend.name())
            .field("path", &self.path())
            .field("locks", &self.locks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockState;
    use crate::region::LockRegion;
    use tempfile::NamedTempFile;

    fn sized_file(size: u64) -> NamedTempFile {
        let file = NamedTempFile::new().unwrap();
        file.as_file().set_len(size).unwrap();
        file
    }

    fn strategy(spec: &str) -> LockStrategy {
        spec.parse().unwrap()
    }

    #[test]
    fn test_deploy_requires_attach() {
        let mut manager = LockManager::new().unwrap();
        assert!(matches!(
            manager.deploy(&LockStrategy::default(), LockMode::Exclusive, None),
            Err(LockError::InvalidState(_))
        ));
    }

    #[test]
    fn test_deploy_and_cycle() {
        let file = sized_file(1000);
        let mut manager = LockManager::new().unwrap();
        manager.attach(file.path()).unwrap();

        let count = manager
            .deploy(&strategy("0:100:0:1000"), LockMode::Exclusive, None)
            .unwrap();
        assert_eq!(count, 10);
        assert!(manager.iter().all(|l| l.state() == LockState::Off));

        assert_eq!(manager.switch_on_all().unwrap(), 10);
        assert!(manager.iter().all(|l| l.is_locked()));
        assert!(matches!(manager.detach(), Err(LockError::InvalidState(_))));

        assert_eq!(manager.switch_off_all().unwrap(), 10);
        manager.detach().unwrap();
        assert!(manager.iter().all(|l| l.state() == LockState::Detached));
    }

    #[cfg(unix)]
    #[test]
    fn test_step_kept_when_backend_merges() {
        let file = sized_file(10);
        let mut manager = LockManager::new().unwrap();
        manager.attach(file.path()).unwrap();
        manager
            .deploy(&LockStrategy::default(), LockMode::Exclusive, None)
            .unwrap();
        let ids: Vec<u64> = manager.iter().map(ByteRangeLock::id).collect();
        assert_eq!(ids, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_add_and_remove_lock() {
        let file = sized_file(100);
        let mut manager = LockManager::new().unwrap();
        manager.attach(file.path()).unwrap();

        let lock = ByteRangeLock::new(LockRegion::new(40, 10), LockMode::Exclusive, None).unwrap();
        manager.add_lock(lock).unwrap();
        assert!(manager.iter().all(ByteRangeLock::is_attached));

        manager.switch_on_all().unwrap();
        let removed = manager.remove_lock(40).unwrap().unwrap();
        assert_eq!(removed.state(), LockState::Detached);
        assert!(manager.is_empty());
        assert!(manager.remove_lock(40).unwrap().is_none());
    }

    #[test]
    fn test_add_attached_lock_rejected() {
        let file = sized_file(100);
        let mut lock = ByteRangeLock::new(LockRegion::new(0, 1), LockMode::Exclusive, None).unwrap();
        lock.attach(file.path()).unwrap();

        let mut manager = LockManager::new().unwrap();
        assert!(matches!(manager.add_lock(lock), Err(LockError::InvalidState(_))));
    }

    #[test]
    fn test_attach_late_binds_existing_locks() {
        let file = sized_file(100);
        let mut manager = LockManager::new().unwrap();
        manager
            .add_lock(ByteRangeLock::new(LockRegion::new(0, 5), LockMode::ExclusiveBlk, None).unwrap())
            .unwrap();
        assert!(!manager.iter().any(ByteRangeLock::is_attached));

        manager.attach(file.path()).unwrap();
        assert!(matches!(manager.attach(file.path()), Err(LockError::InvalidState(_))));
        assert!(manager.iter().all(ByteRangeLock::is_attached));
        assert_eq!(manager.path(), Some(file.path()));
    }

    #[test]
    fn test_wipe_clears_everything() {
        let file = sized_file(4096);
        let mut manager = LockManager::new().unwrap();
        manager.attach(file.path()).unwrap();
        manager
            .deploy(&strategy("0:512:0"), LockMode::ExclusiveIo, Some(&b"nfv"[..]))
            .unwrap();
        manager.switch_on_all().unwrap();
        assert_eq!(manager.switch_off_all().unwrap(), 8);

        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(&bytes[512..515], b"nfv");

        manager.switch_on_all().unwrap();
        manager.wipe().unwrap();
        assert!(manager.is_empty());
        assert!(!manager.is_attached());
    }
}
