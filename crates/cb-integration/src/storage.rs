//! Battery and save state files.
//!
//! Every write goes to a temporary sibling first, is synced, and then
//! renamed over the target, so a crash leaves either the old or the new
//! file and never a torn one. Writers to the same slot are serialised.

use cb_core::StateIoError;
use parking_lot::Mutex;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Number of save state slots
pub const SLOT_COUNT: u32 = 10;

/// Slot used for autosave on stop and autoload on start
pub const AUTOSAVE_SLOT: u32 = 0;

/// On-disk store for one configuration's save directories
#[derive(Debug)]
pub struct SaveStore {
    saves_dir: PathBuf,
    states_dir: PathBuf,
    slot_locks: [Mutex<()>; SLOT_COUNT as usize],
    battery_lock: Mutex<()>,
}

impl SaveStore {
    pub fn new(saves_dir: impl Into<PathBuf>, states_dir: impl Into<PathBuf>) -> Self {
        Self {
            saves_dir: saves_dir.into(),
            states_dir: states_dir.into(),
            slot_locks: std::array::from_fn(|_| Mutex::new(())),
            battery_lock: Mutex::new(()),
        }
    }

    pub fn check_slot(slot: u32) -> Result<(), StateIoError> {
        if slot < SLOT_COUNT {
            Ok(())
        } else {
            Err(StateIoError::InvalidSlot(slot))
        }
    }

    pub fn state_path(&self, stem: &str, slot: u32) -> PathBuf {
        self.states_dir.join(format!("{}.ss{}", stem, slot))
    }

    pub fn battery_path(&self, stem: &str) -> PathBuf {
        self.saves_dir.join(format!("{}.sav", stem))
    }

    /// Durably write a state blob to `slot`
    pub fn write_state(&self, stem: &str, slot: u32, data: &[u8]) -> Result<PathBuf, StateIoError> {
        Self::check_slot(slot)?;
        let path = self.state_path(stem, slot);
        let _guard = self.slot_locks[slot as usize].lock();
        write_durable(&path, data)?;
        tracing::debug!("Wrote state slot {} ({} bytes) to {}", slot, data.len(), path.display());
        Ok(path)
    }

    /// Read the state blob in `slot`
    pub fn read_state(&self, stem: &str, slot: u32) -> Result<Vec<u8>, StateIoError> {
        Self::check_slot(slot)?;
        let path = self.state_path(stem, slot);
        let _guard = self.slot_locks[slot as usize].lock();
        match std::fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StateIoError::Missing(slot)),
            Err(source) => Err(StateIoError::Io { path, source }),
        }
    }

    /// Slots that currently hold a state for `stem`
    pub fn occupied_slots(&self, stem: &str) -> Vec<u32> {
        (0..SLOT_COUNT)
            .filter(|&slot| self.state_path(stem, slot).is_file())
            .collect()
    }

    /// Durably replace the battery file
    pub fn write_battery(&self, stem: &str, data: &[u8]) -> Result<(), StateIoError> {
        let path = self.battery_path(stem);
        let _guard = self.battery_lock.lock();
        write_durable(&path, data)?;
        tracing::debug!("Flushed {} bytes of battery data to {}", data.len(), path.display());
        Ok(())
    }

    /// Battery contents, or `None` if no file exists yet
    pub fn read_battery(&self, stem: &str) -> Result<Option<Vec<u8>>, StateIoError> {
        let path = self.battery_path(stem);
        let _guard = self.battery_lock.lock();
        match std::fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StateIoError::Io { path, source }),
        }
    }
}

fn write_durable(path: &Path, data: &[u8]) -> Result<(), StateIoError> {
    let io_err = |source| StateIoError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(io_err)?;

    // Removed on drop unless persisted
    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(data).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    // Persist the rename itself; not every platform can open a directory
    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(())
}
