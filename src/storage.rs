use crate::models::Database;
use anyhow::{Context, Result};
use fd_lock::RwLock;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The shared persisted state. Every read-modify-write holds an exclusive lock
/// on a sibling `.lock` file, so concurrent processes never lose updates.
#[derive(Clone)]
pub struct Storage {
    path: PathBuf,
    lock_path: PathBuf,
}

impl Storage {
    pub fn get_base_dir() -> Result<PathBuf> {
        let mut path =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
        path.push(".focusflow");
        if !path.exists() {
            fs::create_dir_all(&path)?;
        }
        Ok(path)
    }

    pub fn open(base_dir: &Path) -> Self {
        Self::from_path(base_dir.join("state.json"))
    }

    pub fn from_path(path: PathBuf) -> Self {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                let _ = fs::create_dir_all(parent);
            }
        }
        let lock_path = path.with_extension("lock");
        Self { path, lock_path }
    }

    /// Reads the state under a shared lock.
    pub fn read<T>(&self, f: impl FnOnce(&Database) -> T) -> Result<T> {
        let lock = RwLock::new(self.lock_file()?);
        let _guard = lock.read()?;
        let db = self.load()?;
        Ok(f(&db))
    }

    /// Loads, mutates and saves the state as one step under an exclusive lock.
    /// Nothing is written when `f` leaves the state untouched.
    pub fn update<T>(&self, f: impl FnOnce(&mut Database) -> T) -> Result<T> {
        let mut lock = RwLock::new(self.lock_file()?);
        let _guard = lock.write()?;
        let mut db = self.load()?;
        let before = db.clone();
        let result = f(&mut db);
        if db != before {
            self.save(&db)?;
        }
        Ok(result)
    }

    /// A corrupt file is moved aside and replaced by defaults. Readers only
    /// hold a shared lock, so another reader may have moved it already.
    pub fn load(&self) -> Result<Database> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Database::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("Could not read {}", self.path.display()))
            }
        };
        match serde_json::from_str(&data) {
            Ok(db) => Ok(db),
            Err(err) => {
                let backup = self.path.with_extension("json.corrupt");
                log::warn!(
                    "State file is unreadable ({}), moving it to {} and starting fresh",
                    err,
                    backup.display()
                );
                match fs::rename(&self.path, &backup) {
                    Ok(()) => {}
                    Err(err) if err.kind() == ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
                Ok(Database::default())
            }
        }
    }

    pub fn save(&self, db: &Database) -> Result<()> {
        let data = serde_json::to_string_pretty(db)?;
        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &data)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn lock_file(&self) -> Result<File> {
        OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.lock_path)
            .with_context(|| format!("Could not open {}", self.lock_path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    #[test]
    fn test_storage_save_load() -> Result<()> {
        let dir = tempdir()?;
        let storage = Storage::open(dir.path());
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();

        storage.update(|db| {
            db.time_stats.record_seconds("reddit.com", 5, &now);
            db.active_bypasses.grant("x.com", 15, &now);
        })?;

        let seconds = storage.read(|db| db.time_stats.today_seconds("reddit.com", &now))?;
        assert_eq!(seconds, 5);
        assert!(storage.load()?.active_bypasses.is_active("x.com", &now));

        Ok(())
    }

    #[test]
    fn test_storage_load_nonexistent() -> Result<()> {
        let dir = tempdir()?;
        let storage = Storage::from_path(dir.path().join("nonexistent.json"));

        let db = storage.load()?;
        assert!(db.time_stats.is_empty());

        Ok(())
    }

    #[test]
    fn test_corrupt_state_is_set_aside() -> Result<()> {
        let dir = tempdir()?;
        let storage = Storage::open(dir.path());
        fs::write(dir.path().join("state.json"), "{ not json")?;

        let db = storage.load()?;
        assert!(db.active_bypasses.is_empty());
        assert!(dir.path().join("state.json.corrupt").exists());

        Ok(())
    }

    #[test]
    fn test_concurrent_readers_of_corrupt_state() -> Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("state.json"), "{ not json")?;

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let storage = Storage::open(dir.path());
                std::thread::spawn(move || storage.read(|db| db.active_bypasses.is_empty()))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap()?);
        }
        assert!(dir.path().join("state.json.corrupt").exists());
        assert!(!dir.path().join("state.json").exists());
        Ok(())
    }

    #[test]
    fn test_corrupt_state_already_moved_aside() -> Result<()> {
        let dir = tempdir()?;
        let storage = Storage::open(dir.path());
        fs::write(dir.path().join("state.json"), "{ not json")?;
        fs::write(dir.path().join("state.json.corrupt"), "older")?;

        assert!(storage.load()?.time_stats.is_empty());
        assert!(storage.load()?.time_stats.is_empty());
        Ok(())
    }

    #[test]
    fn test_updates_from_two_handles_accumulate() -> Result<()> {
        let dir = tempdir()?;
        let a = Storage::open(dir.path());
        let b = Storage::open(dir.path());
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();

        let handles: Vec<_> = [a, b]
            .into_iter()
            .map(|storage| {
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        storage
                            .update(|db| db.time_stats.record_seconds("a.com", 5, &now))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let total = Storage::open(dir.path()).read(|db| db.time_stats.today_seconds("a.com", &now))?;
        assert_eq!(total, 200);
        Ok(())
    }
}
