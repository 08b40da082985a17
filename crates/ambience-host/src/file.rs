use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Mutex;
use std::time::Duration;

use ambience_platform::{ConfigStore, Result, StorageEvent, WatchGuard};
use crossbeam_channel::Sender;
use notify_debouncer_mini::{new_debouncer, notify::RecursiveMode};
use tracing::{debug, warn};

use crate::box_err;

const EXTENSION: &str = "json";

/// One `<key>.json` document per key inside a directory.
///
/// Every process pointing at the same directory sees the same configuration.
/// Writes go through a temporary file and a rename, so readers never observe a
/// partial document. Read-modify-write is atomic within this process only.
pub struct FileStore {
    dir: PathBuf,
    debounce: Duration,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "file store opened");
        Ok(Self {
            dir,
            debounce: Duration::from_millis(200),
            write_lock: Mutex::new(()),
        })
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
        if !valid {
            return Err(format!("invalid storage key `{key}`").into());
        }
        Ok(self.dir.join(format!("{key}.{EXTENSION}")))
    }

    fn read(&self, path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(box_err(err)),
        }
    }

    fn write(&self, path: &Path, value: &str) -> Result<()> {
        let tmp = path.with_extension(format!("{EXTENSION}.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Storage key for a changed document path, if it names one.
fn key_for(path: &Path) -> Option<String> {
    if path.extension()? != EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    (!stem.starts_with('.')).then(|| stem.to_string())
}

impl ConfigStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        self.read(&path)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        self.write(&path, value)
    }

    fn update(
        &self,
        key: &str,
        apply: &mut dyn FnMut(Option<&str>) -> Option<String>,
    ) -> Result<bool> {
        let path = self.path_for(key)?;
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let current = self.read(&path)?;
        match apply(current.as_deref()) {
            Some(next) => {
                self.write(&path, &next)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Reports every document change in the directory, including this
    /// process's own writes.
    fn watch(&self, sink: Sender<StorageEvent>) -> Result<WatchGuard> {
        let (tx, rx) = mpsc::channel();
        let mut debouncer = new_debouncer(self.debounce, tx)?;
        debouncer
            .watcher()
            .watch(&self.dir, RecursiveMode::NonRecursive)?;

        std::thread::spawn(move || {
            for result in rx {
                match result {
                    Ok(events) => {
                        for event in events {
                            let Some(key) = key_for(&event.path) else {
                                continue;
                            };
                            let event = StorageEvent { key, origin: None };
                            if sink.send(event).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => warn!("storage watch error: {e:?}"),
                }
            }
        });

        Ok(Box::new(debouncer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn temp_store() -> FileStore {
        let dir = std::env::temp_dir().join(format!("ambience_store_{}", uuid::Uuid::new_v4()));
        FileStore::open(dir).unwrap()
    }

    #[test]
    fn missing_key_reads_as_none() {
        let store = temp_store();
        assert_eq!(store.get("ambience.effects").unwrap(), None);
        let _ = fs::remove_dir_all(store.dir());
    }

    #[test]
    fn set_then_update_round_trips_and_leaves_no_temp_files() {
        let store = temp_store();
        store.set("ambience.playback", r#"{"playing":true}"#).unwrap();
        let written = store
            .update("ambience.playback", &mut |current| {
                assert_eq!(current, Some(r#"{"playing":true}"#));
                Some(r#"{"playing":false}"#.into())
            })
            .unwrap();
        assert!(written);
        assert_eq!(
            store.get("ambience.playback").unwrap().as_deref(),
            Some(r#"{"playing":false}"#)
        );
        let names: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["ambience.playback.json".to_string()]);
        let _ = fs::remove_dir_all(store.dir());
    }

    #[test]
    fn rejects_keys_that_escape_the_directory() {
        let store = temp_store();
        assert!(store.set("../outside", "x").is_err());
        assert!(store.get("").is_err());
        assert!(store.get(".hidden").is_err());
        let _ = fs::remove_dir_all(store.dir());
    }

    #[test]
    fn paths_map_back_to_keys() {
        assert_eq!(
            key_for(Path::new("/tmp/x/ambience.effects.json")).as_deref(),
            Some("ambience.effects")
        );
        assert_eq!(key_for(Path::new("/tmp/x/ambience.effects.json.tmp")), None);
        assert_eq!(key_for(Path::new("/tmp/x/notes.txt")), None);
    }

    #[test]
    fn watch_reports_changed_documents() {
        let store = temp_store().with_debounce(Duration::from_millis(50));
        let (tx, rx) = unbounded();
        let _guard = store.watch(tx).unwrap();

        store.set("ambience.effects", "{}").unwrap();

        let event = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(event.key, "ambience.effects");
        let _ = fs::remove_dir_all(store.dir());
    }
}
