//! Persisted settings store.
//!
//! Every window reads and writes through one store in the host process.
//! Changes are written to disk and published on the event bus as
//! `SettingsChanged`, one event per key. A file watcher picks up edits made
//! by other processes (the CLI, a text editor) and publishes them the same
//! way. Concurrent writers: last write wins.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lco_types::ipc::OverlayEvent;
use lco_types::settings::{SettingKey, Settings, SettingsError};

use crate::config;
use crate::events::EventBus;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Invalid(#[from] SettingsError),
    #[error("failed to persist settings: {0:#}")]
    Persist(#[from] anyhow::Error),
}

pub struct SettingsStore {
    path: PathBuf,
    current: RwLock<Settings>,
    bus: EventBus,
}

impl SettingsStore {
    /// Open the store backed by `path`, creating the file with defaults if
    /// it doesn't exist.
    pub fn open(path: impl Into<PathBuf>, bus: EventBus) -> Result<Self> {
        let path = path.into();
        let settings = config::load_settings(&path)?;
        info!("Settings loaded from {}", path.display());
        Ok(Self {
            path,
            current: RwLock::new(settings),
            bus,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_all(&self) -> Settings {
        self.current.read().clone()
    }

    pub fn get(&self, key: SettingKey) -> Value {
        self.current.read().get(key)
    }

    /// Validate, persist and broadcast one setting. Returns whether the
    /// value changed; unchanged values are neither written nor broadcast.
    pub fn set(&self, key: SettingKey, value: Value) -> Result<bool, StoreError> {
        let mut current = self.current.write();
        let mut next = current.clone();
        if !next.set(key, value)? {
            return Ok(false);
        }
        config::save_settings(&self.path, &next)?;
        let value = next.get(key);
        *current = next;
        drop(current);

        debug!("Setting {key} updated");
        self.bus.send(OverlayEvent::SettingsChanged { key, value });
        Ok(true)
    }

    /// Apply a partial update in one write. Either every entry is valid and
    /// applied, or nothing changes.
    pub fn set_many(&self, patch: &Map<String, Value>) -> Result<Vec<SettingKey>, StoreError> {
        let mut current = self.current.write();
        let mut next = current.clone();
        let mut changed = Vec::new();
        for (name, value) in patch {
            let key: SettingKey = name.parse()?;
            if next.set(key, value.clone())? && !changed.contains(&key) {
                changed.push(key);
            }
        }
        if changed.is_empty() {
            return Ok(changed);
        }
        config::save_settings(&self.path, &next)?;
        let events: Vec<_> = changed
            .iter()
            .map(|&key| OverlayEvent::SettingsChanged {
                key,
                value: next.get(key),
            })
            .collect();
        *current = next;
        drop(current);

        for event in events {
            self.bus.send(event);
        }
        Ok(changed)
    }

    /// Restore every setting to its default.
    pub fn reset(&self) -> Result<Vec<SettingKey>, StoreError> {
        self.replace(Settings::default())
            .map_err(StoreError::Persist)
    }

    /// Re-read the file after an outside edit and broadcast whatever differs
    /// from the in-memory copy. Our own writes leave nothing to broadcast.
    pub fn reload(&self) -> Result<Vec<SettingKey>> {
        let on_disk = config::load_settings(&self.path)?;
        let mut current = self.current.write();
        let diff = current.diff(&on_disk);
        if diff.is_empty() {
            return Ok(Vec::new());
        }
        *current = on_disk;
        drop(current);

        let keys = diff.iter().map(|(key, _)| *key).collect();
        for (key, value) in diff {
            info!("Setting {key} changed on disk");
            self.bus.send(OverlayEvent::SettingsChanged { key, value });
        }
        Ok(keys)
    }

    fn replace(&self, next: Settings) -> Result<Vec<SettingKey>> {
        let mut current = self.current.write();
        let diff = current.diff(&next);
        if diff.is_empty() {
            return Ok(Vec::new());
        }
        config::save_settings(&self.path, &next)?;
        *current = next;
        drop(current);

        let keys = diff.iter().map(|(key, _)| *key).collect();
        for (key, value) in diff {
            self.bus.send(OverlayEvent::SettingsChanged { key, value });
        }
        Ok(keys)
    }

    /// Watch the settings file and call [`reload`](Self::reload) when it
    /// changes. Watching stops when the returned handle is dropped.
    pub fn watch(self: &Arc<Self>) -> Result<SettingsWatcher> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .context("Settings path has no file name")?;

        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name() == Some(file_name.as_os_str()));
                    if relevant {
                        let _ = tx.send(());
                    }
                }
                Err(e) => warn!("Settings watcher error: {e}"),
            },
        )
        .context("Failed to create settings watcher")?;
        watcher
            .watch(&dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", dir.display()))?;

        // Hold a weak reference so a forgotten watcher doesn't keep the store alive.
        let store = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // Editors write in bursts; settle before reading.
                tokio::time::sleep(Duration::from_millis(100)).await;
                while rx.try_recv().is_ok() {}

                let Some(store) = store.upgrade() else { break };
                if let Err(e) = store.reload() {
                    warn!("Ignoring unreadable settings file: {e:#}");
                }
            }
            debug!("Settings watcher stopped");
        });

        info!("Watching {} for changes", self.path.display());
        Ok(SettingsWatcher {
            _watcher: watcher,
            task,
        })
    }
}

/// Keeps the file watch alive.
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl Drop for SettingsWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::broadcast::error::TryRecvError;

    fn open_temp() -> (tempfile::TempDir, SettingsStore, EventBus) {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let store = SettingsStore::open(dir.path().join("settings.toml"), bus.clone()).unwrap();
        (dir, store, bus)
    }

    #[test]
    fn set_survives_reopen() {
        let (dir, store, bus) = open_temp();
        store.set(SettingKey::Opacity, json!(35)).unwrap();
        store
            .set(SettingKey::AllowedOrigins, json!("1234, 5678"))
            .unwrap();
        drop(store);

        let reopened = SettingsStore::open(dir.path().join("settings.toml"), bus).unwrap();
        assert_eq!(reopened.get(SettingKey::Opacity), json!(35));
        assert_eq!(reopened.get(SettingKey::AllowedOrigins), json!("1234, 5678"));
    }

    #[test]
    fn set_broadcasts_only_on_change() {
        let (_dir, store, bus) = open_temp();
        let mut rx = bus.subscribe();

        assert!(store.set(SettingKey::AlwaysOnTop, json!(true)).unwrap());
        match rx.try_recv().unwrap() {
            OverlayEvent::SettingsChanged { key, value } => {
                assert_eq!(key, SettingKey::AlwaysOnTop);
                assert_eq!(value, json!(true));
            }
            other => panic!("unexpected event {other:?}"),
        }

        assert!(!store.set(SettingKey::AlwaysOnTop, json!(true)).unwrap());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn invalid_value_leaves_store_untouched() {
        let (_dir, store, _bus) = open_temp();
        let err = store.set(SettingKey::BaseFontSize, json!(500)).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(SettingsError::OutOfRange { .. })));
        assert_eq!(store.get(SettingKey::BaseFontSize), json!(20));
    }

    #[test]
    fn set_many_is_all_or_nothing() {
        let (_dir, store, _bus) = open_temp();
        let mut patch = Map::new();
        patch.insert("serverHost".into(), json!("10.0.0.2"));
        patch.insert("serverPort".into(), json!("not a port"));
        assert!(store.set_many(&patch).is_err());
        assert_eq!(store.get_all().server_host, "localhost");

        patch.insert("serverPort".into(), json!(9797));
        let changed = store.set_many(&patch).unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(store.get_all().server_port, 9797);
    }

    #[test]
    fn unknown_key_in_patch_rejected() {
        let (_dir, store, _bus) = open_temp();
        let mut patch = Map::new();
        patch.insert("theme".into(), json!("light"));
        assert!(matches!(
            store.set_many(&patch),
            Err(StoreError::Invalid(SettingsError::UnknownKey(_)))
        ));
    }

    #[test]
    fn reload_publishes_external_edits() {
        let (_dir, store, bus) = open_temp();
        let mut rx = bus.subscribe();

        let mut edited = store.get_all();
        edited.click_through = true;
        config::save_settings(store.path(), &edited).unwrap();

        assert_eq!(store.reload().unwrap(), vec![SettingKey::ClickThrough]);
        assert!(matches!(
            rx.try_recv().unwrap(),
            OverlayEvent::SettingsChanged { key: SettingKey::ClickThrough, .. }
        ));
        // Nothing new on disk now.
        assert!(store.reload().unwrap().is_empty());
    }

    #[test]
    fn own_writes_do_not_echo_on_reload() {
        let (_dir, store, bus) = open_temp();
        store.set(SettingKey::ShowGiftFree, json!(true)).unwrap();
        let mut rx = bus.subscribe();
        assert!(store.reload().unwrap().is_empty());
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn watcher_publishes_edits_from_other_processes() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let store =
            Arc::new(SettingsStore::open(dir.path().join("settings.toml"), bus.clone()).unwrap());
        let mut rx = bus.subscribe();
        let _watcher = store.watch().unwrap();

        // What `lco settings set opacity 42` does from its own process.
        let mut edited = config::load_settings(store.path()).unwrap();
        edited.opacity = 42;
        config::save_settings(store.path(), &edited).unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no settings change published")
            .unwrap();
        match event {
            OverlayEvent::SettingsChanged { key, value } => {
                assert_eq!(key, SettingKey::Opacity);
                assert_eq!(value, json!(42));
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(store.get(SettingKey::Opacity), json!(42));
    }

    #[test]
    fn reset_restores_defaults() {
        let (_dir, store, _bus) = open_temp();
        store.set(SettingKey::Opacity, json!(10)).unwrap();
        store.set(SettingKey::CustomCss, json!(".event{}")).unwrap();
        let changed = store.reset().unwrap();
        assert_eq!(changed.len(), 2);
        assert_eq!(store.get_all(), Settings::default());
    }
}
