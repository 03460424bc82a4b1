pub mod adapter;
pub mod buffer;
pub mod client;
pub mod config;
pub mod events;
pub mod filter;
pub mod format;
pub mod render;
pub mod runtime;
pub mod settings;
pub mod window;

pub use events::EventBus;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{info, warn};

use lco_types::event::FeedEntry;
use lco_types::ipc::{Appearance, FeedSnapshot, OverlayEvent, RenderedEvent};

use adapter::EventClientAdapter;
use client::ReconnectPolicy;
use render::DisplayPrefs;
use runtime::RuntimeStore;
use settings::{SettingsStore, SettingsWatcher};

/// The central gateway: owns the settings store, the runtime store, the
/// bridge connection and the event bus. The Tauri shell holds an
/// `Arc<Gateway>` in its state.
pub struct Gateway {
    settings: Arc<SettingsStore>,
    runtime: Arc<RuntimeStore>,
    event_bus: EventBus,
    adapter: Mutex<Option<EventClientAdapter>>,
    watcher: Mutex<Option<SettingsWatcher>>,
}

impl Gateway {
    /// Open the settings at `path`. Does NOT connect to the bridge yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let event_bus = EventBus::new();
        let settings = SettingsStore::open(path, event_bus.clone())?;
        Ok(Self {
            settings: Arc::new(settings),
            runtime: Arc::new(RuntimeStore::default()),
            event_bus,
            adapter: Mutex::new(None),
            watcher: Mutex::new(None),
        })
    }

    /// Open the settings file under the default home directory.
    pub fn open_default() -> Result<Self> {
        Self::open(config::settings_path())
    }

    /// Connect to the bridge and start watching the settings file. Must be
    /// called inside a Tokio runtime. Calling it twice is a no-op.
    pub fn start(&self) {
        let mut adapter = self.adapter.lock();
        if adapter.is_some() {
            return;
        }
        *adapter = Some(EventClientAdapter::start(
            Arc::clone(&self.settings),
            Arc::clone(&self.runtime),
            self.event_bus.clone(),
            ReconnectPolicy::default(),
        ));

        match self.settings.watch() {
            Ok(w) => *self.watcher.lock() = Some(w),
            // Not fatal: in-process changes still broadcast.
            Err(e) => warn!("Settings file watch unavailable: {e:#}"),
        }
        info!("Gateway started");
    }

    /// Disconnect from the bridge and stop the settings watcher.
    pub async fn shutdown(&self) {
        self.watcher.lock().take();
        let adapter = self.adapter.lock().take();
        if let Some(adapter) = adapter {
            adapter.shutdown().await;
        }
        info!("Gateway stopped");
    }

    /// Subscribe to everything the gateway publishes.
    pub fn subscribe_events(&self) -> broadcast::Receiver<OverlayEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn runtime(&self) -> &Arc<RuntimeStore> {
        &self.runtime
    }

    // ─── Read models for the windows ──────────────────────────────────────────

    pub fn display_prefs(&self) -> DisplayPrefs {
        DisplayPrefs::from(&self.settings.get_all())
    }

    /// Everything a freshly opened overlay needs to draw itself.
    pub fn feed_snapshot(&self) -> FeedSnapshot {
        let snapshot = self.runtime.snapshot();
        let prefs = self.display_prefs();
        FeedSnapshot {
            connection_state: snapshot.connection_state,
            online_user_count: snapshot.online_user_count,
            entries: render::render_all(&snapshot.messages, &prefs),
            placeholder: render::placeholder(snapshot.connection_state).to_string(),
        }
    }

    /// Render one new entry with the current visibility settings.
    pub fn render_entry(&self, entry: &FeedEntry) -> Option<RenderedEvent> {
        render::render(entry, &self.display_prefs())
    }

    pub fn appearance(&self) -> Appearance {
        window::appearance(&self.settings.get_all())
    }
}
