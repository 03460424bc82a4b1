//! Tauri side of the window handling: the overlay window behind
//! `OverlayWindow`, the preferences window and the native context menu.

use std::sync::Arc;
use std::time::Duration;

use tauri::menu::{Menu, PredefinedMenuItem};
use tauri::{AppHandle, Manager, WebviewUrl, WebviewWindow, WebviewWindowBuilder};

use lco_gateway::window::{OverlayWindow, WindowController, WindowError};
use lco_types::ipc::ContextMenuItem;

pub const MAIN: &str = "main";
pub const PREFERENCES: &str = "preferences";

/// Cursor poll rate while click-through is on (about 30 Hz).
const POLL_ACTIVE: Duration = Duration::from_millis(33);
const POLL_IDLE: Duration = Duration::from_millis(300);

/// The overlay window, looked up by label on every call so a closed window
/// surfaces as an error instead of a dangling handle.
pub struct TauriOverlayWindow {
    app: AppHandle,
}

impl TauriOverlayWindow {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }

    fn window(&self) -> Result<WebviewWindow, WindowError> {
        self.app
            .get_webview_window(MAIN)
            .ok_or_else(|| WindowError::NotFound(MAIN.to_string()))
    }
}

impl OverlayWindow for TauriOverlayWindow {
    fn set_always_on_top(&self, on_top: bool) -> Result<(), WindowError> {
        self.window()?
            .set_always_on_top(on_top)
            .map_err(|e| WindowError::Platform(e.to_string()))
    }

    fn set_ignore_cursor_events(&self, ignore: bool) -> Result<(), WindowError> {
        self.window()?
            .set_ignore_cursor_events(ignore)
            .map_err(|e| WindowError::Platform(e.to_string()))
    }

    fn cursor_y(&self) -> Result<Option<f64>, WindowError> {
        let window = self.window()?;
        let platform = |e: tauri::Error| WindowError::Platform(e.to_string());
        // Cursor and window origin are both physical desktop coordinates.
        let cursor = window.cursor_position().map_err(platform)?;
        let origin = window.inner_position().map_err(platform)?;
        let size = window.inner_size().map_err(platform)?;
        let scale = window.scale_factor().map_err(platform)?;

        let x = cursor.x - f64::from(origin.x);
        let y = cursor.y - f64::from(origin.y);
        if x < 0.0 || y < 0.0 || x >= f64::from(size.width) || y >= f64::from(size.height) {
            return Ok(None);
        }
        Ok(Some(y / scale))
    }
}

/// Poll the cursor for the click-through gate. The overlay gets no pointer
/// events while it ignores the cursor, so the host has to watch for it.
pub fn spawn_cursor_gate(controller: Arc<WindowController<TauriOverlayWindow>>) {
    tauri::async_runtime::spawn(async move {
        tracing::debug!("Cursor gate started");
        loop {
            let interval = if controller.is_click_through() {
                if let Err(e) = controller.poll_cursor() {
                    tracing::debug!("Cursor gate: {e}");
                }
                POLL_ACTIVE
            } else {
                POLL_IDLE
            };
            tokio::time::sleep(interval).await;
        }
    });
}

/// Focus the preferences window, creating it if needed.
pub fn open_preferences(app: &AppHandle) -> tauri::Result<()> {
    if let Some(window) = app.get_webview_window(PREFERENCES) {
        window.show()?;
        window.set_focus()?;
        return Ok(());
    }

    WebviewWindowBuilder::new(app, PREFERENCES, WebviewUrl::App("index.html#preferences".into()))
        .title("Preferences")
        .inner_size(520.0, 640.0)
        .min_inner_size(420.0, 480.0)
        .build()?;
    tracing::debug!("Preferences window opened");
    Ok(())
}

pub fn close_preferences(app: &AppHandle) -> tauri::Result<()> {
    if let Some(window) = app.get_webview_window(PREFERENCES) {
        window.close()?;
    }
    Ok(())
}

/// Pop up a native edit menu at the cursor. An empty item list shows nothing.
pub fn show_context_menu(window: &WebviewWindow, items: &[ContextMenuItem]) -> tauri::Result<()> {
    if items.is_empty() {
        return Ok(());
    }

    let menu = Menu::new(window)?;
    for item in items {
        let entry = match item {
            ContextMenuItem::Cut => PredefinedMenuItem::cut(window, None)?,
            ContextMenuItem::Copy => PredefinedMenuItem::copy(window, None)?,
            ContextMenuItem::Paste => PredefinedMenuItem::paste(window, None)?,
            ContextMenuItem::SelectAll => PredefinedMenuItem::select_all(window, None)?,
        };
        menu.append(&entry)?;
    }
    window.popup_menu(&menu)
}
