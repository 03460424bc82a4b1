//! Tauri IPC commands, called from the frontend via `invoke()`.

use serde_json::{json, Value};
use tauri::{AppHandle, State, WebviewWindow};

use lco_gateway::window::context_menu_items;
use lco_types::connection::ConnectionState;
use lco_types::ipc::{Appearance, ContextMenuRequest, FeedSnapshot};
use lco_types::settings::{SettingKey, Settings};

use crate::{window, AppState};

// ─── Settings ────────────────────────────────────────────────────────────────

#[tauri::command]
pub fn settings_get_all(state: State<'_, AppState>) -> Settings {
    state.gateway.settings().get_all()
}

#[tauri::command]
pub fn settings_get(key: String, state: State<'_, AppState>) -> Result<Value, String> {
    let key = key.parse::<SettingKey>().map_err(|e| e.to_string())?;
    Ok(state.gateway.settings().get(key))
}

/// Validate and store one setting. Every window hears about it through
/// "settings-changed". Returns whether the value changed.
#[tauri::command]
pub fn settings_set(key: String, value: Value, state: State<'_, AppState>) -> Result<bool, String> {
    let key = key.parse::<SettingKey>().map_err(|e| e.to_string())?;
    state
        .gateway
        .settings()
        .set(key, value)
        .map_err(|e| e.to_string())
}

// ─── Window ──────────────────────────────────────────────────────────────────

/// Overlay opacity, 0-100. Drawn as the background alpha of the feed.
#[tauri::command]
pub fn set_window_opacity(opacity: u8, state: State<'_, AppState>) -> Result<(), String> {
    state
        .gateway
        .settings()
        .set(SettingKey::Opacity, json!(opacity))
        .map(|_| ())
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn set_always_on_top(enabled: bool, state: State<'_, AppState>) -> Result<(), String> {
    let changed = state
        .gateway
        .settings()
        .set(SettingKey::AlwaysOnTop, json!(enabled))
        .map_err(|e| e.to_string())?;
    // A change reaches the window through the bus forwarder.
    if !changed {
        state
            .window
            .apply_always_on_top(enabled)
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

#[tauri::command]
pub fn set_click_through(enabled: bool, state: State<'_, AppState>) -> Result<(), String> {
    let changed = state
        .gateway
        .settings()
        .set(SettingKey::ClickThrough, json!(enabled))
        .map_err(|e| e.to_string())?;
    if !changed {
        state
            .window
            .set_click_through(enabled)
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

#[tauri::command]
pub fn set_ignore_mouse_events(ignore: bool, state: State<'_, AppState>) -> Result<(), String> {
    state
        .window
        .set_ignore_mouse_events(ignore)
        .map_err(|e| e.to_string())
}

/// Title bar height in CSS pixels, reported by the overlay after layout.
/// The cursor gate keeps that strip clickable in click-through mode.
#[tauri::command]
pub fn set_title_bar_height(height: f64, state: State<'_, AppState>) {
    state.window.set_title_bar_height(height);
}

#[tauri::command]
pub async fn open_preferences(app: AppHandle) -> Result<(), String> {
    window::open_preferences(&app).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn close_preferences(app: AppHandle) -> Result<(), String> {
    window::close_preferences(&app).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn show_context_menu(request: ContextMenuRequest, webview: WebviewWindow) -> Result<(), String> {
    let items = context_menu_items(&request);
    window::show_context_menu(&webview, &items).map_err(|e| e.to_string())
}

#[tauri::command]
pub fn get_appearance(state: State<'_, AppState>) -> Appearance {
    state.gateway.appearance()
}

// ─── Feed ────────────────────────────────────────────────────────────────────

#[tauri::command]
pub fn request_connection_state(state: State<'_, AppState>) -> ConnectionState {
    state.gateway.runtime().connection_state()
}

#[tauri::command]
pub fn get_online_user_count(state: State<'_, AppState>) -> Option<u64> {
    state.gateway.runtime().online_user_count()
}

/// Rendered feed plus status, for a window that just loaded.
#[tauri::command]
pub fn get_feed(state: State<'_, AppState>) -> FeedSnapshot {
    state.gateway.feed_snapshot()
}

// ─── App ─────────────────────────────────────────────────────────────────────

#[tauri::command]
pub fn get_app_version(app: AppHandle) -> String {
    app.package_info().version.to_string()
}

/// `macos`, `windows` or `linux`.
#[tauri::command]
pub fn get_platform() -> &'static str {
    std::env::consts::OS
}
