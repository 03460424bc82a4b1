#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod commands;
mod window;

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tauri::{AppHandle, Emitter, Manager, RunEvent};
use tokio::sync::broadcast::{self, error::RecvError};

use lco_gateway::window::WindowController;
use lco_gateway::Gateway;
use lco_types::ipc::OverlayEvent;
use lco_types::settings::SettingKey;

use window::TauriOverlayWindow;

pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub window: Arc<WindowController<TauriOverlayWindow>>,
}

/// Payload of "settings-changed".
#[derive(Clone, Serialize)]
struct SettingChange {
    key: SettingKey,
    value: Value,
}

fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            "info,tungstenite=warn,tokio_tungstenite=warn,notify=warn,tao=error,wry=warn",
        )
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let app = tauri::Builder::default()
        .setup(|app| {
            // Load settings (creates defaults if missing)
            let gateway = Arc::new(Gateway::open_default()?);
            let controller = Arc::new(WindowController::new(
                TauriOverlayWindow::new(app.handle().clone()),
                gateway.event_bus().clone(),
            ));

            // Subscribe before anything publishes so the first states reach the windows
            let rx = gateway.subscribe_events();
            tauri::async_runtime::spawn(forward_events(
                app.handle().clone(),
                Arc::clone(&gateway),
                Arc::clone(&controller),
                rx,
            ));

            if let Err(e) = controller.apply_settings(&gateway.settings().get_all()) {
                tracing::warn!("Failed to apply window settings: {e}");
            }
            window::spawn_cursor_gate(Arc::clone(&controller));

            // The gateway spawns its tasks, so start it on the async runtime
            let starter = Arc::clone(&gateway);
            tauri::async_runtime::spawn(async move { starter.start() });

            app.manage(AppState {
                gateway,
                window: controller,
            });

            // Open devtools automatically when RUST_LOG is set (any build)
            if std::env::var("RUST_LOG").is_ok() {
                if let Some(window) = app.get_webview_window(window::MAIN) {
                    window.open_devtools();
                }
            }

            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::settings_get_all,
            commands::settings_get,
            commands::settings_set,
            commands::set_window_opacity,
            commands::set_always_on_top,
            commands::set_click_through,
            commands::set_ignore_mouse_events,
            commands::set_title_bar_height,
            commands::open_preferences,
            commands::close_preferences,
            commands::show_context_menu,
            commands::get_appearance,
            commands::request_connection_state,
            commands::get_online_user_count,
            commands::get_feed,
            commands::get_app_version,
            commands::get_platform,
        ])
        .build(tauri::generate_context!())
        .expect("Error while building LAPLACE Chat Overlay");

    app.run(|handle, event| {
        if let RunEvent::Exit = event {
            if let Some(state) = handle.try_state::<AppState>() {
                tauri::async_runtime::block_on(state.gateway.shutdown());
            }
        }
    });
}

/// Relay gateway events to the webviews, rendering feed entries on the way.
async fn forward_events(
    app: AppHandle,
    gateway: Arc<Gateway>,
    controller: Arc<WindowController<TauriOverlayWindow>>,
    mut rx: broadcast::Receiver<OverlayEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => forward(&app, &gateway, &controller, event),
            Err(RecvError::Lagged(n)) => {
                tracing::warn!("Event bus lagged by {n} events, resyncing the windows");
                resync(&app, &gateway, &controller);
            }
            Err(RecvError::Closed) => {
                tracing::info!("Event bus closed, stopping forwarder");
                break;
            }
        }
    }
}

/// Bring the windows back in line with the stores after missed events.
fn resync(app: &AppHandle, gateway: &Gateway, controller: &WindowController<TauriOverlayWindow>) {
    let settings = gateway.settings().get_all();
    if let Err(e) = controller.apply_settings(&settings) {
        tracing::warn!("Failed to apply window settings: {e}");
    }
    let result = app
        .emit("settings-snapshot", &settings)
        .and(app.emit("feed-reset", gateway.feed_snapshot()))
        .and(app.emit("appearance-updated", gateway.appearance()));
    if let Err(e) = result {
        tracing::warn!("Failed to resync windows: {e}");
    }
}

fn forward(
    app: &AppHandle,
    gateway: &Gateway,
    controller: &WindowController<TauriOverlayWindow>,
    event: OverlayEvent,
) {
    let channel = event.channel();
    let result = match event {
        OverlayEvent::SettingsChanged { key, value } => {
            if let Err(e) = controller.on_setting_changed(key, &value) {
                tracing::warn!("Failed to apply {key} to the window: {e}");
            }
            let mut result = app.emit(channel, SettingChange { key, value });
            if key.affects_visibility() {
                result = result.and(app.emit("feed-reset", gateway.feed_snapshot()));
            }
            if key.affects_appearance() {
                result = result.and(app.emit("appearance-updated", gateway.appearance()));
            }
            result
        }
        OverlayEvent::ConnectionStateUpdated { state } => app.emit(channel, state),
        OverlayEvent::OnlineCountUpdated { online } => app.emit(channel, online),
        OverlayEvent::FeedAppended { entry } => match gateway.render_entry(&entry) {
            Some(rendered) => app.emit("feed-event", rendered),
            None => Ok(()),
        },
        OverlayEvent::FeedCleared => app.emit(channel, ()),
        OverlayEvent::ClickThroughEnabled { enabled } => {
            app.emit_to(window::MAIN, channel, enabled)
        }
    };
    if let Err(e) = result {
        tracing::warn!("Failed to emit {channel}: {e}");
    }
}
