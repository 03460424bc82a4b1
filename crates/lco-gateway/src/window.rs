//! Overlay window behavior that doesn't depend on the windowing toolkit.
//!
//! The shell implements [`OverlayWindow`] over its real window; everything
//! else here (click-through tracking, appearance, context menu choice) is
//! plain logic.

use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use lco_types::ipc::{Appearance, ContextMenuItem, ContextMenuRequest, OverlayEvent};
use lco_types::settings::{SettingKey, Settings};

use crate::events::EventBus;

/// Lowest background alpha; keeps a fully transparent overlay findable.
pub const MIN_BACKGROUND_ALPHA: f64 = 0.15;

/// Title bar height in CSS pixels until the overlay reports its own.
pub const DEFAULT_TITLE_BAR_HEIGHT: f64 = 32.0;

#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("window {0} is not open")]
    NotFound(String),
    #[error("window operation failed: {0}")]
    Platform(String),
}

/// The toolkit operations the controller needs.
pub trait OverlayWindow: Send + Sync {
    fn set_always_on_top(&self, on_top: bool) -> Result<(), WindowError>;
    fn set_ignore_cursor_events(&self, ignore: bool) -> Result<(), WindowError>;
    /// Cursor height above the window's content top, in CSS pixels, or
    /// `None` while the cursor is outside the window.
    fn cursor_y(&self) -> Result<Option<f64>, WindowError>;
}

#[derive(Debug)]
struct PointerState {
    click_through: bool,
    /// Last value sent to the window; `None` before the first call.
    ignoring: Option<bool>,
    title_bar_height: f64,
}

impl Default for PointerState {
    fn default() -> Self {
        Self {
            click_through: false,
            ignoring: None,
            title_bar_height: DEFAULT_TITLE_BAR_HEIGHT,
        }
    }
}

pub struct WindowController<W> {
    window: W,
    bus: EventBus,
    state: Mutex<PointerState>,
}

impl<W: OverlayWindow> WindowController<W> {
    pub fn new(window: W, bus: EventBus) -> Self {
        Self {
            window,
            bus,
            state: Mutex::new(PointerState::default()),
        }
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn apply_always_on_top(&self, on_top: bool) -> Result<(), WindowError> {
        debug!("Always on top: {on_top}");
        self.window.set_always_on_top(on_top)
    }

    pub fn is_click_through(&self) -> bool {
        self.state.lock().click_through
    }

    /// Turn click-through mode on or off. The mouse is released either way;
    /// once enabled, [`poll_cursor`](Self::poll_cursor) decides when to
    /// start ignoring it.
    pub fn set_click_through(&self, enabled: bool) -> Result<(), WindowError> {
        self.state.lock().click_through = enabled;
        self.set_ignore_mouse_events(false)?;
        debug!("Click-through: {enabled}");
        self.bus.send(OverlayEvent::ClickThroughEnabled { enabled });
        Ok(())
    }

    /// Forward to the window unless it already has this value.
    pub fn set_ignore_mouse_events(&self, ignore: bool) -> Result<(), WindowError> {
        let mut state = self.state.lock();
        if state.ignoring == Some(ignore) {
            return Ok(());
        }
        self.window.set_ignore_cursor_events(ignore)?;
        state.ignoring = Some(ignore);
        Ok(())
    }

    /// In click-through mode the window stays interactive only over the
    /// title bar, `y` being the pointer's distance from the top.
    pub fn pointer_moved(&self, y: f64, title_bar_bottom: f64) -> Result<(), WindowError> {
        let ignore = self.is_click_through() && y > title_bar_bottom;
        self.set_ignore_mouse_events(ignore)
    }

    pub fn title_bar_height(&self) -> f64 {
        self.state.lock().title_bar_height
    }

    /// Height reported by the overlay once its layout is known.
    pub fn set_title_bar_height(&self, height: f64) {
        if height.is_finite() && height > 0.0 {
            self.state.lock().title_bar_height = height;
        }
    }

    /// One tick of the host-side cursor poll. A window that ignores the
    /// cursor gets no pointer events of its own, so the host has to look
    /// where the cursor is and hand the title bar back. Outside the window,
    /// or when the position can't be read, the mouse is released.
    pub fn poll_cursor(&self) -> Result<(), WindowError> {
        if !self.is_click_through() {
            return Ok(());
        }
        match self.window.cursor_y() {
            Ok(Some(y)) => self.pointer_moved(y, self.title_bar_height()),
            Ok(None) => self.set_ignore_mouse_events(false),
            Err(e) => {
                debug!("Cursor position unavailable, releasing the mouse: {e}");
                self.set_ignore_mouse_events(false)
            }
        }
    }

    /// Apply the window-level settings, at startup.
    pub fn apply_settings(&self, settings: &Settings) -> Result<(), WindowError> {
        self.apply_always_on_top(settings.always_on_top)?;
        self.set_click_through(settings.click_through)
    }

    /// React to a `settings-changed` broadcast. Keys that aren't about the
    /// window are ignored.
    pub fn on_setting_changed(&self, key: SettingKey, value: &Value) -> Result<(), WindowError> {
        match (key, value.as_bool()) {
            (SettingKey::AlwaysOnTop, Some(on)) => self.apply_always_on_top(on),
            (SettingKey::ClickThrough, Some(on)) => self.set_click_through(on),
            _ => Ok(()),
        }
    }
}

pub fn background_alpha(opacity: u8) -> f64 {
    (f64::from(opacity) / 100.0).clamp(MIN_BACKGROUND_ALPHA, 1.0)
}

pub fn appearance(settings: &Settings) -> Appearance {
    Appearance {
        background_color: format!("rgba(20, 20, 20, {})", background_alpha(settings.opacity)),
        font_size: format!("{}px", settings.base_font_size),
        custom_css: settings.custom_css.clone(),
    }
}

/// Items for a right-click menu, empty when no menu should show.
pub fn context_menu_items(request: &ContextMenuRequest) -> Vec<ContextMenuItem> {
    if request.is_editable {
        vec![
            ContextMenuItem::Cut,
            ContextMenuItem::Copy,
            ContextMenuItem::Paste,
            ContextMenuItem::SelectAll,
        ]
    } else if !request.selection_text.trim().is_empty() {
        vec![ContextMenuItem::Copy]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Default)]
    struct FakeWindow {
        calls: Mutex<Vec<String>>,
        cursor: Mutex<Option<f64>>,
        cursor_broken: Mutex<bool>,
    }

    impl FakeWindow {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }

        fn move_cursor(&self, y: Option<f64>) {
            *self.cursor.lock() = y;
        }
    }

    impl OverlayWindow for FakeWindow {
        fn set_always_on_top(&self, on_top: bool) -> Result<(), WindowError> {
            self.calls.lock().push(format!("on_top={on_top}"));
            Ok(())
        }

        fn set_ignore_cursor_events(&self, ignore: bool) -> Result<(), WindowError> {
            self.calls.lock().push(format!("ignore={ignore}"));
            Ok(())
        }

        fn cursor_y(&self) -> Result<Option<f64>, WindowError> {
            if *self.cursor_broken.lock() {
                return Err(WindowError::Platform("no cursor".into()));
            }
            Ok(*self.cursor.lock())
        }
    }

    fn controller() -> (WindowController<FakeWindow>, EventBus) {
        let bus = EventBus::new();
        (WindowController::new(FakeWindow::default(), bus.clone()), bus)
    }

    #[test]
    fn click_through_ignores_below_title_bar_only() {
        let (ctl, bus) = controller();
        let mut rx = bus.subscribe();

        ctl.set_click_through(true).unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            OverlayEvent::ClickThroughEnabled { enabled: true }
        ));

        ctl.pointer_moved(10.0, 32.0).unwrap();
        ctl.pointer_moved(200.0, 32.0).unwrap();
        ctl.pointer_moved(300.0, 32.0).unwrap();
        ctl.pointer_moved(20.0, 32.0).unwrap();
        assert_eq!(ctl.window().calls(), vec!["ignore=false", "ignore=true", "ignore=false"]);
    }

    #[test]
    fn disabled_never_ignores() {
        let (ctl, _bus) = controller();
        ctl.set_click_through(true).unwrap();
        ctl.pointer_moved(500.0, 32.0).unwrap();
        ctl.set_click_through(false).unwrap();
        ctl.pointer_moved(500.0, 32.0).unwrap();
        assert!(!ctl.is_click_through());
        assert_eq!(ctl.window().calls(), vec!["ignore=false", "ignore=true", "ignore=false"]);
    }

    #[test]
    fn cursor_poll_hands_title_bar_back() {
        let (ctl, _bus) = controller();
        ctl.set_click_through(true).unwrap();

        // Over the feed: the window lets clicks through.
        ctl.window().move_cursor(Some(300.0));
        ctl.poll_cursor().unwrap();
        ctl.poll_cursor().unwrap();

        // No webview events arrive while ignoring; the next tick alone has to
        // notice the pointer is back on the title bar.
        ctl.window().move_cursor(Some(12.0));
        ctl.poll_cursor().unwrap();

        // Leaving the window releases the mouse too.
        ctl.window().move_cursor(Some(300.0));
        ctl.poll_cursor().unwrap();
        ctl.window().move_cursor(None);
        ctl.poll_cursor().unwrap();

        assert_eq!(
            ctl.window().calls(),
            vec!["ignore=false", "ignore=true", "ignore=false", "ignore=true", "ignore=false"]
        );
    }

    #[test]
    fn cursor_poll_uses_reported_title_bar() {
        let (ctl, _bus) = controller();
        ctl.set_click_through(true).unwrap();
        ctl.window().move_cursor(Some(40.0));
        ctl.poll_cursor().unwrap();

        ctl.set_title_bar_height(48.0);
        ctl.set_title_bar_height(f64::NAN);
        assert_eq!(ctl.title_bar_height(), 48.0);
        ctl.poll_cursor().unwrap();

        assert_eq!(ctl.window().calls(), vec!["ignore=false", "ignore=true", "ignore=false"]);
    }

    #[test]
    fn cursor_poll_idle_without_click_through() {
        let (ctl, _bus) = controller();
        ctl.window().move_cursor(Some(300.0));
        ctl.poll_cursor().unwrap();
        assert!(ctl.window().calls().is_empty());
    }

    #[test]
    fn cursor_poll_releases_mouse_on_error() {
        let (ctl, _bus) = controller();
        ctl.set_click_through(true).unwrap();
        ctl.window().move_cursor(Some(300.0));
        ctl.poll_cursor().unwrap();
        *ctl.window().cursor_broken.lock() = true;
        ctl.poll_cursor().unwrap();
        assert_eq!(ctl.window().calls(), vec!["ignore=false", "ignore=true", "ignore=false"]);
    }

    #[test]
    fn settings_drive_window() {
        let (ctl, _bus) = controller();
        let settings = Settings {
            always_on_top: true,
            ..Default::default()
        };
        ctl.apply_settings(&settings).unwrap();
        ctl.on_setting_changed(SettingKey::AlwaysOnTop, &json!(false)).unwrap();
        ctl.on_setting_changed(SettingKey::Opacity, &json!(40)).unwrap();
        assert_eq!(
            ctl.window().calls(),
            vec!["on_top=true", "ignore=false", "on_top=false"]
        );
    }

    #[test]
    fn reapplying_settings_catches_up_on_missed_changes() {
        let (ctl, bus) = controller();
        ctl.apply_settings(&Settings::default()).unwrap();
        let mut rx = bus.subscribe();

        // Both changes were saved while the forwarder was lagging.
        let saved = Settings {
            always_on_top: false,
            click_through: true,
            ..Default::default()
        };
        ctl.apply_settings(&saved).unwrap();

        assert!(ctl.is_click_through());
        assert_eq!(ctl.window().calls().last().map(String::as_str), Some("ignore=false"));
        assert!(ctl.window().calls().contains(&"on_top=false".to_string()));
        assert!(matches!(
            rx.try_recv().unwrap(),
            OverlayEvent::ClickThroughEnabled { enabled: true }
        ));
    }

    #[test]
    fn appearance_from_settings() {
        let settings = Settings {
            opacity: 50,
            base_font_size: 24,
            custom_css: ".event { color: red }".into(),
            ..Default::default()
        };
        let look = appearance(&settings);
        assert_eq!(look.background_color, "rgba(20, 20, 20, 0.5)");
        assert_eq!(look.font_size, "24px");
        assert_eq!(look.custom_css, ".event { color: red }");
    }

    #[test]
    fn alpha_has_floor() {
        assert_eq!(background_alpha(0), MIN_BACKGROUND_ALPHA);
        assert_eq!(background_alpha(10), MIN_BACKGROUND_ALPHA);
        assert_eq!(background_alpha(100), 1.0);
        let settings = Settings {
            opacity: 0,
            ..Default::default()
        };
        assert_eq!(appearance(&settings).background_color, "rgba(20, 20, 20, 0.15)");
    }

    #[test]
    fn context_menu_choice() {
        let editable = ContextMenuRequest {
            is_editable: true,
            ..Default::default()
        };
        assert_eq!(context_menu_items(&editable).len(), 4);

        let selection = ContextMenuRequest {
            selection_text: "copied".into(),
            ..Default::default()
        };
        assert_eq!(context_menu_items(&selection), vec![ContextMenuItem::Copy]);

        assert!(context_menu_items(&ContextMenuRequest::default()).is_empty());
    }
}
