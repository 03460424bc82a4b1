use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::connection::ConnectionState;
use crate::event::FeedEntry;
use crate::settings::SettingKey;

/// Gateway → windows. Published on the event bus; the shell forwards each
/// variant to the webviews under its own event name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OverlayEvent {
    /// A setting changed, in this process or in another one.
    SettingsChanged { key: SettingKey, value: Value },
    ConnectionStateUpdated { state: ConnectionState },
    OnlineCountUpdated { online: Option<u64> },
    /// An event passed the origin filter and entered the feed buffer.
    FeedAppended { entry: FeedEntry },
    /// The feed buffer was emptied (bridge parameters changed).
    FeedCleared,
    ClickThroughEnabled { enabled: bool },
}

impl OverlayEvent {
    /// Name the shell emits this event under.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::SettingsChanged { .. } => "settings-changed",
            Self::ConnectionStateUpdated { .. } => "connection-state-updated",
            Self::OnlineCountUpdated { .. } => "online-count-updated",
            Self::FeedAppended { .. } => "feed-appended",
            Self::FeedCleared => "feed-cleared",
            Self::ClickThroughEnabled { .. } => "click-through-enabled",
        }
    }
}

/// One feed entry rendered for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedEvent {
    pub id: Uuid,
    pub kind: String,
    /// Space-separated classes of the outer element, e.g.
    /// `event message guard-type-3`.
    pub class_name: String,
    /// Escaped HTML fragment, ready to insert into the feed.
    pub html: String,
    /// Single-line plain-text rendition for terminals and logs.
    pub text: String,
}

/// Computed look of the overlay surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appearance {
    pub background_color: String,
    pub font_size: String,
    #[serde(rename = "customCSS")]
    pub custom_css: String,
}

/// Sent by a window when the user right-clicks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMenuRequest {
    pub selection_text: String,
    pub is_editable: bool,
    pub input_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContextMenuItem {
    Cut,
    Copy,
    Paste,
    SelectAll,
}

/// Snapshot returned to a window that just opened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSnapshot {
    pub connection_state: ConnectionState,
    pub online_user_count: Option<u64>,
    pub entries: Vec<RenderedEvent>,
    /// Shown instead of the feed while it is empty.
    pub placeholder: String,
}
