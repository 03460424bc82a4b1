use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A live-stream event as delivered by the event bridge.
///
/// The wire format is a JSON object tagged by `type`. Anything with an
/// unrecognised tag decodes to [`Event::Unknown`] and is never displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Event {
    System(SystemEvent),
    Interaction(InteractionEvent),
    LikeClick(LikeClickEvent),
    Message(MessageEvent),
    Superchat(SuperchatEvent),
    Gift(GiftEvent),
    Toast(ToastEvent),
    EntryEffect(EntryEffectEvent),
    OnlineUpdate(OnlineUpdateEvent),
    #[serde(other)]
    Unknown,
}

impl Event {
    /// Fields shared by every known variant.
    pub fn meta(&self) -> Option<&EventMeta> {
        match self {
            Self::System(e) => Some(&e.meta),
            Self::Interaction(e) => Some(&e.meta),
            Self::LikeClick(e) => Some(&e.meta),
            Self::Message(e) => Some(&e.meta),
            Self::Superchat(e) => Some(&e.meta),
            Self::Gift(e) => Some(&e.meta),
            Self::Toast(e) => Some(&e.meta),
            Self::EntryEffect(e) => Some(&e.meta),
            Self::OnlineUpdate(e) => Some(&e.meta),
            Self::Unknown => None,
        }
    }

    /// The room the event came from, if the bridge reported one.
    pub fn origin(&self) -> Option<&Origin> {
        self.meta().and_then(|m| m.origin.as_ref())
    }

    /// The wire tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::System(_) => "system",
            Self::Interaction(_) => "interaction",
            Self::LikeClick(_) => "like-click",
            Self::Message(_) => "message",
            Self::Superchat(_) => "superchat",
            Self::Gift(_) => "gift",
            Self::Toast(_) => "toast",
            Self::EntryEffect(_) => "entry-effect",
            Self::OnlineUpdate(_) => "online-update",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    /// Seconds since the epoch, as stamped by the bridge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
}

/// Room identifier. The bridge sends it as a number, older builds as a
/// string; both compare by their decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "OriginRepr", into = "String")]
pub struct Origin(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum OriginRepr {
    Int(i64),
    Text(String),
}

impl From<OriginRepr> for Origin {
    fn from(repr: OriginRepr) -> Self {
        match repr {
            OriginRepr::Int(n) => Self(n.to_string()),
            OriginRepr::Text(s) => Self(s),
        }
    }
}

impl From<Origin> for String {
    fn from(origin: Origin) -> Self {
        origin.0
    }
}

impl From<&str> for Origin {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Origin {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SystemEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InteractionEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub username: String,
    pub action: u8,
    pub guard_type: u8,
}

impl InteractionEvent {
    /// Display label for the action code; empty for codes the bridge may
    /// add later.
    pub fn action_label(&self) -> &'static str {
        match self.action {
            1 => "进入直播间",
            2 => "关注",
            3 => "分享",
            4 => "特别关注",
            5 => "互相关注",
            _ => "",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LikeClickEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub username: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub username: String,
    pub message: String,
    pub avatar: String,
    pub guard_type: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SuperchatEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub username: String,
    pub message: String,
    pub price_normalized: f64,
    pub guard_type: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GiftEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub username: String,
    pub message: String,
    pub price_normalized: f64,
    pub guard_type: u8,
    pub gift_name: String,
    pub gift_amount: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coin_type: Option<String>,
}

impl GiftEvent {
    /// Silver-coin gifts and zero-priced gifts cost the sender nothing.
    pub fn is_free(&self) -> bool {
        self.coin_type.as_deref() == Some("silver") || self.price_normalized <= 0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToastEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub username: String,
    pub message: String,
    pub price_normalized: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntryEffectEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub message: String,
    pub avatar: String,
    pub guard_type: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OnlineUpdateEvent {
    #[serde(flatten)]
    pub meta: EventMeta,
    pub online: u64,
}

/// An accepted event as retained in the feed buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    pub event: Event,
}

impl FeedEntry {
    pub fn new(event: Event) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            event,
        }
    }
}
