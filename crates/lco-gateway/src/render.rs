//! Event → display mapping.
//!
//! Every rendered element carries the class names user stylesheets rely on:
//! `event` plus the type (`system`, `interaction`, `like-click`, `message`,
//! `superchat`, `gift`, `toast`, `entry-effect`), `guard-type-N` where the
//! event has a guard tier, and `username` / `text` / `price` / `avatar` on
//! the inner parts. Keep these stable; custom CSS written for LAPLACE Chat
//! templates targets them.

use std::sync::LazyLock;

use maud::{html, Markup};
use regex::Regex;

use lco_types::connection::ConnectionState;
use lco_types::event::{Event, FeedEntry};
use lco_types::ipc::RenderedEvent;
use lco_types::settings::Settings;

static ENTRY_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<%([^%>]+)%>").expect("static pattern"));

/// The subset of settings that decides which events are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayPrefs {
    pub show_interaction_events: bool,
    pub show_gift_free: bool,
    pub show_entry_effect: bool,
}

impl From<&Settings> for DisplayPrefs {
    fn from(s: &Settings) -> Self {
        Self {
            show_interaction_events: s.show_interaction_events,
            show_gift_free: s.show_gift_free,
            show_entry_effect: s.show_entry_effect,
        }
    }
}

impl Default for DisplayPrefs {
    fn default() -> Self {
        DisplayPrefs::from(&Settings::default())
    }
}

/// Render one feed entry, or `None` if it is hidden by `prefs` or has no
/// visual form.
pub fn render(entry: &FeedEntry, prefs: &DisplayPrefs) -> Option<RenderedEvent> {
    let (class_name, markup, text) = match &entry.event {
        Event::System(e) => {
            let class_name = "event system".to_string();
            let markup = html! {
                div class=(class_name) { span.text { (e.message) } }
            };
            (class_name, markup, e.message.clone())
        }
        Event::Interaction(e) => {
            if !prefs.show_interaction_events {
                return None;
            }
            let class_name = guarded("interaction", e.guard_type);
            let label = e.action_label();
            let markup = html! {
                div class=(class_name) {
                    span.username { (e.username) }
                    span.text { (label) }
                }
            };
            (class_name, markup, format!("{} {}", e.username, label))
        }
        Event::LikeClick(e) => {
            let class_name = "event like-click".to_string();
            let markup = html! {
                div class=(class_name) {
                    span.username { (e.username) ":" }
                    span.text { (e.message) }
                }
            };
            (class_name, markup, format!("{}: {}", e.username, e.message))
        }
        Event::Message(e) => {
            let class_name = guarded("message", e.guard_type);
            let markup = html! {
                div class=(class_name) {
                    img.avatar src=(e.avatar) alt="avatar" referrerpolicy="no-referrer";
                    div {
                        span.username { (e.username) ":" }
                        span.text { (e.message) }
                    }
                }
            };
            (class_name, markup, format!("{}: {}", e.username, e.message))
        }
        Event::Superchat(e) => {
            let class_name = guarded("superchat", e.guard_type);
            let markup = priced(&class_name, &e.username, e.price_normalized, &e.message);
            let text = priced_text(&e.username, e.price_normalized, &e.message);
            (class_name, markup, text)
        }
        Event::Gift(e) => {
            if e.is_free() && !prefs.show_gift_free {
                return None;
            }
            let class_name = guarded("gift", e.guard_type);
            let markup = priced(&class_name, &e.username, e.price_normalized, &e.message);
            let text = priced_text(&e.username, e.price_normalized, &e.message);
            (class_name, markup, text)
        }
        Event::Toast(e) => {
            let class_name = "event toast".to_string();
            let markup = priced(&class_name, &e.username, e.price_normalized, &e.message);
            let text = priced_text(&e.username, e.price_normalized, &e.message);
            (class_name, markup, text)
        }
        Event::EntryEffect(e) => {
            if !prefs.show_entry_effect {
                return None;
            }
            let class_name = guarded("entry-effect", e.guard_type);
            let message = strip_entry_markers(&e.message);
            let markup = html! {
                div class=(class_name) {
                    img.avatar src=(e.avatar) alt="avatar" referrerpolicy="no-referrer";
                    span.text { (message) }
                }
            };
            (class_name, markup, message)
        }
        Event::OnlineUpdate(_) | Event::Unknown => return None,
    };

    Some(RenderedEvent {
        id: entry.id,
        kind: entry.event.kind().to_string(),
        class_name,
        html: markup.into_string(),
        text,
    })
}

/// Render a whole feed, skipping hidden entries.
pub fn render_all<'a>(
    entries: impl IntoIterator<Item = &'a FeedEntry>,
    prefs: &DisplayPrefs,
) -> Vec<RenderedEvent> {
    entries
        .into_iter()
        .filter_map(|entry| render(entry, prefs))
        .collect()
}

/// Text shown while the feed is empty.
pub fn placeholder(state: ConnectionState) -> &'static str {
    if state.is_connected() {
        "Waiting for messages…"
    } else {
        "Connecting to LAPLACE Event Bridge…"
    }
}

/// Unwrap `<%name%>` highlight markers, keeping the inner text.
pub fn strip_entry_markers(message: &str) -> String {
    ENTRY_MARKER.replace_all(message, "$1").trim().to_string()
}

fn guarded(kind: &str, guard_type: u8) -> String {
    format!("event {kind} guard-type-{guard_type}")
}

fn priced(class_name: &str, username: &str, price: f64, message: &str) -> Markup {
    html! {
        div class=(class_name) {
            span.username { (username) ":" }
            span.price { "[¥" (price) "]" }
            span.text { (message) }
        }
    }
}

fn priced_text(username: &str, price: f64, message: &str) -> String {
    format!("{username}: [¥{price}] {message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use lco_types::event::*;

    fn entry(event: Event) -> FeedEntry {
        FeedEntry::new(event)
    }

    fn all_on() -> DisplayPrefs {
        DisplayPrefs {
            show_interaction_events: true,
            show_gift_free: true,
            show_entry_effect: true,
        }
    }

    #[test]
    fn message_has_avatar_and_guard_class() {
        let e = entry(Event::Message(MessageEvent {
            username: "Alice".into(),
            message: "hi".into(),
            avatar: "https://a/b.png".into(),
            guard_type: 2,
            ..Default::default()
        }));
        let r = render(&e, &DisplayPrefs::default()).unwrap();
        assert_eq!(r.class_name, "event message guard-type-2");
        assert_eq!(r.kind, "message");
        assert_eq!(r.id, e.id);
        assert!(r.html.contains(r#"class="avatar""#));
        assert!(r.html.contains(r#"referrerpolicy="no-referrer""#));
        assert!(r.html.contains(r#"<span class="username">Alice:</span>"#));
        assert_eq!(r.text, "Alice: hi");
    }

    #[test]
    fn text_is_escaped() {
        let e = entry(Event::System(SystemEvent {
            message: "<script>alert(1)</script>".into(),
            ..Default::default()
        }));
        let r = render(&e, &DisplayPrefs::default()).unwrap();
        assert!(!r.html.contains("<script>"));
        assert!(r.html.contains("&lt;script&gt;"));
    }

    #[test]
    fn superchat_price_formatting() {
        let e = entry(Event::Superchat(SuperchatEvent {
            username: "Bob".into(),
            message: "gg".into(),
            price_normalized: 30.0,
            guard_type: 0,
            ..Default::default()
        }));
        let r = render(&e, &DisplayPrefs::default()).unwrap();
        assert!(r.html.contains(r#"<span class="price">[¥30]</span>"#));
        assert_eq!(r.text, "Bob: [¥30] gg");
    }

    #[test]
    fn interaction_hidden_when_disabled() {
        let e = entry(Event::Interaction(InteractionEvent {
            username: "Carol".into(),
            action: 1,
            guard_type: 3,
            ..Default::default()
        }));
        let hidden = DisplayPrefs {
            show_interaction_events: false,
            ..all_on()
        };
        assert!(render(&e, &hidden).is_none());
        let r = render(&e, &all_on()).unwrap();
        assert_eq!(r.class_name, "event interaction guard-type-3");
        assert_eq!(r.text, "Carol 进入直播间");
    }

    #[test]
    fn free_gift_needs_toggle() {
        let free = entry(Event::Gift(GiftEvent {
            username: "Dan".into(),
            message: "投喂 辣条x1".into(),
            coin_type: Some("silver".into()),
            ..Default::default()
        }));
        let paid = entry(Event::Gift(GiftEvent {
            username: "Dan".into(),
            message: "投喂 小电视".into(),
            coin_type: Some("gold".into()),
            price_normalized: 1245.0,
            ..Default::default()
        }));
        let prefs = DisplayPrefs::default();
        assert!(render(&free, &prefs).is_none());
        assert!(render(&paid, &prefs).is_some());
        assert!(render(&free, &all_on()).is_some());
    }

    #[test]
    fn entry_effect_markers_stripped() {
        assert_eq!(strip_entry_markers("  欢迎 <%舰长 Eve%> 进入直播间 "), "欢迎 舰长 Eve 进入直播间");
        let e = entry(Event::EntryEffect(EntryEffectEvent {
            message: "<%Eve%> 来了".into(),
            guard_type: 1,
            ..Default::default()
        }));
        assert!(render(&e, &DisplayPrefs::default()).is_none());
        let r = render(&e, &all_on()).unwrap();
        assert_eq!(r.text, "Eve 来了");
        assert_eq!(r.class_name, "event entry-effect guard-type-1");
    }

    #[test]
    fn online_update_and_unknown_never_render() {
        let online = entry(Event::OnlineUpdate(OnlineUpdateEvent {
            online: 5,
            ..Default::default()
        }));
        assert!(render(&online, &all_on()).is_none());
        assert!(render(&entry(Event::Unknown), &all_on()).is_none());
    }

    #[test]
    fn render_all_skips_hidden() {
        let entries = vec![
            entry(Event::System(SystemEvent {
                message: "a".into(),
                ..Default::default()
            })),
            entry(Event::Unknown),
            entry(Event::Toast(ToastEvent {
                username: "Z".into(),
                message: "开通了舰长".into(),
                price_normalized: 198.0,
                ..Default::default()
            })),
        ];
        let rendered = render_all(&entries, &DisplayPrefs::default());
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[1].class_name, "event toast");
    }

    #[test]
    fn placeholder_follows_state() {
        assert_eq!(placeholder(ConnectionState::Connected), "Waiting for messages…");
        assert_eq!(
            placeholder(ConnectionState::Reconnecting),
            "Connecting to LAPLACE Event Bridge…"
        );
    }
}
