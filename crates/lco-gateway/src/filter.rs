use std::collections::HashSet;

use lco_types::event::Event;

/// Room allow-list parsed from the comma-separated `allowedOrigins` setting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginFilter {
    allowed: HashSet<String>,
}

impl OriginFilter {
    /// Split on commas, trim, drop empty items.
    pub fn parse(list: &str) -> Self {
        let allowed = list
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect();
        Self { allowed }
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// An empty list lets everything through. Events that carry no origin
    /// are let through as well.
    pub fn allows(&self, event: &Event) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        match event.origin() {
            Some(origin) => self.allowed.contains(origin.as_str()),
            None => true,
        }
    }

    /// Listed rooms in sorted order, for log lines.
    pub fn rooms(&self) -> Vec<&str> {
        let mut rooms: Vec<&str> = self.allowed.iter().map(String::as_str).collect();
        rooms.sort_unstable();
        rooms
    }
}
