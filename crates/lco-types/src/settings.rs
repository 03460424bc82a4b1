use serde::{Deserialize, Serialize};
use serde_json::Value;

/// User preferences shared by every window. One record per installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    // Interface
    pub opacity: u8,
    pub base_font_size: u16,
    pub always_on_top: bool,
    pub click_through: bool,
    pub show_interaction_events: bool,
    pub show_gift_free: bool,
    pub show_entry_effect: bool,
    #[serde(rename = "customCSS")]
    pub custom_css: String,

    // Event bridge
    pub server_host: String,
    #[serde(deserialize_with = "port_from_any")]
    pub server_port: u16,
    pub server_password: String,
    pub allowed_origins: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            opacity: 80,
            base_font_size: 20,
            always_on_top: false,
            click_through: false,
            show_interaction_events: true,
            show_gift_free: false,
            show_entry_effect: false,
            custom_css: String::new(),
            server_host: "localhost".to_string(),
            server_port: 9696,
            server_password: String::new(),
            allowed_origins: String::new(),
        }
    }
}

pub const OPACITY_RANGE: std::ops::RangeInclusive<u64> = 0..=100;
pub const FONT_SIZE_RANGE: std::ops::RangeInclusive<u64> = 8..=96;

/// Every key of [`Settings`], named as on the IPC boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingKey {
    #[serde(rename = "opacity")]
    Opacity,
    #[serde(rename = "baseFontSize")]
    BaseFontSize,
    #[serde(rename = "alwaysOnTop")]
    AlwaysOnTop,
    #[serde(rename = "clickThrough")]
    ClickThrough,
    #[serde(rename = "showInteractionEvents")]
    ShowInteractionEvents,
    #[serde(rename = "showGiftFree")]
    ShowGiftFree,
    #[serde(rename = "showEntryEffect")]
    ShowEntryEffect,
    #[serde(rename = "customCSS")]
    CustomCss,
    #[serde(rename = "serverHost")]
    ServerHost,
    #[serde(rename = "serverPort")]
    ServerPort,
    #[serde(rename = "serverPassword")]
    ServerPassword,
    #[serde(rename = "allowedOrigins")]
    AllowedOrigins,
}

impl SettingKey {
    pub const ALL: [SettingKey; 12] = [
        Self::Opacity,
        Self::BaseFontSize,
        Self::AlwaysOnTop,
        Self::ClickThrough,
        Self::ShowInteractionEvents,
        Self::ShowGiftFree,
        Self::ShowEntryEffect,
        Self::CustomCss,
        Self::ServerHost,
        Self::ServerPort,
        Self::ServerPassword,
        Self::AllowedOrigins,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opacity => "opacity",
            Self::BaseFontSize => "baseFontSize",
            Self::AlwaysOnTop => "alwaysOnTop",
            Self::ClickThrough => "clickThrough",
            Self::ShowInteractionEvents => "showInteractionEvents",
            Self::ShowGiftFree => "showGiftFree",
            Self::ShowEntryEffect => "showEntryEffect",
            Self::CustomCss => "customCSS",
            Self::ServerHost => "serverHost",
            Self::ServerPort => "serverPort",
            Self::ServerPassword => "serverPassword",
            Self::AllowedOrigins => "allowedOrigins",
        }
    }

    /// Keys whose change requires a new bridge connection.
    pub fn affects_connection(&self) -> bool {
        matches!(
            self,
            Self::ServerHost | Self::ServerPort | Self::ServerPassword
        )
    }

    /// Keys that change which feed entries are displayed.
    pub fn affects_visibility(&self) -> bool {
        matches!(
            self,
            Self::ShowInteractionEvents | Self::ShowGiftFree | Self::ShowEntryEffect
        )
    }

    /// Keys that change the look of the overlay surface.
    pub fn affects_appearance(&self) -> bool {
        matches!(self, Self::Opacity | Self::BaseFontSize | Self::CustomCss)
    }
}

impl std::fmt::Display for SettingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SettingKey {
    type Err = SettingsError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unknown setting: {0}")]
    UnknownKey(String),
    #[error("setting {key} expects {expected}, got {got}")]
    WrongType {
        key: SettingKey,
        expected: &'static str,
        got: Value,
    },
    #[error("setting {key} must be within {min}..={max}, got {got}")]
    OutOfRange {
        key: SettingKey,
        min: u64,
        max: u64,
        got: Value,
    },
    #[error("setting {0} must not be empty")]
    Empty(SettingKey),
}

impl Settings {
    /// Read one setting as a JSON value.
    pub fn get(&self, key: SettingKey) -> Value {
        match key {
            SettingKey::Opacity => Value::from(self.opacity),
            SettingKey::BaseFontSize => Value::from(self.base_font_size),
            SettingKey::AlwaysOnTop => Value::from(self.always_on_top),
            SettingKey::ClickThrough => Value::from(self.click_through),
            SettingKey::ShowInteractionEvents => Value::from(self.show_interaction_events),
            SettingKey::ShowGiftFree => Value::from(self.show_gift_free),
            SettingKey::ShowEntryEffect => Value::from(self.show_entry_effect),
            SettingKey::CustomCss => Value::from(self.custom_css.clone()),
            SettingKey::ServerHost => Value::from(self.server_host.clone()),
            SettingKey::ServerPort => Value::from(self.server_port),
            SettingKey::ServerPassword => Value::from(self.server_password.clone()),
            SettingKey::AllowedOrigins => Value::from(self.allowed_origins.clone()),
        }
    }

    /// Validate and write one setting. Returns whether the stored value
    /// actually changed.
    pub fn set(&mut self, key: SettingKey, value: Value) -> Result<bool, SettingsError> {
        let before = self.get(key);
        match key {
            SettingKey::Opacity => {
                self.opacity = ranged(key, &value, OPACITY_RANGE)? as u8;
            }
            SettingKey::BaseFontSize => {
                self.base_font_size = ranged(key, &value, FONT_SIZE_RANGE)? as u16;
            }
            SettingKey::AlwaysOnTop => self.always_on_top = boolean(key, &value)?,
            SettingKey::ClickThrough => self.click_through = boolean(key, &value)?,
            SettingKey::ShowInteractionEvents => {
                self.show_interaction_events = boolean(key, &value)?;
            }
            SettingKey::ShowGiftFree => self.show_gift_free = boolean(key, &value)?,
            SettingKey::ShowEntryEffect => self.show_entry_effect = boolean(key, &value)?,
            SettingKey::CustomCss => self.custom_css = text(key, &value)?,
            SettingKey::ServerHost => {
                let host = text(key, &value)?.trim().to_string();
                if host.is_empty() {
                    return Err(SettingsError::Empty(key));
                }
                self.server_host = host;
            }
            SettingKey::ServerPort => {
                let port = match &value {
                    Value::String(s) => s
                        .trim()
                        .parse::<u64>()
                        .map_err(|_| SettingsError::WrongType {
                            key,
                            expected: "a port number",
                            got: value.clone(),
                        })?,
                    _ => integer(key, &value)?,
                };
                self.server_port = within(key, port, 1..=65535, &value)? as u16;
            }
            SettingKey::ServerPassword => self.server_password = text(key, &value)?,
            SettingKey::AllowedOrigins => self.allowed_origins = text(key, &value)?,
        }
        Ok(self.get(key) != before)
    }

    /// Keys whose values differ between `self` and `other`, with the value
    /// from `other`.
    pub fn diff(&self, other: &Settings) -> Vec<(SettingKey, Value)> {
        SettingKey::ALL
            .into_iter()
            .filter_map(|key| {
                let theirs = other.get(key);
                (self.get(key) != theirs).then_some((key, theirs))
            })
            .collect()
    }

    /// Address of the event bridge.
    pub fn bridge_url(&self) -> String {
        format!("ws://{}:{}", self.server_host, self.server_port)
    }
}

fn boolean(key: SettingKey, value: &Value) -> Result<bool, SettingsError> {
    value.as_bool().ok_or_else(|| SettingsError::WrongType {
        key,
        expected: "a boolean",
        got: value.clone(),
    })
}

fn text(key: SettingKey, value: &Value) -> Result<String, SettingsError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| SettingsError::WrongType {
            key,
            expected: "a string",
            got: value.clone(),
        })
}

fn integer(key: SettingKey, value: &Value) -> Result<u64, SettingsError> {
    // Sliders may hand over whole floats such as 80.0
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as u64)
        })
        .ok_or_else(|| SettingsError::WrongType {
            key,
            expected: "a non-negative integer",
            got: value.clone(),
        })
}

fn ranged(
    key: SettingKey,
    value: &Value,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, SettingsError> {
    let n = integer(key, value)?;
    within(key, n, range, value)
}

fn within(
    key: SettingKey,
    n: u64,
    range: std::ops::RangeInclusive<u64>,
    value: &Value,
) -> Result<u64, SettingsError> {
    if range.contains(&n) {
        Ok(n)
    } else {
        Err(SettingsError::OutOfRange {
            key,
            min: *range.start(),
            max: *range.end(),
            got: value.clone(),
        })
    }
}

/// Older settings files store the port as a string.
fn port_from_any<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Int(u16),
        Text(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Int(p) => Ok(p),
        Port::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_first_run() {
        let s = Settings::default();
        assert_eq!(s.opacity, 80);
        assert_eq!(s.base_font_size, 20);
        assert!(s.show_interaction_events);
        assert!(!s.show_gift_free);
        assert_eq!(s.bridge_url(), "ws://localhost:9696");
    }

    #[test]
    fn keys_roundtrip_through_strings() {
        for key in SettingKey::ALL {
            let parsed: SettingKey = key.as_str().parse().unwrap();
            assert_eq!(parsed, key);
            let json = serde_json::to_value(key).unwrap();
            assert_eq!(json, json!(key.as_str()));
        }
        assert!("fontSize".parse::<SettingKey>().is_err());
    }

    #[test]
    fn set_reports_change() {
        let mut s = Settings::default();
        assert!(s.set(SettingKey::Opacity, json!(50)).unwrap());
        assert!(!s.set(SettingKey::Opacity, json!(50)).unwrap());
        assert_eq!(s.get(SettingKey::Opacity), json!(50));
    }

    #[test]
    fn opacity_out_of_range_rejected() {
        let mut s = Settings::default();
        let err = s.set(SettingKey::Opacity, json!(101)).unwrap_err();
        assert!(matches!(err, SettingsError::OutOfRange { .. }));
        assert_eq!(s.opacity, 80);
    }

    #[test]
    fn port_accepts_string_and_number() {
        let mut s = Settings::default();
        s.set(SettingKey::ServerPort, json!("9797")).unwrap();
        assert_eq!(s.server_port, 9797);
        s.set(SettingKey::ServerPort, json!(8080)).unwrap();
        assert_eq!(s.server_port, 8080);
        assert!(s.set(SettingKey::ServerPort, json!("0")).is_err());
        assert!(s.set(SettingKey::ServerPort, json!("abc")).is_err());
    }

    #[test]
    fn wrong_type_rejected() {
        let mut s = Settings::default();
        assert!(matches!(
            s.set(SettingKey::AlwaysOnTop, json!("yes")),
            Err(SettingsError::WrongType { .. })
        ));
        assert!(matches!(
            s.set(SettingKey::ServerHost, json!("   ")),
            Err(SettingsError::Empty(SettingKey::ServerHost))
        ));
    }

    #[test]
    fn legacy_string_port_deserializes() {
        let s: Settings =
            serde_json::from_value(json!({ "serverPort": "9696", "customCSS": ".x{}" })).unwrap();
        assert_eq!(s.server_port, 9696);
        assert_eq!(s.custom_css, ".x{}");
        assert_eq!(s.opacity, 80);
    }

    #[test]
    fn diff_lists_changed_keys() {
        let a = Settings::default();
        let mut b = a.clone();
        b.click_through = true;
        b.allowed_origins = "1, 2".into();
        let diff = a.diff(&b);
        assert_eq!(
            diff,
            vec![
                (SettingKey::ClickThrough, json!(true)),
                (SettingKey::AllowedOrigins, json!("1, 2")),
            ]
        );
    }
}
