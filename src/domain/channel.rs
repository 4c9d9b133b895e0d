//! Client channel inference.
//!
//! Store billing rules forbid offering a real-money purchase inside the mobile
//! apps, so every top-up entry point resolves the caller's channel first.
//! Sources are consulted in a fixed order: explicit request field,
//! `X-Client-Channel`, `X-Client-Platform`, then `User-Agent` sniffing.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Web,
    Bot,
    Mobile,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Web => "web",
            Channel::Bot => "bot",
            Channel::Mobile => "mobile",
        }
    }

    pub fn is_mobile(&self) -> bool {
        *self == Channel::Mobile
    }

    /// Maps a free-form channel name. Unknown names count as web.
    pub fn normalize(raw: &str) -> Channel {
        match raw.trim().to_lowercase().as_str() {
            "mobile" | "ios" | "android" | "native_app" | "app" => Channel::Mobile,
            "bot" | "telegram" | "telegram_bot" => Channel::Bot,
            _ => Channel::Web,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw inputs available at the request boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelHints {
    /// The request body's own `channel` field.
    #[serde(default, rename = "channel")]
    pub explicit: Option<String>,
    #[serde(default)]
    pub client_channel: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl ChannelHints {
    pub fn explicit(channel: impl Into<String>) -> Self {
        Self {
            explicit: Some(channel.into()),
            ..Default::default()
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn infer_channel(hints: &ChannelHints) -> Channel {
    if let Some(explicit) = non_empty(&hints.explicit) {
        return Channel::normalize(explicit);
    }
    if let Some(header) = non_empty(&hints.client_channel) {
        return Channel::normalize(header);
    }
    if let Some(platform) = non_empty(&hints.platform) {
        match platform.to_lowercase().as_str() {
            "ios" | "android" | "mobile" => return Channel::Mobile,
            "telegram" | "bot" => return Channel::Bot,
            _ => {}
        }
    }

    let ua = non_empty(&hints.user_agent)
        .map(str::to_lowercase)
        .unwrap_or_default();
    if ["okhttp", "reactnative", "react-native", "cfnetwork"]
        .iter()
        .any(|marker| ua.contains(marker))
    {
        Channel::Mobile
    } else if ua.contains("telegram") {
        Channel::Bot
    } else {
        Channel::Web
    }
}
