//! One-shot messages carried to the next page in a cookie.

use serde::{Deserialize, Serialize};
use tower_cookies::{Cookie, Cookies};

pub const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl FlashLevel {
    pub fn css_class(&self) -> &'static str {
        match self {
            Self::Success => "alert-success",
            Self::Info => "alert-info",
            Self::Warning => "alert-warning",
            Self::Error => "alert-danger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub message: String,
}

fn read(cookies: &Cookies) -> Vec<FlashMessage> {
    cookies
        .get(FLASH_COOKIE)
        .and_then(|c| urlencoding::decode(c.value()).ok().map(|s| s.into_owned()))
        .and_then(|json| serde_json::from_str(&json).ok())
        .unwrap_or_default()
}

fn cookie(value: String) -> Cookie<'static> {
    Cookie::build((FLASH_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(tower_cookies::cookie::SameSite::Lax)
        .build()
}

pub fn push_flash(cookies: &Cookies, level: FlashLevel, message: impl Into<String>) {
    let mut messages = read(cookies);
    messages.push(FlashMessage {
        level,
        message: message.into(),
    });
    if let Ok(json) = serde_json::to_string(&messages) {
        cookies.add(cookie(urlencoding::encode(&json).into_owned()));
    }
}

/// Returns pending messages and clears them.
pub fn take_flashes(cookies: &Cookies) -> Vec<FlashMessage> {
    let messages = read(cookies);
    if cookies.get(FLASH_COOKIE).is_some() {
        cookies.remove(cookie(String::new()));
    }
    messages
}
