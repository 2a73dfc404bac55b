//! Process-wide localized string catalog.
//!
//! Per Design Note "Global language state", the active language is an
//! explicit atomic rather than a value hidden behind module
//! initialization; races on language change are tolerated by design
//! (worst case a single message is sent in the prior language).

use std::sync::atomic::{AtomicU8, Ordering};

const NUM_LANGUAGES: u8 = 2;

static ACTIVE_LANGUAGE: AtomicU8 = AtomicU8::new(Language::En as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Language {
    En = 0,
    De = 1,
}

impl Language {
    fn from_index(idx: u8) -> Self {
        match idx % NUM_LANGUAGES {
            0 => Language::En,
            _ => Language::De,
        }
    }
}

/// Set the active language, taken modulo the number of languages.
pub fn set_language(raw: i64) {
    let idx = raw.rem_euclid(NUM_LANGUAGES as i64) as u8;
    ACTIVE_LANGUAGE.store(idx, Ordering::Relaxed);
}

pub fn active_language() -> Language {
    Language::from_index(ACTIVE_LANGUAGE.load(Ordering::Relaxed))
}

/// A message that differs by language. Unlike the original's
/// `string(item)`, which also accepted plain strings and passed them
/// through unchanged, callers with no localized text just use a `&str`
/// directly — `LocalizedKey` only models the entries that actually vary.
#[derive(Debug, Clone, Copy)]
pub struct LocalizedKey {
    en: &'static str,
    de: &'static str,
}

impl LocalizedKey {
    pub const fn new(en: &'static str, de: &'static str) -> Self {
        Self { en, de }
    }

    pub fn resolve(&self) -> &'static str {
        match active_language() {
            Language::En => self.en,
            Language::De => self.de,
        }
    }
}

pub const PROTOCOL_ERROR: LocalizedKey = LocalizedKey::new("Protocol Error", "Protokollfehler");
pub const INCORRECT_PW: LocalizedKey = LocalizedKey::new(
    "Incorrect password",
    "Falsches Passwort. Vielleicht wird der Name schon verwendet.",
);
pub const WAIT_FOR_PLAYER: LocalizedKey =
    LocalizedKey::new("...waiting for player...", "...warte auf Spieler...");
pub const NOT_LINKED: LocalizedKey =
    LocalizedKey::new("You are not linked with any player.", "Du bist mit keinem Spieler verbunden.");
pub const TIMEOUT_ERROR: LocalizedKey =
    LocalizedKey::new("Error: connection timeout", "Fehler: Zeitüberschreitung");
pub const AUTH_ERROR: LocalizedKey =
    LocalizedKey::new("Authentication failed", "Fehler bei der Authentifizierung");
pub const TOO_MANY_IP: LocalizedKey = LocalizedKey::new(
    "Too many users with same ip address",
    "Zu viele Nutzer mit derselben IP-Adresse",
);

/// `{}`-style templates take a formatted argument, so they stay functions
/// rather than constants.
pub fn already_assigned(name: &str) -> String {
    match active_language() {
        Language::En => format!("'{name}' is already assigned. Please choose a different name"),
        Language::De => format!("Der Name '{name}' ist schon vergeben. Waehle einen anderen Namen"),
    }
}

pub fn connected_with(peer_name: &str, peer_rating: i64) -> String {
    match active_language() {
        Language::En => format!("connected with {peer_name} ({peer_rating})"),
        Language::De => format!("mit {peer_name} ({peer_rating}) verbunden"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn set_language_wraps_modulo_language_count() {
        set_language(0);
        assert_eq!(active_language(), Language::En);
        set_language(1);
        assert_eq!(active_language(), Language::De);
        set_language(2);
        assert_eq!(active_language(), Language::En);
        set_language(-1);
        assert_eq!(active_language(), Language::De);
    }

    #[test]
    #[serial]
    fn resolve_follows_active_language() {
        set_language(0);
        assert_eq!(PROTOCOL_ERROR.resolve(), "Protocol Error");
        set_language(1);
        assert_eq!(PROTOCOL_ERROR.resolve(), "Protokollfehler");
        set_language(0);
    }
}
