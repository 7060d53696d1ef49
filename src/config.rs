//! Runtime configuration.

/// Default prefix for the date-based inbox decks.
pub const DEFAULT_DECK_PREFIX: &str = "00_Inbox";

/// Default AnkiConnect endpoint.
pub const DEFAULT_ANKI_CONNECT_URL: &str = "http://localhost:8765";

/// Id of Anki's built-in "Default" options group.
pub const DEFAULT_DECK_CONFIG_ID: i64 = 1;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Root of the date-based deck path new cards are filed into.
    pub deck_prefix: String,
    /// AnkiConnect endpoint.
    pub anki_connect_url: String,
    /// Options group cloned for every newly created deck (`None` disables).
    pub deck_config_source: Option<i64>,
}

impl Config {
    /// Use a different deck prefix.
    pub fn with_deck_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.deck_prefix = prefix.into();
        self
    }

    /// Use a different AnkiConnect endpoint.
    pub fn with_anki_connect_url(mut self, url: impl Into<String>) -> Self {
        self.anki_connect_url = url.into();
        self
    }

    /// Clone options from `source`, or leave new decks on the default group.
    pub fn with_deck_config_source(mut self, source: Option<i64>) -> Self {
        self.deck_config_source = source;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deck_prefix: DEFAULT_DECK_PREFIX.into(),
            anki_connect_url: DEFAULT_ANKI_CONNECT_URL.into(),
            deck_config_source: Some(DEFAULT_DECK_CONFIG_ID),
        }
    }
}
