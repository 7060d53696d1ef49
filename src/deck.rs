//! Date-based inbox decks.
//!
//! New cards are filed under `PREFIX::YYYY::MM::DD`. Anki has no atomic
//! "create if absent", so [`DeckProvisioner::ensure`] checks, creates, and
//! re-checks, treating a lost creation race as success.

use std::fmt;

use chrono::{Local, NaiveDate};

use crate::anki::AnkiBackend;
use crate::error::Error;

/// Hierarchical deck name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeckPath(String);

impl DeckPath {
    /// `prefix::YYYY::MM::DD` for `date`.
    pub fn for_date(prefix: &str, date: NaiveDate) -> Self {
        Self(format!("{}::{}", prefix, date.format("%Y::%m::%d")))
    }

    /// Deck for today's local date.
    pub fn today(prefix: &str) -> Self {
        Self::for_date(prefix, Local::now().date_naive())
    }

    /// Full deck name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeckPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Makes sure a deck exists before cards are filed into it.
pub struct DeckProvisioner<'a> {
    backend: &'a dyn AnkiBackend,
    config_source: Option<i64>,
}

impl<'a> DeckProvisioner<'a> {
    /// Provisioner cloning `config_source` for every deck it creates.
    pub fn new(backend: &'a dyn AnkiBackend, config_source: Option<i64>) -> Self {
        Self {
            backend,
            config_source,
        }
    }

    /// Whether `deck` exists once this returns. Never fails.
    pub async fn ensure(&self, deck: &DeckPath) -> bool {
        match self.backend.deck_names().await {
            Ok(names) if names.iter().any(|n| n == deck.as_str()) => return true,
            Ok(_) => {}
            Err(e) => tracing::debug!("Could not list decks before creating {}: {}", deck, e),
        }

        match self.backend.create_deck(deck.as_str()).await {
            Ok(Some(id)) => {
                tracing::info!("Created deck {} ({})", deck, id);
                self.assign_options(deck).await;
                return true;
            }
            Ok(None) => tracing::debug!("createDeck returned no id for {}", deck),
            Err(e) if already_exists(&e) => {
                tracing::debug!("Deck {} was created concurrently", deck);
                return true;
            }
            Err(e) => tracing::warn!("Failed to create deck {}: {}", deck, e),
        }

        match self.backend.deck_names().await {
            Ok(names) => names.iter().any(|n| n == deck.as_str()),
            Err(e) => {
                tracing::warn!("Could not confirm deck {}: {}", deck, e);
                false
            }
        }
    }

    /// Give a new deck its own options group. Failures leave the deck on
    /// whatever group Anki assigned.
    async fn assign_options(&self, deck: &DeckPath) {
        let Some(source) = self.config_source else {
            return;
        };

        let config_id = match self.backend.clone_deck_config(deck.as_str(), source).await {
            Ok(Some(id)) => id,
            Ok(None) => {
                tracing::warn!("Options group {} could not be cloned for {}", source, deck);
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to clone options for {}: {}", deck, e);
                return;
            }
        };

        if let Err(e) = self
            .backend
            .set_deck_config(&[deck.as_str().to_string()], config_id)
            .await
        {
            tracing::warn!("Failed to assign options {} to {}: {}", config_id, deck, e);
        }
    }
}

fn already_exists(error: &Error) -> bool {
    error.to_string().to_lowercase().contains("already exists")
}
