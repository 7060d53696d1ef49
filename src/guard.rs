//! Transport protection.
//!
//! stdout carries nothing but JSON-RPC envelopes, and Anki is an external
//! process whose add-ons may print banners or warnings into its responses.
//! The pieces here keep that noise out of the protocol stream:
//!
//! - [`GuardedWriter`] drops every outbound chunk that is not an envelope.
//! - [`decode_lenient`] turns a backend body into JSON or a noise record,
//!   never an error.
//! - [`GuardedBackend`] resolves undecodable backend answers to the call's
//!   neutral value while letting real failures through.

use std::io::{self, Write};

use serde_json::Value;

use crate::anki::{AnkiBackend, CardAnswer, CardRecord, NewNote};
use crate::error::{Error, Result};

/// Every outbound protocol message starts with this.
pub const ENVELOPE_MARKER: &str = "{\"jsonrpc\"";

/// Writer that only lets JSON-RPC envelopes through.
///
/// Each `write` call is treated as one chunk. Chunks whose trimmed content
/// does not start with [`ENVELOPE_MARKER`] are discarded but reported as
/// fully written, so callers never stall or retry on them.
#[derive(Debug)]
pub struct GuardedWriter<W> {
    inner: W,
}

impl<W: Write> GuardedWriter<W> {
    /// Wrap `inner`.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Unwrap the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Whether `chunk` would be forwarded.
    pub fn is_envelope(chunk: &[u8]) -> bool {
        String::from_utf8_lossy(chunk)
            .trim_start()
            .starts_with(ENVELOPE_MARKER)
    }
}

impl<W: Write> Write for GuardedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if Self::is_envelope(buf) {
            // A short inner write would split the envelope and drop its tail.
            self.inner.write_all(buf)?;
        } else if !buf.is_empty() {
            tracing::debug!("Dropped {} bytes of non-protocol output", buf.len());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Outcome of decoding a backend body.
#[derive(Debug, Clone, PartialEq)]
pub enum Lenient {
    /// The body, or the JSON span embedded in it, parsed.
    Json(Value),
    /// Nothing parseable; carries the text with control characters removed.
    Noise(String),
}

/// Decode `text` as JSON without ever failing.
///
/// When the whole body does not parse, decoding is retried from every `{`
/// and `[` in turn and the first complete value wins. This recovers
/// responses with a banner printed before or after them, including banners
/// that contain brackets themselves.
pub fn decode_lenient(text: &str) -> Lenient {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Lenient::Json(value);
    }

    for (start, _) in trimmed.match_indices(['{', '[']) {
        let mut values =
            serde_json::Deserializer::from_str(&trimmed[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = values.next() {
            tracing::debug!("Recovered JSON at byte {} of noisy backend response", start);
            return Lenient::Json(value);
        }
    }

    Lenient::Noise(sanitize(trimmed))
}

fn sanitize(text: &str) -> String {
    text.chars().filter(|c| !c.is_control()).collect()
}

/// Backend decorator absorbing undecodable responses.
///
/// [`Error::Decode`] from any call becomes the call's neutral value (empty
/// list, `None`, `()`); every other error is returned unchanged. `version`
/// is the reachability check and is never neutralized.
pub struct GuardedBackend<B> {
    inner: B,
}

impl<B: AnkiBackend> GuardedBackend<B> {
    /// Wrap `inner`.
    pub fn new(inner: B) -> Self {
        Self { inner }
    }
}

fn neutralize<T: Default>(action: &str, result: Result<T>) -> Result<T> {
    match result {
        Err(Error::Decode(raw)) => {
            tracing::warn!("Ignoring undecodable {} response: {}", action, raw);
            Ok(T::default())
        }
        other => other,
    }
}

#[async_trait::async_trait]
impl<B: AnkiBackend> AnkiBackend for GuardedBackend<B> {
    async fn version(&self) -> Result<u32> {
        self.inner.version().await
    }

    async fn deck_names(&self) -> Result<Vec<String>> {
        neutralize("deckNames", self.inner.deck_names().await)
    }

    async fn create_deck(&self, name: &str) -> Result<Option<i64>> {
        neutralize("createDeck", self.inner.create_deck(name).await)
    }

    async fn clone_deck_config(&self, name: &str, source_id: i64) -> Result<Option<i64>> {
        neutralize(
            "cloneDeckConfigId",
            self.inner.clone_deck_config(name, source_id).await,
        )
    }

    async fn set_deck_config(&self, decks: &[String], config_id: i64) -> Result<()> {
        neutralize(
            "setDeckConfigId",
            self.inner.set_deck_config(decks, config_id).await,
        )
    }

    async fn find_cards(&self, query: &str) -> Result<Vec<i64>> {
        neutralize("findCards", self.inner.find_cards(query).await)
    }

    async fn cards_info(&self, card_ids: &[i64]) -> Result<Vec<CardRecord>> {
        neutralize("cardsInfo", self.inner.cards_info(card_ids).await)
    }

    async fn add_note(&self, note: &NewNote) -> Result<Option<i64>> {
        neutralize("addNote", self.inner.add_note(note).await)
    }

    async fn answer_cards(&self, answers: &[CardAnswer]) -> Result<Vec<bool>> {
        neutralize("answerCards", self.inner.answer_cards(answers).await)
    }
}
