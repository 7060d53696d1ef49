//! Anki backend capability and its AnkiConnect implementation.
//!
//! [`AnkiBackend`] is the narrow surface the server needs from Anki. The
//! production implementation is [`AnkiConnectClient`], which talks to the
//! AnkiConnect add-on over its JSON API (version 6).

use std::cmp::Ordering;
use std::collections::BTreeMap;

use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::guard::{decode_lenient, Lenient};

/// AnkiConnect API version spoken by the client.
pub const ANKI_CONNECT_VERSION: u32 = 6;

/// Note type used for cards created by this server.
pub const BASIC_MODEL: &str = "Basic";

/// Operations the server needs from Anki.
#[async_trait::async_trait]
pub trait AnkiBackend: Send + Sync {
    /// AnkiConnect API version, used as a reachability check.
    async fn version(&self) -> Result<u32>;

    /// Names of all decks.
    async fn deck_names(&self) -> Result<Vec<String>>;

    /// Create a deck, returning its id.
    async fn create_deck(&self, name: &str) -> Result<Option<i64>>;

    /// Clone the options group `source_id` under a new `name`.
    async fn clone_deck_config(&self, name: &str, source_id: i64) -> Result<Option<i64>>;

    /// Assign the options group `config_id` to `decks`.
    async fn set_deck_config(&self, decks: &[String], config_id: i64) -> Result<()>;

    /// Card ids matching an Anki search query.
    async fn find_cards(&self, query: &str) -> Result<Vec<i64>>;

    /// Full records for the given card ids.
    async fn cards_info(&self, card_ids: &[i64]) -> Result<Vec<CardRecord>>;

    /// Add a note, returning its id when Anki accepted it.
    async fn add_note(&self, note: &NewNote) -> Result<Option<i64>>;

    /// Answer cards; one flag per answer, in order.
    async fn answer_cards(&self, answers: &[CardAnswer]) -> Result<Vec<bool>>;
}

/// Scheduling position of a card as reported by Anki.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DueKey {
    /// Anki's numeric due value.
    Known(f64),
    /// The field was absent or not a number.
    #[default]
    Unknown,
}

impl DueKey {
    /// Review order: known keys ascending, unknown keys last.
    pub fn review_order(&self, other: &Self) -> Ordering {
        match (self, other) {
            (DueKey::Known(a), DueKey::Known(b)) => a.total_cmp(b),
            (DueKey::Known(_), DueKey::Unknown) => Ordering::Less,
            (DueKey::Unknown, DueKey::Known(_)) => Ordering::Greater,
            (DueKey::Unknown, DueKey::Unknown) => Ordering::Equal,
        }
    }
}

impl Serialize for DueKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            DueKey::Known(due) => serializer.serialize_f64(*due),
            DueKey::Unknown => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for DueKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value
            .and_then(|v| v.as_f64())
            .map_or(DueKey::Unknown, DueKey::Known))
    }
}

/// A card as returned by `cardsInfo`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    /// Card id.
    pub card_id: i64,
    /// Rendered front side (HTML).
    #[serde(default)]
    pub question: String,
    /// Rendered back side (HTML).
    #[serde(default)]
    pub answer: String,
    /// Due value.
    #[serde(default)]
    pub due: DueKey,
}

/// A review answer for one card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardAnswer {
    /// Card id.
    #[serde(deserialize_with = "whole_number")]
    pub card_id: i64,
    /// Ease button (1 = again .. 4 = easy).
    #[serde(deserialize_with = "whole_number")]
    pub ease: i64,
}

/// Accept `3` and `3.0` alike; JSON clients often send integers as floats.
fn whole_number<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    if let Some(n) = value.as_i64() {
        return Ok(n);
    }
    match value.as_f64() {
        Some(n) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => Ok(n as i64),
        _ => Err(serde::de::Error::custom(format!(
            "expected a whole number, got {}",
            value
        ))),
    }
}

/// A note to be added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNote {
    /// Target deck.
    pub deck_name: String,
    /// Note type.
    pub model_name: String,
    /// Field name to content.
    pub fields: BTreeMap<String, String>,
    /// Tags.
    pub tags: Vec<String>,
}

impl NewNote {
    /// A front/back note of the built-in "Basic" type.
    pub fn basic(deck: impl Into<String>, front: impl Into<String>, back: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("Front".to_string(), front.into());
        fields.insert("Back".to_string(), back.into());
        Self {
            deck_name: deck.into(),
            model_name: BASIC_MODEL.into(),
            fields,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the AnkiConnect add-on.
#[derive(Debug, Clone)]
pub struct AnkiConnectClient {
    http: Client,
    url: String,
}

impl AnkiConnectClient {
    /// Create a client for the given AnkiConnect endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }

    async fn invoke(&self, action: &str, params: Option<Value>) -> Result<Value> {
        tracing::debug!("AnkiConnect -> {}", action);
        let text = self
            .http
            .post(&self.url)
            .json(&request_body(action, params))
            .send()
            .await?
            .text()
            .await?;

        parse_response(&text)
    }

    async fn invoke_as<T: serde::de::DeserializeOwned>(
        &self,
        action: &str,
        params: Option<Value>,
    ) -> Result<T> {
        let result = self.invoke(action, params).await?;
        serde_json::from_value(result)
            .map_err(|e| Error::Decode(format!("{} returned unexpected shape: {}", action, e)))
    }
}

/// `{action, version, params}` request envelope.
fn request_body(action: &str, params: Option<Value>) -> Value {
    let mut body = json!({ "action": action, "version": ANKI_CONNECT_VERSION });
    if let Some(params) = params {
        body["params"] = params;
    }
    body
}

/// Unwrap a `{result, error}` response body.
fn parse_response(text: &str) -> Result<Value> {
    let value = match decode_lenient(text) {
        Lenient::Json(value) => value,
        Lenient::Noise(raw) => return Err(Error::Decode(raw)),
    };

    let response: ApiResponse =
        serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))?;
    match response.error {
        Some(error) => Err(Error::Backend(error)),
        None => Ok(response.result),
    }
}

fn confirm_assignment(result: &Value, config_id: i64) -> Result<()> {
    if *result == Value::Bool(false) {
        return Err(Error::Backend(format!(
            "options group {} could not be assigned",
            config_id
        )));
    }
    Ok(())
}

/// Deleted cards come back as `{}`; skip anything without an id.
fn card_records(records: Vec<Value>) -> Vec<CardRecord> {
    records
        .into_iter()
        .filter_map(|record| match serde_json::from_value(record) {
            Ok(card) => Some(card),
            Err(e) => {
                tracing::debug!("Skipping unreadable card record: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl AnkiBackend for AnkiConnectClient {
    async fn version(&self) -> Result<u32> {
        self.invoke_as("version", None).await
    }

    async fn deck_names(&self) -> Result<Vec<String>> {
        self.invoke_as("deckNames", None).await
    }

    async fn create_deck(&self, name: &str) -> Result<Option<i64>> {
        let result = self
            .invoke("createDeck", Some(json!({ "deck": name })))
            .await?;
        Ok(result.as_i64())
    }

    async fn clone_deck_config(&self, name: &str, source_id: i64) -> Result<Option<i64>> {
        // Anki answers `false` instead of an id when the source group is missing.
        let result = self
            .invoke(
                "cloneDeckConfigId",
                Some(json!({ "name": name, "cloneFrom": source_id })),
            )
            .await?;
        Ok(result.as_i64())
    }

    async fn set_deck_config(&self, decks: &[String], config_id: i64) -> Result<()> {
        let result = self
            .invoke(
                "setDeckConfigId",
                Some(json!({ "decks": decks, "configId": config_id })),
            )
            .await?;
        confirm_assignment(&result, config_id)
    }

    async fn find_cards(&self, query: &str) -> Result<Vec<i64>> {
        self.invoke_as("findCards", Some(json!({ "query": query })))
            .await
    }

    async fn cards_info(&self, card_ids: &[i64]) -> Result<Vec<CardRecord>> {
        let records: Vec<Value> = self
            .invoke_as("cardsInfo", Some(json!({ "cards": card_ids })))
            .await?;
        Ok(card_records(records))
    }

    async fn add_note(&self, note: &NewNote) -> Result<Option<i64>> {
        let result = self.invoke("addNote", Some(json!({ "note": note }))).await?;
        Ok(result.as_i64())
    }

    async fn answer_cards(&self, answers: &[CardAnswer]) -> Result<Vec<bool>> {
        self.invoke_as("answerCards", Some(json!({ "answers": answers })))
            .await
    }
}
