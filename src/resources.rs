//! Card search resources.
//!
//! Resources live under `anki://search/<filter>`. The filter is the last
//! path segment, expanded by [`crate::query::translate`]; reading returns
//! the matching cards as a JSON array ordered for review.

use serde::Serialize;

use crate::anki::{AnkiBackend, CardRecord, DueKey};
use crate::error::{Error, Result};
use crate::normalize::normalize;
use crate::protocol::{ReadResourceResult, ResourceContents, ResourceDefinition};
use crate::query::translate;

/// MIME type of every resource.
pub const RESOURCE_MIME_TYPE: &str = "application/json";

/// Common prefix of the resource URIs.
pub const SEARCH_URI_PREFIX: &str = "anki://search/";

/// A card as handed to clients: plain text sides and its due value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    /// Card id.
    pub card_id: i64,
    /// Front side, normalized.
    pub question: String,
    /// Back side, normalized.
    pub answer: String,
    /// Due value; lower is reviewed first.
    pub due: DueKey,
}

impl From<CardRecord> for Card {
    fn from(record: CardRecord) -> Self {
        Self {
            card_id: record.card_id,
            question: normalize(&record.question),
            answer: normalize(&record.answer),
            due: record.due,
        }
    }
}

/// The fixed resource catalog.
pub fn list_resources() -> Vec<ResourceDefinition> {
    [
        (
            "deckcurrent",
            "Current Deck",
            "All cards in the deck currently selected in Anki",
        ),
        ("isdue", "Due Cards", "Cards that are due for review"),
        ("isnew", "New Cards", "Cards that have not been studied yet"),
    ]
    .into_iter()
    .map(|(filter, name, description)| ResourceDefinition {
        uri: format!("{}{}", SEARCH_URI_PREFIX, filter),
        name: name.into(),
        description: description.into(),
        mime_type: RESOURCE_MIME_TYPE.into(),
    })
    .collect()
}

/// Last path segment of `uri`.
pub fn filter_token(uri: &str) -> Result<&str> {
    uri.split('/')
        .last()
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| Error::InvalidRequest(format!("no search filter in resource URI: {}", uri)))
}

/// Cards matching a native Anki query, ordered by due value.
pub async fn search_cards(backend: &dyn AnkiBackend, query: &str) -> Result<Vec<Card>> {
    let ids = backend.find_cards(query).await?;
    tracing::debug!("Query {:?} matched {} cards", query, ids.len());
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut cards: Vec<Card> = backend
        .cards_info(&ids)
        .await?
        .into_iter()
        .map(Card::from)
        .collect();
    cards.sort_by(|a, b| a.due.review_order(&b.due));
    Ok(cards)
}

/// Read a search resource.
pub async fn read_resource(backend: &dyn AnkiBackend, uri: &str) -> Result<ReadResourceResult> {
    let query = translate(filter_token(uri)?);
    let cards = search_cards(backend, &query).await?;

    Ok(ReadResourceResult {
        contents: vec![ResourceContents {
            uri: uri.to_string(),
            mime_type: RESOURCE_MIME_TYPE.into(),
            text: serde_json::to_string(&cards)?,
        }],
    })
}
