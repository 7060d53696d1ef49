//! In-memory backend for unit tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::anki::{AnkiBackend, CardAnswer, CardRecord, DueKey, NewNote};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
pub struct FakeState {
    pub decks: Vec<String>,
    pub cards: Vec<CardRecord>,
    pub queries: HashMap<String, Vec<i64>>,
    /// `deckNames` fails from this (1-based) call on.
    pub deck_names_fail_from: Option<usize>,
    pub deck_names_calls: usize,
    /// `createDeck` fails with this message.
    pub create_error: Option<String>,
    /// `createDeck` still creates the deck when it fails (lost race).
    pub create_despite_error: bool,
    pub created: Vec<String>,
    pub clone_result: Option<i64>,
    pub clones: Vec<(String, i64)>,
    pub assignments: Vec<(Vec<String>, i64)>,
    pub note_id: Option<i64>,
    pub notes: Vec<NewNote>,
    pub rejected: Vec<i64>,
    pub answered: Vec<CardAnswer>,
}

#[derive(Debug, Default)]
pub struct FakeAnki {
    state: Mutex<FakeState>,
}

impl FakeAnki {
    pub fn new() -> Self {
        let fake = Self::default();
        {
            let mut state = fake.state();
            state.clone_result = Some(42);
            state.note_id = Some(1_000);
        }
        fake
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn with_deck(self, name: &str) -> Self {
        self.state().decks.push(name.to_string());
        self
    }

    /// Add a card matching `query`.
    pub fn with_card(self, query: &str, id: i64, question: &str, answer: &str, due: f64) -> Self {
        {
            let mut state = self.state();
            state.queries.entry(query.to_string()).or_default().push(id);
            state.cards.push(CardRecord {
                card_id: id,
                question: question.into(),
                answer: answer.into(),
                due: DueKey::Known(due),
            });
        }
        self
    }
}

#[async_trait::async_trait]
impl AnkiBackend for FakeAnki {
    async fn version(&self) -> Result<u32> {
        Ok(6)
    }

    async fn deck_names(&self) -> Result<Vec<String>> {
        let mut state = self.state();
        state.deck_names_calls += 1;
        if matches!(state.deck_names_fail_from, Some(n) if state.deck_names_calls >= n) {
            return Err(Error::Backend("collection is not available".into()));
        }
        Ok(state.decks.clone())
    }

    async fn create_deck(&self, name: &str) -> Result<Option<i64>> {
        let mut state = self.state();
        state.created.push(name.to_string());
        if let Some(error) = state.create_error.clone() {
            if state.create_despite_error {
                state.decks.push(name.to_string());
            }
            return Err(Error::Backend(error));
        }
        state.decks.push(name.to_string());
        Ok(Some(state.decks.len() as i64))
    }

    async fn clone_deck_config(&self, name: &str, source_id: i64) -> Result<Option<i64>> {
        let mut state = self.state();
        state.clones.push((name.to_string(), source_id));
        Ok(state.clone_result)
    }

    async fn set_deck_config(&self, decks: &[String], config_id: i64) -> Result<()> {
        self.state().assignments.push((decks.to_vec(), config_id));
        Ok(())
    }

    async fn find_cards(&self, query: &str) -> Result<Vec<i64>> {
        Ok(self.state().queries.get(query).cloned().unwrap_or_default())
    }

    async fn cards_info(&self, card_ids: &[i64]) -> Result<Vec<CardRecord>> {
        let state = self.state();
        Ok(card_ids
            .iter()
            .filter_map(|id| state.cards.iter().find(|c| c.card_id == *id).cloned())
            .collect())
    }

    async fn add_note(&self, note: &NewNote) -> Result<Option<i64>> {
        let mut state = self.state();
        state.notes.push(note.clone());
        if let Some(note_id) = state.note_id {
            let card_id = note_id + 1;
            state
                .queries
                .insert(format!("nid:{}", note_id), vec![card_id]);
        }
        Ok(state.note_id)
    }

    async fn answer_cards(&self, answers: &[CardAnswer]) -> Result<Vec<bool>> {
        let mut state = self.state();
        state.answered.extend_from_slice(answers);
        Ok(answers
            .iter()
            .map(|a| !state.rejected.contains(&a.card_id))
            .collect())
    }
}
