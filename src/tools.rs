//! Tool definitions and registry for MCP server.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::anki::{AnkiBackend, CardAnswer, NewNote};
use crate::config::Config;
use crate::deck::{DeckPath, DeckProvisioner};
use crate::error::{Error, Result};
use crate::protocol::{ContentItem, ToolCallResult, ToolDefinition};
use crate::resources::search_cards;

/// Tool trait for implementing MCP tools.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult>;
}

/// Context passed to tools during execution.
pub struct ToolContext {
    /// Anki backend.
    pub backend: Arc<dyn AnkiBackend>,
    /// Server configuration.
    pub config: Config,
}

impl ToolContext {
    /// Create a new tool context.
    pub fn new(backend: Arc<dyn AnkiBackend>, config: Config) -> Self {
        Self { backend, config }
    }
}

/// Registry of available tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    context: Arc<ToolContext>,
}

impl ToolRegistry {
    /// Create a new tool registry with the card tools.
    pub fn new(backend: Arc<dyn AnkiBackend>, config: Config) -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
            context: Arc::new(ToolContext::new(backend, config)),
        };

        registry.register(Arc::new(UpdateCardsTool));
        registry.register(Arc::new(AddCardTool));
        registry.register(Arc::new(CardQueueTool {
            name: "get_due_cards",
            description: "Returns a given number of cards due for review, earliest first.",
            query: "is:due",
        }));
        registry.register(Arc::new(CardQueueTool {
            name: "get_new_cards",
            description: "Returns a given number of new and unseen cards.",
            query: "is:new",
        }));

        registry
    }

    /// Get tool definitions, sorted by name.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        let mut tools: Vec<ToolDefinition> = self.tools.values().map(|t| t.definition()).collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Execute a tool by name.
    pub async fn execute(
        &self,
        name: &str,
        arguments: Option<serde_json::Value>,
    ) -> Result<ToolCallResult> {
        let arguments = arguments.ok_or_else(|| {
            Error::InvalidRequest(format!("no arguments provided for tool: {}", name))
        })?;

        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))?;

        tool.execute(arguments, &self.context).await
    }

    /// Register a custom tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name.clone();
        self.tools.insert(name, tool);
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(arguments: serde_json::Value) -> Result<T> {
    serde_json::from_value(arguments).map_err(|e| Error::InvalidParams(e.to_string()))
}

fn text_result(text: impl Into<String>) -> ToolCallResult {
    ToolCallResult {
        content: vec![ContentItem::text(text)],
        is_error: false,
    }
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// Card Tools
// ============================================================================

/// Tool for recording review answers.
pub struct UpdateCardsTool;

#[derive(Debug, Deserialize)]
struct UpdateCardsArgs {
    answers: Vec<CardAnswer>,
}

#[async_trait::async_trait]
impl Tool for UpdateCardsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "update_cards".into(),
            description: "After the user answers cards you've quizzed them on, use this tool to mark them answered and update their ease.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "answers": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "cardId": {
                                    "type": "integer",
                                    "description": "Id of the card to answer"
                                },
                                "ease": {
                                    "type": "integer",
                                    "description": "Ease of the card between 1 (Again) and 4 (Easy)"
                                }
                            }
                        }
                    }
                },
                "required": ["answers"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let args: UpdateCardsArgs = parse_args(arguments)?;

        let results = context.backend.answer_cards(&args.answers).await?;

        // Anki answers positionally; a missing flag counts as a rejection.
        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for (index, answer) in args.answers.iter().enumerate() {
            if results.get(index).copied().unwrap_or(false) {
                succeeded.push(answer.card_id);
            } else {
                failed.push(answer.card_id);
            }
        }

        if !failed.is_empty() {
            return Err(Error::CardsRejected(failed));
        }

        tracing::info!("Answered {} cards", succeeded.len());
        Ok(text_result(format!("Updated cards {}", join_ids(&succeeded))))
    }
}

/// Tool for creating a card in today's inbox deck.
pub struct AddCardTool;

#[derive(Debug, Deserialize)]
struct AddCardArgs {
    front: String,
    back: String,
}

#[async_trait::async_trait]
impl Tool for AddCardTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "add_card".into(),
            description: "Create a new flashcard in Anki for the user. Must use HTML formatting only. IMPORTANT FORMATTING NOTES:\n- Use <br> for line breaks\n- For code blocks, use <pre> with inline CSS styles\n- Use <strong>, <em> and <sub>/<sup> for emphasis and notation".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "front": {
                        "type": "string",
                        "description": "The front of the card. Must use simple HTML formatting."
                    },
                    "back": {
                        "type": "string",
                        "description": "The back of the card. Must use simple HTML formatting."
                    }
                },
                "required": ["front", "back"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let args: AddCardArgs = parse_args(arguments)?;
        let backend = context.backend.as_ref();

        let deck = DeckPath::today(&context.config.deck_prefix);
        let provisioner = DeckProvisioner::new(backend, context.config.deck_config_source);
        if !provisioner.ensure(&deck).await {
            return Err(Error::DeckUnavailable(deck.to_string()));
        }

        let note = NewNote::basic(deck.as_str(), args.front, args.back);
        let note_id = backend
            .add_note(&note)
            .await?
            .ok_or_else(|| Error::Backend(format!("note was not created in deck {}", deck)))?;

        let card_id = backend
            .find_cards(&format!("nid:{}", note_id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Backend(format!("note {} has no cards", note_id)))?;

        tracing::info!("Added card {} to {}", card_id, deck);
        Ok(text_result(format!("Created card with id {} in deck {}", card_id, deck)))
    }
}

/// Tool returning the head of a review queue.
pub struct CardQueueTool {
    name: &'static str,
    description: &'static str,
    query: &'static str,
}

#[derive(Debug, Deserialize)]
struct CardQueueArgs {
    num: f64,
}

#[async_trait::async_trait]
impl Tool for CardQueueTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.into(),
            description: self.description.into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "num": {
                        "type": "number",
                        "description": "Number of cards to get"
                    }
                },
                "required": ["num"]
            }),
        }
    }

    async fn execute(
        &self,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<ToolCallResult> {
        let args: CardQueueArgs = parse_args(arguments)?;
        let limit = args.num.max(0.0) as usize;

        let mut cards = search_cards(context.backend.as_ref(), self.query).await?;
        cards.truncate(limit);

        Ok(text_result(serde_json::to_string(&cards)?))
    }
}
