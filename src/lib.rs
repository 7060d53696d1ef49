//! # anki-mcp
//!
//! MCP (Model Context Protocol) server exposing Anki flashcards to AI
//! assistants through the AnkiConnect add-on.
//!
//! ## Features
//!
//! - **MCP-compliant**: Implements JSON-RPC 2.0 over stdio (standard MCP transport)
//! - **Card search resources**: current deck, due cards and new cards as JSON
//! - **Review tools**: quiz the user and record their answers
//! - **Inbox decks**: new cards land in a per-day deck created on demand
//! - **Clean transport**: backend noise never reaches the protocol stream
//!
//! ## Resources
//!
//! - `anki://search/deckcurrent`: cards in the current deck
//! - `anki://search/isdue`: cards due for review
//! - `anki://search/isnew`: unseen cards
//!
//! Any other last segment is passed to Anki as a search query, so
//! `anki://search/nid:1234` works too.
//!
//! ## Available Tools
//!
//! - `update_cards`: Record answers (`cardId`, `ease`) for reviewed cards
//! - `add_card`: Create a Basic card in `PREFIX::YYYY::MM::DD`
//! - `get_due_cards`: The first `num` due cards, earliest first
//! - `get_new_cards`: The first `num` new cards
//!
//! ## Usage with Claude Desktop
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "anki": {
//!       "command": "anki-mcp",
//!       "env": { "ANKI_MCP_DECK_PREFIX": "00_Inbox" }
//!     }
//!   }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod anki;
pub mod config;
pub mod deck;
pub mod error;
pub mod guard;
pub mod normalize;
pub mod protocol;
pub mod query;
pub mod resources;
pub mod server;
pub mod tools;

#[cfg(test)]
mod testing;

pub use anki::{AnkiBackend, AnkiConnectClient};
pub use config::Config;
pub use error::{Error, Result};
pub use protocol::{JsonRpcRequest, JsonRpcResponse, McpMessage};
pub use server::McpServer;
pub use tools::{Tool, ToolRegistry};
