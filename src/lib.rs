//! # Notion Harness
//!
//! Hierarchy-aware search over a Notion workspace, exposed to AI tools over
//! MCP (stdio or streamable HTTP) and a small REST API.
//!
//! The core is two components:
//!
//! * the **page hierarchy cache**, which turns the flat, paginated record
//!   list of the Notion search API into a tree with root-relative paths,
//!   prunes orphans, and persists a time-boxed snapshot;
//! * the **relevance search engine**, which merges remote full-text hits,
//!   cached title/path matches, and deep content matches into one ranked
//!   list.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────┐   ┌──────────────┐
//! │ Notion API   │──▶│ HierarchyCache  │──▶│ SearchEngine │
//! │ (gateway)    │   │ snapshot + disk │   │ A · B · C    │
//! └──────┬───────┘   └────────┬────────┘   └──────┬───────┘
//!        │                    ▼                   │
//!        │            ┌──────────────┐            │
//!        └───────────▶│ ToolRegistry │◀───────────┘
//!                     └──────┬───────┘
//!                ┌───────────┼───────────┐
//!                ▼           ▼           ▼
//!            ┌──────┐   ┌─────────┐  ┌─────────┐
//!            │ CLI  │   │ REST    │  │ MCP     │
//!            └──────┘   └─────────┘  └─────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Wire records, document nodes, search results |
//! | [`gateway`] | Notion API access and the in-memory test double |
//! | [`hierarchy`] | Hierarchy build, snapshot persistence, cache |
//! | [`scoring`] | Tokenization and relevance functions |
//! | [`search`] | Multi-strategy search and merge |
//! | [`render`] | Block rendering, page reads, question answers |
//! | [`traits`] | Tool trait, context, built-in tools |
//! | [`mcp`] | MCP protocol bridge |
//! | [`server`] | REST + MCP HTTP server |
//! | [`logging`] | Tracing setup |

pub mod config;
pub mod gateway;
pub mod hierarchy;
pub mod logging;
pub mod mcp;
pub mod models;
pub mod render;
pub mod scoring;
pub mod search;
pub mod server;
pub mod traits;
