//! # Notion Harness CLI (`notion-harness`)
//!
//! Inspect and search a Notion workspace from the terminal, or start the
//! MCP server that exposes the same operations to AI tools.
//!
//! ## Usage
//!
//! ```bash
//! notion-harness --config ./config/notion.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `search "<query>"` | Ranked search over titles, paths and content |
//! | `tree` | Hierarchy statistics with sample paths |
//! | `top` | List top-level pages |
//! | `children <id>` | List the direct children of a page |
//! | `find "<title>"` | Look a page up by title (`--fuzzy` for substring) |
//! | `path <part>...` | Pages whose path matches the given segments |
//! | `refresh` | Force a full rebuild of the page cache |
//! | `read <id>` | Render a page as markdown |
//! | `serve stdio` | MCP server over stdin/stdout |
//! | `serve http` | REST + MCP streamable HTTP server |
//!
//! The API token is read from the environment variable named by
//! `[notion].token_env` (default `NOTION_TOKEN`); a `.env` file is honored.
//! Log verbosity is controlled by `NOTION_HARNESS_LOG`.

use anyhow::bail;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use notion_harness::config;
use notion_harness::logging::init_tracing;
use notion_harness::mcp::{self, McpBridge};
use notion_harness::models::DocumentNode;
use notion_harness::render;
use notion_harness::search::print_results;
use notion_harness::server;
use notion_harness::traits::{ToolContext, ToolRegistry};

/// Notion Harness CLI: hierarchy-aware search over a Notion workspace.
#[derive(Parser)]
#[command(
    name = "notion-harness",
    about = "Notion Harness — hierarchy-aware search over a Notion workspace for AI tools",
    version,
    long_about = "Notion Harness caches the page hierarchy of a Notion workspace, ranks pages \
    by remote full-text hits, title/path matches and page content, and exposes the result \
    through a CLI, a REST API and an MCP server (stdio or streamable HTTP)."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/notion.toml`. A missing file means all defaults.
    #[arg(long, global = true, default_value = "./config/notion.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search pages by title, path and content.
    Search {
        /// The search query string.
        query: String,

        /// Maximum number of results (defaults to `[search].default_max_results`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show hierarchy statistics and one sample path per depth.
    Tree,

    /// List top-level pages.
    Top,

    /// List the direct children of a page.
    Children {
        /// Page id.
        id: String,
    },

    /// Find a page by title.
    Find {
        /// Exact title, or a case-insensitive substring with `--fuzzy`.
        title: String,

        /// Match on substring instead of the whole title.
        #[arg(long)]
        fuzzy: bool,
    },

    /// Find pages whose path matches the given segments.
    ///
    /// Each segment matches case-insensitively as a substring of the path
    /// element at the same position.
    Path {
        /// Path segments, root first.
        #[arg(required = true)]
        parts: Vec<String>,
    },

    /// Rebuild the page cache from the Notion API.
    Refresh,

    /// Render a page as markdown.
    Read {
        /// Page id.
        id: String,
    },

    /// Start a server.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

#[derive(Subcommand)]
enum ServeService {
    /// MCP over stdin/stdout, for clients that spawn the binary.
    Stdio,

    /// REST tool API plus MCP streamable HTTP on `[server].bind`.
    Http,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;
    let ctx = ToolContext::from_config(&cfg)?;

    match cli.command {
        Commands::Search { query, limit } => {
            let limit = limit.unwrap_or(cfg.search.default_max_results);
            let results = ctx.engine().search(&query, limit).await;
            print_results(&results);
        }
        Commands::Tree => {
            let stats = ctx.cache().stats().await;
            println!("Total pages:     {}", stats.total_pages);
            println!("Top-level pages: {}", stats.top_level_pages);
            println!("Archived pages:  {}", stats.archived_pages);
            println!("Max depth:       {}", stats.max_depth);
            println!();
            println!("Pages by depth:");
            for (depth, count) in &stats.pages_by_depth {
                println!("  {:>3}: {}", depth, count);
            }
            if !stats.sample_paths.is_empty() {
                println!();
                println!("Sample paths:");
                for sample in &stats.sample_paths {
                    println!("  [{}] {} ({})", sample.depth, sample.path, sample.id);
                }
            }
        }
        Commands::Top => {
            print_nodes(&ctx.cache().top_level().await);
        }
        Commands::Children { id } => {
            if ctx.cache().get_all(false).await.get(&id).is_none() {
                bail!("page not found: {}", id);
            }
            print_nodes(&ctx.cache().children(&id).await);
        }
        Commands::Find { title, fuzzy } => match ctx.cache().find_by_title(&title, !fuzzy).await {
            Some(node) => print_nodes(std::slice::from_ref(&node)),
            None => bail!("page not found: {}", title),
        },
        Commands::Path { parts } => {
            print_nodes(&ctx.cache().find_by_path(&parts).await);
        }
        Commands::Refresh => {
            let snapshot = ctx.cache().refresh().await;
            println!("Cached {} pages.", snapshot.len());
        }
        Commands::Read { id } => {
            let text = render::read_page(ctx.gateway(), ctx.cache(), &id).await?;
            println!("{}", text);
        }
        Commands::Serve { service } => match service {
            ServeService::Stdio => {
                let bridge = McpBridge::new(ctx, Arc::new(ToolRegistry::with_builtins()));
                mcp::serve_stdio(bridge).await?;
            }
            ServeService::Http => {
                server::run_server_with_extensions(ctx, ToolRegistry::with_builtins()).await?;
            }
        },
    }

    Ok(())
}

fn print_nodes(nodes: &[DocumentNode]) {
    if nodes.is_empty() {
        println!("No pages.");
        return;
    }
    for node in nodes {
        let path = if node.path.is_empty() {
            node.title.clone()
        } else {
            node.path_display()
        };
        println!("{}  {}", node.id, path);
    }
}
