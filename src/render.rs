//! Readable text for pages and question answers.
//!
//! Blocks are rendered to lightweight markdown:
//!
//! | Block type | Rendering |
//! |------------|-----------|
//! | `paragraph` | text |
//! | `heading_1` / `heading_2` / `heading_3` | `# ` / `## ` / `### ` + text |
//! | `bulleted_list_item` | `• ` + text |
//! | `numbered_list_item` | `1. ` + text |
//! | `to_do` | `✓ ` or `☐ ` + text |
//! | `code` | fenced block tagged with the language |
//! | `quote` | `> ` + text |
//! | anything else | its rich text if it has any, else nothing |

use anyhow::{Context, Result};

use crate::gateway::SourceGateway;
use crate::hierarchy::HierarchyCache;
use crate::models::{page_url, Block};
use crate::search::SearchEngine;

/// Render one block.
pub fn format_block(block: &Block) -> String {
    let text = || block.plain_text().unwrap_or_default();

    match block.kind.as_str() {
        "paragraph" => text(),
        "heading_1" => format!("# {}", text()),
        "heading_2" => format!("## {}", text()),
        "heading_3" => format!("### {}", text()),
        "bulleted_list_item" => format!("• {}", text()),
        "numbered_list_item" => format!("1. {}", text()),
        "to_do" => {
            let mark = if block.flag("checked") { "✓" } else { "☐" };
            format!("{} {}", mark, text())
        }
        "code" => format!("```{}\n{}\n```", block.attr("language").unwrap_or(""), text()),
        "quote" => format!("> {}", text()),
        _ => text(),
    }
}

/// Non-empty rendered blocks, trimmed, one per line.
pub fn page_body(blocks: &[Block]) -> String {
    blocks
        .iter()
        .map(format_block)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Full page document: title heading, every block, source link.
pub fn render_page(title: &str, url: &str, blocks: &[Block]) -> String {
    let mut parts = vec![format!("# {}\n", title)];
    parts.extend(blocks.iter().map(format_block));
    parts.push(format!("\n\n**Source:** {}", url));
    parts.join("\n")
}

/// Fetch and render a page. The title comes from the cache when known.
pub async fn read_page(
    gateway: &dyn SourceGateway,
    cache: &HierarchyCache,
    page_id: &str,
) -> Result<String> {
    let title = match cache.get_by_id(page_id) {
        Some(node) => node.title,
        None => gateway
            .retrieve_page(page_id)
            .await
            .with_context(|| format!("Failed to retrieve page {}", page_id))?
            .display_title(),
    };

    let blocks = gateway
        .list_blocks(page_id)
        .await
        .with_context(|| format!("Failed to read blocks of page {}", page_id))?;

    Ok(render_page(&title, &page_url(page_id), &blocks))
}

/// Content of one page included in an answer.
#[derive(Debug, Clone)]
pub struct AnswerSection {
    pub title: String,
    pub url: String,
    pub body: String,
}

/// Assemble an answer from the sections of the best matching pages.
pub fn compose_answer(
    question: &str,
    sections: &[AnswerSection],
    total_matches: usize,
    max_pages: usize,
) -> String {
    if total_matches == 0 {
        return format!(
            "No relevant information found in your Notion workspace for: '{}'",
            question
        );
    }
    if sections.is_empty() {
        return format!(
            "Found {} matching pages, but couldn't retrieve readable content from them for: '{}'",
            total_matches, question
        );
    }

    let combined = sections
        .iter()
        .map(|s| format!("## From: {}\n\n{}", s.title, s.body))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    let sources = sections
        .iter()
        .map(|s| format!("- [{}]({})", s.title, s.url))
        .collect::<Vec<_>>()
        .join("\n");

    let mut out = format!(
        "Based on your Notion workspace, here's what I found regarding: **{}**\n\n{}\n\n## Sources\n\n{}",
        question, combined, sources
    );

    if total_matches > max_pages {
        out.push_str(&format!(
            "\n\n*Note: Found {} total matching pages. Showing detailed content from the top {} most relevant pages. {} additional pages also matched your query.*",
            total_matches,
            max_pages,
            total_matches - max_pages
        ));
    }

    out
}

/// Answer a question from the top search results' page content.
pub async fn ask(
    engine: &SearchEngine,
    gateway: &dyn SourceGateway,
    question: &str,
    max_pages: usize,
) -> String {
    let limit = engine.settings().api_hit_cap.max(max_pages);
    let results = engine.search(question, limit).await;

    let mut sections = Vec::new();
    for result in results.iter().take(max_pages) {
        match gateway.list_blocks(&result.node.id).await {
            Ok(blocks) => {
                let body = page_body(&blocks);
                if !body.is_empty() {
                    sections.push(AnswerSection {
                        title: result.node.title.clone(),
                        url: result.node.url.clone(),
                        body,
                    });
                }
            }
            Err(e) => {
                tracing::warn!(page_id = %result.node.id, error = %e, "skipping page in answer");
            }
        }
    }

    compose_answer(question, &sections, results.len(), max_pages)
}
