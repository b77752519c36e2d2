//! Core data models used throughout Notion Harness.
//!
//! Two families of types live here: the raw wire records returned by the
//! Notion API (deserialized leniently, one record at a time) and the
//! normalized [`DocumentNode`] / [`SearchResult`] types that flow through the
//! hierarchy cache and the search engine.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Title used for records without a usable title.
pub const UNTITLED: &str = "Untitled";

// ============ Raw wire records ============

/// One run of Notion rich text. Only the plain-text rendering is kept.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,
}

/// Concatenate rich-text runs without separators.
pub fn join_rich_text(runs: &[RichText]) -> String {
    runs.iter().map(|rt| rt.plain_text.as_str()).collect()
}

/// A page property. Only `title` properties are of interest.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawProperty {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: Option<Vec<RichText>>,
}

/// Parent descriptor of a raw record.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawParent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub page_id: Option<String>,
    #[serde(default)]
    pub database_id: Option<String>,
}

/// A page or database record as returned by `POST /v1/search`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawRecord {
    pub id: String,
    #[serde(default = "default_object")]
    pub object: String,
    /// Root-level title, present on databases.
    #[serde(default)]
    pub title: Option<Vec<RichText>>,
    /// Page properties in document order.
    #[serde(default)]
    pub properties: Option<IndexMap<String, RawProperty>>,
    #[serde(default)]
    pub parent: Option<RawParent>,
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub last_edited_time: String,
    #[serde(default)]
    pub archived: bool,
}

fn default_object() -> String {
    "page".to_string()
}

impl RawRecord {
    /// Title from the first property whose declared type is `title`.
    pub fn property_title(&self) -> Option<String> {
        let props = self.properties.as_ref()?;
        props
            .values()
            .find(|p| p.kind == "title" && p.title.as_ref().is_some_and(|t| !t.is_empty()))
            .and_then(|p| p.title.as_deref())
            .map(|runs| normalize_title(&join_rich_text(runs)))
    }

    /// Title following the record-kind priority: database root title, then
    /// page title property, then [`UNTITLED`].
    pub fn display_title(&self) -> String {
        if self.object == "database" {
            if let Some(runs) = self.title.as_deref().filter(|t| !t.is_empty()) {
                return normalize_title(&join_rich_text(runs));
            }
        }
        self.property_title().unwrap_or_else(|| UNTITLED.to_string())
    }
}

fn normalize_title(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

/// A content block as returned by `GET /v1/blocks/{id}/children`.
///
/// The payload lives under a key named after the block type, e.g.
/// `{"type": "paragraph", "paragraph": {"rich_text": [...]}}`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Block {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, Value>,
}

impl Block {
    /// Build a block carrying a single rich-text run (used by tests and fixtures).
    pub fn text(kind: &str, text: &str) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert(
            kind.to_string(),
            serde_json::json!({ "rich_text": [{ "plain_text": text }] }),
        );
        Self {
            kind: kind.to_string(),
            fields,
        }
    }

    /// The type-keyed payload object, if present.
    pub fn payload(&self) -> Option<&serde_json::Map<String, Value>> {
        self.fields.get(&self.kind).and_then(Value::as_object)
    }

    /// The payload's rich-text runs, or `None` when the block has no
    /// `rich_text` field.
    pub fn rich_text(&self) -> Option<Vec<RichText>> {
        let value = self.payload()?.get("rich_text")?;
        Some(serde_json::from_value(value.clone()).unwrap_or_default())
    }

    pub fn plain_text(&self) -> Option<String> {
        self.rich_text().map(|runs| join_rich_text(&runs))
    }

    /// Boolean payload flag such as `to_do.checked`.
    pub fn flag(&self, name: &str) -> bool {
        self.payload()
            .and_then(|p| p.get(name))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// String payload attribute such as `code.language`.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.payload().and_then(|p| p.get(name)).and_then(Value::as_str)
    }
}

// ============ Normalized nodes ============

/// Kind of object a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Page,
    Database,
}

impl ObjectKind {
    pub fn from_wire(object: &str) -> Self {
        match object {
            "database" => ObjectKind::Database,
            _ => ObjectKind::Page,
        }
    }

    /// Filter value used by the search endpoint.
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Page => "page",
            ObjectKind::Database => "database",
        }
    }
}

/// Kind of a node's parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParentKind {
    Workspace,
    Page,
    Database,
    /// Synthesized for remote hits that are not in the cache.
    Unknown,
}

/// One page or database with its place in the hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentNode {
    pub id: String,
    pub title: String,
    pub url: String,
    pub parent_type: ParentKind,
    pub parent_id: Option<String>,
    pub object_type: ObjectKind,
    pub created_time: String,
    pub last_edited_time: String,
    pub archived: bool,
    pub children: Vec<String>,
    pub path: Vec<String>,
    pub depth: usize,
}

impl DocumentNode {
    pub fn is_root(&self) -> bool {
        self.parent_type == ParentKind::Workspace
    }

    /// Path rendered as `A > B > C`.
    pub fn path_display(&self) -> String {
        self.path.join(" > ")
    }
}

/// Browser URL for a page id.
pub fn page_url(id: &str) -> String {
    format!("https://www.notion.so/{}", id.replace('-', ""))
}

// ============ Search results ============

/// One ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub node: DocumentNode,
    /// Relevance score, normally in `[0.0, 1.0]`.
    pub score: f64,
    pub reasons: Vec<String>,
    pub preview: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn database_title_comes_from_root_field() {
        let rec: RawRecord = serde_json::from_value(json!({
            "id": "db-1",
            "object": "database",
            "title": [{"plain_text": "Task "}, {"plain_text": "Tracker "}],
            "properties": {
                "Name": {"type": "title", "title": []}
            }
        }))
        .unwrap();
        assert_eq!(rec.display_title(), "Task Tracker");
    }

    #[test]
    fn page_title_uses_first_title_property() {
        let rec: RawRecord = serde_json::from_value(json!({
            "id": "p-1",
            "object": "page",
            "properties": {
                "Status": {"type": "select", "select": {"name": "Done"}},
                "Name": {"type": "title", "title": [{"plain_text": "Roadmap"}]}
            }
        }))
        .unwrap();
        assert_eq!(rec.display_title(), "Roadmap");
    }

    #[test]
    fn blank_title_becomes_untitled() {
        let rec: RawRecord = serde_json::from_value(json!({
            "id": "p-2",
            "properties": {"title": {"type": "title", "title": [{"plain_text": "   "}]}}
        }))
        .unwrap();
        assert_eq!(rec.display_title(), UNTITLED);

        let bare: RawRecord = serde_json::from_value(json!({"id": "p-3"})).unwrap();
        assert_eq!(bare.display_title(), UNTITLED);
        assert_eq!(bare.object, "page");
    }

    #[test]
    fn block_payload_accessors() {
        let block: Block = serde_json::from_value(json!({
            "type": "to_do",
            "to_do": {"rich_text": [{"plain_text": "ship it"}], "checked": true}
        }))
        .unwrap();
        assert_eq!(block.plain_text().as_deref(), Some("ship it"));
        assert!(block.flag("checked"));

        let divider: Block = serde_json::from_value(json!({"type": "divider", "divider": {}})).unwrap();
        assert!(divider.rich_text().is_none());
    }

    #[test]
    fn url_strips_dashes() {
        assert_eq!(page_url("ab-cd-ef"), "https://www.notion.so/abcdef");
    }
}
