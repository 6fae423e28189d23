use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dao::models::MovableFactionEntity;

pub const TOKEN_PREFIX: &str = "token::";
pub const FACTION_PREFIX: &str = "faction::";
/// Proposals are keyed by token id, so the id itself enforces one row per token.
pub const PROPOSAL_PREFIX: &str = "proposal::";
pub const MOVABLE_FACTIONS_DOC_ID: &str = "movable_factions";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub value: Option<RowValue>,
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct RowValue {
    pub rev: String,
}

/// Tombstone entry for `_bulk_docs`.
#[derive(Debug, Serialize)]
pub struct DeletedDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev")]
    pub rev: String,
    #[serde(rename = "_deleted")]
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkDocsRequest {
    pub docs: Vec<DeletedDocument>,
}

/// Any entity wrapped with CouchDB's identity fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchDocument<T> {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub body: T,
}

impl<T> CouchDocument<T> {
    pub fn new(id: String, body: T) -> Self {
        Self { id, rev: None, body }
    }
}

/// Revision-only view used before deletes and overwrites.
#[derive(Debug, Deserialize)]
pub struct RevisionOnly {
    #[serde(rename = "_rev")]
    pub rev: String,
}

/// Body of the single movable factions document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovableFactionsBody {
    pub factions: Vec<MovableFactionEntity>,
}

pub fn token_doc_id(id: i64) -> String {
    format!("{TOKEN_PREFIX}{id}")
}

pub fn faction_doc_id(name: &str) -> String {
    format!("{FACTION_PREFIX}{name}")
}

pub fn proposal_doc_id(token_id: i64) -> String {
    format!("{PROPOSAL_PREFIX}{token_id}")
}

/// Logical collection a document path belongs to, for error reporting.
pub fn collection_of(path: &str) -> &'static str {
    if path.starts_with(TOKEN_PREFIX) {
        "tokens"
    } else if path.starts_with(FACTION_PREFIX) {
        "faction_stats"
    } else if path.starts_with(PROPOSAL_PREFIX) {
        "move_proposals"
    } else if path.starts_with(MOVABLE_FACTIONS_DOC_ID) {
        "movable_factions"
    } else {
        "unknown"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_ids_map_back_to_collections() {
        assert_eq!(collection_of(&token_doc_id(4)), "tokens");
        assert_eq!(collection_of(&faction_doc_id("Crows")), "faction_stats");
        assert_eq!(collection_of(&proposal_doc_id(4)), "move_proposals");
        assert_eq!(collection_of(MOVABLE_FACTIONS_DOC_ID), "movable_factions");
        assert_eq!(collection_of("_all_docs"), "unknown");
    }
}
