use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Map token as mirrored in the `tokens` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenEntity {
    /// Repository-assigned identifier, never reused.
    pub id: i64,
    /// Column.
    pub x: i64,
    /// Row.
    pub y: i64,
    /// Display name.
    pub name: String,
    /// Owning faction name (may be empty).
    pub faction: String,
    /// Legacy single hit point value kept for schema compatibility.
    pub hp: i64,
    /// Maximum hit points.
    pub max_hp: i64,
    /// Current hit points.
    pub current_hp: i64,
    /// Attack notes.
    pub attack: String,
    /// Counterattack notes.
    pub counterattack: String,
    /// Special ability notes.
    pub special: String,
    /// DM notes.
    pub notes: String,
    /// Hex color string (e.g. `#ff0000`).
    pub color: String,
    /// Session that placed the token.
    pub owner: Option<Uuid>,
    /// Whether players receive the token.
    pub visible_to_players: bool,
    /// Placement time.
    pub created_at: SystemTime,
}

/// Faction summary stats as mirrored in the `faction_stats` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FactionStatsEntity {
    /// Repository-assigned identifier.
    pub id: i64,
    /// Natural key of the record.
    pub faction_name: String,
    /// Current hit points.
    pub current_hp: i64,
    /// Maximum hit points.
    pub max_hp: i64,
    /// Force rating.
    pub force_stat: i64,
    /// Wealth rating.
    pub wealth_stat: i64,
    /// Cunning rating.
    pub cunning_stat: i64,
    /// Accumulated treasure.
    pub treasure_stat: i64,
    /// Magic level label (e.g. `None`, `Low`).
    pub magic_stat: String,
    /// Whether players receive the row.
    pub is_visible: bool,
}

/// Pending move proposal as mirrored in the `move_proposals` collection.
///
/// Backends keep at most one row per `token_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MoveProposalEntity {
    /// Repository-assigned identifier.
    pub id: i64,
    /// Token the proposal moves.
    pub token_id: i64,
    /// Column at proposal time.
    pub original_x: i64,
    /// Row at proposal time.
    pub original_y: i64,
    /// Target column.
    pub proposed_x: i64,
    /// Target row.
    pub proposed_y: i64,
    /// Proposing session.
    pub proposed_by: Option<Uuid>,
}

/// One row of the movable factions configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MovableFactionEntity {
    /// Faction name.
    pub faction_name: String,
    /// Whether players may move its tokens.
    pub is_movable: bool,
}

/// Everything the record store holds, loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredBoard {
    /// Stored tokens.
    pub tokens: Vec<TokenEntity>,
    /// Stored faction stats.
    pub faction_stats: Vec<FactionStatsEntity>,
    /// Stored proposals.
    pub move_proposals: Vec<MoveProposalEntity>,
    /// Stored movable factions list.
    pub movable_factions: Vec<MovableFactionEntity>,
}
