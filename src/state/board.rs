use std::time::SystemTime;

use serde::{Deserialize, Deserializer, de::Error as _};
use serde_with::{DefaultOnError, DeserializeAs, serde_as};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::{
    FactionStatsEntity, MovableFactionEntity, MoveProposalEntity, TokenEntity,
};

/// Identifier of a placed token.
pub type TokenId = i64;
/// Identifier of a move proposal.
pub type ProposalId = i64;

/// Color applied to tokens placed without one.
pub const DEFAULT_TOKEN_COLOR: &str = "#ff0000";
/// Magic label applied to faction stats created without one.
pub const DEFAULT_MAGIC_STAT: &str = "None";

/// Map marker placed by the game master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Unique identifier assigned on placement.
    pub id: TokenId,
    /// Horizontal map coordinate.
    pub x: i64,
    /// Vertical map coordinate.
    pub y: i64,
    /// Display name.
    pub name: String,
    /// Faction the token belongs to, empty when unaffiliated.
    pub faction: String,
    /// Legacy hit points, kept alongside `current_hp`/`max_hp`.
    pub hp: i64,
    /// Maximum hit points.
    pub max_hp: i64,
    /// Remaining hit points.
    pub current_hp: i64,
    /// Attack notation (free form, e.g. `2d6+1`).
    pub attack: String,
    /// Counterattack notation (free form).
    pub counterattack: String,
    /// Special abilities.
    pub special: String,
    /// Game master notes.
    pub notes: String,
    /// Hex color.
    pub color: String,
    /// Session that placed the token.
    pub owner: Option<Uuid>,
    /// Whether player sessions may see the token.
    pub visible_to_players: bool,
    /// Placement timestamp.
    pub created_at: SystemTime,
}

/// Summary stats tracked per faction, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactionStats {
    /// Surrogate identifier.
    pub id: i64,
    /// Natural key.
    pub faction_name: String,
    /// Remaining faction hit points.
    pub current_hp: i64,
    /// Maximum faction hit points.
    pub max_hp: i64,
    /// Force rating.
    pub force_stat: i64,
    /// Wealth rating.
    pub wealth_stat: i64,
    /// Cunning rating.
    pub cunning_stat: i64,
    /// Treasure rating.
    pub treasure_stat: i64,
    /// Magic level label.
    pub magic_stat: String,
    /// Whether player sessions may see the record.
    pub is_visible: bool,
}

/// Player-submitted relocation awaiting a game master decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveProposal {
    /// Identifier assigned on creation.
    pub id: ProposalId,
    /// Token the proposal would move.
    pub token_id: TokenId,
    /// Token position when the proposal was made.
    pub original_x: i64,
    /// Token position when the proposal was made.
    pub original_y: i64,
    /// Target position, updated while the player drags.
    pub proposed_x: i64,
    /// Target position, updated while the player drags.
    pub proposed_y: i64,
    /// Session that submitted the proposal.
    pub proposed_by: Option<Uuid>,
}

/// Whether players may propose moves for a faction's tokens.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
pub struct MovableFaction {
    /// Faction name.
    pub faction_name: String,
    /// Whether proposals are allowed for the faction.
    #[serde(default)]
    pub is_movable: bool,
}

/// Rounds incoming coordinates to the integer grid; drag handlers send fractions.
pub struct Rounded;

impl<'de> DeserializeAs<'de, i64> for Rounded {
    fn deserialize_as<D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        if !value.is_finite() {
            return Err(D::Error::custom("coordinate must be a finite number"));
        }
        Ok(value.round() as i64)
    }
}

/// Fields accepted when placing a token. Every field is optional and malformed
/// values decode as absent, so placement never fails validation.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TokenDraft {
    /// Column; defaults to 0.
    #[serde_as(as = "DefaultOnError<Option<Rounded>>")]
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub x: Option<i64>,
    /// Row; defaults to 0.
    #[serde_as(as = "DefaultOnError<Option<Rounded>>")]
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub y: Option<i64>,
    /// Defaults to `Token <id>`.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub name: Option<String>,
    /// Owning faction.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub faction: Option<String>,
    /// Legacy hit points, also the fallback for the other two.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub hp: Option<i64>,
    /// Maximum hit points.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub max_hp: Option<i64>,
    /// Current hit points.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub current_hp: Option<i64>,
    /// Attack notes.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub attack: Option<String>,
    /// Counterattack notes.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub counterattack: Option<String>,
    /// Special ability notes.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub special: Option<String>,
    /// DM notes.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub notes: Option<String>,
    /// CSS color; defaults to red.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub color: Option<String>,
    /// Defaults to visible.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub visible_to_players: Option<bool>,
}

/// Partial token update; absent fields keep their current value.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TokenPatch {
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError<Option<Rounded>>")]
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub x: Option<i64>,
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError<Option<Rounded>>")]
    #[serde(default)]
    #[schema(value_type = Option<i64>)]
    pub y: Option<i64>,
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub name: Option<String>,
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub faction: Option<String>,
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub hp: Option<i64>,
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub max_hp: Option<i64>,
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub current_hp: Option<i64>,
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub attack: Option<String>,
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub counterattack: Option<String>,
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub special: Option<String>,
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub notes: Option<String>,
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub color: Option<String>,
    /// Replaces the stored value when present.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub visible_to_players: Option<bool>,
}

/// Faction stats upsert keyed on `faction_name`; absent stats keep their
/// current value, or take the documented default on creation.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize, ToSchema, validator::Validate)]
pub struct FactionStatsPatch {
    /// Key of the row to create or update.
    #[validate(length(min = 1, message = "faction_name must not be empty"))]
    pub faction_name: String,
    /// Current hit points.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub current_hp: Option<i64>,
    /// Maximum hit points.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub max_hp: Option<i64>,
    /// Force rating.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub force_stat: Option<i64>,
    /// Wealth rating.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub wealth_stat: Option<i64>,
    /// Cunning rating.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub cunning_stat: Option<i64>,
    /// Accumulated treasure.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub treasure_stat: Option<i64>,
    /// Magic level label.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub magic_stat: Option<String>,
    /// Defaults to hidden on creation.
    #[serde_as(as = "DefaultOnError")]
    #[serde(default)]
    pub is_visible: Option<bool>,
}

/// Coordinates of a new move proposal.
#[serde_as]
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MoveProposalDraft {
    /// Token to move.
    pub token_id: TokenId,
    /// Column at proposal time.
    #[serde_as(as = "Rounded")]
    #[schema(value_type = i64)]
    pub original_x: i64,
    /// Row at proposal time.
    #[serde_as(as = "Rounded")]
    #[schema(value_type = i64)]
    pub original_y: i64,
    /// Target column.
    #[serde_as(as = "Rounded")]
    #[schema(value_type = i64)]
    pub proposed_x: i64,
    /// Target row.
    #[serde_as(as = "Rounded")]
    #[schema(value_type = i64)]
    pub proposed_y: i64,
}

impl Token {
    /// Build a token from a placement draft, filling every documented default.
    pub fn from_draft(id: TokenId, draft: TokenDraft, owner: Option<Uuid>) -> Self {
        let hp = draft.hp.unwrap_or(0);
        Self {
            id,
            x: draft.x.unwrap_or(0),
            y: draft.y.unwrap_or(0),
            name: draft
                .name
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| format!("Token {id}")),
            faction: draft.faction.unwrap_or_default(),
            hp,
            max_hp: draft.max_hp.unwrap_or(hp),
            current_hp: draft.current_hp.unwrap_or(hp),
            attack: draft.attack.unwrap_or_default(),
            counterattack: draft.counterattack.unwrap_or_default(),
            special: draft.special.unwrap_or_default(),
            notes: draft.notes.unwrap_or_default(),
            color: draft
                .color
                .filter(|color| is_hex_color(color))
                .unwrap_or_else(|| DEFAULT_TOKEN_COLOR.to_string()),
            owner,
            visible_to_players: draft.visible_to_players.unwrap_or(true),
            created_at: SystemTime::now(),
        }
    }

    /// Merge a partial update over the token.
    pub fn apply_patch(&mut self, patch: TokenPatch) {
        let TokenPatch {
            x,
            y,
            name,
            faction,
            hp,
            max_hp,
            current_hp,
            attack,
            counterattack,
            special,
            notes,
            color,
            visible_to_players,
        } = patch;

        merge(&mut self.x, x);
        merge(&mut self.y, y);
        merge(&mut self.name, name);
        merge(&mut self.faction, faction);
        merge(&mut self.hp, hp);
        merge(&mut self.max_hp, max_hp);
        merge(&mut self.current_hp, current_hp);
        merge(&mut self.attack, attack);
        merge(&mut self.counterattack, counterattack);
        merge(&mut self.special, special);
        merge(&mut self.notes, notes);
        merge(&mut self.color, color.filter(|color| is_hex_color(color)));
        merge(&mut self.visible_to_players, visible_to_players);
    }
}

impl FactionStats {
    /// Create a new record from an upsert payload.
    pub fn from_patch(id: i64, patch: FactionStatsPatch) -> Self {
        Self {
            id,
            faction_name: patch.faction_name,
            current_hp: patch.current_hp.unwrap_or(0),
            max_hp: patch.max_hp.unwrap_or(0),
            force_stat: patch.force_stat.unwrap_or(0),
            wealth_stat: patch.wealth_stat.unwrap_or(0),
            cunning_stat: patch.cunning_stat.unwrap_or(0),
            treasure_stat: patch.treasure_stat.unwrap_or(0),
            magic_stat: patch
                .magic_stat
                .unwrap_or_else(|| DEFAULT_MAGIC_STAT.to_string()),
            is_visible: patch.is_visible.unwrap_or(false),
        }
    }

    /// Merge an upsert payload over an existing record. The name never changes.
    pub fn apply_patch(&mut self, patch: FactionStatsPatch) {
        merge(&mut self.current_hp, patch.current_hp);
        merge(&mut self.max_hp, patch.max_hp);
        merge(&mut self.force_stat, patch.force_stat);
        merge(&mut self.wealth_stat, patch.wealth_stat);
        merge(&mut self.cunning_stat, patch.cunning_stat);
        merge(&mut self.treasure_stat, patch.treasure_stat);
        merge(&mut self.magic_stat, patch.magic_stat);
        merge(&mut self.is_visible, patch.is_visible);
    }
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

/// `#rgb` or `#rrggbb`.
fn is_hex_color(value: &str) -> bool {
    value
        .strip_prefix('#')
        .is_some_and(|hex| matches!(hex.len(), 3 | 6) && hex.chars().all(|c| c.is_ascii_hexdigit()))
}

impl From<TokenEntity> for Token {
    fn from(value: TokenEntity) -> Self {
        Self {
            id: value.id,
            x: value.x,
            y: value.y,
            name: value.name,
            faction: value.faction,
            hp: value.hp,
            max_hp: value.max_hp,
            current_hp: value.current_hp,
            attack: value.attack,
            counterattack: value.counterattack,
            special: value.special,
            notes: value.notes,
            color: value.color,
            owner: value.owner,
            visible_to_players: value.visible_to_players,
            created_at: value.created_at,
        }
    }
}

impl From<Token> for TokenEntity {
    fn from(value: Token) -> Self {
        Self {
            id: value.id,
            x: value.x,
            y: value.y,
            name: value.name,
            faction: value.faction,
            hp: value.hp,
            max_hp: value.max_hp,
            current_hp: value.current_hp,
            attack: value.attack,
            counterattack: value.counterattack,
            special: value.special,
            notes: value.notes,
            color: value.color,
            owner: value.owner,
            visible_to_players: value.visible_to_players,
            created_at: value.created_at,
        }
    }
}

impl From<FactionStatsEntity> for FactionStats {
    fn from(value: FactionStatsEntity) -> Self {
        Self {
            id: value.id,
            faction_name: value.faction_name,
            current_hp: value.current_hp,
            max_hp: value.max_hp,
            force_stat: value.force_stat,
            wealth_stat: value.wealth_stat,
            cunning_stat: value.cunning_stat,
            treasure_stat: value.treasure_stat,
            magic_stat: value.magic_stat,
            is_visible: value.is_visible,
        }
    }
}

impl From<FactionStats> for FactionStatsEntity {
    fn from(value: FactionStats) -> Self {
        Self {
            id: value.id,
            faction_name: value.faction_name,
            current_hp: value.current_hp,
            max_hp: value.max_hp,
            force_stat: value.force_stat,
            wealth_stat: value.wealth_stat,
            cunning_stat: value.cunning_stat,
            treasure_stat: value.treasure_stat,
            magic_stat: value.magic_stat,
            is_visible: value.is_visible,
        }
    }
}

impl From<MoveProposalEntity> for MoveProposal {
    fn from(value: MoveProposalEntity) -> Self {
        Self {
            id: value.id,
            token_id: value.token_id,
            original_x: value.original_x,
            original_y: value.original_y,
            proposed_x: value.proposed_x,
            proposed_y: value.proposed_y,
            proposed_by: value.proposed_by,
        }
    }
}

impl From<MoveProposal> for MoveProposalEntity {
    fn from(value: MoveProposal) -> Self {
        Self {
            id: value.id,
            token_id: value.token_id,
            original_x: value.original_x,
            original_y: value.original_y,
            proposed_x: value.proposed_x,
            proposed_y: value.proposed_y,
            proposed_by: value.proposed_by,
        }
    }
}

impl From<MovableFactionEntity> for MovableFaction {
    fn from(value: MovableFactionEntity) -> Self {
        Self {
            faction_name: value.faction_name,
            is_movable: value.is_movable,
        }
    }
}

impl From<MovableFaction> for MovableFactionEntity {
    fn from(value: MovableFaction) -> Self {
        Self {
            faction_name: value.faction_name,
            is_movable: value.is_movable,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn placement_defaults_fill_every_field() {
        let token = Token::from_draft(7, TokenDraft::default(), None);
        assert_eq!(token.name, "Token 7");
        assert_eq!((token.x, token.y), (0, 0));
        assert_eq!((token.hp, token.current_hp, token.max_hp), (0, 0, 0));
        assert_eq!(token.color, DEFAULT_TOKEN_COLOR);
        assert!(token.visible_to_players);
    }

    #[test]
    fn hp_split_falls_back_to_legacy_value() {
        let draft = TokenDraft {
            hp: Some(12),
            max_hp: Some(20),
            ..TokenDraft::default()
        };
        let token = Token::from_draft(1, draft, None);
        assert_eq!(token.hp, 12);
        assert_eq!(token.max_hp, 20);
        assert_eq!(token.current_hp, 12);
    }

    #[test]
    fn malformed_optional_fields_decode_as_absent() {
        let draft: TokenDraft = serde_json::from_value(json!({
            "x": 10.6,
            "y": "up",
            "hp": "lots",
            "name": 42,
            "color": "red",
            "visible_to_players": "maybe"
        }))
        .unwrap();
        assert_eq!(draft.x, Some(11));
        assert_eq!(draft.y, None);
        assert_eq!(draft.hp, None);
        assert_eq!(draft.name, None);
        assert_eq!(draft.visible_to_players, None);

        let token = Token::from_draft(3, draft, None);
        assert_eq!(token.color, DEFAULT_TOKEN_COLOR);
        assert!(token.visible_to_players);
    }

    #[test]
    fn patch_preserves_absent_fields() {
        let mut token = Token::from_draft(
            1,
            TokenDraft {
                name: Some("Orc".into()),
                attack: Some("1d8".into()),
                ..TokenDraft::default()
            },
            None,
        );
        token.apply_patch(TokenPatch {
            current_hp: Some(4),
            visible_to_players: Some(false),
            ..TokenPatch::default()
        });
        assert_eq!(token.name, "Orc");
        assert_eq!(token.attack, "1d8");
        assert_eq!(token.current_hp, 4);
        assert!(!token.visible_to_players);
    }

    #[test]
    fn faction_defaults_are_hidden() {
        let stats = FactionStats::from_patch(
            1,
            FactionStatsPatch {
                faction_name: "Crows".into(),
                ..FactionStatsPatch::default()
            },
        );
        assert!(!stats.is_visible);
        assert_eq!(stats.magic_stat, DEFAULT_MAGIC_STAT);
        assert_eq!(stats.force_stat, 0);
    }

    #[test]
    fn hex_colors() {
        assert!(is_hex_color("#abc"));
        assert!(is_hex_color("#A0b1C2"));
        assert!(!is_hex_color("abc"));
        assert!(!is_hex_color("#abcd"));
        assert!(!is_hex_color("#ggg"));
    }
}
