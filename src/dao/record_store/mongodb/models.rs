use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{MovableFactionEntity, TokenEntity};

/// Identifier of the single movable factions document.
pub const MOVABLE_FACTIONS_DOC_ID: &str = "movable_factions";

/// Token row; the timestamp is stored as a native BSON date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTokenDocument {
    id: i64,
    x: i64,
    y: i64,
    name: String,
    #[serde(default)]
    faction: String,
    #[serde(default)]
    hp: i64,
    #[serde(default)]
    max_hp: i64,
    #[serde(default)]
    current_hp: i64,
    #[serde(default)]
    attack: String,
    #[serde(default)]
    counterattack: String,
    #[serde(default)]
    special: String,
    #[serde(default)]
    notes: String,
    color: String,
    owner: Option<Uuid>,
    #[serde(default = "visible_by_default")]
    visible_to_players: bool,
    created_at: DateTime,
}

fn visible_by_default() -> bool {
    true
}

impl From<TokenEntity> for MongoTokenDocument {
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
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl From<MongoTokenDocument> for TokenEntity {
    fn from(value: MongoTokenDocument) -> Self {
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
            created_at: value.created_at.to_system_time(),
        }
    }
}

/// The whole movable factions configuration, stored as one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMovableFactionsDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub factions: Vec<MovableFactionEntity>,
}
