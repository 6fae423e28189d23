use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::serde_as;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_system_time,
    state::{
        board::{
            FactionStats, FactionStatsPatch, MovableFaction, MoveProposal, MoveProposalDraft,
            ProposalId, Rounded, Token, TokenDraft, TokenId, TokenPatch,
        },
        session::Role,
    },
};

/// Failure to decode an inbound frame.
#[derive(Debug, Error)]
pub enum InboundError {
    /// The frame is not a JSON object.
    #[error("message must be a JSON object with an `event` field")]
    NotAnObject,
    /// Unknown event name or payload that does not match it.
    #[error("invalid message: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Actions accepted from clients, framed as `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientAction {
    /// Prove a role; the only action open to unauthenticated sessions.
    #[serde(rename = "authenticate")]
    Authenticate(AuthenticatePayload),
    /// Switch the working role within what was granted.
    #[serde(rename = "set_role")]
    SetRole(SetRolePayload),
    /// Ask for a fresh filtered snapshot.
    #[serde(rename = "request_tokens")]
    RequestTokens {},
    /// DM only.
    #[serde(rename = "token:place")]
    PlaceToken(TokenDraft),
    /// Absolute move of an existing token.
    #[serde(rename = "token:move")]
    MoveToken(MoveTokenPayload),
    /// DM only; fields absent from the payload keep their value.
    #[serde(rename = "token:update")]
    UpdateToken(UpdateTokenPayload),
    /// DM only.
    #[serde(rename = "token:remove")]
    RemoveToken(TokenRef),
    /// DM only; creates the faction on first use.
    #[serde(rename = "faction_stats:update")]
    UpdateFactionStats(FactionStatsPatch),
    /// DM only.
    #[serde(rename = "faction_stats:delete")]
    DeleteFactionStats(FactionNamePayload),
    /// Replaces any live proposal for the same token.
    #[serde(rename = "move_proposal:create")]
    CreateMoveProposal(MoveProposalDraft),
    /// Retarget the live proposal of a token.
    #[serde(rename = "move_proposal:update")]
    UpdateMoveProposal(UpdateMoveProposalPayload),
    /// DM only; applies the proposed position.
    #[serde(rename = "move_proposal:approve")]
    ApproveMoveProposal(ProposalRef),
    /// DM only; the token stays put.
    #[serde(rename = "move_proposal:reject")]
    RejectMoveProposal(ProposalRef),
    /// Withdraw a proposal.
    #[serde(rename = "move_proposal:cancel")]
    CancelMoveProposal(ProposalRef),
    /// DM only.
    #[serde(rename = "move_proposals:clear_all")]
    ClearMoveProposals {},
    /// DM only; replaces the whole list.
    #[serde(rename = "movable_factions:update")]
    UpdateMovableFactions(Vec<MovableFaction>),
}

impl ClientAction {
    /// Decode a text frame. A missing or `null` `data` field reads as `{}`.
    pub fn from_json_str(text: &str) -> Result<Self, InboundError> {
        let mut value: Value = serde_json::from_str(text)?;
        let object = value.as_object_mut().ok_or(InboundError::NotAnObject)?;
        if object.get("data").is_none_or(Value::is_null) {
            object.insert("data".into(), Value::Object(Map::new()));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Wire name of the action, used in logs and rejection messages.
    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::Authenticate(_) => "authenticate",
            ClientAction::SetRole(_) => "set_role",
            ClientAction::RequestTokens {} => "request_tokens",
            ClientAction::PlaceToken(_) => "token:place",
            ClientAction::MoveToken(_) => "token:move",
            ClientAction::UpdateToken(_) => "token:update",
            ClientAction::RemoveToken(_) => "token:remove",
            ClientAction::UpdateFactionStats(_) => "faction_stats:update",
            ClientAction::DeleteFactionStats(_) => "faction_stats:delete",
            ClientAction::CreateMoveProposal(_) => "move_proposal:create",
            ClientAction::UpdateMoveProposal(_) => "move_proposal:update",
            ClientAction::ApproveMoveProposal(_) => "move_proposal:approve",
            ClientAction::RejectMoveProposal(_) => "move_proposal:reject",
            ClientAction::CancelMoveProposal(_) => "move_proposal:cancel",
            ClientAction::ClearMoveProposals {} => "move_proposals:clear_all",
            ClientAction::UpdateMovableFactions(_) => "movable_factions:update",
        }
    }
}

/// Role claim with its credential.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AuthenticatePayload {
    /// Checked only when claiming `dm`.
    #[serde(default)]
    pub password: String,
    /// `dm` or `player`.
    #[serde(default)]
    pub role: String,
}

/// Requested working role.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SetRolePayload {
    /// `dm` or `player`.
    pub role: String,
}

/// Absolute token move.
#[serde_as]
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MoveTokenPayload {
    /// Token to move.
    #[serde(rename = "tokenId")]
    pub token_id: TokenId,
    /// Target column, rounded to the nearest integer.
    #[serde_as(as = "Rounded")]
    #[schema(value_type = i64)]
    pub x: i64,
    /// Target row, rounded to the nearest integer.
    #[serde_as(as = "Rounded")]
    #[schema(value_type = i64)]
    pub y: i64,
}

/// Partial token update addressed by id.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateTokenPayload {
    /// Token to update.
    pub id: TokenId,
    /// Fields to overwrite.
    #[serde(flatten)]
    pub patch: TokenPatch,
}

/// Token reference used by removal.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TokenRef {
    /// Referenced token.
    #[serde(rename = "tokenId")]
    pub token_id: TokenId,
}

/// Faction reference used by deletion.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct FactionNamePayload {
    /// Referenced faction.
    pub faction_name: String,
}

/// New target for the live proposal of a token.
#[serde_as]
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateMoveProposalPayload {
    /// Token whose proposal changes.
    pub token_id: TokenId,
    /// New target column.
    #[serde_as(as = "Rounded")]
    #[schema(value_type = i64)]
    pub proposed_x: i64,
    /// New target row.
    #[serde_as(as = "Rounded")]
    #[schema(value_type = i64)]
    pub proposed_y: i64,
}

/// Proposal reference used by approve, reject and cancel.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ProposalRef {
    /// Referenced proposal.
    #[serde(rename = "proposalId")]
    pub proposal_id: ProposalId,
}

/// Frame pushed to clients, serialized once and shared across recipients.
#[derive(Debug, Clone)]
pub struct ServerEvent {
    /// Event name, kept for logs.
    pub event: &'static str,
    /// Serialized envelope.
    pub frame: Utf8Bytes,
}

#[derive(Serialize)]
struct Envelope<'a, T: ?Sized> {
    event: &'a str,
    data: &'a T,
}

impl ServerEvent {
    /// Render `payload` inside the `{"event", "data"}` envelope.
    pub fn json<T>(event: &'static str, payload: &T) -> serde_json::Result<Self>
    where
        T: ?Sized + Serialize,
    {
        let text = serde_json::to_string(&Envelope {
            event,
            data: payload,
        })?;
        Ok(Self {
            event,
            frame: text.into(),
        })
    }
}

/// Token as delivered to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenDto {
    /// Board-unique id.
    pub id: TokenId,
    /// Column.
    pub x: i64,
    /// Row.
    pub y: i64,
    /// Display name.
    pub name: String,
    /// Owning faction name, possibly empty.
    pub faction: String,
    /// Legacy single hit-point value.
    pub hp: i64,
    /// Maximum hit points.
    pub max_hp: i64,
    /// Current hit points.
    pub current_hp: i64,
    /// Free-form attack notes.
    pub attack: String,
    /// Free-form counterattack notes.
    pub counterattack: String,
    /// Free-form special ability notes.
    pub special: String,
    /// Free-form DM notes.
    pub notes: String,
    /// CSS color used to draw the token.
    pub color: String,
    /// Session that placed the token.
    pub owner: Option<Uuid>,
    /// Hidden tokens reach the DM only.
    pub visible_to_players: bool,
    /// RFC 3339 placement timestamp.
    pub created_at: String,
}

impl From<&Token> for TokenDto {
    fn from(token: &Token) -> Self {
        Self {
            id: token.id,
            x: token.x,
            y: token.y,
            name: token.name.clone(),
            faction: token.faction.clone(),
            hp: token.hp,
            max_hp: token.max_hp,
            current_hp: token.current_hp,
            attack: token.attack.clone(),
            counterattack: token.counterattack.clone(),
            special: token.special.clone(),
            notes: token.notes.clone(),
            color: token.color.clone(),
            owner: token.owner,
            visible_to_players: token.visible_to_players,
            created_at: format_system_time(token.created_at),
        }
    }
}

/// Faction stats as delivered to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FactionStatsDto {
    /// Stable id.
    pub id: i64,
    /// Unique faction name.
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
    /// Magic level label.
    pub magic_stat: String,
    /// Hidden factions reach the DM only.
    pub is_visible: bool,
}

impl From<&FactionStats> for FactionStatsDto {
    fn from(stats: &FactionStats) -> Self {
        Self {
            id: stats.id,
            faction_name: stats.faction_name.clone(),
            current_hp: stats.current_hp,
            max_hp: stats.max_hp,
            force_stat: stats.force_stat,
            wealth_stat: stats.wealth_stat,
            cunning_stat: stats.cunning_stat,
            treasure_stat: stats.treasure_stat,
            magic_stat: stats.magic_stat.clone(),
            is_visible: stats.is_visible,
        }
    }
}

/// Move proposal as delivered to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MoveProposalDto {
    /// Proposal id.
    pub id: ProposalId,
    /// Token to move.
    pub token_id: TokenId,
    /// Column when proposed.
    pub original_x: i64,
    /// Row when proposed.
    pub original_y: i64,
    /// Target column.
    pub proposed_x: i64,
    /// Target row.
    pub proposed_y: i64,
    /// Proposing session.
    pub proposed_by: Option<Uuid>,
}

impl From<&MoveProposal> for MoveProposalDto {
    fn from(proposal: &MoveProposal) -> Self {
        Self {
            id: proposal.id,
            token_id: proposal.token_id,
            original_x: proposal.original_x,
            original_y: proposal.original_y,
            proposed_x: proposal.proposed_x,
            proposed_y: proposal.proposed_y,
            proposed_by: proposal.proposed_by,
        }
    }
}

/// Movable factions row as delivered to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MovableFactionDto {
    /// Faction name.
    pub faction_name: String,
    /// Whether players may move its tokens.
    pub is_movable: bool,
}

impl From<&MovableFaction> for MovableFactionDto {
    fn from(value: &MovableFaction) -> Self {
        Self {
            faction_name: value.faction_name.clone(),
            is_movable: value.is_movable,
        }
    }
}

/// Reply to `authenticate`.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResult {
    /// Whether the role was granted.
    pub success: bool,
    /// Granted role on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    /// Reason on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Payload of `token:moved`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenMoved {
    /// Moved token.
    #[serde(rename = "tokenId")]
    pub token_id: TokenId,
    /// New column.
    pub x: i64,
    /// New row.
    pub y: i64,
}

/// Payload of `token:removed`.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenRemoved {
    /// Removed token.
    pub id: TokenId,
}

/// Payload of `faction_stats:deleted`.
#[derive(Debug, Serialize, ToSchema)]
pub struct FactionDeleted {
    /// Deleted or hidden faction.
    pub faction_name: String,
}

/// Empty object payload.
#[derive(Debug, Serialize, ToSchema)]
pub struct Empty {}

/// Payload of `error`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorMessage {
    /// Human readable reason.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_actions_with_and_without_data() {
        let action = ClientAction::from_json_str(r#"{"event":"request_tokens"}"#).unwrap();
        assert!(matches!(action, ClientAction::RequestTokens {}));

        let action =
            ClientAction::from_json_str(r#"{"event":"move_proposals:clear_all","data":null}"#)
                .unwrap();
        assert!(matches!(action, ClientAction::ClearMoveProposals {}));
    }

    #[test]
    fn decodes_camel_case_references() {
        let action =
            ClientAction::from_json_str(r#"{"event":"token:move","data":{"tokenId":3,"x":10.4,"y":-2}}"#)
                .unwrap();
        match action {
            ClientAction::MoveToken(payload) => {
                assert_eq!((payload.token_id, payload.x, payload.y), (3, 10, -2));
            }
            other => panic!("unexpected action {other:?}"),
        }

        let action = ClientAction::from_json_str(
            r#"{"event":"move_proposal:approve","data":{"proposalId":12}}"#,
        )
        .unwrap();
        assert!(matches!(
            action,
            ClientAction::ApproveMoveProposal(ProposalRef { proposal_id: 12 })
        ));
    }

    #[test]
    fn update_payload_carries_partial_fields() {
        let action = ClientAction::from_json_str(
            r#"{"event":"token:update","data":{"id":1,"visible_to_players":false,"notes":"ambush"}}"#,
        )
        .unwrap();
        match action {
            ClientAction::UpdateToken(payload) => {
                assert_eq!(payload.id, 1);
                assert_eq!(payload.patch.visible_to_players, Some(false));
                assert_eq!(payload.patch.notes.as_deref(), Some("ambush"));
                assert_eq!(payload.patch.name, None);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn movable_factions_payload_is_a_list() {
        let action = ClientAction::from_json_str(
            r#"{"event":"movable_factions:update","data":[{"faction_name":"Crows","is_movable":true}]}"#,
        )
        .unwrap();
        match action {
            ClientAction::UpdateMovableFactions(list) => {
                assert_eq!(list.len(), 1);
                assert!(list[0].is_movable);
            }
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_events_and_non_objects() {
        assert!(matches!(
            ClientAction::from_json_str(r#"{"event":"token:explode","data":{}}"#),
            Err(InboundError::Decode(_))
        ));
        assert!(matches!(
            ClientAction::from_json_str("[1,2]"),
            Err(InboundError::NotAnObject)
        ));
    }

    #[test]
    fn server_event_envelope() {
        let event = ServerEvent::json("token:removed", &TokenRemoved { id: 4 }).unwrap();
        let value: Value = serde_json::from_str(event.frame.as_str()).unwrap();
        assert_eq!(value["event"], "token:removed");
        assert_eq!(value["data"]["id"], 4);
    }
}
