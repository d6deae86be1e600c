use crate::error::{SyncError, SyncResult};
use crate::types::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ========== HTTP responses ==========

/// `{ "result": "success", "data": ... }` wrapper used by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub result: String,
    pub data: T,
}

/// Decode an HTTP response body and unwrap its data
pub fn decode_response<T: DeserializeOwned>(body: &str) -> SyncResult<T> {
    let response: ApiResponse<T> = serde_json::from_str(body)?;
    if response.result != "success" {
        return Err(SyncError::Rejected(response.result));
    }
    Ok(response.data)
}

/// GET /users/me with game lists, active proofs and player infos
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeResponse {
    #[serde(default)]
    pub id: Option<UserId>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub gamelists: Vec<GameList>,
    #[serde(default)]
    pub active_proofs: BTreeMap<GameListId, Vec<Proof>>,
    #[serde(default)]
    pub player_infos: BTreeMap<GameListId, Player>,
}

impl MeResponse {
    /// The authenticated user, when the response identifies one
    pub fn user(&self) -> Option<User> {
        self.id.map(|id| User {
            id,
            username: self.username.clone(),
            email: self.email.clone(),
        })
    }
}

/// PUT /gamelists/join/{code}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinGameListResponse {
    pub gamelist: GameList,
    #[serde(default)]
    pub active_proofs: Vec<Proof>,
    pub player_infos: Player,
}

/// Result of an explicit request/response action, ready to be ingested
#[derive(Debug, Clone)]
pub enum ResponseAction {
    /// POST /gamelists
    GameListCreated(GameList),
    /// PUT /gamelists/join/{code}
    GameListJoined(JoinGameListResponse),
    /// POST /gamelists/{id}/proofs
    ProofSubmitted {
        game_list_id: GameListId,
        player: Player,
    },
    /// POST /gamelists/{id}/proofs/{proof}/votes
    VoteSubmitted {
        game_list_id: GameListId,
        proof: Proof,
    },
    /// The user left the proof they were voting on
    ProofDismissed {
        game_list_id: GameListId,
        proof_id: ProofId,
    },
}

impl ResponseAction {
    /// Game list whose queue serializes this action
    pub fn game_list_id(&self) -> GameListId {
        match self {
            ResponseAction::GameListCreated(list) => list.id,
            ResponseAction::GameListJoined(joined) => joined.gamelist.id,
            ResponseAction::ProofSubmitted { game_list_id, .. }
            | ResponseAction::VoteSubmitted { game_list_id, .. }
            | ResponseAction::ProofDismissed { game_list_id, .. } => *game_list_id,
        }
    }
}

// ========== Real-time events ==========

pub const USER_JOIN_GAMELIST: &str = "user-join-gamelist";
pub const USER_CREATE_PROOF: &str = "user-create-proof";
pub const USER_VOTE_PROOF: &str = "user-vote-proof";
pub const PROOF_COMPLETED: &str = "proof-completed";
pub const PLAYER_PSEUDO_UPDATED: &str = "player-pseudo-updated";

const CHANNEL_PREFIX: &str = "gamelist_";

/// Name of the broadcast channel scoped to a game list
pub fn channel_name(game_list_id: GameListId) -> String {
    format!("{}{}", CHANNEL_PREFIX, game_list_id)
}

/// Extract the game list id from a `gamelist_{id}` channel name
pub fn parse_channel(channel: &str) -> SyncResult<GameListId> {
    channel
        .strip_prefix(CHANNEL_PREFIX)
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| SyncError::InvalidChannel(channel.to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventEnvelope<T> {
    data: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserJoinGameList {
    pub new_player: Player,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreateProof {
    pub new_proof: Proof,
    #[serde(default)]
    pub achievers_player_infos: Vec<Player>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserVoteProof {
    pub proof: Proof,
    pub voter: Player,
    pub has_validate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofCompleted {
    pub proof: Proof,
    /// Player infos of the achievers
    #[serde(default)]
    pub player_infos: Vec<Player>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerPseudoUpdated {
    pub player: Player,
}

/// Decoded event received on a `gamelist_{id}` channel
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    UserJoinGameList(UserJoinGameList),
    UserCreateProof(UserCreateProof),
    UserVoteProof(UserVoteProof),
    ProofCompleted(ProofCompleted),
    PlayerPseudoUpdated(PlayerPseudoUpdated),
}

fn event_data<T: DeserializeOwned>(payload: serde_json::Value) -> SyncResult<T> {
    Ok(serde_json::from_value::<EventEnvelope<T>>(payload)?.data)
}

impl RealtimeEvent {
    /// Decode a raw `{"data": ...}` payload for the named event
    pub fn decode(name: &str, payload: &str) -> SyncResult<Self> {
        let value: serde_json::Value = serde_json::from_str(payload)?;
        Self::from_value(name, value)
    }

    pub fn from_value(name: &str, payload: serde_json::Value) -> SyncResult<Self> {
        match name {
            USER_JOIN_GAMELIST => Ok(Self::UserJoinGameList(event_data(payload)?)),
            USER_CREATE_PROOF => Ok(Self::UserCreateProof(event_data(payload)?)),
            USER_VOTE_PROOF => Ok(Self::UserVoteProof(event_data(payload)?)),
            PROOF_COMPLETED => Ok(Self::ProofCompleted(event_data(payload)?)),
            PLAYER_PSEUDO_UPDATED => Ok(Self::PlayerPseudoUpdated(event_data(payload)?)),
            other => Err(SyncError::UnknownEvent(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::UserJoinGameList(_) => USER_JOIN_GAMELIST,
            Self::UserCreateProof(_) => USER_CREATE_PROOF,
            Self::UserVoteProof(_) => USER_VOTE_PROOF,
            Self::ProofCompleted(_) => PROOF_COMPLETED,
            Self::PlayerPseudoUpdated(_) => PLAYER_PSEUDO_UPDATED,
        }
    }
}

// ========== Outbound to the view layer ==========

/// Shown to achievers only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum Notification {
    /// Someone voted on one of the local player's proofs
    ProofVoted {
        game_list_id: GameListId,
        proof_id: ProofId,
        voter_id: PlayerId,
        voter_pseudo: Option<String>,
        has_validate: bool,
    },
    /// Final verdict on one of the local player's proofs
    ProofCompleted {
        game_list_id: GameListId,
        proof_id: ProofId,
        has_been_validated: Option<bool>,
    },
}

/// Post-mutation view of everything the UI shows for one game list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSnapshot {
    pub game_list_id: GameListId,
    /// Increments with every snapshot published for this list
    pub sequence: u64,
    pub generated_at: String,
    pub game_list: Option<GameList>,
    /// None when the list's active proofs were never loaded
    pub active_proofs: Option<Vec<Proof>>,
    pub player_info: Option<Player>,
    pub deadline_passed: Option<bool>,
}
