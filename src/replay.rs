//! Replays a JSON lines transcript of responses and channel events through
//! the engine, one entry per line.

use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::protocol::*;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::io::BufRead;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    /// Raw `/users/me` body; its maps are keyed by list id strings, which
    /// only decode from a standalone JSON value
    Bootstrap {
        me: serde_json::Value,
    },
    GameListCreated {
        gamelist: GameList,
    },
    GameListJoined {
        gamelist: GameList,
        #[serde(default)]
        active_proofs: Vec<Proof>,
        player_infos: Player,
    },
    ProofSubmitted {
        game_list_id: GameListId,
        player: Player,
    },
    VoteSubmitted {
        game_list_id: GameListId,
        proof: Proof,
    },
    ProofDismissed {
        game_list_id: GameListId,
        proof_id: ProofId,
    },
    /// Raw channel event with its `{"data": ...}` payload
    Event {
        channel: String,
        event: String,
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReplayStats {
    pub applied: usize,
    pub rejected: usize,
}

/// Feed every entry to the engine and wait for all lists to settle.
/// Malformed lines are logged and counted, never fatal.
pub async fn replay(engine: &SyncEngine, reader: impl BufRead) -> SyncResult<ReplayStats> {
    let mut stats = ReplayStats::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let entry: TranscriptEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping transcript line {}: {}", index + 1, e);
                stats.rejected += 1;
                continue;
            }
        };

        match apply_entry(engine, entry).await {
            Ok(()) => stats.applied += 1,
            Err(e) => {
                tracing::warn!("Rejected transcript line {}: {}", index + 1, e);
                stats.rejected += 1;
            }
        }
    }

    engine.flush_all().await;
    tracing::info!(
        "Replay finished: {} applied, {} rejected",
        stats.applied,
        stats.rejected
    );
    Ok(stats)
}

async fn apply_entry(engine: &SyncEngine, entry: TranscriptEntry) -> SyncResult<()> {
    let action = match entry {
        TranscriptEntry::Bootstrap { me } => {
            let me: MeResponse = serde_json::from_value(me)?;
            engine.bootstrap(me).await;
            return Ok(());
        }
        TranscriptEntry::Event {
            channel,
            event,
            payload,
        } => {
            let list = parse_channel(&channel)?;
            let event = RealtimeEvent::from_value(&event, payload)?;
            engine.dispatch_event(list, event).await;
            return Ok(());
        }
        TranscriptEntry::GameListCreated { gamelist } => ResponseAction::GameListCreated(gamelist),
        TranscriptEntry::GameListJoined {
            gamelist,
            active_proofs,
            player_infos,
        } => ResponseAction::GameListJoined(JoinGameListResponse {
            gamelist,
            active_proofs,
            player_infos,
        }),
        TranscriptEntry::ProofSubmitted {
            game_list_id,
            player,
        } => ResponseAction::ProofSubmitted {
            game_list_id,
            player,
        },
        TranscriptEntry::VoteSubmitted {
            game_list_id,
            proof,
        } => ResponseAction::VoteSubmitted {
            game_list_id,
            proof,
        },
        TranscriptEntry::ProofDismissed {
            game_list_id,
            proof_id,
        } => ResponseAction::ProofDismissed {
            game_list_id,
            proof_id,
        },
    };

    engine.dispatch_response(action).await;
    Ok(())
}
