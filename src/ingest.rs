//! Applies results of explicit request/response actions to the store

use crate::protocol::{JoinGameListResponse, MeResponse, ResponseAction};
use crate::store::{MergeMode, Store};
use crate::types::*;

pub struct ResponseIngestor<'a> {
    store: &'a mut Store,
}

impl<'a> ResponseIngestor<'a> {
    pub fn new(store: &'a mut Store) -> Self {
        Self { store }
    }

    /// Apply any list-scoped action
    pub fn apply(&mut self, action: ResponseAction) {
        match action {
            ResponseAction::GameListCreated(list) => {
                self.on_game_list_created(list);
            }
            ResponseAction::GameListJoined(joined) => {
                self.on_game_list_joined(joined);
            }
            ResponseAction::ProofSubmitted {
                game_list_id,
                player,
            } => self.on_proof_submitted(game_list_id, player),
            ResponseAction::VoteSubmitted { proof, .. } => {
                self.on_vote_submitted(proof);
            }
            ResponseAction::ProofDismissed {
                game_list_id,
                proof_id,
            } => {
                self.on_proof_dismissed(game_list_id, proof_id);
            }
        }
    }

    /// Load the authoritative initial snapshot, replacing everything
    pub fn bootstrap(&mut self, me: MeResponse) {
        self.store.start_session(me.user());

        let list_count = me.gamelists.len();
        for list in me.gamelists {
            self.store.upsert_game_list(list, MergeMode::Replace);
        }
        for (list, proofs) in me.active_proofs {
            self.store.set_active_proofs(list, proofs);
        }
        for (list, player) in me.player_infos {
            self.store.replace_player_info(list, player);
        }

        tracing::info!(
            "Bootstrapped {} game lists for user {:?}",
            list_count,
            self.store.local_user().map(|user| user.id)
        );
    }

    /// A freshly created list starts with no open proofs
    pub fn on_game_list_created(&mut self, list: GameList) -> GameListId {
        let id = self.store.upsert_game_list(list, MergeMode::Merge);
        if !self.store.has_active_proofs(id) {
            self.store.set_active_proofs(id, Vec::new());
        }
        tracing::info!("Game list {} created", id);
        id
    }

    /// Join is authoritative for the joining user's own view of the list
    pub fn on_game_list_joined(&mut self, joined: JoinGameListResponse) -> GameListId {
        let id = self.store.upsert_game_list(joined.gamelist, MergeMode::Merge);
        let proof_count = joined.active_proofs.len();
        self.store.set_active_proofs(id, joined.active_proofs);
        self.store.replace_player_info(id, joined.player_infos);

        tracing::info!("Joined game list {} with {} active proofs", id, proof_count);
        id
    }

    /// The create-proof response is the complete snapshot of the acting player
    pub fn on_proof_submitted(&mut self, game_list_id: GameListId, player: Player) {
        tracing::info!(
            "Proof submitted in list {}, replacing player info {}",
            game_list_id,
            player.id
        );
        self.store.replace_player_info(game_list_id, player);
    }

    /// Refresh the voted proof's stats. Returns false when the proof is no
    /// longer held locally, which is expected after navigating away.
    pub fn on_vote_submitted(&mut self, proof: Proof) -> bool {
        let Some(list) = self.store.find_active_proof_list(proof.id) else {
            tracing::debug!("Vote response for proof {} not held locally", proof.id);
            return false;
        };
        self.store.upsert_proof(list, proof);
        true
    }

    pub fn on_proof_dismissed(&mut self, game_list_id: GameListId, proof_id: ProofId) -> bool {
        let removed = self.store.dismiss_active_proof(game_list_id, proof_id);
        tracing::debug!(
            "Dismissed proof {} in list {} (removed: {})",
            proof_id,
            game_list_id,
            removed
        );
        removed
    }

    pub fn on_modes_listed(&mut self, modes: Vec<GameListMode>) {
        self.store.set_game_list_modes(modes);
    }

    pub fn on_categories_listed(&mut self, categories: Vec<ChallengeCategory>) {
        self.store.set_challenge_categories(categories);
    }
}
