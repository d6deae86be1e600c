//! Denormalized views built from the canonical records.
//!
//! Players nested in lists and proofs come without their challenge infos;
//! only the player held in `playerInfos` is resolved in full. Every copy of
//! a player is built from the same record.

use super::records::*;
use super::Store;
use crate::protocol::ListSnapshot;
use crate::types::*;

impl Store {
    fn resolve_user(&self, id: UserId) -> User {
        self.users.get(&id).cloned().unwrap_or(User {
            id,
            ..Default::default()
        })
    }

    fn resolve_media(&self, id: MediaId) -> Media {
        self.media.get(&id).cloned().unwrap_or(Media {
            id,
            ..Default::default()
        })
    }

    fn resolve_challenge(&self, id: ChallengeId, with_categories: bool) -> Challenge {
        let Some(record) = self.challenges.get(&id) else {
            return Challenge {
                id,
                ..Default::default()
            };
        };
        let creator = if record.show_creator == Some(true) {
            record.creator.map(|user| self.resolve_user(user))
        } else {
            None
        };
        let categories = if with_categories {
            record.categories.as_ref().map(|ids| {
                ids.iter()
                    .map(|id| self.resolve_category(*id, false))
                    .collect()
            })
        } else {
            None
        };

        Challenge {
            id,
            published_state: record.published_state.clone(),
            show_creator: record.show_creator,
            emoji: record.emoji.clone(),
            points: record.points,
            title: record.title.clone(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
            creator,
            categories,
        }
    }

    fn resolve_category(&self, id: CategoryId, with_challenges: bool) -> ChallengeCategory {
        let Some(record) = self.categories.get(&id) else {
            return ChallengeCategory {
                id,
                ..Default::default()
            };
        };
        let challenges = if with_challenges {
            record.challenges.as_ref().map(|ids| {
                ids.iter()
                    .map(|id| self.resolve_challenge(*id, false))
                    .collect()
            })
        } else {
            None
        };

        ChallengeCategory {
            id,
            title: record.title.clone(),
            color: record.color.clone(),
            is_active: record.is_active,
            challenges,
        }
    }

    fn resolve_challenge_game_list(
        &self,
        scope: GameListId,
        id: ChallengeGameListId,
    ) -> ChallengeGameList {
        let parent = self
            .challenge_gamelists
            .get(&(scope, id))
            .and_then(|record| record.parent)
            .map(|challenge| self.resolve_challenge(challenge, true));
        ChallengeGameList { id, parent }
    }

    fn resolve_player(&self, scope: GameListId, id: PlayerId, with_infos: bool) -> Player {
        let Some(record) = self.players.get(&(scope, id)) else {
            return Player {
                id,
                ..Default::default()
            };
        };
        let challenge_infos = if with_infos {
            record.challenge_infos.as_ref().map(|infos| {
                infos
                    .iter()
                    .map(|info| self.resolve_challenge_info(scope, info))
                    .collect()
            })
        } else {
            None
        };

        Player {
            id,
            pseudo: record.pseudo.clone(),
            code: record.code.clone(),
            score: record.score,
            user: record.user.map(|user| self.resolve_user(user)),
            challenge_infos,
        }
    }

    fn resolve_challenge_info(
        &self,
        scope: GameListId,
        info: &ChallengeInfoRecord,
    ) -> PlayerChallengeInfo {
        PlayerChallengeInfo {
            status: info.status,
            validate_date: info.validate_date.clone(),
            associated_proof: info
                .associated_proof
                .map(|proof| proof.map(|proof| self.resolve_proof(proof))),
            player: None,
            challenge_gamelist: Some(self.resolve_challenge_game_list(scope, info.challenge_gamelist)),
        }
    }

    fn resolve_proof(&self, id: ProofId) -> Proof {
        let Some(record) = self.proofs.get(&id) else {
            return Proof {
                id,
                ..Default::default()
            };
        };
        let scope = record.game_list;

        Proof {
            id,
            creator: record
                .creator
                .map(|player| self.resolve_player(scope, player, false)),
            is_closed: record.is_closed,
            closed_date: record.closed_date.clone(),
            has_been_validated: record.has_been_validated,
            challenge_gamelist: record
                .challenge_gamelist
                .map(|pivot| self.resolve_challenge_game_list(scope, pivot)),
            achievers: record.achievers.as_ref().map(|ids| {
                ids.iter()
                    .map(|player| self.resolve_player(scope, *player, false))
                    .collect()
            }),
            media: record.media.map(|media| self.resolve_media(media)),
            stats: record.stats.clone(),
        }
    }

    fn resolve_game_list(&self, record: &GameListRecord) -> GameList {
        let id = record.id;
        GameList {
            id,
            title: record.title.clone(),
            code: record.code.clone(),
            deadline: record.deadline.clone(),
            creator: record.creator.map(|user| self.resolve_user(user)),
            thumbnail: record.thumbnail.map(|media| self.resolve_media(media)),
            players: record.players.as_ref().map(|ids| {
                ids.iter()
                    .map(|player| self.resolve_player(id, *player, false))
                    .collect()
            }),
            challenges: record.challenges.as_ref().map(|ids| {
                ids.iter()
                    .map(|pivot| self.resolve_challenge_game_list(id, *pivot))
                    .collect()
            }),
        }
    }

    // ========== Lookups ==========

    pub fn game_list(&self, id: GameListId) -> Option<GameList> {
        self.game_lists
            .get(&id)
            .map(|record| self.resolve_game_list(record))
    }

    /// `gameLists`, in arrival order
    pub fn game_lists(&self) -> Vec<GameList> {
        self.game_list_order
            .iter()
            .filter_map(|id| self.game_list(*id))
            .collect()
    }

    /// `activeProofs[list]`; None if never loaded
    pub fn active_proofs(&self, list: GameListId) -> Option<Vec<Proof>> {
        self.active_proofs
            .get(&list)
            .map(|ids| ids.iter().map(|id| self.resolve_proof(*id)).collect())
    }

    /// `playerInfos[list]`, with challenge infos
    pub fn player_info(&self, list: GameListId) -> Option<Player> {
        self.player_infos
            .get(&list)
            .map(|id| self.resolve_player(list, *id, true))
    }

    pub fn player(&self, list: GameListId, id: PlayerId) -> Option<Player> {
        self.players
            .contains_key(&(list, id))
            .then(|| self.resolve_player(list, id, true))
    }

    pub fn proof(&self, id: ProofId) -> Option<Proof> {
        self.proofs
            .contains_key(&id)
            .then(|| self.resolve_proof(id))
    }

    pub fn challenge(&self, id: ChallengeId) -> Option<Challenge> {
        self.challenges
            .contains_key(&id)
            .then(|| self.resolve_challenge(id, true))
    }

    pub fn category(&self, id: CategoryId) -> Option<ChallengeCategory> {
        self.categories
            .contains_key(&id)
            .then(|| self.resolve_category(id, true))
    }

    pub fn challenge_game_list(
        &self,
        list: GameListId,
        id: ChallengeGameListId,
    ) -> Option<ChallengeGameList> {
        self.challenge_gamelists
            .contains_key(&(list, id))
            .then(|| self.resolve_challenge_game_list(list, id))
    }

    pub fn media(&self, id: MediaId) -> Option<Media> {
        self.media.get(&id).cloned()
    }

    pub fn user(&self, id: UserId) -> Option<User> {
        self.users.get(&id).cloned()
    }

    /// Everything the view layer shows for one list
    pub fn list_snapshot(&self, list: GameListId, sequence: u64) -> ListSnapshot {
        let game_list = self.game_list(list);
        let today = chrono::Local::now().date_naive();
        let deadline_passed = game_list
            .as_ref()
            .and_then(|game_list| game_list.deadline_date())
            .map(|deadline| deadline < today);

        ListSnapshot {
            game_list_id: list,
            sequence,
            generated_at: chrono::Utc::now().to_rfc3339(),
            game_list,
            active_proofs: self.active_proofs(list),
            player_info: self.player_info(list),
            deadline_passed,
        }
    }
}
