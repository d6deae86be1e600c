//! Applies real-time events received on one game list's channel.
//!
//! Achievers of a proof never get the room's proof/vote mutations: their own
//! HTTP responses already made their state authoritative. They get a
//! notification instead.

use crate::protocol::*;
use crate::store::{MergeMode, Store};
use crate::types::*;

pub struct EventRouter {
    game_list_id: GameListId,
}

impl EventRouter {
    pub fn new(game_list_id: GameListId) -> Self {
        Self { game_list_id }
    }

    pub fn game_list_id(&self) -> GameListId {
        self.game_list_id
    }

    /// Apply one event; returns notifications meant for the local user
    pub fn apply(&self, store: &mut Store, event: RealtimeEvent) -> Vec<Notification> {
        tracing::debug!("List {}: applying {}", self.game_list_id, event.name());
        match event {
            RealtimeEvent::UserJoinGameList(payload) => {
                self.on_user_join(store, payload);
                Vec::new()
            }
            RealtimeEvent::UserCreateProof(payload) => {
                self.on_proof_created(store, payload);
                Vec::new()
            }
            RealtimeEvent::UserVoteProof(payload) => self.on_proof_voted(store, payload),
            RealtimeEvent::ProofCompleted(payload) => self.on_proof_completed(store, payload),
            RealtimeEvent::PlayerPseudoUpdated(payload) => {
                self.on_pseudo_updated(store, payload);
                Vec::new()
            }
        }
    }

    fn on_user_join(&self, store: &mut Store, payload: UserJoinGameList) {
        let player_id = payload.new_player.id;
        if store.append_game_list_player(self.game_list_id, payload.new_player) {
            tracing::info!("Player {} joined list {}", player_id, self.game_list_id);
        }
    }

    fn on_proof_created(&self, store: &mut Store, payload: UserCreateProof) {
        let list = self.game_list_id;
        let proof = payload.new_proof;
        let proof_id = proof.id;

        if !store.is_local_achiever(list, &proof) {
            if store.add_active_proof(list, proof) {
                tracing::info!("Proof {} added to list {}", proof_id, list);
            }
            return;
        }

        // The creator's own create-proof response already updated them
        let creator_id = proof.creator.as_ref().map(|creator| creator.id);
        for player in payload.achievers_player_infos {
            if Some(player.id) == creator_id || !store.is_local_player(list, &player) {
                continue;
            }
            tracing::info!(
                "Co-achiever of proof {}, replacing player info {} in list {}",
                proof_id,
                player.id,
                list
            );
            store.replace_player_info(list, player);
        }
    }

    fn on_proof_voted(&self, store: &mut Store, payload: UserVoteProof) -> Vec<Notification> {
        let list = self.game_list_id;
        let proof_id = payload.proof.id;

        if store.is_local_achiever(list, &payload.proof) {
            return vec![Notification::ProofVoted {
                game_list_id: list,
                proof_id,
                voter_id: payload.voter.id,
                voter_pseudo: payload.voter.pseudo,
                has_validate: payload.has_validate,
            }];
        }

        if store.contains_active_proof(list, proof_id) {
            store.upsert_proof(list, payload.proof);
        } else {
            tracing::debug!("Vote on proof {} not held in list {}", proof_id, list);
        }
        Vec::new()
    }

    fn on_proof_completed(&self, store: &mut Store, payload: ProofCompleted) -> Vec<Notification> {
        let list = self.game_list_id;
        let proof = payload.proof;
        let proof_id = proof.id;
        let verdict = proof.has_been_validated.flatten();
        let achievers = proof.achiever_ids();
        let is_achiever = store.is_local_achiever(list, &proof);
        let already_closed = store.proof_is_closed(proof_id);

        // Closing the canonical proof also merges its achievers, which
        // refreshes their entries (e.g. score) in the list's players.
        store.upsert_proof(list, proof);

        for player in payload.player_infos {
            if store.is_local_player(list, &player) {
                store.replace_player_info(list, player);
            }
        }

        if store.remove_active_proof(list, proof_id) {
            tracing::info!(
                "Proof {} of {:?} completed in list {} (validated: {:?})",
                proof_id,
                achievers,
                list,
                verdict
            );
        }

        if is_achiever && !already_closed {
            vec![Notification::ProofCompleted {
                game_list_id: list,
                proof_id,
                has_been_validated: verdict,
            }]
        } else {
            Vec::new()
        }
    }

    fn on_pseudo_updated(&self, store: &mut Store, payload: PlayerPseudoUpdated) {
        let list = self.game_list_id;
        let player_id = payload.player.id;
        if !store.game_list_has_player(list, player_id) {
            tracing::debug!("Pseudo update for player {} not in list {}", player_id, list);
            return;
        }
        store.upsert_player(list, payload.player, MergeMode::Merge);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ResponseIngestor;
    use std::collections::BTreeMap;

    const LIST: GameListId = 5;
    const LOCAL_USER: UserId = 45;

    fn player(id: PlayerId, user: UserId, score: i64) -> Player {
        Player {
            id,
            pseudo: Some(format!("player-{}", id)),
            code: Some(format!("code-{}", id)),
            score: Some(score),
            user: Some(User {
                id: user,
                username: None,
                email: None,
            }),
            challenge_infos: None,
        }
    }

    fn pending_info(proof: Proof) -> PlayerChallengeInfo {
        PlayerChallengeInfo {
            status: Some(ChallengeStatus::ValidationPending),
            validate_date: Some(None),
            associated_proof: Some(Some(proof)),
            player: None,
            challenge_gamelist: Some(ChallengeGameList { id: 5, parent: None }),
        }
    }

    fn proof(id: ProofId, creator: Player, achievers: Vec<Player>) -> Proof {
        Proof {
            id,
            creator: Some(creator),
            is_closed: Some(false),
            closed_date: Some(None),
            has_been_validated: Some(None),
            challenge_gamelist: Some(ChallengeGameList { id: 5, parent: None }),
            achievers: Some(achievers),
            media: Some(Media {
                id: 635,
                ..Default::default()
            }),
            stats: Some(VoteStatistics::from_counts(0, 0, 9)),
        }
    }

    /// Local user 45 plays as player 55 in list 5, alongside 30 and 31
    fn bootstrapped(active: Vec<Proof>) -> Store {
        let mut store = Store::new();
        let mut active_proofs = BTreeMap::new();
        active_proofs.insert(LIST, active);
        let mut player_infos = BTreeMap::new();
        player_infos.insert(LIST, player(55, LOCAL_USER, 44));

        ResponseIngestor::new(&mut store).bootstrap(MeResponse {
            id: Some(LOCAL_USER),
            username: Some("erwan".to_string()),
            email: None,
            gamelists: vec![GameList {
                id: LIST,
                players: Some(vec![
                    player(55, LOCAL_USER, 44),
                    player(30, 25, 0),
                    player(31, 26, 10),
                ]),
                ..Default::default()
            }],
            active_proofs,
            player_infos,
        });
        store.take_changes();
        store
    }

    fn active_ids(store: &Store) -> Vec<ProofId> {
        store
            .active_proofs(LIST)
            .unwrap_or_default()
            .iter()
            .map(|proof| proof.id)
            .collect()
    }

    fn join_event(id: PlayerId) -> RealtimeEvent {
        RealtimeEvent::UserJoinGameList(UserJoinGameList {
            new_player: player(id, 90, 0),
        })
    }

    #[test]
    fn test_join_redelivery_yields_single_entry() {
        let mut store = bootstrapped(vec![]);
        let router = EventRouter::new(LIST);

        router.apply(&mut store, join_event(77));
        router.apply(&mut store, join_event(77));

        let players = store.game_list(LIST).unwrap().players.unwrap();
        assert_eq!(players.iter().filter(|p| p.id == 77).count(), 1);
        assert_eq!(players.len(), 4);
    }

    #[test]
    fn test_join_for_existing_player_is_noop() {
        let mut store = bootstrapped(vec![]);
        EventRouter::new(LIST).apply(&mut store, join_event(55));

        assert!(store.take_changes().is_empty());
        assert_eq!(store.game_list(LIST).unwrap().players.unwrap().len(), 3);
    }

    #[test]
    fn test_create_proof_added_for_non_achievers() {
        let mut store = bootstrapped(vec![]);
        let router = EventRouter::new(LIST);
        let nael = player(30, 25, 0);
        let event = RealtimeEvent::UserCreateProof(UserCreateProof {
            new_proof: proof(115, nael.clone(), vec![nael]),
            achievers_player_infos: vec![],
        });

        router.apply(&mut store, event.clone());
        router.apply(&mut store, event);

        assert_eq!(active_ids(&store), vec![115]);
    }

    #[test]
    fn test_create_proof_not_added_for_achievers() {
        let mut store = bootstrapped(vec![]);
        let erwan = player(55, LOCAL_USER, 44);
        let mut updated_info = erwan.clone();
        updated_info.challenge_infos = Some(vec![pending_info(proof(
            115,
            erwan.clone(),
            vec![erwan.clone()],
        ))]);

        EventRouter::new(LIST).apply(
            &mut store,
            RealtimeEvent::UserCreateProof(UserCreateProof {
                new_proof: proof(115, erwan.clone(), vec![erwan]),
                achievers_player_infos: vec![updated_info],
            }),
        );

        assert!(active_ids(&store).is_empty());
        // the creator's player info comes from its own HTTP response only
        assert!(store.player_info(LIST).unwrap().challenge_infos.is_none());
    }

    #[test]
    fn test_create_proof_co_achiever_gets_player_info() {
        let mut store = bootstrapped(vec![]);
        let creator = player(30, 25, 0);
        let erwan = player(55, LOCAL_USER, 44);
        let new_proof = proof(115, creator.clone(), vec![creator.clone(), erwan.clone()]);

        let mut erwan_info = erwan.clone();
        erwan_info.challenge_infos = Some(vec![pending_info(new_proof.clone())]);
        let mut creator_info = creator;
        creator_info.score = Some(999);

        EventRouter::new(LIST).apply(
            &mut store,
            RealtimeEvent::UserCreateProof(UserCreateProof {
                new_proof,
                achievers_player_infos: vec![creator_info, erwan_info],
            }),
        );

        assert!(active_ids(&store).is_empty());
        let info = store.player_info(LIST).unwrap();
        let infos = info.challenge_infos.unwrap();
        assert_eq!(infos[0].status, Some(ChallengeStatus::ValidationPending));
        assert_eq!(infos[0].associated_proof.clone().flatten().unwrap().id, 115);
        // the creator entry is not applied to anyone
        assert_eq!(store.player(LIST, 30).unwrap().score, Some(0));
    }

    #[test]
    fn test_vote_updates_stats_in_place_for_non_achievers() {
        let nael = player(30, 25, 0);
        let lou = player(31, 26, 10);
        let mut store = bootstrapped(vec![
            proof(114, lou.clone(), vec![lou]),
            proof(115, nael.clone(), vec![nael.clone()]),
            proof(116, nael.clone(), vec![nael.clone()]),
        ]);

        let mut voted = proof(115, nael.clone(), vec![nael]);
        voted.stats = Some(VoteStatistics::from_counts(1, 0, 8));
        let notes = EventRouter::new(LIST).apply(
            &mut store,
            RealtimeEvent::UserVoteProof(UserVoteProof {
                proof: voted,
                voter: player(31, 26, 10),
                has_validate: true,
            }),
        );

        assert!(notes.is_empty());
        assert_eq!(active_ids(&store), vec![114, 115, 116]);
        let stats = store.active_proofs(LIST).unwrap()[1].stats.clone().unwrap();
        assert_eq!(stats.validated_count, 1);
    }

    #[test]
    fn test_vote_for_unknown_proof_is_noop() {
        let mut store = bootstrapped(vec![]);
        let nael = player(30, 25, 0);
        EventRouter::new(LIST).apply(
            &mut store,
            RealtimeEvent::UserVoteProof(UserVoteProof {
                proof: proof(999, nael.clone(), vec![nael.clone()]),
                voter: nael,
                has_validate: false,
            }),
        );

        assert!(store.take_changes().is_empty());
        assert!(store.proof(999).is_none());
    }

    #[test]
    fn test_vote_notifies_achiever_without_mutation() {
        let erwan = player(55, LOCAL_USER, 44);
        let mut store = bootstrapped(vec![]);

        let mut voted = proof(115, erwan.clone(), vec![erwan]);
        voted.stats = Some(VoteStatistics::from_counts(1, 0, 8));
        let notes = EventRouter::new(LIST).apply(
            &mut store,
            RealtimeEvent::UserVoteProof(UserVoteProof {
                proof: voted,
                voter: player(30, 25, 0),
                has_validate: false,
            }),
        );

        assert_eq!(
            notes,
            vec![Notification::ProofVoted {
                game_list_id: LIST,
                proof_id: 115,
                voter_id: 30,
                voter_pseudo: Some("player-30".to_string()),
                has_validate: false,
            }]
        );
        assert!(store.take_changes().is_empty());
    }

    #[test]
    fn test_proof_completed_for_observer() {
        let nael = player(30, 25, 0);
        let mut store = bootstrapped(vec![proof(115, nael.clone(), vec![nael.clone()])]);

        let mut closed = proof(115, player(30, 25, 5), vec![player(30, 25, 5)]);
        closed.is_closed = Some(true);
        closed.closed_date = Some(Some("2021-06-30".to_string()));
        closed.has_been_validated = Some(Some(true));
        closed.stats = Some(VoteStatistics::from_counts(6, 0, 3));

        let mut nael_info = player(30, 25, 5);
        nael_info.challenge_infos = Some(vec![]);
        let event = RealtimeEvent::ProofCompleted(ProofCompleted {
            proof: closed,
            player_infos: vec![nael_info],
        });

        let router = EventRouter::new(LIST);
        let notes = router.apply(&mut store, event.clone());
        assert!(notes.is_empty());
        assert!(active_ids(&store).is_empty());
        let players = store.game_list(LIST).unwrap().players.unwrap();
        assert_eq!(players.iter().find(|p| p.id == 30).unwrap().score, Some(5));
        // not an achiever: our own player info is untouched
        assert_eq!(store.player_info(LIST).unwrap().id, 55);
        assert!(store.player_info(LIST).unwrap().challenge_infos.is_none());

        // redelivery changes nothing
        store.take_changes();
        router.apply(&mut store, event);
        assert!(store.take_changes().is_empty());
    }

    #[test]
    fn test_proof_completed_for_achiever() {
        let erwan = player(55, LOCAL_USER, 44);
        let mut store = bootstrapped(vec![]);
        store.replace_player_info(LIST, {
            let mut info = erwan.clone();
            info.challenge_infos = Some(vec![pending_info(proof(
                115,
                erwan.clone(),
                vec![erwan.clone()],
            ))]);
            info
        });

        let mut closed = proof(115, erwan.clone(), vec![player(55, LOCAL_USER, 49)]);
        closed.is_closed = Some(true);
        closed.has_been_validated = Some(Some(true));
        closed.stats = Some(VoteStatistics::from_counts(6, 0, 3));

        let mut final_info = player(55, LOCAL_USER, 49);
        final_info.challenge_infos = Some(vec![PlayerChallengeInfo {
            status: Some(ChallengeStatus::Validated),
            validate_date: Some(Some("2021-06-30".to_string())),
            // stale copy still attached by the backend
            associated_proof: Some(Some(proof(115, erwan.clone(), vec![erwan]))),
            player: None,
            challenge_gamelist: Some(ChallengeGameList { id: 5, parent: None }),
        }]);

        let event = RealtimeEvent::ProofCompleted(ProofCompleted {
            proof: closed,
            player_infos: vec![final_info],
        });
        let router = EventRouter::new(LIST);
        let notes = router.apply(&mut store, event.clone());

        assert_eq!(
            notes,
            vec![Notification::ProofCompleted {
                game_list_id: LIST,
                proof_id: 115,
                has_been_validated: Some(true),
            }]
        );
        let info = store.player_info(LIST).unwrap();
        assert_eq!(info.score, Some(49));
        let infos = info.challenge_infos.unwrap();
        assert_eq!(infos[0].status, Some(ChallengeStatus::Validated));
        assert_eq!(infos[0].associated_proof, Some(None));
        assert_eq!(store.proof(115).unwrap().is_closed, Some(true));

        let players = store.game_list(LIST).unwrap().players.unwrap();
        assert_eq!(players.iter().find(|p| p.id == 55).unwrap().score, Some(49));

        // redelivery does not notify twice
        assert!(router.apply(&mut store, event).is_empty());
    }

    #[test]
    fn test_pseudo_update() {
        let nael = player(30, 25, 0);
        let mut store = bootstrapped(vec![proof(115, nael.clone(), vec![nael])]);
        let router = EventRouter::new(LIST);

        let mut renamed = player(30, 25, 0);
        renamed.pseudo = Some("Wati bg du desert".to_string());
        router.apply(
            &mut store,
            RealtimeEvent::PlayerPseudoUpdated(PlayerPseudoUpdated { player: renamed }),
        );

        let players = store.game_list(LIST).unwrap().players.unwrap();
        let in_list = players.iter().find(|p| p.id == 30).unwrap();
        assert_eq!(in_list.pseudo.as_deref(), Some("Wati bg du desert"));
        let creator = store.active_proofs(LIST).unwrap()[0].creator.clone().unwrap();
        assert_eq!(&creator, in_list);
    }

    #[test]
    fn test_pseudo_update_for_unknown_player_is_noop() {
        let mut store = bootstrapped(vec![]);
        EventRouter::new(LIST).apply(
            &mut store,
            RealtimeEvent::PlayerPseudoUpdated(PlayerPseudoUpdated {
                player: player(88, 70, 0),
            }),
        );

        assert!(store.take_changes().is_empty());
        assert!(store.player(LIST, 88).is_none());
    }

    #[test]
    fn test_events_for_unloaded_list_are_noops() {
        let mut store = bootstrapped(vec![]);
        let router = EventRouter::new(6);
        let nael = player(30, 25, 0);

        router.apply(&mut store, join_event(77));
        router.apply(
            &mut store,
            RealtimeEvent::UserCreateProof(UserCreateProof {
                new_proof: proof(115, nael.clone(), vec![nael]),
                achievers_player_infos: vec![],
            }),
        );

        assert!(store.game_list(6).is_none());
        assert_eq!(store.active_proofs(6), None);
    }
}
