//! Canonical entity cache.
//!
//! Every entity lives exactly once, keyed by id (players and challenge pivots
//! by `(game list, id)`). Relations between records are ids, so the same player
//! shown in a game list and inside a proof is always the same record. Views
//! handed to callers are resolved from the records on demand (see `resolve`).

mod records;
mod resolve;

use crate::types::*;
use records::*;
use std::collections::{HashMap, HashSet};

/// Identifies a record whose state changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    GameList(GameListId),
    Player(GameListId, PlayerId),
    ChallengeGameList(GameListId, ChallengeGameListId),
    Proof(ProofId),
    Challenge(ChallengeId),
    Category(CategoryId),
    Media(MediaId),
    User(UserId),
    ActiveProofs(GameListId),
    PlayerInfo(GameListId),
    ReferenceData,
}

impl EntityKey {
    /// Game list a game-list-scoped key belongs to
    pub fn game_list_scope(&self) -> Option<GameListId> {
        match self {
            EntityKey::GameList(id)
            | EntityKey::ActiveProofs(id)
            | EntityKey::PlayerInfo(id)
            | EntityKey::Player(id, _)
            | EntityKey::ChallengeGameList(id, _) => Some(*id),
            _ => None,
        }
    }
}

/// How an upsert treats the root entity's existing record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Absent fields keep their value, arrays are id-unioned
    Merge,
    /// Start from an empty record: omitted fields and array entries are dropped
    Replace,
}

/// Read-only listings fetched outside the reconciliation flow
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub game_list_modes: Vec<GameListMode>,
    pub challenge_categories: Vec<ChallengeCategory>,
}

/// One session's worth of cached state
#[derive(Debug, Default)]
pub struct Store {
    game_lists: HashMap<GameListId, GameListRecord>,
    /// `gameLists`, in arrival order
    game_list_order: Vec<GameListId>,
    players: HashMap<(GameListId, PlayerId), PlayerRecord>,
    challenge_gamelists: HashMap<(GameListId, ChallengeGameListId), ChallengeGameListRecord>,
    proofs: HashMap<ProofId, ProofRecord>,
    challenges: HashMap<ChallengeId, ChallengeRecord>,
    categories: HashMap<CategoryId, CategoryRecord>,
    media: HashMap<MediaId, Media>,
    users: HashMap<UserId, User>,
    /// `activeProofs`: a missing key means never loaded, not empty
    active_proofs: HashMap<GameListId, Vec<ProofId>>,
    /// `playerInfos`: the local user's player in each list
    player_infos: HashMap<GameListId, PlayerId>,
    /// Proofs the user stepped away from after voting
    dismissed: HashMap<GameListId, HashSet<ProofId>>,
    local_user: Option<User>,
    reference: ReferenceData,
    changes: Vec<EntityKey>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything and start a session for the given user
    pub fn start_session(&mut self, user: Option<User>) {
        *self = Self::default();
        if let Some(user) = user {
            self.upsert_user(user.clone());
            self.local_user = Some(user);
        }
    }

    /// Teardown on logout
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn local_user(&self) -> Option<&User> {
        self.local_user.as_ref()
    }

    pub fn reference_data(&self) -> &ReferenceData {
        &self.reference
    }

    /// Drain change notifications recorded since the last call
    pub fn take_changes(&mut self) -> Vec<EntityKey> {
        std::mem::take(&mut self.changes)
    }

    /// Game list a changed record is shown in; None when it may appear in any
    pub fn change_scope(&self, key: &EntityKey) -> Option<GameListId> {
        match key {
            EntityKey::Proof(id) => self.proofs.get(id).map(|record| record.game_list),
            key => key.game_list_scope(),
        }
    }

    fn mark(&mut self, key: EntityKey) {
        if !self.changes.contains(&key) {
            self.changes.push(key);
        }
    }

    // ========== Upserts ==========

    pub fn upsert_user(&mut self, user: User) -> UserId {
        let id = user.id;
        let before = self.users.get(&id).cloned();
        let mut record = before.clone().unwrap_or_else(|| User {
            id,
            ..Default::default()
        });
        merge_field(&mut record.username, user.username);
        merge_field(&mut record.email, user.email);

        if before.as_ref() != Some(&record) {
            self.users.insert(id, record);
            self.mark(EntityKey::User(id));
        }
        id
    }

    /// Media never changes once created; later payloads only fill gaps
    pub fn upsert_media(&mut self, media: Media) -> MediaId {
        let id = media.id;
        let before = self.media.get(&id).cloned();
        let mut record = before.clone().unwrap_or_else(|| Media {
            id,
            ..Default::default()
        });
        fill_field(&mut record.url, media.url);
        fill_field(&mut record.path, media.path);
        fill_field(&mut record.uploaded_time, media.uploaded_time);
        fill_field(&mut record.size, media.size);
        fill_field(&mut record.kind, media.kind);

        if before.as_ref() != Some(&record) {
            self.media.insert(id, record);
            self.mark(EntityKey::Media(id));
        }
        id
    }

    pub fn upsert_category(&mut self, category: ChallengeCategory) -> CategoryId {
        let id = category.id;
        let challenges = category.challenges.map(|challenges| {
            challenges
                .into_iter()
                .map(|challenge| self.upsert_challenge(challenge))
                .collect::<Vec<_>>()
        });

        let before = self.categories.get(&id).cloned();
        let mut record = before.clone().unwrap_or(CategoryRecord {
            id,
            title: None,
            color: None,
            is_active: None,
            challenges: None,
        });
        merge_field(&mut record.title, category.title);
        merge_field(&mut record.color, category.color);
        merge_field(&mut record.is_active, category.is_active);
        union_ids(&mut record.challenges, challenges);

        if before.as_ref() != Some(&record) {
            self.categories.insert(id, record);
            self.mark(EntityKey::Category(id));
        }
        id
    }

    pub fn upsert_challenge(&mut self, challenge: Challenge) -> ChallengeId {
        let id = challenge.id;
        let creator = challenge.creator.map(|user| self.upsert_user(user));
        let categories = challenge.categories.map(|categories| {
            categories
                .into_iter()
                .map(|category| self.upsert_category(category))
                .collect::<Vec<_>>()
        });

        let before = self.challenges.get(&id).cloned();
        let mut record = before.clone().unwrap_or_else(|| ChallengeRecord::new(id));
        merge_field(&mut record.published_state, challenge.published_state);
        merge_field(&mut record.show_creator, challenge.show_creator);
        merge_field(&mut record.emoji, challenge.emoji);
        merge_field(&mut record.points, challenge.points);
        merge_field(&mut record.title, challenge.title);
        merge_field(&mut record.created_at, challenge.created_at);
        merge_field(&mut record.updated_at, challenge.updated_at);
        merge_field(&mut record.creator, creator);
        union_ids(&mut record.categories, categories);

        if before.as_ref() != Some(&record) {
            self.challenges.insert(id, record);
            self.mark(EntityKey::Challenge(id));
        }
        id
    }

    pub fn upsert_challenge_game_list(
        &mut self,
        scope: GameListId,
        pivot: ChallengeGameList,
    ) -> ChallengeGameListId {
        let id = pivot.id;
        let parent = pivot.parent.map(|challenge| self.upsert_challenge(challenge));

        let key = (scope, id);
        let before = self.challenge_gamelists.get(&key).cloned();
        let mut record = before
            .clone()
            .unwrap_or(ChallengeGameListRecord { id, parent: None });
        merge_field(&mut record.parent, parent);

        if before.as_ref() != Some(&record) {
            self.challenge_gamelists.insert(key, record);
            self.mark(EntityKey::ChallengeGameList(scope, id));
        }
        id
    }

    pub fn upsert_player(&mut self, scope: GameListId, player: Player, mode: MergeMode) -> PlayerId {
        let id = player.id;
        let user = player.user.map(|user| self.upsert_user(user));
        let infos = player
            .challenge_infos
            .map(|infos| self.ingest_challenge_infos(scope, id, infos));

        let key = (scope, id);
        let before = self.players.get(&key).cloned();
        let mut record = match mode {
            MergeMode::Merge => before.clone().unwrap_or_else(|| PlayerRecord::new(id)),
            MergeMode::Replace => {
                let mut fresh = PlayerRecord::new(id);
                // The user behind a pivot never changes
                fresh.user = before.as_ref().and_then(|record| record.user);
                fresh
            }
        };
        merge_field(&mut record.pseudo, player.pseudo);
        merge_field(&mut record.code, player.code);
        merge_field(&mut record.score, player.score);
        merge_field(&mut record.user, user);
        if let Some(infos) = infos {
            union_infos(&mut record.challenge_infos, infos);
        }

        if before.as_ref() != Some(&record) {
            self.players.insert(key, record);
            self.mark(EntityKey::Player(scope, id));
        }
        id
    }

    fn ingest_challenge_infos(
        &mut self,
        scope: GameListId,
        player_id: PlayerId,
        infos: Vec<PlayerChallengeInfo>,
    ) -> Vec<ChallengeInfoRecord> {
        let mut records = Vec::with_capacity(infos.len());
        for info in infos {
            let Some(pivot) = info.challenge_gamelist else {
                tracing::warn!(
                    "Skipping challenge info without challenge_gamelist for player {} in list {}",
                    player_id,
                    scope
                );
                continue;
            };
            let challenge_gamelist = self.upsert_challenge_game_list(scope, pivot);
            let associated_proof = info
                .associated_proof
                .map(|proof| proof.map(|proof| self.upsert_proof(scope, proof)));

            let mut record = ChallengeInfoRecord {
                challenge_gamelist,
                status: info.status,
                validate_date: info.validate_date,
                associated_proof,
            };
            record.enforce_proof_link();
            records.push(record);
        }
        records
    }

    /// Closing is terminal: once closed, payloads that don't also say closed
    /// cannot touch the lifecycle fields or the stats.
    pub fn upsert_proof(&mut self, scope: GameListId, proof: Proof) -> ProofId {
        let id = proof.id;
        let creator = proof
            .creator
            .map(|player| self.upsert_player(scope, player, MergeMode::Merge));
        let achievers = proof.achievers.map(|players| {
            players
                .into_iter()
                .map(|player| self.upsert_player(scope, player, MergeMode::Merge))
                .collect::<Vec<_>>()
        });
        let challenge_gamelist = proof
            .challenge_gamelist
            .map(|pivot| self.upsert_challenge_game_list(scope, pivot));
        let media = proof.media.map(|media| self.upsert_media(media));

        let before = self.proofs.get(&id).cloned();
        let mut record = before
            .clone()
            .unwrap_or_else(|| ProofRecord::new(id, scope));
        merge_field(&mut record.creator, creator);
        merge_field(&mut record.challenge_gamelist, challenge_gamelist);
        merge_field(&mut record.media, media);
        union_ids(&mut record.achievers, achievers);

        if record.is_closed() && proof.is_closed != Some(true) {
            tracing::debug!("Ignoring stale lifecycle update for closed proof {}", id);
        } else {
            merge_field(&mut record.is_closed, proof.is_closed);
            merge_field(&mut record.closed_date, proof.closed_date);
            merge_field(&mut record.has_been_validated, proof.has_been_validated);
            match proof.stats {
                Some(stats) if !stats.is_consistent() => {
                    tracing::warn!("Dropping inconsistent vote statistics for proof {}", id);
                }
                stats => merge_field(&mut record.stats, stats),
            }
        }

        if before.as_ref() != Some(&record) {
            self.proofs.insert(id, record);
            self.mark(EntityKey::Proof(id));
        }
        id
    }

    /// Upsert into `gameLists`, appending the id if it is new
    pub fn upsert_game_list(&mut self, list: GameList, mode: MergeMode) -> GameListId {
        let id = list.id;
        let creator = list.creator.map(|user| self.upsert_user(user));
        let thumbnail = list.thumbnail.map(|media| self.upsert_media(media));
        let players = list.players.map(|players| {
            players
                .into_iter()
                .map(|player| self.upsert_player(id, player, MergeMode::Merge))
                .collect::<Vec<_>>()
        });
        let challenges = list.challenges.map(|pivots| {
            pivots
                .into_iter()
                .map(|pivot| self.upsert_challenge_game_list(id, pivot))
                .collect::<Vec<_>>()
        });

        let before = self.game_lists.get(&id).cloned();
        let mut record = match mode {
            MergeMode::Merge => before.clone().unwrap_or_else(|| GameListRecord::new(id)),
            MergeMode::Replace => GameListRecord::new(id),
        };
        merge_field(&mut record.title, list.title);
        merge_field(&mut record.code, list.code);
        merge_field(&mut record.deadline, list.deadline);
        merge_field(&mut record.creator, creator);
        merge_field(&mut record.thumbnail, thumbnail);
        match mode {
            MergeMode::Merge => {
                union_ids(&mut record.players, players);
                union_ids(&mut record.challenges, challenges);
            }
            MergeMode::Replace => {
                replace_ids(&mut record.players, players);
                replace_ids(&mut record.challenges, challenges);
            }
        }

        if before.as_ref() != Some(&record) {
            self.game_lists.insert(id, record);
            self.mark(EntityKey::GameList(id));
        }
        if !self.game_list_order.contains(&id) {
            self.game_list_order.push(id);
            self.mark(EntityKey::GameList(id));
        }
        id
    }

    // ========== Game list players ==========

    pub fn has_game_list(&self, id: GameListId) -> bool {
        self.game_lists.contains_key(&id)
    }

    pub fn game_list_ids(&self) -> Vec<GameListId> {
        self.game_list_order.clone()
    }

    /// Every list id the store knows anything about
    pub fn known_game_list_ids(&self) -> Vec<GameListId> {
        let mut ids = self.game_list_order.clone();
        for id in self.active_proofs.keys().chain(self.player_infos.keys()) {
            if !ids.contains(id) {
                ids.push(*id);
            }
        }
        ids
    }

    pub fn game_list_has_player(&self, list: GameListId, player_id: PlayerId) -> bool {
        self.game_lists
            .get(&list)
            .and_then(|record| record.players.as_ref())
            .is_some_and(|players| players.contains(&player_id))
    }

    /// Append a player to a loaded list unless an entry with that id exists
    pub fn append_game_list_player(&mut self, list: GameListId, player: Player) -> bool {
        let player_id = player.id;
        if !self.has_game_list(list) {
            tracing::debug!("Game list {} not loaded, ignoring player {}", list, player_id);
            return false;
        }
        if self.game_list_has_player(list, player_id) {
            tracing::debug!("Player {} already in game list {}", player_id, list);
            return false;
        }

        self.upsert_player(list, player, MergeMode::Merge);
        if let Some(record) = self.game_lists.get_mut(&list) {
            record.players.get_or_insert_with(Vec::new).push(player_id);
        }
        self.mark(EntityKey::GameList(list));
        true
    }

    // ========== Active proofs ==========

    /// Replace `activeProofs[list]` wholesale
    pub fn set_active_proofs(&mut self, list: GameListId, proofs: Vec<Proof>) {
        let mut ids = Vec::with_capacity(proofs.len());
        for proof in proofs {
            let id = self.upsert_proof(list, proof);
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        // The authoritative list overrides earlier dismissals
        self.dismissed.remove(&list);

        if self.active_proofs.get(&list) != Some(&ids) {
            self.active_proofs.insert(list, ids);
            self.mark(EntityKey::ActiveProofs(list));
        }
    }

    pub fn has_active_proofs(&self, list: GameListId) -> bool {
        self.active_proofs.contains_key(&list)
    }

    pub fn contains_active_proof(&self, list: GameListId, proof_id: ProofId) -> bool {
        self.active_proofs
            .get(&list)
            .is_some_and(|ids| ids.contains(&proof_id))
    }

    /// List whose active proofs hold the given proof
    pub fn find_active_proof_list(&self, proof_id: ProofId) -> Option<GameListId> {
        self.active_proofs
            .iter()
            .find(|(_, ids)| ids.contains(&proof_id))
            .map(|(list, _)| *list)
    }

    /// Append an open proof to a loaded list unless already present
    pub fn add_active_proof(&mut self, list: GameListId, proof: Proof) -> bool {
        let proof_id = proof.id;
        if !self.has_active_proofs(list) {
            tracing::debug!("Active proofs of list {} not loaded, ignoring proof {}", list, proof_id);
            return false;
        }
        if self
            .dismissed
            .get(&list)
            .is_some_and(|dismissed| dismissed.contains(&proof_id))
        {
            tracing::debug!("Proof {} was dismissed in list {}", proof_id, list);
            return false;
        }

        self.upsert_proof(list, proof);
        if self.proof_is_closed(proof_id) {
            tracing::debug!("Proof {} is already closed, not adding it to list {}", proof_id, list);
            return false;
        }

        let Some(ids) = self.active_proofs.get_mut(&list) else {
            return false;
        };
        if ids.contains(&proof_id) {
            return false;
        }
        ids.push(proof_id);
        self.mark(EntityKey::ActiveProofs(list));
        true
    }

    /// Remove a proof from `activeProofs[list]`; absent ids are a no-op
    pub fn remove_active_proof(&mut self, list: GameListId, proof_id: ProofId) -> bool {
        let Some(ids) = self.active_proofs.get_mut(&list) else {
            return false;
        };
        let len = ids.len();
        ids.retain(|id| *id != proof_id);
        if ids.len() == len {
            return false;
        }
        self.mark(EntityKey::ActiveProofs(list));
        true
    }

    /// Remove a proof the user is done with and keep it from coming back
    pub fn dismiss_active_proof(&mut self, list: GameListId, proof_id: ProofId) -> bool {
        if !self.has_active_proofs(list) {
            return false;
        }
        self.dismissed.entry(list).or_default().insert(proof_id);
        self.remove_active_proof(list, proof_id)
    }

    pub fn proof_is_closed(&self, proof_id: ProofId) -> bool {
        self.proofs
            .get(&proof_id)
            .is_some_and(|record| record.is_closed())
    }

    // ========== Player infos and local identity ==========

    /// Replace `playerInfos[list]` with an authoritative snapshot
    pub fn replace_player_info(&mut self, list: GameListId, player: Player) {
        let id = self.upsert_player(list, player, MergeMode::Replace);
        if self.player_infos.insert(list, id) != Some(id) {
            self.mark(EntityKey::PlayerInfo(list));
        }
    }

    pub fn local_player_id(&self, list: GameListId) -> Option<PlayerId> {
        self.player_infos.get(&list).copied()
    }

    /// Whether a player of this list is the authenticated user. The list's
    /// player info decides when loaded; otherwise the user id is compared.
    pub fn is_local_player(&self, list: GameListId, player: &Player) -> bool {
        let user_id = player.user.as_ref().map(|user| user.id);
        self.is_local_player_id(list, player.id, user_id)
    }

    fn is_local_player_id(
        &self,
        list: GameListId,
        player_id: PlayerId,
        user_id: Option<UserId>,
    ) -> bool {
        if let Some(local) = self.local_player_id(list) {
            return local == player_id;
        }
        let Some(local_user) = self.local_user.as_ref() else {
            return false;
        };
        let user_id = user_id.or_else(|| {
            self.players
                .get(&(list, player_id))
                .and_then(|record| record.user)
        });
        user_id == Some(local_user.id)
    }

    /// Whether the authenticated user achieved the proof. The payload's
    /// achievers are used when present, the cached ones otherwise.
    pub fn is_local_achiever(&self, list: GameListId, proof: &Proof) -> bool {
        match &proof.achievers {
            Some(achievers) => achievers
                .iter()
                .any(|player| self.is_local_player(list, player)),
            None => self
                .proofs
                .get(&proof.id)
                .and_then(|record| record.achievers.as_ref())
                .is_some_and(|ids| {
                    ids.iter()
                        .any(|id| self.is_local_player_id(list, *id, None))
                }),
        }
    }

    // ========== Reference data ==========

    pub fn set_game_list_modes(&mut self, modes: Vec<GameListMode>) {
        self.reference.game_list_modes = modes;
        self.mark(EntityKey::ReferenceData);
    }

    pub fn set_challenge_categories(&mut self, categories: Vec<ChallengeCategory>) {
        self.reference.challenge_categories = categories;
        self.mark(EntityKey::ReferenceData);
    }
}
