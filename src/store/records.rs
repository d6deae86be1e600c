//! Normalized canonical records. Relations hold ids, never owned copies.

use crate::types::*;

/// Monotonic merge: an absent incoming value never clears what we hold.
/// Nullable fields are `Option<Option<T>>`, so an explicit null still lands.
pub(crate) fn merge_field<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if let Some(value) = incoming {
        *slot = Some(value);
    }
}

/// Fill a field only if we never had it (immutable entities)
pub(crate) fn fill_field<T>(slot: &mut Option<T>, incoming: Option<T>) {
    if slot.is_none() {
        *slot = incoming;
    }
}

/// Id-union: keep existing order, append unseen ids
pub(crate) fn union_ids<K: PartialEq>(slot: &mut Option<Vec<K>>, incoming: Option<Vec<K>>) {
    let Some(incoming) = incoming else {
        return;
    };
    let ids = slot.get_or_insert_with(Vec::new);
    for id in incoming {
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
}

/// Full replacement of an id array, still without duplicates
pub(crate) fn replace_ids<K: PartialEq>(slot: &mut Option<Vec<K>>, incoming: Option<Vec<K>>) {
    *slot = None;
    union_ids(slot, incoming);
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GameListRecord {
    pub id: GameListId,
    pub title: Option<String>,
    pub code: Option<String>,
    pub deadline: Option<String>,
    pub creator: Option<UserId>,
    pub thumbnail: Option<MediaId>,
    pub players: Option<Vec<PlayerId>>,
    pub challenges: Option<Vec<ChallengeGameListId>>,
}

impl GameListRecord {
    pub fn new(id: GameListId) -> Self {
        Self {
            id,
            title: None,
            code: None,
            deadline: None,
            creator: None,
            thumbnail: None,
            players: None,
            challenges: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PlayerRecord {
    pub id: PlayerId,
    pub pseudo: Option<String>,
    pub code: Option<String>,
    pub score: Option<i64>,
    pub user: Option<UserId>,
    pub challenge_infos: Option<Vec<ChallengeInfoRecord>>,
}

impl PlayerRecord {
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            pseudo: None,
            code: None,
            score: None,
            user: None,
            challenge_infos: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChallengeInfoRecord {
    pub challenge_gamelist: ChallengeGameListId,
    pub status: Option<ChallengeStatus>,
    pub validate_date: Option<Option<String>>,
    pub associated_proof: Option<Option<ProofId>>,
}

impl ChallengeInfoRecord {
    pub fn merge(&mut self, incoming: ChallengeInfoRecord) {
        merge_field(&mut self.status, incoming.status);
        merge_field(&mut self.validate_date, incoming.validate_date);
        merge_field(&mut self.associated_proof, incoming.associated_proof);
        self.enforce_proof_link();
    }

    /// A proof is only associated while validation is pending
    pub fn enforce_proof_link(&mut self) {
        if matches!(self.status, Some(status) if status != ChallengeStatus::ValidationPending) {
            self.associated_proof = Some(None);
        }
    }
}

/// Merge challenge infos keyed by their challenge_gamelist id
pub(crate) fn union_infos(
    slot: &mut Option<Vec<ChallengeInfoRecord>>,
    incoming: Vec<ChallengeInfoRecord>,
) {
    let infos = slot.get_or_insert_with(Vec::new);
    for info in incoming {
        match infos
            .iter_mut()
            .find(|existing| existing.challenge_gamelist == info.challenge_gamelist)
        {
            Some(existing) => existing.merge(info),
            None => infos.push(info),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProofRecord {
    pub id: ProofId,
    /// Game list the proof was first seen in; scopes its players
    pub game_list: GameListId,
    pub creator: Option<PlayerId>,
    pub is_closed: Option<bool>,
    pub closed_date: Option<Option<String>>,
    pub has_been_validated: Option<Option<bool>>,
    pub challenge_gamelist: Option<ChallengeGameListId>,
    pub achievers: Option<Vec<PlayerId>>,
    pub media: Option<MediaId>,
    pub stats: Option<VoteStatistics>,
}

impl ProofRecord {
    pub fn new(id: ProofId, game_list: GameListId) -> Self {
        Self {
            id,
            game_list,
            creator: None,
            is_closed: None,
            closed_date: None,
            has_been_validated: None,
            challenge_gamelist: None,
            achievers: None,
            media: None,
            stats: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed == Some(true)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChallengeGameListRecord {
    pub id: ChallengeGameListId,
    pub parent: Option<ChallengeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ChallengeRecord {
    pub id: ChallengeId,
    pub published_state: Option<String>,
    pub show_creator: Option<bool>,
    pub emoji: Option<String>,
    pub points: Option<i64>,
    pub title: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub creator: Option<UserId>,
    pub categories: Option<Vec<CategoryId>>,
}

impl ChallengeRecord {
    pub fn new(id: ChallengeId) -> Self {
        Self {
            id,
            published_state: None,
            show_creator: None,
            emoji: None,
            points: None,
            title: None,
            created_at: None,
            updated_at: None,
            creator: None,
            categories: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CategoryRecord {
    pub id: CategoryId,
    pub title: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
    pub challenges: Option<Vec<ChallengeId>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_field_keeps_existing_on_absent() {
        let mut slot = Some(44);
        merge_field(&mut slot, None);
        assert_eq!(slot, Some(44));
        merge_field(&mut slot, Some(49));
        assert_eq!(slot, Some(49));
    }

    #[test]
    fn test_merge_field_explicit_null_overwrites() {
        let mut slot: Option<Option<String>> = Some(Some("2021-06-30".to_string()));
        merge_field(&mut slot, Some(None));
        assert_eq!(slot, Some(None));
    }

    #[test]
    fn test_fill_field_never_overwrites() {
        let mut slot = Some("a".to_string());
        fill_field(&mut slot, Some("b".to_string()));
        assert_eq!(slot.as_deref(), Some("a"));

        let mut empty = None;
        fill_field(&mut empty, Some(1));
        assert_eq!(empty, Some(1));
    }

    #[test]
    fn test_union_ids() {
        let mut slot = Some(vec![1, 2]);
        union_ids(&mut slot, Some(vec![2, 3, 3]));
        assert_eq!(slot, Some(vec![1, 2, 3]));

        union_ids(&mut slot, None);
        assert_eq!(slot, Some(vec![1, 2, 3]));

        let mut unset: Option<Vec<u64>> = None;
        union_ids(&mut unset, Some(vec![]));
        assert_eq!(unset, Some(vec![]));
    }

    #[test]
    fn test_replace_ids() {
        let mut slot = Some(vec![1, 2]);
        replace_ids(&mut slot, Some(vec![3, 3, 4]));
        assert_eq!(slot, Some(vec![3, 4]));
    }

    #[test]
    fn test_info_proof_link_cleared_when_not_pending() {
        let mut info = ChallengeInfoRecord {
            challenge_gamelist: 5,
            status: Some(ChallengeStatus::ValidationPending),
            validate_date: Some(None),
            associated_proof: Some(Some(115)),
        };
        info.merge(ChallengeInfoRecord {
            challenge_gamelist: 5,
            status: Some(ChallengeStatus::Validated),
            validate_date: Some(Some("2021-06-30".to_string())),
            associated_proof: None,
        });

        assert_eq!(info.status, Some(ChallengeStatus::Validated));
        assert_eq!(info.associated_proof, Some(None));
    }

    #[test]
    fn test_union_infos_keyed_by_challenge() {
        let mut slot = None;
        union_infos(
            &mut slot,
            vec![ChallengeInfoRecord {
                challenge_gamelist: 5,
                status: Some(ChallengeStatus::Normal),
                validate_date: None,
                associated_proof: None,
            }],
        );
        union_infos(
            &mut slot,
            vec![
                ChallengeInfoRecord {
                    challenge_gamelist: 5,
                    status: Some(ChallengeStatus::ValidationPending),
                    validate_date: None,
                    associated_proof: Some(Some(115)),
                },
                ChallengeInfoRecord {
                    challenge_gamelist: 6,
                    status: None,
                    validate_date: None,
                    associated_proof: None,
                },
            ],
        );

        let infos = slot.unwrap();
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].status, Some(ChallengeStatus::ValidationPending));
        assert_eq!(infos[0].associated_proof, Some(Some(115)));
        assert_eq!(infos[1].challenge_gamelist, 6);
    }
}
