use serde::{Deserialize, Deserializer, Serialize};

/// Backend ids are plain integers, one namespace per entity type
pub type GameListId = u64;
pub type PlayerId = u64;
pub type ProofId = u64;
pub type ChallengeId = u64;
pub type ChallengeGameListId = u64;
pub type CategoryId = u64;
pub type ModeId = u64;
pub type MediaId = u64;
pub type UserId = u64;

/// Decode a nullable field so that an explicit `null` (`Some(None)`) stays
/// distinguishable from an absent key (`None`, via `#[serde(default)]`).
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Global identity, distinct from a Player
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Media {
    pub id: MediaId,
    pub url: Option<String>,
    pub path: Option<String>,
    pub uploaded_time: Option<String>,
    pub size: Option<f64>,
    /// image | audio | video
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// A challenge as seen from outside any game list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: ChallengeId,
    pub published_state: Option<String>,
    pub show_creator: Option<bool>,
    pub emoji: Option<String>,
    pub points: Option<i64>,
    pub title: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// Only resolved into views when `show_creator` is true
    pub creator: Option<User>,
    pub categories: Option<Vec<ChallengeCategory>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeCategory {
    pub id: CategoryId,
    pub title: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
    pub challenges: Option<Vec<Challenge>>,
}

/// Pivot: a challenge inside one game list. Its id is not the challenge id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChallengeGameList {
    pub id: ChallengeGameListId,
    pub parent: Option<Challenge>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameList {
    pub id: GameListId,
    pub title: Option<String>,
    pub code: Option<String>,
    /// YYYY-MM-DD
    pub deadline: Option<String>,
    pub creator: Option<User>,
    pub thumbnail: Option<Media>,
    pub players: Option<Vec<Player>>,
    pub challenges: Option<Vec<ChallengeGameList>>,
}

impl GameList {
    /// Parse the deadline, if present and well-formed
    pub fn deadline_date(&self) -> Option<chrono::NaiveDate> {
        let raw = self.deadline.as_deref()?;
        chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
    }
}

/// Predefined game list template (reference data only)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameListMode {
    pub id: ModeId,
    pub title: Option<String>,
    pub emoji: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
    pub color: Option<String>,
    pub thumbnail: Option<Media>,
    pub creator: Option<User>,
    pub challenges: Option<Vec<Challenge>>,
}

/// Pivot: a user's participation in one game list
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub pseudo: Option<String>,
    pub code: Option<String>,
    pub score: Option<i64>,
    pub user: Option<User>,
    pub challenge_infos: Option<Vec<PlayerChallengeInfo>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Normal,
    ValidationPending,
    Validated,
}

/// Status of one challenge for one player. Keyed by its challenge_gamelist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerChallengeInfo {
    pub status: Option<ChallengeStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub validate_date: Option<Option<String>>,
    /// Present iff status is validation_pending
    #[serde(default, deserialize_with = "nullable")]
    pub associated_proof: Option<Option<Proof>>,
    /// Back-reference to the owning player; ignored on ingest
    pub player: Option<Box<Player>>,
    pub challenge_gamelist: Option<ChallengeGameList>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Proof {
    pub id: ProofId,
    pub creator: Option<Player>,
    pub is_closed: Option<bool>,
    #[serde(default, deserialize_with = "nullable")]
    pub closed_date: Option<Option<String>>,
    /// null until the proof is closed
    #[serde(default, deserialize_with = "nullable")]
    pub has_been_validated: Option<Option<bool>>,
    pub challenge_gamelist: Option<ChallengeGameList>,
    pub achievers: Option<Vec<Player>>,
    pub media: Option<Media>,
    pub stats: Option<VoteStatistics>,
}

impl Proof {
    pub fn achiever_ids(&self) -> Vec<PlayerId> {
        self.achievers
            .iter()
            .flatten()
            .map(|player| player.id)
            .collect()
    }
}

/// Vote tally computed by the backend for one proof
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteStatistics {
    pub voters_count: u32,
    pub validated_percent: f64,
    pub refused_percent: f64,
    pub no_voted_percent: f64,
    pub validated_count: u32,
    pub refused_count: u32,
    pub no_voted_count: u32,
    pub validation_progression_percent: f64,
    pub is_majority_validated: bool,
    pub is_majority_refused: bool,
}

/// Allowed drift of the percent sum caused by backend rounding
const PERCENT_TOLERANCE: f64 = 1.0;

fn percent(count: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        f64::from(count) * 100.0 / f64::from(total)
    }
}

fn is_majority(count: u32, total: u32) -> bool {
    u64::from(count) * 2 > u64::from(total)
}

impl VoteStatistics {
    /// Derive a full tally from raw counts. The voter total saturates.
    pub fn from_counts(validated: u32, refused: u32, no_voted: u32) -> Self {
        let total = u64::from(validated) + u64::from(refused) + u64::from(no_voted);
        let voters = u32::try_from(total).unwrap_or(u32::MAX);
        Self {
            voters_count: voters,
            validated_percent: percent(validated, voters),
            refused_percent: percent(refused, voters),
            no_voted_percent: percent(no_voted, voters),
            validated_count: validated,
            refused_count: refused,
            no_voted_count: no_voted,
            validation_progression_percent: percent(validated.saturating_add(refused), voters),
            is_majority_validated: is_majority(validated, voters),
            is_majority_refused: is_majority(refused, voters),
        }
    }

    /// Check the count sum, the percent sum and the majority flags
    pub fn is_consistent(&self) -> bool {
        let counted = self
            .validated_count
            .checked_add(self.refused_count)
            .and_then(|sum| sum.checked_add(self.no_voted_count));
        if counted != Some(self.voters_count) {
            return false;
        }
        if self.is_majority_validated != is_majority(self.validated_count, self.voters_count)
            || self.is_majority_refused != is_majority(self.refused_count, self.voters_count)
        {
            return false;
        }
        if self.voters_count == 0 {
            return true;
        }
        let percent_sum = self.validated_percent + self.refused_percent + self.no_voted_percent;
        (percent_sum - 100.0).abs() <= PERCENT_TOLERANCE
    }
}
