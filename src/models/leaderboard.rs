use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    Classic,
    Tournament,
}

impl GameMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameMode::Classic => "classic",
            GameMode::Tournament => "tournament",
        }
    }

    pub fn parse(s: &str) -> Option<GameMode> {
        match s {
            "classic" => Some(GameMode::Classic),
            "tournament" => Some(GameMode::Tournament),
            _ => None,
        }
    }
}

/// One leaderboard row: the single source of truth for a player's standing in
/// a game mode. Timestamps are Unix seconds.
#[derive(Debug, Clone)]
pub struct RankingEntry {
    pub player_id: Uuid,
    pub game_mode: GameMode,
    pub score: i64,
    pub updated_at: i64,
    pub registration_date: i64,
    pub player_level: i64,
    pub trophy_count: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmitScoreRequest {
    pub game_mode: GameMode,
    pub score: i64,
    pub player_level: Option<i64>,
    pub trophy_count: Option<i64>,
    /// Optional bonus multiplier name, resolved by the BonusEvaluator.
    pub bonus: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitScoreResult {
    pub player_id: Uuid,
    pub score: i64,
    pub rank: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub player_id: Uuid,
    pub score: i64,
    pub rank: i64,
}

#[derive(Debug, Deserialize)]
pub struct TopQuery {
    pub mode: Option<String>,
    pub n: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct StandingQuery {
    pub mode: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AroundQuery {
    pub mode: Option<String>,
    pub k: Option<i64>,
}
