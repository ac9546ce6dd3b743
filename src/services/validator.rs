//! Anti-cheat score validation. Read-only over the player's current entry so
//! a rejected or retried submission never mutates state.

use crate::config::GameConfig;
use crate::error::AppError;
use crate::models::leaderboard::RankingEntry;
use tracing::warn;

/// Validates a proposed score against the player's current entry (absent
/// entry means current score 0 and no cooldown reference).
pub fn validate(
    current: Option<&RankingEntry>,
    proposed_score: i64,
    now: i64,
    cfg: &GameConfig,
) -> Result<(), AppError> {
    if proposed_score < 0 {
        return Err(AppError::BadRequest("Score cannot be negative".into()));
    }
    if proposed_score > cfg.max_score {
        return Err(AppError::BadRequest(format!(
            "Score exceeds maximum of {}",
            cfg.max_score
        )));
    }

    let current_score = current.map(|e| e.score).unwrap_or(0);
    let max_increase = cfg.max_allowed_increase(current_score);
    if proposed_score > current_score + max_increase {
        warn!(
            current = current_score,
            proposed = proposed_score,
            max_increase,
            "suspicious score increase rejected"
        );
        return Err(AppError::ScoreJumpTooLarge {
            current: current_score,
            proposed: proposed_score,
            max_increase,
        });
    }

    if let Some(entry) = current {
        let elapsed = now - entry.updated_at;
        if elapsed < cfg.cooldown_secs {
            return Err(AppError::SubmissionTooFrequent {
                retry_after_secs: cfg.cooldown_secs - elapsed,
            });
        }
    }

    Ok(())
}
