//! The user-visible leaderboard operations: the submission pipeline and the
//! three read paths (top, my standing, around me). The pipeline runs its
//! guard stages in a fixed order and mutates nothing before the transaction:
//! freshness -> idempotency reservation -> bonus -> validation -> transaction
//! -> cache invalidation -> completion marker.

use crate::cache::TtlCache;
use crate::config::GameConfig;
use crate::db::Db;
use crate::error::AppError;
use crate::guards;
use crate::models::leaderboard::{
    GameMode, RankedEntry, RankingEntry, SubmitScoreRequest, SubmitScoreResult,
};
use crate::services::bonus::BonusEvaluator;
use crate::services::{store, validator};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

fn top_cache_key(mode: GameMode, width: i64) -> String {
    format!("lb:top:{}:{}", mode.as_str(), width)
}

pub fn submit_score(
    db: &Db,
    cache: &TtlCache,
    cfg: &GameConfig,
    bonus: &dyn BonusEvaluator,
    player_id: Uuid,
    timestamp_header: Option<&str>,
    idempotency_header: Option<&str>,
    req: SubmitScoreRequest,
) -> Result<SubmitScoreResult, AppError> {
    let now = Utc::now().timestamp();
    guards::check_freshness(timestamp_header, now, cfg)?;
    let idem_key = guards::admit(cache, player_id, idempotency_header, cfg)?;

    let outcome = execute_submission(db, cfg, bonus, player_id, now, req);
    match &outcome {
        Ok(result) => {
            // Delete, not refresh: the next reader rebuilds from the store.
            cache.delete(&top_cache_key(result.game_mode, cfg.cache_width));
            guards::mark_complete(cache, &idem_key, cfg);
        }
        Err(_) => guards::release(cache, &idem_key),
    }
    outcome.map(|r| r.response)
}

struct SubmissionOutcome {
    game_mode: GameMode,
    response: SubmitScoreResult,
}

fn execute_submission(
    db: &Db,
    cfg: &GameConfig,
    bonus: &dyn BonusEvaluator,
    player_id: Uuid,
    now: i64,
    req: SubmitScoreRequest,
) -> Result<SubmissionOutcome, AppError> {
    let score = match &req.bonus {
        Some(name) => bonus.evaluate(name, req.score)?,
        None => req.score,
    };

    let current = db.with_conn(|conn| store::get_entry(conn, player_id, req.game_mode))?;
    validator::validate(current.as_ref(), score, now, cfg)?;

    // Player attributes and the ranking row commit together or not at all.
    let rank = db.with_conn(|conn| {
        let tx = conn.transaction()?;
        let player =
            store::ensure_player(&tx, player_id, req.player_level, req.trophy_count, now)?;
        let entry = RankingEntry {
            player_id,
            game_mode: req.game_mode,
            score,
            updated_at: now,
            registration_date: player.registration_date,
            player_level: player.player_level,
            trophy_count: player.trophy_count,
        };
        store::upsert_entry(&tx, &entry)?;
        tx.commit()?;
        store::rank_of(conn, req.game_mode, player_id)
    })?;
    let rank = rank.ok_or_else(|| {
        AppError::Internal("committed entry missing from rank index".into())
    })?;

    debug!(%player_id, mode = req.game_mode.as_str(), score, rank, "score accepted");
    Ok(SubmissionOutcome {
        game_mode: req.game_mode,
        response: SubmitScoreResult {
            player_id,
            score,
            rank,
        },
    })
}

/// Top-n through the cache. The cached list always holds the fixed cache
/// width regardless of the caller's `n`; a corrupt cached value degrades to a
/// direct store query instead of failing the read.
pub fn get_top(
    db: &Db,
    cache: &TtlCache,
    cfg: &GameConfig,
    mode: GameMode,
    n: i64,
) -> Result<Vec<RankedEntry>, AppError> {
    let n = n.clamp(1, cfg.max_top_n) as usize;
    let key = top_cache_key(mode, cfg.cache_width);

    if let Some(raw) = cache.get(&key) {
        if let Ok(mut list) = serde_json::from_str::<Vec<RankedEntry>>(&raw) {
            list.truncate(n);
            return Ok(list);
        }
    }

    let list = db.with_conn(|conn| store::top_entries(conn, mode, cfg.cache_width))?;
    match serde_json::to_string(&list) {
        Ok(json) => cache.set(&key, &json, Duration::from_secs(cfg.cache_ttl_secs)),
        Err(e) => info!(mode = mode.as_str(), error = %e, "skipping top cache store"),
    }

    let mut list = list;
    list.truncate(n);
    Ok(list)
}

pub fn my_standing(
    db: &Db,
    mode: GameMode,
    player_id: Uuid,
) -> Result<RankedEntry, AppError> {
    let result = db.with_conn(|conn| {
        let rank = store::rank_of(conn, mode, player_id)?;
        let entry = store::get_entry(conn, player_id, mode)?;
        Ok(rank.zip(entry))
    })?;
    match result {
        Some((rank, entry)) => Ok(RankedEntry {
            player_id,
            score: entry.score,
            rank,
        }),
        None => Err(AppError::NotFound(
            "Player has no entry in this game mode".into(),
        )),
    }
}

pub fn around_me(
    db: &Db,
    cfg: &GameConfig,
    mode: GameMode,
    player_id: Uuid,
    k: i64,
) -> Result<Vec<RankedEntry>, AppError> {
    let k = k.clamp(1, cfg.max_around_window);
    let window = db.with_conn(|conn| store::around(conn, mode, player_id, k))?;
    window.ok_or_else(|| AppError::NotFound("Player has no entry in this game mode".into()))
}
