mod cache;
mod config;
mod db;
mod error;
mod guards;
mod handlers;
mod models;
mod services;

use cache::TtlCache;
use config::GameConfig;
use db::Db;
use ntex::web;
use ntex_cors::Cors;
use services::bonus::{BonusEvaluator, NoBonus};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[ntex::main]
async fn main() -> std::io::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "ranked-scores.db".into());
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);

    let db = Arc::new(Db::open(&db_path).expect("Failed to open database"));
    let cache = Arc::new(TtlCache::new());
    let cfg = Arc::new(GameConfig::default());
    let bonus: Arc<dyn BonusEvaluator> = Arc::new(NoBonus);

    info!(host = %host, port, db = %db_path, "ranked score server starting");

    web::HttpServer::new(move || {
        web::App::new()
            .state(db.clone())
            .state(cache.clone())
            .state(cfg.clone())
            .state(bonus.clone())
            .wrap(
                Cors::new()
                    .allowed_origin("*")
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        "Content-Type",
                        "X-Player-Id",
                        "X-Timestamp",
                        "Idempotency-Key",
                    ])
                    .max_age(3600)
                    .finish(),
            )
            // Health check
            .route("/api/health", web::get().to(health))
            // Ranked score engine
            .route(
                "/api/leaderboard/submit",
                web::post().to(handlers::leaderboard::submit_score),
            )
            .route(
                "/api/leaderboard/top",
                web::get().to(handlers::leaderboard::get_top),
            )
            .route(
                "/api/leaderboard/me",
                web::get().to(handlers::leaderboard::my_standing),
            )
            .route(
                "/api/leaderboard/around",
                web::get().to(handlers::leaderboard::around_me),
            )
    })
    .bind(format!("{}:{}", host, port))?
    .run()
    .await
}

async fn health() -> web::HttpResponse {
    web::HttpResponse::Ok().json(&serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::leaderboard::*;
    use crate::services::{leaderboard as service, store};
    use chrono::Utc;
    use rusqlite::params;
    use uuid::Uuid;

    fn test_cfg(cooldown_secs: i64) -> GameConfig {
        GameConfig {
            cooldown_secs,
            ..GameConfig::default()
        }
    }

    fn seed_entry(
        db: &Db,
        mode: GameMode,
        score: i64,
        registration_date: i64,
        player_level: i64,
        trophy_count: i64,
    ) -> Uuid {
        let id = Uuid::new_v4();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO players (id, registration_date, player_level, trophy_count)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.to_string(), registration_date, player_level, trophy_count],
            )?;
            store::upsert_entry(
                conn,
                &RankingEntry {
                    player_id: id,
                    game_mode: mode,
                    score,
                    updated_at: 0,
                    registration_date,
                    player_level,
                    trophy_count,
                },
            )
        })
        .unwrap();
        id
    }

    fn submit(
        db: &Db,
        cache: &TtlCache,
        cfg: &GameConfig,
        player: Uuid,
        idem_key: &str,
        req: SubmitScoreRequest,
    ) -> Result<SubmitScoreResult, AppError> {
        let ts = Utc::now().timestamp().to_string();
        service::submit_score(db, cache, cfg, &NoBonus, player, Some(&ts), Some(idem_key), req)
    }

    fn score_req(mode: GameMode, score: i64) -> SubmitScoreRequest {
        SubmitScoreRequest {
            game_mode: mode,
            score,
            player_level: None,
            trophy_count: None,
            bonus: None,
        }
    }

    #[test]
    fn test_db_open_in_memory() {
        let db = Db::open_in_memory().expect("Failed to open in-memory DB");
        db.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='leaderboard'",
                [],
                |row| row.get(0),
            )?;
            assert_eq!(count, 1);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_submit_and_standing() {
        let db = Db::open_in_memory().unwrap();
        let cache = TtlCache::new();
        let cfg = test_cfg(60);
        let player = Uuid::new_v4();

        let result = submit(&db, &cache, &cfg, player, "req-1", score_req(GameMode::Classic, 500))
            .unwrap();
        assert_eq!(result.score, 500);
        assert_eq!(result.rank, 1);

        let standing = service::my_standing(&db, GameMode::Classic, player).unwrap();
        assert_eq!(standing.score, 500);
        assert_eq!(standing.rank, 1);
    }

    #[test]
    fn test_standing_not_found() {
        let db = Db::open_in_memory().unwrap();
        assert!(matches!(
            service::my_standing(&db, GameMode::Classic, Uuid::new_v4()),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_ordering_totality_and_rank_consistency() {
        let db = Db::open_in_memory().unwrap();
        let mode = GameMode::Classic;
        let a = seed_entry(&db, mode, 100, 10, 5, 5);
        let b = seed_entry(&db, mode, 100, 5, 1, 1); // earlier registration beats level
        let c = seed_entry(&db, mode, 100, 10, 9, 0); // higher level beats trophies
        let d = seed_entry(&db, mode, 200, 99, 0, 0); // score dominates everything
        let e = seed_entry(&db, mode, 100, 10, 5, 9); // more trophies than a

        let top = db.with_conn(|conn| store::top_entries(conn, mode, 10)).unwrap();
        let order: Vec<Uuid> = top.iter().map(|r| r.player_id).collect();
        assert_eq!(order, vec![d, b, c, e, a]);
        assert_eq!(top.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);

        // Repeated reads with no writes return the identical order
        let again = db.with_conn(|conn| store::top_entries(conn, mode, 10)).unwrap();
        assert_eq!(top, again);

        // rank_of agrees with top positions for every player
        for entry in &top {
            let rank = db
                .with_conn(|conn| store::rank_of(conn, mode, entry.player_id))
                .unwrap()
                .unwrap();
            assert_eq!(rank, entry.rank);
        }
    }

    #[test]
    fn test_full_tie_broken_by_player_id() {
        let db = Db::open_in_memory().unwrap();
        let mode = GameMode::Classic;
        let a = seed_entry(&db, mode, 100, 10, 5, 5);
        let b = seed_entry(&db, mode, 100, 10, 5, 5);

        let top = db.with_conn(|conn| store::top_entries(conn, mode, 10)).unwrap();
        assert_eq!(top.len(), 2);
        let rank_a = db.with_conn(|conn| store::rank_of(conn, mode, a)).unwrap().unwrap();
        let rank_b = db.with_conn(|conn| store::rank_of(conn, mode, b)).unwrap().unwrap();
        assert_ne!(rank_a, rank_b);
        assert_eq!(top[(rank_a - 1) as usize].player_id, a);
        assert_eq!(top[(rank_b - 1) as usize].player_id, b);
    }

    #[test]
    fn test_game_modes_are_independent() {
        let db = Db::open_in_memory().unwrap();
        let cache = TtlCache::new();
        let cfg = test_cfg(0);
        let player = Uuid::new_v4();

        submit(&db, &cache, &cfg, player, "c1", score_req(GameMode::Classic, 500)).unwrap();
        submit(&db, &cache, &cfg, player, "t1", score_req(GameMode::Tournament, 900)).unwrap();

        let classic = service::my_standing(&db, GameMode::Classic, player).unwrap();
        let tournament = service::my_standing(&db, GameMode::Tournament, player).unwrap();
        assert_eq!(classic.score, 500);
        assert_eq!(tournament.score, 900);
        assert_eq!(classic.rank, 1);
        assert_eq!(tournament.rank, 1);
    }

    #[test]
    fn test_idempotent_resubmission() {
        let db = Db::open_in_memory().unwrap();
        let cache = TtlCache::new();
        let cfg = test_cfg(0);
        let player = Uuid::new_v4();

        submit(&db, &cache, &cfg, player, "req-1", score_req(GameMode::Classic, 500)).unwrap();
        let dup = submit(&db, &cache, &cfg, player, "req-1", score_req(GameMode::Classic, 800));
        assert!(matches!(dup, Err(AppError::DuplicateSubmission)));

        // The duplicate did not mutate the store
        let standing = service::my_standing(&db, GameMode::Classic, player).unwrap();
        assert_eq!(standing.score, 500);
    }

    #[test]
    fn test_failed_attempt_releases_idempotency_key() {
        let db = Db::open_in_memory().unwrap();
        let cache = TtlCache::new();
        let cfg = test_cfg(0);
        let player = Uuid::new_v4();

        // First submission: base allowance is 1000, so 5000 is rejected
        let rejected =
            submit(&db, &cache, &cfg, player, "req-1", score_req(GameMode::Classic, 5_000));
        assert!(matches!(rejected, Err(AppError::ScoreJumpTooLarge { .. })));

        // Same key retries fine after the rejection
        let ok = submit(&db, &cache, &cfg, player, "req-1", score_req(GameMode::Classic, 900));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_score_bound_enforcement_through_pipeline() {
        let db = Db::open_in_memory().unwrap();
        let cache = TtlCache::new();
        let cfg = test_cfg(0);
        let player = Uuid::new_v4();

        submit(&db, &cache, &cfg, player, "k1", score_req(GameMode::Classic, 1_000)).unwrap();
        // Current 1000 sits in the 50% tier: 1499 accepted, 1501 rejected
        submit(&db, &cache, &cfg, player, "k2", score_req(GameMode::Classic, 1_499)).unwrap();
        match submit(&db, &cache, &cfg, player, "k3", score_req(GameMode::Classic, 2_249)) {
            Err(AppError::ScoreJumpTooLarge { max_increase, .. }) => {
                assert_eq!(max_increase, 749)
            }
            other => panic!("expected ScoreJumpTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_cooldown_enforcement() {
        let db = Db::open_in_memory().unwrap();
        let cache = TtlCache::new();
        let cfg = test_cfg(60);
        let player = Uuid::new_v4();

        submit(&db, &cache, &cfg, player, "k1", score_req(GameMode::Classic, 500)).unwrap();
        let second = submit(&db, &cache, &cfg, player, "k2", score_req(GameMode::Classic, 600));
        assert!(matches!(second, Err(AppError::SubmissionTooFrequent { .. })));
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let db = Db::open_in_memory().unwrap();
        let cache = TtlCache::new();
        let cfg = test_cfg(0);
        let player = Uuid::new_v4();

        let stale = (Utc::now().timestamp() - 700).to_string();
        let result = service::submit_score(
            &db,
            &cache,
            &cfg,
            &NoBonus,
            player,
            Some(&stale),
            Some("k1"),
            score_req(GameMode::Classic, 500),
        );
        assert!(matches!(result, Err(AppError::TimestampTooOld { .. })));
        // Nothing was persisted
        assert!(service::my_standing(&db, GameMode::Classic, player).is_err());
    }

    #[test]
    fn test_top_cache_invalidated_on_submit() {
        let db = Db::open_in_memory().unwrap();
        let cache = TtlCache::new();
        let cfg = test_cfg(0);
        let p1 = Uuid::new_v4();
        let p2 = Uuid::new_v4();

        submit(&db, &cache, &cfg, p1, "a", score_req(GameMode::Classic, 100)).unwrap();
        // Prime the cache
        let top = service::get_top(&db, &cache, &cfg, GameMode::Classic, 10).unwrap();
        assert_eq!(top.len(), 1);

        submit(&db, &cache, &cfg, p2, "b", score_req(GameMode::Classic, 200)).unwrap();
        let top = service::get_top(&db, &cache, &cfg, GameMode::Classic, 10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].player_id, p2);
        assert_eq!(top[0].score, 200);
    }

    #[test]
    fn test_top_cache_serves_stale_until_expiry() {
        let db = Db::open_in_memory().unwrap();
        let cache = TtlCache::new();
        let cfg = test_cfg(0);

        seed_entry(&db, GameMode::Classic, 100, 0, 0, 0);
        let top = service::get_top(&db, &cache, &cfg, GameMode::Classic, 10).unwrap();
        assert_eq!(top.len(), 1);

        // A write that bypasses the pipeline (no invalidation) stays invisible
        // while the cached list lives
        seed_entry(&db, GameMode::Classic, 900, 0, 0, 0);
        let top = service::get_top(&db, &cache, &cfg, GameMode::Classic, 10).unwrap();
        assert_eq!(top.len(), 1);

        // With an expired cache the same read reflects the store
        let zero_ttl = GameConfig {
            cache_ttl_secs: 0,
            ..test_cfg(0)
        };
        let cold = TtlCache::new();
        let top = service::get_top(&db, &cold, &zero_ttl, GameMode::Classic, 10).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].score, 900);
    }

    #[test]
    fn test_top_n_slices_cached_width() {
        let db = Db::open_in_memory().unwrap();
        let cache = TtlCache::new();
        let cfg = test_cfg(0);
        for i in 0..5 {
            seed_entry(&db, GameMode::Classic, 100 * (i + 1), 0, 0, 0);
        }
        let top = service::get_top(&db, &cache, &cfg, GameMode::Classic, 3).unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].score, 500);
        // Asking for more than exists returns what is available
        let top = service::get_top(&db, &cache, &cfg, GameMode::Classic, 50).unwrap();
        assert_eq!(top.len(), 5);
    }

    #[test]
    fn test_around_me_window() {
        let db = Db::open_in_memory().unwrap();
        let cfg = test_cfg(0);
        let mode = GameMode::Classic;
        // Ten players, scores 1000 down to 100; ids[i] holds rank i+1
        let ids: Vec<Uuid> = (0..10)
            .map(|i| seed_entry(&db, mode, 1_000 - 100 * i, 0, 0, 0))
            .collect();

        // Middle of the pack: rank 5, k=3 -> ranks 2..=8
        let window = service::around_me(&db, &cfg, mode, ids[4], 3).unwrap();
        assert_eq!(window.len(), 7);
        assert_eq!(window.first().unwrap().rank, 2);
        assert_eq!(window.last().unwrap().rank, 8);
        assert!(window.iter().any(|e| e.player_id == ids[4] && e.rank == 5));
        // Contiguous in rank
        for pair in window.windows(2) {
            assert_eq!(pair[1].rank, pair[0].rank + 1);
        }

        // Clamped at the top: rank 1, k=3 -> min(3,0) + 1 + min(3,9) = 4
        let window = service::around_me(&db, &cfg, mode, ids[0], 3).unwrap();
        assert_eq!(window.len(), 4);
        assert_eq!(window.first().unwrap().rank, 1);

        // Clamped at the bottom: rank 10, k=3 -> 4 entries
        let window = service::around_me(&db, &cfg, mode, ids[9], 3).unwrap();
        assert_eq!(window.len(), 4);
        assert_eq!(window.last().unwrap().rank, 10);
    }

    #[test]
    fn test_around_me_unknown_player() {
        let db = Db::open_in_memory().unwrap();
        let cfg = test_cfg(0);
        seed_entry(&db, GameMode::Classic, 100, 0, 0, 0);
        assert!(matches!(
            service::around_me(&db, &cfg, GameMode::Classic, Uuid::new_v4(), 3),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_player_attributes_refresh_but_registration_freezes() {
        let db = Db::open_in_memory().unwrap();
        let cache = TtlCache::new();
        let cfg = test_cfg(0);
        let player = Uuid::new_v4();

        let mut req = score_req(GameMode::Classic, 500);
        req.player_level = Some(3);
        req.trophy_count = Some(7);
        submit(&db, &cache, &cfg, player, "k1", req).unwrap();

        let first = db
            .with_conn(|conn| store::get_entry(conn, player, GameMode::Classic))
            .unwrap()
            .unwrap();
        assert_eq!(first.player_level, 3);
        assert_eq!(first.trophy_count, 7);

        let mut req = score_req(GameMode::Classic, 700);
        req.player_level = Some(4);
        submit(&db, &cache, &cfg, player, "k2", req).unwrap();

        let second = db
            .with_conn(|conn| store::get_entry(conn, player, GameMode::Classic))
            .unwrap()
            .unwrap();
        assert_eq!(second.player_level, 4);
        assert_eq!(second.trophy_count, 7);
        assert_eq!(second.registration_date, first.registration_date);
    }

    #[test]
    fn test_bonus_evaluator_adjusts_score() {
        struct Doubler;
        impl BonusEvaluator for Doubler {
            fn evaluate(&self, _name: &str, score: i64) -> Result<i64, AppError> {
                Ok(score * 2)
            }
        }

        let db = Db::open_in_memory().unwrap();
        let cache = TtlCache::new();
        let cfg = test_cfg(0);
        let player = Uuid::new_v4();

        let mut req = score_req(GameMode::Classic, 400);
        req.bonus = Some("double".into());
        let ts = Utc::now().timestamp().to_string();
        let result = service::submit_score(
            &db,
            &cache,
            &cfg,
            &Doubler,
            player,
            Some(&ts),
            Some("k1"),
            req,
        )
        .unwrap();
        assert_eq!(result.score, 800);
    }
}
