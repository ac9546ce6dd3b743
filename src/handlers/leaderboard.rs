use crate::cache::TtlCache;
use crate::config::GameConfig;
use crate::db::Db;
use crate::error::AppError;
use crate::models::leaderboard::*;
use crate::services::bonus::BonusEvaluator;
use crate::services::leaderboard as service;
use ntex::web::{self, HttpRequest, HttpResponse};
use std::sync::Arc;
use uuid::Uuid;

fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

// Auth itself is an external collaborator; the authenticated player id
// arrives in the X-Player-Id header.
fn player_id(req: &HttpRequest) -> Result<Uuid, AppError> {
    let raw = header(req, "X-Player-Id")
        .ok_or_else(|| AppError::BadRequest("Missing X-Player-Id header".into()))?;
    Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::BadRequest("X-Player-Id must be a UUID".into()))
}

fn parse_mode(raw: Option<&str>) -> Result<GameMode, AppError> {
    let raw = raw.unwrap_or("classic");
    GameMode::parse(raw)
        .ok_or_else(|| AppError::BadRequest(format!("Unknown game mode: {}", raw)))
}

pub async fn submit_score(
    req: HttpRequest,
    db: web::types::State<Arc<Db>>,
    cache: web::types::State<Arc<TtlCache>>,
    cfg: web::types::State<Arc<GameConfig>>,
    bonus: web::types::State<Arc<dyn BonusEvaluator>>,
    body: web::types::Json<SubmitScoreRequest>,
) -> Result<HttpResponse, AppError> {
    let player = player_id(&req)?;
    let result = service::submit_score(
        &db,
        &cache,
        &cfg,
        &**bonus,
        player,
        header(&req, "X-Timestamp"),
        header(&req, "Idempotency-Key"),
        body.into_inner(),
    )?;
    Ok(HttpResponse::Ok().json(&result))
}

pub async fn get_top(
    db: web::types::State<Arc<Db>>,
    cache: web::types::State<Arc<TtlCache>>,
    cfg: web::types::State<Arc<GameConfig>>,
    query: web::types::Query<TopQuery>,
) -> Result<HttpResponse, AppError> {
    let mode = parse_mode(query.mode.as_deref())?;
    let n = query.n.unwrap_or(100);
    let entries = service::get_top(&db, &cache, &cfg, mode, n)?;
    Ok(HttpResponse::Ok().json(&entries))
}

pub async fn my_standing(
    req: HttpRequest,
    db: web::types::State<Arc<Db>>,
    query: web::types::Query<StandingQuery>,
) -> Result<HttpResponse, AppError> {
    let player = player_id(&req)?;
    let mode = parse_mode(query.mode.as_deref())?;
    let standing = service::my_standing(&db, mode, player)?;
    Ok(HttpResponse::Ok().json(&standing))
}

pub async fn around_me(
    req: HttpRequest,
    db: web::types::State<Arc<Db>>,
    cfg: web::types::State<Arc<GameConfig>>,
    query: web::types::Query<AroundQuery>,
) -> Result<HttpResponse, AppError> {
    let player = player_id(&req)?;
    let mode = parse_mode(query.mode.as_deref())?;
    let k = query.k.unwrap_or(5);
    let entries = service::around_me(&db, &cfg, mode, player, k)?;
    Ok(HttpResponse::Ok().json(&entries))
}
