//! Entry store and rank index: all SQL touching the leaderboard and players
//! tables. Every ranking query shares the same total ordering; `Top`,
//! `RankOf` and `AroundMe` must never disagree on the relative order of two
//! entries.

use crate::models::leaderboard::{GameMode, RankedEntry, RankingEntry};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

/// Tie-break chain: score desc, earlier registration first, then level and
/// trophies desc, with player id as the deterministic last resort.
const ORDERING: &str =
    "score DESC, registration_date ASC, player_level DESC, trophy_count DESC, player_id ASC";

pub struct PlayerRow {
    pub registration_date: i64,
    pub player_level: i64,
    pub trophy_count: i64,
}

pub fn get_entry(
    conn: &Connection,
    player_id: Uuid,
    mode: GameMode,
) -> Result<Option<RankingEntry>, rusqlite::Error> {
    conn.query_row(
        "SELECT score, updated_at, registration_date, player_level, trophy_count
         FROM leaderboard WHERE player_id = ?1 AND game_mode = ?2",
        params![player_id.to_string(), mode.as_str()],
        |row| {
            Ok(RankingEntry {
                player_id,
                game_mode: mode,
                score: row.get(0)?,
                updated_at: row.get(1)?,
                registration_date: row.get(2)?,
                player_level: row.get(3)?,
                trophy_count: row.get(4)?,
            })
        },
    )
    .optional()
}

/// Fetches the owning player row, creating it on first sight with
/// `registration_date = now`. Auxiliary attributes are refreshed from the
/// submission when supplied; the registration date is frozen.
pub fn ensure_player(
    conn: &Connection,
    player_id: Uuid,
    player_level: Option<i64>,
    trophy_count: Option<i64>,
    now: i64,
) -> Result<PlayerRow, rusqlite::Error> {
    let id = player_id.to_string();
    let existing = conn
        .query_row(
            "SELECT registration_date, player_level, trophy_count FROM players WHERE id = ?1",
            params![id],
            |row| {
                Ok(PlayerRow {
                    registration_date: row.get(0)?,
                    player_level: row.get(1)?,
                    trophy_count: row.get(2)?,
                })
            },
        )
        .optional()?;

    match existing {
        Some(mut player) => {
            if let Some(level) = player_level {
                player.player_level = level;
            }
            if let Some(trophies) = trophy_count {
                player.trophy_count = trophies;
            }
            if player_level.is_some() || trophy_count.is_some() {
                conn.execute(
                    "UPDATE players SET player_level = ?2, trophy_count = ?3 WHERE id = ?1",
                    params![id, player.player_level, player.trophy_count],
                )?;
            }
            Ok(player)
        }
        None => {
            let player = PlayerRow {
                registration_date: now,
                player_level: player_level.unwrap_or(0),
                trophy_count: trophy_count.unwrap_or(0),
            };
            conn.execute(
                "INSERT INTO players (id, registration_date, player_level, trophy_count)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, player.registration_date, player.player_level, player.trophy_count],
            )?;
            Ok(player)
        }
    }
}

/// Upsert one ranking row per (player, mode). The registration date is only
/// written on insert, never overwritten.
pub fn upsert_entry(conn: &Connection, entry: &RankingEntry) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO leaderboard
             (player_id, game_mode, score, updated_at, registration_date, player_level, trophy_count)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT (player_id, game_mode) DO UPDATE SET
             score = excluded.score,
             updated_at = excluded.updated_at,
             player_level = excluded.player_level,
             trophy_count = excluded.trophy_count",
        params![
            entry.player_id.to_string(),
            entry.game_mode.as_str(),
            entry.score,
            entry.updated_at,
            entry.registration_date,
            entry.player_level,
            entry.trophy_count,
        ],
    )?;
    Ok(())
}

/// Top `n` entries in a mode under the total ordering, ranks assigned by
/// list position.
pub fn top_entries(
    conn: &Connection,
    mode: GameMode,
    n: i64,
) -> Result<Vec<RankedEntry>, rusqlite::Error> {
    let sql = format!(
        "SELECT player_id, score FROM leaderboard WHERE game_mode = ?1 ORDER BY {} LIMIT ?2",
        ORDERING
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![mode.as_str(), n], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, score) = row?;
        entries.push(RankedEntry {
            player_id: parse_player_id(&id)?,
            score,
            rank: entries.len() as i64 + 1,
        });
    }
    Ok(entries)
}

/// 1 + the number of entries strictly ahead of the player under the total
/// ordering. None when the player has no entry in the mode.
pub fn rank_of(
    conn: &Connection,
    mode: GameMode,
    player_id: Uuid,
) -> Result<Option<i64>, rusqlite::Error> {
    let target = match get_entry(conn, player_id, mode)? {
        Some(entry) => entry,
        None => return Ok(None),
    };

    let ahead: i64 = conn.query_row(
        "SELECT COUNT(*) FROM leaderboard WHERE game_mode = ?1 AND (
             score > ?2
             OR (score = ?2 AND registration_date < ?3)
             OR (score = ?2 AND registration_date = ?3 AND player_level > ?4)
             OR (score = ?2 AND registration_date = ?3 AND player_level = ?4 AND trophy_count > ?5)
             OR (score = ?2 AND registration_date = ?3 AND player_level = ?4 AND trophy_count = ?5
                 AND player_id < ?6)
         )",
        params![
            mode.as_str(),
            target.score,
            target.registration_date,
            target.player_level,
            target.trophy_count,
            player_id.to_string(),
        ],
        |row| row.get(0),
    )?;
    Ok(Some(ahead + 1))
}

/// Dense-ranks the whole mode under the total ordering and slices the
/// contiguous window `[rank - k, rank + k]` around the player. None when the
/// player has no entry in the mode.
pub fn around(
    conn: &Connection,
    mode: GameMode,
    player_id: Uuid,
    k: i64,
) -> Result<Option<Vec<RankedEntry>>, rusqlite::Error> {
    let sql = format!(
        "WITH ranked AS (
             SELECT player_id, score,
                    ROW_NUMBER() OVER (ORDER BY {}) AS rn
             FROM leaderboard WHERE game_mode = ?1
         )
         SELECT player_id, score, rn FROM ranked
         WHERE rn BETWEEN (SELECT rn FROM ranked WHERE player_id = ?2) - ?3
                      AND (SELECT rn FROM ranked WHERE player_id = ?2) + ?3
         ORDER BY rn",
        ORDERING
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![mode.as_str(), player_id.to_string(), k], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, score, rank) = row?;
        entries.push(RankedEntry {
            player_id: parse_player_id(&id)?,
            score,
            rank,
        });
    }
    // The BETWEEN subquery yields no rows when the pivot player is absent.
    if entries.is_empty() {
        Ok(None)
    } else {
        Ok(Some(entries))
    }
}

fn parse_player_id(raw: &str) -> Result<Uuid, rusqlite::Error> {
    Uuid::parse_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}
