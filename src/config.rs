use serde::Deserialize;

/// One rung of the anti-cheat score-increase policy. A submission may raise a
/// player's score by at most `current * factor` once their current score has
/// reached `threshold`.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoreTier {
    pub threshold: i64,
    pub factor: f64,
}

/// Immutable engine tunables, passed to the services at construction time.
#[derive(Debug, Clone, Deserialize)]
pub struct GameConfig {
    pub score_increase_tiers: Vec<ScoreTier>,
    /// Flat allowance applied below the lowest tier threshold.
    pub base_allowance: i64,
    pub max_score: i64,
    pub cooldown_secs: i64,
    pub cache_ttl_secs: u64,
    pub cache_width: i64,
    pub max_top_n: i64,
    pub max_around_window: i64,
    pub idempotency_ttl_secs: u64,
    pub freshness_max_age_secs: i64,
    pub freshness_max_future_secs: i64,
}

impl Default for GameConfig {
    fn default() -> Self {
        GameConfig {
            score_increase_tiers: vec![
                ScoreTier {
                    threshold: 1_000,
                    factor: 0.5,
                },
                ScoreTier {
                    threshold: 10_000,
                    factor: 0.3,
                },
                ScoreTier {
                    threshold: 100_000,
                    factor: 0.2,
                },
            ],
            base_allowance: 1_000,
            max_score: 1_000_000_000,
            cooldown_secs: 60,
            cache_ttl_secs: 30,
            cache_width: 100,
            max_top_n: 1_000,
            max_around_window: 50,
            idempotency_ttl_secs: 300,
            freshness_max_age_secs: 600,
            freshness_max_future_secs: 120,
        }
    }
}

impl GameConfig {
    /// Max allowed score increase given the player's current score: the
    /// highest tier whose threshold does not exceed the current score, or the
    /// flat base allowance when no tier applies.
    pub fn max_allowed_increase(&self, current_score: i64) -> i64 {
        let applicable = self
            .score_increase_tiers
            .iter()
            .filter(|t| current_score >= t.threshold)
            .max_by_key(|t| t.threshold);
        match applicable {
            Some(tier) => (current_score as f64 * tier.factor) as i64,
            None => self.base_allowance,
        }
    }
}
