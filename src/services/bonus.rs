use crate::error::AppError;

/// Seam for the external score-bonus collaborator: a pure function from a
/// bonus name and raw score to an adjusted score. Script execution, sandbox
/// limits and timeouts belong entirely to the implementation behind this
/// trait; the engine only sees the adjusted score.
pub trait BonusEvaluator: Send + Sync {
    fn evaluate(&self, bonus_name: &str, score: i64) -> Result<i64, AppError>;
}

/// Default evaluator: no bonus subsystem wired in, every name passes the
/// score through unchanged.
pub struct NoBonus;

impl BonusEvaluator for NoBonus {
    fn evaluate(&self, _bonus_name: &str, score: i64) -> Result<i64, AppError> {
        Ok(score)
    }
}
