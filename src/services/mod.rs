pub mod bonus;
pub mod leaderboard;
pub mod store;
pub mod validator;
