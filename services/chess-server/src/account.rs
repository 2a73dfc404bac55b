//! A persistent user account — identity, credentials, and rating stats.
//!
//! Equality and hashing are by `id` alone (Testable Property "Identity
//! uniqueness", Design Note "Object identity") so that renaming a user —
//! which can't actually happen since `name` is immutable after first set —
//! could never silently split an account across two set slots.

use chess_protocol::constants::{INITIAL_ELO_WEIGHT, INITIAL_RATING};
use std::hash::{Hash, Hasher};

pub type UserId = u64;

#[derive(Debug, Clone)]
pub struct Account {
    pub id: UserId,
    pub name: String,
    pub password: String,
    pub ip: String,
    pub last_login: String,
    pub played_games: u64,
    pub scoring_zero: u64,
    pub scoring_half: u64,
    pub scoring_one: u64,
    pub rating: i64,
    pub elo_weight: i64,
}

impl Account {
    pub fn new(id: UserId, name: String, password: String, ip: String, last_login: String) -> Self {
        Self {
            id,
            name,
            password,
            ip,
            last_login,
            played_games: 0,
            scoring_zero: 0,
            scoring_half: 0,
            scoring_one: 0,
            rating: INITIAL_RATING,
            elo_weight: INITIAL_ELO_WEIGHT,
        }
    }

    /// Render like the original's `User.__str__`, used in admin listings.
    pub fn display(&self) -> String {
        format!(
            "ID_{} {} L:{}/D:{}/W:{}/#T:{} ELO:{}({})",
            self.id,
            self.name,
            self.scoring_zero,
            self.scoring_half,
            self.scoring_one,
            self.played_games,
            self.rating,
            self.elo_weight
        )
    }
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Account {}

impl Hash for Account {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
