//! Persistence gateway: component 4.D.
//!
//! A thin rusqlite wrapper in the style of `services/receiver`'s `db.rs` —
//! same `open` / pragma / embedded-schema shape, same "one transaction per
//! replace" contract. `replace_all` treats a locked database as a no-op
//! rather than an error: the in-memory registry stays authoritative until
//! the next interval (component 4.D, error kind "Persistence" in §7).

use crate::account::Account;
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

const SCHEMA_SQL: &str = include_str!("storage/schema.sql");

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.apply_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.apply_schema()?;
        Ok(db)
    }

    fn apply_pragmas(&self) -> Result<(), PersistenceError> {
        self.conn
            .execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")?;
        Ok(())
    }

    fn apply_schema(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Load every row plus the highest `id` seen, so the caller can
    /// advance its id counter past it.
    pub fn load_all(&self) -> Result<(Vec<Account>, u64), PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ip, name, pw, games, zero, half, one, rating, weight, lastlogin FROM users",
        )?;
        let mut max_id = 0u64;
        let rows = stmt.query_map([], |r| {
            let id: i64 = r.get(0)?;
            Ok(Account {
                id: id as u64,
                ip: r.get(1)?,
                name: r.get(2)?,
                password: r.get(3)?,
                played_games: r.get::<_, i64>(4)? as u64,
                scoring_zero: r.get::<_, i64>(5)? as u64,
                scoring_half: r.get::<_, i64>(6)? as u64,
                scoring_one: r.get::<_, i64>(7)? as u64,
                rating: r.get(8)?,
                elo_weight: r.get(9)?,
                last_login: r.get(10)?,
            })
        })?;
        let mut accounts = Vec::new();
        for row in rows {
            let account = row?;
            max_id = max_id.max(account.id);
            accounts.push(account);
        }
        Ok((accounts, max_id))
    }

    /// Atomically clear and re-insert every row. A locked/busy database
    /// surfaces as `Err`; callers must treat that as "skip this interval"
    /// rather than propagate a fatal error.
    pub fn replace_all(&mut self, accounts: &[Account]) -> Result<(), PersistenceError> {
        let tx = self.conn.transaction()?;
        tx.execute_batch("DELETE FROM users")?;
        for a in accounts {
            tx.execute(
                "INSERT INTO users (id, ip, name, pw, games, zero, half, one, rating, weight, lastlogin)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    a.id as i64,
                    a.ip,
                    a.name,
                    a.password,
                    a.played_games as i64,
                    a.scoring_zero as i64,
                    a.scoring_half as i64,
                    a.scoring_one as i64,
                    a.rating,
                    a.elo_weight,
                    a.last_login,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn close(self) {
        drop(self);
    }
}
