//! Shared account table.
//!
//! Per Design Note "Shared mutation", the admission task and the relay
//! task collaborate across exactly one lock. Everything that must be
//! visible to both sides before a connection is fully online — the
//! account row itself, the per-IP count, and whether an account is
//! currently online — lives behind this mutex. Once a connection is
//! admitted, its socket and message queue belong to the relay task alone
//! and never touch this registry again until the next disconnect/sign-off.

use crate::account::{Account, UserId};
use chess_protocol::constants::MAX_PER_IP;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum AdmitError {
    #[error("too many connections from this IP")]
    TooManyIp,
}

struct Inner {
    accounts: HashMap<UserId, Account>,
    next_id: UserId,
    ip_counts: HashMap<String, usize>,
    online_ids: HashSet<UserId>,
}

pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                accounts: HashMap::new(),
                next_id: 1,
                ip_counts: HashMap::new(),
                online_ids: HashSet::new(),
            }),
        }
    }

    /// Load rows from the persistence gateway, advancing the id counter
    /// past the highest loaded row per component 4.D.
    pub async fn load(&self, accounts: Vec<Account>, max_id: UserId) {
        let mut g = self.inner.lock().await;
        g.next_id = g.next_id.max(max_id + 1);
        for a in accounts {
            g.accounts.insert(a.id, a);
        }
    }

    pub async fn find_by_name(&self, name: &str) -> Option<Account> {
        let g = self.inner.lock().await;
        g.accounts.values().find(|a| a.name == name).cloned()
    }

    pub async fn find_by_id(&self, id: UserId) -> Option<Account> {
        self.inner.lock().await.accounts.get(&id).cloned()
    }

    pub async fn is_online(&self, id: UserId) -> bool {
        self.inner.lock().await.online_ids.contains(&id)
    }

    /// Create a brand-new account (first-time registration).
    pub async fn create(&self, name: String, password: String, ip: String, last_login: String) -> Account {
        let mut g = self.inner.lock().await;
        let id = g.next_id;
        g.next_id += 1;
        let account = Account::new(id, name, password, ip, last_login);
        g.accounts.insert(id, account.clone());
        account
    }

    /// Apply a password-reset-sentinel replacement to a returning user's
    /// stored password, matching `User.set_password`'s "only while unset
    /// or reset" semantics.
    pub async fn set_password(&self, id: UserId, password: String) {
        let mut g = self.inner.lock().await;
        if let Some(a) = g.accounts.get_mut(&id) {
            a.password = password;
        }
    }

    pub async fn mark_password_reset(&self, name: &str) -> bool {
        let mut g = self.inner.lock().await;
        if let Some(a) = g.accounts.values_mut().find(|a| a.name == name) {
            a.password = chess_protocol::constants::PASSWORD_RESET_SENTINEL.to_owned();
            true
        } else {
            false
        }
    }

    /// Graft a fresh connection's ip/timestamp onto a returning account
    /// and enforce the per-IP cap. Marks the account online on success.
    pub async fn admit(&self, id: UserId, ip: &str, last_login: &str) -> Result<(), AdmitError> {
        let mut g = self.inner.lock().await;
        if *g.ip_counts.get(ip).unwrap_or(&0) >= MAX_PER_IP {
            return Err(AdmitError::TooManyIp);
        }
        *g.ip_counts.entry(ip.to_owned()).or_insert(0) += 1;
        if let Some(a) = g.accounts.get_mut(&id) {
            a.ip = ip.to_owned();
            a.last_login = last_login.to_owned();
        }
        g.online_ids.insert(id);
        Ok(())
    }

    /// Non-blocking variant used by the relay sweep; contention defers to
    /// the next cycle exactly like the staging-set merge does.
    pub fn try_mark_offline(&self, id: UserId, ip: &str) -> bool {
        match self.inner.try_lock() {
            Ok(mut g) => {
                g.online_ids.remove(&id);
                if let Some(count) = g.ip_counts.get_mut(ip) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        g.ip_counts.remove(ip);
                    }
                }
                true
            }
            Err(_) => false,
        }
    }

    pub async fn mark_offline(&self, id: UserId, ip: &str) {
        let mut g = self.inner.lock().await;
        g.online_ids.remove(&id);
        if let Some(count) = g.ip_counts.get_mut(ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                g.ip_counts.remove(ip);
            }
        }
    }

    pub async fn remove(&self, id: UserId) {
        let mut g = self.inner.lock().await;
        g.accounts.remove(&id);
        g.online_ids.remove(&id);
    }

    pub async fn update(&self, account: Account) {
        let mut g = self.inner.lock().await;
        g.accounts.insert(account.id, account);
    }

    pub async fn ip_counts_snapshot(&self) -> HashMap<String, usize> {
        self.inner.lock().await.ip_counts.clone()
    }

    pub async fn online_ids_snapshot(&self) -> HashSet<UserId> {
        self.inner.lock().await.online_ids.clone()
    }

    pub async fn all_accounts(&self) -> Vec<Account> {
        self.inner.lock().await.accounts.values().cloned().collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
