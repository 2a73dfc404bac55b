//! Component 4.G — the relay / command loop.
//!
//! Single cooperative worker: one task walks every online connection each
//! cycle, so there is no locking between "read a user's pending message"
//! and "act on it" the way there would be with one task per connection.
//! The admission task is the only other writer of shared state, and it
//! only ever adds to the registry or pushes a freshly admitted connection
//! down `rx` — never touches `online`, `linked`, or `users_to_link`
//! directly, per the Design Note this loop is built around.

use crate::account::{Account, UserId};
use crate::admin::{self, AdminView, Effect};
use crate::admission::Admission;
use crate::matchmaker::pair_candidates;
use crate::persistence::Db;
use crate::registry::Registry;
use chess_protocol::constants::{
    ELO_WEIGHT_DECREMENT, ELO_WEIGHT_FLOOR, LINK_INTERVAL, RELAY_CYCLE_FLOOR,
};
use chess_protocol::framer::FrameBuffer;
use chess_protocol::{elo, lang, wire, ETX};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

struct OnlineConn {
    account: Account,
    socket: TcpStream,
    buffer: FrameBuffer,
    pending: VecDeque<String>,
}

struct AdminConn {
    socket: TcpStream,
    buffer: FrameBuffer,
}

pub struct RelayState {
    registry: Arc<Registry>,
    db: Arc<Mutex<Db>>,
    rx: mpsc::Receiver<Admission>,
    online: HashMap<UserId, OnlineConn>,
    users_to_link: HashSet<UserId>,
    linked: HashMap<UserId, UserId>,
    disconnected: HashSet<UserId>,
    admin: Option<AdminConn>,
    last_game: String,
    last_link: Instant,
    reverse_sort: bool,
    stop: Arc<AtomicBool>,
    data_dir: PathBuf,
}

impl RelayState {
    pub fn new(
        registry: Arc<Registry>,
        db: Arc<Mutex<Db>>,
        rx: mpsc::Receiver<Admission>,
        stop: Arc<AtomicBool>,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            registry,
            db,
            rx,
            online: HashMap::new(),
            users_to_link: HashSet::new(),
            linked: HashMap::new(),
            disconnected: HashSet::new(),
            admin: None,
            last_game: String::new(),
            last_link: Instant::now(),
            reverse_sort: false,
            stop,
            data_dir,
        }
    }

    pub async fn run(&mut self) {
        loop {
            if self.stop.load(Ordering::Relaxed) {
                break;
            }
            let cycle_start = Instant::now();

            self.poll_online_sockets().await;
            self.sweep_disconnected().await;
            self.dispatch_one_round().await;
            self.sweep_disconnected().await;
            self.merge_admissions().await;

            if self.last_link.elapsed() >= LINK_INTERVAL {
                self.run_matchmaker_tick().await;
                self.last_link = Instant::now();
            }

            if self.service_admin().await == AdminOutcome::Shutdown {
                break;
            }

            if cycle_start.elapsed() < RELAY_CYCLE_FLOOR {
                tokio::time::sleep(RELAY_CYCLE_FLOOR - cycle_start.elapsed()).await;
            }
        }
    }

    async fn poll_online_sockets(&mut self) {
        for (&id, conn) in self.online.iter_mut() {
            let mut chunk = [0u8; 256];
            match conn.socket.try_read(&mut chunk) {
                Ok(0) => {
                    self.disconnected.insert(id);
                }
                Ok(n) => {
                    conn.buffer.push(&chunk[..n]);
                    for msg in conn.buffer.drain_messages() {
                        conn.pending.push_back(msg);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(_) => {
                    self.disconnected.insert(id);
                }
            }
        }
    }

    async fn sweep_disconnected(&mut self) {
        for id in self.disconnected.drain().collect::<Vec<_>>() {
            if let Some(conn) = self.online.remove(&id) {
                self.registry.try_mark_offline(id, &conn.account.ip);
                info!(user = %conn.account.name, "disconnected");
            }
            self.users_to_link.remove(&id);
            if let Some(partner) = self.linked.remove(&id) {
                self.linked.remove(&partner);
            }
        }
    }

    async fn dispatch_one_round(&mut self) {
        let ids: Vec<UserId> = self.online.keys().copied().collect();
        for id in ids {
            let Some(message) = self.online.get_mut(&id).and_then(|c| c.pending.pop_front()) else {
                continue;
            };

            if let Some(cmd) = wire::parse_server_command(&message) {
                self.dispatch_server_command(id, cmd).await;
                continue;
            }

            if let Some(&partner_id) = self.linked.get(&id) {
                self.forward_to(partner_id, &message).await;
            } else if let Some(conn) = self.online.get_mut(&id) {
                let _ = send_line(&mut conn.socket, &wire::note(lang::NOT_LINKED.resolve())).await;
            }
        }
    }

    async fn forward_to(&mut self, partner_id: UserId, message: &str) {
        if let Some(partner) = self.online.get_mut(&partner_id) {
            if send_line(&mut partner.socket, message).await.is_err() {
                self.disconnected.insert(partner_id);
            }
        }
    }

    async fn dispatch_server_command(&mut self, id: UserId, cmd: wire::ServerCommand) {
        use wire::ServerCommand::*;
        match cmd {
            Link => {
                self.users_to_link.insert(id);
                if let Some(conn) = self.online.get_mut(&id) {
                    let _ = send_line(&mut conn.socket, &wire::note(lang::WAIT_FOR_PLAYER.resolve())).await;
                }
            }
            LinkTo(name) => {
                if let Some(target_id) = self.find_online_by_name(&name) {
                    if !self.linked.contains_key(&target_id) && !self.linked.contains_key(&id) && target_id != id {
                        self.link_users(id, target_id).await;
                    }
                }
            }
            Feedback(text) => {
                self.write_feedback(id, &text).await;
            }
            Elo => {
                self.send_elo_chart(id).await;
            }
            Disconnect => {
                self.disconnected.insert(id);
            }
            Scoring(result) => {
                self.apply_scoring(id, result).await;
            }
            Unknown(verb) => {
                debug!(user_id = id, verb, "ignored unrecognised %SERVER command");
            }
        }
    }

    fn find_online_by_name(&self, name: &str) -> Option<UserId> {
        self.online.iter().find(|(_, c)| c.account.name == name).map(|(&id, _)| id)
    }

    async fn write_feedback(&self, id: UserId, text: &str) {
        let name = self.online.get(&id).map(|c| c.account.name.clone()).unwrap_or_default();
        let date = chrono::Local::now().format("%Y-%m-%d");
        let line = format!("{text}\n");
        let path = self.data_dir.join(format!("feedback-{date}-{name}.txt"));
        let file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await;
        match file {
            Ok(mut f) => {
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    warn!(error = %e, "could not append feedback line");
                }
            }
            Err(e) => warn!(error = %e, "could not open feedback file"),
        }
    }

    async fn send_elo_chart(&mut self, id: UserId) {
        let accounts = self.registry.all_accounts().await;
        let online_ids = self.online.keys().copied().collect::<HashSet<_>>();
        let Some(conn) = self.online.get_mut(&id) else { return };
        let header = wire::elo_header(&conn.account.name, conn.account.rating);
        let view = AdminView {
            all_accounts: &accounts,
            online_ids: &online_ids,
            linked: &self.linked,
            ip_counts: &HashMap::new(),
            last_game: &self.last_game,
            active_worker_count: 1,
        };
        let chart = admin::wrap(&admin::rating_chart(&view));
        let record = format!("{header}\n{chart}");
        if send_line(&mut conn.socket, &record).await.is_err() {
            self.disconnected.insert(id);
        }
    }

    async fn apply_scoring(&mut self, a: UserId, result: f64) {
        let Some(&b) = self.linked.get(&a) else { return };
        let (Some(mut acc_a), Some(mut acc_b)) = (
            self.online.get(&a).map(|c| c.account.clone()),
            self.online.get(&b).map(|c| c.account.clone()),
        ) else {
            return;
        };

        let weight = acc_a.elo_weight.min(acc_b.elo_weight);
        let new_a = elo::updated_rating(acc_a.rating, acc_b.rating, result, weight);
        let new_b = elo::updated_rating(acc_b.rating, acc_a.rating, 1.0 - result, weight);
        acc_a.rating = new_a;
        acc_b.rating = new_b;
        acc_a.elo_weight = elo::decay_weight(acc_a.elo_weight, ELO_WEIGHT_DECREMENT, ELO_WEIGHT_FLOOR);
        acc_b.elo_weight = elo::decay_weight(acc_b.elo_weight, ELO_WEIGHT_DECREMENT, ELO_WEIGHT_FLOOR);
        acc_a.played_games += 1;
        acc_b.played_games += 1;

        if result == 1.0 {
            acc_a.scoring_one += 1;
            acc_b.scoring_zero += 1;
        } else if result == 0.0 {
            acc_a.scoring_zero += 1;
            acc_b.scoring_one += 1;
        } else {
            acc_a.scoring_half += 1;
            acc_b.scoring_half += 1;
        }

        let score = match result {
            r if r == 1.0 => "1:0",
            r if r == 0.0 => "0:1",
            _ => "1/2:1/2",
        };
        self.last_game = format!(
            "{} - {} {} ({})",
            acc_a.name,
            acc_b.name,
            score,
            chrono::Local::now().format("%d.%m.")
        );

        self.linked.remove(&a);
        self.linked.remove(&b);

        self.registry.update(acc_a.clone()).await;
        self.registry.update(acc_b.clone()).await;
        if let Some(conn) = self.online.get_mut(&a) {
            conn.account = acc_a;
        }
        if let Some(conn) = self.online.get_mut(&b) {
            conn.account = acc_b;
        }
    }

    async fn merge_admissions(&mut self) {
        while let Ok(admission) = self.rx.try_recv() {
            match admission {
                Admission::Player(p) => {
                    let id = p.account.id;
                    self.online.insert(
                        id,
                        OnlineConn { account: p.account, socket: p.socket, buffer: p.buffer, pending: VecDeque::new() },
                    );
                }
                Admission::Admin(a) => {
                    if let Some(mut previous) = self.admin.take() {
                        let _ = send_line(&mut previous.socket, "ERROR: ADMIN SIGNED IN TWICE").await;
                        let _ = previous.socket.shutdown().await;
                    }
                    self.admin = Some(AdminConn { socket: a.socket, buffer: a.buffer });
                }
            }
        }
    }

    async fn run_matchmaker_tick(&mut self) {
        self.reverse_sort = !self.reverse_sort;
        let candidates: Vec<(UserId, i64)> = self
            .users_to_link
            .iter()
            .filter(|id| !self.linked.contains_key(id))
            .filter_map(|&id| self.online.get(&id).map(|c| (id, c.account.rating)))
            .collect();
        let pairs = pair_candidates(candidates, self.reverse_sort);
        for (a, b) in pairs {
            self.link_users(a, b).await;
        }
    }

    async fn link_users(&mut self, a: UserId, b: UserId) {
        let Some(mut ca) = self.online.remove(&a) else {
            return;
        };
        let Some(mut cb) = self.online.remove(&b) else {
            self.online.insert(a, ca);
            return;
        };

        self.linked.insert(a, b);
        self.linked.insert(b, a);
        self.users_to_link.remove(&a);
        self.users_to_link.remove(&b);

        let mut failed = Vec::new();
        if send_line(&mut ca.socket, &wire::name_of(&cb.account.name)).await.is_err() {
            failed.push(a);
        }
        if send_line(&mut ca.socket, &wire::note(&lang::connected_with(&cb.account.name, cb.account.rating)))
            .await
            .is_err()
        {
            failed.push(a);
        }
        if send_line(&mut ca.socket, wire::NEW_GAME).await.is_err() {
            failed.push(a);
        }

        if send_line(&mut cb.socket, &wire::name_of(&ca.account.name)).await.is_err() {
            failed.push(b);
        }
        if send_line(&mut cb.socket, &wire::note(&lang::connected_with(&ca.account.name, ca.account.rating)))
            .await
            .is_err()
        {
            failed.push(b);
        }
        if send_line(&mut cb.socket, wire::NEW_GAME).await.is_err() {
            failed.push(b);
        }

        let a_is_white: bool = rand::random();
        let (white, black) = if a_is_white { (&mut ca, &mut cb) } else { (&mut cb, &mut ca) };
        if send_line(&mut white.socket, wire::PLAY_WHITE).await.is_err() {
            failed.push(white.account.id);
        }
        if send_line(&mut black.socket, wire::PLAY_BLACK).await.is_err() {
            failed.push(black.account.id);
        }

        self.online.insert(a, ca);
        self.online.insert(b, cb);
        for id in failed {
            self.disconnected.insert(id);
        }
    }

    async fn service_admin(&mut self) -> AdminOutcome {
        let Some(admin_conn) = self.admin.as_mut() else { return AdminOutcome::Continue };

        let mut chunk = [0u8; 256];
        let record = match admin_conn.socket.try_read(&mut chunk) {
            Ok(0) => {
                self.admin = None;
                return AdminOutcome::Continue;
            }
            Ok(n) => {
                admin_conn.buffer.push(&chunk[..n]);
                admin_conn.buffer.pop_message()
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => None,
            Err(_) => {
                self.admin = None;
                return AdminOutcome::Continue;
            }
        };

        let Some(command) = record else { return AdminOutcome::Continue };

        let accounts = self.registry.all_accounts().await;
        let online_ids: HashSet<UserId> = self.online.keys().copied().collect();
        let ip_counts = self.registry.ip_counts_snapshot().await;
        let view = AdminView {
            all_accounts: &accounts,
            online_ids: &online_ids,
            linked: &self.linked,
            ip_counts: &ip_counts,
            last_game: &self.last_game,
            active_worker_count: 3,
        };
        let result = admin::execute(&command, &view);

        let (outcome, override_text) = self.apply_admin_effect(result.effect).await;
        let text = override_text.unwrap_or(result.text);

        if let Some(admin_conn) = self.admin.as_mut() {
            let _ = send_line(&mut admin_conn.socket, &text).await;
        }

        outcome
    }

    async fn apply_admin_effect(&mut self, effect: Effect) -> (AdminOutcome, Option<String>) {
        match effect {
            Effect::None => (AdminOutcome::Continue, None),
            Effect::Notify { name, message } => {
                if let Some(id) = self.find_online_by_name(&name) {
                    if let Some(conn) = self.online.get_mut(&id) {
                        let _ = send_line(&mut conn.socket, &message).await;
                    }
                }
                (AdminOutcome::Continue, None)
            }
            Effect::NotifyAll { message } => {
                let ids: Vec<UserId> = self.online.keys().copied().collect();
                for id in ids {
                    if let Some(conn) = self.online.get_mut(&id) {
                        let _ = send_line(&mut conn.socket, &message).await;
                    }
                }
                (AdminOutcome::Continue, None)
            }
            Effect::ResetPassword { name } => {
                self.registry.mark_password_reset(&name).await;
                (AdminOutcome::Continue, None)
            }
            Effect::Remove { name } => {
                if let Some(account) = self.registry.find_by_name(&name).await {
                    self.registry.remove(account.id).await;
                    self.disconnected.insert(account.id);
                }
                (AdminOutcome::Continue, None)
            }
            Effect::SignOff { name } => {
                if let Some(id) = self.find_online_by_name(&name) {
                    self.disconnected.insert(id);
                }
                (AdminOutcome::Continue, None)
            }
            Effect::SetLanguage(n) => {
                lang::set_language(n);
                (AdminOutcome::Continue, None)
            }
            Effect::Update => {
                crate::admission::persist_now(&self.registry, &self.db).await;
                (AdminOutcome::Continue, None)
            }
            Effect::Feedback => {
                let body = self.concatenate_feedback().await;
                (AdminOutcome::Continue, Some(admin::wrap(&body)))
            }
            Effect::Stop => {
                self.stop.store(true, Ordering::Relaxed);
                (AdminOutcome::Continue, None)
            }
            Effect::Shutdown => {
                self.stop.store(true, Ordering::Relaxed);
                (AdminOutcome::Shutdown, None)
            }
        }
    }

    /// Admin `feedback` verb: concatenate every `*.txt` file in the data
    /// directory, per spec.md §4.H.
    async fn concatenate_feedback(&self) -> String {
        let mut entries = match tokio::fs::read_dir(&self.data_dir).await {
            Ok(e) => e,
            Err(_) => return "no feedback on file".to_owned(),
        };
        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("txt") {
                names.push(path);
            }
        }
        names.sort();
        if names.is_empty() {
            return "no feedback on file".to_owned();
        }
        let mut out = String::new();
        for path in names {
            if let Ok(contents) = tokio::fs::read_to_string(&path).await {
                out.push_str(&contents);
            }
        }
        out
    }
}

#[derive(PartialEq, Eq)]
enum AdminOutcome {
    Continue,
    Shutdown,
}

async fn send_line(socket: &mut TcpStream, text: &str) -> std::io::Result<()> {
    let mut payload = text.as_bytes().to_vec();
    payload.push(ETX);
    socket.write_all(&payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::Account;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (server, client)
    }

    fn conn(account: Account, socket: TcpStream) -> OnlineConn {
        OnlineConn { account, socket, buffer: FrameBuffer::new(), pending: VecDeque::new() }
    }

    #[tokio::test]
    async fn link_users_sends_name_note_newgame_and_a_color_to_each_side() {
        let registry = Arc::new(Registry::new());
        let db = Arc::new(Mutex::new(Db::open_in_memory().unwrap()));
        let (_tx, rx) = mpsc::channel(1);
        let mut state = RelayState::new(registry, db, rx, Arc::new(AtomicBool::new(false)), PathBuf::from("."));

        let (server_a, mut client_a) = connected_pair().await;
        let (server_b, mut client_b) = connected_pair().await;
        let a = Account::new(1, "alice".into(), "pw".into(), "1.1.1.1".into(), "t".into());
        let b = Account::new(2, "bob".into(), "pw".into(), "1.1.1.2".into(), "t".into());
        state.online.insert(1, conn(a, server_a));
        state.online.insert(2, conn(b, server_b));

        state.link_users(1, 2).await;

        assert_eq!(state.linked.get(&1), Some(&2));
        assert_eq!(state.linked.get(&2), Some(&1));

        let mut buf = [0u8; 512];
        let n = client_a.read(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..n]);
        assert!(text.contains("%NAME bob"));
        assert!(text.contains(wire::NEW_GAME));
        assert!(text.contains(wire::PLAY_WHITE) || text.contains(wire::PLAY_BLACK));

        let n = client_b.read(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..n]);
        assert!(text.contains("%NAME alice"));
    }

    #[tokio::test]
    async fn scoring_updates_ratings_and_unlinks_players() {
        let registry = Arc::new(Registry::new());
        let db = Arc::new(Mutex::new(Db::open_in_memory().unwrap()));
        let (_tx, rx) = mpsc::channel(1);
        let mut state = RelayState::new(registry, db, rx, Arc::new(AtomicBool::new(false)), PathBuf::from("."));

        let (server_a, _client_a) = connected_pair().await;
        let (server_b, _client_b) = connected_pair().await;
        let a = Account::new(1, "alice".into(), "pw".into(), "1.1.1.1".into(), "t".into());
        let b = Account::new(2, "bob".into(), "pw".into(), "1.1.1.2".into(), "t".into());
        state.online.insert(1, conn(a, server_a));
        state.online.insert(2, conn(b, server_b));
        state.linked.insert(1, 2);
        state.linked.insert(2, 1);

        state.apply_scoring(1, 0.5).await;

        assert!(!state.linked.contains_key(&1));
        assert!(!state.linked.contains_key(&2));
        assert_eq!(state.online.get(&1).unwrap().account.rating, 1000);
        assert_eq!(state.online.get(&2).unwrap().account.rating, 1000);
        assert_eq!(state.online.get(&1).unwrap().account.elo_weight, 38);
        assert_eq!(state.online.get(&1).unwrap().account.scoring_half, 1);
    }

    #[tokio::test]
    async fn peer_traffic_with_no_partner_gets_not_linked_note() {
        let registry = Arc::new(Registry::new());
        let db = Arc::new(Mutex::new(Db::open_in_memory().unwrap()));
        let (_tx, rx) = mpsc::channel(1);
        let mut state = RelayState::new(registry, db, rx, Arc::new(AtomicBool::new(false)), PathBuf::from("."));

        let (server_a, mut client_a) = connected_pair().await;
        let a = Account::new(1, "alice".into(), "pw".into(), "1.1.1.1".into(), "t".into());
        let mut oc = conn(a, server_a);
        oc.pending.push_back("e4".to_owned());
        state.online.insert(1, oc);

        state.dispatch_one_round().await;

        let mut buf = [0u8; 128];
        let n = client_a.read(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..n]);
        assert!(text.contains("NOT_LINKED") || text.contains("not linked"));
    }

    #[tokio::test]
    async fn feedback_round_trips_through_the_data_directory() {
        let data_dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(Registry::new());
        let db = Arc::new(Mutex::new(Db::open_in_memory().unwrap()));
        let (_tx, rx) = mpsc::channel(1);
        let mut state =
            RelayState::new(registry, db, rx, Arc::new(AtomicBool::new(false)), data_dir.path().to_path_buf());

        let (server_a, _client_a) = connected_pair().await;
        let a = Account::new(1, "alice".into(), "pw".into(), "1.1.1.1".into(), "t".into());
        state.online.insert(1, conn(a, server_a));

        state.write_feedback(1, "this matchmaker is great").await;

        let body = state.concatenate_feedback().await;
        assert!(body.contains("this matchmaker is great"));
    }
}
