//! Component 4.E — the admission pipeline.
//!
//! Each accepted connection runs the CONNECTED → AUTHED → NAMED →
//! CREDENTIALED → ADMITTED handshake on its own task so one slow or
//! malicious peer can't stall the accept loop; ordering guarantees only
//! apply per-connection, never across connections, so this matches the
//! spec without needing a single-threaded handshake.

use crate::account::Account;
use crate::persistence::Db;
use crate::registry::{AdmitError, Registry};
use chess_protocol::constants::{ACCEPT_TIMEOUT, DB_UPDATE_INTERVAL, HANDSHAKE_TIMEOUT, MAX_ATTEMPTS};
use chess_protocol::framer::{read_message, FrameBuffer, ReadOutcome};
use chess_protocol::{lang, wire};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

pub struct AdmittedPlayer {
    pub account: Account,
    pub socket: TcpStream,
    pub buffer: FrameBuffer,
}

pub struct AdmittedAdmin {
    pub socket: TcpStream,
    pub buffer: FrameBuffer,
}

pub enum Admission {
    Player(AdmittedPlayer),
    Admin(AdmittedAdmin),
}

/// Try `host:port`, then up to MAX_ATTEMPTS-1 successive ports.
pub async fn bind_listener(host: &str, start_port: u16) -> std::io::Result<(TcpListener, u16)> {
    let mut port = start_port;
    let mut last_err = None;
    for attempt in 0..MAX_ATTEMPTS {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => {
                info!(%host, port, "bound listener");
                return Ok((listener, port));
            }
            Err(e) => {
                warn!(%host, port, attempt, "bind failed");
                last_err = Some(e);
                port += 1;
            }
        }
    }
    Err(last_err.unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::AddrInUse, "no port bound")))
}

async fn send_error(socket: &mut TcpStream, msg: &str) {
    use tokio::io::AsyncWriteExt;
    let mut payload = wire::info(msg).into_bytes();
    payload.push(chess_protocol::ETX);
    let _ = socket.write_all(&payload).await;

    let mut echo = "%ECHO?".to_owned().into_bytes();
    echo.push(chess_protocol::ETX);
    let _ = socket.write_all(&echo).await;

    let mut buf = FrameBuffer::new();
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), read_message(socket, &mut buf)).await;
}

async fn handshake_read(socket: &mut TcpStream, buf: &mut FrameBuffer) -> Option<String> {
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, read_message(socket, buf)).await {
        Ok(Ok(ReadOutcome::Message(msg))) => Some(msg),
        _ => None,
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    ip: String,
    authentication: &str,
    admin_authentication: &str,
    registry: &Registry,
    db_path: &str,
) -> Option<Admission> {
    let mut buf = FrameBuffer::new();

    let first = match handshake_read(&mut socket, &mut buf).await {
        Some(m) => m,
        None => {
            send_error(&mut socket, lang::TIMEOUT_ERROR.resolve()).await;
            return None;
        }
    };

    if first == admin_authentication {
        info!("admin connected");
        use tokio::io::AsyncWriteExt;
        let mut banner = wire::admin_welcome(db_path).into_bytes();
        banner.push(chess_protocol::ETX);
        let _ = socket.write_all(&banner).await;
        return Some(Admission::Admin(AdmittedAdmin { socket, buffer: buf }));
    }

    if first != authentication {
        send_error(&mut socket, lang::AUTH_ERROR.resolve()).await;
        return None;
    }

    let name_record = match handshake_read(&mut socket, &mut buf).await {
        Some(m) => m,
        None => {
            send_error(&mut socket, lang::TIMEOUT_ERROR.resolve()).await;
            return None;
        }
    };
    let Some(name) = name_record.strip_prefix("%NAME ").map(str::to_owned) else {
        send_error(&mut socket, lang::PROTOCOL_ERROR.resolve()).await;
        return None;
    };
    if name.is_empty() {
        send_error(&mut socket, lang::PROTOCOL_ERROR.resolve()).await;
        return None;
    }

    let existing = registry.find_by_name(&name).await;
    if let Some(known) = &existing {
        if registry.is_online(known.id).await {
            let msg = lang::already_assigned(&name);
            send_error(&mut socket, &msg).await;
            return None;
        }
    }

    let password = match handshake_read(&mut socket, &mut buf).await {
        Some(m) => m,
        None => {
            send_error(&mut socket, lang::TIMEOUT_ERROR.resolve()).await;
            return None;
        }
    };

    let now = chrono::Local::now().format("%Y.%m.%d.%H:%M:%S").to_string();

    let mut account = if let Some(mut known) = existing {
        if known.password == chess_protocol::constants::PASSWORD_RESET_SENTINEL {
            registry.set_password(known.id, password.clone()).await;
            known.password = password;
        } else if password != known.password {
            send_error(&mut socket, lang::INCORRECT_PW.resolve()).await;
            return None;
        }
        known.ip = ip.clone();
        known.last_login = now;
        known
    } else {
        registry.create(name.clone(), password, ip.clone(), now).await
    };

    // Welcome is sent before the per-IP cap is checked, matching the
    // ADMITTED state order in spec.md §4.E (welcome, then cap check).
    use tokio::io::AsyncWriteExt;
    let mut welcome = wire::welcome(&name).into_bytes();
    welcome.push(chess_protocol::ETX);
    if socket.write_all(&welcome).await.is_err() {
        return None;
    }

    match registry.admit(account.id, &ip, &account.last_login).await {
        Ok(()) => {}
        Err(AdmitError::TooManyIp) => {
            send_error(&mut socket, lang::TOO_MANY_IP.resolve()).await;
            return None;
        }
    }
    account.ip = ip;
    registry.update(account.clone()).await;

    info!(user = %name, "admitted");
    Some(Admission::Player(AdmittedPlayer { account, socket, buffer: buf }))
}

/// Runs the accept loop until `stop` is set. Persists the full account
/// table every `DB_UPDATE_INTERVAL`, per component 4.E.
pub async fn run(
    listener: TcpListener,
    authentication: String,
    admin_authentication: String,
    registry: Arc<Registry>,
    db: Arc<Mutex<Db>>,
    tx: mpsc::Sender<Admission>,
    stop: Arc<AtomicBool>,
    db_path: String,
) {
    let mut last_db_update = Instant::now();

    loop {
        if stop.load(Ordering::Relaxed) {
            break;
        }

        if last_db_update.elapsed() >= DB_UPDATE_INTERVAL {
            persist_now(&registry, &db).await;
            last_db_update = Instant::now();
        }

        let accept = tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept()).await;
        let (socket, addr) = match accept {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                warn!(error = %e, "accept error");
                continue;
            }
            Err(_) => continue, // accept timeout; loop back to re-check stop/db timer
        };

        let ip = addr_ip(addr);
        let registry = Arc::clone(&registry);
        let auth = authentication.clone();
        let admin_auth = admin_authentication.clone();
        let tx = tx.clone();
        let db_path = db_path.clone();

        tokio::spawn(async move {
            if let Some(admission) = handle_connection(socket, ip, &auth, &admin_auth, &registry, &db_path).await {
                let _ = tx.send(admission).await;
            }
        });
    }
}

fn addr_ip(addr: SocketAddr) -> String {
    addr.ip().to_string()
}

pub async fn persist_now(registry: &Registry, db: &Mutex<Db>) {
    let accounts = registry.all_accounts().await;
    let mut guard = db.lock().await;
    match guard.replace_all(&accounts) {
        Ok(()) => info!(count = accounts.len(), "persisted account table"),
        Err(e) => warn!(error = %e, "persistence skipped this interval, database busy"),
    }
}
