pub mod account;
pub mod admin;
pub mod admission;
pub mod config;
pub mod matchmaker;
pub mod persistence;
pub mod registry;
pub mod relay;

use crate::config::Cli;
use crate::persistence::Db;
use crate::registry::Registry;
use crate::relay::RelayState;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

/// Wires the admission pipeline and the relay loop together and runs
/// until `stop` is set or an admin issues `shutdown`. Exposed as a
/// library entry point so integration tests can drive a real server
/// instance over loopback TCP without going through `main`.
pub async fn run(cli: Cli, stop: Arc<AtomicBool>) -> std::io::Result<()> {
    let ip = cli.resolve_ip();
    let data_dir = PathBuf::from(config::data_dir_name(&ip, cli.port));
    std::fs::create_dir_all(&data_dir)?;

    let db_path = data_dir.join("accounts.sqlite3");
    let mut db = Db::open(&db_path).map_err(std::io::Error::other)?;
    let (accounts, max_id) = db.load_all().map_err(std::io::Error::other)?;
    let registry = Arc::new(Registry::new());
    registry.load(accounts, max_id).await;
    let db = Arc::new(Mutex::new(db));

    let (listener, bound_port) = admission::bind_listener(&ip, cli.port).await?;
    info!(%ip, port = bound_port, "chess server listening");

    let (tx, rx) = mpsc::channel(64);
    let admission_stop = Arc::clone(&stop);
    let admission_registry = Arc::clone(&registry);
    let admission_db = Arc::clone(&db);
    let admission_task = tokio::spawn(admission::run(
        listener,
        cli.authentication.clone(),
        cli.admin_authentication.clone(),
        admission_registry,
        admission_db,
        tx,
        admission_stop,
        db_path.display().to_string(),
    ));

    let mut relay = RelayState::new(Arc::clone(&registry), Arc::clone(&db), rx, Arc::clone(&stop), data_dir);
    relay.run().await;

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    let _ = admission_task.await;
    admission::persist_now(&registry, &db).await;
    info!("chess server shut down");
    Ok(())
}
