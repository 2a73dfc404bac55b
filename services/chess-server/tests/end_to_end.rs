//! End-to-end scenarios driven over real loopback TCP against a full
//! `chess_server::run` instance, mirroring the shape of
//! `services/server/tests/*` in the teacher repo.

use chess_protocol::ETX;
use chess_server::config::Cli;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{sleep, Duration};

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn spawn_server(port: u16) -> Arc<AtomicBool> {
    let cli = Cli {
        authentication: "secret".to_owned(),
        admin_authentication: "adminsecret".to_owned(),
        port,
        ip: Some("127.0.0.1".to_owned()),
    };
    let stop = Arc::new(AtomicBool::new(false));
    let task_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        let _ = chess_server::run(cli, task_stop).await;
    });
    sleep(Duration::from_millis(100)).await;
    stop
}

async fn send(stream: &mut TcpStream, text: &str) {
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(ETX);
    stream.write_all(&bytes).await.unwrap();
}

async fn recv(stream: &mut TcpStream) -> String {
    let mut buf = [0u8; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    String::from_utf8_lossy(&buf[..n]).trim_end_matches(ETX as char).to_owned()
}

async fn register(addr: &str, name: &str) -> TcpStream {
    let mut client = TcpStream::connect(addr).await.unwrap();
    send(&mut client, "secret").await;
    send(&mut client, &format!("%NAME {name}")).await;
    send(&mut client, "pw").await;
    let welcome = recv(&mut client).await;
    assert!(welcome.starts_with("WELCOME"));
    client
}

#[tokio::test]
async fn two_users_link_and_record_a_rated_draw() {
    let port = free_port();
    let _stop = spawn_server(port).await;
    let addr = format!("127.0.0.1:{port}");

    let mut a = register(&addr, "client_a").await;
    let mut b = register(&addr, "client_b").await;

    send(&mut a, "%SERVER LINKTO client_b").await;
    sleep(Duration::from_millis(200)).await;

    let name_msg = recv(&mut a).await;
    assert!(name_msg.contains("client_b"));

    send(&mut a, "%SERVER SCORING 0.5").await;
    sleep(Duration::from_millis(200)).await;

    // A further peer-traffic message from a user no longer linked gets
    // a NOT_LINKED note back rather than being forwarded.
    send(&mut a, "e4").await;
    sleep(Duration::from_millis(200)).await;
    let note = recv(&mut a).await;
    assert!(note.contains("NOTE"));

    drop(b);
}

#[tokio::test]
async fn admin_notify_reaches_the_named_user() {
    let port = free_port();
    let _stop = spawn_server(port).await;
    let addr = format!("127.0.0.1:{port}");

    let mut user = register(&addr, "client_c").await;

    let mut admin = TcpStream::connect(&addr).await.unwrap();
    send(&mut admin, "adminsecret").await;
    sleep(Duration::from_millis(100)).await;
    send(&mut admin, "notify client_c hello_there").await;

    sleep(Duration::from_millis(200)).await;
    let notify = recv(&mut user).await;
    assert!(notify.contains("hello_there"));

    let reply = recv(&mut admin).await;
    assert!(reply.contains("client_c notified"));
}

#[tokio::test]
async fn duplicate_name_while_online_is_rejected() {
    let port = free_port();
    let _stop = spawn_server(port).await;
    let addr = format!("127.0.0.1:{port}");

    let _first = register(&addr, "client_dup").await;

    let mut second = TcpStream::connect(&addr).await.unwrap();
    send(&mut second, "secret").await;
    send(&mut second, "%NAME client_dup").await;

    let reply = recv(&mut second).await;
    assert!(reply.contains("already assigned") || reply.contains("vergeben"));
}
