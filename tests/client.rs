use std::sync::{Arc, Mutex};
use std::time::Duration;

use blynk_link::protocol::{Command, Frame, FrameCodec, Status};
use blynk_link::{Client, Config, ConnectionState, Error, HandlerRegistry};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::codec::Framed;

type Peer = Framed<TcpStream, FrameCodec>;

async fn listener() -> (TcpListener, Config) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = Config::new("token-123");
    config.server = "127.0.0.1".to_string();
    config.port = listener.local_addr().unwrap().port();
    config.connect_timeout = Duration::from_secs(2);
    (listener, config)
}

async fn accept(listener: &TcpListener) -> Peer {
    let (stream, _) = listener.accept().await.unwrap();
    Framed::new(stream, FrameCodec::default())
}

async fn next_frame(peer: &mut Peer) -> Frame {
    timeout(Duration::from_secs(2), peer.next())
        .await
        .expect("no frame from client")
        .expect("client closed the connection")
        .unwrap()
}

/// Accepts one connection and answers the login with `status`
async fn handshake(listener: &TcpListener, status: u16) -> Peer {
    let mut peer = accept(listener).await;
    let login = next_frame(&mut peer).await;
    assert_eq!(login.command(), Command::HardwareLogin);
    assert_eq!(login.id(), 1);
    assert_eq!(login.fields().unwrap(), vec!["token-123"]);
    peer.send(Frame::response(1, Status(status))).await.unwrap();
    peer
}

#[tokio::test]
async fn test_login_and_info_frame() {
    let (listener, config) = listener().await;
    let server = tokio::spawn(async move {
        let mut peer = handshake(&listener, Status::SUCCESS).await;
        let info = next_frame(&mut peer).await;
        assert_eq!(info.command(), Command::Internal);
        assert_eq!(
            info.fields().unwrap(),
            vec!["ver", "0.2.0", "h-beat", "10", "buff-in", "1024", "dev", "rust"]
        );
        peer
    });

    let mut client = Client::new(config, HandlerRegistry::new());
    client.open().await.unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    let _peer = server.await.unwrap();
    client.close().await;
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_invalid_token_is_fatal() {
    let (listener, config) = listener().await;
    let server = tokio::spawn(async move { handshake(&listener, Status::INVALID_TOKEN).await });

    let mut client = Client::new(config, HandlerRegistry::new());
    let err = client.open().await.unwrap_err();
    assert!(matches!(err, Error::InvalidToken));
    assert!(err.is_fatal());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    server.await.unwrap();
}

#[tokio::test]
async fn test_virtual_read_is_answered() {
    let (listener, config) = listener().await;
    let mut handlers = HandlerRegistry::new();
    handlers.on_virtual_read(5, |link| {
        link.virtual_write(5, [21.5])?;
        Ok(())
    });

    let server = tokio::spawn(async move {
        let mut peer = handshake(&listener, Status::SUCCESS).await;
        let _info = next_frame(&mut peer).await;
        peer.send(Frame::message(Command::Hardware, 10, ["vr", "5"]))
            .await
            .unwrap();
        let reply = next_frame(&mut peer).await;
        assert_eq!(reply.command(), Command::Hardware);
        assert_eq!(reply.fields().unwrap(), vec!["vw", "5", "21.5"]);
    });

    let mut client = Client::new(config, HandlerRegistry::new());
    *client.handlers_mut() = handlers;
    client.open().await.unwrap();
    let err = timeout(Duration::from_secs(5), client.run())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed | Error::Io(_)));
    server.await.unwrap();
}

#[tokio::test]
async fn test_ping_is_answered() {
    let (listener, config) = listener().await;
    let server = tokio::spawn(async move {
        let mut peer = handshake(&listener, Status::SUCCESS).await;
        let _info = next_frame(&mut peer).await;
        peer.send(Frame::message(Command::Ping, 77, std::iter::empty::<&str>()))
            .await
            .unwrap();
        assert_eq!(next_frame(&mut peer).await, Frame::response(77, Status::success()));
    });

    let mut client = Client::new(config, HandlerRegistry::new());
    client.open().await.unwrap();
    let _ = timeout(Duration::from_secs(5), client.run()).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_handle_send_and_close() {
    let (listener, config) = listener().await;
    let (done_tx, done_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let mut peer = handshake(&listener, Status::SUCCESS).await;
        let _info = next_frame(&mut peer).await;
        let notify = next_frame(&mut peer).await;
        assert_eq!(notify.command(), Command::Notify);
        assert_eq!(notify.fields().unwrap(), vec!["door open"]);
        let _ = done_tx.send(());
        // Client shuts the socket down after close
        assert!(timeout(Duration::from_secs(2), peer.next())
            .await
            .unwrap()
            .is_none());
    });

    let mut client = Client::new(config, HandlerRegistry::new());
    client.open().await.unwrap();
    let handle = client.handle();
    handle.notify("door open").unwrap();
    tokio::spawn(async move {
        let _ = done_rx.await;
        handle.close();
    });

    timeout(Duration::from_secs(5), client.run())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    server.await.unwrap();
}

#[tokio::test]
async fn test_session_killed_disconnects() {
    let (listener, config) = listener().await;
    let disconnects = Arc::new(Mutex::new(0));
    let mut handlers = HandlerRegistry::new();
    let count = disconnects.clone();
    handlers.on_disconnected(move || {
        *count.lock().unwrap() += 1;
        Ok(())
    });

    let server = tokio::spawn(async move {
        let mut peer = handshake(&listener, Status::SUCCESS).await;
        let _info = next_frame(&mut peer).await;
        peer.send(Frame::message(Command::Hardware, 0, ["vw", "1", "1"]))
            .await
            .unwrap();
        peer
    });

    let mut client = Client::new(config, handlers);
    client.open().await.unwrap();
    let err = timeout(Duration::from_secs(5), client.run())
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, Error::SessionKilled));
    assert_eq!(*disconnects.lock().unwrap(), 1);
    let _peer = server.await.unwrap();

    // The same client can log in again
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_connect_refused() {
    let (listener, config) = listener().await;
    drop(listener);

    let mut client = Client::new(config, HandlerRegistry::new());
    let err = client.open().await.unwrap_err();
    assert!(matches!(err, Error::Network(_) | Error::ConnectTimeout(_)));
    assert!(!err.is_fatal());
}
