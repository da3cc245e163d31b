//! Client and server modes over real loopback TCP, with the test playing
//! the FreeSWITCH side.

use freeswitch_eventsocket::{
    DisconnectReason, EslConnectOptions, EslConnection, EslError, EslListener,
};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const AUTH_REQUEST: &str = "Content-Type: auth/request\n\n";
const REPLY_OK: &str = "Content-Type: command/reply\nReply-Text: +OK accepted\n\n";

async fn read_request<S: AsyncRead + Unpin>(stream: &mut S) -> String {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream
            .read_exact(&mut byte)
            .await
            .unwrap();
        buf.push(byte[0]);
        if buf.ends_with(b"\r\n\r\n") || buf.ends_with(b"\n\n") {
            break;
        }
    }
    String::from_utf8(buf).unwrap()
}

fn fast_options() -> EslConnectOptions {
    EslConnectOptions {
        command_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_millis(500),
        ..Default::default()
    }
}

#[tokio::test]
async fn dial_authenticates_then_runs_commands() {
    let switch = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = switch
        .local_addr()
        .unwrap();

    let fake = tokio::spawn(async move {
        let (mut sock, _) = switch
            .accept()
            .await
            .unwrap();
        sock.write_all(AUTH_REQUEST.as_bytes())
            .await
            .unwrap();
        assert_eq!(read_request(&mut sock).await, "auth ClueCon\r\n\r\n");
        // Reply and an event in the same segment: nothing may be lost
        // between the handshake and the reader task.
        let event_body = "Event-Name: HEARTBEAT\nCore-UUID: core-1\n\n";
        let frame = format!(
            "{}Content-Type: text/event-plain\nContent-Length: {}\n\n{}",
            REPLY_OK,
            event_body.len(),
            event_body
        );
        sock.write_all(frame.as_bytes())
            .await
            .unwrap();

        assert_eq!(read_request(&mut sock).await, "api status\r\n\r\n");
        sock.write_all(b"Content-Type: api/response\nContent-Length: 2\n\nUP")
            .await
            .unwrap();
        sock
    });

    let conn = EslConnection::dial_with_options(addr, "ClueCon", fast_options())
        .await
        .unwrap();
    assert_eq!(conn.remote_addr(), Some(addr));

    let event = conn
        .read_event()
        .await
        .unwrap();
    assert_eq!(event.event_name(), Some("HEARTBEAT"));

    let status = conn
        .api("status")
        .await
        .unwrap();
    assert_eq!(status.body(), Some("UP"));

    let _sock = fake
        .await
        .unwrap();
    conn.close()
        .await;
    assert_eq!(conn.closed().await, DisconnectReason::ClientRequested);
}

#[tokio::test]
async fn dial_reports_rejected_password() {
    let switch = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = switch
        .local_addr()
        .unwrap();

    tokio::spawn(async move {
        let (mut sock, _) = switch
            .accept()
            .await
            .unwrap();
        sock.write_all(AUTH_REQUEST.as_bytes())
            .await
            .unwrap();
        read_request(&mut sock).await;
        sock.write_all(b"Content-Type: command/reply\nReply-Text: -ERR invalid\n\n")
            .await
            .unwrap();
        let mut rest = Vec::new();
        let _ = sock
            .read_to_end(&mut rest)
            .await;
    });

    let err = EslConnection::dial_with_options(addr, "wrong", fast_options())
        .await
        .unwrap_err();
    match err {
        EslError::AuthFailed { reason } => assert_eq!(reason, "-ERR invalid"),
        other => panic!("expected AuthFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn dial_rejects_unexpected_greeting() {
    let switch = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = switch
        .local_addr()
        .unwrap();

    tokio::spawn(async move {
        let (mut sock, _) = switch
            .accept()
            .await
            .unwrap();
        sock.write_all(b"Content-Type: text/rude-rejection\nContent-Length: 7\n\ngo 'way")
            .await
            .unwrap();
        let mut rest = Vec::new();
        let _ = sock
            .read_to_end(&mut rest)
            .await;
    });

    let err = EslConnection::dial_with_options(addr, "ClueCon", fast_options())
        .await
        .unwrap_err();
    assert!(matches!(err, EslError::ProtocolError { .. }), "got {:?}", err);
}

#[tokio::test]
async fn dial_times_out_without_greeting() {
    let switch = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = switch
        .local_addr()
        .unwrap();

    let _hold = tokio::spawn(async move {
        let (sock, _) = switch
            .accept()
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(sock);
    });

    let err = EslConnection::dial_with_options(addr, "ClueCon", fast_options())
        .await
        .unwrap_err();
    assert!(matches!(err, EslError::Timeout { timeout_ms: 500 }), "got {:?}", err);
}

#[tokio::test]
async fn dial_fails_when_nothing_listens() {
    let port = {
        let probe = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap();
        probe
            .local_addr()
            .unwrap()
            .port()
    };
    let err = EslConnection::dial_with_options(("127.0.0.1", port), "ClueCon", fast_options())
        .await
        .unwrap_err();
    assert!(matches!(err, EslError::Io(_) | EslError::Timeout { .. }));
}

#[tokio::test]
async fn listener_runs_handlers_concurrently() {
    let listener = EslListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .with_options(EslConnectOptions {
            command_timeout: Duration::from_secs(5),
            ..Default::default()
        });
    let addr = listener
        .local_addr()
        .unwrap();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    tokio::spawn(listener.serve(move |conn: EslConnection| {
        let done_tx = done_tx.clone();
        async move {
            let reply = conn
                .connect_session()
                .await
                .unwrap();
            let _ = done_tx.send(
                reply
                    .unique_id()
                    .unwrap_or_default()
                    .to_string(),
            );
        }
    }));

    let mut slow = TcpStream::connect(addr)
        .await
        .unwrap();
    let mut fast = TcpStream::connect(addr)
        .await
        .unwrap();

    assert_eq!(read_request(&mut slow).await, "connect\r\n\r\n");
    assert_eq!(read_request(&mut fast).await, "connect\r\n\r\n");

    // The second session completes while the first is still waiting
    fast.write_all(b"Content-Type: command/reply\nReply-Text: +OK\nUnique-ID: fast\n\n")
        .await
        .unwrap();
    let first_done = timeout(Duration::from_secs(2), done_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first_done, "fast");

    slow.write_all(b"Content-Type: command/reply\nReply-Text: +OK\nUnique-ID: slow\n\n")
        .await
        .unwrap();
    let second_done = timeout(Duration::from_secs(2), done_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second_done, "slow");
}

#[tokio::test]
async fn outbound_session_flow() {
    let listener = EslListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let addr = listener
        .local_addr()
        .unwrap();
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();

    tokio::spawn(listener.serve(move |conn: EslConnection| {
        let done_tx = done_tx.clone();
        async move {
            conn.connect_session()
                .await
                .unwrap();
            conn.linger(Some(10))
                .await
                .unwrap();
            conn.execute("playback", "/tmp/welcome.wav", true)
                .await
                .unwrap();
            while let Ok(event) = conn
                .read_event()
                .await
            {
                if event.application() == Some("playback")
                    && event.application_response() == Some("FILE PLAYED")
                {
                    let _ = done_tx.send(conn.exit().await.is_ok());
                    return;
                }
            }
        }
    }));

    let mut switch = TcpStream::connect(addr)
        .await
        .unwrap();

    assert_eq!(read_request(&mut switch).await, "connect\r\n\r\n");
    switch
        .write_all(REPLY_OK.as_bytes())
        .await
        .unwrap();
    assert_eq!(read_request(&mut switch).await, "linger 10\r\n\r\n");
    switch
        .write_all(REPLY_OK.as_bytes())
        .await
        .unwrap();
    assert_eq!(
        read_request(&mut switch).await,
        "sendmsg\ncall-command: execute\nexecute-app-name: playback\n\
         execute-app-arg: /tmp/welcome.wav\nevent-lock: true\n\n"
    );
    switch
        .write_all(REPLY_OK.as_bytes())
        .await
        .unwrap();

    let body = "Event-Name: CHANNEL_EXECUTE_COMPLETE\nApplication: playback\n\
                Application-Response: FILE%20PLAYED\n\n";
    let frame = format!(
        "Content-Type: text/event-plain\nContent-Length: {}\n\n{}",
        body.len(),
        body
    );
    switch
        .write_all(frame.as_bytes())
        .await
        .unwrap();

    assert_eq!(read_request(&mut switch).await, "exit\r\n\r\n");
    switch
        .write_all(REPLY_OK.as_bytes())
        .await
        .unwrap();

    let exited = timeout(Duration::from_secs(2), done_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(exited);
}
