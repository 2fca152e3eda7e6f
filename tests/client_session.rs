// End-to-end tests against a scripted in-process AMCP server
//
// Each test binds a local listener, lets the client connect, and plays the
// server side by hand: reading command lines and writing raw response frames.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::timeout;

use caspar_amcp::{
    AmcpClient, AmcpError, AmcpEvent, ClientConfig, EventReceiver, MediaType, ReconnectState,
};

const WAIT: Duration = Duration::from_secs(5);

async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn client_for(port: u16, auto_connect: bool) -> AmcpClient {
    AmcpClient::new(
        ClientConfig::builder()
            .hostname("127.0.0.1")
            .port(port)
            .auto_connect(auto_connect)
            .reconnect_interval_ms(50)
            .build(),
    )
}

struct ServerSide {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl ServerSide {
    async fn accept(listener: &TcpListener) -> Self {
        let (socket, _) = timeout(WAIT, listener.accept())
            .await
            .expect("client never connected")
            .unwrap();
        let (read, writer) = socket.into_split();
        Self {
            lines: BufReader::new(read).lines(),
            writer,
        }
    }

    async fn expect_line(&mut self, expected: &str) {
        let line = timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for command")
            .unwrap()
            .expect("client closed the connection");
        assert_eq!(line, expected);
    }

    async fn reply(&mut self, frames: &str) {
        self.writer.write_all(frames.as_bytes()).await.unwrap();
    }
}

async fn next_event(rx: &mut EventReceiver) -> AmcpEvent {
    timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .unwrap()
}

async fn expect_connection(rx: &mut EventReceiver, connected: bool) -> AmcpEvent {
    let event = next_event(rx).await;
    match &event {
        AmcpEvent::ConnectionStateChanged(change) => assert_eq!(change.connected, connected),
        other => panic!("expected connection change, got {:?}", other),
    }
    event
}

async fn assert_quiet(rx: &mut EventReceiver) {
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(
        rx.try_recv().is_err(),
        "expected no further events"
    );
}

#[tokio::test]
async fn connect_primes_version_and_channels() {
    let (listener, port) = bind().await;
    let client = client_for(port, false);
    let mut events = client.subscribe();

    assert!(client.connect().await.unwrap());
    assert!(!client.connect().await.unwrap(), "second connect is a no-op");

    let mut server = ServerSide::accept(&listener).await;
    expect_connection(&mut events, true).await;

    server.expect_line("VERSION").await;
    server.expect_line("INFO").await;
    server
        .reply("201 VERSION OK\r\n2.3.0 Stable\r\n200 INFO OK\r\n1 1080i5000 PLAYING\r\n2 PAL PLAYING\r\n\r\n")
        .await;

    match next_event(&mut events).await {
        AmcpEvent::VersionUpdated(version) => assert_eq!(version, "2.3.0 Stable"),
        other => panic!("unexpected {:?}", other),
    }
    match next_event(&mut events).await {
        AmcpEvent::ChannelListUpdated(channels) => {
            assert_eq!(channels.len(), 2);
            assert_eq!(channels[1].video_mode, "PAL");
        }
        other => panic!("unexpected {:?}", other),
    }

    assert_eq!(client.version().await, "2.3.0 Stable");
    assert_eq!(client.channels().await.len(), 2);
}

#[tokio::test]
async fn listings_data_and_thumbnails() {
    let (listener, port) = bind().await;
    let client = client_for(port, false);
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let mut server = ServerSide::accept(&listener).await;
    expect_connection(&mut events, true).await;
    server.expect_line("VERSION").await;
    server.expect_line("INFO").await;

    client.refresh_mediafiles().await.unwrap();
    client.refresh_templates().await.unwrap();
    client.retrieve_data("missing").await.unwrap();
    client.retrieve_thumbnail("AMB").await.unwrap();
    client.refresh_datalist().await.unwrap();

    server.expect_line("CLS").await;
    server.expect_line("TLS").await;
    server.expect_line("DATA RETRIEVE \"missing\"").await;
    server.expect_line("THUMBNAIL RETRIEVE \"AMB\"").await;
    server.expect_line("DATA LIST").await;

    // Frames arrive byte by byte to exercise partial reads
    let frames = concat!(
        "200 CLS OK\r\n",
        "\"CLIPS/AMB\" MOVIE 6445960 20170412103442 268 1/25\r\n",
        "\"BROKEN\" CLIP 1 20170412103442\r\n",
        "\"LOGO\" STILL 2048 20170412103442 NaN 0/1\r\n",
        "\r\n",
        "200 TLS OK\r\n",
        "\"CASPAR_TEXT\" 6192 20170412103442\r\n",
        "\r\n",
        "404 DATA RETRIEVE ERROR\r\n",
        "501 THUMBNAIL RETRIEVE FAILED\r\n",
        "200 DATA LIST OK\r\n",
        "lower_third\r\n",
        "\r\n",
    );
    for byte in frames.as_bytes() {
        server.writer.write_all(&[*byte]).await.unwrap();
    }

    match next_event(&mut events).await {
        AmcpEvent::MediaListUpdated(media) => {
            assert_eq!(media.len(), 2, "bad line is skipped, rest kept");
            assert_eq!(media[0].full_name(), "CLIPS/AMB");
            assert_eq!(media[0].timecode, "00:00:10:18");
            assert_eq!(media[1].media_type, MediaType::Still);
            assert_eq!(media[1].frames, 0);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        next_event(&mut events).await,
        AmcpEvent::TemplateListUpdated(ref t) if t.len() == 1
    ));
    assert!(matches!(
        next_event(&mut events).await,
        AmcpEvent::DataRetrieved(ref d) if d.is_empty()
    ));
    match next_event(&mut events).await {
        AmcpEvent::ThumbnailRetrieved { data, command } => {
            assert!(data.is_empty());
            assert_eq!(command, "THUMBNAIL");
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        next_event(&mut events).await,
        AmcpEvent::DataListUpdated(ref names) if names == &vec!["lower_third".to_string()]
    ));

    assert_eq!(client.media().await.len(), 2);
    assert_eq!(client.templates().await.len(), 1);
    assert_eq!(client.datafiles().await, vec!["lower_third".to_string()]);
    assert!(client.set_thumbnail("CLIPS/AMB", "iVBORw0KGgo=").await);
}

#[tokio::test]
async fn commands_reach_the_wire_in_order() {
    let (listener, port) = bind().await;
    let client = client_for(port, false);
    client.connect().await.unwrap();
    let mut server = ServerSide::accept(&listener).await;
    server.expect_line("VERSION").await;
    server.expect_line("INFO").await;

    for layer in 1..=20 {
        client
            .send_string(&format!("PLAY 1-{} AMB", layer))
            .await
            .unwrap();
    }
    client.store_data("score", "<data/>").await.unwrap();
    client.remove_data("score").await.unwrap();

    for layer in 1..=20 {
        server.expect_line(&format!("PLAY 1-{} AMB", layer)).await;
    }
    server.expect_line("DATA STORE \"score\" \"<data/>\"").await;
    server.expect_line("DATA REMOVE \"score\"").await;
}

#[tokio::test]
async fn disconnect_notifies_once() {
    let (listener, port) = bind().await;
    let client = client_for(port, true);
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let _server = ServerSide::accept(&listener).await;
    expect_connection(&mut events, true).await;

    assert!(client.disconnect().await);
    assert!(!client.disconnect().await);

    match expect_connection(&mut events, false).await {
        AmcpEvent::ConnectionStateChanged(change) => assert!(change.error.is_none()),
        _ => unreachable!(),
    }
    assert_quiet(&mut events).await;
    assert_eq!(client.reconnect_state(), ReconnectState::Idle);
    assert!(matches!(
        client.refresh_version().await,
        Err(AmcpError::NotConnected)
    ));
}

#[tokio::test]
async fn reconnects_after_server_restart() {
    let (listener, port) = bind().await;
    let addr = listener.local_addr().unwrap();
    let client = client_for(port, true);
    let mut events = client.subscribe();

    client.connect().await.unwrap();
    let server = ServerSide::accept(&listener).await;
    expect_connection(&mut events, true).await;

    // Server goes away completely; attempts are refused for a while
    drop(server);
    drop(listener);
    match expect_connection(&mut events, false).await {
        AmcpEvent::ConnectionStateChanged(change) => assert!(change.error.is_some()),
        _ => unreachable!(),
    }
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(client.reconnect_state(), ReconnectState::Retrying);
    assert_quiet(&mut events).await;

    let listener = TcpListener::bind(addr).await.unwrap();
    let mut server = ServerSide::accept(&listener).await;
    expect_connection(&mut events, true).await;

    // A fresh connection is primed again
    server.expect_line("VERSION").await;
    server.expect_line("INFO").await;
    assert!(client.is_connected().await);
    assert_eq!(client.reconnect_state(), ReconnectState::Idle);
    assert_quiet(&mut events).await;
}

#[tokio::test]
async fn failed_connect_without_auto_reconnect() {
    let (listener, port) = bind().await;
    drop(listener);

    let client = client_for(port, false);
    let mut events = client.subscribe();

    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, AmcpError::ConnectFailed { .. }));
    assert!(err.is_retryable());

    match expect_connection(&mut events, false).await {
        AmcpEvent::ConnectionStateChanged(change) => assert!(change.is_failure()),
        _ => unreachable!(),
    }
    assert_quiet(&mut events).await;
    assert_eq!(client.reconnect_state(), ReconnectState::Idle);
}

#[tokio::test]
async fn connect_to_stores_settings() {
    let (listener, port) = bind().await;
    let client = AmcpClient::new(ClientConfig::default());
    let mut events = client.subscribe();

    assert!(client.connect_to("127.0.0.1", port, false).await.unwrap());
    let _server = ServerSide::accept(&listener).await;
    expect_connection(&mut events, true).await;

    let config = client.config().await;
    assert_eq!(config.hostname, "127.0.0.1");
    assert_eq!(config.port, port);

    // Ignored while connected
    assert!(!client.connect_to("10.9.9.9", 1, true).await.unwrap());
    assert_eq!(client.config().await.port, port);
}
