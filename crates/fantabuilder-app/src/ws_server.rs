// WebSocket server for draft clients (admin console and observers).

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Identifies one websocket connection for the lifetime of the process.
pub type ClientId = u64;

/// Queued outbound frames per client before the app loop waits on it.
pub const OUTBOUND_CAPACITY: usize = 256;

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug)]
pub enum WsEvent {
    /// A client completed the handshake. Text pushed into `outbound` is
    /// written to its socket.
    Connected {
        client_id: ClientId,
        addr: String,
        outbound: mpsc::Sender<String>,
    },
    /// A text frame from a client (raw JSON string).
    Message { client_id: ClientId, text: String },
    /// The client's socket closed.
    Disconnected { client_id: ClientId },
}

/// Source of raw byte streams to run the websocket handshake over.
#[async_trait]
pub trait ConnectionListener: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next connection, returning it with a printable peer address.
    async fn accept(&mut self) -> io::Result<(Self::Stream, String)>;
}

/// Production listener on `127.0.0.1:{port}`.
pub struct TcpConnectionListener {
    inner: TcpListener,
}

impl TcpConnectionListener {
    pub async fn bind(port: u16) -> io::Result<Self> {
        let inner = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
        Ok(Self { inner })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.inner.local_addr()
    }
}

#[async_trait]
impl ConnectionListener for TcpConnectionListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, String)> {
        let (stream, addr) = self.inner.accept().await?;
        Ok((stream, addr.to_string()))
    }
}

/// Accept connections forever, serving each on its own task and forwarding
/// events through `tx`. Returns when the listener fails or the application
/// side has hung up.
pub async fn run<L: ConnectionListener>(mut listener: L, tx: mpsc::Sender<WsEvent>) -> anyhow::Result<()> {
    info!("WebSocket server accepting connections");

    loop {
        let (stream, addr) = listener.accept().await?;
        if tx.is_closed() {
            break;
        }
        info!("Accepted connection from {addr}");
        let client_id = NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed);
        tokio::spawn(serve_connection(stream, addr, client_id, tx.clone()));
    }

    Ok(())
}

/// Handshake, then pump frames both ways until either side goes away.
async fn serve_connection<S>(stream: S, addr: String, client_id: ClientId, tx: mpsc::Sender<WsEvent>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };

    let (mut write, read) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_CAPACITY);

    if tx
        .send(WsEvent::Connected {
            client_id,
            addr: addr.clone(),
            outbound: out_tx,
        })
        .await
        .is_err()
    {
        return;
    }

    // Ends once every outbound sender is dropped or the socket refuses writes.
    let writer_addr = addr.clone();
    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if let Err(e) = write.send(Message::Text(text.into())).await {
                debug!("Write to {writer_addr} failed: {e}");
                break;
            }
        }
        let _ = write.close().await;
    });

    let _ = process_message_stream(read, &tx, client_id, &addr).await;
    info!("Client {client_id} ({addr}) disconnected");
    let _ = tx.send(WsEvent::Disconnected { client_id }).await;
    let _ = writer.await;
}

/// Process raw WebSocket [`Message`] items from any [`Stream`], forwarding
/// text payloads through `tx`. Returns `Err(())` if the channel is closed
/// (receiver dropped), signalling the caller to stop.
///
/// This is a pure-logic function that requires no I/O and is the primary
/// unit-test target.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<WsEvent>,
    client_id: ClientId,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let event = WsEvent::Message {
                    client_id,
                    text: text.to_string(),
                };
                if tx.send(event).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::Error as WsError;

    /// Helper: create a stream of Message results from a vec.
    fn mock_stream(
        messages: Vec<Result<Message, WsError>>,
    ) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        stream::iter(messages)
    }

    /// Helper: unwrap a `WsEvent::Message` into its text.
    fn text_of(event: WsEvent) -> String {
        match event {
            WsEvent::Message { text, .. } => text,
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn text_message_forwarded_to_channel() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![Ok(Message::Text("hello".into()))];

        process_message_stream(mock_stream(messages), &tx, 7, "test")
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            WsEvent::Message { client_id, text } => {
                assert_eq!(client_id, 7);
                assert_eq!(text, "hello");
            }
            other => panic!("expected Message, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn multiple_messages_forwarded_in_order() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Text("first".into())),
            Ok(Message::Text("second".into())),
            Ok(Message::Text("third".into())),
        ];

        process_message_stream(mock_stream(messages), &tx, 1, "test")
            .await
            .unwrap();

        assert_eq!(text_of(rx.recv().await.unwrap()), "first");
        assert_eq!(text_of(rx.recv().await.unwrap()), "second");
        assert_eq!(text_of(rx.recv().await.unwrap()), "third");
    }

    #[tokio::test]
    async fn close_frame_stops_processing() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Text("before_close".into())),
            Ok(Message::Close(None)),
            Ok(Message::Text("after_close_should_not_appear".into())),
        ];

        process_message_stream(mock_stream(messages), &tx, 1, "test")
            .await
            .unwrap();

        assert_eq!(text_of(rx.recv().await.unwrap()), "before_close");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn error_stops_processing() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Text("before_error".into())),
            Err(WsError::ConnectionClosed),
            Ok(Message::Text("after_error_should_not_appear".into())),
        ];

        process_message_stream(mock_stream(messages), &tx, 1, "test")
            .await
            .unwrap();

        assert_eq!(text_of(rx.recv().await.unwrap()), "before_error");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn binary_and_ping_messages_are_ignored() {
        let (tx, mut rx) = mpsc::channel(64);
        let messages = vec![
            Ok(Message::Binary(vec![1, 2, 3].into())),
            Ok(Message::Ping(vec![].into())),
            Ok(Message::Pong(vec![].into())),
            Ok(Message::Text("after_ignored".into())),
        ];

        process_message_stream(mock_stream(messages), &tx, 1, "test")
            .await
            .unwrap();

        assert_eq!(text_of(rx.recv().await.unwrap()), "after_ignored");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn returns_err_when_channel_closed() {
        let (tx, rx) = mpsc::channel(64);
        drop(rx);

        let messages = vec![Ok(Message::Text("orphan".into()))];

        let result = process_message_stream(mock_stream(messages), &tx, 1, "test").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn json_payload_preserved_exactly() {
        let (tx, mut rx) = mpsc::channel(64);
        let payload = r#"{"type":"CONFIRM_ASSIGNMENT","participant_id":1,"price":15}"#;
        let messages = vec![Ok(Message::Text(payload.into()))];

        process_message_stream(mock_stream(messages), &tx, 1, "test")
            .await
            .unwrap();

        assert_eq!(text_of(rx.recv().await.unwrap()), payload);
    }

    // ------------------------------------------------------------------
    // Full server over in-memory duplex pipes
    // ------------------------------------------------------------------

    /// Listener fed by the test with one end of a duplex pipe per client.
    struct MockListener {
        incoming: mpsc::Receiver<DuplexStream>,
    }

    #[async_trait]
    impl ConnectionListener for MockListener {
        type Stream = DuplexStream;

        async fn accept(&mut self) -> io::Result<(DuplexStream, String)> {
            match self.incoming.recv().await {
                Some(stream) => Ok((stream, "mock-peer".to_string())),
                None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "listener closed")),
            }
        }
    }

    #[tokio::test]
    async fn server_round_trips_frames_over_duplex() {
        let (conn_tx, conn_rx) = mpsc::channel(4);
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let server = tokio::spawn(run(MockListener { incoming: conn_rx }, event_tx));

        let (client_io, server_io) = tokio::io::duplex(64 * 1024);
        conn_tx.send(server_io).await.unwrap();
        let (mut client, _) = tokio_tungstenite::client_async("ws://localhost/", client_io)
            .await
            .unwrap();

        let (client_id, outbound) = match event_rx.recv().await.unwrap() {
            WsEvent::Connected {
                client_id,
                addr,
                outbound,
            } => {
                assert_eq!(addr, "mock-peer");
                (client_id, outbound)
            }
            other => panic!("expected Connected, got {other:?}"),
        };

        client.send(Message::Text("ping-json".into())).await.unwrap();
        match event_rx.recv().await.unwrap() {
            WsEvent::Message { client_id: id, text } => {
                assert_eq!(id, client_id);
                assert_eq!(text, "ping-json");
            }
            other => panic!("expected Message, got {other:?}"),
        }

        outbound.send("pushed".to_string()).await.unwrap();
        match client.next().await.unwrap().unwrap() {
            Message::Text(text) => assert_eq!(text.as_str(), "pushed"),
            other => panic!("expected text frame, got {other:?}"),
        }

        client.close(None).await.unwrap();
        match event_rx.recv().await.unwrap() {
            WsEvent::Disconnected { client_id: id } => assert_eq!(id, client_id),
            other => panic!("expected Disconnected, got {other:?}"),
        }

        drop(outbound);
        drop(conn_tx);
        assert!(server.await.unwrap().is_err());
    }
}
