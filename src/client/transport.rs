//! SSE consumer for the server's `/chat-stream` route.
//!
//! Each connection is one stream session: framed text events are decoded
//! into [`StreamMessage`]s tagged with the session's stream id and pushed
//! over an unbounded channel. A connection that goes quiet past the idle
//! timeout is failed with a terminal error marker rather than awaited
//! forever.

use std::time::Duration;

use futures_util::StreamExt;
use memchr::memchr;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::chat_stream::StreamMessage;
use crate::utils::url::construct_api_url;

/// Parameters for one stream connection, produced by the controller.
#[derive(Debug, Clone)]
pub struct ConnectParams {
    pub expert: String,
    pub query: String,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

/// Incremental SSE event decoder. Fields accumulate until the blank line
/// that dispatches the event.
#[derive(Default)]
struct EventFrame {
    name: Option<String>,
    data: Option<String>,
}

impl EventFrame {
    fn push_line(&mut self, line: &str) {
        if let Some(value) = line.strip_prefix("event:") {
            self.name = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            }
        }
        // Comment lines and unknown fields are ignored per the SSE format.
    }

    /// Dispatch on a blank line. Returns the decoded message, if any.
    fn take(&mut self) -> Option<StreamMessage> {
        let name = self.name.take();
        let data = self.data.take()?;
        match name.as_deref() {
            Some("error") => Some(StreamMessage::Error(data)),
            _ => Some(StreamMessage::Chunk(data)),
        }
    }
}

#[derive(Clone)]
pub struct StreamTransport {
    client: reqwest::Client,
    server_url: String,
    idle_timeout: Duration,
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl StreamTransport {
    pub fn new(
        server_url: impl Into<String>,
        idle_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                client: reqwest::Client::new(),
                server_url: server_url.into(),
                idle_timeout,
                tx,
            },
            rx,
        )
    }

    /// Open one stream connection. Chunks arrive on the channel returned by
    /// [`StreamTransport::new`], tagged with the params' stream id, ending
    /// with a terminal marker. Cancelling the token closes the connection
    /// without sending further messages for this session.
    pub fn spawn_connection(&self, params: ConnectParams) {
        let tx = self.tx.clone();
        let client = self.client.clone();
        let url = construct_api_url(&self.server_url, "chat-stream");
        let idle_timeout = self.idle_timeout;

        tokio::spawn(async move {
            let ConnectParams {
                expert,
                query,
                cancel_token,
                stream_id,
            } = params;

            tokio::select! {
                _ = run_connection(client, url, expert, query, idle_timeout, &tx, &cancel_token, stream_id) => {}
                _ = cancel_token.cancelled() => {}
            }
        });
    }

    #[cfg(test)]
    pub fn send_for_test(&self, message: StreamMessage, stream_id: u64) {
        let _ = self.tx.send((message, stream_id));
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_connection(
    client: reqwest::Client,
    url: String,
    expert: String,
    query: String,
    idle_timeout: Duration,
    tx: &mpsc::UnboundedSender<(StreamMessage, u64)>,
    cancel_token: &CancellationToken,
    stream_id: u64,
) {
    // The idle window also bounds the wait for response headers, so a
    // server that accepts the connection but never answers still fails
    // the session instead of hanging it.
    let send = client
        .get(url)
        .query(&[("expert", expert.as_str()), ("q", query.as_str())])
        .send();
    let response = match tokio::time::timeout(idle_timeout, send).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            let _ = tx.send((StreamMessage::Error(format!("connection failed: {e}")), stream_id));
            let _ = tx.send((StreamMessage::End, stream_id));
            return;
        }
        Err(_) => {
            let _ = tx.send((
                StreamMessage::Error(format!(
                    "connection timed out: no response for {}s",
                    idle_timeout.as_secs()
                )),
                stream_id,
            ));
            let _ = tx.send((StreamMessage::End, stream_id));
            return;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let detail = if body.trim().is_empty() {
            status.to_string()
        } else {
            body.trim().to_string()
        };
        let _ = tx.send((StreamMessage::Error(detail), stream_id));
        let _ = tx.send((StreamMessage::End, stream_id));
        return;
    }

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut frame = EventFrame::default();

    loop {
        let chunk = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Ok(Some(chunk)) => chunk,
            // Connection closed by the server: normal completion.
            Ok(None) => break,
            Err(_) => {
                let _ = tx.send((
                    StreamMessage::Error(format!(
                        "stream idle timeout: no data for {}s",
                        idle_timeout.as_secs()
                    )),
                    stream_id,
                ));
                let _ = tx.send((StreamMessage::End, stream_id));
                return;
            }
        };

        if cancel_token.is_cancelled() {
            return;
        }

        let chunk_bytes = match chunk {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = tx.send((StreamMessage::Error(format!("connection dropped: {e}")), stream_id));
                let _ = tx.send((StreamMessage::End, stream_id));
                return;
            }
        };

        buffer.extend_from_slice(&chunk_bytes);

        while let Some(newline_pos) = memchr(b'\n', &buffer) {
            let line = match std::str::from_utf8(&buffer[..newline_pos]) {
                Ok(s) => s.trim_end_matches('\r').to_string(),
                Err(e) => {
                    tracing::warn!("invalid UTF-8 in event stream: {e}");
                    buffer.drain(..=newline_pos);
                    continue;
                }
            };
            buffer.drain(..=newline_pos);

            if line.is_empty() {
                match frame.take() {
                    Some(StreamMessage::Error(detail)) => {
                        let _ = tx.send((StreamMessage::Error(detail), stream_id));
                        let _ = tx.send((StreamMessage::End, stream_id));
                        return;
                    }
                    Some(message) => {
                        let _ = tx.send((message, stream_id));
                    }
                    None => {}
                }
            } else {
                frame.push_line(&line);
            }
        }
    }

    let _ = tx.send((StreamMessage::End, stream_id));
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn connect(transport: &StreamTransport, stream_id: u64) {
        transport.spawn_connection(ConnectParams {
            expert: "general".into(),
            query: "q".into(),
            cancel_token: CancellationToken::new(),
            stream_id,
        });
    }

    async fn recv(
        rx: &mut tokio::sync::mpsc::UnboundedReceiver<(StreamMessage, u64)>,
    ) -> (StreamMessage, u64) {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no terminal marker within 5s")
            .expect("channel closed")
    }

    fn decode(lines: &[&str]) -> Vec<StreamMessage> {
        let mut frame = EventFrame::default();
        let mut out = Vec::new();
        for line in lines {
            if line.is_empty() {
                if let Some(message) = frame.take() {
                    out.push(message);
                }
            } else {
                frame.push_line(line);
            }
        }
        out
    }

    #[test]
    fn data_events_decode_to_chunks() {
        let messages = decode(&["data: hello", "", "data:world", ""]);
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], StreamMessage::Chunk(c) if c == "hello"));
        assert!(matches!(&messages[1], StreamMessage::Chunk(c) if c == "world"));
    }

    #[test]
    fn multi_line_data_joins_with_newline() {
        let messages = decode(&["data: - a", "data: - b", ""]);
        assert_eq!(messages.len(), 1);
        assert!(matches!(&messages[0], StreamMessage::Chunk(c) if c == "- a\n- b"));
    }

    #[test]
    fn named_error_events_decode_to_error_markers() {
        let messages = decode(&["event: error", "data: API error: quota exceeded", ""]);
        assert_eq!(messages.len(), 1);
        assert!(
            matches!(&messages[0], StreamMessage::Error(e) if e == "API error: quota exceeded")
        );
    }

    #[test]
    fn comments_and_incomplete_frames_are_dropped() {
        let messages = decode(&[": keep-alive", "", "data: dangling"]);
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn channel_messages_carry_their_stream_id() {
        let (transport, mut rx) =
            StreamTransport::new("http://127.0.0.1:3000", Duration::from_secs(30));

        transport.send_for_test(StreamMessage::Chunk("- a".into()), 7);
        transport.send_for_test(StreamMessage::End, 7);

        let (message, id) = rx.recv().await.expect("chunk");
        assert_eq!(id, 7);
        assert!(matches!(message, StreamMessage::Chunk(_)));
        let (message, id) = rx.recv().await.expect("end");
        assert_eq!(id, 7);
        assert!(matches!(message, StreamMessage::End));
    }

    #[tokio::test]
    async fn idle_timeout_fails_a_stream_that_stalls_mid_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;

            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\n\
                        transfer-encoding: chunked\r\n\r\n";
            socket.write_all(head.as_bytes()).await.expect("head");
            let body = "data: - a\n\n";
            let frame = format!("{:x}\r\n{body}\r\n", body.len());
            socket.write_all(frame.as_bytes()).await.expect("frame");
            socket.flush().await.expect("flush");
            // Hold the connection open without sending anything further.
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(socket);
        });

        let (transport, mut rx) =
            StreamTransport::new(format!("http://{addr}"), Duration::from_millis(200));
        connect(&transport, 1);

        let (message, id) = recv(&mut rx).await;
        assert_eq!(id, 1);
        assert!(matches!(&message, StreamMessage::Chunk(c) if c == "- a"));

        let (message, _) = recv(&mut rx).await;
        assert!(matches!(&message, StreamMessage::Error(e) if e.contains("idle timeout")));
        let (message, _) = recv(&mut rx).await;
        assert!(matches!(message, StreamMessage::End));
    }

    #[tokio::test]
    async fn connecting_to_a_server_that_never_responds_fails_within_the_idle_window() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            // Accept the connection, then never send response headers.
            let (socket, _) = listener.accept().await.expect("accept");
            tokio::time::sleep(Duration::from_secs(60)).await;
            drop(socket);
        });

        let (transport, mut rx) =
            StreamTransport::new(format!("http://{addr}"), Duration::from_millis(200));
        connect(&transport, 3);

        let (message, id) = recv(&mut rx).await;
        assert_eq!(id, 3);
        assert!(matches!(&message, StreamMessage::Error(e) if e.contains("timed out")));
        let (message, _) = recv(&mut rx).await;
        assert!(matches!(message, StreamMessage::End));
    }

    #[test]
    fn event_name_resets_between_frames() {
        let messages = decode(&["event: error", "data: boom", "", "data: next", ""]);
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], StreamMessage::Error(_)));
        assert!(matches!(&messages[1], StreamMessage::Chunk(c) if c == "next"));
    }
}
