use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};

use super::frame::{LineBuffer, StreamEvent};
use super::normalize::ChatResponseAccumulator;
use crate::backend::BackendClient;

pub const CONNECT_ERROR_MESSAGE: &str = "Error: Could not connect to chat service.";
pub const DECODE_ERROR_MESSAGE: &str = "Error: Could not decode chat service response.";

pub type ChatWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Parameters of one chat turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub message: String,
    pub index_name: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>, index_name: Option<&str>) -> Self {
        Self {
            message: message.into(),
            index_name: index_name
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        }
    }
}

/// Snapshots of the response as it grows. Each item is the whole message so far.
///
/// Dropping the stream cancels the worker, which closes the HTTP connection.
pub struct SnapshotStream {
    snapshots: mpsc::UnboundedReceiver<String>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

pub struct ChatStreamHandle {
    pub stream: SnapshotStream,
    pub worker: ChatWorker,
}

impl SnapshotStream {
    fn new(snapshots: mpsc::UnboundedReceiver<String>, cancel_tx: oneshot::Sender<()>) -> Self {
        Self {
            snapshots,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub async fn recv(&mut self) -> Option<String> {
        self.snapshots.recv().await
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Stream for SnapshotStream {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<String>> {
        self.snapshots.poll_recv(cx)
    }
}

impl Drop for SnapshotStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

enum LineOutcome {
    Continue,
    Stop,
}

#[derive(Debug, Clone)]
pub struct StreamingChatClient {
    backend: BackendClient,
}

impl StreamingChatClient {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    /// Streams one chat turn, driving the worker on the current tokio runtime.
    pub fn stream(&self, message: &str, active_index: Option<&str>) -> SnapshotStream {
        let ChatStreamHandle { stream, worker } = self.open(message, active_index);
        tokio::spawn(worker);
        stream
    }

    /// Builds the snapshot stream and the worker that feeds it without spawning.
    pub fn open(&self, message: &str, active_index: Option<&str>) -> ChatStreamHandle {
        let request = ChatRequest::new(message, active_index);
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let worker: ChatWorker = Box::pin(Self::run_stream_worker(
            self.backend.clone(),
            request,
            snapshot_tx,
            cancel_rx,
        ));

        ChatStreamHandle {
            stream: SnapshotStream::new(snapshot_rx, cancel_tx),
            worker,
        }
    }

    async fn run_stream_worker(
        backend: BackendClient,
        request: ChatRequest,
        snapshot_tx: mpsc::UnboundedSender<String>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        let opened = tokio::select! {
            _ = &mut cancel_rx => {
                tracing::debug!("chat stream cancelled before the backend answered");
                return;
            }
            opened = backend.open_chat(&request.message, request.index_name.as_deref()) => opened,
        };

        let response = match opened {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    index_name = ?request.index_name,
                    error = %error,
                    "failed to open chat stream"
                );
                let _ = snapshot_tx.send(CONNECT_ERROR_MESSAGE.to_string());
                return;
            }
        };
        tracing::debug!(index_name = ?request.index_name, "chat stream opened");

        let mut body = response.bytes_stream();
        let mut lines = LineBuffer::new();
        let mut accumulator = ChatResponseAccumulator::new();
        let mut emitted = 0usize;

        loop {
            tokio::select! {
                _ = &mut cancel_rx => {
                    // Dropping `body` here releases the connection.
                    tracing::debug!(emitted, "chat stream cancelled");
                    return;
                }
                chunk = body.next() => {
                    match chunk {
                        Some(Ok(bytes)) => {
                            for line in lines.push(&bytes) {
                                if let LineOutcome::Stop =
                                    Self::apply_line(&line, &mut accumulator, &snapshot_tx, &mut emitted)
                                {
                                    return;
                                }
                            }
                        }
                        Some(Err(error)) => {
                            tracing::warn!(
                                emitted,
                                error = %error,
                                "chat stream interrupted while reading"
                            );
                            let _ = snapshot_tx.send(CONNECT_ERROR_MESSAGE.to_string());
                            return;
                        }
                        None => break,
                    }
                }
            }
        }

        if let Some(line) = lines.finish() {
            let _ = Self::apply_line(&line, &mut accumulator, &snapshot_tx, &mut emitted);
        }
        tracing::debug!(emitted, "chat stream finished");
    }

    fn apply_line(
        line: &str,
        accumulator: &mut ChatResponseAccumulator,
        snapshot_tx: &mpsc::UnboundedSender<String>,
        emitted: &mut usize,
    ) -> LineOutcome {
        let event = match StreamEvent::parse(line) {
            Ok(Some(event)) => event,
            Ok(None) => return LineOutcome::Continue,
            Err(error) => {
                tracing::warn!(line = %line, error = %error, "chat stream frame is not valid JSON");
                let _ = snapshot_tx.send(DECODE_ERROR_MESSAGE.to_string());
                return LineOutcome::Stop;
            }
        };

        let snapshot = accumulator.push(event.content()).to_string();
        if snapshot_tx.send(snapshot).is_err() {
            // Consumer is gone.
            return LineOutcome::Stop;
        }
        *emitted += 1;
        LineOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::backend::{CHAT_ENDPOINT, EVENT_STREAM_MIME};
    use crate::chat::normalize::THINK_MARKER;
    use crate::settings::ClientSettings;

    fn client_for(base_url: &str) -> StreamingChatClient {
        let backend = BackendClient::new(&ClientSettings::default().with_backend_url(base_url))
            .expect("backend client");
        StreamingChatClient::new(backend)
    }

    fn event_stream(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_raw(body.to_string(), EVENT_STREAM_MIME)
    }

    /// Accepts one connection, consumes the request head and answers with a
    /// body that promises more bytes than it will send.
    async fn accept_with_open_body(listener: &TcpListener) -> TcpStream {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|window| window == b"\r\n\r\n") {
            let read = socket.read(&mut buf).await.expect("read request");
            assert!(read > 0, "client closed before sending a request");
            head.extend_from_slice(&buf[..read]);
        }
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncontent-length: 100000\r\n\r\n",
            )
            .await
            .expect("write head");
        socket
    }

    #[tokio::test]
    async fn frames_become_progressive_snapshots() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CHAT_ENDPOINT))
            .and(query_param("msg", "hello"))
            .and(query_param("indexName", "repoA"))
            .and(header("accept", EVENT_STREAM_MIME))
            .respond_with(event_stream(
                "data:{\"text\":\"Hi\"}\n\ndata:{\"text\":\"\"}\n\ndata:{\"text\":\" there\"}\n\n",
            ))
            .expect(1)
            .mount(&server)
            .await;

        let snapshots = client_for(&server.uri())
            .stream("hello", Some("repoA"))
            .collect::<Vec<_>>()
            .await;

        assert_eq!(snapshots, vec!["\nHi", "\nHi\n", "\nHi\n there"]);
    }

    #[tokio::test]
    async fn empty_index_is_omitted_from_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CHAT_ENDPOINT))
            .and(query_param_is_missing("indexName"))
            .respond_with(event_stream("event:message\ndata:{\"text\":\"ok\"}\n"))
            .expect(1)
            .mount(&server)
            .await;

        let snapshots = client_for(&server.uri())
            .stream("hello", Some(""))
            .collect::<Vec<_>>()
            .await;

        assert_eq!(snapshots, vec!["\nok"]);
    }

    #[tokio::test]
    async fn final_snapshot_concatenates_every_fragment_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CHAT_ENDPOINT))
            .respond_with(event_stream(concat!(
                "data:{\"text\":\"<think>\"}\n",
                "data:{\"text\":\"hmm\"}\n",
                "data:\n",
                "data:{\"text\":\"</think>\"}\n",
                "data:{\"text\":\"caf\u{c3}\u{a9}\"}\n",
                "data:{\"text\":\" done\"}",
            )))
            .mount(&server)
            .await;

        let snapshots = client_for(&server.uri())
            .stream("q", None)
            .collect::<Vec<_>>()
            .await;

        assert_eq!(snapshots.len(), 5);
        assert_eq!(
            snapshots.last().map(String::as_str),
            Some(format!("\n{THINK_MARKER}\nhmm\n{THINK_MARKER}\ncaf\u{e9} done").as_str())
        );
        assert!(
            snapshots
                .windows(2)
                .all(|pair| pair[1].starts_with(pair[0].as_str()))
        );
    }

    #[tokio::test]
    async fn malformed_frame_ends_with_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CHAT_ENDPOINT))
            .respond_with(event_stream(
                "data:{\"text\":\"partial\"}\ndata:{oops\ndata:{\"text\":\"never\"}\n",
            ))
            .mount(&server)
            .await;

        let snapshots = client_for(&server.uri())
            .stream("q", None)
            .collect::<Vec<_>>()
            .await;

        assert_eq!(snapshots, vec!["\npartial", DECODE_ERROR_MESSAGE]);
    }

    #[tokio::test]
    async fn unreachable_backend_yields_single_connect_error() {
        let snapshots = client_for("http://127.0.0.1:1")
            .stream("q", None)
            .collect::<Vec<_>>()
            .await;

        assert_eq!(snapshots, vec![CONNECT_ERROR_MESSAGE]);
    }

    #[tokio::test]
    async fn server_error_status_is_reported_as_connect_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CHAT_ENDPOINT))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let snapshots = client_for(&server.uri())
            .stream("q", None)
            .collect::<Vec<_>>()
            .await;

        assert_eq!(snapshots, vec![CONNECT_ERROR_MESSAGE]);
    }

    #[tokio::test]
    async fn cancelling_a_pending_stream_ends_it_promptly() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CHAT_ENDPOINT))
            .respond_with(event_stream("data:{\"text\":\"late\"}\n").set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let mut stream = client_for(&server.uri()).stream("q", None);
        assert!(stream.cancel());
        assert!(!stream.cancel());

        let next = tokio::time::timeout(Duration::from_secs(5), stream.recv())
            .await
            .expect("worker should stop after cancellation");
        assert_eq!(next, None);
    }

    #[tokio::test]
    async fn open_leaves_driving_the_worker_to_the_caller() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(CHAT_ENDPOINT))
            .respond_with(event_stream("data:{\"text\":\"a\"}\ndata:{\"text\":\"b\"}\n"))
            .mount(&server)
            .await;

        let ChatStreamHandle { stream, worker } = client_for(&server.uri()).open("q", None);
        worker.await;

        assert_eq!(stream.collect::<Vec<_>>().await, vec!["\na", "\nab"]);
    }

    #[tokio::test]
    async fn body_cut_short_keeps_snapshots_and_ends_with_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base_url = format!("http://{}", listener.local_addr().expect("addr"));
        let server = tokio::spawn(async move {
            let mut socket = accept_with_open_body(&listener).await;
            socket
                .write_all(b"data:{\"text\":\"a\"}\n")
                .await
                .expect("write frame");
            socket.flush().await.expect("flush");
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let snapshots = tokio::time::timeout(
            Duration::from_secs(5),
            client_for(&base_url).stream("q", None).collect::<Vec<_>>(),
        )
        .await
        .expect("stream should end once the connection drops");
        server.await.expect("server task");

        assert_eq!(snapshots, vec!["\na", CONNECT_ERROR_MESSAGE]);
    }

    #[tokio::test]
    async fn dropping_the_stream_mid_body_closes_the_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let base_url = format!("http://{}", listener.local_addr().expect("addr"));
        let server = tokio::spawn(async move {
            let mut socket = accept_with_open_body(&listener).await;
            // Keep producing frames until the client hangs up.
            loop {
                let written = socket.write_all(b"data:{\"text\":\"x\"}\n").await;
                if written.is_err() || socket.flush().await.is_err() {
                    return true;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        });

        let mut stream = client_for(&base_url).stream("q", None);
        assert_eq!(stream.recv().await.as_deref(), Some("\nx"));
        drop(stream);

        let closed = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should see the connection close")
            .expect("server task");
        assert!(closed);
    }
}
