//! A single established byte stream to a peer.
//!
//! A [`Link`] hides which transport produced it. Internally the stream is
//! split into a read half (consumed once, as a stream of lines) and a
//! write half (serialised behind a mutex).
//!
//! Closing is signalled through a `watch` channel rather than by reaching
//! into the reader: [`Link::close`] (or a [`LinkCloser`] held by another
//! task) flips the flag, the line stream observes it and ends, and the
//! read half is dropped. Once the `Link` itself is dropped too, the
//! underlying socket is closed.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::{watch, Mutex};

use crate::{Endpoint, LinkId, TransportError, TransportKind};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The inbound side of a link: one item per `\n`-terminated line.
///
/// Items are the line text without the terminator. The stream ends on
/// EOF or after the link is closed; a read failure is yielded once as
/// `Err` and then the stream ends.
pub type LineStream = BoxStream<'static, Result<String, TransportError>>;

// ---------------------------------------------------------------------------
// LinkCloser
// ---------------------------------------------------------------------------

/// A cloneable handle that can close a [`Link`] from any task.
#[derive(Debug, Clone)]
pub struct LinkCloser {
    closed: Arc<watch::Sender<bool>>,
}

impl LinkCloser {
    fn new() -> Self {
        Self {
            closed: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Marks the link closed. Returns `true` if this call did it, `false`
    /// if it was already closed.
    pub fn close(&self) -> bool {
        !self.closed.send_replace(true)
    }

    /// Returns `true` once the link has been closed.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves when the link is closed (immediately if it already is).
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives in `self`, so this cannot observe a dropped
        // channel.
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// One established bidirectional connection to a peer.
pub struct Link {
    id: LinkId,
    kind: TransportKind,
    peer: Endpoint,
    writer: Mutex<BoxedWriter>,
    reader: std::sync::Mutex<Option<BoxedReader>>,
    closer: LinkCloser,
}

impl Link {
    /// Wraps an established stream.
    pub fn new<S>(kind: TransportKind, peer: Endpoint, stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let id = LinkId::next();
        tracing::debug!(link_id = %id, %kind, peer = %peer, "link opened");
        Self {
            id,
            kind,
            peer,
            writer: Mutex::new(Box::new(writer)),
            reader: std::sync::Mutex::new(Some(Box::new(reader))),
            closer: LinkCloser::new(),
        }
    }

    /// Returns the unique identifier for this link.
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Which transport produced this link.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// The remote end.
    pub fn peer(&self) -> &Endpoint {
        &self.peer
    }

    /// Returns a handle that can close this link from elsewhere.
    pub fn closer(&self) -> LinkCloser {
        self.closer.clone()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closer.is_closed()
    }

    /// Writes `data` and flushes it.
    ///
    /// Writes are serialised: concurrent callers queue on the write half.
    pub async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.closer.is_closed() {
            return Err(TransportError::ConnectionClosed(format!(
                "{} is closed",
                self.id
            )));
        }
        let mut writer = self.writer.lock().await;
        writer
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        writer.flush().await.map_err(TransportError::SendFailed)
    }

    /// Takes the inbound line stream.
    ///
    /// The stream can be taken once; later calls return `None`.
    pub fn lines(&self) -> Option<LineStream> {
        let reader = self.reader.lock().ok()?.take()?;
        let state = LineReader {
            reader: BufReader::new(reader),
            closed: self.closer.subscribe(),
            buf: Vec::new(),
            done: false,
        };

        let lines = stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            match state.next_line().await {
                Ok(Some(line)) => Some((Ok(line), state)),
                Ok(None) => None,
                Err(e) => {
                    state.done = true;
                    Some((Err(e), state))
                }
            }
        });
        Some(lines.boxed())
    }

    /// Closes the link. Idempotent, and safe to call while another task
    /// is blocked reading.
    ///
    /// The pending read (if any) ends, further sends fail with
    /// [`TransportError::ConnectionClosed`], and the write half is shut
    /// down so the peer sees end-of-stream.
    pub async fn close(&self) {
        if !self.closer.close() {
            return;
        }
        tracing::debug!(link_id = %self.id, "link closed");
        // A send in progress holds the writer; the socket is then closed
        // when the link is dropped.
        if let Ok(mut writer) = self.writer.try_lock() {
            let _ = writer.shutdown().await;
        }
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.closer.close();
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// LineReader
// ---------------------------------------------------------------------------

struct LineReader {
    reader: BufReader<BoxedReader>,
    closed: watch::Receiver<bool>,
    buf: Vec<u8>,
    done: bool,
}

impl LineReader {
    /// Reads the next line, or `None` on EOF / close.
    async fn next_line(&mut self) -> Result<Option<String>, TransportError> {
        self.buf.clear();
        let read = tokio::select! {
            biased;

            _ = self.closed.wait_for(|closed| *closed) => return Ok(None),
            read = self.reader.read_until(b'\n', &mut self.buf) => read,
        };

        let n = read.map_err(TransportError::ReceiveFailed)?;
        if n == 0 {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&self.buf);
        let line = text.strip_suffix('\n').unwrap_or(&text);
        let line = line.strip_suffix('\r').unwrap_or(line);
        Ok(Some(line.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    fn link_pair() -> (Link, DuplexStream) {
        let (ours, theirs) = duplex(1024);
        let link =
            Link::new(TransportKind::Bluetooth, Endpoint::new("peer"), ours);
        (link, theirs)
    }

    #[tokio::test]
    async fn test_lines_yields_lines_in_order() {
        let (link, mut remote) = link_pair();
        let mut lines = link.lines().unwrap();

        remote.write_all(b"A\nB\nC\n").await.unwrap();

        assert_eq!(lines.next().await.unwrap().unwrap(), "A");
        assert_eq!(lines.next().await.unwrap().unwrap(), "B");
        assert_eq!(lines.next().await.unwrap().unwrap(), "C");
    }

    #[tokio::test]
    async fn test_lines_joins_split_writes() {
        let (link, mut remote) = link_pair();
        let mut lines = link.lines().unwrap();

        remote.write_all(b"hel").await.unwrap();
        remote.write_all(b"lo\r\n").await.unwrap();

        assert_eq!(lines.next().await.unwrap().unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_lines_ends_on_eof_after_partial_line() {
        let (link, mut remote) = link_pair();
        let mut lines = link.lines().unwrap();

        remote.write_all(b"tail").await.unwrap();
        drop(remote);

        assert_eq!(lines.next().await.unwrap().unwrap(), "tail");
        assert!(lines.next().await.is_none());
    }

    #[tokio::test]
    async fn test_lines_decodes_invalid_utf8_lossily() {
        let (link, mut remote) = link_pair();
        let mut lines = link.lines().unwrap();

        remote.write_all(b"ok\xff\n").await.unwrap();

        assert_eq!(lines.next().await.unwrap().unwrap(), "ok\u{fffd}");
    }

    #[tokio::test]
    async fn test_lines_can_only_be_taken_once() {
        let (link, _remote) = link_pair();
        assert!(link.lines().is_some());
        assert!(link.lines().is_none());
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let (link, _remote) = link_pair();
        let mut lines = link.lines().unwrap();
        let closer = link.closer();

        let reader = tokio::spawn(async move { lines.next().await.is_none() });
        tokio::task::yield_now().await;
        closer.close();

        assert!(reader.await.unwrap(), "stream should end after close");
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_remote_sees_eof() {
        let (link, mut remote) = link_pair();

        link.close().await;
        link.close().await;
        assert!(link.is_closed());

        let mut buf = Vec::new();
        let n = remote.read_to_end(&mut buf).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn test_send_after_close_returns_connection_closed() {
        let (link, _remote) = link_pair();
        link.close().await;

        let result = link.send(b"late\n").await;
        assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn test_send_writes_bytes_to_peer() {
        let (link, mut remote) = link_pair();
        link.send(b"hi\n").await.unwrap();

        let mut buf = [0u8; 3];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi\n");
    }

    #[tokio::test]
    async fn test_closer_closed_resolves_after_close() {
        let (link, _remote) = link_pair();
        let closer = link.closer();
        let waiter = tokio::spawn(async move { closer.closed().await });
        link.close().await;
        waiter.await.unwrap();
    }
}
