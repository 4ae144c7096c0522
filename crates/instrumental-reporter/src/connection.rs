//! One collector connection, from dial to close.
//!
//! The lifecycle is encoded in the types: a [`Connection`] can only
//! handshake, and only the [`Streaming`] value a successful handshake returns
//! can write metric lines.
//!
//! ```text
//! dial() ──► Connection ──handshake()──► Streaming ──send()*──► drop / close()
//!                                             └── drain task: collector bytes → log
//! ```

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
    ReadHalf, WriteHalf,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{HandshakeStage, ReporterError, ReporterResult};
use crate::greeting::Greeting;
use crate::transport::Dialer;

/// Longest server line read during the handshake or forwarded by the drain.
const MAX_LINE: u64 = 4096;

/// Reply that accepts a handshake step.
const OK: &str = "ok";

/// Bounds shared by everything a stream needs to be split and drained.
pub trait CollectorStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<S: AsyncRead + AsyncWrite + Send + Unpin + 'static> CollectorStream for S {}

/// Dial `addr`, bounded by `limit`.
pub async fn dial<D: Dialer>(
    dialer: &D,
    addr: &str,
    limit: Option<Duration>,
) -> ReporterResult<Connection<D::Stream>> {
    let stream = deadline(limit, dialer.dial(addr))
        .await
        .map_err(|source| ReporterError::Dial {
            addr: addr.to_string(),
            source,
        })?;
    debug!(%addr, "dialed collector");
    Ok(Connection::new(stream))
}

/// A dialed stream that has not completed the handshake.
pub struct Connection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
}

impl<S: CollectorStream> Connection<S> {
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Send the greeting and the token, each of which must be answered with
    /// `ok`. On success the read half is handed to a background drain and
    /// the write half is returned ready for metric lines.
    ///
    /// Any failure drops the connection, closing the socket.
    pub async fn handshake(
        mut self,
        greeting: &Greeting,
        token: &str,
        limit: Option<Duration>,
    ) -> ReporterResult<Streaming<S>> {
        self.exchange(HandshakeStage::Hello, &greeting.line(), limit)
            .await?;
        self.exchange(
            HandshakeStage::Authenticate,
            &format!("authenticate {token}\n"),
            limit,
        )
        .await?;

        let drain = tokio::spawn(drain_diagnostics(self.reader));
        Ok(Streaming {
            writer: self.writer,
            drain,
        })
    }

    async fn exchange(
        &mut self,
        stage: HandshakeStage,
        line: &str,
        limit: Option<Duration>,
    ) -> ReporterResult<()> {
        deadline(limit, async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.flush().await
        })
        .await
        .map_err(|source| ReporterError::HandshakeWrite { stage, source })?;

        let response = deadline(limit, read_line(&mut self.reader))
            .await
            .map_err(|source| ReporterError::NoResponse {
                stage,
                source: Some(source),
            })?
            .ok_or(ReporterError::NoResponse {
                stage,
                source: None,
            })?;

        if response != OK {
            return Err(ReporterError::Rejected { stage, response });
        }
        debug!(%stage, "collector accepted");
        Ok(())
    }
}

/// A connection that passed the handshake and accepts metric lines.
pub struct Streaming<S> {
    writer: WriteHalf<S>,
    drain: JoinHandle<()>,
}

impl<S: CollectorStream> Streaming<S> {
    /// Write `lines` in order, each bounded by `limit`.
    ///
    /// The first failure aborts the rest; lines already written stay written.
    pub async fn send(&mut self, lines: &[String], limit: Option<Duration>) -> ReporterResult<()> {
        for line in lines {
            deadline(limit, self.writer.write_all(line.as_bytes()))
                .await
                .map_err(|source| ReporterError::Write { source })?;
        }
        deadline(limit, self.writer.flush())
            .await
            .map_err(|source| ReporterError::Write { source })
    }

    /// Whether the collector side has closed or errored.
    pub fn peer_closed(&self) -> bool {
        self.drain.is_finished()
    }

    /// Flush and half-close, then drop the connection.
    pub async fn close(mut self, limit: Option<Duration>) {
        if let Err(e) = deadline(limit, self.writer.shutdown()).await {
            debug!(error = %e, "collector connection shutdown failed");
        }
    }
}

impl<S> Drop for Streaming<S> {
    fn drop(&mut self) {
        self.drain.abort();
    }
}

/// Forward anything the collector sends after the handshake to the log.
async fn drain_diagnostics<R: AsyncBufRead + Unpin>(mut reader: R) {
    loop {
        match read_line(&mut reader).await {
            Ok(Some(line)) => warn!(message = %line, "collector diagnostic"),
            Ok(None) => {
                debug!("collector closed its side of the connection");
                return;
            }
            Err(e) => {
                debug!(error = %e, "collector read failed");
                return;
            }
        }
    }
}

/// Read one line of at most [`MAX_LINE`] bytes, without its terminator.
/// `None` means end of stream.
async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    let n = (&mut *reader).take(MAX_LINE).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    let text = String::from_utf8_lossy(&buf);
    let text = text.strip_suffix('\n').unwrap_or(&text);
    let text = text.strip_suffix('\r').unwrap_or(text);
    Ok(Some(text.to_string()))
}

/// Run `fut`, turning an elapsed `limit` into a `TimedOut` error.
pub(crate) async fn deadline<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = io::Result<T>>,
) -> io::Result<T> {
    match limit {
        None => fut.await,
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("timed out after {limit:?}"),
            )),
        },
    }
}
