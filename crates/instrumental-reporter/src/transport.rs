//! How the reporter obtains a byte stream to the collector.
//!
//! Production uses [`TcpDialer`]. The trait exists so the connection state
//! machine can run over any async stream, such as an in-memory script.

use std::future::Future;
use std::io;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

/// Opens a new stream to the collector at `addr`.
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn dial(&self, addr: &str) -> impl Future<Output = io::Result<Self::Stream>> + Send;
}

/// Plain TCP with Nagle disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpDialer;

impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, addr: &str) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(addr).await?;
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "could not disable nagle");
        }
        Ok(stream)
    }
}
