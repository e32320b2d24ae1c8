//! Byte endpoints behind stream descriptors.
//!
//! An [`Endpoint`] always has a readable and a writable leg. Legs the mode does
//! not ask for, or that could not be opened, are null: reading yields end of
//! stream at once and writes are discarded. Opening never fails; problems are
//! logged and the affected leg degrades to null.

use crate::config::StreamOptions;
use crate::descriptor::Descriptor;
use std::fmt;
use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Boxed readable leg.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed writable leg.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Which legs of an endpoint are requested.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Mode {
    Read,
    Write,
    Duplex,
}

impl Mode {
    pub fn readable(self) -> bool {
        matches!(self, Mode::Read | Mode::Duplex)
    }

    pub fn writable(self) -> bool {
        matches!(self, Mode::Write | Mode::Duplex)
    }
}

/// Standard stream used for the writable leg of an empty descriptor.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub enum StandardOutput {
    #[default]
    Stdout,
    Stderr,
}

/// A bidirectional byte stream with possibly null legs.
pub struct Endpoint {
    reader: Option<BoxedReader>,
    writer: Option<BoxedWriter>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("readable", &self.is_readable())
            .field("writable", &self.is_writable())
            .finish()
    }
}

impl Endpoint {
    /// Endpoint with both legs null.
    pub fn null() -> Self {
        Self {
            reader: None,
            writer: None,
        }
    }

    /// Endpoint from optional legs; missing legs are null.
    pub fn from_parts(reader: Option<BoxedReader>, writer: Option<BoxedWriter>) -> Self {
        Self { reader, writer }
    }

    /// Whether the readable leg is backed by a real stream.
    pub fn is_readable(&self) -> bool {
        self.reader.is_some()
    }

    /// Whether the writable leg is backed by a real stream.
    pub fn is_writable(&self) -> bool {
        self.writer.is_some()
    }

    pub fn is_null(&self) -> bool {
        !self.is_readable() && !self.is_writable()
    }

    /// Splits into independently owned legs, substituting null streams.
    pub fn into_split(self) -> (BoxedReader, BoxedWriter) {
        let reader = self.reader.unwrap_or_else(|| Box::new(tokio::io::empty()));
        let writer = self.writer.unwrap_or_else(|| Box::new(tokio::io::sink()));
        (reader, writer)
    }
}

impl AsyncRead for Endpoint {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut().reader.as_mut() {
            Some(reader) => Pin::new(reader).poll_read(cx, buf),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl AsyncWrite for Endpoint {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut().writer.as_mut() {
            Some(writer) => Pin::new(writer).poll_write(cx, buf),
            None => Poll::Ready(Ok(buf.len())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().writer.as_mut() {
            Some(writer) => Pin::new(writer).poll_flush(cx),
            None => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut().writer.as_mut() {
            Some(writer) => Pin::new(writer).poll_shutdown(cx),
            None => Poll::Ready(Ok(())),
        }
    }
}

/// Opens the endpoint named by a descriptor string.
///
/// # Arguments
/// * `raw` - Descriptor string, see [`Descriptor::parse`]
/// * `mode` - Legs to open
/// * `standard` - Standard stream used when the descriptor is empty
/// * `options` - Connect timeout for TCP descriptors
#[tracing::instrument(skip(options), level = "debug")]
pub async fn open_endpoint(
    raw: &str,
    mode: Mode,
    standard: StandardOutput,
    options: &StreamOptions,
) -> Endpoint {
    match Descriptor::parse(raw) {
        Descriptor::Standard => open_standard(mode, standard),
        Descriptor::File(path) => open_file(&path, mode).await,
        Descriptor::Tcp { host, port } => open_tcp(&host, port, mode, options).await,
        Descriptor::Unsupported(raw) => {
            warn!(descriptor = %raw, "Unsupported stream descriptor, binding null endpoint");
            Endpoint::null()
        }
    }
}

fn open_standard(mode: Mode, standard: StandardOutput) -> Endpoint {
    let reader: Option<BoxedReader> = mode
        .readable()
        .then(|| Box::new(tokio::io::stdin()) as BoxedReader);
    let writer: Option<BoxedWriter> = mode.writable().then(|| match standard {
        StandardOutput::Stdout => Box::new(tokio::io::stdout()) as BoxedWriter,
        StandardOutput::Stderr => Box::new(tokio::io::stderr()) as BoxedWriter,
    });
    Endpoint::from_parts(reader, writer)
}

async fn open_file(path: &Path, mode: Mode) -> Endpoint {
    let read_leg = async {
        if !mode.readable() {
            return None;
        }
        match tokio::fs::File::open(path).await {
            Ok(file) => Some(Box::new(file) as BoxedReader),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open file for reading");
                None
            }
        }
    };

    // The duplex write leg appends so it does not clobber what the read leg
    // is about to consume.
    let write_leg = async {
        let mut options = tokio::fs::OpenOptions::new();
        match mode {
            Mode::Read => return None,
            Mode::Write => options.write(true).create(true).truncate(true),
            Mode::Duplex => options.append(true).create(true),
        };
        match options.open(path).await {
            Ok(file) => Some(Box::new(file) as BoxedWriter),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to open file for writing");
                None
            }
        }
    };

    // Both legs open concurrently so a named pipe does not block on its peer.
    let (reader, writer) = tokio::join!(read_leg, write_leg);
    Endpoint::from_parts(reader, writer)
}

async fn open_tcp(host: &str, port: u16, mode: Mode, options: &StreamOptions) -> Endpoint {
    let connect = TcpStream::connect((host, port));
    let stream = match tokio::time::timeout(options.connect_timeout, connect).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(host, port, error = %e, "Failed to connect, binding null endpoint");
            return Endpoint::null();
        }
        Err(_) => {
            warn!(
                host,
                port,
                timeout = ?options.connect_timeout,
                "Connect timed out, binding null endpoint"
            );
            return Endpoint::null();
        }
    };
    debug!(host, port, "Connected");

    let (read_half, write_half) = stream.into_split();
    let reader = mode
        .readable()
        .then(|| Box::new(read_half) as BoxedReader);
    let writer = mode
        .writable()
        .then(|| Box::new(write_half) as BoxedWriter);
    Endpoint::from_parts(reader, writer)
}
