//! Pumps moving records between byte streams and record channels.
//!
//! A [`Reader`] splits its stream into newline-terminated lines, decodes each
//! non-blank line with a parser and sends the record on a bounded channel. A
//! [`Writer`] receives records, encodes them with a formatter and writes them
//! out in arrival order. Bounded channels make a slow consumer hold back its
//! producer.

use crate::endpoint::{BoxedReader, BoxedWriter};
use flowline_core::codec::{self, DecodePolicy, Formatter, Parser};
use flowline_core::flow::{RecordReceiver, RecordSender};
use flowline_core::task::runner::Runner;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, Instrument};

/// Encoded bytes buffered before a write is issued.
const WRITE_BATCH_BYTES: usize = 64 * 1024;

/// Errors that can occur while pumping records.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The source stream failed.
    #[error("Failed to read from stream: {source}")]
    Read {
        #[source]
        source: io::Error,
    },
    /// The sink stream failed.
    #[error("Failed to write to stream: {source}")]
    Write {
        #[source]
        source: io::Error,
    },
    /// An undecodable line under the strict decode policy.
    #[error("Failed to decode line {line}: {source}")]
    Decode {
        line: u64,
        #[source]
        source: codec::Error,
    },
    /// A record could not be formatted.
    #[error(transparent)]
    Encode(codec::Error),
    /// Required builder attribute was not provided.
    #[error("Missing required attribute: {}", _0)]
    MissingRequiredAttribute(String),
}

/// Counters reported by a finished reader.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
pub struct ReadStats {
    /// Records sent downstream.
    pub records: u64,
    /// Lines dropped because they did not decode.
    pub dropped: u64,
}

/// Decodes lines from a byte stream into a record channel.
pub struct Reader {
    name: String,
    reader: BoxedReader,
    parser: Arc<dyn Parser>,
    tx: RecordSender,
    policy: DecodePolicy,
}

impl Reader {
    /// Runs the reader on its own task.
    pub fn spawn(self) -> JoinHandle<Result<ReadStats, Error>> {
        let span = tracing::debug_span!("reader", channel = %self.name);
        tokio::spawn(self.run().instrument(span))
    }
}

impl Runner for Reader {
    type Error = Error;
    type Output = ReadStats;

    async fn run(self) -> Result<ReadStats, Error> {
        let mut lines = BufReader::new(self.reader);
        let mut line = Vec::new();
        let mut line_number = 0u64;
        let mut stats = ReadStats::default();

        loop {
            line.clear();
            let n = lines
                .read_until(b'\n', &mut line)
                .await
                .map_err(|source| Error::Read { source })?;
            if n == 0 {
                break;
            }
            line_number += 1;

            let frame = trim_line_end(&line);
            if frame.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            match self.parser.parse(frame) {
                Ok(record) => {
                    if self.tx.send(record).await.is_err() {
                        debug!("Receiver dropped, stopping reader");
                        break;
                    }
                    stats.records += 1;
                }
                Err(source) => match self.policy {
                    DecodePolicy::Lenient => {
                        debug!(line = line_number, error = %source, "Dropping undecodable line");
                        stats.dropped += 1;
                    }
                    DecodePolicy::Strict => {
                        return Err(Error::Decode {
                            line: line_number,
                            source,
                        })
                    }
                },
            }
        }

        debug!(records = stats.records, dropped = stats.dropped, "Reader finished");
        Ok(stats)
    }
}

/// Strips the line terminator, accepting `\r\n` as well as `\n`.
fn trim_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Encodes records from a channel onto a byte stream.
pub struct Writer {
    name: String,
    writer: BoxedWriter,
    formatter: Arc<dyn Formatter>,
    rx: RecordReceiver,
}

impl Writer {
    /// Runs the writer on its own task.
    pub fn spawn(self) -> JoinHandle<Result<u64, Error>> {
        let span = tracing::debug_span!("writer", channel = %self.name);
        tokio::spawn(self.run().instrument(span))
    }
}

impl Runner for Writer {
    type Error = Error;
    type Output = u64;

    /// Writes until every sender is dropped, then shuts the stream down.
    ///
    /// Records already queued are encoded together and written with a single
    /// flush. A closed pipe on the far side ends the writer without error.
    async fn run(mut self) -> Result<u64, Error> {
        let mut buf = Vec::new();
        let mut written = 0u64;

        while let Some(record) = self.rx.recv().await {
            self.formatter
                .format(&record, &mut buf)
                .map_err(Error::Encode)?;
            written += 1;

            while buf.len() < WRITE_BATCH_BYTES {
                let Ok(record) = self.rx.try_recv() else {
                    break;
                };
                self.formatter
                    .format(&record, &mut buf)
                    .map_err(Error::Encode)?;
                written += 1;
            }

            let result = async {
                self.writer.write_all(&buf).await?;
                self.writer.flush().await
            }
            .await;
            match result {
                Ok(()) => buf.clear(),
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!("Stream closed by peer, stopping writer");
                    return Ok(written);
                }
                Err(source) => return Err(Error::Write { source }),
            }
        }

        match self.writer.shutdown().await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {}
            Err(source) => return Err(Error::Write { source }),
        }
        debug!(records = written, "Writer finished");
        Ok(written)
    }
}

/// Builder for [`Reader`].
#[derive(Default)]
pub struct ReaderBuilder {
    name: Option<String>,
    reader: Option<BoxedReader>,
    parser: Option<Arc<dyn Parser>>,
    tx: Option<RecordSender>,
    policy: DecodePolicy,
}

impl ReaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn reader(mut self, reader: BoxedReader) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn parser(mut self, parser: Arc<dyn Parser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn sender(mut self, tx: RecordSender) -> Self {
        self.tx = Some(tx);
        self
    }

    pub fn policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build(self) -> Result<Reader, Error> {
        Ok(Reader {
            name: self
                .name
                .ok_or_else(|| Error::MissingRequiredAttribute("name".to_string()))?,
            reader: self
                .reader
                .ok_or_else(|| Error::MissingRequiredAttribute("reader".to_string()))?,
            parser: self
                .parser
                .ok_or_else(|| Error::MissingRequiredAttribute("parser".to_string()))?,
            tx: self
                .tx
                .ok_or_else(|| Error::MissingRequiredAttribute("sender".to_string()))?,
            policy: self.policy,
        })
    }
}

/// Builder for [`Writer`].
#[derive(Default)]
pub struct WriterBuilder {
    name: Option<String>,
    writer: Option<BoxedWriter>,
    formatter: Option<Arc<dyn Formatter>>,
    rx: Option<RecordReceiver>,
}

impl WriterBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn writer(mut self, writer: BoxedWriter) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn formatter(mut self, formatter: Arc<dyn Formatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn receiver(mut self, rx: RecordReceiver) -> Self {
        self.rx = Some(rx);
        self
    }

    pub fn build(self) -> Result<Writer, Error> {
        Ok(Writer {
            name: self
                .name
                .ok_or_else(|| Error::MissingRequiredAttribute("name".to_string()))?,
            writer: self
                .writer
                .ok_or_else(|| Error::MissingRequiredAttribute("writer".to_string()))?,
            formatter: self
                .formatter
                .ok_or_else(|| Error::MissingRequiredAttribute("formatter".to_string()))?,
            rx: self
                .rx
                .ok_or_else(|| Error::MissingRequiredAttribute("receiver".to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_core::codec::NdJson;
    use serde_json::json;
    use tokio::io::AsyncReadExt;
    use tokio::sync::mpsc;

    fn reader_over(input: &'static [u8], policy: DecodePolicy, tx: RecordSender) -> Reader {
        ReaderBuilder::new()
            .name("test")
            .reader(Box::new(input))
            .parser(Arc::new(NdJson::default()))
            .sender(tx)
            .policy(policy)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_reader_lenient_drops_invalid_line() {
        let (tx, mut rx) = mpsc::channel(8);
        let stats = reader_over(b"not json\n{\"a\":1}\n", DecodePolicy::Lenient, tx)
            .run()
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(json!({"a": 1})));
        assert_eq!(rx.recv().await, None);
        assert_eq!(
            stats,
            ReadStats {
                records: 1,
                dropped: 1
            }
        );
    }

    #[tokio::test]
    async fn test_reader_strict_fails_on_invalid_line() {
        let (tx, mut rx) = mpsc::channel(8);
        let result = reader_over(b"{\"a\":1}\nnot json\n{\"b\":2}\n", DecodePolicy::Strict, tx)
            .run()
            .await;

        assert!(matches!(result, Err(Error::Decode { line: 2, .. })));
        assert_eq!(rx.recv().await, Some(json!({"a": 1})));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_reader_skips_blank_lines_and_crlf() {
        let (tx, mut rx) = mpsc::channel(8);
        let stats = reader_over(b"\n  \r\n{\"a\":1}\r\n\n{\"b\":2}", DecodePolicy::Strict, tx)
            .run()
            .await
            .unwrap();

        assert_eq!(rx.recv().await, Some(json!({"a": 1})));
        assert_eq!(rx.recv().await, Some(json!({"b": 2})));
        assert_eq!(rx.recv().await, None);
        assert_eq!(stats.records, 2);
        assert_eq!(stats.dropped, 0);
    }

    #[tokio::test]
    async fn test_reader_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let stats = reader_over(b"{\"a\":1}\n{\"a\":2}\n", DecodePolicy::Lenient, tx)
            .run()
            .await
            .unwrap();
        assert_eq!(stats.records, 0);
    }

    #[tokio::test]
    async fn test_writer_preserves_order() {
        let (client, mut server) = tokio::io::duplex(64);
        let (tx, rx) = mpsc::channel(2);
        let handle = WriterBuilder::new()
            .name("test")
            .writer(Box::new(client))
            .formatter(Arc::new(NdJson::default()))
            .receiver(rx)
            .build()
            .unwrap()
            .spawn();

        let producer = tokio::spawn(async move {
            for i in 0..100 {
                tx.send(json!({"i": i})).await.unwrap();
            }
        });

        let mut received = String::new();
        server.read_to_string(&mut received).await.unwrap();
        producer.await.unwrap();
        assert_eq!(handle.await.unwrap().unwrap(), 100);

        let values: Vec<i64> = received
            .lines()
            .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["i"].as_i64().unwrap())
            .collect();
        assert_eq!(values, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_builder_missing_attribute() {
        let result = WriterBuilder::new().name("x").build();
        assert!(matches!(
            result,
            Err(Error::MissingRequiredAttribute(attr)) if attr == "writer"
        ));
    }
}
