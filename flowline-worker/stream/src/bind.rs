//! Binding descriptors to record channels.
//!
//! Every bound channel gets a reader pump feeding its `input` and a writer
//! pump draining its `output`. The spawned pumps are collected in [`Pumps`]
//! so the caller can drain writers and stop readers when the run ends.

use crate::config::StreamOptions;
use crate::endpoint::{open_endpoint, Endpoint, Mode, StandardOutput};
use crate::pump::{self, ReadStats, ReaderBuilder, WriterBuilder};
use flowline_core::codec::{Formatter, Parser};
use flowline_core::flow::{Channel, RecordReceiver, RecordSender};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Handle of a spawned reader pump.
pub type ReaderHandle = JoinHandle<Result<ReadStats, pump::Error>>;
/// Handle of a spawned writer pump.
pub type WriterHandle = JoinHandle<Result<u64, pump::Error>>;

/// Pumps spawned for a run.
#[derive(Default)]
pub struct Pumps {
    readers: Vec<(String, ReaderHandle)>,
    writers: Vec<(String, WriterHandle)>,
}

impl std::fmt::Debug for Pumps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn names<T>(handles: &[(String, T)]) -> Vec<&str> {
            handles.iter().map(|(name, _)| name.as_str()).collect()
        }
        f.debug_struct("Pumps")
            .field("readers", &names(&self.readers))
            .field("writers", &names(&self.writers))
            .finish()
    }
}

impl Pumps {
    pub fn push_reader(&mut self, name: impl Into<String>, handle: ReaderHandle) {
        self.readers.push((name.into(), handle));
    }

    pub fn push_writer(&mut self, name: impl Into<String>, handle: WriterHandle) {
        self.writers.push((name.into(), handle));
    }

    pub fn extend(&mut self, other: Pumps) {
        self.readers.extend(other.readers);
        self.writers.extend(other.writers);
    }

    /// Waits for every writer to flush what was sent to it.
    ///
    /// Writers finish once all senders of their channel are dropped. Returns
    /// the first writer error; the remaining writers are still awaited.
    pub async fn drain_writers(&mut self) -> Result<(), pump::Error> {
        let mut first_error = None;
        for (name, handle) in self.writers.drain(..) {
            match handle.await {
                Ok(Ok(records)) => debug!(channel = %name, records, "Writer drained"),
                Ok(Err(e)) => {
                    warn!(channel = %name, error = %e, "Writer failed");
                    first_error.get_or_insert(e);
                }
                Err(e) => warn!(channel = %name, error = %e, "Writer task aborted"),
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stops readers that are still running and reports the first reader
    /// that failed on its own.
    pub async fn stop_readers(&mut self) -> Result<(), pump::Error> {
        for (_, handle) in &self.readers {
            handle.abort();
        }
        let mut first_error = None;
        for (name, handle) in self.readers.drain(..) {
            match handle.await {
                Ok(Ok(stats)) => debug!(
                    channel = %name,
                    records = stats.records,
                    dropped = stats.dropped,
                    "Reader finished"
                ),
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(channel = %name, error = %e, "Reader task panicked"),
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Result of binding a set of named descriptors.
#[derive(Debug)]
pub struct Bindings {
    pub channels: BTreeMap<String, Channel>,
    pub pumps: Pumps,
}

/// Opens every descriptor in `mode` and binds each to a named channel.
///
/// Endpoints are opened concurrently. An empty descriptor falls back to the
/// process standard streams. Endpoints that cannot be opened degrade to null
/// legs, so binding itself only fails on internal wiring errors.
pub async fn bind_auxiliary(
    descriptors: &BTreeMap<String, String>,
    mode: Mode,
    parser: &Arc<dyn Parser>,
    formatter: &Arc<dyn Formatter>,
    options: &StreamOptions,
) -> Result<Bindings, pump::Error> {
    let endpoints = join_all(descriptors.iter().map(|(name, raw)| async move {
        let endpoint = open_endpoint(raw, mode, StandardOutput::Stdout, options).await;
        (name.clone(), endpoint)
    }))
    .await;

    let mut bindings = Bindings {
        channels: BTreeMap::new(),
        pumps: Pumps::default(),
    };
    for (name, endpoint) in endpoints {
        let channel = bind_endpoint(
            &name,
            endpoint,
            parser,
            formatter,
            options,
            &mut bindings.pumps,
        )?;
        bindings.channels.insert(name, channel);
    }
    Ok(bindings)
}

/// Binds one opened endpoint to a channel, spawning its two pumps.
pub fn bind_endpoint(
    name: &str,
    endpoint: Endpoint,
    parser: &Arc<dyn Parser>,
    formatter: &Arc<dyn Formatter>,
    options: &StreamOptions,
    pumps: &mut Pumps,
) -> Result<Channel, pump::Error> {
    let (reader, writer) = endpoint.into_split();
    let (input_tx, input_rx) = mpsc::channel(options.capacity());
    let (output_tx, output_rx) = mpsc::channel(options.capacity());

    let read_pump = ReaderBuilder::new()
        .name(name)
        .reader(reader)
        .parser(Arc::clone(parser))
        .sender(input_tx)
        .policy(options.decode)
        .build()?;
    let write_pump = WriterBuilder::new()
        .name(name)
        .writer(writer)
        .formatter(Arc::clone(formatter))
        .receiver(output_rx)
        .build()?;
    pumps.push_reader(name, read_pump.spawn());
    pumps.push_writer(name, write_pump.spawn());

    Ok(Channel {
        name: name.to_string(),
        input: input_rx,
        output: output_tx,
    })
}

/// Binds a descriptor as a record source.
pub async fn bind_input(
    name: &str,
    raw: &str,
    parser: &Arc<dyn Parser>,
    options: &StreamOptions,
    pumps: &mut Pumps,
) -> Result<RecordReceiver, pump::Error> {
    let endpoint = open_endpoint(raw, Mode::Read, StandardOutput::Stdout, options).await;
    let (reader, _) = endpoint.into_split();
    let (tx, rx) = mpsc::channel(options.capacity());
    let read_pump = ReaderBuilder::new()
        .name(name)
        .reader(reader)
        .parser(Arc::clone(parser))
        .sender(tx)
        .policy(options.decode)
        .build()?;
    pumps.push_reader(name, read_pump.spawn());
    Ok(rx)
}

/// Binds a descriptor as a record sink. An empty descriptor writes to the
/// given standard stream.
pub async fn bind_output(
    name: &str,
    raw: &str,
    standard: StandardOutput,
    formatter: &Arc<dyn Formatter>,
    options: &StreamOptions,
    pumps: &mut Pumps,
) -> Result<RecordSender, pump::Error> {
    let endpoint = open_endpoint(raw, Mode::Write, standard, options).await;
    let (_, writer) = endpoint.into_split();
    let (tx, rx) = mpsc::channel(options.capacity());
    let write_pump = WriterBuilder::new()
        .name(name)
        .writer(writer)
        .formatter(Arc::clone(formatter))
        .receiver(rx)
        .build()?;
    pumps.push_writer(name, write_pump.spawn());
    Ok(tx)
}
