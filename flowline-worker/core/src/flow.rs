//! Flow traits and the per-invocation flow context.
//!
//! A flow is a record transducer: it consumes one ordered sequence of records
//! and produces another. Flows are created by a [`FlowFactory`] from a
//! [`FlowContext`] carrying the instance id, merged parameters and the
//! auxiliary, logger and metrics channels bound for this invocation.

use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;

/// A structured record flowing through a pipeline.
pub type Record = Value;
/// Sending half of a bounded record channel.
pub type RecordSender = mpsc::Sender<Record>;
/// Receiving half of a bounded record channel.
pub type RecordReceiver = mpsc::Receiver<Record>;

/// Errors that can occur while creating or running a flow.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Required builder attribute was not provided.
    #[error("Missing required attribute: {}", _0)]
    MissingRequiredAttribute(String),
    /// A flow parameter has an unusable value.
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
    /// The downstream receiver was dropped.
    #[error("Error sending record to channel (receiver dropped)")]
    SendRecord,
    /// Flow specific failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<mpsc::error::SendError<Record>> for Error {
    fn from(_: mpsc::error::SendError<Record>) -> Self {
        Error::SendRecord
    }
}

/// A running flow instance.
#[async_trait::async_trait]
pub trait Flow: Send {
    /// Consumes records from `input` and emits records to `output` until the
    /// input is exhausted.
    ///
    /// Dropping `output` signals end of stream downstream.
    async fn run(self: Box<Self>, input: RecordReceiver, output: RecordSender)
        -> Result<(), Error>;
}

/// Creates running flow instances from a context.
pub trait FlowFactory: Send + Sync {
    /// Instantiates the flow for one invocation.
    fn create(&self, context: FlowContext) -> Result<Box<dyn Flow>, Error>;
}

impl<F> FlowFactory for F
where
    F: Fn(FlowContext) -> Result<Box<dyn Flow>, Error> + Send + Sync,
{
    fn create(&self, context: FlowContext) -> Result<Box<dyn Flow>, Error> {
        self(context)
    }
}

/// A named record channel bound to an auxiliary endpoint.
///
/// `input` yields records decoded from the endpoint's readable leg and ends
/// immediately when the leg is null. Records sent to `output` are encoded to
/// the writable leg, or discarded when the leg is null.
#[derive(Debug)]
pub struct Channel {
    /// Logical channel name, e.g. `report` for `--out.report`.
    pub name: String,
    /// Decoded records from the readable leg.
    pub input: RecordReceiver,
    /// Records to encode to the writable leg.
    pub output: RecordSender,
}

/// Everything a flow factory receives for one invocation.
#[derive(Debug)]
pub struct FlowContext {
    /// Unique instance id, user assigned or generated.
    pub id: String,
    /// Dotted path the flow was resolved at.
    pub path: String,
    /// Merged parameter tree.
    pub params: Value,
    /// Path segments left over after the flow was matched.
    pub args: Vec<String>,
    /// Auxiliary inputs bound with `--in.<name>`.
    pub inputs: BTreeMap<String, Channel>,
    /// Auxiliary outputs bound with `--out.<name>`.
    pub outputs: BTreeMap<String, Channel>,
    /// Duplex channels bound with `--io.<name>`.
    pub duplex: BTreeMap<String, Channel>,
    /// Optional control input bound with `--ctrl`.
    pub control: Option<RecordReceiver>,
    /// Structured log records.
    pub logger: RecordSender,
    /// Instrumentation records.
    pub metrics: RecordSender,
}

impl FlowContext {
    /// Returns the parameter at a dotted path.
    pub fn param(&self, path: &str) -> Option<&Value> {
        crate::value::get_path(&self.params, path)
    }
}

/// Builder for constructing FlowContext instances.
#[derive(Default)]
pub struct FlowContextBuilder {
    id: Option<String>,
    path: Option<String>,
    params: Option<Value>,
    args: Vec<String>,
    inputs: BTreeMap<String, Channel>,
    outputs: BTreeMap<String, Channel>,
    duplex: BTreeMap<String, Channel>,
    control: Option<RecordReceiver>,
    logger: Option<RecordSender>,
    metrics: Option<RecordSender>,
}

impl FlowContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: String) -> Self {
        self.id = Some(id);
        self
    }

    pub fn path(mut self, path: String) -> Self {
        self.path = Some(path);
        self
    }

    pub fn params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn inputs(mut self, inputs: BTreeMap<String, Channel>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn outputs(mut self, outputs: BTreeMap<String, Channel>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn duplex(mut self, duplex: BTreeMap<String, Channel>) -> Self {
        self.duplex = duplex;
        self
    }

    pub fn control(mut self, control: Option<RecordReceiver>) -> Self {
        self.control = control;
        self
    }

    pub fn logger(mut self, logger: RecordSender) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn metrics(mut self, metrics: RecordSender) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Builds the FlowContext instance.
    ///
    /// # Errors
    /// Returns `Error::MissingRequiredAttribute` if id, path, logger or
    /// metrics are not set.
    pub fn build(self) -> Result<FlowContext, Error> {
        Ok(FlowContext {
            id: self
                .id
                .ok_or_else(|| Error::MissingRequiredAttribute("id".to_string()))?,
            path: self
                .path
                .ok_or_else(|| Error::MissingRequiredAttribute("path".to_string()))?,
            params: self
                .params
                .unwrap_or_else(|| Value::Object(Default::default())),
            args: self.args,
            inputs: self.inputs,
            outputs: self.outputs,
            duplex: self.duplex,
            control: self.control,
            logger: self
                .logger
                .ok_or_else(|| Error::MissingRequiredAttribute("logger".to_string()))?,
            metrics: self
                .metrics
                .ok_or_else(|| Error::MissingRequiredAttribute("metrics".to_string()))?,
        })
    }
}
