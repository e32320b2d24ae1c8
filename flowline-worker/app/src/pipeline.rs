//! Pipeline assembly for one flow invocation.
//!
//! A run moves through `Idle → Resolving → (NotFound | Namespace |
//! Configuring) → Streaming → Draining → Terminated`. Resolution failures end
//! with a usage listing; configuration failures end with an error before any
//! record is read. While streaming, records move primary input → parser →
//! flow → formatter → primary output, with the logger and metrics channels
//! drained to their own sinks by the default codec.

use crate::cli::{Invocation, STRUCTURED_KEY};
use crate::help;
use flowline_core::codec::{self, DEFAULT_CODEC};
use flowline_core::flow::{self, FlowContextBuilder, RecordSender};
use flowline_core::registry::{FlowDefinition, Resolution};
use flowline_core::resolve::DEFAULT_PROFILE;
use flowline_core::runtime::Runtime;
use flowline_core::task::runner::Runner;
use flowline_core::value::{self, deep_merge, expand_inline_json, INLINE_JSON_MARKER};
use flowline_stream::bind::{bind_auxiliary, bind_input, bind_output, Pumps};
use flowline_stream::config::StreamOptions;
use flowline_stream::endpoint::{Mode, StandardOutput};
use flowline_stream::pump;
use serde_json::{Map, Value};
use std::fmt;
use tracing::{debug, info, warn, Instrument};

/// Errors that end a run.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Malformed inline JSON parameter.
    #[error(transparent)]
    Value(#[from] value::Error),
    /// Unknown parser or formatter.
    #[error(transparent)]
    Codec(#[from] codec::Error),
    /// The flow factory rejected its context.
    #[error("Failed to create flow {path}: {source}")]
    CreateFlow {
        path: String,
        #[source]
        source: flow::Error,
    },
    /// The flow ended with an error.
    #[error("Flow {path} failed: {source}")]
    RunFlow {
        path: String,
        #[source]
        source: flow::Error,
    },
    /// The flow task panicked or was cancelled.
    #[error("Flow task failed: {source}")]
    Join {
        #[source]
        source: tokio::task::JoinError,
    },
    /// A reader or writer pump failed.
    #[error(transparent)]
    Stream(#[from] pump::Error),
    /// Required builder attribute was not provided.
    #[error("Missing required attribute: {}", _0)]
    MissingRequiredAttribute(String),
}

/// States of one run.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum RunState {
    Idle,
    Resolving,
    NotFound,
    Namespace,
    Configuring,
    Streaming,
    Draining,
    Terminated,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How a run ended without error.
#[derive(PartialEq, Eq, Clone, Debug)]
pub enum Outcome {
    /// Input was exhausted and every sink flushed.
    Completed { id: String, path: String },
    /// Nothing was streamed; the text is a usage listing or flow help.
    Usage(String),
}

/// One flow invocation against a runtime.
pub struct Pipeline<'a> {
    runtime: &'a Runtime,
    invocation: Invocation,
    options: StreamOptions,
    state: RunState,
}

impl Pipeline<'_> {
    pub fn state(&self) -> RunState {
        self.state
    }

    fn transition(&mut self, next: RunState) {
        debug!(from = %self.state, to = %next, "Run state");
        self.state = next;
    }

    /// Usage outcome for a path that does not name a flow.
    fn usage(&mut self, resolution: Resolution) -> Outcome {
        let runtime = self.runtime;
        let registry = runtime.registry();
        match resolution {
            Resolution::Namespace { path, .. } => {
                self.transition(RunState::Namespace);
                Outcome::Usage(help::usage(registry, &path, None))
            }
            Resolution::NotFound { path } => {
                self.transition(RunState::NotFound);
                let note = (path != [help::HELP_COMMAND])
                    .then(|| format!("Unknown flow: {}", path.join(".")));
                Outcome::Usage(help::usage(registry, &[], note.as_deref()))
            }
            Resolution::Flow { definition, .. } => {
                let defaults = runtime.resolve_definition(&definition, DEFAULT_PROFILE);
                Outcome::Usage(help::flow_help(&definition, &defaults.params))
            }
        }
    }

    /// Binds the logger and metrics sinks. Both default to `--stderr`, then
    /// to standard error, and share one writer when bound to the same place.
    async fn bind_sinks(
        &self,
        invocation: &Invocation,
        formatter: &std::sync::Arc<dyn codec::Formatter>,
        pumps: &mut Pumps,
    ) -> Result<(RecordSender, RecordSender), Error> {
        let fallback = invocation.descriptor("stderr");
        let descriptor = |name: &str| {
            invocation
                .text(name)
                .filter(|d| !d.is_empty())
                .unwrap_or_else(|| fallback.clone())
        };
        let (logger_at, metrics_at) = (descriptor("logger"), descriptor("metrics"));

        let logger = bind_output(
            "logger",
            &logger_at,
            StandardOutput::Stderr,
            formatter,
            &self.options,
            pumps,
        )
        .await?;
        let metrics = if metrics_at == logger_at {
            logger.clone()
        } else {
            bind_output(
                "metrics",
                &metrics_at,
                StandardOutput::Stderr,
                formatter,
                &self.options,
                pumps,
            )
            .await?
        };
        Ok((logger, metrics))
    }
}

/// Computes the parameters of a flow from its resolved defaults and the
/// command line.
///
/// Precedence, lowest first: resolved parameters, declared parameter
/// shortcuts (`--<name>`), structured parameters (`--c.<path>`), inline JSON
/// (`--c$`, `--c.<path>$`, `--<name>$`). Only command line keys are expanded
/// as inline JSON; resolved keys ending in `$` are kept as they are.
pub fn merge_params(
    definition: &FlowDefinition,
    resolved: Value,
    invocation: &Invocation,
) -> Result<Value, value::Error> {
    let mut shortcuts = Map::new();
    for name in definition.metadata.declared_names() {
        if let Some(value) = invocation.shortcut(name) {
            shortcuts.insert(name.clone(), value.clone());
        }
        let inline = format!("{name}{INLINE_JSON_MARKER}");
        if let Some(value) = invocation.shortcut(&inline) {
            shortcuts.insert(inline, value.clone());
        }
    }
    let mut cli = Value::Object(shortcuts);
    if let Some(structured) = invocation.structured() {
        deep_merge(&mut cli, structured);
    }

    let mut root = Map::new();
    root.insert(STRUCTURED_KEY.to_string(), cli);
    if let Some(inline) = invocation.structured_inline() {
        root.insert(
            format!("{STRUCTURED_KEY}{INLINE_JSON_MARKER}"),
            inline.clone(),
        );
    }
    let mut root = Value::Object(root);
    expand_inline_json(&mut root)?;

    let mut params = resolved;
    if let Some(cli) = root.get(STRUCTURED_KEY) {
        deep_merge(&mut params, cli);
    }
    Ok(params)
}

impl Runner for Pipeline<'_> {
    type Error = Error;
    type Output = Outcome;

    #[tracing::instrument(skip(self), name = "pipeline", fields(path = %self.invocation.path.join(".")))]
    async fn run(mut self) -> Result<Outcome, Error> {
        let runtime = self.runtime;
        self.transition(RunState::Resolving);
        let resolution = runtime.resolve_path(&self.invocation.path);
        let (definition, rest) = match resolution {
            Resolution::Flow {
                definition, rest, ..
            } if !self.invocation.help() => (definition, rest),
            other => return Ok(self.usage(other)),
        };

        self.transition(RunState::Configuring);
        let profile = self
            .invocation
            .profile()
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());
        let resolved = runtime.resolve_definition(&definition, &profile);
        let invocation = self.invocation.with_defaults(&resolved.cli);
        let params = merge_params(&definition, resolved.params, &invocation)?;

        let codecs = runtime.codecs();
        let parser = codecs.parser(invocation.parser().as_deref().unwrap_or(DEFAULT_CODEC))?;
        let formatter =
            codecs.formatter(invocation.formatter().as_deref().unwrap_or(DEFAULT_CODEC))?;
        let (default_parser, default_formatter) = codecs.default_pair()?;
        debug!(profile = %profile, params = %params, "Configured");

        self.transition(RunState::Streaming);
        let mut pumps = Pumps::default();
        let input = bind_input(
            "stdin",
            &invocation.descriptor("stdin"),
            &parser,
            &self.options,
            &mut pumps,
        )
        .await?;
        let output = bind_output(
            "stdout",
            &invocation.descriptor("stdout"),
            StandardOutput::Stdout,
            &formatter,
            &self.options,
            &mut pumps,
        )
        .await?;
        let (logger, metrics) = self
            .bind_sinks(&invocation, &default_formatter, &mut pumps)
            .await?;

        // Control input is only bound to an explicit source; standard input
        // already feeds the primary channel.
        let control_at = invocation.descriptor("ctrl");
        let control = if control_at.is_empty() {
            None
        } else {
            Some(bind_input("ctrl", &control_at, &default_parser, &self.options, &mut pumps).await?)
        };

        let inputs = bind_auxiliary(
            &invocation.channels("in"),
            Mode::Read,
            &parser,
            &formatter,
            &self.options,
        )
        .await?;
        let outputs = bind_auxiliary(
            &invocation.channels("out"),
            Mode::Write,
            &parser,
            &formatter,
            &self.options,
        )
        .await?;
        let duplex = bind_auxiliary(
            &invocation.channels("io"),
            Mode::Duplex,
            &parser,
            &formatter,
            &self.options,
        )
        .await?;
        pumps.extend(inputs.pumps);
        pumps.extend(outputs.pumps);
        pumps.extend(duplex.pumps);

        let id = invocation
            .id()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let path = definition.path.clone();
        let created = FlowContextBuilder::new()
            .id(id.clone())
            .path(path.clone())
            .params(params)
            .args(rest)
            .inputs(inputs.channels)
            .outputs(outputs.channels)
            .duplex(duplex.channels)
            .control(control)
            .logger(logger)
            .metrics(metrics)
            .build()
            .and_then(|context| definition.factory.create(context));
        let flow = match created {
            Ok(flow) => flow,
            Err(source) => {
                drop(input);
                drop(output);
                let _ = pumps.drain_writers().await;
                let _ = pumps.stop_readers().await;
                return Err(Error::CreateFlow { path, source });
            }
        };
        info!(id = %id, path = %path, "Flow started");

        let span = tracing::info_span!("flow", id = %id, path = %path);
        let result = tokio::spawn(flow.run(input, output).instrument(span)).await;

        self.transition(RunState::Draining);
        let drained = pumps.drain_writers().await;
        let stopped = pumps.stop_readers().await;
        self.transition(RunState::Terminated);

        match result {
            Ok(Ok(())) => {}
            Ok(Err(flow::Error::SendRecord)) => {
                warn!(id = %id, "Output closed before the flow finished")
            }
            Ok(Err(source)) => return Err(Error::RunFlow { path, source }),
            Err(source) => return Err(Error::Join { source }),
        }
        drained?;
        stopped?;

        info!(id = %id, path = %path, "Flow completed");
        Ok(Outcome::Completed { id, path })
    }
}

/// Builder for [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder<'a> {
    runtime: Option<&'a Runtime>,
    invocation: Option<Invocation>,
    options: StreamOptions,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn runtime(mut self, runtime: &'a Runtime) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn invocation(mut self, invocation: Invocation) -> Self {
        self.invocation = Some(invocation);
        self
    }

    pub fn options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Result<Pipeline<'a>, Error> {
        Ok(Pipeline {
            runtime: self
                .runtime
                .ok_or_else(|| Error::MissingRequiredAttribute("runtime".to_string()))?,
            invocation: self
                .invocation
                .ok_or_else(|| Error::MissingRequiredAttribute("invocation".to_string()))?,
            options: self.options,
            state: RunState::Idle,
        })
    }
}

/// Parses `args` and runs the selected flow.
pub async fn run(
    runtime: &Runtime,
    args: &[String],
    options: StreamOptions,
) -> Result<Outcome, crate::app::Error> {
    let invocation = Invocation::parse(args)?;
    let outcome = PipelineBuilder::new()
        .runtime(runtime)
        .invocation(invocation)
        .options(options)
        .build()?
        .run()
        .await?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::register_builtin;
    use flowline_core::flow::{Flow, FlowContext, RecordReceiver};
    use flowline_core::registry::FlowMetadata;
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Emits one record describing its context, then forwards its input.
    struct Echo {
        context: Value,
    }

    #[async_trait::async_trait]
    impl Flow for Echo {
        async fn run(
            self: Box<Self>,
            mut input: RecordReceiver,
            output: RecordSender,
        ) -> Result<(), flow::Error> {
            output.send(self.context).await?;
            while let Some(record) = input.recv().await {
                output.send(record).await?;
            }
            Ok(())
        }
    }

    fn echo(context: FlowContext) -> Result<Box<dyn Flow>, flow::Error> {
        Ok(Box::new(Echo {
            context: json!({
                "id": context.id,
                "params": context.params,
                "args": context.args,
                "control": context.control.is_some(),
            }),
        }))
    }

    fn runtime() -> Runtime {
        let mut runtime = Runtime::new();
        register_builtin(&mut runtime);
        runtime.register_flow(
            "test.echo",
            Arc::new(echo),
            FlowMetadata::titled("Echo")
                .param("color", "Color")
                .param("size", "Size")
                .param("id", "Shadowed by the common parameter")
                .profile("$default", json!({"color": "red", "size": 1, "id": "p"}))
                .profile("big", json!({"size": 10})),
        );
        runtime
    }

    fn options() -> StreamOptions {
        StreamOptions {
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    async fn run_args(runtime: &Runtime, args: &[&str]) -> Result<Outcome, crate::app::Error> {
        let args: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        run(runtime, &args, options()).await
    }

    fn path_str(path: &Path) -> &str {
        path.to_str().unwrap()
    }

    fn read_records(path: &Path) -> Vec<Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    struct Files {
        _dir: tempfile::TempDir,
        input: std::path::PathBuf,
        output: std::path::PathBuf,
        log: std::path::PathBuf,
    }

    fn files(input: &str) -> Files {
        let dir = tempfile::tempdir().unwrap();
        let files = Files {
            input: dir.path().join("in.jsonl"),
            output: dir.path().join("out.jsonl"),
            log: dir.path().join("log.jsonl"),
            _dir: dir,
        };
        std::fs::write(&files.input, input).unwrap();
        files
    }

    #[tokio::test]
    async fn test_pass_drops_undecodable_line() {
        let runtime = runtime();
        let f = files("not valid json\n{\"a\":1}\n");
        let outcome = run_args(
            &runtime,
            &[
                "core.pass",
                "--stdin",
                path_str(&f.input),
                "--stdout",
                path_str(&f.output),
                "--stderr",
                path_str(&f.log),
                "--id",
                "p1",
            ],
        )
        .await
        .unwrap();

        assert_eq!(
            outcome,
            Outcome::Completed {
                id: "p1".to_string(),
                path: "core.pass".to_string()
            }
        );
        assert_eq!(read_records(&f.output), vec![json!({"a": 1})]);
    }

    #[tokio::test]
    async fn test_strict_decode_fails_run() {
        let runtime = runtime();
        let f = files("{\"a\":1}\nnot valid json\n");
        let args: Vec<String> = [
            "core.pass",
            "--stdin",
            path_str(&f.input),
            "--stdout",
            path_str(&f.output),
            "--stderr",
            path_str(&f.log),
        ]
        .iter()
        .map(|a| a.to_string())
        .collect();
        let options = StreamOptions {
            decode: codec::DecodePolicy::Strict,
            ..options()
        };

        let result = run(&runtime, &args, options).await;
        assert!(matches!(
            result,
            Err(crate::app::Error::Pipeline(Error::Stream(pump::Error::Decode { .. })))
        ));
        assert_eq!(read_records(&f.output), vec![json!({"a": 1})]);
    }

    #[tokio::test]
    async fn test_unreachable_aux_output_completes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let runtime = runtime();
        let f = files("{\"type\":\"report\",\"n\":1}\n{\"type\":\"other\",\"n\":2}\n");
        let report = format!("tcp://127.0.0.1:{port}");
        let outcome = run_args(
            &runtime,
            &[
                "core.route",
                "--stdin",
                path_str(&f.input),
                "--stdout",
                path_str(&f.output),
                "--stderr",
                path_str(&f.log),
                "--out.report",
                &report,
                "--c.routes.report",
                "report",
            ],
        )
        .await
        .unwrap();

        assert!(matches!(outcome, Outcome::Completed { .. }));
        assert_eq!(read_records(&f.output), vec![json!({"type": "other", "n": 2})]);
    }

    #[tokio::test]
    async fn test_route_to_file_output() {
        let runtime = runtime();
        let f = files("{\"kind\":\"error\",\"n\":1}\n{\"kind\":\"ok\",\"n\":2}\n");
        let errors = f.input.with_file_name("errors.jsonl");
        run_args(
            &runtime,
            &[
                "core.route",
                "--stdin",
                path_str(&f.input),
                "--stdout",
                path_str(&f.output),
                "--stderr",
                path_str(&f.log),
                "--out.errors",
                path_str(&errors),
                "--field",
                "kind",
                "--c$",
                "{\"routes\":{\"error\":\"errors\"}}",
            ],
        )
        .await
        .unwrap();

        assert_eq!(read_records(&errors), vec![json!({"kind": "error", "n": 1})]);
        assert_eq!(read_records(&f.output), vec![json!({"kind": "ok", "n": 2})]);
    }

    #[tokio::test]
    async fn test_count_shares_stderr_sink() {
        let runtime = runtime();
        let f = files("{}\n{}\n{}\n");
        run_args(
            &runtime,
            &[
                "core.count",
                "--id",
                "c1",
                "--stdin",
                path_str(&f.input),
                "--stdout",
                path_str(&f.output),
                "--stderr",
                path_str(&f.log),
            ],
        )
        .await
        .unwrap();

        assert_eq!(read_records(&f.output).len(), 3);
        let log = read_records(&f.log);
        assert_eq!(log.len(), 3);
        assert!(log.contains(&json!({"metric": "records", "flow": "c1", "count": 3})));
    }

    #[tokio::test]
    async fn test_count_separate_sinks_under_backpressure() {
        let runtime = runtime();
        let input: String = (0..5000).map(|i| format!("{{\"i\":{i}}}\n")).collect();
        let f = files(&input);
        let metrics = f.input.with_file_name("metrics.jsonl");
        let args: Vec<String> = [
            "core.count",
            "--id",
            "c2",
            "--stdin",
            path_str(&f.input),
            "--stdout",
            path_str(&f.output),
            "--logger",
            path_str(&f.log),
            "--metrics",
            path_str(&metrics),
        ]
        .iter()
        .map(|a| a.to_string())
        .collect();
        let options = StreamOptions {
            channel_capacity: 1,
            ..options()
        };

        run(&runtime, &args, options).await.unwrap();

        let output: Vec<i64> = read_records(&f.output)
            .iter()
            .map(|record| record["i"].as_i64().unwrap())
            .collect();
        assert_eq!(output, (0..5000).collect::<Vec<i64>>());
        assert_eq!(
            read_records(&metrics),
            vec![json!({"metric": "records", "flow": "c2", "count": 5000})]
        );
        let log = read_records(&f.log);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0]["event"], "start");
        assert_eq!(log[1]["event"], "finish");
    }

    #[tokio::test]
    async fn test_resolved_dollar_keys_are_not_inline_json() {
        let mut runtime = runtime();
        runtime.register_flow(
            "test.priced",
            Arc::new(echo),
            FlowMetadata::titled("Priced").profile(
                "$default",
                json!({"price$": 5, "label$": "{\"a\":1}"}),
            ),
        );
        let f = files("");
        run_args(
            &runtime,
            &[
                "test.priced",
                "--stdin",
                path_str(&f.input),
                "--stdout",
                path_str(&f.output),
                "--stderr",
                path_str(&f.log),
                "--c.size$",
                "7",
            ],
        )
        .await
        .unwrap();

        assert_eq!(
            read_records(&f.output)[0]["params"],
            json!({"price$": 5, "label$": "{\"a\":1}", "size": 7})
        );
    }

    #[tokio::test]
    async fn test_parameter_precedence() {
        let runtime = runtime();
        let f = files("");
        run_args(
            &runtime,
            &[
                "test",
                "echo",
                "extra",
                "--stdin",
                path_str(&f.input),
                "--stdout",
                path_str(&f.output),
                "--stderr",
                path_str(&f.log),
                "--id",
                "e1",
                "--color",
                "blue",
                "--size",
                "2",
                "--c.size",
                "3",
                "--c.shape$",
                "{\"sides\": 4}",
            ],
        )
        .await
        .unwrap();

        let records = read_records(&f.output);
        assert_eq!(
            records,
            vec![json!({
                "id": "e1",
                "params": {"color": "blue", "size": 3, "id": "p", "shape": {"sides": 4}},
                "args": ["extra"],
                "control": false,
            })]
        );
    }

    #[tokio::test]
    async fn test_inline_json_beats_structured() {
        let runtime = runtime();
        let f = files("");
        run_args(
            &runtime,
            &[
                "test.echo",
                "--profile",
                "big",
                "--stdin",
                path_str(&f.input),
                "--stdout",
                path_str(&f.output),
                "--stderr",
                path_str(&f.log),
                "--c.size",
                "3",
                "--c$",
                "{\"size\": 4}",
            ],
        )
        .await
        .unwrap();

        assert_eq!(read_records(&f.output)[0]["params"], json!({"size": 4}));
    }

    #[tokio::test]
    async fn test_override_cli_defaults() {
        let mut runtime = runtime();
        let f = files("{\"a\":1}\n");
        runtime
            .register_override(
                "core.*",
                "*",
                json!({"cli": {"stdout": path_str(&f.output), "stderr": path_str(&f.log)}}),
            )
            .unwrap();

        run_args(&runtime, &["core.pass", "--stdin", path_str(&f.input)])
            .await
            .unwrap();
        assert_eq!(read_records(&f.output), vec![json!({"a": 1})]);
    }

    #[tokio::test]
    async fn test_control_channel_bound() {
        let runtime = runtime();
        let f = files("");
        let ctrl = f.input.with_file_name("ctrl.jsonl");
        std::fs::write(&ctrl, "{\"cmd\":\"noop\"}\n").unwrap();
        run_args(
            &runtime,
            &[
                "test.echo",
                "--stdin",
                path_str(&f.input),
                "--stdout",
                path_str(&f.output),
                "--stderr",
                path_str(&f.log),
                "--ctrl",
                path_str(&ctrl),
            ],
        )
        .await
        .unwrap();

        assert_eq!(read_records(&f.output)[0]["control"], json!(true));
    }

    #[tokio::test]
    async fn test_namespace_usage() {
        let runtime = runtime();
        let outcome = run_args(&runtime, &["core"]).await.unwrap();
        let Outcome::Usage(text) = outcome else {
            panic!("Expected usage");
        };
        assert!(text.contains("flowline core pass"));
        assert!(text.contains("flowline core route"));
        assert!(!text.contains("flowline test echo"));
    }

    #[tokio::test]
    async fn test_not_found_and_empty_usage() {
        let runtime = runtime();
        for args in [vec!["nope"], vec![], vec!["help"]] {
            let outcome = run_args(&runtime, &args).await.unwrap();
            let Outcome::Usage(text) = outcome else {
                panic!("Expected usage for {args:?}");
            };
            assert!(text.contains("flowline test echo"));
            assert_eq!(text.contains("Unknown flow: nope"), args == ["nope"]);
        }
    }

    #[tokio::test]
    async fn test_flow_help() {
        let runtime = runtime();
        let outcome = run_args(&runtime, &["core.route", "--help"]).await.unwrap();
        let Outcome::Usage(text) = outcome else {
            panic!("Expected help");
        };
        assert!(text.contains("--[c.]field <value>"));
        assert!(text.contains("(default: \"type\")"));
    }

    #[tokio::test]
    async fn test_malformed_inline_json_is_fatal() {
        let runtime = runtime();
        let f = files("{\"a\":1}\n");
        let result = run_args(
            &runtime,
            &[
                "core.pass",
                "--stdin",
                path_str(&f.input),
                "--stdout",
                path_str(&f.output),
                "--c$",
                "{not json",
            ],
        )
        .await;

        assert!(matches!(
            result,
            Err(crate::app::Error::Pipeline(Error::Value(_)))
        ));
        assert!(!f.output.exists());
    }

    #[tokio::test]
    async fn test_unknown_formatter_is_fatal() {
        let runtime = runtime();
        let result = run_args(&runtime, &["core.pass", "--formatter", "csv"]).await;
        assert!(matches!(
            result,
            Err(crate::app::Error::Pipeline(Error::Codec(
                codec::Error::UnknownFormatter(_)
            )))
        ));
    }

    #[tokio::test]
    async fn test_flow_creation_error() {
        let runtime = runtime();
        let f = files("");
        let result = run_args(
            &runtime,
            &[
                "core.route",
                "--stdin",
                path_str(&f.input),
                "--stdout",
                path_str(&f.output),
                "--stderr",
                path_str(&f.log),
                "--c.field",
                "7",
            ],
        )
        .await;
        assert!(matches!(
            result,
            Err(crate::app::Error::Pipeline(Error::CreateFlow { .. }))
        ));
    }

    #[test]
    fn test_builder_requires_runtime() {
        let result = PipelineBuilder::new()
            .invocation(Invocation::default())
            .build();
        assert!(matches!(
            result,
            Err(Error::MissingRequiredAttribute(attr)) if attr == "runtime"
        ));
    }

    #[test]
    fn test_builder_starts_idle() {
        let runtime = Runtime::new();
        let pipeline = PipelineBuilder::new()
            .runtime(&runtime)
            .invocation(Invocation::default())
            .build()
            .unwrap();
        assert_eq!(pipeline.state(), RunState::Idle);
    }
}
