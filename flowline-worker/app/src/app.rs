use crate::config::AppConfig;
use crate::pipeline::Outcome;
use flowline_core::runtime::Runtime;
use tracing::info;

/// Errors that can occur during application execution.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Configuration file or override rules could not be loaded.
    #[error(transparent)]
    Config(#[from] crate::config::Error),
    /// Command line could not be parsed.
    #[error(transparent)]
    Cli(#[from] crate::cli::Error),
    /// The run failed before or while streaming.
    #[error(transparent)]
    Pipeline(#[from] crate::pipeline::Error),
}

/// Main application: builds the runtime and runs one invocation.
pub struct App {
    /// Global application configuration.
    pub config: AppConfig,
    /// Command line arguments, without the program name.
    pub args: Vec<String>,
}

impl App {
    /// Runtime holding the built-in flows and the configured overrides.
    pub fn runtime(&self) -> Result<Runtime, Error> {
        let mut runtime = Runtime::new();
        crate::flows::register_builtin(&mut runtime);
        self.config.register_overrides(&mut runtime)?;
        Ok(runtime)
    }
}

impl flowline_core::task::runner::Runner for App {
    type Error = Error;
    type Output = Outcome;

    #[tracing::instrument(skip(self), name = "app")]
    async fn run(self) -> Result<Outcome, Error> {
        let runtime = self.runtime()?;
        info!(
            flows = runtime.registry().flows_under(&[]).len(),
            overrides = runtime.overrides().len(),
            "Runtime ready"
        );
        crate::pipeline::run(&runtime, &self.args, self.config.runtime.stream_options()).await
    }
}
