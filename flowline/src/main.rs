use flowline_app::app::App;
use flowline_app::config::AppConfig;
use flowline_app::pipeline::Outcome;
use flowline_core::task::runner::Runner;
use std::process;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Install global log collector. Stdout carries records, so logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AppConfig::load().unwrap_or_else(|err| {
        error!("{}", err);
        process::exit(1);
    });
    let grace = config.runtime.shutdown_grace;

    let app = App {
        config,
        args: std::env::args().skip(1).collect(),
    };

    let code = match app.run().await {
        Ok(Outcome::Usage(text)) => {
            print!("{text}");
            0
        }
        Ok(Outcome::Completed { id, path }) => {
            info!(%id, %path, "Flow completed");
            0
        }
        Err(err) => {
            error!("{}", err);
            1
        }
    };

    // Let detached writers flush before the process goes away.
    tokio::time::sleep(grace).await;
    process::exit(code);
}
