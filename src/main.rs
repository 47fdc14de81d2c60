use clap::Parser;
use ml_project::cli::{run, Cli};
use ml_project::logging::init_logging;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(path) = init_logging(&cli.logging_config())? {
        tracing::info!(path = %path.display(), "logging to file");
    }

    run(cli)
}
