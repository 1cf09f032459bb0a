use std::process::ExitCode;

use clap::Parser;

use vidlink::app::{self, Cli};
use vidlink::config::default_locations;
use vidlink::BackendRegistry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    app::init_logging(cli.log_level());

    let result = app::run(&cli, BackendRegistry::with_defaults(), &default_locations()).await;
    if let Err(e) = &result {
        tracing::error!("{}", e);
    }

    ExitCode::from(app::exit_code(&result))
}
