// src/main.rs

use std::process::ExitCode;

use monodag::{cli, logging};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    if let Err(e) = logging::init_logging(args.log_level) {
        eprintln!("failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    match monodag::run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
