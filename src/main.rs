//! queryview - drive a saved-query page headlessly.

use queryview::cli::Cli;
use queryview::error::Result;
use queryview::{headless, logging};
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    match run(&cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if cli.log_file {
                error!("{}: {}", e.category(), e);
            }
            eprintln!("{}: {}", e.category(), e);
            std::process::exit(2);
        }
    }
}

async fn run(cli: &Cli) -> Result<i32> {
    headless::run_headless(cli).await
}
