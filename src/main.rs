//! hopper daemon entry point.
//!
//! Parses the command line and hands off to the server runtime. The heavy
//! lifting (configuration, listeners, reload) lives in `hopper-server`.

use std::process::ExitCode;

use clap::Parser;
use hopper_server::cli::ServerArgs;

#[tokio::main]
async fn main() -> ExitCode {
    let args = ServerArgs::parse();

    match hopper_server::cli::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
