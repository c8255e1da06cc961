//! assetpipe - Command-line frontend asset build tool

use std::process::ExitCode;

use assetpipe::cli;

fn main() -> ExitCode {
    cli::run()
}
