mod app;
mod cli;

use std::env;
use std::process::ExitCode;

use tracing::error;

fn main() -> ExitCode {
    let args = env::args().skip(1).collect::<Vec<_>>();
    let command = match cli::parse_args(&args) {
        Ok(Some(command)) => command,
        Ok(None) => {
            println!("{}", cli::usage_text());
            return ExitCode::SUCCESS;
        }
        Err(message) => {
            eprintln!("{message}\n\n{}", cli::usage_text());
            return ExitCode::from(2);
        }
    };

    app::bootstrap::init_tracing();
    match app::run(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "presenter_failed");
            ExitCode::FAILURE
        }
    }
}
