use clap::Parser;
use std::process::ExitCode;
use tidyplan::cli::{Cli, run_cli};
use tidyplan::logging::init_logging;
use tidyplan::output::OutputFormatter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(&cli.log_level, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            OutputFormatter::error(&format!("Could not open log file: {}", e));
            return ExitCode::FAILURE;
        }
    };

    match run_cli(cli.command) {
        Ok(report) => ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1)),
        Err(e) => {
            OutputFormatter::error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
