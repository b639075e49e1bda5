mod cli;
mod commands;
mod error;

use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::commands::CommandOutput;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run().await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    let output = commands::run(&cli).await?;
    write_output(&output)?;

    if !output.is_success() {
        return Ok(ExitCode::from(3));
    }
    Ok(ExitCode::SUCCESS)
}

fn write_output(output: &CommandOutput) -> Result<(), CliError> {
    let mut stderr = std::io::stderr().lock();
    writeln!(stderr, "HTTP {}", output.status)?;
    for (name, value) in &output.headers {
        writeln!(stderr, "{name}: {value}")?;
    }

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", output.body)?;
    stdout.flush()?;
    Ok(())
}
