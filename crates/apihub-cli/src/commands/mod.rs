mod catalog;
mod idr;
mod product;
mod token;

use apihub_core::{ApiHub, ApiHubError, HubConfig, HubResponse};
use serde::Serialize;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// What a command writes back: an HTTP-like status, headers and a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl CommandOutput {
    pub fn failed(error: &ApiHubError) -> Self {
        Self {
            status: error.http_status(),
            headers: vec![("Content-Type", error.content_type().to_owned())],
            body: error.render(),
        }
    }

    pub fn json<T: Serialize>(value: &T) -> Result<Self, CliError> {
        Ok(Self {
            status: 200,
            headers: vec![("Content-Type", String::from("application/json"))],
            body: serde_json::to_string_pretty(value)?,
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl From<HubResponse> for CommandOutput {
    fn from(response: HubResponse) -> Self {
        Self {
            status: 200,
            headers: response.headers(),
            body: response.body,
        }
    }
}

impl From<Result<HubResponse, ApiHubError>> for CommandOutput {
    fn from(outcome: Result<HubResponse, ApiHubError>) -> Self {
        match outcome {
            Ok(response) => response.into(),
            Err(error) => Self::failed(&error),
        }
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    let hub = match &cli.command {
        Command::Catalog => return catalog::run(),
        Command::About => return Ok(ApiHub::about().into()),
        _ => ApiHub::open(config(cli))?,
    };

    let output = match &cli.command {
        Command::Product(args) => product::run(args, &hub).await,
        Command::Idr(args) => idr::resolve(args, &hub).await?,
        Command::IdrUpdate(args) => idr::update(args, &hub).await,
        Command::Token(args) => token::run(args, &hub).await?,
        Command::Catalog => catalog::run()?,
        Command::About => ApiHub::about().into(),
    };

    tracing::debug!(status = output.status, "command finished");

    // Cache and record writes run after delivery; let them land before exit.
    hub.settle().await;
    Ok(output)
}

fn config(cli: &Cli) -> HubConfig {
    let mut config = HubConfig::from_env();
    if let Some(timeout_ms) = cli.timeout_ms {
        config = config.with_http_timeout_ms(timeout_ms);
    }
    if let Some(db_path) = &cli.db_path {
        config.warehouse.db_path = db_path.clone();
    }
    config
}
