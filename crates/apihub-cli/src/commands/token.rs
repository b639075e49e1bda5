use apihub_core::{credentials::mask, ApiHub, ApiHubError, CredentialState, DataStructure};
use serde::Serialize;

use crate::cli::TokenArgs;
use crate::error::CliError;

use super::CommandOutput;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenStatus {
    api: &'static str,
    token: Option<String>,
    id: Option<i64>,
    obtained_at: Option<i64>,
    expires_in: Option<i64>,
    minutes_remaining: i64,
    state: String,
}

pub async fn run(args: &TokenArgs, hub: &ApiHub) -> Result<CommandOutput, CliError> {
    let Some(manager) = hub.credentials().get(args.api) else {
        let error = ApiHubError::invalid_parameters(
            DataStructure::Json,
            format!("API {} does not issue tokens", args.api),
        );
        return Ok(CommandOutput::failed(&error));
    };

    if let Err(error) = manager.initialize().await {
        return Ok(CommandOutput::failed(&error));
    }

    let token = manager.current_token();
    let state = match manager.state() {
        CredentialState::Valid => "valid",
        CredentialState::Error => "error",
        CredentialState::Loading | CredentialState::Validating | CredentialState::Renewing => "pending",
    };
    let status = TokenStatus {
        api: args.api.as_str(),
        token: token.as_ref().map(|token| mask(&token.value)),
        id: token.as_ref().and_then(|token| token.id),
        obtained_at: token.as_ref().map(|token| token.issued_at_ms),
        expires_in: token.as_ref().map(|token| token.ttl_secs),
        minutes_remaining: manager.minutes_to_expiry(),
        state: state.to_owned(),
    };

    CommandOutput::json(&status)
}
