use apihub_core::ApiHub;

use crate::cli::{IdrArgs, IdrUpdateArgs};
use crate::error::CliError;

use super::CommandOutput;

pub async fn resolve(args: &IdrArgs, hub: &ApiHub) -> Result<CommandOutput, CliError> {
    let params: serde_json::Value = serde_json::from_str(&args.params)
        .map_err(|error| CliError::Command(format!("search parameters are not valid JSON: {error}")))?;

    Ok(hub.resolve_identity(params).await.into())
}

pub async fn update(args: &IdrUpdateArgs, hub: &ApiHub) -> CommandOutput {
    hub.update_identity_record(args.id, &args.duns).await.into()
}
