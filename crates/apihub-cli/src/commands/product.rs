use apihub_core::ApiHub;

use crate::cli::ProductArgs;

use super::CommandOutput;

pub async fn run(args: &ProductArgs, hub: &ApiHub) -> CommandOutput {
    hub.data_product(
        &args.key,
        &args.product,
        args.force,
        args.product_version.as_deref(),
    )
    .await
    .into()
}
