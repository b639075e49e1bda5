use apihub_core::{Product, PRODUCTS};
use serde::Serialize;

use crate::error::CliError;

use super::CommandOutput;

#[derive(Debug, Serialize)]
struct CatalogEntry {
    product: &'static str,
    api: &'static str,
    provider: &'static str,
    structure: &'static str,
    key: &'static str,
    versions: &'static [&'static str],
    default_version: &'static str,
}

impl From<&'static Product> for CatalogEntry {
    fn from(product: &'static Product) -> Self {
        Self {
            product: product.id,
            api: product.api.as_str(),
            provider: product.provider().as_str(),
            structure: product.structure().as_str(),
            key: product.key.column(),
            versions: product.versions,
            default_version: product.default_version(),
        }
    }
}

pub fn run() -> Result<CommandOutput, CliError> {
    let entries: Vec<CatalogEntry> = PRODUCTS.iter().map(CatalogEntry::from).collect();
    CommandOutput::json(&entries)
}
