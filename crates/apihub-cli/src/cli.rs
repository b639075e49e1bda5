//! CLI argument definitions for apihub.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `product` | Serve a data product from the cache or its upstream API |
//! | `idr` | Run a Direct+ identity resolution search |
//! | `idr-update` | Record the DUNS chosen for an identity resolution |
//! | `token` | Load or renew the token of an API and show its status |
//! | `catalog` | List the supported data products |
//! | `about` | Describe the hub |
//!
//! The response body goes to stdout; the response headers and the HTTP status
//! go to stderr.
//!
//! # Examples
//!
//! ```bash
//! apihub product cmpelk 12-345
//! apihub product gdp_em 804735132 --force
//! apihub idr '{"name": "Acme Corp", "countryISOAlpha2Code": "US"}'
//! apihub idr-update 7 804735132
//! ```

use std::path::PathBuf;

use apihub_core::ApiId;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "apihub",
    author,
    version,
    about = "Request, persist and pass on third-party company data",
    long_about = "apihub serves company data products from a local DuckDB cache, \
fetching them from D&B Direct+, Direct 2.0 Onboard, the Data Integration Toolkit \
or GLEIF when they are not cached yet.\n\
\n\
Credentials are read from APIHUB_<API>_USER and APIHUB_<API>_PASSWORD."
)]
pub struct Cli {
    /// Upstream request deadline in milliseconds (overrides APIHUB_HTTP_TIMEOUT_MS).
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,

    /// DuckDB database file (overrides APIHUB_DB_PATH).
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve a data product.
    Product(ProductArgs),
    /// Run an identity resolution search.
    Idr(IdrArgs),
    /// Record the DUNS chosen for an identity resolution.
    IdrUpdate(IdrUpdateArgs),
    /// Load or renew an API token.
    Token(TokenArgs),
    /// List the supported data products.
    Catalog,
    /// Describe the hub.
    About,
}

#[derive(Debug, Clone, Args)]
pub struct ProductArgs {
    /// Product identifier, e.g. `cmpelk` or `gdp_em`.
    pub product: String,

    /// DUNS or LEI, depending on the product.
    pub key: String,

    /// Product version; defaults to the newest supported one.
    #[arg(long = "version")]
    pub product_version: Option<String>,

    /// Skip the cache and fetch from upstream.
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

#[derive(Debug, Clone, Args)]
pub struct IdrArgs {
    /// Search criteria as a JSON object.
    pub params: String,
}

#[derive(Debug, Clone, Args)]
pub struct IdrUpdateArgs {
    /// Identity resolution record id.
    pub id: i64,

    /// The DUNS chosen from the match candidates.
    pub duns: String,
}

#[derive(Debug, Clone, Args)]
pub struct TokenArgs {
    /// API issuing the token (`dpl` or `d2o`).
    pub api: ApiId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_product_flags() {
        let cli = Cli::try_parse_from(["apihub", "product", "cmpelk", "12-345", "--force", "--version", "v1"])
            .expect("valid arguments");

        match cli.command {
            Command::Product(args) => {
                assert_eq!(args.product, "cmpelk");
                assert_eq!(args.key, "12-345");
                assert!(args.force);
                assert_eq!(args.product_version.as_deref(), Some("v1"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_token_api() {
        assert!(Cli::try_parse_from(["apihub", "token", "xyz"]).is_err());

        let cli = Cli::try_parse_from(["apihub", "token", "dpl"]).expect("valid arguments");
        assert!(matches!(cli.command, Command::Token(TokenArgs { api: ApiId::Dpl })));
    }
}
