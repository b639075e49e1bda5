//! Static registry of providers, APIs and data products.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ValidationError;

/// Structure of the payloads an API delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataStructure {
    Xml,
    Json,
}

impl DataStructure {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Xml => "XML",
            Self::Json => "JSON",
        }
    }

    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Xml => "application/xml",
            Self::Json => "application/json",
        }
    }
}

impl Display for DataStructure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Organizations operating the upstream APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Dun & Bradstreet.
    Dnb,
    /// Global Legal Entity Identifier Foundation.
    Gleif,
}

impl ProviderId {
    pub const ALL: [Self; 2] = [Self::Dnb, Self::Gleif];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dnb => "dnb",
            Self::Gleif => "gleif",
        }
    }

    /// Name of the table caching this provider's products.
    pub fn product_table(self) -> String {
        format!("products_{}", self.as_str())
    }
}

impl Display for ProviderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How an API expects its callers to authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthStyle {
    /// Basic credentials exchanged for a bearer token.
    BasicBearer,
    /// User/password headers exchanged for a session token.
    HeaderSession,
    /// Credentials travel inside every SOAP request.
    EmbeddedSoap,
    None,
}

impl AuthStyle {
    /// Whether the API hands out tokens that a credential manager must hold.
    pub const fn issues_tokens(self) -> bool {
        matches!(self, Self::BasicBearer | Self::HeaderSession)
    }
}

/// Upstream API identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiId {
    /// D&B Direct+.
    Dpl,
    /// D&B Direct 2.0 Onboard.
    D2o,
    /// D&B Data Integration Toolkit.
    Dit,
    /// GLEIF LEI lookup.
    Lei,
}

impl ApiId {
    pub const ALL: [Self; 4] = [Self::Dpl, Self::D2o, Self::Dit, Self::Lei];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dpl => "dpl",
            Self::D2o => "d2o",
            Self::Dit => "dit",
            Self::Lei => "lei",
        }
    }

    pub const fn provider(self) -> ProviderId {
        match self {
            Self::Dpl | Self::D2o | Self::Dit => ProviderId::Dnb,
            Self::Lei => ProviderId::Gleif,
        }
    }

    pub const fn structure(self) -> DataStructure {
        match self {
            Self::Dit => DataStructure::Xml,
            Self::Dpl | Self::D2o | Self::Lei => DataStructure::Json,
        }
    }

    pub const fn auth_style(self) -> AuthStyle {
        match self {
            Self::Dpl => AuthStyle::BasicBearer,
            Self::D2o => AuthStyle::HeaderSession,
            Self::Dit => AuthStyle::EmbeddedSoap,
            Self::Lei => AuthStyle::None,
        }
    }
}

impl Display for ApiId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "dpl" => Ok(Self::Dpl),
            "d2o" => Ok(Self::D2o),
            "dit" => Ok(Self::Dit),
            "lei" => Ok(Self::Lei),
            other => Err(ValidationError::UnknownApi {
                value: other.to_owned(),
            }),
        }
    }
}

/// Kinds of lookup key a product can be addressed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// Nine-digit D-U-N-S number; normalized before use.
    Duns,
    /// Legal Entity Identifier; used as supplied.
    Lei,
}

impl KeyKind {
    /// Column holding the key in the provider's product table.
    pub const fn column(self) -> &'static str {
        match self {
            Self::Duns => "duns",
            Self::Lei => "lei",
        }
    }
}

impl Display for KeyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// One data offering of a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Product {
    pub id: &'static str,
    pub api: ApiId,
    pub key: KeyKind,
    /// Supported versions, oldest first. The last one is the default.
    pub versions: &'static [&'static str],
    /// Name the upstream API knows the product by, where it differs.
    pub display_name: Option<&'static str>,
}

pub const PRODUCTS: &[Product] = &[
    Product {
        id: "cmpelk",
        api: ApiId::Dpl,
        key: KeyKind::Duns,
        versions: &["v1", "v2"],
        display_name: None,
    },
    Product {
        id: "cmptcs",
        api: ApiId::Dpl,
        key: KeyKind::Duns,
        versions: &["v1"],
        display_name: None,
    },
    Product {
        id: "CMP_VRF_ID",
        api: ApiId::D2o,
        key: KeyKind::Duns,
        versions: &["V6.0"],
        display_name: None,
    },
    Product {
        id: "CMP_BOS",
        api: ApiId::D2o,
        key: KeyKind::Duns,
        versions: &["V6.0"],
        display_name: None,
    },
    Product {
        id: "gdp_em",
        api: ApiId::Dit,
        key: KeyKind::Duns,
        versions: &["V4"],
        display_name: Some("Enterprise Management"),
    },
    Product {
        id: "cmpcvf",
        api: ApiId::Dpl,
        key: KeyKind::Duns,
        versions: &["v1"],
        display_name: None,
    },
    Product {
        id: "cmpbos",
        api: ApiId::Dpl,
        key: KeyKind::Duns,
        versions: &["v1"],
        display_name: None,
    },
    Product {
        id: "lei_ref",
        api: ApiId::Lei,
        key: KeyKind::Lei,
        versions: &["v2"],
        display_name: None,
    },
];

impl Product {
    /// Exact, case-sensitive lookup.
    pub fn find(id: &str) -> Option<&'static Product> {
        PRODUCTS.iter().find(|product| product.id == id)
    }

    pub fn lookup(id: &str) -> Result<&'static Product, ValidationError> {
        Self::find(id).ok_or_else(|| ValidationError::UnknownProduct {
            value: id.to_owned(),
        })
    }

    pub const fn provider(&self) -> ProviderId {
        self.api.provider()
    }

    pub const fn structure(&self) -> DataStructure {
        self.api.structure()
    }

    pub fn default_version(&self) -> &'static str {
        self.versions.last().copied().unwrap_or_default()
    }

    /// Resolve the requested version, falling back to the default when none
    /// (or an empty string) is given.
    pub fn resolve_version(&self, requested: Option<&str>) -> Result<&'static str, ValidationError> {
        match requested.filter(|version| !version.is_empty()) {
            None => Ok(self.default_version()),
            Some(version) => self
                .versions
                .iter()
                .copied()
                .find(|supported| *supported == version)
                .ok_or_else(|| ValidationError::UnsupportedVersion {
                    value: version.to_owned(),
                }),
        }
    }

    /// Upstream name of the product.
    pub fn upstream_name(&self) -> &'static str {
        self.display_name.unwrap_or(self.id)
    }
}

impl Display for Product {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id)
    }
}
