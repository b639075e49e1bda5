use serde::Serialize;
use thiserror::Error;

use crate::catalog::DataStructure;
use crate::http_client::HttpError;

/// Request validation failures, raised before any I/O starts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Product identifier specified ({value}) is not supported")]
    UnknownProduct { value: String },
    #[error("Version identifier specified ({value}) is not supported")]
    UnsupportedVersion { value: String },
    #[error("DUNS submitted ({value}) contains non-numeric characters and is therefore invalid")]
    NonNumericDuns { value: String },
    #[error("Lookup key cannot be empty")]
    EmptyKey,
    #[error("API identifier specified ({value}) is not supported")]
    UnknownApi { value: String },
    #[error("Identity resolution parameters must be a JSON object")]
    InvalidSearchParams,
}

/// Closed set of error kinds surfaced to callers; the discriminant is the
/// wire `err_num`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Generic = 0,
    InvalidParameters = 1,
    UpstreamStatus = 2,
    NotFound = 3,
    Persistence = 4,
}

impl ErrorKind {
    pub const fn number(self) -> u8 {
        self as u8
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::Generic => "Error occurred in API HUB",
            Self::InvalidParameters => "Error instantiating DataProduct object",
            Self::UpstreamStatus => "Ext API returned an invalid HTTP status",
            Self::NotFound => "Unable to locate the requested resource",
            Self::Persistence => "Error persisting object",
        }
    }

    pub const fn default_status(self) -> u16 {
        match self {
            Self::InvalidParameters => 400,
            Self::NotFound => 404,
            Self::Generic | Self::UpstreamStatus | Self::Persistence => 500,
        }
    }
}

/// Upstream error body, parsed according to the error's target structure.
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamBody {
    /// Root element of an XML document, as it appeared in the response.
    Xml(String),
    Json(serde_json::Value),
    /// Body that was not valid JSON, kept as received.
    Text(String),
}

/// Error information originating from an upstream API.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtApiError {
    pub http_status: Option<u16>,
    pub err_msg: Option<UpstreamBody>,
}

/// The hub's canonical error. Renders as XML or JSON depending on the
/// structure the caller expects.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{} (err_num {}){}", .kind.description(), .kind.number(), detail(.msg_info))]
pub struct ApiHubError {
    kind: ErrorKind,
    structure: DataStructure,
    msg_info: Option<String>,
    ext_api: Option<ExtApiError>,
    ws_path: Option<String>,
}

impl ApiHubError {
    pub fn new(kind: ErrorKind, structure: DataStructure) -> Self {
        Self {
            kind,
            structure,
            msg_info: None,
            ext_api: None,
            ws_path: None,
        }
    }

    pub fn generic(structure: DataStructure, msg_info: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic, structure).with_msg_info(msg_info)
    }

    pub fn invalid_parameters(structure: DataStructure, msg_info: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParameters, structure).with_msg_info(msg_info)
    }

    pub fn not_found(structure: DataStructure, msg_info: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, structure).with_msg_info(msg_info)
    }

    pub fn persistence(structure: DataStructure, msg_info: impl Into<String>) -> Self {
        Self::new(ErrorKind::Persistence, structure).with_msg_info(msg_info)
    }

    /// A validation failure reported in the structure the caller expects.
    pub fn from_validation(structure: DataStructure, error: &ValidationError) -> Self {
        Self::invalid_parameters(structure, error.to_string())
    }

    /// A transport failure talking to an upstream API.
    pub fn from_transport(structure: DataStructure, error: &HttpError) -> Self {
        Self::generic(structure, format!("upstream request failed: {}", error.message()))
    }

    /// An upstream response outside the 2XX range.
    pub fn upstream_rejected(structure: DataStructure, status: u16, body: &str) -> Self {
        Self::new(ErrorKind::NotFound, structure)
            .with_msg_info(format!(
                "API call returned an HTTP status code outside the 2XX range (code: {status})."
            ))
            .with_ext_api(Some(status), Some(body))
    }

    pub fn with_msg_info(mut self, msg_info: impl Into<String>) -> Self {
        let msg_info = msg_info.into();
        self.msg_info = (!msg_info.is_empty()).then_some(msg_info);
        self
    }

    /// Attach upstream diagnostics. The raw body is parsed as XML for XML
    /// targets (left empty when it does not parse) and as JSON otherwise
    /// (kept as text when it does not parse).
    pub fn with_ext_api(mut self, http_status: Option<u16>, body: Option<&str>) -> Self {
        let http_status = http_status.filter(|status| *status != 0);
        let err_msg = body
            .filter(|body| !body.is_empty())
            .and_then(|body| parse_upstream_body(self.structure, body));

        if http_status.is_some() || err_msg.is_some() {
            self.ext_api = Some(ExtApiError {
                http_status,
                err_msg,
            });
        }
        self
    }

    pub fn with_ws_path(mut self, ws_path: impl Into<String>) -> Self {
        self.ws_path = Some(ws_path.into());
        self
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub const fn structure(&self) -> DataStructure {
        self.structure
    }

    pub fn msg_info(&self) -> Option<&str> {
        self.msg_info.as_deref()
    }

    pub fn ext_api(&self) -> Option<&ExtApiError> {
        self.ext_api.as_ref()
    }

    pub fn ws_path(&self) -> Option<&str> {
        self.ws_path.as_deref()
    }

    /// Status for the HTTP boundary: upstream status, then the kind's
    /// default.
    pub fn http_status(&self) -> u16 {
        self.ext_api
            .as_ref()
            .and_then(|ext| ext.http_status)
            .unwrap_or_else(|| self.kind.default_status())
    }

    pub const fn content_type(&self) -> &'static str {
        self.structure.content_type()
    }

    /// Wire representation in the error's target structure.
    pub fn render(&self) -> String {
        match self.structure {
            DataStructure::Xml => self.to_xml(),
            DataStructure::Json => self.to_json(),
        }
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::from("<api_hub_err>");
        xml.push_str(&format!("<message>{}</message>", self.kind.description()));
        xml.push_str(&format!("<err_num>{}</err_num>", self.kind.number()));
        xml.push_str(&format!("<err_struct>{}</err_struct>", self.structure));

        if let Some(msg_info) = &self.msg_info {
            xml.push_str(&format!("<msg_info>{}</msg_info>", xml_text(msg_info)));
        }

        if let Some(ext) = &self.ext_api {
            xml.push_str("<ext_api>");
            if let Some(status) = ext.http_status {
                xml.push_str(&format!("<http_status>{status}</http_status>"));
            }
            let err_msg = match &ext.err_msg {
                Some(UpstreamBody::Xml(element)) => Some(element.clone()),
                Some(UpstreamBody::Text(text)) => Some(xml_text(text)),
                Some(UpstreamBody::Json(value)) => Some(xml_text(&value.to_string())),
                None => None,
            };
            if let Some(err_msg) = err_msg {
                xml.push_str(&format!("<err_msg>{err_msg}</err_msg>"));
            }
            xml.push_str("</ext_api>");
        }

        if let Some(ws_path) = &self.ws_path {
            xml.push_str(&format!("<ws_path>{}</ws_path>", xml_text(ws_path)));
        }

        xml.push_str("</api_hub_err>");
        xml
    }

    pub fn to_json(&self) -> String {
        let ext_api = self.ext_api.as_ref().map(|ext| WireExtApi {
            http_status: ext.http_status,
            err_msg: ext.err_msg.as_ref().map(|body| match body {
                UpstreamBody::Json(value) => value.clone(),
                UpstreamBody::Xml(text) | UpstreamBody::Text(text) => {
                    serde_json::Value::String(text.clone())
                }
            }),
        });

        let wire = WireEnvelope {
            api_hub_err: WireError {
                message: self.kind.description(),
                err_num: self.kind.number(),
                err_struct: self.structure.as_str(),
                msg_info: self.msg_info.as_deref(),
                ext_api,
                ws_path: self.ws_path.as_deref(),
            },
        };

        pretty_json(&wire)
    }
}

impl From<HttpError> for ApiHubError {
    fn from(error: HttpError) -> Self {
        Self::from_transport(DataStructure::Json, &error)
    }
}

#[derive(Serialize)]
struct WireEnvelope<'a> {
    api_hub_err: WireError<'a>,
}

#[derive(Serialize)]
struct WireError<'a> {
    message: &'static str,
    err_num: u8,
    err_struct: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    msg_info: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ext_api: Option<WireExtApi>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ws_path: Option<&'a str>,
}

#[derive(Serialize)]
struct WireExtApi {
    #[serde(skip_serializing_if = "Option::is_none")]
    http_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    err_msg: Option<serde_json::Value>,
}

fn parse_upstream_body(structure: DataStructure, body: &str) -> Option<UpstreamBody> {
    match structure {
        DataStructure::Xml => match roxmltree::Document::parse(body) {
            Ok(document) => {
                let range = document.root_element().range();
                body.get(range).map(|element| UpstreamBody::Xml(element.to_owned()))
            }
            Err(error) => {
                tracing::warn!(%error, "upstream error body is not well-formed XML");
                None
            }
        },
        DataStructure::Json => Some(
            serde_json::from_str(body)
                .map(UpstreamBody::Json)
                .unwrap_or_else(|_| UpstreamBody::Text(body.to_owned())),
        ),
    }
}

/// Serialize with the three-space indentation the wire format uses.
pub(crate) fn pretty_json<T: Serialize>(value: &T) -> String {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"   ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    if value.serialize(&mut serializer).is_err() {
        return String::from("{}");
    }
    String::from_utf8(buffer).unwrap_or_default()
}

fn detail(msg_info: &Option<String>) -> String {
    msg_info
        .as_deref()
        .map(|msg_info| format!(": {msg_info}"))
        .unwrap_or_default()
}

/// Escape the XML special characters in text or attribute content.
pub(crate) fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Escape element text, leaving CDATA sections untouched.
fn xml_text(text: &str) -> String {
    if text.starts_with("<![CDATA[") && text.ends_with("]]>") {
        return text.to_owned();
    }
    escape_xml(text)
}
