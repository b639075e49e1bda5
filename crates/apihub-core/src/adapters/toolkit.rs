//! D&B Data Integration Toolkit (SOAP/XML, credentials inside every
//! envelope).
//!
//! The toolkit reports failures inside HTTP 200 responses, so a response is
//! only accepted when every `STATUS/CODE` in its `DGX` payload is `0`.

use std::collections::BTreeSet;

use super::{require_credentials, ProductCall, ProtocolAdapter};
use crate::catalog::{ApiId, DataStructure};
use crate::config::ApiCredentials;
use crate::error::{escape_xml, ApiHubError, ErrorKind};
use crate::http_client::{HttpRequest, DEFAULT_TIMEOUT_MS};

const ENDPOINT: &str =
    "https://toolkit-wsdl.dnb.com/ws/DNB_WebServices.Providers.OrderAndInvestigations.GDP_V4:wsp_GDP_V4";
const SOAP_ACTION: &str =
    "DNB_WebServices_Providers_OrderAndInvestigations_GDP_V4_wsp_GDP_V4_Binder_ws_OtherGDPProducts";
const PAYLOAD_ELEMENT: &str = "DGX";

#[derive(Debug, Clone)]
pub struct ToolkitAdapter {
    credentials: Option<ApiCredentials>,
    timeout_ms: u64,
}

impl ToolkitAdapter {
    pub fn new(credentials: Option<ApiCredentials>) -> Self {
        Self {
            credentials,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// Twelve random uppercase hex digits identifying one toolkit transaction.
pub fn transaction_uid() -> String {
    (0..12)
        .map(|_| {
            char::from_digit(fastrand::u32(0..16), 16)
                .unwrap_or('0')
                .to_ascii_uppercase()
        })
        .collect()
}

fn envelope(credentials: &ApiCredentials, trnuid: &str, duns: &str, product_name: &str) -> String {
    let mut body = String::new();
    body.push_str(
        "<soapenv:Envelope xmlns:soapenv=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         xmlns:wsp=\"http://www.dnb.com/DNB_WebServices/Providers/OrderAndInvestigations/GDP_V4/wsp_GDP_V4\">",
    );
    body.push_str("<soapenv:Header/><soapenv:Body><wsp:ws_OtherGDPProducts><GDPRequest>");
    body.push_str(&format!("<UserId>{}</UserId>", escape_xml(&credentials.user)));
    body.push_str(&format!("<Password>{}</Password>", escape_xml(credentials.password.expose())));
    body.push_str(&format!("<TRNUID>{trnuid}</TRNUID>"));
    body.push_str("<socCode><AppId>apihub</AppId><AppVer>0010</AppVer></socCode>");
    body.push_str("<Orders><User_Language>EN</User_Language>");
    body.push_str(&format!("<DnB_DUNS_Number>{}</DnB_DUNS_Number>", escape_xml(duns)));
    body.push_str("<Trade_Up_Indicator>Y</Trade_Up_Indicator>");
    body.push_str(&format!("<Product>{}</Product>", escape_xml(product_name)));
    body.push_str("<Product_Type>D</Product_Type><Reason_Code>1</Reason_Code></Orders>");
    body.push_str("<Immediate_Delivery><Mode>DIRECT</Mode><Format>XML</Format></Immediate_Delivery>");
    body.push_str("</GDPRequest></wsp:ws_OtherGDPProducts></soapenv:Body></soapenv:Envelope>");
    body
}

/// Source text of `element`, with the namespace declarations it inherits
/// from its ancestors and relies on added to its start tag.
fn standalone_element(source: &str, element: roxmltree::Node<'_, '_>) -> String {
    let Some(text) = source.get(element.range()) else {
        return String::new();
    };

    let used: BTreeSet<&str> = element
        .descendants()
        .filter(|node| node.is_element())
        .flat_map(|node| {
            node.tag_name()
                .namespace()
                .into_iter()
                .chain(node.attributes().filter_map(|attribute| attribute.namespace()))
        })
        .collect();

    let declared = declared_names(start_tag(text));
    let mut inherited = String::new();
    for namespace in element.namespaces() {
        if namespace.name() == Some("xml") || !used.contains(namespace.uri()) {
            continue;
        }
        let attribute = match namespace.name() {
            Some(prefix) => format!("xmlns:{prefix}"),
            None => String::from("xmlns"),
        };
        if !declared.contains(attribute.as_str()) {
            inherited.push_str(&format!(" {attribute}=\"{}\"", escape_xml(namespace.uri())));
        }
    }

    if inherited.is_empty() {
        return text.to_owned();
    }
    let name_end = text
        .char_indices()
        .skip(1)
        .find(|(_, ch)| ch.is_whitespace() || *ch == '/' || *ch == '>')
        .map_or(text.len(), |(index, _)| index);
    format!("{}{inherited}{}", &text[..name_end], &text[name_end..])
}

/// The start tag of an element's source text, up to its first unquoted `>`.
fn start_tag(element: &str) -> &str {
    let mut quote = None;
    for (index, ch) in element.char_indices() {
        match (quote, ch) {
            (None, '"' | '\'') => quote = Some(ch),
            (Some(open), _) if ch == open => quote = None,
            (None, '>') => return &element[..=index],
            _ => {}
        }
    }
    element
}

fn declared_names(start_tag: &str) -> BTreeSet<&str> {
    start_tag
        .split(|ch: char| ch.is_whitespace() || ch == '/' || ch == '>')
        .filter_map(|token| token.split('=').next())
        .filter(|name| *name == "xmlns" || name.starts_with("xmlns:"))
        .collect()
}

/// Strip the SOAP envelope down to the `DGX` element and check its embedded
/// status codes.
pub fn unwrap_payload(body: &str) -> Result<String, ApiHubError> {
    let document = roxmltree::Document::parse(body).map_err(|error| {
        ApiHubError::new(ErrorKind::UpstreamStatus, DataStructure::Xml)
            .with_msg_info(format!("toolkit response is not well-formed XML: {error}"))
    })?;

    let Some(payload_node) = document
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == PAYLOAD_ELEMENT)
    else {
        return Err(ApiHubError::new(ErrorKind::UpstreamStatus, DataStructure::Xml)
            .with_msg_info("<![CDATA[D&B Toolkit GDP response carries no DGX element]]>")
            .with_ext_api(None, Some(body)));
    };

    let payload = standalone_element(body, payload_node);

    let statuses = payload_node
        .descendants()
        .filter(|node| node.is_element() && node.tag_name().name() == "STATUS");
    for status in statuses {
        let code = status
            .descendants()
            .find(|node| node.is_element() && node.tag_name().name() == "CODE")
            .and_then(|node| node.text())
            .map(str::trim);

        let parsed = code.and_then(|code| code.parse::<i64>().ok());
        if parsed != Some(0) {
            let shown = match (code, parsed) {
                (Some(_), Some(value)) => value.to_string(),
                (Some(_), None) => String::from("NaN"),
                (None, _) => String::from("null"),
            };
            tracing::warn!(code = shown.as_str(), "toolkit response reports an error status");

            return Err(ApiHubError::new(ErrorKind::UpstreamStatus, DataStructure::Xml)
                .with_msg_info(format!(
                    "<![CDATA[D&B Toolkit GDP request returned an error status code (code: {shown})]]>"
                ))
                .with_ext_api(None, Some(payload.as_str())));
        }
    }

    Ok(payload)
}

impl ProtocolAdapter for ToolkitAdapter {
    fn api(&self) -> ApiId {
        ApiId::Dit
    }

    fn product_request(&self, call: &ProductCall<'_>) -> Result<HttpRequest, ApiHubError> {
        let credentials = require_credentials(ApiId::Dit, self.credentials.as_ref())?;
        let body = envelope(
            credentials,
            &transaction_uid(),
            call.key.as_str(),
            call.product.upstream_name(),
        );

        Ok(HttpRequest::post(ENDPOINT)
            .with_header("Content-Type", "text/xml;charset=UTF-8")
            .with_header("SOAPAction", SOAP_ACTION)
            .with_body(body)
            .with_timeout_ms(self.timeout_ms))
    }

    fn parse_product(&self, body: String) -> Result<String, ApiHubError> {
        unwrap_payload(&body)
    }
}
