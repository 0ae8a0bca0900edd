//! OAI-PMH protocol adapter: verbs, request parameter sets and
//! response envelope parsing.

use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use roxmltree::Document;

use crate::error::{HarvesterError, Result};
use crate::fields;
use crate::xml::{child_text, find_child, find_descendant, get_text, local_name};

/// OAI-PMH verbs supported by the harvester.
///
/// `ListRecords` and `ListIdentifiers` paginate via resumption tokens;
/// the other verbs are one-shot requests archived as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Identify,
    ListRecords,
    ListIdentifiers,
    ListMetadataFormats,
    GetRecord,
}

impl Verb {
    /// Protocol spelling of the verb.
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::Identify => "Identify",
            Verb::ListRecords => "ListRecords",
            Verb::ListIdentifiers => "ListIdentifiers",
            Verb::ListMetadataFormats => "ListMetadataFormats",
            Verb::GetRecord => "GetRecord",
        }
    }

    /// Whether responses to this verb paginate via resumption tokens.
    pub fn is_paginated(self) -> bool {
        matches!(self, Verb::ListRecords | Verb::ListIdentifiers)
    }

    /// Local tag name of the per-item element in a page response.
    pub fn item_tag(self) -> &'static str {
        match self {
            Verb::ListRecords => "record",
            _ => "header",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = HarvesterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Identify" => Ok(Verb::Identify),
            "ListRecords" => Ok(Verb::ListRecords),
            "ListIdentifiers" => Ok(Verb::ListIdentifiers),
            "ListMetadataFormats" => Ok(Verb::ListMetadataFormats),
            "GetRecord" => Ok(Verb::GetRecord),
            other => Err(HarvesterError::InvalidVerb(other.to_string())),
        }
    }
}

/// One harvested item from a page: the verbatim element text plus the
/// flat fields derived from it for side-channel export.
#[derive(Debug, Clone)]
pub struct HarvestedItem {
    /// Verbatim (post-sanitation) XML of the `record`/`header` element.
    pub xml: String,
    pub identifier: String,
    pub datestamp: String,
    /// Extracted export field value; empty for `ListIdentifiers`.
    pub field_value: String,
}

/// Transient result of one page response; consumed immediately.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub items: Vec<HarvestedItem>,
    /// Next resumption token; `None` signals the final page.
    pub resumption_token: Option<String>,
}

/// Build the request URL for a parameter set.
pub fn build_url(base: &str, params: &[(String, String)]) -> Result<Url> {
    let base = base.trim_end_matches('?');
    Url::parse_with_params(base, params).map_err(|e| HarvesterError::InvalidUrl {
        url: base.to_string(),
        message: e.to_string(),
    })
}

/// Parameter set for the first request of a harvest.
///
/// `metadataPrefix`, `set`, `from` and `until` only apply to the
/// paginated verbs; the others are sent with `verb` alone.
pub fn first_call_params(
    verb: Verb,
    metadata_prefix: Option<&str>,
    set_spec: Option<&str>,
    from: Option<&str>,
    until: Option<&str>,
) -> Vec<(String, String)> {
    let mut params = vec![("verb".to_string(), verb.as_str().to_string())];
    if verb.is_paginated() {
        if let Some(prefix) = metadata_prefix {
            params.push(("metadataPrefix".to_string(), prefix.to_string()));
        }
        if let Some(set) = set_spec {
            params.push(("set".to_string(), set.to_string()));
        }
        if let Some(from) = from {
            params.push(("from".to_string(), from.to_string()));
        }
        if let Some(until) = until {
            params.push(("until".to_string(), until.to_string()));
        }
    }
    params
}

/// Parameter set for a resumption request.
///
/// Per the protocol, a token-bearing request carries only `verb` and
/// `resumptionToken` - the token replaces `metadataPrefix` and `set`.
pub fn token_params(verb: Verb, token: &str) -> Vec<(String, String)> {
    vec![
        ("verb".to_string(), verb.as_str().to_string()),
        ("resumptionToken".to_string(), token.to_string()),
    ]
}

/// Extract the item list and resumption token from a page response.
///
/// `text` must be the exact string `doc` was parsed from: each item's
/// XML is the verbatim byte range of its element within that string.
/// Items appear in document order. An absent or empty token element
/// signals the final page.
pub fn extract_page(
    doc: &Document<'_>,
    text: &str,
    verb: Verb,
    export_field: Option<&str>,
) -> PageResult {
    let tag = verb.item_tag();
    let mut items = Vec::new();

    for node in doc
        .descendants()
        .filter(|n| n.is_element() && local_name(*n) == tag)
    {
        let xml = text[node.range()].to_string();

        // For ListRecords the header is nested inside the record
        let header = if verb == Verb::ListRecords {
            find_child(node, "header")
        } else {
            Some(node)
        };
        let identifier = header.map(|h| child_text(h, "identifier")).unwrap_or_default();
        let datestamp = header.map(|h| child_text(h, "datestamp")).unwrap_or_default();

        let field_value = match (verb, export_field) {
            (Verb::ListRecords, Some(field)) => fields::extract_field(node, field),
            _ => String::new(),
        };

        items.push(HarvestedItem {
            xml,
            identifier,
            datestamp,
            field_value,
        });
    }

    let resumption_token = find_descendant(doc.root_element(), "resumptionToken")
        .map(get_text)
        .filter(|t| !t.is_empty());

    PageResult {
        items,
        resumption_token,
    }
}

/// Repository self-description from an `Identify` response.
#[derive(Debug, Clone, Default)]
pub struct IdentifyInfo {
    pub repository_name: Option<String>,
    pub base_url: Option<String>,
    pub granularity: Option<String>,
    pub earliest_datestamp: Option<String>,
}

/// Read the interesting `Identify` fields, tolerating absent elements.
pub fn identify_info(doc: &Document<'_>) -> IdentifyInfo {
    let root = doc.root_element();
    let text_of = |tag: &str| {
        find_descendant(root, tag)
            .map(get_text)
            .filter(|s| !s.is_empty())
    };
    IdentifyInfo {
        repository_name: text_of("repositoryName"),
        base_url: text_of("baseURL"),
        granularity: text_of("granularity"),
        earliest_datestamp: text_of("earliestDatestamp"),
    }
}

/// Collect the metadata prefixes advertised by a `ListMetadataFormats`
/// response.
pub fn metadata_prefixes(doc: &Document<'_>) -> Vec<String> {
    doc.descendants()
        .filter(|n| n.is_element() && local_name(*n) == "metadataPrefix")
        .map(get_text)
        .filter(|s| !s.is_empty())
        .collect()
}
