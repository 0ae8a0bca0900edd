//! Per-record field extraction for side-channel export.
//!
//! A field is addressed by qualified name (`prefix:local`); the lookup
//! searches the record's `metadata` subtree for the first matching
//! element anywhere in the subtree, not only direct children. The
//! fallback rules form a small closed decision table rather than ad hoc
//! conditionals, so they stay independently testable.

use roxmltree::Node;

use crate::xml::{find_child, get_text, local_name};

/// Namespace prefixes recognized in qualified field names.
pub const NAMESPACES: &[(&str, &str)] = &[
    ("oai", "http://www.openarchives.org/OAI/2.0/"),
    ("edm", "http://www.europeana.eu/schemas/edm/"),
    ("dc", "http://purl.org/dc/elements/1.1/"),
    ("dcterms", "http://purl.org/dc/terms/"),
    ("ore", "http://www.openarchives.org/ore/terms/"),
];

/// Fallback chain per requested field.
///
/// Only defined for the primary display-location field: when
/// `edm:isShownAt` is absent, the display image and then the generic
/// resource identifier stand in. Deliberately not generalized to other
/// fields.
const FALLBACK_CHAINS: &[(&str, &[&str])] =
    &[("edm:isShownAt", &["edm:isShownBy", "dc:identifier"])];

/// Extract a qualified field from a record element.
///
/// Returns the trimmed text of the first match in the record's
/// `metadata` subtree, falling back per the decision table, or an empty
/// string when nothing matches.
pub fn extract_field(record: Node<'_, '_>, qname: &str) -> String {
    let Some(metadata) = find_child(record, "metadata") else {
        return String::new();
    };

    if let Some(value) = find_in_subtree(metadata, qname) {
        return value;
    }

    for (field, chain) in FALLBACK_CHAINS {
        if *field == qname {
            for fallback in *chain {
                if let Some(value) = find_in_subtree(metadata, fallback) {
                    return value;
                }
            }
        }
    }

    String::new()
}

/// First non-empty text of a matching element in the subtree.
fn find_in_subtree(root: Node<'_, '_>, qname: &str) -> Option<String> {
    root.descendants()
        .filter(|n| n.is_element() && matches_qname(*n, qname))
        .map(get_text)
        .find(|s| !s.is_empty())
}

/// Whether a node matches a qualified name.
///
/// A known prefix is resolved through [`NAMESPACES`] and compared
/// against the node's namespace URI; an unknown or absent prefix
/// matches on local name alone.
fn matches_qname(node: Node<'_, '_>, qname: &str) -> bool {
    let (prefix, local) = match qname.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, qname),
    };

    if local_name(node) != local {
        return false;
    }

    match prefix.and_then(namespace_uri) {
        Some(uri) => node.tag_name().namespace() == Some(uri),
        None => true,
    }
}

fn namespace_uri(prefix: &str) -> Option<&'static str> {
    NAMESPACES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, uri)| *uri)
}
