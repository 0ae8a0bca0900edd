//! XML utility functions for navigating parsed response trees.

use roxmltree::Node;

/// Get the tag name without namespace prefix.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use oai_harvester::xml::local_name;
///
/// let xml = r#"<oai:record xmlns:oai="http://www.openarchives.org/OAI/2.0/"/>"#;
/// let doc = Document::parse(xml).unwrap();
/// assert_eq!(local_name(doc.root_element()), "record");
/// ```
pub fn local_name<'a>(node: Node<'a, '_>) -> &'a str {
    node.tag_name().name()
}

/// Find the first child element with the given local tag name.
pub fn find_child<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && local_name(*child) == tag)
}

/// Find the first descendant element with the given local tag name,
/// in document order.
pub fn find_descendant<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.descendants()
        .find(|n| n.is_element() && local_name(*n) == tag)
}

/// Get the text content of a node, trimmed.
///
/// # Examples
/// ```
/// use roxmltree::Document;
/// use oai_harvester::xml::get_text;
///
/// let doc = Document::parse("<id>  oai:example:1  </id>").unwrap();
/// assert_eq!(get_text(doc.root_element()), "oai:example:1");
/// ```
pub fn get_text(node: Node<'_, '_>) -> String {
    node.text().map(|s| s.trim().to_string()).unwrap_or_default()
}

/// Get the trimmed text of the first child element with the given
/// local tag name, or empty string if absent.
pub fn child_text(node: Node<'_, '_>, tag: &str) -> String {
    find_child(node, tag).map(get_text).unwrap_or_default()
}
