mod language_variant;
mod meta;

pub use self::language_variant::LANGUAGE_VARIANT_HANDLER;
pub use self::meta::META_HANDLER;

use super::{serialize_node, SepConstraint, SerializerState};
use crate::dom::serializer::{serialize as serialize_xml, XmlSerializerOpts};
use crate::dom::{Document, NodeId};
use failure::Error;
use once_cell::sync::Lazy;
use regex::Regex;

pub(super) static PLACEHOLDER_TYPEOF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^mw:Placeholder(/|$)").unwrap());

/// Per-node serialization capability record. Unknown element names
/// fall through to the generic handler.
pub struct DomHandler {
    pub handle: fn(&mut SerializerState<'_>, &Document, NodeId) -> Result<(), Error>,
    pub before: Option<fn(&SerializerState<'_>, &Document, NodeId) -> SepConstraint>,
    pub after: Option<fn(&SerializerState<'_>, &Document, NodeId) -> SepConstraint>,
    pub force_sol: bool,
}

pub fn handler_for(doc: &Document, node: NodeId) -> &'static DomHandler {
    if doc.tag_name(node) == Some("meta") {
        return &META_HANDLER;
    }

    if doc.attr(node, "data-mw-variant").is_some()
        || doc.typeof_contains(node, "mw:LanguageVariant")
    {
        return &LANGUAGE_VARIANT_HANDLER;
    }

    &FALLBACK_HANDLER
}

pub(super) fn is_placeholder(doc: &Document, node: NodeId) -> bool {
    doc.attr(node, "typeof")
        .map(|t| {
            t.split_ascii_whitespace()
                .any(|v| PLACEHOLDER_TYPEOF.is_match(v))
        })
        .unwrap_or(false)
}

/// Generic handler: placeholders re-emit their stored wikitext,
/// anything else is carried as literal HTML.
pub static FALLBACK_HANDLER: DomHandler = DomHandler {
    handle: fallback_handle,
    before: None,
    after: None,
    force_sol: false,
};

fn fallback_handle(
    state: &mut SerializerState<'_>,
    doc: &Document,
    node: NodeId,
) -> Result<(), Error> {
    if is_placeholder(doc, node) {
        if let Some(src) = doc.data_parsoid(node).and_then(|dp| dp.src.clone()) {
            state.emit(&src);

            return Ok(());
        }
    }

    let name = doc.tag_name(node).expect("fallback on a non-element");

    // Serialize the open tag, recurse through the driver so nested
    // handlers and source reuse still apply, then close.
    let mut open = String::new();

    open.push('<');
    open.push_str(name);

    for attr in doc.attrs(node) {
        open.push(' ');
        open.push_str(&attr.name);
        open.push_str("=\"");
        open.push_str(&attr.value.replace('&', "&amp;").replace('"', "&quot;"));
        open.push('"');
    }

    if doc.children(node).is_empty() {
        let void = serialize_xml(doc, node, &XmlSerializerOpts::default()).html;

        state.emit(&void);

        return Ok(());
    }

    open.push('>');
    state.emit(&open);

    for &child in doc.children(node) {
        serialize_node(state, doc, child)?;
    }

    state.emit(&format!("</{}>", name));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html2wt::{serialize_dom, SerializeOpts};
    use crate::Env;

    #[test]
    fn span_placeholder_emits_stored_source() {
        let env = Env::default();
        let mut doc = Document::from_xhtml(
            r#"<span typeof="mw:Placeholder/UnclosedComment" data-parsoid='{"src":"<!-- x"}'>y</span>"#,
        )
        .unwrap();

        let out = serialize_dom(&env, &mut doc, SerializeOpts::default()).unwrap();

        assert_eq!(out, "<!-- x");
    }

    #[test]
    fn unknown_elements_round_trip_as_html() {
        let env = Env::default();
        let mut doc =
            Document::from_xhtml(r#"<div class="x"><b>bold</b> text<br/></div>"#).unwrap();

        let out = serialize_dom(&env, &mut doc, SerializeOpts::default()).unwrap();

        assert_eq!(out, r#"<div class="x"><b>bold</b> text<br/></div>"#);
    }
}
