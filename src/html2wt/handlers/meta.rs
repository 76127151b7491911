//! `<meta>` serialization: placeholders, page properties, inclusion
//! control literals, and diff/separator markers.

use super::{is_placeholder, DomHandler, FALLBACK_HANDLER};
use crate::dom::{DiffMarks, Document, NodeId};
use crate::html2wt::{SepConstraint, SerializerState};
use failure::Error;

pub static META_HANDLER: DomHandler = DomHandler {
    handle: handle_meta,
    before: Some(meta_before),
    after: Some(meta_after),
    force_sol: false,
};

fn handle_meta(
    state: &mut SerializerState<'_>,
    doc: &Document,
    node: NodeId,
) -> Result<(), Error> {
    let dp_src = doc.data_parsoid(node).and_then(|dp| dp.src.clone());

    if let (Some(src), true) = (&dp_src, is_placeholder(doc, node)) {
        state.emit(src);

        return Ok(());
    }

    let property = doc.attr(node, "property").unwrap_or("");

    if let Some(prop_key) = property.strip_prefix("mw:PageProp/") {
        return handle_page_prop(state, doc, node, prop_key, dp_src);
    }

    if let Some(typeof_) = doc.attr(node, "typeof") {
        for value in typeof_.split_ascii_whitespace() {
            if value.starts_with("mw:Includes/") {
                emit_includes(state, doc, node, value, &dp_src);

                return Ok(());
            }

            if value.starts_with("mw:DiffMarker") || value == "mw:Separator" {
                return Ok(());
            }
        }
    }

    (FALLBACK_HANDLER.handle)(state, doc, node)
}

fn handle_page_prop(
    state: &mut SerializerState<'_>,
    doc: &Document,
    node: NodeId,
    prop_key: &str,
    dp_src: Option<String>,
) -> Result<(), Error> {
    let key = prop_key.to_ascii_lowercase();

    if let Some(magic_word) = state.env.site().magic_word_masq(&key) {
        let content = doc.attr(node, "content").unwrap_or("").to_string();

        if doc.typeof_contains(node, "mw:ExpandedAttrs") {
            state.emit(&format!("{{{{{}}}}}", content));
        } else if let Some(src) = dp_src.as_ref().and_then(|src| {
            src.find(':').map(|colon| src[..=colon].to_string())
        }) {
            state.emit(&format!("{}{}}}}}", src, content));
        } else {
            state.env.warn(
                "html2wt/meta",
                format!("no source for {} page property, regenerating", key),
            );
            state.emit(&format!(
                "{{{{{}:{}}}}}",
                magic_word.to_uppercase(),
                content
            ));
        }

        return Ok(());
    }

    let magic_src = doc
        .data_parsoid(node)
        .and_then(|dp| dp.magic_src.clone())
        .or_else(|| {
            state
                .env
                .site()
                .magic_word_source(&key)
                .map(String::from)
        });

    match magic_src {
        Some(src) => state.emit(&src),
        None => state.env.warn(
            "html2wt/meta",
            format!("unknown page property `{}` dropped", key),
        ),
    }

    Ok(())
}

fn emit_includes(
    state: &mut SerializerState<'_>,
    doc: &Document,
    node: NodeId,
    typeof_value: &str,
    dp_src: &Option<String>,
) {
    let default = match typeof_value {
        "mw:Includes/IncludeOnly" => "<includeonly>",
        // The end of an includeonly section lives inside the start
        // meta's source.
        "mw:Includes/IncludeOnly/End" => return,
        "mw:Includes/NoInclude" => "<noinclude>",
        "mw:Includes/NoInclude/End" => "</noinclude>",
        "mw:Includes/OnlyInclude" => "<onlyinclude>",
        "mw:Includes/OnlyInclude/End" => "</onlyinclude>",
        _ => {
            state.env.warn(
                "html2wt/meta",
                format!("unrecognized inclusion marker `{}` dropped", typeof_value),
            );

            return;
        }
    };

    let dmw_src = doc
        .data_mw(node)
        .and_then(|mw| mw.get("src"))
        .and_then(|src| src.as_str())
        .map(String::from);

    let src = dmw_src
        .or_else(|| dp_src.clone())
        .unwrap_or_else(|| default.to_string());

    state.emit(&src);
}

fn is_inserted(doc: &Document, node: NodeId) -> bool {
    doc.diff_marks(node).contains(DiffMarks::INSERTED)
        || doc
            .data_parsoid(node)
            .map(|dp| dp.tmp.is_new)
            .unwrap_or(false)
}

fn meta_before(_state: &SerializerState<'_>, doc: &Document, node: NodeId) -> SepConstraint {
    if doc.attr(node, "property") == Some("mw:PageProp/categorydefaultsort") {
        let wikitext_p_before = doc
            .prev_sibling(node)
            .filter(|&prev| doc.is_element_named(prev, "p"))
            .map(|prev| {
                doc.data_parsoid(prev)
                    .and_then(|dp| dp.stx.as_deref())
                    != Some("html")
            })
            .unwrap_or(false);

        return if wikitext_p_before {
            SepConstraint::min(2)
        } else {
            SepConstraint::min(1)
        };
    }

    if is_inserted(doc, node) && !is_placeholder(doc, node) {
        SepConstraint::min(1)
    } else {
        SepConstraint::NONE
    }
}

fn meta_after(_state: &SerializerState<'_>, doc: &Document, node: NodeId) -> SepConstraint {
    if is_inserted(doc, node) && !is_placeholder(doc, node) {
        SepConstraint::min(1)
    } else {
        SepConstraint::NONE
    }
}
