//! HTML-to-wikitext serialization: the driver walk, the handler
//! dispatch table, and selective reuse of pre-edit source for subtrees
//! the DOM diff left untouched.

pub mod handlers;

mod state;

pub use self::state::{SepConstraint, SerializerState};

use crate::base::CancellationToken;
use crate::dom::{Document, LoadOptions, NodeId, NodeKind};
use crate::env::Env;
use failure::Error;

#[derive(Default)]
pub struct SerializeOpts {
    /// Pre-edit wikitext. Subtrees with no diff marks and a valid DSR
    /// are emitted as verbatim slices of it.
    pub orig_src: Option<String>,
    pub cancel: Option<CancellationToken>,
}

/// Serializes a document (its `<body>`, or the whole tree for
/// fragments) to wikitext.
pub fn serialize_dom(env: &Env, doc: &mut Document, opts: SerializeOpts) -> Result<String, Error> {
    doc.load_all_data_attribs(LoadOptions::default());

    let root = doc.body().unwrap_or_else(|| doc.root());
    let mut state = SerializerState::new(env, opts.orig_src, opts.cancel);

    serialize_children(&mut state, doc, root)?;

    Ok(state.finish())
}

pub fn serialize_children(
    state: &mut SerializerState<'_>,
    doc: &Document,
    node: NodeId,
) -> Result<(), Error> {
    for &child in doc.children(node) {
        serialize_node(state, doc, child)?;
    }

    Ok(())
}

pub fn serialize_node(
    state: &mut SerializerState<'_>,
    doc: &Document,
    node: NodeId,
) -> Result<(), Error> {
    state.check_cancel()?;

    match doc.kind(node) {
        NodeKind::Document => serialize_children(state, doc, node),
        NodeKind::Text(text) => {
            state.break_reuse_run();
            state.emit(text);

            Ok(())
        }
        NodeKind::Comment(data) => {
            state.break_reuse_run();
            state.emit(&format!("<!--{}-->", data));

            Ok(())
        }
        NodeKind::Element(_) => {
            if let Some((src, range)) = reusable_source(state, doc, node) {
                trace!(@wt "reusing source for {:?}", node);

                // Two adjacent reused ranges carry their original
                // separator run along.
                if let Some(prev_end) = state.take_last_reuse_end() {
                    if prev_end <= range.start() {
                        let gap = state
                            .orig_src()
                            .and_then(|s| {
                                s.get(prev_end as usize..range.start() as usize)
                                    .map(String::from)
                            })
                            .unwrap_or_default();

                        state.emit(&gap);
                    }
                }

                state.emit(&src);
                state.note_reuse_end(range.end());

                return Ok(());
            }

            state.break_reuse_run();

            let handler = handlers::handler_for(doc, node);

            if let Some(before) = handler.before {
                let constraint = before(state, doc, node);

                state.require_newlines(constraint.min_nl);
            }

            if handler.force_sol && !state.at_sol() {
                state.require_newlines(1);
            }

            (handler.handle)(state, doc, node)?;

            if let Some(after) = handler.after {
                let constraint = after(state, doc, node);

                state.require_newlines(constraint.min_nl);
            }

            Ok(())
        }
    }
}

/// A subtree nobody touched round-trips as the byte range its DSR
/// names.
fn reusable_source(
    state: &SerializerState<'_>,
    doc: &Document,
    node: NodeId,
) -> Option<(String, crate::base::SourceRange)> {
    let src = state.orig_src()?;

    if doc.subtree_has_diff_marks(node) {
        return None;
    }

    let dsr = doc.data_parsoid(node)?.dsr?;

    if !dsr.is_valid_for(src.len()) {
        return None;
    }

    src.get(dsr.start() as usize..dsr.end() as usize)
        .map(|slice| (slice.to_string(), dsr.range()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::DiffMarks;

    #[test]
    fn unmodified_subtree_reuses_the_source_range() {
        let wikitext = "<poem>\nthis\nis\n</poem>";
        let html = concat!(
            r##"<div typeof="mw:Extension/poem" about="#mwt1" "##,
            r#"data-mw='{"name":"poem","attrs":{},"body":{"extsrc":"\nthis\nis\n"}}' "#,
            r#"data-parsoid='{"dsr":[0,22,null,null]}'>"#,
            "<p>this<br/>is</p></div>"
        );
        let env = Env::default();
        let mut doc = Document::from_xhtml(html).unwrap();

        let out = serialize_dom(
            &env,
            &mut doc,
            SerializeOpts {
                orig_src: Some(wikitext.to_string()),
                cancel: None,
            },
        )
        .unwrap();

        assert_eq!(out, wikitext);
    }

    #[test]
    fn modified_subtree_falls_back_to_regeneration() {
        let html = concat!(
            r#"<div data-parsoid='{"dsr":[0,9,null,null]}'>"#,
            "<p>edited</p></div>"
        );
        let env = Env::default();
        let mut doc = Document::from_xhtml(html).unwrap();

        doc.load_all_data_attribs(LoadOptions::default());

        let div = doc.children(doc.root())[0];

        doc.add_diff_mark(div, DiffMarks::SUBTREE_CHANGED);

        let out = serialize_dom(
            &env,
            &mut doc,
            SerializeOpts {
                orig_src: Some("unedited!!".to_string()),
                cancel: None,
            },
        )
        .unwrap();

        // The fallback handler re-emits the subtree as HTML.
        assert_eq!(out, "<div><p>edited</p></div>");
    }

    #[test]
    fn out_of_bounds_dsr_is_not_reused() {
        let html = r#"<div data-parsoid='{"dsr":[0,99,null,null]}'><p>x</p></div>"#;
        let env = Env::default();
        let mut doc = Document::from_xhtml(html).unwrap();

        let out = serialize_dom(
            &env,
            &mut doc,
            SerializeOpts {
                orig_src: Some("short".to_string()),
                cancel: None,
            },
        )
        .unwrap();

        assert_eq!(out, "<div><p>x</p></div>");
    }

    #[test]
    fn text_and_comments_pass_through() {
        let env = Env::default();
        let mut doc = Document::from_xhtml("hello <!--hidden--> world").unwrap();

        let out = serialize_dom(&env, &mut doc, SerializeOpts::default()).unwrap();

        assert_eq!(out, "hello <!--hidden--> world");
    }

    #[test]
    fn cancellation_discards_the_walk() {
        let env = Env::default();
        let mut doc = Document::from_xhtml("<p>a</p>").unwrap();
        let cancel = CancellationToken::new();

        cancel.cancel();

        let err = serialize_dom(
            &env,
            &mut doc,
            SerializeOpts {
                orig_src: None,
                cancel: Some(cancel),
            },
        )
        .unwrap_err();

        assert!(err.downcast_ref::<crate::errors::Canceled>().is_some());
    }
}
