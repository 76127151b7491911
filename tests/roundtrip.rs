//! Cross-component round-trip scenarios: DOM diff feeding selective
//! serialization, page-bundle plumbing, and the handler chain.

use wt_html::dom::diff::DomDiff;
use wt_html::dom::{DiffMarks, Document, LoadOptions};
use wt_html::html2wt::{serialize_dom, SerializeOpts};
use wt_html::{Env, PageBundle};

fn load(html: &str) -> Document {
    let mut doc = Document::from_xhtml(html).unwrap();

    doc.load_all_data_attribs(LoadOptions::default());

    doc
}

#[test]
fn unmodified_document_reuses_every_byte() {
    let wikitext = "<poem>\nthis\nis\n</poem>";
    let html = concat!(
        r##"<div typeof="mw:Extension/poem" about="#mwt1" "##,
        r#"data-mw='{"name":"poem","attrs":{},"body":{"extsrc":"\nthis\nis\n"}}' "#,
        r#"data-parsoid='{"dsr":[0,22,null,null]}'>"#,
        "<p>this<br/>is</p></div>"
    );
    let env = Env::default();
    let old = load(html);
    let mut new = load(html);

    let new_root = new.root();
    let modified = DomDiff::new()
        .diff(&old, old.root(), &mut new, new_root)
        .unwrap();

    assert!(!modified);

    let out = serialize_dom(
        &env,
        &mut new,
        SerializeOpts {
            orig_src: Some(wikitext.to_string()),
            cancel: None,
        },
    )
    .unwrap();

    assert_eq!(out, wikitext);
}

#[test]
fn edited_paragraph_is_regenerated_and_the_rest_reused() {
    let wikitext = "para a\n\npara b";
    let old_html = concat!(
        r#"<p data-parsoid='{"dsr":[0,6,0,0]}'>para a</p>"#,
        r#"<p data-parsoid='{"dsr":[8,14,0,0]}'>para b</p>"#
    );
    let new_html = concat!(
        r#"<p data-parsoid='{"dsr":[0,6,0,0]}'>edited</p>"#,
        r#"<p data-parsoid='{"dsr":[8,14,0,0]}'>para b</p>"#
    );
    let env = Env::default();
    let old = load(old_html);
    let mut new = load(new_html);

    let new_root = new.root();
    let modified = DomDiff::new()
        .diff(&old, old.root(), &mut new, new_root)
        .unwrap();

    assert!(modified);

    let first = new.children(new.root())[0];
    let second = new.children(new.root())[1];

    assert!(new
        .diff_marks(first)
        .contains(DiffMarks::CHILDREN_CHANGED | DiffMarks::SUBTREE_CHANGED));
    assert!(new.diff_marks(second).is_empty());

    let out = serialize_dom(
        &env,
        &mut new,
        SerializeOpts {
            orig_src: Some(wikitext.to_string()),
            cancel: None,
        },
    )
    .unwrap();

    // The touched paragraph regenerates; the untouched one is the
    // verbatim source range.
    assert_eq!(out, "<p>edited</p>para b");
}

#[test]
fn inserted_behavior_switch_gets_its_margins() {
    let wikitext = "para a\n\npara b";
    let html = concat!(
        r#"<p data-parsoid='{"dsr":[0,6,0,0]}'>para a</p>"#,
        r#"<p data-parsoid='{"dsr":[8,14,0,0]}'>para b</p>"#
    );
    let env = Env::default();
    let old = load(html);
    let mut new = load(html);

    let meta = new.create_element_with_attrs("meta", &[("property", "mw:PageProp/notoc")]);

    new.insert_at(new.root(), 1, meta);

    let new_root = new.root();
    let modified = DomDiff::new()
        .diff(&old, old.root(), &mut new, new_root)
        .unwrap();

    assert!(modified);
    assert!(new.diff_marks(meta).contains(DiffMarks::INSERTED));

    let out = serialize_dom(
        &env,
        &mut new,
        SerializeOpts {
            orig_src: Some(wikitext.to_string()),
            cancel: None,
        },
    )
    .unwrap();

    assert_eq!(out, "para a\n__NOTOC__\npara b");
}

#[test]
fn deleted_sibling_forces_regeneration_of_the_parent_scope() {
    let wikitext = "one\n\ntwo";
    let old_html = concat!(
        r#"<p data-parsoid='{"dsr":[0,3,0,0]}'>one</p>"#,
        r#"<p data-parsoid='{"dsr":[5,8,0,0]}'>two</p>"#
    );
    let new_html = r#"<p data-parsoid='{"dsr":[0,3,0,0]}'>one</p>"#;
    let env = Env::default();
    let old = load(old_html);
    let mut new = load(new_html);

    let new_root = new.root();
    DomDiff::new()
        .diff(&old, old.root(), &mut new, new_root)
        .unwrap();

    let out = serialize_dom(
        &env,
        &mut new,
        SerializeOpts {
            orig_src: Some(wikitext.to_string()),
            cancel: None,
        },
    )
    .unwrap();

    // The surviving paragraph still reuses its range; the deletion
    // marker contributes nothing.
    assert_eq!(out, "one");
}

#[test]
fn page_bundle_round_trip_preserves_selser_input() {
    let html = concat!(
        r#"<p data-parsoid='{"dsr":[0,6,0,0]}'>para a</p>"#,
        r#"<p data-parsoid='{"dsr":[8,14,0,0]}'>para b</p>"#
    );
    let mut doc = load(html);
    let bundle = PageBundle::extract(&mut doc);

    bundle.validate().unwrap();

    // A fresh consumer reconstructs the annotated DOM from the bundle
    // and still gets byte-level reuse.
    let env = Env::default();
    let mut redoc = Document::from_xhtml(&bundle.html).unwrap();

    bundle.apply(&mut redoc);

    let out = serialize_dom(
        &env,
        &mut redoc,
        SerializeOpts {
            orig_src: Some("para a\n\npara b".to_string()),
            cancel: None,
        },
    )
    .unwrap();

    assert_eq!(out, "para a\n\npara b");
}

#[test]
fn language_variant_and_placeholder_handlers_compose() {
    let html = concat!(
        r#"<meta typeof="mw:Placeholder" data-parsoid='{"src":"[[X"}'/>"#,
        r#"<span typeof="mw:LanguageVariant" "#,
        r#"data-mw-variant='{"twoway":[{"l":"zh-hans","t":"X"},{"l":"zh-hant","t":"Y"}]}' "#,
        r#"data-parsoid='{"fl":{},"flSp":[],"tSp":[]}'></span>"#
    );
    let env = Env::default();
    let mut doc = Document::from_xhtml(html).unwrap();

    let out = serialize_dom(&env, &mut doc, SerializeOpts::default()).unwrap();

    assert_eq!(out, "[[X-{zh-hans:X;zh-hant:Y}-");
}
