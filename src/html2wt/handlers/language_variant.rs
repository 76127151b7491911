//! Serialization of `-{flags|body}-` language-conversion constructs
//! from the `data-mw-variant` payload.

use super::DomHandler;
use crate::dom::{Document, NodeId};
use crate::html2wt::{serialize_dom, SerializeOpts, SerializerState};
use failure::Error;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

pub static LANGUAGE_VARIANT_HANDLER: DomHandler = DomHandler {
    handle: handle_language_variant,
    before: None,
    after: None,
    force_sol: false,
};

static VALID_LANG_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][-a-z]+$").unwrap());

fn handle_language_variant(
    state: &mut SerializerState<'_>,
    doc: &Document,
    node: NodeId,
) -> Result<(), Error> {
    let raw = match doc.attr(node, "data-mw-variant") {
        Some(raw) => raw,
        None => {
            state.env.warn(
                "html2wt/variant",
                "language-variant node without data-mw-variant dropped",
            );

            return Ok(());
        }
    };

    let mut dmwv: Map<String, Value> = match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            state.env.warn(
                "html2wt/variant",
                "unparsable data-mw-variant payload dropped",
            );

            return Ok(());
        }
    };

    // Legacy shapes. The unidirectional fallback reads `unidir`; the
    // field is spelled that way in the payload spec.
    if let Some(rules) = dmwv.remove("bidir") {
        dmwv.entry("twoway".to_string()).or_insert(rules);
    }

    if let Some(rules) = dmwv.remove("unidir") {
        dmwv.entry("oneway".to_string()).or_insert(rules);
    }

    let (original_flags, fl_sp, t_sp) = match doc.data_parsoid(node) {
        Some(dp) => (dp.fl.clone(), dp.fl_sp.clone(), dp.t_sp.clone()),
        None => (Vec::new(), Vec::new(), Vec::new()),
    };

    // Explicit flags from the payload keys.
    let mut flags: Vec<String> = Vec::new();
    let add = |flags: &mut Vec<String>, code: &str| {
        if !flags.iter().any(|f| f == code) {
            flags.push(code.to_string());
        }
    };

    for key in dmwv.keys() {
        if let Some(code) = state.env.site().lc_flag_code(key) {
            add(&mut flags, code);
        }
    }

    // The raw and language-name bodies imply their flag.
    if dmwv.contains_key("disabled") {
        add(&mut flags, "R");
    }

    if dmwv.contains_key("name") {
        add(&mut flags, "N");
    }

    if let Some(filter) = dmwv.get("filter") {
        // A language filter owns the flag position; real flags on top
        // of it have no wikitext representation.
        assert!(
            flags.is_empty(),
            "language-variant filter cannot carry conversion flags"
        );

        let langs: Vec<String> = filter
            .get("l")
            .and_then(Value::as_array)
            .map(|langs| {
                langs
                    .iter()
                    .filter_map(Value::as_str)
                    .map(protect_lang_code)
                    .collect()
            })
            .unwrap_or_default();
        let text = convert_body_text(state, filter.get("t"));

        emit_variant(state, &langs.join(";"), &text);

        return Ok(());
    }

    // Implicit flags.
    if !doc.is_element_named(node, "meta") {
        add(&mut flags, "$S");
    }

    if !flags.iter().any(|f| f == "$S" || f == "T") {
        add(&mut flags, "H");
    }

    canonicalize_flags(&mut flags, &original_flags);

    // Original source order first, newly introduced flags after.
    flags.sort_by_key(|f| {
        original_flags
            .iter()
            .position(|orig| orig == f)
            .unwrap_or(usize::MAX)
    });

    let flag_str = flags
        .iter()
        .enumerate()
        .map(|(i, flag)| {
            format!(
                "{}{}{}",
                expand_sp(&fl_sp, 2 * i),
                flag,
                expand_sp(&fl_sp, 2 * i + 1)
            )
        })
        .collect::<Vec<_>>()
        .join(";");

    let body = serialize_body(state, &dmwv, &t_sp);

    emit_variant(state, &flag_str, &body);

    Ok(())
}

fn emit_variant(state: &mut SerializerState<'_>, flag_str: &str, body: &str) {
    let chunk = if flag_str.is_empty() {
        format!("-{{{}}}-", body)
    } else {
        format!("-{{{}|{}}}-", flag_str, body)
    };

    state.emit_constrained(&chunk);
}

/// The fixed flag-combination table. Deletions marked "maybe" happen
/// only when the flag was absent from the original source.
fn canonicalize_flags(flags: &mut Vec<String>, original: &[String]) {
    let has = |flags: &[String], f: &str| flags.iter().any(|x| x == f);
    let delete = |flags: &mut Vec<String>, f: &str| flags.retain(|x| x != f);
    let maybe_delete = |flags: &mut Vec<String>, f: &str| {
        if !original.iter().any(|x| x == f) {
            flags.retain(|x| x != f);
        }
    };
    let push = |flags: &mut Vec<String>, f: &str| {
        if !flags.iter().any(|x| x == f) {
            flags.push(f.to_string());
        }
    };

    if flags.len() == 1 && has(flags, "$S") {
        maybe_delete(flags, "$S");
    }

    if has(flags, "D") && has(flags, "$S") && has(flags, "A") {
        push(flags, "H");
        delete(flags, "A");
    }

    if has(flags, "D") && !has(flags, "$S") {
        push(flags, "A");
        delete(flags, "H");
    }

    if has(flags, "T") && has(flags, "A") && !has(flags, "$S") {
        delete(flags, "A");
        push(flags, "H");
    }

    if has(flags, "A") && has(flags, "$S") {
        maybe_delete(flags, "$S");
    }

    if has(flags, "A") && has(flags, "H") {
        maybe_delete(flags, "A");
    }

    if has(flags, "R") || has(flags, "N") {
        maybe_delete(flags, "$S");
    }

    if has(flags, "-") {
        maybe_delete(flags, "H");
    }
}

fn serialize_body(
    state: &mut SerializerState<'_>,
    dmwv: &Map<String, Value>,
    t_sp: &[Value],
) -> String {
    if let Some(body) = dmwv.get("disabled").or_else(|| dmwv.get("name")) {
        return convert_body_text(state, body.get("t"));
    }

    if let Some(rules) = dmwv.get("twoway").and_then(Value::as_array) {
        let mut out: Vec<String> = Vec::new();

        for (i, rule) in rules.iter().enumerate() {
            let lang = protect_lang_code(rule.get("l").and_then(Value::as_str).unwrap_or(""));
            let text = convert_body_text(state, rule.get("t"));

            out.push(format!(
                "{}{}{}:{}{}",
                expand_sp(t_sp, 3 * i),
                lang,
                expand_sp(t_sp, 3 * i + 1),
                expand_sp(t_sp, 3 * i + 2),
                text
            ));
        }

        let mut body = out.join(";");

        if t_sp.len() == 3 * rules.len() + 1 {
            body.push(';');
            body.push_str(&expand_sp(t_sp, 3 * rules.len()));
        }

        return body;
    }

    if let Some(rules) = dmwv.get("oneway").and_then(Value::as_array) {
        let mut out: Vec<String> = Vec::new();

        for (i, rule) in rules.iter().enumerate() {
            let from = convert_body_text(state, rule.get("f"));
            let lang = protect_lang_code(rule.get("l").and_then(Value::as_str).unwrap_or(""));
            let to = convert_body_text(state, rule.get("t"));

            out.push(format!(
                "{}{}{}=>{}{}:{}{}",
                expand_sp(t_sp, 4 * i),
                from,
                expand_sp(t_sp, 4 * i + 1),
                expand_sp(t_sp, 4 * i + 2),
                lang,
                expand_sp(t_sp, 4 * i + 3),
                to
            ));
        }

        let mut body = out.join(";");

        if t_sp.len() == 4 * rules.len() + 1 {
            body.push(';');
            body.push_str(&expand_sp(t_sp, 4 * rules.len()));
        }

        return body;
    }

    state.env.warn(
        "html2wt/variant",
        "data-mw-variant payload without a recognized body shape",
    );

    String::new()
}

/// Body text arrives as an HTML fragment string; anything with markup
/// is routed back through the wikitext serializer.
fn convert_body_text(state: &mut SerializerState<'_>, value: Option<&Value>) -> String {
    let text = match value {
        Some(Value::String(s)) => {
            if s.contains('<') {
                match Document::from_xhtml(s) {
                    Ok(mut fragment) => {
                        serialize_dom(state.env, &mut fragment, SerializeOpts::default())
                            .unwrap_or_else(|_| s.clone())
                    }
                    Err(_) => {
                        state.env.warn(
                            "html2wt/variant",
                            format!("unparsable variant body fragment: {:?}", s),
                        );

                        s.clone()
                    }
                }
            } else {
                s.clone()
            }
        }
        _ => String::new(),
    };

    protect_body_text(&text)
}

/// `}-` inside the body would close the construct early.
fn protect_body_text(text: &str) -> String {
    text.replace("}-", "<nowiki>}-</nowiki>")
}

fn protect_lang_code(code: &str) -> String {
    if VALID_LANG_CODE.is_match(code) {
        code.to_string()
    } else {
        format!("<nowiki>{}</nowiki>", code)
    }
}

/// Expands one slot of a run-length encoded whitespace array: numbers
/// are space counts, strings are literal runs.
fn expand_sp(sp: &[Value], idx: usize) -> String {
    match sp.get(idx) {
        Some(Value::Number(n)) => {
            let count = n.as_u64().unwrap_or(0) as usize;

            " ".repeat(count)
        }
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Env;

    fn wt(html: &str) -> String {
        let env = Env::default();
        let mut doc = Document::from_xhtml(html).unwrap();

        serialize_dom(&env, &mut doc, SerializeOpts::default()).unwrap()
    }

    #[test]
    fn twoway_span_drops_the_implicit_show_flag() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"twoway":[{"l":"zh-hans","t":"X"},{"l":"zh-hant","t":"Y"}]}' "#,
                r#"data-parsoid='{"fl":{},"flSp":[],"tSp":[]}'></span>"#
            )),
            "-{zh-hans:X;zh-hant:Y}-"
        );
    }

    #[test]
    fn hidden_twoway_meta_gets_the_h_flag() {
        assert_eq!(
            wt(concat!(
                r#"<meta typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"twoway":[{"l":"zh","t":"X"}]}'/>"#
            )),
            "-{H|zh:X}-"
        );
    }

    #[test]
    fn disabled_body_round_trips_as_raw() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"disabled":{"t":"raw text"}}' "#,
                r#"data-parsoid='{"fl":["R"]}'></span>"#
            )),
            "-{R|raw text}-"
        );

        // Even without recorded flags the raw body implies R.
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"disabled":{"t":"raw"}}'></span>"#
            )),
            "-{R|raw}-"
        );
    }

    #[test]
    fn name_body_implies_n() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"name":{"t":"zh"}}' "#,
                r#"data-parsoid='{"fl":["N"]}'></span>"#
            )),
            "-{N|zh}-"
        );
    }

    #[test]
    fn oneway_rules() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"oneway":[{"f":"from","l":"zh-tw","t":"to"}]}' "#,
                r#"data-parsoid='{"fl":[]}'></span>"#
            )),
            "-{from=>zh-tw:to}-"
        );
    }

    #[test]
    fn legacy_unidir_normalizes_to_oneway() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"unidir":[{"f":"a","l":"zh","t":"b"}]}'></span>"#
            )),
            "-{a=>zh:b}-"
        );
    }

    #[test]
    fn legacy_bidir_normalizes_to_twoway() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"bidir":[{"l":"zh","t":"X"}]}'></span>"#
            )),
            "-{zh:X}-"
        );
    }

    #[test]
    fn filter_restricts_languages() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"filter":{"l":["zh-cn","zh-tw"],"t":"shown"}}'></span>"#
            )),
            "-{zh-cn;zh-tw|shown}-"
        );
    }

    #[test]
    fn stored_whitespace_is_reinserted() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"twoway":[{"l":"zh-hans","t":"X"}]}' "#,
                r#"data-parsoid='{"fl":[],"tSp":[1,1,1]}'></span>"#
            )),
            "-{ zh-hans : X}-"
        );
    }

    #[test]
    fn trailing_semicolon_slot() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"twoway":[{"l":"zh","t":"X"}]}' "#,
                r#"data-parsoid='{"fl":[],"tSp":[0,0,0,1]}'></span>"#
            )),
            "-{zh:X; }-"
        );
    }

    #[test]
    fn flag_whitespace_round_trips() {
        assert_eq!(
            wt(concat!(
                r#"<meta typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"hidden":{},"twoway":[{"l":"zh","t":"X"}]}' "#,
                r#"data-parsoid='{"fl":["H"],"flSp":[1,1]}'/>"#
            )),
            "-{ H |zh:X}-"
        );
    }

    #[test]
    fn suspicious_language_codes_are_protected() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"twoway":[{"l":"ZH_x","t":"X"}]}'></span>"#
            )),
            "-{<nowiki>ZH_x</nowiki>:X}-"
        );
    }

    #[test]
    fn body_text_protects_the_closer() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"disabled":{"t":"a}-b"}}'></span>"#
            )),
            "-{R|a<nowiki>}-</nowiki>b}-"
        );
    }

    #[test]
    fn markup_bodies_are_reserialized() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"twoway":[{"l":"zh","t":"a<span typeof=\"mw:Placeholder\" "#,
                r#"data-parsoid=&#39;{\"src\":\"[[X\"}&#39;></span>"}]}'></span>"#
            )),
            "-{zh:a[[X}-"
        );
    }

    #[test]
    fn describe_show_add_combination() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"describe":{},"add":{},"showflag":{},"twoway":[{"l":"zh","t":"X"}]}' "#,
                r#"data-parsoid='{"fl":["D","$S","A"]}'></span>"#
            )),
            "-{D;$S;H|zh:X}-"
        );
    }

    #[test]
    fn add_hidden_combination_round_trips() {
        assert_eq!(
            wt(concat!(
                r#"<span typeof="mw:LanguageVariant" "#,
                r#"data-mw-variant='{"add":{},"hidden":{},"twoway":[{"l":"zh","t":"X"}]}' "#,
                r#"data-parsoid='{"fl":["A","H"]}'></span>"#
            )),
            "-{A;H|zh:X}-"
        );
    }
}
