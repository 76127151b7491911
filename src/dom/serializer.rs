//! XHTML-compatible serializer for annotated documents, with optional
//! per-element byte-offset capture for the page bundle.

use super::parse::{is_raw_content_element, is_void_element};
use super::{Document, NodeId, NodeKind};
use std::collections::HashMap;

/// Elements that drop a leading U+000A on re-parse; serialization has
/// to double it to survive the round trip.
static NEWLINE_STRIPPING_ELEMENTS: &[&str] = &["pre", "textarea", "listing"];

#[derive(Debug, Copy, Clone)]
pub struct XmlSerializerOpts {
    /// Choose the attribute quote character that needs the fewest
    /// escapes.
    pub smart_quote: bool,
    /// Serialize only the children of the given node.
    pub inner_xml: bool,
    /// Record byte ranges of direct `<body>` children keyed by their
    /// `id` attribute.
    pub capture_offsets: bool,
}

impl Default for XmlSerializerOpts {
    fn default() -> Self {
        XmlSerializerOpts {
            smart_quote: true,
            inner_xml: false,
            capture_offsets: false,
        }
    }
}

#[derive(Debug)]
pub struct XmlSerializerOutput {
    pub html: String,
    /// Present when `capture_offsets` was requested. Ranges are UTF-8
    /// byte offsets relative to the end of the `<body>` open tag.
    pub offsets: Option<HashMap<String, [usize; 2]>>,
}

pub fn serialize(doc: &Document, node: NodeId, opts: &XmlSerializerOpts) -> XmlSerializerOutput {
    let mut acc = Accumulator {
        html: String::new(),
        offsets: if opts.capture_offsets {
            Some(HashMap::new())
        } else {
            None
        },
    };

    if opts.inner_xml {
        for &child in doc.children(node) {
            serialize_node(&mut acc, doc, child, opts, false);
        }
    } else {
        if doc.tag_name(node) == Some("html") {
            acc.html.push_str("<!DOCTYPE html>\n");
        }

        serialize_node(&mut acc, doc, node, opts, false);
    }

    XmlSerializerOutput {
        html: acc.html,
        offsets: acc.offsets,
    }
}

struct Accumulator {
    html: String,
    offsets: Option<HashMap<String, [usize; 2]>>,
}

fn serialize_node(
    acc: &mut Accumulator,
    doc: &Document,
    node: NodeId,
    opts: &XmlSerializerOpts,
    raw_content: bool,
) {
    match doc.kind(node) {
        NodeKind::Document => {
            for &child in doc.children(node) {
                serialize_node(acc, doc, child, opts, false);
            }
        }
        NodeKind::Element(_) => serialize_element(acc, doc, node, opts),
        NodeKind::Text(text) => {
            if raw_content {
                acc.html.push_str(text);
            } else {
                escape_text_into(&mut acc.html, text);
            }
        }
        NodeKind::Comment(data) => {
            // Comment data is pre-escaped by the caller.
            acc.html.push_str("<!--");
            acc.html.push_str(data);
            acc.html.push_str("-->");
        }
    }
}

fn serialize_element(acc: &mut Accumulator, doc: &Document, node: NodeId, opts: &XmlSerializerOpts) {
    let name = doc.tag_name(node).unwrap();

    acc.html.push('<');
    acc.html.push_str(name);

    for attr in doc.attrs(node) {
        let quote = if opts.smart_quote {
            pick_quote(&attr.value)
        } else {
            '"'
        };

        acc.html.push(' ');
        acc.html.push_str(&attr.name);
        acc.html.push('=');
        acc.html.push(quote);
        escape_attr_into(&mut acc.html, &attr.value, quote);
        acc.html.push(quote);
    }

    let children = doc.children(node);

    if children.is_empty() && is_void_element(name) {
        acc.html.push_str("/>");
        return;
    }

    acc.html.push('>');

    if NEWLINE_STRIPPING_ELEMENTS.contains(&name) {
        if let Some(&first) = children.first() {
            if doc
                .text_content(first)
                .map(|t| t.starts_with('\n'))
                .unwrap_or(false)
            {
                acc.html.push('\n');
            }
        }
    }

    if name == "body" && acc.offsets.is_some() {
        serialize_body_children(acc, doc, node, opts);
    } else {
        let raw_content = is_raw_content_element(name);

        for &child in children {
            serialize_node(acc, doc, child, opts, raw_content);
        }
    }

    acc.html.push_str("</");
    acc.html.push_str(name);
    acc.html.push('>');
}

fn serialize_body_children(
    acc: &mut Accumulator,
    doc: &Document,
    body: NodeId,
    opts: &XmlSerializerOpts,
) {
    let base = acc.html.len();
    let mut last: Option<(String, String)> = None; // (about, uid)

    for &child in doc.children(body) {
        let start = acc.html.len() - base;

        serialize_node(acc, doc, child, opts, false);

        let end = acc.html.len() - base;

        if !doc.is_element(child) {
            continue;
        }

        // An encapsulation wrapper's id covers all of its
        // about-siblings.
        let uid = match doc.attr(child, "id") {
            Some(id) => Some(id.to_string()),
            None => match (doc.about(child), &last) {
                (Some(about), Some((last_about, last_uid))) if about == last_about => {
                    Some(last_uid.clone())
                }
                _ => None,
            },
        };

        let uid = match uid {
            Some(uid) => uid,
            None => {
                last = None;
                continue;
            }
        };

        let offsets = acc.offsets.as_mut().unwrap();

        offsets
            .entry(uid.clone())
            .and_modify(|range| range[1] = end)
            .or_insert([start, end]);

        last = doc.about(child).map(|about| (about.to_string(), uid));
    }
}

fn pick_quote(value: &str) -> char {
    let mut single = 0usize;
    let mut double = 0usize;

    for ch in value.chars() {
        match ch {
            '\'' => single += 1,
            '"' => double += 1,
            _ => (),
        }
    }

    if double > single {
        '\''
    } else {
        '"'
    }
}

fn escape_text_into(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr_into(out: &mut String, value: &str, quote: char) {
    for ch in value.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '&' => out.push_str("&amp;"),
            '"' if quote == '"' => out.push_str("&quot;"),
            '\'' if quote == '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serialize_fragment(input: &str) -> String {
        let doc = Document::from_xhtml(input).unwrap();

        serialize(&doc, doc.root(), &XmlSerializerOpts::default()).html
    }

    #[test]
    fn voids_self_close_and_tolerate_children() {
        assert_eq!(serialize_fragment("<p>a<br/>b</p>"), "<p>a<br/>b</p>");

        let mut doc = Document::new();
        let br = doc.create_element("br");
        let text = doc.create_text("x");

        doc.append(doc.root(), br);
        doc.append(br, text);

        let out = serialize(&doc, doc.root(), &XmlSerializerOpts::default());

        assert_eq!(out.html, "<br>x</br>");
    }

    #[test]
    fn text_escaping_is_minimal() {
        let mut doc = Document::new();
        let p = doc.create_element("p");
        let text = doc.create_text("a < b & c > d");

        doc.append(doc.root(), p);
        doc.append(p, text);

        let out = serialize(&doc, doc.root(), &XmlSerializerOpts::default());

        assert_eq!(out.html, "<p>a &lt; b &amp; c > d</p>");
    }

    #[test]
    fn raw_content_is_emitted_verbatim() {
        let mut doc = Document::new();
        let script = doc.create_element("script");
        let code = doc.create_text("if (a < b && c) { x(); }");

        doc.append(doc.root(), script);
        doc.append(script, code);

        let out = serialize(&doc, doc.root(), &XmlSerializerOpts::default());

        assert_eq!(out.html, "<script>if (a < b && c) { x(); }</script>");
    }

    #[test]
    fn leading_newline_is_preserved_across_reparse() {
        let mut doc = Document::new();
        let pre = doc.create_element("pre");
        let text = doc.create_text("\nfoo");

        doc.append(doc.root(), pre);
        doc.append(pre, text);

        let out = serialize(&doc, doc.root(), &XmlSerializerOpts::default());

        assert_eq!(out.html, "<pre>\n\nfoo</pre>");
    }

    #[test]
    fn smart_quote_picks_the_cheaper_quote() {
        let mut doc = Document::new();
        let el = doc.create_element_with_attrs(
            "span",
            &[("a", r#"say "hi""#), ("b", "it's"), ("c", r#"'"mixed"'"#)],
        );

        doc.append(doc.root(), el);

        let out = serialize(&doc, doc.root(), &XmlSerializerOpts::default());

        assert_eq!(
            out.html,
            r#"<span a='say "hi"' b="it's" c="'&quot;mixed&quot;'"></span>"#
        );

        // The chosen style never produces more escapes than the other
        // would.
        for value in &[r#"say "hi""#, "it's", r#"'"mixed"'"#, "plain"] {
            let quote = pick_quote(value);
            let own = value.chars().filter(|&c| c == quote).count();
            let other = value
                .chars()
                .filter(|&c| c == if quote == '"' { '\'' } else { '"' })
                .count();

            assert!(own <= other, "suboptimal quote for {:?}", value);
        }
    }

    #[test]
    fn no_smart_quote_forces_double_quotes() {
        let mut doc = Document::new();
        let el = doc.create_element_with_attrs("span", &[("a", r#"say "hi""#)]);

        doc.append(doc.root(), el);

        let out = serialize(
            &doc,
            doc.root(),
            &XmlSerializerOpts {
                smart_quote: false,
                ..XmlSerializerOpts::default()
            },
        );

        assert_eq!(out.html, r#"<span a="say &quot;hi&quot;"></span>"#);
    }

    #[test]
    fn doctype_on_html_root_only() {
        let doc = Document::from_xhtml("<html><body>x</body></html>").unwrap();
        let html = doc.children(doc.root())[0];

        let out = serialize(&doc, html, &XmlSerializerOpts::default());

        assert_eq!(out.html, "<!DOCTYPE html>\n<html><body>x</body></html>");

        let inner = serialize(
            &doc,
            html,
            &XmlSerializerOpts {
                inner_xml: true,
                ..XmlSerializerOpts::default()
            },
        );

        assert_eq!(inner.html, "<body>x</body>");
    }

    #[test]
    fn captures_body_child_offsets() {
        let doc = Document::from_xhtml(concat!(
            "<html><body>",
            r#"<p id="mwAa">ab</p>"#,
            r##"<p about="#mwt1" typeof="mw:Transclusion" id="mwAb">x</p>"##,
            r##"<p about="#mwt1">y</p>"##,
            r#"<p>anon</p>"#,
            "</body></html>"
        ))
        .unwrap();
        let html = doc.children(doc.root())[0];

        let out = serialize(
            &doc,
            html,
            &XmlSerializerOpts {
                capture_offsets: true,
                ..XmlSerializerOpts::default()
            },
        );
        let offsets = out.offsets.unwrap();
        let body_base = out.html.find("<body>").unwrap() + "<body>".len();
        let wrapper_start = out.html.find(r##"<p about="#mwt1" typeof"##).unwrap() - body_base;
        let last_start = out.html.find("<p>anon").unwrap() - body_base;

        assert_eq!(offsets["mwAa"], [0, wrapper_start]);

        // The wrapper range extends over its about-sibling.
        assert_eq!(offsets["mwAb"], [wrapper_start, last_start]);
        assert_eq!(offsets.len(), 2);
    }

    #[test]
    fn offsets_are_utf8_byte_counted() {
        let doc = Document::from_xhtml(concat!(
            "<html><body>",
            r#"<p id="a">€€</p>"#,
            r#"<p id="b">x</p>"#,
            "</body></html>"
        ))
        .unwrap();
        let html = doc.children(doc.root())[0];

        let out = serialize(
            &doc,
            html,
            &XmlSerializerOpts {
                capture_offsets: true,
                ..XmlSerializerOpts::default()
            },
        );
        let offsets = out.offsets.unwrap();

        // `<p id="a">` + two three-byte euro signs + `</p>`
        assert_eq!(offsets["b"][0], offsets["a"][0] + 10 + 6 + 4);
    }

    #[test]
    fn reparse_is_isomorphic() {
        let fixtures = [
            r#"<p class="a">x<b>y</b><br/></p>"#,
            "<pre>\n\nkeep</pre>",
            r#"<span data-mw='{"a":"b"}'>t &amp; u</span><!--c-->"#,
        ];

        for fixture in &fixtures {
            let doc = Document::from_xhtml(fixture).unwrap();
            let once = serialize(&doc, doc.root(), &XmlSerializerOpts::default()).html;
            let redoc = Document::from_xhtml(&once).unwrap();
            let twice = serialize(&redoc, redoc.root(), &XmlSerializerOpts::default()).html;

            assert_eq!(once, twice, "unstable serialization for {:?}", fixture);
        }
    }
}
