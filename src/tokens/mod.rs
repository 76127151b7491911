mod attributes;

use crate::base::SourceRange;
use once_cell::sync::Lazy;
use regex::Regex;

pub use self::attributes::{Kv, KvSourceOffsets, KvValue};

/// Meta `typeof` values the attribute expander must leave untouched:
/// they carry encapsulation or source-range bookkeeping of their own.
static RESERVED_META_TYPEOF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^mw:(TSRMarker|Placeholder|Transclusion|Param|Includes)(/|$)").unwrap()
});

/// Metas that open or close template encapsulation. None of these may
/// survive inside an element's attributes.
static ENCAPSULATION_META_TYPEOF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^mw:(Transclusion|Param|Includes)(/|$)").unwrap());

/// The subset of encapsulation metas that *start* a transclusion and are
/// hoisted out of attributes in front of their element.
static ENCAPSULATION_START_TYPEOF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^mw:(Transclusion|Param)(/|$)").unwrap());

static INCLUDES_TYPEOF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^mw:Includes(/|$)").unwrap());

/// Source-range and syntax bookkeeping attached to a tag token.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataAttribs {
    /// Token source range into the frame.
    pub tsr: Option<SourceRange>,
    /// Syntax hint (`"html"` for literal HTML tags in the wikitext).
    pub stx: Option<String>,
    /// Original source of the token, when it has to be re-emitted verbatim.
    pub src: Option<String>,
    /// Source run between an element and a meta hoisted out of it.
    pub unwrapped_wt: Option<String>,
    /// Name of the first wikitext node following a hoisted meta.
    pub first_wikitext_node: Option<String>,
    /// Scratch area; never serialized.
    pub tmp: TagTmp,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagTmp {
    /// Expanded-attribute payload stashed for the template handler.
    pub templated_attribs: Option<serde_json::Value>,
}

/// An element start/end/void marker with its ordered attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub attribs: Vec<Kv>,
    pub data: DataAttribs,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Tag {
            name: name.into(),
            attribs: Vec::new(),
            data: DataAttribs::default(),
        }
    }

    pub fn with_attribs(name: impl Into<String>, attribs: Vec<Kv>) -> Self {
        Tag {
            name: name.into(),
            attribs,
            data: DataAttribs::default(),
        }
    }

    /// String value of a plain (non-tokenized) attribute.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attribs.iter().find_map(|kv| match (&kv.k, &kv.v) {
            (KvValue::String(k), KvValue::String(v)) if k == name => Some(v.as_str()),
            _ => None,
        })
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attribs
            .iter()
            .any(|kv| matches!(&kv.k, KvValue::String(k) if k == name))
    }

    /// Sets a plain attribute, replacing an existing one of the same name.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();

        for kv in &mut self.attribs {
            if matches!(&kv.k, KvValue::String(k) if k == name) {
                kv.v = KvValue::String(value);
                return;
            }
        }

        self.attribs.push(Kv::new(name, value));
    }

    /// Appends a space-separated token to the `typeof` attribute.
    pub fn add_typeof(&mut self, value: &str) {
        let merged = match self.attr("typeof") {
            Some(existing) if !existing.is_empty() => format!("{} {}", existing, value),
            _ => value.to_string(),
        };

        self.set_attr("typeof", merged);
    }

    pub fn typeof_contains(&self, value: &str) -> bool {
        self.attr("typeof")
            .map(|t| t.split_ascii_whitespace().any(|v| v == value))
            .unwrap_or(false)
    }

    fn typeof_matches(&self, re: &Regex) -> bool {
        self.attr("typeof")
            .map(|t| t.split_ascii_whitespace().any(|v| re.is_match(v)))
            .unwrap_or(false)
    }

    pub fn is_meta(&self) -> bool {
        self.name == "meta"
    }

    pub fn has_reserved_meta_typeof(&self) -> bool {
        self.is_meta() && self.typeof_matches(&RESERVED_META_TYPEOF)
    }

    pub fn is_encapsulation_meta(&self) -> bool {
        self.is_meta() && self.typeof_matches(&ENCAPSULATION_META_TYPEOF)
    }

    pub fn is_encapsulation_start_meta(&self) -> bool {
        self.is_meta()
            && self.typeof_matches(&ENCAPSULATION_START_TYPEOF)
            && !self
                .attr("typeof")
                .map(|t| t.split_ascii_whitespace().any(|v| v.ends_with("/End")))
                .unwrap_or(false)
    }

    pub fn is_includes_meta(&self) -> bool {
        self.is_meta() && self.typeof_matches(&INCLUDES_TYPEOF)
    }

    pub fn is_includes_end_meta(&self) -> bool {
        self.is_meta()
            && self
                .attr("typeof")
                .map(|t| {
                    t.split_ascii_whitespace()
                        .any(|v| INCLUDES_TYPEOF.is_match(v) && v.ends_with("/End"))
                })
                .unwrap_or(false)
    }
}

/// A single token of the stream the tokenizer hands to the expansion
/// passes.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    StartTag(Tag),
    EndTag(Tag),
    SelfClosing(Tag),
    Text(String),
    Newline,
    Comment(String),
    Eof,
}

impl Token {
    pub fn tag(&self) -> Option<&Tag> {
        match self {
            Token::StartTag(tag) | Token::EndTag(tag) | Token::SelfClosing(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn tag_mut(&mut self) -> Option<&mut Tag> {
        match self {
            Token::StartTag(tag) | Token::EndTag(tag) | Token::SelfClosing(tag) => Some(tag),
            _ => None,
        }
    }

    pub fn is_newline(&self) -> bool {
        matches!(self, Token::Newline)
    }

    pub fn text(s: impl Into<String>) -> Self {
        Token::Text(s.into())
    }
}

/// Flattens a token run back to source text. Tags contribute their
/// recorded `src`; tokens with no source representation contribute
/// nothing.
pub fn tokens_to_string(tokens: &[Token]) -> String {
    let mut out = String::new();

    for token in tokens {
        match token {
            Token::Text(s) => out.push_str(s),
            Token::Newline => out.push('\n'),
            Token::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            Token::StartTag(tag) | Token::EndTag(tag) | Token::SelfClosing(tag) => {
                if let Some(src) = &tag.data.src {
                    out.push_str(src);
                }
            }
            Token::Eof => (),
        }
    }

    out
}

/// Collapses a token run to a plain string when it consists of text
/// only.
pub fn to_plain_string(tokens: &[Token]) -> Option<String> {
    let mut out = String::new();

    for token in tokens {
        match token {
            Token::Text(s) => out.push_str(s),
            _ => return None,
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_with_typeof(t: &str) -> Tag {
        let mut tag = Tag::new("meta");

        tag.set_attr("typeof", t);

        tag
    }

    #[test]
    fn typeof_classification() {
        assert!(meta_with_typeof("mw:Transclusion").is_encapsulation_start_meta());
        assert!(meta_with_typeof("mw:Param").is_encapsulation_start_meta());
        assert!(!meta_with_typeof("mw:Transclusion/End").is_encapsulation_start_meta());
        assert!(meta_with_typeof("mw:Transclusion/End").is_encapsulation_meta());
        assert!(meta_with_typeof("mw:Includes/IncludeOnly").is_encapsulation_meta());
        assert!(!meta_with_typeof("mw:Placeholder").is_encapsulation_meta());
        assert!(meta_with_typeof("mw:Placeholder").has_reserved_meta_typeof());
        assert!(meta_with_typeof("mw:TSRMarker").has_reserved_meta_typeof());
        assert!(!meta_with_typeof("mw:ExpandedAttrs").has_reserved_meta_typeof());
        assert!(!meta_with_typeof("mw:TransclusionX").is_encapsulation_meta());
    }

    #[test]
    fn typeof_accumulates_space_separated() {
        let mut tag = Tag::new("td");

        tag.add_typeof("mw:ExpandedAttrs");
        assert_eq!(tag.attr("typeof"), Some("mw:ExpandedAttrs"));

        tag.add_typeof("mw:Transclusion");
        assert_eq!(tag.attr("typeof"), Some("mw:ExpandedAttrs mw:Transclusion"));
        assert!(tag.typeof_contains("mw:ExpandedAttrs"));
        assert!(tag.typeof_contains("mw:Transclusion"));
        assert!(!tag.typeof_contains("mw:Expanded"));
    }

    #[test]
    fn token_flattening() {
        let mut tpl = Tag::new("template");

        tpl.data.src = Some("{{1x|foo}}".to_string());

        let tokens = vec![
            Token::text("a "),
            Token::SelfClosing(tpl),
            Token::Newline,
            Token::Comment("hi".to_string()),
        ];

        assert_eq!(tokens_to_string(&tokens), "a {{1x|foo}}\n<!--hi-->");
        assert_eq!(to_plain_string(&tokens), None);
        assert_eq!(
            to_plain_string(&[Token::text("a"), Token::text("b")]),
            Some("ab".to_string())
        );
    }
}
