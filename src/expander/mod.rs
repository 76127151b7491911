//! Post-expansion attribute cleanup: converts attributes that still
//! carry token runs into plain strings where possible, hoists
//! encapsulation metas out of attributes so round-trip wrapping stays
//! correct, and records template provenance in `data-mw`.

use crate::base::{CancellationToken, SourceRange};
use crate::env::Env;
use crate::errors::ExpansionError;
use crate::frame::Frame;
use crate::tokens::{to_plain_string, tokens_to_string, Kv, KvValue, Tag, Token};
use failure::Error;
use serde_json::{json, Value};

/// Re-entry budget of the token manager; exceeding it reports an
/// expansion-limit failure.
pub const MAX_EXPANSION_RETRIES: u32 = 40;

static TABLE_SYNTAX_TAGS: &[&str] = &["table", "caption", "tr", "td", "th"];

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TokenizeRule {
    GenericNewlineAttributes,
    TableAttributes,
}

/// The PEG tokenizer collaborator.
pub trait AttributeTokenizer {
    /// Re-tokenizes a source run under the named rule.
    fn tokenize_as(&self, src: &str, rule: TokenizeRule, sol: bool) -> Option<Vec<Token>>;

    /// Attribute-rule projection of [`tokenize_as`]: the two attribute
    /// rules yield attribute lists rather than token streams.
    ///
    /// [`tokenize_as`]: AttributeTokenizer::tokenize_as
    fn tokenize_attrs(&self, src: &str, rule: TokenizeRule, sol: bool) -> Option<Vec<Kv>>;
}

/// The host pipeline that turns a token run into a serialized DOM
/// fragment for the `data-mw.attribs` payload.
pub trait FragmentExpander {
    fn expand_to_html(&self, tokens: &[Token], frame: &Frame) -> Result<String, Error>;
}

/// Rewrite produced by a token handler. `retry` asks the manager to
/// re-run the pass over the returned tokens, since hoisting may have
/// revealed further templates.
#[derive(Debug)]
pub struct TokenHandlerResult {
    pub tokens: Vec<Token>,
    pub retry: bool,
}

impl TokenHandlerResult {
    fn passthrough(token: Token) -> Self {
        TokenHandlerResult {
            tokens: vec![token],
            retry: false,
        }
    }
}

pub struct AttributeExpander<'a, T, F> {
    env: &'a Env,
    frame: &'a Frame,
    tokenizer: &'a T,
    fragment_expander: &'a F,
}

/// Provenance collected for one attribute while its sides are
/// processed.
struct TmpMwEntry {
    key_txt: String,
    key_html: Option<Vec<Token>>,
    key_offsets: Option<SourceRange>,
    value_html: ValueHtml,
    value_offsets: Option<SourceRange>,
}

enum ValueHtml {
    Tokens(Vec<Token>),
    /// The reparse scenario: the value carries no independent
    /// provenance and is recorded as an empty array.
    None,
}

impl<'a, T: AttributeTokenizer, F: FragmentExpander> AttributeExpander<'a, T, F> {
    pub fn new(env: &'a Env, frame: &'a Frame, tokenizer: &'a T, fragment_expander: &'a F) -> Self {
        AttributeExpander {
            env,
            frame,
            tokenizer,
            fragment_expander,
        }
    }

    /// Runs the pass over a whole stream, honoring `retry` re-entry up
    /// to [`MAX_EXPANSION_RETRIES`].
    pub fn expand(
        &self,
        tokens: Vec<Token>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Token>, Error> {
        expand_stream(|token| self.on_any(token), tokens, cancel, MAX_EXPANSION_RETRIES)
    }

    /// Processes a single token. Tokens without attributes and metas
    /// from the reserved `typeof` set pass through untouched.
    pub fn on_any(&self, token: Token) -> TokenHandlerResult {
        match &token {
            Token::StartTag(tag) | Token::EndTag(tag) | Token::SelfClosing(tag) => {
                if tag.attribs.is_empty() || tag.has_reserved_meta_typeof() {
                    return TokenHandlerResult::passthrough(token);
                }

                let complex = tag.attribs.iter().any(|kv| {
                    matches!(kv.k, KvValue::Tokens(_)) || matches!(kv.v, KvValue::Tokens(_))
                });

                if !complex {
                    return TokenHandlerResult::passthrough(token);
                }
            }
            _ => return TokenHandlerResult::passthrough(token),
        }

        self.process_complex_attribs(token)
    }

    fn process_complex_attribs(&self, token: Token) -> TokenHandlerResult {
        let (mut tag, rebuild): (Tag, fn(Tag) -> Token) = match token {
            Token::StartTag(tag) => (tag, Token::StartTag),
            Token::EndTag(tag) => (tag, Token::EndTag),
            Token::SelfClosing(tag) => (tag, Token::SelfClosing),
            _ => unreachable!("attribute processing on a non-tag token"),
        };

        let is_html_tag = tag.data.stx.as_deref() == Some("html");
        let nl_forbidden = !is_html_tag && TABLE_SYNTAX_TAGS.contains(&tag.name.as_str());

        let mut hoisted: Vec<Token> = Vec::new();
        let mut post_nl: Vec<Token> = Vec::new();
        let mut tmp_mw: Vec<TmpMwEntry> = Vec::new();
        let mut new_attribs: Vec<Kv> = Vec::new();

        let attribs = std::mem::replace(&mut tag.attribs, Vec::new());

        for kv in attribs {
            let mut kv = kv;
            let orig_k_tokens = kv.k.tokens().map(|t| t.to_vec());
            let orig_v = kv.v.clone();
            let key_was_tokens = orig_k_tokens.is_some();
            let mut key_generated = false;
            let mut val_generated = false;

            kv.k = match std::mem::take(&mut kv.k) {
                KvValue::Tokens(ks) => {
                    let (stripped, generated) =
                        self.process_side(ks, &tag, nl_forbidden, &mut hoisted, &mut post_nl);

                    key_generated = generated;

                    collapse(stripped)
                }
                plain => plain,
            };

            // A key expansion with no value at all may actually be a
            // whole `k=v` run produced by the template; re-tokenize it
            // as an attribute list.
            if key_was_tokens && kv.v.is_empty() {
                let key_str = match &kv.k {
                    KvValue::String(s) => s.clone(),
                    KvValue::Tokens(ts) => tokens_to_string(ts),
                };
                let key_str = key_str.trim();

                if key_str.contains('=') {
                    let rule = if nl_forbidden {
                        TokenizeRule::TableAttributes
                    } else {
                        TokenizeRule::GenericNewlineAttributes
                    };

                    if let Some(kvs) = self.tokenizer.tokenize_attrs(key_str, rule, false) {
                        if !kvs.is_empty() {
                            trace!(@expand "reparsed `{}` into {} attributes", key_str, kvs.len());

                            let base = kv.src_offsets.map(|so| so.key.start());
                            let first_key_txt = kvs[0]
                                .k
                                .as_str()
                                .map(String::from)
                                .unwrap_or_else(|| key_str.to_string());

                            for mut new_kv in kvs {
                                if let (Some(base), Some(so)) = (base, new_kv.src_offsets.as_mut())
                                {
                                    so.key = SourceRange(so.key.0 + base, so.key.1 + base);
                                    so.value = SourceRange(so.value.0 + base, so.value.1 + base);
                                }

                                new_attribs.push(new_kv);
                            }

                            tmp_mw.push(TmpMwEntry {
                                key_txt: first_key_txt,
                                key_html: orig_k_tokens,
                                key_offsets: kv.src_offsets.map(|so| so.key),
                                value_html: ValueHtml::None,
                                value_offsets: kv.src_offsets.map(|so| so.value),
                            });

                            continue;
                        }
                    }
                }
            }

            kv.v = match std::mem::take(&mut kv.v) {
                KvValue::Tokens(vs) => {
                    let (stripped, generated) =
                        self.process_side(vs, &tag, nl_forbidden, &mut hoisted, &mut post_nl);

                    val_generated = generated;

                    collapse(stripped)
                }
                plain => plain,
            };

            if key_generated || val_generated {
                let key_txt = match &kv.k {
                    KvValue::String(s) => s.clone(),
                    KvValue::Tokens(ts) => tokens_to_string(ts),
                };
                let value_tokens = match orig_v {
                    KvValue::Tokens(ts) => ts,
                    KvValue::String(s) => vec![Token::Text(s)],
                };

                tmp_mw.push(TmpMwEntry {
                    key_txt,
                    key_html: if key_generated { orig_k_tokens } else { None },
                    key_offsets: kv.src_offsets.map(|so| so.key),
                    value_html: ValueHtml::Tokens(value_tokens),
                    value_offsets: kv.src_offsets.map(|so| so.value),
                });
            }

            new_attribs.push(kv);
        }

        tag.attribs = new_attribs;

        if !tmp_mw.is_empty() && tag.attr("about").is_none() {
            self.annotate(&mut tag, tmp_mw);
        }

        let retry = !hoisted.is_empty();
        let mut tokens = hoisted;

        tokens.push(rebuild(tag));
        tokens.extend(post_nl);

        TokenHandlerResult { tokens, retry }
    }

    /// Scenario 1 (newline split + meta hoist) and scenario 2 (meta
    /// strip) for one side of an attribute. Returns the cleaned tokens
    /// and whether any encapsulation meta was removed.
    fn process_side(
        &self,
        mut tokens: Vec<Token>,
        tag: &Tag,
        nl_forbidden: bool,
        hoisted: &mut Vec<Token>,
        post_nl: &mut Vec<Token>,
    ) -> (Vec<Token>, bool) {
        if nl_forbidden {
            if let Some(nl_pos) = newline_split_pos(&tokens) {
                let post = tokens.split_off(nl_pos);

                if let Some(idx) = tokens
                    .iter()
                    .position(|t| t.tag().map(Tag::is_encapsulation_start_meta).unwrap_or(false))
                {
                    hoisted.push(self.hoist_meta(tokens[idx].clone(), tag));
                }

                post_nl.extend(post);
            }
        }

        strip_encapsulation_metas(tokens)
    }

    /// Rebases a start meta onto the element it is hoisted in front
    /// of, recording the swallowed source run so the wrapping pass can
    /// restore it.
    fn hoist_meta(&self, mut meta_token: Token, tag: &Tag) -> Token {
        let meta = meta_token.tag_mut().unwrap();

        match (tag.data.tsr, meta.data.tsr) {
            (Some(elem_tsr), Some(meta_tsr)) => {
                meta.data.unwrapped_wt = self
                    .frame
                    .substring(SourceRange(elem_tsr.start(), meta_tsr.start()))
                    .map(String::from);
                meta.data.tsr = Some(SourceRange(elem_tsr.start(), meta_tsr.end()));
            }
            _ => {
                self.env.warn(
                    "expander",
                    format!(
                        "hoisting a meta with incomplete source ranges out of <{}>",
                        tag.name
                    ),
                );
            }
        }

        meta.data.first_wikitext_node = Some(first_wikitext_node_name(tag));

        meta_token
    }

    /// Attaches the collected provenance: `data-mw.attribs` plus the
    /// `mw:ExpandedAttrs` annotation, or a stash on the token for the
    /// template handler.
    fn annotate(&self, tag: &mut Tag, tmp_mw: Vec<TmpMwEntry>) {
        let mut attribs: Vec<Value> = Vec::new();

        for entry in tmp_mw {
            let mut k_obj = json!({ "txt": entry.key_txt });

            if let Some(tokens) = entry.key_html {
                k_obj["html"] = Value::String(self.expand_fragment(&tokens));
            }

            if let Some(offsets) = entry.key_offsets {
                k_obj["srcOffsets"] = json!(offsets);
            }

            let mut v_obj = match entry.value_html {
                ValueHtml::Tokens(tokens) => {
                    json!({ "html": self.expand_fragment(&tokens) })
                }
                ValueHtml::None => json!({ "html": [] }),
            };

            if let Some(offsets) = entry.value_offsets {
                v_obj["srcOffsets"] = json!(offsets);
            }

            attribs.push(k_obj);
            attribs.push(v_obj);
        }

        if tag.name == "template" {
            tag.data.tmp.templated_attribs = Some(Value::Array(attribs));
            return;
        }

        let about = self.env.new_about_id();

        tag.set_attr("about", about);
        tag.add_typeof("mw:ExpandedAttrs");

        let data_mw = serde_json::to_string(&json!({ "attribs": attribs }))
            .expect("data-mw serialization");

        tag.set_attr("data-mw", data_mw);
    }

    fn expand_fragment(&self, tokens: &[Token]) -> String {
        match self.fragment_expander.expand_to_html(tokens, self.frame) {
            Ok(html) => html,
            Err(err) => {
                self.env.warn(
                    "expander",
                    format!("fragment expansion failed, keeping flat source: {}", err),
                );

                tokens_to_string(tokens)
            }
        }
    }
}

/// Drives a token handler over a stream until it stops asking for
/// re-entry, within the given retry budget.
pub fn expand_stream(
    mut handler: impl FnMut(Token) -> TokenHandlerResult,
    tokens: Vec<Token>,
    cancel: &CancellationToken,
    max_retries: u32,
) -> Result<Vec<Token>, Error> {
    let mut stream = tokens;
    let mut passes = 0;

    loop {
        let mut out = Vec::with_capacity(stream.len());
        let mut retry = false;

        for token in stream {
            cancel.check()?;

            let result = handler(token);

            retry |= result.retry;
            out.extend(result.tokens);
        }

        if !retry {
            return Ok(out);
        }

        passes += 1;

        if passes >= max_retries {
            return Err(ExpansionError::RetryLimitExceeded(max_retries).into());
        }

        stream = out;
    }
}

/// Index of the first newline that sits outside any `<includeonly>`
/// -style segment.
fn newline_split_pos(tokens: &[Token]) -> Option<usize> {
    let mut include_depth = 0u32;

    for (i, token) in tokens.iter().enumerate() {
        match token {
            Token::Newline if include_depth == 0 => return Some(i),
            _ => {
                if let Some(tag) = token.tag() {
                    if tag.is_includes_meta() {
                        if tag.is_includes_end_meta() {
                            include_depth = include_depth.saturating_sub(1);
                        } else {
                            include_depth += 1;
                        }
                    }
                }
            }
        }
    }

    None
}

fn strip_encapsulation_metas(tokens: Vec<Token>) -> (Vec<Token>, bool) {
    let before = tokens.len();
    let kept: Vec<Token> = tokens
        .into_iter()
        .filter(|t| !t.tag().map(Tag::is_encapsulation_meta).unwrap_or(false))
        .collect();
    let stripped = kept.len() != before;

    (kept, stripped)
}

fn collapse(tokens: Vec<Token>) -> KvValue {
    match to_plain_string(&tokens) {
        Some(s) => KvValue::String(s),
        None => KvValue::Tokens(tokens),
    }
}

fn first_wikitext_node_name(tag: &Tag) -> String {
    let upper = tag.name.to_uppercase();

    match &tag.data.stx {
        Some(stx) => format!("{}_{}", upper, stx),
        None => upper,
    }
}
