use super::Token;
use crate::base::SourceRange;

/// An attribute key or value: a plain string once fully expanded, or a
/// token run while templated/nested content is still being resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum KvValue {
    String(String),
    Tokens(Vec<Token>),
}

impl KvValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            KvValue::String(s) => Some(s),
            KvValue::Tokens(_) => None,
        }
    }

    pub fn tokens(&self) -> Option<&[Token]> {
        match self {
            KvValue::Tokens(tokens) => Some(tokens),
            KvValue::String(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            KvValue::String(s) => s.is_empty(),
            KvValue::Tokens(tokens) => tokens.is_empty(),
        }
    }
}

impl Default for KvValue {
    fn default() -> Self {
        KvValue::String(String::new())
    }
}

impl From<&str> for KvValue {
    fn from(s: &str) -> Self {
        KvValue::String(s.to_string())
    }
}

impl From<String> for KvValue {
    fn from(s: String) -> Self {
        KvValue::String(s)
    }
}

impl From<Vec<Token>> for KvValue {
    fn from(tokens: Vec<Token>) -> Self {
        KvValue::Tokens(tokens)
    }
}

/// Key/value source ranges into the frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KvSourceOffsets {
    pub key: SourceRange,
    pub value: SourceRange,
}

/// One attribute of a tag token, with the pre-expansion source
/// bookkeeping the serializers rely on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Kv {
    pub k: KvValue,
    pub v: KvValue,
    /// Original source of the key, before expansion.
    pub ksrc: Option<String>,
    /// Original source of the value, before expansion.
    pub vsrc: Option<String>,
    pub src_offsets: Option<KvSourceOffsets>,
}

impl Kv {
    pub fn new(k: impl Into<KvValue>, v: impl Into<KvValue>) -> Self {
        Kv {
            k: k.into(),
            v: v.into(),
            ksrc: None,
            vsrc: None,
            src_offsets: None,
        }
    }

    pub fn with_offsets(
        k: impl Into<KvValue>,
        v: impl Into<KvValue>,
        src_offsets: KvSourceOffsets,
    ) -> Self {
        Kv {
            k: k.into(),
            v: v.into(),
            ksrc: None,
            vsrc: None,
            src_offsets: Some(src_offsets),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kv_value_shapes() {
        let plain = KvValue::from("class");

        assert_eq!(plain.as_str(), Some("class"));
        assert_eq!(plain.tokens(), None);
        assert!(!plain.is_empty());

        let tokens = KvValue::from(vec![Token::text("x")]);

        assert_eq!(tokens.as_str(), None);
        assert_eq!(tokens.tokens().map(|t| t.len()), Some(1));

        assert!(KvValue::default().is_empty());
        assert!(KvValue::Tokens(Vec::new()).is_empty());
    }
}
