use crate::base::SourceRange;

/// The token-stream frame: the wikitext source the current stream was
/// tokenized from. Token source ranges index into it.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    src: String,
}

impl Frame {
    pub fn new(src: impl Into<String>) -> Self {
        Frame { src: src.into() }
    }

    #[inline]
    pub fn src_text(&self) -> &str {
        &self.src
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.src.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.src.is_empty()
    }

    /// Source substring for a range, or `None` when the range is not
    /// monotone, out of bounds, or cuts a UTF-8 sequence.
    pub fn substring(&self, range: SourceRange) -> Option<&str> {
        if !range.is_valid_for(self.src.len()) {
            return None;
        }

        self.src.get(range.start() as usize..range.end() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_extraction() {
        let frame = Frame::new("{|class={{1x|foo}}\n|bar\n|}");

        assert_eq!(frame.substring(SourceRange(0, 2)), Some("{|"));
        assert_eq!(frame.substring(SourceRange(2, 18)), Some("class={{1x|foo}}"));
        assert_eq!(frame.substring(SourceRange(5, 3)), None);
        assert_eq!(frame.substring(SourceRange(0, 100)), None);
    }

    #[test]
    fn substring_respects_utf8_boundaries() {
        let frame = Frame::new("a€b");

        assert_eq!(frame.substring(SourceRange(0, 1)), Some("a"));
        assert_eq!(frame.substring(SourceRange(1, 4)), Some("€"));
        assert_eq!(frame.substring(SourceRange(1, 2)), None);
    }
}
