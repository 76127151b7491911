use serde::{Deserialize, Serialize};

/// A half-open `[start, end)` byte range into the source text of the
/// current frame. Serialized as a two-element JSON array, matching the
/// `tsr` wire form.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct SourceRange(pub u32, pub u32);

impl SourceRange {
    #[inline]
    pub fn start(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.1
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.1.saturating_sub(self.0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 >= self.1
    }

    /// A range is usable only when it is monotone and bounded by the
    /// source length.
    #[inline]
    pub fn is_valid_for(&self, src_len: usize) -> bool {
        self.0 <= self.1 && (self.1 as usize) <= src_len
    }
}

/// Document source range: `[start, end, opening_tag_width, closing_tag_width]`.
/// The widths are unknown (`null`) for nodes whose tags have no direct
/// source representation. Serialized as a four-element JSON array, the
/// `dsr` wire form.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Dsr(pub u32, pub u32, pub Option<u32>, pub Option<u32>);

impl Dsr {
    #[inline]
    pub fn start(&self) -> u32 {
        self.0
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.1
    }

    #[inline]
    pub fn open_width(&self) -> Option<u32> {
        self.2
    }

    #[inline]
    pub fn close_width(&self) -> Option<u32> {
        self.3
    }

    #[inline]
    pub fn range(&self) -> SourceRange {
        SourceRange(self.0, self.1)
    }

    #[inline]
    pub fn is_valid_for(&self, src_len: usize) -> bool {
        self.range().is_valid_for(src_len)
    }
}
