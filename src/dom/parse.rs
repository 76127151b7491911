use super::{Document, NodeId};
use failure::Fail;

#[derive(Fail, Debug, PartialEq, Clone)]
pub enum DomParseError {
    #[fail(display = "Unexpected end of input at byte {}.", _0)]
    UnexpectedEof(usize),
    #[fail(display = "Malformed markup at byte {}: expected {}.", pos, expected)]
    Malformed { pos: usize, expected: &'static str },
    #[fail(display = "End tag </{}> does not close <{}>.", found, expected)]
    MismatchedEndTag { expected: String, found: String },
    #[fail(display = "End tag </{}> without an open element.", _0)]
    StrayEndTag(String),
}

/// Elements serialized as self-closed voids.
pub(crate) static VOID_ELEMENTS: &[&str] = &[
    "area", "base", "basefont", "bgsound", "br", "col", "command", "embed", "frame", "hr", "img",
    "input", "keygen", "link", "meta", "param", "source", "track", "wbr",
];

/// Elements whose text content is emitted (and re-read) verbatim.
pub(crate) static RAW_CONTENT_ELEMENTS: &[&str] = &[
    "style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

#[inline]
pub(crate) fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

#[inline]
pub(crate) fn is_raw_content_element(name: &str) -> bool {
    RAW_CONTENT_ELEMENTS.contains(&name)
}

impl Document {
    /// Loads a document or fragment in the exact dialect the XML
    /// serializer emits: quoted attributes, self-closed voids, raw-text
    /// elements closed by their literal end tag. This is the inverse of
    /// serialization, not an error-recovering HTML5 parser; the tree
    /// builder stays an external collaborator.
    pub fn from_xhtml(input: &str) -> Result<Document, DomParseError> {
        let mut doc = Document::new();
        let root = doc.root();

        Parser {
            doc: &mut doc,
            input,
            pos: 0,
        }
        .run(root)?;

        Ok(doc)
    }
}

struct Parser<'i, 'd> {
    doc: &'d mut Document,
    input: &'i str,
    pos: usize,
}

impl<'i, 'd> Parser<'i, 'd> {
    fn run(&mut self, root: NodeId) -> Result<(), DomParseError> {
        let mut open: Vec<NodeId> = vec![root];

        while self.pos < self.input.len() {
            let parent = *open.last().unwrap();

            if self.rest().starts_with("<!--") {
                let comment = self.read_comment()?;
                let node = self.doc.create_comment(comment);

                self.doc.append(parent, node);
            } else if self.rest().starts_with("<!") {
                self.skip_declaration()?;
            } else if self.rest().starts_with("</") {
                let name = self.read_end_tag()?;

                if open.len() == 1 {
                    return Err(DomParseError::StrayEndTag(name));
                }

                let top = open.pop().unwrap();
                let top_name = self.doc.tag_name(top).unwrap_or("").to_string();

                if top_name != name {
                    return Err(DomParseError::MismatchedEndTag {
                        expected: top_name,
                        found: name,
                    });
                }
            } else if self.rest().starts_with('<') {
                let (node, self_closed) = self.read_start_tag()?;
                let name = self.doc.tag_name(node).unwrap_or("").to_string();

                self.doc.append(parent, node);

                if self_closed || is_void_element(&name) {
                    continue;
                }

                if is_raw_content_element(&name) {
                    let raw = self.read_raw_content(&name)?;

                    if !raw.is_empty() {
                        let text = self.doc.create_text(raw);

                        self.doc.append(node, text);
                    }
                } else {
                    // An HTML5 parser drops the newline right after
                    // these tags; the serializer doubles it to
                    // compensate.
                    if matches!(name.as_str(), "pre" | "textarea" | "listing")
                        && self.rest().starts_with('\n')
                    {
                        self.pos += 1;
                    }

                    open.push(node);
                }
            } else {
                let text = self.read_text();

                if !text.is_empty() {
                    let node = self.doc.create_text(text);

                    self.doc.append(parent, node);
                }
            }
        }

        if open.len() > 1 {
            return Err(DomParseError::UnexpectedEof(self.pos));
        }

        Ok(())
    }

    #[inline]
    fn rest(&self) -> &'i str {
        &self.input[self.pos..]
    }

    fn read_text(&mut self) -> String {
        let end = self.rest().find('<').map_or(self.input.len(), |i| self.pos + i);
        let raw = &self.input[self.pos..end];

        self.pos = end;

        decode_entities(raw)
    }

    fn read_comment(&mut self) -> Result<String, DomParseError> {
        self.pos += "<!--".len();

        match self.rest().find("-->") {
            Some(i) => {
                let data = self.rest()[..i].to_string();

                self.pos += i + "-->".len();

                Ok(data)
            }
            None => Err(DomParseError::UnexpectedEof(self.pos)),
        }
    }

    fn skip_declaration(&mut self) -> Result<(), DomParseError> {
        match self.rest().find('>') {
            Some(i) => {
                self.pos += i + 1;

                Ok(())
            }
            None => Err(DomParseError::UnexpectedEof(self.pos)),
        }
    }

    fn read_name(&mut self) -> Result<String, DomParseError> {
        let start = self.pos;

        for (i, ch) in self.rest().char_indices() {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == ':' {
                continue;
            }

            self.pos = start + i;

            if i == 0 {
                return Err(DomParseError::Malformed {
                    pos: start,
                    expected: "a tag or attribute name",
                });
            }

            return Ok(self.input[start..self.pos].to_string());
        }

        Err(DomParseError::UnexpectedEof(start))
    }

    fn read_end_tag(&mut self) -> Result<String, DomParseError> {
        self.pos += "</".len();

        let name = self.read_name()?;

        if !self.rest().starts_with('>') {
            return Err(DomParseError::Malformed {
                pos: self.pos,
                expected: "`>` after end tag name",
            });
        }

        self.pos += 1;

        Ok(name)
    }

    fn read_start_tag(&mut self) -> Result<(NodeId, bool), DomParseError> {
        self.pos += 1;

        let name = self.read_name()?;
        let node = self.doc.create_element(name);

        loop {
            self.skip_whitespace();

            if self.rest().starts_with("/>") {
                self.pos += 2;

                return Ok((node, true));
            }

            if self.rest().starts_with('>') {
                self.pos += 1;

                return Ok((node, false));
            }

            if self.rest().is_empty() {
                return Err(DomParseError::UnexpectedEof(self.pos));
            }

            let attr_name = self.read_name()?;
            let value = if self.rest().starts_with('=') {
                self.pos += 1;
                self.read_quoted_value()?
            } else {
                String::new()
            };

            self.doc.set_attr(node, &attr_name, value);
        }
    }

    fn read_quoted_value(&mut self) -> Result<String, DomParseError> {
        let quote = match self.rest().chars().next() {
            Some(q @ '"') | Some(q @ '\'') => q,
            _ => {
                return Err(DomParseError::Malformed {
                    pos: self.pos,
                    expected: "a quoted attribute value",
                })
            }
        };

        self.pos += 1;

        match self.rest().find(quote) {
            Some(i) => {
                let raw = &self.rest()[..i];
                let value = decode_entities(raw);

                self.pos += i + 1;

                Ok(value)
            }
            None => Err(DomParseError::UnexpectedEof(self.pos)),
        }
    }

    fn read_raw_content(&mut self, name: &str) -> Result<String, DomParseError> {
        let end_tag = format!("</{}>", name);

        match self.rest().find(&end_tag) {
            Some(i) => {
                let raw = self.rest()[..i].to_string();

                self.pos += i + end_tag.len();

                Ok(raw)
            }
            None => Err(DomParseError::UnexpectedEof(self.pos)),
        }
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start_matches(|c: char| c.is_ascii_whitespace());

        self.pos = self.input.len() - trimmed.len();
    }
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let semi = match rest.find(';') {
            Some(i) if i <= 32 => i,
            _ => {
                out.push('&');
                rest = &rest[1..];
                continue;
            }
        };

        let entity = &rest[1..semi];
        let decoded = match entity {
            "lt" => Some('<'),
            "gt" => Some('>'),
            "amp" => Some('&'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                u32::from_str_radix(&entity[2..], 16)
                    .ok()
                    .and_then(std::char::from_u32)
            }
            _ if entity.starts_with('#') => {
                entity[1..].parse::<u32>().ok().and_then(std::char::from_u32)
            }
            _ => None,
        };

        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);

    out
}
