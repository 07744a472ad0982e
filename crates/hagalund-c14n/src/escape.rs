#![forbid(unsafe_code)]

//! Character escaping for canonical output.

use std::io::{self, Write};

/// Where escaped characters end up. Each position has its own replacement set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    /// Character data: `&`, `<`, `>` and CR.
    Text,
    /// Attribute values: `&`, `<`, `"`, TAB, LF and CR.
    Attribute,
    /// Processing instruction data: CR only.
    ProcessingInstruction,
}

impl Escape {
    fn replacement(self, ch: char) -> Option<&'static str> {
        match (self, ch) {
            (_, '\r') => Some("&#xD;"),
            (Self::ProcessingInstruction, _) => None,
            (_, '&') => Some("&amp;"),
            (_, '<') => Some("&lt;"),
            (Self::Text, '>') => Some("&gt;"),
            (Self::Attribute, '"') => Some("&quot;"),
            (Self::Attribute, '\t') => Some("&#x9;"),
            (Self::Attribute, '\n') => Some("&#xA;"),
            _ => None,
        }
    }

    /// Write `s` to `out`, replacing the characters this position escapes.
    pub fn write<W: Write>(self, out: &mut W, s: &str) -> io::Result<()> {
        let mut start = 0;
        for (i, ch) in s.char_indices() {
            if let Some(rep) = self.replacement(ch) {
                out.write_all(s[start..i].as_bytes())?;
                out.write_all(rep.as_bytes())?;
                start = i + ch.len_utf8();
            }
        }
        out.write_all(s[start..].as_bytes())
    }

    pub fn apply(self, s: &str) -> String {
        let mut out = Vec::with_capacity(s.len());
        // Writing into a Vec cannot fail.
        let _ = self.write(&mut out, s);
        String::from_utf8(out).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text() {
        assert_eq!(Escape::Text.apply("plain"), "plain");
        assert_eq!(Escape::Text.apply("a&b<c>d\"e"), "a&amp;b&lt;c&gt;d\"e");
        assert_eq!(Escape::Text.apply("line\r\tend\n"), "line&#xD;\tend\n");
    }

    #[test]
    fn test_attribute() {
        assert_eq!(
            Escape::Attribute.apply("a&b<c>d\"e"),
            "a&amp;b&lt;c>d&quot;e"
        );
        assert_eq!(Escape::Attribute.apply("\t\n\r"), "&#x9;&#xA;&#xD;");
    }

    #[test]
    fn test_processing_instruction() {
        assert_eq!(
            Escape::ProcessingInstruction.apply("a<b&c\r"),
            "a<b&c&#xD;"
        );
    }

    #[test]
    fn test_multibyte_boundaries() {
        assert_eq!(Escape::Text.apply("é<ü"), "é&lt;ü");
    }
}
