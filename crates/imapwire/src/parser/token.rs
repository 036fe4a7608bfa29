//! Decoded token tree.

use std::borrow::Cow;

/// One node of a decoded response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare atom or quoted-string content (escapes kept verbatim).
    Atom(String),
    /// Resolved `{n}` literal.
    Literal(Vec<u8>),
    /// Parenthesized list.
    List(Vec<Token>),
}

impl Token {
    /// Creates an atom.
    #[must_use]
    pub fn atom(s: impl Into<String>) -> Self {
        Self::Atom(s.into())
    }

    /// Returns the text of an atom, or of a literal holding valid UTF-8.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Atom(s) => Some(s),
            Self::Literal(bytes) => std::str::from_utf8(bytes).ok(),
            Self::List(_) => None,
        }
    }

    /// Returns the raw bytes of an atom or literal.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Atom(s) => Some(s.as_bytes()),
            Self::Literal(bytes) => Some(bytes),
            Self::List(_) => None,
        }
    }

    /// Returns the children of a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns true if this leaf equals `word`, ignoring ASCII case.
    #[must_use]
    pub fn is(&self, word: &str) -> bool {
        self.as_str().is_some_and(|s| s.eq_ignore_ascii_case(word))
    }

    /// Returns true for the `NIL` atom.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Atom(s) if s.eq_ignore_ascii_case("NIL"))
    }

    /// Parses the leading decimal digits of a leaf, so `3857529045]` reads
    /// as `3857529045`.
    #[must_use]
    pub fn number(&self) -> Option<u64> {
        leading_number(self.as_str()?)
    }

    /// Lossy text form; lists render parenthesized.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        match self {
            Self::Atom(s) => Cow::Borrowed(s),
            Self::Literal(bytes) => String::from_utf8_lossy(bytes),
            Self::List(items) => {
                let inner: Vec<_> = items.iter().map(Self::text).collect();
                Cow::Owned(format!("({})", inner.join(" ")))
            }
        }
    }

    /// Collects every leaf, depth first.
    #[must_use]
    pub fn leaves(&self) -> Vec<&Self> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a Self>) {
        match self {
            Self::List(items) => items.iter().for_each(|item| item.collect_leaves(out)),
            leaf => out.push(leaf),
        }
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Self::Atom(s.to_string())
    }
}

/// Joins the flattened leaves of a token line with single spaces.
#[must_use]
pub fn flatten(tokens: &[Token]) -> String {
    tokens
        .iter()
        .flat_map(Token::leaves)
        .map(Token::text)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses the leading decimal digits of `s`.
#[must_use]
pub fn leading_number(s: &str) -> Option<u64> {
    let end = s
        .bytes()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_tolerates_trailing_bracket() {
        assert_eq!(Token::atom("3857529045]").number(), Some(3_857_529_045));
        assert_eq!(Token::atom("42").number(), Some(42));
        assert_eq!(Token::atom("EXISTS").number(), None);
        assert_eq!(Token::List(vec![]).number(), None);
    }

    #[test]
    fn test_text_and_flatten() {
        let line = vec![
            Token::atom("FLAGS"),
            Token::List(vec![Token::atom("\\Seen"), Token::atom("\\Draft")]),
        ];
        assert_eq!(line[1].text(), "(\\Seen \\Draft)");
        assert_eq!(flatten(&line), "FLAGS \\Seen \\Draft");
    }

    #[test]
    fn test_literal_views() {
        let token = Token::Literal(b"Hello".to_vec());
        assert_eq!(token.as_str(), Some("Hello"));
        assert_eq!(token.as_bytes(), Some(&b"Hello"[..]));
        assert!(Token::Literal(vec![0xff]).as_str().is_none());
    }

    #[test]
    fn test_case_insensitive_match() {
        assert!(Token::atom("uid").is("UID"));
        assert!(Token::atom("NIL").is_nil());
        assert!(!Token::List(vec![]).is("UID"));
    }
}
