//! Command arguments and builders.
//!
//! Commands go out as a tag, a command word and a list of [`Arg`]s. Plain
//! arguments are written inline; literal arguments need the server's `+`
//! continuation before their payload can follow.

mod sequence;
mod tag_generator;

pub use sequence::{RangeEnd, SequenceSet, build_set};
pub use tag_generator::TagGenerator;

/// One command argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Written inline after a space.
    Plain(String),
    /// `{n}` literal: the declaration ends the current line, the payload
    /// starts the next one once the server has sent a continuation.
    Literal {
        /// The `{n}` marker.
        declaration: String,
        /// Raw bytes sent after the continuation.
        payload: Vec<u8>,
    },
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Self::Plain(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Self::Plain(s)
    }
}

/// Escapes a string argument: a quoted string with `\` and `"` escaped, or a
/// literal when the value spans lines.
#[must_use]
pub fn escape_string(value: &str) -> Arg {
    if value.contains('\n') {
        return Arg::Literal {
            declaration: format!("{{{}}}", value.len()),
            payload: value.as_bytes().to_vec(),
        };
    }
    Arg::Plain(quote(value))
}

/// Quotes a string, escaping `\` and `"`.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Renders items as a parenthesized list; items are written as given.
#[must_use]
pub fn escape_list<S: AsRef<str>>(items: &[S]) -> String {
    let joined: Vec<&str> = items.iter().map(AsRef::as_ref).collect();
    format!("({})", joined.join(" "))
}

/// Flag operation of a STORE command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreMode {
    /// Replace the flags (`FLAGS`).
    #[default]
    Replace,
    /// Add the flags (`+FLAGS`).
    Add,
    /// Remove the flags (`-FLAGS`).
    Remove,
}

impl StoreMode {
    /// Builds the STORE data item name.
    #[must_use]
    pub fn item(self, silent: bool) -> String {
        let prefix = match self {
            Self::Replace => "",
            Self::Add => "+",
            Self::Remove => "-",
        };
        let suffix = if silent { ".SILENT" } else { "" };
        format!("{prefix}FLAGS{suffix}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_string_quotes() {
        assert_eq!(escape_string("INBOX"), Arg::Plain("\"INBOX\"".to_string()));
        assert_eq!(
            escape_string(r#"a "b" c\d"#),
            Arg::Plain(r#""a \"b\" c\\d""#.to_string())
        );
    }

    #[test]
    fn test_escape_string_multiline_is_literal() {
        let message = "Subject: hi\r\n\r\nbody\r\n";
        match escape_string(message) {
            Arg::Literal {
                declaration,
                payload,
            } => {
                assert_eq!(declaration, "{21}");
                assert_eq!(payload, message.as_bytes());
            }
            Arg::Plain(_) => panic!("expected literal"),
        }
    }

    #[test]
    fn test_escape_list() {
        assert_eq!(escape_list(&["\\Seen", "\\Flagged"]), "(\\Seen \\Flagged)");
        assert_eq!(escape_list(&["BODY[]"]), "(BODY[])");
        assert_eq!(escape_list::<&str>(&[]), "()");
    }

    #[test]
    fn test_store_item() {
        assert_eq!(StoreMode::Replace.item(false), "FLAGS");
        assert_eq!(StoreMode::Add.item(true), "+FLAGS.SILENT");
        assert_eq!(StoreMode::Remove.item(false), "-FLAGS");
    }
}
