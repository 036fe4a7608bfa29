//! Structural decoder for IMAP response lines.
//!
//! A response unit (one physical line plus any literals it carries) is turned
//! into a [`Token`] tree in a single left-to-right scan with an explicit stack
//! of list frames. The decoder is tolerant: stray closing parentheses are
//! ignored and frames left open at the end of input are force-closed.

mod token;

pub use token::{Token, flatten, leading_number};

/// Splits a raw line into its leading word (the tag, `*` or `+`) and the
/// remainder.
#[must_use]
pub fn split_tag(line: &[u8]) -> (String, &[u8]) {
    let trimmed = trim_line_end(line);
    match trimmed.iter().position(|&b| b == b' ') {
        Some(pos) => (
            String::from_utf8_lossy(&trimmed[..pos]).into_owned(),
            &line[pos + 1..],
        ),
        None => (String::from_utf8_lossy(trimmed).into_owned(), &[]),
    }
}

/// Decodes one response unit into a token list.
#[must_use]
pub fn decode_line(input: &[u8]) -> Vec<Token> {
    Decoder::new(input).run()
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|&b| b != b'\r' && b != b'\n')
        .map_or(0, |p| p + 1);
    &line[..end]
}

/// Scanner state.
struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
    /// Enclosing frames; the innermost open list is `tokens`.
    stack: Vec<Vec<Token>>,
    tokens: Vec<Token>,
}

impl<'a> Decoder<'a> {
    const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            stack: Vec::new(),
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn run(mut self) -> Vec<Token> {
        while let Some(byte) = self.peek() {
            match byte {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                b'(' => {
                    self.pos += 1;
                    self.stack.push(std::mem::take(&mut self.tokens));
                }
                b')' => {
                    self.pos += 1;
                    self.close_frame();
                }
                b'"' => {
                    let token = self.read_quoted().unwrap_or_else(|| self.read_atom());
                    self.tokens.push(token);
                }
                b'{' => {
                    let token = self.read_literal().unwrap_or_else(|| self.read_atom());
                    self.tokens.push(token);
                }
                _ => {
                    let token = self.read_atom();
                    self.tokens.push(token);
                }
            }
        }

        // the server may have forgotten some closing parentheses
        while !self.stack.is_empty() {
            self.close_frame();
        }
        self.tokens
    }

    fn close_frame(&mut self) {
        if let Some(parent) = self.stack.pop() {
            let child = std::mem::replace(&mut self.tokens, parent);
            self.tokens.push(Token::List(child));
        }
    }

    /// Reads a quoted string; `None` if it is never closed.
    fn read_quoted(&mut self) -> Option<Token> {
        let start = self.pos + 1;
        let mut i = start;
        while i < self.input.len() {
            match self.input[i] {
                b'\\' => i += 2,
                b'"' => {
                    let content = String::from_utf8_lossy(&self.input[start..i]).into_owned();
                    self.pos = i + 1;
                    return Some(Token::Atom(content));
                }
                _ => i += 1,
            }
        }
        None
    }

    /// Reads `{n}` / `{n+}` and the `n` bytes after the line break; `None`
    /// if the marker is malformed.
    fn read_literal(&mut self) -> Option<Token> {
        let rest = &self.input[self.pos + 1..];
        let close = rest.iter().position(|&b| b == b'}')?;
        let marker = &rest[..close];
        let digits = marker.strip_suffix(b"+").unwrap_or(marker);
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        let len: usize = std::str::from_utf8(digits).ok()?.parse().ok()?;

        let mut cursor = self.pos + 1 + close + 1;
        if self.input.get(cursor) == Some(&b'\r') {
            cursor += 1;
        }
        if self.input.get(cursor) == Some(&b'\n') {
            cursor += 1;
        }

        let end = (cursor + len).min(self.input.len());
        let data = self.input[cursor..end].to_vec();
        self.pos = end;
        Some(Token::Literal(data))
    }

    /// Reads a bare atom. A `[` inside the atom extends it to the matching
    /// `]`, spaces and parentheses included.
    fn read_atom(&mut self) -> Token {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(byte) = self.peek() {
            match byte {
                b'[' if self.pos > start => depth += 1,
                b']' if depth > 0 => depth -= 1,
                b'\r' | b'\n' => break,
                b' ' | b'(' | b')' if depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }
        if self.pos == start {
            // lone character that cannot start an atom
            self.pos += 1;
        }
        Token::Atom(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::needless_collect,
    clippy::similar_names
)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn atoms(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .flat_map(Token::leaves)
            .map(|t| t.text().into_owned())
            .collect()
    }

    #[test]
    fn test_split_tag() {
        let (tag, rest) = split_tag(b"TAG1 OK LOGIN done\r\n");
        assert_eq!(tag, "TAG1");
        assert_eq!(rest, b"OK LOGIN done\r\n");

        let (tag, rest) = split_tag(b"+\r\n");
        assert_eq!(tag, "+");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_simple_atoms() {
        let tokens = decode_line(b"3 EXISTS\r\n");
        assert_eq!(tokens, vec![Token::atom("3"), Token::atom("EXISTS")]);
    }

    #[test]
    fn test_nested_lists() {
        let tokens = decode_line(b"LIST (\\HasNoChildren) \".\" \"INBOX\"\r\n");
        assert_eq!(
            tokens,
            vec![
                Token::atom("LIST"),
                Token::List(vec![Token::atom("\\HasNoChildren")]),
                Token::atom("."),
                Token::atom("INBOX"),
            ]
        );
    }

    #[test]
    fn test_concatenated_closing_parens() {
        let tokens = decode_line(b"1 FETCH (A (B (C D)))\r\n");
        assert_eq!(
            tokens[2],
            Token::List(vec![
                Token::atom("A"),
                Token::List(vec![
                    Token::atom("B"),
                    Token::List(vec![Token::atom("C"), Token::atom("D")]),
                ]),
            ])
        );
    }

    #[test]
    fn test_missing_closing_parens_are_forced() {
        let tokens = decode_line(b"1 FETCH (FLAGS (\\Seen UID 4\r\n");
        assert_eq!(tokens.len(), 3);
        assert_eq!(
            tokens[2],
            Token::List(vec![
                Token::atom("FLAGS"),
                Token::List(vec![
                    Token::atom("\\Seen"),
                    Token::atom("UID"),
                    Token::atom("4"),
                ]),
            ])
        );
    }

    #[test]
    fn test_stray_closing_paren_ignored() {
        let tokens = decode_line(b"OK done)\r\n");
        assert_eq!(tokens, vec![Token::atom("OK"), Token::atom("done")]);
    }

    #[test]
    fn test_quoted_string_keeps_escapes() {
        let tokens = decode_line(br#"LIST () "/" "a \"quoted\" name""#);
        assert_eq!(tokens[3], Token::atom(r#"a \"quoted\" name"#));
    }

    #[test]
    fn test_quoted_string_with_parens() {
        let tokens = decode_line(b"X (\"(not a list)\")");
        assert_eq!(
            tokens[1],
            Token::List(vec![Token::atom("(not a list)")])
        );
    }

    #[test]
    fn test_literal_spanning_lines() {
        let tokens =
            decode_line(b"1 FETCH (UID 1 BODY[] {12}\r\nHello world!\r\n)\r\n");
        assert_eq!(
            tokens[2],
            Token::List(vec![
                Token::atom("UID"),
                Token::atom("1"),
                Token::atom("BODY[]"),
                Token::Literal(b"Hello world!".to_vec()),
            ])
        );
    }

    #[test]
    fn test_literal_with_embedded_newlines_then_more_atoms() {
        let tokens = decode_line(b"1 FETCH (RFC822.HEADER {12}\r\nA: 1\r\nB: 2\r\n UID 7)\r\n");
        let list = tokens[2].as_list().unwrap();
        assert_eq!(list[1], Token::Literal(b"A: 1\r\nB: 2\r\n".to_vec()));
        assert_eq!(list[2], Token::atom("UID"));
        assert_eq!(list[3], Token::atom("7"));
    }

    #[test]
    fn test_short_literal_takes_what_is_there() {
        let tokens = decode_line(b"X {10}\r\nabc");
        assert_eq!(tokens[1], Token::Literal(b"abc".to_vec()));
    }

    #[test]
    fn test_bracketed_section_is_one_atom() {
        let tokens = decode_line(b"1 FETCH (BODY[HEADER.FIELDS (FROM TO)] {4}\r\nA: b)\r\n");
        let list = tokens[2].as_list().unwrap();
        assert_eq!(list[0], Token::atom("BODY[HEADER.FIELDS (FROM TO)]"));
        assert_eq!(list[1], Token::Literal(b"A: b".to_vec()));
    }

    #[test]
    fn test_response_code_stays_split() {
        let tokens = decode_line(b"OK [UIDVALIDITY 3857529045] UIDs valid\r\n");
        assert_eq!(tokens[1], Token::atom("[UIDVALIDITY"));
        assert_eq!(tokens[2], Token::atom("3857529045]"));
    }

    #[test]
    fn test_malformed_literal_marker_is_atom() {
        let tokens = decode_line(b"OK {abc} x");
        assert_eq!(atoms(&tokens), vec!["OK", "{abc}", "x"]);
    }

    fn atom_strategy() -> impl Strategy<Value = String> {
        "[A-Za-z0-9.\\\\]{1,8}"
    }

    #[derive(Debug, Clone)]
    enum Tree {
        Leaf(String, bool),
        Node(Vec<Tree>),
    }

    fn tree_strategy() -> impl Strategy<Value = Tree> {
        let leaf = (atom_strategy(), any::<bool>()).prop_map(|(s, q)| Tree::Leaf(s, q));
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop::collection::vec(inner, 0..6).prop_map(Tree::Node)
        })
    }

    fn render(tree: &Tree, pad: &str, out: &mut String) {
        match tree {
            Tree::Leaf(s, true) => out.push_str(&format!("\"{}\"", s.replace('\\', "\\\\"))),
            Tree::Leaf(s, false) => out.push_str(s),
            Tree::Node(children) => {
                out.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        out.push(' ');
                        out.push_str(pad);
                    }
                    render(child, pad, out);
                }
                out.push(')');
            }
        }
    }

    fn expected_leaves(tree: &Tree, out: &mut Vec<String>) {
        match tree {
            Tree::Leaf(s, true) => out.push(s.replace('\\', "\\\\")),
            Tree::Leaf(s, false) => out.push(s.clone()),
            Tree::Node(children) => children.iter().for_each(|c| expected_leaves(c, out)),
        }
    }

    proptest! {
        #[test]
        fn prop_leaves_survive_any_spacing(tree in tree_strategy(), spaces in 0usize..3) {
            let pad = " ".repeat(spaces);
            let mut line = String::new();
            render(&tree, &pad, &mut line);
            let decoded = decode_line(line.as_bytes());

            let mut expected = Vec::new();
            expected_leaves(&tree, &mut expected);
            prop_assert_eq!(atoms(&decoded), expected);
        }

        #[test]
        fn prop_literal_reassembles_exactly(
            body in prop::collection::vec(
                prop_oneof![Just(b'\n'), Just(b'\r'), Just(b' '), Just(b')'), 0x21u8..0x7f],
                0..200,
            ),
        ) {
            let mut unit = format!("1 FETCH (BODY[] {{{}}}\r\n", body.len()).into_bytes();
            unit.extend_from_slice(&body);
            unit.extend_from_slice(b" UID 3)\r\n");

            let decoded = decode_line(&unit);
            let list = decoded[2].as_list().unwrap();
            prop_assert_eq!(&list[1], &Token::Literal(body.clone()));
            prop_assert_eq!(&list[2], &Token::atom("UID"));
        }
    }
}
