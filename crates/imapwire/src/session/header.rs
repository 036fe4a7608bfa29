//! RFC 822 header block parsing for message overviews.

use std::collections::BTreeMap;

/// Parses a header block into lower-cased field names and unfolded values.
///
/// Repeated fields are joined with `", "`. Parsing stops at the first empty
/// line.
#[must_use]
pub fn parse_header(text: &str) -> BTreeMap<String, String> {
    let mut attributes: BTreeMap<String, String> = BTreeMap::new();
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        if line.is_empty() {
            break;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            if let Some((_, value)) = current.as_mut() {
                value.push(' ');
                value.push_str(line.trim());
            }
            continue;
        }

        if let Some(field) = current.take() {
            add(&mut attributes, field);
        }
        if let Some((name, value)) = line.split_once(':') {
            current = Some((name.trim().to_ascii_lowercase(), value.trim().to_string()));
        }
    }

    if let Some(field) = current {
        add(&mut attributes, field);
    }
    attributes
}

fn add(attributes: &mut BTreeMap<String, String>, (name, value): (String, String)) {
    let value = value.trim().to_string();
    attributes
        .entry(name)
        .and_modify(|existing| {
            existing.push_str(", ");
            existing.push_str(&value);
        })
        .or_insert(value);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header_unfolds_and_lowercases() {
        let raw = "Subject: Hello\r\n world\r\nFrom: a@example.com\r\n\r\nbody: not a header\r\n";
        let header = parse_header(raw);
        assert_eq!(header.get("subject").map(String::as_str), Some("Hello world"));
        assert_eq!(header.get("from").map(String::as_str), Some("a@example.com"));
        assert!(!header.contains_key("body"));
    }

    #[test]
    fn test_parse_header_joins_repeated_fields() {
        let raw = "Received: one\r\nReceived: two\r\n";
        let header = parse_header(raw);
        assert_eq!(header.get("received").map(String::as_str), Some("one, two"));
    }
}
