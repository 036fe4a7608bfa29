//! Typed results of session commands.

use std::collections::BTreeMap;

use crate::parser::Token;
use crate::response::ResultData;

/// Folder state reported by SELECT or EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectResult {
    /// Number of messages (`n EXISTS`).
    pub exists: Option<u32>,
    /// Number of recent messages (`n RECENT`).
    pub recent: Option<u32>,
    /// Predicted next UID (`[UIDNEXT n]`).
    pub uidnext: Option<u32>,
    /// UID validity (`[UIDVALIDITY n]`).
    pub uidvalidity: Option<u32>,
    /// First unseen message (`[UNSEEN n]`).
    pub unseen: Option<u32>,
    /// Flags defined in the folder.
    pub flags: Vec<String>,
}

impl ResultData for SelectResult {
    fn is_truthy(&self) -> bool {
        *self != Self::default()
    }
}

/// STATUS attributes of a folder, keyed by lower-cased attribute name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderStatus(BTreeMap<String, u64>);

impl FolderStatus {
    /// Builds a status from `KEY value` pairs.
    pub fn from_pairs(items: &[Token]) -> Self {
        let values = items
            .chunks_exact(2)
            .filter_map(|pair| {
                let key = pair[0].as_str()?.to_ascii_lowercase();
                Some((key, pair[1].number().unwrap_or(0)))
            })
            .collect();
        Self(values)
    }

    /// Looks up an attribute, ignoring case.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<u64> {
        self.0.get(&key.to_ascii_lowercase()).copied()
    }

    /// `MESSAGES`.
    #[must_use]
    pub fn messages(&self) -> Option<u64> {
        self.get("messages")
    }

    /// `RECENT`.
    #[must_use]
    pub fn recent(&self) -> Option<u64> {
        self.get("recent")
    }

    /// `UNSEEN`.
    #[must_use]
    pub fn unseen(&self) -> Option<u64> {
        self.get("unseen")
    }

    /// `UIDNEXT`.
    #[must_use]
    pub fn uidnext(&self) -> Option<u64> {
        self.get("uidnext")
    }

    /// `UIDVALIDITY`.
    #[must_use]
    pub fn uidvalidity(&self) -> Option<u64> {
        self.get("uidvalidity")
    }

    /// All attributes.
    #[must_use]
    pub const fn as_map(&self) -> &BTreeMap<String, u64> {
        &self.0
    }
}

impl ResultData for FolderStatus {
    fn is_truthy(&self) -> bool {
        !self.0.is_empty()
    }
}

/// One LIST entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderEntry {
    /// Hierarchy delimiter; `None` for a flat namespace (`NIL`).
    pub delimiter: Option<String>,
    /// Name attributes such as `\HasNoChildren`.
    pub flags: Vec<String>,
}

/// One resource line of a QUOTA response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaResource {
    /// Resource name, e.g. `STORAGE` or `MESSAGE`.
    pub name: String,
    /// Current usage.
    pub usage: u64,
    /// Limit.
    pub limit: u64,
}

/// Limits attached to one quota root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quota {
    /// Quota root name.
    pub root: String,
    /// Resources and their limits.
    pub resources: Vec<QuotaResource>,
}

/// GETQUOTA / GETQUOTAROOT result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaInfo {
    /// Quota roots named by `QUOTAROOT` lines.
    pub roots: Vec<String>,
    /// Quotas reported by `QUOTA` lines.
    pub quotas: Vec<Quota>,
}

impl QuotaInfo {
    /// Collects `QUOTAROOT` and `QUOTA` lines.
    pub(crate) fn from_lines(lines: &[Vec<Token>]) -> Self {
        let mut info = Self::default();
        for line in lines {
            let Some(kind) = line.get(1) else { continue };
            if kind.is("QUOTAROOT") {
                // first argument is the mailbox, the rest are roots
                info.roots
                    .extend(line.iter().skip(3).map(|t| t.text().into_owned()));
            } else if kind.is("QUOTA") {
                let root = line.get(2).map(|t| t.text().into_owned()).unwrap_or_default();
                let resources = line
                    .get(3)
                    .and_then(Token::as_list)
                    .map(|items| {
                        items
                            .chunks_exact(3)
                            .map(|chunk| QuotaResource {
                                name: chunk[0].text().into_owned(),
                                usage: chunk[1].number().unwrap_or(0),
                                limit: chunk[2].number().unwrap_or(0),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                info.quotas.push(Quota { root, resources });
            }
        }
        info
    }
}

impl ResultData for QuotaInfo {
    fn is_truthy(&self) -> bool {
        !self.roots.is_empty() || !self.quotas.is_empty()
    }
}

/// Data items of one FETCH line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchRecord {
    items: Vec<(String, Token)>,
}

impl FetchRecord {
    /// Pairs up `NAME value` items.
    pub fn from_pairs(items: &[Token]) -> Self {
        let items = items
            .chunks(2)
            .map(|pair| {
                let name = pair[0].text().into_owned();
                let value = pair.get(1).cloned().unwrap_or(Token::Atom(String::new()));
                (name, value)
            })
            .collect();
        Self { items }
    }

    /// Creates a record holding one item.
    pub fn single(name: impl Into<String>, value: Token) -> Self {
        Self {
            items: vec![(name.into(), value)],
        }
    }

    /// Looks up an item, ignoring case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Token> {
        self.items
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Iterates over the items in server order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Token)> {
        self.items.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the record holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::parser::decode_line;

    #[test]
    fn test_folder_status_pairs() {
        let line = decode_line(b"* STATUS \"INBOX\" (MESSAGES 42 UNSEEN 3 RECENT 2)\r\n");
        let status = FolderStatus::from_pairs(line[3].as_list().unwrap());
        assert_eq!(status.messages(), Some(42));
        assert_eq!(status.get("UNSEEN"), Some(3));
        assert_eq!(status.uidnext(), None);
    }

    #[test]
    fn test_quota_lines() {
        let lines = vec![
            decode_line(b"* QUOTAROOT INBOX \"\"\r\n"),
            decode_line(b"* QUOTA \"\" (STORAGE 10 512 MESSAGE 3 1000)\r\n"),
            decode_line(b"TAG1 OK Getquotaroot completed\r\n"),
        ];
        let info = QuotaInfo::from_lines(&lines);
        assert_eq!(info.roots, vec![String::new()]);
        assert_eq!(info.quotas.len(), 1);
        assert_eq!(
            info.quotas[0].resources[1],
            QuotaResource {
                name: "MESSAGE".to_string(),
                usage: 3,
                limit: 1000
            }
        );
    }

    #[test]
    fn test_fetch_record_lookup() {
        let line = decode_line(b"* 1 FETCH (UID 7 FLAGS (\\Seen) RFC822.SIZE 1024)\r\n");
        let record = FetchRecord::from_pairs(line[3].as_list().unwrap());
        assert_eq!(record.len(), 3);
        assert_eq!(record.get("uid").and_then(Token::number), Some(7));
        assert_eq!(record.get("rfc822.size").and_then(Token::number), Some(1024));
        assert!(record.get("BODY[]").is_none());
    }

    #[test]
    fn test_select_result_truthiness() {
        assert!(!SelectResult::default().is_truthy());
        let result = SelectResult {
            exists: Some(0),
            ..SelectResult::default()
        };
        assert!(result.is_truthy());
    }
}
