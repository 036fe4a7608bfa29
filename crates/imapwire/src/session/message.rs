//! Message commands: FETCH and its shortcuts, STORE, SEARCH, COPY/MOVE,
//! APPEND, and the UID map built on top of FETCH.

use std::collections::BTreeMap;

use tokio::io::{AsyncRead, AsyncWrite};

use super::header::parse_header;
use super::types::FetchRecord;
use super::{Session, as_u32, untagged};
use crate::command::{
    Arg, RangeEnd, SequenceSet, StoreMode, build_set, escape_list, escape_string,
};
use crate::config::SequenceMode;
use crate::dispatch::Completion;
use crate::parser::{Token, decode_line, flatten, split_tag};
use crate::response::{Lines, Response};
use crate::{Error, Result};

/// Header attributes of one message, keyed by lower-cased field name.
pub type Overview = BTreeMap<String, String>;

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Fetches `items` for every message in `set`, keyed by UID or message
    /// number depending on `mode`.
    ///
    /// With a single item only lines carrying that item are kept. A
    /// [`SequenceSet::Single`] set keeps only the line for that id; the
    /// remaining lines up to the tag are read and dropped.
    pub async fn fetch<I: AsRef<str>>(
        &mut self,
        items: &[I],
        set: impl Into<SequenceSet>,
        mode: SequenceMode,
    ) -> Result<Response<BTreeMap<u32, FetchRecord>>> {
        let set = set.into();
        let single_item = match items {
            [only] => Some(only.as_ref()),
            _ => None,
        };
        let args = [Arg::Plain(set.to_string()), Arg::Plain(escape_list(items))];

        let dispatcher = self.dispatcher()?;
        let mut response: Response<BTreeMap<u32, FetchRecord>> = dispatcher
            .send_request(&mode.command("FETCH"), &args, None)
            .await?;
        let tag = response.sequence().to_string();

        let mut result = BTreeMap::new();
        let mut found = false;
        loop {
            let raw = dispatcher.next_line(&mut response).await?;
            let tokens = decode_line(&raw);
            let (leading, _) = split_tag(&raw);
            if leading == tag {
                ensure_ok(&tokens)?;
                break;
            }
            if found {
                continue;
            }

            let Some((id, record)) = fetch_entry(&tokens, mode, single_item) else {
                continue;
            };
            if let SequenceSet::Single(wanted) = set {
                if id != wanted {
                    continue;
                }
                found = true;
            }
            result.insert(id, record);
        }

        if set.is_single() && !found {
            return Err(Error::Runtime(
                "the requested item was not found".to_string(),
            ));
        }
        Ok(response.with_result(result))
    }

    /// Fetches message bodies (`<rfc>.TEXT`).
    pub async fn content(
        &mut self,
        set: impl Into<SequenceSet>,
        rfc: &str,
        mode: SequenceMode,
    ) -> Result<Response<BTreeMap<u32, Vec<u8>>>> {
        self.fetch_bytes(format!("{rfc}.TEXT"), set.into(), mode).await
    }

    /// Fetches message headers (`<rfc>.HEADER`).
    pub async fn headers(
        &mut self,
        set: impl Into<SequenceSet>,
        rfc: &str,
        mode: SequenceMode,
    ) -> Result<Response<BTreeMap<u32, Vec<u8>>>> {
        self.fetch_bytes(format!("{rfc}.HEADER"), set.into(), mode).await
    }

    async fn fetch_bytes(
        &mut self,
        item: String,
        set: SequenceSet,
        mode: SequenceMode,
    ) -> Result<Response<BTreeMap<u32, Vec<u8>>>> {
        let response = self.fetch(&[item.as_str()], set, mode).await?;
        let data = map_records(&response, |record| {
            record
                .get(&item)
                .and_then(Token::as_bytes)
                .map(<[u8]>::to_vec)
        });
        Ok(response.with_result(data))
    }

    /// Fetches flag lists.
    pub async fn flags(
        &mut self,
        set: impl Into<SequenceSet>,
        mode: SequenceMode,
    ) -> Result<Response<BTreeMap<u32, Vec<String>>>> {
        let response = self.fetch(&["FLAGS"], set, mode).await?;
        let data = map_records(&response, |record| {
            record.get("FLAGS").and_then(Token::as_list).map(texts)
        });
        Ok(response.with_result(data))
    }

    /// Fetches message sizes (`RFC822.SIZE`).
    pub async fn sizes(
        &mut self,
        set: impl Into<SequenceSet>,
        mode: SequenceMode,
    ) -> Result<Response<BTreeMap<u32, u64>>> {
        let response = self.fetch(&["RFC822.SIZE"], set, mode).await?;
        let data = map_records(&response, |record| {
            record.get("RFC822.SIZE").and_then(Token::number)
        });
        Ok(response.with_result(data))
    }

    /// Changes flags with `STORE set (+|-)FLAGS[.SILENT] (flags)`.
    ///
    /// Without `silent` the result maps each message number to its new
    /// flags. With `silent` the server sends no flags back, so the result is
    /// empty and the raw lines are only available through
    /// [`Response::lines`].
    pub async fn store<F: AsRef<str>>(
        &mut self,
        flags: &[F],
        set: impl Into<SequenceSet>,
        mode: StoreMode,
        silent: bool,
        seq: SequenceMode,
    ) -> Result<Response<BTreeMap<u32, Vec<String>>>> {
        let args = [
            Arg::Plain(set.into().to_string()),
            Arg::Plain(mode.item(silent)),
            Arg::Plain(escape_list(flags)),
        ];
        let response = self
            .dispatcher()?
            .request_and_response(&seq.command("STORE"), &args)
            .await?;
        if silent {
            return Ok(response
                .with_result(BTreeMap::new())
                .set_can_be_empty(true));
        }

        let mut result = BTreeMap::new();
        for line in untagged_fetches(response.data()) {
            let Some(msgno) = line.get(1).and_then(as_u32) else {
                continue;
            };
            let Some(items) = line.get(3).and_then(Token::as_list) else {
                continue;
            };
            if let Some(flags) = find_item(items, "FLAGS").and_then(Token::as_list) {
                result.insert(msgno, texts(flags));
            }
        }
        Ok(response.with_result(result))
    }

    /// Runs `SEARCH criteria...` and returns the matching ids in server
    /// order. An empty result is a success.
    pub async fn search<C: AsRef<str>>(
        &mut self,
        criteria: &[C],
        seq: SequenceMode,
    ) -> Result<Response<Vec<u32>>> {
        let args: Vec<Arg> = criteria.iter().map(|c| Arg::from(c.as_ref())).collect();
        let response = self
            .dispatcher()?
            .request_and_response(&seq.command("SEARCH"), &args)
            .await?;
        let ids = untagged(response.data().map(Vec::as_slice).unwrap_or_default(), "SEARCH")
            .flat_map(|line| line.iter().skip(2).filter_map(as_u32))
            .collect();
        Ok(response.with_result(ids).set_can_be_empty(true))
    }

    /// Copies messages to `folder`.
    pub async fn copy_message(
        &mut self,
        folder: &str,
        set: impl Into<SequenceSet>,
        seq: SequenceMode,
    ) -> Result<Response<Lines>> {
        self.transfer("COPY", folder, set.into(), seq).await
    }

    /// Copies a list of messages to `folder`.
    pub async fn copy_many_messages(
        &mut self,
        messages: &[u32],
        folder: &str,
        seq: SequenceMode,
    ) -> Result<Response<Lines>> {
        self.transfer("COPY", folder, SequenceSet::from(messages), seq)
            .await
    }

    /// Moves messages to `folder` (RFC 6851).
    pub async fn move_message(
        &mut self,
        folder: &str,
        set: impl Into<SequenceSet>,
        seq: SequenceMode,
    ) -> Result<Response<Lines>> {
        self.transfer("MOVE", folder, set.into(), seq).await
    }

    /// Moves a list of messages to `folder`.
    pub async fn move_many_messages(
        &mut self,
        messages: &[u32],
        folder: &str,
        seq: SequenceMode,
    ) -> Result<Response<Lines>> {
        self.transfer("MOVE", folder, SequenceSet::from(messages), seq)
            .await
    }

    async fn transfer(
        &mut self,
        command: &str,
        folder: &str,
        set: SequenceSet,
        seq: SequenceMode,
    ) -> Result<Response<Lines>> {
        let args = [Arg::Plain(set.to_string()), escape_string(folder)];
        self.dispatcher()?
            .request_and_response(&seq.command(command), &args)
            .await
    }

    /// Appends a message to `folder`, optionally with flags and an internal
    /// date. The message goes out as a literal.
    pub async fn append_message(
        &mut self,
        folder: &str,
        message: &str,
        flags: Option<&[&str]>,
        date: Option<&str>,
    ) -> Result<Response<Lines>> {
        let mut args = vec![escape_string(folder)];
        if let Some(flags) = flags {
            args.push(Arg::Plain(escape_list(flags)));
        }
        if let Some(date) = date {
            args.push(escape_string(date));
        }
        args.push(escape_string(message));

        self.dispatcher()?
            .request_and_response("APPEND", &args)
            .await
    }

    /// Returns the message-number → UID map of the selected folder.
    ///
    /// The map is refetched with `UID FETCH 1:* (UID)` when the cache is
    /// disabled or empty.
    pub async fn uid_map(&mut self) -> Result<Response<BTreeMap<u32, u32>>> {
        if !self.uid_cache.is_enabled() || self.uid_cache.is_empty() {
            let response = self
                .fetch(&["UID"], SequenceSet::all(), SequenceMode::Uid)
                .await?;
            let uids = response.data().map(|map| map.keys().copied().collect());
            self.uid_cache.set(uids);
        }

        let map = self.uid_cache.map().clone();
        Ok(Response::<Lines>::new("").with_result(map).set_can_be_empty(true))
    }

    /// Returns the UID of a message number.
    ///
    /// A miss on a populated cache clears it and retries once.
    pub async fn get_uid(&mut self, msgno: u32) -> Result<u32> {
        let mut retried = false;
        loop {
            self.uid_map().await?;
            if let Some(uid) = self.uid_cache.get(msgno) {
                return Ok(uid);
            }
            if retried || !self.uid_cache.is_enabled() || self.uid_cache.is_empty() {
                return Err(Error::MessageNotFound(format!(
                    "unique id not found: {msgno}"
                )));
            }
            self.uid_cache.clear();
            retried = true;
        }
    }

    /// Returns the message number of a UID.
    pub async fn get_message_number(&mut self, uid: u32) -> Result<u32> {
        self.uid_map().await?.validated_data()?;
        self.uid_cache
            .message_number(uid)
            .ok_or_else(|| Error::MessageNotFound(format!("message number not found: {uid}")))
    }

    /// Parses the RFC 822 header of every message whose id lies in
    /// `from..=to`.
    pub async fn overview(
        &mut self,
        from: u32,
        to: RangeEnd,
        seq: SequenceMode,
    ) -> Result<Response<BTreeMap<u32, Overview>>> {
        let mut response = self.uid_map().await?;
        let range = build_set(from, Some(to));
        let ids: Vec<u32> = response
            .data()
            .into_iter()
            .flatten()
            .map(|(&msgno, &uid)| match seq {
                SequenceMode::Uid => uid,
                SequenceMode::MessageNumber => msgno,
            })
            .filter(|&id| range.contains(id))
            .collect();

        let mut result = BTreeMap::new();
        if !ids.is_empty() {
            let headers = self.headers(ids, "RFC822", seq).await?;
            response.stack(&headers);
            for (&id, raw) in headers.data().into_iter().flatten() {
                result.insert(id, parse_header(&String::from_utf8_lossy(raw)));
            }
        }
        Ok(response.with_result(result))
    }
}

/// Fails with `ServerError` unless a tagged line says `OK`.
fn ensure_ok(tokens: &[Token]) -> Result<()> {
    match Completion::of(tokens) {
        Completion::Ok => Ok(()),
        Completion::Failed(status) => Err(Error::ServerError {
            status,
            message: flatten(&tokens[1..]),
        }),
        Completion::Unknown => Err(Error::BadRequest(format!(
            "unexpected response: {}",
            flatten(tokens)
        ))),
    }
}

/// Keys an untagged FETCH line by UID or message number and extracts its
/// items. Lines without a usable UID are skipped in UID mode.
fn fetch_entry(
    tokens: &[Token],
    mode: SequenceMode,
    single_item: Option<&str>,
) -> Option<(u32, FetchRecord)> {
    if !tokens.first()?.is("*") || !tokens.get(2)?.is("FETCH") {
        return None;
    }
    let items = tokens.get(3)?.as_list()?;
    let id = match mode {
        SequenceMode::Uid => uid_of(items)?,
        SequenceMode::MessageNumber => as_u32(tokens.get(1)?)?,
    };

    let record = match single_item {
        Some(name) => FetchRecord::single(name, find_item(items, name)?.clone()),
        None => FetchRecord::from_pairs(items),
    };
    Some((id, record))
}

/// Finds the UID: the trailing pair, then the leading pair, then the first
/// `UID` atom anywhere in the list.
fn uid_of(items: &[Token]) -> Option<u32> {
    let n = items.len();
    if n >= 2 && items[n - 2].is("UID") {
        return as_u32(&items[n - 1]);
    }
    if items.first().is_some_and(|t| t.is("UID")) {
        return items.get(1).and_then(as_u32);
    }
    let pos = items.iter().position(|t| t.is("UID"))?;
    items.get(pos + 1).and_then(as_u32)
}

/// Value following the item `name` in a `NAME value ...` list.
fn find_item<'a>(items: &'a [Token], name: &str) -> Option<&'a Token> {
    items
        .chunks(2)
        .find(|pair| pair[0].is(name))
        .and_then(|pair| pair.get(1))
}

fn untagged_fetches(lines: Option<&Lines>) -> impl Iterator<Item = &Vec<Token>> {
    lines.into_iter().flatten().filter(|line| {
        line.first().is_some_and(|t| t.is("*")) && line.get(2).is_some_and(|t| t.is("FETCH"))
    })
}

fn map_records<T>(
    response: &Response<BTreeMap<u32, FetchRecord>>,
    mut extract: impl FnMut(&FetchRecord) -> Option<T>,
) -> BTreeMap<u32, T> {
    response
        .data()
        .into_iter()
        .flatten()
        .filter_map(|(&id, record)| extract(record).map(|value| (id, value)))
        .collect()
}

fn texts(tokens: &[Token]) -> Vec<String> {
    tokens.iter().map(|t| t.text().into_owned()).collect()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use tokio_test::io::Builder;

    use super::super::tests::session;
    use super::*;
    use crate::parser::decode_line;

    #[test]
    fn test_uid_of_fallback_chain() {
        let trailing = decode_line(b"(FLAGS (\\Seen) UID 9)");
        assert_eq!(uid_of(trailing[0].as_list().unwrap()), Some(9));

        let leading = decode_line(b"(UID 4 FLAGS (\\Seen))");
        assert_eq!(uid_of(leading[0].as_list().unwrap()), Some(4));

        let middle = decode_line(b"(FLAGS () UID 12 RFC822.SIZE 300)");
        assert_eq!(uid_of(middle[0].as_list().unwrap()), Some(12));

        let none = decode_line(b"(FLAGS (\\Seen))");
        assert_eq!(uid_of(none[0].as_list().unwrap()), None);
    }

    #[tokio::test]
    async fn test_fetch_skips_lines_without_uid() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 UID FETCH 1:* (FLAGS UID)\r\n")
            .read(b"* 1 FETCH (FLAGS (\\Seen) UID 10)\r\n")
            .read(b"* 2 FETCH (FLAGS (\\Seen))\r\n")
            .read(b"* 3 FETCH (UID 30 FLAGS ())\r\n")
            .read(b"TAG1 OK FETCH completed\r\n")
            .build();
        let mut session = session(mock).await;

        let result = session
            .fetch(&["FLAGS", "UID"], 1.., SequenceMode::Uid)
            .await
            .unwrap()
            .into_validated()
            .unwrap();
        assert_eq!(result.keys().copied().collect::<Vec<_>>(), vec![10, 30]);
        assert_eq!(result[&30].len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_single_id_drains_and_filters() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 FETCH 2 (RFC822.SIZE)\r\n")
            .read(b"* 1 FETCH (RFC822.SIZE 100)\r\n")
            .read(b"* 2 FETCH (RFC822.SIZE 200)\r\n")
            .read(b"* 3 EXISTS\r\n")
            .read(b"TAG1 OK FETCH completed\r\n")
            .build();
        let mut session = session(mock).await;

        let sizes = session
            .sizes(2, SequenceMode::MessageNumber)
            .await
            .unwrap()
            .into_validated()
            .unwrap();
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[&2], 200);
    }

    #[tokio::test]
    async fn test_fetch_single_id_missing() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 UID FETCH 5 (FLAGS)\r\n")
            .read(b"* 1 FETCH (UID 4 FLAGS ())\r\n")
            .read(b"TAG1 OK FETCH completed\r\n")
            .build();
        let mut session = session(mock).await;

        let err = session.flags(5, SequenceMode::Uid).await.unwrap_err();
        assert!(matches!(err, Error::Runtime(msg) if msg == "the requested item was not found"));
    }

    #[tokio::test]
    async fn test_single_item_keeps_only_lines_with_item() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 UID FETCH 1:2 (RFC822.TEXT)\r\n")
            .read(b"* 1 FETCH (UID 1 RFC822.TEXT {5}\r\nhello)\r\n")
            .read(b"* 2 FETCH (UID 2 FLAGS (\\Seen))\r\n")
            .read(b"TAG1 OK FETCH completed\r\n")
            .build();
        let mut session = session(mock).await;

        let bodies = session
            .content(1..=2, "RFC822", SequenceMode::Uid)
            .await
            .unwrap()
            .into_validated()
            .unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[&1], b"hello");
    }

    #[tokio::test]
    async fn test_store_returns_new_flags() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 UID STORE 7 +FLAGS (\\Seen \\Flagged)\r\n")
            .read(b"* 3 FETCH (FLAGS (\\Seen \\Flagged) UID 7)\r\n")
            .read(b"TAG1 OK STORE completed\r\n")
            .build();
        let mut session = session(mock).await;

        let result = session
            .store(&["\\Seen", "\\Flagged"], 7, StoreMode::Add, false, SequenceMode::Uid)
            .await
            .unwrap()
            .into_validated()
            .unwrap();
        assert_eq!(result[&3], vec!["\\Seen", "\\Flagged"]);
    }

    #[tokio::test]
    async fn test_store_silent() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 STORE 1:3 -FLAGS.SILENT (\\Deleted)\r\n")
            .read(b"TAG1 OK STORE completed\r\n")
            .build();
        let mut session = session(mock).await;

        let response = session
            .store(
                &["\\Deleted"],
                1..=3,
                StoreMode::Remove,
                true,
                SequenceMode::MessageNumber,
            )
            .await
            .unwrap();
        assert!(response.successful());
        assert_eq!(response.lines(), ["TAG1 OK STORE completed"]);
    }

    #[tokio::test]
    async fn test_search() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 UID SEARCH UNSEEN SINCE 1-Feb-2024\r\n")
            .read(b"* SEARCH 4 9 12\r\n")
            .read(b"TAG1 OK SEARCH completed\r\n")
            .write(b"TAG2 SEARCH DELETED\r\n")
            .read(b"* SEARCH\r\n")
            .read(b"TAG2 OK SEARCH completed\r\n")
            .build();
        let mut session = session(mock).await;

        let ids = session
            .search(&["UNSEEN", "SINCE", "1-Feb-2024"], SequenceMode::Uid)
            .await
            .unwrap()
            .into_validated()
            .unwrap();
        assert_eq!(ids, vec![4, 9, 12]);

        let empty = session
            .search(&["DELETED"], SequenceMode::MessageNumber)
            .await
            .unwrap();
        assert!(empty.successful());
        assert!(empty.data().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_copy_and_move() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 UID COPY 3:* \"Archive\"\r\n")
            .read(b"TAG1 OK COPY completed\r\n")
            .write(b"TAG2 MOVE 1,4,5 \"Trash\"\r\n")
            .read(b"TAG2 OK MOVE completed\r\n")
            .build();
        let mut session = session(mock).await;

        let copied = session
            .copy_message("Archive", 3.., SequenceMode::Uid)
            .await
            .unwrap();
        assert!(copied.successful());

        let moved = session
            .move_many_messages(&[1, 4, 5], "Trash", SequenceMode::MessageNumber)
            .await
            .unwrap();
        assert!(moved.successful());
    }

    #[tokio::test]
    async fn test_append_with_flags_and_date() {
        let message = "Subject: hi\r\n\r\nbody\r\n";
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 APPEND \"Sent\" (\\Seen) \"01-Feb-2024 10:00:00 +0000\" {21}\r\n")
            .read(b"+ Ready for literal data\r\n")
            .write(b"Subject: hi\r\n\r\nbody\r\n\r\n")
            .read(b"TAG1 OK [APPENDUID 38505 3955] APPEND completed\r\n")
            .build();
        let mut session = session(mock).await;

        let response = session
            .append_message(
                "Sent",
                message,
                Some(&["\\Seen"]),
                Some("01-Feb-2024 10:00:00 +0000"),
            )
            .await
            .unwrap();
        assert!(response.successful());
    }

    #[tokio::test]
    async fn test_get_uid_retries_once_then_fails() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 UID FETCH 1:* (UID)\r\n")
            .read(b"* 1 FETCH (UID 10)\r\n")
            .read(b"TAG1 OK FETCH completed\r\n")
            .write(b"TAG2 UID FETCH 1:* (UID)\r\n")
            .read(b"* 1 FETCH (UID 10)\r\n")
            .read(b"TAG2 OK FETCH completed\r\n")
            .build();
        let mut session = session(mock).await;

        let err = session.get_uid(2).await.unwrap_err();
        assert!(matches!(err, Error::MessageNotFound(_)));
    }

    #[tokio::test]
    async fn test_get_message_number() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 UID FETCH 1:* (UID)\r\n")
            .read(b"* 1 FETCH (UID 10)\r\n")
            .read(b"* 2 FETCH (UID 17)\r\n")
            .read(b"TAG1 OK FETCH completed\r\n")
            .build();
        let mut session = session(mock).await;

        assert_eq!(session.get_message_number(17).await.unwrap(), 2);
        assert!(matches!(
            session.get_message_number(99).await,
            Err(Error::MessageNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_overview() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 UID FETCH 1:* (UID)\r\n")
            .read(b"* 1 FETCH (UID 10)\r\n")
            .read(b"* 2 FETCH (UID 17)\r\n")
            .read(b"* 3 FETCH (UID 20)\r\n")
            .read(b"TAG1 OK FETCH completed\r\n")
            .write(b"TAG2 UID FETCH 17,20 (RFC822.HEADER)\r\n")
            .read(b"* 2 FETCH (UID 17 RFC822.HEADER {25}\r\nSubject: A\r\nFrom: x@y.z\r\n)\r\n")
            .read(b"* 3 FETCH (UID 20 RFC822.HEADER {14}\r\nSubject: B\r\n\r\n)\r\n")
            .read(b"TAG2 OK FETCH completed\r\n")
            .build();
        let mut session = session(mock).await;

        let overview = session
            .overview(15, RangeEnd::Unbounded, SequenceMode::Uid)
            .await
            .unwrap();
        assert!(overview.successful());
        let overview = overview.into_validated().unwrap();
        assert_eq!(overview.len(), 2);
        assert_eq!(overview[&17]["subject"], "A");
        assert_eq!(overview[&17]["from"], "x@y.z");
        assert_eq!(overview[&20]["subject"], "B");
    }
}
