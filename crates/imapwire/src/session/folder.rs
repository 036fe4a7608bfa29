//! Folder commands: SELECT/EXAMINE, STATUS, LIST and folder management.

use std::collections::BTreeMap;

use tokio::io::{AsyncRead, AsyncWrite};

use super::types::{FolderEntry, FolderStatus, SelectResult};
use super::{ConnectionState, Session, as_u32, untagged};
use crate::command::{Arg, escape_list, escape_string};
use crate::dispatch::Completion;
use crate::parser::{Token, decode_line, split_tag};
use crate::response::{Lines, Response};
use crate::{Error, Result};

/// STATUS items requested when the caller names none.
const DEFAULT_STATUS_ITEMS: [&str; 5] = ["MESSAGES", "UNSEEN", "RECENT", "UIDNEXT", "UIDVALIDITY"];

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Selects a folder read-write. The UID cache is cleared.
    pub async fn select_folder(&mut self, folder: &str) -> Result<Response<SelectResult>> {
        self.examine_or_select("SELECT", folder).await
    }

    /// Selects a folder read-only. The UID cache is cleared.
    pub async fn examine_folder(&mut self, folder: &str) -> Result<Response<SelectResult>> {
        self.examine_or_select("EXAMINE", folder).await
    }

    async fn examine_or_select(
        &mut self,
        command: &str,
        folder: &str,
    ) -> Result<Response<SelectResult>> {
        self.uid_cache.clear();
        let dispatcher = self.dispatcher()?;
        let mut response: Response<SelectResult> = dispatcher
            .send_request(command, &[escape_string(folder)], None)
            .await?;
        let tag = response.sequence().to_string();

        let mut result = SelectResult::default();
        let mut nonexistent = false;
        let terminal = loop {
            let raw = dispatcher.next_line(&mut response).await?;
            let tokens = decode_line(&raw);
            nonexistent |= tokens.get(2).is_some_and(|t| t.is("[NONEXISTENT]"));
            let (leading, _) = split_tag(&raw);
            if leading == tag {
                break tokens;
            }
            apply_select_line(&mut result, &tokens);
        };
        if nonexistent {
            return Err(Error::Runtime("folder doesn't exist".to_string()));
        }

        response.set_result(result);
        if Completion::of(&terminal) == Completion::Ok {
            tracing::debug!(folder, command, "Folder opened");
            self.selected = Some(folder.to_string());
            self.state = ConnectionState::Selected(folder.to_string());
        } else {
            response.add_error("request failed");
        }
        Ok(response)
    }

    /// Requests STATUS attributes; `None` asks for messages, unseen, recent,
    /// uidnext and uidvalidity.
    pub async fn folder_status(
        &mut self,
        folder: &str,
        items: Option<&[&str]>,
    ) -> Result<Response<FolderStatus>> {
        let items = items.unwrap_or(&DEFAULT_STATUS_ITEMS);
        let args = [escape_string(folder), Arg::Plain(escape_list(items))];
        let response = self
            .dispatcher()?
            .request_and_response("STATUS", &args)
            .await?;

        let status = untagged(response.validated_data()?, "STATUS")
            .find_map(|line| line.get(3).and_then(Token::as_list))
            .map(FolderStatus::from_pairs)
            .ok_or_else(|| Error::Runtime("folder status could not be fetched".to_string()))?;
        Ok(response.with_result(status))
    }

    /// Lists folders matching `pattern` under `reference`.
    pub async fn folders(
        &mut self,
        reference: &str,
        pattern: &str,
    ) -> Result<Response<BTreeMap<String, FolderEntry>>> {
        let args = [escape_string(reference), escape_string(pattern)];
        let response = self
            .dispatcher()?
            .request_and_response("LIST", &args)
            .await?;

        let mut folders = BTreeMap::new();
        for line in untagged(response.data().map(Vec::as_slice).unwrap_or_default(), "LIST") {
            if line.len() != 5 {
                continue;
            }
            let delimiter = (!line[3].is_nil()).then(|| unescape(&line[3].text()));
            let flags = line[2]
                .as_list()
                .map(|flags| flags.iter().map(|f| f.text().into_owned()).collect())
                .unwrap_or_default();
            folders.insert(unescape(&line[4].text()), FolderEntry { delimiter, flags });
        }
        Ok(response.with_result(folders).set_can_be_empty(true))
    }

    /// Creates a folder.
    pub async fn create_folder(&mut self, folder: &str) -> Result<Response<Lines>> {
        self.folder_command("CREATE", &[escape_string(folder)]).await
    }

    /// Deletes a folder.
    pub async fn delete_folder(&mut self, folder: &str) -> Result<Response<Lines>> {
        self.folder_command("DELETE", &[escape_string(folder)]).await
    }

    /// Renames a folder.
    pub async fn rename_folder(&mut self, old: &str, new: &str) -> Result<Response<Lines>> {
        self.folder_command("RENAME", &[escape_string(old), escape_string(new)])
            .await
    }

    /// Subscribes to a folder.
    pub async fn subscribe_folder(&mut self, folder: &str) -> Result<Response<Lines>> {
        self.folder_command("SUBSCRIBE", &[escape_string(folder)]).await
    }

    /// Unsubscribes from a folder.
    pub async fn unsubscribe_folder(&mut self, folder: &str) -> Result<Response<Lines>> {
        self.folder_command("UNSUBSCRIBE", &[escape_string(folder)])
            .await
    }

    /// Permanently removes messages flagged `\Deleted`. The UID cache is
    /// cleared.
    pub async fn expunge(&mut self) -> Result<Response<Lines>> {
        self.uid_cache.clear();
        self.folder_command("EXPUNGE", &[]).await
    }

    async fn folder_command(&mut self, command: &str, args: &[Arg]) -> Result<Response<Lines>> {
        self.dispatcher()?.request_and_response(command, args).await
    }
}

fn apply_select_line(result: &mut SelectResult, tokens: &[Token]) {
    let (Some(first), Some(second)) = (tokens.get(1), tokens.get(2)) else {
        return;
    };

    if first.is("FLAGS") {
        result.flags = second
            .as_list()
            .map(|flags| flags.iter().map(|f| f.text().into_owned()).collect())
            .unwrap_or_default();
        return;
    }

    let code_value = || tokens.get(3).and_then(as_u32);
    if second.is("EXISTS") {
        result.exists = as_u32(first);
    } else if second.is("RECENT") {
        result.recent = as_u32(first);
    } else if second.is("[UIDVALIDITY") {
        result.uidvalidity = code_value();
    } else if second.is("[UIDNEXT") {
        result.uidnext = code_value();
    } else if second.is("[UNSEEN") {
        result.unseen = code_value();
    }
}

/// Undoes quoted-string escaping of folder names.
fn unescape(name: &str) -> String {
    name.replace("\\\"", "\"").replace("\\\\", "\\")
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

    #[tokio::test]
    async fn test_select_parses_folder_state() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 SELECT \"INBOX\"\r\n")
            .read(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n")
            .read(b"* 172 EXISTS\r\n")
            .read(b"* 1 RECENT\r\n")
            .read(b"* OK [UNSEEN 12] Message 12 is first unseen\r\n")
            .read(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n")
            .read(b"* OK [UIDNEXT 4392] Predicted next UID\r\n")
            .read(b"TAG1 OK [READ-WRITE] SELECT completed\r\n")
            .build();
        let mut session = session(mock).await;

        let response = session.select_folder("INBOX").await.unwrap();
        assert!(response.successful());
        let result = response.into_validated().unwrap();
        assert_eq!(result.exists, Some(172));
        assert_eq!(result.recent, Some(1));
        assert_eq!(result.unseen, Some(12));
        assert_eq!(result.uidvalidity, Some(3857529045));
        assert_eq!(result.uidnext, Some(4392));
        assert_eq!(result.flags.len(), 5);
        assert_eq!(
            session.state(),
            &ConnectionState::Selected("INBOX".to_string())
        );
    }

    #[tokio::test]
    async fn test_select_nonexistent() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 SELECT \"Nope\"\r\n")
            .read(b"TAG1 NO [NONEXISTENT] Unknown Mailbox: Nope\r\n")
            .build();
        let mut session = session(mock).await;

        let err = session.select_folder("Nope").await.unwrap_err();
        assert!(matches!(err, Error::Runtime(msg) if msg == "folder doesn't exist"));
    }

    #[tokio::test]
    async fn test_examine_non_ok_records_error() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 EXAMINE \"Locked\"\r\n")
            .read(b"* 3 EXISTS\r\n")
            .read(b"TAG1 NO Mailbox is locked\r\n")
            .build();
        let mut session = session(mock).await;

        let response = session.examine_folder("Locked").await.unwrap();
        assert!(response.failed());
        assert_eq!(response.errors(), ["request failed"]);
        assert_eq!(session.state(), &ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_folder_status_missing_data() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(
                b"TAG1 STATUS \"INBOX\" (MESSAGES UNSEEN RECENT UIDNEXT UIDVALIDITY)\r\n",
            )
            .read(b"TAG1 OK STATUS completed\r\n")
            .build();
        let mut session = session(mock).await;

        let err = session.folder_status("INBOX", None).await.unwrap_err();
        assert!(matches!(err, Error::Runtime(msg) if msg == "folder status could not be fetched"));
    }

    #[tokio::test]
    async fn test_folder_status_custom_items() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 STATUS \"Sent\" (MESSAGES)\r\n")
            .read(b"* STATUS Sent (MESSAGES 9)\r\n")
            .read(b"TAG1 OK STATUS completed\r\n")
            .build();
        let mut session = session(mock).await;

        let status = session
            .folder_status("Sent", Some(&["MESSAGES"]))
            .await
            .unwrap()
            .into_validated()
            .unwrap();
        assert_eq!(status.messages(), Some(9));
    }

    #[tokio::test]
    async fn test_folders_unescape_and_nil_delimiter() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 LIST \"\" \"*\"\r\n")
            .read(b"* LIST (\\Noselect) NIL \"Public\"\r\n")
            .read(b"* LIST () \"/\" \"say \\\"hi\\\"\"\r\n")
            .read(b"* LIST (\\HasNoChildren) \"/\"\r\n")
            .read(b"TAG1 OK LIST completed\r\n")
            .build();
        let mut session = session(mock).await;

        let folders = session.folders("", "*").await.unwrap().into_validated().unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders["Public"].delimiter, None);
        assert_eq!(folders["say \"hi\""].delimiter.as_deref(), Some("/"));
    }

    #[tokio::test]
    async fn test_folders_empty_is_successful() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 LIST \"\" \"Archive/*\"\r\n")
            .read(b"TAG1 OK LIST completed\r\n")
            .build();
        let mut session = session(mock).await;

        let response = session.folders("", "Archive/*").await.unwrap();
        assert!(response.successful());
        assert!(response.data().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_folder_management_commands() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 CREATE \"Projects\"\r\n")
            .read(b"TAG1 OK CREATE completed\r\n")
            .write(b"TAG2 RENAME \"Projects\" \"Archive\"\r\n")
            .read(b"TAG2 OK RENAME completed\r\n")
            .write(b"TAG3 SUBSCRIBE \"Archive\"\r\n")
            .read(b"TAG3 OK SUBSCRIBE completed\r\n")
            .write(b"TAG4 UNSUBSCRIBE \"Archive\"\r\n")
            .read(b"TAG4 OK UNSUBSCRIBE completed\r\n")
            .write(b"TAG5 DELETE \"Archive\"\r\n")
            .read(b"TAG5 NO [NONEXISTENT] gone\r\n")
            .build();
        let mut session = session(mock).await;

        assert!(session.create_folder("Projects").await.unwrap().successful());
        assert!(
            session
                .rename_folder("Projects", "Archive")
                .await
                .unwrap()
                .successful()
        );
        assert!(session.subscribe_folder("Archive").await.unwrap().successful());
        assert!(
            session
                .unsubscribe_folder("Archive")
                .await
                .unwrap()
                .successful()
        );
        let err = session.delete_folder("Archive").await.unwrap_err();
        assert!(matches!(err, Error::ServerError { .. }));
    }

    #[tokio::test]
    async fn test_examine_clears_uid_cache_of_previous_folder() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 SELECT \"INBOX\"\r\n")
            .read(b"* 1 EXISTS\r\n")
            .read(b"TAG1 OK [READ-WRITE] SELECT completed\r\n")
            .write(b"TAG2 UID FETCH 1:* (UID)\r\n")
            .read(b"* 1 FETCH (UID 101)\r\n")
            .read(b"TAG2 OK FETCH completed\r\n")
            .write(b"TAG3 EXAMINE \"Archive\"\r\n")
            .read(b"* 1 EXISTS\r\n")
            .read(b"TAG3 OK [READ-ONLY] EXAMINE completed\r\n")
            .write(b"TAG4 UID FETCH 1:* (UID)\r\n")
            .read(b"* 1 FETCH (UID 7)\r\n")
            .read(b"TAG4 OK FETCH completed\r\n")
            .build();
        let mut session = session(mock).await;

        session.select_folder("INBOX").await.unwrap();
        assert_eq!(session.get_uid(1).await.unwrap(), 101);

        session.examine_folder("Archive").await.unwrap();
        assert_eq!(
            session.state(),
            &ConnectionState::Selected("Archive".to_string())
        );
        assert!(session.uid_cache().is_empty());
        assert_eq!(session.get_uid(1).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_untagged_nonexistent_drains_to_tag() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"TAG1 SELECT \"Gone\"\r\n")
            .read(b"* NO [NONEXISTENT] Unknown Mailbox: Gone\r\n")
            .read(b"TAG1 NO SELECT failed\r\n")
            .write(b"TAG2 NOOP\r\n")
            .read(b"TAG2 OK NOOP completed\r\n")
            .build();
        let mut session = session(mock).await;

        let err = session.select_folder("Gone").await.unwrap_err();
        assert!(matches!(err, Error::Runtime(msg) if msg == "folder doesn't exist"));

        let noop = session.noop().await.unwrap();
        assert!(noop.successful());
        assert_eq!(noop.sequence(), "TAG2");
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape(r#"a \"b\" c\\d"#), r#"a "b" c\d"#);
    }
}
