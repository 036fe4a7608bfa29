//! Per-command response container.
//!
//! Every request produces a [`Response`]: the tag it was sent with, the raw
//! lines written and read, errors recorded along the way, the typed result and
//! the summaries of any sub-requests it stacked. Whether it succeeded is
//! recomputed from those parts on every call.

use std::collections::BTreeMap;

use crate::parser::Token;
use crate::{Error, Result};

/// Decoded lines of a response, terminal line included.
pub type Lines = Vec<Vec<Token>>;

/// Truthiness of a result value.
///
/// A response whose result is not truthy only counts as successful when it
/// was marked as allowed to be empty.
pub trait ResultData {
    /// Returns true if the value carries data.
    fn is_truthy(&self) -> bool;
}

impl ResultData for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

impl ResultData for u32 {
    fn is_truthy(&self) -> bool {
        *self != 0
    }
}

impl ResultData for u64 {
    fn is_truthy(&self) -> bool {
        *self != 0
    }
}

impl ResultData for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> ResultData for Vec<T> {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl<K, V> ResultData for BTreeMap<K, V> {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl<T: ResultData> ResultData for Option<T> {
    fn is_truthy(&self) -> bool {
        self.as_ref().is_some_and(ResultData::is_truthy)
    }
}

/// Outcome of one request.
#[derive(Debug, Clone)]
pub struct Response<T> {
    sequence: String,
    commands: Vec<String>,
    lines: Vec<String>,
    errors: Vec<String>,
    result: Option<T>,
    sub_responses: Vec<Response<bool>>,
    can_be_empty: bool,
}

impl<T> Response<T> {
    /// Creates an empty response for the request tagged `sequence`.
    #[must_use]
    pub fn new(sequence: impl Into<String>) -> Self {
        Self {
            sequence: sequence.into(),
            commands: Vec::new(),
            lines: Vec::new(),
            errors: Vec::new(),
            result: None,
            sub_responses: Vec::new(),
            can_be_empty: false,
        }
    }

    /// Replaces the result, changing its type.
    #[must_use]
    pub fn with_result<U>(self, result: U) -> Response<U> {
        Response {
            sequence: self.sequence,
            commands: self.commands,
            lines: self.lines,
            errors: self.errors,
            result: Some(result),
            sub_responses: self.sub_responses,
            can_be_empty: self.can_be_empty,
        }
    }

    /// Replaces the result in place.
    pub fn set_result(&mut self, result: T) {
        self.result = Some(result);
    }

    /// Allows an empty result to count as success.
    #[must_use]
    pub const fn set_can_be_empty(mut self, can_be_empty: bool) -> Self {
        self.can_be_empty = can_be_empty;
        self
    }

    /// Records an error.
    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Records a line written to the server.
    pub fn add_command(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }

    /// Records a raw line read from the server; the line ending is dropped.
    pub fn add_line(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        self.lines
            .push(text.trim_end_matches(['\r', '\n']).to_string());
    }

    /// Tag of the request.
    #[must_use]
    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    /// Lines written to the server.
    #[must_use]
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Raw lines read from the server.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Errors recorded while handling the request.
    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Summaries of stacked sub-requests.
    #[must_use]
    pub fn sub_responses(&self) -> &[Response<bool>] {
        &self.sub_responses
    }

    /// Whether an empty result counts as success.
    #[must_use]
    pub const fn can_be_empty(&self) -> bool {
        self.can_be_empty
    }

    /// Borrows the result.
    #[must_use]
    pub const fn data(&self) -> Option<&T> {
        self.result.as_ref()
    }

    /// Takes the result.
    #[must_use]
    pub fn into_data(self) -> Option<T> {
        self.result
    }
}

impl<T: ResultData> Response<T> {
    /// Stacks a sub-request, keeping only its summary.
    pub fn stack<U: ResultData>(&mut self, sub: &Response<U>) {
        self.sub_responses.push(sub.summarize());
    }

    /// Collapses the response into one carrying its own success as result.
    #[must_use]
    pub fn summarize(&self) -> Response<bool> {
        Response {
            sequence: self.sequence.clone(),
            commands: self.commands.clone(),
            lines: self.lines.clone(),
            errors: self.errors.clone(),
            result: Some(self.successful()),
            sub_responses: Vec::new(),
            can_be_empty: self.can_be_empty,
        }
    }

    /// Returns true if no line carries a tagged `BAD`/`NO`, the result is
    /// truthy (or allowed to be empty), no error was recorded and every
    /// sub-request succeeded.
    #[must_use]
    pub fn successful(&self) -> bool {
        let bad = format!("{} BAD ", self.sequence);
        let no = format!("{} NO ", self.sequence);
        let clean_lines = self
            .lines
            .iter()
            .all(|line| !line.starts_with(&bad) && !line.starts_with(&no));

        clean_lines
            && (self.can_be_empty || self.result.is_truthy())
            && self.errors.is_empty()
            && self.sub_responses.iter().all(Response::successful)
    }

    /// Negation of [`successful`](Self::successful).
    #[must_use]
    pub fn failed(&self) -> bool {
        !self.successful()
    }

    /// Same as [`successful`](Self::successful).
    #[must_use]
    pub fn boolean(&self) -> bool {
        self.successful()
    }

    /// Borrows the result of a successful response.
    ///
    /// # Errors
    ///
    /// `ResponseFailed` if the response failed or carries no result.
    pub fn validated_data(&self) -> Result<&T> {
        self.check()?;
        self.result.as_ref().ok_or_else(|| self.no_data())
    }

    /// Takes the result of a successful response.
    ///
    /// # Errors
    ///
    /// `ResponseFailed` if the response failed or carries no result.
    pub fn into_validated(self) -> Result<T> {
        self.check()?;
        let error = self.no_data();
        self.result.ok_or(error)
    }

    fn check(&self) -> Result<()> {
        if self.successful() {
            return Ok(());
        }
        let mut reasons = self.errors.clone();
        reasons.extend(
            self.sub_responses
                .iter()
                .filter(|sub| sub.failed())
                .flat_map(|sub| sub.errors.iter().cloned()),
        );
        let detail = if reasons.is_empty() {
            self.lines
                .last()
                .cloned()
                .unwrap_or_else(|| format!("request {} failed", self.sequence))
        } else {
            reasons.join("; ")
        };
        Err(Error::ResponseFailed(detail))
    }

    fn no_data(&self) -> Error {
        Error::ResponseFailed(format!("request {} returned no data", self.sequence))
    }
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
    use super::*;

    #[test]
    fn test_empty_result_fails_unless_allowed() {
        let response: Response<Vec<u32>> = Response::<Lines>::new("TAG1").with_result(Vec::new());
        assert!(response.failed());

        let response = response.set_can_be_empty(true);
        assert!(response.successful());
    }

    #[test]
    fn test_missing_result_fails() {
        let response: Response<Lines> = Response::new("TAG1");
        assert!(response.failed());
        assert!(response.into_validated().is_err());
    }

    #[test]
    fn test_tagged_no_line_fails() {
        let mut response = Response::<Lines>::new("TAG3").with_result(true);
        response.add_line(b"* 1 EXISTS\r\n");
        assert!(response.successful());

        response.add_line(b"TAG3 NO [NONEXISTENT] Unknown Mailbox\r\n");
        assert!(response.failed());
    }

    #[test]
    fn test_other_tag_does_not_count() {
        let mut response = Response::<Lines>::new("TAG3").with_result(true);
        response.add_line(b"TAG30 NO nope\r\n");
        assert!(response.successful());
    }

    #[test]
    fn test_errors_fail_and_surface() {
        let mut response = Response::<Lines>::new("TAG2").with_result(true);
        response.add_error("request failed");
        assert!(!response.boolean());

        let err = response.into_validated().unwrap_err();
        assert!(matches!(err, Error::ResponseFailed(msg) if msg == "request failed"));
    }

    #[test]
    fn test_failed_sub_response_fails_parent() {
        let mut child: Response<bool> = Response::<bool>::new("TAG1").with_result(true);
        child.add_error("failed to send literal string");

        let mut parent = Response::<Lines>::new("TAG2").with_result(vec![1u32]);
        parent.stack(&child);
        assert!(parent.failed());
        assert_eq!(parent.sub_responses().len(), 1);
        assert_eq!(parent.sub_responses()[0].data(), Some(&false));

        let err = parent.validated_data().unwrap_err();
        assert!(err.to_string().contains("failed to send literal string"));
    }

    #[test]
    fn test_with_result_keeps_history() {
        let mut response: Response<Lines> = Response::new("TAG7");
        response.add_command("TAG7 NOOP");
        response.add_line(b"TAG7 OK NOOP completed\r\n");

        let response = response.with_result(42u32);
        assert_eq!(response.commands(), ["TAG7 NOOP"]);
        assert_eq!(response.lines(), ["TAG7 OK NOOP completed"]);
        assert_eq!(response.into_validated().unwrap(), 42);
    }

    #[test]
    fn test_option_truthiness() {
        assert!(!None::<u32>.is_truthy());
        assert!(!Some(0u32).is_truthy());
        assert!(Some(String::from("x")).is_truthy());
    }
}
