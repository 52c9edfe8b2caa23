//! Shared types for assemblage
//!
//! This crate provides the plain request/response shapes exchanged between
//! the assemblage engine, its pipeline implementations, and the proxy.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;

/// The only method used for internal reference fetches.
pub const GET: &str = "GET";

/// Query parameters in the order they appeared.
pub type Parameters = Vec<(String, String)>;

/// Whether a status code reports success (2xx).
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Ordered header list with case-insensitive lookup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing values with the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// Replace every value of `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.0.push((name, value.into()));
    }

    /// First value for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All values for `name`, in insertion order
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Remove every value of `name`, returning how many were dropped.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.0.len();
        self.0.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        before - self.0.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Headers(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A request travelling through the pipeline
///
/// `uri` is the resource path without its leading slash, matching how
/// repository resources are keyed.
#[derive(Debug, Clone)]
pub struct Request {
    pub scheme: String,
    pub method: String,
    pub uri: String,
    pub parameters: Parameters,
    pub headers: Headers,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            scheme: "http".to_string(),
            method: method.into(),
            uri: uri.into().trim_start_matches('/').to_string(),
            parameters: Vec::new(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// Internal GET for `uri`
    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(GET, uri)
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Response body as produced by a pipeline
pub enum ContentSource {
    /// Fully buffered bytes
    Buffered(Bytes),
    /// Chunked stream that must be drained before decoding
    Stream(BoxStream<'static, io::Result<Bytes>>),
}

impl ContentSource {
    pub fn is_buffered(&self) -> bool {
        matches!(self, ContentSource::Buffered(_))
    }

    /// Read at most `limit` bytes of the source into one buffer.
    ///
    /// Reading stops at the first chunk that crosses the limit. Whatever was
    /// consumed is handed back in front of the unread rest, so the content
    /// can still be forwarded untouched.
    pub async fn read_bounded(self, limit: usize) -> Bounded {
        let mut body = match self {
            ContentSource::Buffered(bytes) if bytes.len() > limit => {
                return Bounded::Exceeded(ContentSource::Buffered(bytes));
            }
            ContentSource::Buffered(bytes) => return Bounded::Complete(bytes),
            ContentSource::Stream(body) => body,
        };

        let mut buffer = BytesMut::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(chunk) => buffer.extend_from_slice(&chunk),
                Err(err) => {
                    let replay = io::Error::new(err.kind(), err.to_string());
                    let failure = stream::once(async move { Err(replay) });
                    let source = replay_before(buffer.freeze(), failure);
                    return Bounded::Interrupted(source, err);
                }
            }
            if buffer.len() > limit {
                return Bounded::Exceeded(replay_before(buffer.freeze(), body));
            }
        }
        Bounded::Complete(buffer.freeze())
    }
}

fn replay_before<S>(prefix: Bytes, rest: S) -> ContentSource
where
    S: Stream<Item = io::Result<Bytes>> + Send + 'static,
{
    ContentSource::Stream(stream::once(async move { Ok(prefix) }).chain(rest).boxed())
}

/// Outcome of [`ContentSource::read_bounded`]
#[derive(Debug)]
pub enum Bounded {
    /// The whole content, within the limit
    Complete(Bytes),
    /// More than the limit; the source is handed back in full
    Exceeded(ContentSource),
    /// The source failed part-way; the bytes read so far are replayed
    /// before the same error
    Interrupted(ContentSource, io::Error),
}

impl fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentSource::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            ContentSource::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for ContentSource {
    fn from(bytes: Bytes) -> Self {
        ContentSource::Buffered(bytes)
    }
}

impl From<&'static str> for ContentSource {
    fn from(text: &'static str) -> Self {
        ContentSource::Buffered(Bytes::from_static(text.as_bytes()))
    }
}

impl From<String> for ContentSource {
    fn from(text: String) -> Self {
        ContentSource::Buffered(Bytes::from(text))
    }
}

/// Response produced by a pipeline dispatch
#[derive(Debug)]
pub struct Response {
    pub status: u16,
    /// Reason text reported alongside the status, if any
    pub text: Option<String>,
    pub headers: Headers,
    /// Media type without parameters
    pub content_type: Option<String>,
    pub charset: Option<String>,
    /// Declared content length in bytes
    pub length: Option<usize>,
    pub source: Option<ContentSource>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            text: None,
            headers: Headers::new(),
            content_type: None,
            charset: None,
            length: None,
            source: None,
        }
    }

    /// Successful response with buffered content
    pub fn ok(content_type: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            content_type: Some(content_type.into()),
            length: Some(body.len()),
            source: Some(ContentSource::Buffered(body)),
            ..Self::new(200)
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn is_success(&self) -> bool {
        is_success(self.status)
    }

    /// Successful and carrying a content source
    pub fn has_content(&self) -> bool {
        self.is_success() && self.source.is_some()
    }
}

/// Split a `Content-Type` value into its media type and charset parameter.
pub fn parse_content_type(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let media = parts.next().unwrap_or("").trim().to_ascii_lowercase();
    let charset = parts.find_map(|part| {
        let (key, val) = part.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| val.trim().trim_matches('"').to_string())
    });
    (media, charset)
}
