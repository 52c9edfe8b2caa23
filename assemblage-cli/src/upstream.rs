//! Pipeline forwarding requests to the origin server over HTTP.

use anyhow::{Context, Result};
use assemblage_core::{FetchError, Pipeline};
use assemblage_types::{parse_content_type, ContentSource, Headers, Request, Response};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, Method, Url};
use std::io;

/// Headers that describe a single connection and never travel further
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|hop| hop.eq_ignore_ascii_case(name))
}

/// Request headers replaced by the client for the upstream connection.
///
/// `Accept-Encoding` is dropped so bodies arrive uncompressed and can be
/// assembled.
fn is_forwarded(name: &str) -> bool {
    !is_hop_by_hop(name)
        && !["host", "content-length", "accept-encoding"]
            .iter()
            .any(|skip| skip.eq_ignore_ascii_case(name))
}

pub struct UpstreamPipeline {
    client: Client,
    base: Url,
}

impl UpstreamPipeline {
    pub fn new(upstream: &str) -> Result<Self> {
        let mut base =
            Url::parse(upstream).with_context(|| format!("Invalid upstream URL: {upstream}"))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url_for(&self, uri: &str) -> Result<Url, FetchError> {
        self.base
            .join(uri.trim_start_matches('/'))
            .map_err(|err| FetchError::Transport(format!("Invalid URI {uri}: {err}")))
    }
}

#[async_trait]
impl Pipeline for UpstreamPipeline {
    async fn dispatch(&self, request: Request) -> Result<Response, FetchError> {
        let url = self.url_for(&request.uri)?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let mut builder = self.client.request(method, url);
        if !request.parameters.is_empty() {
            builder = builder.query(&request.parameters);
        }
        for (name, value) in request.headers.iter() {
            if is_forwarded(name) {
                builder = builder.header(name, value);
            }
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let upstream = builder
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = upstream.status();
        let mut headers = Headers::new();
        for (name, value) in upstream.headers() {
            match value.to_str() {
                Ok(value) => headers.append(name.as_str(), value),
                Err(_) => tracing::debug!(header = %name, "Dropping non-text response header"),
            }
        }
        let (content_type, charset) = match headers.get("content-type") {
            Some(value) => {
                let (media, charset) = parse_content_type(value);
                (Some(media), charset)
            }
            None => (None, None),
        };
        let length = upstream
            .content_length()
            .and_then(|length| usize::try_from(length).ok());
        let stream = upstream.bytes_stream().map_err(io::Error::other).boxed();

        Ok(Response {
            status: status.as_u16(),
            text: status.canonical_reason().map(String::from),
            headers,
            content_type,
            charset,
            length,
            source: Some(ContentSource::Stream(stream)),
        })
    }
}
