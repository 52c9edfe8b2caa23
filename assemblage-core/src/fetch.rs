//! Fetch adapter: one internal GET, bounded and decoded to text.

use crate::charset;
use crate::error::FetchError;
use crate::pipeline::Pipeline;
use assemblage_types::{Bounded, ContentSource, Headers, Parameters, Request, Response};
use encoding_rs::Encoding;

/// Decoded content of a response
#[derive(Debug, Clone)]
pub struct Fetched {
    pub text: String,
    pub encoding: &'static Encoding,
}

/// Issues internal fetches through a pipeline
pub struct Fetcher<'a> {
    pipeline: &'a dyn Pipeline,
    max_length: usize,
    default_charset: &'a str,
}

impl<'a> Fetcher<'a> {
    pub fn new(pipeline: &'a dyn Pipeline, max_length: usize, default_charset: &'a str) -> Self {
        Self {
            pipeline,
            max_length,
            default_charset,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// GET `uri` and return its text. A single attempt is made.
    pub async fn fetch(
        &self,
        uri: &str,
        parameters: Parameters,
        scheme: &str,
        headers: &Headers,
    ) -> Result<String, FetchError> {
        let request = Request::get(uri)
            .with_scheme(scheme)
            .with_headers(headers.clone())
            .with_parameters(parameters);

        let response = self.pipeline.dispatch(request).await?;
        if !response.has_content() {
            return Err(FetchError::Failed {
                status: response.status,
                text: response.text,
            });
        }

        let encoding = self.encoding(&response)?;
        self.check_declared(&response)?;
        let Some(source) = response.source else {
            return Err(FetchError::Failed {
                status: response.status,
                text: response.text,
            });
        };
        match source.read_bounded(self.max_length).await {
            Bounded::Complete(bytes) => Ok(charset::decode(encoding, &bytes)),
            Bounded::Exceeded(_) => Err(FetchError::ResponseTooLarge {
                maximum: self.max_length,
            }),
            Bounded::Interrupted(_, err) => Err(err.into()),
        }
    }

    /// Decode the content of an already dispatched response.
    ///
    /// At most `max_length + 1` bytes are read. Whatever was read goes back
    /// into the response, so on failure it can still be delivered as it
    /// came.
    pub async fn buffer(&self, response: &mut Response) -> Result<Fetched, FetchError> {
        let encoding = self.encoding(response)?;
        self.check_declared(response)?;

        let Some(source) = response.source.take() else {
            return Err(FetchError::Failed {
                status: response.status,
                text: response.text.clone(),
            });
        };
        let bytes = match source.read_bounded(self.max_length).await {
            Bounded::Complete(bytes) => bytes,
            Bounded::Exceeded(source) => {
                response.source = Some(source);
                return Err(FetchError::ResponseTooLarge {
                    maximum: self.max_length,
                });
            }
            Bounded::Interrupted(source, err) => {
                response.source = Some(source);
                return Err(err.into());
            }
        };
        response.length = Some(bytes.len());
        response.source = Some(ContentSource::Buffered(bytes.clone()));

        Ok(Fetched {
            text: charset::decode(encoding, &bytes),
            encoding,
        })
    }

    fn encoding(&self, response: &Response) -> Result<&'static Encoding, FetchError> {
        charset::lookup(response.charset.as_deref().unwrap_or(self.default_charset))
    }

    fn check_declared(&self, response: &Response) -> Result<(), FetchError> {
        match response.length {
            Some(length) if length > self.max_length => Err(FetchError::ResponseTooLarge {
                maximum: self.max_length,
            }),
            _ => Ok(()),
        }
    }
}
