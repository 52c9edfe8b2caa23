//! Top-level entry point: run a request and assemble its response.

use crate::assembler::Assembler;
use crate::charset;
use crate::config::AssemblerConfig;
use crate::error::AssemblageError;
use crate::fetch::Fetcher;
use crate::header;
use crate::names::Resolution;
use crate::pipeline::Pipeline;
use crate::repository::Repository;
use assemblage_types::{ContentSource, Request, Response};
use std::sync::Arc;
use tracing::{debug, warn};

/// Assemblage engine shared by every request
#[derive(Clone)]
pub struct Engine {
    repository: Arc<dyn Repository>,
    pipeline: Arc<dyn Pipeline>,
    settings: Arc<AssemblerConfig>,
}

impl Engine {
    pub fn new(
        repository: Arc<dyn Repository>,
        pipeline: Arc<dyn Pipeline>,
        settings: AssemblerConfig,
    ) -> Self {
        Self {
            repository,
            pipeline,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &AssemblerConfig {
        &self.settings
    }

    /// Dispatch `request` and assemble the sections named by its trigger
    /// header into the response content.
    ///
    /// Without a trigger header the response passes through untouched. Any
    /// problem while assembling leaves the dispatched response as it was;
    /// only a failed dispatch turns into an error status.
    pub async fn process(&self, mut request: Request) -> Response {
        let trigger = self.settings.trigger_header.as_str();
        let names = header::requested_names(&request.headers, trigger);
        request.headers.remove(trigger);

        // Captured before dispatch; sub-fetches reuse them.
        let method = request.method.clone();
        let uri = request.uri.clone();
        let scheme = request.scheme.clone();
        let headers = request.headers.clone();

        let mut response = match self.pipeline.dispatch(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(uri = %uri, error = %err, "Pipeline dispatch failed");
                return Response::new(err.status()).with_text(err.text());
            }
        };

        if names.is_empty() || !response.has_content() {
            return response;
        }

        let content_type = response.content_type.clone().unwrap_or_default();
        let Some(assemblage) = self.repository.assemblage(&content_type) else {
            debug!(error = %AssemblageError::NoMatchersForContentType(content_type), "Skipping assembly");
            return response;
        };

        let fetcher = Fetcher::new(
            self.pipeline.as_ref(),
            self.settings.max_content_length,
            &self.settings.default_charset,
        );
        let assembler = Assembler::new(
            &assemblage,
            self.repository.as_ref(),
            &fetcher,
            &scheme,
            &headers,
        )
        .with_max_depth(self.settings.max_depth);

        let plan = match assembler.resolve(&method, &uri, &names, false) {
            Resolution::Plan(plan) => plan,
            Resolution::Verbatim | Resolution::Halt => return response,
        };

        // On failure the response keeps its status; a body that broke off
        // mid-read is replayed up to the same error.
        let fetched = match fetcher.buffer(&mut response).await {
            Ok(fetched) => fetched,
            Err(err) => {
                warn!(uri = %uri, error = %err, "Cannot fetch content");
                return response;
            }
        };

        debug!(uri = %uri, names = ?names, "Assembling content");
        let assembled = assembler.assemble(&plan, &fetched.text).await.concat();
        let bytes = match charset::encode(fetched.encoding, &assembled) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(uri = %uri, error = %err, "Returning content unassembled");
                return response;
            }
        };
        response.length = Some(bytes.len());
        response.source = Some(ContentSource::Buffered(bytes));
        response
    }
}
