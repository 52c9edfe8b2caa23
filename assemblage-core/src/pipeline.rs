//! The request pipeline the engine dispatches through.

use crate::error::FetchError;
use assemblage_types::{Request, Response};
use async_trait::async_trait;

/// Executes a request and produces its response
///
/// Used for the outer request and for every internal reference fetch.
/// Implementations report HTTP failures through the response status and
/// reserve `Err` for failures to obtain any response at all.
#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn dispatch(&self, request: Request) -> Result<Response, FetchError>;
}

