//! # assemblage-core
//!
//! Content assemblage for REST responses.
//!
//! A response body may contain blocks that reference other resources. The
//! engine resolves which blocks the caller asked for (by dotted name in a
//! request header), fetches the referenced resources through the same
//! pipeline, assembles them recursively, and splices the result back into
//! one document. Unavailable references degrade to their original block
//! with error placeholders filled in.

pub mod assembler;
pub mod charset;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod header;
pub mod matcher;
pub mod names;
pub mod pipeline;
pub mod repository;

pub use assembler::{parse_reference, Assembler};
pub use config::{AssemblerConfig, Config, ServerConfig};
pub use engine::Engine;
pub use error::{AssemblageError, ConfigError, FetchError};
pub use fetch::{Fetched, Fetcher};
pub use header::{requested_names, RequestedName};
pub use matcher::{Assemblage, Matcher, NameMatch, Replacer, ERROR_STATUS, ERROR_TEXT};
pub use names::{resolve, PlanEntry, Resolution, WILDCARD};
pub use pipeline::Pipeline;
pub use repository::{Repository, Resource, StaticRepository};

// Re-export shared types from assemblage-types
pub use assemblage_types::{ContentSource, Headers, Parameters, Request, Response};
