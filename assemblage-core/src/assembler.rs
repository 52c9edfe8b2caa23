//! Recursive assembly of content against a matcher plan.
//!
//! The plan is consumed from its end: the last entry is applied to the
//! whole content, and the text between its matches is assembled with the
//! entries before it. Matched blocks are dropped, kept, or replaced by the
//! content their reference points to, which is assembled in turn with a
//! plan resolved for that reference.

use crate::error::AssemblageError;
use crate::fetch::Fetcher;
use crate::matcher::{Assemblage, Matcher};
use crate::names::{self, PlanEntry, Resolution};
use crate::repository::Repository;
use assemblage_types::{Headers, Parameters, GET};
use futures::future::BoxFuture;
use regex::Captures;
use tracing::debug;
use url::Url;

/// Root that reference URIs are resolved against
const INTERNAL_ROOT: &str = "http://assemblage.internal/";

/// Default nesting limit for reference expansion
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// Assembly context for one inbound request
pub struct Assembler<'a> {
    assemblage: &'a Assemblage,
    repository: &'a dyn Repository,
    fetcher: &'a Fetcher<'a>,
    scheme: &'a str,
    headers: &'a Headers,
    max_depth: usize,
}

impl<'a> Assembler<'a> {
    pub fn new(
        assemblage: &'a Assemblage,
        repository: &'a dyn Repository,
        fetcher: &'a Fetcher<'a>,
        scheme: &'a str,
        headers: &'a Headers,
    ) -> Self {
        Self {
            assemblage,
            repository,
            fetcher,
            scheme,
            headers,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Look up the matchers for a URI and resolve `names` against them.
    pub fn resolve(&self, method: &str, uri: &str, names: &[String], trim: bool) -> Resolution {
        match self
            .repository
            .matchers(self.assemblage, method, uri, self.headers)
        {
            Some(matchers) => names::resolve(&matchers, names, trim),
            None => {
                debug!(error = %AssemblageError::NoMatchersForUri(uri.to_string()), "Skipping assembly");
                Resolution::Halt
            }
        }
    }

    /// Assemble `content` with `plan`, returning fragments in document order.
    pub fn assemble<'s>(&'s self, plan: &'s [PlanEntry], content: &'s str) -> BoxFuture<'s, Vec<String>> {
        self.assemble_at(plan, content, 0)
    }

    fn assemble_at<'s>(
        &'s self,
        plan: &'s [PlanEntry],
        content: &'s str,
        depth: usize,
    ) -> BoxFuture<'s, Vec<String>> {
        Box::pin(async move {
            // Entries whose blocks need no work are dropped from the stack.
            let mut stack = plan;
            let (entry, rest) = loop {
                match stack.split_last() {
                    None => return vec![content.to_string()],
                    Some((entry, rest)) if !entry.needs_scan() => stack = rest,
                    Some(top) => break top,
                }
            };

            let matches: Vec<Captures<'s>> = entry.matcher().pattern.captures_iter(content).collect();
            let mut assembled = Vec::with_capacity(matches.len() * 2 + 1);
            let mut current = 0;

            for captures in &matches {
                let Some(whole) = captures.get(0) else {
                    continue;
                };
                self.scope(rest, &content[current..whole.start()], depth, &mut assembled)
                    .await;
                current = whole.end();

                match entry {
                    PlanEntry::Exclude(_) => {}
                    PlanEntry::IncludeOpaque(_) => assembled.push(whole.as_str().to_string()),
                    PlanEntry::IncludeWithReference { matcher, sub_names } => {
                        let expanded = self.expand(matcher, sub_names, captures, depth).await;
                        assembled.push(expanded);
                    }
                }
            }

            self.scope(rest, &content[current..], depth, &mut assembled)
                .await;
            assembled
        })
    }

    /// Text outside the current matcher's blocks goes to the rest of the stack.
    async fn scope(&self, rest: &[PlanEntry], text: &str, depth: usize, out: &mut Vec<String>) {
        if rest.is_empty() {
            out.push(text.to_string());
        } else {
            out.extend(self.assemble_at(rest, text, depth).await);
        }
    }

    /// Replace one block by the assembled content of its reference.
    async fn expand(
        &self,
        matcher: &Matcher,
        sub_names: &[String],
        captures: &Captures<'_>,
        depth: usize,
    ) -> String {
        let block = captures.get(0).map_or("", |m| m.as_str());
        if depth >= self.max_depth {
            debug!(depth, "Reference nesting limit reached, keeping block");
            return block.to_string();
        }

        let Some(reference) = matcher.find_reference(block) else {
            debug!(error = %AssemblageError::UnresolvableReference, block, "Keeping block");
            return block.to_string();
        };
        let (uri, parameters) = parse_reference(reference);

        let sub_plan = match self.resolve(GET, &uri, sub_names, true) {
            Resolution::Halt => return block.to_string(),
            Resolution::Verbatim => None,
            Resolution::Plan(plan) => Some(plan),
        };

        let content = match self
            .fetcher
            .fetch(&uri, parameters, self.scheme, self.headers)
            .await
        {
            Ok(content) => content,
            Err(err) => {
                debug!(
                    uri = %uri,
                    status = err.status(),
                    text = err.text(),
                    "Cannot fetch reference content"
                );
                return self.assemblage.render_failure(block, &err);
            }
        };

        let content = match sub_plan {
            Some(plan) => self.assemble_at(&plan, &content, depth + 1).await.concat(),
            None => content,
        };

        let groups: Vec<&str> = captures
            .iter()
            .skip(1)
            .map(|group| group.map_or("", |m| m.as_str()))
            .collect();
        self.assemblage.adjust(content, &groups)
    }
}

/// Split a reference into its slash-less path and decoded query pairs.
///
/// Absolute URLs keep only their path and query.
pub fn parse_reference(reference: &str) -> (String, Parameters) {
    match Url::parse(INTERNAL_ROOT).and_then(|root| root.join(reference.trim())) {
        Ok(url) => (
            url.path().trim_start_matches('/').to_string(),
            url.query_pairs().into_owned().collect(),
        ),
        Err(_) => {
            let path = reference.split(['?', '#']).next().unwrap_or_default();
            (path.trim_start_matches('/').to_string(), Vec::new())
        }
    }
}
