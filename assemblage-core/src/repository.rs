//! Matcher and assemblage lookup.

use crate::matcher::{Assemblage, Matcher};
use assemblage_types::Headers;
use regex::Regex;
use std::sync::Arc;

/// Source of assemblage configuration
pub trait Repository: Send + Sync {
    /// Ordered matchers for a resource, `None` when nothing is configured
    fn matchers(
        &self,
        assemblage: &Assemblage,
        method: &str,
        uri: &str,
        headers: &Headers,
    ) -> Option<Vec<Arc<Matcher>>>;

    /// Assemblage bound to a response media type
    fn assemblage(&self, content_type: &str) -> Option<Arc<Assemblage>>;
}

/// Resources sharing one set of matchers
#[derive(Debug, Clone)]
pub struct Resource {
    pub method: String,
    /// Matched against the slash-less path
    pub uri: Regex,
    /// Every header named here must have a value matching its pattern
    pub headers: Vec<(String, Regex)>,
    pub matchers: Vec<Arc<Matcher>>,
}

impl Resource {
    pub fn new(method: impl Into<String>, uri: Regex) -> Self {
        Self {
            method: method.into(),
            uri,
            headers: Vec::new(),
            matchers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, pattern: Regex) -> Self {
        self.headers.push((name.into(), pattern));
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matchers.push(Arc::new(matcher));
        self
    }

    fn applies(&self, method: &str, uri: &str, headers: &Headers) -> bool {
        self.method.eq_ignore_ascii_case(method)
            && self.uri.is_match(uri)
            && self.headers.iter().all(|(name, pattern)| {
                headers.get_all(name).any(|value| pattern.is_match(value))
            })
    }
}

#[derive(Debug, Clone)]
struct Entry {
    assemblage: Arc<Assemblage>,
    content_types: Vec<String>,
    resources: Vec<Resource>,
}

/// In-memory repository, usually compiled from the configuration file
#[derive(Debug, Clone, Default)]
pub struct StaticRepository {
    entries: Vec<Entry>,
}

impl StaticRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an assemblage for some content types, with its resources.
    pub fn insert<I, S>(&mut self, assemblage: Assemblage, content_types: I, resources: Vec<Resource>)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.entries.push(Entry {
            assemblage: Arc::new(assemblage),
            content_types: content_types
                .into_iter()
                .map(|ct| ct.as_ref().trim().to_ascii_lowercase())
                .collect(),
            resources,
        });
    }

    pub fn with<I, S>(mut self, assemblage: Assemblage, content_types: I, resources: Vec<Resource>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.insert(assemblage, content_types, resources);
        self
    }

    pub fn assemblages(&self) -> impl Iterator<Item = (&Assemblage, &[String])> {
        self.entries
            .iter()
            .map(|entry| (entry.assemblage.as_ref(), entry.content_types.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Repository for StaticRepository {
    fn matchers(
        &self,
        assemblage: &Assemblage,
        method: &str,
        uri: &str,
        headers: &Headers,
    ) -> Option<Vec<Arc<Matcher>>> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.assemblage.id == assemblage.id)?;
        entry
            .resources
            .iter()
            .find(|resource| resource.applies(method, uri, headers))
            .map(|resource| resource.matchers.clone())
            .filter(|matchers| !matchers.is_empty())
    }

    fn assemblage(&self, content_type: &str) -> Option<Arc<Assemblage>> {
        let (media, _) = assemblage_types::parse_content_type(content_type);
        self.entries
            .iter()
            .find(|entry| entry.content_types.iter().any(|ct| *ct == media))
            .map(|entry| Arc::clone(&entry.assemblage))
    }
}
