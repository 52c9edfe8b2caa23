//! Matchers and assemblage rules.
//!
//! A [`Matcher`] locates one kind of embeddable block inside response
//! content; an [`Assemblage`] carries the rules applied while splicing
//! fetched content into those blocks.

use crate::error::FetchError;
use regex::Regex;
use std::collections::{HashMap, HashSet};

/// Error slot substituted with the failure status code
pub const ERROR_STATUS: &str = "ERROR_STATUS";

/// Error slot substituted with the failure reason text
pub const ERROR_TEXT: &str = "ERROR_TEXT";

/// How a requested dotted name relates to a matcher name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch<'n> {
    /// The name is the matcher name itself
    Exact,
    /// The name is nested below the matcher; carries the remainder
    Child(&'n str),
}

/// A named extraction rule over response content
#[derive(Debug, Clone)]
pub struct Matcher {
    /// `None` for the default matcher that always applies
    pub name: Option<String>,
    name_prefix: Option<String>,
    /// Delimits one embeddable block per match
    pub pattern: Regex,
    /// Locates the reference URI inside a matched block
    pub reference: Option<Regex>,
    /// Sub-names already available inside the block without a fetch
    pub present: HashSet<String>,
}

impl Matcher {
    pub fn new(name: Option<String>, pattern: Regex) -> Self {
        let name_prefix = name.as_ref().map(|name| format!("{name}."));
        Self {
            name,
            name_prefix,
            pattern,
            reference: None,
            present: HashSet::new(),
        }
    }

    pub fn named(name: impl Into<String>, pattern: Regex) -> Self {
        Self::new(Some(name.into()), pattern)
    }

    pub fn unnamed(pattern: Regex) -> Self {
        Self::new(None, pattern)
    }

    pub fn with_reference(mut self, reference: Regex) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_present<I, S>(mut self, present: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.present = present.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_unnamed(&self) -> bool {
        self.name.is_none()
    }

    /// `name + "."`, used to spot child names
    pub fn name_prefix(&self) -> Option<&str> {
        self.name_prefix.as_deref()
    }

    /// Match a requested dotted name against this matcher.
    pub fn match_name<'n>(&self, requested: &'n str) -> Option<NameMatch<'n>> {
        if self.name.as_deref() == Some(requested) {
            return Some(NameMatch::Exact);
        }
        let prefix = self.name_prefix.as_deref()?;
        requested.strip_prefix(prefix).map(NameMatch::Child)
    }

    /// Whether every sub-name is already present in the block
    pub fn presents_all(&self, sub_names: &[String]) -> bool {
        !self.present.is_empty() && sub_names.iter().all(|name| self.present.contains(name))
    }

    /// Find the reference URI in a block: the first non-empty capture group.
    pub fn find_reference<'b>(&self, block: &'b str) -> Option<&'b str> {
        let captures = self.reference.as_ref()?.captures(block)?;
        captures
            .iter()
            .skip(1)
            .flatten()
            .map(|group| group.as_str())
            .find(|group| !group.is_empty())
    }
}

/// A pattern with its replacement template
#[derive(Debug, Clone)]
pub struct Replacer {
    pub pattern: Regex,
    pub template: String,
}

impl Replacer {
    pub fn new(pattern: Regex, template: impl Into<String>) -> Self {
        Self {
            pattern,
            template: template.into(),
        }
    }

    /// Replace every match in `text` using `template` in place of the
    /// configured one (after token substitution).
    fn replace_with(&self, text: &str, template: &str) -> String {
        self.pattern.replace_all(text, template).into_owned()
    }
}

/// Escape a value so the regex replacer inserts it literally.
fn literal(value: &str) -> String {
    value.replace('$', "$$")
}

/// Error and adjustment rules bound to a content type
#[derive(Debug, Clone, Default)]
pub struct Assemblage {
    /// Stable identity used by repositories to key their resources
    pub id: String,
    pub errors: HashMap<String, Replacer>,
    pub adjusters: Vec<Replacer>,
}

impl Assemblage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_error(mut self, slot: impl Into<String>, replacer: Replacer) -> Self {
        self.errors.insert(slot.into(), replacer);
        self
    }

    pub fn with_adjuster(mut self, replacer: Replacer) -> Self {
        self.adjusters.push(replacer);
        self
    }

    /// Render a failed block: the block is kept and each configured error
    /// slot has its `*` token replaced by the failure status or text.
    pub fn render_failure(&self, block: &str, error: &FetchError) -> String {
        let mut block = block.to_string();
        let status = error.status().to_string();
        for (slot, value) in [(ERROR_STATUS, status.as_str()), (ERROR_TEXT, error.text())] {
            if let Some(replacer) = self.errors.get(slot) {
                let template = replacer.template.replace('*', &literal(value));
                block = replacer.replace_with(&block, &template);
            }
        }
        block
    }

    /// Apply every adjuster in order, with `{1}`, `{2}`, ... in each template
    /// bound to the outer match groups.
    pub fn adjust(&self, content: String, groups: &[&str]) -> String {
        self.adjusters.iter().fold(content, |content, adjuster| {
            let template = groups
                .iter()
                .enumerate()
                .fold(adjuster.template.clone(), |template, (k, group)| {
                    template.replace(&format!("{{{}}}", k + 1), &literal(group))
                });
            adjuster.replace_with(&content, &template)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn re(pattern: &str) -> Regex {
        Regex::new(pattern).unwrap()
    }

    #[test]
    fn test_match_name() {
        let matcher = Matcher::named("box", re("<box>"));

        assert_eq!(matcher.name_prefix(), Some("box."));
        assert_eq!(matcher.match_name("box"), Some(NameMatch::Exact));
        assert_eq!(
            matcher.match_name("box.title.text"),
            Some(NameMatch::Child("title.text"))
        );
        assert_eq!(matcher.match_name("boxes"), None);
        assert_eq!(matcher.match_name("other"), None);
    }

    #[test]
    fn test_unnamed_matches_nothing_by_name() {
        let matcher = Matcher::unnamed(re("<box>"));
        assert!(matcher.is_unnamed());
        assert_eq!(matcher.match_name("box"), None);
    }

    #[test]
    fn test_find_reference_skips_empty_groups() {
        let matcher = Matcher::named("box", re("<box>"))
            .with_reference(re(r#"src="([^"]*)"|href="([^"]*)""#));

        assert_eq!(
            matcher.find_reference(r#"<box href="/x">"#),
            Some("/x")
        );
        assert_eq!(matcher.find_reference(r#"<box src="">"#), None);
        assert_eq!(matcher.find_reference("<box>"), None);
    }

    #[test]
    fn test_presents_all() {
        let matcher = Matcher::named("box", re("<box>")).with_present(["title", "id"]);
        assert!(matcher.presents_all(&["title".to_string()]));
        assert!(!matcher.presents_all(&["body".to_string()]));

        let bare = Matcher::named("box", re("<box>"));
        assert!(!bare.presents_all(&[]));
    }

    #[test]
    fn test_render_failure_is_idempotent() {
        let assemblage = Assemblage::new("html")
            .with_error(ERROR_STATUS, Replacer::new(re("ERR"), "code:*"))
            .with_error(ERROR_TEXT, Replacer::new(re("MSG"), "(*)"));
        let error = FetchError::Failed {
            status: 404,
            text: Some("Not Found".to_string()),
        };

        let block = r#"<box href="/x">ERR MSG</box>"#;
        let once = assemblage.render_failure(block, &error);
        assert_eq!(once, r#"<box href="/x">code:404 (Not Found)</box>"#);
        assert_eq!(assemblage.render_failure(&once, &error), once);
    }

    #[test]
    fn test_render_failure_without_slots_keeps_block() {
        let assemblage = Assemblage::new("html");
        let error = FetchError::UnknownEncoding("nope".to_string());
        assert_eq!(assemblage.render_failure("<box>ERR</box>", &error), "<box>ERR</box>");
    }

    #[test]
    fn test_adjust_binds_groups() {
        let assemblage = Assemblage::new("html")
            .with_adjuster(Replacer::new(re("<h1>"), "<h1 class=\"{1}\">"))
            .with_adjuster(Replacer::new(re("Title"), "Heading"));

        let adjusted = assemblage.adjust("<h1>Title</h1>".to_string(), &["wide$1"]);
        assert_eq!(adjusted, "<h1 class=\"wide$1\">Heading</h1>");
    }
}
