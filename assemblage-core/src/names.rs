//! Name resolution: which matchers apply to a set of requested names.
//!
//! Requested names are dotted paths. A name equal to a matcher name selects
//! that matcher; a name below it (`box.title`) selects the matcher and
//! carries the remainder (`title`) into the referenced content. With
//! trimming enabled, matchers nobody asked for are stripped from the
//! content.

use crate::matcher::{Matcher, NameMatch};
use std::sync::Arc;

/// Requested name that disables trimming
pub const WILDCARD: &str = "*";

/// One decision of a matcher plan
#[derive(Debug, Clone)]
pub enum PlanEntry {
    /// Strip every block of the matcher
    Exclude(Arc<Matcher>),
    /// Keep the blocks as they are; nothing to expand
    IncludeOpaque(Arc<Matcher>),
    /// Replace each block by the content its reference points to, resolving
    /// `sub_names` inside it (empty means no name filter)
    IncludeWithReference {
        matcher: Arc<Matcher>,
        sub_names: Vec<String>,
    },
}

impl PlanEntry {
    /// Classify an included matcher by the work its blocks need.
    pub fn include(matcher: Arc<Matcher>, sub_names: Vec<String>) -> Self {
        let opaque = match matcher.reference {
            None => true,
            Some(_) => sub_names.is_empty() && !matcher.present.is_empty(),
        };
        if opaque {
            PlanEntry::IncludeOpaque(matcher)
        } else {
            PlanEntry::IncludeWithReference { matcher, sub_names }
        }
    }

    pub fn matcher(&self) -> &Arc<Matcher> {
        match self {
            PlanEntry::Exclude(matcher)
            | PlanEntry::IncludeOpaque(matcher)
            | PlanEntry::IncludeWithReference { matcher, .. } => matcher,
        }
    }

    pub fn is_include(&self) -> bool {
        !matches!(self, PlanEntry::Exclude(_))
    }

    /// Whether the assembler has to scan content for this entry
    pub fn needs_scan(&self) -> bool {
        !matches!(self, PlanEntry::IncludeOpaque(_))
    }
}

/// Outcome of resolving names against the matchers of one URI
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Nothing to assemble; leave the content or block alone
    Halt,
    /// Proceed, using the content as it comes
    Verbatim,
    /// Proceed, assembling with this plan (consumed from the end)
    Plan(Vec<PlanEntry>),
}

impl Resolution {
    pub fn proceeds(&self) -> bool {
        !matches!(self, Resolution::Halt)
    }

    fn from_plan(plan: Vec<PlanEntry>) -> Self {
        if plan.is_empty() {
            Resolution::Verbatim
        } else {
            Resolution::Plan(plan)
        }
    }
}

/// Matcher selected by at least one name, with its accumulated sub-names
struct Selected {
    name: String,
    matcher: Arc<Matcher>,
    sub_names: Vec<String>,
}

/// Resolve `names` against `matchers` into a plan.
///
/// An empty `names` slice means the caller asked for nothing in
/// particular.
pub fn resolve(matchers: &[Arc<Matcher>], names: &[String], trim: bool) -> Resolution {
    if matchers.is_empty() {
        return Resolution::Halt;
    }

    if let Some(default) = matchers.iter().find(|matcher| matcher.is_unnamed()) {
        if names.is_empty() {
            return Resolution::Verbatim;
        }
        return Resolution::from_plan(vec![PlanEntry::include(
            Arc::clone(default),
            names.to_vec(),
        )]);
    }

    let (mut outstanding, mut trim) = if names.is_empty() {
        if matchers.len() == 1 {
            return Resolution::Verbatim;
        }
        // Keep only the first matcher; the others get stripped.
        let first = matchers[0].name.clone().unwrap_or_default();
        (vec![first], true)
    } else {
        (names.to_vec(), trim)
    };

    let mut selected: Vec<Selected> = Vec::new();
    let mut missing: Vec<Arc<Matcher>> = Vec::new();
    let mut candidates = matchers.iter();

    while let Some(matcher) = candidates.next() {
        let mut found = false;
        outstanding.retain(|requested| {
            let Some(name_match) = matcher.match_name(requested) else {
                return true;
            };
            found = true;
            select(&mut selected, matcher, name_match);
            false
        });
        if !found {
            missing.push(Arc::clone(matcher));
        }
        if outstanding.is_empty() {
            missing.extend(candidates.by_ref().cloned());
            break;
        }
    }

    if trim && outstanding.iter().any(|name| name == WILDCARD) {
        trim = false;
    }
    if trim && selected.is_empty() {
        return Resolution::Halt;
    }

    let mut plan = Vec::with_capacity(selected.len() + missing.len());
    for Selected {
        matcher, sub_names, ..
    } in selected
    {
        if trim && !sub_names.is_empty() && matcher.presents_all(&sub_names) {
            continue;
        }
        plan.push(PlanEntry::include(matcher, sub_names));
    }
    if trim {
        plan.extend(missing.into_iter().map(PlanEntry::Exclude));
    }

    Resolution::from_plan(plan)
}

fn select(selected: &mut Vec<Selected>, matcher: &Arc<Matcher>, name_match: NameMatch<'_>) {
    let name = matcher.name.clone().unwrap_or_default();
    let entry = match selected.iter().position(|entry| entry.name == name) {
        Some(index) => {
            selected[index].matcher = Arc::clone(matcher);
            &mut selected[index]
        }
        None => {
            selected.push(Selected {
                name,
                matcher: Arc::clone(matcher),
                sub_names: Vec::new(),
            });
            let last = selected.len() - 1;
            &mut selected[last]
        }
    };
    if let NameMatch::Child(sub_name) = name_match {
        entry.sub_names.push(sub_name.to_string());
    }
}
