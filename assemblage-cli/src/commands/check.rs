//! Configuration check and plan preview.

use anyhow::{Context, Result};
use assemblage_core::{resolve, Config, Headers, PlanEntry, Repository, Resolution};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct CheckOptions {
    pub content_type: String,
    pub uri: Option<String>,
    pub method: String,
    pub names: Vec<String>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct AssemblageSummary {
    id: String,
    content_types: Vec<String>,
    error_slots: Vec<String>,
    adjusters: usize,
}

#[derive(Debug, Serialize)]
struct PlanStep {
    action: &'static str,
    matcher: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sub_names: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PlanReport {
    method: String,
    uri: String,
    names: Vec<String>,
    /// `halt`, `verbatim` or `plan`
    outcome: &'static str,
    steps: Vec<PlanStep>,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    config: String,
    assemblages: Vec<AssemblageSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<PlanReport>,
}

/// Validate the configuration, optionally resolving names for one resource
pub fn check_config(config_path: &Path, options: &CheckOptions) -> Result<()> {
    let config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let repository = config
        .repository()
        .context("Invalid assemblage configuration")?;

    let assemblages = repository
        .assemblages()
        .map(|(assemblage, content_types)| {
            let mut error_slots: Vec<String> = assemblage.errors.keys().cloned().collect();
            error_slots.sort();
            AssemblageSummary {
                id: assemblage.id.clone(),
                content_types: content_types.to_vec(),
                error_slots,
                adjusters: assemblage.adjusters.len(),
            }
        })
        .collect();

    let plan = match &options.uri {
        Some(uri) => {
            let assemblage = repository
                .assemblage(&options.content_type)
                .with_context(|| format!("No assemblage for content type {}", options.content_type))?;
            let uri = uri.trim_start_matches('/');
            let resolution = repository
                .matchers(&assemblage, &options.method, uri, &Headers::new())
                .map(|matchers| resolve(&matchers, &options.names, false))
                .unwrap_or(Resolution::Halt);
            Some(plan_report(&options.method, uri, &options.names, resolution))
        }
        None => None,
    };

    let report = CheckReport {
        config: config_path.display().to_string(),
        assemblages,
        plan,
    };

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn plan_report(method: &str, uri: &str, names: &[String], resolution: Resolution) -> PlanReport {
    let (outcome, steps) = match resolution {
        Resolution::Halt => ("halt", Vec::new()),
        Resolution::Verbatim => ("verbatim", Vec::new()),
        // Entries are consumed from the end; list them in application order.
        Resolution::Plan(plan) => ("plan", plan.iter().rev().map(plan_step).collect()),
    };
    PlanReport {
        method: method.to_ascii_uppercase(),
        uri: uri.to_string(),
        names: names.to_vec(),
        outcome,
        steps,
    }
}

fn plan_step(entry: &PlanEntry) -> PlanStep {
    let matcher = entry
        .matcher()
        .name
        .clone()
        .unwrap_or_else(|| "(default)".to_string());
    match entry {
        PlanEntry::Exclude(_) => PlanStep {
            action: "exclude",
            matcher,
            sub_names: Vec::new(),
        },
        PlanEntry::IncludeOpaque(_) => PlanStep {
            action: "keep",
            matcher,
            sub_names: Vec::new(),
        },
        PlanEntry::IncludeWithReference { sub_names, .. } => PlanStep {
            action: "expand",
            matcher,
            sub_names: sub_names.clone(),
        },
    }
}

fn print_report(report: &CheckReport) {
    println!("✓ {} is valid", report.config);
    if report.assemblages.is_empty() {
        println!("  (no assemblages configured)");
    }
    for summary in &report.assemblages {
        println!(
            "  {} [{}]: {} error slot(s), {} adjuster(s)",
            summary.id,
            summary.content_types.join(", "),
            summary.error_slots.len(),
            summary.adjusters
        );
    }

    let Some(plan) = &report.plan else {
        return;
    };
    println!(
        "\n{} {} names=[{}]: {}",
        plan.method,
        plan.uri,
        plan.names.join(", "),
        plan.outcome
    );
    for step in &plan.steps {
        if step.sub_names.is_empty() {
            println!("  {} {}", step.action, step.matcher);
        } else {
            println!(
                "  {} {} -> [{}]",
                step.action,
                step.matcher,
                step.sub_names.join(", ")
            );
        }
    }
}
