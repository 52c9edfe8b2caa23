//! Configuration parsing and management.

use crate::assembler::DEFAULT_MAX_DEPTH;
use crate::error::{ConfigError, Result};
use crate::matcher::{Assemblage, Matcher, Replacer};
use crate::repository::{Resource, StaticRepository};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Main configuration struct matching the assemblage.yml schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub assembler: AssemblerConfig,

    #[serde(default)]
    pub assemblages: Vec<AssemblageConfig>,

    // Internal: path to config file (for diagnostics)
    #[serde(skip)]
    config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Origin every request is forwarded to
    #[serde(default)]
    pub upstream: Option<String>,

    /// Largest inbound request body in bytes
    #[serde(default = "default_max_request_body")]
    pub max_request_body: usize,
}

fn default_listen_addr() -> String {
    String::from("127.0.0.1:8080")
}

fn default_max_request_body() -> usize {
    1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            upstream: None,
            max_request_body: default_max_request_body(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblerConfig {
    /// Maximum response length in bytes allowed for assembling
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,

    /// Request header naming the sections to assemble
    #[serde(default = "default_trigger_header")]
    pub trigger_header: String,

    #[serde(default = "default_charset")]
    pub default_charset: String,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_content_length() -> usize {
    1024 * 100
}

fn default_trigger_header() -> String {
    String::from("X-Filter")
}

fn default_charset() -> String {
    String::from("UTF-8")
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            max_content_length: default_max_content_length(),
            trigger_header: default_trigger_header(),
            default_charset: default_charset(),
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblageConfig {
    pub id: String,

    pub content_types: Vec<String>,

    #[serde(default)]
    pub errors: BTreeMap<String, ReplacerConfig>,

    #[serde(default)]
    pub adjusters: Vec<ReplacerConfig>,

    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacerConfig {
    pub pattern: String,
    pub template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_method")]
    pub method: String,

    pub uri: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub matchers: Vec<MatcherConfig>,
}

fn default_method() -> String {
    String::from(assemblage_types::GET)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Omitted for the default matcher
    #[serde(default)]
    pub name: Option<String>,

    pub pattern: String,

    #[serde(default)]
    pub reference: Option<String>,

    #[serde(default)]
    pub present: Vec<String>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&contents)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    fn validate(&self) -> Result<()> {
        if self.assembler.trigger_header.trim().is_empty() {
            return Err(ConfigError::MissingField("assembler.trigger_header".into()));
        }
        for assemblage in &self.assemblages {
            if assemblage.id.trim().is_empty() {
                return Err(ConfigError::MissingField("assemblages[].id".into()));
            }
            if assemblage.content_types.is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "assemblages[{}].content_types",
                    assemblage.id
                )));
            }
        }
        Ok(())
    }

    /// Compile every pattern into a repository.
    pub fn repository(&self) -> Result<StaticRepository> {
        let mut repository = StaticRepository::new();
        for config in &self.assemblages {
            let (assemblage, resources) = config.compile()?;
            repository.insert(assemblage, &config.content_types, resources);
        }
        Ok(repository)
    }
}

impl AssemblageConfig {
    fn compile(&self) -> Result<(Assemblage, Vec<Resource>)> {
        let id = &self.id;
        let mut assemblage = Assemblage::new(id.clone());
        for (slot, error) in &self.errors {
            let replacer = error.compile(&format!("{id}.errors.{slot}"))?;
            assemblage.errors.insert(slot.clone(), replacer);
        }
        for (k, adjuster) in self.adjusters.iter().enumerate() {
            assemblage
                .adjusters
                .push(adjuster.compile(&format!("{id}.adjusters[{k}]"))?);
        }

        let resources = self
            .resources
            .iter()
            .enumerate()
            .map(|(k, resource)| resource.compile(&format!("{id}.resources[{k}]")))
            .collect::<Result<Vec<_>>>()?;
        Ok((assemblage, resources))
    }
}

impl ReplacerConfig {
    fn compile(&self, field: &str) -> Result<Replacer> {
        Ok(Replacer::new(
            compile(&format!("{field}.pattern"), &self.pattern)?,
            self.template.clone(),
        ))
    }
}

impl ResourceConfig {
    fn compile(&self, field: &str) -> Result<Resource> {
        let mut resource = Resource::new(
            self.method.to_ascii_uppercase(),
            compile(&format!("{field}.uri"), &self.uri)?,
        );
        for (name, pattern) in &self.headers {
            resource = resource.with_header(
                name.clone(),
                compile(&format!("{field}.headers.{name}"), pattern)?,
            );
        }
        for (k, matcher) in self.matchers.iter().enumerate() {
            resource = resource.with_matcher(matcher.compile(&format!("{field}.matchers[{k}]"))?);
        }
        Ok(resource)
    }
}

impl MatcherConfig {
    fn compile(&self, field: &str) -> Result<Matcher> {
        let pattern = compile(&format!("{field}.pattern"), &self.pattern)?;
        let mut matcher = Matcher::new(self.name.clone(), pattern).with_present(&self.present);
        if let Some(reference) = &self.reference {
            matcher = matcher.with_reference(compile(&format!("{field}.reference"), reference)?);
        }
        Ok(matcher)
    }
}

fn compile(field: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        field: field.to_string(),
        source,
    })
}
