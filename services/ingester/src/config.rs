//! Ingester configuration.
//!
//! Loaded from a YAML file. `${VAR}` and `${VAR:-default}` are substituted
//! from the environment before parsing, and a few settings can be
//! overridden directly by environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use emissions_common::{Product, ProductRegistry, ProductSpec, TableName};
use ingestion::{IngestionConfig, ProductJob};

fn default_max_connections() -> u32 {
    5
}

fn default_extension() -> String {
    "csv".to_string()
}

/// Top-level ingester configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngesterConfig {
    /// Database connection URL
    pub database_url: String,

    /// Pool size of the connection used for migrations
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Filtering, binning and worker pool settings
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Products to ingest and where their files live
    pub products: Vec<ProductSource>,
}

/// Source directory of one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductSource {
    pub product: Product,
    pub directory: PathBuf,
    #[serde(default = "default_extension")]
    pub extension: String,
    /// Observation table; defaults to the product name.
    #[serde(default)]
    pub table: Option<TableName>,
    /// Measurement variable; defaults to the product's standard variable.
    #[serde(default)]
    pub variable: Option<String>,
}

impl IngesterConfig {
    /// Load, substitute, override and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let lookup = |name: &str| std::env::var(name).ok();

        let mut config = Self::from_yaml(&content, lookup)?;
        config.apply_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML after substituting variables through `lookup`.
    pub fn from_yaml(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let expanded = expand_env_vars(content, &lookup)?;
        serde_yaml::from_str(&expanded).context("Failed to parse config file")
    }

    /// Apply `DATABASE_URL`, `INGEST_WORKERS` and `INGEST_QUALITY_THRESHOLD`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(workers) = lookup("INGEST_WORKERS") {
            self.ingestion.workers = workers
                .trim()
                .parse()
                .with_context(|| format!("Invalid INGEST_WORKERS: {}", workers))?;
        }
        if let Some(threshold) = lookup("INGEST_QUALITY_THRESHOLD") {
            self.ingestion.quality_threshold = threshold
                .trim()
                .parse()
                .with_context(|| format!("Invalid INGEST_QUALITY_THRESHOLD: {}", threshold))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.database_url.is_empty(), "database_url cannot be empty");
        anyhow::ensure!(self.max_connections > 0, "max_connections must be at least 1");
        anyhow::ensure!(!self.products.is_empty(), "At least one product must be configured");

        let mut seen = BTreeSet::new();
        for source in &self.products {
            anyhow::ensure!(
                seen.insert(source.product),
                "Product {} is configured more than once",
                source.product
            );
        }

        self.ingestion.validate()?;
        Ok(())
    }

    /// Registry of the configured products with their table and variable.
    pub fn registry(&self) -> ProductRegistry {
        let products: Vec<Product> = self.products.iter().map(|s| s.product).collect();
        let mut registry = ProductRegistry::with_products(&products);

        for source in &self.products {
            let Some(default) = registry.get(source.product).cloned() else {
                continue;
            };
            registry.insert(
                source.product,
                ProductSpec {
                    table: source.table.clone().unwrap_or(default.table),
                    variable: source.variable.clone().unwrap_or(default.variable),
                },
            );
        }
        registry
    }

    /// Jobs for every configured product, or only `only` when given.
    pub fn jobs(&self, registry: &ProductRegistry, only: Option<Product>) -> Result<Vec<ProductJob>> {
        if let Some(product) = only {
            anyhow::ensure!(
                self.products.iter().any(|s| s.product == product),
                "Product {} is not configured",
                product
            );
        }

        self.products
            .iter()
            .filter(|source| only.map_or(true, |p| p == source.product))
            .map(|source| -> Result<ProductJob> {
                let spec = registry
                    .get(source.product)
                    .cloned()
                    .with_context(|| format!("Product {} missing from registry", source.product))?;
                Ok(ProductJob {
                    product: source.product,
                    spec,
                    directory: source.directory.clone(),
                    extension: source.extension.trim_start_matches('.').to_string(),
                })
            })
            .collect()
    }
}

/// Expand `${VAR}` and `${VAR:-default}`.
fn expand_env_vars(content: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr, lookup)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str, lookup: &impl Fn(&str) -> Option<String>) -> Result<String> {
    match expr.split_once(":-") {
        Some((name, default)) => Ok(lookup(name.trim())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())),
        None => lookup(expr.trim())
            .with_context(|| format!("Environment variable {} not set", expr.trim())),
    }
}
