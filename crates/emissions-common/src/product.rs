//! Product identifiers and the product registry.
//!
//! Each product maps to the table its observations are stored in and the
//! variable read from source files. The registry is built once at startup
//! and passed to the components that need it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{EmissionsError, EmissionsResult};

/// A trace-gas product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    CarbonMonoxide,
    Ozone,
    NitrogenDioxide,
    Methane,
}

impl Product {
    pub const ALL: [Product; 4] = [
        Product::CarbonMonoxide,
        Product::Ozone,
        Product::NitrogenDioxide,
        Product::Methane,
    ];

    /// Identifier used in request paths and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Product::CarbonMonoxide => "carbonmonoxide",
            Product::Ozone => "ozone",
            Product::NitrogenDioxide => "nitrogendioxide",
            Product::Methane => "methane",
        }
    }

    /// Variable holding the measurement in source files.
    pub fn default_variable(&self) -> &'static str {
        match self {
            Product::CarbonMonoxide => "carbonmonoxide_total_column",
            Product::Ozone => "ozone_total_vertical_column",
            Product::NitrogenDioxide => "nitrogendioxide_tropospheric_column",
            Product::Methane => "methane_mixing_ratio_bias_corrected",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Product {
    type Err = EmissionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Product::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EmissionsError::UnknownProduct(s.to_string()))
    }
}

/// Tables shared by all products.
pub const RESERVED_TABLES: [&str; 3] = ["file", "cache", "ingest_generation"];

/// A validated SQL table identifier (`[a-z_][a-z0-9_]*`, at most 63 bytes)
/// that does not name one of the [`RESERVED_TABLES`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> EmissionsResult<Self> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .map_or(false, |c| c.is_ascii_lowercase() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

        if !valid_start || !valid_rest || name.len() > 63 {
            return Err(EmissionsError::invalid_parameter(
                "table",
                format!("'{}' is not a valid table name", name),
            ));
        }
        if RESERVED_TABLES.contains(&name.as_str()) {
            return Err(EmissionsError::invalid_parameter(
                "table",
                format!("'{}' is reserved for a shared table", name),
            ));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TableName {
    type Error = EmissionsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        TableName::new(value)
    }
}

impl From<TableName> for String {
    fn from(name: TableName) -> Self {
        name.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage and source details for one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSpec {
    pub table: TableName,
    pub variable: String,
}

impl ProductSpec {
    fn default_for(product: Product) -> Self {
        Self {
            // Product names are valid identifiers.
            table: TableName(product.name().to_string()),
            variable: product.default_variable().to_string(),
        }
    }
}

/// Registry of enabled products.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductRegistry {
    entries: BTreeMap<Product, ProductSpec>,
}

impl Default for ProductRegistry {
    fn default() -> Self {
        Self::with_products(&Product::ALL)
    }
}

impl ProductRegistry {
    /// Registry with the default table and variable for each product.
    pub fn with_products(products: &[Product]) -> Self {
        let entries = products
            .iter()
            .map(|&p| (p, ProductSpec::default_for(p)))
            .collect();
        Self { entries }
    }

    /// Add or replace the entry of a product.
    pub fn insert(&mut self, product: Product, spec: ProductSpec) {
        self.entries.insert(product, spec);
    }

    pub fn get(&self, product: Product) -> Option<&ProductSpec> {
        self.entries.get(&product)
    }

    /// Resolve a product by name; unknown or disabled products are errors.
    pub fn resolve(&self, name: &str) -> EmissionsResult<(Product, &ProductSpec)> {
        let product: Product = name.parse()?;
        self.entries
            .get(&product)
            .map(|spec| (product, spec))
            .ok_or_else(|| EmissionsError::UnknownProduct(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Product, &ProductSpec)> {
        self.entries.iter().map(|(p, s)| (*p, s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
