//! Region geometries for the `country` filter.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use emissions_common::{EmissionsError, Geometry};

/// Looks up the area of a region code.
pub trait RegionCatalog: Send + Sync {
    /// Geometry of the region, or `None` if the code is unknown. Codes are
    /// matched case-insensitively.
    fn lookup(&self, code: &str) -> Option<Geometry>;
}

/// Errors raised while loading a region file.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read region file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse region file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid geometry for region {code}: {source}")]
    Geometry {
        code: String,
        #[source]
        source: EmissionsError,
    },
}

/// Catalog built from a YAML mapping of region codes to WKT polygons.
///
/// ```yaml
/// DE: "POLYGON((5.9 47.3,15.0 47.3,15.0 55.1,5.9 55.1,5.9 47.3))"
/// ```
#[derive(Debug, Clone, Default)]
pub struct WktRegionCatalog {
    regions: HashMap<String, Geometry>,
}

impl WktRegionCatalog {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CatalogError> {
        let raw: BTreeMap<String, String> = serde_yaml::from_str(yaml)?;

        let regions = raw
            .into_iter()
            .map(|(code, wkt)| {
                Geometry::from_wkt(&wkt)
                    .map(|geometry| (code.trim().to_ascii_uppercase(), geometry))
                    .map_err(|source| CatalogError::Geometry { code, source })
            })
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self { regions })
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let yaml = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_yaml_str(&yaml)?;
        info!(path = %path.display(), regions = catalog.len(), "Loaded region catalog");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl RegionCatalog for WktRegionCatalog {
    fn lookup(&self, code: &str) -> Option<Geometry> {
        self.regions.get(&code.trim().to_ascii_uppercase()).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::regions::CATALOG_YAML;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let catalog = WktRegionCatalog::from_yaml_str(CATALOG_YAML).unwrap();
        assert_eq!(catalog.len(), 3);
        assert!(catalog.lookup("de").is_some());
        assert_eq!(catalog.lookup("DEU"), catalog.lookup("De"));
        assert!(catalog.lookup("FR").is_none());
    }

    #[test]
    fn test_multipolygon_region() {
        let catalog = WktRegionCatalog::from_yaml_str(CATALOG_YAML).unwrap();
        let islands = catalog.lookup("xi").unwrap();
        assert_eq!(islands.polygons().len(), 2);
        assert!(islands.contains_point(11.0, 11.0));
        assert!(!islands.contains_point(2.0, 2.0));
    }

    #[test]
    fn test_invalid_wkt_names_the_region() {
        let err = WktRegionCatalog::from_yaml_str("XX: \"POINT(1 2)\"").unwrap_err();
        assert!(matches!(err, CatalogError::Geometry { ref code, .. } if code == "XX"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("regions.yaml");
        std::fs::write(&path, CATALOG_YAML).unwrap();
        assert_eq!(WktRegionCatalog::from_file(&path).unwrap().len(), 3);
        assert!(matches!(
            WktRegionCatalog::from_file(&dir.path().join("missing.yaml")),
            Err(CatalogError::Io { .. })
        ));
    }
}
