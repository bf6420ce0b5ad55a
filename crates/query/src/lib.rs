//! Query layer for stored trace-gas observations.
//!
//! Provides:
//! - Parsing of request parameters into a validated [`FilterSet`]
//! - [`QueryComposer`] turning filters into observation query plans
//! - [`ResponseCache`] serving repeated requests from the store
//! - [`QueryService`], the request pipeline tying these together

pub mod cache;
pub mod composer;
pub mod config;
pub mod error;
pub mod filter;
pub mod regions;
pub mod response;
pub mod service;

pub use cache::{fingerprint, is_bypass, ResponseCache, NOCACHE_PARAM};
pub use composer::{AggregationMode, QueryComposer};
pub use config::QueryConfig;
pub use error::{QueryError, QueryResult};
pub use filter::{parse_interval, FilterSet, LocationFilter, Params};
pub use regions::{CatalogError, RegionCatalog, WktRegionCatalog};
pub use response::{encode_data_range, encode_rows, Feature, FeatureCollection};
pub use service::{ApiRequest, Endpoint, QueryService, Route};
