//! Request handling pipeline.
//!
//! Every request passes the same stages: resolve the product and endpoint
//! from the path, parse the parameters, compose the query, then serve it
//! from the cache or execute and encode it.

use metrics::{counter, histogram};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

use emissions_common::{
    EmissionsError, EmissionsResult, Product, ProductRegistry, ProductSpec, TimeWindow,
};
use storage::{CacheStore, DataRange, ObservationSource};

use crate::cache::ResponseCache;
use crate::composer::{AggregationMode, QueryComposer};
use crate::config::QueryConfig;
use crate::error::QueryResult;
use crate::filter::{FilterSet, Params};
use crate::regions::RegionCatalog;
use crate::response::{encode_data_range, encode_rows};

/// A request as handed over by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiRequest {
    /// `.../{product}/{endpoint}`, e.g. `/api/v2/ozone/geo.json`.
    pub path: String,
    pub params: Params,
}

impl ApiRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Params::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// What a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `geo.json`: raw points as GeoJSON.
    Points,
    /// `average.json`: daily averages.
    Average,
    /// `statistics.json`: statistics per interval.
    Statistics,
    /// `data-range.json`: first and last stored timestamp.
    DataRange,
}

impl Endpoint {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "geo.json" => Some(Endpoint::Points),
            "average.json" => Some(Endpoint::Average),
            "statistics.json" => Some(Endpoint::Statistics),
            "data-range.json" => Some(Endpoint::DataRange),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::Points => "geo.json",
            Endpoint::Average => "average.json",
            Endpoint::Statistics => "statistics.json",
            Endpoint::DataRange => "data-range.json",
        }
    }

    fn mode(&self) -> Option<AggregationMode> {
        match self {
            Endpoint::Points => Some(AggregationMode::Points),
            Endpoint::Average => Some(AggregationMode::DailyAverage),
            Endpoint::Statistics => Some(AggregationMode::Statistics),
            Endpoint::DataRange => None,
        }
    }
}

/// Product and endpoint a path resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub product: Product,
    pub spec: ProductSpec,
    pub endpoint: Endpoint,
}

/// Serves query requests.
pub struct QueryService {
    registry: ProductRegistry,
    composer: QueryComposer,
    cache: ResponseCache,
    source: Arc<dyn ObservationSource>,
}

impl QueryService {
    pub fn new(
        registry: ProductRegistry,
        composer: QueryComposer,
        cache: ResponseCache,
        source: Arc<dyn ObservationSource>,
    ) -> Self {
        Self {
            registry,
            composer,
            cache,
            source,
        }
    }

    pub fn from_config(
        config: &QueryConfig,
        registry: ProductRegistry,
        regions: Arc<dyn RegionCatalog>,
        source: Arc<dyn ObservationSource>,
        cache_store: Arc<dyn CacheStore>,
    ) -> EmissionsResult<Self> {
        Ok(Self::new(
            registry,
            QueryComposer::new(config.grid()?, regions),
            ResponseCache::new(cache_store, config.request_timeout()),
            source,
        ))
    }

    /// Handle one request and return the encoded payload.
    #[instrument(skip(self, request), fields(path = %request.path))]
    pub async fn handle(&self, request: &ApiRequest) -> QueryResult<Vec<u8>> {
        let start = Instant::now();
        let result = self.execute(request).await;

        let status = match &result {
            Ok(_) => 200,
            Err(e) => e.http_status_code(),
        };
        counter!("query_requests_total", "status" => status.to_string()).increment(1);
        histogram!("query_duration_seconds").record(start.elapsed().as_secs_f64());
        debug!(status, "Request handled");

        result
    }

    /// Resolve `.../{product}/{endpoint}`.
    pub fn route(&self, path: &str) -> EmissionsResult<Route> {
        let mut segments = path.trim().trim_matches('/').rsplit('/');
        let endpoint_name = segments.next().unwrap_or_default();
        let product_name = segments.next().unwrap_or_default();

        let endpoint = Endpoint::from_name(endpoint_name)
            .ok_or_else(|| EmissionsError::UnknownEndpoint(endpoint_name.to_string()))?;
        let (product, spec) = self.registry.resolve(product_name)?;

        Ok(Route {
            product,
            spec: spec.clone(),
            endpoint,
        })
    }

    /// First and last stored timestamp of a product, read directly.
    pub async fn data_range(&self, product: Product) -> QueryResult<DataRange> {
        let spec = self
            .registry
            .get(product)
            .ok_or_else(|| EmissionsError::UnknownProduct(product.to_string()))?;
        Ok(self.source.data_range(&spec.table).await?)
    }

    async fn execute(&self, request: &ApiRequest) -> QueryResult<Vec<u8>> {
        let route = self.route(&request.path)?;

        let Some(mode) = route.endpoint.mode() else {
            // No temporal filter: any ingestion may change the range.
            return self
                .cache
                .get_or_compute(&request.path, &request.params, TimeWindow::unbounded(), || async {
                    let range = self.source.data_range(&route.spec.table).await?;
                    encode_data_range(&range)
                })
                .await;
        };

        let filters = FilterSet::parse(&request.params)?;
        let plan = self.composer.compose(&route.spec.table, &filters, mode)?;
        debug!(
            product = %route.product,
            endpoint = route.endpoint.name(),
            aggregation = ?plan.aggregation,
            "Composed query"
        );

        self.cache
            .get_or_compute(&request.path, &request.params, filters.window(), || async {
                let rows = self.source.fetch(&plan).await?;
                encode_rows(&rows)
            })
            .await
    }
}
