//! Resilient clients for ArcGIS RESTful, WMS and WFS services.
//!
//! - [`RetryClient`]: HTTP with retry, backoff and response caching
//! - [`ArcGisRestful`]: object-ID discovery and batched feature retrieval
//! - [`Wms`]: GetMap requests over a decomposed bounding box
//! - [`Wfs`]: GetFeature by bounding box, geometry, feature id or CQL filter
//! - [`RetryController`]: batch fan-out with reconciliation of missing ids

pub mod arcgis;
pub mod cache;
pub mod config;
pub mod http;
pub mod ledger;
pub mod partition;
pub mod retry;
pub mod wfs;
pub mod wms;

pub use arcgis::{ArcGisConfig, ArcGisRestful, FieldInfo, LayerInfo};
pub use cache::ResponseCache;
pub use config::ClientConfig;
pub use http::{HttpTransport, Method, ReqwestTransport, RetryClient, ServiceRequest, ServiceResponse};
pub use ledger::{FailureLedger, LedgerEntry};
pub use partition::partition_ids;
pub use retry::{
    BatchResponse, FeatureSource, FetchOutcome, RetrievalReport, RetrievalState, RetryController,
    RetryPolicy,
};
pub use wfs::{Wfs, DEFAULT_WFS_MAX_RECORDS};
pub use wms::Wms;
