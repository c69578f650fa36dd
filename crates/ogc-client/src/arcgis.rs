//! ArcGIS RESTful layer access.
//!
//! A service handle is bound to one layer. Discovery queries return object
//! ids already partitioned into batches of at most `maxRecordCount`, which
//! [`ArcGisRestful::get_features`] then fetches through the retry controller.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use ogc_common::{Geometry, IdentifierBatch, ObjectId, OgcError, OgcResult, SpatialReference};
use ogc_protocol::{EsriGeomQuery, SpatialRelation};
use projection::match_crs;

use crate::http::{HttpTransport, ReqwestTransport, RetryClient, ServiceRequest};
use crate::partition::partition_ids;
use crate::retry::{BatchResponse, FeatureSource, RetrievalReport, RetryController, RetryPolicy};

/// Used when the layer metadata does not state `maxRecordCount`.
const DEFAULT_MAX_RECORDS: usize = 1000;

/// Settings of an ArcGIS layer handle.
#[derive(Debug, Clone)]
pub struct ArcGisConfig {
    /// Service url, optionally ending in the layer number.
    pub base_url: String,
    /// Layer number; taken from the last url segment when unset.
    pub layer: Option<u32>,
    pub outformat: String,
    pub outfields: Vec<String>,
    /// Reference of returned geometries, also used for geometry filters.
    pub crs: SpatialReference,
    pub max_workers: usize,
    pub disable_retry: bool,
    /// Write a failure file when identifiers stay missing.
    pub persist_failures: bool,
}

impl ArcGisConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            layer: None,
            outformat: "geojson".to_string(),
            outfields: vec!["*".to_string()],
            crs: SpatialReference::wgs84(),
            max_workers: 1,
            disable_retry: false,
            persist_failures: true,
        }
    }

    pub fn with_layer(mut self, layer: u32) -> Self {
        self.layer = Some(layer);
        self
    }

    /// Split the configured url into service url and layer number.
    pub fn resolve_layer(&self) -> OgcResult<(String, u32)> {
        let trimmed = self.base_url.trim_end_matches('/');
        if let Some(layer) = self.layer {
            return Ok((trimmed.to_string(), layer));
        }

        trimmed
            .rsplit_once('/')
            .and_then(|(base, last)| last.parse::<u32>().ok().map(|layer| (base.to_string(), layer)))
            .ok_or_else(|| {
                OgcError::input_value(
                    "layer",
                    [
                        "a layer number as the last segment of base_url",
                        "an explicit layer number",
                    ],
                )
            })
    }
}

/// A layer attribute as described by the layer metadata.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
}

impl FieldInfo {
    /// String-typed fields need quoted values in SQL clauses.
    pub fn is_string(&self) -> bool {
        self.field_type.to_lowercase().contains("string")
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLayerInfo {
    max_record_count: Option<usize>,
    object_id_field: Option<String>,
    fields: Option<Vec<FieldInfo>>,
    supported_query_formats: Option<String>,
}

/// Metadata of an ArcGIS layer (`<base>/<layer>?f=json`).
#[derive(Debug, Clone, PartialEq)]
pub struct LayerInfo {
    pub max_record_count: usize,
    pub object_id_field: Option<String>,
    pub fields: Vec<FieldInfo>,
    /// Lower-cased entries of `supportedQueryFormats`.
    pub supported_query_formats: Vec<String>,
}

impl LayerInfo {
    pub fn from_json(value: &Value) -> OgcResult<Self> {
        if let Some(message) = error_message(value) {
            return Err(OgcError::service_rejected(None, message));
        }

        let raw: RawLayerInfo = serde_json::from_value(value.clone())?;
        let fields = raw.fields.unwrap_or_default();

        let max_record_count = match raw.max_record_count {
            Some(n) if n > 0 => n,
            _ => {
                warn!(
                    default = DEFAULT_MAX_RECORDS,
                    "Layer metadata has no usable maxRecordCount"
                );
                DEFAULT_MAX_RECORDS
            }
        };

        let object_id_field = raw.object_id_field.or_else(|| {
            fields
                .iter()
                .find(|f| f.field_type == "esriFieldTypeOID")
                .map(|f| f.name.clone())
        });

        let supported_query_formats = raw
            .supported_query_formats
            .unwrap_or_default()
            .split(',')
            .map(|f| f.trim().to_lowercase())
            .filter(|f| !f.is_empty())
            .collect();

        Ok(Self {
            max_record_count,
            object_id_field,
            fields,
            supported_query_formats,
        })
    }

    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// Handle to one ArcGIS RESTful layer.
pub struct ArcGisRestful<T: HttpTransport = ReqwestTransport> {
    client: Arc<RetryClient<T>>,
    base_url: String,
    layer: u32,
    outformat: String,
    outfields: Vec<String>,
    crs: SpatialReference,
    wkid: u32,
    max_workers: usize,
    disable_retry: bool,
    persist_failures: bool,
    info: LayerInfo,
    cancel: CancellationToken,
}

impl<T: HttpTransport> ArcGisRestful<T> {
    /// Read the layer metadata and build a validated handle.
    #[instrument(skip(config, client), fields(url = %config.base_url))]
    pub async fn connect(config: ArcGisConfig, client: Arc<RetryClient<T>>) -> OgcResult<Self> {
        let (base_url, layer) = config.resolve_layer()?;
        let layer_url = format!("{}/{}", base_url, layer);

        let response = client
            .get(&layer_url, vec![("f".to_string(), "json".to_string())])
            .await?;
        let info = LayerInfo::from_json(&response.json()?)?;

        info!(
            layer,
            max_record_count = info.max_record_count,
            fields = info.fields.len(),
            "Connected to ArcGIS layer"
        );
        Self::with_layer_info(config, client, info)
    }

    /// Build a handle from already known layer metadata.
    pub fn with_layer_info(
        config: ArcGisConfig,
        client: Arc<RetryClient<T>>,
        info: LayerInfo,
    ) -> OgcResult<Self> {
        let (base_url, layer) = config.resolve_layer()?;

        let outformat = config.outformat.to_lowercase();
        if !info.supported_query_formats.contains(&outformat) {
            return Err(OgcError::input_value(
                "outformat",
                info.supported_query_formats.clone(),
            ));
        }

        let all_fields = config.outfields.len() == 1 && config.outfields[0] == "*";
        if !all_fields {
            if let Some(unknown) = config.outfields.iter().find(|f| info.field(f).is_none()) {
                warn!(field = %unknown, "Unknown output field");
                return Err(OgcError::input_value("outfields", info.field_names()));
            }
        }

        let wkid = config.crs.epsg_code().ok_or_else(|| {
            OgcError::InvalidCrs(format!(
                "{} has no EPSG code; ArcGIS queries need a well-known id",
                config.crs
            ))
        })?;

        if config.max_workers == 0 {
            return Err(OgcError::input_value(
                "max_workers",
                ["a positive number of workers"],
            ));
        }

        Ok(Self {
            client,
            base_url,
            layer,
            outformat,
            outfields: config.outfields,
            crs: config.crs,
            wkid,
            max_workers: config.max_workers,
            disable_retry: config.disable_retry,
            persist_failures: config.persist_failures,
            info,
            cancel: CancellationToken::new(),
        })
    }

    /// Stop feature retrieval once `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn layer(&self) -> u32 {
        self.layer
    }

    pub fn layer_info(&self) -> &LayerInfo {
        &self.info
    }

    /// Largest batch the layer returns in one response.
    pub fn max_nrecords(&self) -> usize {
        self.info.max_record_count
    }

    pub fn crs(&self) -> &SpatialReference {
        &self.crs
    }

    pub fn layer_url(&self) -> String {
        format!("{}/{}", self.base_url, self.layer)
    }

    pub fn query_url(&self) -> String {
        format!("{}/{}/query", self.base_url, self.layer)
    }

    /// Object ids of features related to `geom` by `spatial_relation`.
    ///
    /// `geom` is given in `geo_crs` and reprojected to the layer reference.
    /// `distance` buffers the geometry by that many meters.
    #[instrument(skip(self, geom), fields(kind = geom.kind(), relation = %spatial_relation))]
    pub async fn oids_bygeom(
        &self,
        geom: Geometry,
        geo_crs: &SpatialReference,
        spatial_relation: &str,
        sql_clause: Option<&str>,
        distance: Option<u32>,
    ) -> OgcResult<Vec<IdentifierBatch>> {
        let relation: SpatialRelation = spatial_relation.parse()?;
        let geom = match_crs(geom, geo_crs, &self.crs)?;
        let query = EsriGeomQuery::new(&geom, self.wkid).auto()?;

        let mut params = query.into_params();
        params.push(("spatialRel".to_string(), relation.as_str().to_string()));
        if let Some(distance) = distance {
            params.push(("distance".to_string(), distance.to_string()));
            params.push(("units".to_string(), "esriSRUnit_Meter".to_string()));
        }
        if let Some(clause) = sql_clause {
            params.push(("where".to_string(), clause.to_string()));
        }
        self.query_oids(params).await
    }

    /// Object ids of features whose `field` takes one of `ids`.
    pub async fn oids_byfield<I, S>(&self, field: &str, ids: I) -> OgcResult<Vec<IdentifierBatch>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let info = self
            .info
            .field(field)
            .ok_or_else(|| OgcError::input_value("field", self.info.field_names()))?;

        let values: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(OgcError::input_type("ids", "a non-empty list of values"));
        }

        let literals = if info.is_string() {
            values
                .iter()
                .map(|v| format!("'{}'", v.replace('\'', "''")))
                .collect::<Vec<_>>()
        } else {
            if let Some(bad) = values.iter().find(|v| v.trim().parse::<f64>().is_err()) {
                return Err(OgcError::input_type(
                    "ids",
                    format!("numbers for field {} (got {:?})", field, bad),
                ));
            }
            values.iter().map(|v| v.trim().to_string()).collect()
        };

        let clause = format!("{} IN ({})", field, literals.join(", "));
        self.oids_bysql(&clause).await
    }

    /// Object ids of features matching a SQL `where` clause.
    #[instrument(skip(self))]
    pub async fn oids_bysql(&self, clause: &str) -> OgcResult<Vec<IdentifierBatch>> {
        self.query_oids(vec![("where".to_string(), clause.to_string())])
            .await
    }

    /// Partition externally obtained ids for [`Self::get_features`].
    pub fn partition_oids<I>(&self, ids: I) -> OgcResult<Vec<IdentifierBatch>>
    where
        I: IntoIterator<Item = ObjectId>,
    {
        partition_ids(ids, self.max_nrecords())
    }

    /// Fetch the features of `batches`, retrying identifiers the service
    /// did not return.
    #[instrument(skip(self, batches), fields(batches = batches.len()))]
    pub async fn get_features(
        &self,
        batches: Vec<IdentifierBatch>,
        return_m: bool,
        return_geom: bool,
    ) -> OgcResult<RetrievalReport> {
        let config = self.client.config();
        let policy = RetryPolicy {
            max_batch_size: self.max_nrecords(),
            max_workers: self.max_workers,
            disable_retry: self.disable_retry,
            retry_passes: config.retry_passes,
            persist_failures: self.persist_failures,
            failure_dir: config.failure_dir.clone(),
        };

        let source = FeatureQuery {
            service: self,
            return_m,
            return_geom,
        };
        RetryController::new(source, policy)?
            .with_cancellation(self.cancel.clone())
            .retrieve(batches)
            .await
    }

    async fn query_oids(&self, mut params: Vec<(String, String)>) -> OgcResult<Vec<IdentifierBatch>> {
        params.push(("returnGeometry".to_string(), "false".to_string()));
        params.push(("returnIdsOnly".to_string(), "true".to_string()));
        params.push(("f".to_string(), "json".to_string()));

        let request = ServiceRequest::post(self.query_url(), params);
        let response = self.client.request(&request).await?;
        let value = response.json()?;

        let ids: Vec<ObjectId> = value
            .get("objectIds")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(ObjectId::from_json).collect())
            .unwrap_or_default();

        if ids.is_empty() {
            self.client.evict(&request).await;
            let message =
                error_message(&value).unwrap_or_else(|| "No matched records".to_string());
            return Err(OgcError::ZeroMatched(message));
        }

        info!(matched = ids.len(), "Discovered object ids");
        self.partition_oids(ids)
    }
}

/// One `query` request per batch.
struct FeatureQuery<'a, T: HttpTransport> {
    service: &'a ArcGisRestful<T>,
    return_m: bool,
    return_geom: bool,
}

#[async_trait]
impl<'a, T: HttpTransport> FeatureSource for FeatureQuery<'a, T> {
    async fn fetch_batch(&self, batch: &IdentifierBatch) -> OgcResult<BatchResponse> {
        let service = self.service;
        let params = vec![
            ("objectIds".to_string(), batch.to_param()),
            ("outFields".to_string(), service.outfields.join(",")),
            ("returnGeometry".to_string(), self.return_geom.to_string()),
            ("returnM".to_string(), self.return_m.to_string()),
            ("outSR".to_string(), service.wkid.to_string()),
            ("f".to_string(), service.outformat.clone()),
        ];

        let request = ServiceRequest::post(service.query_url(), params);
        let response = service.client.request(&request).await?;
        let value = response.json()?;

        if let Some(message) = error_message(&value) {
            service.client.evict(&request).await;
            return Err(OgcError::service_rejected(None, message));
        }

        let features = value
            .get("features")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let oid_field = service.info.object_id_field.as_deref();
        let fetched = features
            .iter()
            .filter_map(|feature| feature_id(feature, oid_field))
            .collect();

        Ok(BatchResponse { features, fetched })
    }
}

/// `error.message` of an ArcGIS JSON response, or the error member itself.
fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if error.is_null() {
        return None;
    }
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| error.to_string()),
    )
}

/// Identifier of a GeoJSON or ESRI JSON feature.
fn feature_id(feature: &Value, oid_field: Option<&str>) -> Option<ObjectId> {
    if let Some(id) = feature.get("id").and_then(ObjectId::from_json) {
        return Some(id);
    }
    let field = oid_field?;
    ["properties", "attributes"]
        .iter()
        .find_map(|member| feature.get(*member)?.get(field).and_then(ObjectId::from_json))
}
