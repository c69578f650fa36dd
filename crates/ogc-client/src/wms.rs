//! WMS GetMap over a decomposed bounding box.

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument};

use ogc_common::{BoundingBox, OgcError, OgcResult, SpatialReference};
use ogc_protocol::{
    capabilities_params, extract_error_message, is_exception_report, parse_capability_crs,
    GetMapTemplate, WmsVersion,
};
use projection::{decompose, match_bbox};

use crate::http::{HttpTransport, ReqwestTransport, RetryClient, ServiceRequest};

/// Tile requests in flight at once.
const TILE_CONCURRENCY: usize = 4;

/// Handle to one WMS endpoint and a set of its layers.
pub struct Wms<T: HttpTransport = ReqwestTransport> {
    client: Arc<RetryClient<T>>,
    url: String,
    layers: Vec<String>,
    template: GetMapTemplate,
}

impl<T: HttpTransport> Wms<T> {
    pub fn new(
        url: impl Into<String>,
        layers: Vec<String>,
        outformat: impl Into<String>,
        version: WmsVersion,
        crs: SpatialReference,
        client: Arc<RetryClient<T>>,
    ) -> OgcResult<Self> {
        if layers.is_empty() || layers.iter().any(|l| l.trim().is_empty()) {
            return Err(OgcError::input_type("layers", "a non-empty list of layer names"));
        }
        let outformat = outformat.into();
        if outformat.trim().is_empty() {
            return Err(OgcError::input_type("outformat", "a MIME type such as image/tiff"));
        }

        Ok(Self {
            client,
            url: url.into(),
            layers,
            template: GetMapTemplate::new(version, outformat, crs),
        })
    }

    /// Keep x, y bbox order for geographic references under 1.3.0.
    pub fn with_always_xy(mut self, always_xy: bool) -> Self {
        self.template.always_xy = always_xy;
        self
    }

    /// Add a parameter sent with every GetMap request.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.template.extra.push((key.into(), value.into()));
        self
    }

    pub fn layers(&self) -> &[String] {
        &self.layers
    }

    pub fn template(&self) -> &GetMapTemplate {
        &self.template
    }

    /// CRS identifiers advertised in the capabilities document.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn supported_crs(&self) -> OgcResult<Vec<String>> {
        let response = self
            .client
            .get(&self.url, capabilities_params(WmsVersion::V1_3_0))
            .await?;
        parse_capability_crs(&response.text())
    }

    /// Fail unless the service advertises the configured reference.
    pub async fn validate_crs(&self) -> OgcResult<()> {
        let supported = self.supported_crs().await?;
        let wanted = self.template.crs.to_ogc_string();
        if supported.iter().any(|c| *c == wanted) {
            Ok(())
        } else {
            Err(OgcError::input_value("crs", supported))
        }
    }

    /// Request every layer over `bbox` (given in `box_crs`) at `resolution`
    /// meters per pixel, splitting the box so no request exceeds `max_px`.
    ///
    /// Bodies are keyed `<layer>_dd_<col>_<row>`. Any failed tile fails the call.
    #[instrument(skip(self, bbox, box_crs), fields(url = %self.url, layers = self.layers.len()))]
    pub async fn getmap_bybox(
        &self,
        bbox: &BoundingBox,
        resolution: f64,
        box_crs: &SpatialReference,
        max_px: u64,
    ) -> OgcResult<BTreeMap<String, Bytes>> {
        bbox.validate()?;
        let service_bbox = match_bbox(bbox, box_crs, &self.template.crs)?;
        let tiles = decompose(&service_bbox, resolution, &self.template.crs, max_px)?;

        let requests: Vec<(String, ServiceRequest)> = self
            .layers
            .iter()
            .flat_map(|layer| {
                tiles.iter().map(move |tile| {
                    (
                        GetMapTemplate::key(layer, tile),
                        ServiceRequest::get(self.url.clone(), self.template.payload(layer, tile)),
                    )
                })
            })
            .collect();

        info!(tiles = tiles.len(), requests = requests.len(), "Requesting map tiles");

        let client = &self.client;
        let results: Vec<OgcResult<(String, Bytes)>> = stream::iter(requests)
            .map(|(key, request)| async move {
                let response = client.request(&request).await?;
                if is_exception_report(&response.body) {
                    client.evict(&request).await;
                    return Err(OgcError::service_rejected(
                        Some(response.status),
                        extract_error_message(&response.text()),
                    ));
                }
                Ok((key, response.body))
            })
            .buffer_unordered(TILE_CONCURRENCY)
            .collect()
            .await;

        results.into_iter().collect()
    }
}
