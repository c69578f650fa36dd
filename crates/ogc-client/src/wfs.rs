//! WFS GetFeature by bounding box, geometry, feature id or CQL filter.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, instrument};

use ogc_common::{BoundingBox, Geometry, OgcError, OgcResult, SpatialReference};
use ogc_protocol::{
    describe_feature_type_params, extract_error_message, geometry_filter, in_filter,
    is_exception_report, parse_feature_type_fields, GetFeatureTemplate, SpatialPredicate,
    WfsVersion,
};
use projection::match_crs;

use crate::http::{HttpTransport, Method, ReqwestTransport, RetryClient, ServiceRequest, ServiceResponse};

/// Feature ids sent in one `getfeature_byid` request unless configured otherwise.
pub const DEFAULT_WFS_MAX_RECORDS: usize = 1000;

/// Handle to one feature type of a WFS endpoint.
pub struct Wfs<T: HttpTransport = ReqwestTransport> {
    client: Arc<RetryClient<T>>,
    url: String,
    template: GetFeatureTemplate,
    max_nrecords: usize,
}

impl<T: HttpTransport> Wfs<T> {
    pub fn new(
        url: impl Into<String>,
        layer: impl Into<String>,
        outformat: impl Into<String>,
        version: WfsVersion,
        crs: SpatialReference,
        client: Arc<RetryClient<T>>,
    ) -> OgcResult<Self> {
        let layer = layer.into();
        if layer.trim().is_empty() {
            return Err(OgcError::input_type("layer", "a feature type name"));
        }
        let outformat = outformat.into();
        if outformat.trim().is_empty() {
            return Err(OgcError::input_type("outformat", "an output format such as application/json"));
        }

        Ok(Self {
            client,
            url: url.into(),
            template: GetFeatureTemplate::new(version, outformat, layer, crs),
            max_nrecords: DEFAULT_WFS_MAX_RECORDS,
        })
    }

    /// Largest number of feature ids per `getfeature_byid` request.
    pub fn with_max_nrecords(mut self, max_nrecords: usize) -> OgcResult<Self> {
        if max_nrecords == 0 {
            return Err(OgcError::input_value("max_nrecords", ["a positive record count"]));
        }
        self.max_nrecords = max_nrecords;
        Ok(self)
    }

    pub fn template(&self) -> &GetFeatureTemplate {
        &self.template
    }

    pub fn max_nrecords(&self) -> usize {
        self.max_nrecords
    }

    /// Property names of the feature type, from DescribeFeatureType.
    #[instrument(skip(self), fields(url = %self.url, layer = %self.template.layer))]
    pub async fn valid_names(&self) -> OgcResult<Vec<String>> {
        let request = ServiceRequest::get(
            self.url.clone(),
            describe_feature_type_params(self.template.version, &self.template.layer),
        );
        let response = self.send(&request).await?;
        parse_feature_type_fields(&response.text())
    }

    /// Features within `bbox`, given in `box_crs`.
    ///
    /// The box is sent in its own reference; for geographic references and
    /// versions after 1.0.0 the axes are swapped unless `always_xy`.
    #[instrument(skip(self, bbox, box_crs), fields(url = %self.url, layer = %self.template.layer))]
    pub async fn getfeature_bybox(
        &self,
        bbox: &BoundingBox,
        box_crs: &SpatialReference,
        always_xy: bool,
    ) -> OgcResult<ServiceResponse> {
        bbox.validate()?;
        let request = ServiceRequest::get(
            self.url.clone(),
            self.template.bbox_params(bbox, box_crs, always_xy),
        );
        self.send(&request).await
    }

    /// Features related to a polygonal `geometry` by `predicate`.
    ///
    /// The geometry is reprojected to the service reference and sent as a
    /// CQL filter on `geom_name` in a POST body.
    #[instrument(skip(self, geometry, geo_crs), fields(url = %self.url, layer = %self.template.layer))]
    pub async fn getfeature_bygeom(
        &self,
        geometry: Geometry,
        geo_crs: &SpatialReference,
        always_xy: bool,
        predicate: &str,
        geom_name: &str,
    ) -> OgcResult<ServiceResponse> {
        let predicate: SpatialPredicate = predicate.parse()?;
        let geometry = match_crs(geometry, geo_crs, &self.template.crs)?;
        let swap = self.template.swaps_axes(&self.template.crs, always_xy);
        let filter = geometry_filter(predicate, geom_name, &geometry, swap)?;
        self.getfeature_byfilter(&filter, Method::Post).await
    }

    /// Features whose `featurename` property is one of `featureids`.
    ///
    /// Ids are deduplicated and sent in chunks of `max_nrecords`, one POST per
    /// chunk, in sorted order.
    #[instrument(skip(self, featureids), fields(url = %self.url, layer = %self.template.layer))]
    pub async fn getfeature_byid<I, S>(
        &self,
        featurename: &str,
        featureids: I,
    ) -> OgcResult<Vec<ServiceResponse>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = self.valid_names().await?;
        if !names.iter().any(|n| n == featurename) {
            return Err(OgcError::input_value("featurename", names));
        }

        let ids: BTreeSet<String> = featureids.into_iter().map(Into::into).collect();
        if ids.is_empty() {
            return Err(OgcError::input_type("featureids", "a non-empty list of ids"));
        }

        let ids: Vec<String> = ids.into_iter().collect();
        let mut responses = Vec::with_capacity(ids.len().div_ceil(self.max_nrecords));
        for chunk in ids.chunks(self.max_nrecords) {
            let filter = in_filter(featurename, chunk);
            responses.push(self.getfeature_byfilter(&filter, Method::Post).await?);
        }

        info!(ids = ids.len(), requests = responses.len(), "Fetched features by id");
        Ok(responses)
    }

    /// Features matching a CQL expression. The expression is sent as given;
    /// use POST for long filters.
    pub async fn getfeature_byfilter(
        &self,
        cql_filter: &str,
        method: Method,
    ) -> OgcResult<ServiceResponse> {
        if cql_filter.trim().is_empty() {
            return Err(OgcError::input_type("cql_filter", "a CQL expression"));
        }
        let request = ServiceRequest {
            method,
            url: self.url.clone(),
            params: self.template.filter_params(cql_filter),
        };
        self.send(&request).await
    }

    async fn send(&self, request: &ServiceRequest) -> OgcResult<ServiceResponse> {
        let response = self.client.request(request).await?;
        if is_exception_report(&response.body) {
            self.client.evict(request).await;
            return Err(OgcError::service_rejected(
                Some(response.status),
                extract_error_message(&response.text()),
            ));
        }
        Ok(response)
    }
}
