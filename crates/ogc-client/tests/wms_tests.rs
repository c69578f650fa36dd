mod common;

use std::sync::Arc;

use common::{fast_config, param, RouteTransport};
use ogc_client::{RetryClient, ServiceRequest, ServiceResponse, Wms};
use ogc_common::{BoundingBox, SpatialReference};
use ogc_protocol::WmsVersion;
use projection::{decompose, DEFAULT_MAX_PIXELS};

const URL: &str = "https://example.com/wms";

const CAPABILITIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<WMS_Capabilities version="1.3.0" xmlns="http://www.opengis.net/wms">
  <Service><Name>WMS</Name></Service>
  <Capability>
    <Layer>
      <Title>Land cover</Title>
      <CRS>EPSG:4326</CRS>
      <CRS>EPSG:3857</CRS>
      <Layer>
        <Name>NLCD_2019</Name>
        <CRS>EPSG:5070</CRS>
      </Layer>
    </Layer>
  </Capability>
</WMS_Capabilities>"#;

fn handler(request: &ServiceRequest) -> ServiceResponse {
    match param(request, "request") {
        Some("GetCapabilities") => ServiceResponse::new(200, CAPABILITIES),
        Some("GetMap") => {
            let body = format!(
                "{}|{}",
                param(request, "layers").unwrap_or_default(),
                param(request, "bbox").unwrap_or_default()
            );
            ServiceResponse::new(200, body)
        }
        _ => ServiceResponse::new(400, "unknown request"),
    }
}

type Handler = fn(&ServiceRequest) -> ServiceResponse;

fn client(handler: Handler) -> Arc<RetryClient<RouteTransport<Handler>>> {
    Arc::new(RetryClient::with_transport(RouteTransport::new(handler), fast_config()).unwrap())
}

fn wms(
    layers: &[&str],
    crs: SpatialReference,
    client: Arc<RetryClient<RouteTransport<Handler>>>,
) -> Wms<RouteTransport<Handler>> {
    Wms::new(
        URL,
        layers.iter().map(|l| l.to_string()).collect(),
        "image/tiff",
        WmsVersion::V1_3_0,
        crs,
        client,
    )
    .unwrap()
}

#[tokio::test]
async fn test_single_tile_per_layer() {
    let client = client(handler);
    let service = wms(&["NLCD_2019", "Impervious"], SpatialReference::wgs84(), client.clone());

    let bbox = BoundingBox::new(-100.0, 30.0, -90.0, 40.0);
    let images = service
        .getmap_bybox(&bbox, 1000.0, &SpatialReference::wgs84(), DEFAULT_MAX_PIXELS)
        .await
        .unwrap();

    let keys: Vec<&str> = images.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["Impervious_dd_0_0", "NLCD_2019_dd_0_0"]);
    // 1.3.0 with a geographic reference sends lat, lon
    assert_eq!(&images["NLCD_2019_dd_0_0"][..], b"NLCD_2019|30,-100,40,-90");

    let calls = client.transport().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(param(&calls[0], "crs"), Some("epsg:4326"));
    assert_eq!(param(&calls[0], "format"), Some("image/tiff"));
    assert_eq!(param(&calls[0], "version"), Some("1.3.0"));
}

#[tokio::test]
async fn test_always_xy_keeps_order() {
    let service = wms(&["NLCD_2019"], SpatialReference::wgs84(), client(handler)).with_always_xy(true);

    let bbox = BoundingBox::new(-100.0, 30.0, -90.0, 40.0);
    let images = service
        .getmap_bybox(&bbox, 1000.0, &SpatialReference::wgs84(), DEFAULT_MAX_PIXELS)
        .await
        .unwrap();

    assert_eq!(&images["NLCD_2019_dd_0_0"][..], b"NLCD_2019|-100,30,-90,40");
}

#[tokio::test]
async fn test_large_box_is_decomposed() {
    let client = client(handler);
    let service = wms(&["NLCD_2019"], SpatialReference::wgs84(), client.clone());

    let bbox = BoundingBox::new(-100.0, 30.0, -99.0, 31.0);
    let expected = decompose(&bbox, 30.0, &SpatialReference::wgs84(), 1_000_000).unwrap();
    assert!(expected.len() > 1);

    let images = service
        .getmap_bybox(&bbox, 30.0, &SpatialReference::wgs84(), 1_000_000)
        .await
        .unwrap();

    assert_eq!(images.len(), expected.len());
    assert_eq!(client.transport().calls().len(), expected.len());
    for tile in &expected {
        assert!(images.contains_key(&format!("NLCD_2019_dd_{}", tile.label)));
    }
}

#[tokio::test]
async fn test_box_reprojected_to_service_crs() {
    let client = client(handler);
    let service = wms(&["NLCD_2019"], SpatialReference::Epsg(3857), client.clone());

    let bbox = BoundingBox::new(-100.0, 30.0, -99.0, 31.0);
    service
        .getmap_bybox(&bbox, 1000.0, &SpatialReference::wgs84(), DEFAULT_MAX_PIXELS)
        .await
        .unwrap();

    let calls = client.transport().calls();
    assert_eq!(param(&calls[0], "crs"), Some("epsg:3857"));
    let bbox = BoundingBox::from_ogc_string(param(&calls[0], "bbox").unwrap()).unwrap();
    // projected meters, not degrees
    assert!(bbox.min_x < -11_000_000.0);
    assert!(bbox.min_y > 3_000_000.0);
}

#[tokio::test]
async fn test_exception_report_fails_call() {
    fn failing(request: &ServiceRequest) -> ServiceResponse {
        match param(request, "request") {
            Some("GetMap") => ServiceResponse::new(
                200,
                r#"<ServiceExceptionReport><ServiceException>Layer not found</ServiceException></ServiceExceptionReport>"#,
            ),
            _ => ServiceResponse::new(400, "unknown request"),
        }
    }
    let service = wms(&["missing"], SpatialReference::wgs84(), client(failing));

    let bbox = BoundingBox::new(-100.0, 30.0, -90.0, 40.0);
    let err = service
        .getmap_bybox(&bbox, 1000.0, &SpatialReference::wgs84(), DEFAULT_MAX_PIXELS)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("Layer not found"));
}

#[tokio::test]
async fn test_invalid_bbox_sends_nothing() {
    let client = client(handler);
    let service = wms(&["NLCD_2019"], SpatialReference::wgs84(), client.clone());

    let bbox = BoundingBox::new(-90.0, 30.0, -100.0, 40.0);
    let err = service
        .getmap_bybox(&bbox, 1000.0, &SpatialReference::wgs84(), DEFAULT_MAX_PIXELS)
        .await
        .unwrap_err();

    assert!(err.is_invalid_input());
    assert!(client.transport().calls().is_empty());
}

#[tokio::test]
async fn test_supported_crs() {
    let service = wms(&["NLCD_2019"], SpatialReference::wgs84(), client(handler));
    assert_eq!(
        service.supported_crs().await.unwrap(),
        vec!["epsg:4326".to_string(), "epsg:3857".to_string()]
    );
    service.validate_crs().await.unwrap();

    let service = wms(&["NLCD_2019"], SpatialReference::Epsg(5070), client(handler));
    let err = service.validate_crs().await.unwrap_err();
    assert!(err.is_invalid_input());
    assert!(err.to_string().contains("epsg:3857"));
}

#[test]
fn test_layers_required() {
    let result = Wms::new(
        URL,
        Vec::new(),
        "image/tiff",
        WmsVersion::V1_3_0,
        SpatialReference::wgs84(),
        client(handler),
    );
    assert!(matches!(result, Err(e) if e.is_invalid_input()));
}
