//! Subcommand implementations.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use ogc_client::{
    ArcGisConfig, ArcGisRestful, ClientConfig, HttpTransport, Method, RetryClient, Wfs, Wms,
};
use ogc_common::{BoundingBox, Geometry, IdentifierBatch, OgcError, OgcResult, SpatialReference};
use ogc_protocol::{WfsVersion, WmsVersion};
use projection::decompose;

use crate::{FeatureArgs, GetMapArgs, QueryArgs, TileArgs, WfsArgs};

pub fn print_tiles(args: &TileArgs) -> Result<()> {
    let bbox = BoundingBox::from_ogc_string(&args.bbox).context("Invalid --bbox")?;
    let crs = SpatialReference::parse(&args.crs).context("Invalid --crs")?;

    let tiles = decompose(&bbox, args.resolution, &crs, args.max_px)?;
    for tile in &tiles {
        println!("{}", serde_json::to_string(tile)?);
    }

    info!(tiles = tiles.len(), "Decomposed bounding box");
    Ok(())
}

pub async fn getmap(args: &GetMapArgs, config: ClientConfig) -> Result<()> {
    let bbox = BoundingBox::from_ogc_string(&args.tiles.bbox).context("Invalid --bbox")?;
    let box_crs = SpatialReference::parse(&args.tiles.crs).context("Invalid --crs")?;
    let service_crs =
        SpatialReference::parse(&args.service_crs).context("Invalid --service-crs")?;
    let version: WmsVersion = args.version.parse()?;

    let client = Arc::new(RetryClient::open(config)?);
    let wms = Wms::new(
        &args.url,
        args.layers.clone(),
        &args.format,
        version,
        service_crs,
        client.clone(),
    )?
    .with_always_xy(args.always_xy);

    if args.validate_crs {
        wms.validate_crs().await?;
    }

    let images = wms
        .getmap_bybox(&bbox, args.tiles.resolution, &box_crs, args.tiles.max_px)
        .await?;

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;

    let extension = file_extension(&args.format);
    for (key, body) in &images {
        let path = args.output_dir.join(format!("{}.{}", key, extension));
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    info!(
        files = images.len(),
        output_dir = %args.output_dir.display(),
        "Map tiles written"
    );
    client.close().await;
    Ok(())
}

pub async fn oids(args: &QueryArgs, config: ClientConfig) -> Result<()> {
    let client = Arc::new(RetryClient::open(config)?);
    let service = ArcGisRestful::connect(arcgis_config(args)?, client.clone()).await?;

    match discover(&service, args).await {
        Ok(batches) => {
            for id in batches.iter().flat_map(|b| b.ids()) {
                println!("{}", id);
            }
        }
        Err(e) if e.is_zero_matched() => warn!(error = %e, "Query matched nothing"),
        Err(e) => return Err(e.into()),
    }

    client.close().await;
    Ok(())
}

pub async fn features(args: &FeatureArgs, config: ClientConfig) -> Result<()> {
    let service_config = ArcGisConfig {
        outformat: args.outformat.clone(),
        outfields: args.outfields.clone(),
        max_workers: args.max_workers.unwrap_or(config.max_workers),
        disable_retry: args.disable_retry || config.disable_retry,
        persist_failures: !args.no_failure_file,
        ..arcgis_config(&args.query)?
    };

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping retrieval");
            token.cancel();
        }
    });

    let client = Arc::new(RetryClient::open(config)?);
    let service = ArcGisRestful::connect(service_config, client.clone())
        .await?
        .with_cancellation(cancel);

    let batches = match discover(&service, &args.query).await {
        Ok(batches) => batches,
        Err(e) if e.is_zero_matched() => {
            warn!(error = %e, "Query matched nothing");
            Vec::new()
        }
        Err(e) => return Err(e.into()),
    };

    let report = service
        .get_features(batches, args.return_m, !args.no_geometry)
        .await?;

    if !report.missing.is_empty() {
        warn!(
            missing = report.missing.len(),
            failed_path = ?report.failed_path,
            cancelled = report.cancelled,
            "Some features could not be fetched"
        );
    }

    let collection = json!({
        "type": "FeatureCollection",
        "features": report.features,
    });
    let output = serde_json::to_string(&collection)?;
    match &args.output {
        Some(path) => tokio::fs::write(path, output)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", output),
    }

    info!(
        request_id = %report.request_id,
        features = report.features.len(),
        passes = report.passes,
        "Features retrieved"
    );
    client.close().await;
    Ok(())
}

pub async fn wfs(args: &WfsArgs, config: ClientConfig) -> Result<()> {
    let crs = SpatialReference::parse(&args.crs).context("Invalid --crs")?;
    let version: WfsVersion = args.version.parse()?;

    let client = Arc::new(RetryClient::open(config)?);
    let service = Wfs::new(&args.url, &args.layer, &args.outformat, version, crs, client.clone())?;

    let response = match (&args.bbox, &args.filter) {
        (Some(bbox), _) => {
            let bbox = BoundingBox::from_ogc_string(bbox).context("Invalid --bbox")?;
            let box_crs = SpatialReference::parse(&args.box_crs).context("Invalid --box-crs")?;
            service
                .getfeature_bybox(&bbox, &box_crs, args.always_xy)
                .await?
        }
        (None, Some(filter)) => service.getfeature_byfilter(filter, Method::Post).await?,
        (None, None) => bail!("one of --bbox or --filter is required"),
    };

    match &args.output {
        Some(path) => tokio::fs::write(path, &response.body)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", response.text()),
    }

    info!(layer = %args.layer, bytes = response.body.len(), "WFS features retrieved");
    client.close().await;
    Ok(())
}

fn arcgis_config(args: &QueryArgs) -> Result<ArcGisConfig> {
    let crs = SpatialReference::parse(&args.crs).context("Invalid --crs")?;
    Ok(ArcGisConfig {
        layer: args.layer,
        crs,
        ..ArcGisConfig::new(args.url.clone())
    })
}

async fn discover<T: HttpTransport>(
    service: &ArcGisRestful<T>,
    args: &QueryArgs,
) -> Result<Vec<IdentifierBatch>, DiscoverError> {
    let result: OgcResult<Vec<IdentifierBatch>> = if let Some(bbox) = &args.bbox {
        let bbox = BoundingBox::from_ogc_string(bbox)?;
        let geo_crs = SpatialReference::parse(&args.geo_crs)?;
        service
            .oids_bygeom(
                Geometry::BoundingBox(bbox),
                &geo_crs,
                &args.spatial_relation,
                args.sql.as_deref(),
                args.distance,
            )
            .await
    } else if let Some(field) = &args.field {
        service.oids_byfield(field, args.values.iter().cloned()).await
    } else if let Some(sql) = &args.sql {
        service.oids_bysql(sql).await
    } else {
        return Err(DiscoverError::NoQuery);
    };
    result.map_err(DiscoverError::Service)
}

/// Discovery failure, keeping zero-match results distinguishable.
#[derive(Debug, Error)]
enum DiscoverError {
    #[error("one of --bbox, --sql or --field is required")]
    NoQuery,

    #[error(transparent)]
    Service(#[from] OgcError),
}

impl DiscoverError {
    fn is_zero_matched(&self) -> bool {
        matches!(self, DiscoverError::Service(e) if e.is_zero_matched())
    }
}

/// File extension for a MIME type such as `image/tiff` or `image/png; mode=8bit`.
fn file_extension(format: &str) -> &str {
    format
        .rsplit('/')
        .next()
        .and_then(|subtype| subtype.split(';').next())
        .map(str::trim)
        .filter(|ext| !ext.is_empty())
        .unwrap_or("bin")
}
