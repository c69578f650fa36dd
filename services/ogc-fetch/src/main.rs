//! Command-line retrieval from ArcGIS RESTful and WMS services.
//!
//! - `tiles`: print the GetMap decomposition of a bounding box
//! - `getmap`: download every layer over a bounding box as tiles
//! - `oids`: discover object ids by geometry, SQL clause or field values
//! - `features`: discover object ids and fetch their features
//! - `wfs`: fetch WFS features by bounding box or CQL filter
//!
//! Ctrl-C stops feature retrieval and reports what was fetched so far.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ogc_client::ClientConfig;
use projection::DEFAULT_MAX_PIXELS;

#[derive(Parser, Debug)]
#[command(name = "ogc-fetch")]
#[command(about = "Fetch features and maps from ArcGIS RESTful and WMS services")]
struct Args {
    /// Client configuration file (YAML)
    #[arg(long, env = "OGC_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for unresolved identifier files
    #[arg(long, env = "OGC_FAILURE_DIR")]
    failure_dir: Option<PathBuf>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the tiles a bounding box is split into
    Tiles(TileArgs),
    /// Download map tiles from a WMS
    Getmap(GetMapArgs),
    /// Print object ids matching a query
    Oids(QueryArgs),
    /// Fetch features matching a query as a GeoJSON-like collection
    Features(FeatureArgs),
    /// Fetch features from a WFS by bounding box or CQL filter
    Wfs(WfsArgs),
}

#[derive(ClapArgs, Debug)]
struct TileArgs {
    /// Bounding box as west,south,east,north
    #[arg(long, allow_hyphen_values = true)]
    bbox: String,

    /// Reference of the bounding box
    #[arg(long, default_value = "epsg:4326")]
    crs: String,

    /// Target resolution in meters per pixel
    #[arg(long)]
    resolution: f64,

    /// Pixel budget per request
    #[arg(long, default_value_t = DEFAULT_MAX_PIXELS)]
    max_px: u64,
}

#[derive(ClapArgs, Debug)]
struct GetMapArgs {
    #[command(flatten)]
    tiles: TileArgs,

    /// WMS endpoint
    #[arg(long, env = "OGC_WMS_URL")]
    url: String,

    /// Comma separated layer names
    #[arg(long, value_delimiter = ',', required = true)]
    layers: Vec<String>,

    /// Output MIME type
    #[arg(long, default_value = "image/tiff")]
    format: String,

    /// WMS version
    #[arg(long, default_value = "1.3.0")]
    version: String,

    /// Reference the service is asked to render in
    #[arg(long, default_value = "epsg:4326")]
    service_crs: String,

    /// Keep x, y bbox order for geographic references
    #[arg(long)]
    always_xy: bool,

    /// Check the reference against the capabilities document first
    #[arg(long)]
    validate_crs: bool,

    /// Directory tiles are written to
    #[arg(long, default_value = "tiles")]
    output_dir: PathBuf,
}

#[derive(ClapArgs, Debug)]
struct QueryArgs {
    /// ArcGIS service url, optionally ending in the layer number
    #[arg(long, env = "OGC_ARCGIS_URL")]
    url: String,

    /// Layer number, when not part of the url
    #[arg(long)]
    layer: Option<u32>,

    /// Query bounding box as west,south,east,north
    #[arg(long, allow_hyphen_values = true, conflicts_with = "field")]
    bbox: Option<String>,

    /// Reference of the query bounding box
    #[arg(long, default_value = "epsg:4326")]
    geo_crs: String,

    /// Spatial relation between the box and the features
    #[arg(long, default_value = "esriSpatialRelIntersects")]
    spatial_relation: String,

    /// Buffer distance around the box in meters
    #[arg(long)]
    distance: Option<u32>,

    /// SQL where clause, alone or combined with --bbox
    #[arg(long)]
    sql: Option<String>,

    /// Field to match against --values
    #[arg(long, requires = "values", conflicts_with = "sql")]
    field: Option<String>,

    /// Comma separated field values
    #[arg(long, value_delimiter = ',')]
    values: Vec<String>,

    /// Reference of returned geometries
    #[arg(long, default_value = "epsg:4326")]
    crs: String,
}

#[derive(ClapArgs, Debug)]
struct FeatureArgs {
    #[command(flatten)]
    query: QueryArgs,

    /// Output format requested from the service
    #[arg(long, default_value = "geojson")]
    outformat: String,

    /// Comma separated output fields
    #[arg(long, value_delimiter = ',', default_value = "*")]
    outfields: Vec<String>,

    /// Batches fetched concurrently
    #[arg(long, env = "OGC_MAX_WORKERS")]
    max_workers: Option<usize>,

    /// Skip the retry pass for missing identifiers
    #[arg(long)]
    disable_retry: bool,

    /// Do not write a failure file for missing identifiers
    #[arg(long)]
    no_failure_file: bool,

    /// Include M values
    #[arg(long)]
    return_m: bool,

    /// Leave geometries out of the response
    #[arg(long)]
    no_geometry: bool,

    /// Output file; stdout when unset
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct WfsArgs {
    /// WFS endpoint
    #[arg(long, env = "OGC_WFS_URL")]
    url: String,

    /// Feature type name
    #[arg(long)]
    layer: String,

    /// Output format requested from the service
    #[arg(long, default_value = "application/json")]
    outformat: String,

    /// WFS version
    #[arg(long, default_value = "2.0.0")]
    version: String,

    /// Reference of returned geometries
    #[arg(long, default_value = "epsg:4326")]
    crs: String,

    /// Bounding box as west,south,east,north
    #[arg(long, allow_hyphen_values = true, conflicts_with = "filter", required_unless_present = "filter")]
    bbox: Option<String>,

    /// Reference of the bounding box
    #[arg(long, default_value = "epsg:4326")]
    box_crs: String,

    /// Keep x, y bbox order for geographic references
    #[arg(long)]
    always_xy: bool,

    /// CQL filter expression, sent in a POST body
    #[arg(long)]
    filter: Option<String>,

    /// Output file; stdout when unset
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &args.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => ClientConfig::from_env(),
    };
    if let Some(dir) = &args.failure_dir {
        config.failure_dir = dir.clone();
    }
    config.validate().context("Invalid client configuration")?;

    info!(command = ?args.command, "Starting ogc-fetch");

    match args.command {
        Command::Tiles(tiles) => commands::print_tiles(&tiles),
        Command::Getmap(getmap) => commands::getmap(&getmap, config).await,
        Command::Oids(query) => commands::oids(&query, config).await,
        Command::Features(features) => commands::features(&features, config).await,
        Command::Wfs(wfs) => commands::wfs(&wfs, config).await,
    }
}
