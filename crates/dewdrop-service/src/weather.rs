//! National Weather Service client.
//!
//! Outdoor dew point comes from the gridpoint forecast endpoint
//! (`/gridpoints/{office}/{x},{y}`), whose `properties.dewpoint.values`
//! series starts at the current hour. A latitude/longitude pair is turned
//! into a grid through `/points/{lat},{lon}` once at startup.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use dewdrop_core::{DewPointSource, Error, Result};

/// Public NWS API root.
pub const DEFAULT_BASE_URL: &str = "https://api.weather.gov";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A forecast office grid cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridPoint {
    pub office: String,
    pub x: u32,
    pub y: u32,
}

impl fmt::Display for GridPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{},{}", self.office, self.x, self.y)
    }
}

#[derive(Debug, Deserialize)]
struct GridpointResponse {
    properties: GridpointProperties,
}

#[derive(Debug, Deserialize)]
struct GridpointProperties {
    dewpoint: Series,
}

#[derive(Debug, Deserialize)]
struct Series {
    #[serde(default)]
    values: Vec<SeriesValue>,
}

#[derive(Debug, Deserialize)]
struct SeriesValue {
    value: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PointsResponse {
    properties: PointsProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointsProperties {
    grid_id: String,
    grid_x: u32,
    grid_y: u32,
}

/// Build the shared HTTP client with the mandatory User-Agent.
fn http_client(user_agent: &str) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(user_agent)
        .timeout(REQUEST_TIMEOUT)
        .build()?)
}

async fn get_text(client: &Client, url: &str) -> Result<String> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(Error::http_status(url, status.as_u16()));
    }
    Ok(response.text().await?)
}

/// Extract the current dew point from a gridpoint response body.
pub fn parse_dewpoint(body: &str) -> Result<f64> {
    let response: GridpointResponse = serde_json::from_str(body)
        .map_err(|e| Error::Weather(format!("malformed gridpoint response: {}", e)))?;

    let first = response
        .properties
        .dewpoint
        .values
        .first()
        .ok_or_else(|| Error::Weather("no dewpoint values".to_string()))?;

    first
        .value
        .ok_or_else(|| Error::Weather("current dewpoint value is null".to_string()))
}

/// Extract the office grid from a points response body.
pub fn parse_grid(body: &str) -> Result<GridPoint> {
    let response: PointsResponse = serde_json::from_str(body)
        .map_err(|e| Error::Weather(format!("malformed points response: {}", e)))?;
    Ok(GridPoint {
        office: response.properties.grid_id,
        x: response.properties.grid_x,
        y: response.properties.grid_y,
    })
}

/// Resolve a latitude/longitude pair to its forecast grid.
pub async fn resolve_grid(
    base_url: &str,
    user_agent: &str,
    latitude: f64,
    longitude: f64,
) -> Result<GridPoint> {
    let client = http_client(user_agent)?;
    let url = format!(
        "{}/points/{:.4},{:.4}",
        base_url.trim_end_matches('/'),
        latitude,
        longitude
    );
    let grid = parse_grid(&get_text(&client, &url).await?)?;
    info!("Resolved {},{} to grid {}", latitude, longitude, grid);
    Ok(grid)
}

/// Outdoor dew point source backed by the NWS gridpoint endpoint.
#[derive(Debug, Clone)]
pub struct NwsClient {
    client: Client,
    url: String,
}

impl NwsClient {
    /// Create a client for `grid` on the public API.
    pub fn new(grid: &GridPoint, user_agent: &str) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, grid, user_agent)
    }

    /// Create a client against another API root.
    pub fn with_base_url(base_url: &str, grid: &GridPoint, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(user_agent)?,
            url: format!(
                "{}/gridpoints/{}/{},{}",
                base_url.trim_end_matches('/'),
                grid.office,
                grid.x,
                grid.y
            ),
        })
    }

    /// The gridpoint URL being polled.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DewPointSource for NwsClient {
    async fn fetch_dewpoint(&self) -> Result<f64> {
        let body = get_text(&self.client, &self.url).await?;
        let value = parse_dewpoint(&body)?;
        debug!("NWS dew point {:.2} C from {}", value, self.url);
        Ok(value)
    }
}
