//! Buoy station metadata parsing.
//!
//! Station descriptors arrive as flat JSON objects such as
//!
//! ```json
//! {
//!   "Name": "Station 46025 - Santa Monica Basin - 33NM WSW of Santa Monica, CA",
//!   "Location": "33.749 N 119.053 W (33°44'56\" N 119°3'10\" W)",
//!   "Water depth": "905 m",
//!   "Sea temp depth": "2 m below water line"
//! }
//! ```
//!
//! `Name` and `Location` are required; every other field is optional.

use serde::Serialize;
use serde_json::Value as Json;

use crate::{
    coords,
    data::parse_float,
    error::{PipelineError, Result},
};

const UNKNOWN: &str = "Unknown";
const STATION_PAGE_URL: &str = "https://www.ndbc.noaa.gov/station_page.php?station=";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationMetadata {
    pub station_id: String,
    pub station_zone: String,
    /// Hemisphere-suffixed tokens as published, e.g. `33.75N`.
    pub lat_buoy: String,
    pub lon_buoy: String,
    pub latitude: f64,
    pub longitude: f64,
    pub water_depth: Option<String>,
    pub sea_temp_depth: Option<String>,
    pub barometer_elevation: Option<String>,
    pub anemometer_height: Option<String>,
    pub air_temp_height: Option<String>,
    pub url: String,
}

impl StationMetadata {
    /// Field/value pairs in display order.
    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let optional = |value: &Option<String>| value.clone().unwrap_or_else(|| "N/A".into());
        vec![
            ("Station ID", self.station_id.clone()),
            ("Station Zone", self.station_zone.clone()),
            ("Lat", self.lat_buoy.clone()),
            ("Lon", self.lon_buoy.clone()),
            ("Latitude", self.latitude.to_string()),
            ("Longitude", self.longitude.to_string()),
            ("Water Depth", optional(&self.water_depth)),
            ("Sea Temperature Depth (m)", optional(&self.sea_temp_depth)),
            ("Barometer Elevation (m)", optional(&self.barometer_elevation)),
            ("Anemometer Height (m)", optional(&self.anemometer_height)),
            ("Air Temperature Height (m)", optional(&self.air_temp_height)),
            ("URL", self.url.clone()),
        ]
    }
}

/// Keeps only ASCII digits and `.`.
pub fn clean_numeric(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect()
}

fn text_field<'a>(metadata: &'a Json, key: &str) -> Option<&'a str> {
    metadata.get(key).and_then(Json::as_str)
}

/// `"Station 46025 - Santa Monica Basin - ..."` → (`46025`, `santa monica basin`).
fn parse_name(name: &str) -> (String, String) {
    let zone = name
        .splitn(3, " - ")
        .nth(1)
        .map(|z| z.trim().to_lowercase())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let id = name
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
        .unwrap_or_else(|| UNKNOWN.to_string());
    (id, zone)
}

/// Formats a magnitude/hemisphere pair as a two-decimal suffixed token.
fn suffixed_token(magnitude: &str, hemisphere: &str) -> Result<String> {
    let value = parse_float(magnitude).ok_or_else(|| PipelineError::InvalidCoordinate {
        token: format!("{magnitude} {hemisphere}"),
    })?;
    Ok(format!("{value:.2}{hemisphere}"))
}

pub fn parse_station(metadata: &Json) -> Result<StationMetadata> {
    if !metadata.is_object() {
        return Err(PipelineError::InvalidStation(
            "metadata is not a JSON object".into(),
        ));
    }
    let (Some(name), Some(location)) = (
        text_field(metadata, "Name"),
        text_field(metadata, "Location"),
    ) else {
        return Err(PipelineError::InvalidStation(
            "'Name' and 'Location' are required".into(),
        ));
    };

    let (station_id, station_zone) = parse_name(name);
    let parts: Vec<&str> = location.split_whitespace().collect();
    if parts.len() < 4 {
        return Err(PipelineError::InvalidStation(format!(
            "location '{location}' needs at least 4 tokens"
        )));
    }
    let lat_buoy = suffixed_token(parts[0], parts[1])?;
    let lon_buoy = suffixed_token(parts[2], parts[3])?;
    let latitude = coords::parse_suffixed(&lat_buoy)?;
    let longitude = coords::parse_suffixed(&lon_buoy)?;

    let cleaned = |key: &str| text_field(metadata, key).map(clean_numeric);
    Ok(StationMetadata {
        url: format!("{STATION_PAGE_URL}{station_id}"),
        station_id,
        station_zone,
        lat_buoy,
        lon_buoy,
        latitude,
        longitude,
        water_depth: text_field(metadata, "Water depth").map(str::to_string),
        sea_temp_depth: cleaned("Sea temp depth"),
        barometer_elevation: cleaned("Barometer elevation"),
        anemometer_height: cleaned("Anemometer height"),
        air_temp_height: cleaned("Air temp height"),
    })
}
