use anyhow::{anyhow, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::path::PathBuf;
use url::Url;

use crate::geo::LngLat;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
pub const DEFAULT_AUTH_ORIGIN: &str = "http://localhost:8000";
pub const DEFAULT_STATE_DIR: &str = ".mission-dashboard";
pub const DEFAULT_MAP_STYLE: &str = "mapbox://styles/mapbox/light-v10";
pub const DEFAULT_CENTER: LngLat = LngLat(-90.3, 38.64);
pub const DEFAULT_ZOOM: f64 = 11.0;
pub const GPS_ZOOM: f64 = 14.0;
pub const FIT_PADDING_PX: u32 = 20;

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub api_base_url: String,
    pub auth_origin: String,
    pub state_dir: PathBuf,
    pub default_center: LngLat,
    pub default_zoom: f64,
    pub gps_zoom: f64,
    pub fit_padding: u32,
    pub map_style: String,
    pub mapbox_access_token: Option<String>,
    pub gps_fix: Option<LngLat>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            auth_origin: DEFAULT_AUTH_ORIGIN.to_string(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            default_center: DEFAULT_CENTER,
            default_zoom: DEFAULT_ZOOM,
            gps_zoom: GPS_ZOOM,
            fit_padding: FIT_PADDING_PX,
            map_style: DEFAULT_MAP_STYLE.to_string(),
            mapbox_access_token: None,
            gps_fix: None,
        }
    }
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let api_base_url = normalize_base_url(
            "MISSION_API_URL",
            get("MISSION_API_URL")
                .or_else(|| get("VITE_API_URL"))
                .unwrap_or(defaults.api_base_url),
        )?;
        let auth_origin = normalize_base_url(
            "DASHBOARD_AUTH_ORIGIN",
            get("DASHBOARD_AUTH_ORIGIN").unwrap_or(defaults.auth_origin),
        )?;
        let state_dir = get("DASHBOARD_STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.state_dir);

        let default_center = match get("DASHBOARD_DEFAULT_CENTER") {
            Some(raw) => parse_lnglat("DASHBOARD_DEFAULT_CENTER", &raw)?,
            None => defaults.default_center,
        };
        let gps_fix = get("DASHBOARD_GPS_FIX")
            .map(|raw| parse_lnglat("DASHBOARD_GPS_FIX", &raw))
            .transpose()?;

        let default_zoom = parse_or(
            "DASHBOARD_DEFAULT_ZOOM",
            get("DASHBOARD_DEFAULT_ZOOM"),
            defaults.default_zoom,
        )?;
        let gps_zoom = parse_or("DASHBOARD_GPS_ZOOM", get("DASHBOARD_GPS_ZOOM"), defaults.gps_zoom)?;
        let fit_padding = parse_or(
            "DASHBOARD_FIT_PADDING",
            get("DASHBOARD_FIT_PADDING"),
            defaults.fit_padding,
        )?;

        let map_style = get("DASHBOARD_MAP_STYLE").unwrap_or(defaults.map_style);
        let mapbox_access_token =
            get("MAPBOX_ACCESS_TOKEN").or_else(|| get("VITE_MAPBOX_TOKEN"));

        Ok(Self {
            api_base_url,
            auth_origin,
            state_dir,
            default_center,
            default_zoom,
            gps_zoom,
            fit_padding,
            map_style,
            mapbox_access_token,
            gps_fix,
        })
    }
}

fn normalize_base_url(key: &str, raw: String) -> Result<String> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid {key}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!("{key} must be an http(s) URL"));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn parse_lnglat(key: &str, raw: &str) -> Result<LngLat> {
    LngLat::parse(raw).ok_or_else(|| anyhow!("invalid {key}: expected `lng,lat`"))
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value.parse::<T>().with_context(|| format!("invalid {key}")),
        None => Ok(default),
    }
}
