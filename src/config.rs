use crate::types::LatLng;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub server: ServerConfig,
    pub explorer: ExplorerConfig,
    pub map: MapConfig,
    pub style: StyleConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub zones: PathBuf, // .geojson/.json FeatureCollection or .shp
    pub join_column: String,
    pub areas_csv: PathBuf,
    pub population_csv: PathBuf,
    pub management_csv: Option<PathBuf>,
    pub columns: ColumnConfig,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            zones: PathBuf::from("assets/zones.geojson"),
            join_column: "plz".to_string(),
            areas_csv: PathBuf::from("assets/area.csv"),
            population_csv: PathBuf::from("assets/population.csv"),
            management_csv: Some(PathBuf::from("assets/management.csv")),
            columns: ColumnConfig::default(),
        }
    }
}

/// CSV header names.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ColumnConfig {
    pub postal_code: String,
    pub place: String,
    pub state: String,
    pub population: String,
    pub manager: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            postal_code: "plz".to_string(),
            place: "ort".to_string(),
            state: "bundesland".to_string(),
            population: "einwohner".to_string(),
            manager: "management".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub api_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { api_dir: PathBuf::from("api") }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExplorerConfig {
    pub api_url: String,
    /// Upper bound on one zone request; a request that runs longer fails.
    pub request_timeout_secs: u64,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl ExplorerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MapConfig {
    pub center: LatLng, // overview extent
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center: LatLng(51.0948001, 10.2651007),
            min_zoom: 6,
            max_zoom: 14,
        }
    }
}

/// Fill colours per highlight tier, `#rrggbb`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct StyleConfig {
    pub managed: String,
    pub selected: String,
    pub viewed: String,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            managed: "#de4f06".to_string(),
            selected: "#ffff00".to_string(),
            viewed: "#8a2be2".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(content)
            .with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.explorer.request_timeout_secs == 0 {
            return Err(anyhow!("explorer.request_timeout_secs must be positive"));
        }
        if self.map.min_zoom > self.map.max_zoom {
            return Err(anyhow!(
                "map.min_zoom ({}) exceeds map.max_zoom ({})",
                self.map.min_zoom,
                self.map.max_zoom
            ));
        }
        for (tier, color) in [
            ("managed", &self.style.managed),
            ("selected", &self.style.selected),
            ("viewed", &self.style.viewed),
        ] {
            parse_hex_color(color).with_context(|| format!("Invalid style.{tier} colour"))?;
        }
        Ok(())
    }
}

pub fn parse_hex_color(hex: &str) -> Result<[u8; 3]> {
    let digits = hex
        .strip_prefix('#')
        .filter(|d| d.len() == 6 && d.is_ascii())
        .ok_or_else(|| anyhow!("expected #rrggbb, got {:?}", hex))?;
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16).with_context(|| format!("bad hex digits in {:?}", hex))
    };
    Ok([channel(0..2)?, channel(2..4)?, channel(4..6)?])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.map, MapConfig::default());
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.input.columns.population, "einwohner");
        assert_eq!(config.style.viewed, "#8a2be2");
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = AppConfig::from_toml(
            r##"
            [input]
            zones = "data/plz.shp"
            management_csv = "data/mgmt.csv"

            [input.columns]
            population = "pop"

            [explorer]
            api_url = "http://zones.local"
            request_timeout_secs = 3

            [map]
            center = [52.5, 13.4]
            max_zoom = 12

            [style]
            viewed = "#123456"
            "##,
        )
        .unwrap();

        assert_eq!(config.input.zones, PathBuf::from("data/plz.shp"));
        assert_eq!(config.input.columns.population, "pop");
        assert_eq!(config.input.columns.place, "ort");
        assert_eq!(config.explorer.api_url, "http://zones.local");
        assert_eq!(config.explorer.request_timeout(), Duration::from_secs(3));
        assert_eq!(config.map.center, LatLng(52.5, 13.4));
        assert_eq!(config.map.max_zoom, 12);
        assert_eq!(config.map.min_zoom, 6);
        assert_eq!(config.style.viewed, "#123456");
    }

    #[test]
    fn test_rejects_bad_colour() {
        let err = AppConfig::from_toml("[style]\nmanaged = \"orange\"").unwrap_err();
        assert!(format!("{err:#}").contains("style.managed"));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let err = AppConfig::from_toml("[explorer]\nrequest_timeout_secs = 0").unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn test_rejects_inverted_zoom() {
        assert!(AppConfig::from_toml("[map]\nmin_zoom = 15").is_err());
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#de4f06").unwrap(), [0xde, 0x4f, 0x06]);
        assert!(parse_hex_color("de4f06").is_err());
        assert!(parse_hex_color("#zz0000").is_err());
    }
}
