use crate::error::{EmptyPostalCode, FetchError};
use geo::MultiPolygon;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Key of a zone. Never empty, so it cannot collide with "nothing selected".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostalCode(String);

impl PostalCode {
    pub fn new(code: impl Into<String>) -> Result<Self, EmptyPostalCode> {
        let code = code.into();
        let trimmed = code.trim();
        if trimmed.is_empty() {
            return Err(EmptyPostalCode);
        }
        if trimmed.len() == code.len() {
            Ok(Self(code))
        } else {
            Ok(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PostalCode {
    type Error = EmptyPostalCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PostalCode> for String {
    fn from(code: PostalCode) -> Self {
        code.0
    }
}

impl Borrow<str> for PostalCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostalCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// `[lat, lng]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng(pub f64, pub f64);

impl LatLng {
    pub fn lat(&self) -> f64 {
        self.0
    }

    pub fn lng(&self) -> f64 {
        self.1
    }
}

/// `[[south, west], [north, east]]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds(pub LatLng, pub LatLng);

impl Bounds {
    pub fn center(&self) -> LatLng {
        LatLng(
            (self.0.lat() + self.1.lat()) / 2.0,
            (self.0.lng() + self.1.lng()) / 2.0,
        )
    }
}

/// Attributes of one postal-code zone as delivered by the zone API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Zone {
    pub postal_code: PostalCode,
    pub place: String,
    pub state: String,
    #[serde(with = "population_text")]
    pub population: u64,
    pub center: LatLng,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub manager: Option<String>,
    #[serde(default)]
    pub neighbours: Vec<PostalCode>,
}

impl Zone {
    /// A zone is managed when it carries a non-empty manager.
    pub fn is_managed(&self) -> bool {
        self.manager.as_deref().is_some_and(|m| !m.is_empty())
    }
}

// Population travels as text; anything that is not a base-10 integer rejects the record.
mod population_text {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.trim()
            .parse::<u64>()
            .map_err(|_| D::Error::custom(format!("population {text:?} is not a base-10 integer")))
    }
}

/// A zone together with the geometry the map renders for it.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneFeature {
    pub zone: Zone,
    pub geometry: geojson::Geometry,
}

impl ZoneFeature {
    pub fn to_feature(&self) -> Result<geojson::Feature, FetchError> {
        let properties = match serde_json::to_value(&self.zone)? {
            serde_json::Value::Object(map) => map,
            _ => return Err(FetchError::Malformed("zone did not serialize to an object".into())),
        };
        Ok(geojson::Feature {
            bbox: None,
            geometry: Some(self.geometry.clone()),
            id: Some(geojson::feature::Id::String(self.zone.postal_code.to_string())),
            properties: Some(properties),
            foreign_members: None,
        })
    }
}

impl TryFrom<geojson::Feature> for ZoneFeature {
    type Error = FetchError;

    fn try_from(feature: geojson::Feature) -> Result<Self, Self::Error> {
        let geometry = feature
            .geometry
            .ok_or_else(|| FetchError::Malformed("feature has no geometry".into()))?;
        let properties = feature
            .properties
            .ok_or_else(|| FetchError::Malformed("feature has no properties".into()))?;
        let zone: Zone = serde_json::from_value(serde_json::Value::Object(properties))?;
        Ok(Self { zone, geometry })
    }
}

/// One entry of the search-assist list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneCatalog {
    pub zones: Vec<ZoneOption>,
}

impl ZoneCatalog {
    /// Entries whose value or label starts with `prefix`, case-insensitively.
    pub fn suggest<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a ZoneOption> + 'a {
        let prefix = prefix.to_lowercase();
        self.zones.iter().filter(move |option| {
            option.value.starts_with(prefix.as_str())
                || option.label.to_lowercase().starts_with(prefix.as_str())
        })
    }
}

/// A zone with its full-precision polygon, used by the pipeline and the server.
#[derive(Debug, Clone)]
pub struct ZoneShape {
    pub zone: Zone,
    pub geometry: MultiPolygon<f64>,
}

/// Groups thousands with `,` (e.g. `1234567` -> `1,234,567`).
pub fn format_population(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
