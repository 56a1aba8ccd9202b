use crate::processing::round_coord;
use crate::types::{ZoneCatalog, ZoneFeature, ZoneOption, ZoneShape};
use anyhow::{Context, Result};
use geo::{Coord, MapCoords};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Writes the static zone API under `api_dir`:
///
/// ```text
/// api/zones.json            search-assist list
/// api/population.json       postal code -> population
/// api/management.json       postal code -> manager
/// api/<code>.json           zone record
/// api/geo/<code>.geojson    zone record + geometry as a GeoJSON Feature
/// ```
pub fn write_api(api_dir: &Path, zones: &[ZoneShape]) -> Result<()> {
    let geo_dir = api_dir.join("geo");
    fs::create_dir_all(&geo_dir).with_context(|| format!("Failed to create {:?}", geo_dir))?;

    info!(zones = zones.len(), dir = ?api_dir, "writing zone API");

    zones.par_iter().try_for_each(|shape| -> Result<()> {
        let code = shape.zone.postal_code.as_str();
        write_json(&api_dir.join(format!("{code}.json")), &shape.zone)?;

        let geometry = shape.geometry.map_coords(|c| Coord {
            x: round_coord(c.x),
            y: round_coord(c.y),
        });
        let feature = ZoneFeature {
            zone: shape.zone.clone(),
            geometry: geojson::Geometry::new(geojson::Value::from(&geometry)),
        }
        .to_feature()?;
        write_json(&geo_dir.join(format!("{code}.geojson")), &feature)
    })?;

    write_json(&api_dir.join("zones.json"), &catalog(zones))?;

    let population: BTreeMap<&str, String> = zones
        .iter()
        .map(|s| (s.zone.postal_code.as_str(), s.zone.population.to_string()))
        .collect();
    write_json(&api_dir.join("population.json"), &population)?;

    let management: BTreeMap<&str, &str> = zones
        .iter()
        .filter_map(|s| Some((s.zone.postal_code.as_str(), s.zone.manager.as_deref()?)))
        .collect();
    write_json(&api_dir.join("management.json"), &management)?;

    info!("zone API written");
    Ok(())
}

/// `"<code> (<place>)"` entries sorted by postal code.
pub fn catalog(zones: &[ZoneShape]) -> ZoneCatalog {
    let mut zones: Vec<ZoneOption> = zones
        .iter()
        .map(|s| ZoneOption {
            label: format!("{} ({})", s.zone.postal_code, s.zone.place),
            value: s.zone.postal_code.to_string(),
        })
        .collect();
    zones.sort_by(|a, b| a.value.cmp(&b.value));
    ZoneCatalog { zones }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).with_context(|| format!("Failed to write {:?}", path))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{fixtures, Zone};
    use geo::{polygon, MultiPolygon};
    use tempfile::TempDir;

    fn shape(zone: Zone) -> ZoneShape {
        ZoneShape {
            zone,
            geometry: MultiPolygon::new(vec![polygon![
                (x: 13.371234567, y: 52.52),
                (x: 13.39, y: 52.52),
                (x: 13.39, y: 52.54),
            ]]),
        }
    }

    #[test]
    fn test_write_api_layout() {
        let dir = TempDir::new().unwrap();
        let zones = vec![
            shape(fixtures::managed("10117", 11640, "ACME")),
            shape(fixtures::with_neighbours(fixtures::zone("10115", 20313), &["10117"])),
        ];

        write_api(dir.path(), &zones).unwrap();

        let record: Zone = serde_json::from_str(&fs::read_to_string(dir.path().join("10115.json")).unwrap()).unwrap();
        assert_eq!(record, zones[1].zone);

        let text = fs::read_to_string(dir.path().join("geo/10115.geojson")).unwrap();
        let feature = ZoneFeature::try_from(serde_json::from_str::<geojson::Feature>(&text).unwrap()).unwrap();
        assert_eq!(feature.zone.neighbours, vec![fixtures::code("10117")]);
        assert!(text.contains("13.37123"));
        assert!(!text.contains("13.371234567"));

        let catalog: ZoneCatalog =
            serde_json::from_str(&fs::read_to_string(dir.path().join("zones.json")).unwrap()).unwrap();
        assert_eq!(catalog.zones[0].value, "10115");
        assert_eq!(catalog.zones[0].label, "10115 (Place 10115)");

        let management: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(dir.path().join("management.json")).unwrap()).unwrap();
        assert_eq!(management.len(), 1);
        assert_eq!(management["10117"], "ACME");

        let population: BTreeMap<String, String> =
            serde_json::from_str(&fs::read_to_string(dir.path().join("population.json")).unwrap()).unwrap();
        assert_eq!(population["10115"], "20313");
    }
}
