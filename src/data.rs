use crate::config::{AppConfig, ColumnConfig};
use crate::types::PostalCode;
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord};
use geo::{Coord, LineString, MultiPolygon, Polygon};
use quick_xml::events::Event;
use shapefile::Reader;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Joined attributes for one postal code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneAttributes {
    pub place: String,
    pub state: String,
    pub population: u64,
    pub manager: Option<String>,
}

/// A zone as loaded from the inputs, before any geometry is derived.
#[derive(Debug, Clone)]
pub struct ZoneInput {
    pub postal_code: PostalCode,
    pub geometry: MultiPolygon<f64>,
    pub attributes: ZoneAttributes,
}

pub fn load_data(config: &AppConfig) -> Result<Vec<ZoneInput>> {
    let attributes = load_attributes(config)?;
    info!(zones = attributes.len(), "loaded attribute tables");

    let extension = config
        .input
        .zones
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input geometry file has no extension"))?;

    let geometries = match extension.as_str() {
        "shp" => load_shapefile(&config.input.zones, &config.input.join_column)?,
        "json" | "geojson" => load_geojson(&config.input.zones, &config.input.join_column)?,
        "kml" => {
            let text = fs::read_to_string(&config.input.zones)
                .with_context(|| format!("Failed to read KML file: {:?}", config.input.zones))?;
            parse_kml(&text)?
        }
        "kmz" => parse_kml(&read_kmz(&config.input.zones)?)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    let mut zones = Vec::with_capacity(geometries.len());
    for (code, geometry) in geometries {
        match attributes.get(&code) {
            Some(attrs) => zones.push(ZoneInput {
                postal_code: code,
                geometry,
                attributes: attrs.clone(),
            }),
            None => warn!(postal_code = %code, "no attribute rows for zone, skipping"),
        }
    }
    zones.sort_by(|a, b| a.postal_code.cmp(&b.postal_code));

    info!(zones = zones.len(), "loaded and joined zone geometry");
    Ok(zones)
}

/// Joins the area, population and management tables by postal code. Codes missing from
/// either the area or the population table are dropped.
pub fn load_attributes(config: &AppConfig) -> Result<HashMap<PostalCode, ZoneAttributes>> {
    let columns = &config.input.columns;

    let mut areas = HashMap::new();
    read_rows(&config.input.areas_csv, columns, &[columns.place.as_str(), columns.state.as_str()], |code, values| {
        // first row wins when a code spans several places
        areas.entry(code).or_insert((values[0].to_string(), values[1].to_string()));
        Ok(())
    })?;

    let mut population = HashMap::new();
    read_rows(&config.input.population_csv, columns, &[columns.population.as_str()], |code, values| {
        let count = values[0]
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Population {:?} for {} is not a base-10 integer", values[0], code))?;
        population.insert(code, count);
        Ok(())
    })?;

    let mut management = HashMap::new();
    match &config.input.management_csv {
        Some(path) if !path.exists() => warn!(path = ?path, "management table not found, no zone is managed"),
        Some(path) => read_rows(path, columns, &[columns.manager.as_str()], |code, values| {
            if !values[0].trim().is_empty() {
                management.insert(code, values[0].trim().to_string());
            }
            Ok(())
        })?,
        None => {}
    }

    let mut joined = HashMap::with_capacity(areas.len());
    for (code, (place, state)) in areas {
        let Some(&count) = population.get(&code) else {
            warn!(postal_code = %code, "no population row, skipping");
            continue;
        };
        let manager = management.remove(&code);
        joined.insert(
            code,
            ZoneAttributes {
                place,
                state,
                population: count,
                manager,
            },
        );
    }
    Ok(joined)
}

/// Streams `path`, handing the postal code plus the requested columns of each row to `row`.
fn read_rows<F>(path: &Path, columns: &ColumnConfig, wanted: &[&str], mut row: F) -> Result<()>
where
    F: FnMut(PostalCode, Vec<&str>) -> Result<()>,
{
    let file = File::open(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().from_reader(file);
    let headers = rdr.headers()?.clone();

    let key_idx = column_index(&headers, &columns.postal_code, path)?;
    let indices = wanted
        .iter()
        .map(|name| column_index(&headers, name, path))
        .collect::<Result<Vec<_>>>()?;

    for result in rdr.records() {
        let record = result.with_context(|| format!("Failed to read row in {:?}", path))?;
        let Ok(code) = PostalCode::new(record.get(key_idx).unwrap_or("")) else {
            continue;
        };
        let values = indices.iter().map(|&i| record.get(i).unwrap_or("")).collect();
        row(code, values)?;
    }
    Ok(())
}

fn column_index(headers: &StringRecord, name: &str, path: &Path) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| anyhow!("Column '{}' not found in {:?}", name, path))
}

fn load_shapefile(path: &Path, join_column: &str) -> Result<Vec<(PostalCode, MultiPolygon<f64>)>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut shapes: HashMap<PostalCode, MultiPolygon<f64>> = HashMap::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let id_value = record
            .get(join_column)
            .ok_or_else(|| anyhow!("Join column '{}' not found in Shapefile", join_column))?;

        let id = match id_value {
            shapefile::dbase::FieldValue::Character(Some(s)) => s.clone(),
            shapefile::dbase::FieldValue::Character(None) => continue,
            shapefile::dbase::FieldValue::Numeric(Some(n)) => format!("{n:05.0}"),
            _ => return Err(anyhow!("Shapefile join column must be a string")),
        };
        let Ok(code) = PostalCode::new(id) else { continue };

        let geometry: MultiPolygon<f64> = match shape {
            shapefile::Shape::Polygon(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygon: {:?}", e))?,
            shapefile::Shape::PolygonM(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonM: {:?}", e))?,
            shapefile::Shape::PolygonZ(polygon) => polygon
                .try_into()
                .map_err(|e| anyhow!("Failed to convert polygonZ: {:?}", e))?,
            _ => continue,
        };

        merge_part(&mut shapes, code, geometry);
    }

    Ok(shapes.into_iter().collect())
}

fn load_geojson(path: &Path, join_column: &str) -> Result<Vec<(PostalCode, MultiPolygon<f64>)>> {
    use geojson::GeoJson;
    use std::io::BufReader;

    info!(path = ?path, "loading GeoJSON");
    let file = File::open(path).with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let geojson = GeoJson::from_reader(BufReader::new(file)).context("Failed to parse GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut shapes: HashMap<PostalCode, MultiPolygon<f64>> = HashMap::new();

    for feature in collection.features {
        let id = match feature.properties.as_ref().and_then(|props| props.get(join_column)) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        let Ok(code) = PostalCode::new(id) else { continue };

        let Some(geometry) = feature.geometry else { continue };
        let geometry: geo::Geometry<f64> = geometry
            .value
            .try_into()
            .map_err(|e| anyhow!("Failed to convert geojson geometry for {}: {:?}", code, e))?;

        let geometry = match geometry {
            geo::Geometry::MultiPolygon(mp) => mp,
            geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
            _ => continue,
        };

        merge_part(&mut shapes, code, geometry);
    }

    Ok(shapes.into_iter().collect())
}

/// First `.kml` document inside a KMZ archive.
fn read_kmz(path: &Path) -> Result<String> {
    let file = File::open(path).with_context(|| format!("Failed to open KMZ file: {:?}", path))?;
    let mut archive = zip::ZipArchive::new(file).with_context(|| format!("Failed to read KMZ archive: {:?}", path))?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.name().to_lowercase().ends_with(".kml") {
            let mut text = String::new();
            entry.read_to_string(&mut text)?;
            return Ok(text);
        }
    }
    Err(anyhow!("No .kml document inside {:?}", path))
}

enum KmlText {
    Name,
    Coordinates,
}

/// Each Placemark's `<name>` is its postal code. A `<coordinates>` list inside an inner
/// boundary cuts a hole into the polygon before it; any other list starts a new polygon.
pub fn parse_kml(text: &str) -> Result<Vec<(PostalCode, MultiPolygon<f64>)>> {
    let mut reader = quick_xml::Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut shapes: HashMap<PostalCode, MultiPolygon<f64>> = HashMap::new();
    let mut placemark: Option<(Option<String>, Vec<Polygon<f64>>)> = None;
    let mut capture: Option<KmlText> = None;
    let mut inner = false;
    let mut buffer = String::new();

    loop {
        match reader.read_event().context("Failed to parse KML")? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"Placemark" => placemark = Some((None, Vec::new())),
                b"innerBoundaryIs" => inner = true,
                b"name" if placemark.is_some() => {
                    capture = Some(KmlText::Name);
                    buffer.clear();
                }
                b"coordinates" if placemark.is_some() => {
                    capture = Some(KmlText::Coordinates);
                    buffer.clear();
                }
                _ => {}
            },
            Event::Text(t) if capture.is_some() => {
                buffer.push_str(&t.unescape().context("Bad text in KML")?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"name" | b"coordinates" => {
                    if let (Some(kind), Some((name, polygons))) = (capture.take(), placemark.as_mut()) {
                        match kind {
                            KmlText::Name => *name = Some(buffer.trim().to_string()),
                            KmlText::Coordinates => {
                                let ring = parse_coordinates(&buffer)?;
                                match polygons.last_mut() {
                                    Some(polygon) if inner => polygon.interiors_push(ring),
                                    _ => polygons.push(Polygon::new(ring, Vec::new())),
                                }
                            }
                        }
                    }
                }
                b"innerBoundaryIs" => inner = false,
                b"Placemark" => {
                    if let Some((Some(name), polygons)) = placemark.take() {
                        match PostalCode::new(name) {
                            Ok(code) if !polygons.is_empty() => merge_part(&mut shapes, code, MultiPolygon::new(polygons)),
                            _ => warn!("KML placemark without postal code or geometry, skipping"),
                        }
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(shapes.into_iter().collect())
}

/// `lng,lat[,alt]` tuples separated by whitespace.
fn parse_coordinates(text: &str) -> Result<LineString<f64>> {
    text.split_whitespace()
        .map(|tuple| {
            let mut parts = tuple.split(',');
            let (Some(lng), Some(lat)) = (parts.next(), parts.next()) else {
                return Err(anyhow!("Bad KML coordinate {:?}", tuple));
            };
            Ok(Coord {
                x: lng.trim().parse().with_context(|| format!("Bad KML longitude in {:?}", tuple))?,
                y: lat.trim().parse().with_context(|| format!("Bad KML latitude in {:?}", tuple))?,
            })
        })
        .collect::<Result<Vec<Coord<f64>>>>()
        .map(LineString::new)
}

// A postal code split over several features becomes one multipolygon.
fn merge_part(shapes: &mut HashMap<PostalCode, MultiPolygon<f64>>, code: PostalCode, part: MultiPolygon<f64>) {
    shapes.entry(code).or_insert_with(|| MultiPolygon::new(Vec::new())).0.extend(part.0);
}
