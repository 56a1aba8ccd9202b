use crate::data::ZoneInput;
use crate::types::{Bounds, LatLng, PostalCode, Zone, ZoneShape};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::Rect;
use rayon::prelude::*;
use rstar::{Envelope, RTree, RTreeObject, AABB};
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Coordinates published by the API carry five decimals.
pub const RESOLUTION: i32 = 5;

pub fn round_coord(value: f64) -> f64 {
    let scale = 10f64.powi(RESOLUTION);
    (value * scale).round() / scale
}

/// R-tree entry: the bounding envelope of one zone, pointing back into the zone list.
#[derive(Debug, Clone, Copy)]
pub struct ZoneEnvelope {
    pub index: usize,
    pub aabb: AABB<[f64; 2]>,
}

impl RTreeObject for ZoneEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

pub fn envelope_of(rect: &Rect<f64>) -> AABB<[f64; 2]> {
    AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y])
}

/// Derives bounds, centre and neighbour list for every zone.
pub fn build_zones(inputs: Vec<ZoneInput>) -> Vec<ZoneShape> {
    let mut zones = build_shapes(inputs);
    attach_neighbours(&mut zones);
    zones
}

/// Derives bounds and centre only. Zones with empty geometry are dropped.
pub fn build_shapes(inputs: Vec<ZoneInput>) -> Vec<ZoneShape> {
    info!(zones = inputs.len(), "deriving zone geometry");

    let zones: Vec<ZoneShape> = inputs
        .into_par_iter()
        .filter_map(|input| {
            let Some(rect) = input.geometry.bounding_rect() else {
                warn!(postal_code = %input.postal_code, "zone has empty geometry, skipping");
                return None;
            };
            let bounds = bounds_of(&rect);
            Some(ZoneShape {
                zone: Zone {
                    postal_code: input.postal_code,
                    place: input.attributes.place,
                    state: input.attributes.state,
                    population: input.attributes.population,
                    center: LatLng(round_coord(bounds.center().lat()), round_coord(bounds.center().lng())),
                    bounds: Some(bounds),
                    manager: input.attributes.manager,
                    neighbours: Vec::new(),
                },
                geometry: input.geometry,
            })
        })
        .collect();

    info!(zones = zones.len(), "zone geometry derived");
    zones
}

fn attach_neighbours(zones: &mut [ZoneShape]) {
    let envelopes: Vec<Option<AABB<[f64; 2]>>> = zones
        .par_iter()
        .map(|z| z.geometry.bounding_rect().map(|r| envelope_of(&r)))
        .collect();
    let tree = RTree::bulk_load(
        envelopes
            .iter()
            .enumerate()
            .filter_map(|(index, aabb)| aabb.map(|aabb| ZoneEnvelope { index, aabb }))
            .collect(),
    );

    let shared: &[ZoneShape] = zones;
    let neighbours: Vec<Vec<PostalCode>> = envelopes
        .par_iter()
        .enumerate()
        .map(|(index, aabb)| match aabb {
            Some(aabb) => neighbours_of(index, *aabb, &tree, shared),
            None => Vec::new(),
        })
        .collect();

    for (zone, neighbours) in zones.iter_mut().zip(neighbours) {
        zone.zone.neighbours = neighbours;
    }
    info!(zones = zones.len(), "neighbourhoods derived");
}

fn bounds_of(rect: &Rect<f64>) -> Bounds {
    Bounds(
        LatLng(round_coord(rect.min().y), round_coord(rect.min().x)),
        LatLng(round_coord(rect.max().y), round_coord(rect.max().x)),
    )
}

/// Zones whose envelope touches this one, plus zones lying wholly inside the combined
/// envelope of that neighbourhood. Never includes the zone itself.
fn neighbours_of(index: usize, own: AABB<[f64; 2]>, tree: &RTree<ZoneEnvelope>, zones: &[ZoneShape]) -> Vec<PostalCode> {
    let mut found: BTreeSet<usize> = BTreeSet::new();
    let mut region = own;
    for hit in tree.locate_in_envelope_intersecting(&own) {
        found.insert(hit.index);
        region.merge(&hit.aabb);
    }
    found.extend(tree.locate_in_envelope(&region).map(|hit| hit.index));
    found.remove(&index);

    let mut codes: Vec<PostalCode> = found.into_iter().map(|i| zones[i].zone.postal_code.clone()).collect();
    codes.sort();
    codes
}
