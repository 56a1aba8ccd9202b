//! The map's zone layer: which geometries are rendered, how each is tinted, and where the
//! camera points. Neighbour geometry is fetched lazily through the injected fetch callback.

use crate::cache::GeometryCache;
use crate::config::{MapConfig, StyleConfig};
use crate::error::FetchError;
use crate::info::ViewFocus;
use crate::ledger::Membership;
use crate::types::{Bounds, LatLng, PostalCode, Zone, ZoneFeature};
use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Highlight tier of a rendered zone. Later tiers win.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneStyle {
    Default,
    Managed,
    Selected,
    Viewed,
}

impl ZoneStyle {
    pub fn resolve(zone: &Zone, selection: &dyn Membership, viewed: &dyn ViewFocus) -> Self {
        let mut style = ZoneStyle::Default;
        if zone.is_managed() {
            style = ZoneStyle::Managed;
        }
        if selection.has(zone) {
            style = ZoneStyle::Selected;
        }
        if viewed.is_selected_for_view(zone) {
            style = ZoneStyle::Viewed;
        }
        style
    }

    pub fn fill_color<'a>(&self, palette: &'a StyleConfig) -> Option<&'a str> {
        match self {
            ZoneStyle::Default => None,
            ZoneStyle::Managed => Some(&palette.managed),
            ZoneStyle::Selected => Some(&palette.selected),
            ZoneStyle::Viewed => Some(&palette.viewed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraMove {
    FlyToBounds(Bounds),
    FlyTo { center: LatLng, zoom: u8 },
    PanTo(LatLng),
}

#[derive(Debug, Clone)]
pub struct RenderedZone {
    pub feature: Arc<ZoneFeature>,
    pub style: ZoneStyle,
}

pub type ZoneCallback = Box<dyn Fn(&PostalCode)>;

pub struct MapView {
    settings: MapConfig,
    cache: GeometryCache,
    layer: IndexMap<PostalCode, RenderedZone>,
    // codes the current view session wants on screen; late fetches for others stay cached only
    wanted: HashSet<PostalCode>,
    in_flight: HashSet<PostalCode>,
    camera: CameraMove,
    revision: u64,
    on_select: ZoneCallback,
    fetch_neighbour: ZoneCallback,
}

impl MapView {
    /// `on_select` is wired to every rendered zone's click; `fetch_neighbour` must eventually
    /// answer through [`MapView::on_neighbour_loaded`].
    pub fn new(settings: MapConfig, on_select: ZoneCallback, fetch_neighbour: ZoneCallback) -> Self {
        let camera = overview(&settings);
        Self {
            settings,
            cache: GeometryCache::new(),
            layer: IndexMap::new(),
            wanted: HashSet::new(),
            in_flight: HashSet::new(),
            camera,
            revision: 0,
            on_select,
            fetch_neighbour,
        }
    }

    /// Moves the camera to `feature` and puts its own geometry on the layer.
    pub fn focus(&mut self, feature: Arc<ZoneFeature>, fly: bool) {
        let zone = &feature.zone;
        self.camera = match (fly, zone.bounds) {
            (true, Some(bounds)) => CameraMove::FlyToBounds(bounds),
            (true, None) => CameraMove::FlyTo {
                center: zone.center,
                zoom: self.settings.max_zoom.saturating_sub(1),
            },
            (false, _) => CameraMove::PanTo(zone.center),
        };
        let code = zone.postal_code.clone();
        let cached = self.cache.put(code.clone(), feature);
        self.wanted.insert(code.clone());
        self.render(code, cached);
    }

    /// Renders cached neighbours and requests the missing ones. Returns how many fetches
    /// were issued.
    pub fn ensure_neighbours_loaded(&mut self, zone: &Zone) -> usize {
        let mut issued = 0;
        for neighbour in &zone.neighbours {
            self.wanted.insert(neighbour.clone());
            if let Some(feature) = self.cache.get(neighbour.as_str()).cloned() {
                self.render(neighbour.clone(), feature);
                continue;
            }
            if !self.in_flight.insert(neighbour.clone()) {
                continue;
            }
            (self.fetch_neighbour)(neighbour);
            issued += 1;
        }
        issued
    }

    /// Completion of a neighbour fetch. Failures are dropped; successes are cached and,
    /// if still wanted by this view session, rendered.
    pub fn on_neighbour_loaded(
        &mut self,
        code: PostalCode,
        result: Result<ZoneFeature, FetchError>,
        selection: &dyn Membership,
        viewed: &dyn ViewFocus,
    ) -> bool {
        self.in_flight.remove(&code);
        let feature = match result {
            Ok(feature) if feature.zone.postal_code == code => feature,
            Ok(feature) => {
                debug!(requested = %code, received = %feature.zone.postal_code, "neighbour answered with another zone");
                return false;
            }
            Err(e) => {
                debug!(%code, error = %e, "neighbour fetch failed");
                return false;
            }
        };
        let feature = self.cache.put(code.clone(), Arc::new(feature));
        if !self.wanted.contains(&code) || self.layer.contains_key(&code) {
            return false;
        }
        let style = ZoneStyle::resolve(&feature.zone, selection, viewed);
        self.layer.insert(code, RenderedZone { feature, style });
        self.revision += 1;
        true
    }

    pub fn restyle_all(&mut self, selection: &dyn Membership, viewed: &dyn ViewFocus) {
        for rendered in self.layer.values_mut() {
            rendered.style = ZoneStyle::resolve(&rendered.feature.zone, selection, viewed);
        }
        self.revision += 1;
    }

    /// Click on a rendered zone.
    pub fn click(&self, code: &str) -> bool {
        match self.layer.get_key_value(code) {
            Some((code, _)) => {
                (self.on_select)(code);
                true
            }
            None => false,
        }
    }

    /// Clears the layer and returns to the overview. The geometry cache survives.
    pub fn reset(&mut self) {
        self.layer.clear();
        self.wanted.clear();
        self.camera = overview(&self.settings);
        self.revision += 1;
    }

    pub fn layer(&self) -> impl Iterator<Item = (&PostalCode, &RenderedZone)> {
        self.layer.iter()
    }

    pub fn style_of(&self, code: &str) -> Option<ZoneStyle> {
        self.layer.get(code).map(|rendered| rendered.style)
    }

    pub fn camera(&self) -> &CameraMove {
        &self.camera
    }

    pub fn cache(&self) -> &GeometryCache {
        &self.cache
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn render(&mut self, code: PostalCode, feature: Arc<ZoneFeature>) {
        if self.layer.contains_key(&code) {
            return;
        }
        self.layer.insert(code, RenderedZone { feature, style: ZoneStyle::Default });
        self.revision += 1;
    }
}

fn overview(settings: &MapConfig) -> CameraMove {
    CameraMove::FlyTo {
        center: settings.center,
        zoom: settings.min_zoom,
    }
}

impl fmt::Debug for MapView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapView")
            .field("layer", &self.layer.keys().collect::<Vec<_>>())
            .field("in_flight", &self.in_flight)
            .field("cached", &self.cache.len())
            .field("camera", &self.camera)
            .finish_non_exhaustive()
    }
}
