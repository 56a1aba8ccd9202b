use crate::config::AppConfig;
use crate::processing::{envelope_of, ZoneEnvelope};
use crate::types::{Zone, ZoneShape};
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use geo::algorithm::bounding_rect::BoundingRect;
use geo::algorithm::contains::Contains;
use geo::Point;
use rstar::{RTree, AABB};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

/// Point lookup over the zone polygons.
pub struct ZoneIndex {
    zones: Vec<ZoneShape>,
    tree: RTree<ZoneEnvelope>,
}

impl ZoneIndex {
    pub fn new(zones: Vec<ZoneShape>) -> Self {
        let items: Vec<ZoneEnvelope> = zones
            .iter()
            .enumerate()
            .filter_map(|(index, shape)| {
                let rect = shape.geometry.bounding_rect()?;
                Some(ZoneEnvelope { index, aabb: envelope_of(&rect) })
            })
            .collect();
        Self {
            zones,
            tree: RTree::bulk_load(items),
        }
    }

    /// The zone whose polygon contains the point, if any.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&Zone> {
        let point = Point::new(lon, lat);
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([lon, lat]))
            .filter_map(|candidate| self.zones.get(candidate.index))
            .find(|shape| shape.geometry.contains(&point))
            .map(|shape| &shape.zone)
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

#[derive(Deserialize)]
pub struct QueryParams {
    lat: f64,
    lon: f64,
}

pub async fn start_server(config: AppConfig, zones: Vec<ZoneShape>) -> Result<()> {
    info!("building spatial index for API");
    let state = Arc::new(ZoneIndex::new(zones));
    info!(zones = state.len(), "spatial index built");

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));

    let api = Router::new()
        .route("/query", get(query_handler))
        .fallback_service(ServeDir::new(&config.output.api_dir));

    let app = Router::new()
        .nest("/api", api)
        .fallback_service(ServeDir::new("."))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("serving on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn query_handler(
    State(index): State<Arc<ZoneIndex>>,
    Query(params): Query<QueryParams>,
) -> Json<Option<Zone>> {
    Json(index.locate(params.lon, params.lat).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures;
    use geo::{polygon, MultiPolygon};

    fn shape(code: &str, x0: f64, y0: f64, x1: f64, y1: f64) -> ZoneShape {
        ZoneShape {
            zone: fixtures::zone(code, 1),
            geometry: MultiPolygon::new(vec![polygon![
                (x: x0, y: y0),
                (x: x1, y: y0),
                (x: x0, y: y1),
            ]]),
        }
    }

    fn index() -> Arc<ZoneIndex> {
        Arc::new(ZoneIndex::new(vec![
            shape("10115", 0.0, 0.0, 2.0, 2.0),
            shape("10117", 2.0, 2.0, 0.0, 0.0),
            shape("20095", 10.0, 10.0, 11.0, 11.0),
        ]))
    }

    #[test]
    fn test_locate_uses_exact_containment() {
        let index = index();
        // both triangles share the envelope; containment picks the right one
        assert_eq!(index.locate(0.5, 0.5).map(|z| z.postal_code.as_str()), Some("10115"));
        assert_eq!(index.locate(1.5, 1.5).map(|z| z.postal_code.as_str()), Some("10117"));
        assert_eq!(index.locate(10.5, 10.2).map(|z| z.postal_code.as_str()), Some("20095"));
        assert!(index.locate(5.0, 5.0).is_none());
    }

    #[tokio::test]
    async fn test_query_handler() {
        let Json(hit) = query_handler(State(index()), Query(QueryParams { lat: 10.2, lon: 10.5 })).await;
        assert_eq!(hit.map(|z| z.postal_code.to_string()), Some("20095".to_string()));

        let Json(miss) = query_handler(State(index()), Query(QueryParams { lat: 50.0, lon: 50.0 })).await;
        assert!(miss.is_none());
    }
}
