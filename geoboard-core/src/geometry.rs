//! GeoJSON polygon geometry for map features.
//!
//! Every feature on the board is a single polygon: a closed exterior ring of
//! `[lng, lat]` positions. The three drawing tools all funnel into the same
//! ring representation:
//!
//! ```text
//! Rectangle { corner_a, corner_b }  ──►  4-vertex axis-aligned ring
//! Polygon   { vertices }            ──►  ring from clicked vertices
//! Freehand  { path }                ──►  ring from the captured pointer path
//! ```
//!
//! Serialized form is interchange-standard GeoJSON:
//! `{"type": "Polygon", "coordinates": [[[lng, lat], ...]]}` with the first
//! position repeated as the last to close the ring.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single `[lng, lat]` coordinate pair.
pub type Position = [f64; 2];

/// Minimum distinct vertices for a valid ring.
pub const MIN_RING_VERTICES: usize = 3;

/// The drawing tool a shape was captured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawTool {
    Rectangle,
    Polygon,
    Freehand,
}

impl std::fmt::Display for DrawTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DrawTool::Rectangle => write!(f, "rectangle"),
            DrawTool::Polygon => write!(f, "polygon"),
            DrawTool::Freehand => write!(f, "freehand"),
        }
    }
}

/// Geometry validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("ring needs at least {needed} distinct vertices, got {got}")]
    TooFewVertices { needed: usize, got: usize },
    #[error("ring encloses no area")]
    ZeroArea,
}

/// A finished capture gesture, as handed over by the drawing widget.
///
/// The capture collaborator signals completion exactly once per gesture;
/// turning the raw capture into a validated [`Geometry`] is this module's
/// job, not the widget's.
#[derive(Debug, Clone, PartialEq)]
pub enum Sketch {
    /// Two opposite corners of an axis-aligned rectangle.
    Rectangle { corner_a: Position, corner_b: Position },
    /// Explicitly clicked polygon vertices, in order.
    Polygon { vertices: Vec<Position> },
    /// The pointer path of a freehand gesture.
    Freehand { path: Vec<Position> },
}

impl Sketch {
    /// The tool this sketch belongs to.
    pub fn tool(&self) -> DrawTool {
        match self {
            Sketch::Rectangle { .. } => DrawTool::Rectangle,
            Sketch::Polygon { .. } => DrawTool::Polygon,
            Sketch::Freehand { .. } => DrawTool::Freehand,
        }
    }

    /// Build a validated geometry from the captured gesture.
    pub fn into_geometry(self) -> Result<Geometry, GeometryError> {
        match self {
            Sketch::Rectangle { corner_a, corner_b } => Geometry::rectangle(corner_a, corner_b),
            Sketch::Polygon { vertices } => Geometry::from_ring(vertices),
            Sketch::Freehand { path } => Geometry::from_ring(path),
        }
    }
}

/// GeoJSON geometry type tag. Only polygons exist on this board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Polygon,
}

/// A GeoJSON Polygon with a single closed exterior ring.
///
/// `coordinates[0]` is the exterior ring; the first position is repeated as
/// the last. Constructors uphold the ring invariants (≥3 distinct vertices,
/// nonzero area, closed); deserialized geometries can be re-checked with
/// [`Geometry::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: GeometryKind,
    pub coordinates: Vec<Vec<Position>>,
}

impl Geometry {
    /// Build a polygon from an ordered vertex list.
    ///
    /// Consecutive duplicate positions are dropped (freehand capture emits
    /// them freely), the ring is closed, and the result is validated.
    pub fn from_ring(vertices: Vec<Position>) -> Result<Self, GeometryError> {
        let mut ring: Vec<Position> = Vec::with_capacity(vertices.len() + 1);
        for v in vertices {
            if ring.last() != Some(&v) {
                ring.push(v);
            }
        }
        // A closing point in the input is the lead vertex again, not a new one.
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }

        if ring.len() < MIN_RING_VERTICES {
            return Err(GeometryError::TooFewVertices {
                needed: MIN_RING_VERTICES,
                got: ring.len(),
            });
        }
        if ring_area(&ring) == 0.0 {
            return Err(GeometryError::ZeroArea);
        }

        let first = ring[0];
        ring.push(first);
        Ok(Self {
            kind: GeometryKind::Polygon,
            coordinates: vec![ring],
        })
    }

    /// Build an axis-aligned rectangle from two opposite corners.
    pub fn rectangle(corner_a: Position, corner_b: Position) -> Result<Self, GeometryError> {
        let (west, east) = (corner_a[0].min(corner_b[0]), corner_a[0].max(corner_b[0]));
        let (south, north) = (corner_a[1].min(corner_b[1]), corner_a[1].max(corner_b[1]));
        if west == east || south == north {
            return Err(GeometryError::ZeroArea);
        }
        Self::from_ring(vec![
            [west, south],
            [east, south],
            [east, north],
            [west, north],
        ])
    }

    /// The closed exterior ring.
    pub fn exterior(&self) -> &[Position] {
        self.coordinates.first().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of distinct vertices (the closing point is not counted).
    pub fn vertex_count(&self) -> usize {
        self.exterior().len().saturating_sub(1)
    }

    /// Whether the exterior ring is closed (first position == last).
    pub fn is_closed(&self) -> bool {
        let ring = self.exterior();
        ring.len() >= 2 && ring.first() == ring.last()
    }

    /// Re-check the ring invariants on a geometry from an untrusted source.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let ring = self.exterior();
        let distinct = if self.is_closed() {
            &ring[..ring.len() - 1]
        } else {
            ring
        };
        if distinct.len() < MIN_RING_VERTICES {
            return Err(GeometryError::TooFewVertices {
                needed: MIN_RING_VERTICES,
                got: distinct.len(),
            });
        }
        if ring_area(distinct) == 0.0 {
            return Err(GeometryError::ZeroArea);
        }
        Ok(())
    }
}

/// Shoelace area over an open vertex list (planar, in squared degrees).
/// Used only as a degeneracy check.
fn ring_area(ring: &[Position]) -> f64 {
    let mut twice_area = 0.0;
    for i in 0..ring.len() {
        let [x1, y1] = ring[i];
        let [x2, y2] = ring[(i + 1) % ring.len()];
        twice_area += x1 * y2 - x2 * y1;
    }
    (twice_area / 2.0).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_ring() {
        let geom = Geometry::rectangle([0.0, 0.0], [2.0, 1.0]).unwrap();
        assert_eq!(geom.vertex_count(), 4);
        assert!(geom.is_closed());
        assert_eq!(geom.exterior().first(), geom.exterior().last());
    }

    #[test]
    fn test_rectangle_corner_order_irrelevant() {
        let a = Geometry::rectangle([0.0, 0.0], [2.0, 1.0]).unwrap();
        let b = Geometry::rectangle([2.0, 1.0], [0.0, 0.0]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rectangle_degenerate() {
        assert_eq!(
            Geometry::rectangle([1.0, 0.0], [1.0, 5.0]),
            Err(GeometryError::ZeroArea)
        );
        assert_eq!(
            Geometry::rectangle([3.0, 2.0], [3.0, 2.0]),
            Err(GeometryError::ZeroArea)
        );
    }

    #[test]
    fn test_ring_too_few_vertices() {
        let err = Geometry::from_ring(vec![[0.0, 0.0], [1.0, 1.0]]).unwrap_err();
        assert_eq!(err, GeometryError::TooFewVertices { needed: 3, got: 2 });
    }

    #[test]
    fn test_ring_consecutive_duplicates_dropped() {
        let geom = Geometry::from_ring(vec![
            [0.0, 0.0],
            [0.0, 0.0],
            [1.0, 0.0],
            [1.0, 0.0],
            [0.5, 1.0],
        ])
        .unwrap();
        assert_eq!(geom.vertex_count(), 3);
    }

    #[test]
    fn test_ring_duplicates_only_rejected() {
        let err = Geometry::from_ring(vec![[2.0, 2.0]; 10]).unwrap_err();
        assert!(matches!(err, GeometryError::TooFewVertices { got: 1, .. }));
    }

    #[test]
    fn test_collinear_ring_rejected() {
        let err =
            Geometry::from_ring(vec![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]]).unwrap_err();
        assert_eq!(err, GeometryError::ZeroArea);
    }

    #[test]
    fn test_preclosed_input_not_double_closed() {
        let geom = Geometry::from_ring(vec![
            [0.0, 0.0],
            [1.0, 0.0],
            [0.5, 1.0],
            [0.0, 0.0], // caller already closed the ring
        ])
        .unwrap();
        assert_eq!(geom.vertex_count(), 3);
        assert_eq!(geom.exterior().len(), 4);
    }

    #[test]
    fn test_sketch_tools() {
        let rect = Sketch::Rectangle {
            corner_a: [0.0, 0.0],
            corner_b: [1.0, 1.0],
        };
        let poly = Sketch::Polygon { vertices: vec![] };
        let hand = Sketch::Freehand { path: vec![] };
        assert_eq!(rect.tool(), DrawTool::Rectangle);
        assert_eq!(poly.tool(), DrawTool::Polygon);
        assert_eq!(hand.tool(), DrawTool::Freehand);
    }

    #[test]
    fn test_freehand_needs_three_points() {
        let sketch = Sketch::Freehand {
            path: vec![[0.0, 0.0], [1.0, 1.0]],
        };
        assert!(matches!(
            sketch.into_geometry(),
            Err(GeometryError::TooFewVertices { .. })
        ));

        let sketch = Sketch::Freehand {
            path: vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]],
        };
        assert!(sketch.into_geometry().is_ok());
    }

    #[test]
    fn test_geojson_shape() {
        let geom = Geometry::rectangle([0.0, 0.0], [1.0, 1.0]).unwrap();
        let value = serde_json::to_value(&geom).unwrap();
        assert_eq!(value["type"], "Polygon");
        assert_eq!(value["coordinates"][0][0], serde_json::json!([0.0, 0.0]));
        assert_eq!(
            value["coordinates"][0].as_array().unwrap().len(),
            5 // 4 vertices + closing point
        );
    }

    #[test]
    fn test_geojson_roundtrip() {
        let geom = Geometry::from_ring(vec![[4.0, 52.0], [4.1, 52.0], [4.05, 52.1]]).unwrap();
        let json = serde_json::to_string(&geom).unwrap();
        let back: Geometry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, geom);
        assert!(back.validate().is_ok());
    }

    #[test]
    fn test_validate_flags_bad_deserialized_geometry() {
        let bad: Geometry =
            serde_json::from_str(r#"{"type":"Polygon","coordinates":[[[0.0,0.0],[1.0,1.0]]]}"#)
                .unwrap();
        assert!(bad.validate().is_err());
    }
}
