//! Typed feature model and grid loading.
//!
//! GeoJSON features are converted into a small typed [`Geometry`] variant
//! at load time so the rest of the pipeline never touches untyped JSON
//! dictionaries. The grid itself is a flat list of [`GridCell`]s in the
//! order they appear in the FeatureCollection; that order is significant
//! downstream (it determines aggregated identity assignment).

use std::path::Path;

use geo::{Coord, Rect};

use crate::GeoError;

/// The geometry variants the pipeline understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    /// A single point, (lng, lat).
    Point(Coord),
    /// A collection of points; the first is the representative one.
    MultiPoint(Vec<Coord>),
    /// A polygon's outer ring (closed, (lng, lat) vertices).
    Polygon(Vec<Coord>),
}

impl Geometry {
    /// Returns the representative (lng, lat) pair for point-like
    /// geometries: the point itself, or the first point of a multipoint.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::UnsupportedGeometry`] for polygons and empty
    /// multipoints.
    pub fn lng_lat(&self) -> Result<(f64, f64), GeoError> {
        match self {
            Self::Point(c) => Ok((c.x, c.y)),
            Self::MultiPoint(points) => points.first().map(|c| (c.x, c.y)).ok_or_else(|| {
                GeoError::UnsupportedGeometry {
                    geometry_type: "MultiPoint (empty)".to_string(),
                }
            }),
            Self::Polygon(_) => Err(GeoError::UnsupportedGeometry {
                geometry_type: "Polygon".to_string(),
            }),
        }
    }
}

impl TryFrom<&geojson::Geometry> for Geometry {
    type Error = GeoError;

    fn try_from(geometry: &geojson::Geometry) -> Result<Self, Self::Error> {
        match &geometry.value {
            geojson::Value::Point(position) => Ok(Self::Point(position_coord(position)?)),
            geojson::Value::MultiPoint(positions) => Ok(Self::MultiPoint(
                positions
                    .iter()
                    .map(|p| position_coord(p))
                    .collect::<Result<_, _>>()?,
            )),
            geojson::Value::Polygon(rings) => {
                let outer = rings.first().ok_or_else(|| GeoError::InvalidGrid {
                    message: "Polygon with no rings".to_string(),
                })?;
                Ok(Self::Polygon(
                    outer
                        .iter()
                        .map(|p| position_coord(p))
                        .collect::<Result<_, _>>()?,
                ))
            }
            other => Err(GeoError::UnsupportedGeometry {
                geometry_type: other.type_name().to_string(),
            }),
        }
    }
}

/// Converts a GeoJSON position (`[lng, lat, ...]`) into a [`Coord`].
fn position_coord(position: &[f64]) -> Result<Coord, GeoError> {
    match position {
        [x, y, ..] => Ok(Coord { x: *x, y: *y }),
        _ => Err(GeoError::InvalidGrid {
            message: format!("Position with {} coordinates", position.len()),
        }),
    }
}

/// One polygonal grid cell with its unique identifier.
///
/// Immutable once loaded; the ring is the polygon's outer ring as read
/// from the grid definition, closing vertex included.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    /// Unique cell identifier within the grid.
    pub cell_id: i64,
    /// Closed ring of (lng, lat) vertices.
    pub ring: Vec<Coord>,
}

impl GridCell {
    /// The axis-aligned bounding rectangle over all ring vertices.
    #[must_use]
    pub fn bounding_rect(&self) -> Rect {
        let mut vertices = self.ring.iter();
        let Some(first) = vertices.next() else {
            return Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 0.0, y: 0.0 });
        };
        let mut min = *first;
        let mut max = *first;
        for v in vertices {
            min.x = min.x.min(v.x);
            min.y = min.y.min(v.y);
            max.x = max.x.max(v.x);
            max.y = max.y.max(v.y);
        }
        Rect::new(min, max)
    }
}

/// Loads a grid definition from a GeoJSON FeatureCollection file.
///
/// Each feature must carry a unique integer `cellId` property and a
/// Polygon geometry; the first ring is kept. Cells are returned in
/// file order.
///
/// # Errors
///
/// Returns [`GeoError::MissingInput`] if the path does not exist,
/// [`GeoError::InvalidGrid`] for features without a usable `cellId` or
/// polygon geometry, and parse errors otherwise.
pub fn load_grid(path: &Path) -> Result<Vec<GridCell>, GeoError> {
    if !path.exists() {
        return Err(GeoError::MissingInput {
            path: path.display().to_string(),
        });
    }

    let content = std::fs::read_to_string(path)?;
    let geojson: geojson::GeoJson = content.parse()?;

    let geojson::GeoJson::FeatureCollection(collection) = geojson else {
        return Err(GeoError::InvalidGrid {
            message: "Grid file is not a FeatureCollection".to_string(),
        });
    };

    let mut cells = Vec::with_capacity(collection.features.len());
    for feature in &collection.features {
        let cell_id = feature
            .properties
            .as_ref()
            .and_then(|props| props.get("cellId"))
            .and_then(serde_json::Value::as_i64)
            .ok_or_else(|| GeoError::InvalidGrid {
                message: "Feature without integer cellId property".to_string(),
            })?;

        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| GeoError::InvalidGrid {
                message: format!("Cell {cell_id} has no geometry"),
            })?;

        let Geometry::Polygon(ring) = Geometry::try_from(geometry)? else {
            return Err(GeoError::InvalidGrid {
                message: format!("Cell {cell_id} is not a polygon"),
            });
        };

        if ring.is_empty() {
            return Err(GeoError::InvalidGrid {
                message: format!("Cell {cell_id} has an empty ring"),
            });
        }

        cells.push(GridCell { cell_id, ring });
    }

    log::info!("Loaded {} grid cells from {}", cells.len(), path.display());
    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_geometry(json: &str) -> geojson::Geometry {
        json.parse::<geojson::GeoJson>()
            .map(|g| match g {
                geojson::GeoJson::Geometry(geom) => geom,
                _ => panic!("expected a geometry"),
            })
            .unwrap()
    }

    #[test]
    fn extracts_point_coordinates() {
        let geom = parse_geometry(r#"{"type":"Point","coordinates":[9.19,45.46]}"#);
        let typed = Geometry::try_from(&geom).unwrap();
        let (lng, lat) = typed.lng_lat().unwrap();
        assert!((lng - 9.19).abs() < f64::EPSILON);
        assert!((lat - 45.46).abs() < f64::EPSILON);
    }

    #[test]
    fn extracts_first_point_of_multipoint() {
        let geom =
            parse_geometry(r#"{"type":"MultiPoint","coordinates":[[9.1,45.4],[9.2,45.5]]}"#);
        let typed = Geometry::try_from(&geom).unwrap();
        let (lng, lat) = typed.lng_lat().unwrap();
        assert!((lng - 9.1).abs() < f64::EPSILON);
        assert!((lat - 45.4).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_polygon_for_point_extraction() {
        let geom = parse_geometry(
            r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#,
        );
        let typed = Geometry::try_from(&geom).unwrap();
        assert!(matches!(
            typed.lng_lat(),
            Err(GeoError::UnsupportedGeometry { .. })
        ));
    }

    #[test]
    fn rejects_linestring_geometry() {
        let geom = parse_geometry(r#"{"type":"LineString","coordinates":[[0,0],[1,1]]}"#);
        assert!(matches!(
            Geometry::try_from(&geom),
            Err(GeoError::UnsupportedGeometry { .. })
        ));
    }

    #[test]
    fn loads_grid_from_feature_collection() {
        let dir = std::env::temp_dir().join("telegrid_geo_grid_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("grid.geojson");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
                {"type":"Feature","properties":{"cellId":1},
                 "geometry":{"type":"Polygon","coordinates":[[[9.0,45.0],[9.1,45.0],[9.1,45.1],[9.0,45.1],[9.0,45.0]]]}},
                {"type":"Feature","properties":{"cellId":2},
                 "geometry":{"type":"Polygon","coordinates":[[[9.1,45.0],[9.2,45.0],[9.2,45.1],[9.1,45.1],[9.1,45.0]]]}}
            ]}"#,
        )
        .unwrap();

        let cells = load_grid(&path).unwrap();
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].cell_id, 1);
        assert_eq!(cells[1].cell_id, 2);
        assert_eq!(cells[0].ring.len(), 5);
    }

    #[test]
    fn missing_grid_file_is_reported() {
        let path = Path::new("/nonexistent/grid.geojson");
        assert!(matches!(
            load_grid(path),
            Err(GeoError::MissingInput { .. })
        ));
    }
}
