//! Polygon geometry, WKT conversion and spherical distance helpers.
//!
//! All coordinates are `(longitude, latitude)` pairs in degrees.

use serde::{Deserialize, Serialize};

use crate::{EmissionsError, EmissionsResult};

/// Earth's radius in meters (WGS84 mean radius).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Check that a longitude/latitude pair is within the valid range.
pub fn validate_coordinates(lon: f64, lat: f64) -> EmissionsResult<()> {
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(EmissionsError::InvalidGeometry(format!(
            "Longitude {} is out of range [-180, 180]",
            lon
        )));
    }

    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(EmissionsError::InvalidGeometry(format!(
            "Latitude {} is out of range [-90, 90]",
            lat
        )));
    }

    Ok(())
}

/// Great-circle distance between two points in meters (Haversine formula).
pub fn haversine_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_M * c
}

/// A polygon with one closed exterior ring and optional holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    exterior: Vec<(f64, f64)>,
    #[serde(default)]
    interiors: Vec<Vec<(f64, f64)>>,
}

impl Polygon {
    /// Create a polygon from an already closed exterior ring.
    pub fn new(exterior: Vec<(f64, f64)>) -> Self {
        Self {
            exterior,
            interiors: Vec::new(),
        }
    }

    /// Build a polygon from a flat list of `lon, lat` values.
    ///
    /// The ring is closed automatically when the last vertex differs from the
    /// first one. At least three distinct vertices are required.
    pub fn from_flat_coordinates(values: &[f64]) -> EmissionsResult<Self> {
        if values.len() % 2 != 0 {
            return Err(EmissionsError::InvalidGeometry(
                "Number of polygon elements has to be even".to_string(),
            ));
        }

        let points: Vec<(f64, f64)> = values.chunks_exact(2).map(|c| (c[0], c[1])).collect();
        let ring = close_ring(points)?;
        Ok(Self::new(ring))
    }

    /// The exterior ring, closed (first vertex == last vertex).
    pub fn exterior(&self) -> &[(f64, f64)] {
        &self.exterior
    }

    /// Interior rings (holes).
    pub fn interiors(&self) -> &[Vec<(f64, f64)>] {
        &self.interiors
    }

    /// Check if a point is inside the polygon and outside all of its holes.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        ring_contains(&self.exterior, lon, lat)
            && !self.interiors.iter().any(|hole| ring_contains(hole, lon, lat))
    }

    /// Bounding box of the exterior ring as (west, south, east, north).
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        self.exterior.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(w, s, e, n), &(lon, lat)| (w.min(lon), s.min(lat), e.max(lon), n.max(lat)),
        )
    }

    fn wkt_body(&self) -> String {
        let rings: Vec<String> = std::iter::once(&self.exterior)
            .chain(self.interiors.iter())
            .map(|ring| format!("({})", ring_to_wkt(ring)))
            .collect();
        format!("({})", rings.join(","))
    }

    /// Render as a WKT `POLYGON`.
    pub fn to_wkt(&self) -> String {
        format!("POLYGON{}", self.wkt_body())
    }
}

/// A polygonal area: one or more polygons (a MULTIPOLYGON when more than one).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    polygons: Vec<Polygon>,
}

impl Geometry {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        Self { polygons }
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    /// Check if any of the polygons contains the point.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        self.polygons.iter().any(|p| p.contains_point(lon, lat))
    }

    /// Parse a WKT `POLYGON` or `MULTIPOLYGON`.
    pub fn from_wkt(wkt: &str) -> EmissionsResult<Self> {
        let wkt = wkt.trim();

        if let Some(body) = strip_tag(wkt, "MULTIPOLYGON") {
            let inner = strip_parens(body)?;
            let polygons = split_top_level(inner)
                .into_iter()
                .map(parse_polygon_body)
                .collect::<EmissionsResult<Vec<_>>>()?;
            if polygons.is_empty() {
                return Err(EmissionsError::InvalidGeometry(
                    "MULTIPOLYGON must contain at least one polygon".to_string(),
                ));
            }
            return Ok(Self::new(polygons));
        }

        if let Some(body) = strip_tag(wkt, "POLYGON") {
            return Ok(Self::new(vec![parse_polygon_body(body)?]));
        }

        Err(EmissionsError::InvalidGeometry(format!(
            "Expected POLYGON or MULTIPOLYGON, got '{}'",
            wkt.chars().take(32).collect::<String>()
        )))
    }

    /// Render as WKT (`POLYGON` for a single polygon, `MULTIPOLYGON` otherwise).
    pub fn to_wkt(&self) -> String {
        match self.polygons.as_slice() {
            [single] => single.to_wkt(),
            polygons => {
                let bodies: Vec<String> = polygons.iter().map(|p| p.wkt_body()).collect();
                format!("MULTIPOLYGON({})", bodies.join(","))
            }
        }
    }
}

impl From<Polygon> for Geometry {
    fn from(polygon: Polygon) -> Self {
        Geometry::new(vec![polygon])
    }
}

fn close_ring(mut points: Vec<(f64, f64)>) -> EmissionsResult<Vec<(f64, f64)>> {
    for &(lon, lat) in &points {
        validate_coordinates(lon, lat)?;
    }

    let mut distinct: Vec<(f64, f64)> = Vec::with_capacity(points.len());
    for p in &points {
        if !distinct.contains(p) {
            distinct.push(*p);
        }
    }
    if distinct.len() < 3 {
        return Err(EmissionsError::InvalidGeometry(format!(
            "At least 3 distinct points are needed to define a polygon, got {}",
            distinct.len()
        )));
    }

    if points.first() != points.last() {
        points.push(points[0]);
    }

    Ok(points)
}

// Ray casting; the ring is expected to be closed.
fn ring_contains(ring: &[(f64, f64)], lon: f64, lat: f64) -> bool {
    let n = ring.len();
    if n < 4 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;

    for i in 0..n {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];

        if ((yi > lat) != (yj > lat)) && (lon < (xj - xi) * (lat - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}

fn ring_to_wkt(ring: &[(f64, f64)]) -> String {
    ring.iter()
        .map(|(lon, lat)| format!("{} {}", lon, lat))
        .collect::<Vec<_>>()
        .join(",")
}

fn strip_tag<'a>(wkt: &'a str, tag: &str) -> Option<&'a str> {
    wkt.get(..tag.len())
        .filter(|head| head.eq_ignore_ascii_case(tag))
        .map(|_| &wkt[tag.len()..])
}

/// Remove one level of surrounding parentheses.
fn strip_parens(s: &str) -> EmissionsResult<&str> {
    let s = s.trim();
    s.strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| EmissionsError::InvalidGeometry(format!("Unbalanced parentheses in '{}'", s)))
}

/// Split on commas that are not nested inside parentheses.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    let last = s[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

fn parse_polygon_body(body: &str) -> EmissionsResult<Polygon> {
    let inner = strip_parens(body)?;
    let mut rings = split_top_level(inner)
        .into_iter()
        .map(|ring| parse_ring(strip_parens(ring)?))
        .collect::<EmissionsResult<Vec<_>>>()?
        .into_iter();

    let exterior = rings.next().ok_or_else(|| {
        EmissionsError::InvalidGeometry("Polygon must contain at least one ring".to_string())
    })?;

    Ok(Polygon {
        exterior,
        interiors: rings.collect(),
    })
}

fn parse_ring(coords: &str) -> EmissionsResult<Vec<(f64, f64)>> {
    let points = coords
        .split(',')
        .map(|pair| {
            let parts: Vec<&str> = pair.split_whitespace().collect();
            if parts.len() != 2 {
                return Err(EmissionsError::InvalidGeometry(format!(
                    "Expected 'lon lat', got '{}'",
                    pair.trim()
                )));
            }
            let lon: f64 = parts[0].parse().map_err(|_| {
                EmissionsError::InvalidGeometry(format!("Invalid coordinate '{}'", parts[0]))
            })?;
            let lat: f64 = parts[1].parse().map_err(|_| {
                EmissionsError::InvalidGeometry(format!("Invalid coordinate '{}'", parts[1]))
            })?;
            Ok((lon, lat))
        })
        .collect::<EmissionsResult<Vec<_>>>()?;

    close_ring(points)
}
