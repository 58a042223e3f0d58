//! Regions consumed by the simulation oracle.
//!
//! A run is described by a flat list of [`Region`]s: exactly one room plus the
//! racks, coolers and floor tiles placed inside it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{FlError, FlResult};

/// One of the six faces of an axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Face {
    XMin,
    XMax,
    YMin,
    YMax,
    ZMin,
    ZMax,
}

impl fmt::Display for Face {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::XMin => "x_min",
            Self::XMax => "x_max",
            Self::YMin => "y_min",
            Self::YMax => "y_max",
            Self::ZMin => "z_min",
            Self::ZMax => "z_max",
        };
        f.write_str(name)
    }
}

/// Axis-aligned bounding box in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    pub z_min: f64,
    pub z_max: f64,
}

impl BoundingBox {
    pub fn new(
        x_min: f64,
        x_max: f64,
        y_min: f64,
        y_max: f64,
        z_min: f64,
        z_max: f64,
    ) -> FlResult<Self> {
        let bounds = Self {
            x_min,
            x_max,
            y_min,
            y_max,
            z_min,
            z_max,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Box spanning `pos` to `pos + dims` on each axis.
    pub fn from_pos_dims(pos: [f64; 3], dims: [f64; 3]) -> FlResult<Self> {
        if dims.iter().any(|d| *d < 0.0) {
            return Err(FlError::Config(format!(
                "dimensions must be non-negative, got {dims:?}"
            )));
        }
        Self::new(
            pos[0],
            pos[0] + dims[0],
            pos[1],
            pos[1] + dims[1],
            pos[2],
            pos[2] + dims[2],
        )
    }

    pub fn validate(&self) -> FlResult<()> {
        let values = [
            self.x_min, self.x_max, self.y_min, self.y_max, self.z_min, self.z_max,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(FlError::Config(format!(
                "bounding box has non-finite coordinates: {self:?}"
            )));
        }
        if self.x_min > self.x_max || self.y_min > self.y_max || self.z_min > self.z_max {
            return Err(FlError::Config(format!(
                "bounding box has min greater than max: {self:?}"
            )));
        }
        Ok(())
    }

    /// Whether `other` lies entirely inside `self` (boundaries included).
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x_min >= self.x_min
            && other.x_max <= self.x_max
            && other.y_min >= self.y_min
            && other.y_max <= self.y_max
            && other.z_min >= self.z_min
            && other.z_max <= self.z_max
    }

    /// Whether the footprints (x/y projections) of two boxes touch or overlap.
    pub fn footprint_overlaps(&self, other: &BoundingBox) -> bool {
        !(self.x_max < other.x_min
            || self.x_min > other.x_max
            || self.y_max < other.y_min
            || self.y_min > other.y_max)
    }

    pub fn floor_area(&self) -> f64 {
        (self.x_max - self.x_min) * (self.y_max - self.y_min)
    }

    pub fn min_corner(&self) -> [f64; 3] {
        [self.x_min, self.y_min, self.z_min]
    }

    /// Euclidean distance between the minimum corners of two boxes.
    pub fn corner_distance(&self, other: &BoundingBox) -> f64 {
        let a = self.min_corner();
        let b = other.min_corner();
        a.iter()
            .zip(b.iter())
            .map(|(p, q)| (p - q) * (p - q))
            .sum::<f64>()
            .sqrt()
    }
}

/// Type-specific payload of a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegionKind {
    Room,
    Rack {
        /// Dissipated power in watts.
        heat_load: f64,
        flow_rate: f64,
        inlet_face: Face,
        outlet_face: Face,
    },
    Cooler {
        flow_rate: f64,
        /// Supply temperature in kelvin.
        set_temp: f64,
        inlet_face: Face,
        outlet_face: Face,
    },
    Tile {
        /// Derived from the total cooler flow spread over the total tile area.
        flow_rate: f64,
    },
}

/// A named box in the simulated room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub bounds: BoundingBox,
    #[serde(flatten)]
    pub kind: RegionKind,
}

impl Region {
    pub fn room(name: impl Into<String>, bounds: BoundingBox) -> FlResult<Self> {
        Self::build(name.into(), bounds, RegionKind::Room)
    }

    pub fn rack(
        name: impl Into<String>,
        bounds: BoundingBox,
        heat_load: f64,
        flow_rate: f64,
        inlet_face: Face,
        outlet_face: Face,
    ) -> FlResult<Self> {
        let name = name.into();
        require_non_negative(&name, "heat_load", heat_load)?;
        require_non_negative(&name, "flow_rate", flow_rate)?;
        require_distinct_faces(&name, inlet_face, outlet_face)?;
        Self::build(
            name,
            bounds,
            RegionKind::Rack {
                heat_load,
                flow_rate,
                inlet_face,
                outlet_face,
            },
        )
    }

    pub fn cooler(
        name: impl Into<String>,
        bounds: BoundingBox,
        flow_rate: f64,
        set_temp: f64,
        inlet_face: Face,
        outlet_face: Face,
    ) -> FlResult<Self> {
        let name = name.into();
        require_non_negative(&name, "flow_rate", flow_rate)?;
        if !set_temp.is_finite() || set_temp <= 0.0 {
            return Err(FlError::Config(format!(
                "cooler {name}: set_temp must be a positive absolute temperature, got {set_temp}"
            )));
        }
        require_distinct_faces(&name, inlet_face, outlet_face)?;
        Self::build(
            name,
            bounds,
            RegionKind::Cooler {
                flow_rate,
                set_temp,
                inlet_face,
                outlet_face,
            },
        )
    }

    pub fn tile(name: impl Into<String>, bounds: BoundingBox, flow_rate: f64) -> FlResult<Self> {
        let name = name.into();
        require_non_negative(&name, "flow_rate", flow_rate)?;
        Self::build(name, bounds, RegionKind::Tile { flow_rate })
    }

    fn build(name: String, bounds: BoundingBox, kind: RegionKind) -> FlResult<Self> {
        if name.trim().is_empty() {
            return Err(FlError::Config("region name must not be empty".into()));
        }
        bounds.validate()?;
        Ok(Self { name, bounds, kind })
    }

    pub fn is_room(&self) -> bool {
        matches!(self.kind, RegionKind::Room)
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            RegionKind::Room => "room",
            RegionKind::Rack { .. } => "rack",
            RegionKind::Cooler { .. } => "cooler",
            RegionKind::Tile { .. } => "tile",
        }
    }
}

fn require_non_negative(name: &str, field: &str, value: f64) -> FlResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(FlError::Config(format!(
            "region {name}: {field} must be a non-negative number, got {value}"
        )));
    }
    Ok(())
}

fn require_distinct_faces(name: &str, inlet: Face, outlet: Face) -> FlResult<()> {
    if inlet == outlet {
        return Err(FlError::Config(format!(
            "region {name}: inlet and outlet are both on face {inlet}"
        )));
    }
    Ok(())
}

/// Set the supply temperature of every cooler. Used as the bisection control.
pub fn with_cooler_set_temp(regions: &[Region], set_temp: f64) -> Vec<Region> {
    regions
        .iter()
        .cloned()
        .map(|mut region| {
            if let RegionKind::Cooler { set_temp: t, .. } = &mut region.kind {
                *t = set_temp;
            }
            region
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> BoundingBox {
        BoundingBox::new(0.0, 1.0, 0.0, 1.0, 0.0, 1.0).unwrap()
    }

    #[test]
    fn bounding_box_from_pos_dims() {
        let b = BoundingBox::from_pos_dims([1.0, 2.0, 0.0], [2.0, 2.0, 2.0]).unwrap();
        assert_eq!((b.x_min, b.x_max), (1.0, 3.0));
        assert_eq!((b.y_min, b.y_max), (2.0, 4.0));
        assert_eq!((b.z_min, b.z_max), (0.0, 2.0));
    }

    #[test]
    fn inverted_box_rejected() {
        assert!(BoundingBox::new(2.0, 1.0, 0.0, 1.0, 0.0, 1.0).is_err());
        assert!(BoundingBox::new(0.0, f64::NAN, 0.0, 1.0, 0.0, 1.0).is_err());
        assert!(BoundingBox::from_pos_dims([0.0; 3], [1.0, -1.0, 1.0]).is_err());
    }

    #[test]
    fn containment_and_overlap() {
        let room = BoundingBox::new(0.0, 10.0, 0.0, 8.0, 0.0, 3.0).unwrap();
        let inside = BoundingBox::new(1.0, 2.0, 1.0, 2.0, 0.0, 2.0).unwrap();
        let outside = BoundingBox::new(9.0, 11.0, 1.0, 2.0, 0.0, 2.0).unwrap();
        assert!(room.contains(&inside));
        assert!(!room.contains(&outside));
        let overlapping = BoundingBox::new(1.5, 3.0, 1.5, 3.0, 0.0, 1.0).unwrap();
        assert!(inside.footprint_overlaps(&overlapping));
        assert!(!inside.footprint_overlaps(&outside));
    }

    #[test]
    fn corner_distance_uses_min_corners() {
        let a = BoundingBox::new(0.0, 1.0, 0.0, 1.0, 0.0, 1.0).unwrap();
        let b = BoundingBox::new(3.0, 4.0, 4.0, 5.0, 0.0, 1.0).unwrap();
        assert!((a.corner_distance(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn rack_validation() {
        assert!(Region::rack("r1", unit_box(), 5000.0, 0.5, Face::YMin, Face::YMax).is_ok());
        assert!(Region::rack("r1", unit_box(), -1.0, 0.5, Face::YMin, Face::YMax).is_err());
        assert!(Region::rack("r1", unit_box(), 5000.0, 0.5, Face::YMin, Face::YMin).is_err());
        assert!(Region::rack("  ", unit_box(), 5000.0, 0.5, Face::YMin, Face::YMax).is_err());
    }

    #[test]
    fn cooler_rejects_non_physical_set_temp() {
        assert!(Region::cooler("c1", unit_box(), 2.0, 0.0, Face::ZMax, Face::YMin).is_err());
        assert!(Region::cooler("c1", unit_box(), 2.0, 290.0, Face::ZMax, Face::YMin).is_ok());
    }

    #[test]
    fn region_serializes_with_type_tag() {
        let rack = Region::rack("r1", unit_box(), 5000.0, 0.5, Face::YMin, Face::YMax).unwrap();
        let json = serde_json::to_value(&rack).unwrap();
        assert_eq!(json["type"], "rack");
        assert_eq!(json["inlet_face"], "y_min");
        assert_eq!(json["bounds"]["x_max"], 1.0);

        let back: Region = serde_json::from_value(json).unwrap();
        assert_eq!(back, rack);
    }

    #[test]
    fn set_temp_update_only_touches_coolers() {
        let regions = vec![
            Region::room("room", BoundingBox::new(0.0, 5.0, 0.0, 5.0, 0.0, 3.0).unwrap()).unwrap(),
            Region::cooler("c1", unit_box(), 2.0, 290.0, Face::ZMax, Face::YMin).unwrap(),
            Region::rack("r1", unit_box(), 5000.0, 0.5, Face::YMin, Face::YMax).unwrap(),
        ];
        let updated = with_cooler_set_temp(&regions, 295.5);
        match &updated[1].kind {
            RegionKind::Cooler { set_temp, .. } => assert_eq!(*set_temp, 295.5),
            other => panic!("unexpected kind {other:?}"),
        }
        assert_eq!(updated[0], regions[0]);
        assert_eq!(updated[2], regions[2]);
    }
}
