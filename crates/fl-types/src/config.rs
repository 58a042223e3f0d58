//! Domain-level room description as submitted by callers.
//!
//! Racks, CRACs and tiles are given as a corner position plus dimensions; the
//! [`ConfigTransformer`](crate::transform::ConfigTransformer) turns them into
//! the flat region list the oracle consumes.

use serde::{Deserialize, Serialize};

use crate::region::Face;

/// CRAC supply temperature used when neither the CRAC nor the physics block
/// give one.
pub const DEFAULT_CRAC_SUPPLY_TEMP_K: f64 = 285.15;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DomainConfig {
    #[serde(default)]
    pub room: Option<RoomSpec>,
    #[serde(default)]
    pub racks: Vec<RackSpec>,
    #[serde(default)]
    pub cracs: Vec<CracSpec>,
    #[serde(default)]
    pub tiles: Vec<TileSpec>,
    #[serde(default)]
    pub physics: PhysicsSpec,
}

impl DomainConfig {
    pub fn new(room_dims: [f64; 3]) -> Self {
        Self {
            room: Some(RoomSpec {
                name: default_room_name(),
                dims: Some(room_dims),
            }),
            ..Self::default()
        }
    }

    pub fn with_rack(mut self, rack: RackSpec) -> Self {
        self.racks.push(rack);
        self
    }

    pub fn with_crac(mut self, crac: CracSpec) -> Self {
        self.cracs.push(crac);
        self
    }

    pub fn with_tile(mut self, tile: TileSpec) -> Self {
        self.tiles.push(tile);
        self
    }

    pub fn with_supply_temp(mut self, kelvin: f64) -> Self {
        self.physics.crac_supply_temp_k = Some(kelvin);
        self
    }

    pub fn rack(&self, name: &str) -> Option<&RackSpec> {
        self.racks.iter().find(|r| r.name == name)
    }
}

/// The room is an axis-aligned box anchored at the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSpec {
    #[serde(default = "default_room_name")]
    pub name: String,
    /// Width, depth, height in metres.
    #[serde(default)]
    pub dims: Option<[f64; 3]>,
}

fn default_room_name() -> String {
    "room".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RackSpec {
    pub name: String,
    pub pos: [f64; 3],
    pub dims: [f64; 3],
    /// Dissipated power in watts.
    #[serde(alias = "power_watts")]
    pub heat_load: f64,
    #[serde(default = "default_rack_flow_rate")]
    pub flow_rate: f64,
    #[serde(default = "default_rack_inlet")]
    pub inlet_face: Face,
    #[serde(default = "default_rack_outlet")]
    pub outlet_face: Face,
}

impl RackSpec {
    pub fn new(name: impl Into<String>, pos: [f64; 3], dims: [f64; 3], heat_load: f64) -> Self {
        Self {
            name: name.into(),
            pos,
            dims,
            heat_load,
            flow_rate: default_rack_flow_rate(),
            inlet_face: default_rack_inlet(),
            outlet_face: default_rack_outlet(),
        }
    }
}

fn default_rack_flow_rate() -> f64 {
    0.5
}

// Racks draw cold air through the front and exhaust through the back.
fn default_rack_inlet() -> Face {
    Face::YMin
}

fn default_rack_outlet() -> Face {
    Face::YMax
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CracSpec {
    pub name: String,
    pub pos: [f64; 3],
    pub dims: [f64; 3],
    #[serde(alias = "supply_velocity")]
    pub flow_rate: f64,
    /// Per-unit supply temperature; falls back to the physics block.
    #[serde(default)]
    pub set_temp: Option<f64>,
    #[serde(default = "default_crac_inlet")]
    pub inlet_face: Face,
    #[serde(default = "default_crac_outlet")]
    pub outlet_face: Face,
}

impl CracSpec {
    pub fn new(name: impl Into<String>, pos: [f64; 3], dims: [f64; 3], flow_rate: f64) -> Self {
        Self {
            name: name.into(),
            pos,
            dims,
            flow_rate,
            set_temp: None,
            inlet_face: default_crac_inlet(),
            outlet_face: default_crac_outlet(),
        }
    }
}

// CRACs take return air at the top and supply through the front.
fn default_crac_inlet() -> Face {
    Face::ZMax
}

fn default_crac_outlet() -> Face {
    Face::YMin
}

/// Perforated floor tile fed by the CRACs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileSpec {
    pub name: String,
    pub pos: [f64; 3],
    pub dims: [f64; 3],
}

impl TileSpec {
    pub fn new(name: impl Into<String>, pos: [f64; 3], dims: [f64; 3]) -> Self {
        Self {
            name: name.into(),
            pos,
            dims,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhysicsSpec {
    #[serde(default, alias = "crac_supply_temp_K")]
    pub crac_supply_temp_k: Option<f64>,
    #[serde(default = "default_initial_temp", alias = "initial_temp_K")]
    pub initial_temp_k: f64,
}

impl Default for PhysicsSpec {
    fn default() -> Self {
        Self {
            crac_supply_temp_k: None,
            initial_temp_k: default_initial_temp(),
        }
    }
}

fn default_initial_temp() -> f64 {
    295.15
}

impl PhysicsSpec {
    pub fn supply_temp(&self) -> f64 {
        self.crac_supply_temp_k.unwrap_or(DEFAULT_CRAC_SUPPLY_TEMP_K)
    }
}
