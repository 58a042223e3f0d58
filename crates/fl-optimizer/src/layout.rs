//! Movable objects, candidate placements, and the aisle-grid planner that
//! proposes placements when a submission does not list any.

use fl_types::{BoundingBox, DomainConfig, FlError, FlResult, GeneticParams, Region};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Which objects the genetic search may move, and where they may go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationDescriptor {
    pub movable_objects: Vec<String>,
    pub candidate_positions: Vec<BoundingBox>,
}

impl OptimizationDescriptor {
    pub fn new(movable_objects: Vec<String>, candidate_positions: Vec<BoundingBox>) -> Self {
        Self {
            movable_objects,
            candidate_positions,
        }
    }

    /// Check the descriptor against the base regions it will be applied to.
    pub fn validate(&self, base: &[Region]) -> FlResult<()> {
        if self.movable_objects.is_empty() {
            return Err(FlError::Config("no movable objects to optimize".into()));
        }
        if self.candidate_positions.len() < self.movable_objects.len() {
            return Err(FlError::Config(format!(
                "{} candidate positions cannot hold {} movable objects",
                self.candidate_positions.len(),
                self.movable_objects.len()
            )));
        }

        let mut seen = HashSet::new();
        for name in &self.movable_objects {
            if !seen.insert(name.as_str()) {
                return Err(FlError::Config(format!("movable object {name} listed twice")));
            }
            match base.iter().find(|r| &r.name == name) {
                Some(region) if region.is_room() => {
                    return Err(FlError::Config(format!("the room ({name}) cannot be moved")));
                }
                Some(_) => {}
                None => {
                    return Err(FlError::Config(format!(
                        "movable object {name} is not in the configuration"
                    )));
                }
            }
        }

        let room = base
            .iter()
            .find(|r| r.is_room())
            .ok_or_else(|| FlError::Config("region list has no room".into()))?;
        for (index, position) in self.candidate_positions.iter().enumerate() {
            position.validate()?;
            if !room.bounds.contains(position) {
                return Err(FlError::Config(format!(
                    "candidate position {index} lies outside the room"
                )));
            }
        }
        Ok(())
    }

    /// Copy of `base` with every movable object placed at its assigned
    /// candidate position.
    pub fn apply(&self, base: &[Region], assignment: &[usize]) -> FlResult<Vec<Region>> {
        if assignment.len() != self.movable_objects.len() {
            return Err(FlError::Internal(format!(
                "assignment has {} genes for {} movable objects",
                assignment.len(),
                self.movable_objects.len()
            )));
        }
        let mut regions = base.to_vec();
        for (name, &gene) in self.movable_objects.iter().zip(assignment) {
            let position = self.candidate_positions.get(gene).ok_or_else(|| {
                FlError::Internal(format!("candidate position {gene} does not exist"))
            })?;
            let region = regions
                .iter_mut()
                .find(|r| &r.name == name)
                .ok_or_else(|| FlError::Config(format!("movable object {name} is missing")))?;
            region.bounds = *position;
        }
        Ok(regions)
    }

    /// Number of distinct injective assignments, `n! / (n - k)!`. `None` when
    /// it does not fit in a `u128`.
    pub fn assignment_space(&self) -> Option<u128> {
        let n = self.candidate_positions.len() as u128;
        let k = self.movable_objects.len() as u128;
        if k > n {
            return Some(0);
        }
        ((n - k + 1)..=n).try_fold(1u128, |acc, f| acc.checked_mul(f))
    }
}

/// Two-row hot/cold aisle grid used to propose rack placements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AisleLayout {
    /// Clearance kept between the racks and the room walls.
    pub margin: f64,
    /// Gap between the two rows.
    pub hot_aisle_width: f64,
    /// Gap between neighbouring racks in a row.
    pub cold_aisle_width: f64,
    pub rack_height: f64,
}

impl Default for AisleLayout {
    fn default() -> Self {
        Self {
            margin: 1.0,
            hot_aisle_width: 1.5,
            cold_aisle_width: 1.5,
            rack_height: 1.975,
        }
    }
}

impl AisleLayout {
    /// Build the descriptor for a genetic run: explicit params win, missing
    /// pieces are derived from the config.
    pub fn descriptor_for(
        &self,
        config: &DomainConfig,
        params: &GeneticParams,
    ) -> FlResult<OptimizationDescriptor> {
        let movable = match &params.movable_objects {
            Some(names) => names.clone(),
            None => config.racks.iter().map(|r| r.name.clone()).collect(),
        };
        if movable.is_empty() {
            return Err(FlError::Config(
                "no racks found for layout optimization".into(),
            ));
        }
        let positions = match &params.candidate_positions {
            Some(positions) => positions.clone(),
            None => self.candidate_positions(config, &movable)?,
        };
        if positions.len() < movable.len() {
            return Err(FlError::Config(format!(
                "could only find {} valid positions for {} racks; check room size and obstacle placement",
                positions.len(),
                movable.len()
            )));
        }
        Ok(OptimizationDescriptor::new(movable, positions))
    }

    /// Candidate rack boxes laid out in two rows separated by a hot aisle,
    /// skipping any slot whose footprint touches a non-movable object.
    pub fn candidate_positions(
        &self,
        config: &DomainConfig,
        movable: &[String],
    ) -> FlResult<Vec<BoundingBox>> {
        let dims = config
            .room
            .as_ref()
            .and_then(|room| room.dims)
            .ok_or_else(|| FlError::Config("room dimensions are missing".into()))?;
        let [room_w, room_d, room_h] = dims;

        let racks: Vec<_> = movable
            .iter()
            .map(|name| {
                config.rack(name).ok_or_else(|| {
                    FlError::Config(format!("movable rack {name} is not in the configuration"))
                })
            })
            .collect::<FlResult<_>>()?;
        if racks.is_empty() {
            return Err(FlError::Config(
                "no racks found for layout optimization".into(),
            ));
        }

        let count = racks.len() as f64;
        let width = racks.iter().map(|r| r.dims[0]).sum::<f64>() / count;
        let depth = racks.iter().map(|r| r.dims[1]).sum::<f64>() / count;
        let height = self.rack_height.min(room_h);

        let obstacles = obstacle_footprints(config, movable)?;

        let first_row = self.margin;
        let second_row = first_row + depth + self.hot_aisle_width;

        let mut positions = Vec::new();
        for y_start in [first_row, second_row] {
            if y_start + depth > room_d {
                continue;
            }
            let mut x = self.margin;
            while x + width < room_w - self.margin {
                let candidate =
                    BoundingBox::new(x, x + width, y_start, y_start + depth, 0.0, height)?;
                if obstacles.iter().all(|o| !candidate.footprint_overlaps(o)) {
                    positions.push(candidate);
                }
                x += width + self.cold_aisle_width;
            }
        }

        debug!(
            candidates = positions.len(),
            racks = racks.len(),
            "generated candidate rack positions"
        );
        Ok(positions)
    }
}

fn obstacle_footprints(config: &DomainConfig, movable: &[String]) -> FlResult<Vec<BoundingBox>> {
    let fixed_racks = config
        .racks
        .iter()
        .filter(|r| !movable.contains(&r.name))
        .map(|r| (r.pos, r.dims));
    let cracs = config.cracs.iter().map(|c| (c.pos, c.dims));
    let tiles = config.tiles.iter().map(|t| (t.pos, t.dims));

    fixed_racks
        .chain(cracs)
        .chain(tiles)
        .map(|(pos, dims)| BoundingBox::from_pos_dims(pos, dims))
        .collect()
}
