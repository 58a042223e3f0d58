//! Domain config → oracle region list.

use std::collections::HashSet;

use crate::config::DomainConfig;
use crate::errors::{FlError, FlResult};
use crate::region::{BoundingBox, Region, RegionKind};

/// Adapts a [`DomainConfig`] into the flat [`Region`] list consumed by the
/// simulation oracle.
///
/// The output always starts with the room, followed by racks, coolers and
/// tiles in submission order. Every region is checked to lie inside the room
/// and names must be unique across the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigTransformer;

impl ConfigTransformer {
    pub fn transform(config: &DomainConfig) -> FlResult<Vec<Region>> {
        let room_spec = config
            .room
            .as_ref()
            .ok_or_else(|| FlError::Config("config has no room definition".into()))?;
        let dims = room_spec
            .dims
            .ok_or_else(|| FlError::Config("room dimensions are missing".into()))?;
        if dims.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return Err(FlError::Config(format!(
                "room dimensions must be positive, got {dims:?}"
            )));
        }

        let room_bounds = BoundingBox::from_pos_dims([0.0, 0.0, 0.0], dims)?;
        let mut regions = vec![Region::room(room_spec.name.clone(), room_bounds)?];

        for rack in &config.racks {
            regions.push(Region::rack(
                rack.name.clone(),
                BoundingBox::from_pos_dims(rack.pos, rack.dims)?,
                rack.heat_load,
                rack.flow_rate,
                rack.inlet_face,
                rack.outlet_face,
            )?);
        }

        let supply_temp = config.physics.supply_temp();
        for crac in &config.cracs {
            regions.push(Region::cooler(
                crac.name.clone(),
                BoundingBox::from_pos_dims(crac.pos, crac.dims)?,
                crac.flow_rate,
                crac.set_temp.unwrap_or(supply_temp),
                crac.inlet_face,
                crac.outlet_face,
            )?);
        }

        if !config.tiles.is_empty() {
            let tile_bounds = config
                .tiles
                .iter()
                .map(|t| BoundingBox::from_pos_dims(t.pos, t.dims))
                .collect::<FlResult<Vec<_>>>()?;
            let tile_flow = tile_flow_rate(config, &tile_bounds)?;
            for (tile, bounds) in config.tiles.iter().zip(tile_bounds) {
                regions.push(Region::tile(tile.name.clone(), bounds, tile_flow)?);
            }
        }

        validate_regions(&regions)?;
        Ok(regions)
    }
}

/// Total cooler flow spread evenly over the total tile floor area.
fn tile_flow_rate(config: &DomainConfig, tile_bounds: &[BoundingBox]) -> FlResult<f64> {
    let total_area: f64 = tile_bounds.iter().map(BoundingBox::floor_area).sum();
    if total_area <= 0.0 {
        return Err(FlError::Config(
            "floor tiles are present but their total area is zero".into(),
        ));
    }
    let total_flow: f64 = config.cracs.iter().map(|c| c.flow_rate).sum();
    Ok(total_flow / total_area)
}

/// Checks the run-level invariants of a region list: exactly one room, unique
/// names, every other region inside the room.
pub fn validate_regions(regions: &[Region]) -> FlResult<()> {
    let mut rooms = regions.iter().filter(|r| r.is_room());
    let room = rooms
        .next()
        .ok_or_else(|| FlError::Config("region list has no room".into()))?;
    if rooms.next().is_some() {
        return Err(FlError::Config("region list has more than one room".into()));
    }

    let mut seen = HashSet::new();
    for region in regions {
        if !seen.insert(region.name.as_str()) {
            return Err(FlError::Config(format!(
                "duplicate region name: {}",
                region.name
            )));
        }
        if !matches!(region.kind, RegionKind::Room) && !room.bounds.contains(&region.bounds) {
            return Err(FlError::Config(format!(
                "{} {} lies outside the room",
                region.type_name(),
                region.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CracSpec, RackSpec, RoomSpec, TileSpec};

    fn base_config() -> DomainConfig {
        DomainConfig::new([10.0, 8.0, 3.0])
            .with_rack(RackSpec::new("rack_1", [1.0, 2.0, 0.0], [2.0, 2.0, 2.0], 5000.0))
            .with_crac(CracSpec::new("crac_1", [8.0, 6.0, 0.0], [1.0, 1.0, 2.0], 3.0))
    }

    #[test]
    fn rack_position_and_dims_become_bounds() {
        let regions = ConfigTransformer::transform(&base_config()).unwrap();
        let rack = regions.iter().find(|r| r.name == "rack_1").unwrap();
        assert_eq!((rack.bounds.x_min, rack.bounds.x_max), (1.0, 3.0));
        assert_eq!((rack.bounds.y_min, rack.bounds.y_max), (2.0, 4.0));
        assert_eq!((rack.bounds.z_min, rack.bounds.z_max), (0.0, 2.0));
    }

    #[test]
    fn room_comes_first() {
        let regions = ConfigTransformer::transform(&base_config()).unwrap();
        assert!(regions[0].is_room());
        assert_eq!(regions[0].bounds.x_max, 10.0);
        assert_eq!(regions.iter().filter(|r| r.is_room()).count(), 1);
    }

    #[test]
    fn missing_room_dims_is_config_error() {
        let mut config = base_config();
        config.room = Some(RoomSpec {
            name: "room".into(),
            dims: None,
        });
        let err = ConfigTransformer::transform(&config).unwrap_err();
        assert!(err.is_config());

        config.room = None;
        assert!(ConfigTransformer::transform(&config).unwrap_err().is_config());
    }

    #[test]
    fn region_outside_room_rejected() {
        let config = base_config().with_rack(RackSpec::new(
            "rack_far",
            [9.5, 1.0, 0.0],
            [1.0, 1.0, 2.0],
            1000.0,
        ));
        let err = ConfigTransformer::transform(&config).unwrap_err();
        assert!(err.to_string().contains("rack_far"));
    }

    #[test]
    fn duplicate_names_rejected() {
        let config = base_config().with_rack(RackSpec::new(
            "rack_1",
            [4.0, 1.0, 0.0],
            [1.0, 1.0, 2.0],
            1000.0,
        ));
        let err = ConfigTransformer::transform(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn cooler_set_temp_falls_back_to_physics() {
        let mut config = base_config().with_supply_temp(289.5);
        let regions = ConfigTransformer::transform(&config).unwrap();
        let cooler = regions.iter().find(|r| r.name == "crac_1").unwrap();
        assert!(matches!(cooler.kind, RegionKind::Cooler { set_temp, .. } if set_temp == 289.5));

        config.cracs[0].set_temp = Some(291.0);
        let regions = ConfigTransformer::transform(&config).unwrap();
        let cooler = regions.iter().find(|r| r.name == "crac_1").unwrap();
        assert!(matches!(cooler.kind, RegionKind::Cooler { set_temp, .. } if set_temp == 291.0));
    }

    #[test]
    fn tile_flow_is_cooler_flow_over_tile_area() {
        let config = base_config()
            .with_tile(TileSpec::new("tile_1", [4.0, 4.0, 0.0], [1.0, 1.0, 0.01]))
            .with_tile(TileSpec::new("tile_2", [5.0, 4.0, 0.0], [1.0, 2.0, 0.01]));
        let regions = ConfigTransformer::transform(&config).unwrap();
        for name in ["tile_1", "tile_2"] {
            let tile = regions.iter().find(|r| r.name == name).unwrap();
            match tile.kind {
                RegionKind::Tile { flow_rate } => assert!((flow_rate - 1.0).abs() < 1e-12),
                ref other => panic!("unexpected kind {other:?}"),
            }
        }
    }

    #[test]
    fn zero_area_tiles_rejected() {
        let config =
            base_config().with_tile(TileSpec::new("tile_flat", [4.0, 4.0, 0.0], [0.0, 1.0, 0.01]));
        assert!(ConfigTransformer::transform(&config).unwrap_err().is_config());
    }
}
