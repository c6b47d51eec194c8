//! Game bootstrap for EC4X
//!
//! The engine consumes a starmap description (systems with hex coords and
//! typed lanes, optional world profiles, flagged home systems) and a house
//! roster, and produces the initial [`GameState`]: each house seeded with
//! a homeworld colony, basic facilities, a garrison, a starting fleet, and
//! scouted intel on its home system.

use std::path::Path;

use serde::{Deserialize, Serialize};

use ec4x_common::config::GameConfig;
use ec4x_common::coords::Hex;
use ec4x_common::errors::{ConfigError, EngineError};
use ec4x_common::ids::SystemId;
use ec4x_common::types::{FacilityKind, LaneType, PlanetClass, ResourceRating, System};
use ec4x_common::units::{GarrisonSite, GroundUnitClass};

use crate::intel;
use crate::state::{GameState, WorldProfile};
use crate::store::SquadronAttachment;

/// One system in a starmap file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemSpec {
    pub id: u64,
    pub q: i32,
    pub r: i32,
    #[serde(default)]
    pub class: Option<PlanetClass>,
    #[serde(default)]
    pub rating: Option<ResourceRating>,
    #[serde(default)]
    pub home: bool,
}

/// One lane in a starmap file. Lanes are undirected.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaneSpec {
    pub a: u64,
    pub b: u64,
    pub kind: LaneType,
}

/// A declarative starmap. The engine consumes maps; it does not generate
/// them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StarmapSpec {
    pub systems: Vec<SystemSpec>,
    pub lanes: Vec<LaneSpec>,
}

impl StarmapSpec {
    pub fn load(path: &Path) -> Result<StarmapSpec, EngineError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Io(format!("{}: {e}", path.display())))?;
        let spec: StarmapSpec = toml::from_str(&contents).map_err(|e| {
            EngineError::Config(ConfigError::LoadFailure(format!(
                "{}: {e}",
                path.display()
            )))
        })?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let ids: Vec<u64> = self.systems.iter().map(|s| s.id).collect();
        for lane in &self.lanes {
            if !ids.contains(&lane.a) || !ids.contains(&lane.b) || lane.a == lane.b {
                return Err(EngineError::Config(ConfigError::ValidationFailure(format!(
                    "lane {}–{} references unknown or identical systems",
                    lane.a, lane.b
                ))));
            }
        }
        let mut seen = std::collections::BTreeSet::new();
        for id in &ids {
            if !seen.insert(*id) {
                return Err(EngineError::Config(ConfigError::ValidationFailure(format!(
                    "duplicate system id {id}"
                ))));
            }
        }
        Ok(())
    }
}

/// A house roster entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HouseSpec {
    pub name: String,
}

/// Build the initial game state for a roster on a map.
pub fn new_game(
    game_id: &str,
    config: &GameConfig,
    map: &StarmapSpec,
    houses: &[HouseSpec],
) -> Result<GameState, EngineError> {
    map.validate()?;
    let homes: Vec<u64> = map.systems.iter().filter(|s| s.home).map(|s| s.id).collect();
    if homes.len() < houses.len() {
        return Err(EngineError::Config(ConfigError::ValidationFailure(format!(
            "map has {} home systems for {} houses",
            homes.len(),
            houses.len()
        ))));
    }

    let mut state = GameState::new(game_id);

    for spec in &map.systems {
        let mut lanes = std::collections::BTreeMap::new();
        for lane in &map.lanes {
            if lane.a == spec.id {
                lanes.insert(SystemId::new(lane.b), lane.kind);
            } else if lane.b == spec.id {
                lanes.insert(SystemId::new(lane.a), lane.kind);
            }
        }
        state.store.insert_system(System {
            id: SystemId::new(spec.id),
            coords: Hex::new(spec.q, spec.r),
            lanes,
        });
        if let (Some(class), Some(rating)) = (spec.class, spec.rating) {
            state
                .worlds
                .insert(SystemId::new(spec.id), WorldProfile { class, rating });
        }
    }

    for (index, spec) in houses.iter().enumerate() {
        let home = SystemId::new(homes[index]);
        let house = state
            .store
            .create_house(&spec.name, home, config.gameplay.starting_treasury);

        let profile = state.worlds.get(&home).copied().unwrap_or(WorldProfile {
            class: PlanetClass::Terran,
            rating: ResourceRating::Rich,
        });
        let colony = state.store.create_colony(
            home,
            house,
            profile.class,
            profile.rating,
            config.gameplay.starting_population,
            config.gameplay.starting_industrial,
        );
        state.store.create_facility(colony, FacilityKind::Spaceport);
        state.store.create_facility(colony, FacilityKind::Shipyard);
        for _ in 0..2 {
            state
                .store
                .create_ground_unit(house, GroundUnitClass::Army, GarrisonSite::Colony(colony));
        }
        let _ = state.store.update_colony(colony, |c| c.marines = 5);

        let fleet = state.store.create_fleet(house, home);
        state
            .store
            .commission_squadron(
                house,
                SquadronAttachment::Fleet(fleet),
                "Corvette",
                &["Corvette"],
                config,
            )
            .ok_or_else(|| {
                EngineError::Config(ConfigError::ValidationFailure(
                    "config lacks the Corvette starting class".to_string(),
                ))
            })?;
        state
            .store
            .commission_squadron(house, SquadronAttachment::Fleet(fleet), "Scout", &[], config)
            .ok_or_else(|| {
                EngineError::Config(ConfigError::ValidationFailure(
                    "config lacks the Scout starting class".to_string(),
                ))
            })?;
        state
            .store
            .commission_spacelift(fleet, "ETAC", config)
            .ok_or_else(|| {
                EngineError::Config(ConfigError::ValidationFailure(
                    "config lacks the ETAC starting class".to_string(),
                ))
            })?;
    }

    state.store.integrity_check()?;
    intel::refresh_from_positions(&mut state, config);
    log::info!(
        "new game {game_id}: {} systems, {} houses",
        map.systems.len(),
        houses.len()
    );
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_map() -> StarmapSpec {
        StarmapSpec {
            systems: vec![
                SystemSpec { id: 1, q: 0, r: 0, class: None, rating: None, home: true },
                SystemSpec { id: 2, q: 1, r: 0, class: Some(PlanetClass::Ocean), rating: Some(ResourceRating::Rich), home: false },
                SystemSpec { id: 3, q: 2, r: 0, class: None, rating: None, home: true },
            ],
            lanes: vec![
                LaneSpec { a: 1, b: 2, kind: LaneType::Major },
                LaneSpec { a: 2, b: 3, kind: LaneType::Minor },
            ],
        }
    }

    #[test]
    fn new_game_seeds_houses() {
        let config = GameConfig::default();
        let state = new_game(
            "setup-test",
            &config,
            &small_map(),
            &[HouseSpec { name: "Atreides".to_string() }, HouseSpec { name: "Corrino".to_string() }],
        )
        .expect("setup");
        assert_eq!(state.store.houses().len(), 2);
        for (&house_id, house) in state.store.houses() {
            assert_eq!(house.treasury, config.gameplay.starting_treasury);
            assert_eq!(state.store.colonies_of(house_id).len(), 1);
            assert_eq!(state.store.fleets_of(house_id).len(), 1);
            assert!(house.scouted.contains(&house.home_system));
        }
        state.store.integrity_check().expect("integrity");
    }

    #[test]
    fn too_few_home_systems_rejected() {
        let config = GameConfig::default();
        let mut map = small_map();
        map.systems[2].home = false;
        let result = new_game(
            "setup-test",
            &config,
            &map,
            &[HouseSpec { name: "A".to_string() }, HouseSpec { name: "B".to_string() }],
        );
        assert!(result.is_err());
    }

    #[test]
    fn lane_to_unknown_system_rejected() {
        let mut map = small_map();
        map.lanes.push(LaneSpec { a: 1, b: 99, kind: LaneType::Major });
        assert!(map.validate().is_err());
    }
}
