//! Per-house intelligence database for EC4X
//!
//! Each house keeps an authoritative store of what it has learned, indexed
//! by target. Records carry the turn they were made, a quality tier, and a
//! payload whose richness is gated by that tier (resource ratings require
//! Scouted or better). Records age; consumers treat them as stale past the
//! per-kind threshold. Updates are event-driven: fleet presence, scout
//! presence, combat reports, and starbase surveillance sweeps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use ec4x_common::config::GameConfig;
use ec4x_common::coords::Hex;
use ec4x_common::ids::{ColonyId, FleetId, HouseId, SystemId};
use ec4x_common::types::{LaneType, PlanetClass, ResourceRating};

use crate::starmap::Starmap;
use crate::state::GameState;

/// Quality ladder, ascending. Richer payload fields require higher tiers.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum IntelQuality {
    /// Deduced, never observed.
    Inferred,
    /// Relayed from a combat report.
    Reported,
    /// Seen by a fleet in-system.
    Visual,
    /// Surveyed by a scout; the richest tier.
    Scouted,
}

/// What a record is about.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum IntelTarget {
    System(SystemId),
    Colony(ColonyId),
    Fleet(FleetId),
    House(HouseId),
}

/// Observed facts. Optional fields stay `None` below the required quality.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum IntelPayload {
    System {
        coords: Hex,
        lanes: BTreeMap<SystemId, LaneType>,
        has_colony: bool,
    },
    Colony {
        owner: HouseId,
        system: SystemId,
        planet_class: PlanetClass,
        /// Requires Scouted or better.
        resource_rating: Option<ResourceRating>,
        /// Requires Scouted or better.
        population: Option<u32>,
    },
    Fleet {
        owner: HouseId,
        location: SystemId,
        squadrons: u32,
        /// Ship classes; requires Scouted or better.
        classes: Vec<String>,
    },
    House {
        name: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntelRecord {
    pub last_intel_turn: u32,
    pub quality: IntelQuality,
    pub payload: IntelPayload,
}

/// One house's intel store. Records serialize as a pair sequence because
/// the composite target key has no JSON map-key form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct HouseIntel {
    #[serde(with = "records_as_pairs")]
    pub records: BTreeMap<IntelTarget, IntelRecord>,
}

mod records_as_pairs {
    use super::{IntelRecord, IntelTarget};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<IntelTarget, IntelRecord>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<IntelTarget, IntelRecord>, D::Error> {
        let pairs: Vec<(IntelTarget, IntelRecord)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

impl HouseIntel {
    /// Merge an observation. Fresher turns replace older records; within a
    /// turn, higher quality wins.
    pub fn observe(&mut self, target: IntelTarget, record: IntelRecord) {
        match self.records.get(&target) {
            Some(existing)
                if existing.last_intel_turn > record.last_intel_turn
                    || (existing.last_intel_turn == record.last_intel_turn
                        && existing.quality >= record.quality) => {}
            _ => {
                self.records.insert(target, record);
            }
        }
    }

    pub fn record(&self, target: IntelTarget) -> Option<&IntelRecord> {
        self.records.get(&target)
    }

    /// Staleness per spec: a record is stale once its age exceeds the
    /// threshold for its kind.
    pub fn is_stale(&self, target: IntelTarget, current_turn: u32, config: &GameConfig) -> bool {
        let Some(record) = self.records.get(&target) else {
            return true;
        };
        let threshold = match target {
            IntelTarget::System(_) => config.gameplay.intel_staleness.system,
            IntelTarget::Colony(_) => config.gameplay.intel_staleness.colony,
            IntelTarget::Fleet(_) => config.gameplay.intel_staleness.fleet,
            IntelTarget::House(_) => config.gameplay.intel_staleness.house,
        };
        current_turn.saturating_sub(record.last_intel_turn) > threshold
    }
}

fn system_payload(state: &GameState, system: SystemId) -> Option<IntelPayload> {
    let record = state.store.system(system)?;
    Some(IntelPayload::System {
        coords: record.coords,
        lanes: record.lanes.clone(),
        has_colony: state.store.colony_at(system).is_some(),
    })
}

fn colony_payload(state: &GameState, colony: ColonyId, quality: IntelQuality) -> Option<IntelPayload> {
    let record = state.store.colony(colony)?;
    let scouted = quality >= IntelQuality::Scouted;
    Some(IntelPayload::Colony {
        owner: record.owner,
        system: record.system,
        planet_class: record.planet_class,
        resource_rating: scouted.then_some(record.resource_rating),
        population: scouted.then_some(record.population),
    })
}

fn fleet_payload(state: &GameState, fleet: FleetId, quality: IntelQuality) -> Option<IntelPayload> {
    let record = state.store.fleet(fleet)?;
    let classes = if quality >= IntelQuality::Scouted {
        state
            .store
            .ships_in_fleet(fleet)
            .iter()
            .filter_map(|id| state.store.ship(*id))
            .map(|ship| ship.class.clone())
            .collect()
    } else {
        Vec::new()
    };
    Some(IntelPayload::Fleet {
        owner: record.owner,
        location: record.location,
        squadrons: record.squadrons.len() as u32,
        classes,
    })
}

/// Record everything a house currently sees in one system at a quality.
fn observe_system(
    state: &GameState,
    observer: HouseId,
    system: SystemId,
    quality: IntelQuality,
    turn: u32,
    observations: &mut Vec<(HouseId, IntelTarget, IntelRecord)>,
) {
    if let Some(payload) = system_payload(state, system) {
        observations.push((
            observer,
            IntelTarget::System(system),
            IntelRecord {
                last_intel_turn: turn,
                quality,
                payload,
            },
        ));
    }
    if let Some(colony_id) = state.store.colony_at(system) {
        if let Some(colony) = state.store.colony(colony_id) {
            if colony.owner != observer {
                if let Some(payload) = colony_payload(state, colony_id, quality) {
                    observations.push((
                        observer,
                        IntelTarget::Colony(colony_id),
                        IntelRecord {
                            last_intel_turn: turn,
                            quality,
                            payload,
                        },
                    ));
                }
            }
        }
    }
    for fleet_id in state.store.fleets_at(system) {
        let Some(fleet) = state.store.fleet(fleet_id) else {
            continue;
        };
        if fleet.owner == observer {
            continue;
        }
        if let Some(payload) = fleet_payload(state, fleet_id, quality) {
            observations.push((
                observer,
                IntelTarget::Fleet(fleet_id),
                IntelRecord {
                    last_intel_turn: turn,
                    quality,
                    payload,
                },
            ));
        }
    }
}

/// Sweep current positions into intel: fleet presence grants Visual on the
/// occupied system, scouts grant Scouted, and starbases sweep adjacent
/// systems out to the configured radius.
pub fn refresh_from_positions(state: &mut GameState, config: &GameConfig) {
    let turn = state.turn;
    let mut observations: Vec<(HouseId, IntelTarget, IntelRecord)> = Vec::new();
    let mut newly_scouted: Vec<(HouseId, SystemId)> = Vec::new();

    for (&house_id, _) in state.store.houses() {
        for fleet_id in state.store.fleets_of(house_id) {
            let Some(fleet) = state.store.fleet(fleet_id) else {
                continue;
            };
            let profile = state.store.fleet_profile(fleet_id);
            let quality = if profile.scout_squadrons > 0 {
                IntelQuality::Scouted
            } else {
                IntelQuality::Visual
            };
            observe_system(state, house_id, fleet.location, quality, turn, &mut observations);
            newly_scouted.push((house_id, fleet.location));
        }

        for colony_id in state.store.colonies_of(house_id) {
            let Some(colony) = state.store.colony(colony_id) else {
                continue;
            };
            observe_system(
                state,
                house_id,
                colony.system,
                IntelQuality::Scouted,
                turn,
                &mut observations,
            );
            newly_scouted.push((house_id, colony.system));
            if state
                .store
                .count_facilities(colony_id, ec4x_common::types::FacilityKind::Starbase)
                > 0
            {
                let reach = {
                    let map = Starmap::new(&state.store);
                    map.systems_within(colony.system, config.gameplay.starbase_surveillance_radius)
                };
                for system in reach {
                    observe_system(
                        state,
                        house_id,
                        system,
                        IntelQuality::Visual,
                        turn,
                        &mut observations,
                    );
                    newly_scouted.push((house_id, system));
                }
            }
        }
    }

    for (house, target, record) in observations {
        state.intel.entry(house).or_default().observe(target, record);
    }
    for (house, system) in newly_scouted {
        let _ = state.store.update_house(house, |h| {
            h.scouted.insert(system);
        });
    }
}

/// File a Reported-quality record about an opposing house after combat.
pub fn report_house_contact(state: &mut GameState, observer: HouseId, subject: HouseId) {
    let Some(subject_record) = state.store.house(subject) else {
        return;
    };
    let record = IntelRecord {
        last_intel_turn: state.turn,
        quality: IntelQuality::Reported,
        payload: IntelPayload::House {
            name: subject_record.name.clone(),
        },
    };
    state
        .intel
        .entry(observer)
        .or_default()
        .observe(IntelTarget::House(subject), record);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(turn: u32, quality: IntelQuality) -> IntelRecord {
        IntelRecord {
            last_intel_turn: turn,
            quality,
            payload: IntelPayload::House {
                name: "Corrino".to_string(),
            },
        }
    }

    #[test]
    fn fresher_observation_replaces_older() {
        let mut intel = HouseIntel::default();
        let target = IntelTarget::House(HouseId::new(2));
        intel.observe(target, record(3, IntelQuality::Scouted));
        intel.observe(target, record(5, IntelQuality::Visual));
        assert_eq!(intel.record(target).unwrap().last_intel_turn, 5);
        assert_eq!(intel.record(target).unwrap().quality, IntelQuality::Visual);
    }

    #[test]
    fn same_turn_higher_quality_wins() {
        let mut intel = HouseIntel::default();
        let target = IntelTarget::House(HouseId::new(2));
        intel.observe(target, record(3, IntelQuality::Scouted));
        intel.observe(target, record(3, IntelQuality::Visual));
        assert_eq!(intel.record(target).unwrap().quality, IntelQuality::Scouted);
    }

    #[test]
    fn staleness_by_kind() {
        let config = GameConfig::default();
        let mut intel = HouseIntel::default();
        let fleet_target = IntelTarget::Fleet(FleetId::new(1));
        intel.observe(fleet_target, record(1, IntelQuality::Visual));
        // Fleet records go stale quickly.
        assert!(!intel.is_stale(fleet_target, 1 + config.gameplay.intel_staleness.fleet, &config));
        assert!(intel.is_stale(fleet_target, 2 + config.gameplay.intel_staleness.fleet, &config));
        // Missing records are always stale.
        assert!(intel.is_stale(IntelTarget::System(SystemId::new(9)), 1, &config));
    }
}
