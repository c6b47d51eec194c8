//! Fog-of-war filtering and per-house deltas for EC4X
//!
//! `build_player_snapshot` derives the view one house is entitled to: its
//! own entities verbatim, map knowledge for systems it has ever scouted,
//! foreign fleets and colonies only where it currently has eyes, and the
//! turn's events filtered by the visibility rules. Snapshots diff into
//! minimal deltas; `apply_delta` reverses the diff, and the serialized
//! payload is order-stable because every collection is a BTreeMap.

use std::collections::{BTreeMap, BTreeSet};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use ec4x_common::config::GameConfig;
use ec4x_common::coords::Hex;
use ec4x_common::errors::EngineError;
use ec4x_common::events::{Event, EventLog};
use ec4x_common::ids::{
    ColonyId, FacilityId, FleetId, GameId, GroundUnitId, HouseId, ShipId, SquadronId, SystemId,
};
use ec4x_common::types::{Colony, Facility, House, LaneType, PlanetClass};
use ec4x_common::units::{Fleet, GroundUnit, Ship, Squadron};

use crate::intel::HouseIntel;
use crate::starmap::Starmap;
use crate::state::GameState;

/// Map knowledge: coordinates and lanes of an ever-scouted system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnownSystem {
    pub coords: Hex,
    pub lanes: BTreeMap<SystemId, LaneType>,
}

/// A rival colony as currently seen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignColony {
    pub owner: HouseId,
    pub system: SystemId,
    pub planet_class: PlanetClass,
}

/// A rival fleet as currently seen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForeignFleet {
    pub owner: HouseId,
    pub location: SystemId,
    pub squadrons: u32,
}

/// The complete fog-filtered view for one house at one turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerSnapshot {
    pub house_id: HouseId,
    pub turn: u32,
    pub house: House,
    pub known_systems: BTreeMap<SystemId, KnownSystem>,
    pub colonies: BTreeMap<ColonyId, Colony>,
    pub fleets: BTreeMap<FleetId, Fleet>,
    pub squadrons: BTreeMap<SquadronId, Squadron>,
    pub ships: BTreeMap<ShipId, Ship>,
    pub ground_units: BTreeMap<GroundUnitId, GroundUnit>,
    pub facilities: BTreeMap<FacilityId, Facility>,
    pub visible_colonies: BTreeMap<ColonyId, ForeignColony>,
    pub visible_fleets: BTreeMap<FleetId, ForeignFleet>,
    pub intel: HouseIntel,
    pub events: Vec<Event>,
    pub winner: Option<HouseId>,
}

/// Systems where the house currently has eyes: fleet presence, colonies,
/// and starbase surveillance out to the configured radius.
fn visible_systems(state: &GameState, config: &GameConfig, house: HouseId) -> BTreeSet<SystemId> {
    let mut visible = BTreeSet::new();
    for fleet_id in state.store.fleets_of(house) {
        if let Some(fleet) = state.store.fleet(fleet_id) {
            visible.insert(fleet.location);
        }
    }
    let map = Starmap::new(&state.store);
    for colony_id in state.store.colonies_of(house) {
        let Some(colony) = state.store.colony(colony_id) else {
            continue;
        };
        visible.insert(colony.system);
        if state
            .store
            .count_facilities(colony_id, ec4x_common::types::FacilityKind::Starbase)
            > 0
        {
            visible.extend(
                map.systems_within(colony.system, config.gameplay.starbase_surveillance_radius),
            );
        }
    }
    visible
}

/// Event visibility per the fog rules.
fn event_visible(
    state: &GameState,
    event: &Event,
    house: HouseId,
    visible: &BTreeSet<SystemId>,
) -> bool {
    match event {
        // Private economy, construction, research, and order traffic.
        Event::OrderRejected { house: h, .. }
        | Event::IncomeCollected { house: h, .. }
        | Event::ConstructionStarted { house: h, .. }
        | Event::ConstructionCompleted { house: h, .. }
        | Event::ResearchAdvanced { house: h, .. }
        | Event::MaintenancePaid { house: h, .. }
        | Event::MaintenanceShortfall { house: h, .. }
        | Event::FleetDisbanded { house: h, .. }
        | Event::AssetStripped { house: h, .. }
        | Event::TransferStarted { house: h, .. }
        | Event::TransferDelivered { house: h, .. }
        | Event::TransferLost { house: h, .. }
        | Event::TerraformCompleted { house: h, .. }
        | Event::FleetMoved { house: h, .. }
        | Event::ColonyFounded { house: h, .. }
        | Event::PrestigeAwarded { house: h, .. } => *h == house,

        Event::PopulationGrowth { colony, .. } => state
            .store
            .colony(*colony)
            .is_some_and(|c| c.owner == house),

        // Combat: visible with presence in the system.
        Event::CombatResolved {
            system,
            participants,
            ..
        } => participants.contains(&house) || visible.contains(system),
        Event::ColonyCaptured {
            system, from, to, ..
        } => *from == house || *to == house || visible.contains(system),

        // Public diplomacy.
        Event::PactFormed { .. }
        | Event::PactBroken { .. }
        | Event::WarDeclared { .. }
        | Event::RelationsNormalized { .. }
        | Event::StandingChanged { .. }
        | Event::HouseEliminated { .. }
        | Event::VictoryAchieved { .. } => true,
        Event::PactProposed { from, to } => *from == house || *to == house,

        // Espionage: the attacker sees the action; the defender sees only
        // detections.
        Event::EspionageLaunched { attacker, .. } => *attacker == house,
        Event::EspionageDetected {
            attacker, defender, ..
        } => *attacker == house || *defender == house,
        Event::EspionageEffectExpired { house: h, .. } => *h == house,
    }
}

/// Build the filtered view for one house.
pub fn build_player_snapshot(
    state: &GameState,
    config: &GameConfig,
    house: HouseId,
    events: &EventLog,
) -> Option<PlayerSnapshot> {
    let house_record = state.store.house(house)?.clone();
    let visible = visible_systems(state, config, house);

    let mut snapshot = PlayerSnapshot {
        house_id: house,
        turn: state.turn,
        house: house_record.clone(),
        known_systems: BTreeMap::new(),
        colonies: BTreeMap::new(),
        fleets: BTreeMap::new(),
        squadrons: BTreeMap::new(),
        ships: BTreeMap::new(),
        ground_units: BTreeMap::new(),
        facilities: BTreeMap::new(),
        visible_colonies: BTreeMap::new(),
        visible_fleets: BTreeMap::new(),
        intel: state.intel.get(&house).cloned().unwrap_or_default(),
        events: Vec::new(),
        winner: state.winner,
    };

    // Map knowledge: every system ever scouted.
    for &system_id in &house_record.scouted {
        if let Some(system) = state.store.system(system_id) {
            snapshot.known_systems.insert(
                system_id,
                KnownSystem {
                    coords: system.coords,
                    lanes: system.lanes.clone(),
                },
            );
        }
    }

    // Own entities verbatim.
    for colony_id in state.store.colonies_of(house) {
        let Some(colony) = state.store.colony(colony_id) else {
            continue;
        };
        snapshot.colonies.insert(colony_id, colony.clone());
        for facility_id in &colony.facilities {
            if let Some(facility) = state.store.facility(*facility_id) {
                snapshot.facilities.insert(*facility_id, facility.clone());
            }
        }
        for unit_id in &colony.ground_units {
            if let Some(unit) = state.store.ground_unit(*unit_id) {
                snapshot.ground_units.insert(*unit_id, unit.clone());
            }
        }
        for squadron_id in &colony.fighter_squadrons {
            if let Some(squadron) = state.store.squadron(*squadron_id) {
                snapshot.squadrons.insert(*squadron_id, squadron.clone());
                for ship_id in squadron.ships() {
                    if let Some(ship) = state.store.ship(ship_id) {
                        snapshot.ships.insert(ship_id, ship.clone());
                    }
                }
            }
        }
    }
    for fleet_id in state.store.fleets_of(house) {
        let Some(fleet) = state.store.fleet(fleet_id) else {
            continue;
        };
        snapshot.fleets.insert(fleet_id, fleet.clone());
        for &squadron_id in &fleet.squadrons {
            if let Some(squadron) = state.store.squadron(squadron_id) {
                snapshot.squadrons.insert(squadron_id, squadron.clone());
            }
        }
        for ship_id in state.store.ships_in_fleet(fleet_id) {
            if let Some(ship) = state.store.ship(ship_id) {
                snapshot.ships.insert(ship_id, ship.clone());
            }
        }
    }

    // Rivals, only where currently visible.
    for &system_id in &visible {
        if let Some(colony_id) = state.store.colony_at(system_id) {
            if let Some(colony) = state.store.colony(colony_id) {
                if colony.owner != house {
                    snapshot.visible_colonies.insert(
                        colony_id,
                        ForeignColony {
                            owner: colony.owner,
                            system: system_id,
                            planet_class: colony.planet_class,
                        },
                    );
                }
            }
        }
        for fleet_id in state.store.fleets_at(system_id) {
            let Some(fleet) = state.store.fleet(fleet_id) else {
                continue;
            };
            if fleet.owner != house {
                snapshot.visible_fleets.insert(
                    fleet_id,
                    ForeignFleet {
                        owner: fleet.owner,
                        location: system_id,
                        squadrons: fleet.squadrons.len() as u32,
                    },
                );
            }
        }
    }

    snapshot.events = events
        .iter()
        .filter(|event| event_visible(state, event, house, &visible))
        .cloned()
        .collect();

    Some(snapshot)
}

// ---------------------------------------------------------------------------
// Delta
// ---------------------------------------------------------------------------

/// Minimal change set for one keyed section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MapDelta<K: Ord, V> {
    pub upserts: Vec<(K, V)>,
    pub removals: Vec<K>,
}

impl<K: Ord, V> Default for MapDelta<K, V> {
    fn default() -> Self {
        Self {
            upserts: Vec::new(),
            removals: Vec::new(),
        }
    }
}

impl<K: Ord, V> MapDelta<K, V> {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.removals.is_empty()
    }
}

fn diff_map<K: Ord + Clone, V: Clone + PartialEq>(
    prev: &BTreeMap<K, V>,
    current: &BTreeMap<K, V>,
) -> MapDelta<K, V> {
    let mut delta = MapDelta::default();
    for (key, value) in current {
        if prev.get(key) != Some(value) {
            delta.upserts.push((key.clone(), value.clone()));
        }
    }
    for key in prev.keys() {
        if !current.contains_key(key) {
            delta.removals.push(key.clone());
        }
    }
    delta
}

fn apply_map<K: Ord + Clone, V: Clone>(target: &mut BTreeMap<K, V>, delta: &MapDelta<K, V>) {
    for (key, value) in &delta.upserts {
        target.insert(key.clone(), value.clone());
    }
    for key in &delta.removals {
        target.remove(key);
    }
}

/// The per-house turn delta. Scalars are replaced wholesale; keyed
/// sections carry minimal upsert/removal lists; events are the turn's
/// filtered log in emission order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerDelta {
    pub house_id: HouseId,
    pub turn: u32,
    pub house: House,
    pub known_systems: MapDelta<SystemId, KnownSystem>,
    pub colonies: MapDelta<ColonyId, Colony>,
    pub fleets: MapDelta<FleetId, Fleet>,
    pub squadrons: MapDelta<SquadronId, Squadron>,
    pub ships: MapDelta<ShipId, Ship>,
    pub ground_units: MapDelta<GroundUnitId, GroundUnit>,
    pub facilities: MapDelta<FacilityId, Facility>,
    pub visible_colonies: MapDelta<ColonyId, ForeignColony>,
    pub visible_fleets: MapDelta<FleetId, ForeignFleet>,
    pub intel: MapDelta<crate::intel::IntelTarget, crate::intel::IntelRecord>,
    pub events: Vec<Event>,
    pub winner: Option<HouseId>,
}

/// Diff two snapshots of the same house into a minimal delta.
pub fn diff_player_state(prev: &PlayerSnapshot, current: &PlayerSnapshot) -> PlayerDelta {
    PlayerDelta {
        house_id: current.house_id,
        turn: current.turn,
        house: current.house.clone(),
        known_systems: diff_map(&prev.known_systems, &current.known_systems),
        colonies: diff_map(&prev.colonies, &current.colonies),
        fleets: diff_map(&prev.fleets, &current.fleets),
        squadrons: diff_map(&prev.squadrons, &current.squadrons),
        ships: diff_map(&prev.ships, &current.ships),
        ground_units: diff_map(&prev.ground_units, &current.ground_units),
        facilities: diff_map(&prev.facilities, &current.facilities),
        visible_colonies: diff_map(&prev.visible_colonies, &current.visible_colonies),
        visible_fleets: diff_map(&prev.visible_fleets, &current.visible_fleets),
        intel: diff_map(&prev.intel.records, &current.intel.records),
        events: current.events.clone(),
        winner: current.winner,
    }
}

/// Apply a delta to the previous snapshot; `apply(diff(a, b), a) == b`.
pub fn apply_delta(prev: &PlayerSnapshot, delta: &PlayerDelta) -> PlayerSnapshot {
    let mut next = prev.clone();
    next.house_id = delta.house_id;
    next.turn = delta.turn;
    next.house = delta.house.clone();
    apply_map(&mut next.known_systems, &delta.known_systems);
    apply_map(&mut next.colonies, &delta.colonies);
    apply_map(&mut next.fleets, &delta.fleets);
    apply_map(&mut next.squadrons, &delta.squadrons);
    apply_map(&mut next.ships, &delta.ships);
    apply_map(&mut next.ground_units, &delta.ground_units);
    apply_map(&mut next.facilities, &delta.facilities);
    apply_map(&mut next.visible_colonies, &delta.visible_colonies);
    apply_map(&mut next.visible_fleets, &delta.visible_fleets);
    apply_map(&mut next.intel.records, &delta.intel);
    next.events = delta.events.clone();
    next.winner = delta.winner;
    next
}

/// Serialize a delta to the declarative, order-stable wire text.
pub fn format_delta_payload(game_id: &GameId, delta: &PlayerDelta) -> Result<Vec<u8>, EngineError> {
    #[derive(Serialize)]
    struct Framed<'a> {
        game_id: &'a GameId,
        delta: &'a PlayerDelta,
    }
    serde_json::to_vec(&Framed { game_id, delta })
        .map_err(|e| EngineError::Serialization(e.to_string()))
}

/// Parse a payload produced by `format_delta_payload`.
pub fn parse_delta_payload(bytes: &[u8]) -> Result<(GameId, PlayerDelta), EngineError> {
    #[derive(Deserialize)]
    struct Framed {
        game_id: GameId,
        delta: PlayerDelta,
    }
    let framed: Framed =
        serde_json::from_slice(bytes).map_err(|e| EngineError::Serialization(e.to_string()))?;
    Ok((framed.game_id, framed.delta))
}

/// Helper bound so snapshot types stay wire-compatible.
fn _assert_wire<T: Serialize + DeserializeOwned>() {}
#[allow(dead_code)]
fn _wire_checks() {
    _assert_wire::<PlayerSnapshot>();
    _assert_wire::<PlayerDelta>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SquadronAttachment;
    use ec4x_common::types::{DiplomaticRelation, DiplomaticState, ResourceRating, System};

    fn fog_state() -> (GameState, GameConfig, HouseId, HouseId) {
        let config = GameConfig::default();
        let mut state = GameState::new("fog-test");
        // Chain: 1 - 2 - 3; house A at 1, house B at 3.
        let ids = [SystemId::new(1), SystemId::new(2), SystemId::new(3)];
        for (index, id) in ids.into_iter().enumerate() {
            let mut lanes = BTreeMap::new();
            if index > 0 {
                lanes.insert(ids[index - 1], LaneType::Major);
            }
            if index + 1 < ids.len() {
                lanes.insert(ids[index + 1], LaneType::Major);
            }
            state.store.insert_system(System {
                id,
                coords: Hex::new(index as i32, 0),
                lanes,
            });
        }
        let a = state.store.create_house("Atreides", ids[0], 500);
        let b = state.store.create_house("Harkonnen", ids[2], 500);
        state.store.create_colony(ids[0], a, PlanetClass::Terran, ResourceRating::Normal, 100, 20);
        state.store.create_colony(ids[2], b, PlanetClass::Terran, ResourceRating::Normal, 100, 20);
        (state, config, a, b)
    }

    #[test]
    fn own_entities_included_foreign_hidden() {
        let (mut state, config, a, b) = fog_state();
        let fleet_b = state.store.create_fleet(b, SystemId::new(3));
        state
            .store
            .commission_squadron(b, SquadronAttachment::Fleet(fleet_b), "Cruiser", &[], &config)
            .expect("squadron");
        let events = EventLog::new(1);
        let snapshot = build_player_snapshot(&state, &config, a, &events).expect("snapshot");
        assert_eq!(snapshot.colonies.len(), 1);
        // B's fleet at system 3 is out of sight from system 1.
        assert!(snapshot.visible_fleets.is_empty());
        assert!(snapshot.ships.is_empty());
    }

    #[test]
    fn enemy_fleet_visible_when_co_located() {
        let (mut state, config, a, b) = fog_state();
        let fleet_b = state.store.create_fleet(b, SystemId::new(1));
        state
            .store
            .commission_squadron(b, SquadronAttachment::Fleet(fleet_b), "Cruiser", &[], &config)
            .expect("squadron");
        let events = EventLog::new(1);
        let snapshot = build_player_snapshot(&state, &config, a, &events).expect("snapshot");
        assert!(snapshot.visible_fleets.contains_key(&fleet_b));
        // Seen, but its ships are not enumerated.
        assert!(snapshot.ships.is_empty());
    }

    #[test]
    fn espionage_event_visibility_is_asymmetric() {
        let (state, config, a, b) = fog_state();
        let mut events = EventLog::new(2);
        events.push(Event::EspionageLaunched {
            attacker: a,
            target: b,
            action: ec4x_common::events::EspionageAction::SabotageLow,
        });
        let view_a = build_player_snapshot(&state, &config, a, &events).expect("snapshot");
        let view_b = build_player_snapshot(&state, &config, b, &events).expect("snapshot");
        assert_eq!(view_a.events.len(), 1);
        assert!(view_b.events.is_empty());
    }

    #[test]
    fn fog_isolation_scenario() {
        // House A scouted S2 earlier; at this turn an enemy fleet sits in
        // S2 but A has no presence there and no adjacent starbase from S1
        // (radius 1 covers S2 only with a starbase, which A lacks).
        let (mut state, config, a, b) = fog_state();
        let _ = state.store.update_house(a, |h| {
            h.scouted.insert(SystemId::new(2));
        });
        let _ = state.store.update_house(a, |h| {
            h.relations.insert(b, DiplomaticRelation {
                state: DiplomaticState::Enemy,
                since_turn: 0,
            });
        });
        let fleet_b = state.store.create_fleet(b, SystemId::new(2));
        state
            .store
            .commission_squadron(b, SquadronAttachment::Fleet(fleet_b), "Cruiser", &[], &config)
            .expect("squadron");
        let events = EventLog::new(5);
        let snapshot = build_player_snapshot(&state, &config, a, &events).expect("snapshot");
        // Map knowledge persists, but the fleet there stays dark.
        assert!(snapshot.known_systems.contains_key(&SystemId::new(2)));
        assert!(!snapshot.visible_fleets.contains_key(&fleet_b));
    }

    #[test]
    fn delta_round_trip_law() {
        let (mut state, config, a, _b) = fog_state();
        let events = EventLog::new(1);
        state.turn = 1;
        let before = build_player_snapshot(&state, &config, a, &events).expect("snapshot");

        // Mutate: treasury moves, a fleet appears, a system gets scouted.
        let _ = state.store.update_house(a, |h| {
            h.treasury += 76;
            h.scouted.insert(SystemId::new(2));
        });
        let fleet = state.store.create_fleet(a, SystemId::new(1));
        state
            .store
            .commission_squadron(a, SquadronAttachment::Fleet(fleet), "Scout", &[], &config)
            .expect("squadron");
        state.turn = 2;
        let mut events2 = EventLog::new(2);
        events2.push(Event::IncomeCollected {
            house: a,
            gco: 152,
            ncv: 76,
        });
        let after = build_player_snapshot(&state, &config, a, &events2).expect("snapshot");

        let delta = diff_player_state(&before, &after);
        assert_eq!(apply_delta(&before, &delta), after);
        // The delta is genuinely minimal: the untouched rival colony
        // sections carry nothing.
        assert!(delta.visible_colonies.is_empty());

        // And the wire format round-trips.
        let payload = format_delta_payload(&state.game_id, &delta).expect("format");
        let (game_id, parsed) = parse_delta_payload(&payload).expect("parse");
        assert_eq!(game_id, state.game_id);
        assert_eq!(parsed, delta);
    }
}
