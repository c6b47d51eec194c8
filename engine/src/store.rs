//! Entity store for EC4X
//!
//! Dense, owner-indexed storage for every entity kind, keyed by stable,
//! monotonically assigned IDs. All mutation goes through `update_*`, which
//! takes a whole-value snapshot, applies the closure, and reinserts;
//! intermediate mutations on a retrieved value never persist on their own.
//! Deletion cascades to parent references so that no dangling ID survives
//! an operation.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use ec4x_common::config::GameConfig;
use ec4x_common::errors::IntegrityError;
use ec4x_common::ids::{
    ColonyId, FacilityId, FleetId, GroundUnitId, HouseId, ShipId, SquadronId, SystemId,
};
use ec4x_common::types::{
    Colony, Facility, FacilityKind, House, PlanetClass, ResourceRating, System, TaxPolicy,
};
use ec4x_common::units::{
    Cargo, CombatState, Fleet, GarrisonSite, GroundUnit, GroundUnitClass, MissionState, Ship,
    ShipRole, Squadron,
};

/// Where a newly commissioned squadron is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquadronAttachment {
    Fleet(FleetId),
    Colony(ColonyId),
}

/// Summary of a fleet's contents used by pathfinding and order checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FleetProfile {
    pub has_crippled: bool,
    pub has_spacelift: bool,
    pub squadron_count: usize,
    pub scout_squadrons: usize,
}

fn dangling(kind: &str, id: impl std::fmt::Display) -> IntegrityError {
    IntegrityError::DanglingReference {
        kind: kind.to_string(),
        id: id.to_string(),
    }
}

/// The single authoritative entity store for one game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EntityStore {
    houses: BTreeMap<HouseId, House>,
    systems: BTreeMap<SystemId, System>,
    colonies: BTreeMap<ColonyId, Colony>,
    fleets: BTreeMap<FleetId, Fleet>,
    squadrons: BTreeMap<SquadronId, Squadron>,
    ships: BTreeMap<ShipId, Ship>,
    ground_units: BTreeMap<GroundUnitId, GroundUnit>,
    facilities: BTreeMap<FacilityId, Facility>,

    next_house: u64,
    next_colony: u64,
    next_fleet: u64,
    next_squadron: u64,
    next_ship: u64,
    next_ground_unit: u64,
    next_facility: u64,

    // Secondary indices, maintained by every insert/update/delete.
    colonies_by_owner: BTreeMap<HouseId, BTreeSet<ColonyId>>,
    fleets_by_owner: BTreeMap<HouseId, BTreeSet<FleetId>>,
    fleets_by_location: BTreeMap<SystemId, BTreeSet<FleetId>>,
    colonies_by_system: BTreeMap<SystemId, BTreeSet<ColonyId>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========== Systems ==========

    /// Systems carry map-assigned IDs and are inserted wholesale at setup.
    pub fn insert_system(&mut self, system: System) {
        self.systems.insert(system.id, system);
    }

    pub fn system(&self, id: SystemId) -> Option<&System> {
        self.systems.get(&id)
    }

    pub fn systems(&self) -> &BTreeMap<SystemId, System> {
        &self.systems
    }

    // ========== Houses ==========

    pub fn create_house(&mut self, name: &str, home_system: SystemId, treasury: i64) -> HouseId {
        let id = HouseId::new(self.next_house);
        self.next_house += 1;
        let mut scouted = BTreeSet::new();
        scouted.insert(home_system);
        self.houses.insert(
            id,
            House {
                id,
                name: name.to_string(),
                treasury,
                prestige: 0,
                tech: Default::default(),
                research: BTreeMap::new(),
                relations: BTreeMap::new(),
                espionage: Default::default(),
                tax_policy: TaxPolicy::default(),
                violations: Vec::new(),
                standing: Default::default(),
                morale: Default::default(),
                eliminated: false,
                fallback_routes: vec![home_system],
                home_system,
                scouted,
                shortfall_turns: 0,
                deficit_turns: 0,
            },
        );
        id
    }

    pub fn house(&self, id: HouseId) -> Option<&House> {
        self.houses.get(&id)
    }

    pub fn houses(&self) -> &BTreeMap<HouseId, House> {
        &self.houses
    }

    /// Stable canonical order for per-house processing.
    pub fn house_ids(&self) -> Vec<HouseId> {
        self.houses.keys().copied().collect()
    }

    pub fn update_house<F>(&mut self, id: HouseId, f: F) -> Result<(), IntegrityError>
    where
        F: FnOnce(&mut House),
    {
        let mut house = self.houses.get(&id).cloned().ok_or_else(|| dangling("house", id))?;
        f(&mut house);
        house.id = id;
        self.houses.insert(id, house);
        Ok(())
    }

    // ========== Colonies ==========

    pub fn create_colony(
        &mut self,
        system: SystemId,
        owner: HouseId,
        planet_class: PlanetClass,
        resource_rating: ResourceRating,
        population: u32,
        industrial_units: u32,
    ) -> ColonyId {
        let id = ColonyId::new(self.next_colony);
        self.next_colony += 1;
        self.colonies.insert(
            id,
            Colony {
                id,
                system,
                owner,
                population,
                industrial_units,
                gross_output: 0,
                tax_rate: 50,
                infrastructure: 10,
                infrastructure_damage: 0.0,
                resource_rating,
                planet_class,
                facilities: Vec::new(),
                ground_units: Vec::new(),
                fighter_squadrons: Vec::new(),
                marines: 0,
                construction_queue: Vec::new(),
            },
        );
        self.colonies_by_owner.entry(owner).or_default().insert(id);
        self.colonies_by_system.entry(system).or_default().insert(id);
        id
    }

    pub fn colony(&self, id: ColonyId) -> Option<&Colony> {
        self.colonies.get(&id)
    }

    pub fn colonies(&self) -> &BTreeMap<ColonyId, Colony> {
        &self.colonies
    }

    pub fn colonies_of(&self, owner: HouseId) -> Vec<ColonyId> {
        self.colonies_by_owner
            .get(&owner)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The colony in a system, if any. EC4X worlds host at most one.
    pub fn colony_at(&self, system: SystemId) -> Option<ColonyId> {
        self.colonies_by_system
            .get(&system)
            .and_then(|set| set.iter().next().copied())
    }

    pub fn update_colony<F>(&mut self, id: ColonyId, f: F) -> Result<(), IntegrityError>
    where
        F: FnOnce(&mut Colony),
    {
        let mut colony = self
            .colonies
            .get(&id)
            .cloned()
            .ok_or_else(|| dangling("colony", id))?;
        let old_owner = colony.owner;
        f(&mut colony);
        colony.id = id;
        if colony.owner != old_owner {
            if let Some(set) = self.colonies_by_owner.get_mut(&old_owner) {
                set.remove(&id);
            }
            self.colonies_by_owner.entry(colony.owner).or_default().insert(id);
        }
        self.colonies.insert(id, colony);
        Ok(())
    }

    // ========== Fleets ==========

    pub fn create_fleet(&mut self, owner: HouseId, location: SystemId) -> FleetId {
        let id = FleetId::new(self.next_fleet);
        self.next_fleet += 1;
        self.fleets.insert(
            id,
            Fleet {
                id,
                owner,
                location,
                status: Default::default(),
                squadrons: Vec::new(),
                spacelift: Vec::new(),
                mission: MissionState::Idle,
                command: None,
                roe: 5,
            },
        );
        self.fleets_by_owner.entry(owner).or_default().insert(id);
        self.fleets_by_location.entry(location).or_default().insert(id);
        id
    }

    pub fn fleet(&self, id: FleetId) -> Option<&Fleet> {
        self.fleets.get(&id)
    }

    pub fn fleets(&self) -> &BTreeMap<FleetId, Fleet> {
        &self.fleets
    }

    pub fn fleets_of(&self, owner: HouseId) -> Vec<FleetId> {
        self.fleets_by_owner
            .get(&owner)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn fleets_at(&self, system: SystemId) -> Vec<FleetId> {
        self.fleets_by_location
            .get(&system)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn update_fleet<F>(&mut self, id: FleetId, f: F) -> Result<(), IntegrityError>
    where
        F: FnOnce(&mut Fleet),
    {
        let mut fleet = self.fleets.get(&id).cloned().ok_or_else(|| dangling("fleet", id))?;
        let old_owner = fleet.owner;
        let old_location = fleet.location;
        f(&mut fleet);
        fleet.id = id;
        if fleet.owner != old_owner {
            if let Some(set) = self.fleets_by_owner.get_mut(&old_owner) {
                set.remove(&id);
            }
            self.fleets_by_owner.entry(fleet.owner).or_default().insert(id);
        }
        if fleet.location != old_location {
            if let Some(set) = self.fleets_by_location.get_mut(&old_location) {
                set.remove(&id);
            }
            self.fleets_by_location.entry(fleet.location).or_default().insert(id);
        }
        self.fleets.insert(id, fleet);
        Ok(())
    }

    /// Delete a fleet and everything it contains.
    pub fn delete_fleet(&mut self, id: FleetId) -> Result<(), IntegrityError> {
        let fleet = self.fleets.remove(&id).ok_or_else(|| dangling("fleet", id))?;
        if let Some(set) = self.fleets_by_owner.get_mut(&fleet.owner) {
            set.remove(&id);
        }
        if let Some(set) = self.fleets_by_location.get_mut(&fleet.location) {
            set.remove(&id);
        }
        for squadron_id in &fleet.squadrons {
            if let Some(squadron) = self.squadrons.remove(squadron_id) {
                for ship_id in squadron.ships().collect::<Vec<_>>() {
                    self.ships.remove(&ship_id);
                }
            }
        }
        for ship_id in &fleet.spacelift {
            self.remove_embarked_units(*ship_id);
            self.ships.remove(ship_id);
        }
        Ok(())
    }

    // ========== Squadrons and ships ==========

    fn create_ship_record(&mut self, class: &str, config: &GameConfig) -> Option<ShipId> {
        let spec = config.ship_class(class)?;
        let id = ShipId::new(self.next_ship);
        self.next_ship += 1;
        let cargo = if spec.role == ShipRole::Spacelift {
            Some(Cargo::empty(spec.cargo_capacity))
        } else {
            None
        };
        self.ships.insert(
            id,
            Ship {
                id,
                squadron: None,
                class: class.to_string(),
                role: spec.role,
                attack: spec.attack,
                defense: spec.defense,
                crippled_defense: spec.crippled_defense,
                combat_state: CombatState::Undamaged,
                cargo,
            },
        );
        Some(id)
    }

    /// Build a squadron from class names and attach it. Returns None when a
    /// class name is unknown to the config.
    pub fn commission_squadron(
        &mut self,
        owner: HouseId,
        attachment: SquadronAttachment,
        flagship_class: &str,
        escort_classes: &[&str],
        config: &GameConfig,
    ) -> Option<SquadronId> {
        let flagship = self.create_ship_record(flagship_class, config)?;
        let mut escorts = Vec::with_capacity(escort_classes.len());
        for class in escort_classes {
            escorts.push(self.create_ship_record(class, config)?);
        }

        let id = SquadronId::new(self.next_squadron);
        self.next_squadron += 1;
        let (fleet, colony) = match attachment {
            SquadronAttachment::Fleet(fleet_id) => (Some(fleet_id), None),
            SquadronAttachment::Colony(colony_id) => (None, Some(colony_id)),
        };
        for ship_id in std::iter::once(flagship).chain(escorts.iter().copied()) {
            if let Some(ship) = self.ships.get_mut(&ship_id) {
                ship.squadron = Some(id);
            }
        }
        self.squadrons.insert(
            id,
            Squadron {
                id,
                owner,
                fleet,
                colony,
                flagship,
                escorts,
            },
        );
        match attachment {
            SquadronAttachment::Fleet(fleet_id) => {
                let _ = self.update_fleet(fleet_id, |f| f.squadrons.push(id));
            }
            SquadronAttachment::Colony(colony_id) => {
                let _ = self.update_colony(colony_id, |c| c.fighter_squadrons.push(id));
            }
        }
        Some(id)
    }

    /// Build a spacelift ship and attach it to a fleet's train.
    pub fn commission_spacelift(
        &mut self,
        fleet: FleetId,
        class: &str,
        config: &GameConfig,
    ) -> Option<ShipId> {
        let ship = self.create_ship_record(class, config)?;
        let _ = self.update_fleet(fleet, |f| f.spacelift.push(ship));
        Some(ship)
    }

    pub fn squadron(&self, id: SquadronId) -> Option<&Squadron> {
        self.squadrons.get(&id)
    }

    pub fn squadrons(&self) -> &BTreeMap<SquadronId, Squadron> {
        &self.squadrons
    }

    pub fn update_squadron<F>(&mut self, id: SquadronId, f: F) -> Result<(), IntegrityError>
    where
        F: FnOnce(&mut Squadron),
    {
        let mut squadron = self
            .squadrons
            .get(&id)
            .cloned()
            .ok_or_else(|| dangling("squadron", id))?;
        f(&mut squadron);
        squadron.id = id;
        self.squadrons.insert(id, squadron);
        Ok(())
    }

    pub fn ship(&self, id: ShipId) -> Option<&Ship> {
        self.ships.get(&id)
    }

    pub fn ships(&self) -> &BTreeMap<ShipId, Ship> {
        &self.ships
    }

    pub fn update_ship<F>(&mut self, id: ShipId, f: F) -> Result<(), IntegrityError>
    where
        F: FnOnce(&mut Ship),
    {
        let mut ship = self.ships.get(&id).cloned().ok_or_else(|| dangling("ship", id))?;
        f(&mut ship);
        ship.id = id;
        self.ships.insert(id, ship);
        Ok(())
    }

    fn remove_embarked_units(&mut self, ship: ShipId) {
        let embarked: Vec<GroundUnitId> = self
            .ground_units
            .iter()
            .filter(|(_, unit)| unit.garrison == GarrisonSite::Ship(ship))
            .map(|(id, _)| *id)
            .collect();
        for id in embarked {
            self.ground_units.remove(&id);
        }
    }

    /// Delete a ship, cascading to its container. A squadron losing its
    /// flagship promotes the first escort; a squadron losing its last ship
    /// dissolves.
    pub fn delete_ship(&mut self, id: ShipId) -> Result<(), IntegrityError> {
        let ship = self.ships.remove(&id).ok_or_else(|| dangling("ship", id))?;
        self.remove_embarked_units(id);
        if let Some(squadron_id) = ship.squadron {
            let mut dissolve = false;
            if let Some(squadron) = self.squadrons.get_mut(&squadron_id) {
                if squadron.flagship == id {
                    if let Some(promoted) = squadron.escorts.first().copied() {
                        squadron.flagship = promoted;
                        squadron.escorts.remove(0);
                    } else {
                        dissolve = true;
                    }
                } else {
                    squadron.escorts.retain(|&escort| escort != id);
                }
            }
            if dissolve {
                self.delete_squadron(squadron_id)?;
            }
        } else {
            // Spacelift ships ride in a fleet's train.
            let holder: Option<FleetId> = self
                .fleets
                .iter()
                .find(|(_, fleet)| fleet.spacelift.contains(&id))
                .map(|(fleet_id, _)| *fleet_id);
            if let Some(fleet_id) = holder {
                self.update_fleet(fleet_id, |f| f.spacelift.retain(|&s| s != id))?;
            }
        }
        Ok(())
    }

    /// Delete a squadron and its ships, detaching it from fleet or colony.
    pub fn delete_squadron(&mut self, id: SquadronId) -> Result<(), IntegrityError> {
        let squadron = self
            .squadrons
            .remove(&id)
            .ok_or_else(|| dangling("squadron", id))?;
        for ship_id in squadron.ships().collect::<Vec<_>>() {
            self.ships.remove(&ship_id);
        }
        if let Some(fleet_id) = squadron.fleet {
            if self.fleets.contains_key(&fleet_id) {
                self.update_fleet(fleet_id, |f| f.squadrons.retain(|&q| q != id))?;
            }
        }
        if let Some(colony_id) = squadron.colony {
            if self.colonies.contains_key(&colony_id) {
                self.update_colony(colony_id, |c| c.fighter_squadrons.retain(|&q| q != id))?;
            }
        }
        Ok(())
    }

    // ========== Ground units ==========

    pub fn create_ground_unit(
        &mut self,
        owner: HouseId,
        class: GroundUnitClass,
        garrison: GarrisonSite,
    ) -> GroundUnitId {
        let id = GroundUnitId::new(self.next_ground_unit);
        self.next_ground_unit += 1;
        self.ground_units.insert(
            id,
            GroundUnit {
                id,
                owner,
                class,
                state: CombatState::Undamaged,
                garrison,
            },
        );
        if let GarrisonSite::Colony(colony_id) = garrison {
            let _ = self.update_colony(colony_id, |c| c.ground_units.push(id));
        }
        id
    }

    pub fn ground_unit(&self, id: GroundUnitId) -> Option<&GroundUnit> {
        self.ground_units.get(&id)
    }

    pub fn ground_units(&self) -> &BTreeMap<GroundUnitId, GroundUnit> {
        &self.ground_units
    }

    pub fn update_ground_unit<F>(&mut self, id: GroundUnitId, f: F) -> Result<(), IntegrityError>
    where
        F: FnOnce(&mut GroundUnit),
    {
        let mut unit = self
            .ground_units
            .get(&id)
            .cloned()
            .ok_or_else(|| dangling("ground unit", id))?;
        f(&mut unit);
        unit.id = id;
        self.ground_units.insert(id, unit);
        Ok(())
    }

    pub fn delete_ground_unit(&mut self, id: GroundUnitId) -> Result<(), IntegrityError> {
        let unit = self
            .ground_units
            .remove(&id)
            .ok_or_else(|| dangling("ground unit", id))?;
        if let GarrisonSite::Colony(colony_id) = unit.garrison {
            if self.colonies.contains_key(&colony_id) {
                self.update_colony(colony_id, |c| c.ground_units.retain(|&g| g != id))?;
            }
        }
        Ok(())
    }

    // ========== Facilities ==========

    pub fn create_facility(&mut self, colony: ColonyId, kind: FacilityKind) -> FacilityId {
        let id = FacilityId::new(self.next_facility);
        self.next_facility += 1;
        self.facilities.insert(id, Facility { id, colony, kind });
        let _ = self.update_colony(colony, |c| c.facilities.push(id));
        id
    }

    pub fn facility(&self, id: FacilityId) -> Option<&Facility> {
        self.facilities.get(&id)
    }

    pub fn facilities(&self) -> &BTreeMap<FacilityId, Facility> {
        &self.facilities
    }

    pub fn delete_facility(&mut self, id: FacilityId) -> Result<(), IntegrityError> {
        let facility = self
            .facilities
            .remove(&id)
            .ok_or_else(|| dangling("facility", id))?;
        if self.colonies.contains_key(&facility.colony) {
            self.update_colony(facility.colony, |c| c.facilities.retain(|&f| f != id))?;
        }
        Ok(())
    }

    pub fn count_facilities(&self, colony: ColonyId, kind: FacilityKind) -> u32 {
        let Some(colony) = self.colonies.get(&colony) else {
            return 0;
        };
        colony
            .facilities
            .iter()
            .filter(|id| self.facilities.get(id).is_some_and(|f| f.kind == kind))
            .count() as u32
    }

    /// Whether `owner` has a starbase orbiting a colony in `system`.
    pub fn starbase_in_system(&self, system: SystemId, owner: HouseId) -> bool {
        self.colony_at(system)
            .and_then(|id| self.colonies.get(&id))
            .is_some_and(|colony| {
                colony.owner == owner
                    && self.count_facilities(colony.id, FacilityKind::Starbase) > 0
            })
    }

    // ========== Aggregates ==========

    /// All ship IDs in a fleet: squadron ships plus the spacelift train.
    pub fn ships_in_fleet(&self, fleet: FleetId) -> Vec<ShipId> {
        let Some(fleet) = self.fleets.get(&fleet) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for squadron_id in &fleet.squadrons {
            if let Some(squadron) = self.squadrons.get(squadron_id) {
                out.extend(squadron.ships());
            }
        }
        out.extend(fleet.spacelift.iter().copied());
        out
    }

    pub fn fleet_profile(&self, fleet: FleetId) -> FleetProfile {
        let Some(record) = self.fleets.get(&fleet) else {
            return FleetProfile::default();
        };
        let mut profile = FleetProfile {
            has_spacelift: !record.spacelift.is_empty(),
            squadron_count: record.squadrons.len(),
            ..FleetProfile::default()
        };
        for ship_id in self.ships_in_fleet(fleet) {
            if let Some(ship) = self.ships.get(&ship_id) {
                if ship.is_crippled() {
                    profile.has_crippled = true;
                }
            }
        }
        for squadron_id in &record.squadrons {
            if let Some(squadron) = self.squadrons.get(squadron_id) {
                let all_scouts = squadron.ships().all(|ship_id| {
                    self.ships
                        .get(&ship_id)
                        .is_some_and(|s| s.role == ShipRole::Scout)
                });
                if all_scouts {
                    profile.scout_squadrons += 1;
                }
            }
        }
        profile
    }

    /// Sum of cached colony gross outputs: the house's GHO.
    pub fn house_gross_output(&self, house: HouseId) -> i64 {
        self.colonies_of(house)
            .iter()
            .filter_map(|id| self.colonies.get(id))
            .map(|c| c.gross_output)
            .sum()
    }

    // ========== Integrity ==========

    /// Verify referential integrity, single-container membership, owner
    /// agreement between fleets and their squadrons, and index agreement.
    /// Any failure is fatal to the turn.
    pub fn integrity_check(&self) -> Result<(), IntegrityError> {
        for colony in self.colonies.values() {
            if !self.houses.contains_key(&colony.owner) {
                return Err(dangling("house", colony.owner));
            }
            if !self.systems.contains_key(&colony.system) {
                return Err(dangling("system", colony.system));
            }
            for facility_id in &colony.facilities {
                let facility = self
                    .facilities
                    .get(facility_id)
                    .ok_or_else(|| dangling("facility", facility_id))?;
                if facility.colony != colony.id {
                    return Err(IntegrityError::OwnerMismatch {
                        detail: format!("facility {facility_id} not attached to colony {}", colony.id),
                    });
                }
            }
            for unit_id in &colony.ground_units {
                let unit = self
                    .ground_units
                    .get(unit_id)
                    .ok_or_else(|| dangling("ground unit", unit_id))?;
                if unit.garrison != GarrisonSite::Colony(colony.id) {
                    return Err(IntegrityError::OwnerMismatch {
                        detail: format!("ground unit {unit_id} not garrisoned at colony {}", colony.id),
                    });
                }
            }
        }

        let mut ship_references: BTreeMap<ShipId, u32> = BTreeMap::new();
        for fleet in self.fleets.values() {
            if !self.houses.contains_key(&fleet.owner) {
                return Err(dangling("house", fleet.owner));
            }
            if !self.systems.contains_key(&fleet.location) {
                return Err(dangling("system", fleet.location));
            }
            for squadron_id in &fleet.squadrons {
                let squadron = self
                    .squadrons
                    .get(squadron_id)
                    .ok_or_else(|| dangling("squadron", squadron_id))?;
                if squadron.owner != fleet.owner {
                    return Err(IntegrityError::OwnerMismatch {
                        detail: format!(
                            "squadron {squadron_id} owned by {} inside fleet of {}",
                            squadron.owner, fleet.owner
                        ),
                    });
                }
                if squadron.fleet != Some(fleet.id) {
                    return Err(IntegrityError::OwnerMismatch {
                        detail: format!("squadron {squadron_id} does not point back at fleet {}", fleet.id),
                    });
                }
            }
            for ship_id in &fleet.spacelift {
                let ship = self.ships.get(ship_id).ok_or_else(|| dangling("ship", ship_id))?;
                if ship.squadron.is_some() {
                    return Err(IntegrityError::InvariantViolation(format!(
                        "spacelift ship {ship_id} also claims a squadron"
                    )));
                }
                *ship_references.entry(*ship_id).or_default() += 1;
            }
        }

        for squadron in self.squadrons.values() {
            for ship_id in squadron.ships() {
                let ship = self.ships.get(&ship_id).ok_or_else(|| dangling("ship", ship_id))?;
                if ship.squadron != Some(squadron.id) {
                    return Err(IntegrityError::OwnerMismatch {
                        detail: format!("ship {ship_id} does not point back at squadron {}", squadron.id),
                    });
                }
                *ship_references.entry(ship_id).or_default() += 1;
            }
            match (squadron.fleet, squadron.colony) {
                (Some(_), None) | (None, Some(_)) => {}
                _ => {
                    return Err(IntegrityError::InvariantViolation(format!(
                        "squadron {} must attach to exactly one of fleet or colony",
                        squadron.id
                    )))
                }
            }
        }

        for (ship_id, count) in &ship_references {
            if *count > 1 {
                return Err(IntegrityError::InvariantViolation(format!(
                    "ship {ship_id} appears in {count} containers"
                )));
            }
        }
        for ship_id in self.ships.keys() {
            if !ship_references.contains_key(ship_id) {
                return Err(IntegrityError::InvariantViolation(format!(
                    "ship {ship_id} is not held by any squadron or fleet"
                )));
            }
        }

        // Index agreement.
        for (owner, set) in &self.fleets_by_owner {
            for fleet_id in set {
                let fleet = self.fleets.get(fleet_id).ok_or_else(|| dangling("fleet", fleet_id))?;
                if fleet.owner != *owner {
                    return Err(IntegrityError::InvariantViolation(format!(
                        "fleet index lists {fleet_id} under wrong owner {owner}"
                    )));
                }
            }
        }
        for (location, set) in &self.fleets_by_location {
            for fleet_id in set {
                let fleet = self.fleets.get(fleet_id).ok_or_else(|| dangling("fleet", fleet_id))?;
                if fleet.location != *location {
                    return Err(IntegrityError::InvariantViolation(format!(
                        "fleet index lists {fleet_id} at wrong location {location}"
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ec4x_common::coords::Hex;

    fn test_store() -> (EntityStore, GameConfig, HouseId, SystemId) {
        let config = GameConfig::default();
        let mut store = EntityStore::new();
        let system = SystemId::new(1);
        store.insert_system(System {
            id: system,
            coords: Hex::origin(),
            lanes: BTreeMap::new(),
        });
        let house = store.create_house("Atreides", system, 500);
        (store, config, house, system)
    }

    #[test]
    fn commissioned_squadron_passes_integrity() {
        let (mut store, config, house, system) = test_store();
        let fleet = store.create_fleet(house, system);
        let squadron = store
            .commission_squadron(
                house,
                SquadronAttachment::Fleet(fleet),
                "Destroyer",
                &["Corvette", "Corvette"],
                &config,
            )
            .expect("known classes");
        assert!(store.fleet(fleet).unwrap().squadrons.contains(&squadron));
        store.integrity_check().expect("integrity");
    }

    #[test]
    fn update_fleet_moves_location_index() {
        let (mut store, _config, house, system) = test_store();
        let other = SystemId::new(2);
        store.insert_system(System {
            id: other,
            coords: Hex::new(1, 0),
            lanes: BTreeMap::new(),
        });
        let fleet = store.create_fleet(house, system);
        store.update_fleet(fleet, |f| f.location = other).expect("update");
        assert!(store.fleets_at(system).is_empty());
        assert_eq!(store.fleets_at(other), vec![fleet]);
        store.integrity_check().expect("integrity");
    }

    #[test]
    fn deleting_flagship_promotes_escort() {
        let (mut store, config, house, system) = test_store();
        let fleet = store.create_fleet(house, system);
        let squadron = store
            .commission_squadron(
                house,
                SquadronAttachment::Fleet(fleet),
                "Destroyer",
                &["Corvette"],
                &config,
            )
            .expect("known classes");
        let flagship = store.squadron(squadron).unwrap().flagship;
        store.delete_ship(flagship).expect("delete");
        let squadron = store.squadron(squadron).expect("squadron survives");
        assert!(squadron.escorts.is_empty());
        assert_eq!(
            store.ship(squadron.flagship).unwrap().class,
            "Corvette".to_string()
        );
        store.integrity_check().expect("integrity");
    }

    #[test]
    fn deleting_last_ship_dissolves_squadron() {
        let (mut store, config, house, system) = test_store();
        let fleet = store.create_fleet(house, system);
        let squadron = store
            .commission_squadron(house, SquadronAttachment::Fleet(fleet), "Scout", &[], &config)
            .expect("known classes");
        let flagship = store.squadron(squadron).unwrap().flagship;
        store.delete_ship(flagship).expect("delete");
        assert!(store.squadron(squadron).is_none());
        assert!(store.fleet(fleet).unwrap().squadrons.is_empty());
        store.integrity_check().expect("integrity");
    }

    #[test]
    fn delete_fleet_cascades_to_ships() {
        let (mut store, config, house, system) = test_store();
        let fleet = store.create_fleet(house, system);
        store
            .commission_squadron(
                house,
                SquadronAttachment::Fleet(fleet),
                "Cruiser",
                &["Corvette"],
                &config,
            )
            .expect("known classes");
        store.commission_spacelift(fleet, "ETAC", &config).expect("etac");
        assert_eq!(store.ships().len(), 3);
        store.delete_fleet(fleet).expect("delete");
        assert!(store.ships().is_empty());
        assert!(store.squadrons().is_empty());
        store.integrity_check().expect("integrity");
    }

    #[test]
    fn integrity_catches_double_containment() {
        let (mut store, config, house, system) = test_store();
        let fleet_a = store.create_fleet(house, system);
        let fleet_b = store.create_fleet(house, system);
        let ship = store.commission_spacelift(fleet_a, "ETAC", &config).expect("etac");
        store.update_fleet(fleet_b, |f| f.spacelift.push(ship)).expect("update");
        assert!(store.integrity_check().is_err());
    }

    #[test]
    fn colony_capture_reindexes_owner() {
        let (mut store, _config, house, system) = test_store();
        let rival = store.create_house("Harkonnen", system, 500);
        let colony = store.create_colony(
            system,
            house,
            PlanetClass::Terran,
            ResourceRating::Normal,
            100,
            20,
        );
        store.update_colony(colony, |c| c.owner = rival).expect("update");
        assert!(store.colonies_of(house).is_empty());
        assert_eq!(store.colonies_of(rival), vec![colony]);
    }
}
