//! Ship, squadron, fleet, and ground-unit definitions for EC4X
//!
//! Ship classes are config data (see [`crate::config`]); a built ship
//! carries a snapshot of its class stats so that later config reloads do
//! not retroactively change deployed hulls.

use serde::{Deserialize, Serialize};

use crate::ids::{ColonyId, FleetId, GroundUnitId, HouseId, ShipId, SquadronId, SystemId};

/// Tactical role of a ship class.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum ShipRole {
    Capital,
    Escort,
    Auxiliary,
    SpecialWeapon,
    Fighter,
    Scout,
    Spacelift,
}

/// Targeting bucket used by the combat kernel's priority tables.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum TargetBucket {
    Capital,
    Escort,
    Auxiliary,
    SpecialWeapon,
    Fighter,
}

impl ShipRole {
    /// Bucket this role is grouped under when selecting targets.
    pub const fn bucket(self) -> TargetBucket {
        match self {
            ShipRole::Capital => TargetBucket::Capital,
            ShipRole::Escort => TargetBucket::Escort,
            ShipRole::Auxiliary | ShipRole::Scout | ShipRole::Spacelift => {
                TargetBucket::Auxiliary
            }
            ShipRole::SpecialWeapon => TargetBucket::SpecialWeapon,
            ShipRole::Fighter => TargetBucket::Fighter,
        }
    }
}

/// Damage ladder. Transitions are forward-only and single-step: a ship can
/// never jump from Undamaged to Destroyed in one application.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub enum CombatState {
    #[default]
    Undamaged,
    Crippled,
    Destroyed,
}

impl CombatState {
    /// The next state down the ladder, one step at most.
    pub const fn one_step_worse(self) -> CombatState {
        match self {
            CombatState::Undamaged => CombatState::Crippled,
            CombatState::Crippled | CombatState::Destroyed => CombatState::Destroyed,
        }
    }
}

/// What a spacelift hold is carrying.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub enum CargoKind {
    #[default]
    None,
    Marines,
    /// Population Transfer Units bound for a colony site.
    Colonists,
}

/// Spacelift cargo hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Cargo {
    pub kind: CargoKind,
    pub quantity: u32,
    pub capacity: u32,
}

impl Cargo {
    pub fn empty(capacity: u32) -> Self {
        Self {
            kind: CargoKind::None,
            quantity: 0,
            capacity,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.kind == CargoKind::None || self.quantity == 0
    }

    pub fn free_space(&self) -> u32 {
        self.capacity.saturating_sub(self.quantity)
    }
}

/// An individual ship instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ship {
    pub id: ShipId,
    /// Combat ships belong to a squadron; spacelift ships ride in a fleet's
    /// spacelift train instead.
    pub squadron: Option<SquadronId>,
    pub class: String,
    pub role: ShipRole,
    /// Attack Strength.
    pub attack: u32,
    /// Defense Strength while undamaged.
    pub defense: u32,
    /// Defense Strength while crippled.
    pub crippled_defense: u32,
    pub combat_state: CombatState,
    /// Present on spacelift hulls only.
    pub cargo: Option<Cargo>,
}

impl Ship {
    /// Defense after accounting for the damage ladder. Destroyed ships have
    /// no defense; they only persist until end-of-combat cleanup.
    pub fn effective_defense(&self) -> u32 {
        match self.combat_state {
            CombatState::Undamaged => self.defense,
            CombatState::Crippled => self.crippled_defense,
            CombatState::Destroyed => 0,
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.combat_state == CombatState::Destroyed
    }

    pub fn is_crippled(&self) -> bool {
        self.combat_state == CombatState::Crippled
    }
}

/// A squadron: one flagship plus escorts. The combat unit of engagement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Squadron {
    pub id: SquadronId,
    pub owner: HouseId,
    /// Fleet-attached squadrons carry this; colony fighter squadrons carry
    /// `colony` instead. Exactly one of the two is set.
    pub fleet: Option<FleetId>,
    pub colony: Option<ColonyId>,
    pub flagship: ShipId,
    pub escorts: Vec<ShipId>,
}

impl Squadron {
    pub fn ships(&self) -> impl Iterator<Item = ShipId> + '_ {
        std::iter::once(self.flagship).chain(self.escorts.iter().copied())
    }
}

/// Readiness posture of a fleet. Reserve and mothballed fleets pay reduced
/// maintenance and may not receive movement or combat directives.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub enum FleetStatus {
    #[default]
    Active,
    Reserve,
    Mothballed,
}

/// Standing directive attached to a fleet by the most recent order packet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FleetDirective {
    Hold,
    Move { to: SystemId },
    Spy { system: SystemId },
    Colonize { system: SystemId },
    Invade { colony: ColonyId },
    Blitz { colony: ColonyId },
    Bombard { colony: ColonyId },
    Blockade { system: SystemId },
}

/// Multi-turn movement progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum MissionState {
    #[default]
    Idle,
    /// Remaining route, next waypoint first.
    Underway { route: Vec<SystemId> },
}

/// A fleet of squadrons plus a spacelift train.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fleet {
    pub id: FleetId,
    pub owner: HouseId,
    pub location: SystemId,
    pub status: FleetStatus,
    pub squadrons: Vec<SquadronId>,
    /// Spacelift ships (ETACs, troop transports), kept apart from squadrons.
    pub spacelift: Vec<ShipId>,
    pub mission: MissionState,
    pub command: Option<FleetDirective>,
    /// Rules of Engagement, 0 (flee on contact) ..= 10 (fight to the end).
    pub roe: u8,
}

impl Fleet {
    pub fn is_idle(&self) -> bool {
        matches!(self.mission, MissionState::Idle)
    }
}

/// Ground force classification.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum GroundUnitClass {
    Army,
    Marine,
    GroundBattery,
    PlanetaryShield,
}

impl GroundUnitClass {
    pub fn all() -> &'static [GroundUnitClass] {
        &[
            GroundUnitClass::Army,
            GroundUnitClass::Marine,
            GroundUnitClass::GroundBattery,
            GroundUnitClass::PlanetaryShield,
        ]
    }
}

/// Where a ground unit is garrisoned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum GarrisonSite {
    Colony(ColonyId),
    /// Embarked on a spacelift ship.
    Ship(ShipId),
}

/// A ground unit instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroundUnit {
    pub id: GroundUnitId,
    pub owner: HouseId,
    pub class: GroundUnitClass,
    pub state: CombatState,
    pub garrison: GarrisonSite,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combat_state_never_skips() {
        let mut state = CombatState::Undamaged;
        state = state.one_step_worse();
        assert_eq!(state, CombatState::Crippled);
        state = state.one_step_worse();
        assert_eq!(state, CombatState::Destroyed);
        // Further damage is absorbed.
        assert_eq!(state.one_step_worse(), CombatState::Destroyed);
    }

    #[test]
    fn scout_and_spacelift_group_as_auxiliary() {
        assert_eq!(ShipRole::Scout.bucket(), TargetBucket::Auxiliary);
        assert_eq!(ShipRole::Spacelift.bucket(), TargetBucket::Auxiliary);
        assert_eq!(ShipRole::Capital.bucket(), TargetBucket::Capital);
    }

    #[test]
    fn cargo_space_accounting() {
        let mut hold = Cargo::empty(120);
        assert!(hold.is_empty());
        hold.kind = CargoKind::Marines;
        hold.quantity = 50;
        assert_eq!(hold.free_space(), 70);
        assert!(!hold.is_empty());
    }
}
