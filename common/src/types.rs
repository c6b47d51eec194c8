//! Core type definitions for EC4X
//!
//! Shared entity records and closed rule enums: houses, systems, colonies,
//! facilities, diplomacy, prestige, and morale. Ships, squadrons, fleets,
//! and ground units live in [`crate::units`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::coords::Hex;
use crate::ids::{ColonyId, FacilityId, GroundUnitId, HouseId, SquadronId, SystemId};

/// Jump lane classification. The weight is the A* edge cost.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LaneType {
    Major,
    Minor,
    Restricted,
}

impl LaneType {
    pub const fn weight(self) -> u32 {
        match self {
            LaneType::Major => 1,
            LaneType::Minor => 2,
            LaneType::Restricted => 3,
        }
    }
}

/// A star system: a node of the lane graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct System {
    pub id: SystemId,
    pub coords: Hex,
    /// Undirected lanes, stored on both endpoints.
    pub lanes: BTreeMap<SystemId, LaneType>,
}

/// Habitability class of a colony's primary world.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum PlanetClass {
    Eden,
    Terran,
    Ocean,
    Arid,
    Tundra,
    Barren,
    Extreme,
}

impl PlanetClass {
    pub fn all() -> &'static [PlanetClass] {
        &[
            PlanetClass::Eden,
            PlanetClass::Terran,
            PlanetClass::Ocean,
            PlanetClass::Arid,
            PlanetClass::Tundra,
            PlanetClass::Barren,
            PlanetClass::Extreme,
        ]
    }

    /// One step toward Eden, if any. Terraforming moves along this chain.
    pub fn improved(self) -> Option<PlanetClass> {
        match self {
            PlanetClass::Eden => None,
            PlanetClass::Terran => Some(PlanetClass::Eden),
            PlanetClass::Ocean => Some(PlanetClass::Terran),
            PlanetClass::Arid => Some(PlanetClass::Ocean),
            PlanetClass::Tundra => Some(PlanetClass::Arid),
            PlanetClass::Barren => Some(PlanetClass::Tundra),
            PlanetClass::Extreme => Some(PlanetClass::Barren),
        }
    }
}

/// Mineral wealth of a colony's primary world.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum ResourceRating {
    Abundant,
    Rich,
    Normal,
    Poor,
    VeryPoor,
}

impl ResourceRating {
    pub fn all() -> &'static [ResourceRating] {
        &[
            ResourceRating::Abundant,
            ResourceRating::Rich,
            ResourceRating::Normal,
            ResourceRating::Poor,
            ResourceRating::VeryPoor,
        ]
    }
}

/// Orbital and surface installations. Counts of these gate construction
/// docks and grant combat/detection bonuses.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum FacilityKind {
    Spaceport,
    Shipyard,
    Starbase,
}

impl FacilityKind {
    pub fn all() -> &'static [FacilityKind] {
        &[
            FacilityKind::Spaceport,
            FacilityKind::Shipyard,
            FacilityKind::Starbase,
        ]
    }
}

/// A facility instance attached to a colony.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Facility {
    pub id: FacilityId,
    pub colony: ColonyId,
    pub kind: FacilityKind,
}

/// What a construction project produces on completion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum BuildItem {
    Ship { class: String },
    Facility(FacilityKind),
    GroundUnit(crate::units::GroundUnitClass),
    IndustrialUnits { count: u32 },
}

/// A funded construction queue entry. Advanced by the Maintenance Phase
/// until `paid >= cost`, then the item deploys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConstructionProject {
    pub item: BuildItem,
    pub cost: u32,
    pub paid: u32,
}

impl ConstructionProject {
    pub fn is_complete(&self) -> bool {
        self.paid >= self.cost
    }
}

/// A colony on a system's primary world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Colony {
    pub id: ColonyId,
    pub system: SystemId,
    pub owner: HouseId,
    /// Population Units. Never exceeds the planet-class cap.
    pub population: u32,
    /// Industrial Units.
    pub industrial_units: u32,
    /// Gross Colonial Output, cached by the last Income Phase.
    pub gross_output: i64,
    /// Colony tax rate in percent, 0..=100.
    pub tax_rate: u8,
    pub infrastructure: u32,
    /// Fraction of infrastructure currently damaged, 0.0..=1.0.
    pub infrastructure_damage: f64,
    pub resource_rating: ResourceRating,
    pub planet_class: PlanetClass,
    pub facilities: Vec<FacilityId>,
    pub ground_units: Vec<GroundUnitId>,
    /// Colony-owned fighter squadrons. They defend in the Intercept phase
    /// and never retreat.
    pub fighter_squadrons: Vec<SquadronId>,
    /// Marine inventory available for loading onto transports.
    pub marines: u32,
    pub construction_queue: Vec<ConstructionProject>,
}

impl Colony {
    /// Infrastructure still standing after applying the damage fraction.
    pub fn net_infrastructure(&self) -> u32 {
        let intact = (self.infrastructure as f64) * (1.0 - self.infrastructure_damage);
        intact.floor() as u32
    }
}

/// Diplomatic posture between two houses.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub enum DiplomaticState {
    #[default]
    Neutral,
    NonAggression,
    Enemy,
}

/// One side of a bilateral relation, stored on each house's record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiplomaticRelation {
    pub state: DiplomaticState,
    pub since_turn: u32,
}

/// A recorded pact violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ViolationRecord {
    pub turn: u32,
    pub against: HouseId,
}

/// Reputation standing derived from the violation history.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DiplomaticStanding {
    #[default]
    Honorable,
    /// Pact proposals are subject to reinstatement cooldowns.
    Dishonored { until_turn: u32 },
    /// No pact acceptance at all.
    DiplomaticallyIsolated { until_turn: u32 },
}

/// Morale ladder, derived from prestige each turn. Modulates combat CER
/// and tax efficiency.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub enum Morale {
    Collapsing,
    Shaken,
    Uneasy,
    #[default]
    Steady,
    Content,
    High,
    Exultant,
}

impl Morale {
    pub fn all() -> &'static [Morale] {
        &[
            Morale::Collapsing,
            Morale::Shaken,
            Morale::Uneasy,
            Morale::Steady,
            Morale::Content,
            Morale::High,
            Morale::Exultant,
        ]
    }

    /// Index into the seven-slot config tables.
    pub const fn index(self) -> usize {
        match self {
            Morale::Collapsing => 0,
            Morale::Shaken => 1,
            Morale::Uneasy => 2,
            Morale::Steady => 3,
            Morale::Content => 4,
            Morale::High => 5,
            Morale::Exultant => 6,
        }
    }
}

/// Tech tree levels, one field per research track.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TechTree {
    /// Economic Level
    pub el: u8,
    /// Science Level
    pub sl: u8,
    /// Construction
    pub cst: u8,
    /// Weapons
    pub wep: u8,
    /// Electronic Intelligence
    pub eli: u8,
    /// Counter-Intelligence
    pub cic: u8,
    /// Cloaking
    pub clk: u8,
    /// Planetary Shields
    pub sld: u8,
    /// Terraforming
    pub ter: u8,
    /// Fleet Doctrine
    pub fd: u8,
    /// Advanced Construction
    pub aco: u8,
}

/// Research tracks addressable by orders.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum TechField {
    El,
    Sl,
    Cst,
    Wep,
    Eli,
    Cic,
    Clk,
    Sld,
    Ter,
    Fd,
    Aco,
}

impl TechTree {
    pub fn level(&self, field: TechField) -> u8 {
        match field {
            TechField::El => self.el,
            TechField::Sl => self.sl,
            TechField::Cst => self.cst,
            TechField::Wep => self.wep,
            TechField::Eli => self.eli,
            TechField::Cic => self.cic,
            TechField::Clk => self.clk,
            TechField::Sld => self.sld,
            TechField::Ter => self.ter,
            TechField::Fd => self.fd,
            TechField::Aco => self.aco,
        }
    }

    pub fn advance(&mut self, field: TechField) {
        let slot = match field {
            TechField::El => &mut self.el,
            TechField::Sl => &mut self.sl,
            TechField::Cst => &mut self.cst,
            TechField::Wep => &mut self.wep,
            TechField::Eli => &mut self.eli,
            TechField::Cic => &mut self.cic,
            TechField::Clk => &mut self.clk,
            TechField::Sld => &mut self.sld,
            TechField::Ter => &mut self.ter,
            TechField::Fd => &mut self.fd,
            TechField::Aco => &mut self.aco,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Tax policy with the rolling window that drives prestige effects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaxPolicy {
    /// Current rate in percent, 0..=100.
    pub current_rate: u8,
    /// Most recent rates, newest last, capped at the rolling window size.
    pub history: Vec<u8>,
}

pub const TAX_ROLLING_WINDOW: usize = 6;

impl Default for TaxPolicy {
    fn default() -> Self {
        Self {
            current_rate: 50,
            history: Vec::new(),
        }
    }
}

impl TaxPolicy {
    /// Push the current rate into the rolling window.
    pub fn record_turn(&mut self) {
        self.history.push(self.current_rate);
        if self.history.len() > TAX_ROLLING_WINDOW {
            self.history.remove(0);
        }
    }

    /// Rolling average over the recorded window; falls back to the current
    /// rate before any history exists.
    pub fn rolling_average(&self) -> f64 {
        if self.history.is_empty() {
            return f64::from(self.current_rate);
        }
        let sum: u32 = self.history.iter().map(|&r| u32::from(r)).sum();
        f64::from(sum) / self.history.len() as f64
    }
}

/// Espionage point balances.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EspionageBudget {
    /// Espionage Budget Points (offensive).
    pub ebp: u32,
    /// Counter-Intel Points (defensive).
    pub cip: u32,
}

/// A player empire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct House {
    pub id: HouseId,
    pub name: String,
    /// Production Points on hand. Never negative after pipeline completion;
    /// a negative intermediate triggers the maintenance shortfall cascade.
    pub treasury: i64,
    pub prestige: i64,
    pub tech: TechTree,
    /// Banked research PP per track, spent by the Maintenance Phase.
    pub research: BTreeMap<TechField, u32>,
    pub relations: BTreeMap<HouseId, DiplomaticRelation>,
    pub espionage: EspionageBudget,
    pub tax_policy: TaxPolicy,
    pub violations: Vec<ViolationRecord>,
    pub standing: DiplomaticStanding,
    pub morale: Morale,
    pub eliminated: bool,
    /// Preferred retreat destinations, nearest first.
    pub fallback_routes: Vec<SystemId>,
    pub home_system: SystemId,
    /// Systems this house has ever scouted; drives fog-of-war map knowledge.
    pub scouted: BTreeSet<SystemId>,
    /// Consecutive turns spent in maintenance shortfall.
    pub shortfall_turns: u8,
    /// Consecutive turns spent at negative prestige.
    pub deficit_turns: u8,
}

impl House {
    /// Current posture toward another house. Unknown houses are Neutral.
    pub fn relation_with(&self, other: HouseId) -> DiplomaticState {
        self.relations
            .get(&other)
            .map_or(DiplomaticState::Neutral, |r| r.state)
    }

    pub fn is_enemy_of(&self, other: HouseId) -> bool {
        self.relation_with(other) == DiplomaticState::Enemy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lane_weights() {
        assert_eq!(LaneType::Major.weight(), 1);
        assert_eq!(LaneType::Minor.weight(), 2);
        assert_eq!(LaneType::Restricted.weight(), 3);
    }

    #[test]
    fn tax_rolling_window_caps_at_six() {
        let mut policy = TaxPolicy::default();
        for rate in [10, 20, 30, 40, 50, 60, 70] {
            policy.current_rate = rate;
            policy.record_turn();
        }
        assert_eq!(policy.history.len(), TAX_ROLLING_WINDOW);
        // Oldest entry (10) fell out of the window.
        assert!((policy.rolling_average() - 45.0).abs() < 1e-9);
    }

    #[test]
    fn terraform_chain_ends_at_eden() {
        let mut class = PlanetClass::Extreme;
        let mut steps = 0;
        while let Some(next) = class.improved() {
            class = next;
            steps += 1;
        }
        assert_eq!(class, PlanetClass::Eden);
        assert_eq!(steps, 6);
    }

    #[test]
    fn tech_tree_advance_by_field() {
        let mut tech = TechTree::default();
        tech.advance(TechField::El);
        tech.advance(TechField::El);
        tech.advance(TechField::Wep);
        assert_eq!(tech.level(TechField::El), 2);
        assert_eq!(tech.level(TechField::Wep), 1);
        assert_eq!(tech.level(TechField::Sl), 0);
    }
}
