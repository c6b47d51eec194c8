//! Game configuration for EC4X
//!
//! Every balance value the engine consumes lives here: economy curves,
//! combat modifiers, ship and ground-unit classes, facility costs, prestige
//! awards, diplomacy cooldowns, espionage tables, tech curves, and gameplay
//! knobs. Nothing is hardcoded in the kernels.
//!
//! A compiled-in default covers every field; `GameConfig::load` merges a
//! TOML file over the defaults section by section and validates the result.
//! Validation failure rejects the load outright, exposing no partial state.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::events::{EspionageAction, PrestigeSource};
use crate::types::{FacilityKind, Morale, PlanetClass, ResourceRating};
use crate::units::{GroundUnitClass, ShipRole, TargetBucket};

const RATIO_SUM_TOLERANCE: f64 = 0.01;

// ---------------------------------------------------------------------------
// Economy
// ---------------------------------------------------------------------------

/// High-tax prestige penalty band: applies when the rolling average exceeds
/// `above`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TaxBand {
    pub above: f64,
    pub penalty: i64,
}

/// Salvage recovered when the shortfall cascade strips an asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StripSalvage {
    pub industrial_unit: i64,
    pub spaceport: i64,
    pub shipyard: i64,
    pub starbase: i64,
    pub ground_battery: i64,
    pub army: i64,
    pub marine: i64,
    pub planetary_shield: i64,
}

impl Default for StripSalvage {
    fn default() -> Self {
        Self {
            industrial_unit: 20,
            spaceport: 30,
            shipyard: 50,
            starbase: 80,
            ground_battery: 15,
            army: 10,
            marine: 8,
            planetary_shield: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EconomyConfig {
    /// RAW index by planet class and resource rating; the PU term of GCO.
    pub raw_index: BTreeMap<PlanetClass, BTreeMap<ResourceRating, f64>>,
    /// EL contribution per level to the IU multiplier.
    pub el_modifier_step: f64,
    /// Cap on the EL contribution (modifier caps at 1.0 + this).
    pub el_modifier_cap: f64,
    pub production_growth: f64,
    /// Base PP cost of one Industrial Unit before the load multiplier.
    pub iu_cost_base: u32,
    pub iu_cost_multiplier_min: f64,
    pub iu_cost_multiplier_max: f64,
    /// PP per ERP before the `log10(GHO)` term.
    pub erp_base_cost: f64,
    /// High-tax penalty ladder, ascending by `above`.
    pub high_tax_bands: Vec<TaxBand>,
    /// Base population growth per turn, modulated by morale tax efficiency.
    pub population_growth_rate: f64,
    /// Fraction of production cost recovered when disbanding a fleet.
    pub salvage_rate: f64,
    pub strip_salvage: StripSalvage,
    /// Escalating prestige penalties per consecutive shortfall turn.
    pub shortfall_penalties: Vec<i64>,
    /// Shortfall turns tolerated before prestige penalties engage.
    pub shortfall_grace_turns: u8,
    /// Space-Guild base cost per PTU by origin planet class.
    pub transfer_base_cost: BTreeMap<PlanetClass, u32>,
    /// Cost surcharge per jump beyond the first.
    pub transfer_jump_surcharge: f64,
    pub max_concurrent_transfers: u32,
    /// Maintenance multiplier for Reserve fleets.
    pub reserve_maintenance_factor: f64,
    /// Maintenance multiplier for Mothballed fleets.
    pub mothball_maintenance_factor: f64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        // Grades run Eden/Abundant = 1.00 down to Extreme/VeryPoor = 0.60.
        let class_base: [(PlanetClass, f64); 7] = [
            (PlanetClass::Eden, 1.00),
            (PlanetClass::Terran, 0.95),
            (PlanetClass::Ocean, 0.90),
            (PlanetClass::Arid, 0.85),
            (PlanetClass::Tundra, 0.80),
            (PlanetClass::Barren, 0.75),
            (PlanetClass::Extreme, 0.70),
        ];
        let rating_adjust: [(ResourceRating, f64); 5] = [
            (ResourceRating::Abundant, 0.00),
            (ResourceRating::Rich, -0.02),
            (ResourceRating::Normal, -0.05),
            (ResourceRating::Poor, -0.08),
            (ResourceRating::VeryPoor, -0.10),
        ];
        let mut raw_index = BTreeMap::new();
        for (class, base) in class_base {
            let mut row: BTreeMap<ResourceRating, f64> = BTreeMap::new();
            for (rating, adjust) in rating_adjust {
                row.insert(rating, ((base + adjust) * 100.0).round() / 100.0);
            }
            raw_index.insert(class, row);
        }

        let transfer_base_cost = [
            (PlanetClass::Eden, 4),
            (PlanetClass::Terran, 5),
            (PlanetClass::Ocean, 6),
            (PlanetClass::Arid, 7),
            (PlanetClass::Tundra, 8),
            (PlanetClass::Barren, 9),
            (PlanetClass::Extreme, 10),
        ]
        .into_iter()
        .collect();

        Self {
            raw_index,
            el_modifier_step: 0.05,
            el_modifier_cap: 0.50,
            production_growth: 0.0,
            iu_cost_base: 8,
            iu_cost_multiplier_min: 1.0,
            iu_cost_multiplier_max: 2.5,
            erp_base_cost: 5.0,
            high_tax_bands: vec![
                TaxBand { above: 50.0, penalty: -1 },
                TaxBand { above: 60.0, penalty: -2 },
                TaxBand { above: 70.0, penalty: -4 },
                TaxBand { above: 80.0, penalty: -7 },
                TaxBand { above: 90.0, penalty: -11 },
            ],
            population_growth_rate: 0.02,
            salvage_rate: 0.25,
            strip_salvage: StripSalvage::default(),
            shortfall_penalties: vec![-8, -11, -14, -17],
            shortfall_grace_turns: 2,
            transfer_base_cost,
            transfer_jump_surcharge: 0.20,
            max_concurrent_transfers: 3,
            reserve_maintenance_factor: 0.5,
            mothball_maintenance_factor: 0.25,
        }
    }
}

// ---------------------------------------------------------------------------
// Combat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BombardmentConfig {
    pub max_rounds: u8,
    /// Shield block chance per SLD level of the defending house.
    pub shield_block_chance_per_level: f64,
    pub shield_block_chance_cap: f64,
    /// Fraction of damage removed when a shield blocks.
    pub shield_block_percentage: f64,
    /// PU casualties per point of net bombardment damage.
    pub pu_casualty_factor: f64,
    /// Net damage required to destroy one IU.
    pub iu_damage_divisor: u32,
    /// Net damage required to destroy one ground battery.
    pub battery_damage_divisor: u32,
}

impl Default for BombardmentConfig {
    fn default() -> Self {
        Self {
            max_rounds: 3,
            shield_block_chance_per_level: 0.10,
            shield_block_chance_cap: 0.80,
            shield_block_percentage: 0.50,
            pu_casualty_factor: 0.25,
            iu_damage_divisor: 10,
            battery_damage_divisor: 25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InvasionConfig {
    /// Infrastructure fraction destroyed by a successful invasion.
    pub infrastructure_loss: f64,
    /// IU fraction destroyed by a successful invasion.
    pub iu_destroyed_ratio: f64,
    /// Strength ratio a blitz needs over a plain invasion's break-even.
    pub blitz_margin: f64,
}

impl Default for InvasionConfig {
    fn default() -> Self {
        Self {
            infrastructure_loss: 0.50,
            iu_destroyed_ratio: 0.25,
            blitz_margin: 1.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CombatConfig {
    /// A unit hits when `d10 + CER >= target_number`.
    pub target_number: i32,
    pub ambush_bonus: i32,
    pub scout_bonus: i32,
    pub starbase_bonus: i32,
    /// CER per WEP tech level, capped below.
    pub tech_cer_weight: i32,
    pub tech_cer_cap: i32,
    /// CER adjustment per morale level, Collapsing..Exultant.
    pub morale_cer: Vec<i32>,
    pub max_rounds: u32,
    /// Damage-less rounds before the desperation bonus engages.
    pub desperation_rounds: u32,
    pub desperation_bonus: i32,
    /// Target bucket priority per attacker role.
    pub targeting: BTreeMap<ShipRole, Vec<TargetBucket>>,
    pub bombardment: BombardmentConfig,
    pub invasion: InvasionConfig,
}

impl Default for CombatConfig {
    fn default() -> Self {
        use TargetBucket::*;
        let mut targeting = BTreeMap::new();
        targeting.insert(ShipRole::Capital, vec![Capital, Escort, SpecialWeapon, Auxiliary, Fighter]);
        targeting.insert(ShipRole::Escort, vec![Fighter, Escort, Capital, SpecialWeapon, Auxiliary]);
        targeting.insert(ShipRole::Auxiliary, vec![Auxiliary, Escort, Fighter, Capital, SpecialWeapon]);
        targeting.insert(ShipRole::SpecialWeapon, vec![Capital, Escort, SpecialWeapon, Auxiliary, Fighter]);
        targeting.insert(ShipRole::Fighter, vec![Fighter, Capital, Escort, SpecialWeapon, Auxiliary]);
        targeting.insert(ShipRole::Scout, vec![Auxiliary, Fighter, Escort, Capital, SpecialWeapon]);
        targeting.insert(ShipRole::Spacelift, vec![Auxiliary, Fighter, Escort, Capital, SpecialWeapon]);

        Self {
            target_number: 7,
            ambush_bonus: 2,
            scout_bonus: 1,
            starbase_bonus: 2,
            tech_cer_weight: 1,
            tech_cer_cap: 3,
            morale_cer: vec![-2, -1, -1, 0, 1, 1, 2],
            max_rounds: 12,
            desperation_rounds: 5,
            desperation_bonus: 2,
            targeting,
            bombardment: BombardmentConfig::default(),
            invasion: InvasionConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Construction, ships, ground units, facilities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConstructionConfig {
    /// Docking slots (one active project each) granted per spaceport.
    pub spaceport_slots: u32,
    /// Docking slots granted per shipyard.
    pub shipyard_slots: u32,
    /// PP applied to each active project per Maintenance Phase.
    pub progress_per_turn: u32,
}

impl Default for ConstructionConfig {
    fn default() -> Self {
        Self {
            spaceport_slots: 5,
            shipyard_slots: 10,
            progress_per_turn: 20,
        }
    }
}

/// A ship class definition. Referenced from orders and builds by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShipClassConfig {
    pub role: ShipRole,
    pub attack: u32,
    pub defense: u32,
    pub crippled_defense: u32,
    /// Production Cost; also the salvage base.
    pub cost: u32,
    pub maintenance: u32,
    #[serde(default)]
    pub cargo_capacity: u32,
    #[serde(default)]
    pub carrier_capacity: u32,
    /// Raiders can open undetected in the Ambush phase.
    #[serde(default)]
    pub raider: bool,
    /// Planet-Breakers bypass planetary shields during bombardment.
    #[serde(default)]
    pub planet_breaker: bool,
    /// Minimum CST tech level to lay down this hull.
    #[serde(default)]
    pub min_cst: u8,
}

fn default_ship_classes() -> BTreeMap<String, ShipClassConfig> {
    let mut ships = BTreeMap::new();
    let mut class = |name: &str, cfg: ShipClassConfig| {
        ships.insert(name.to_string(), cfg);
    };
    class("Scout", ShipClassConfig {
        role: ShipRole::Scout,
        attack: 1, defense: 2, crippled_defense: 1,
        cost: 15, maintenance: 1,
        cargo_capacity: 0, carrier_capacity: 0,
        raider: false, planet_breaker: false, min_cst: 0,
    });
    class("Corvette", ShipClassConfig {
        role: ShipRole::Escort,
        attack: 2, defense: 2, crippled_defense: 1,
        cost: 20, maintenance: 1,
        cargo_capacity: 0, carrier_capacity: 0,
        raider: false, planet_breaker: false, min_cst: 0,
    });
    class("Destroyer", ShipClassConfig {
        role: ShipRole::Escort,
        attack: 5, defense: 4, crippled_defense: 2,
        cost: 40, maintenance: 2,
        cargo_capacity: 0, carrier_capacity: 0,
        raider: false, planet_breaker: false, min_cst: 1,
    });
    class("Cruiser", ShipClassConfig {
        role: ShipRole::Capital,
        attack: 8, defense: 6, crippled_defense: 3,
        cost: 80, maintenance: 4,
        cargo_capacity: 0, carrier_capacity: 0,
        raider: false, planet_breaker: false, min_cst: 2,
    });
    class("Battleship", ShipClassConfig {
        role: ShipRole::Capital,
        attack: 12, defense: 10, crippled_defense: 5,
        cost: 150, maintenance: 7,
        cargo_capacity: 0, carrier_capacity: 0,
        raider: false, planet_breaker: false, min_cst: 3,
    });
    class("Carrier", ShipClassConfig {
        role: ShipRole::Capital,
        attack: 4, defense: 8, crippled_defense: 4,
        cost: 120, maintenance: 6,
        cargo_capacity: 0, carrier_capacity: 4,
        raider: false, planet_breaker: false, min_cst: 3,
    });
    class("Fighter", ShipClassConfig {
        role: ShipRole::Fighter,
        attack: 3, defense: 1, crippled_defense: 0,
        cost: 10, maintenance: 1,
        cargo_capacity: 0, carrier_capacity: 0,
        raider: false, planet_breaker: false, min_cst: 0,
    });
    class("Raider", ShipClassConfig {
        role: ShipRole::Escort,
        attack: 5, defense: 3, crippled_defense: 1,
        cost: 55, maintenance: 3,
        cargo_capacity: 0, carrier_capacity: 0,
        raider: true, planet_breaker: false, min_cst: 2,
    });
    class("PlanetBreaker", ShipClassConfig {
        role: ShipRole::SpecialWeapon,
        attack: 20, defense: 8, crippled_defense: 4,
        cost: 300, maintenance: 12,
        cargo_capacity: 0, carrier_capacity: 0,
        raider: false, planet_breaker: true, min_cst: 5,
    });
    class("ETAC", ShipClassConfig {
        role: ShipRole::Spacelift,
        attack: 0, defense: 1, crippled_defense: 0,
        cost: 60, maintenance: 2,
        cargo_capacity: 50, carrier_capacity: 0,
        raider: false, planet_breaker: false, min_cst: 0,
    });
    class("TroopTransport", ShipClassConfig {
        role: ShipRole::Spacelift,
        attack: 0, defense: 2, crippled_defense: 1,
        cost: 70, maintenance: 2,
        cargo_capacity: 100, carrier_capacity: 0,
        raider: false, planet_breaker: false, min_cst: 1,
    });
    ships
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroundUnitClassConfig {
    pub attack: u32,
    pub defense: u32,
    pub cost: u32,
    pub maintenance: u32,
}

fn default_ground_units() -> BTreeMap<GroundUnitClass, GroundUnitClassConfig> {
    [
        (GroundUnitClass::Army, GroundUnitClassConfig { attack: 4, defense: 4, cost: 25, maintenance: 1 }),
        (GroundUnitClass::Marine, GroundUnitClassConfig { attack: 6, defense: 3, cost: 30, maintenance: 1 }),
        (GroundUnitClass::GroundBattery, GroundUnitClassConfig { attack: 5, defense: 6, cost: 35, maintenance: 1 }),
        (GroundUnitClass::PlanetaryShield, GroundUnitClassConfig { attack: 0, defense: 10, cost: 90, maintenance: 3 }),
    ]
    .into_iter()
    .collect()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FacilityClassConfig {
    pub cost: u32,
    pub maintenance: u32,
}

fn default_facilities() -> BTreeMap<FacilityKind, FacilityClassConfig> {
    [
        (FacilityKind::Spaceport, FacilityClassConfig { cost: 80, maintenance: 2 }),
        (FacilityKind::Shipyard, FacilityClassConfig { cost: 160, maintenance: 4 }),
        (FacilityKind::Starbase, FacilityClassConfig { cost: 240, maintenance: 6 }),
    ]
    .into_iter()
    .collect()
}

// ---------------------------------------------------------------------------
// Prestige, diplomacy, espionage, tech
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrestigeConfig {
    pub awards: BTreeMap<PrestigeSource, i64>,
    pub victory_threshold: i64,
    /// Consecutive turns below zero prestige before DefensiveCollapse.
    pub collapse_turns: u8,
    /// Six ascending boundaries dividing prestige into seven morale levels.
    pub morale_thresholds: Vec<i64>,
    /// Tax efficiency per morale level, Collapsing..Exultant.
    pub morale_tax_efficiency: Vec<f64>,
}

impl Default for PrestigeConfig {
    fn default() -> Self {
        let awards = [
            (PrestigeSource::CombatVictory, 15),
            (PrestigeSource::CombatDefeat, -5),
            (PrestigeSource::ColonyFounded, 10),
            (PrestigeSource::TechBreakthrough, 5),
            (PrestigeSource::PactBroken, -20),
            (PrestigeSource::EspionageExposed, -10),
            (PrestigeSource::InvasionSuccess, 20),
            (PrestigeSource::BlitzSuccess, 30),
            // Tax and shortfall penalties are computed per turn; the event
            // carries the amount.
            (PrestigeSource::HighTaxes, 0),
            (PrestigeSource::MaintenanceShortfall, 0),
        ]
        .into_iter()
        .collect();
        Self {
            awards,
            victory_threshold: 5000,
            collapse_turns: 3,
            morale_thresholds: vec![-50, 0, 50, 150, 400, 1000],
            morale_tax_efficiency: vec![0.70, 0.85, 0.95, 1.00, 1.05, 1.10, 1.15],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiplomacyConfig {
    /// Turns an Enemy relation must stand before Normalize is accepted.
    pub normalize_cooldown: u32,
    /// Violations older than this many turns stop counting.
    pub violation_window: u32,
    pub dishonored_threshold: u32,
    pub isolated_threshold: u32,
    pub dishonored_duration: u32,
    pub isolated_duration: u32,
}

impl Default for DiplomacyConfig {
    fn default() -> Self {
        Self {
            normalize_cooldown: 3,
            violation_window: 10,
            dishonored_threshold: 2,
            isolated_threshold: 4,
            dishonored_duration: 5,
            isolated_duration: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct EspionageActionConfig {
    pub cost: u32,
    /// Turns the effect persists; 0 means instantaneous.
    pub duration: u32,
    /// Effect strength, interpreted per action.
    pub magnitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EspionageConfig {
    /// PP per EBP.
    pub ebp_rate: u32,
    /// PP per CIP.
    pub cip_rate: u32,
    /// Fraction of the projected treasury the combined EBP+CIP investment
    /// may claim during budget reservation.
    pub budget_fraction: f64,
    /// Points per turn beyond which the over-investment penalty applies.
    pub overinvestment_threshold: u32,
    pub overinvestment_prestige_penalty: i64,
    pub actions: BTreeMap<EspionageAction, EspionageActionConfig>,
    pub detection_base: f64,
    /// Detection shift per level of (defender CIC − attacker ELI).
    pub detection_step: f64,
    pub detection_min: f64,
    pub detection_max: f64,
    /// Effective defender ELI bonus from a starbase in the target system.
    pub starbase_eli_bonus: u8,
    pub scout_destruction_chance: f64,
}

impl Default for EspionageConfig {
    fn default() -> Self {
        let actions = [
            (EspionageAction::TechTheft, EspionageActionConfig { cost: 8, duration: 0, magnitude: 1.0 }),
            (EspionageAction::SabotageLow, EspionageActionConfig { cost: 5, duration: 0, magnitude: 0.10 }),
            (EspionageAction::SabotageHigh, EspionageActionConfig { cost: 12, duration: 0, magnitude: 0.25 }),
            (EspionageAction::Assassination, EspionageActionConfig { cost: 15, duration: 0, magnitude: 1.0 }),
            (EspionageAction::CyberAttack, EspionageActionConfig { cost: 10, duration: 2, magnitude: 0.15 }),
            (EspionageAction::EconomicManipulation, EspionageActionConfig { cost: 12, duration: 3, magnitude: 0.20 }),
            (EspionageAction::PsyopsCampaign, EspionageActionConfig { cost: 10, duration: 3, magnitude: 0.15 }),
        ]
        .into_iter()
        .collect();
        Self {
            ebp_rate: 10,
            cip_rate: 10,
            budget_fraction: 0.10,
            overinvestment_threshold: 25,
            overinvestment_prestige_penalty: -3,
            actions,
            detection_base: 0.30,
            detection_step: 0.08,
            detection_min: 0.05,
            detection_max: 0.95,
            starbase_eli_bonus: 2,
            scout_destruction_chance: 0.50,
        }
    }
}

/// Level-cost curve with a kink: `base + step × level` up to the kink
/// level, then `step_after` per level beyond it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpgradeCurve {
    pub base: u32,
    pub step: u32,
    pub kink_level: u8,
    pub step_after: u32,
}

impl UpgradeCurve {
    /// PP cost to reach `level` from the level below it.
    pub fn cost(&self, level: u8) -> u32 {
        let kink = u32::from(self.kink_level);
        let level = u32::from(level);
        if level <= kink {
            self.base + self.step * level
        } else {
            self.base + self.step * kink + self.step_after * (level - kink)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TechConfig {
    pub el_curve: UpgradeCurve,
    pub sl_curve: UpgradeCurve,
    /// Curve for every other research track.
    pub field_curve: UpgradeCurve,
    /// Research may claim at most this fraction of the projected treasury.
    pub research_cap_fraction: f64,
    /// Multiplier applied to the packet's tech priority when reserving.
    pub tech_priority_rate: f64,
}

impl Default for TechConfig {
    fn default() -> Self {
        let standard = UpgradeCurve {
            base: 40,
            step: 10,
            kink_level: 5,
            step_after: 15,
        };
        Self {
            el_curve: standard,
            sl_curve: standard,
            field_curve: UpgradeCurve {
                base: 30,
                step: 10,
                kink_level: 5,
                step_after: 15,
            },
            research_cap_fraction: 0.25,
            tech_priority_rate: 0.30,
        }
    }
}

// ---------------------------------------------------------------------------
// Gameplay
// ---------------------------------------------------------------------------

/// Per-act budget allocation for order sources. Shares must sum to 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BudgetAllocation {
    pub military: f64,
    pub tech: f64,
    pub espionage: f64,
    pub expansion: f64,
}

impl BudgetAllocation {
    pub fn total(&self) -> f64 {
        self.military + self.tech + self.espionage + self.expansion
    }
}

/// AI personality traits consumed by external order sources; validated here
/// because they ship in the same config surface.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PersonalityTraits {
    pub aggression: f64,
    pub risk_tolerance: f64,
    pub expansionism: f64,
    pub loyalty: f64,
}

/// Intel staleness thresholds, in turns, per record kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IntelStaleness {
    pub system: u32,
    pub colony: u32,
    pub fleet: u32,
    pub house: u32,
}

impl Default for IntelStaleness {
    fn default() -> Self {
        Self {
            system: 10,
            colony: 8,
            fleet: 3,
            house: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameplayConfig {
    /// Maximum PU per planet class.
    pub planet_max_pu: BTreeMap<PlanetClass, u32>,
    /// Jumps per turn on Major lanes through friendly systems.
    pub major_jumps_per_turn: u32,
    /// Budget allocation per game act, keyed "early"/"mid"/"late".
    pub act_budgets: BTreeMap<String, BudgetAllocation>,
    pub personalities: BTreeMap<String, PersonalityTraits>,
    /// Fleet composition doctrine → ship class → share; shares sum to 1.
    pub fleet_composition: BTreeMap<String, BTreeMap<String, f64>>,
    /// Terraforming is permitted only if the remaining projected treasury
    /// exceeds this reserve after other reservations.
    pub terraform_reserve: i64,
    pub terraform_cost: u32,
    pub intel_staleness: IntelStaleness,
    /// Starbase surveillance reaches systems within this many lane jumps.
    pub starbase_surveillance_radius: u32,
    pub starting_treasury: i64,
    pub starting_population: u32,
    pub starting_industrial: u32,
}

impl Default for GameplayConfig {
    fn default() -> Self {
        let planet_max_pu = [
            (PlanetClass::Eden, 500),
            (PlanetClass::Terran, 400),
            (PlanetClass::Ocean, 350),
            (PlanetClass::Arid, 300),
            (PlanetClass::Tundra, 250),
            (PlanetClass::Barren, 150),
            (PlanetClass::Extreme, 100),
        ]
        .into_iter()
        .collect();

        let act_budgets = [
            ("early".to_string(), BudgetAllocation { military: 0.25, tech: 0.30, espionage: 0.05, expansion: 0.40 }),
            ("mid".to_string(), BudgetAllocation { military: 0.40, tech: 0.25, espionage: 0.10, expansion: 0.25 }),
            ("late".to_string(), BudgetAllocation { military: 0.55, tech: 0.15, espionage: 0.15, expansion: 0.15 }),
        ]
        .into_iter()
        .collect();

        let personalities = [
            ("warlord".to_string(), PersonalityTraits { aggression: 0.9, risk_tolerance: 0.7, expansionism: 0.6, loyalty: 0.3 }),
            ("builder".to_string(), PersonalityTraits { aggression: 0.2, risk_tolerance: 0.3, expansionism: 0.8, loyalty: 0.7 }),
            ("schemer".to_string(), PersonalityTraits { aggression: 0.5, risk_tolerance: 0.5, expansionism: 0.4, loyalty: 0.2 }),
        ]
        .into_iter()
        .collect();

        let mut balanced = BTreeMap::new();
        balanced.insert("Destroyer".to_string(), 0.40);
        balanced.insert("Cruiser".to_string(), 0.30);
        balanced.insert("Fighter".to_string(), 0.20);
        balanced.insert("Scout".to_string(), 0.10);
        let mut fleet_composition = BTreeMap::new();
        fleet_composition.insert("balanced".to_string(), balanced);

        Self {
            planet_max_pu,
            major_jumps_per_turn: 2,
            act_budgets,
            personalities,
            fleet_composition,
            terraform_reserve: 200,
            terraform_cost: 150,
            intel_staleness: IntelStaleness::default(),
            starbase_surveillance_radius: 1,
            starting_treasury: 500,
            starting_population: 100,
            starting_industrial: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    pub economy: EconomyConfig,
    pub combat: CombatConfig,
    pub construction: ConstructionConfig,
    pub ships: BTreeMap<String, ShipClassConfig>,
    pub ground_units: BTreeMap<GroundUnitClass, GroundUnitClassConfig>,
    pub facilities: BTreeMap<FacilityKind, FacilityClassConfig>,
    pub prestige: PrestigeConfig,
    pub diplomacy: DiplomacyConfig,
    pub espionage: EspionageConfig,
    pub tech: TechConfig,
    pub gameplay: GameplayConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            economy: EconomyConfig::default(),
            combat: CombatConfig::default(),
            construction: ConstructionConfig::default(),
            ships: default_ship_classes(),
            ground_units: default_ground_units(),
            facilities: default_facilities(),
            prestige: PrestigeConfig::default(),
            diplomacy: DiplomacyConfig::default(),
            espionage: EspionageConfig::default(),
            tech: TechConfig::default(),
            gameplay: GameplayConfig::default(),
        }
    }
}

impl GameConfig {
    /// Load a config file, merging it over the compiled-in defaults and
    /// validating the result. Any failure rejects the load outright.
    pub fn load(path: &Path) -> Result<GameConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailure(format!("{}: {e}", path.display())))?;
        let config: GameConfig = toml::from_str(&contents)
            .map_err(|e| ConfigError::LoadFailure(format!("{}: {e}", path.display())))?;
        config.validate()?;
        log::info!("loaded game config from {}", path.display());
        Ok(config)
    }

    /// Validate every range and sum constraint. Called by `load`; also used
    /// directly on programmatic configs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn ratio(name: &str, value: f64) -> Result<(), ConfigError> {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationFailure(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
            Ok(())
        }

        for (class, row) in &self.economy.raw_index {
            for (rating, value) in row {
                if *value <= 0.0 || *value > 2.0 {
                    return Err(ConfigError::ValidationFailure(format!(
                        "raw_index[{class:?}][{rating:?}] out of range: {value}"
                    )));
                }
            }
        }
        ratio("economy.el_modifier_cap", self.economy.el_modifier_cap)?;
        ratio("economy.production_growth", self.economy.production_growth)?;
        ratio("economy.salvage_rate", self.economy.salvage_rate)?;
        ratio("economy.transfer_jump_surcharge", self.economy.transfer_jump_surcharge)?;
        ratio("economy.reserve_maintenance_factor", self.economy.reserve_maintenance_factor)?;
        ratio("economy.mothball_maintenance_factor", self.economy.mothball_maintenance_factor)?;
        if self.economy.iu_cost_base == 0 {
            return Err(ConfigError::ValidationFailure(
                "economy.iu_cost_base must be positive".to_string(),
            ));
        }
        if self.economy.iu_cost_multiplier_min < 1.0
            || self.economy.iu_cost_multiplier_max < self.economy.iu_cost_multiplier_min
            || self.economy.iu_cost_multiplier_max > 2.5
        {
            return Err(ConfigError::ValidationFailure(
                "economy.iu_cost_multiplier bounds must satisfy 1.0 <= min <= max <= 2.5"
                    .to_string(),
            ));
        }
        if self.economy.shortfall_penalties.is_empty() {
            return Err(ConfigError::ValidationFailure(
                "economy.shortfall_penalties must not be empty".to_string(),
            ));
        }

        ratio("combat.bombardment.shield_block_chance_per_level",
            self.combat.bombardment.shield_block_chance_per_level)?;
        ratio("combat.bombardment.shield_block_chance_cap",
            self.combat.bombardment.shield_block_chance_cap)?;
        ratio("combat.bombardment.shield_block_percentage",
            self.combat.bombardment.shield_block_percentage)?;
        ratio("combat.invasion.infrastructure_loss", self.combat.invasion.infrastructure_loss)?;
        ratio("combat.invasion.iu_destroyed_ratio", self.combat.invasion.iu_destroyed_ratio)?;
        if self.combat.morale_cer.len() != Morale::all().len() {
            return Err(ConfigError::ValidationFailure(format!(
                "combat.morale_cer must have {} entries",
                Morale::all().len()
            )));
        }
        if self.combat.bombardment.iu_damage_divisor == 0
            || self.combat.bombardment.battery_damage_divisor == 0
        {
            return Err(ConfigError::ValidationFailure(
                "combat.bombardment damage divisors must be positive".to_string(),
            ));
        }

        for (name, ship) in &self.ships {
            if ship.cost == 0 {
                return Err(ConfigError::ValidationFailure(format!(
                    "ships.{name}.cost must be positive"
                )));
            }
        }
        if self.construction.spaceport_slots == 0
            || self.construction.shipyard_slots == 0
            || self.construction.progress_per_turn == 0
        {
            return Err(ConfigError::ValidationFailure(
                "construction slot and progress values must be positive".to_string(),
            ));
        }

        if self.prestige.morale_thresholds.len() != Morale::all().len() - 1 {
            return Err(ConfigError::ValidationFailure(format!(
                "prestige.morale_thresholds must have {} entries",
                Morale::all().len() - 1
            )));
        }
        if self.prestige.morale_tax_efficiency.len() != Morale::all().len() {
            return Err(ConfigError::ValidationFailure(format!(
                "prestige.morale_tax_efficiency must have {} entries",
                Morale::all().len()
            )));
        }
        if !self
            .prestige
            .morale_thresholds
            .windows(2)
            .all(|pair| pair[0] < pair[1])
        {
            return Err(ConfigError::ValidationFailure(
                "prestige.morale_thresholds must be strictly ascending".to_string(),
            ));
        }

        ratio("espionage.budget_fraction", self.espionage.budget_fraction)?;
        ratio("espionage.detection_base", self.espionage.detection_base)?;
        ratio("espionage.detection_min", self.espionage.detection_min)?;
        ratio("espionage.detection_max", self.espionage.detection_max)?;
        ratio("espionage.scout_destruction_chance", self.espionage.scout_destruction_chance)?;
        for action in EspionageAction::all() {
            if !self.espionage.actions.contains_key(action) {
                return Err(ConfigError::ValidationFailure(format!(
                    "espionage.actions missing entry for {action:?}"
                )));
            }
        }

        ratio("tech.research_cap_fraction", self.tech.research_cap_fraction)?;
        ratio("tech.tech_priority_rate", self.tech.tech_priority_rate)?;

        for (act, allocation) in &self.gameplay.act_budgets {
            let total = allocation.total();
            if (total - 1.0).abs() > RATIO_SUM_TOLERANCE {
                return Err(ConfigError::ValidationFailure(format!(
                    "gameplay.act_budgets.{act} shares sum to {total}, expected 1.0"
                )));
            }
            for (name, share) in [
                ("military", allocation.military),
                ("tech", allocation.tech),
                ("espionage", allocation.espionage),
                ("expansion", allocation.expansion),
            ] {
                ratio(&format!("gameplay.act_budgets.{act}.{name}"), share)?;
            }
        }
        for (name, traits) in &self.gameplay.personalities {
            for (field, value) in [
                ("aggression", traits.aggression),
                ("risk_tolerance", traits.risk_tolerance),
                ("expansionism", traits.expansionism),
                ("loyalty", traits.loyalty),
            ] {
                ratio(&format!("gameplay.personalities.{name}.{field}"), value)?;
            }
        }
        for (doctrine, shares) in &self.gameplay.fleet_composition {
            let total: f64 = shares.values().sum();
            if (total - 1.0).abs() > RATIO_SUM_TOLERANCE {
                return Err(ConfigError::ValidationFailure(format!(
                    "gameplay.fleet_composition.{doctrine} shares sum to {total}, expected 1.0"
                )));
            }
            for class in shares.keys() {
                if !self.ships.contains_key(class) {
                    return Err(ConfigError::ValidationFailure(format!(
                        "gameplay.fleet_composition.{doctrine} references unknown ship class {class}"
                    )));
                }
            }
        }
        for (class, &max_pu) in &self.gameplay.planet_max_pu {
            if max_pu == 0 {
                return Err(ConfigError::ValidationFailure(format!(
                    "gameplay.planet_max_pu[{class:?}] must be positive"
                )));
            }
        }

        Ok(())
    }

    // ----- Lookup helpers used throughout the kernels -----

    /// The RAW index for a world. Missing table entries fall back to the
    /// poorest grade rather than panicking mid-turn.
    pub fn raw_index(&self, class: PlanetClass, rating: ResourceRating) -> f64 {
        self.economy
            .raw_index
            .get(&class)
            .and_then(|row| row.get(&rating))
            .copied()
            .unwrap_or(0.60)
    }

    /// IU output multiplier from EL: `1.0 + min(EL × step, cap)`.
    pub fn el_modifier(&self, el: u8) -> f64 {
        1.0 + (f64::from(el) * self.economy.el_modifier_step).min(self.economy.el_modifier_cap)
    }

    /// High-tax prestige penalty for a rolling-average tax rate.
    pub fn tax_penalty(&self, rolling_average: f64) -> i64 {
        self.economy
            .high_tax_bands
            .iter()
            .filter(|band| rolling_average > band.above)
            .map(|band| band.penalty)
            .min()
            .unwrap_or(0)
    }

    /// Cost of one IU at the colony's current population load.
    pub fn iu_cost(&self, population: u32, max_pu: u32) -> u32 {
        let load = if max_pu == 0 {
            1.0
        } else {
            f64::from(population) / f64::from(max_pu)
        };
        let spread = self.economy.iu_cost_multiplier_max - self.economy.iu_cost_multiplier_min;
        let multiplier = (self.economy.iu_cost_multiplier_min + spread * load)
            .clamp(self.economy.iu_cost_multiplier_min, self.economy.iu_cost_multiplier_max);
        (f64::from(self.economy.iu_cost_base) * multiplier).round() as u32
    }

    pub fn max_pu(&self, class: PlanetClass) -> u32 {
        self.gameplay.planet_max_pu.get(&class).copied().unwrap_or(100)
    }

    pub fn ship_class(&self, name: &str) -> Option<&ShipClassConfig> {
        self.ships.get(name)
    }

    /// Morale level for a prestige total.
    pub fn morale_for_prestige(&self, prestige: i64) -> Morale {
        let levels = Morale::all();
        for (index, threshold) in self.prestige.morale_thresholds.iter().enumerate() {
            if prestige < *threshold {
                return levels[index];
            }
        }
        levels[levels.len() - 1]
    }

    /// Probability that a defender detects an espionage action.
    pub fn detection_probability(&self, attacker_eli: u8, defender_cic: u8) -> f64 {
        let diff = f64::from(defender_cic) - f64::from(attacker_eli);
        (self.espionage.detection_base + self.espionage.detection_step * diff)
            .clamp(self.espionage.detection_min, self.espionage.detection_max)
    }
}

// ---------------------------------------------------------------------------
// Process-global handle
// ---------------------------------------------------------------------------

static GLOBAL: RwLock<Option<Arc<GameConfig>>> = RwLock::new(None);

/// Install (or atomically replace, for tests) the process-global config.
pub fn install(config: GameConfig) {
    let mut slot = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    *slot = Some(Arc::new(config));
}

/// The process-global config handle. Defaults are served until `install`
/// runs. The turn pipeline receives its handle up front and never re-reads
/// the global mid-turn.
pub fn global() -> Arc<GameConfig> {
    let slot = GLOBAL.read().unwrap_or_else(PoisonError::into_inner);
    match slot.as_ref() {
        Some(config) => Arc::clone(config),
        None => Arc::new(GameConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_validate() {
        GameConfig::default().validate().expect("defaults must validate");
    }

    #[test]
    fn raw_index_boundary_values() {
        let config = GameConfig::default();
        assert!((config.raw_index(PlanetClass::Eden, ResourceRating::Abundant) - 1.00).abs() < 1e-9);
        assert!((config.raw_index(PlanetClass::Extreme, ResourceRating::VeryPoor) - 0.60).abs() < 1e-9);
    }

    #[test]
    fn el_modifier_caps_at_one_point_five() {
        let config = GameConfig::default();
        assert!((config.el_modifier(1) - 1.05).abs() < 1e-9);
        assert!((config.el_modifier(10) - 1.50).abs() < 1e-9);
        assert!((config.el_modifier(40) - 1.50).abs() < 1e-9);
    }

    #[test]
    fn upgrade_curve_kinks_after_level_five() {
        let curve = GameConfig::default().tech.el_curve;
        assert_eq!(curve.cost(5), 90);
        assert_eq!(curve.cost(6), 105);
        assert_eq!(curve.cost(7), 120);
    }

    #[test]
    fn tax_penalty_ladder() {
        let config = GameConfig::default();
        assert_eq!(config.tax_penalty(50.0), 0);
        assert_eq!(config.tax_penalty(55.0), -1);
        assert_eq!(config.tax_penalty(65.0), -2);
        assert_eq!(config.tax_penalty(75.0), -4);
        assert_eq!(config.tax_penalty(85.0), -7);
        assert_eq!(config.tax_penalty(95.0), -11);
    }

    #[test]
    fn iu_cost_multiplier_stays_in_bounds() {
        let config = GameConfig::default();
        let empty = config.iu_cost(0, 400);
        let full = config.iu_cost(400, 400);
        assert_eq!(empty, config.economy.iu_cost_base);
        assert_eq!(full, (f64::from(config.economy.iu_cost_base) * 2.5).round() as u32);
    }

    #[test]
    fn bad_budget_allocation_rejected() {
        let mut config = GameConfig::default();
        config.gameplay.act_budgets.insert(
            "early".to_string(),
            BudgetAllocation { military: 0.9, tech: 0.9, espionage: 0.0, expansion: 0.0 },
        );
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailure(_))
        ));
    }

    #[test]
    fn load_merges_over_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[combat]\ntarget_number = 8\n").expect("write");
        let config = GameConfig::load(file.path()).expect("load");
        assert_eq!(config.combat.target_number, 8);
        // Untouched sections keep their defaults.
        assert_eq!(config.construction.shipyard_slots, 10);
    }

    #[test]
    fn load_rejects_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[economy]\nsalvage_rate = 3.0\n").expect("write");
        assert!(GameConfig::load(file.path()).is_err());
    }

    #[test]
    fn morale_ladder_covers_prestige_range() {
        let config = GameConfig::default();
        assert_eq!(config.morale_for_prestige(-100), Morale::Collapsing);
        assert_eq!(config.morale_for_prestige(-10), Morale::Shaken);
        assert_eq!(config.morale_for_prestige(10), Morale::Uneasy);
        assert_eq!(config.morale_for_prestige(100), Morale::Steady);
        assert_eq!(config.morale_for_prestige(200), Morale::Content);
        assert_eq!(config.morale_for_prestige(500), Morale::High);
        assert_eq!(config.morale_for_prestige(2000), Morale::Exultant);
    }

    #[test]
    fn detection_probability_clamps() {
        let config = GameConfig::default();
        let low = config.detection_probability(10, 0);
        let high = config.detection_probability(0, 10);
        assert!((low - config.espionage.detection_min).abs() < 1e-9);
        assert!((high - config.espionage.detection_max).abs() < 1e-9);
    }
}
