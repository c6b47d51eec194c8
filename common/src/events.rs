//! Turn events and per-house reports for EC4X
//!
//! Every phase appends to the turn's [`EventLog`] in emission order; the
//! intelligence DB and the fog filter consume the log at phase boundaries.
//! Event variants are closed and grouped by concern.

use serde::{Deserialize, Serialize};

use crate::errors::OrderError;
use crate::ids::{ColonyId, FleetId, HouseId, ShipId, SystemId};
use crate::types::{DiplomaticStanding, PlanetClass, TechField};

/// Which order list a rejection refers to.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum OrderKind {
    Fleet,
    Build,
    Research,
    Diplomatic,
    Espionage,
    Investment,
    Transfer,
    Squadron,
    Cargo,
    Terraform,
}

/// A rejected order with its reason code. The packet is not atomic: other
/// orders in the same packet still execute.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RejectedOrder {
    pub kind: OrderKind,
    pub index: usize,
    pub reason: OrderError,
}

/// Sources of prestige change. Amounts come from config; escalating
/// penalties (tax, shortfall) carry their computed amount on the event.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum PrestigeSource {
    CombatVictory,
    CombatDefeat,
    ColonyFounded,
    TechBreakthrough,
    HighTaxes,
    MaintenanceShortfall,
    PactBroken,
    EspionageExposed,
    InvasionSuccess,
    BlitzSuccess,
}

/// How an engagement ended.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum CombatOutcome {
    AttackerVictory,
    DefenderVictory,
    MutualDestruction,
    AttackerRetreat,
    DefenderRetreat,
    Stalemate,
    /// Malformed setup (e.g. both sides empty); nothing happened.
    NoContact,
}

/// Why a house left the game.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum EliminationReason {
    /// Prestige below zero for the configured number of consecutive turns.
    DefensiveCollapse,
    /// Last colony lost.
    Landless,
}

/// Espionage action catalogue.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum EspionageAction {
    TechTheft,
    SabotageLow,
    SabotageHigh,
    Assassination,
    CyberAttack,
    EconomicManipulation,
    PsyopsCampaign,
}

impl EspionageAction {
    pub fn all() -> &'static [EspionageAction] {
        &[
            EspionageAction::TechTheft,
            EspionageAction::SabotageLow,
            EspionageAction::SabotageHigh,
            EspionageAction::Assassination,
            EspionageAction::CyberAttack,
            EspionageAction::EconomicManipulation,
            EspionageAction::PsyopsCampaign,
        ]
    }
}

/// One entry in the turn's event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    // ========== Orders ==========
    OrderRejected {
        house: HouseId,
        rejection: RejectedOrder,
    },

    // ========== Economy ==========
    IncomeCollected {
        house: HouseId,
        gco: i64,
        ncv: i64,
    },
    PopulationGrowth {
        colony: ColonyId,
        amount: u32,
    },
    ConstructionStarted {
        house: HouseId,
        colony: ColonyId,
        item: String,
    },
    ConstructionCompleted {
        house: HouseId,
        colony: ColonyId,
        item: String,
    },
    ResearchAdvanced {
        house: HouseId,
        field: TechField,
        new_level: u8,
    },
    MaintenancePaid {
        house: HouseId,
        amount: i64,
    },
    MaintenanceShortfall {
        house: HouseId,
        consecutive: u8,
        shortfall: i64,
    },
    FleetDisbanded {
        house: HouseId,
        fleet: FleetId,
        salvage: i64,
    },
    AssetStripped {
        house: HouseId,
        colony: ColonyId,
        asset: String,
        salvage: i64,
    },
    TransferStarted {
        house: HouseId,
        from: ColonyId,
        to: ColonyId,
        ptus: u32,
        eta: u32,
    },
    TransferDelivered {
        house: HouseId,
        colony: ColonyId,
        ptus: u32,
    },
    TransferLost {
        house: HouseId,
        ptus: u32,
        reason: String,
    },
    TerraformCompleted {
        house: HouseId,
        colony: ColonyId,
        new_class: PlanetClass,
    },

    // ========== Movement & expansion ==========
    FleetMoved {
        house: HouseId,
        fleet: FleetId,
        from: SystemId,
        to: SystemId,
    },
    ColonyFounded {
        house: HouseId,
        colony: ColonyId,
        system: SystemId,
    },

    // ========== Combat ==========
    CombatResolved {
        system: SystemId,
        participants: Vec<HouseId>,
        outcome: CombatOutcome,
    },
    ColonyCaptured {
        system: SystemId,
        colony: ColonyId,
        from: HouseId,
        to: HouseId,
    },

    // ========== Diplomacy (public) ==========
    PactProposed {
        from: HouseId,
        to: HouseId,
    },
    PactFormed {
        a: HouseId,
        b: HouseId,
    },
    PactBroken {
        breaker: HouseId,
        victim: HouseId,
    },
    WarDeclared {
        by: HouseId,
        on: HouseId,
    },
    RelationsNormalized {
        a: HouseId,
        b: HouseId,
    },
    StandingChanged {
        house: HouseId,
        standing: DiplomaticStanding,
    },

    // ========== Espionage ==========
    EspionageLaunched {
        attacker: HouseId,
        target: HouseId,
        action: EspionageAction,
    },
    EspionageDetected {
        attacker: HouseId,
        defender: HouseId,
        action: EspionageAction,
        scout_destroyed: bool,
    },
    EspionageEffectExpired {
        house: HouseId,
        action: EspionageAction,
    },

    // ========== Prestige & victory ==========
    PrestigeAwarded {
        house: HouseId,
        source: PrestigeSource,
        amount: i64,
        total: i64,
    },
    HouseEliminated {
        house: HouseId,
        reason: EliminationReason,
    },
    VictoryAchieved {
        house: HouseId,
        prestige: i64,
    },
}

/// Append-only event log for a single turn. Emission order is part of the
/// engine's determinism contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EventLog {
    pub turn: u32,
    pub events: Vec<Event>,
}

impl EventLog {
    pub fn new(turn: u32) -> Self {
        Self {
            turn,
            events: Vec::new(),
        }
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

// ========== Per-house reports ==========

/// Income Phase result for one house. `ncv_total` always equals the sum of
/// the per-colony NCV entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct IncomeReport {
    pub gco_total: i64,
    pub ncv_total: i64,
    /// Per-colony (gross output, net value).
    pub colonies: Vec<(ColonyId, i64, i64)>,
}

/// Prestige movement over the turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PrestigeReport {
    pub start: i64,
    pub entries: Vec<(PrestigeSource, i64)>,
    pub end: i64,
}

/// Bombardment tally attached to a combat report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BombardmentReport {
    pub rounds: u8,
    pub iu_destroyed: u32,
    pub batteries_destroyed: u32,
    pub pu_casualties: u32,
}

/// Ground assault tally attached to a combat report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroundReport {
    pub colony: ColonyId,
    pub blitz: bool,
    pub attacker_won: bool,
    pub attacker_losses: u32,
    pub defender_losses: u32,
}

/// After-action report, written once per combatant house with mirrored
/// labeling: own losses carry ship IDs, opponent losses only class names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CombatReport {
    pub system: SystemId,
    pub turn: u32,
    pub outcome: CombatOutcome,
    /// Own destroyed ships by ID and class.
    pub own_losses: Vec<(ShipId, String)>,
    /// Own crippled ships by ID and class.
    pub own_crippled: Vec<(ShipId, String)>,
    /// Opponent losses by class name only; IDs are withheld.
    pub enemy_losses: Vec<String>,
    pub enemy_crippled: Vec<String>,
    /// Friendly fleets that withdrew.
    pub retreated_own: Vec<FleetId>,
    /// Opposing retreat strength, by class name.
    pub retreated_enemy: Vec<String>,
    /// Surviving own combat ships.
    pub surviving_own: u32,
    /// Surviving opponent ships by class name.
    pub surviving_enemy: Vec<String>,
    pub bombardment: Option<BombardmentReport>,
    pub ground: Option<GroundReport>,
}

/// Everything one house learns from a resolved turn, beside the state delta.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TurnReport {
    pub turn: u32,
    pub income: IncomeReport,
    pub prestige: PrestigeReport,
    pub combat: Vec<CombatReport>,
    pub rejected: Vec<RejectedOrder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_preserves_emission_order() {
        let mut log = EventLog::new(3);
        log.push(Event::IncomeCollected {
            house: HouseId::new(1),
            gco: 152,
            ncv: 76,
        });
        log.push(Event::PopulationGrowth {
            colony: ColonyId::new(4),
            amount: 2,
        });
        assert_eq!(log.len(), 2);
        assert!(matches!(log.events[0], Event::IncomeCollected { .. }));
        assert!(matches!(log.events[1], Event::PopulationGrowth { .. }));
    }
}
