//! Order intake and validation for EC4X
//!
//! An external `OrderSource` hands the engine one raw [`OrderPacket`] per
//! house per turn. Validation runs authorization, shape, and capability
//! checks per order, then reserves budgets sequentially against the
//! projected treasury. Rejection is per-order with a specific reason code;
//! the packet is never atomic.

use serde::{Deserialize, Serialize};

use ec4x_common::config::GameConfig;
use ec4x_common::errors::OrderError;
use ec4x_common::events::{EspionageAction, OrderKind, RejectedOrder};
use ec4x_common::ids::{ColonyId, FleetId, HouseId, ShipId, SquadronId, SystemId};
use ec4x_common::types::{BuildItem, DiplomaticState, FacilityKind, TechField};
use ec4x_common::units::{CargoKind, FleetDirective, FleetStatus, ShipRole};

use crate::economy;
use crate::starmap::Starmap;
use crate::state::GameState;

// ---------------------------------------------------------------------------
// Raw packet
// ---------------------------------------------------------------------------

/// One fleet directive plus optional standing-order changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetOrder {
    pub fleet: FleetId,
    pub directive: FleetDirective,
    /// New Rules of Engagement, when the order changes it.
    pub roe: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildOrder {
    pub colony: ColonyId,
    pub item: BuildItem,
}

/// Research funding request: `priority` scales the treasury share claimed,
/// `focus` receives the banked PP.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ResearchOrder {
    pub priority: f64,
    pub focus: TechField,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DiplomaticOrder {
    ProposePact { with: HouseId },
    AcceptPact { from: HouseId },
    BreakPact { with: HouseId },
    DeclareEnemy { on: HouseId },
    Normalize { with: HouseId },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EspionageOrder {
    pub action: EspionageAction,
    pub target: HouseId,
}

/// Space-Guild population transfer request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferOrder {
    pub from: ColonyId,
    pub to: ColonyId,
    pub ptus: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SquadronOrder {
    /// Move a squadron to another fleet in the same system.
    TransferSquadron { squadron: SquadronId, to_fleet: FleetId },
    /// Move a spacelift ship to another fleet in the same system.
    TransferSpacelift { ship: ShipId, to_fleet: FleetId },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CargoOp {
    Load,
    Unload,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CargoOrder {
    pub ship: ShipId,
    pub op: CargoOp,
    pub kind: CargoKind,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TerraformOrder {
    pub colony: ColonyId,
}

/// The raw per-house order batch for one turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OrderPacket {
    pub house: HouseId,
    pub turn: u32,
    pub fleet_orders: Vec<FleetOrder>,
    pub build_orders: Vec<BuildOrder>,
    pub research: Option<ResearchOrder>,
    pub diplomatic: Vec<DiplomaticOrder>,
    pub espionage: Vec<EspionageOrder>,
    /// PP to convert into EBP.
    pub ebp_investment: u32,
    /// PP to convert into CIP.
    pub cip_investment: u32,
    pub population_transfers: Vec<TransferOrder>,
    pub squadron_management: Vec<SquadronOrder>,
    pub cargo_management: Vec<CargoOrder>,
    pub terraform_orders: Vec<TerraformOrder>,
}

// ---------------------------------------------------------------------------
// Validated output
// ---------------------------------------------------------------------------

/// A build order that passed checks, with its reserved cost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundedBuild {
    pub colony: ColonyId,
    pub item: BuildItem,
    pub cost: u32,
}

/// A transfer order that passed checks, with its reserved cost and ETA.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FundedTransfer {
    pub from: ColonyId,
    pub to: ColonyId,
    pub ptus: u32,
    pub cost: i64,
    pub transit_turns: u32,
}

/// The validator's product: authorized, shape-checked, funded orders plus
/// the per-order rejection report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ValidatedPacket {
    pub house: HouseId,
    pub fleet_orders: Vec<FleetOrder>,
    pub builds: Vec<FundedBuild>,
    pub research: Option<ResearchOrder>,
    /// PP reserved for research this turn.
    pub research_reserved: i64,
    pub diplomatic: Vec<DiplomaticOrder>,
    pub espionage: Vec<EspionageOrder>,
    pub ebp_investment: u32,
    pub cip_investment: u32,
    pub transfers: Vec<FundedTransfer>,
    pub squadron_management: Vec<SquadronOrder>,
    pub cargo_management: Vec<CargoOrder>,
    pub terraform: Vec<TerraformOrder>,
    pub rejected: Vec<RejectedOrder>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate one packet against the current state and reserve its budgets.
pub fn validate_packet(
    state: &GameState,
    config: &GameConfig,
    packet: &OrderPacket,
) -> ValidatedPacket {
    let store = &state.store;
    let mut out = ValidatedPacket {
        house: packet.house,
        ..ValidatedPacket::default()
    };

    let Some(house) = store.house(packet.house) else {
        // A packet from a nonexistent house rejects wholesale.
        out.rejected.push(RejectedOrder {
            kind: OrderKind::Fleet,
            index: 0,
            reason: OrderError::TargetInvalid(format!("unknown house {}", packet.house)),
        });
        return out;
    };
    if house.eliminated {
        out.rejected.push(RejectedOrder {
            kind: OrderKind::Fleet,
            index: 0,
            reason: OrderError::PrerequisiteMissing("house is eliminated".to_string()),
        });
        return out;
    }

    let map = Starmap::new(store);

    // ----- Fleet orders: authorization, shape, capability -----
    for (index, order) in packet.fleet_orders.iter().enumerate() {
        match check_fleet_order(state, packet.house, order) {
            Ok(()) => out.fleet_orders.push(order.clone()),
            Err(reason) => out.rejected.push(RejectedOrder {
                kind: OrderKind::Fleet,
                index,
                reason,
            }),
        }
    }

    // ----- Squadron management -----
    for (index, order) in packet.squadron_management.iter().enumerate() {
        match check_squadron_order(state, packet.house, order) {
            Ok(()) => out.squadron_management.push(*order),
            Err(reason) => out.rejected.push(RejectedOrder {
                kind: OrderKind::Squadron,
                index,
                reason,
            }),
        }
    }

    // ----- Cargo management -----
    for (index, order) in packet.cargo_management.iter().enumerate() {
        match check_cargo_order(state, packet.house, order) {
            Ok(()) => out.cargo_management.push(*order),
            Err(reason) => out.rejected.push(RejectedOrder {
                kind: OrderKind::Cargo,
                index,
                reason,
            }),
        }
    }

    // ----- Diplomatic orders -----
    for (index, order) in packet.diplomatic.iter().enumerate() {
        match check_diplomatic_order(state, packet.house, order) {
            Ok(()) => out.diplomatic.push(*order),
            Err(reason) => out.rejected.push(RejectedOrder {
                kind: OrderKind::Diplomatic,
                index,
                reason,
            }),
        }
    }

    // ----- Budget reservation, sequential -----
    let expected_income = economy::expected_income(store, house.id);
    let expected_maintenance = economy::expected_maintenance(store, config, house.id);
    let projected = (house.treasury + expected_income - expected_maintenance).max(0);
    let mut remaining = projected;

    // 1. Research claims up to min(priority × rate, cap) of the projection.
    if let Some(research) = packet.research {
        let priority = research.priority.clamp(0.0, 1.0);
        let fraction = (priority * config.tech.tech_priority_rate)
            .min(config.tech.research_cap_fraction);
        let reserved = ((projected as f64) * fraction).floor() as i64;
        out.research = Some(ResearchOrder { priority, ..research });
        out.research_reserved = reserved.min(remaining);
        remaining -= out.research_reserved;
    }

    // 2. Espionage claims a fixed share of the projection (not of the
    //    remainder) so research cannot starve it.
    let espionage_cap = ((projected as f64) * config.espionage.budget_fraction).floor() as i64;
    let requested = i64::from(packet.ebp_investment) + i64::from(packet.cip_investment);
    if requested > 0 {
        let granted = requested.min(espionage_cap).min(remaining);
        if granted < requested {
            out.rejected.push(RejectedOrder {
                kind: OrderKind::Investment,
                index: 0,
                reason: OrderError::InsufficientTreasury {
                    required: requested,
                    available: granted,
                },
            });
        }
        // Split the granted amount, EBP first.
        let ebp = granted.min(i64::from(packet.ebp_investment));
        let cip = (granted - ebp).min(i64::from(packet.cip_investment));
        out.ebp_investment = ebp as u32;
        out.cip_investment = cip as u32;
        remaining -= ebp + cip;
    }

    // 3. Builds claim from the remainder in evaluation order.
    for (index, order) in packet.build_orders.iter().enumerate() {
        match check_build_order(state, config, packet.house, order, &out.builds) {
            Ok(cost) => {
                if i64::from(cost) > remaining {
                    out.rejected.push(RejectedOrder {
                        kind: OrderKind::Build,
                        index,
                        reason: OrderError::InsufficientTreasury {
                            required: i64::from(cost),
                            available: remaining,
                        },
                    });
                } else {
                    remaining -= i64::from(cost);
                    out.builds.push(FundedBuild {
                        colony: order.colony,
                        item: order.item.clone(),
                        cost,
                    });
                }
            }
            Err(reason) => out.rejected.push(RejectedOrder {
                kind: OrderKind::Build,
                index,
                reason,
            }),
        }
    }

    // Population transfers claim from the remainder after builds.
    let mut in_flight = state
        .transfers
        .iter()
        .filter(|t| t.house == packet.house)
        .count() as u32;
    for (index, order) in packet.population_transfers.iter().enumerate() {
        match check_transfer_order(state, config, &map, packet.house, order, in_flight) {
            Ok(funded) => {
                if funded.cost > remaining {
                    out.rejected.push(RejectedOrder {
                        kind: OrderKind::Transfer,
                        index,
                        reason: OrderError::InsufficientTreasury {
                            required: funded.cost,
                            available: remaining,
                        },
                    });
                } else {
                    remaining -= funded.cost;
                    in_flight += 1;
                    out.transfers.push(funded);
                }
            }
            Err(reason) => out.rejected.push(RejectedOrder {
                kind: OrderKind::Transfer,
                index,
                reason,
            }),
        }
    }

    // 4. Terraforming only out of genuine surplus.
    for (index, order) in packet.terraform_orders.iter().enumerate() {
        match check_terraform_order(state, config, packet.house, order) {
            Ok(cost) => {
                if remaining - i64::from(cost) < config.gameplay.terraform_reserve {
                    out.rejected.push(RejectedOrder {
                        kind: OrderKind::Terraform,
                        index,
                        reason: OrderError::InsufficientTreasury {
                            required: i64::from(cost) + config.gameplay.terraform_reserve,
                            available: remaining,
                        },
                    });
                } else {
                    remaining -= i64::from(cost);
                    out.terraform.push(*order);
                }
            }
            Err(reason) => out.rejected.push(RejectedOrder {
                kind: OrderKind::Terraform,
                index,
                reason,
            }),
        }
    }

    // ----- Espionage actions are paid in EBP, not PP -----
    let mut ebp_available = house.espionage.ebp
        + out.ebp_investment / config.espionage.ebp_rate.max(1);
    for (index, order) in packet.espionage.iter().enumerate() {
        match check_espionage_order(state, config, packet.house, order, ebp_available) {
            Ok(cost) => {
                ebp_available -= cost;
                out.espionage.push(*order);
            }
            Err(reason) => out.rejected.push(RejectedOrder {
                kind: OrderKind::Espionage,
                index,
                reason,
            }),
        }
    }

    log::debug!(
        "validated packet for {}: projected={} remaining={} rejected={}",
        packet.house,
        projected,
        remaining,
        out.rejected.len()
    );
    out
}

fn check_fleet_order(
    state: &GameState,
    house: HouseId,
    order: &FleetOrder,
) -> Result<(), OrderError> {
    let store = &state.store;
    let fleet = store
        .fleet(order.fleet)
        .ok_or_else(|| OrderError::TargetInvalid(format!("unknown fleet {}", order.fleet)))?;
    if fleet.owner != house {
        return Err(OrderError::OwnershipViolation);
    }
    if let Some(roe) = order.roe {
        if roe > 10 {
            return Err(OrderError::TargetInvalid(format!("ROE {roe} outside 0..=10")));
        }
    }
    if fleet.status != FleetStatus::Active && !matches!(order.directive, FleetDirective::Hold) {
        return Err(OrderError::CapabilityMissing(
            "fleet is not on active status".to_string(),
        ));
    }

    let map = Starmap::new(store);
    let profile = store.fleet_profile(order.fleet);
    match order.directive {
        FleetDirective::Hold => Ok(()),
        FleetDirective::Move { to } | FleetDirective::Blockade { system: to } => {
            store
                .system(to)
                .ok_or_else(|| OrderError::TargetInvalid(format!("unknown system {to}")))?;
            if map.find_path(fleet.location, to, profile).is_none() {
                return Err(OrderError::CapabilityMissing(
                    "no traversable route (restricted lanes bar crippled and spacelift hulls)"
                        .to_string(),
                ));
            }
            Ok(())
        }
        FleetDirective::Spy { system } => {
            store
                .system(system)
                .ok_or_else(|| OrderError::TargetInvalid(format!("unknown system {system}")))?;
            if profile.squadron_count != 1 || profile.scout_squadrons != 1 || profile.has_spacelift
            {
                return Err(OrderError::CapabilityMissing(
                    "spy missions require exactly one scout squadron".to_string(),
                ));
            }
            if map.find_path(fleet.location, system, profile).is_none() {
                return Err(OrderError::CapabilityMissing("no traversable route".to_string()));
            }
            Ok(())
        }
        FleetDirective::Colonize { system } => {
            let target = store
                .system(system)
                .ok_or_else(|| OrderError::TargetInvalid(format!("unknown system {system}")))?;
            if store.colony_at(target.id).is_some() {
                return Err(OrderError::TargetInvalid(format!(
                    "system {system} already hosts a colony"
                )));
            }
            if !fleet_has_cargo(state, order.fleet, CargoKind::Colonists) {
                return Err(OrderError::CapabilityMissing(
                    "colonize requires loaded PTU aboard a spacelift ship".to_string(),
                ));
            }
            if map.find_path(fleet.location, system, profile).is_none() {
                return Err(OrderError::CapabilityMissing("no traversable route".to_string()));
            }
            Ok(())
        }
        FleetDirective::Invade { colony } | FleetDirective::Blitz { colony } => {
            let target = store
                .colony(colony)
                .ok_or_else(|| OrderError::TargetInvalid(format!("unknown colony {colony}")))?;
            if target.owner == house {
                return Err(OrderError::TargetInvalid("cannot invade own colony".to_string()));
            }
            if relation(state, house, target.owner) != DiplomaticState::Enemy {
                return Err(OrderError::PrerequisiteMissing(
                    "invasion requires an Enemy relation".to_string(),
                ));
            }
            if !fleet_has_cargo(state, order.fleet, CargoKind::Marines) {
                return Err(OrderError::CapabilityMissing(
                    "invasion requires loaded marines".to_string(),
                ));
            }
            if map.find_path(fleet.location, target.system, profile).is_none() {
                return Err(OrderError::CapabilityMissing("no traversable route".to_string()));
            }
            Ok(())
        }
        FleetDirective::Bombard { colony } => {
            let target = store
                .colony(colony)
                .ok_or_else(|| OrderError::TargetInvalid(format!("unknown colony {colony}")))?;
            if target.owner == house {
                return Err(OrderError::TargetInvalid("cannot bombard own colony".to_string()));
            }
            if relation(state, house, target.owner) != DiplomaticState::Enemy {
                return Err(OrderError::PrerequisiteMissing(
                    "bombardment requires an Enemy relation".to_string(),
                ));
            }
            if map.find_path(fleet.location, target.system, profile).is_none() {
                return Err(OrderError::CapabilityMissing("no traversable route".to_string()));
            }
            Ok(())
        }
    }
}

fn fleet_has_cargo(state: &GameState, fleet: FleetId, kind: CargoKind) -> bool {
    let Some(record) = state.store.fleet(fleet) else {
        return false;
    };
    record.spacelift.iter().any(|ship_id| {
        state.store.ship(*ship_id).is_some_and(|ship| {
            ship.cargo
                .as_ref()
                .is_some_and(|cargo| cargo.kind == kind && cargo.quantity > 0)
        })
    })
}

fn relation(state: &GameState, a: HouseId, b: HouseId) -> DiplomaticState {
    state
        .store
        .house(a)
        .map(|house| house.relation_with(b))
        .unwrap_or_default()
}

fn check_squadron_order(
    state: &GameState,
    house: HouseId,
    order: &SquadronOrder,
) -> Result<(), OrderError> {
    let store = &state.store;
    match *order {
        SquadronOrder::TransferSquadron { squadron, to_fleet } => {
            let record = store
                .squadron(squadron)
                .ok_or_else(|| OrderError::TargetInvalid(format!("unknown squadron {squadron}")))?;
            if record.owner != house {
                return Err(OrderError::OwnershipViolation);
            }
            let from_fleet = record.fleet.ok_or_else(|| {
                OrderError::CapabilityMissing("colony fighters cannot transfer".to_string())
            })?;
            let from = store
                .fleet(from_fleet)
                .ok_or_else(|| OrderError::TargetInvalid(format!("unknown fleet {from_fleet}")))?;
            let to = store
                .fleet(to_fleet)
                .ok_or_else(|| OrderError::TargetInvalid(format!("unknown fleet {to_fleet}")))?;
            if to.owner != house {
                return Err(OrderError::OwnershipViolation);
            }
            if from.location != to.location {
                return Err(OrderError::TargetInvalid(
                    "squadron transfer requires co-located fleets".to_string(),
                ));
            }
            Ok(())
        }
        SquadronOrder::TransferSpacelift { ship, to_fleet } => {
            let record = store
                .ship(ship)
                .ok_or_else(|| OrderError::TargetInvalid(format!("unknown ship {ship}")))?;
            if record.role != ShipRole::Spacelift {
                return Err(OrderError::CapabilityMissing(
                    "only spacelift ships ride the train".to_string(),
                ));
            }
            let holder = store
                .fleets()
                .iter()
                .find(|(_, fleet)| fleet.spacelift.contains(&ship))
                .map(|(id, fleet)| (*id, fleet.owner, fleet.location))
                .ok_or_else(|| OrderError::TargetInvalid(format!("ship {ship} is unattached")))?;
            if holder.1 != house {
                return Err(OrderError::OwnershipViolation);
            }
            let to = store
                .fleet(to_fleet)
                .ok_or_else(|| OrderError::TargetInvalid(format!("unknown fleet {to_fleet}")))?;
            if to.owner != house {
                return Err(OrderError::OwnershipViolation);
            }
            if to.location != holder.2 {
                return Err(OrderError::TargetInvalid(
                    "spacelift transfer requires co-located fleets".to_string(),
                ));
            }
            Ok(())
        }
    }
}

fn check_cargo_order(
    state: &GameState,
    house: HouseId,
    order: &CargoOrder,
) -> Result<(), OrderError> {
    let store = &state.store;
    let ship = store
        .ship(order.ship)
        .ok_or_else(|| OrderError::TargetInvalid(format!("unknown ship {}", order.ship)))?;
    let cargo = ship.cargo.ok_or_else(|| {
        OrderError::CapabilityMissing("ship has no cargo hold".to_string())
    })?;
    let holder = store
        .fleets()
        .iter()
        .find(|(_, fleet)| fleet.spacelift.contains(&order.ship))
        .map(|(_, fleet)| (fleet.owner, fleet.location))
        .ok_or_else(|| OrderError::TargetInvalid("ship is not in a fleet train".to_string()))?;
    if holder.0 != house {
        return Err(OrderError::OwnershipViolation);
    }
    let colony_id = store
        .colony_at(holder.1)
        .ok_or_else(|| OrderError::TargetInvalid("no colony at fleet location".to_string()))?;
    let colony = store.colony(colony_id).ok_or_else(|| {
        OrderError::TargetInvalid(format!("unknown colony {colony_id}"))
    })?;
    if colony.owner != house {
        return Err(OrderError::OwnershipViolation);
    }
    if order.quantity == 0 {
        return Err(OrderError::TargetInvalid("zero quantity".to_string()));
    }
    match order.op {
        CargoOp::Load => {
            if cargo.kind != CargoKind::None && cargo.kind != order.kind {
                return Err(OrderError::InsufficientCapacity(
                    "hold already carries different cargo".to_string(),
                ));
            }
            if order.quantity > cargo.free_space() {
                return Err(OrderError::InsufficientCapacity(format!(
                    "hold has {} free, requested {}",
                    cargo.free_space(),
                    order.quantity
                )));
            }
            let available = match order.kind {
                CargoKind::Marines => colony.marines,
                CargoKind::Colonists => colony.population.saturating_sub(1),
                CargoKind::None => 0,
            };
            if order.kind == CargoKind::None {
                return Err(OrderError::TargetInvalid("cannot load nothing".to_string()));
            }
            if order.quantity > available {
                return Err(OrderError::InsufficientCapacity(format!(
                    "colony inventory has {available}, requested {}",
                    order.quantity
                )));
            }
            Ok(())
        }
        CargoOp::Unload => {
            if cargo.kind != order.kind || cargo.quantity < order.quantity {
                return Err(OrderError::InsufficientCapacity(format!(
                    "hold carries {:?} x{}, requested {:?} x{}",
                    cargo.kind, cargo.quantity, order.kind, order.quantity
                )));
            }
            Ok(())
        }
    }
}

fn check_diplomatic_order(
    state: &GameState,
    house: HouseId,
    order: &DiplomaticOrder,
) -> Result<(), OrderError> {
    use ec4x_common::types::DiplomaticStanding;

    let other = match *order {
        DiplomaticOrder::ProposePact { with }
        | DiplomaticOrder::BreakPact { with }
        | DiplomaticOrder::Normalize { with } => with,
        DiplomaticOrder::AcceptPact { from } => from,
        DiplomaticOrder::DeclareEnemy { on } => on,
    };
    if other == house {
        return Err(OrderError::TargetInvalid("cannot address own house".to_string()));
    }
    let actor = state
        .store
        .house(house)
        .ok_or_else(|| OrderError::TargetInvalid(format!("unknown house {house}")))?;
    let target = state
        .store
        .house(other)
        .ok_or_else(|| OrderError::TargetInvalid(format!("unknown house {other}")))?;
    if target.eliminated {
        return Err(OrderError::TargetInvalid(format!("house {other} is eliminated")));
    }

    // Standing gates: a dishonored house sits out its reinstatement
    // cooldown before proposing; an isolated house signs nothing.
    match *order {
        DiplomaticOrder::ProposePact { .. } => match actor.standing {
            DiplomaticStanding::Dishonored { until_turn } if until_turn > state.turn => {
                return Err(OrderError::PrerequisiteMissing(
                    "dishonored houses wait out their cooldown before proposing".to_string(),
                ));
            }
            DiplomaticStanding::DiplomaticallyIsolated { until_turn }
                if until_turn > state.turn =>
            {
                return Err(OrderError::PrerequisiteMissing(
                    "diplomatically isolated houses cannot propose pacts".to_string(),
                ));
            }
            _ => {}
        },
        DiplomaticOrder::AcceptPact { from } => {
            if let DiplomaticStanding::DiplomaticallyIsolated { until_turn } = actor.standing {
                if until_turn > state.turn {
                    return Err(OrderError::PrerequisiteMissing(
                        "diplomatically isolated houses cannot accept pacts".to_string(),
                    ));
                }
            }
            if !state.pending_pacts.contains(&(from, house)) {
                return Err(OrderError::PrerequisiteMissing(
                    "no pending pact proposal from that house".to_string(),
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_build_order(
    state: &GameState,
    config: &GameConfig,
    house: HouseId,
    order: &BuildOrder,
    already_funded: &[FundedBuild],
) -> Result<u32, OrderError> {
    let store = &state.store;
    let colony = store
        .colony(order.colony)
        .ok_or_else(|| OrderError::TargetInvalid(format!("unknown colony {}", order.colony)))?;
    if colony.owner != house {
        return Err(OrderError::OwnershipViolation);
    }
    let house_record = store
        .house(house)
        .ok_or_else(|| OrderError::TargetInvalid(format!("unknown house {house}")))?;

    let needs_dock = matches!(order.item, BuildItem::Ship { .. } | BuildItem::Facility(_));
    if needs_dock {
        let slots = store.count_facilities(colony.id, FacilityKind::Spaceport)
            * config.construction.spaceport_slots
            + store.count_facilities(colony.id, FacilityKind::Shipyard)
                * config.construction.shipyard_slots;
        let docked_active = colony
            .construction_queue
            .iter()
            .filter(|p| matches!(p.item, BuildItem::Ship { .. } | BuildItem::Facility(_)))
            .count() as u32;
        let docked_pending = already_funded
            .iter()
            .filter(|b| {
                b.colony == colony.id
                    && matches!(b.item, BuildItem::Ship { .. } | BuildItem::Facility(_))
            })
            .count() as u32;
        if docked_active + docked_pending >= slots {
            return Err(OrderError::InsufficientDocks);
        }
    }

    match &order.item {
        BuildItem::Ship { class } => {
            let spec = config.ship_class(class).ok_or_else(|| {
                OrderError::TargetInvalid(format!("unknown ship class {class}"))
            })?;
            if house_record.tech.cst < spec.min_cst {
                return Err(OrderError::PrerequisiteMissing(format!(
                    "{class} requires CST {}",
                    spec.min_cst
                )));
            }
            let has_shipyard = store.count_facilities(colony.id, FacilityKind::Shipyard) > 0;
            let has_spaceport = store.count_facilities(colony.id, FacilityKind::Spaceport) > 0;
            if spec.role == ShipRole::Fighter {
                if !has_shipyard && !has_spaceport {
                    return Err(OrderError::PrerequisiteMissing(
                        "fighter production requires a spaceport or shipyard".to_string(),
                    ));
                }
            } else if !has_shipyard {
                return Err(OrderError::PrerequisiteMissing(
                    "ship production requires a shipyard".to_string(),
                ));
            }
            Ok(spec.cost)
        }
        BuildItem::Facility(kind) => {
            let spec = config.facilities.get(kind).ok_or_else(|| {
                OrderError::TargetInvalid(format!("unknown facility {kind:?}"))
            })?;
            match kind {
                FacilityKind::Spaceport => {}
                FacilityKind::Shipyard => {
                    if store.count_facilities(colony.id, FacilityKind::Spaceport) == 0 {
                        return Err(OrderError::PrerequisiteMissing(
                            "a shipyard requires a spaceport".to_string(),
                        ));
                    }
                }
                FacilityKind::Starbase => {
                    if store.count_facilities(colony.id, FacilityKind::Shipyard) == 0 {
                        return Err(OrderError::PrerequisiteMissing(
                            "a starbase requires a shipyard".to_string(),
                        ));
                    }
                }
            }
            Ok(spec.cost)
        }
        BuildItem::GroundUnit(class) => {
            let spec = config.ground_units.get(class).ok_or_else(|| {
                OrderError::TargetInvalid(format!("unknown ground unit {class:?}"))
            })?;
            Ok(spec.cost)
        }
        BuildItem::IndustrialUnits { count } => {
            if *count == 0 {
                return Err(OrderError::TargetInvalid("zero IU requested".to_string()));
            }
            let unit = config.iu_cost(colony.population, config.max_pu(colony.planet_class));
            Ok(unit * count)
        }
    }
}

fn check_transfer_order(
    state: &GameState,
    config: &GameConfig,
    map: &Starmap<'_>,
    house: HouseId,
    order: &TransferOrder,
    in_flight: u32,
) -> Result<FundedTransfer, OrderError> {
    let store = &state.store;
    if in_flight >= config.economy.max_concurrent_transfers {
        return Err(OrderError::InsufficientCapacity(format!(
            "at most {} concurrent transfers",
            config.economy.max_concurrent_transfers
        )));
    }
    let from = store
        .colony(order.from)
        .ok_or_else(|| OrderError::TargetInvalid(format!("unknown colony {}", order.from)))?;
    let to = store
        .colony(order.to)
        .ok_or_else(|| OrderError::TargetInvalid(format!("unknown colony {}", order.to)))?;
    if from.owner != house || to.owner != house {
        return Err(OrderError::OwnershipViolation);
    }
    if order.ptus == 0 || order.ptus >= from.population {
        return Err(OrderError::InsufficientCapacity(format!(
            "colony holds {} PU, cannot ship {}",
            from.population, order.ptus
        )));
    }
    // The Guild routes freely; restrictions do not apply to its carriers.
    let route = map
        .find_path(from.system, to.system, Default::default())
        .ok_or_else(|| OrderError::TargetInvalid("no route between colonies".to_string()))?;
    let jumps = (route.len().saturating_sub(1)) as u32;
    let base = config
        .economy
        .transfer_base_cost
        .get(&from.planet_class)
        .copied()
        .unwrap_or(10);
    let per_ptu = f64::from(base)
        * (1.0 + config.economy.transfer_jump_surcharge * f64::from(jumps.saturating_sub(1)));
    let cost = (per_ptu * f64::from(order.ptus)).ceil() as i64;
    Ok(FundedTransfer {
        from: order.from,
        to: order.to,
        ptus: order.ptus,
        cost,
        transit_turns: jumps.max(1),
    })
}

fn check_terraform_order(
    state: &GameState,
    config: &GameConfig,
    house: HouseId,
    order: &TerraformOrder,
) -> Result<u32, OrderError> {
    let store = &state.store;
    let colony = store
        .colony(order.colony)
        .ok_or_else(|| OrderError::TargetInvalid(format!("unknown colony {}", order.colony)))?;
    if colony.owner != house {
        return Err(OrderError::OwnershipViolation);
    }
    let house_record = store
        .house(house)
        .ok_or_else(|| OrderError::TargetInvalid(format!("unknown house {house}")))?;
    if house_record.tech.ter == 0 {
        return Err(OrderError::PrerequisiteMissing(
            "terraforming requires TER research".to_string(),
        ));
    }
    if colony.planet_class.improved().is_none() {
        return Err(OrderError::TargetInvalid(
            "planet class cannot improve further".to_string(),
        ));
    }
    Ok(config.gameplay.terraform_cost)
}

fn check_espionage_order(
    state: &GameState,
    config: &GameConfig,
    house: HouseId,
    order: &EspionageOrder,
    ebp_available: u32,
) -> Result<u32, OrderError> {
    if order.target == house {
        return Err(OrderError::TargetInvalid("cannot spy on own house".to_string()));
    }
    let target = state
        .store
        .house(order.target)
        .ok_or_else(|| OrderError::TargetInvalid(format!("unknown house {}", order.target)))?;
    if target.eliminated {
        return Err(OrderError::TargetInvalid(format!(
            "house {} is eliminated",
            order.target
        )));
    }
    let cost = config
        .espionage
        .actions
        .get(&order.action)
        .map(|a| a.cost)
        .ok_or_else(|| {
            OrderError::TargetInvalid(format!("unconfigured action {:?}", order.action))
        })?;
    if cost > ebp_available {
        return Err(OrderError::InsufficientCapacity(format!(
            "action costs {cost} EBP, {ebp_available} available"
        )));
    }
    Ok(cost)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SquadronAttachment;
    use ec4x_common::coords::Hex;
    use ec4x_common::types::{LaneType, PlanetClass, ResourceRating, System};
    use ec4x_common::units::CombatState;
    use std::collections::BTreeMap;

    fn validator_state() -> (GameState, GameConfig, HouseId) {
        let config = GameConfig::default();
        let mut state = GameState::new("orders-test");
        let ids = [SystemId::new(1), SystemId::new(2)];
        for (index, id) in ids.into_iter().enumerate() {
            let mut lanes = BTreeMap::new();
            lanes.insert(ids[1 - index], LaneType::Restricted);
            state.store.insert_system(System {
                id,
                coords: Hex::new(index as i32, 0),
                lanes,
            });
        }
        let house = state.store.create_house("Atreides", ids[0], 1000);
        let colony = state.store.create_colony(
            ids[0],
            house,
            PlanetClass::Terran,
            ResourceRating::Rich,
            100,
            20,
        );
        state.store.create_facility(colony, ec4x_common::types::FacilityKind::Spaceport);
        state.store.create_facility(colony, ec4x_common::types::FacilityKind::Shipyard);
        (state, config, house)
    }

    #[test]
    fn crippled_ship_blocks_restricted_route() {
        let (mut state, config, house) = validator_state();
        let fleet = state.store.create_fleet(house, SystemId::new(1));
        let squadron = state
            .store
            .commission_squadron(house, SquadronAttachment::Fleet(fleet), "Corvette", &[], &config)
            .expect("squadron");
        let flagship = state.store.squadron(squadron).unwrap().flagship;
        let _ = state.store.update_ship(flagship, |s| {
            s.combat_state = CombatState::Crippled;
        });
        let packet = OrderPacket {
            house,
            fleet_orders: vec![FleetOrder {
                fleet,
                directive: FleetDirective::Move { to: SystemId::new(2) },
                roe: None,
            }],
            ..OrderPacket::default()
        };
        let validated = validate_packet(&state, &config, &packet);
        assert!(validated.fleet_orders.is_empty());
        assert!(matches!(
            validated.rejected[0].reason,
            OrderError::CapabilityMissing(_)
        ));
    }

    #[test]
    fn ownership_violation_rejected() {
        let (mut state, config, house) = validator_state();
        let rival = state.store.create_house("Harkonnen", SystemId::new(2), 100);
        let rival_fleet = state.store.create_fleet(rival, SystemId::new(2));
        let packet = OrderPacket {
            house,
            fleet_orders: vec![FleetOrder {
                fleet: rival_fleet,
                directive: FleetDirective::Hold,
                roe: None,
            }],
            ..OrderPacket::default()
        };
        let validated = validate_packet(&state, &config, &packet);
        assert_eq!(validated.rejected[0].reason, OrderError::OwnershipViolation);
    }

    #[test]
    fn budget_reservation_runs_in_sequence() {
        let (state, config, house) = validator_state();
        // Projection: treasury 1000 + expected income − maintenance. The
        // colony has no cached gross output yet, so income projects zero.
        let maintenance = economy::expected_maintenance(&state.store, &config, house);
        let projected = 1000 - maintenance;
        let packet = OrderPacket {
            house,
            research: Some(ResearchOrder {
                priority: 1.0,
                focus: TechField::El,
            }),
            ebp_investment: 40,
            cip_investment: 40,
            build_orders: vec![BuildOrder {
                colony: state.store.colonies_of(house)[0],
                item: BuildItem::Ship { class: "Corvette".to_string() },
            }],
            ..OrderPacket::default()
        };
        let validated = validate_packet(&state, &config, &packet);
        // Research takes min(1.0 × 0.30, 0.25) of the projection.
        let expected_research = ((projected as f64) * 0.25).floor() as i64;
        assert_eq!(validated.research_reserved, expected_research);
        // Espionage is capped at its share of the projection, not the
        // remainder.
        let espionage_cap = ((projected as f64) * config.espionage.budget_fraction).floor() as i64;
        let granted = i64::from(validated.ebp_investment) + i64::from(validated.cip_investment);
        assert_eq!(granted, espionage_cap.min(80));
        // The build still fits from what remains.
        assert_eq!(validated.builds.len(), 1);
        assert_eq!(validated.builds[0].cost, 20);
    }

    #[test]
    fn build_without_shipyard_needs_prerequisite() {
        let (mut state, config, house) = validator_state();
        // A bare outpost colony in system 2.
        let outpost = state.store.create_colony(
            SystemId::new(2),
            house,
            PlanetClass::Barren,
            ResourceRating::Poor,
            20,
            0,
        );
        let packet = OrderPacket {
            house,
            build_orders: vec![BuildOrder {
                colony: outpost,
                item: BuildItem::Ship { class: "Corvette".to_string() },
            }],
            ..OrderPacket::default()
        };
        let validated = validate_packet(&state, &config, &packet);
        // No docks at all reads as InsufficientDocks before the shipyard
        // prerequisite is even consulted.
        assert!(matches!(
            validated.rejected[0].reason,
            OrderError::InsufficientDocks | OrderError::PrerequisiteMissing(_)
        ));
    }

    #[test]
    fn spy_mission_requires_lone_scout_squadron() {
        let (mut state, config, house) = validator_state();
        let fleet = state.store.create_fleet(house, SystemId::new(1));
        state
            .store
            .commission_squadron(house, SquadronAttachment::Fleet(fleet), "Scout", &[], &config)
            .expect("scout");
        state
            .store
            .commission_squadron(house, SquadronAttachment::Fleet(fleet), "Corvette", &[], &config)
            .expect("corvette");
        let packet = OrderPacket {
            house,
            fleet_orders: vec![FleetOrder {
                fleet,
                directive: FleetDirective::Spy { system: SystemId::new(1) },
                roe: None,
            }],
            ..OrderPacket::default()
        };
        let validated = validate_packet(&state, &config, &packet);
        assert!(matches!(
            validated.rejected[0].reason,
            OrderError::CapabilityMissing(_)
        ));
    }

    #[test]
    fn transfer_cost_scales_with_jumps() {
        let (mut state, config, house) = validator_state();
        // Reachable second colony over the restricted lane (the Guild
        // ignores lane restrictions).
        let destination = state.store.create_colony(
            SystemId::new(2),
            house,
            PlanetClass::Barren,
            ResourceRating::Poor,
            20,
            0,
        );
        let origin = state.store.colonies_of(house)[0];
        let packet = OrderPacket {
            house,
            population_transfers: vec![TransferOrder {
                from: origin,
                to: destination,
                ptus: 10,
            }],
            ..OrderPacket::default()
        };
        let validated = validate_packet(&state, &config, &packet);
        assert_eq!(validated.transfers.len(), 1);
        let funded = validated.transfers[0];
        // One jump: no surcharge; Terran base cost is 5.
        assert_eq!(funded.cost, 50);
        assert_eq!(funded.transit_turns, 1);
    }
}
