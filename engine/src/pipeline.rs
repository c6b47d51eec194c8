//! Turn pipeline for EC4X
//!
//! One call to [`resolve_turn`] advances the game exactly one turn through
//! the four phases, in order: Conflict → Income → Command → Maintenance.
//! Packets process in canonical order (stable house sort, then per-packet
//! order index), every phase appends to the turn's event log, and each
//! phase ends with an integrity sweep. A violation rolls the state back
//! to the pre-phase snapshot and aborts the turn. Given identical
//! `(state, orders, seed)` the pipeline produces byte-identical output.

use std::collections::BTreeMap;

use ec4x_common::config::GameConfig;
use ec4x_common::errors::EngineError;
use ec4x_common::events::{
    CombatReport, Event, EventLog, PrestigeSource, TurnReport,
};
use ec4x_common::ids::{FleetId, HouseId, SystemId};
use ec4x_common::rng::TurnRng;
use ec4x_common::types::{DiplomaticState, LaneType};
use ec4x_common::units::{CargoKind, FleetDirective, MissionState};

use crate::combat;
use crate::diplomacy;
use crate::economy;
use crate::espionage;
use crate::intel;
use crate::orders::{self, OrderPacket, SquadronOrder, ValidatedPacket};
use crate::starmap::Starmap;
use crate::state::GameState;

/// Everything a resolved turn hands back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub events: EventLog,
    pub reports: BTreeMap<HouseId, TurnReport>,
}

/// Resolve one turn. On an integrity error the state is rolled back to
/// the snapshot taken before the failing phase and the error surfaces to
/// the host; nothing is published for an aborted turn.
pub fn resolve_turn(
    state: &mut GameState,
    config: &GameConfig,
    packets: &[OrderPacket],
) -> Result<TurnOutcome, EngineError> {
    state.turn += 1;
    let turn = state.turn;
    let mut rng = TurnRng::for_turn(&state.game_id, turn);
    let mut events = EventLog::new(turn);
    log::info!("resolving turn {turn} of {}", state.game_id);

    let prestige_start: BTreeMap<HouseId, i64> = state
        .store
        .houses()
        .iter()
        .map(|(&id, h)| (id, h.prestige))
        .collect();

    // Canonical packet order: one packet per house (first submission
    // wins), houses in stable ID order.
    let mut by_house: BTreeMap<HouseId, &OrderPacket> = BTreeMap::new();
    for packet in packets {
        by_house.entry(packet.house).or_insert(packet);
    }
    let validated: BTreeMap<HouseId, ValidatedPacket> = by_house
        .iter()
        .map(|(&house, packet)| (house, orders::validate_packet(state, config, packet)))
        .collect();
    for packet in validated.values() {
        for rejection in &packet.rejected {
            events.push(Event::OrderRejected {
                house: packet.house,
                rejection: rejection.clone(),
            });
        }
    }

    // ----- Phase 1: Conflict -----
    let snapshot = state.clone();
    let combat_reports = combat::conflict_phase(state, config, &mut rng, &mut events);
    end_phase(state, snapshot, "conflict")?;

    // ----- Phase 2: Income -----
    let snapshot = state.clone();
    let income_reports = economy::income_phase(state, config, &mut events);
    end_phase(state, snapshot, "income")?;

    // ----- Phase 3: Command -----
    let snapshot = state.clone();
    command_phase(state, config, &mut rng, &mut events, &validated);
    end_phase(state, snapshot, "command")?;

    // ----- Phase 4: Maintenance -----
    let snapshot = state.clone();
    economy::advance_construction(state, config, &mut events);
    for (&house, packet) in &validated {
        economy::apply_research(
            state,
            config,
            &mut events,
            house,
            packet.research,
            packet.research_reserved,
        );
    }
    economy::pay_maintenance(state, config, &mut events);
    espionage::tick_effects(state, &mut events);
    diplomacy::expire_standings(state, &mut events, turn);
    intel::refresh_from_positions(state, config);
    diplomacy::victory_check(state, config, &mut events);
    clamp_treasuries(state);
    end_phase(state, snapshot, "maintenance")?;

    Ok(assemble_outcome(
        state,
        turn,
        events,
        prestige_start,
        income_reports,
        combat_reports,
        validated,
    ))
}

/// Integrity gate at a phase boundary: a violation restores the pre-phase
/// snapshot and aborts.
fn end_phase(
    state: &mut GameState,
    snapshot: GameState,
    phase: &str,
) -> Result<(), EngineError> {
    if let Err(violation) = state.store.integrity_check() {
        log::error!("integrity violation in {phase} phase: {violation}; rolling back");
        *state = snapshot;
        return Err(violation.into());
    }
    Ok(())
}

/// Treasury must close the turn non-negative; the shortfall cascade has
/// already handled the economics, this is the final backstop.
fn clamp_treasuries(state: &mut GameState) {
    for house_id in state.store.house_ids() {
        let negative = state.store.house(house_id).is_some_and(|h| h.treasury < 0);
        if negative {
            let _ = state.store.update_house(house_id, |h| h.treasury = 0);
        }
    }
}

fn assemble_outcome(
    state: &GameState,
    turn: u32,
    events: EventLog,
    prestige_start: BTreeMap<HouseId, i64>,
    income: BTreeMap<HouseId, ec4x_common::events::IncomeReport>,
    combat: BTreeMap<HouseId, Vec<CombatReport>>,
    validated: BTreeMap<HouseId, ValidatedPacket>,
) -> TurnOutcome {
    let mut reports = BTreeMap::new();
    for house_id in state.store.house_ids() {
        let start = prestige_start.get(&house_id).copied().unwrap_or(0);
        let entries: Vec<(PrestigeSource, i64)> = events
            .iter()
            .filter_map(|event| match event {
                Event::PrestigeAwarded {
                    house,
                    source,
                    amount,
                    ..
                } if *house == house_id => Some((*source, *amount)),
                _ => None,
            })
            .collect();
        let end = state
            .store
            .house(house_id)
            .map(|h| h.prestige)
            .unwrap_or(start);
        reports.insert(
            house_id,
            TurnReport {
                turn,
                income: income.get(&house_id).cloned().unwrap_or_default(),
                prestige: ec4x_common::events::PrestigeReport {
                    start,
                    entries,
                    end,
                },
                combat: combat.get(&house_id).cloned().unwrap_or_default(),
                rejected: validated
                    .get(&house_id)
                    .map(|p| p.rejected.clone())
                    .unwrap_or_default(),
            },
        );
    }
    TurnOutcome { events, reports }
}

// ---------------------------------------------------------------------------
// Command Phase
// ---------------------------------------------------------------------------

fn command_phase(
    state: &mut GameState,
    config: &GameConfig,
    rng: &mut TurnRng,
    events: &mut EventLog,
    validated: &BTreeMap<HouseId, ValidatedPacket>,
) {
    let turn = state.turn;

    // Per-house order application in canonical order.
    for (&house, packet) in validated {
        for order in &packet.diplomatic {
            diplomacy::apply_order(state, config, events, house, order, turn);
        }
        economy::apply_investments(
            state,
            config,
            events,
            house,
            packet.ebp_investment,
            packet.cip_investment,
        );
        espionage::resolve_actions(state, config, events, rng, house, &packet.espionage);
        for order in &packet.squadron_management {
            apply_squadron_order(state, order);
        }
        for order in &packet.cargo_management {
            economy::apply_cargo_order(state, order);
        }
        economy::start_builds(state, events, house, &packet.builds);
        apply_terraform(state, config, events, house, packet);
        economy::initiate_transfers(state, events, house, &packet.transfers);

        // Fleet directives: set the standing command and lay in a route.
        for order in &packet.fleet_orders {
            let destination = directive_destination(state, &order.directive);
            let route = destination.and_then(|to| {
                let profile = state.store.fleet_profile(order.fleet);
                let from = state.store.fleet(order.fleet)?.location;
                let map = Starmap::new(&state.store);
                map.find_path(from, to, profile)
            });
            let directive = order.directive;
            let roe = order.roe;
            let _ = state.store.update_fleet(order.fleet, |fleet| {
                fleet.command = Some(directive);
                if let Some(roe) = roe {
                    fleet.roe = roe;
                }
                fleet.mission = match &route {
                    Some(route) if route.len() > 1 => MissionState::Underway {
                        route: route[1..].to_vec(),
                    },
                    _ => MissionState::Idle,
                };
            });
        }
    }

    // Movement advances for every fleet in ID order, then arrivals act.
    let fleet_ids: Vec<FleetId> = state.store.fleets().keys().copied().collect();
    for fleet_id in fleet_ids {
        advance_fleet(state, config, events, fleet_id);
    }

    // Guild shipments move after the fleets.
    economy::advance_transfers(state, config, events);
}

fn apply_terraform(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    house: HouseId,
    packet: &ValidatedPacket,
) {
    for order in &packet.terraform {
        let improved = state
            .store
            .colony(order.colony)
            .and_then(|c| c.planet_class.improved());
        let Some(new_class) = improved else {
            continue;
        };
        let cost = i64::from(config.gameplay.terraform_cost);
        let _ = state.store.update_house(house, |h| h.treasury -= cost);
        let _ = state.store.update_colony(order.colony, |c| {
            c.planet_class = new_class;
        });
        events.push(Event::TerraformCompleted {
            house,
            colony: order.colony,
            new_class,
        });
    }
}

fn directive_destination(state: &GameState, directive: &FleetDirective) -> Option<SystemId> {
    match directive {
        FleetDirective::Hold => None,
        FleetDirective::Move { to } => Some(*to),
        FleetDirective::Spy { system }
        | FleetDirective::Colonize { system }
        | FleetDirective::Blockade { system } => Some(*system),
        FleetDirective::Invade { colony }
        | FleetDirective::Blitz { colony }
        | FleetDirective::Bombard { colony } => {
            state.store.colony(*colony).map(|c| c.system)
        }
    }
}

fn apply_squadron_order(state: &mut GameState, order: &SquadronOrder) {
    match *order {
        SquadronOrder::TransferSquadron { squadron, to_fleet } => {
            let Some(record) = state.store.squadron(squadron) else {
                return;
            };
            let Some(from_fleet) = record.fleet else {
                return;
            };
            if from_fleet == to_fleet {
                return;
            }
            let _ = state.store.update_fleet(from_fleet, |f| {
                f.squadrons.retain(|&q| q != squadron);
            });
            let _ = state.store.update_fleet(to_fleet, |f| {
                f.squadrons.push(squadron);
            });
            let _ = state.store.update_squadron(squadron, |s| {
                s.fleet = Some(to_fleet);
            });
        }
        SquadronOrder::TransferSpacelift { ship, to_fleet } => {
            let holder = state
                .store
                .fleets()
                .iter()
                .find(|(_, fleet)| fleet.spacelift.contains(&ship))
                .map(|(id, _)| *id);
            let Some(from_fleet) = holder else {
                return;
            };
            if from_fleet == to_fleet {
                return;
            }
            let _ = state.store.update_fleet(from_fleet, |f| {
                f.spacelift.retain(|&s| s != ship);
            });
            let _ = state.store.update_fleet(to_fleet, |f| {
                f.spacelift.push(ship);
            });
        }
    }
}

/// Whether a system reads Friendly to a house for movement doubling: an
/// owned colony and no enemy presence.
fn movement_friendly(state: &GameState, house: HouseId, system: SystemId) -> bool {
    let owned_colony = state
        .store
        .colony_at(system)
        .and_then(|id| state.store.colony(id))
        .is_some_and(|c| c.owner == house);
    if !owned_colony {
        return false;
    }
    let hostile_presence = state.store.fleets_at(system).iter().any(|fleet_id| {
        state.store.fleet(*fleet_id).is_some_and(|fleet| {
            state
                .store
                .house(house)
                .is_some_and(|h| h.relation_with(fleet.owner) == DiplomaticState::Enemy)
        })
    });
    !hostile_presence
}

/// Advance a moving fleet one turn: one jump, or two consecutive Major
/// jumps through entirely friendly systems.
fn advance_fleet(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    fleet_id: FleetId,
) {
    let Some(fleet) = state.store.fleet(fleet_id) else {
        return;
    };
    let MissionState::Underway { route } = fleet.mission.clone() else {
        return;
    };
    if route.is_empty() {
        let _ = state.store.update_fleet(fleet_id, |f| f.mission = MissionState::Idle);
        return;
    }
    let house = fleet.owner;
    let start = fleet.location;

    let map = Starmap::new(&state.store);
    let mut jumps = 1usize;
    if config.gameplay.major_jumps_per_turn >= 2
        && route.len() >= 2
        && map.lane_between(start, route[0]) == Some(LaneType::Major)
        && map.lane_between(route[0], route[1]) == Some(LaneType::Major)
        && movement_friendly(state, house, start)
        && movement_friendly(state, house, route[0])
        && movement_friendly(state, house, route[1])
    {
        jumps = 2;
    }
    let jumps = jumps.min(route.len());
    let arrived_at = route[jumps - 1];
    let remaining: Vec<SystemId> = route[jumps..].to_vec();

    let _ = state.store.update_fleet(fleet_id, |f| {
        f.location = arrived_at;
        f.mission = if remaining.is_empty() {
            MissionState::Idle
        } else {
            MissionState::Underway {
                route: remaining.clone(),
            }
        };
    });
    events.push(Event::FleetMoved {
        house,
        fleet: fleet_id,
        from: start,
        to: arrived_at,
    });

    // Arrival actions.
    let arrived = state
        .store
        .fleet(fleet_id)
        .is_some_and(|f| f.is_idle());
    if arrived {
        let command = state.store.fleet(fleet_id).and_then(|f| f.command);
        if let Some(FleetDirective::Colonize { system }) = command {
            found_colony(state, config, events, fleet_id, house, system);
        }
    }
}

/// Found a colony from the fleet's colonist cargo.
fn found_colony(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    fleet_id: FleetId,
    house: HouseId,
    system: SystemId,
) {
    if state.store.colony_at(system).is_some() {
        return;
    }
    let Some(fleet) = state.store.fleet(fleet_id) else {
        return;
    };
    if fleet.location != system {
        return;
    }
    let mut colonists = 0u32;
    for ship_id in fleet.spacelift.clone() {
        let carried = state
            .store
            .ship(ship_id)
            .and_then(|s| s.cargo)
            .filter(|c| c.kind == CargoKind::Colonists)
            .map(|c| c.quantity)
            .unwrap_or(0);
        if carried > 0 {
            colonists += carried;
            let _ = state.store.update_ship(ship_id, |ship| {
                if let Some(cargo) = ship.cargo.as_mut() {
                    cargo.quantity = 0;
                    cargo.kind = CargoKind::None;
                }
            });
        }
    }
    if colonists == 0 {
        return;
    }
    let profile = state.worlds.get(&system).copied().unwrap_or(crate::state::WorldProfile {
        class: ec4x_common::types::PlanetClass::Barren,
        rating: ec4x_common::types::ResourceRating::Normal,
    });
    let population = colonists.min(config.max_pu(profile.class));
    let colony = state
        .store
        .create_colony(system, house, profile.class, profile.rating, population, 0);
    let _ = state.store.update_fleet(fleet_id, |f| f.command = None);
    let _ = state.store.update_house(house, |h| {
        h.scouted.insert(system);
    });
    events.push(Event::ColonyFounded {
        house,
        colony,
        system,
    });
    diplomacy::award_prestige(state, config, events, house, PrestigeSource::ColonyFounded, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{FleetOrder, OrderPacket};
    use crate::setup::{self, HouseSpec, LaneSpec, StarmapSpec, SystemSpec};
    use ec4x_common::units::FleetStatus;

    fn three_system_map() -> StarmapSpec {
        StarmapSpec {
            systems: vec![
                SystemSpec { id: 1, q: 0, r: 0, class: None, rating: None, home: true },
                SystemSpec { id: 2, q: 1, r: 0, class: None, rating: None, home: false },
                SystemSpec { id: 3, q: 2, r: 0, class: None, rating: None, home: true },
            ],
            lanes: vec![
                LaneSpec { a: 1, b: 2, kind: LaneType::Major },
                LaneSpec { a: 2, b: 3, kind: LaneType::Major },
            ],
        }
    }

    fn two_house_game() -> (GameState, GameConfig) {
        let config = GameConfig::default();
        let state = setup::new_game(
            "pipeline-test",
            &config,
            &three_system_map(),
            &[
                HouseSpec { name: "Atreides".to_string() },
                HouseSpec { name: "Harkonnen".to_string() },
            ],
        )
        .expect("setup");
        (state, config)
    }

    #[test]
    fn empty_turn_resolves_and_counts() {
        let (mut state, config) = two_house_game();
        let outcome = resolve_turn(&mut state, &config, &[]).expect("turn");
        assert_eq!(state.turn, 1);
        assert_eq!(outcome.events.turn, 1);
        // Both houses collected income.
        let incomes = outcome
            .events
            .iter()
            .filter(|e| matches!(e, Event::IncomeCollected { .. }))
            .count();
        assert_eq!(incomes, 2);
    }

    #[test]
    fn income_scenario_first_turn() {
        // Homeworlds start with cached gross output zero, so turn 1 income
        // derives entirely from live GCO computation.
        let (mut state, config) = two_house_game();
        let house = state.store.house_ids()[0];
        let colony_id = state.store.colonies_of(house)[0];
        let _ = state.store.update_colony(colony_id, |c| {
            c.planet_class = ec4x_common::types::PlanetClass::Eden;
            c.resource_rating = ec4x_common::types::ResourceRating::Abundant;
            c.population = 100;
            c.industrial_units = 50;
            c.tax_rate = 50;
        });
        let _ = state.store.update_house(house, |h| h.tech.el = 1);
        let before = state.store.house(house).unwrap().treasury;
        let outcome = resolve_turn(&mut state, &config, &[]).expect("turn");
        let report = &outcome.reports[&house];
        // GCO 152, NCV 76 per the boundary scenario.
        assert_eq!(report.income.colonies[0].1, 152);
        assert_eq!(report.income.colonies[0].2, 76);
        let after = state.store.house(house).unwrap().treasury;
        let maintenance = outcome
            .events
            .iter()
            .find_map(|e| match e {
                Event::MaintenancePaid { house: h, amount } if *h == house => Some(*amount),
                _ => None,
            })
            .unwrap_or(0);
        assert_eq!(after, before + 76 - maintenance);
    }

    #[test]
    fn fleet_movement_two_turns_into_hostile_space() {
        let (mut state, config) = two_house_game();
        let houses = state.store.house_ids();
        let (a, b) = (houses[0], houses[1]);
        // Make them enemies so system 3 reads hostile.
        for (x, y) in [(a, b), (b, a)] {
            let _ = state.store.update_house(x, |h| {
                h.relations.insert(y, ec4x_common::types::DiplomaticRelation {
                    state: DiplomaticState::Enemy,
                    since_turn: 0,
                });
            });
        }
        let fleet = state
            .store
            .fleets_of(a)
            .into_iter()
            .find(|id| {
                state
                    .store
                    .fleet(*id)
                    .is_some_and(|f| f.status == FleetStatus::Active)
            })
            .expect("starting fleet");
        // Strip the spacelift train so the fleet is a pure warfleet.
        let lift = state.store.fleet(fleet).unwrap().spacelift.clone();
        for ship in lift {
            let _ = state.store.delete_ship(ship);
        }

        let packet = OrderPacket {
            house: a,
            turn: 1,
            fleet_orders: vec![FleetOrder {
                fleet,
                directive: FleetDirective::Move { to: SystemId::new(3) },
                roe: None,
            }],
            ..OrderPacket::default()
        };
        resolve_turn(&mut state, &config, &[packet]).expect("turn 1");
        // S1 is friendly, but S3 (enemy home) is not: single jump only.
        assert_eq!(state.store.fleet(fleet).unwrap().location, SystemId::new(2));
        resolve_turn(&mut state, &config, &[]).expect("turn 2");
        assert_eq!(state.store.fleet(fleet).unwrap().location, SystemId::new(3));
        // Arrival among enemies: next turn's Conflict Phase fights.
        let outcome = resolve_turn(&mut state, &config, &[]).expect("turn 3");
        assert!(outcome
            .events
            .iter()
            .any(|e| matches!(e, Event::CombatResolved { .. })));
    }

    #[test]
    fn determinism_byte_identical() {
        let run = || {
            let (mut state, config) = two_house_game();
            let houses = state.store.house_ids();
            for (x, y) in [(houses[0], houses[1]), (houses[1], houses[0])] {
                let _ = state.store.update_house(x, |h| {
                    h.relations.insert(y, ec4x_common::types::DiplomaticRelation {
                        state: DiplomaticState::Enemy,
                        since_turn: 0,
                    });
                });
            }
            let mut logs = Vec::new();
            for _ in 0..4 {
                let outcome = resolve_turn(&mut state, &config, &[]).expect("turn");
                logs.push(outcome.events);
            }
            (state.digest().expect("digest"), logs)
        };
        let (digest_a, logs_a) = run();
        let (digest_b, logs_b) = run();
        assert_eq!(digest_a, digest_b);
        assert_eq!(logs_a, logs_b);
    }

    #[test]
    fn rejected_orders_surface_and_do_not_abort() {
        let (mut state, config) = two_house_game();
        let a = state.store.house_ids()[0];
        let packet = OrderPacket {
            house: a,
            turn: 1,
            fleet_orders: vec![FleetOrder {
                fleet: FleetId::new(999),
                directive: FleetDirective::Hold,
                roe: None,
            }],
            ..OrderPacket::default()
        };
        let outcome = resolve_turn(&mut state, &config, &[packet]).expect("turn");
        assert!(outcome
            .events
            .iter()
            .any(|e| matches!(e, Event::OrderRejected { .. })));
        assert_eq!(state.turn, 1);
    }
}
