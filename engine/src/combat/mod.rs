//! Combat kernel for EC4X
//!
//! The Conflict Phase resolves every engagement triggered by fleet
//! positions and standing directives from the prior turn. Theaters run in
//! order: orbital space, then planetary bombardment, then the ground
//! assault, each gated on the previous theater's outcome. Every combatant
//! house receives a mirror-perspective after-action report: own losses by
//! ship ID, opponent losses by class name only.

pub mod ground;
pub mod space;

use std::collections::BTreeMap;

use ec4x_common::config::GameConfig;
use ec4x_common::events::{CombatOutcome, CombatReport, Event, EventLog, PrestigeSource};
use ec4x_common::ids::{FleetId, HouseId, SystemId};
use ec4x_common::rng::TurnRng;
use ec4x_common::types::{DiplomaticState, LaneType};
use ec4x_common::units::{CombatState, FleetDirective, MissionState, ShipRole};

use crate::diplomacy;
use crate::intel;
use crate::starmap::Starmap;
use crate::state::GameState;
use space::{CombatUnit, EngagementSetup, HouseModifiers};

/// Resolve every combat on the map. Returns after-action reports per house.
pub fn conflict_phase(
    state: &mut GameState,
    config: &GameConfig,
    rng: &mut TurnRng,
    events: &mut EventLog,
) -> BTreeMap<HouseId, Vec<CombatReport>> {
    let mut reports: BTreeMap<HouseId, Vec<CombatReport>> = BTreeMap::new();
    let systems: Vec<SystemId> = state.store.systems().keys().copied().collect();
    for system in systems {
        if let Some(report_set) = resolve_system(state, config, rng, events, system) {
            for (house, report) in report_set {
                reports.entry(house).or_default().push(report);
            }
        }
    }
    reports
}

/// Houses with a stake in a system: fleet owners plus the colony owner.
/// An undefended colony still participates; its owner is the defender
/// when an invader arrives.
fn participants(state: &GameState, system: SystemId) -> Vec<HouseId> {
    let mut houses: Vec<HouseId> = Vec::new();
    for fleet_id in state.store.fleets_at(system) {
        if let Some(fleet) = state.store.fleet(fleet_id) {
            if !houses.contains(&fleet.owner) {
                houses.push(fleet.owner);
            }
        }
    }
    if let Some(colony_id) = state.store.colony_at(system) {
        if let Some(colony) = state.store.colony(colony_id) {
            if !houses.contains(&colony.owner) {
                houses.push(colony.owner);
            }
        }
    }
    houses
}

fn any_hostile_pair(state: &GameState, houses: &[HouseId]) -> bool {
    houses.iter().any(|&a| {
        houses.iter().any(|&b| {
            a != b
                && state
                    .store
                    .house(a)
                    .is_some_and(|h| h.relation_with(b) == DiplomaticState::Enemy)
        })
    })
}

fn resolve_system(
    state: &mut GameState,
    config: &GameConfig,
    rng: &mut TurnRng,
    events: &mut EventLog,
    system: SystemId,
) -> Option<BTreeMap<HouseId, CombatReport>> {
    let houses = participants(state, system);
    if houses.len() < 2 || !any_hostile_pair(state, &houses) {
        return None;
    }

    let mut setup = build_setup(state, config, system, &houses);
    if setup.units.is_empty() {
        // Malformed setup: participants with no actual units.
        events.push(Event::CombatResolved {
            system,
            participants: houses,
            outcome: CombatOutcome::NoContact,
        });
        return None;
    }

    // Precompute retreat destinations so the fight callback stays pure.
    let retreat_options = retreat_options(state, system, &setup);
    let mut destination_for = |fleet: FleetId, has_crippled: bool| {
        retreat_options.get(&fleet).and_then(|(any, safe)| {
            if has_crippled {
                *safe
            } else {
                (*any).or(*safe)
            }
        })
    };

    let space_result = space::fight(&mut setup, config, rng, &mut destination_for);

    // Write ship states back; destroyed hulls leave the store.
    for unit in &setup.units {
        match unit.state {
            CombatState::Destroyed => {
                let _ = state.store.delete_ship(unit.ship);
            }
            state_now => {
                let _ = state.store.update_ship(unit.ship, |ship| {
                    ship.combat_state = state_now;
                });
            }
        }
    }
    for (fleet_id, destination) in &space_result.retreats {
        let _ = state.store.update_fleet(*fleet_id, |fleet| {
            fleet.location = *destination;
            fleet.mission = MissionState::Idle;
            fleet.command = None;
        });
    }

    // Sides: the colony owner (or the senior house) defends.
    let defender = state
        .store
        .colony_at(system)
        .and_then(|id| state.store.colony(id))
        .map(|c| c.owner)
        .filter(|owner| houses.contains(owner))
        .unwrap_or_else(|| houses.iter().min().copied().unwrap_or_default());

    let outcome = classify_outcome(&setup, &space_result, defender);
    events.push(Event::CombatResolved {
        system,
        participants: houses.clone(),
        outcome,
    });

    apply_combat_prestige(state, config, events, &houses, defender, outcome);

    // Surviving attackers with surface directives work the lower theaters.
    let mut bombardments: BTreeMap<HouseId, ec4x_common::events::BombardmentReport> =
        BTreeMap::new();
    let mut grounds: BTreeMap<HouseId, ec4x_common::events::GroundReport> = BTreeMap::new();
    if orbital_control_contested(&setup, defender) {
        log::debug!("orbit over {system} still contested; no surface action");
    } else {
        surface_theaters(
            state, config, rng, events, system, defender, &mut bombardments, &mut grounds,
        );
    }

    // Mirror-perspective reports.
    let mut out = BTreeMap::new();
    for &house in &houses {
        let mut report = build_report(state, &setup, &space_result, house, system, outcome);
        report.bombardment = bombardments.get(&house).copied().or_else(|| {
            (house == defender).then(|| bombardments.values().copied().next()).flatten()
        });
        report.ground = grounds.get(&house).cloned().or_else(|| {
            (house == defender).then(|| grounds.values().next().cloned()).flatten()
        });
        out.insert(house, report);

        for &other in &houses {
            if other != house {
                intel::report_house_contact(state, house, other);
            }
        }
    }
    Some(out)
}

fn build_setup(
    state: &GameState,
    config: &GameConfig,
    system: SystemId,
    houses: &[HouseId],
) -> EngagementSetup {
    let mut units: Vec<CombatUnit> = Vec::new();
    let mut relations = BTreeMap::new();
    let mut modifiers = BTreeMap::new();
    let mut fleet_roe = BTreeMap::new();
    let mut insertion = 0usize;

    for &a in houses {
        for &b in houses {
            if a != b {
                let relation = state
                    .store
                    .house(a)
                    .map(|h| h.relation_with(b))
                    .unwrap_or_default();
                relations.insert((a, b), relation);
            }
        }
    }

    // Best enemy ELI per house decides whether raiders open from cloak.
    let best_enemy_eli = |house: HouseId| -> u8 {
        houses
            .iter()
            .filter(|&&other| {
                other != house
                    && relations.get(&(house, other)).copied().unwrap_or_default()
                        == DiplomaticState::Enemy
            })
            .filter_map(|other| state.store.house(*other))
            .map(|h| h.tech.eli)
            .max()
            .unwrap_or(0)
    };

    let mut push_squadron = |units: &mut Vec<CombatUnit>,
                             insertion: &mut usize,
                             squadron_id,
                             house: HouseId,
                             fleet: Option<FleetId>,
                             colony_fighter: bool,
                             cloak: u8,
                             enemy_eli: u8| {
        let Some(squadron) = state.store.squadron(squadron_id) else {
            return;
        };
        for ship_id in squadron.ships() {
            let Some(ship) = state.store.ship(ship_id) else {
                continue;
            };
            if ship.is_destroyed() {
                continue;
            }
            let raider = config
                .ship_class(&ship.class)
                .is_some_and(|spec| spec.raider);
            units.push(CombatUnit {
                ship: ship_id,
                house,
                fleet,
                squadron: Some(squadron_id),
                class: ship.class.clone(),
                role: ship.role,
                attack: ship.attack,
                defense: ship.defense,
                crippled_defense: ship.crippled_defense,
                state: ship.combat_state,
                undetected: raider && cloak > enemy_eli,
                colony_fighter,
                insertion: *insertion,
                round_damage: 0,
                stepped_this_round: false,
                retreated: false,
            });
            *insertion += 1;
        }
    };

    for &house in houses {
        let Some(record) = state.store.house(house) else {
            continue;
        };
        let cloak = record.tech.clk;
        let enemy_eli = best_enemy_eli(house);
        for fleet_id in state.store.fleets_at(system) {
            let Some(fleet) = state.store.fleet(fleet_id) else {
                continue;
            };
            if fleet.owner != house {
                continue;
            }
            fleet_roe.insert(fleet_id, fleet.roe);
            for &squadron_id in &fleet.squadrons {
                push_squadron(
                    &mut units,
                    &mut insertion,
                    squadron_id,
                    house,
                    Some(fleet_id),
                    false,
                    cloak,
                    enemy_eli,
                );
            }
            // The spacelift train rides along as targets.
            for &ship_id in &fleet.spacelift {
                let Some(ship) = state.store.ship(ship_id) else {
                    continue;
                };
                if ship.is_destroyed() {
                    continue;
                }
                units.push(CombatUnit {
                    ship: ship_id,
                    house,
                    fleet: Some(fleet_id),
                    squadron: None,
                    class: ship.class.clone(),
                    role: ship.role,
                    attack: ship.attack,
                    defense: ship.defense,
                    crippled_defense: ship.crippled_defense,
                    state: ship.combat_state,
                    undetected: false,
                    colony_fighter: false,
                    insertion,
                    round_damage: 0,
                    stepped_this_round: false,
                    retreated: false,
                });
                insertion += 1;
            }
        }
        if let Some(colony_id) = state.store.colony_at(system) {
            if let Some(colony) = state.store.colony(colony_id) {
                if colony.owner == house {
                    for &squadron_id in &colony.fighter_squadrons {
                        push_squadron(
                            &mut units,
                            &mut insertion,
                            squadron_id,
                            house,
                            None,
                            true,
                            cloak,
                            enemy_eli,
                        );
                    }
                }
            }
        }

        let scout_present = units
            .iter()
            .any(|u| u.house == house && u.role == ShipRole::Scout);
        modifiers.insert(
            house,
            HouseModifiers {
                tech_cer: (i32::from(record.tech.wep) * config.combat.tech_cer_weight)
                    .min(config.combat.tech_cer_cap),
                morale_cer: config
                    .combat
                    .morale_cer
                    .get(record.morale.index())
                    .copied()
                    .unwrap_or(0),
                scout_present,
                starbase_present: state.store.starbase_in_system(system, house),
            },
        );
    }

    EngagementSetup {
        system,
        units,
        modifiers,
        relations,
        fleet_roe,
    }
}

/// Per-fleet retreat destinations: any-lane and non-Restricted variants.
/// Fallback routes are preferred, then the lowest-numbered neighbor.
fn retreat_options(
    state: &GameState,
    system: SystemId,
    setup: &EngagementSetup,
) -> BTreeMap<FleetId, (Option<SystemId>, Option<SystemId>)> {
    let map = Starmap::new(&state.store);
    let mut options = BTreeMap::new();
    for &fleet_id in setup.fleet_roe.keys() {
        let Some(fleet) = state.store.fleet(fleet_id) else {
            continue;
        };
        let fallbacks = state
            .store
            .house(fleet.owner)
            .map(|h| h.fallback_routes.clone())
            .unwrap_or_default();
        let neighbors = map.neighbors(system);
        let pick = |restricted_ok: bool| -> Option<SystemId> {
            let usable: Vec<SystemId> = neighbors
                .iter()
                .filter(|(_, lane)| restricted_ok || *lane != LaneType::Restricted)
                .map(|(id, _)| *id)
                .collect();
            fallbacks
                .iter()
                .copied()
                .find(|preferred| usable.contains(preferred))
                .or_else(|| usable.first().copied())
        };
        options.insert(fleet_id, (pick(true), pick(false)));
    }
    options
}

fn classify_outcome(
    setup: &EngagementSetup,
    result: &space::SpaceResult,
    defender: HouseId,
) -> CombatOutcome {
    if result.rounds_fought == 0 {
        return CombatOutcome::NoContact;
    }
    let side_alive = |is_defender: bool| {
        setup
            .units
            .iter()
            .any(|u| (u.house == defender) == is_defender && u.alive())
    };
    let side_retreated = |is_defender: bool| {
        setup
            .units
            .iter()
            .any(|u| (u.house == defender) == is_defender && u.retreated)
    };
    match (side_alive(false), side_alive(true)) {
        (false, false) => CombatOutcome::MutualDestruction,
        (true, false) => {
            if side_retreated(true) {
                CombatOutcome::DefenderRetreat
            } else {
                CombatOutcome::AttackerVictory
            }
        }
        (false, true) => {
            if side_retreated(false) {
                CombatOutcome::AttackerRetreat
            } else {
                CombatOutcome::DefenderVictory
            }
        }
        (true, true) => CombatOutcome::Stalemate,
    }
}

fn apply_combat_prestige(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    houses: &[HouseId],
    defender: HouseId,
    outcome: CombatOutcome,
) {
    let (winners_defend, losers_defend) = match outcome {
        CombatOutcome::AttackerVictory | CombatOutcome::DefenderRetreat => (false, true),
        CombatOutcome::DefenderVictory | CombatOutcome::AttackerRetreat => (true, false),
        _ => return,
    };
    for &house in houses {
        let defends = house == defender;
        if defends == winners_defend {
            diplomacy::award_prestige(state, config, events, house, PrestigeSource::CombatVictory, None);
        } else if defends == losers_defend {
            diplomacy::award_prestige(state, config, events, house, PrestigeSource::CombatDefeat, None);
        }
    }
}

/// The orbit is contested while any defending non-fighter survives.
fn orbital_control_contested(setup: &EngagementSetup, defender: HouseId) -> bool {
    setup
        .units
        .iter()
        .any(|u| u.house == defender && u.alive() && u.role != ShipRole::Fighter)
}

/// Run bombardment and ground assaults for attacker fleets whose standing
/// directives target the local colony.
#[allow(clippy::too_many_arguments)]
fn surface_theaters(
    state: &mut GameState,
    config: &GameConfig,
    rng: &mut TurnRng,
    events: &mut EventLog,
    system: SystemId,
    defender: HouseId,
    bombardments: &mut BTreeMap<HouseId, ec4x_common::events::BombardmentReport>,
    grounds: &mut BTreeMap<HouseId, ec4x_common::events::GroundReport>,
) {
    let Some(colony_id) = state.store.colony_at(system) else {
        return;
    };
    let fleets: Vec<FleetId> = state.store.fleets_at(system);
    for fleet_id in fleets {
        let Some(fleet) = state.store.fleet(fleet_id) else {
            continue;
        };
        let house = fleet.owner;
        if house == defender {
            continue;
        }
        match fleet.command {
            Some(FleetDirective::Bombard { colony }) if colony == colony_id => {
                let report = ground::bombard(state, config, rng, fleet_id, colony_id);
                bombardments.insert(house, report);
            }
            Some(FleetDirective::Invade { colony }) if colony == colony_id => {
                // Invasions soften the target first, then land.
                let bombardment = ground::bombard(state, config, rng, fleet_id, colony_id);
                bombardments.insert(house, bombardment);
                if let Some(report) = ground::assault(
                    state, config, events, rng, house, fleet_id, colony_id, false,
                ) {
                    grounds.insert(house, report);
                }
                let _ = state.store.update_fleet(fleet_id, |f| f.command = None);
            }
            Some(FleetDirective::Blitz { colony }) if colony == colony_id => {
                // No softening: a blitz goes straight in.
                if let Some(report) = ground::assault(
                    state, config, events, rng, house, fleet_id, colony_id, true,
                ) {
                    grounds.insert(house, report);
                }
                let _ = state.store.update_fleet(fleet_id, |f| f.command = None);
            }
            _ => {}
        }
    }
}

/// One house's view of the battle. Own losses carry ship IDs; enemy losses
/// and survivors are reduced to class names.
fn build_report(
    state: &GameState,
    setup: &EngagementSetup,
    result: &space::SpaceResult,
    house: HouseId,
    system: SystemId,
    outcome: CombatOutcome,
) -> CombatReport {
    let mut report = CombatReport {
        system,
        turn: state.turn,
        outcome,
        own_losses: Vec::new(),
        own_crippled: Vec::new(),
        enemy_losses: Vec::new(),
        enemy_crippled: Vec::new(),
        retreated_own: Vec::new(),
        retreated_enemy: Vec::new(),
        surviving_own: 0,
        surviving_enemy: Vec::new(),
        bombardment: None,
        ground: None,
    };
    for unit in &setup.units {
        let own = unit.house == house;
        match (own, unit.state) {
            (true, CombatState::Destroyed) => {
                report.own_losses.push((unit.ship, unit.class.clone()))
            }
            (true, CombatState::Crippled) => {
                report.own_crippled.push((unit.ship, unit.class.clone()))
            }
            (false, CombatState::Destroyed) => report.enemy_losses.push(unit.class.clone()),
            (false, CombatState::Crippled) => report.enemy_crippled.push(unit.class.clone()),
            _ => {}
        }
        if unit.alive() {
            if own {
                report.surviving_own += 1;
            } else {
                report.surviving_enemy.push(unit.class.clone());
            }
        }
        if unit.retreated && !own {
            report.retreated_enemy.push(unit.class.clone());
        }
    }
    for (fleet_id, _) in &result.retreats {
        let owned = setup
            .units
            .iter()
            .any(|u| u.fleet == Some(*fleet_id) && u.house == house);
        if owned {
            report.retreated_own.push(*fleet_id);
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SquadronAttachment;
    use ec4x_common::coords::Hex;
    use ec4x_common::types::{PlanetClass, ResourceRating, System};

    fn war_state() -> (GameState, GameConfig, HouseId, HouseId, SystemId) {
        let config = GameConfig::default();
        let mut state = GameState::new("war-test");
        let systems = [SystemId::new(1), SystemId::new(2)];
        for (index, id) in systems.into_iter().enumerate() {
            let mut lanes = BTreeMap::new();
            let other = systems[1 - index];
            lanes.insert(other, LaneType::Major);
            state.store.insert_system(System {
                id,
                coords: Hex::new(index as i32, 0),
                lanes,
            });
        }
        let a = state.store.create_house("Atreides", systems[0], 500);
        let b = state.store.create_house("Harkonnen", systems[1], 500);
        for (house, other) in [(a, b), (b, a)] {
            let _ = state.store.update_house(house, |h| {
                h.relations.insert(
                    other,
                    ec4x_common::types::DiplomaticRelation {
                        state: DiplomaticState::Enemy,
                        since_turn: 0,
                    },
                );
            });
        }
        (state, config, a, b, systems[0])
    }

    #[test]
    fn colocated_enemies_fight_and_report_mirrors() {
        let (mut state, config, a, b, system) = war_state();
        let fleet_a = state.store.create_fleet(a, system);
        let fleet_b = state.store.create_fleet(b, system);
        state
            .store
            .commission_squadron(a, SquadronAttachment::Fleet(fleet_a), "Cruiser", &["Corvette"], &config)
            .expect("squadron");
        state
            .store
            .commission_squadron(b, SquadronAttachment::Fleet(fleet_b), "Destroyer", &["Corvette"], &config)
            .expect("squadron");
        let mut events = EventLog::new(1);
        let mut rng = TurnRng::for_turn("war-test", 1);
        state.turn = 1;
        let reports = conflict_phase(&mut state, &config, &mut rng, &mut events);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::CombatResolved { .. })));
        let report_a = &reports[&a][0];
        let report_b = &reports[&b][0];
        // Mirror perspective: each side's own losses carry ship IDs, the
        // opponent's only class names; loss counts cross-agree.
        assert_eq!(report_a.own_losses.len(), report_b.enemy_losses.len());
        assert_eq!(report_b.own_losses.len(), report_a.enemy_losses.len());
        state.store.integrity_check().expect("integrity after combat");
    }

    #[test]
    fn neutral_fleets_do_not_fight() {
        let (mut state, config, a, b, system) = war_state();
        // Reset to neutral.
        for (house, other) in [(a, b), (b, a)] {
            let _ = state.store.update_house(house, |h| {
                h.relations.remove(&other);
            });
        }
        let fleet_a = state.store.create_fleet(a, system);
        let fleet_b = state.store.create_fleet(b, system);
        state
            .store
            .commission_squadron(a, SquadronAttachment::Fleet(fleet_a), "Cruiser", &[], &config)
            .expect("squadron");
        state
            .store
            .commission_squadron(b, SquadronAttachment::Fleet(fleet_b), "Cruiser", &[], &config)
            .expect("squadron");
        let mut events = EventLog::new(1);
        let mut rng = TurnRng::for_turn("war-test", 2);
        let reports = conflict_phase(&mut state, &config, &mut rng, &mut events);
        assert!(reports.is_empty());
        assert!(events.is_empty());
    }

    #[test]
    fn invasion_directive_runs_surface_theaters_after_orbit_clears() {
        let (mut state, config, a, b, system) = war_state();
        let colony = state.store.create_colony(
            system,
            b,
            PlanetClass::Terran,
            ResourceRating::Normal,
            100,
            20,
        );
        let fleet = state.store.create_fleet(a, system);
        state
            .store
            .commission_squadron(a, SquadronAttachment::Fleet(fleet), "Battleship", &["Cruiser"], &config)
            .expect("squadron");
        let transport = state
            .store
            .commission_spacelift(fleet, "TroopTransport", &config)
            .expect("transport");
        let _ = state.store.update_ship(transport, |ship| {
            if let Some(cargo) = ship.cargo.as_mut() {
                cargo.kind = ec4x_common::units::CargoKind::Marines;
                cargo.quantity = 80;
            }
        });
        let _ = state.store.update_fleet(fleet, |f| {
            f.command = Some(FleetDirective::Invade { colony });
        });
        let mut events = EventLog::new(1);
        let mut rng = TurnRng::for_turn("war-test", 3);
        state.turn = 1;
        let reports = conflict_phase(&mut state, &config, &mut rng, &mut events);
        let report_a = &reports[&a][0];
        assert!(report_a.bombardment.is_some());
        assert!(report_a.ground.is_some());
        // With no defending forces at all, the landing must succeed.
        assert_eq!(state.store.colony(colony).unwrap().owner, a);
    }
}
