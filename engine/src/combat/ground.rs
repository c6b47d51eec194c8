//! Planetary theaters for EC4X: bombardment and ground assault
//!
//! Both run only after the attacker holds the orbit. Bombardment is capped
//! at three rounds per turn; planetary shields block a chance-weighted
//! fraction of incoming damage, Planet-Breakers bypass them entirely.
//! Ground assaults come in two variants: invasion (bombardment-softened,
//! wrecks infrastructure on success) and blitz (no prior bombardment,
//! seizes assets intact, loses every marine on failure).

use ec4x_common::config::GameConfig;
use ec4x_common::events::{BombardmentReport, Event, EventLog, GroundReport, PrestigeSource};
use ec4x_common::ids::{ColonyId, FleetId, HouseId};
use ec4x_common::rng::TurnRng;
use ec4x_common::units::{CargoKind, GroundUnitClass};

use crate::diplomacy;
use crate::state::GameState;

/// Total attack strength a fleet can bring to bear on a surface target,
/// split into shielded and shield-bypassing components.
fn bombard_strength(state: &GameState, fleet: FleetId, config: &GameConfig) -> (u32, u32) {
    let mut shielded = 0u32;
    let mut bypassing = 0u32;
    for ship_id in state.store.ships_in_fleet(fleet) {
        let Some(ship) = state.store.ship(ship_id) else {
            continue;
        };
        if ship.is_destroyed() || ship.attack == 0 {
            continue;
        }
        let breaker = config
            .ship_class(&ship.class)
            .is_some_and(|spec| spec.planet_breaker);
        if breaker {
            bypassing += ship.attack;
        } else {
            shielded += ship.attack;
        }
    }
    (shielded, bypassing)
}

/// Marines loaded across a fleet's spacelift train.
pub fn marines_aboard(state: &GameState, fleet: FleetId) -> u32 {
    let Some(record) = state.store.fleet(fleet) else {
        return 0;
    };
    record
        .spacelift
        .iter()
        .filter_map(|id| state.store.ship(*id))
        .filter_map(|ship| ship.cargo)
        .filter(|cargo| cargo.kind == CargoKind::Marines)
        .map(|cargo| cargo.quantity)
        .sum()
}

fn spend_marines(state: &mut GameState, fleet: FleetId, mut count: u32) {
    let Some(record) = state.store.fleet(fleet) else {
        return;
    };
    for ship_id in record.spacelift.clone() {
        if count == 0 {
            break;
        }
        let carried = state
            .store
            .ship(ship_id)
            .and_then(|s| s.cargo)
            .filter(|c| c.kind == CargoKind::Marines)
            .map(|c| c.quantity)
            .unwrap_or(0);
        if carried == 0 {
            continue;
        }
        let spent = carried.min(count);
        count -= spent;
        let _ = state.store.update_ship(ship_id, |ship| {
            if let Some(cargo) = ship.cargo.as_mut() {
                cargo.quantity -= spent;
                if cargo.quantity == 0 {
                    cargo.kind = CargoKind::None;
                }
            }
        });
    }
}

/// Bombard a colony for up to the configured number of rounds. Records IU
/// destroyed, batteries destroyed, and PU casualties.
pub fn bombard(
    state: &mut GameState,
    config: &GameConfig,
    rng: &mut TurnRng,
    fleet: FleetId,
    colony: ColonyId,
) -> BombardmentReport {
    let mut report = BombardmentReport::default();
    let Some(defender) = state.store.colony(colony).map(|c| c.owner) else {
        return report;
    };
    let shield_level = state
        .store
        .house(defender)
        .map(|h| h.tech.sld)
        .unwrap_or(0);
    let has_shield_unit = state.store.colony(colony).is_some_and(|c| {
        c.ground_units.iter().any(|id| {
            state
                .store
                .ground_unit(*id)
                .is_some_and(|u| u.class == GroundUnitClass::PlanetaryShield)
        })
    });
    let cfg = &config.combat.bombardment;
    let block_chance = if has_shield_unit {
        (f64::from(shield_level) * cfg.shield_block_chance_per_level)
            .min(cfg.shield_block_chance_cap)
    } else {
        0.0
    };

    for _ in 0..cfg.max_rounds {
        let (shielded, bypassing) = bombard_strength(state, fleet, config);
        if shielded + bypassing == 0 {
            break;
        }
        let mut damage = f64::from(shielded);
        if block_chance > 0.0 && rng.chance(block_chance) {
            damage *= 1.0 - cfg.shield_block_percentage;
        }
        let net = damage.floor() as u32 + bypassing;
        if net == 0 {
            continue;
        }
        report.rounds += 1;

        let iu_destroyed = net / cfg.iu_damage_divisor;
        let casualties = (f64::from(net) * cfg.pu_casualty_factor).floor() as u32;
        let battery_hits = net / cfg.battery_damage_divisor;

        let mut batteries_destroyed = 0;
        for _ in 0..battery_hits {
            let target = state.store.colony(colony).and_then(|c| {
                c.ground_units.iter().copied().find(|id| {
                    state
                        .store
                        .ground_unit(*id)
                        .is_some_and(|u| u.class == GroundUnitClass::GroundBattery)
                })
            });
            let Some(unit_id) = target else {
                break;
            };
            if state.store.delete_ground_unit(unit_id).is_ok() {
                batteries_destroyed += 1;
            }
        }

        let mut applied_iu = 0;
        let mut applied_pu = 0;
        let _ = state.store.update_colony(colony, |c| {
            applied_iu = c.industrial_units.min(iu_destroyed);
            applied_pu = c.population.min(casualties);
            c.industrial_units -= applied_iu;
            c.population -= applied_pu;
        });
        report.iu_destroyed += applied_iu;
        report.pu_casualties += applied_pu;
        report.batteries_destroyed += batteries_destroyed;
    }
    report
}

/// Resolve an invasion or blitz. Returns the report; colony ownership and
/// prestige flow through the state.
pub fn assault(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    rng: &mut TurnRng,
    attacker: HouseId,
    fleet: FleetId,
    colony: ColonyId,
    blitz: bool,
) -> Option<GroundReport> {
    let marines = marines_aboard(state, fleet);
    if marines == 0 {
        return None;
    }
    let defender = state.store.colony(colony).map(|c| c.owner)?;
    let marine_attack = config
        .ground_units
        .get(&GroundUnitClass::Marine)
        .map(|s| s.attack)
        .unwrap_or(1);

    let defender_units: Vec<_> = state
        .store
        .colony(colony)
        .map(|c| c.ground_units.clone())
        .unwrap_or_default();
    let defender_power: u32 = defender_units
        .iter()
        .filter_map(|id| state.store.ground_unit(*id))
        .filter_map(|unit| config.ground_units.get(&unit.class))
        .map(|spec| spec.defense)
        .sum::<u32>()
        + state.store.colony(colony).map(|c| c.population / 20).unwrap_or(0)
        + state.store.colony(colony).map(|c| c.marines).unwrap_or(0) * marine_attack / 2;

    let attacker_power = marines * marine_attack;
    let attacker_roll = u32::from(rng.d10());
    let defender_roll = u32::from(rng.d10());
    let attacker_score = f64::from(attacker_power) * f64::from(10 + attacker_roll);
    let mut defender_score = f64::from(defender_power.max(1)) * f64::from(10 + defender_roll);
    if blitz {
        defender_score *= config.combat.invasion.blitz_margin;
    }
    let attacker_won = attacker_score > defender_score;

    let mut report = GroundReport {
        colony,
        blitz,
        attacker_won,
        attacker_losses: 0,
        defender_losses: 0,
    };

    if attacker_won {
        // Proportional marine losses, then the survivors garrison.
        let losses = (marines * defender_power / (attacker_power + defender_power.max(1)))
            .min(marines.saturating_sub(1));
        let survivors = marines - losses;
        report.attacker_losses = losses;
        report.defender_losses = defender_units.len() as u32;
        spend_marines(state, fleet, marines);

        for unit_id in defender_units {
            let _ = state.store.delete_ground_unit(unit_id);
        }
        let fighters = state
            .store
            .colony(colony)
            .map(|c| c.fighter_squadrons.clone())
            .unwrap_or_default();
        for squadron_id in fighters {
            let _ = state.store.delete_squadron(squadron_id);
        }

        let system = state.store.colony(colony).map(|c| c.system);
        let _ = state.store.update_colony(colony, |c| {
            c.owner = attacker;
            c.marines = if blitz { c.marines + survivors } else { survivors };
            c.construction_queue.clear();
            if !blitz {
                c.infrastructure = ((f64::from(c.infrastructure)
                    * (1.0 - config.combat.invasion.infrastructure_loss))
                    .floor()) as u32;
                let destroyed = (f64::from(c.industrial_units)
                    * config.combat.invasion.iu_destroyed_ratio)
                    .floor() as u32;
                c.industrial_units -= destroyed;
            }
        });
        if let Some(system) = system {
            events.push(Event::ColonyCaptured {
                system,
                colony,
                from: defender,
                to: attacker,
            });
        }
        let source = if blitz {
            PrestigeSource::BlitzSuccess
        } else {
            PrestigeSource::InvasionSuccess
        };
        diplomacy::award_prestige(state, config, events, attacker, source, None);
    } else if blitz {
        // A failed blitz forfeits the entire landing force.
        report.attacker_losses = marines;
        spend_marines(state, fleet, marines);
    } else {
        // A failed invasion grinds down half the landing force.
        let losses = marines.div_ceil(2);
        report.attacker_losses = losses;
        spend_marines(state, fleet, losses);
    }

    Some(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SquadronAttachment;
    use ec4x_common::coords::Hex;
    use ec4x_common::ids::SystemId;
    use ec4x_common::types::{PlanetClass, ResourceRating, System};
    use ec4x_common::units::GarrisonSite;
    use std::collections::BTreeMap;

    fn assault_state() -> (GameState, GameConfig, HouseId, HouseId, FleetId, ColonyId) {
        let config = GameConfig::default();
        let mut state = GameState::new("ground-test");
        let system = SystemId::new(1);
        state.store.insert_system(System {
            id: system,
            coords: Hex::origin(),
            lanes: BTreeMap::new(),
        });
        let attacker = state.store.create_house("Atreides", system, 100);
        let defender = state.store.create_house("Harkonnen", system, 100);
        let colony = state.store.create_colony(
            system,
            defender,
            PlanetClass::Terran,
            ResourceRating::Normal,
            100,
            40,
        );
        let fleet = state.store.create_fleet(attacker, system);
        let transport = state
            .store
            .commission_spacelift(fleet, "TroopTransport", &config)
            .expect("transport");
        let _ = state.store.update_ship(transport, |ship| {
            if let Some(cargo) = ship.cargo.as_mut() {
                cargo.kind = CargoKind::Marines;
                cargo.quantity = 60;
            }
        });
        (state, config, attacker, defender, fleet, colony)
    }

    #[test]
    fn overwhelming_invasion_captures_and_wrecks_infrastructure() {
        let (mut state, config, attacker, _, fleet, colony) = assault_state();
        let before_infra = state.store.colony(colony).unwrap().infrastructure;
        let mut events = EventLog::new(1);
        let mut rng = TurnRng::for_turn("ground-test", 1);
        let report = assault(
            &mut state, &config, &mut events, &mut rng, attacker, fleet, colony, false,
        )
        .expect("marines aboard");
        assert!(report.attacker_won);
        let captured = state.store.colony(colony).unwrap();
        assert_eq!(captured.owner, attacker);
        assert!(captured.infrastructure < before_infra);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::ColonyCaptured { .. })));
    }

    #[test]
    fn blitz_preserves_assets_intact() {
        let (mut state, config, attacker, _, fleet, colony) = assault_state();
        let before = state.store.colony(colony).unwrap().clone();
        let mut events = EventLog::new(1);
        let mut rng = TurnRng::for_turn("ground-test", 2);
        let report = assault(
            &mut state, &config, &mut events, &mut rng, attacker, fleet, colony, true,
        )
        .expect("marines aboard");
        let after = state.store.colony(colony).unwrap();
        if report.attacker_won {
            assert_eq!(after.owner, attacker);
            assert_eq!(after.infrastructure, before.infrastructure);
            assert_eq!(after.industrial_units, before.industrial_units);
        } else {
            // A failed blitz destroys every attacking marine.
            assert_eq!(marines_aboard(&state, fleet), 0);
            assert_eq!(after.owner, before.owner);
        }
    }

    #[test]
    fn bombardment_records_losses() {
        let (mut state, config, _, defender, fleet, colony) = assault_state();
        // Give the attacker real guns and the defender a battery.
        let attacker = state.store.fleet(fleet).unwrap().owner;
        state
            .store
            .commission_squadron(
                attacker,
                SquadronAttachment::Fleet(fleet),
                "Battleship",
                &["Cruiser"],
                &config,
            )
            .expect("squadron");
        state
            .store
            .create_ground_unit(defender, GroundUnitClass::GroundBattery, GarrisonSite::Colony(colony));
        let mut rng = TurnRng::for_turn("ground-test", 3);
        let report = bombard(&mut state, &config, &mut rng, fleet, colony);
        assert!(report.rounds >= 1);
        assert!(report.iu_destroyed > 0 || report.pu_casualties > 0);
    }

    #[test]
    fn planet_breaker_bypasses_shields() {
        let (mut state, config, attacker, defender, fleet, colony) = assault_state();
        let _ = state.store.update_house(defender, |h| h.tech.sld = 8);
        state
            .store
            .create_ground_unit(defender, GroundUnitClass::PlanetaryShield, GarrisonSite::Colony(colony));
        state
            .store
            .commission_squadron(
                attacker,
                SquadronAttachment::Fleet(fleet),
                "PlanetBreaker",
                &[],
                &config,
            )
            .expect("squadron");
        let mut rng = TurnRng::for_turn("ground-test", 4);
        let report = bombard(&mut state, &config, &mut rng, fleet, colony);
        // 20 bypassing attack per round over 3 rounds: 2 IU per round at
        // divisor 10, regardless of shield rolls.
        assert!(report.iu_destroyed >= 6);
    }
}
