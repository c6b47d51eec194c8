//! Espionage kernel for EC4X
//!
//! Offensive EBP actions against rival houses, the (ELI, CIC) detection
//! table with starbase hardening, instant and ongoing effects, and effect
//! timer upkeep. Investment conversion lives in the economy kernel.

use ec4x_common::config::GameConfig;
use ec4x_common::events::{EspionageAction, Event, EventLog, PrestigeSource};
use ec4x_common::ids::{HouseId, ShipId};
use ec4x_common::rng::TurnRng;
use ec4x_common::types::TechField;
use ec4x_common::units::ShipRole;

use crate::diplomacy;
use crate::economy;
use crate::orders::EspionageOrder;
use crate::state::{GameState, OngoingEffect};

const TECH_FIELDS: [TechField; 11] = [
    TechField::El,
    TechField::Sl,
    TechField::Cst,
    TechField::Wep,
    TechField::Eli,
    TechField::Cic,
    TechField::Clk,
    TechField::Sld,
    TechField::Ter,
    TechField::Fd,
    TechField::Aco,
];

/// Resolve one house's validated espionage actions in packet order.
pub fn resolve_actions(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    rng: &mut TurnRng,
    house: HouseId,
    orders: &[EspionageOrder],
) {
    for order in orders {
        let Some(action_config) = config.espionage.actions.get(&order.action).copied() else {
            continue;
        };
        let Some(attacker) = state.store.house(house) else {
            return;
        };
        if attacker.espionage.ebp < action_config.cost {
            // Balance moved since validation (earlier action spent it).
            continue;
        }
        let Some(defender) = state.store.house(order.target) else {
            continue;
        };

        let attacker_eli = attacker.tech.eli;
        let mut defender_cic = defender.tech.cic;
        if state.store.starbase_in_system(defender.home_system, order.target) {
            defender_cic = defender_cic.saturating_add(config.espionage.starbase_eli_bonus);
        }

        let _ = state.store.update_house(house, |h| {
            h.espionage.ebp -= action_config.cost;
        });
        events.push(Event::EspionageLaunched {
            attacker: house,
            target: order.target,
            action: order.action,
        });

        apply_effect(state, config, house, order, action_config.magnitude);
        if action_config.duration > 0 {
            state.effects.push(OngoingEffect {
                action: order.action,
                attacker: house,
                target: order.target,
                remaining_turns: action_config.duration,
                magnitude: action_config.magnitude,
            });
        }

        // Detection roll against the (attacker ELI, defender CIC) table.
        let probability = config.detection_probability(attacker_eli, defender_cic);
        if rng.chance(probability) {
            let scout_destroyed = rng.chance(config.espionage.scout_destruction_chance)
                && destroy_one_scout(state, house);
            events.push(Event::EspionageDetected {
                attacker: house,
                defender: order.target,
                action: order.action,
                scout_destroyed,
            });
            diplomacy::award_prestige(
                state,
                config,
                events,
                house,
                PrestigeSource::EspionageExposed,
                None,
            );
            log::debug!(
                "espionage by {house} against {} detected (p={probability:.2})",
                order.target
            );
        }
    }
}

/// Instant effects apply immediately; ongoing ones are handled by the
/// Income Phase while their timer runs.
fn apply_effect(
    state: &mut GameState,
    config: &GameConfig,
    house: HouseId,
    order: &EspionageOrder,
    magnitude: f64,
) {
    match order.action {
        EspionageAction::TechTheft => {
            let (Some(attacker), Some(target)) =
                (state.store.house(house), state.store.house(order.target))
            else {
                return;
            };
            let field = TECH_FIELDS
                .iter()
                .copied()
                .find(|&f| target.tech.level(f) > attacker.tech.level(f));
            if let Some(field) = field {
                let next = attacker.tech.level(field).saturating_add(1);
                let cost = economy::research_level_cost(config, &state.store, house, field, next);
                let stolen = (f64::from(cost) * magnitude).floor() as u32;
                let _ = state.store.update_house(house, |h| {
                    *h.research.entry(field).or_default() += stolen;
                });
            }
        }
        EspionageAction::SabotageLow | EspionageAction::SabotageHigh => {
            let target_colony = state
                .store
                .colonies_of(order.target)
                .into_iter()
                .max_by_key(|id| {
                    state
                        .store
                        .colony(*id)
                        .map(|c| c.industrial_units)
                        .unwrap_or(0)
                });
            if let Some(colony_id) = target_colony {
                let _ = state.store.update_colony(colony_id, |c| {
                    let destroyed =
                        ((f64::from(c.industrial_units) * magnitude).floor() as u32).max(1);
                    c.industrial_units = c.industrial_units.saturating_sub(destroyed);
                });
            }
        }
        EspionageAction::Assassination => {
            // Decapitation: the victim's largest research program dies with
            // its lead.
            let victim_bank = state.store.house(order.target).and_then(|h| {
                h.research
                    .iter()
                    .max_by_key(|(_, &pp)| pp)
                    .map(|(&field, _)| field)
            });
            if let Some(field) = victim_bank {
                let _ = state.store.update_house(order.target, |h| {
                    h.research.remove(&field);
                });
            }
        }
        // Ongoing effects do their work each Income Phase.
        EspionageAction::CyberAttack
        | EspionageAction::EconomicManipulation
        | EspionageAction::PsyopsCampaign => {}
    }
}

/// Destroy the attacker's lowest-numbered scout, if one exists.
fn destroy_one_scout(state: &mut GameState, house: HouseId) -> bool {
    let scout: Option<ShipId> = state
        .store
        .ships()
        .iter()
        .filter(|(_, ship)| ship.role == ShipRole::Scout)
        .filter(|(id, _)| {
            owner_of_ship(state, **id) == Some(house)
        })
        .map(|(id, _)| *id)
        .next();
    match scout {
        Some(ship_id) => state.store.delete_ship(ship_id).is_ok(),
        None => false,
    }
}

fn owner_of_ship(state: &GameState, ship: ShipId) -> Option<HouseId> {
    let record = state.store.ship(ship)?;
    if let Some(squadron) = record.squadron {
        return state.store.squadron(squadron).map(|s| s.owner);
    }
    state
        .store
        .fleets()
        .values()
        .find(|fleet| fleet.spacelift.contains(&ship))
        .map(|fleet| fleet.owner)
}

/// Decrement ongoing-effect timers; emit expiry events.
pub fn tick_effects(state: &mut GameState, events: &mut EventLog) {
    let mut kept = Vec::with_capacity(state.effects.len());
    for mut effect in std::mem::take(&mut state.effects) {
        effect.remaining_turns = effect.remaining_turns.saturating_sub(1);
        if effect.remaining_turns == 0 {
            events.push(Event::EspionageEffectExpired {
                house: effect.target,
                action: effect.action,
            });
        } else {
            kept.push(effect);
        }
    }
    state.effects = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ec4x_common::coords::Hex;
    use ec4x_common::ids::SystemId;
    use ec4x_common::types::{PlanetClass, ResourceRating, System};
    use std::collections::BTreeMap;

    fn spy_state() -> (GameState, HouseId, HouseId) {
        let mut state = GameState::new("spy-test");
        let system = SystemId::new(1);
        state.store.insert_system(System {
            id: system,
            coords: Hex::origin(),
            lanes: BTreeMap::new(),
        });
        let a = state.store.create_house("Atreides", system, 100);
        let b = state.store.create_house("Harkonnen", system, 100);
        state.store.create_colony(
            system,
            b,
            PlanetClass::Terran,
            ResourceRating::Normal,
            100,
            40,
        );
        let _ = state.store.update_house(a, |h| h.espionage.ebp = 50);
        (state, a, b)
    }

    #[test]
    fn sabotage_destroys_industry() {
        let config = GameConfig::default();
        let (mut state, a, b) = spy_state();
        let mut events = EventLog::new(1);
        let mut rng = TurnRng::for_turn("spy-test", 1);
        resolve_actions(
            &mut state,
            &config,
            &mut events,
            &mut rng,
            a,
            &[EspionageOrder {
                action: EspionageAction::SabotageHigh,
                target: b,
            }],
        );
        let colony_id = state.store.colonies_of(b)[0];
        let iu = state.store.colony(colony_id).unwrap().industrial_units;
        // 25% of 40 destroyed.
        assert_eq!(iu, 30);
        // EBP spent.
        assert_eq!(
            state.store.house(a).unwrap().espionage.ebp,
            50 - config.espionage.actions[&EspionageAction::SabotageHigh].cost
        );
    }

    #[test]
    fn ongoing_actions_register_effects_and_expire() {
        let config = GameConfig::default();
        let (mut state, a, b) = spy_state();
        let mut events = EventLog::new(1);
        let mut rng = TurnRng::for_turn("spy-test", 2);
        resolve_actions(
            &mut state,
            &config,
            &mut events,
            &mut rng,
            a,
            &[EspionageOrder {
                action: EspionageAction::EconomicManipulation,
                target: b,
            }],
        );
        assert_eq!(state.effects.len(), 1);
        let duration = config.espionage.actions[&EspionageAction::EconomicManipulation].duration;
        for _ in 0..duration {
            tick_effects(&mut state, &mut events);
        }
        assert!(state.effects.is_empty());
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::EspionageEffectExpired { .. })));
    }

    #[test]
    fn tech_theft_banks_stolen_progress() {
        let config = GameConfig::default();
        let (mut state, a, b) = spy_state();
        let _ = state.store.update_house(b, |h| h.tech.wep = 3);
        let mut events = EventLog::new(1);
        let mut rng = TurnRng::for_turn("spy-test", 3);
        resolve_actions(
            &mut state,
            &config,
            &mut events,
            &mut rng,
            a,
            &[EspionageOrder {
                action: EspionageAction::TechTheft,
                target: b,
            }],
        );
        let banked = state
            .store
            .house(a)
            .unwrap()
            .research
            .get(&TechField::Wep)
            .copied()
            .unwrap_or(0);
        assert!(banked > 0);
    }
}
