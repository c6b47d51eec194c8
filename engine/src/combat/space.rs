//! Space-theater resolution for EC4X
//!
//! Rounds run three phases in order: Ambush (undetected raiders), then
//! Intercept (fighters, simultaneously), then the Main engagement. Every
//! unit rolls 1d10 + CER against the configured target number; hits bank
//! damage on the chosen target, and banked damage moves a target at most
//! one combat-state step per round.

use std::collections::BTreeMap;

use ec4x_common::config::GameConfig;
use ec4x_common::ids::{FleetId, HouseId, ShipId, SquadronId, SystemId};
use ec4x_common::rng::TurnRng;
use ec4x_common::types::DiplomaticState;
use ec4x_common::units::{CombatState, ShipRole};

/// A ship's combat-side view for the duration of one engagement.
#[derive(Debug, Clone)]
pub struct CombatUnit {
    pub ship: ShipId,
    pub house: HouseId,
    /// None for colony-owned fighter squadrons.
    pub fleet: Option<FleetId>,
    /// None for spacelift hulls riding a fleet train.
    pub squadron: Option<SquadronId>,
    pub class: String,
    pub role: ShipRole,
    pub attack: u32,
    pub defense: u32,
    pub crippled_defense: u32,
    pub state: CombatState,
    /// Raiders opening from cloak; cleared after they act once.
    pub undetected: bool,
    pub colony_fighter: bool,
    /// Stable tie-break position.
    pub insertion: usize,
    /// Damage banked against this unit in the current round.
    pub round_damage: u32,
    /// A unit steps at most once per round.
    pub stepped_this_round: bool,
    pub retreated: bool,
}

impl CombatUnit {
    pub fn alive(&self) -> bool {
        self.state != CombatState::Destroyed && !self.retreated
    }

    pub fn effective_defense(&self) -> u32 {
        match self.state {
            CombatState::Undamaged => self.defense,
            CombatState::Crippled => self.crippled_defense,
            CombatState::Destroyed => 0,
        }
    }
}

/// Per-house modifiers fixed at engagement start.
#[derive(Debug, Clone, Copy, Default)]
pub struct HouseModifiers {
    pub tech_cer: i32,
    pub morale_cer: i32,
    pub scout_present: bool,
    pub starbase_present: bool,
}

/// Relations snapshot used for the diplomatic targeting filter.
pub struct EngagementSetup {
    pub system: SystemId,
    pub units: Vec<CombatUnit>,
    pub modifiers: BTreeMap<HouseId, HouseModifiers>,
    pub relations: BTreeMap<(HouseId, HouseId), DiplomaticState>,
    /// Rules of engagement per fleet, for retreat checks.
    pub fleet_roe: BTreeMap<FleetId, u8>,
}

/// What a finished space battle reports back to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct SpaceResult {
    pub rounds_fought: u32,
    pub any_damage: bool,
    /// Fleets that withdrew, with their destination.
    pub retreats: Vec<(FleetId, SystemId)>,
}

impl EngagementSetup {
    pub fn hostile(&self, a: HouseId, b: HouseId) -> bool {
        self.relations.get(&(a, b)).copied().unwrap_or_default() == DiplomaticState::Enemy
    }

    fn hostile_pair_alive(&self) -> bool {
        for a in self.units.iter().filter(|u| u.alive()) {
            for b in self.units.iter().filter(|u| u.alive()) {
                if self.hostile(a.house, b.house) {
                    return true;
                }
            }
        }
        false
    }

    fn cer(&self, unit: &CombatUnit, config: &GameConfig, ambush: bool, desperation: bool) -> i32 {
        let modifiers = self.modifiers.get(&unit.house).copied().unwrap_or_default();
        let mut cer = modifiers.tech_cer + modifiers.morale_cer;
        if modifiers.scout_present {
            cer += config.combat.scout_bonus;
        }
        if modifiers.starbase_present {
            cer += config.combat.starbase_bonus;
        }
        if ambush {
            cer += config.combat.ambush_bonus;
        }
        if desperation {
            cer += config.combat.desperation_bonus;
        }
        cer
    }

    /// Targeting policy: walk the attacker role's bucket priorities, filter
    /// to live Enemy units, and break ties by highest attack, then the
    /// damage ladder (closest to destruction first), then insertion order.
    fn select_target(&self, attacker_index: usize, config: &GameConfig) -> Option<usize> {
        let attacker = &self.units[attacker_index];
        let priorities = config.combat.targeting.get(&attacker.role)?;
        for bucket in priorities {
            let mut candidates: Vec<usize> = self
                .units
                .iter()
                .enumerate()
                .filter(|(index, unit)| {
                    *index != attacker_index
                        && unit.alive()
                        && unit.role.bucket() == *bucket
                        && self.hostile(attacker.house, unit.house)
                })
                .map(|(index, _)| index)
                .collect();
            if candidates.is_empty() {
                continue;
            }
            candidates.sort_by(|&x, &y| {
                let ux = &self.units[x];
                let uy = &self.units[y];
                uy.attack
                    .cmp(&ux.attack)
                    .then(uy.state.cmp(&ux.state))
                    .then(ux.insertion.cmp(&uy.insertion))
            });
            return candidates.first().copied();
        }
        // No priority bucket matched; fall back to any live enemy.
        self.units
            .iter()
            .enumerate()
            .filter(|(index, unit)| {
                *index != attacker_index && unit.alive() && self.hostile(attacker.house, unit.house)
            })
            .map(|(index, _)| index)
            .next()
    }

    fn bank_damage(&mut self, target: usize, amount: u32) -> bool {
        let unit = &mut self.units[target];
        unit.round_damage += amount;
        if !unit.stepped_this_round && unit.round_damage >= unit.effective_defense().max(1) {
            unit.state = unit.state.one_step_worse();
            unit.stepped_this_round = true;
            return true;
        }
        false
    }

    /// Indices acting in a phase, in canonical order. Unarmed hulls are
    /// targets, never actors.
    fn actors(&self, phase: Phase) -> Vec<usize> {
        let mut actors: Vec<usize> = self
            .units
            .iter()
            .enumerate()
            .filter(|(_, unit)| unit.alive() && unit.attack > 0)
            .filter(|(_, unit)| match phase {
                Phase::Ambush => unit.undetected,
                Phase::Intercept => unit.role == ShipRole::Fighter,
                Phase::Main => !unit.undetected && unit.role != ShipRole::Fighter,
            })
            .map(|(index, _)| index)
            .collect();
        actors.sort_by_key(|&index| self.units[index].insertion);
        actors
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Ambush,
    Intercept,
    Main,
}

/// Fight the space theater to completion. Ship-state changes stay on the
/// setup's units; the orchestrator writes them back to the store.
pub fn fight(
    setup: &mut EngagementSetup,
    config: &GameConfig,
    rng: &mut TurnRng,
    retreat_destination: &mut dyn FnMut(FleetId, bool) -> Option<SystemId>,
) -> SpaceResult {
    let mut result = SpaceResult::default();
    let mut damage_less_rounds = 0u32;

    while setup.hostile_pair_alive() && result.rounds_fought < config.combat.max_rounds {
        result.rounds_fought += 1;
        let desperation = damage_less_rounds >= config.combat.desperation_rounds;
        let mut round_damage = false;

        // Phase 1: Ambush. Undetected raiders act, then stand revealed.
        for attacker in setup.actors(Phase::Ambush) {
            if !setup.units[attacker].alive() {
                continue;
            }
            if let Some(target) = setup.select_target(attacker, config) {
                let roll = i32::from(rng.d10());
                let cer = setup.cer(&setup.units[attacker], config, true, desperation);
                if roll + cer >= config.combat.target_number {
                    let attack = setup.units[attacker].attack;
                    round_damage |= setup.bank_damage(target, attack);
                }
            }
            setup.units[attacker].undetected = false;
        }

        // Phase 2: Intercept. Fighters fire simultaneously: targets and
        // hits resolve against the phase-start state.
        let mut intercept_hits: Vec<(usize, u32)> = Vec::new();
        for attacker in setup.actors(Phase::Intercept) {
            if !setup.units[attacker].alive() {
                continue;
            }
            if let Some(target) = setup.select_target(attacker, config) {
                let roll = i32::from(rng.d10());
                let cer = setup.cer(&setup.units[attacker], config, false, desperation);
                if roll + cer >= config.combat.target_number {
                    intercept_hits.push((target, setup.units[attacker].attack));
                }
            }
        }
        for (target, attack) in intercept_hits {
            round_damage |= setup.bank_damage(target, attack);
        }

        // Phase 3: Main engagement.
        for attacker in setup.actors(Phase::Main) {
            if !setup.units[attacker].alive()
                || setup.units[attacker].state == CombatState::Destroyed
            {
                continue;
            }
            if let Some(target) = setup.select_target(attacker, config) {
                let roll = i32::from(rng.d10());
                let cer = setup.cer(&setup.units[attacker], config, false, desperation);
                if roll + cer >= config.combat.target_number {
                    let attack = setup.units[attacker].attack;
                    round_damage |= setup.bank_damage(target, attack);
                }
            }
        }

        if round_damage {
            damage_less_rounds = 0;
            result.any_damage = true;
        } else {
            damage_less_rounds += 1;
        }

        // Round end: reset banks, evaluate retreats per fleet.
        for unit in &mut setup.units {
            unit.round_damage = 0;
            unit.stepped_this_round = false;
        }
        evaluate_retreats(setup, config, &mut result, retreat_destination);
    }

    result
}

/// A fleet withdraws when its casualties outrun its Rules of Engagement,
/// morale-adjusted. Colony fighters never retreat; carrier fighters leave
/// with their carrier (they share the fleet).
fn evaluate_retreats(
    setup: &mut EngagementSetup,
    config: &GameConfig,
    result: &mut SpaceResult,
    retreat_destination: &mut dyn FnMut(FleetId, bool) -> Option<SystemId>,
) {
    let fleet_ids: Vec<FleetId> = setup.fleet_roe.keys().copied().collect();
    for fleet_id in fleet_ids {
        let members: Vec<usize> = setup
            .units
            .iter()
            .enumerate()
            .filter(|(_, unit)| unit.fleet == Some(fleet_id) && !unit.retreated)
            .map(|(index, _)| index)
            .collect();
        if members.is_empty() {
            continue;
        }
        let total = members.len() as f64;
        let hurt = members
            .iter()
            .filter(|&&index| setup.units[index].state != CombatState::Undamaged)
            .count() as f64;
        if hurt == 0.0 {
            continue;
        }
        let house = setup.units[members[0]].house;
        let morale_cer = setup
            .modifiers
            .get(&house)
            .map(|m| m.morale_cer)
            .unwrap_or(0);
        let roe = i32::from(setup.fleet_roe.get(&fleet_id).copied().unwrap_or(5));
        let pressure = (hurt / total * 10.0).round() as i32;
        if pressure <= roe + morale_cer {
            continue;
        }
        // Crippled ships cannot use Restricted lanes; the destination
        // callback honors that constraint.
        let has_crippled = members
            .iter()
            .any(|&index| setup.units[index].state == CombatState::Crippled);
        let Some(destination) = retreat_destination(fleet_id, has_crippled) else {
            continue;
        };
        for index in members {
            let unit = &mut setup.units[index];
            if unit.state != CombatState::Destroyed {
                unit.retreated = true;
            }
        }
        result.retreats.push((fleet_id, destination));
        log::debug!("fleet {fleet_id} retreats to {destination}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(
        ship: u64,
        house: u64,
        fleet: Option<u64>,
        role: ShipRole,
        attack: u32,
        defense: u32,
        undetected: bool,
        insertion: usize,
    ) -> CombatUnit {
        CombatUnit {
            ship: ShipId::new(ship),
            house: HouseId::new(house),
            fleet: fleet.map(FleetId::new),
            squadron: Some(SquadronId::new(ship)),
            class: format!("{role:?}"),
            role,
            attack,
            defense,
            crippled_defense: defense / 2,
            state: CombatState::Undamaged,
            undetected,
            colony_fighter: false,
            insertion,
            round_damage: 0,
            stepped_this_round: false,
            retreated: false,
        }
    }

    fn setup_between(units: Vec<CombatUnit>) -> EngagementSetup {
        let mut relations = BTreeMap::new();
        relations.insert((HouseId::new(1), HouseId::new(2)), DiplomaticState::Enemy);
        relations.insert((HouseId::new(2), HouseId::new(1)), DiplomaticState::Enemy);
        let mut fleet_roe = BTreeMap::new();
        for u in &units {
            if let Some(fleet) = u.fleet {
                fleet_roe.insert(fleet, 10);
            }
        }
        EngagementSetup {
            system: SystemId::new(1),
            units,
            modifiers: BTreeMap::new(),
            relations,
            fleet_roe,
        }
    }

    #[test]
    fn ambush_lets_raiders_strike_before_main_phase() {
        // Two undetected raiders against unarmed pickets: every point of
        // damage must land in the Ambush phase, before any defender acts.
        let config = GameConfig::default();
        let mut setup = setup_between(vec![
            unit(1, 1, Some(10), ShipRole::Escort, 5, 3, true, 0),
            unit(2, 1, Some(10), ShipRole::Escort, 5, 3, true, 1),
            unit(3, 2, Some(20), ShipRole::Scout, 0, 2, false, 2),
            unit(4, 2, Some(20), ShipRole::Escort, 0, 4, false, 3),
        ]);
        let mut rng = TurnRng::for_turn("ambush-test", 1);
        let result = fight(&mut setup, &config, &mut rng, &mut |_, _| None);
        assert!(result.rounds_fought >= 1);
        assert!(result.any_damage);
        let defender_states: Vec<CombatState> = setup
            .units
            .iter()
            .filter(|u| u.house == HouseId::new(2))
            .map(|u| u.state)
            .collect();
        assert!(defender_states.iter().any(|s| *s != CombatState::Undamaged));
        // The raiders never took a scratch from targets that cannot shoot.
        assert!(setup
            .units
            .iter()
            .filter(|u| u.house == HouseId::new(1))
            .all(|u| u.state == CombatState::Undamaged));
    }

    #[test]
    fn no_hostiles_means_no_rounds() {
        let config = GameConfig::default();
        let mut setup = setup_between(vec![unit(
            1,
            1,
            Some(10),
            ShipRole::Capital,
            8,
            6,
            false,
            0,
        )]);
        let mut rng = TurnRng::for_turn("solo-test", 1);
        let result = fight(&mut setup, &config, &mut rng, &mut |_, _| None);
        assert_eq!(result.rounds_fought, 0);
        assert!(!result.any_damage);
    }

    #[test]
    fn single_round_cannot_skip_states() {
        let config = GameConfig::default();
        // One overwhelming attacker: damage banks far past the defender's
        // defense, but only one step may happen per round.
        let mut setup = setup_between(vec![
            unit(1, 1, Some(10), ShipRole::Capital, 50, 10, false, 0),
            unit(2, 2, Some(20), ShipRole::Escort, 1, 2, false, 1),
        ]);
        let mut rng = TurnRng::for_turn("skip-test", 3);
        // Run exactly one round by setting max_rounds to 1.
        let mut config = config;
        config.combat.max_rounds = 1;
        let _ = fight(&mut setup, &config, &mut rng, &mut |_, _| None);
        let defender = &setup.units[1];
        assert_ne!(defender.state, CombatState::Destroyed);
    }

    #[test]
    fn deterministic_for_same_seed() {
        let config = GameConfig::default();
        let build = || {
            setup_between(vec![
                unit(1, 1, Some(10), ShipRole::Capital, 8, 6, false, 0),
                unit(2, 1, Some(10), ShipRole::Escort, 5, 4, false, 1),
                unit(3, 2, Some(20), ShipRole::Capital, 8, 6, false, 2),
                unit(4, 2, Some(20), ShipRole::Escort, 5, 4, false, 3),
            ])
        };
        let mut setup_a = build();
        let mut setup_b = build();
        let mut rng_a = TurnRng::for_turn("det-test", 7);
        let mut rng_b = TurnRng::for_turn("det-test", 7);
        let result_a = fight(&mut setup_a, &config, &mut rng_a, &mut |_, _| None);
        let result_b = fight(&mut setup_b, &config, &mut rng_b, &mut |_, _| None);
        assert_eq!(result_a.rounds_fought, result_b.rounds_fought);
        let states_a: Vec<CombatState> = setup_a.units.iter().map(|u| u.state).collect();
        let states_b: Vec<CombatState> = setup_b.units.iter().map(|u| u.state).collect();
        assert_eq!(states_a, states_b);
    }

    #[test]
    fn low_roe_fleet_withdraws_when_hurt() {
        let config = GameConfig::default();
        let mut setup = setup_between(vec![
            unit(1, 1, Some(10), ShipRole::Capital, 12, 10, false, 0),
            unit(2, 2, Some(20), ShipRole::Escort, 2, 2, false, 1),
        ]);
        setup.fleet_roe.insert(FleetId::new(20), 0);
        let mut rng = TurnRng::for_turn("retreat-test", 2);
        let destination = SystemId::new(9);
        let result = fight(&mut setup, &config, &mut rng, &mut |fleet, _| {
            (fleet == FleetId::new(20)).then_some(destination)
        });
        // Either the escort died outright or it withdrew at first blood.
        let escort = &setup.units[1];
        assert!(
            escort.state == CombatState::Destroyed
                || result.retreats.contains(&(FleetId::new(20), destination))
        );
    }
}
