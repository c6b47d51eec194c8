//! Diplomacy and prestige for EC4X
//!
//! The pact state machine (Neutral ↔ NonAggression ↔ Enemy), violation
//! tracking with Dishonored/DiplomaticallyIsolated standings, the prestige
//! event stream, morale derivation, and the victory/elimination checks.

use ec4x_common::config::GameConfig;
use ec4x_common::events::{EliminationReason, Event, EventLog, PrestigeSource};
use ec4x_common::ids::HouseId;
use ec4x_common::types::{
    DiplomaticRelation, DiplomaticStanding, DiplomaticState, ViolationRecord,
};

use crate::orders::DiplomaticOrder;
use crate::state::GameState;

/// Record a prestige change, refresh morale, and emit the event. When no
/// override is supplied the configured award for the source applies.
pub fn award_prestige(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    house: HouseId,
    source: PrestigeSource,
    amount_override: Option<i64>,
) {
    let amount = amount_override
        .or_else(|| config.prestige.awards.get(&source).copied())
        .unwrap_or(0);
    if amount == 0 {
        return;
    }
    let mut total = 0;
    let _ = state.store.update_house(house, |h| {
        h.prestige += amount;
        h.morale = config.morale_for_prestige(h.prestige);
        total = h.prestige;
    });
    events.push(Event::PrestigeAwarded {
        house,
        source,
        amount,
        total,
    });
}

fn set_relation(state: &mut GameState, a: HouseId, b: HouseId, new: DiplomaticState, turn: u32) {
    for (this, other) in [(a, b), (b, a)] {
        let _ = state.store.update_house(this, |h| {
            h.relations.insert(
                other,
                DiplomaticRelation {
                    state: new,
                    since_turn: turn,
                },
            );
        });
    }
}

fn record_violation(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    breaker: HouseId,
    victim: HouseId,
    turn: u32,
) {
    let _ = state.store.update_house(breaker, |h| {
        h.violations.push(ViolationRecord {
            turn,
            against: victim,
        });
    });
    award_prestige(state, config, events, breaker, PrestigeSource::PactBroken, None);
    refresh_standing(state, config, events, breaker, turn);
}

/// Recompute standing from violations inside the rolling window.
pub fn refresh_standing(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    house: HouseId,
    turn: u32,
) {
    let Some(record) = state.store.house(house) else {
        return;
    };
    let recent = record
        .violations
        .iter()
        .filter(|v| turn.saturating_sub(v.turn) <= config.diplomacy.violation_window)
        .count() as u32;
    let new_standing = if recent >= config.diplomacy.isolated_threshold {
        DiplomaticStanding::DiplomaticallyIsolated {
            until_turn: turn + config.diplomacy.isolated_duration,
        }
    } else if recent >= config.diplomacy.dishonored_threshold {
        DiplomaticStanding::Dishonored {
            until_turn: turn + config.diplomacy.dishonored_duration,
        }
    } else {
        DiplomaticStanding::Honorable
    };
    if new_standing != record.standing {
        let _ = state.store.update_house(house, |h| h.standing = new_standing);
        events.push(Event::StandingChanged {
            house,
            standing: new_standing,
        });
    }
}

/// Expire timed standings once their cooldown passes.
pub fn expire_standings(state: &mut GameState, events: &mut EventLog, turn: u32) {
    for house_id in state.store.house_ids() {
        let Some(record) = state.store.house(house_id) else {
            continue;
        };
        let expired = match record.standing {
            DiplomaticStanding::Dishonored { until_turn }
            | DiplomaticStanding::DiplomaticallyIsolated { until_turn } => until_turn <= turn,
            DiplomaticStanding::Honorable => false,
        };
        if expired {
            let _ = state
                .store
                .update_house(house_id, |h| h.standing = DiplomaticStanding::Honorable);
            events.push(Event::StandingChanged {
                house: house_id,
                standing: DiplomaticStanding::Honorable,
            });
        }
    }
}

/// Apply one validated diplomatic order.
pub fn apply_order(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    house: HouseId,
    order: &DiplomaticOrder,
    turn: u32,
) {
    match *order {
        DiplomaticOrder::ProposePact { with } => {
            let relation = state
                .store
                .house(house)
                .map(|h| h.relation_with(with))
                .unwrap_or_default();
            if relation != DiplomaticState::Neutral {
                return;
            }
            if state.pending_pacts.insert((house, with)) {
                events.push(Event::PactProposed { from: house, to: with });
            }
        }
        DiplomaticOrder::AcceptPact { from } => {
            if !state.pending_pacts.remove(&(from, house)) {
                return;
            }
            set_relation(state, from, house, DiplomaticState::NonAggression, turn);
            events.push(Event::PactFormed { a: from, b: house });
        }
        DiplomaticOrder::BreakPact { with } => {
            let relation = state
                .store
                .house(house)
                .map(|h| h.relation_with(with))
                .unwrap_or_default();
            if relation != DiplomaticState::NonAggression {
                return;
            }
            set_relation(state, house, with, DiplomaticState::Enemy, turn);
            events.push(Event::PactBroken {
                breaker: house,
                victim: with,
            });
            record_violation(state, config, events, house, with, turn);
        }
        DiplomaticOrder::DeclareEnemy { on } => {
            let relation = state
                .store
                .house(house)
                .map(|h| h.relation_with(on))
                .unwrap_or_default();
            if relation == DiplomaticState::Enemy {
                return;
            }
            let was_pact = relation == DiplomaticState::NonAggression;
            set_relation(state, house, on, DiplomaticState::Enemy, turn);
            events.push(Event::WarDeclared { by: house, on });
            if was_pact {
                events.push(Event::PactBroken {
                    breaker: house,
                    victim: on,
                });
                record_violation(state, config, events, house, on, turn);
            }
            // War voids any open proposals between the two.
            state.pending_pacts.remove(&(house, on));
            state.pending_pacts.remove(&(on, house));
        }
        DiplomaticOrder::Normalize { with } => {
            let Some(record) = state.store.house(house) else {
                return;
            };
            let Some(relation) = record.relations.get(&with).copied() else {
                return;
            };
            if relation.state != DiplomaticState::Enemy {
                return;
            }
            if turn.saturating_sub(relation.since_turn) < config.diplomacy.normalize_cooldown {
                return;
            }
            set_relation(state, house, with, DiplomaticState::Neutral, turn);
            events.push(Event::RelationsNormalized { a: house, b: with });
        }
    }
}

/// Victory and elimination checks, run once per Maintenance Phase.
pub fn victory_check(state: &mut GameState, config: &GameConfig, events: &mut EventLog) {
    // Elimination first: DefensiveCollapse after sustained negative
    // prestige, Landless when the last colony is gone.
    for house_id in state.store.house_ids() {
        let Some(record) = state.store.house(house_id) else {
            continue;
        };
        if record.eliminated {
            continue;
        }
        let deficit = if record.prestige < 0 {
            record.deficit_turns.saturating_add(1)
        } else {
            0
        };
        let _ = state.store.update_house(house_id, |h| h.deficit_turns = deficit);
        if deficit >= config.prestige.collapse_turns {
            let _ = state.store.update_house(house_id, |h| h.eliminated = true);
            events.push(Event::HouseEliminated {
                house: house_id,
                reason: EliminationReason::DefensiveCollapse,
            });
            log::info!("{house_id} eliminated by defensive collapse");
            continue;
        }
        if state.store.colonies_of(house_id).is_empty() {
            let _ = state.store.update_house(house_id, |h| h.eliminated = true);
            events.push(Event::HouseEliminated {
                house: house_id,
                reason: EliminationReason::Landless,
            });
            log::info!("{house_id} eliminated landless");
        }
    }

    if state.winner.is_some() {
        return;
    }
    // First house past the threshold in canonical order wins; ties inside
    // one turn resolve to the higher prestige.
    let mut best: Option<(i64, HouseId)> = None;
    for (&house_id, record) in state.store.houses() {
        if record.eliminated || record.prestige < config.prestige.victory_threshold {
            continue;
        }
        if best.is_none_or(|(prestige, _)| record.prestige > prestige) {
            best = Some((record.prestige, house_id));
        }
    }
    if let Some((prestige, house_id)) = best {
        state.winner = Some(house_id);
        events.push(Event::VictoryAchieved {
            house: house_id,
            prestige,
        });
        log::info!("{house_id} wins with prestige {prestige}");
    }
}
