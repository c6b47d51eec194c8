//! Economy kernel for EC4X
//!
//! Production (GCO/NCV), research banking and advancement, construction
//! queues, maintenance with the shortfall cascade, and Space-Guild
//! population transfers. All curves and rates come from config.

use std::collections::BTreeMap;

use ec4x_common::config::GameConfig;
use ec4x_common::events::{
    EspionageAction, Event, EventLog, IncomeReport, PrestigeSource,
};
use ec4x_common::ids::{ColonyId, FleetId, HouseId};
use ec4x_common::types::{BuildItem, DiplomaticState, FacilityKind, TechField};
use ec4x_common::units::{CargoKind, FleetStatus, GroundUnitClass, ShipRole};

use crate::diplomacy;
use crate::orders::{FundedBuild, FundedTransfer, ResearchOrder};
use crate::starmap::Starmap;
use crate::state::{GameState, TransferInFlight};
use crate::store::SquadronAttachment;

// ---------------------------------------------------------------------------
// Formulas
// ---------------------------------------------------------------------------

/// Gross Colonial Output, truncated to whole PP.
/// `GCO = PU × RAW + IU × EL_modifier × (1 + production_growth)`
pub fn colony_gco(config: &GameConfig, population: u32, industrial_units: u32,
    class: ec4x_common::types::PlanetClass, rating: ec4x_common::types::ResourceRating,
    el: u8) -> i64 {
    let raw = config.raw_index(class, rating);
    let pu_term = f64::from(population) * raw;
    let iu_term = f64::from(industrial_units)
        * config.el_modifier(el)
        * (1.0 + config.economy.production_growth);
    (pu_term + iu_term).floor() as i64
}

/// Net Colony Value after tax, truncated.
pub fn colony_ncv(gco: i64, tax_rate: u8) -> i64 {
    gco * i64::from(tax_rate) / 100
}

/// PP cost of one ERP: `base + log10(GHO)`.
pub fn erp_cost(config: &GameConfig, gho: i64) -> f64 {
    config.economy.erp_base_cost + f64::from(gho.max(1) as u32).log10()
}

/// Expected income for budget projection: last cached gross outputs taxed
/// at current rates. Orders are written before the Income Phase runs.
pub fn expected_income(store: &crate::store::EntityStore, house: HouseId) -> i64 {
    store
        .colonies_of(house)
        .iter()
        .filter_map(|id| store.colony(id.to_owned()))
        .map(|c| colony_ncv(c.gross_output, c.tax_rate))
        .sum()
}

/// Full maintenance bill for a house: ships (scaled by fleet status),
/// facilities, and ground units.
pub fn expected_maintenance(
    store: &crate::store::EntityStore,
    config: &GameConfig,
    house: HouseId,
) -> i64 {
    let mut total = 0i64;
    for fleet_id in store.fleets_of(house) {
        total += fleet_maintenance(store, config, fleet_id);
    }
    for colony_id in store.colonies_of(house) {
        let Some(colony) = store.colony(colony_id) else {
            continue;
        };
        for facility_id in &colony.facilities {
            if let Some(facility) = store.facility(*facility_id) {
                if let Some(spec) = config.facilities.get(&facility.kind) {
                    total += i64::from(spec.maintenance);
                }
            }
        }
        for unit_id in &colony.ground_units {
            if let Some(unit) = store.ground_unit(*unit_id) {
                if let Some(spec) = config.ground_units.get(&unit.class) {
                    total += i64::from(spec.maintenance);
                }
            }
        }
        for squadron_id in &colony.fighter_squadrons {
            if let Some(squadron) = store.squadron(*squadron_id) {
                for ship_id in squadron.ships() {
                    if let Some(ship) = store.ship(ship_id) {
                        if let Some(spec) = config.ship_class(&ship.class) {
                            total += i64::from(spec.maintenance);
                        }
                    }
                }
            }
        }
    }
    total
}

fn fleet_maintenance(
    store: &crate::store::EntityStore,
    config: &GameConfig,
    fleet: FleetId,
) -> i64 {
    let Some(record) = store.fleet(fleet) else {
        return 0;
    };
    let factor = match record.status {
        FleetStatus::Active => 1.0,
        FleetStatus::Reserve => config.economy.reserve_maintenance_factor,
        FleetStatus::Mothballed => config.economy.mothball_maintenance_factor,
    };
    let base: i64 = store
        .ships_in_fleet(fleet)
        .iter()
        .filter_map(|id| store.ship(*id))
        .filter_map(|ship| config.ship_class(&ship.class))
        .map(|spec| i64::from(spec.maintenance))
        .sum();
    (base as f64 * factor).ceil() as i64
}

/// Production cost of everything in a fleet, the salvage base for disbands.
fn fleet_production_cost(
    store: &crate::store::EntityStore,
    config: &GameConfig,
    fleet: FleetId,
) -> i64 {
    store
        .ships_in_fleet(fleet)
        .iter()
        .filter_map(|id| store.ship(*id))
        .filter_map(|ship| config.ship_class(&ship.class))
        .map(|spec| i64::from(spec.cost))
        .sum()
}

// ---------------------------------------------------------------------------
// Income Phase
// ---------------------------------------------------------------------------

/// Income Phase: maturing espionage effects, GCO → NCV → treasury,
/// population growth, tax rolling averages, and tax prestige penalties.
pub fn income_phase(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
) -> BTreeMap<HouseId, IncomeReport> {
    let mut reports = BTreeMap::new();

    // Active income-affecting espionage effects by target house.
    let mut income_drain: BTreeMap<HouseId, f64> = BTreeMap::new();
    let mut growth_drain: BTreeMap<HouseId, f64> = BTreeMap::new();
    for effect in &state.effects {
        match effect.action {
            EspionageAction::EconomicManipulation => {
                *income_drain.entry(effect.target).or_default() += effect.magnitude;
            }
            EspionageAction::PsyopsCampaign => {
                *growth_drain.entry(effect.target).or_default() += effect.magnitude;
            }
            _ => {}
        }
    }

    for house_id in state.store.house_ids() {
        let Some(house) = state.store.house(house_id) else {
            continue;
        };
        if house.eliminated {
            continue;
        }
        let el = house.tech.el;
        let morale = house.morale;
        let tax_efficiency = config
            .prestige
            .morale_tax_efficiency
            .get(morale.index())
            .copied()
            .unwrap_or(1.0);

        let mut report = IncomeReport::default();
        for colony_id in state.store.colonies_of(house_id) {
            let Some(colony) = state.store.colony(colony_id) else {
                continue;
            };
            let (population, industrial, class, rating, tax_rate) = (
                colony.population,
                colony.industrial_units,
                colony.planet_class,
                colony.resource_rating,
                colony.tax_rate,
            );
            let gco = colony_gco(config, population, industrial, class, rating, el);
            let ncv = colony_ncv(gco, tax_rate);
            report.gco_total += gco;
            report.ncv_total += ncv;
            report.colonies.push((colony_id, gco, ncv));

            let _ = state.store.update_colony(colony_id, |c| {
                c.gross_output = gco;
            });

            // Population growth, morale- and tax-modulated.
            let max_pu = config.max_pu(class);
            let effective_rate = config.economy.population_growth_rate
                * tax_efficiency
                * (1.0 - f64::from(tax_rate) / 200.0)
                * (1.0 - growth_drain.get(&house_id).copied().unwrap_or(0.0));
            let growth = (f64::from(population) * effective_rate).floor() as u32;
            if growth > 0 && population < max_pu {
                let applied = growth.min(max_pu - population);
                let _ = state.store.update_colony(colony_id, |c| {
                    c.population += applied;
                });
                events.push(Event::PopulationGrowth {
                    colony: colony_id,
                    amount: applied,
                });
            }
        }

        // Espionage drains skim the net, not the gross.
        let drain = income_drain.get(&house_id).copied().unwrap_or(0.0).min(1.0);
        let collected = ((report.ncv_total as f64) * (1.0 - drain)).floor() as i64;

        let _ = state.store.update_house(house_id, |h| {
            h.treasury += collected;
            h.tax_policy.record_turn();
        });
        events.push(Event::IncomeCollected {
            house: house_id,
            gco: report.gco_total,
            ncv: report.ncv_total,
        });

        // High-tax prestige penalty against the rolling average.
        let rolling = state
            .store
            .house(house_id)
            .map(|h| h.tax_policy.rolling_average())
            .unwrap_or(50.0);
        let penalty = config.tax_penalty(rolling);
        if penalty != 0 {
            diplomacy::award_prestige(
                state,
                config,
                events,
                house_id,
                PrestigeSource::HighTaxes,
                Some(penalty),
            );
        }

        reports.insert(house_id, report);
    }

    reports
}

// ---------------------------------------------------------------------------
// Command Phase pieces
// ---------------------------------------------------------------------------

/// Convert reserved PP into espionage points; penalize over-investment.
pub fn apply_investments(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    house: HouseId,
    ebp_pp: u32,
    cip_pp: u32,
) {
    if ebp_pp == 0 && cip_pp == 0 {
        return;
    }
    let ebp_points = ebp_pp / config.espionage.ebp_rate.max(1);
    let cip_points = cip_pp / config.espionage.cip_rate.max(1);
    let _ = state.store.update_house(house, |h| {
        h.treasury -= i64::from(ebp_pp) + i64::from(cip_pp);
        h.espionage.ebp += ebp_points;
        h.espionage.cip += cip_points;
    });
    if ebp_points + cip_points > config.espionage.overinvestment_threshold {
        diplomacy::award_prestige(
            state,
            config,
            events,
            house,
            PrestigeSource::EspionageExposed,
            Some(config.espionage.overinvestment_prestige_penalty),
        );
    }
}

/// Start funded construction projects: deduct the reserved cost and queue.
pub fn start_builds(
    state: &mut GameState,
    events: &mut EventLog,
    house: HouseId,
    builds: &[FundedBuild],
) {
    for build in builds {
        let item_label = build_label(&build.item);
        let _ = state.store.update_house(house, |h| {
            h.treasury -= i64::from(build.cost);
        });
        let item = build.item.clone();
        let cost = build.cost;
        let _ = state.store.update_colony(build.colony, |c| {
            c.construction_queue.push(ec4x_common::types::ConstructionProject {
                item,
                cost,
                paid: 0,
            });
        });
        events.push(Event::ConstructionStarted {
            house,
            colony: build.colony,
            item: item_label,
        });
    }
}

fn build_label(item: &BuildItem) -> String {
    match item {
        BuildItem::Ship { class } => class.clone(),
        BuildItem::Facility(kind) => format!("{kind:?}"),
        BuildItem::GroundUnit(class) => format!("{class:?}"),
        BuildItem::IndustrialUnits { count } => format!("{count} IU"),
    }
}

/// Kick off funded Space-Guild transfers.
pub fn initiate_transfers(
    state: &mut GameState,
    events: &mut EventLog,
    house: HouseId,
    transfers: &[FundedTransfer],
) {
    for transfer in transfers {
        let (Some(from), Some(to)) = (
            state.store.colony(transfer.from),
            state.store.colony(transfer.to),
        ) else {
            continue;
        };
        let from_system = from.system;
        let to_system = to.system;
        let _ = state.store.update_house(house, |h| {
            h.treasury -= transfer.cost;
        });
        let _ = state.store.update_colony(transfer.from, |c| {
            c.population = c.population.saturating_sub(transfer.ptus);
        });
        state.transfers.push(TransferInFlight {
            house,
            from: transfer.from,
            to: transfer.to,
            from_system,
            to_system,
            ptus: transfer.ptus,
            remaining_turns: transfer.transit_turns,
        });
        events.push(Event::TransferStarted {
            house,
            from: transfer.from,
            to: transfer.to,
            ptus: transfer.ptus,
            eta: transfer.transit_turns,
        });
    }
}

/// Advance in-flight transfers one turn; deliver, reroute, or lose them.
pub fn advance_transfers(state: &mut GameState, config: &GameConfig, events: &mut EventLog) {
    let mut remaining: Vec<TransferInFlight> = Vec::new();
    let transfers = std::mem::take(&mut state.transfers);
    for mut transfer in transfers {
        transfer.remaining_turns = transfer.remaining_turns.saturating_sub(1);
        if transfer.remaining_turns > 0 {
            remaining.push(transfer);
            continue;
        }

        // Blockade at either endpoint sinks the shipment.
        let blockaded = [transfer.from_system, transfer.to_system]
            .into_iter()
            .any(|system| {
                state.store.fleets_at(system).iter().any(|fleet_id| {
                    state.store.fleet(*fleet_id).is_some_and(|fleet| {
                        state
                            .store
                            .house(transfer.house)
                            .is_some_and(|h| h.relation_with(fleet.owner) == DiplomaticState::Enemy)
                    })
                })
            });
        if blockaded {
            events.push(Event::TransferLost {
                house: transfer.house,
                ptus: transfer.ptus,
                reason: "endpoint blockaded".to_string(),
            });
            continue;
        }

        // Destination may have changed hands mid-flight.
        let destination = state
            .store
            .colony(transfer.to)
            .filter(|c| c.owner == transfer.house)
            .map(|c| c.id)
            .or_else(|| nearest_owned_colony(state, config, transfer.house, transfer.to_system));
        match destination {
            Some(colony_id) => {
                let max_pu = state
                    .store
                    .colony(colony_id)
                    .map(|c| config.max_pu(c.planet_class))
                    .unwrap_or(0);
                let _ = state.store.update_colony(colony_id, |c| {
                    c.population = (c.population + transfer.ptus).min(max_pu);
                });
                events.push(Event::TransferDelivered {
                    house: transfer.house,
                    colony: colony_id,
                    ptus: transfer.ptus,
                });
            }
            None => {
                events.push(Event::TransferLost {
                    house: transfer.house,
                    ptus: transfer.ptus,
                    reason: "no owned colony to receive".to_string(),
                });
            }
        }
    }
    state.transfers = remaining;
}

fn nearest_owned_colony(
    state: &GameState,
    _config: &GameConfig,
    house: HouseId,
    origin: ec4x_common::ids::SystemId,
) -> Option<ColonyId> {
    let map = Starmap::new(&state.store);
    state
        .store
        .colonies_of(house)
        .into_iter()
        .filter_map(|colony_id| {
            let colony = state.store.colony(colony_id)?;
            let route = map.find_path(origin, colony.system, Default::default())?;
            Some((route.len(), colony_id))
        })
        .min()
        .map(|(_, colony_id)| colony_id)
}

// ---------------------------------------------------------------------------
// Maintenance Phase pieces
// ---------------------------------------------------------------------------

/// Advance construction: apply per-turn progress and deploy completions.
/// CyberAttack effects freeze a victim's yards for their duration.
pub fn advance_construction(state: &mut GameState, config: &GameConfig, events: &mut EventLog) {
    let frozen: Vec<HouseId> = state
        .effects
        .iter()
        .filter(|e| e.action == EspionageAction::CyberAttack)
        .map(|e| e.target)
        .collect();

    for house_id in state.store.house_ids() {
        if frozen.contains(&house_id) {
            log::debug!("construction frozen for {house_id} by cyber attack");
            continue;
        }
        for colony_id in state.store.colonies_of(house_id) {
            let Some(colony) = state.store.colony(colony_id) else {
                continue;
            };
            let mut completed: Vec<BuildItem> = Vec::new();
            let mut queue = colony.construction_queue.clone();
            for project in &mut queue {
                project.paid += config.construction.progress_per_turn;
                if project.is_complete() {
                    completed.push(project.item.clone());
                }
            }
            queue.retain(|p| !p.is_complete());
            let _ = state.store.update_colony(colony_id, |c| {
                c.construction_queue = queue.clone();
            });

            for item in completed {
                deploy_completed(state, config, house_id, colony_id, &item);
                events.push(Event::ConstructionCompleted {
                    house: house_id,
                    colony: colony_id,
                    item: build_label(&item),
                });
            }
        }
    }
}

/// Put a finished build into play.
fn deploy_completed(
    state: &mut GameState,
    config: &GameConfig,
    house: HouseId,
    colony: ColonyId,
    item: &BuildItem,
) {
    let Some(colony_record) = state.store.colony(colony) else {
        return;
    };
    let system = colony_record.system;
    match item {
        BuildItem::Ship { class } => {
            let Some(spec) = config.ship_class(class) else {
                return;
            };
            match spec.role {
                ShipRole::Fighter => {
                    state.store.commission_squadron(
                        house,
                        SquadronAttachment::Colony(colony),
                        class,
                        &[],
                        config,
                    );
                }
                ShipRole::Spacelift => {
                    let fleet = home_fleet(state, house, system);
                    state.store.commission_spacelift(fleet, class, config);
                }
                _ => {
                    let fleet = home_fleet(state, house, system);
                    state.store.commission_squadron(
                        house,
                        SquadronAttachment::Fleet(fleet),
                        class,
                        &[],
                        config,
                    );
                }
            }
        }
        BuildItem::Facility(kind) => {
            state.store.create_facility(colony, *kind);
        }
        BuildItem::GroundUnit(class) => {
            if *class == GroundUnitClass::Marine {
                // Marines enter the colony inventory, ready for loading.
                let _ = state.store.update_colony(colony, |c| c.marines += 1);
            } else {
                state.store.create_ground_unit(
                    house,
                    *class,
                    ec4x_common::units::GarrisonSite::Colony(colony),
                );
            }
        }
        BuildItem::IndustrialUnits { count } => {
            let count = *count;
            let _ = state.store.update_colony(colony, |c| {
                c.industrial_units += count;
            });
        }
    }
}

/// The house's receiving fleet at a system, created on demand.
fn home_fleet(state: &mut GameState, house: HouseId, system: ec4x_common::ids::SystemId) -> FleetId {
    state
        .store
        .fleets_at(system)
        .into_iter()
        .find(|fleet_id| {
            state
                .store
                .fleet(*fleet_id)
                .is_some_and(|f| f.owner == house && f.status == FleetStatus::Active)
        })
        .unwrap_or_else(|| state.store.create_fleet(house, system))
}

/// Bank reserved research PP and advance any affordable levels.
pub fn apply_research(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    house: HouseId,
    order: Option<ResearchOrder>,
    reserved: i64,
) {
    let Some(order) = order else {
        return;
    };
    let Some(record) = state.store.house(house) else {
        return;
    };
    let spend = reserved.min(record.treasury.max(0));
    if spend > 0 {
        let focus = order.focus;
        let _ = state.store.update_house(house, |h| {
            h.treasury -= spend;
            *h.research.entry(focus).or_default() += spend as u32;
        });
    }

    // Advance while the bank covers the next level.
    loop {
        let Some(record) = state.store.house(house) else {
            return;
        };
        let level = record.tech.level(order.focus);
        let banked = record.research.get(&order.focus).copied().unwrap_or(0);
        let next = level.saturating_add(1);
        let cost_pp = research_level_cost(config, &state.store, house, order.focus, next);
        if banked < cost_pp {
            break;
        }
        let focus = order.focus;
        let _ = state.store.update_house(house, |h| {
            h.tech.advance(focus);
            if let Some(bank) = h.research.get_mut(&focus) {
                *bank -= cost_pp;
            }
        });
        events.push(Event::ResearchAdvanced {
            house,
            field: focus,
            new_level: next,
        });
        diplomacy::award_prestige(
            state,
            config,
            events,
            house,
            PrestigeSource::TechBreakthrough,
            None,
        );
    }
}

/// PP required to reach `level` on a track. EL converts through ERP priced
/// by the house's gross output; SL uses its own curve; the rest use the
/// generic field curve.
pub fn research_level_cost(
    config: &GameConfig,
    store: &crate::store::EntityStore,
    house: HouseId,
    field: TechField,
    level: u8,
) -> u32 {
    match field {
        TechField::El => {
            let erp = config.tech.el_curve.cost(level);
            let gho = store.house_gross_output(house);
            (f64::from(erp) * erp_cost(config, gho) / config.economy.erp_base_cost).ceil() as u32
        }
        TechField::Sl => config.tech.sl_curve.cost(level),
        _ => config.tech.field_curve.cost(level),
    }
}

/// Pay maintenance, or run the shortfall cascade when the treasury cannot
/// cover it.
pub fn pay_maintenance(state: &mut GameState, config: &GameConfig, events: &mut EventLog) {
    for house_id in state.store.house_ids() {
        let Some(house) = state.store.house(house_id) else {
            continue;
        };
        if house.eliminated {
            continue;
        }
        let due = expected_maintenance(&state.store, config, house_id);
        if house.treasury >= due {
            let _ = state.store.update_house(house_id, |h| {
                h.treasury -= due;
                h.shortfall_turns = 0;
            });
            events.push(Event::MaintenancePaid {
                house: house_id,
                amount: due,
            });
            continue;
        }
        shortfall_cascade(state, config, events, house_id, due);
    }
}

/// The maintenance shortfall cascade:
/// 1. Consume the treasury and cancel active construction and research.
/// 2. Disband fleets for salvage, oldest first, until break-even.
/// 3. Strip assets in the fixed order IU → Spaceport → Shipyard → Starbase
///    → GroundBattery → Army → Marine → PlanetaryShield.
/// 4. Apply the escalating prestige penalty.
fn shortfall_cascade(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    house: HouseId,
    due: i64,
) {
    let Some(record) = state.store.house(house) else {
        return;
    };
    let mut shortfall = due - record.treasury.max(0);
    log::warn!("{house} maintenance shortfall: due {due}, short {shortfall}");

    let _ = state.store.update_house(house, |h| {
        h.treasury = 0;
        h.shortfall_turns = h.shortfall_turns.saturating_add(1);
        h.research.clear();
    });
    for colony_id in state.store.colonies_of(house) {
        let _ = state.store.update_colony(colony_id, |c| {
            c.construction_queue.clear();
        });
    }

    // Disband fleets oldest-first. IDs are monotonic, so the lowest ID is
    // the oldest fleet.
    let mut fleets = state.store.fleets_of(house);
    fleets.sort();
    for fleet_id in fleets {
        if shortfall <= 0 {
            break;
        }
        let upkeep = fleet_maintenance(&state.store, config, fleet_id);
        let salvage =
            ((fleet_production_cost(&state.store, config, fleet_id) as f64)
                * config.economy.salvage_rate)
                .floor() as i64;
        if state.store.delete_fleet(fleet_id).is_ok() {
            shortfall -= upkeep;
            let _ = state.store.update_house(house, |h| {
                h.treasury += salvage;
            });
            events.push(Event::FleetDisbanded {
                house,
                fleet: fleet_id,
                salvage,
            });
        }
    }

    // Strip assets in the fixed order until the gap closes.
    if shortfall > 0 {
        shortfall = strip_assets(state, config, events, house, shortfall);
    }

    let consecutive = state
        .store
        .house(house)
        .map(|h| h.shortfall_turns)
        .unwrap_or(1);
    events.push(Event::MaintenanceShortfall {
        house,
        consecutive,
        shortfall: shortfall.max(0),
    });

    // Escalation holds at the first step during the grace period.
    let penalties = &config.economy.shortfall_penalties;
    let index = if consecutive <= config.economy.shortfall_grace_turns {
        0
    } else {
        (usize::from(consecutive) - 1).min(penalties.len() - 1)
    };
    diplomacy::award_prestige(
        state,
        config,
        events,
        house,
        PrestigeSource::MaintenanceShortfall,
        Some(penalties[index]),
    );
}

fn strip_assets(
    state: &mut GameState,
    config: &GameConfig,
    events: &mut EventLog,
    house: HouseId,
    mut shortfall: i64,
) -> i64 {
    let salvage = config.economy.strip_salvage;
    let colonies = state.store.colonies_of(house);

    // IU first.
    for &colony_id in &colonies {
        while shortfall > 0 {
            let has_iu = state
                .store
                .colony(colony_id)
                .is_some_and(|c| c.industrial_units > 0);
            if !has_iu {
                break;
            }
            let _ = state.store.update_colony(colony_id, |c| {
                c.industrial_units -= 1;
            });
            shortfall -= salvage.industrial_unit;
            events.push(Event::AssetStripped {
                house,
                colony: colony_id,
                asset: "IndustrialUnit".to_string(),
                salvage: salvage.industrial_unit,
            });
        }
    }

    // Facilities in order.
    for (kind, value) in [
        (FacilityKind::Spaceport, salvage.spaceport),
        (FacilityKind::Shipyard, salvage.shipyard),
        (FacilityKind::Starbase, salvage.starbase),
    ] {
        for &colony_id in &colonies {
            while shortfall > 0 {
                let next = state.store.colony(colony_id).and_then(|c| {
                    c.facilities
                        .iter()
                        .copied()
                        .find(|id| state.store.facility(*id).is_some_and(|f| f.kind == kind))
                });
                let Some(facility_id) = next else {
                    break;
                };
                if state.store.delete_facility(facility_id).is_err() {
                    break;
                }
                shortfall -= value;
                events.push(Event::AssetStripped {
                    house,
                    colony: colony_id,
                    asset: format!("{kind:?}"),
                    salvage: value,
                });
            }
        }
    }

    // Ground forces in order; marines strip from colony inventory.
    for (class, value) in [
        (GroundUnitClass::GroundBattery, salvage.ground_battery),
        (GroundUnitClass::Army, salvage.army),
    ] {
        for &colony_id in &colonies {
            while shortfall > 0 {
                let next = state.store.colony(colony_id).and_then(|c| {
                    c.ground_units.iter().copied().find(|id| {
                        state
                            .store
                            .ground_unit(*id)
                            .is_some_and(|u| u.class == class)
                    })
                });
                let Some(unit_id) = next else {
                    break;
                };
                if state.store.delete_ground_unit(unit_id).is_err() {
                    break;
                }
                shortfall -= value;
                events.push(Event::AssetStripped {
                    house,
                    colony: colony_id,
                    asset: format!("{class:?}"),
                    salvage: value,
                });
            }
        }
    }
    for &colony_id in &colonies {
        while shortfall > 0 {
            let has_marines = state.store.colony(colony_id).is_some_and(|c| c.marines > 0);
            if !has_marines {
                break;
            }
            let _ = state.store.update_colony(colony_id, |c| c.marines -= 1);
            shortfall -= salvage.marine;
            events.push(Event::AssetStripped {
                house,
                colony: colony_id,
                asset: "Marine".to_string(),
                salvage: salvage.marine,
            });
        }
    }
    for &colony_id in &colonies {
        while shortfall > 0 {
            let next = state.store.colony(colony_id).and_then(|c| {
                c.ground_units.iter().copied().find(|id| {
                    state
                        .store
                        .ground_unit(*id)
                        .is_some_and(|u| u.class == GroundUnitClass::PlanetaryShield)
                })
            });
            let Some(unit_id) = next else {
                break;
            };
            if state.store.delete_ground_unit(unit_id).is_err() {
                break;
            }
            shortfall -= salvage.planetary_shield;
            events.push(Event::AssetStripped {
                house,
                colony: colony_id,
                asset: "PlanetaryShield".to_string(),
                salvage: salvage.planetary_shield,
            });
        }
    }

    shortfall
}

/// Load or unload spacelift cargo at an owned colony.
pub fn apply_cargo_order(
    state: &mut GameState,
    order: &crate::orders::CargoOrder,
) {
    let Some(ship) = state.store.ship(order.ship) else {
        return;
    };
    let Some(cargo) = ship.cargo else {
        return;
    };
    let holder_location = state
        .store
        .fleets()
        .iter()
        .find(|(_, fleet)| fleet.spacelift.contains(&order.ship))
        .map(|(_, fleet)| fleet.location);
    let Some(location) = holder_location else {
        return;
    };
    let Some(colony_id) = state.store.colony_at(location) else {
        return;
    };

    match order.op {
        crate::orders::CargoOp::Load => {
            let quantity = order.quantity.min(cargo.free_space());
            let _ = state.store.update_colony(colony_id, |c| match order.kind {
                CargoKind::Marines => c.marines = c.marines.saturating_sub(quantity),
                CargoKind::Colonists => c.population = c.population.saturating_sub(quantity),
                CargoKind::None => {}
            });
            let _ = state.store.update_ship(order.ship, |s| {
                if let Some(hold) = s.cargo.as_mut() {
                    hold.kind = order.kind;
                    hold.quantity += quantity;
                }
            });
        }
        crate::orders::CargoOp::Unload => {
            let quantity = order.quantity.min(cargo.quantity);
            let _ = state.store.update_colony(colony_id, |c| match order.kind {
                CargoKind::Marines => c.marines += quantity,
                CargoKind::Colonists => c.population += quantity,
                CargoKind::None => {}
            });
            let _ = state.store.update_ship(order.ship, |s| {
                if let Some(hold) = s.cargo.as_mut() {
                    hold.quantity -= quantity;
                    if hold.quantity == 0 {
                        hold.kind = CargoKind::None;
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{CargoOp, CargoOrder};
    use ec4x_common::coords::Hex;
    use ec4x_common::ids::SystemId;
    use ec4x_common::types::{PlanetClass, ResourceRating, System};

    #[test]
    fn cargo_load_unload_round_trip() {
        // load(k) ∘ unload(k) restores colony marine inventory and leaves
        // the hold empty.
        let config = GameConfig::default();
        let mut state = GameState::new("cargo-test");
        let system = SystemId::new(1);
        state.store.insert_system(System {
            id: system,
            coords: Hex::origin(),
            lanes: BTreeMap::new(),
        });
        let house = state.store.create_house("Atreides", system, 100);
        let colony = state.store.create_colony(
            system,
            house,
            PlanetClass::Terran,
            ResourceRating::Normal,
            100,
            20,
        );
        let _ = state.store.update_colony(colony, |c| c.marines = 30);
        let fleet = state.store.create_fleet(house, system);
        let ship = state
            .store
            .commission_spacelift(fleet, "TroopTransport", &config)
            .expect("transport");

        apply_cargo_order(&mut state, &CargoOrder {
            ship,
            op: CargoOp::Load,
            kind: CargoKind::Marines,
            quantity: 20,
        });
        assert_eq!(state.store.colony(colony).unwrap().marines, 10);
        let hold = state.store.ship(ship).unwrap().cargo.unwrap();
        assert_eq!(hold.kind, CargoKind::Marines);
        assert_eq!(hold.quantity, 20);

        apply_cargo_order(&mut state, &CargoOrder {
            ship,
            op: CargoOp::Unload,
            kind: CargoKind::Marines,
            quantity: 20,
        });
        assert_eq!(state.store.colony(colony).unwrap().marines, 30);
        let hold = state.store.ship(ship).unwrap().cargo.unwrap();
        assert!(hold.is_empty());
    }

    #[test]
    fn shortfall_cascade_scenario() {
        // Treasury 50 against 100 due; one fleet with 30 upkeep and a
        // production cost of 200. The cascade zeroes the treasury, cancels
        // work, disbands the fleet for 50 salvage (25% of 200), strips one
        // IU for the remaining gap, and fines -8 prestige.
        let mut config = GameConfig::default();
        config.ships.insert(
            "Hulk".to_string(),
            ec4x_common::config::ShipClassConfig {
                role: ShipRole::Capital,
                attack: 10,
                defense: 10,
                crippled_defense: 5,
                cost: 200,
                maintenance: 30,
                cargo_capacity: 0,
                carrier_capacity: 0,
                raider: false,
                planet_breaker: false,
                min_cst: 0,
            },
        );
        if let Some(spaceport) = config
            .facilities
            .get_mut(&ec4x_common::types::FacilityKind::Spaceport)
        {
            spaceport.maintenance = 70;
        }

        let mut state = GameState::new("cascade-test");
        let system = SystemId::new(1);
        state.store.insert_system(System {
            id: system,
            coords: Hex::origin(),
            lanes: BTreeMap::new(),
        });
        let house = state.store.create_house("Atreides", system, 50);
        let colony = state.store.create_colony(
            system,
            house,
            PlanetClass::Terran,
            ResourceRating::Normal,
            100,
            20,
        );
        state
            .store
            .create_facility(colony, ec4x_common::types::FacilityKind::Spaceport);
        let fleet = state.store.create_fleet(house, system);
        state
            .store
            .commission_squadron(
                house,
                crate::store::SquadronAttachment::Fleet(fleet),
                "Hulk",
                &[],
                &config,
            )
            .expect("hulk");
        assert_eq!(expected_maintenance(&state.store, &config, house), 100);

        let mut events = EventLog::new(1);
        pay_maintenance(&mut state, &config, &mut events);

        let record = state.store.house(house).unwrap();
        assert_eq!(record.treasury, 50);
        assert_eq!(record.shortfall_turns, 1);
        assert!(state.store.fleet(fleet).is_none());
        assert_eq!(state.store.colony(colony).unwrap().industrial_units, 19);
        assert!(events.iter().any(|e| matches!(
            e,
            Event::FleetDisbanded { salvage: 50, .. }
        )));
        let stripped = events
            .iter()
            .filter(|e| matches!(e, Event::AssetStripped { .. }))
            .count();
        assert_eq!(stripped, 1);
        assert!(events.iter().any(|e| matches!(
            e,
            Event::PrestigeAwarded {
                source: PrestigeSource::MaintenanceShortfall,
                amount: -8,
                ..
            }
        )));
    }

    #[test]
    fn gco_matches_income_scenario() {
        // Eden/Abundant, PU=100, IU=50, EL=1, growth 0:
        // 100×1.00 + 50×1.05 = 152.5 → 152.
        let config = GameConfig::default();
        let gco = colony_gco(&config, 100, 50, PlanetClass::Eden, ResourceRating::Abundant, 1);
        assert_eq!(gco, 152);
        assert_eq!(colony_ncv(gco, 50), 76);
    }

    #[test]
    fn erp_cost_tracks_gross_output() {
        let config = GameConfig::default();
        assert!((erp_cost(&config, 1) - 5.0).abs() < 1e-9);
        assert!((erp_cost(&config, 1000) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn ncv_truncates_toward_zero() {
        assert_eq!(colony_ncv(153, 50), 76);
        assert_eq!(colony_ncv(3, 33), 0);
    }
}
