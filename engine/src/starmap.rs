//! Starmap graph queries for EC4X
//!
//! Systems form a graph whose edges are typed jump lanes. Pathfinding is
//! A* with lane weights as edge costs and hex distance as the heuristic.
//! Restricted lanes are impassable to fleets carrying crippled ships or
//! spacelift hulls. ETA calculations judge friendliness against whatever
//! view the caller supplies, so per-house estimates respect fog of war.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use ec4x_common::ids::SystemId;
use ec4x_common::types::{LaneType, System};

use crate::store::{EntityStore, FleetProfile};

/// How a system reads to the traveling house.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemDisposition {
    Friendly,
    Hostile,
    Unexplored,
}

/// Read-only graph view over the store's systems.
pub struct Starmap<'a> {
    systems: &'a BTreeMap<SystemId, System>,
}

impl<'a> Starmap<'a> {
    pub fn new(store: &'a EntityStore) -> Self {
        Self {
            systems: store.systems(),
        }
    }

    pub fn neighbors(&self, id: SystemId) -> Vec<(SystemId, LaneType)> {
        self.systems
            .get(&id)
            .map(|system| system.lanes.iter().map(|(&n, &lane)| (n, lane)).collect())
            .unwrap_or_default()
    }

    pub fn lane_between(&self, a: SystemId, b: SystemId) -> Option<LaneType> {
        self.systems.get(&a).and_then(|system| system.lanes.get(&b)).copied()
    }

    fn passable(lane: LaneType, profile: FleetProfile) -> bool {
        lane != LaneType::Restricted || (!profile.has_crippled && !profile.has_spacelift)
    }

    /// A* shortest path by lane weight. Returns the full route including
    /// both endpoints, or None when the destination is unreachable for
    /// this fleet profile.
    pub fn find_path(
        &self,
        from: SystemId,
        to: SystemId,
        profile: FleetProfile,
    ) -> Option<Vec<SystemId>> {
        if from == to {
            return Some(vec![from]);
        }
        let goal = self.systems.get(&to)?.coords;
        self.systems.get(&from)?;

        let mut open: BinaryHeap<Reverse<(u32, u32, SystemId)>> = BinaryHeap::new();
        let mut best_cost: BTreeMap<SystemId, u32> = BTreeMap::new();
        let mut came_from: BTreeMap<SystemId, SystemId> = BTreeMap::new();

        best_cost.insert(from, 0);
        let h0 = self.systems[&from].coords.distance_to(&goal);
        open.push(Reverse((h0, 0, from)));

        while let Some(Reverse((_, cost, current))) = open.pop() {
            if current == to {
                let mut route = vec![to];
                let mut cursor = to;
                while let Some(&previous) = came_from.get(&cursor) {
                    route.push(previous);
                    cursor = previous;
                }
                route.reverse();
                return Some(route);
            }
            if best_cost.get(&current).is_some_and(|&known| cost > known) {
                continue;
            }
            for (neighbor, lane) in self.neighbors(current) {
                if !Self::passable(lane, profile) {
                    continue;
                }
                let next_cost = cost + lane.weight();
                if best_cost.get(&neighbor).is_none_or(|&known| next_cost < known) {
                    best_cost.insert(neighbor, next_cost);
                    came_from.insert(neighbor, current);
                    let heuristic = self
                        .systems
                        .get(&neighbor)
                        .map(|s| s.coords.distance_to(&goal))
                        .unwrap_or(0);
                    open.push(Reverse((next_cost + heuristic, next_cost, neighbor)));
                }
            }
        }
        None
    }

    /// Turns a route takes under the movement rules: one jump per turn,
    /// with a second jump in the same turn when both lanes are Major and
    /// every system touched that turn reads Friendly to the caller.
    pub fn route_eta<D>(&self, route: &[SystemId], disposition: D) -> u32
    where
        D: Fn(SystemId) -> SystemDisposition,
    {
        let mut turns = 0;
        let mut index = 0;
        while index + 1 < route.len() {
            turns += 1;
            let first_lane = self.lane_between(route[index], route[index + 1]);
            let double_jump = index + 2 < route.len()
                && first_lane == Some(LaneType::Major)
                && self.lane_between(route[index + 1], route[index + 2]) == Some(LaneType::Major)
                && disposition(route[index]) == SystemDisposition::Friendly
                && disposition(route[index + 1]) == SystemDisposition::Friendly
                && disposition(route[index + 2]) == SystemDisposition::Friendly;
            index += if double_jump { 2 } else { 1 };
        }
        turns
    }

    /// ETA in turns from `from` to `to`, or None when unreachable.
    pub fn calculate_eta<D>(
        &self,
        from: SystemId,
        to: SystemId,
        profile: FleetProfile,
        disposition: D,
    ) -> Option<u32>
    where
        D: Fn(SystemId) -> SystemDisposition,
    {
        let route = self.find_path(from, to, profile)?;
        Some(self.route_eta(&route, disposition))
    }

    /// All systems within `radius` lane jumps of `origin`, excluding the
    /// origin itself. Used for starbase surveillance sweeps.
    pub fn systems_within(&self, origin: SystemId, radius: u32) -> Vec<SystemId> {
        let mut seen: BTreeSet<SystemId> = BTreeSet::new();
        let mut frontier = vec![origin];
        seen.insert(origin);
        for _ in 0..radius {
            let mut next = Vec::new();
            for system in frontier {
                for (neighbor, _) in self.neighbors(system) {
                    if seen.insert(neighbor) {
                        next.push(neighbor);
                    }
                }
            }
            frontier = next;
        }
        seen.remove(&origin);
        seen.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ec4x_common::coords::Hex;

    fn map_with(lanes: &[(u64, u64, LaneType)]) -> EntityStore {
        let mut store = EntityStore::new();
        let mut systems: BTreeMap<u64, System> = BTreeMap::new();
        for &(a, b, _) in lanes {
            for id in [a, b] {
                systems.entry(id).or_insert_with(|| System {
                    id: SystemId::new(id),
                    coords: Hex::new(id as i32, 0),
                    lanes: BTreeMap::new(),
                });
            }
        }
        for &(a, b, lane) in lanes {
            systems.get_mut(&a).unwrap().lanes.insert(SystemId::new(b), lane);
            systems.get_mut(&b).unwrap().lanes.insert(SystemId::new(a), lane);
        }
        for (_, system) in systems {
            store.insert_system(system);
        }
        store
    }

    #[test]
    fn prefers_cheap_lanes() {
        // 1 -(Restricted)- 3 directly, or 1 - 2 - 3 over Major lanes.
        let store = map_with(&[
            (1, 3, LaneType::Restricted),
            (1, 2, LaneType::Major),
            (2, 3, LaneType::Major),
        ]);
        let map = Starmap::new(&store);
        let route = map
            .find_path(SystemId::new(1), SystemId::new(3), FleetProfile::default())
            .expect("path");
        assert_eq!(route, vec![SystemId::new(1), SystemId::new(2), SystemId::new(3)]);
    }

    #[test]
    fn restricted_lane_blocks_crippled_fleet() {
        let store = map_with(&[(1, 2, LaneType::Restricted)]);
        let map = Starmap::new(&store);
        let crippled = FleetProfile {
            has_crippled: true,
            ..FleetProfile::default()
        };
        assert!(map
            .find_path(SystemId::new(1), SystemId::new(2), crippled)
            .is_none());
        assert!(map
            .find_path(SystemId::new(1), SystemId::new(2), FleetProfile::default())
            .is_some());
    }

    #[test]
    fn restricted_lane_blocks_spacelift() {
        let store = map_with(&[(1, 2, LaneType::Restricted)]);
        let map = Starmap::new(&store);
        let lift = FleetProfile {
            has_spacelift: true,
            ..FleetProfile::default()
        };
        assert!(map.find_path(SystemId::new(1), SystemId::new(2), lift).is_none());
    }

    #[test]
    fn eta_double_jump_on_friendly_major_lanes() {
        let store = map_with(&[(1, 2, LaneType::Major), (2, 3, LaneType::Major)]);
        let map = Starmap::new(&store);
        let eta = map
            .calculate_eta(
                SystemId::new(1),
                SystemId::new(3),
                FleetProfile::default(),
                |_| SystemDisposition::Friendly,
            )
            .expect("eta");
        assert_eq!(eta, 1);
    }

    #[test]
    fn eta_hostile_destination_prevents_double_jump() {
        // Matches the movement scenario: S1->S2 friendly Major, S2->S3
        // Major into hostile space. Two turns.
        let store = map_with(&[(1, 2, LaneType::Major), (2, 3, LaneType::Major)]);
        let map = Starmap::new(&store);
        let eta = map
            .calculate_eta(
                SystemId::new(1),
                SystemId::new(3),
                FleetProfile::default(),
                |id| {
                    if id == SystemId::new(3) {
                        SystemDisposition::Hostile
                    } else {
                        SystemDisposition::Friendly
                    }
                },
            )
            .expect("eta");
        assert_eq!(eta, 2);
    }

    #[test]
    fn minor_lanes_never_double_jump() {
        let store = map_with(&[(1, 2, LaneType::Minor), (2, 3, LaneType::Minor)]);
        let map = Starmap::new(&store);
        let eta = map
            .calculate_eta(
                SystemId::new(1),
                SystemId::new(3),
                FleetProfile::default(),
                |_| SystemDisposition::Friendly,
            )
            .expect("eta");
        assert_eq!(eta, 2);
    }

    #[test]
    fn surveillance_radius_bfs() {
        let store = map_with(&[
            (1, 2, LaneType::Major),
            (2, 3, LaneType::Major),
            (3, 4, LaneType::Major),
        ]);
        let map = Starmap::new(&store);
        let within = map.systems_within(SystemId::new(1), 2);
        assert_eq!(within, vec![SystemId::new(2), SystemId::new(3)]);
    }
}
