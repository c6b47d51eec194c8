//! Authoritative game state for EC4X
//!
//! One [`GameState`] per game: the entity store plus cross-cutting records
//! that outlive a single turn (intel, in-flight transfers, ongoing
//! espionage effects, pending pact proposals). The state is pure data:
//! config and RNG are supplied to the pipeline per turn, never stored.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use ec4x_common::crypto;
use ec4x_common::errors::EngineError;
use ec4x_common::events::EspionageAction;
use ec4x_common::ids::{ColonyId, GameId, HouseId, SystemId};
use ec4x_common::types::{PlanetClass, ResourceRating};

use crate::intel::HouseIntel;
use crate::store::EntityStore;

/// Colonizable-world attributes carried by the starmap data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldProfile {
    pub class: PlanetClass,
    pub rating: ResourceRating,
}

/// A Space-Guild population shipment between two colonies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferInFlight {
    pub house: HouseId,
    pub from: ColonyId,
    pub to: ColonyId,
    /// Origin and destination systems, kept for blockade checks even if a
    /// colony record changes hands mid-flight.
    pub from_system: SystemId,
    pub to_system: SystemId,
    pub ptus: u32,
    pub remaining_turns: u32,
}

/// A lingering espionage effect applied each Income Phase until expiry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct OngoingEffect {
    pub action: EspionageAction,
    pub attacker: HouseId,
    pub target: HouseId,
    pub remaining_turns: u32,
    pub magnitude: f64,
}

/// The single authoritative state for one game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct GameState {
    pub game_id: GameId,
    pub turn: u32,
    pub store: EntityStore,
    /// Planet profiles by system, from the consumed starmap.
    pub worlds: BTreeMap<SystemId, WorldProfile>,
    pub intel: BTreeMap<HouseId, HouseIntel>,
    pub transfers: Vec<TransferInFlight>,
    pub effects: Vec<OngoingEffect>,
    /// Open pact proposals as (proposer, target) pairs.
    pub pending_pacts: BTreeSet<(HouseId, HouseId)>,
    pub winner: Option<HouseId>,
}

impl GameState {
    pub fn new(game_id: impl Into<GameId>) -> Self {
        Self {
            game_id: game_id.into(),
            ..Self::default()
        }
    }

    /// Canonical byte encoding of the whole state. Every collection in the
    /// state is BTree-ordered, so the encoding is stable for equal states.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, EngineError> {
        serde_json::to_vec(self).map_err(|e| EngineError::Serialization(e.to_string()))
    }

    /// Hex digest of the canonical bytes; two identical runs must agree.
    pub fn digest(&self) -> Result<String, EngineError> {
        Ok(hex::encode(crypto::snapshot_digest(&self.canonical_bytes()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialization_round_trip() {
        let mut state = GameState::new("game-7");
        state.turn = 4;
        state.pending_pacts.insert((HouseId::new(0), HouseId::new(1)));
        let json = serde_json::to_string(&state).expect("serialize");
        let back: GameState = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(state, back);
    }

    #[test]
    fn digest_is_stable() {
        let state = GameState::new("game-7");
        assert_eq!(state.digest().unwrap(), state.digest().unwrap());
    }
}
