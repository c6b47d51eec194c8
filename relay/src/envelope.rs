//! Wire envelope schema for EC4X
//!
//! The relay moves four shapes: game definitions, game status updates,
//! per-house full states, and per-house turn deltas. State payloads are
//! sealed per recipient; the engine never parses keys beyond opaque byte
//! arrays. Every envelope carries a content-derived event ID so duplicate
//! deliveries collapse on both sides.

use serde::{Deserialize, Serialize};

use ec4x_common::crypto::{self, SealedPayload};
use ec4x_common::errors::TransportError;
use ec4x_common::ids::{GameId, HouseId};

/// Lifecycle of a hosted game.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum GameStatus {
    Setup,
    Active,
    Paused,
    Completed,
}

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum SlotStatus {
    Pending,
    Claimed,
}

/// A join slot: claiming one binds a house to a recipient public key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSlot {
    pub index: u8,
    pub code: String,
    pub status: SlotStatus,
    pub pubkey: Vec<u8>,
}

/// Public description of a hosted game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameDefinition {
    pub game_id: GameId,
    pub name: String,
    pub status: GameStatus,
    pub slots: Vec<GameSlot>,
}

/// Payload discriminator carried on sealed envelopes.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum PayloadKind {
    FullState,
    TurnDelta,
    GameDefinition,
    GameStatus,
}

impl PayloadKind {
    pub const fn tag(self) -> &'static str {
        match self {
            PayloadKind::FullState => "full_state",
            PayloadKind::TurnDelta => "turn_delta",
            PayloadKind::GameDefinition => "game_definition",
            PayloadKind::GameStatus => "game_status",
        }
    }
}

/// Delivery direction, part of the dedup key.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// A sealed, addressed, replay-protected payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SealedEnvelope {
    pub game_id: GameId,
    pub turn: u32,
    pub house: HouseId,
    pub kind: PayloadKind,
    pub event_id: String,
    pub recipient_pubkey: Vec<u8>,
    pub sender_pubkey: Vec<u8>,
    pub payload: SealedPayload,
    pub sig: String,
}

impl SealedEnvelope {
    /// Seal a plaintext for one recipient. The nonce binds the payload to
    /// its `(game, turn, house, kind)` coordinates; the event ID derives
    /// from the plaintext so identical content dedups.
    pub fn seal(
        game_id: &GameId,
        turn: u32,
        house: HouseId,
        kind: PayloadKind,
        plaintext: &[u8],
        sender_key: &[u8],
        recipient_key: &[u8],
    ) -> Self {
        let nonce = format!("{game_id}:{turn}:{house}:{}", kind.tag());
        let payload = crypto::seal_payload(plaintext, sender_key, recipient_key, nonce.as_bytes());
        let event_id = crypto::content_event_id(kind.tag(), &[nonce.as_bytes(), plaintext].concat());
        let sig = crypto::content_event_id("envelope_sig", &[sender_key, event_id.as_bytes()].concat());
        Self {
            game_id: game_id.clone(),
            turn,
            house,
            kind,
            event_id,
            recipient_pubkey: recipient_key.to_vec(),
            sender_pubkey: sender_key.to_vec(),
            payload,
            sig,
        }
    }

    /// Open the payload with the recipient's key material.
    pub fn open(&self, recipient_key: &[u8]) -> Result<Vec<u8>, TransportError> {
        let nonce = format!(
            "{}:{}:{}:{}",
            self.game_id,
            self.turn,
            self.house,
            self.kind.tag()
        );
        crypto::open_payload(
            &self.payload,
            &self.sender_pubkey,
            recipient_key,
            nonce.as_bytes(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let envelope = SealedEnvelope::seal(
            &"game-1".to_string(),
            4,
            HouseId::new(2),
            PayloadKind::TurnDelta,
            b"delta bytes",
            b"host-key",
            b"house-2-key",
        );
        let opened = envelope.open(b"house-2-key").expect("open");
        assert_eq!(opened, b"delta bytes");
        assert!(envelope.open(b"house-3-key").is_err());
    }

    #[test]
    fn event_ids_dedup_identical_content() {
        let make = || {
            SealedEnvelope::seal(
                &"game-1".to_string(),
                4,
                HouseId::new(2),
                PayloadKind::TurnDelta,
                b"delta bytes",
                b"host-key",
                b"house-2-key",
            )
        };
        assert_eq!(make().event_id, make().event_id);
        let other = SealedEnvelope::seal(
            &"game-1".to_string(),
            5,
            HouseId::new(2),
            PayloadKind::TurnDelta,
            b"delta bytes",
            b"host-key",
            b"house-2-key",
        );
        assert_ne!(make().event_id, other.event_id);
    }
}
