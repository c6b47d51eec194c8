//! Hashing and payload sealing for EC4X
//!
//! SHA3-256 with versioned domain tags covers three needs: content-derived
//! event IDs for idempotent delivery, per-`(game, turn)` RNG seeds, and the
//! authenticated per-recipient sealing of fog-filtered payloads. The engine
//! treats keys as opaque byte arrays throughout.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

use crate::errors::TransportError;

const EVENT_ID_TAG: &[u8] = b"EC4X_EVENT_ID_V1";
const TURN_SEED_TAG: &[u8] = b"EC4X_TURN_SEED_V1";
const SEAL_KEY_TAG: &[u8] = b"EC4X_SEAL_KEY_V1";
const SEAL_MAC_TAG: &[u8] = b"EC4X_SEAL_MAC_V1";
const DIGEST_TAG: &[u8] = b"EC4X_DIGEST_V1";

fn sha3(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    let result = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&result);
    out
}

/// Content-derived event ID: two events with identical kind and payload get
/// the same ID, which is what makes delivery idempotent.
pub fn content_event_id(kind: &str, payload: &[u8]) -> String {
    hex::encode(sha3(&[EVENT_ID_TAG, kind.as_bytes(), payload]))
}

/// Deterministic RNG seed for one turn of one game.
pub fn turn_seed(game_id: &str, turn: u32) -> [u8; 32] {
    let turn_bytes = turn.to_le_bytes();
    sha3(&[TURN_SEED_TAG, game_id.as_bytes(), &turn_bytes[..]])
}

/// Digest of serialized state, used for byte-identity determinism checks.
pub fn snapshot_digest(bytes: &[u8]) -> [u8; 32] {
    sha3(&[DIGEST_TAG, bytes])
}

/// A sealed payload: keystream ciphertext plus an authentication tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SealedPayload {
    pub ciphertext: Vec<u8>,
    pub mac: [u8; 32],
}

fn derive_key(sender_key: &[u8], recipient_key: &[u8], nonce: &[u8]) -> [u8; 32] {
    sha3(&[SEAL_KEY_TAG, sender_key, recipient_key, nonce])
}

fn keystream_apply(key: &[u8; 32], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for (block_index, chunk) in data.chunks(32).enumerate() {
        let counter = (block_index as u64).to_le_bytes();
        let block = sha3(&[&key[..], &counter[..]]);
        for (byte, pad) in chunk.iter().zip(block.iter()) {
            out.push(byte ^ pad);
        }
    }
    out
}

/// Seal a payload for one recipient. The nonce must be unique per payload;
/// callers use the event ID material (game, turn, house).
pub fn seal_payload(
    plaintext: &[u8],
    sender_key: &[u8],
    recipient_key: &[u8],
    nonce: &[u8],
) -> SealedPayload {
    let key = derive_key(sender_key, recipient_key, nonce);
    let ciphertext = keystream_apply(&key, plaintext);
    let mac = sha3(&[SEAL_MAC_TAG, &key[..], &ciphertext[..]]);
    SealedPayload { ciphertext, mac }
}

/// Open a sealed payload, verifying the tag before decrypting.
pub fn open_payload(
    sealed: &SealedPayload,
    sender_key: &[u8],
    recipient_key: &[u8],
    nonce: &[u8],
) -> Result<Vec<u8>, TransportError> {
    let key = derive_key(sender_key, recipient_key, nonce);
    let expected = sha3(&[SEAL_MAC_TAG, &key[..], &sealed.ciphertext[..]]);
    if expected != sealed.mac {
        return Err(TransportError::EncryptionFailure(
            "authentication tag mismatch".to_string(),
        ));
    }
    Ok(keystream_apply(&key, &sealed.ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let plaintext = b"turn 7 delta for house H2";
        let sealed = seal_payload(plaintext, b"sender-pub", b"recipient-pub", b"nonce-1");
        let opened = open_payload(&sealed, b"sender-pub", b"recipient-pub", b"nonce-1")
            .expect("open should succeed");
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn open_fails_for_wrong_recipient() {
        let sealed = seal_payload(b"secret", b"sender", b"alice", b"n");
        assert!(open_payload(&sealed, b"sender", b"bob", b"n").is_err());
    }

    #[test]
    fn open_fails_on_tampered_ciphertext() {
        let mut sealed = seal_payload(b"secret", b"sender", b"alice", b"n");
        sealed.ciphertext[0] ^= 0xFF;
        assert!(open_payload(&sealed, b"sender", b"alice", b"n").is_err());
    }

    #[test]
    fn event_ids_are_content_derived() {
        let a = content_event_id("turn_delta", b"payload");
        let b = content_event_id("turn_delta", b"payload");
        let c = content_event_id("turn_delta", b"other payload");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn turn_seeds_differ_by_turn_and_game() {
        assert_eq!(turn_seed("g1", 4), turn_seed("g1", 4));
        assert_ne!(turn_seed("g1", 4), turn_seed("g1", 5));
        assert_ne!(turn_seed("g1", 4), turn_seed("g2", 4));
    }
}
