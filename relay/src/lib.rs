//! # EC4X Relay
//!
//! The transport boundary: sealed wire envelopes, the idempotent async
//! publish adapter, and the persisted game directory the host runs games
//! out of. The engine core stays synchronous; only this crate awaits.

pub mod adapter;
pub mod envelope;
pub mod persist;

pub use adapter::{InMemoryRelay, PublishOutcome, RelayAdapter, RelayPublisher, RetryPolicy};
pub use envelope::{
    Direction, GameDefinition, GameSlot, GameStatus, PayloadKind, SealedEnvelope, SlotStatus,
};
pub use persist::GameDir;
