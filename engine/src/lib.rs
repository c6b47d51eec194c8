//! # EC4X Engine
//!
//! The deterministic turn-resolution core: an owner-indexed entity store,
//! the starmap graph, order validation with sequential budget reservation,
//! the economy / combat / diplomacy / espionage kernels, the per-house
//! intelligence DB, the fog-of-war filter with snapshot deltas, and the
//! four-phase turn pipeline that binds them together.
//!
//! The engine is synchronous and pure with respect to its inputs: given
//! the same `(state, validated orders, seed)` it produces byte-identical
//! `(state, event log)`. Anything async (order intake, publication)
//! lives behind the relay crate's transport boundary.

pub mod combat;
pub mod diplomacy;
pub mod economy;
pub mod espionage;
pub mod fog;
pub mod intel;
pub mod orders;
pub mod pipeline;
pub mod setup;
pub mod starmap;
pub mod state;
pub mod store;

pub use orders::{OrderPacket, ValidatedPacket};
pub use pipeline::{resolve_turn, TurnOutcome};
pub use setup::{new_game, HouseSpec, StarmapSpec};
pub use state::GameState;
pub use store::EntityStore;
