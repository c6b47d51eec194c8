//! Persisted game directory for EC4X
//!
//! One directory per game:
//!
//! ```text
//! <root>/<game_id>/
//!   definition.json            game definition + slot/pubkey mapping
//!   processed.json             processed-event index for dedup
//!   state/<turn>.json          authoritative snapshots per turn
//!   snapshots/<house>/<turn>.json   per-house filtered views (diff base)
//!   orders/<turn>/<house>.json pending order packets
//! ```
//!
//! Everything is serde_json over BTree-ordered structures, so files are
//! deterministic for identical state.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use ec4x_common::config::GameConfig;
use ec4x_common::errors::EngineError;
use ec4x_common::ids::{GameId, HouseId};

use ec4x_engine::fog::PlayerSnapshot;
use ec4x_engine::orders::OrderPacket;
use ec4x_engine::state::GameState;

use crate::envelope::GameDefinition;

fn io_err(path: &Path, error: std::io::Error) -> EngineError {
    EngineError::Io(format!("{}: {error}", path.display()))
}

fn ser_err(error: serde_json::Error) -> EngineError {
    EngineError::Serialization(error.to_string())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(ser_err)?;
    fs::write(path, bytes).map_err(|e| io_err(path, e))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, EngineError> {
    let bytes = fs::read(path).map_err(|e| io_err(path, e))?;
    serde_json::from_slice(&bytes).map_err(ser_err)
}

/// Handle to one game's on-disk layout.
#[derive(Debug, Clone)]
pub struct GameDir {
    root: PathBuf,
}

impl GameDir {
    /// Create the directory tree for a new game. Fails if it exists.
    pub fn create(data_dir: &Path, game_id: &GameId) -> Result<Self, EngineError> {
        let root = data_dir.join(game_id);
        if root.exists() {
            return Err(EngineError::Io(format!(
                "game directory {} already exists",
                root.display()
            )));
        }
        fs::create_dir_all(root.join("state")).map_err(|e| io_err(&root, e))?;
        Ok(Self { root })
    }

    /// Open an existing game directory.
    pub fn open(data_dir: &Path, game_id: &GameId) -> Result<Self, EngineError> {
        let root = data_dir.join(game_id);
        if !root.is_dir() {
            return Err(EngineError::UnknownGame(game_id.clone()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ----- Authoritative state -----

    fn state_path(&self, turn: u32) -> PathBuf {
        self.root.join("state").join(format!("{turn}.json"))
    }

    pub fn save_state(&self, state: &GameState) -> Result<(), EngineError> {
        write_json(&self.state_path(state.turn), state)
    }

    pub fn load_state(&self, turn: u32) -> Result<GameState, EngineError> {
        read_json(&self.state_path(turn))
    }

    /// Highest persisted turn, if any.
    pub fn latest_turn(&self) -> Result<Option<u32>, EngineError> {
        let dir = self.root.join("state");
        let mut latest = None;
        let entries = fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&dir, e))?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            if let Ok(turn) = stem.parse::<u32>() {
                latest = latest.max(Some(turn));
            }
        }
        Ok(latest)
    }

    pub fn load_latest_state(&self) -> Result<GameState, EngineError> {
        let turn = self
            .latest_turn()?
            .ok_or_else(|| EngineError::Io("no persisted state".to_string()))?;
        self.load_state(turn)
    }

    // ----- Per-house snapshots (the diff base for deltas) -----

    fn snapshot_path(&self, house: HouseId, turn: u32) -> PathBuf {
        self.root
            .join("snapshots")
            .join(house.to_string())
            .join(format!("{turn}.json"))
    }

    pub fn save_snapshot(&self, snapshot: &PlayerSnapshot) -> Result<(), EngineError> {
        write_json(&self.snapshot_path(snapshot.house_id, snapshot.turn), snapshot)
    }

    pub fn load_snapshot(
        &self,
        house: HouseId,
        turn: u32,
    ) -> Result<Option<PlayerSnapshot>, EngineError> {
        let path = self.snapshot_path(house, turn);
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }

    // ----- Pending orders -----

    fn orders_dir(&self, turn: u32) -> PathBuf {
        self.root.join("orders").join(turn.to_string())
    }

    pub fn save_orders(&self, turn: u32, packet: &OrderPacket) -> Result<(), EngineError> {
        let path = self.orders_dir(turn).join(format!("{}.json", packet.house));
        write_json(&path, packet)
    }

    /// All packets submitted for a turn, in house-file order.
    pub fn load_orders(&self, turn: u32) -> Result<Vec<OrderPacket>, EngineError> {
        let dir = self.orders_dir(turn);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|e| io_err(&dir, e))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        names.sort();
        names.iter().map(|path| read_json(path)).collect()
    }

    // ----- Processed-event index -----

    fn processed_path(&self) -> PathBuf {
        self.root.join("processed.json")
    }

    pub fn save_processed(&self, processed: &BTreeSet<String>) -> Result<(), EngineError> {
        write_json(&self.processed_path(), processed)
    }

    pub fn load_processed(&self) -> Result<BTreeSet<String>, EngineError> {
        let path = self.processed_path();
        if !path.exists() {
            return Ok(BTreeSet::new());
        }
        read_json(&path)
    }

    // ----- Balance config pinned at game creation -----

    fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn save_config(&self, config: &GameConfig) -> Result<(), EngineError> {
        write_json(&self.config_path(), config)
    }

    pub fn load_config(&self) -> Result<GameConfig, EngineError> {
        read_json(&self.config_path())
    }

    // ----- Published envelopes (kept for re-delivery) -----

    fn delta_path(&self, house: HouseId, turn: u32) -> PathBuf {
        self.root
            .join("deltas")
            .join(turn.to_string())
            .join(format!("{house}.json"))
    }

    pub fn save_envelope(
        &self,
        envelope: &crate::envelope::SealedEnvelope,
    ) -> Result<(), EngineError> {
        write_json(&self.delta_path(envelope.house, envelope.turn), envelope)
    }

    // ----- Definition and slot/pubkey mapping -----

    fn definition_path(&self) -> PathBuf {
        self.root.join("definition.json")
    }

    pub fn save_definition(&self, definition: &GameDefinition) -> Result<(), EngineError> {
        write_json(&self.definition_path(), definition)
    }

    pub fn load_definition(&self) -> Result<GameDefinition, EngineError> {
        read_json(&self.definition_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{GameSlot, GameStatus, SlotStatus};

    fn game_id() -> GameId {
        "persist-test".to_string()
    }

    #[test]
    fn state_round_trips_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let game = GameDir::create(dir.path(), &game_id()).expect("create");
        let mut state = GameState::new(game_id());
        state.turn = 3;
        game.save_state(&state).expect("save");
        let loaded = game.load_state(3).expect("load");
        assert_eq!(state, loaded);
        assert_eq!(game.latest_turn().expect("latest"), Some(3));
    }

    #[test]
    fn create_refuses_to_clobber() {
        let dir = tempfile::tempdir().expect("tempdir");
        GameDir::create(dir.path(), &game_id()).expect("create");
        assert!(GameDir::create(dir.path(), &game_id()).is_err());
        GameDir::open(dir.path(), &game_id()).expect("open");
    }

    #[test]
    fn open_unknown_game_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            GameDir::open(dir.path(), &"missing".to_string()),
            Err(EngineError::UnknownGame(_))
        ));
    }

    #[test]
    fn orders_collect_in_house_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let game = GameDir::create(dir.path(), &game_id()).expect("create");
        for house in [1u64, 0u64] {
            let packet = OrderPacket {
                house: HouseId::new(house),
                turn: 2,
                ..OrderPacket::default()
            };
            game.save_orders(2, &packet).expect("save");
        }
        let packets = game.load_orders(2).expect("load");
        assert_eq!(packets.len(), 2);
        assert_eq!(game.load_orders(9).expect("load empty").len(), 0);
    }

    #[test]
    fn definition_and_processed_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let game = GameDir::create(dir.path(), &game_id()).expect("create");
        let definition = GameDefinition {
            game_id: game_id(),
            name: "Test Game".to_string(),
            status: GameStatus::Active,
            slots: vec![GameSlot {
                index: 0,
                code: "JOIN-1".to_string(),
                status: SlotStatus::Claimed,
                pubkey: vec![1, 2, 3],
            }],
        };
        game.save_definition(&definition).expect("save definition");
        assert_eq!(game.load_definition().expect("load"), definition);

        let mut processed = BTreeSet::new();
        processed.insert("g/h/turn_delta/abc/Outbound".to_string());
        game.save_processed(&processed).expect("save processed");
        assert_eq!(game.load_processed().expect("load"), processed);
    }
}
