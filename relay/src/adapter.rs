//! Publish/subscribe adapter for EC4X
//!
//! The only async boundary in the system. The adapter wraps a host-chosen
//! publisher, suppresses duplicate deliveries by content-derived event ID,
//! retries failed publishes a bounded number of times, and dead-letters
//! what still will not go through. A failed publish never touches the
//! committed game state.

use std::collections::BTreeSet;

use async_trait::async_trait;

use ec4x_common::errors::TransportError;
use ec4x_common::ids::{GameId, HouseId};

use crate::envelope::{Direction, GameDefinition, GameStatus, PayloadKind, SealedEnvelope};

/// The low-level transport the host plugs in.
#[async_trait]
pub trait RelayPublisher: Send {
    async fn send_envelope(&mut self, envelope: &SealedEnvelope) -> Result<(), TransportError>;
    async fn send_definition(&mut self, definition: &GameDefinition) -> Result<(), TransportError>;
    async fn send_status(
        &mut self,
        game_id: &GameId,
        name: &str,
        status: GameStatus,
    ) -> Result<(), TransportError>;
}

/// What became of a publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    /// Suppressed: this event ID was already processed in this direction.
    Duplicate,
    /// Retries exhausted; parked in the dead-letter queue.
    DeadLettered,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3 }
    }
}

/// Idempotent publish adapter over any [`RelayPublisher`].
pub struct RelayAdapter<P> {
    publisher: P,
    retry: RetryPolicy,
    processed: BTreeSet<String>,
    dead_letter: Vec<SealedEnvelope>,
}

fn dedup_key(
    game_id: &GameId,
    house: Option<HouseId>,
    kind: PayloadKind,
    event_id: &str,
    direction: Direction,
) -> String {
    let house = house.map(|h| h.to_string()).unwrap_or_else(|| "-".to_string());
    format!("{game_id}/{house}/{}/{event_id}/{direction:?}", kind.tag())
}

impl<P: RelayPublisher> RelayAdapter<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            publisher,
            retry: RetryPolicy::default(),
            processed: BTreeSet::new(),
            dead_letter: Vec::new(),
        }
    }

    pub fn with_retry(publisher: P, retry: RetryPolicy) -> Self {
        Self {
            retry,
            ..Self::new(publisher)
        }
    }

    /// Restore the processed-event index from persistence.
    pub fn restore_processed(&mut self, processed: BTreeSet<String>) {
        self.processed = processed;
    }

    pub fn processed(&self) -> &BTreeSet<String> {
        &self.processed
    }

    pub fn dead_letter(&self) -> &[SealedEnvelope] {
        &self.dead_letter
    }

    /// Mark an inbound event as seen; returns false when it is a replay.
    pub fn note_inbound(
        &mut self,
        game_id: &GameId,
        house: Option<HouseId>,
        kind: PayloadKind,
        event_id: &str,
    ) -> bool {
        self.processed
            .insert(dedup_key(game_id, house, kind, event_id, Direction::Inbound))
    }

    async fn publish(&mut self, envelope: SealedEnvelope) -> Result<PublishOutcome, TransportError> {
        let key = dedup_key(
            &envelope.game_id,
            Some(envelope.house),
            envelope.kind,
            &envelope.event_id,
            Direction::Outbound,
        );
        if self.processed.contains(&key) {
            log::debug!("duplicate publish suppressed: {key}");
            return Ok(PublishOutcome::Duplicate);
        }
        let mut last_error: Option<TransportError> = None;
        for attempt in 1..=self.retry.max_attempts {
            match self.publisher.send_envelope(&envelope).await {
                Ok(()) => {
                    self.processed.insert(key);
                    return Ok(PublishOutcome::Delivered);
                }
                Err(error) => {
                    log::warn!(
                        "publish attempt {attempt}/{} failed: {error}",
                        self.retry.max_attempts
                    );
                    last_error = Some(error);
                }
            }
        }
        self.dead_letter.push(envelope);
        match last_error {
            Some(error) => Err(error),
            None => Ok(PublishOutcome::DeadLettered),
        }
    }

    /// Publish a full fog-filtered state for one house.
    pub async fn publish_full_state(
        &mut self,
        envelope: SealedEnvelope,
    ) -> Result<PublishOutcome, TransportError> {
        debug_assert_eq!(envelope.kind, PayloadKind::FullState);
        self.publish(envelope).await
    }

    /// Publish one house's turn delta.
    pub async fn publish_turn_delta(
        &mut self,
        envelope: SealedEnvelope,
    ) -> Result<PublishOutcome, TransportError> {
        debug_assert_eq!(envelope.kind, PayloadKind::TurnDelta);
        self.publish(envelope).await
    }

    /// Publish the public game definition (slots, status, keys).
    pub async fn publish_game_definition(
        &mut self,
        definition: &GameDefinition,
    ) -> Result<(), TransportError> {
        self.publisher.send_definition(definition).await
    }

    /// Publish a bare status change.
    pub async fn publish_game_status(
        &mut self,
        game_id: &GameId,
        name: &str,
        status: GameStatus,
    ) -> Result<(), TransportError> {
        self.publisher.send_status(game_id, name, status).await
    }
}

/// In-memory relay for tests and single-process hosting.
#[derive(Debug, Default)]
pub struct InMemoryRelay {
    pub envelopes: Vec<SealedEnvelope>,
    pub definitions: Vec<GameDefinition>,
    pub statuses: Vec<(GameId, String, GameStatus)>,
    /// Induced failures remaining; each send consumes one.
    pub failures_remaining: u32,
}

#[async_trait]
impl RelayPublisher for InMemoryRelay {
    async fn send_envelope(&mut self, envelope: &SealedEnvelope) -> Result<(), TransportError> {
        if self.failures_remaining > 0 {
            self.failures_remaining -= 1;
            return Err(TransportError::RelayUnreachable("induced failure".to_string()));
        }
        self.envelopes.push(envelope.clone());
        Ok(())
    }

    async fn send_definition(&mut self, definition: &GameDefinition) -> Result<(), TransportError> {
        self.definitions.push(definition.clone());
        Ok(())
    }

    async fn send_status(
        &mut self,
        game_id: &GameId,
        name: &str,
        status: GameStatus,
    ) -> Result<(), TransportError> {
        self.statuses.push((game_id.clone(), name.to_string(), status));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    fn delta_envelope() -> SealedEnvelope {
        SealedEnvelope::seal(
            &"game-1".to_string(),
            3,
            HouseId::new(1),
            PayloadKind::TurnDelta,
            b"payload",
            b"host",
            b"house-1",
        )
    }

    #[test]
    fn duplicate_publish_is_suppressed() {
        let mut adapter = RelayAdapter::new(InMemoryRelay::default());
        let first = block_on(adapter.publish_turn_delta(delta_envelope())).expect("publish");
        let second = block_on(adapter.publish_turn_delta(delta_envelope())).expect("publish");
        assert_eq!(first, PublishOutcome::Delivered);
        assert_eq!(second, PublishOutcome::Duplicate);
        assert_eq!(adapter.publisher.envelopes.len(), 1);
    }

    #[test]
    fn failures_retry_then_dead_letter() {
        let relay = InMemoryRelay {
            failures_remaining: 10,
            ..InMemoryRelay::default()
        };
        let mut adapter = RelayAdapter::with_retry(relay, RetryPolicy { max_attempts: 2 });
        let result = block_on(adapter.publish_turn_delta(delta_envelope()));
        assert!(result.is_err());
        assert_eq!(adapter.dead_letter().len(), 1);
        assert!(adapter.publisher.envelopes.is_empty());
    }

    #[test]
    fn transient_failure_recovers_within_retry_budget() {
        let relay = InMemoryRelay {
            failures_remaining: 1,
            ..InMemoryRelay::default()
        };
        let mut adapter = RelayAdapter::with_retry(relay, RetryPolicy { max_attempts: 3 });
        let outcome = block_on(adapter.publish_turn_delta(delta_envelope())).expect("publish");
        assert_eq!(outcome, PublishOutcome::Delivered);
        assert!(adapter.dead_letter().is_empty());
    }

    #[test]
    fn inbound_replays_detected() {
        let mut adapter = RelayAdapter::new(InMemoryRelay::default());
        let game = "game-1".to_string();
        assert!(adapter.note_inbound(&game, Some(HouseId::new(1)), PayloadKind::TurnDelta, "e1"));
        assert!(!adapter.note_inbound(&game, Some(HouseId::new(1)), PayloadKind::TurnDelta, "e1"));
        // Same ID in the other direction is distinct.
        assert!(adapter.note_inbound(&game, None, PayloadKind::GameStatus, "e1"));
    }
}
