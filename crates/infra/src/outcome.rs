//! Per-envelope routing outcomes.
//!
//! The router never lets a failure escape the channel, but it does not drop
//! it either: every envelope produces a `RouteOutcome`, which is logged and
//! handed to an `OutcomeSink` keyed by correlation id. Envelopes that could
//! not be applied at all are also dead-lettered with their original body.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;

use phonestore_core::{CorrelationId, DomainError};
use phonestore_events::{Channel, CommandEnvelope};
use phonestore_inventory::{DecodeError, PhoneInventoryItem};

use crate::engine::EngineError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Every part of the command was applied.
    Completed,
    /// Some order lines were applied, others were skipped or rejected.
    Partial,
    /// Nothing was applied.
    Rejected,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnknownAction,
    Misrouted,
    PayloadShape,
    Validation,
    InvalidId,
    NotFound,
    InsufficientQuantity,
    DuplicateConflict,
    Conflict,
    Store,
    Panicked,
}

impl FailureKind {
    pub fn of_domain(err: &DomainError) -> Self {
        match err {
            DomainError::Validation(_) => FailureKind::Validation,
            DomainError::PayloadShape(_) => FailureKind::PayloadShape,
            DomainError::InvalidId(_) => FailureKind::InvalidId,
            DomainError::NotFound(_) => FailureKind::NotFound,
            DomainError::InsufficientQuantity { .. } => FailureKind::InsufficientQuantity,
            DomainError::DuplicateConflict(_) => FailureKind::DuplicateConflict,
            DomainError::Conflict(_) => FailureKind::Conflict,
        }
    }
}

/// A failure caught inside the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainedFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Order line index, for failures that hit a single line of a batch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl ContainedFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

impl From<&DecodeError> for ContainedFailure {
    fn from(err: &DecodeError) -> Self {
        let kind = match err {
            DecodeError::UnknownAction(_) => FailureKind::UnknownAction,
            DecodeError::Misrouted { .. } => FailureKind::Misrouted,
            DecodeError::Invalid(e) => FailureKind::of_domain(e),
        };
        Self::new(kind, err.to_string())
    }
}

impl From<&EngineError> for ContainedFailure {
    fn from(err: &EngineError) -> Self {
        let kind = match err {
            EngineError::Domain(e) => FailureKind::of_domain(e),
            EngineError::Store(_) => FailureKind::Store,
        };
        Self::new(kind, err.to_string())
    }
}

/// What routing one envelope produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteOutcome {
    pub correlation_id: CorrelationId,
    pub channel: Channel,
    pub action: String,
    pub status: OutcomeStatus,
    pub items: Vec<PhoneInventoryItem>,
    pub failures: Vec<ContainedFailure>,
    pub processed_at: DateTime<Utc>,
}

impl RouteOutcome {
    pub fn completed(channel: Channel, envelope: &CommandEnvelope, items: Vec<PhoneInventoryItem>) -> Self {
        Self::build(channel, envelope, OutcomeStatus::Completed, items, Vec::new())
    }

    /// Nothing applied; the result list is empty.
    pub fn rejected(channel: Channel, envelope: &CommandEnvelope, failure: ContainedFailure) -> Self {
        Self::build(channel, envelope, OutcomeStatus::Rejected, Vec::new(), vec![failure])
    }

    pub fn build(
        channel: Channel,
        envelope: &CommandEnvelope,
        status: OutcomeStatus,
        items: Vec<PhoneInventoryItem>,
        failures: Vec<ContainedFailure>,
    ) -> Self {
        Self {
            correlation_id: envelope.correlation_id(),
            channel,
            action: envelope.action().to_string(),
            status,
            items,
            failures,
            processed_at: Utc::now(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.status == OutcomeStatus::Rejected
    }
}

/// An envelope that could not be applied, kept with its original body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub channel: Channel,
    pub envelope: CommandEnvelope,
    pub failures: Vec<ContainedFailure>,
    pub recorded_at: DateTime<Utc>,
}

/// Where routing outcomes go after they are logged.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, outcome: &RouteOutcome);

    fn dead_letter(&self, letter: DeadLetter);
}

impl<S> OutcomeSink for Arc<S>
where
    S: OutcomeSink + ?Sized,
{
    fn record(&self, outcome: &RouteOutcome) {
        (**self).record(outcome)
    }

    fn dead_letter(&self, letter: DeadLetter) {
        (**self).dead_letter(letter)
    }
}

/// Bounded in-memory sink: keeps the latest `capacity` outcomes and dead
/// letters, evicting the oldest first.
#[derive(Debug)]
pub struct InMemoryOutcomeSink {
    capacity: usize,
    state: Mutex<SinkState>,
}

#[derive(Debug, Default)]
struct SinkState {
    outcomes: HashMap<CorrelationId, RouteOutcome>,
    order: VecDeque<CorrelationId>,
    dead_letters: VecDeque<DeadLetter>,
}

pub const DEFAULT_OUTCOME_CAPACITY: usize = 1_024;

impl InMemoryOutcomeSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(SinkState::default()),
        }
    }

    pub fn outcome(&self, correlation_id: CorrelationId) -> Option<RouteOutcome> {
        let state = self.state.lock().ok()?;
        state.outcomes.get(&correlation_id).cloned()
    }

    /// Dead letters, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        match self.state.lock() {
            Ok(state) => state.dead_letters.iter().cloned().collect(),
            Err(_) => vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.outcomes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryOutcomeSink {
    fn default() -> Self {
        Self::new(DEFAULT_OUTCOME_CAPACITY)
    }
}

impl OutcomeSink for InMemoryOutcomeSink {
    fn record(&self, outcome: &RouteOutcome) {
        let Ok(mut state) = self.state.lock() else {
            tracing::warn!(correlation_id = %outcome.correlation_id, "outcome sink poisoned; outcome dropped");
            return;
        };

        // Redelivery of the same envelope overwrites in place.
        if state
            .outcomes
            .insert(outcome.correlation_id, outcome.clone())
            .is_none()
        {
            state.order.push_back(outcome.correlation_id);
        }

        while state.order.len() > self.capacity {
            if let Some(oldest) = state.order.pop_front() {
                state.outcomes.remove(&oldest);
            }
        }
    }

    fn dead_letter(&self, letter: DeadLetter) {
        let Ok(mut state) = self.state.lock() else {
            tracing::warn!(correlation_id = %letter.envelope.correlation_id(), "outcome sink poisoned; dead letter dropped");
            return;
        };
        state.dead_letters.push_back(letter);
        while state.dead_letters.len() > self.capacity {
            state.dead_letters.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> CommandEnvelope {
        CommandEnvelope::stamped("GET_ALL_PHONES", None, json!({}))
    }

    #[test]
    fn sink_evicts_oldest_outcomes_past_capacity() {
        let sink = InMemoryOutcomeSink::new(2);
        let envs: Vec<_> = (0..3).map(|_| envelope()).collect();
        for env in &envs {
            sink.record(&RouteOutcome::completed(Channel::Query, env, vec![]));
        }
        assert_eq!(sink.len(), 2);
        assert!(sink.outcome(envs[0].correlation_id()).is_none());
        assert!(sink.outcome(envs[2].correlation_id()).is_some());
    }

    #[test]
    fn redelivered_outcome_replaces_the_previous_one() {
        let sink = InMemoryOutcomeSink::new(4);
        let env = envelope();
        sink.record(&RouteOutcome::completed(Channel::Query, &env, vec![]));
        sink.record(&RouteOutcome::rejected(
            Channel::Query,
            &env,
            ContainedFailure::new(FailureKind::Store, "boom"),
        ));
        assert_eq!(sink.len(), 1);
        assert!(sink.outcome(env.correlation_id()).unwrap().is_rejected());
    }

    #[test]
    fn outcome_serializes_for_clients() {
        let env = envelope();
        let failure = ContainedFailure::new(FailureKind::InsufficientQuantity, "short").at_line(1);
        let outcome = RouteOutcome::build(
            Channel::Mutate,
            &env,
            OutcomeStatus::Partial,
            vec![],
            vec![failure],
        );
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["status"], "partial");
        assert_eq!(v["channel"], "mutate");
        assert_eq!(v["correlationId"], env.correlation_id().to_string());
        assert_eq!(v["failures"][0]["kind"], "insufficient_quantity");
        assert_eq!(v["failures"][0]["line"], 1);
    }

    #[test]
    fn decode_errors_map_to_failure_kinds() {
        let f = ContainedFailure::from(&DecodeError::UnknownAction("X".into()));
        assert_eq!(f.kind, FailureKind::UnknownAction);
        let f = ContainedFailure::from(&DecodeError::Invalid(DomainError::payload_shape("bad")));
        assert_eq!(f.kind, FailureKind::PayloadShape);
    }
}
