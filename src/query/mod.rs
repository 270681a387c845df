use tracing::debug;

use crate::api::models::{AgentReportRow, Last7DaysRow, RawIntervalRow, RecordsPage};
use crate::error::Error;

/// Lifecycle of one query slot. Data is replaced wholesale on every
/// successful resolution, never patched in place.
#[derive(Debug, Clone, Default)]
pub enum SlotState<T> {
    #[default]
    Idle,
    Loading,
    Ready(T),
    Error(String),
}

impl<T> SlotState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, SlotState::Loading)
    }

    pub fn as_ready(&self) -> Option<&T> {
        match self {
            SlotState::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SlotState::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// One independently-loaded query channel. Race safety comes from the
/// monotonic sequence token, not from cancelling requests: `begin` hands
/// out the next token, and `apply` discards any response whose token is no
/// longer the highest issued — a slower-but-newer request always beats a
/// faster-but-older one.
#[derive(Debug, Default)]
pub struct Slot<T> {
    state: SlotState<T>,
    issued: u64,
    applied: u64,
}

impl<T> Slot<T> {
    /// Start a new request cycle; returns the token the response must
    /// present to `apply`.
    pub fn begin(&mut self) -> u64 {
        self.issued += 1;
        self.state = SlotState::Loading;
        self.issued
    }

    /// Apply a response if its token is still current. Returns whether the
    /// slot state changed; stale responses are dropped silently.
    pub fn apply(&mut self, token: u64, result: Result<T, Error>) -> bool {
        if token != self.issued || token <= self.applied {
            debug!(
                "discarding stale response (token {token}, issued {}, applied {})",
                self.issued, self.applied
            );
            return false;
        }
        self.applied = token;
        self.state = match result {
            Ok(value) => SlotState::Ready(value),
            Err(err) => SlotState::Error(err.to_string()),
        };
        true
    }

    /// Drop held data without touching the token counters; in-flight
    /// responses from before the invalidation still resolve against the
    /// same monotonic sequence.
    pub fn invalidate(&mut self) {
        self.state = SlotState::Idle;
    }

    pub fn state(&self) -> &SlotState<T> {
        &self.state
    }

    #[cfg(test)]
    fn applied_token(&self) -> u64 {
        self.applied
    }
}

/// The four independent query channels. No "all ready" gate exists: each
/// slot renders as soon as its own response lands, and a slot error never
/// touches its siblings.
#[derive(Debug, Default)]
pub struct QueryLayer {
    pub records: Slot<RecordsPage>,
    pub agent_report: Slot<Vec<AgentReportRow>>,
    pub chart: Slot<Vec<RawIntervalRow>>,
    pub last7_days: Slot<Vec<Last7DaysRow>>,
}

impl QueryLayer {
    /// Window or client changed: every slot's held data is stale.
    pub fn invalidate_all(&mut self) {
        self.records.invalidate();
        self.agent_report.invalidate();
        self.chart.invalidate();
        self.last7_days.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(total: i64) -> RecordsPage {
        RecordsPage {
            rows: Vec::new(),
            total_records: total,
        }
    }

    #[test]
    fn newest_token_wins_regardless_of_arrival_order() {
        let mut slot: Slot<RecordsPage> = Slot::default();
        let first = slot.begin();
        let second = slot.begin();

        // Newer request resolves first.
        assert!(slot.apply(second, Ok(page(2))));
        // Older request resolves late and must be dropped.
        assert!(!slot.apply(first, Ok(page(1))));

        assert_eq!(slot.state().as_ready().unwrap().total_records, 2);
        assert_eq!(slot.applied_token(), second);
    }

    #[test]
    fn superseded_request_is_dropped_even_if_it_arrives_first() {
        let mut slot: Slot<RecordsPage> = Slot::default();
        let first = slot.begin();
        let second = slot.begin();

        // A response is only applied while its token is the highest issued.
        assert!(!slot.apply(first, Ok(page(1))));
        assert!(slot.state().is_loading());

        assert!(slot.apply(second, Ok(page(2))));
        assert_eq!(slot.state().as_ready().unwrap().total_records, 2);
    }

    #[test]
    fn duplicate_apply_of_same_token_is_ignored() {
        let mut slot: Slot<RecordsPage> = Slot::default();
        let token = slot.begin();
        assert!(slot.apply(token, Ok(page(1))));
        assert!(!slot.apply(token, Ok(page(9))));
        assert_eq!(slot.state().as_ready().unwrap().total_records, 1);
    }

    #[test]
    fn error_is_scoped_to_its_own_slot() {
        let mut layer = QueryLayer::default();
        let records_token = layer.records.begin();
        let chart_token = layer.chart.begin();

        layer.records.apply(
            records_token,
            Err(Error::Fetch {
                status: 500,
                message: "boom".into(),
            }),
        );
        layer.chart.apply(chart_token, Ok(Vec::new()));

        assert!(layer.records.state().error().is_some());
        assert!(layer.chart.state().as_ready().is_some());
    }

    #[test]
    fn invalidate_keeps_token_sequence_monotonic() {
        let mut slot: Slot<RecordsPage> = Slot::default();
        let stale = slot.begin();
        slot.invalidate();
        let fresh = slot.begin();

        // The pre-invalidation response arrives late; still dropped.
        assert!(!slot.apply(stale, Ok(page(1))));
        assert!(slot.apply(fresh, Ok(page(2))));
        assert_eq!(slot.state().as_ready().unwrap().total_records, 2);
    }

    #[test]
    fn empty_result_is_ready_not_error() {
        let mut slot: Slot<RecordsPage> = Slot::default();
        let token = slot.begin();
        slot.apply(token, Ok(page(0)));
        let state = slot.state();
        assert!(state.as_ready().is_some());
        assert!(state.error().is_none());
    }
}
