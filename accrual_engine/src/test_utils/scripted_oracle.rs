//! An in-process accrual oracle whose answers are scripted per order number.
//!
//! Each order has a queue of outcomes. Every call pops the next one, and the last outcome in the queue is repeated
//! forever after. Orders without a script get the default outcome. Every call is recorded with the (tokio) time it
//! was made, so tests can assert how often, and when, the oracle was consulted.
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::Instant;

use crate::{
    db_types::OrderNumber,
    oracle::{AccrualOracle, OracleOutcome},
};

#[derive(Debug, Clone)]
pub struct OracleCall {
    pub number: OrderNumber,
    pub at: Instant,
}

#[derive(Debug)]
struct ScriptState {
    scripts: HashMap<OrderNumber, VecDeque<OracleOutcome>>,
    default_outcome: OracleOutcome,
    calls: Vec<OracleCall>,
}

#[derive(Debug, Clone)]
pub struct ScriptedOracle {
    state: Arc<Mutex<ScriptState>>,
    latency: Duration,
}

impl Default for ScriptedOracle {
    fn default() -> Self {
        Self::new(OracleOutcome::unknown())
    }
}

impl ScriptedOracle {
    pub fn new(default_outcome: OracleOutcome) -> Self {
        let state = ScriptState { scripts: HashMap::new(), default_outcome, calls: Vec::new() };
        Self { state: Arc::new(Mutex::new(state)), latency: Duration::ZERO }
    }

    /// Every call will take at least this long to answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn script<N: Into<OrderNumber>>(&self, number: N, outcomes: Vec<OracleOutcome>) -> &Self {
        let mut state = self.state.lock().unwrap();
        state.scripts.insert(number.into(), outcomes.into());
        self
    }

    pub fn calls(&self) -> Vec<OracleCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls.len()
    }

    pub fn calls_for<N: Into<OrderNumber>>(&self, number: N) -> usize {
        let number = number.into();
        self.state.lock().unwrap().calls.iter().filter(|c| c.number == number).count()
    }

    fn next_outcome(&self, number: &OrderNumber) -> OracleOutcome {
        let mut state = self.state.lock().unwrap();
        state.calls.push(OracleCall { number: number.clone(), at: Instant::now() });
        let default_outcome = state.default_outcome.clone();
        match state.scripts.get_mut(number) {
            Some(script) if script.len() > 1 => script.pop_front().unwrap_or(default_outcome),
            Some(script) => script.front().cloned().unwrap_or(default_outcome),
            None => default_outcome,
        }
    }
}

impl AccrualOracle for ScriptedOracle {
    async fn check_order(&self, number: &OrderNumber) -> OracleOutcome {
        let outcome = self.next_outcome(number);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        outcome
    }
}
