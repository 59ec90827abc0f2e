use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::cells::{CellId, RunOutcome};
use crate::db::{ExecError, ExecRequest, ExecResponse, SqlExecutor, start_exec_worker};

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub cell: CellId,
    pub outcome: RunOutcome,
    pub elapsed: Duration,
}

/// Per-cell front of the execution worker: remembers when each cell started
/// and turns worker answers into timed completions.
pub struct ExecutionBridge {
    req_tx: Sender<ExecRequest>,
    resp_rx: Receiver<ExecResponse>,
    in_flight: HashMap<CellId, Instant>,
}

impl ExecutionBridge {
    pub fn new(req_tx: Sender<ExecRequest>, resp_rx: Receiver<ExecResponse>) -> Self {
        Self {
            req_tx,
            resp_rx,
            in_flight: HashMap::new(),
        }
    }

    /// Start the worker thread that owns `executor`.
    pub fn spawn(executor: Box<dyn SqlExecutor>) -> Self {
        let (req_tx, req_rx) = crossbeam_channel::unbounded::<ExecRequest>();
        let (resp_tx, resp_rx) = crossbeam_channel::unbounded::<ExecResponse>();
        std::thread::spawn(move || start_exec_worker(executor, req_rx, resp_tx));
        Self::new(req_tx, resp_rx)
    }

    pub fn submit(&mut self, cell: CellId, sql: String) -> Result<(), ExecError> {
        self.in_flight.insert(cell, Instant::now());
        if self
            .req_tx
            .send(ExecRequest::Execute { cell, sql })
            .is_err()
        {
            self.in_flight.remove(&cell);
            return Err(ExecError::WorkerGone);
        }
        Ok(())
    }

    pub fn is_in_flight(&self, cell: CellId) -> bool {
        self.in_flight.contains_key(&cell)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Drain finished work without blocking.
    pub fn poll(&mut self) -> Vec<Completion> {
        let mut done = Vec::new();
        while let Ok(msg) = self.resp_rx.try_recv() {
            match msg {
                ExecResponse::Finished {
                    cell,
                    outcome,
                    finished_at,
                } => {
                    let started = self.in_flight.remove(&cell).unwrap_or(finished_at);
                    done.push(Completion {
                        cell,
                        outcome,
                        elapsed: finished_at.saturating_duration_since(started),
                    });
                }
            }
        }
        done
    }
}
