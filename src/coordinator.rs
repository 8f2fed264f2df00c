// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The coordinator serves variable defaults to running simulations.
//! It is a single worker thread that handles one request at a time,
//! answering from the requesting model's defaults unless the
//! requesting instance has overridden the variable.  Once stopped,
//! every outstanding and later request fails with
//! `coordinator_stopped` instead of blocking.

use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::common::{Ident, Result};
use crate::sim_err;

pub type Defaults = BTreeMap<Ident, f64>;

/// SimId identifies one simulation instance to the coordinator.
pub type SimId = usize;

enum Request {
    Get {
        sim: SimId,
        defaults: Arc<Defaults>,
        name: Ident,
        reply: Sender<Option<f64>>,
    },
    Set {
        sim: SimId,
        name: Ident,
        value: f64,
        reply: Sender<()>,
    },
    /// drop every override held for a simulation
    Forget(SimId),
    Stop,
}

fn serve(requests: Receiver<Request>) {
    let mut overrides: HashMap<SimId, HashMap<Ident, f64>> = HashMap::new();

    while let Ok(request) = requests.recv() {
        match request {
            Request::Get {
                sim,
                defaults,
                name,
                reply,
            } => {
                let value = overrides
                    .get(&sim)
                    .and_then(|vars| vars.get(&name))
                    .or_else(|| defaults.get(&name))
                    .copied();
                // the requester may have given up; nothing to do then
                let _ = reply.send(value);
            }
            Request::Set {
                sim,
                name,
                value,
                reply,
            } => {
                overrides.entry(sim).or_default().insert(name, value);
                let _ = reply.send(());
            }
            Request::Forget(sim) => {
                overrides.remove(&sim);
            }
            Request::Stop => break,
        }
    }
}

/// CoordinatorHandle is a cheap, cloneable connection to a running
/// coordinator.
#[derive(Clone, Debug)]
pub struct CoordinatorHandle {
    requests: Sender<Request>,
}

impl CoordinatorHandle {
    fn stopped<T>(what: &str) -> Result<T> {
        sim_err!(
            CoordinatorStopped,
            format!("coordinator stopped before {what} could be served")
        )
    }

    /// get returns the value `name` has for simulation `sim`: its
    /// override if one was set, otherwise the model default.  A
    /// variable with neither is None.
    pub fn get(&self, sim: SimId, defaults: &Arc<Defaults>, name: &str) -> Result<Option<f64>> {
        let (reply, response) = channel();
        let request = Request::Get {
            sim,
            defaults: defaults.clone(),
            name: name.to_string(),
            reply,
        };
        if self.requests.send(request).is_err() {
            return Self::stopped(name);
        }
        match response.recv() {
            Ok(value) => Ok(value),
            Err(_) => Self::stopped(name),
        }
    }

    /// set overrides the value of `name` for simulation `sim`.
    pub fn set(&self, sim: SimId, name: &str, value: f64) -> Result<()> {
        let (reply, response) = channel();
        let request = Request::Set {
            sim,
            name: name.to_string(),
            value,
            reply,
        };
        if self.requests.send(request).is_err() {
            return Self::stopped(name);
        }
        match response.recv() {
            Ok(()) => Ok(()),
            Err(_) => Self::stopped(name),
        }
    }

    /// forget discards every override held for `sim`.
    pub fn forget(&self, sim: SimId) {
        // a stopped coordinator holds no overrides
        let _ = self.requests.send(Request::Forget(sim));
    }
}

/// Coordinator owns the worker thread.  Dropping it stops the worker.
pub struct Coordinator {
    handle: CoordinatorHandle,
    worker: Option<JoinHandle<()>>,
}

impl Coordinator {
    pub fn new() -> Self {
        let (requests, receiver) = channel();
        let worker = thread::spawn(move || serve(receiver));
        Coordinator {
            handle: CoordinatorHandle { requests },
            worker: Some(worker),
        }
    }

    pub fn handle(&self) -> CoordinatorHandle {
        self.handle.clone()
    }

    /// stop asks the worker to exit and waits for it.  Requests queued
    /// behind the stop, and any issued afterwards, fail.
    pub fn stop(&mut self) {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => return,
        };
        let _ = self.handle.requests.send(Request::Stop);
        if worker.join().is_err() {
            crate::eprintln!("warning: coordinator worker panicked");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ErrorCode, ErrorKind};

    fn defaults() -> Arc<Defaults> {
        let mut defaults = Defaults::new();
        defaults.insert("rate".to_string(), 5.0);
        defaults.insert("size".to_string(), 2.0);
        Arc::new(defaults)
    }

    #[test]
    fn test_defaults_and_overrides() {
        let coordinator = Coordinator::new();
        let handle = coordinator.handle();
        let defaults = defaults();

        assert_eq!(Some(5.0), handle.get(0, &defaults, "rate").unwrap());
        assert_eq!(None, handle.get(0, &defaults, "missing").unwrap());

        handle.set(0, "rate", 7.5).unwrap();
        assert_eq!(Some(7.5), handle.get(0, &defaults, "rate").unwrap());
        // overrides are per instance
        assert_eq!(Some(5.0), handle.get(1, &defaults, "rate").unwrap());
        assert_eq!(Some(2.0), handle.get(0, &defaults, "size").unwrap());

        handle.forget(0);
        assert_eq!(Some(5.0), handle.get(0, &defaults, "rate").unwrap());
    }

    #[test]
    fn test_concurrent_requests() {
        let coordinator = Coordinator::new();
        let defaults = defaults();

        let workers: Vec<_> = (0..8)
            .map(|sim| {
                let handle = coordinator.handle();
                let defaults = defaults.clone();
                thread::spawn(move || {
                    handle.set(sim, "rate", sim as f64).unwrap();
                    (0..100)
                        .map(|_| handle.get(sim, &defaults, "rate").unwrap())
                        .all(|v| v == Some(sim as f64))
                })
            })
            .collect();

        for worker in workers {
            assert!(worker.join().unwrap());
        }
    }

    #[test]
    fn test_requests_after_stop_fail() {
        let mut coordinator = Coordinator::new();
        let handle = coordinator.handle();
        let defaults = defaults();
        assert!(coordinator.is_running());

        coordinator.stop();
        assert!(!coordinator.is_running());
        // stopping twice is a no-op
        coordinator.stop();

        let err = handle.get(0, &defaults, "rate").unwrap_err();
        assert_eq!(ErrorKind::Simulation, err.kind);
        assert_eq!(ErrorCode::CoordinatorStopped, err.code);
        let err = handle.set(0, "rate", 1.0).unwrap_err();
        assert_eq!(ErrorCode::CoordinatorStopped, err.code);
        handle.forget(0);
    }

    #[test]
    fn test_drop_stops_worker() {
        let coordinator = Coordinator::new();
        let handle = coordinator.handle();
        drop(coordinator);
        let err = handle.get(0, &defaults(), "rate").unwrap_err();
        assert_eq!(ErrorCode::CoordinatorStopped, err.code);
    }
}
