// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;
use std::mem;
use std::sync::Arc;

use float_cmp::approx_eq;

use crate::ast::{BinaryOp, UnaryOp};
use crate::builtins::BuiltinFn;
use crate::common::{Ident, Result};
use crate::compiler::{Expr, Rule, Table};
use crate::coordinator::{CoordinatorHandle, Defaults, SimId};
use crate::model::Model;
use crate::passes::Timespec;
use crate::results::Results;
use crate::sim_err;

/// the name under which the current time is kept in a state
const TIME: &str = "time";

/// lookup evaluates a table's piecewise linear function at `index`,
/// clamping to the first and last points outside the table's range.
pub fn lookup(table: &Table, index: f64) -> f64 {
    let (xs, ys) = (&table.x, &table.y);
    let size = xs.len().min(ys.len());
    if size == 0 {
        return f64::NAN;
    }

    if index.is_nan() {
        // things get wonky below if we try to binary search for NaN
        return f64::NAN;
    }

    // check if index is below the start of the table
    if index < xs[0] {
        return ys[0];
    }
    if index > xs[size - 1] {
        return ys[size - 1];
    }

    // the first point whose x is at least index
    let mut low = 0;
    let mut high = size;
    while low < high {
        let mid = low + (high - low) / 2;
        if xs[mid] < index {
            low = mid + 1;
        } else {
            high = mid;
        }
    }

    let i = low;
    if i == 0 || approx_eq!(f64, xs[i], index) {
        ys[i]
    } else {
        // slope = deltaY/deltaX
        let slope = (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
        // y = m*x + b
        (index - xs[i - 1]) * slope + ys[i - 1]
    }
}

fn apply_builtin(builtin: &BuiltinFn<f64>) -> f64 {
    use BuiltinFn::*;
    match builtin {
        Abs(a) => a.abs(),
        Arctan(a) => a.atan(),
        Cos(a) => a.cos(),
        Exp(a) => a.exp(),
        Ln(a) => a.ln(),
        Log10(a) => a.log10(),
        Max(a, b) => a.max(**b),
        Min(a, b) => a.min(**b),
        Pi => std::f64::consts::PI,
        Sin(a) => a.sin(),
        Sqrt(a) => a.sqrt(),
        Tan(a) => a.tan(),
    }
}

/// SimState is where a simulation is in its run.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum SimState {
    /// created, nothing evaluated yet
    Uninitialized,
    /// initial values and the first step's flows computed
    InitialComputed,
    Stepping,
    /// the end time has been reached
    Complete,
}

/// Sim is one running instance of a model.  Each step reads the
/// `curr` state and writes integrated stocks into `next`, which then
/// becomes current.
pub struct Sim {
    id: SimId,
    instance: Ident,
    model: Arc<Model>,
    defaults: Arc<Defaults>,
    coordinator: CoordinatorHandle,
    timespec: Timespec,
    save_every: usize,
    curr: HashMap<Ident, f64>,
    next: HashMap<Ident, f64>,
    results: Results,
    step: usize,
    state: SimState,
}

impl Sim {
    pub fn new(
        id: SimId,
        instance: &str,
        model: Arc<Model>,
        timespec: Timespec,
        coordinator: CoordinatorHandle,
    ) -> Result<Sim> {
        timespec.validate()?;
        let mut curr = HashMap::new();
        curr.insert(TIME.to_string(), timespec.start);
        Ok(Sim {
            id,
            instance: instance.to_string(),
            defaults: model.defaults.clone(),
            results: Results::new(instance, model.recorded_vars()),
            model,
            coordinator,
            save_every: timespec.save_every(),
            timespec,
            curr,
            next: HashMap::new(),
            step: 0,
            state: SimState::Uninitialized,
        })
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn timespec(&self) -> &Timespec {
        &self.timespec
    }

    pub fn state(&self) -> SimState {
        self.state
    }

    pub fn time(&self) -> f64 {
        self.curr.get(TIME).copied().unwrap_or(self.timespec.start)
    }

    fn unknown<T>(&self, name: &str) -> Result<T> {
        sim_err!(
            UnknownVariable,
            format!("{}: unknown variable '{}'", self.instance, name)
        )
    }

    fn eval(&self, expr: &Expr) -> Result<f64> {
        let value = match expr {
            Expr::Const(n) => *n,
            Expr::Var(id) => match self.curr.get(id) {
                Some(value) => *value,
                None => return self.unknown(id),
            },
            Expr::Default(id) => match self.coordinator.get(self.id, &self.defaults, id)? {
                Some(value) => value,
                None => return self.unknown(id),
            },
            Expr::Dt => self.timespec.dt,
            Expr::Op1(op, x) => {
                let x = self.eval(x)?;
                match op {
                    UnaryOp::Negative => -x,
                }
            }
            Expr::Op2(op, l, r) => {
                let l = self.eval(l)?;
                let r = self.eval(r)?;
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    BinaryOp::Exp => l.powf(r),
                }
            }
            Expr::Lookup(table, index) => {
                let index = self.eval(index)?;
                match self.model.tables().get(table) {
                    Some(table) => lookup(table, index),
                    None => return self.unknown(table),
                }
            }
            Expr::App(builtin) => {
                let args = builtin
                    .args()
                    .into_iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<f64>>>()?;
                match BuiltinFn::new(builtin.name(), args) {
                    Some(builtin) => apply_builtin(&builtin),
                    None => return self.unknown(builtin.name()),
                }
            }
        };
        Ok(value)
    }

    /// apply evaluates each rule against the current state, storing
    /// results in the current state as it goes.
    fn apply(&mut self, rules: &[Rule]) -> Result<()> {
        for rule in rules.iter() {
            let value = self.eval(&rule.expr)?;
            self.curr.insert(rule.ident.clone(), value);
        }
        Ok(())
    }

    fn save(&mut self) {
        let curr = &self.curr;
        let time = curr.get(TIME).copied().unwrap_or(f64::NAN);
        self.results
            .push(time, |name| curr.get(name).copied().unwrap_or(f64::NAN));
    }

    fn initialize(&mut self) -> Result<()> {
        let model = self.model.clone();
        self.apply(&model.equations.initials)?;
        self.apply(&model.equations.flows)?;
        self.save();
        self.state = SimState::InitialComputed;
        Ok(())
    }

    /// advance integrates stocks one step with Euler's method and
    /// computes the new step's flows.
    fn advance(&mut self) -> Result<()> {
        let model = self.model.clone();
        for rule in model.equations.stocks.iter() {
            let value = self.eval(&rule.expr)?;
            self.next.insert(rule.ident.clone(), value);
        }
        let time = self.time() + self.timespec.dt;
        self.next.insert(TIME.to_string(), time);

        mem::swap(&mut self.curr, &mut self.next);
        self.next.clear();
        self.step += 1;

        self.apply(&model.equations.flows)?;
        if self.step % self.save_every == 0 {
            self.save();
        }
        self.state = SimState::Stepping;
        Ok(())
    }

    /// run_to steps the simulation forward until the next step would
    /// pass `until` or the end time.  End times are nudged by half a
    /// step to absorb accumulated floating point error.
    pub fn run_to(&mut self, until: f64) -> Result<()> {
        if self.state == SimState::Complete {
            return Ok(());
        }
        if self.state == SimState::Uninitialized {
            self.initialize()?;
        }

        let half_step = self.timespec.dt / 2.0;
        let end = self.timespec.end + half_step;
        let until = until + half_step;
        loop {
            let next_time = self.time() + self.timespec.dt;
            if next_time > end {
                self.state = SimState::Complete;
                return Ok(());
            }
            if next_time > until {
                return Ok(());
            }
            self.advance()?;
        }
    }

    pub fn run_to_end(&mut self) -> Result<()> {
        self.run_to(self.timespec.end)
    }

    /// value returns a variable's value in the current state.
    pub fn value(&self, name: &str) -> Result<f64> {
        match self.curr.get(name) {
            Some(value) => Ok(*value),
            None => self.unknown(name),
        }
    }

    /// value_series returns the saved times along with the saved
    /// values of `name`.
    pub fn value_series(&self, name: &str) -> Result<(Vec<f64>, Vec<f64>)> {
        if name == TIME {
            return Ok((self.results.times.clone(), self.results.times.clone()));
        }
        match self.results.series(name) {
            Some(values) => Ok((self.results.times.clone(), values)),
            None => self.unknown(name),
        }
    }

    /// set_value overrides a constant variable for this instance.  The
    /// override is served by the coordinator from the next evaluation
    /// on.
    pub fn set_value(&mut self, name: &str, value: f64) -> Result<()> {
        if self.model.get_var(name).is_none() {
            return self.unknown(name);
        }
        if !self.model.is_overridable(name) {
            return sim_err!(
                NotOverridable,
                format!(
                    "{}: '{}' is computed by an equation and can't be overridden",
                    self.instance, name
                )
            );
        }
        self.coordinator.set(self.id, name, value)?;
        if self.state != SimState::Uninitialized {
            self.curr.insert(name.to_string(), value);
        }
        Ok(())
    }

    pub fn results(&self) -> &Results {
        &self.results
    }
}

impl Drop for Sim {
    fn drop(&mut self) {
        self.coordinator.forget(self.id);
    }
}
