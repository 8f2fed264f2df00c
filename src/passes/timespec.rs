// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use serde::Serialize;

use super::{ModelDef, TIMESPEC};
use crate::ast::{Expr, Stmt};
use crate::common::Result;
use crate::{eprintln, model_err};

/// Timespec describes the simulated time span: the run covers
/// `[start, end]` in steps of `dt`, recording every `save_step`.
#[derive(Clone, Copy, PartialEq, Debug, Serialize)]
pub struct Timespec {
    pub start: f64,
    pub end: f64,
    pub dt: f64,
    pub save_step: f64,
}

impl Timespec {
    pub fn new(start: f64, end: f64, dt: f64, save_step: f64) -> Result<Self> {
        let spec = Timespec {
            start,
            end,
            dt,
            save_step,
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("start", self.start),
            ("end", self.end),
            ("dt", self.dt),
            ("save_step", self.save_step),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return model_err!(BadTimespec, format!("{name} must be finite, not {value}"));
            }
        }
        if !(self.dt > 0.0) {
            return model_err!(BadTimespec, format!("dt must be positive, not {}", self.dt));
        }
        if !(self.save_step > 0.0) {
            return model_err!(
                BadTimespec,
                format!("save_step must be positive, not {}", self.save_step)
            );
        }
        if !(self.end >= self.start) {
            return model_err!(
                BadTimespec,
                format!("end ({}) is before start ({})", self.end, self.start)
            );
        }
        // time must still move forward once added to the largest time
        let furthest = self.start.abs().max(self.end.abs());
        if furthest + self.dt == furthest {
            return model_err!(
                BadTimespec,
                format!("dt {} is too small to advance time past {}", self.dt, furthest)
            );
        }
        Ok(())
    }

    /// save_every is the number of dt steps between saved points,
    /// rounding save_step to the nearest multiple of dt and never
    /// less than one step.
    pub fn save_every(&self) -> usize {
        let steps = (self.save_step / self.dt).round();
        if steps < 1.0 { 1 } else { steps as usize }
    }

    fn is_save_aligned(&self) -> bool {
        let ratio = self.save_step / self.dt;
        (ratio - ratio.round()).abs() < 1e-9
    }
}

fn const_value(key: &str, value: &Expr) -> Result<f64> {
    match value.const_eval() {
        Some(n) => Ok(n),
        None => model_err!(
            BadTimespec,
            format!("timespec {key} must be a numeric constant, not '{value}'")
        ),
    }
}

/// extract reads the model's reserved `timespec` assignment, a
/// composite literal with the keys `start`, `end`, `dt` and the
/// optional `save_step` (which defaults to `dt`).  A model without
/// one yields `None`.
pub fn extract(def: &ModelDef) -> Result<Option<Timespec>> {
    let rhs = match def.get_stmt(TIMESPEC) {
        None => return Ok(None),
        Some(Stmt::Decl(_)) => {
            return model_err!(
                BadTimespec,
                format!("{}: timespec is declared but never assigned", def.name)
            );
        }
        Some(Stmt::Assign(_, rhs)) => rhs,
    };

    let elts = match rhs.strip_units() {
        Expr::Composite(None, elts, _) => elts,
        other => {
            return model_err!(
                BadTimespec,
                format!("{}: timespec must be a composite literal, not '{}'", def.name, other)
            );
        }
    };

    let (mut start, mut end, mut dt, mut save_step) = (None, None, None, None);
    for elt in elts.iter() {
        let (key, value) = match elt {
            Expr::KeyValue(key, value, _) => (key.as_str(), value),
            other => {
                return model_err!(BadTimespec, format!("unexpected timespec element '{other}'"));
            }
        };
        let slot = match key {
            "start" => &mut start,
            "end" => &mut end,
            "dt" => &mut dt,
            "save_step" => &mut save_step,
            _ => {
                return model_err!(BadTimespec, format!("timespec has unknown key '{key}'"));
            }
        };
        if slot.is_some() {
            return model_err!(BadTimespec, format!("timespec key '{key}' given twice"));
        }
        *slot = Some(const_value(key, value)?);
    }

    let required = |name: &str, value: Option<f64>| -> Result<f64> {
        match value {
            Some(n) => Ok(n),
            None => model_err!(BadTimespec, format!("timespec is missing '{name}'")),
        }
    };
    let start = required("start", start)?;
    let end = required("end", end)?;
    let dt = required("dt", dt)?;
    let spec = Timespec::new(start, end, dt, save_step.unwrap_or(dt))?;

    if !spec.is_save_aligned() {
        eprintln!(
            "warning: {}: save_step {} is not a multiple of dt {}, saving every {} steps",
            def.name,
            spec.save_step,
            spec.dt,
            spec.save_every()
        );
    }

    Ok(Some(spec))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::passes::flatten;
    use crate::parser::parse;

    fn timespec(body: &str) -> Result<Option<Timespec>> {
        let (file, count) = parse(&format!("model m {{\n{body}\n}}\n"));
        assert_eq!(0, count, "{:?}", file.errors);
        let defs = flatten(&file)?;
        extract(&defs[0])
    }

    #[test]
    fn test_extract() {
        let spec = timespec("\ttimespec = {start: 0, end: 10, dt: 0.25, save_step: 1}")
            .unwrap()
            .unwrap();
        assert_eq!(Timespec::new(0.0, 10.0, 0.25, 1.0).unwrap(), spec);
        assert_eq!(4, spec.save_every());

        // units annotations are stripped and save_step defaults to dt
        let spec = timespec(
            "\ttimespec = {\n\t\tstart: 1 \"year\"\n\t\tend: 5 \"year\"\n\t\tdt: 0.5 \"year\"\n\t}",
        )
        .unwrap()
        .unwrap();
        assert_eq!(0.5, spec.save_step);
        assert_eq!(1, spec.save_every());

        assert_eq!(None, timespec("\tx = 1").unwrap());
    }

    #[test]
    fn test_validate_non_finite() {
        for (start, end, dt, save_step) in [
            (0.0, f64::INFINITY, 1.0, 1.0),
            (f64::NEG_INFINITY, 0.0, 1.0, 1.0),
            (0.0, f64::NAN, 1.0, 1.0),
            (0.0, 1.0, f64::INFINITY, 1.0),
            (0.0, 1.0, 1.0, f64::NAN),
            (1e20, 1e20 + 1e6, 1.0, 1.0),
        ] {
            let err = Timespec::new(start, end, dt, save_step).unwrap_err();
            assert_eq!(ErrorCode::BadTimespec, err.code, "for {start} {end} {dt} {save_step}");
        }
        assert!(Timespec::new(1e6, 2e6, 1e-3, 1.0).is_ok());
    }

    #[test]
    fn test_save_every_minimum() {
        let spec = Timespec::new(0.0, 1.0, 1.0, 0.25).unwrap();
        assert_eq!(1, spec.save_every());
        let spec = Timespec::new(0.0, 1.0, 0.1, 0.3).unwrap();
        assert_eq!(3, spec.save_every());
    }

    #[test]
    fn test_extract_errors() {
        let cases = [
            "\ttimespec = {start: 0, end: 10, dt: 1, stop: 3}",
            "\ttimespec = {start: 0, end: 10, dt: x}",
            "\ttimespec = {start: 0, end: 10, dt: 1 + 1}",
            "\ttimespec = {start: 0, end: 10}",
            "\ttimespec = {start: 0, end: 10, dt: 0}",
            "\ttimespec = {start: 0, end: 10, dt: 1, save_step: -1}",
            "\ttimespec = {start: 10, end: 0, dt: 1}",
            "\ttimespec = {start: 0, start: 1, end: 10, dt: 1}",
            "\ttimespec = {start: 0, end: 1e400, dt: 1}",
            "\ttimespec = {start: -1e400, end: 0, dt: 1}",
            "\ttimespec = {start: 0, end: 1e300, dt: 1}",
            "\ttimespec = 3",
            "\ttimespec",
        ];
        for case in cases.iter() {
            let err = timespec(case).unwrap_err();
            assert_eq!(ErrorCode::BadTimespec, err.code, "for {case:?}");
        }
    }
}
