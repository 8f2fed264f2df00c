// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;
use std::io::{self, Write};

use crate::common::Ident;

/// Results are the saved states of one simulation instance: one row
/// per saved time point, one column per recorded variable.
#[derive(Clone, PartialEq, Debug)]
pub struct Results {
    pub instance: Ident,
    /// recorded variable names in column order
    pub names: Vec<Ident>,
    pub offsets: HashMap<Ident, usize>,
    pub times: Vec<f64>,
    // one large allocation, row-major
    pub data: Vec<f64>,
    pub step_size: usize,
}

impl Results {
    pub fn new(instance: &str, names: Vec<Ident>) -> Self {
        let offsets = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Results {
            instance: instance.to_string(),
            step_size: names.len(),
            names,
            offsets,
            times: vec![],
            data: vec![],
        }
    }

    /// push saves one row.  `value` is called once per recorded
    /// variable, in column order.
    pub fn push<F>(&mut self, time: f64, mut value: F)
    where
        F: FnMut(&str) -> f64,
    {
        self.times.push(time);
        for name in self.names.iter() {
            self.data.push(value(name));
        }
    }

    pub fn step_count(&self) -> usize {
        self.times.len()
    }

    /// series returns every saved value of one variable.
    pub fn series(&self, name: &str) -> Option<Vec<f64>> {
        let off = *self.offsets.get(name)?;
        Some(self.iter().map(|(_, row)| row[off]).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &[f64])> {
        self.times
            .iter()
            .copied()
            .zip(self.data.chunks(self.step_size.max(1)).chain(std::iter::repeat(&[][..])))
    }

    fn qualified(&self, name: &str) -> String {
        format!("{}.{}", self.instance, name)
    }

    /// write_tsv writes a header of `time` followed by the qualified
    /// variable names in sorted order, then one row per saved time.
    pub fn write_tsv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let mut columns: Vec<(String, usize)> = self
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| (self.qualified(name), i))
            .collect();
        columns.sort();

        write!(out, "time")?;
        for (name, _) in columns.iter() {
            write!(out, "\t{name}")?;
        }
        writeln!(out)?;

        for (time, row) in self.iter() {
            write!(out, "{time:.6}")?;
            for (_, off) in columns.iter() {
                write!(out, "\t{:.6}", row[*off])?;
            }
            writeln!(out)?;
        }
        Ok(())
    }

    pub fn to_tsv(&self) -> String {
        let mut out = Vec::new();
        // writing to a Vec can't fail
        let _ = self.write_tsv(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_and_tsv() {
        let mut results = Results::new("main", vec!["stock".to_string(), "rate".to_string()]);
        for step in 0..3 {
            let t = step as f64;
            results.push(t, |name| match name {
                "stock" => 100.0 + 5.0 * t,
                _ => 5.0,
            });
        }

        assert_eq!(3, results.step_count());
        assert_eq!(Some(vec![100.0, 105.0, 110.0]), results.series("stock"));
        assert_eq!(Some(vec![5.0, 5.0, 5.0]), results.series("rate"));
        assert_eq!(None, results.series("time"));

        let expected = "time\tmain.rate\tmain.stock
0.000000\t5.000000\t100.000000
1.000000\t5.000000\t105.000000
2.000000\t5.000000\t110.000000
";
        assert_eq!(expected, results.to_tsv());
    }

    #[test]
    fn test_no_variables() {
        let mut results = Results::new("empty", vec![]);
        results.push(0.0, |_| unreachable!());
        results.push(0.5, |_| unreachable!());
        assert_eq!("time\n0.000000\n0.500000\n", results.to_tsv());
    }
}
