// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use serde::Serialize;

#[derive(PartialEq, Clone, Debug, Serialize)]
#[serde(tag = "fn", content = "args", rename_all = "snake_case")]
pub enum BuiltinFn<Expr> {
    Abs(Box<Expr>),
    Arctan(Box<Expr>),
    Cos(Box<Expr>),
    Exp(Box<Expr>),
    Ln(Box<Expr>),
    Log10(Box<Expr>),
    Max(Box<Expr>, Box<Expr>),
    Min(Box<Expr>, Box<Expr>),
    Pi,
    Sin(Box<Expr>),
    Sqrt(Box<Expr>),
    Tan(Box<Expr>),
}

impl<Expr> BuiltinFn<Expr> {
    /// new builds a builtin call from a function name and its
    /// arguments, returning None for an unknown name or the wrong
    /// number of arguments.
    pub fn new(name: &str, args: Vec<Expr>) -> Option<Self> {
        use BuiltinFn::*;
        if builtin_arity(name) != Some(args.len()) {
            return None;
        }
        let mut args = args.into_iter().map(Box::new);
        let mut arg = || args.next();
        let builtin = match name {
            "abs" => Abs(arg()?),
            "arctan" => Arctan(arg()?),
            "cos" => Cos(arg()?),
            "exp" => Exp(arg()?),
            "ln" => Ln(arg()?),
            "log10" => Log10(arg()?),
            "max" => Max(arg()?, arg()?),
            "min" => Min(arg()?, arg()?),
            "pi" => Pi,
            "sin" => Sin(arg()?),
            "sqrt" => Sqrt(arg()?),
            "tan" => Tan(arg()?),
            _ => return None,
        };
        Some(builtin)
    }

    pub fn name(&self) -> &'static str {
        use BuiltinFn::*;
        match self {
            Abs(_) => "abs",
            Arctan(_) => "arctan",
            Cos(_) => "cos",
            Exp(_) => "exp",
            Ln(_) => "ln",
            Log10(_) => "log10",
            Max(_, _) => "max",
            Min(_, _) => "min",
            Pi => "pi",
            Sin(_) => "sin",
            Sqrt(_) => "sqrt",
            Tan(_) => "tan",
        }
    }

    /// args returns the builtin's arguments in call order.
    pub fn args(&self) -> Vec<&Expr> {
        let mut args = Vec::with_capacity(2);
        walk_builtin_expr(self, |a| args.push(a));
        args
    }
}

pub fn builtin_arity(name: &str) -> Option<usize> {
    match name {
        "pi" => Some(0),
        "abs" | "arctan" | "cos" | "exp" | "ln" | "log10" | "sin" | "sqrt" | "tan" => Some(1),
        "max" | "min" => Some(2),
        _ => None,
    }
}

pub fn is_builtin_fn(name: &str) -> bool {
    builtin_arity(name).is_some()
}

pub(crate) fn walk_builtin_expr<'a, Expr, F>(builtin: &'a BuiltinFn<Expr>, mut cb: F)
where
    F: FnMut(&'a Expr),
{
    match builtin {
        BuiltinFn::Pi => {}
        BuiltinFn::Abs(a)
        | BuiltinFn::Arctan(a)
        | BuiltinFn::Cos(a)
        | BuiltinFn::Exp(a)
        | BuiltinFn::Ln(a)
        | BuiltinFn::Log10(a)
        | BuiltinFn::Sin(a)
        | BuiltinFn::Sqrt(a)
        | BuiltinFn::Tan(a) => cb(a),
        BuiltinFn::Max(a, b) | BuiltinFn::Min(a, b) => {
            cb(a);
            cb(b);
        }
    }
}

#[test]
fn test_builtin_new() {
    let max: BuiltinFn<f64> = BuiltinFn::new("max", vec![1.0, 2.0]).unwrap();
    assert_eq!(BuiltinFn::Max(Box::new(1.0), Box::new(2.0)), max);
    assert_eq!("max", max.name());
    assert_eq!(vec![&1.0, &2.0], max.args());

    assert_eq!(Some(BuiltinFn::<f64>::Pi), BuiltinFn::new("pi", vec![]));
    assert_eq!(None, BuiltinFn::<f64>::new("pi", vec![1.0]));
    assert_eq!(None, BuiltinFn::<f64>::new("sqrt", vec![]));
    assert_eq!(None, BuiltinFn::<f64>::new("cbrt", vec![8.0]));

    assert!(is_builtin_fn("arctan"));
    assert!(!is_builtin_fn("lookup"));
}
