// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fmt::Write;

use super::{EquationSet, Expr, Rule};
use crate::ast::{BinaryOp, UnaryOp};
use crate::builtins::BuiltinFn;

fn child_needs_parens(parent: &Expr, child: &Expr, is_right: bool) -> bool {
    match parent {
        // no children so doesn't matter
        Expr::Const(_) | Expr::Var(_) | Expr::Default(_) | Expr::Dt => false,
        // children are comma separated, so no ambiguity possible
        Expr::App(_) | Expr::Lookup(_, _) => false,
        Expr::Op1(_, _) => matches!(child, Expr::Op2(_, _, _)),
        Expr::Op2(parent_op, _, _) => match child {
            Expr::Const(_)
            | Expr::Var(_)
            | Expr::Default(_)
            | Expr::Dt
            | Expr::App(_)
            | Expr::Lookup(_, _)
            | Expr::Op1(_, _) => false,
            Expr::Op2(child_op, _, _) => {
                // if we have `3 * (2 + 3)`, the parent's precedence
                // is higher than the child and we need enclosing parens
                let (parent, child) = (parent_op.precedence(), child_op.precedence());
                // `^` groups to the right, everything else to the left
                let grouped_side = *parent_op == BinaryOp::Exp;
                parent > child || (parent == child && is_right != grouped_side)
            }
        },
    }
}

fn paren_if_necessary(parent: &Expr, child: &Expr, is_right: bool, eqn: String) -> String {
    if child_needs_parens(parent, child, is_right) {
        format!("({eqn})")
    } else {
        eqn
    }
}

/// pretty renders a compiled expression as an equation.
pub fn pretty(expr: &Expr) -> String {
    match expr {
        Expr::Const(n) => format!("{n}"),
        Expr::Var(id) => id.clone(),
        Expr::Default(id) => format!("default({id})"),
        Expr::Dt => "dt".to_string(),
        Expr::Lookup(table, idx) => format!("lookup({}, {})", table, pretty(idx)),
        Expr::App(builtin) => {
            let args: Vec<String> = builtin.args().into_iter().map(pretty).collect();
            match builtin {
                BuiltinFn::Pi => "pi".to_string(),
                _ => format!("{}({})", builtin.name(), args.join(", ")),
            }
        }
        Expr::Op1(op, l) => {
            let l = paren_if_necessary(expr, l, false, pretty(l));
            let op: &str = match op {
                UnaryOp::Negative => "-",
            };
            format!("{op}{l}")
        }
        Expr::Op2(op, l, r) => {
            let l = paren_if_necessary(expr, l, false, pretty(l));
            let r = paren_if_necessary(expr, r, true, pretty(r));
            format!("{} {} {}", l, op.symbol(), r)
        }
    }
}

fn pretty_rules(out: &mut String, title: &str, rules: &[Rule]) {
    let _ = writeln!(out, "{title}:");
    for rule in rules.iter() {
        let _ = writeln!(out, "\t{} = {}", rule.ident, pretty(&rule.expr));
    }
}

/// pretty_equations renders an equation set in evaluation order, one
/// rule per line.
pub fn pretty_equations(equations: &EquationSet) -> String {
    let mut out = String::new();
    pretty_rules(&mut out, "initials", &equations.initials);
    pretty_rules(&mut out, "flows", &equations.flows);
    pretty_rules(&mut out, "stocks", &equations.stocks);
    let _ = writeln!(out, "tables:");
    for (name, table) in equations.tables.iter() {
        let points: Vec<String> = table
            .x
            .iter()
            .zip(table.y.iter())
            .map(|(x, y)| format!("({x}, {y})"))
            .collect();
        let _ = writeln!(out, "\t{} = [{}]", name, points.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(id: &str) -> Box<Expr> {
        Box::new(Expr::Var(id.to_string()))
    }

    fn op2(op: BinaryOp, l: Box<Expr>, r: Box<Expr>) -> Box<Expr> {
        Box::new(Expr::Op2(op, l, r))
    }

    #[test]
    fn test_pretty() {
        // accum + (inflow - outflow) * dt
        let stock = op2(
            BinaryOp::Add,
            var("accum"),
            op2(
                BinaryOp::Mul,
                op2(BinaryOp::Sub, var("inflow"), var("outflow")),
                Box::new(Expr::Dt),
            ),
        );
        assert_eq!("accum + (inflow - outflow) * dt", pretty(&stock));

        // right-nested subtraction of equal precedence keeps its parens
        let nested = op2(
            BinaryOp::Sub,
            var("a"),
            op2(BinaryOp::Sub, var("b"), var("c")),
        );
        assert_eq!("a - (b - c)", pretty(&nested));
        let chained = op2(
            BinaryOp::Sub,
            op2(BinaryOp::Add, var("a"), var("b")),
            var("c"),
        );
        assert_eq!("a + b - c", pretty(&chained));
        let power = op2(
            BinaryOp::Exp,
            op2(BinaryOp::Exp, var("a"), var("b")),
            var("c"),
        );
        assert_eq!("(a ^ b) ^ c", pretty(&power));

        let neg = Expr::Op1(UnaryOp::Negative, op2(BinaryOp::Add, var("a"), var("b")));
        assert_eq!("-(a + b)", pretty(&neg));

        let call = Expr::App(BuiltinFn::Max(var("a"), Box::new(Expr::Const(0.5))));
        assert_eq!("max(a, 0.5)", pretty(&call));
        assert_eq!("pi", pretty(&Expr::App(BuiltinFn::Pi)));

        let lookup = Expr::Lookup("effect".to_string(), var("time"));
        assert_eq!("lookup(effect, time)", pretty(&lookup));
        assert_eq!("default(rate)", pretty(&Expr::Default("rate".to_string())));
    }
}
