// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::pretty::pretty;
use super::*;
use crate::common::{ErrorCode, ErrorKind};
use crate::parser::parse;
use crate::passes::analyze;
use proptest::prelude::*;

fn compile(src: &str) -> Result<Compiled> {
    let (file, count) = parse(src);
    assert_eq!(0, count, "{:?}", file.errors);
    let models = analyze(&file)?;
    synthesize(&models[0])
}

fn compile_ok(src: &str) -> Compiled {
    match compile(src) {
        Ok(compiled) => compiled,
        Err(err) => panic!("compile failed: {err}"),
    }
}

fn rules(rules: &[Rule]) -> Vec<(String, String)> {
    rules
        .iter()
        .map(|r| (r.ident.clone(), pretty(&r.expr)))
        .collect()
}

fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
    expected
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

#[test]
fn test_stock_flow_sign_conventions() {
    let compiled = compile_ok(
        "model m {
	a = stock {initial: 1, inflow: i, outflow: o}
	b = stock {initial: 2, inflow: i, outflow: o, biflow: bi}
	c = stock {outflow: o}
	d = stock {}
	i = 3
	o = 2
	bi = 1
}
",
    );
    assert_eq!(
        pairs(&[
            ("a", "a + (i - o) * dt"),
            ("b", "b + (bi + i - o) * dt"),
            ("c", "c + -o * dt"),
            ("d", "d + 0 * dt"),
        ]),
        rules(&compiled.equations.stocks)
    );
    // absent initial values start at zero
    let c = compiled
        .equations
        .initials
        .iter()
        .find(|r| r.ident == "c")
        .unwrap();
    assert_eq!(Expr::Const(0.0), c.expr);
}

#[test]
fn test_constant_and_dynamic_auxes() {
    let compiled = compile_ok(
        "model m {
	rate = 5 \"widgets/year\"
	k const = 2
	doubled = rate * k
	neg = -0.5
}
",
    );

    let mut defaults = BTreeMap::new();
    defaults.insert("neg".to_string(), -0.5);
    defaults.insert("rate".to_string(), 5.0);
    assert_eq!(defaults, compiled.defaults);

    assert_eq!(
        pairs(&[("rate", "5"), ("k", "2"), ("neg", "-0.5")]),
        rules(&compiled.equations.initials)
    );
    assert_eq!(
        pairs(&[
            ("rate", "default(rate)"),
            ("k", "2"),
            ("doubled", "rate * k"),
            ("neg", "default(neg)"),
        ]),
        rules(&compiled.equations.flows)
    );

    let rate = &compiled.vars[0];
    assert_eq!(VarKind::Aux, rate.kind);
    assert_eq!(Some(5.0), rate.default);
    assert_eq!(None, compiled.vars[2].default);
}

#[test]
fn test_initial_value_rule() {
    let compiled = compile_ok(
        "model m {
	s = stock {initial: start}
	t = stock {initial: s}
	u = stock {initial: 1.5e2}
	start = 10
}
",
    );
    // the initial runlist is ordered by dependency
    assert_eq!(
        pairs(&[("start", "10"), ("s", "start"), ("t", "s"), ("u", "150")]),
        rules(&compiled.equations.initials)
    );

    let cases = [
        // dynamic auxes have no initial value to copy
        "model m {\n\ts = stock {initial: r}\n\tr = time * 2\n}\n",
        // arithmetic is not a constant
        "model m {\n\ts = stock {initial: 1 + 2}\n}\n",
    ];
    for src in cases.iter() {
        let err = compile(src).unwrap_err();
        assert_eq!(ErrorKind::Model, err.kind);
        assert_eq!(ErrorCode::BadInitial, err.code, "for {src:?}");
    }
}

#[test]
fn test_tables() {
    let compiled = compile_ok(
        "model m {
	effect = [(0, 1), (10, 2)]
	use_effect = effect[time]
	inline = [(0, 0), (5, -1)][time / 2]
	scaled = inline * 3
}
",
    );
    assert_eq!(
        Table {
            x: vec![0.0, 10.0],
            y: vec![1.0, 2.0],
        },
        compiled.equations.tables["effect"]
    );
    assert_eq!(
        Table {
            x: vec![0.0, 5.0],
            y: vec![0.0, -1.0],
        },
        compiled.equations.tables["inline"]
    );
    assert_eq!(
        pairs(&[
            ("use_effect", "lookup(effect, time)"),
            ("inline", "lookup(inline, time / 2)"),
            ("scaled", "inline * 3"),
        ]),
        rules(&compiled.equations.flows)
    );
    assert_eq!(VarKind::Table, compiled.vars[0].kind);
    assert!(compiled.vars[0].table.is_some());
    assert!(compiled.equations.initials.is_empty());
}

#[test]
fn test_table_errors() {
    let cases = [
        ("model m {\n\tt = [(1, 0), (0, 1)]\n}\n", ErrorCode::BadTable),
        ("model m {\n\tt = []\n}\n", ErrorCode::BadTable),
        ("model m {\n\tt = [(x, 0)]\n\tx = 1\n}\n", ErrorCode::BadTable),
        // a pure table has no value of its own
        (
            "model m {\n\tt = [(0, 0)]\n\tx = t * 2\n}\n",
            ErrorCode::UnsupportedExpr,
        ),
        ("model m {\n\tx = 1\n\ty = x[time]\n}\n", ErrorCode::UnsupportedExpr),
    ];
    for (src, code) in cases.iter() {
        let err = compile(src).unwrap_err();
        assert_eq!(*code, err.code, "for {src:?}");
    }

    // equal adjacent x values are a step
    let compiled = compile_ok("model m {\n\tt = [(0, 0), (1, 0), (1, 5)]\n}\n");
    assert_eq!(vec![0.0, 1.0, 1.0], compiled.equations.tables["t"].x);
}

#[test]
fn test_stock_errors() {
    let cases = [
        "model m {\n\ts = stock {initial: 1, initial: 2}\n}\n",
        "model m {\n\ts = stock {inflow: 1, inflow: 2}\n}\n",
        "model m {\n\ts = stock {level: 1}\n}\n",
    ];
    for src in cases.iter() {
        let err = compile(src).unwrap_err();
        assert_eq!(ErrorCode::BadStock, err.code, "for {src:?}");
        assert!(err.get_details().unwrap().starts_with("m.s: "));
    }
}

#[test]
fn test_builtins() {
    let compiled = compile_ok(
        "model m {\n\tx = max(0, sin(time * pi()))\n\ty = abs(-x)\n}\n",
    );
    assert_eq!(
        pairs(&[("x", "max(0, sin(time * pi))"), ("y", "abs(-x)")]),
        rules(&compiled.equations.flows)
    );

    let err = compile("model m {\n\tx = cbrt(8)\n}\n").unwrap_err();
    assert_eq!(ErrorCode::UnknownBuiltin, err.code);
    let err = compile("model m {\n\tx = max(1)\n}\n").unwrap_err();
    assert_eq!(ErrorCode::BadBuiltinArgs, err.code);
    let err = compile("model m {\n\tx = \"hello\"\n}\n").unwrap_err();
    assert_eq!(ErrorCode::UnsupportedExpr, err.code);
}

#[test]
fn test_flow_ordering() {
    let compiled = compile_ok(
        "model m {
	s = stock {initial: 1, inflow: growth}
	growth = s * fraction
	fraction = base / 10
	base = time + 1
}
",
    );
    let order: Vec<&str> = compiled
        .equations
        .flows
        .iter()
        .map(|r| r.ident.as_str())
        .collect();
    assert_eq!(vec!["base", "fraction", "growth"], order);

    let err = compile("model m {\n\ta = b + 1\n\tb = a * 2\n}\n").unwrap_err();
    assert_eq!(ErrorCode::CircularDependency, err.code);
    let err = compile("model m {\n\ta = a + 1\n}\n").unwrap_err();
    assert_eq!(ErrorCode::CircularDependency, err.code);
}

#[test]
fn test_abstract_vars() {
    let compiled = compile_ok("model m {\n\tinput\n\tout = input * 2\n}\n");
    assert_eq!(
        pairs(&[("input", "default(input)")]),
        rules(&compiled.equations.initials)
    );
    assert_eq!(
        pairs(&[("input", "default(input)"), ("out", "input * 2")]),
        rules(&compiled.equations.flows)
    );
    assert!(compiled.equations.flows[0].expr.reads_default("input"));
    assert!(!compiled.equations.flows[1].expr.reads_default("input"));
}

#[test]
fn test_deterministic() {
    let src = "model m {
	timespec = {start: 0, end: 10, dt: 0.5}
	a = stock {initial: 100, inflow: r1, outflow: r2}
	b = stock {initial: a, inflow: r2}
	r1 = a * 0.1
	r2 = b * 0.05 + r1
	t = [(0, 0), (100, 1)][a]
}
";
    assert_eq!(compile_ok(src), compile_ok(src));
}

#[test]
fn test_serialize() {
    let compiled = compile_ok("model m {\n\ts = stock {inflow: r}\n\tr = 5\n}\n");
    let json = serde_json::to_value(&compiled.equations).unwrap();
    assert_eq!(
        serde_json::json!({"ident": "r", "expr": {"default": "r"}}),
        json["flows"][0]
    );
    assert_eq!(serde_json::json!({"const": 0.0}), json["initials"][0]["expr"]);
}

fn initial_const(compiled: &Compiled, name: &str) -> Option<f64> {
    let rule = compiled.equations.initials.iter().find(|r| r.ident == name)?;
    match rule.expr {
        Expr::Const(n) => Some(n),
        _ => None,
    }
}

proptest! {
    #[test]
    fn constant_literals_compile_exactly(bits in 0u64..0x7ff0_0000_0000_0000) {
        let value = f64::from_bits(bits);
        let lit = format!("{value:?}");
        let compiled = compile_ok(&format!(
            "model m {{\n\tx = {lit}\n\ts = stock {{initial: {lit}}}\n}}\n"
        ));
        for name in ["x", "s"] {
            let n = initial_const(&compiled, name);
            prop_assert_eq!(Some(bits), n.map(f64::to_bits), "{} for {}", lit, name);
        }
        prop_assert_eq!(Some(bits), compiled.defaults.get("x").map(|n| n.to_bits()));
    }
}
