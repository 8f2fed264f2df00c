// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use super::ModelDef;
use crate::ast::{Expr, ObjKind, Scope, Stmt, VarDecl, VarKind};
use crate::common::{Ident, Result};
use crate::model_err;

/// is_table_expr is true for a table literal, or an index expression
/// driving a table literal.
pub fn is_table_expr(expr: &Expr) -> bool {
    match expr.strip_units() {
        Expr::Table(_, _) => true,
        Expr::Index(x, _, _) => matches!(x.strip_units(), Expr::Table(_, _)),
        _ => false,
    }
}

/// is_stock_body is true for the composite literals that define stocks:
/// untyped, or explicitly typed `stock`.
pub fn is_stock_body(expr: &Expr) -> bool {
    match expr.strip_units() {
        Expr::Composite(None, _, _) => true,
        Expr::Composite(Some(ty), _, _) => ty == "stock",
        _ => false,
    }
}

/// infer determines a variable's kind from the shape of its
/// initializer.
fn infer(model: &str, decl: &VarDecl, rhs: Option<&Expr>) -> Result<VarKind> {
    let rhs = match rhs {
        // pending assignment in a specialization, or abstract
        None => return Ok(VarKind::Aux),
        Some(rhs) => rhs.strip_units(),
    };

    if is_table_expr(rhs) {
        return Ok(VarKind::Table);
    }
    match rhs {
        Expr::Composite(Some(ty), _, _) if ty != "stock" => model_err!(
            UnsupportedExpr,
            format!("{}.{}: unknown composite type '{}'", model, decl.name, ty)
        ),
        Expr::Composite(_, _, _) => Ok(VarKind::Stock),
        _ => Ok(VarKind::Aux),
    }
}

/// check verifies an explicit kind annotation against the shape of the
/// initializer.  The annotation is authoritative: this only ever
/// rejects, never changes the kind.
fn check(model: &str, decl: &VarDecl, kind: VarKind, rhs: Option<&Expr>) -> Result<()> {
    let mismatch = |what: &str| {
        model_err!(
            KindMismatch,
            format!("{}.{}: declared {} but {}", model, decl.name, kind, what)
        )
    };

    let rhs = match rhs {
        Some(rhs) => rhs,
        None if kind == VarKind::Table => {
            return mismatch("tables must be defined by a table literal");
        }
        None => return Ok(()),
    };

    match kind {
        VarKind::Stock if !is_stock_body(rhs) => mismatch("not defined by a stock body"),
        VarKind::Table if !is_table_expr(rhs) => mismatch("not defined by a table literal"),
        VarKind::Const if !rhs.is_const() => mismatch("not defined by a numeric constant"),
        VarKind::Aux | VarKind::Flow | VarKind::Const if is_table_expr(rhs) => {
            mismatch("defined by a table literal")
        }
        VarKind::Aux | VarKind::Flow | VarKind::Const if is_stock_body(rhs) => {
            mismatch("defined by a stock body")
        }
        _ => Ok(()),
    }
}

/// resolve fixes the kind of every variable in the model, either from
/// its explicit annotation or by inference, and records it in the
/// model's scope.
pub fn resolve(def: &ModelDef, scope: &mut Scope) -> Result<HashMap<Ident, VarKind>> {
    let mut kinds = HashMap::new();

    for stmt in def.variables() {
        let decl = stmt.decl();
        let rhs = match stmt {
            Stmt::Decl(_) => None,
            Stmt::Assign(_, rhs) => Some(rhs),
        };

        let kind = match &decl.kind {
            Some((name, loc)) => {
                let kind = match VarKind::from_name(name) {
                    Some(kind) => kind,
                    None => {
                        return model_err!(
                            UnknownKind,
                            format!("{}.{}: unknown kind '{}' at {}", def.name, decl.name, name, loc)
                        );
                    }
                };
                check(&def.name, decl, kind, rhs)?;
                kind
            }
            None => infer(&def.name, decl, rhs)?,
        };

        if let Some(obj) = scope.lookup_mut(&decl.name) {
            obj.kind = ObjKind::Var(kind);
        }
        kinds.insert(decl.name.clone(), kind);
    }

    Ok(kinds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::passes::{flatten, scope_chain};
    use crate::parser::parse;

    fn kinds(src: &str) -> Result<HashMap<Ident, VarKind>> {
        let (file, count) = parse(src);
        assert_eq!(0, count, "{:?}", file.errors);
        let def = &flatten(&file)?[0];
        let mut resolved = scope_chain::resolve(def)?;
        let kinds = resolve(def, &mut resolved.scope)?;
        for (name, kind) in kinds.iter() {
            assert_eq!(
                ObjKind::Var(*kind),
                resolved.scope.lookup(name).unwrap().kind
            );
        }
        Ok(kinds)
    }

    #[test]
    fn test_inference() {
        let kinds = kinds(
            "model m {
	s = stock {initial: 1}
	t = stock {initial: 2}
	tbl = [(0, 0), (1, 1)]
	lookup = [(0, 0), (1, 1)][time] \"widgets\"
	use_tbl = tbl[time]
	a = 3 \"widgets\"
	b = a * 2
	c
}
",
        )
        .unwrap();
        assert_eq!(VarKind::Stock, kinds["s"]);
        assert_eq!(VarKind::Stock, kinds["t"]);
        assert_eq!(VarKind::Table, kinds["tbl"]);
        assert_eq!(VarKind::Table, kinds["lookup"]);
        // indexing a table variable is a lookup, not a table definition
        assert_eq!(VarKind::Aux, kinds["use_tbl"]);
        assert_eq!(VarKind::Aux, kinds["a"]);
        assert_eq!(VarKind::Aux, kinds["b"]);
        assert_eq!(VarKind::Aux, kinds["c"]);
    }

    #[test]
    fn test_explicit_kinds() {
        let kinds = kinds(
            "model m {
	s stock = {initial: 1}
	f flow = s * 0.1
	g `flow` = 4
	k const = 3
	t `table` = [(0, 0)]
	d aux
}
",
        )
        .unwrap();
        assert_eq!(VarKind::Stock, kinds["s"]);
        assert_eq!(VarKind::Flow, kinds["f"]);
        assert_eq!(VarKind::Flow, kinds["g"]);
        assert_eq!(VarKind::Const, kinds["k"]);
        assert_eq!(VarKind::Table, kinds["t"]);
        assert_eq!(VarKind::Aux, kinds["d"]);
    }

    #[test]
    fn test_kind_errors() {
        let cases = [
            ("model m {\n\ts stock = 3\n}\n", ErrorCode::KindMismatch),
            ("model m {\n\tt table = 3\n}\n", ErrorCode::KindMismatch),
            ("model m {\n\tt table\n}\n", ErrorCode::KindMismatch),
            ("model m {\n\tk const = k2 * 2\n\tk2 = 1\n}\n", ErrorCode::KindMismatch),
            ("model m {\n\ta aux = [(0, 0)]\n}\n", ErrorCode::KindMismatch),
            ("model m {\n\tf flow = {initial: 1}\n}\n", ErrorCode::KindMismatch),
            ("model m {\n\tx widget = 1\n}\n", ErrorCode::UnknownKind),
            ("model m {\n\tx = thing {a: 1}\n}\n", ErrorCode::UnsupportedExpr),
        ];
        for (src, code) in cases.iter() {
            let err = kinds(src).unwrap_err();
            assert_eq!(*code, err.code, "for {src:?}");
        }
    }
}
