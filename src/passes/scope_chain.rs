// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use super::ModelDef;
use crate::ast::{walk, Expr, Node, ObjKind, Object, Scope, Stmt, VarKind, Visit};
use crate::common::{Error, ErrorCode, ErrorKind, Result};
use crate::model_err;

/// implicit variables are in scope in every model without being
/// declared: the current simulation time and the step size.
pub const IMPLICIT_VARS: &[&str] = &["time", "dt"];

pub fn is_implicit(name: &str) -> bool {
    IMPLICIT_VARS.contains(&name)
}

/// Resolved is the outcome of scope-chain resolution for one model.
#[derive(Clone, PartialEq, Debug)]
pub struct Resolved {
    pub scope: Scope,
    pub is_abstract: bool,
}

/// ScopeChain walks a model's statements checking that every variable
/// reference resolves in the model's scope.
struct ScopeChain<'a> {
    model: &'a str,
    scope: &'a Scope,
    // the variable whose definition is being walked
    curr_var: Option<&'a str>,
    depth: usize,
}

impl<'a> ScopeChain<'a> {
    fn visit(&mut self, visit: Visit<'a>) -> Result<bool> {
        let node = match visit {
            Visit::Leave => {
                self.depth -= 1;
                if self.depth == 0 {
                    self.curr_var = None;
                }
                return Ok(true);
            }
            Visit::Enter(node) => node,
        };

        match node {
            Node::Stmt(stmt) => self.curr_var = Some(stmt.name()),
            Node::Expr(Expr::Var(name, loc)) => {
                if self.scope.lookup(name).is_none() && !is_implicit(name) {
                    return Err(Error::new(
                        ErrorKind::Model,
                        ErrorCode::UnknownVariable,
                        Some(format!(
                            "{}.{}: unknown variable '{}' referenced at {}",
                            self.model,
                            self.curr_var.unwrap_or("?"),
                            name,
                            loc
                        )),
                    ));
                }
            }
            _ => {}
        }

        self.depth += 1;
        Ok(true)
    }
}

/// resolve builds the model's variable scope and verifies every
/// reference against it.  A bare declaration (a variable with no
/// assigned equation) makes the model abstract.
pub fn resolve(def: &ModelDef) -> Result<Resolved> {
    let mut scope = Scope::new();
    let mut is_abstract = false;

    for stmt in def.variables() {
        let decl = stmt.decl();
        if is_implicit(&decl.name) {
            return model_err!(
                DuplicateVariable,
                format!("{}: '{}' is a reserved name", def.name, decl.name)
            );
        }
        let obj = Object {
            name: decl.name.clone(),
            kind: ObjKind::Var(VarKind::Unknown),
            loc: decl.loc,
        };
        if let Some(prev) = scope.insert(obj) {
            return model_err!(
                DuplicateVariable,
                format!(
                    "{}: '{}' declared at {} and again at {}",
                    def.name, decl.name, prev.loc, decl.loc
                )
            );
        }
        if let Stmt::Decl(_) = stmt {
            is_abstract = true;
        }
    }

    let mut pass = ScopeChain {
        model: &def.name,
        scope: &scope,
        curr_var: None,
        depth: 0,
    };
    for stmt in def.variables() {
        walk(Node::Stmt(stmt), &mut |visit| pass.visit(visit))?;
    }

    Ok(Resolved { scope, is_abstract })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::flatten;
    use crate::parser::parse;

    fn resolve_src(src: &str) -> Result<Resolved> {
        let (file, count) = parse(src);
        assert_eq!(0, count, "{:?}", file.errors);
        resolve(&flatten(&file)?[0])
    }

    #[test]
    fn test_resolve() {
        let resolved = resolve_src(
            "model main {
	timespec = {start: 0, end: 10, dt: 1}
	accum = stock {initial: 100, inflow: rate}
	rate = growth * accum * dt
	growth = effect[time]
	effect = [(0, 1), (10, 2)]
}
",
        )
        .unwrap();
        assert!(!resolved.is_abstract);
        assert_eq!(4, resolved.scope.len());
        assert!(resolved.scope.lookup("timespec").is_none());
        assert_eq!(
            ObjKind::Var(VarKind::Unknown),
            resolved.scope.lookup("rate").unwrap().kind
        );
    }

    #[test]
    fn test_abstract() {
        let resolved = resolve_src("model m {\n\tinput\n\tout = input * 2\n}\n").unwrap();
        assert!(resolved.is_abstract);
    }

    #[test]
    fn test_unknown_variable() {
        let err = resolve_src("model m {\n\tx = y + 1\n}\n").unwrap_err();
        assert_eq!(ErrorCode::UnknownVariable, err.code);
        let details = err.get_details().unwrap();
        assert!(details.starts_with("m.x: unknown variable 'y'"), "{details}");

        // references nested in composites and calls are checked too
        let err = resolve_src("model m {\n\ts = stock {inflow: max(0, q)}\n}\n").unwrap_err();
        assert_eq!(ErrorCode::UnknownVariable, err.code);
    }

    #[test]
    fn test_reserved_names() {
        let err = resolve_src("model m {\n\ttime = 3\n}\n").unwrap_err();
        assert_eq!(ErrorCode::DuplicateVariable, err.code);
    }
}
