// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! The equation synthesizer: lowers a resolved model into explicit
//! per-step update rules.  Every variable contributes (in declaration
//! order) an initial-value rule, a per-step flow rule, a stock
//! integration rule, or a stored lookup table; the initial and flow
//! runlists are then ordered so each rule runs after the rules it
//! reads.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::ast::{self, BinaryOp, UnaryOp, VarKind};
use crate::builtins::{builtin_arity, walk_builtin_expr, BuiltinFn};
use crate::common::{topo_sort, Ident, Result};
use crate::model::Variable;
use crate::model_err;
use crate::passes::type_resolution::is_stock_body;
use crate::passes::ModelInfo;

pub mod pretty;

/// the keys a stock body may contain
const STOCK_KEYS: &[&str] = &["initial", "inflow", "outflow", "biflow"];

#[derive(PartialEq, Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Const(f64),
    /// the named variable's value in the current state
    Var(Ident),
    /// the variable's default, resolved through the coordinator so
    /// that per-instance overrides apply
    Default(Ident),
    Dt,
    Op1(UnaryOp, Box<Expr>),
    Op2(BinaryOp, Box<Expr>, Box<Expr>),
    /// piecewise linear lookup in the named table
    Lookup(Ident, Box<Expr>),
    App(BuiltinFn<Expr>),
}

impl Expr {
    /// walk calls `f` on every variable whose current value this
    /// expression reads.
    fn for_each_var<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a str),
    {
        match self {
            Expr::Const(_) | Expr::Default(_) | Expr::Dt => {}
            Expr::Var(id) => f(id),
            Expr::Op1(_, x) | Expr::Lookup(_, x) => x.for_each_var(f),
            Expr::Op2(_, l, r) => {
                l.for_each_var(f);
                r.for_each_var(f);
            }
            Expr::App(builtin) => walk_builtin_expr(builtin, |a| a.for_each_var(f)),
        }
    }

    /// reads returns the variables whose current values this
    /// expression reads.
    pub fn reads(&self) -> BTreeSet<Ident> {
        let mut reads = BTreeSet::new();
        self.for_each_var(&mut |id| {
            reads.insert(id.to_string());
        });
        reads
    }

    /// reads_default is true when evaluating this expression consults
    /// the coordinator for `name`.
    pub fn reads_default(&self, name: &str) -> bool {
        match self {
            Expr::Default(id) => id == name,
            Expr::Const(_) | Expr::Var(_) | Expr::Dt => false,
            Expr::Op1(_, x) | Expr::Lookup(_, x) => x.reads_default(name),
            Expr::Op2(_, l, r) => l.reads_default(name) || r.reads_default(name),
            Expr::App(builtin) => builtin.args().iter().any(|a| a.reads_default(name)),
        }
    }
}

/// Rule assigns the value of `expr` to the variable `ident`.
#[derive(PartialEq, Clone, Debug, Serialize)]
pub struct Rule {
    pub ident: Ident,
    pub expr: Expr,
}

/// Table is a piecewise linear function through ordered (x, y) points.
#[derive(PartialEq, Clone, Debug, Serialize)]
pub struct Table {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

impl Table {
    /// new builds a table from its points, requiring at least one
    /// point and x coordinates that never decrease.
    pub fn new(name: &str, points: Vec<(f64, f64)>) -> Result<Self> {
        if points.is_empty() {
            return model_err!(BadTable, format!("table '{name}' has no points"));
        }
        if let Some(w) = points.windows(2).find(|w| w[1].0 < w[0].0) {
            return model_err!(
                BadTable,
                format!(
                    "table '{}' x values must not decrease, but {} follows {}",
                    name, w[1].0, w[0].0
                )
            );
        }
        let (x, y) = points.into_iter().unzip();
        Ok(Table { x, y })
    }
}

/// EquationSet is the compiled form of a model: what to compute at
/// the start of a run, what to recompute every step, and how stocks
/// integrate.
#[derive(PartialEq, Clone, Debug, Default, Serialize)]
pub struct EquationSet {
    pub initials: Vec<Rule>,
    pub flows: Vec<Rule>,
    pub stocks: Vec<Rule>,
    pub tables: BTreeMap<Ident, Table>,
}

/// Compiled holds everything synthesized for one model.
#[derive(PartialEq, Clone, Debug)]
pub struct Compiled {
    /// every variable in declaration order
    pub vars: Vec<Variable>,
    /// values the coordinator serves for constant and abstract variables
    pub defaults: BTreeMap<Ident, f64>,
    pub equations: EquationSet,
}

struct Synthesizer<'a> {
    model: &'a str,
    kinds: &'a HashMap<Ident, VarKind>,
    // table variables defined by an index expression; these have a
    // value each step in addition to a stored table
    table_values: HashSet<&'a str>,
    // variables with an initial rule
    has_initial: HashSet<&'a str>,
    initials: Vec<Rule>,
    flows: Vec<Rule>,
    stocks: Vec<Rule>,
    tables: BTreeMap<Ident, Table>,
    defaults: BTreeMap<Ident, f64>,
}

impl<'a> Synthesizer<'a> {
    fn kind(&self, name: &str) -> VarKind {
        self.kinds.get(name).copied().unwrap_or(VarKind::Unknown)
    }

    fn unsupported<T>(&self, var: &str, what: &str, expr: &ast::Expr) -> Result<T> {
        model_err!(
            UnsupportedExpr,
            format!("{}.{}: {} '{}' at {}", self.model, var, what, expr, expr.get_loc())
        )
    }

    /// lower translates an equation into its compiled form.
    fn lower(&self, var: &str, expr: &ast::Expr) -> Result<Expr> {
        use ast::Expr as E;
        let lowered = match expr {
            E::Const(_, n, _) => Expr::Const(*n),
            E::Var(id, _) if id == "dt" => Expr::Dt,
            E::Var(id, _) if id == "time" => Expr::Var(id.clone()),
            E::Var(id, _) => {
                if self.kind(id) == VarKind::Table && !self.table_values.contains(id.as_str()) {
                    return self.unsupported(var, "table used as a value (index it instead)", expr);
                }
                Expr::Var(id.clone())
            }
            E::Paren(x, _) | E::Units(x, _, _) => self.lower(var, x)?,
            E::Op1(op, x, _) => Expr::Op1(*op, Box::new(self.lower(var, x)?)),
            E::Op2(op, l, r, _) => Expr::Op2(
                *op,
                Box::new(self.lower(var, l)?),
                Box::new(self.lower(var, r)?),
            ),
            E::Index(x, index, _) => match x.strip_units() {
                E::Var(table, _) if self.kind(table) == VarKind::Table => {
                    Expr::Lookup(table.clone(), Box::new(self.lower(var, index)?))
                }
                _ => return self.unsupported(var, "index of a non-table", expr),
            },
            E::App(func, args, _) => {
                let arity = match builtin_arity(func) {
                    Some(arity) => arity,
                    None => {
                        return model_err!(
                            UnknownBuiltin,
                            format!("{}.{}: unknown function '{}'", self.model, var, func)
                        );
                    }
                };
                if arity != args.len() {
                    return model_err!(
                        BadBuiltinArgs,
                        format!(
                            "{}.{}: {} takes {} argument(s), not {}",
                            self.model,
                            var,
                            func,
                            arity,
                            args.len()
                        )
                    );
                }
                let args = args
                    .iter()
                    .map(|a| self.lower(var, a))
                    .collect::<Result<Vec<_>>>()?;
                match BuiltinFn::new(func, args) {
                    Some(builtin) => Expr::App(builtin),
                    None => return self.unsupported(var, "call", expr),
                }
            }
            E::Str(_, _) => return self.unsupported(var, "string used as a value", expr),
            E::Composite(_, _, _) => return self.unsupported(var, "composite literal", expr),
            E::KeyValue(_, _, _) | E::Pair(_, _, _) => {
                return self.unsupported(var, "unexpected expression", expr);
            }
            E::Table(_, _) => return self.unsupported(var, "nested table literal", expr),
        };
        Ok(lowered)
    }

    /// initial_rule computes a starting value: either a constant, or a
    /// copy of another variable's starting value.
    fn initial_rule(&self, var: &str, expr: &ast::Expr) -> Result<Expr> {
        if let Some(n) = expr.const_eval() {
            return Ok(Expr::Const(n));
        }
        match expr.strip_units() {
            ast::Expr::Var(id, _) if id == "dt" => Ok(Expr::Dt),
            ast::Expr::Var(id, _) if id == "time" => Ok(Expr::Var(id.clone())),
            ast::Expr::Var(id, _) => {
                if !self.has_initial.contains(id.as_str()) {
                    return model_err!(
                        BadInitial,
                        format!(
                            "{}.{}: initial value references '{}', which has no initial value",
                            self.model, var, id
                        )
                    );
                }
                Ok(Expr::Var(id.clone()))
            }
            other => model_err!(
                BadInitial,
                format!(
                    "{}.{}: initial value must be a constant or a variable, not '{}'",
                    self.model, var, other
                )
            ),
        }
    }

    fn table(&mut self, var: &str, expr: &ast::Expr) -> Result<()> {
        let pairs = match expr.strip_units() {
            ast::Expr::Table(pairs, _) => pairs,
            ast::Expr::Index(x, _, _) => return self.table(var, x),
            other => return self.unsupported(var, "table definition", other),
        };
        let mut points = Vec::with_capacity(pairs.len());
        for pair in pairs.iter() {
            let (x, y) = match pair {
                ast::Expr::Pair(x, y, _) => (x, y),
                other => return self.unsupported(var, "table element", other),
            };
            match (x.const_eval(), y.const_eval()) {
                (Some(x), Some(y)) => points.push((x, y)),
                _ => {
                    return model_err!(
                        BadTable,
                        format!(
                            "{}.{}: table point {} must have constant coordinates",
                            self.model, var, pair
                        )
                    );
                }
            }
        }
        let table = Table::new(&format!("{}.{}", self.model, var), points)?;
        self.tables.insert(var.to_string(), table);
        Ok(())
    }

    fn stock(&mut self, var: &str, body: &ast::Expr) -> Result<()> {
        let elts = match body.strip_units() {
            ast::Expr::Composite(_, elts, _) if is_stock_body(body) => elts,
            other => return self.unsupported(var, "stock body", other),
        };

        let mut parts: HashMap<&str, &ast::Expr> = HashMap::new();
        for elt in elts.iter() {
            let (key, value) = match elt {
                ast::Expr::KeyValue(key, value, _) => (key.as_str(), value.as_ref()),
                other => {
                    return model_err!(
                        BadStock,
                        format!("{}.{}: unexpected stock element '{}'", self.model, var, other)
                    );
                }
            };
            if !STOCK_KEYS.contains(&key) {
                return model_err!(
                    BadStock,
                    format!(
                        "{}.{}: unknown stock key '{}' (expected one of {})",
                        self.model,
                        var,
                        key,
                        STOCK_KEYS.join(", ")
                    )
                );
            }
            if parts.insert(key, value).is_some() {
                return model_err!(
                    BadStock,
                    format!("{}.{}: stock key '{}' given twice", self.model, var, key)
                );
            }
        }

        let initial = match parts.get("initial") {
            Some(initial) => self.initial_rule(var, initial)?,
            None => Expr::Const(0.0),
        };
        self.initials.push(Rule {
            ident: var.to_string(),
            expr: initial,
        });

        // net flow: biflow + inflow - outflow, leaving out absent terms
        let mut net: Option<Expr> = None;
        for key in ["biflow", "inflow"] {
            if let Some(flow) = parts.get(key) {
                let flow = self.lower(var, flow)?;
                net = Some(match net {
                    None => flow,
                    Some(prev) => Expr::Op2(BinaryOp::Add, Box::new(prev), Box::new(flow)),
                });
            }
        }
        if let Some(outflow) = parts.get("outflow") {
            let outflow = self.lower(var, outflow)?;
            net = Some(match net {
                None => Expr::Op1(UnaryOp::Negative, Box::new(outflow)),
                Some(prev) => Expr::Op2(BinaryOp::Sub, Box::new(prev), Box::new(outflow)),
            });
        }
        let net = net.unwrap_or(Expr::Const(0.0));

        self.stocks.push(Rule {
            ident: var.to_string(),
            expr: Expr::Op2(
                BinaryOp::Add,
                Box::new(Expr::Var(var.to_string())),
                Box::new(Expr::Op2(BinaryOp::Mul, Box::new(net), Box::new(Expr::Dt))),
            ),
        });
        Ok(())
    }

    fn flow_rule(&mut self, var: &str, expr: Expr) {
        self.flows.push(Rule {
            ident: var.to_string(),
            expr,
        });
    }

    fn initial(&mut self, var: &str, expr: Expr) {
        self.initials.push(Rule {
            ident: var.to_string(),
            expr,
        });
    }

    fn var(&mut self, stmt: &ast::Stmt) -> Result<Variable> {
        let name = stmt.name();
        let kind = self.kind(name);
        let mut variable = Variable {
            name: name.to_string(),
            kind,
            default: None,
            table: None,
        };

        let rhs = match stmt.rhs() {
            Some(rhs) => rhs,
            None => {
                // an abstract variable: its value comes from the
                // coordinator, both at the start and every step
                self.initial(name, Expr::Default(name.to_string()));
                self.flow_rule(name, Expr::Default(name.to_string()));
                return Ok(variable);
            }
        };

        match kind {
            VarKind::Stock => self.stock(name, rhs)?,
            VarKind::Table => {
                self.table(name, rhs)?;
                if let ast::Expr::Index(_, index, _) = rhs.strip_units() {
                    let index = self.lower(name, index)?;
                    self.flow_rule(name, Expr::Lookup(name.to_string(), Box::new(index)));
                }
                variable.table = self.tables.get(name).cloned();
            }
            VarKind::Const => match rhs.const_eval() {
                Some(n) => {
                    variable.default = Some(n);
                    self.initial(name, Expr::Const(n));
                    self.flow_rule(name, Expr::Const(n));
                }
                None => return self.unsupported(name, "non-constant const", rhs),
            },
            VarKind::Aux | VarKind::Flow | VarKind::Unknown => match rhs.const_eval() {
                Some(n) => {
                    variable.default = Some(n);
                    self.defaults.insert(name.to_string(), n);
                    self.initial(name, Expr::Const(n));
                    self.flow_rule(name, Expr::Default(name.to_string()));
                }
                None => {
                    let expr = self.lower(name, rhs)?;
                    self.flow_rule(name, expr);
                }
            },
        }

        Ok(variable)
    }
}

/// order_runlist sorts rules so that each comes after every rule in
/// the same list whose variable it reads, keeping declaration order
/// otherwise.
fn order_runlist(model: &str, what: &str, rules: Vec<Rule>) -> Result<Vec<Rule>> {
    let dependencies: HashMap<Ident, BTreeSet<Ident>> = rules
        .iter()
        .map(|r| (r.ident.clone(), r.expr.reads()))
        .collect();
    let runlist: Vec<&str> = rules.iter().map(|r| r.ident.as_str()).collect();
    let order: Vec<Ident> = match topo_sort(&runlist, &dependencies) {
        Ok(order) => order.into_iter().map(|id| id.to_string()).collect(),
        Err(ident) => {
            return model_err!(
                CircularDependency,
                format!("{model}: {what} of '{ident}' depends on itself")
            );
        }
    };

    let mut by_name: HashMap<Ident, Rule> =
        rules.into_iter().map(|r| (r.ident.clone(), r)).collect();
    Ok(order
        .into_iter()
        .filter_map(|id| by_name.remove(&id))
        .collect())
}

/// synthesize compiles a resolved model into its equation set.  Any
/// error aborts synthesis of the whole model.
pub fn synthesize(info: &ModelInfo) -> Result<Compiled> {
    let stmts: Vec<&ast::Stmt> = info.def.variables().collect();

    let mut table_values = HashSet::new();
    let mut has_initial = HashSet::new();
    for stmt in stmts.iter() {
        let name = stmt.name();
        let kind = info.kinds.get(name).copied().unwrap_or(VarKind::Unknown);
        match stmt.rhs() {
            None => {
                has_initial.insert(name);
            }
            Some(rhs) => match kind {
                VarKind::Stock | VarKind::Const => {
                    has_initial.insert(name);
                }
                VarKind::Table => {
                    if matches!(rhs.strip_units(), ast::Expr::Index(_, _, _)) {
                        table_values.insert(name);
                    }
                }
                VarKind::Aux | VarKind::Flow | VarKind::Unknown => {
                    if rhs.is_const() {
                        has_initial.insert(name);
                    }
                }
            },
        }
    }

    let mut synth = Synthesizer {
        model: &info.def.name,
        kinds: &info.kinds,
        table_values,
        has_initial,
        initials: vec![],
        flows: vec![],
        stocks: vec![],
        tables: BTreeMap::new(),
        defaults: BTreeMap::new(),
    };

    let mut vars = Vec::with_capacity(stmts.len());
    for stmt in stmts.iter() {
        vars.push(synth.var(stmt)?);
    }

    // stocks are read from the current state and are never in the
    // flow runlist, so they don't constrain its order
    let flows = order_runlist(&info.def.name, "equation", synth.flows)?;
    let initials = order_runlist(&info.def.name, "initial value", synth.initials)?;

    Ok(Compiled {
        vars,
        defaults: synth.defaults,
        equations: EquationSet {
            initials,
            flows,
            stocks: synth.stocks,
            tables: synth.tables,
        },
    })
}

#[cfg(test)]
mod tests;
