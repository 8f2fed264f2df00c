// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::common::{Ident, SyntaxError};

/// Pos is a point in the source text.  Lines and columns are 1-based,
/// the byte offset is 0-based.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Hash)]
pub struct Pos {
    pub offset: usize,
    pub line: usize,
    pub col: usize,
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Loc describes a range of the source by the starting point of the
/// first token in a node and the point just past its last token.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Default, Hash)]
pub struct Loc {
    pub start: Pos,
    pub end: Pos,
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

impl Loc {
    pub fn new(start: Pos, end: Pos) -> Self {
        Loc { start, end }
    }

    /// union takes a second Loc and returns the inclusive range from the
    /// start of the earlier token to the end of the later token.
    pub fn union(&self, rhs: &Self) -> Self {
        let start = if self.start.offset <= rhs.start.offset {
            self.start
        } else {
            rhs.start
        };
        let end = if self.end.offset >= rhs.end.offset {
            self.end
        } else {
            rhs.end
        };
        Loc { start, end }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    Negative,
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Exp,
}

impl BinaryOp {
    // higher the precedence, the tighter the binding.
    // e.g. Mul.precedence() > Add.precedence()
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
            BinaryOp::Exp => 3,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Exp => "^",
        }
    }
}

#[derive(PartialEq, Clone, Debug)]
pub enum Expr {
    /// a reference to a variable by name
    Var(Ident, Loc),
    /// a numeric literal: the source text and its value
    Const(String, f64, Loc),
    Str(String, Loc),
    /// `type? { elts }`, used for stock bodies and structured initializers
    Composite(Option<Ident>, Vec<Expr>, Loc),
    Paren(Box<Expr>, Loc),
    Op1(UnaryOp, Box<Expr>, Loc),
    Op2(BinaryOp, Box<Expr>, Box<Expr>, Loc),
    KeyValue(Ident, Box<Expr>, Loc),
    /// an (x, y) point in a table literal
    Pair(Box<Expr>, Box<Expr>, Loc),
    /// `[(x, y), ...]`; elements are always `Pair`s
    Table(Vec<Expr>, Loc),
    /// a value annotated with units, e.g. `100 "widgets"`
    Units(Box<Expr>, Box<Expr>, Loc),
    /// a table lookup driven by the index expression
    Index(Box<Expr>, Box<Expr>, Loc),
    App(Ident, Vec<Expr>, Loc),
}

impl Expr {
    pub fn get_loc(&self) -> Loc {
        match self {
            Expr::Var(_, loc) => *loc,
            Expr::Const(_, _, loc) => *loc,
            Expr::Str(_, loc) => *loc,
            Expr::Composite(_, _, loc) => *loc,
            Expr::Paren(_, loc) => *loc,
            Expr::Op1(_, _, loc) => *loc,
            Expr::Op2(_, _, _, loc) => *loc,
            Expr::KeyValue(_, _, loc) => *loc,
            Expr::Pair(_, _, loc) => *loc,
            Expr::Table(_, loc) => *loc,
            Expr::Units(_, _, loc) => *loc,
            Expr::Index(_, _, loc) => *loc,
            Expr::App(_, _, loc) => *loc,
        }
    }

    /// strip_units returns the wrapped value if this is a
    /// units-annotated expression, and itself otherwise.  Unit safety
    /// is a separate concern from evaluation.
    pub fn strip_units(&self) -> &Expr {
        match self {
            Expr::Units(x, _, _) => x,
            _ => self,
        }
    }

    /// const_eval returns the value of a numeric literal, optionally
    /// negated and optionally wrapped in units.  Any other shape
    /// (including arithmetic over literals) is not considered constant.
    pub fn const_eval(&self) -> Option<f64> {
        match self.strip_units() {
            Expr::Const(_, n, _) => Some(*n),
            Expr::Op1(UnaryOp::Negative, x, _) => match x.as_ref() {
                Expr::Const(_, n, _) => Some(-*n),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_const(&self) -> bool {
        self.const_eval().is_some()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Var(id, _) => write!(f, "{id}"),
            Expr::Const(s, _, _) => write!(f, "{s}"),
            Expr::Str(s, _) => write!(f, "\"{s}\""),
            Expr::Composite(ty, elts, _) => {
                if let Some(ty) = ty {
                    write!(f, "{ty} ")?;
                }
                let elts: Vec<String> = elts.iter().map(|e| e.to_string()).collect();
                write!(f, "{{{}}}", elts.join(", "))
            }
            Expr::Paren(x, _) => write!(f, "({x})"),
            Expr::Op1(UnaryOp::Negative, x, _) => write!(f, "-{x}"),
            Expr::Op2(op, l, r, _) => write!(f, "{} {} {}", l, op.symbol(), r),
            Expr::KeyValue(k, v, _) => write!(f, "{k}: {v}"),
            Expr::Pair(x, y, _) => write!(f, "({x}, {y})"),
            Expr::Table(pairs, _) => {
                let pairs: Vec<String> = pairs.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", pairs.join(", "))
            }
            Expr::Units(x, u, _) => write!(f, "{x} {u}"),
            Expr::Index(x, i, _) => write!(f, "{x}[{i}]"),
            Expr::App(func, args, _) => {
                let args: Vec<String> = args.iter().map(|e| e.to_string()).collect();
                write!(f, "{}({})", func, args.join(", "))
            }
        }
    }
}

/// VarKind is what a variable is in the stock and flow sense.
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VarKind {
    Stock,
    Flow,
    Aux,
    Table,
    Const,
    Unknown,
}

impl VarKind {
    pub fn from_name(name: &str) -> Option<VarKind> {
        let kind = match name {
            "stock" => VarKind::Stock,
            "flow" => VarKind::Flow,
            "aux" => VarKind::Aux,
            "table" => VarKind::Table,
            "const" => VarKind::Const,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for VarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VarKind::Stock => "stock",
            VarKind::Flow => "flow",
            VarKind::Aux => "aux",
            VarKind::Table => "table",
            VarKind::Const => "const",
            VarKind::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

/// VarDecl introduces a variable: its name, an optional kind
/// annotation (as written) and optional units.
#[derive(PartialEq, Clone, Debug)]
pub struct VarDecl {
    pub name: Ident,
    pub kind: Option<(Ident, Loc)>,
    pub units: Option<Expr>,
    pub loc: Loc,
}

#[derive(PartialEq, Clone, Debug)]
pub enum Stmt {
    /// a declaration without an initializer: an abstract variable
    Decl(VarDecl),
    Assign(VarDecl, Expr),
}

impl Stmt {
    pub fn decl(&self) -> &VarDecl {
        match self {
            Stmt::Decl(decl) => decl,
            Stmt::Assign(decl, _) => decl,
        }
    }

    pub fn name(&self) -> &str {
        &self.decl().name
    }

    pub fn rhs(&self) -> Option<&Expr> {
        match self {
            Stmt::Decl(_) => None,
            Stmt::Assign(_, rhs) => Some(rhs),
        }
    }

    pub fn get_loc(&self) -> Loc {
        match self {
            Stmt::Decl(decl) => decl.loc,
            Stmt::Assign(decl, rhs) => decl.loc.union(&rhs.get_loc()),
        }
    }
}

#[derive(PartialEq, Clone, Debug, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub loc: Loc,
}

/// ModelDecl covers both `model` and `interface` declarations; an
/// interface is a model template that is never instantiated.
#[derive(PartialEq, Clone, Debug)]
pub struct ModelDecl {
    pub name: Ident,
    pub specializes: Option<(Ident, Loc)>,
    pub units: Option<Expr>,
    pub body: Block,
    pub loc: Loc,
}

#[derive(PartialEq, Clone, Debug)]
pub struct KindDecl {
    pub name: Ident,
    pub units: Option<Expr>,
    pub loc: Loc,
}

#[derive(PartialEq, Clone, Debug)]
pub enum Decl {
    Model(ModelDecl),
    Interface(ModelDecl),
    Kind(KindDecl),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Model(m) | Decl::Interface(m) => &m.name,
            Decl::Kind(k) => &k.name,
        }
    }

    pub fn get_loc(&self) -> Loc {
        match self {
            Decl::Model(m) | Decl::Interface(m) => m.loc,
            Decl::Kind(k) => k.loc,
        }
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ObjKind {
    Model,
    Interface,
    Kind,
    Var(VarKind),
}

/// Object links a name to where it was declared.
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Object {
    pub name: Ident,
    pub kind: ObjKind,
    pub loc: Loc,
}

/// Scope maps names to objects within one namespace: either the
/// top-level declarations of a file, or the variables of a model.
#[derive(PartialEq, Eq, Clone, Debug, Default)]
pub struct Scope {
    objects: BTreeMap<Ident, Object>,
}

impl Scope {
    pub fn new() -> Self {
        Scope::default()
    }

    /// insert adds obj to the scope, returning the previously declared
    /// object of the same name (leaving it in place) if there is one.
    pub fn insert(&mut self, obj: Object) -> Option<&Object> {
        if self.objects.contains_key(&obj.name) {
            return self.objects.get(&obj.name);
        }
        self.objects.insert(obj.name.clone(), obj);
        None
    }

    pub fn lookup(&self, name: &str) -> Option<&Object> {
        self.objects.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Object> {
        self.objects.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[derive(PartialEq, Clone, Debug, Default)]
pub struct File {
    pub package: Option<Ident>,
    pub imports: Vec<String>,
    pub decls: Vec<Decl>,
    /// top-level names: models, interfaces and kinds
    pub scope: Scope,
    pub errors: Vec<SyntaxError>,
}

impl File {
    /// get_model returns a model or interface declaration by name.
    pub fn get_model(&self, name: &str) -> Option<&ModelDecl> {
        self.decls.iter().find_map(|d| match d {
            Decl::Model(m) | Decl::Interface(m) if m.name == name => Some(m),
            _ => None,
        })
    }
}

/// Node is a borrowed reference to any node in the tree, handed to a
/// visitor during traversal.
#[derive(Clone, Copy, Debug)]
pub enum Node<'a> {
    File(&'a File),
    Decl(&'a Decl),
    Stmt(&'a Stmt),
    Expr(&'a Expr),
}

/// Visit is what a visitor sees: a node when traversal enters it, and
/// `Leave` once that node's subtree has been fully visited.
#[derive(Clone, Copy, Debug)]
pub enum Visit<'a> {
    Enter(Node<'a>),
    Leave,
}

/// walk traverses the tree rooted at `node` depth-first.  The visitor
/// is called with `Visit::Enter(node)`; if it returns `Ok(true)` the
/// node's children are walked and the visitor is then called with
/// `Visit::Leave`.  Returning `Ok(false)` skips the subtree (and the
/// matching `Leave`).  The first error stops the walk.
pub fn walk<'a, E, F>(node: Node<'a>, f: &mut F) -> Result<(), E>
where
    F: FnMut(Visit<'a>) -> Result<bool, E>,
{
    if !f(Visit::Enter(node))? {
        return Ok(());
    }

    match node {
        Node::File(file) => {
            for decl in file.decls.iter() {
                walk(Node::Decl(decl), f)?;
            }
        }
        Node::Decl(Decl::Model(m)) | Node::Decl(Decl::Interface(m)) => {
            if let Some(units) = &m.units {
                walk(Node::Expr(units), f)?;
            }
            for stmt in m.body.stmts.iter() {
                walk(Node::Stmt(stmt), f)?;
            }
        }
        Node::Decl(Decl::Kind(k)) => {
            if let Some(units) = &k.units {
                walk(Node::Expr(units), f)?;
            }
        }
        Node::Stmt(stmt) => {
            if let Some(units) = &stmt.decl().units {
                walk(Node::Expr(units), f)?;
            }
            if let Some(rhs) = stmt.rhs() {
                walk(Node::Expr(rhs), f)?;
            }
        }
        Node::Expr(expr) => match expr {
            Expr::Var(_, _) | Expr::Const(_, _, _) | Expr::Str(_, _) => {}
            Expr::Composite(_, elts, _) | Expr::Table(elts, _) | Expr::App(_, elts, _) => {
                for elt in elts.iter() {
                    walk(Node::Expr(elt), f)?;
                }
            }
            Expr::Paren(x, _) | Expr::Op1(_, x, _) | Expr::KeyValue(_, x, _) => {
                walk(Node::Expr(x), f)?;
            }
            Expr::Op2(_, l, r, _)
            | Expr::Pair(l, r, _)
            | Expr::Units(l, r, _)
            | Expr::Index(l, r, _) => {
                walk(Node::Expr(l), f)?;
                walk(Node::Expr(r), f)?;
            }
        },
    }

    f(Visit::Leave)?;
    Ok(())
}

#[cfg(test)]
fn pos(offset: usize) -> Pos {
    Pos {
        offset,
        line: 1,
        col: offset + 1,
    }
}

#[test]
fn test_loc_basics() {
    let a = Loc::new(pos(3), pos(7));
    let b = Loc::new(pos(4), pos(11));
    assert_eq!(Loc::new(pos(3), pos(11)), a.union(&b));

    let c = Loc::new(pos(1), pos(5));
    assert_eq!(Loc::new(pos(1), pos(7)), a.union(&c));
}

#[test]
fn test_const_eval() {
    let loc = Loc::default();
    let lit = Expr::Const("1e-3".to_string(), 1e-3, loc);
    assert_eq!(Some(1e-3), lit.const_eval());

    let with_units = Expr::Units(
        Box::new(lit.clone()),
        Box::new(Expr::Str("widgets".to_string(), loc)),
        loc,
    );
    assert_eq!(Some(1e-3), with_units.const_eval());

    let neg = Expr::Op1(UnaryOp::Negative, Box::new(lit.clone()), loc);
    assert_eq!(Some(-1e-3), neg.const_eval());

    // arithmetic over literals is deliberately not folded
    let sum = Expr::Op2(BinaryOp::Add, Box::new(lit.clone()), Box::new(lit), loc);
    assert_eq!(None, sum.const_eval());
    assert!(!Expr::Var("x".to_string(), loc).is_const());
}

#[test]
fn test_walk_enter_leave_balance() {
    let loc = Loc::default();
    let rhs = Expr::Op2(
        BinaryOp::Mul,
        Box::new(Expr::Var("a".to_string(), loc)),
        Box::new(Expr::Paren(
            Box::new(Expr::Const("2".to_string(), 2.0, loc)),
            loc,
        )),
        loc,
    );
    let stmt = Stmt::Assign(
        VarDecl {
            name: "x".to_string(),
            kind: None,
            units: None,
            loc,
        },
        rhs,
    );

    let mut depth = 0i32;
    let mut max_depth = 0i32;
    let mut entered = 0;
    walk::<(), _>(Node::Stmt(&stmt), &mut |visit| {
        match visit {
            Visit::Enter(_) => {
                entered += 1;
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            Visit::Leave => depth -= 1,
        }
        Ok(true)
    })
    .unwrap();

    assert_eq!(0, depth);
    // stmt, op2, var, paren, const
    assert_eq!(5, entered);
    assert_eq!(4, max_depth);
}
