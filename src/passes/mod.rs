// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Semantic passes over a parsed File.  Each pass is a function from a
//! (flattened) model to a side table, returning the first problem it
//! finds as an Error.  `analyze` runs them in order over every model
//! in a file: timespec extraction, scope-chain resolution, and type
//! resolution.

use std::collections::{HashMap, HashSet};

use crate::ast::{Decl, File, Loc, ModelDecl, Scope, Stmt, VarKind};
use crate::common::{Error, ErrorKind, Ident, Result};
use crate::model_err;

pub mod scope_chain;
pub mod timespec;
pub mod type_resolution;

pub use self::timespec::Timespec;

/// the reserved statement name holding a model's time specification
pub const TIMESPEC: &str = "timespec";

/// ModelDef is a model or interface declaration with the statements
/// it inherits through `specializes` merged in.
#[derive(Clone, PartialEq, Debug)]
pub struct ModelDef {
    pub name: Ident,
    pub is_interface: bool,
    pub stmts: Vec<Stmt>,
    pub loc: Loc,
}

impl ModelDef {
    /// variables returns the statements that declare variables, in
    /// order, skipping the reserved timespec statement.
    pub fn variables(&self) -> impl Iterator<Item = &Stmt> {
        self.stmts.iter().filter(|s| s.name() != TIMESPEC)
    }

    pub fn get_stmt(&self, name: &str) -> Option<&Stmt> {
        self.stmts.iter().find(|s| s.name() == name)
    }
}

/// ModelInfo is everything the semantic passes learned about a model.
#[derive(Clone, PartialEq, Debug)]
pub struct ModelInfo {
    pub def: ModelDef,
    pub timespec: Option<Timespec>,
    /// the model's variables, each resolved to its kind
    pub scope: Scope,
    pub kinds: HashMap<Ident, VarKind>,
    /// true when at least one variable is declared but never assigned
    pub is_abstract: bool,
}

/// check_syntax refuses files that had lexical or syntax errors.
pub fn check_syntax(file: &File) -> Result<()> {
    match file.errors.first() {
        None => Ok(()),
        Some(first) => Err(Error::new(
            ErrorKind::Syntax,
            first.code,
            Some(format!(
                "{} syntax error(s), first at {}",
                file.errors.len(),
                first
            )),
        )),
    }
}

/// flatten resolves `specializes` chains, returning one ModelDef per
/// model and interface declaration in file order.  A child's statement
/// replaces the inherited statement of the same name in place; new
/// statements are appended.
pub fn flatten(file: &File) -> Result<Vec<ModelDef>> {
    let mut decls: HashMap<&str, &ModelDecl> = HashMap::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for decl in file.decls.iter() {
        if !seen.insert(decl.name()) {
            return model_err!(
                DuplicateModel,
                format!("'{}' is declared more than once", decl.name())
            );
        }
        match decl {
            Decl::Model(m) | Decl::Interface(m) => {
                decls.insert(m.name.as_str(), m);
            }
            Decl::Kind(_) => {}
        }
    }

    fn merged(
        decls: &HashMap<&str, &ModelDecl>,
        model: &ModelDecl,
        visiting: &mut Vec<String>,
    ) -> Result<Vec<Stmt>> {
        if visiting.contains(&model.name) {
            return model_err!(
                CircularDependency,
                format!("'{}' specializes itself (via {})", model.name, visiting.join(" -> "))
            );
        }
        let mut stmts = match &model.specializes {
            None => vec![],
            Some((parent, _)) => {
                let parent = match decls.get(parent.as_str()) {
                    Some(parent) => *parent,
                    None => {
                        return model_err!(
                            UnknownModel,
                            format!("'{}' specializes unknown model '{}'", model.name, parent)
                        );
                    }
                };
                visiting.push(model.name.clone());
                let stmts = merged(decls, parent, visiting)?;
                visiting.pop();
                stmts
            }
        };

        let mut own: HashSet<&str> = HashSet::new();
        for stmt in model.body.stmts.iter() {
            if !own.insert(stmt.name()) {
                return model_err!(
                    DuplicateVariable,
                    format!("{}: '{}' is declared more than once", model.name, stmt.name())
                );
            }
            match stmts.iter().position(|s| s.name() == stmt.name()) {
                Some(i) => stmts[i] = stmt.clone(),
                None => stmts.push(stmt.clone()),
            }
        }
        Ok(stmts)
    }

    let mut defs = Vec::with_capacity(decls.len());
    for decl in file.decls.iter() {
        let (model, is_interface) = match decl {
            Decl::Model(m) => (m, false),
            Decl::Interface(m) => (m, true),
            Decl::Kind(_) => continue,
        };
        let mut visiting = vec![];
        defs.push(ModelDef {
            name: model.name.clone(),
            is_interface,
            stmts: merged(&decls, model, &mut visiting)?,
            loc: model.loc,
        });
    }

    Ok(defs)
}

/// analyze_model runs every pass over a single flattened model.
pub fn analyze_model(def: ModelDef) -> Result<ModelInfo> {
    let timespec = timespec::extract(&def)?;
    let mut resolved = scope_chain::resolve(&def)?;
    let kinds = type_resolution::resolve(&def, &mut resolved.scope)?;

    Ok(ModelInfo {
        timespec,
        scope: resolved.scope,
        kinds,
        is_abstract: resolved.is_abstract,
        def,
    })
}

/// analyze checks a parsed file and runs the semantic passes over each
/// of its models.  The first failure anywhere fails the whole file.
pub fn analyze(file: &File) -> Result<Vec<ModelInfo>> {
    check_syntax(file)?;
    flatten(file)?.into_iter().map(analyze_model).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;
    use crate::parser::parse;

    pub(crate) fn analyze_src(src: &str) -> Result<Vec<ModelInfo>> {
        let (file, _) = parse(src);
        analyze(&file)
    }

    #[test]
    fn test_syntax_errors_gate() {
        let err = analyze_src("model m {\n\tx = )\n}\n").unwrap_err();
        assert_eq!(ErrorKind::Syntax, err.kind);
        assert_eq!(ErrorCode::UnrecognizedToken, err.code);
    }

    #[test]
    fn test_specializes_merges_statements() {
        let models = analyze_src(
            "interface base {
	a
	b = a * 2
	c = 3
}

model child specializes base {
	a = 1
	d = c + 1
}
",
        )
        .unwrap();
        assert_eq!(2, models.len());
        let base = &models[0];
        assert!(base.def.is_interface);
        assert!(base.is_abstract);

        let child = &models[1];
        assert!(!child.is_abstract);
        let names: Vec<&str> = child.def.stmts.iter().map(|s| s.name()).collect();
        assert_eq!(vec!["a", "b", "c", "d"], names);
        assert!(matches!(child.def.stmts[0], Stmt::Assign(_, _)));
    }

    #[test]
    fn test_specializes_transitive() {
        let models = analyze_src(
            "model a {\n\tx = 1\n}\nmodel b specializes a {\n\ty = x\n}\nmodel c specializes b {\n\tz = y\n}\n",
        )
        .unwrap();
        let names: Vec<&str> = models[2].def.stmts.iter().map(|s| s.name()).collect();
        assert_eq!(vec!["x", "y", "z"], names);
    }

    #[test]
    fn test_specializes_errors() {
        let err = analyze_src("model a specializes nope {\n\tx = 1\n}\n").unwrap_err();
        assert_eq!(ErrorCode::UnknownModel, err.code);

        let err =
            analyze_src("model a specializes b {\n}\nmodel b specializes a {\n}\n").unwrap_err();
        assert_eq!(ErrorCode::CircularDependency, err.code);

        let err = analyze_src("model a {\n}\nmodel a {\n}\n").unwrap_err();
        assert_eq!(ErrorCode::DuplicateModel, err.code);

        let err = analyze_src("model a {\n\tx = 1\n\tx = 2\n}\n").unwrap_err();
        assert_eq!(ErrorCode::DuplicateVariable, err.code);
    }

    #[test]
    fn test_unresolved_reference_fails_whole_file() {
        let err = analyze_src(
            "model good {\n\tx = 1\n}\nmodel bad {\n\ty = missing * 2\n}\n",
        )
        .unwrap_err();
        assert_eq!(ErrorKind::Model, err.kind);
        assert_eq!(ErrorCode::UnknownVariable, err.code);
    }
}
