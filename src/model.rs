// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::ast::{File, VarKind};
use crate::common::{Error, ErrorCode, ErrorKind, Ident, Result};
use crate::compiler::{synthesize, EquationSet, Table};
use crate::coordinator::{Coordinator, Defaults};
use crate::interpreter::Sim;
use crate::parser::parse;
use crate::passes::{analyze, ModelInfo, Timespec};
use crate::{eprintln, model_err};

/// Variable is a compiled model variable.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct Variable {
    pub name: Ident,
    pub kind: VarKind,
    /// the value of a constant-defined variable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<Table>,
}

impl Variable {
    /// is_recorded is false for tables.  An indexed table still has a
    /// value every step, but it is not part of the report.
    pub fn is_recorded(&self) -> bool {
        self.kind != VarKind::Table
    }
}

/// Model is the compiled, read-only form of a model declaration.  It
/// is shared by every simulation instantiated from it.
#[derive(Clone, PartialEq, Debug, Serialize)]
pub struct Model {
    pub name: Ident,
    pub is_interface: bool,
    pub is_abstract: bool,
    /// variables in declaration order
    pub vars: Vec<Variable>,
    #[serde(skip)]
    offsets: HashMap<Ident, usize>,
    pub defaults: Arc<Defaults>,
    pub timespec: Option<Timespec>,
    pub equations: EquationSet,
}

impl Model {
    pub fn new(info: &ModelInfo) -> Result<Model> {
        let compiled = synthesize(info)?;
        if info.timespec.is_none() && !info.def.is_interface {
            eprintln!(
                "warning: model '{}' has no timespec and can only be simulated with an explicit one",
                info.def.name
            );
        }

        let offsets = compiled
            .vars
            .iter()
            .enumerate()
            .map(|(i, v)| (v.name.clone(), i))
            .collect();

        Ok(Model {
            name: info.def.name.clone(),
            is_interface: info.def.is_interface,
            is_abstract: info.is_abstract,
            vars: compiled.vars,
            offsets,
            defaults: Arc::new(compiled.defaults),
            timespec: info.timespec,
            equations: compiled.equations,
        })
    }

    pub fn get_var(&self, name: &str) -> Option<&Variable> {
        self.offsets.get(name).map(|&i| &self.vars[i])
    }

    pub fn tables(&self) -> &BTreeMap<Ident, Table> {
        &self.equations.tables
    }

    /// recorded_vars are the names of the reported variables, in
    /// declaration order.
    pub fn recorded_vars(&self) -> Vec<Ident> {
        self.vars
            .iter()
            .filter(|v| v.is_recorded())
            .map(|v| v.name.clone())
            .collect()
    }

    /// is_overridable is true when the variable's per-step value is
    /// served by the coordinator.
    pub fn is_overridable(&self, name: &str) -> bool {
        self.equations
            .flows
            .iter()
            .any(|r| r.ident == name && r.expr.reads_default(name))
    }
}

/// Project owns every compiled model in a file, along with the
/// coordinator the file's simulations share.
pub struct Project {
    models: HashMap<Ident, Arc<Model>>,
    model_order: Vec<Ident>,
    coordinator: Coordinator,
    next_sim_id: AtomicUsize,
}

impl Project {
    /// new analyzes and compiles every model in a parsed file.  The
    /// file must be free of syntax errors.
    pub fn new(file: &File) -> Result<Project> {
        let infos = analyze(file)?;

        let mut models = HashMap::with_capacity(infos.len());
        let mut model_order = Vec::with_capacity(infos.len());
        for info in infos.iter() {
            let model = Model::new(info)?;
            model_order.push(model.name.clone());
            models.insert(model.name.clone(), Arc::new(model));
        }

        Ok(Project {
            models,
            model_order,
            coordinator: Coordinator::new(),
            next_sim_id: AtomicUsize::new(0),
        })
    }

    /// from_source parses and compiles model source text.
    pub fn from_source(text: &str) -> Result<Project> {
        let (file, _) = parse(text);
        Project::new(&file)
    }

    pub fn get_model(&self, name: &str) -> Option<&Arc<Model>> {
        self.models.get(name)
    }

    /// models returns the compiled models in declaration order.
    pub fn models(&self) -> impl Iterator<Item = &Arc<Model>> {
        self.model_order.iter().filter_map(|name| self.models.get(name))
    }

    fn runnable(&self, name: &str) -> Result<&Arc<Model>> {
        let model = match self.models.get(name) {
            Some(model) => model,
            None => {
                return model_err!(UnknownModel, format!("no model named '{name}'"));
            }
        };
        if model.is_interface {
            return model_err!(
                NotSimulatable,
                format!("'{name}' is an interface and can't be simulated")
            );
        }
        if model.is_abstract {
            return model_err!(
                NotSimulatable,
                format!("'{name}' has variables without equations and can't be simulated")
            );
        }
        Ok(model)
    }

    /// instantiate creates a simulation of the named model using the
    /// model's own timespec.
    pub fn instantiate(&self, model: &str, instance: &str) -> Result<Sim> {
        let runnable = self.runnable(model)?;
        match runnable.timespec {
            Some(timespec) => self.instantiate_with(model, instance, timespec),
            None => Err(Error::new(
                ErrorKind::Model,
                ErrorCode::BadTimespec,
                Some(format!("model '{model}' has no timespec")),
            )),
        }
    }

    /// instantiate_with creates a simulation of the named model with
    /// an explicit timespec.
    pub fn instantiate_with(&self, model: &str, instance: &str, timespec: Timespec) -> Result<Sim> {
        let model = self.runnable(model)?;
        timespec.validate()?;
        let id = self.next_sim_id.fetch_add(1, Ordering::Relaxed);
        Sim::new(
            id,
            instance,
            model.clone(),
            timespec,
            self.coordinator.handle(),
        )
    }
}
