// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

#![forbid(unsafe_code)]

pub mod ast;
pub mod builtins;
pub mod common;
pub mod compiler;
pub mod coordinator;
pub mod interpreter;
pub mod model;
pub mod parser;
pub mod passes;
pub mod results;
pub mod token;

pub use self::common::{Error, ErrorCode, ErrorKind, Ident, Result};
pub use self::compiler::{synthesize, EquationSet};
pub use self::interpreter::{Sim, SimState};
pub use self::model::{Model, Project, Variable};
pub use self::parser::parse;
pub use self::passes::Timespec;
pub use self::results::Results;
