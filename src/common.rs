// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::{error, fmt, result};

use crate::ast::Pos;

pub type Ident = String;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnrecognizedChar,
    UnclosedLiteral,
    UnclosedTypeDecl,
    UnclosedComment,
    UnrecognizedEof,
    UnrecognizedToken,
    ExpectedNumber,
    ExpectedIdent,
    ExpectedTerminator,
    DuplicateModel,
    DuplicateVariable,
    UnknownModel,
    UnknownVariable,
    UnknownKind,
    KindMismatch,
    BadTimespec,
    BadStock,
    BadTable,
    BadInitial,
    UnsupportedExpr,
    UnknownBuiltin,
    BadBuiltinArgs,
    CircularDependency,
    NotSimulatable,
    NotOverridable,
    CoordinatorStopped,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ErrorCode::*;
        let name = match self {
            UnrecognizedChar => "unrecognized_char",
            UnclosedLiteral => "unclosed_literal",
            UnclosedTypeDecl => "unclosed_type_decl",
            UnclosedComment => "unclosed_comment",
            UnrecognizedEof => "unrecognized_eof",
            UnrecognizedToken => "unrecognized_token",
            ExpectedNumber => "expected_number",
            ExpectedIdent => "expected_ident",
            ExpectedTerminator => "expected_terminator",
            DuplicateModel => "duplicate_model",
            DuplicateVariable => "duplicate_variable",
            UnknownModel => "unknown_model",
            UnknownVariable => "unknown_variable",
            UnknownKind => "unknown_kind",
            KindMismatch => "kind_mismatch",
            BadTimespec => "bad_timespec",
            BadStock => "bad_stock",
            BadTable => "bad_table",
            BadInitial => "bad_initial",
            UnsupportedExpr => "unsupported_expr",
            UnknownBuiltin => "unknown_builtin",
            BadBuiltinArgs => "bad_builtin_args",
            CircularDependency => "circular_dependency",
            NotSimulatable => "not_simulatable",
            NotOverridable => "not_overridable",
            CoordinatorStopped => "coordinator_stopped",
        };

        write!(f, "{name}")
    }
}

/// SyntaxError is a lexical or grammatical problem at a specific
/// point in the source text.  A file accumulates these while parsing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxError {
    pub pos: Pos,
    pub code: ErrorCode,
    pub message: String,
}

impl SyntaxError {
    pub fn new(pos: Pos, code: ErrorCode, message: impl Into<String>) -> Self {
        SyntaxError {
            pos,
            code,
            message: message.into(),
        }
    }

    /// render formats the error the way compilers traditionally do:
    /// `file:line:col: error: msg`, followed by the offending line and
    /// a caret under the offending column.
    pub fn render(&self, filename: &str, source: &str) -> String {
        let line = source.lines().nth(self.pos.line.saturating_sub(1)).unwrap_or("");
        // tabs are expanded so the caret lines up with what a
        // terminal displays
        let prefix_len: usize = line
            .chars()
            .take(self.pos.col.saturating_sub(1))
            .map(|c| if c == '\t' { 8 } else { 1 })
            .sum();
        let line = line.replace('\t', "        ");
        format!(
            "{}:{}:{}: error: {}\n{}\n{}^",
            filename,
            self.pos.line,
            self.pos.col,
            self.message,
            line,
            " ".repeat(prefix_len)
        )
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}: {}", self.pos.line, self.pos.col, self.message)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Model,
    Simulation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: ErrorCode,
    pub details: Option<String>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: ErrorCode, details: Option<String>) -> Self {
        Error {
            kind,
            code,
            details,
        }
    }

    pub fn get_details(&self) -> Option<String> {
        self.details.clone()
    }
}

impl From<SyntaxError> for Error {
    fn from(err: SyntaxError) -> Self {
        Error {
            kind: ErrorKind::Syntax,
            code: err.code,
            details: Some(err.to_string()),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let kind = match self.kind {
            ErrorKind::Syntax => "SyntaxError",
            ErrorKind::Model => "ModelError",
            ErrorKind::Simulation => "SimulationError",
        };
        match self.details {
            Some(ref details) => write!(f, "{}{{{}: {}}}", kind, self.code, details),
            None => write!(f, "{}{{{}}}", kind, self.code),
        }
    }
}

impl error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

#[macro_export]
macro_rules! eprintln(
    ($($arg:tt)*) => {{
        use std::io::Write;
        // a closed stderr isn't something we can report anywhere
        let _ = writeln!(&mut ::std::io::stderr(), $($arg)*);
    }}
);

#[macro_export]
macro_rules! model_err(
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Model,
            ErrorCode::$code,
            Some($str),
        ))
    }}
);

#[macro_export]
macro_rules! sim_err {
    ($code:tt, $str:expr) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(
            ErrorKind::Simulation,
            ErrorCode::$code,
            Some($str),
        ))
    }};
    ($code:tt) => {{
        use $crate::common::{Error, ErrorCode, ErrorKind};
        Err(Error::new(ErrorKind::Simulation, ErrorCode::$code, None))
    }};
}

/// topo_sort orders `runlist` so that every entry comes after the
/// entries it depends on.  Entries with no ordering constraint between
/// them keep their relative order from `runlist`.  Dependencies that
/// aren't themselves in the runlist are ignored; a cycle is an error
/// naming one of its members.
pub fn topo_sort<'out>(
    runlist: &[&'out str],
    dependencies: &'out HashMap<Ident, BTreeSet<Ident>>,
) -> result::Result<Vec<&'out str>, &'out str> {
    let members: HashSet<&str> = runlist.iter().copied().collect();

    let mut result: Vec<&'out str> = Vec::with_capacity(runlist.len());
    let mut used: HashSet<&'out str> = HashSet::new();
    let mut visiting: HashSet<&'out str> = HashSet::new();

    // post-order traversal, so dependencies are pushed before the
    // variables that reference them
    fn add<'a>(
        dependencies: &'a HashMap<Ident, BTreeSet<Ident>>,
        members: &HashSet<&str>,
        result: &mut Vec<&'a str>,
        used: &mut HashSet<&'a str>,
        visiting: &mut HashSet<&'a str>,
        ident: &'a str,
    ) -> result::Result<(), &'a str> {
        if used.contains(ident) {
            return Ok(());
        }
        if !visiting.insert(ident) {
            return Err(ident);
        }
        if let Some(deps) = dependencies.get(ident) {
            for dep in deps.iter() {
                if members.contains(dep.as_str()) {
                    add(dependencies, members, result, used, visiting, dep)?;
                }
            }
        }
        visiting.remove(ident);
        used.insert(ident);
        result.push(ident);
        Ok(())
    }

    for ident in runlist.iter().copied() {
        add(
            dependencies,
            &members,
            &mut result,
            &mut used,
            &mut visiting,
            ident,
        )?;
    }

    Ok(result)
}

#[test]
fn test_topo_sort() {
    let deps: HashMap<Ident, BTreeSet<Ident>> = [
        ("a", vec!["b"]),
        ("b", vec!["c"]),
        ("c", vec![]),
        ("d", vec![]),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
    .collect();

    let sorted = topo_sort(&["a", "d", "b", "c"], &deps).unwrap();
    assert_eq!(vec!["c", "b", "a", "d"], sorted);

    let cyclic: HashMap<Ident, BTreeSet<Ident>> = [("x", vec!["y"]), ("y", vec!["x"])]
        .iter()
        .map(|(k, v)| (k.to_string(), v.iter().map(|s| s.to_string()).collect()))
        .collect();
    assert!(topo_sort(&["x", "y"], &cyclic).is_err());
}

#[test]
fn test_syntax_error_render() {
    let src = "model main {\n\tx = @\n}\n";
    let err = SyntaxError::new(
        Pos {
            offset: 18,
            line: 2,
            col: 6,
        },
        ErrorCode::UnrecognizedChar,
        "unrecognized char: '@'",
    );
    let rendered = err.render("test.boosd", src);
    let lines: Vec<&str> = rendered.lines().collect();
    assert_eq!("test.boosd:2:6: error: unrecognized char: '@'", lines[0]);
    assert_eq!("        x = @", lines[1]);
    assert_eq!("            ^", lines[2]);
}
