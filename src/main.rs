// Copyright 2026 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::io::{self, Read, Write};

use clap::Parser;

use boosd::compiler::pretty::pretty_equations;
use boosd::model::Project;
use boosd::parser::parse;
use boosd::{eprintln, Error};

const EXIT_FAILURE: i32 = 1;

macro_rules! die(
    ($($arg:tt)*) => { {
        eprintln!($($arg)*);
        std::process::exit(EXIT_FAILURE)
    } }
);

/// Compile and simulate stock and flow models.
#[derive(Parser, Debug)]
#[command(name = "boosd", version, about, long_about = None)]
struct Args {
    /// model source; standard input when absent
    path: Option<String>,

    /// model to simulate
    #[arg(short, long, default_value = "main")]
    model: String,

    /// instance name used to qualify reported variables
    #[arg(short, long)]
    instance: Option<String>,

    /// print the synthesized equations instead of simulating
    #[arg(long)]
    equations: bool,

    /// with --equations, print the equations as JSON
    #[arg(long)]
    json: bool,
}

fn read_source(path: Option<&str>) -> io::Result<(String, String)> {
    let mut source = String::new();
    match path {
        Some(path) => {
            source = std::fs::read_to_string(path)?;
            Ok((path.to_string(), source))
        }
        None => {
            io::stdin().read_to_string(&mut source)?;
            Ok(("<stdin>".to_string(), source))
        }
    }
}

fn run(args: &Args, project: &Project) -> Result<(), Error> {
    if args.equations {
        let stdout = io::stdout();
        let mut out = stdout.lock();
        for model in project.models() {
            if args.json {
                let json = serde_json::to_string_pretty(model.as_ref())
                    .unwrap_or_else(|err| die!("error: serializing '{}': {}", model.name, err));
                let _ = writeln!(out, "{json}");
            } else {
                let _ = writeln!(out, "model {}", model.name);
                let _ = write!(out, "{}", pretty_equations(&model.equations));
            }
        }
        return Ok(());
    }

    let instance = args.instance.as_deref().unwrap_or(&args.model);
    let mut sim = project.instantiate(&args.model, instance)?;
    sim.run_to_end()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(err) = sim.results().write_tsv(&mut out) {
        die!("error: writing results: {}", err);
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    let (filename, source) = match read_source(args.path.as_deref()) {
        Ok(input) => input,
        Err(err) => die!("error: reading input: {}", err),
    };

    let (file, error_count) = parse(&source);
    if error_count > 0 {
        for err in file.errors.iter() {
            eprintln!("{}", err.render(&filename, &source));
        }
        die!("{}: {} syntax error(s)", filename, error_count);
    }

    let project = match Project::new(&file) {
        Ok(project) => project,
        Err(err) => die!("{}: {}", filename, err),
    };

    if let Err(err) = run(&args, &project) {
        die!("{}: {}", filename, err);
    }
}
