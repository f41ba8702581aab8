//! Assembles and runs a microwave register machine program.
//!
//! Usage: `mwrun [program.mwasm] [--steps N] [--time N] [--power N]`
//! or `mwrun --song [song.song]` to compile a song first.

use std::{fmt::Write, fs, io, path::PathBuf, process};

use clap::Parser;
use mwasm::{Assembly, ResolveOptions};
use mwvm::{Reason, Registers, Termination, VirtMachine};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

mod diagnostic;

//

const ADD_DEMO: &str = include_str!("../../../demos/add.mwasm");
const SONG_DEMO: &str = include_str!("../../../demos/twinkle.song");

#[derive(Parser, Debug)]
#[command(name = "mwrun")]
#[command(about = "Assemble and run a two register microwave program (.mwasm)")]
struct Args {
    /// Program to run. Without one the ADD demo runs with TIME=3 and POWER=2
    path: Option<PathBuf>,

    /// The input is a song (`C4/4 R/8 ...`), compile it to a program first
    #[arg(long)]
    song: bool,

    /// Give up after this many instructions
    #[arg(long)]
    steps: Option<usize>,

    /// Initial value of TIME
    #[arg(long, allow_negative_numbers = true)]
    time: Option<i32>,

    /// Initial value of POWER
    #[arg(long, allow_negative_numbers = true)]
    power: Option<i32>,

    /// Match labels case-insensitively
    #[arg(long)]
    fold_label_case: bool,

    /// Print the resolved program before running it
    #[arg(long)]
    listing: bool,

    /// Treat running off the end of the program as an error
    #[arg(long)]
    require_halt: bool,
}

/// `RUST_LOG` overrides the default filter. Logs go to stderr, program output to stdout.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,mwrun=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn main() {
    init_logging();

    let args = Args::parse();

    let (name, source, defaults) = match &args.path {
        Some(path) => match fs::read_to_string(path) {
            Ok(source) => (path.display().to_string(), source, Registers::default()),
            Err(e) => {
                error!("Error reading file '{}': {}", path.display(), e);
                process::exit(1);
            }
        },
        None if args.song => {
            info!("no song given, playing the demo");
            ("<song demo>".to_owned(), SONG_DEMO.to_owned(), Registers::default())
        }
        None => {
            info!("no program given, running the ADD demo");
            ("<add demo>".to_owned(), ADD_DEMO.to_owned(), Registers::new(3, 2))
        }
    };

    let source = if args.song {
        match mwsong::compile(&source) {
            Ok(asm) => asm,
            Err(err) => {
                eprintln!("error: {err}\n --> {name}:{}", err.line());
                process::exit(1);
            }
        }
    } else {
        source
    };

    let options = ResolveOptions {
        fold_label_case: args.fold_label_case,
    };
    let (program, labels) =
        match Assembly::parse(&source).and_then(|asm| asm.resolve_with(&options)) {
            Ok(resolved) => resolved,
            Err(err) => {
                eprint!("{}", diagnostic::render(&name, &source, &err));
                process::exit(1);
            }
        };
    info!("Loaded {} ({} instructions)", name, program.len());

    if args.listing {
        print!("{}", program.listing(&labels));
    }

    let mut vm = VirtMachine::new();
    vm.set_fuel(args.steps);
    vm.set_registers(Registers::new(
        args.time.unwrap_or(defaults.time),
        args.power.unwrap_or(defaults.power),
    ));
    let result = vm.run(&program);

    let (text, failed) = report(&result, args.require_halt);
    print!("{text}");

    if failed {
        if let Err(err) = result.halted() {
            error!("{err} after {} steps", err.termination().steps);
        }
        process::exit(1);
    }
}

/// Renders what a finished run printed and whether the exit status should be 1.
///
/// Running out of steps always fails. Running off the end only fails when a `HALT` is required.
fn report(result: &Termination, require_halt: bool) -> (String, bool) {
    let mut out = String::new();
    for value in result.outputs.iter() {
        _ = writeln!(&mut out, "TIME: {value}");
    }
    if result.reason == Reason::Halted {
        _ = writeln!(&mut out, "BEEEEEEP!");
    }
    _ = writeln!(&mut out, "Final state: {}", result.registers);

    let failed = match result.reason {
        Reason::Halted => false,
        Reason::StepLimitExceeded => true,
        Reason::FellOffEnd => require_halt,
    };
    (out, failed)
}

//
