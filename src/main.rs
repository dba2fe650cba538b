#[macro_use]
extern crate tracing;

mod bytecode;
mod codegen;
mod container;
mod lexer;
mod mips;
mod output;
mod syntax;
mod trace;

use std::fs;
use std::io;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::process;
use structopt::StructOpt;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;

use crate::bytecode::Program;
use crate::codegen::Layout;
use crate::output::Artifacts;

#[derive(Debug, StructOpt)]
#[structopt(about = "Translates stack machine bytecode into MIPS32 machine code")]
struct Options {
    /// The program to translate: a binary container, or mnemonics with `--text`.
    input: PathBuf,

    /// Read the input as textual mnemonics instead of a binary container.
    #[structopt(long)]
    text: bool,

    /// Address of the first emitted word (hex with `0x`, or decimal).
    #[structopt(long, default_value = "0x00400000", parse(try_from_str = parse_address))]
    text_base: u32,

    /// Initial value of the stack pointer (hex with `0x`, or decimal).
    #[structopt(long, default_value = "0x7FFFEFFC", parse(try_from_str = parse_address))]
    stack_top: u32,

    /// Print the translation passes as a tree on stderr.
    #[structopt(long)]
    trace: bool,
}

#[derive(Debug, Error)]
#[error("failed to read {}", path.display())]
struct ReadError {
    path: PathBuf,
    #[source]
    source: io::Error,
}

impl ReadError {
    fn at(path: &Path) -> impl FnOnce(io::Error) -> ReadError + '_ {
        move |source| ReadError {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn parse_address(text: &str) -> Result<u32, ParseIntError> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => text.parse(),
    }
}

fn main() {
    let options = Options::from_args();

    let _guard = if options.trace {
        let subscriber = tracing_subscriber::Registry::default().with(trace::Tree::new(2));
        Some(tracing::subscriber::set_default(subscriber))
    } else {
        None
    };

    if let Err(e) = run(&options) {
        eprint!("Error: {}", e);
        let mut source = e.source();
        while let Some(inner) = source {
            eprint!(": {}", inner);
            source = inner.source();
        }
        eprintln!();
        process::exit(1);
    }
}

fn run(options: &Options) -> Result<(), Box<dyn std::error::Error>> {
    let layout = Layout::new(options.text_base, options.stack_top)?;
    let program = load(options)?;

    let image = codegen::translate(&program, &layout);
    debug!(
        "entry function at {:#010x}",
        image.addresses.address(program.entry())
    );

    let artifacts = Artifacts::for_input(&options.input)?;
    artifacts.write(&image.words)?;

    println!("{}", artifacts.hex.display());
    println!("{}", artifacts.bin.display());

    Ok(())
}

fn load(options: &Options) -> Result<Program, Box<dyn std::error::Error>> {
    if options.text {
        let source = fs::read_to_string(&options.input).map_err(ReadError::at(&options.input))?;
        let tokens = lexer::tokenize(&source).map_err(|e| nom::error::convert_error(&source, e))?;
        let program = syntax::parse(&tokens).map_err(|e| e.format(&source))?;
        Ok(program)
    } else {
        let bytes = fs::read(&options.input).map_err(ReadError::at(&options.input))?;
        let program = container::decode(&bytes)?;
        Ok(program)
    }
}
