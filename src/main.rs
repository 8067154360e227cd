use std::fs;
use std::io::Write as _;
use std::process;
use std::time::Instant;

use clap::Parser;
use colored::Colorize;

use bfopt::backend::{assembly, llvm};
use bfopt::ir::lower;
use bfopt::jit;
use bfopt::lexer::Lexer;
use bfopt::optimizer::optimize;
use bfopt::{CompileError, Settings};

/// Optimizing compiler/JIT for the eight-symbol tape language
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The program file to compile
    file: String,

    /// Output destination, standard output when absent
    #[arg(short, long)]
    output: Option<String>,

    /// Rewrite simple multiply-add loops
    #[arg(long, default_value = "true", value_parser = parse_bool, action = clap::ArgAction::Set)]
    simplify_loops: bool,

    /// Rewrite pointer-walk loops into vector scans
    #[arg(long, default_value = "true", value_parser = parse_bool, action = clap::ArgAction::Set)]
    vectorize_mem_scans: bool,

    /// Coalesce runs of moves and increments
    #[arg(long, default_value = "true", value_parser = parse_bool, action = clap::ArgAction::Set)]
    run_inst_combine: bool,

    /// Execute the input-free prefix at compile time
    #[arg(long, default_value = "true", value_parser = parse_bool, action = clap::ArgAction::Set)]
    partial_eval: bool,

    /// Compile to memory and run immediately instead of emitting text
    #[arg(long, default_value = "false", value_parser = parse_bool, action = clap::ArgAction::Set)]
    just_in_time: bool,

    /// Emit a structured SSA module instead of assembly
    #[arg(long, default_value = "false", value_parser = parse_bool, action = clap::ArgAction::Set)]
    llvm: bool,

    /// Print phase timings to standard error
    #[arg(short, long)]
    verbose: bool,
}

fn parse_bool(arg: &str) -> Result<bool, String> {
    match arg.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(format!("unable to parse boolean {}", other)),
    }
}

fn run(args: Args) -> Result<(), CompileError> {
    let text = fs::read_to_string(&args.file)?;

    let now = Instant::now();
    let ops = Lexer::new(&text).collect_ops()?;
    let instrs = lower(&ops);
    if args.verbose {
        eprintln!("{} {:.2?}", "Finished lowering in".green(), now.elapsed());
    }

    // neither in-memory back end supports scans
    let settings = Settings {
        simplify_loops: args.simplify_loops,
        vectorize_mem_scans: args.vectorize_mem_scans && !args.just_in_time && !args.llvm,
        run_inst_combine: args.run_inst_combine,
        partial_eval: args.partial_eval,
    };

    let now = Instant::now();
    let instrs = optimize(instrs, &settings);
    if args.verbose {
        eprintln!("{} {:.2?}", "Finished optimizing in".green(), now.elapsed());
    }

    if args.just_in_time {
        let now = Instant::now();
        jit::execute(&instrs)?;
        if args.verbose {
            eprintln!("{} {:.2?}", "Finished jit run in".green(), now.elapsed());
        }
        return Ok(());
    }

    let program = if args.llvm {
        llvm::compile(&instrs)?
    } else {
        assembly::compile(&instrs)?
    };

    match &args.output {
        Some(path) => fs::write(path, program)?,
        None => std::io::stdout().write_all(program.as_bytes())?,
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("{0:}: {1:}", "Error".red(), e);
        process::exit(1);
    }
}
