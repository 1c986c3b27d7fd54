use std::{env, fs};

use tracing_subscriber::EnvFilter;

use sirc::bytecode::disasm::{print_bc, print_bc_stats};
use sirc::frontend::token_dumper::TokenDumper;
use sirc::frontend::{Lexer, Parser};
use sirc::{CompilerOptions, compile};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("SIRC_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return;
    }

    let tokens_only = args.contains(&"--tokens".to_string());
    let no_color = args.contains(&"--no-color".to_string());
    let pretty = args.contains(&"--pretty".to_string());
    let ast = args.contains(&"--ast".to_string());
    let bytecode = args.contains(&"--bc".to_string()) || args.contains(&"--bytecode".to_string());
    let debug_info = args.contains(&"--debug-info".to_string());
    let no_bounds = args.contains(&"--no-bounds-check".to_string());

    let mut options = CompilerOptions::default()
        .with_debug_info(debug_info)
        .with_bounds_checking(!no_bounds);
    for arg in args.iter().skip(1) {
        if let Some(level) = arg.strip_prefix("-O") {
            match level.parse() {
                Ok(level) => options = options.with_level(level),
                Err(_) => {
                    eprintln!("Error: invalid optimization level '{}'", arg);
                    std::process::exit(2);
                }
            }
        }
    }

    // first non-flag argument is the filename
    let Some(filename) = args.iter().skip(1).find(|a| !a.starts_with('-')) else {
        print_usage();
        std::process::exit(2);
    };

    let source = match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            std::process::exit(1);
        }
    };

    if tokens_only {
        dump_tokens(&source, no_color, pretty);
    } else if ast {
        dump_ast(&source);
    } else {
        compile_file(&source, &options, bytecode);
    }
}

fn print_usage() {
    println!("sirc - stack IR to contract bytecode compiler");
    println!();
    println!("Usage:");
    println!("  sirc <file>                 Compile and print a summary");
    println!("  sirc --tokens <file>        Show tokens only (--no-color, --pretty)");
    println!("  sirc --ast <file>           Show the parsed tree");
    println!("  sirc --bc <file>            Show the disassembled bytecode");
    println!("  sirc -O<0..3> <file>        Set the optimization level (default 1)");
    println!("  sirc --debug-info <file>    Attach source maps to the artifact");
    println!("  sirc --no-bounds-check      Skip run-time memory offset checks");
    println!();
    println!("Set SIRC_LOG (e.g. SIRC_LOG=debug) to trace the pipeline.");
}

fn dump_tokens(source: &str, no_color: bool, pretty: bool) {
    match Lexer::new(source).tokenize() {
        Ok(tokens) => {
            let mut dumper = TokenDumper::new();
            if no_color {
                dumper = dumper.no_color();
            }
            if pretty {
                dumper = dumper.pretty();
            }
            dumper.dump(&tokens);
        }
        Err(e) => {
            eprintln!("Lexer error: {}", e);
            std::process::exit(1);
        }
    }
}

fn dump_ast(source: &str) {
    let tokens = match Lexer::new(source).tokenize() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Lexer error: {}", e);
            std::process::exit(1);
        }
    };
    match Parser::new(tokens).parse() {
        Ok(object) => println!("{:#?}", object),
        Err(e) => {
            eprintln!("Parse error: {}", e);
            std::process::exit(1);
        }
    }
}

fn compile_file(source: &str, options: &CompilerOptions, bytecode: bool) {
    match compile(source, options) {
        Ok(compilation) => {
            for diagnostic in &compilation.diagnostics {
                eprintln!("{}", diagnostic);
            }
            if bytecode {
                print_bc(&compilation.artifact);
            }
            print_bc_stats(&compilation.artifact);
        }
        Err(failure) => {
            for diagnostic in &failure.diagnostics {
                eprintln!("{}", diagnostic);
            }
            eprintln!("{}", failure);
            std::process::exit(1);
        }
    }
}
