// ABOUTME: CLI entry point: script runner and interactive REPL

use clap::error::ErrorKind;
use clap::Parser;
use orla::config;
use orla::eval::Interpreter;
use orla::lexer;
use orla::parser;
use orla::resolver::Resolver;
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor};
use std::path::{Path, PathBuf};
use std::process;

/// Tree-walking interpreter for the Orla scripting language
#[derive(Parser, Debug)]
#[command(name = "orla")]
#[command(version = config::VERSION)]
#[command(about = "A tree-walking interpreter for the Orla scripting language")]
struct CliArgs {
    /// Script file to execute (optional - if not provided, starts the REPL)
    #[arg(value_name = "FILE")]
    script: Option<PathBuf>,
}

fn main() {
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(error) if matches!(error.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = error.print();
            return;
        }
        Err(error) => {
            let _ = error.print();
            process::exit(1);
        }
    };

    match args.script {
        Some(path) => run_file(&path),
        None => repl(),
    }
}

fn run_file(path: &Path) {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(_) => {
            eprintln!("Could not open file: {}", path.display());
            process::exit(-1);
        }
    };
    let mut interpreter = Interpreter::new();
    run(&source, &mut interpreter);
}

/// Walks one source text through the whole pipeline, reporting stage
/// diagnostics to stderr. Any stage failure stops the run.
fn run(source: &str, interpreter: &mut Interpreter) {
    let tokens = match lexer::scan(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            for error in errors {
                eprintln!("{error}");
            }
            return;
        }
    };
    let statements = match parser::parse(tokens) {
        Ok(statements) => statements,
        Err(errors) => {
            for error in errors {
                eprintln!("{error}");
            }
            return;
        }
    };
    if let Err(errors) = Resolver::new(interpreter).resolve(&statements) {
        for error in errors {
            eprintln!("{error}");
        }
        return;
    }
    if let Err(error) = interpreter.interpret(&statements) {
        eprintln!("{error}");
    }
}

/// Interactive loop sharing one interpreter, so definitions accumulate
/// across lines.
fn repl() {
    let config = Config::builder().auto_add_history(true).build();
    let mut editor = match DefaultEditor::with_config(config) {
        Ok(editor) => editor,
        Err(error) => {
            eprintln!("Failed to initialize REPL: {error}");
            process::exit(1);
        }
    };
    let _ = editor.load_history(config::HISTORY_FILE);

    println!("{}", config::WELCOME_MESSAGE);
    println!("{}", config::WELCOME_SUBTITLE);

    let mut interpreter = Interpreter::new();
    loop {
        match editor.readline(config::PROMPT) {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                run(&line, &mut interpreter);
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                break;
            }
            Err(error) => {
                eprintln!("Error: {error}");
                break;
            }
        }
    }

    let _ = editor.save_history(config::HISTORY_FILE);
}
