use std::{fs, path::PathBuf, process::ExitCode};

use clap::Parser;
use doubt::{Runner, StdLog, DEFAULT_INDENT};

/// Interpreter for the doubt language.
#[derive(Parser, Debug)]
#[command(name = "doubt", version, about)]
struct Cli {
    /// Source file to run.
    #[arg(long, default_value = "main.doubt")]
    source: PathBuf,

    /// Whitespace prefix counting as one indentation level.
    #[arg(long, default_value = DEFAULT_INDENT)]
    indent: String,

    /// Arguments passed through to `main` as an array of strings.
    #[arg(trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let path = cli.source.display().to_string();
    let source = match fs::read_to_string(&cli.source) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error: cannot read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    let runner = match Runner::new(&source, &path, &cli.indent) {
        Ok(runner) => runner,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let mut log = StdLog::new();
    match runner.run(&cli.args, &mut log) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            drop(log);
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
