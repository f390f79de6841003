use clap::Parser;
use railway::diagnostics;
use railway::runtime;
use railway::runtime::data::{load_data_file, DataFormat};
use railway::runtime::error::RuntimeError;
use railway::runtime::registry::ModuleRegistry;
use railway::runtime::value::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(
    name = "railway",
    version,
    about = "Interpreter for the Railway reversible programming language"
)]
struct Cli {
    /// Program file (.rail)
    #[arg(value_name = "PROGRAM")]
    program: PathBuf,

    /// Push an integer onto argv
    #[arg(short = 'n', value_name = "INT", allow_hyphen_values = true)]
    numbers: Vec<i64>,

    /// Load a file of little-endian f32 values and push the array onto argv
    #[arg(long = "f32", value_name = "FILE")]
    f32_files: Vec<PathBuf>,

    /// Load a file of little-endian f64 values and push the array onto argv
    #[arg(long = "f64", value_name = "FILE")]
    f64_files: Vec<PathBuf>,

    /// Load a file of little-endian i32 values and push the array onto argv
    #[arg(long = "i32", value_name = "FILE")]
    i32_files: Vec<PathBuf>,

    /// Load a file of little-endian i64 values and push the array onto argv
    #[arg(long = "i64", value_name = "FILE")]
    i64_files: Vec<PathBuf>,

    /// Default pool size for parallel calls written as `call f{}(...)`
    #[arg(short = 't', long = "threads", value_name = "N", default_value_t = 1)]
    threads: u32,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let argv = match build_argv(&cli) {
        Ok(argv) => argv,
        Err(err) => {
            diagnostics::report_runtime_error(&err, None);
            return ExitCode::FAILURE;
        }
    };

    let registry = match ModuleRegistry::load(&cli.program) {
        Ok(registry) => Arc::new(registry),
        Err(failure) => {
            diagnostics::report_load_failure(&failure);
            return ExitCode::FAILURE;
        }
    };

    match runtime::run_program(Arc::clone(&registry), argv, cli.threads) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let source = err
                .path
                .as_deref()
                .and_then(|path| registry.sources.get(path).map(|text| (path, text.as_str())));
            diagnostics::report_runtime_error(&err, source);
            ExitCode::FAILURE
        }
    }
}

fn build_argv(cli: &Cli) -> Result<Value, RuntimeError> {
    let mut argv = Vec::new();
    for n in &cli.numbers {
        argv.push(Value::from_i64(*n));
    }
    let files = [
        (DataFormat::F32, &cli.f32_files),
        (DataFormat::F64, &cli.f64_files),
        (DataFormat::I32, &cli.i32_files),
        (DataFormat::I64, &cli.i64_files),
    ];
    for (format, paths) in files {
        for path in paths {
            let array = load_data_file(path, format).map_err(RuntimeError::bare)?;
            argv.push(array);
        }
    }
    Ok(Value::Array(argv))
}
