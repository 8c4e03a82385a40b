//! `harness info` / `harness run`: a thin command-line driver over the
//! library's programmatic API, using `argh` for subcommand dispatch —
//! the one CLI-parsing crate the source pack actually exercises.

use std::process::ExitCode;

use argh::FromArgs;
use ht::Backend;

#[derive(FromArgs)]
/// Inspect the host system or run a compiled kernel.
struct TopLevel {
    /// enable verbose (debug-level) logging
    #[argh(switch, short = 'v')]
    verbose: bool,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Info(InfoArgs),
    Run(RunArgs),
}

#[derive(FromArgs)]
/// Print the detected system snapshot as JSON.
#[argh(subcommand, name = "info")]
struct InfoArgs {}

#[derive(FromArgs)]
/// Load a compiled kernel, dispatch it once, and print its timing.
#[argh(subcommand, name = "run")]
struct RunArgs {
    /// kernel name, used to locate `<kernel>-<profile>.<ext>`
    #[argh(positional)]
    kernel: String,

    /// backend to use (cuda, vulkan, cpu); defaults to the first available
    #[argh(option)]
    backend: Option<String>,

    /// device index within the chosen backend
    #[argh(option, default = "0")]
    device: usize,

    /// compute-capability / shader profile tag
    #[argh(option, default = "String::from(\"default\")")]
    profile: String,

    /// bytecode target extension override (ptx or spirv); inferred from the
    /// chosen backend otherwise
    #[argh(option)]
    target: Option<String>,
}

fn main() -> ExitCode {
    let args: TopLevel = argh::from_env();

    let level = if args.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new().filter_level(level).format_timestamp(None).init();

    let result = match args.command {
        Command::Info(_) => run_info(),
        Command::Run(run_args) => run_kernel(run_args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("error: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run_info() -> Result<(), String> {
    let mut env = hc::HarnessEnvironment::new();
    let snapshot = env.snapshot();
    let json = serde_json::to_string_pretty(snapshot).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}

fn resolve_backend(harness: &mut harness::Harness, requested: Option<&str>) -> Result<Backend, String> {
    match requested {
        Some(name) => Backend::from_str(name).map_err(|e| e.message),
        None => {
            let available = harness.available_backends();
            Backend::default_preference_order()
                .iter()
                .copied()
                .find(|b| available.contains(b))
                .ok_or_else(|| "no backend is available on this system".to_string())
        }
    }
}

fn default_target_extension(backend: Backend) -> &'static str {
    match backend {
        Backend::Cuda => "ptx",
        Backend::Vulkan => "spirv",
        Backend::Cpu => "bin",
    }
}

fn run_kernel(args: RunArgs) -> Result<(), String> {
    let mut harness = harness::Harness::new();
    let backend = resolve_backend(&mut harness, args.backend.as_deref())?;
    let target = args.target.clone().unwrap_or_else(|| default_target_extension(backend).to_string());

    let bytecode_path = format!("{}-{}.{}", args.kernel, args.profile, target);
    let bytecode = std::fs::read(&bytecode_path).map_err(|e| format!("failed to read '{bytecode_path}': {e}"))?;

    let mut kernel = harness.open(backend, args.device).map_err(|e| e.message)?;
    kernel.load(&bytecode, &args.kernel).map_err(|e| e.message)?;
    kernel.dispatch(1, 1, 1).map_err(|e| e.message)?;
    kernel.wait().map_err(|e| e.message)?;

    match kernel.last_timing() {
        Some(timing) => println!("{timing:#?}"),
        None => println!("dispatch completed; no timing sample available"),
    }
    Ok(())
}
