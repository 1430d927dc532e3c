use std::ffi::c_void;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::{Parser, Subcommand, ValueEnum};
use faultline_core::delivery::{profiling_signal, send_signal_to_thread, WAKEUP_SIGNAL};
use faultline_core::error::FaultlineError;
use faultline_core::recovery::{enable_fault_recovery, fault_stats, install_signal_handler};
use faultline_core::registry::{chain_of, installed_action, siginfo_t};
use faultline_core::safe_access::{load, load32, load_ptr, LOAD_RECOVERABLE, NATIVE_LOAD_SITES};
use faultline_core::stress::{self, StressConfig};
use faultline_core::types::{Address, Architecture, SamplingMode, Signal, ThreadId};
use faultline_core::verify::{self_check, verify_artifact};
use faultline_utils::{info, init_logging_with, LogConfig, LogFormat, LogLevel};

static DELIVERED: AtomicU64 = AtomicU64::new(0);

/// Crash-safe memory loads for signal-driven sampling profilers.
#[derive(Parser, Debug)]
#[command(name = "faultline")]
#[command(version)]
#[command(about = "Inspect and exercise the faultline crash-safe memory access core", long_about = None)]
struct Cli
{
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log format: pretty or json (overrides FAULTLINE_LOG_FORMAT)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Verify the load sites against the instruction decoder
    Check
    {
        /// Also verify the load sites stored in this binary
        #[arg(long)]
        artifact: Option<PathBuf>,
    },
    /// Perform one protected load with fault recovery enabled
    Probe
    {
        /// Address to read (hex with 0x prefix, or decimal)
        address: Address,
        /// Load width; omit for the null-on-fault pointer load
        #[arg(long, value_enum)]
        width: Option<Width>,
        /// Value returned if the load faults (for --width 32 or ptr)
        #[arg(long, default_value_t = 0)]
        default: u64,
    },
    /// Show the signals chosen for sampling and the handler chains
    Signals,
    /// Deliver a signal to one thread of this process
    Send
    {
        /// Kernel thread ID (Linux) or Mach thread port (macOS)
        tid: u64,
        /// Signal number or name (e.g. 27, SIGPROF, prof)
        signal: Signal,
    },
    /// Race a list mutator against protected loads and report fault statistics
    Stress
    {
        /// Number of list walks
        #[arg(short, long, default_value_t = 10_000)]
        iterations: u64,
        /// Number of nodes kept mapped by the mutator
        #[arg(long, default_value_t = 4)]
        depth: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Width
{
    /// 32-bit load with default
    #[value(name = "32")]
    Word,
    /// Pointer load with default
    Ptr,
}

fn main()
{
    let cli = Cli::parse();

    let config = match LogConfig::from_env() {
        Ok(config) => config.with_overrides(cli.log_level, cli.log_format),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };
    let _guard = match init_logging_with(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run_command(cli.command) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Commands) -> Result<(), Box<dyn std::error::Error>>
{
    match command {
        Commands::Check { artifact } => {
            let report = self_check()?;
            print!("{report}");

            if let Some(path) = artifact {
                let artifact_report = verify_artifact(&path)?;
                print!("{artifact_report}");
                artifact_report.ensure_recoverable()?;
            }
            report.ensure_recoverable()?;

            if !LOAD_RECOVERABLE {
                println!("Note: {} has no register access in the signal context; every fault is forwarded", Architecture::current());
            } else if !NATIVE_LOAD_SITES {
                println!("Note: {} uses the generic fallback; only `load` faults are recovered", Architecture::current());
            }
            Ok(())
        }
        Commands::Probe { address, width, default } => {
            enable_fault_recovery()?;
            info!("Probing {} ({:?})", address, width);

            match width {
                None => {
                    let value = load(address.as_ptr());
                    println!("load({address}) = {value:p}");
                }
                Some(Width::Word) => {
                    let default = u32::try_from(default).map_err(|_| format!("default {default} does not fit in 32 bits"))?;
                    let value = load32(address.as_ptr(), default);
                    println!("load32({address}, {default:#x}) = {value:#x}");
                }
                Some(Width::Ptr) => {
                    let default = usize::try_from(default).map_err(|_| format!("default {default} is not a pointer"))? as *mut c_void;
                    let value = load_ptr(address.as_ptr(), default);
                    println!("load_ptr({address}, {default:p}) = {value:p}");
                }
            }

            let stats = fault_stats();
            println!("recovered faults: {}, forwarded faults: {}", stats.recovered, stats.forwarded);
            Ok(())
        }
        Commands::Signals => {
            for mode in SamplingMode::ALL {
                println!("{:<6} sampling: {}", mode, profiling_signal(mode));
            }
            println!("wakeup:          {WAKEUP_SIGNAL}");

            for signal in Signal::FAULT_SIGNALS {
                let chain = chain_of(signal);
                if chain.is_empty() {
                    println!("{signal}: no handlers installed through faultline");
                } else {
                    let entries: Vec<String> = chain.iter().map(ToString::to_string).collect();
                    println!("{signal}: {}", entries.join(" <- "));
                }
            }
            Ok(())
        }
        Commands::Send { tid, signal } => {
            // A thread of this process with no handler would die of the signal.
            if installed_action(signal).is_none() {
                install_signal_handler(signal, count_siginfo, Some(count_signal))?;
            }

            let thread = ThreadId::from(tid);
            match send_signal_to_thread(thread, signal) {
                Ok(()) => println!("{signal} delivered to thread {thread}"),
                Err(FaultlineError::ThreadGone(_)) => println!("thread {thread} is gone; no signal delivered"),
                Err(e) => return Err(e.into()),
            }
            println!("handler invocations: {}", DELIVERED.load(Ordering::Relaxed));
            Ok(())
        }
        Commands::Stress { iterations, depth } => {
            let report = stress::run(StressConfig { iterations, depth })?;
            println!("walks:            {}", report.iterations);
            println!("protected loads:  {}", report.loads);
            println!("defaults:         {}", report.defaults);
            println!("unexpected:       {}", report.unexpected);
            println!("nodes unmapped:   {}", report.unmapped);
            println!("recovered faults: {}", report.recovered_faults);
            println!("elapsed:          {:?}", report.elapsed);
            Ok(())
        }
    }
}

extern "C" fn count_signal(_signo: i32)
{
    DELIVERED.fetch_add(1, Ordering::Relaxed);
}

extern "C" fn count_siginfo(signo: i32, _info: *mut siginfo_t, _ucontext: *mut c_void)
{
    count_signal(signo);
}
