#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt::format::FmtSpan};

use cpu_judge::config::{HandlerSection, duration_from_secs};
use cpu_judge::diff::{DiffMode, Differ};
use cpu_judge::engine::{ExecutableConfig, LogisimConfig, MarsConfig, RunSummary, SchedulerConfig, default_workers};
use cpu_judge::judge_cmd::{self, JudgeOptions};
use cpu_judge::trace::{DecodeConfig, RegisterPadding};
use cpu_judge::{JudgeResult, decode_cmd, run_cmd};

#[derive(Parser, Debug)]
#[command(name = "cpu-judge")]
#[command(about = "Differential verification of CPU designs against a reference simulator", long_about = None)]
struct Cli {
    /// Enable verbose logging (or set CPU_JUDGE_LOG)
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Judge a Logisim circuit
    Logisim {
        /// Circuit file holding the CPU
        circuit: PathBuf,
        /// Programs: files, directories or glob patterns
        #[arg(required = true)]
        cases: Vec<String>,
        /// Path to the Logisim jar
        #[arg(long, default_value = "kits/logisim.jar")]
        logisim_path: PathBuf,
        /// Sub-circuit holding the instruction ROM
        #[arg(long)]
        im_circuit_name: Option<String>,
        /// Logisim timeout in seconds
        #[arg(long, default_value_t = 3.0)]
        logisim_timeout: f64,
        #[command(flatten)]
        decode: DecodeArgs,
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Judge a prebuilt ISim testbench executable
    Isim {
        /// Testbench executable (e.g. tb_isim_beh.exe)
        executable: PathBuf,
        /// Programs: files, directories or glob patterns
        #[arg(required = true)]
        cases: Vec<String>,
        #[command(flatten)]
        testbench: TestbenchArgs,
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Judge a testbench executable against a trusted one
    Duet {
        /// Testbench executable under test
        executable: PathBuf,
        /// Trusted testbench executable
        standard: PathBuf,
        /// Programs: files, directories or glob patterns
        #[arg(required = true)]
        cases: Vec<String>,
        #[command(flatten)]
        testbench: TestbenchArgs,
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Run the cases described by a TOML run file
    Run {
        /// Run file
        #[arg(long)]
        config: PathBuf,
    },

    /// Decode circuit bit lines from stdin into trace lines
    Decode {
        #[command(flatten)]
        decode: DecodeArgs,
    },
}

#[derive(Args, Debug)]
struct DecodeArgs {
    /// Width of the PC field
    #[arg(long, default_value_t = 32)]
    pc_width: u32,
    /// PC value the circuit starts at (decimal or 0x-prefixed)
    #[arg(long, default_value = "0", value_parser = parse_number)]
    pc_start: u64,
    /// PC counts words
    #[arg(long)]
    pc_by_word: bool,
    /// Width of the memory write address field
    #[arg(long, default_value_t = 32)]
    dm_address_width: u32,
    /// Memory write address counts words
    #[arg(long)]
    dm_address_by_word: bool,
    /// Render registers as `$ 8` instead of `$08`
    #[arg(long)]
    space_padded_registers: bool,
}

impl DecodeArgs {
    fn to_config(&self) -> DecodeConfig {
        DecodeConfig {
            pc_width: self.pc_width,
            pc_by_word: self.pc_by_word,
            pc_start: self.pc_start,
            dma_width: self.dm_address_width,
            dma_by_word: self.dm_address_by_word,
            register_padding: if self.space_padded_registers { RegisterPadding::Space } else { RegisterPadding::Zero },
        }
    }
}

#[derive(Args, Debug)]
struct TestbenchArgs {
    /// Xilinx ISE install directory
    #[arg(long)]
    ise_path: Option<PathBuf>,
    /// Simulated time per program (e.g. "1000 us", "all")
    #[arg(long, default_value = "1000 us")]
    duration: String,
    /// Testbench timeout in seconds
    #[arg(long, default_value_t = 5.0)]
    tb_timeout: f64,
    /// Also kill every process with the testbench's name on timeout
    #[arg(long)]
    kill_by_name: bool,
}

impl TestbenchArgs {
    fn to_config(&self, executable: PathBuf) -> JudgeResult<ExecutableConfig> {
        let mut config = ExecutableConfig::new(executable).with_duration(&self.duration);
        if let Some(dir) = &self.ise_path {
            config = config.with_ise_dir(dir);
        }
        config.settings.timeout = duration_from_secs(self.tb_timeout)?;
        if self.kill_by_name {
            config.settings.kill_by_name = true;
        }
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Path to the MARS jar
    #[arg(long, default_value = "kits/mars.jar")]
    mars_path: PathBuf,
    /// Java executable
    #[arg(long, default_value = "java")]
    java_path: PathBuf,
    /// Comparison command line (defaults to diff, or fc on Windows)
    #[arg(long)]
    diff_path: Option<String>,
    /// Accept a candidate trace that is a prefix of the reference, or vice versa
    #[arg(long)]
    prefix: bool,
    /// Keep trace files of passed programs
    #[arg(long)]
    keep_output_files: bool,
    /// Simulate delayed branching in MARS
    #[arg(long)]
    db: bool,
    /// Reject pseudo instructions in MARS
    #[arg(long)]
    np: bool,
    /// MARS timeout in seconds
    #[arg(long, default_value_t = 3.0)]
    mars_timeout: f64,
    /// Do not append an infinite loop to program images
    #[arg(long)]
    no_infinite_loop_appendix: bool,
    /// Dump each program's exception handler
    #[arg(long)]
    handler_per_program: bool,
    /// Handler program used when a program has none, or for every program
    #[arg(long)]
    handler: Option<PathBuf>,
    /// Number of workers (defaults to 3/4 of the CPUs)
    #[arg(long, short = 'j')]
    workers: Option<usize>,
    /// Keep running after a failed program
    #[arg(long)]
    no_stop_on_error: bool,
    /// Exit immediately on the first failed program
    #[arg(long)]
    kill_on_error: bool,
    /// Scratch directory for traces and worker slots
    #[arg(long, default_value = "tmp")]
    run_dir: PathBuf,
    /// Pass cache; programs listed here are skipped
    #[arg(long)]
    passes: Option<PathBuf>,
    /// Append one JSON record per program to this file
    #[arg(long)]
    log: Option<PathBuf>,
    /// Export this run's records as CSV
    #[arg(long)]
    csv: Option<PathBuf>,
}

impl CommonArgs {
    fn to_options(self, cases: Vec<String>) -> JudgeResult<JudgeOptions> {
        let mars = MarsConfig::new(self.mars_path)
            .with_java(self.java_path)
            .with_delayed_branching(self.db)
            .with_no_pseudo(self.np)
            .with_timeout(duration_from_secs(self.mars_timeout)?);

        let mut differ = Differ::new()
            .with_mode(if self.prefix { DiffMode::Prefix } else { DiffMode::Exact })
            .keep_output_files(self.keep_output_files);
        if let Some(cmd) = &self.diff_path {
            differ = differ.with_command(cmd)?;
        }

        let handler = HandlerSection { per_program: self.handler_per_program, fallback: self.handler }.to_source();
        let scheduler = SchedulerConfig::default()
            .with_workers(self.workers.unwrap_or_else(default_workers))
            .with_run_dir(self.run_dir)
            .stop_on_error(!self.no_stop_on_error)
            .kill_on_error(self.kill_on_error);

        Ok(JudgeOptions {
            cases,
            mars,
            differ,
            appendix: !self.no_infinite_loop_appendix,
            handler,
            scheduler,
            passes: self.passes,
            log: self.log,
            csv: self.csv,
        })
    }
}

fn parse_number(s: &str) -> Result<u64, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number {s:?}: {e}"))
}

fn init_tracing(verbose: bool) {
    let env = std::env::var("CPU_JUDGE_LOG").unwrap_or_else(|_| {
        if verbose { "cpu_judge=debug".to_string() } else { "cpu_judge=info".to_string() }
    });
    let _ = tracing_subscriber::fmt()
        .with_span_events(FmtSpan::ACTIVE)
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_env_filter(EnvFilter::new(env))
        .try_init();
}

/// Returns whether every judged program passed.
fn dispatch(command: Commands) -> anyhow::Result<bool> {
    let summary: RunSummary = match command {
        Commands::Logisim { circuit, cases, logisim_path, im_circuit_name, logisim_timeout, decode, common } => {
            let opts = common.to_options(cases)?;
            let mut config = LogisimConfig::new(circuit, logisim_path)
                .with_java(&opts.mars.java)
                .with_decode(decode.to_config());
            if let Some(name) = im_circuit_name {
                config = config.with_im_circuit(name);
            }
            config.settings.timeout = duration_from_secs(logisim_timeout)?;
            judge_cmd::run_logisim(opts, config)?
        }
        Commands::Isim { executable, cases, testbench, common } => {
            let opts = common.to_options(cases)?;
            judge_cmd::run_isim(opts, testbench.to_config(executable)?)?
        }
        Commands::Duet { executable, standard, cases, testbench, common } => {
            let opts = common.to_options(cases)?;
            judge_cmd::run_duet(opts, testbench.to_config(executable)?, testbench.to_config(standard)?)?
        }
        Commands::Run { config } => run_cmd::run(&config)?,
        Commands::Decode { decode } => {
            let stdin = std::io::stdin();
            decode_cmd::run(&decode.to_config(), stdin.lock(), std::io::stdout().lock())?;
            return Ok(true);
        }
    };
    Ok(summary.is_success())
}

fn main() {
    color_eyre::install().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match dispatch(cli.command) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("{:#}", e);
            std::process::exit(1);
        }
    }
}
