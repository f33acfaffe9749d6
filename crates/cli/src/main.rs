use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};
use patchdiff::commands::{
    ingest_command, load_config, run_command, stage_command, verify_command,
};
use patchdiff::logging::{init_tracing, LogFormat};
use patchdiff::{exit_code, render_error};
use patchdiff_core::config::{
    ConfigOverrides, DecompileBackendKind, DiffBackendKind, ProviderKind, ReportFormat,
};
use patchdiff_core::stages::Stage;

/// Exit code for unparsable command lines.
const USAGE_EXIT: u8 = 10;

/// Provenance-tracked patch-diff pipeline for a pair of native binaries.
///
/// This CLI is a thin wrapper around `patchdiff-core`. All substantive logic
/// lives in the library so it can be tested thoroughly and reused.
#[derive(Parser, Debug)]
#[command(name = "patchdiff", version, about = "Patch-diff analysis pipeline", long_about = None)]
struct Cli {
    /// YAML config file. Defaults to $PATCHDIFF_CONFIG, then ~/.patchdiff/config.yaml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter (e.g. `debug`, `patchdiff_core=trace`). Defaults to $PATCHDIFF_LOG_LEVEL, then `info`.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct Inputs {
    /// Binary A (e.g. before the patch).
    #[arg(long)]
    a: String,

    /// Binary B (e.g. after the patch).
    #[arg(long)]
    b: String,

    /// Job directory to create or reuse.
    #[arg(long)]
    out: String,

    /// Free-form label stored in the job record.
    #[arg(long)]
    tag: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct JobArg {
    /// Job directory created by `ingest`.
    #[arg(long)]
    job: String,
}

#[derive(Args, Debug, Clone, Default)]
struct DiffOpts {
    /// Function-matching backend (symbols, rizin).
    #[arg(long = "backend")]
    backend: Option<DiffBackendKind>,
}

// `--decompiler` rather than `--backend`: `run` also flattens the diff backend flag.
#[derive(Args, Debug, Clone, Default)]
struct DecompileOpts {
    /// Decompiler backend (ghidra, rizin).
    #[arg(long = "decompiler")]
    decompiler: Option<DecompileBackendKind>,
}

#[derive(Args, Debug, Clone, Default)]
struct AnalyzeOpts {
    /// Analysis provider (local, command).
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Model name passed to the provider.
    #[arg(long)]
    model: Option<String>,

    /// Provider rounds per candidate.
    #[arg(long)]
    max_rounds: Option<u32>,
}

#[derive(Args, Debug, Clone, Default)]
struct ReportOpts {
    /// Report format (markdown, json).
    #[arg(long)]
    format: Option<ReportFormat>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Identify both binaries and create the job record.
    Ingest {
        #[command(flatten)]
        inputs: Inputs,
    },

    /// Summarize both containers (sections, hints, build ids).
    Normalize {
        #[command(flatten)]
        job: JobArg,
    },

    /// Pair functions across A and B.
    Diff {
        #[command(flatten)]
        job: JobArg,
        #[command(flatten)]
        opts: DiffOpts,
        /// Timeout in seconds for each backend tool invocation.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Score and order function pairs.
    Rank {
        #[command(flatten)]
        job: JobArg,
        /// Keep at most this many candidates.
        #[arg(long)]
        top: Option<usize>,
    },

    /// Decompile both sides of the top ranked candidates.
    Decompile {
        #[command(flatten)]
        job: JobArg,
        /// Decompiler backend (ghidra, rizin).
        #[arg(long)]
        backend: Option<DecompileBackendKind>,
        /// Decompile at most this many candidates.
        #[arg(long)]
        top: Option<usize>,
        /// Timeout in seconds for each decompiler invocation.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Run the analysis provider over every ranked candidate.
    Analyze {
        #[command(flatten)]
        job: JobArg,
        #[command(flatten)]
        opts: AnalyzeOpts,
    },

    /// Check analysis records against their evidence.
    Validate {
        #[command(flatten)]
        job: JobArg,
    },

    /// Write the final report.
    Report {
        #[command(flatten)]
        job: JobArg,
        #[command(flatten)]
        opts: ReportOpts,
    },

    /// Run every stage from ingest to report.
    Run {
        #[command(flatten)]
        inputs: Inputs,
        #[command(flatten)]
        diff: DiffOpts,
        #[command(flatten)]
        decompile: DecompileOpts,
        #[command(flatten)]
        analyze: AnalyzeOpts,
        #[command(flatten)]
        report: ReportOpts,
        /// Keep at most this many ranked candidates.
        #[arg(long)]
        top: Option<usize>,
        /// Timeout in seconds for each external tool invocation.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Re-hash every artifact envelope and cross-check the provenance index.
    Verify {
        #[command(flatten)]
        job: JobArg,
        /// Emit the verification report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(USAGE_EXIT),
            };
        }
    };

    init_tracing(cli.log_level.as_deref(), cli.log_format);

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", render_error(&err));
            ExitCode::from(u8::try_from(exit_code(&err)).unwrap_or(1))
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Ingest { inputs } => {
            let config = load_config(config_path, ConfigOverrides::default())?;
            ingest_command(&config, &inputs.a, &inputs.b, &inputs.out, inputs.tag)
        }
        Command::Normalize { job } => {
            let config = load_config(config_path, ConfigOverrides::default())?;
            stage_command(&config, &job.job, Stage::Normalize)
        }
        Command::Diff { job, opts, timeout } => {
            let overrides = ConfigOverrides {
                diff_backend: opts.backend,
                timeout_secs: timeout,
                ..Default::default()
            };
            stage_command(&load_config(config_path, overrides)?, &job.job, Stage::Diff)
        }
        Command::Rank { job, top } => {
            let overrides = ConfigOverrides { top_n: top, ..Default::default() };
            stage_command(&load_config(config_path, overrides)?, &job.job, Stage::Rank)
        }
        Command::Decompile { job, backend, top, timeout } => {
            let overrides = ConfigOverrides {
                decompile_backend: backend,
                decompile_top: top,
                timeout_secs: timeout,
                ..Default::default()
            };
            stage_command(&load_config(config_path, overrides)?, &job.job, Stage::Decompile)
        }
        Command::Analyze { job, opts } => {
            let overrides = ConfigOverrides {
                provider: opts.provider,
                model: opts.model,
                max_rounds: opts.max_rounds,
                ..Default::default()
            };
            stage_command(&load_config(config_path, overrides)?, &job.job, Stage::Analyze)
        }
        Command::Validate { job } => {
            let config = load_config(config_path, ConfigOverrides::default())?;
            stage_command(&config, &job.job, Stage::Validate)
        }
        Command::Report { job, opts } => {
            let overrides = ConfigOverrides { report_format: opts.format, ..Default::default() };
            stage_command(&load_config(config_path, overrides)?, &job.job, Stage::Report)
        }
        Command::Run { inputs, diff, decompile, analyze, report, top, timeout } => {
            let overrides = ConfigOverrides {
                diff_backend: diff.backend,
                decompile_backend: decompile.decompiler,
                timeout_secs: timeout,
                top_n: top,
                decompile_top: None,
                provider: analyze.provider,
                model: analyze.model,
                max_rounds: analyze.max_rounds,
                report_format: report.format,
            };
            let config = load_config(config_path, overrides)?;
            run_command(&config, &inputs.a, &inputs.b, &inputs.out, inputs.tag)
        }
        Command::Verify { job, json } => verify_command(&job.job, json),
    }
}
