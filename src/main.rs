/// Builds job scripts for cluster queuing systems.
/// A job is either a plain command or a run of a quantum chemistry
/// package. Resources are taken from the commandline and, where the
/// package has an input file, completed from what that file asks for.
/// The result is a shell script that stages the input into a work
/// directory on the node, runs the payload, retrieves the results and
/// exits with the payload's status.
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use jobscript_builder::builders::jobs::{CommandJob, JobKind, OrcaJob, QChemJob};
use jobscript_builder::core::environment::QsysKind;
use jobscript_builder::utils::{self, resource_args::ResourceArgs, OutputOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jobscript-builder")]
#[command(about = "Build job scripts for PBS/Torque and Slurm queuing systems")]
struct Cli {
    /// Configuration file (default: <config dir>/jobscript-builder/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Queuing system to generate for
    #[arg(long, value_enum, global = true)]
    qsys: Option<QsysKind>,

    /// Write the script to this file instead of stdout
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Submit the written script
    #[arg(long, global = true)]
    submit: bool,

    /// Print the final resource request to stderr (toml, json or yaml)
    #[arg(long, value_name = "FORMAT", global = true)]
    show_resources: Option<String>,

    /// Print debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_options(&self) -> OutputOptions {
        OutputOptions {
            qsys: self.qsys,
            output: self.output.clone(),
            submit: self.submit,
            show_resources: self.show_resources.clone(),
        }
    }
}

/// Resource options every job subcommand accepts.
#[derive(Args)]
struct JobArgs {
    /// Resource options applied last, overriding everything else
    #[arg(short = 'q', long = "qsys-args", value_name = "ARGS", allow_hyphen_values = true)]
    qsys_args: Option<String>,

    #[command(flatten)]
    resources: ResourceArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an arbitrary shell command
    Command {
        /// File to stage into the work directory, repeatable
        #[arg(long = "copy-in", value_name = "FILE")]
        copy_in: Vec<String>,

        /// File to retrieve after a successful run, repeatable
        #[arg(long = "copy-out", value_name = "FILE")]
        copy_out: Vec<String>,

        /// Monitor the run with perf or time
        #[arg(long)]
        perf: bool,

        #[command(flatten)]
        job_args: JobArgs,

        /// The command to run. The words are joined by spaces and parsed
        /// again by the shell, so quote arguments that contain spaces
        /// (e.g. -- sh -c "'echo a b'")
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Run ORCA on an input file
    Orca {
        /// ORCA input file
        infile: String,

        /// Output file (default: input name with .out)
        #[arg(long = "out")]
        outfile: Option<String>,

        /// ORCA binary to use
        #[arg(long)]
        executable: Option<String>,

        /// Monitor the run with perf or time
        #[arg(long)]
        perf: bool,

        #[command(flatten)]
        job_args: JobArgs,
    },
    /// Run Q-Chem on an input file
    Qchem {
        /// Q-Chem input file
        infile: String,

        /// Output file (default: input name with .out)
        #[arg(long = "out")]
        outfile: Option<String>,

        /// Pass -save to Q-Chem
        #[arg(long)]
        save: bool,

        /// Name of the Q-Chem savedir
        #[arg(long)]
        savedir: Option<String>,

        /// Pass -np <processors> to Q-Chem (MPI runs)
        #[arg(long = "np-to-qchem")]
        np_to_qchem: bool,

        /// Pass -nt <processors> to Q-Chem (threaded runs)
        #[arg(long = "nt-to-qchem")]
        nt_to_qchem: bool,

        /// Q-Chem version handed to the selector program
        #[arg(long = "version")]
        qchem_version: Option<String>,

        /// Q-Chem wrapper script to use
        #[arg(long)]
        executable: Option<String>,

        /// Monitor the run with perf or time
        #[arg(long)]
        perf: bool,

        #[command(flatten)]
        job_args: JobArgs,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write the default configuration file
    Init,
    /// Print the effective configuration
    Show {
        #[arg(long, default_value = "toml")]
        format: String,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = cli.output_options();

    let (job, job_args) = match cli.command {
        Commands::Config { action } => {
            return match action {
                ConfigAction::Init => utils::initialize_config(cli.config),
                ConfigAction::Show { format } => utils::show_config(cli.config, &format),
            };
        }
        Commands::Command {
            copy_in,
            copy_out,
            perf,
            job_args,
            command,
        } => (
            JobKind::Command(CommandJob {
                command,
                copy_in,
                copy_out,
                monitor: perf,
            }),
            job_args,
        ),
        Commands::Orca {
            infile,
            outfile,
            executable,
            perf,
            job_args,
        } => (
            JobKind::Orca(OrcaJob {
                input: infile,
                output: outfile,
                executable,
                monitor: perf,
            }),
            job_args,
        ),
        Commands::Qchem {
            infile,
            outfile,
            save,
            savedir,
            np_to_qchem,
            nt_to_qchem,
            qchem_version,
            executable,
            perf,
            job_args,
        } => (
            JobKind::QChem(QChemJob {
                input: infile,
                output: outfile,
                save,
                savedir,
                np_flag: np_to_qchem,
                nt_flag: nt_to_qchem,
                version: qchem_version,
                executable,
                monitor: perf,
            }),
            job_args,
        ),
    };

    utils::run_job(
        cli.config,
        job,
        &job_args.resources,
        job_args.qsys_args.as_deref(),
        &options,
    )
}
