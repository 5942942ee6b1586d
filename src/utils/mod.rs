use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::builders::hooks::HookRegistry;
use crate::builders::jobs::JobKind;
use crate::builders::reporter::{ConsoleReporter, DiagnosticReporter, Diagnostics};
use crate::builders::storage::{submit_script, FileSink, ScriptSink, StdoutSink};
use crate::builders::validator::{JobValidator, StandardValidator};
use crate::core::config::{render_as, BuilderConfig, ConfigManager, ConfigProvider};
use crate::core::engine::ScriptAssembler;
use crate::core::environment::{select_queuing_system, Environment, QsysKind};
use crate::core::resources::ResourceRequest;

pub mod resource_args;

use resource_args::{parse_override_args, ResourceArgs};

/// What to do with a finished script.
#[derive(Debug, Clone, Default)]
pub struct OutputOptions {
    pub qsys: Option<QsysKind>,
    pub output: Option<PathBuf>,
    pub submit: bool,
    pub show_resources: Option<String>,
}

/// A rendered script together with the request it was rendered from.
#[derive(Debug)]
pub struct BuiltJob {
    pub script: String,
    pub request: ResourceRequest,
    pub diagnostics: Diagnostics,
}

/// Runs the whole pipeline for one job: commandline resources, the job's
/// input file, override arguments, finalization, hooks and rendering.
pub fn build_job(
    config: &BuilderConfig,
    job: &JobKind,
    resources: &ResourceArgs,
    overrides: Option<&ResourceArgs>,
    env: &Environment,
) -> Result<BuiltJob> {
    let validator = StandardValidator::new();
    let issues = validator.validate_job(job);
    if !issues.is_empty() {
        anyhow::bail!("Invalid job:\n  - {}", issues.join("\n  - "));
    }

    let mut request = ResourceRequest::new();
    resources.apply(&mut request);

    let (payload, mut diagnostics) = job.prepare(&mut request, config)?;
    if let Some(overrides) = overrides {
        overrides.apply(&mut request);
    }
    request.finalize(&mut diagnostics);
    diagnostics.extend(validator.validate_request(&request));

    let mut registry = HookRegistry::new();
    job.register_hooks(payload, &request, &mut registry);
    let script = ScriptAssembler::new(registry).render(&request, env)?;

    Ok(BuiltJob {
        script,
        request,
        diagnostics,
    })
}

/// The environment for `config`, with an optional queuing system override.
pub fn environment_for(config: &BuilderConfig, qsys: Option<QsysKind>) -> Environment {
    let kind = qsys.unwrap_or(config.queuing_system);
    Environment::new(select_queuing_system(kind))
        .with_return_var(&config.return_variable)
        .with_extra_path(config.extra_path.clone())
}

/// Builds the job and writes, and optionally submits, the script.
pub fn run_job(
    config_path: Option<PathBuf>,
    job: JobKind,
    resources: &ResourceArgs,
    overrides: Option<&str>,
    options: &OutputOptions,
) -> Result<()> {
    if options.submit && options.output.is_none() {
        anyhow::bail!("--submit needs --output, the queuing system is handed a file");
    }

    let config = get_config_manager(config_path)?.load_config()?;
    let overrides = overrides.map(parse_override_args).transpose()?;
    let env = environment_for(&config, options.qsys);

    let built = build_job(&config, &job, resources, overrides.as_ref(), &env)?;
    ConsoleReporter::new().report(&built.diagnostics);

    if let Some(format) = &options.show_resources {
        eprintln!("{}", render_as(&built.request, format)?);
    }

    match &options.output {
        Some(path) => {
            let mut sink = FileSink::new(path.clone());
            sink.emit(&built.script)?;
            if options.submit {
                let job_id = submit_script(sink.path(), env.qsys.as_ref())?;
                println!("✓ Submitted {} as {job_id}", path.display());
            }
        }
        None => StdoutSink.emit(&built.script)?,
    }
    Ok(())
}

pub fn initialize_config(config_path: Option<PathBuf>) -> Result<()> {
    let config_manager = get_config_manager(config_path)?;
    config_manager.initialize()?;
    println!(
        "✓ Configuration available at {}",
        config_manager.get_config_path().display()
    );
    Ok(())
}

pub fn show_config(config_path: Option<PathBuf>, format: &str) -> Result<()> {
    let config_manager = get_config_manager(config_path)?;
    let content = config_manager
        .export_config(format)
        .context("Failed to export configuration")?;
    println!("{content}");
    Ok(())
}

// Helper function to create ConfigManager instance
fn get_config_manager(config_path: Option<PathBuf>) -> Result<ConfigManager> {
    match config_path {
        Some(path) => Ok(ConfigManager::new_at(path)),
        None => ConfigManager::new(),
    }
}
