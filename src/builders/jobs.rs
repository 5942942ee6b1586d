//! Job types: how each kind of job fills the resource request and which
//! hooks it contributes.

use std::path::Path;
use std::process::Command;

use crate::builders::hooks::{
    CleanupHook, CopyInHook, CopyOutHook, HookRegistry, CLEANUP_PRIORITY, COPY_IN_PRIORITY,
    COPY_OUT_PRIORITY, DEFAULT_PRIORITY,
};
use crate::builders::importer::{import_input_file, OrcaImporter, QChemImporter};
use crate::builders::payload::{CommandPayload, OrcaPayload, Payload, QChemPayload};
use crate::builders::reporter::Diagnostics;
use crate::core::config::BuilderConfig;
use crate::core::environment::find_in_path;
use crate::core::error::{BuildError, BuildResult};
use crate::core::resources::ResourceRequest;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandJob {
    /// Command words, joined by spaces into one shell line that the shell
    /// parses again. Quote a word that must stay one argument.
    pub command: Vec<String>,
    pub copy_in: Vec<String>,
    pub copy_out: Vec<String>,
    pub monitor: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrcaJob {
    pub input: String,
    /// Defaults to `<input stem>.out`.
    pub output: Option<String>,
    pub executable: Option<String>,
    pub monitor: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QChemJob {
    pub input: String,
    /// Defaults to `<input stem>.out`.
    pub output: Option<String>,
    pub save: bool,
    pub savedir: Option<String>,
    pub np_flag: bool,
    pub nt_flag: bool,
    /// Version string handed to the selector program.
    pub version: Option<String>,
    pub executable: Option<String>,
    pub monitor: bool,
}

/// The kinds of job a script can be built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    Command(CommandJob),
    Orca(OrcaJob),
    QChem(QChemJob),
}

impl JobKind {
    /// Completes `request` from the job's own knowledge and its input file,
    /// and builds the payload. Explicitly set values are never replaced.
    pub fn prepare(
        &self,
        request: &mut ResourceRequest,
        config: &BuilderConfig,
    ) -> BuildResult<(Payload, Diagnostics)> {
        match self {
            JobKind::Command(job) => {
                if job.command.is_empty() {
                    return Err(BuildError::InvalidArgument("No command given".to_string()));
                }
                extend_unique(&mut request.files.copy_in, &job.copy_in);
                extend_unique(&mut request.files.copy_out, &job.copy_out);
                let payload = Payload::Command(CommandPayload {
                    command: job.command.join(" "),
                    monitor: job.monitor,
                });
                Ok((payload, Diagnostics::new()))
            }
            JobKind::Orca(job) => {
                let staged = staged_name(&job.input);
                let stem = input_stem(&staged, "inp");
                let output = job.output.clone().unwrap_or_else(|| format!("{stem}.out"));
                prime_request(request, &job.input, &output, &stem);
                extend_unique(&mut request.files.copy_out, &[format!("{stem}.gbw")]);

                let importer = OrcaImporter::new(&config.orca.directive_marker);
                let diagnostics = import_input_file(
                    &importer,
                    Path::new(&job.input),
                    request,
                    config.memory_margin_mb,
                )?;

                let executable = resolve_orca(job.executable.as_deref(), config)?;
                let payload = Payload::Orca(OrcaPayload {
                    executable,
                    input: staged,
                    output,
                    monitor: job.monitor,
                });
                Ok((payload, diagnostics))
            }
            JobKind::QChem(job) => {
                let staged = staged_name(&job.input);
                let stem = input_stem(&staged, "in");
                let output = job.output.clone().unwrap_or_else(|| format!("{stem}.out"));
                prime_request(request, &job.input, &output, &stem);

                let importer = QChemImporter::new(&config.qchem.directive_marker);
                let diagnostics = import_input_file(
                    &importer,
                    Path::new(&job.input),
                    request,
                    config.memory_margin_mb,
                )?;

                let executable = resolve_qchem(job, config)?;
                let payload = Payload::QChem(QChemPayload {
                    executable,
                    input: staged,
                    output,
                    save: job.save,
                    savedir: job.savedir.clone(),
                    np_flag: job.np_flag,
                    nt_flag: job.nt_flag,
                    monitor: job.monitor,
                });
                Ok((payload, diagnostics))
            }
        }
    }

    /// Registers the standard stage-in, run, stage-out sequence around
    /// `payload`, plus the error chain retrieving diagnostics files.
    pub fn register_hooks(
        &self,
        payload: Payload,
        request: &ResourceRequest,
        registry: &mut HookRegistry,
    ) {
        registry.add_payload_hook(CopyInHook::new(request.files.copy_in.clone()), COPY_IN_PRIORITY);
        registry.add_payload_hook(payload, DEFAULT_PRIORITY);
        registry.add_payload_hook(
            CopyOutHook::on_success(request.files.copy_out.clone()),
            COPY_OUT_PRIORITY,
        );
        registry.add_payload_hook(CleanupHook, CLEANUP_PRIORITY);
        registry.add_error_hook(
            CopyOutHook::new(request.files.copy_error_out.clone()),
            COPY_IN_PRIORITY,
        );
    }
}

/// Name the input file has inside the work directory. Absolute paths are
/// staged under their file name, relative ones keep their directories.
fn staged_name(input: &str) -> String {
    let path = Path::new(input);
    if path.is_absolute()
        && let Some(name) = path.file_name()
    {
        return name.to_string_lossy().into_owned();
    }
    input.to_string()
}

/// Input file name without `extension`.
fn input_stem(input: &str, extension: &str) -> String {
    let path = Path::new(input);
    let has_extension = path.extension().is_some_and(|e| e == extension);
    let name = if has_extension {
        path.with_extension("")
    } else {
        path.to_path_buf()
    };
    name.to_string_lossy().into_owned()
}

fn prime_request(request: &mut ResourceRequest, input: &str, output: &str, stem: &str) {
    if request.job_name.is_none() {
        let name = Path::new(stem)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| stem.to_string());
        request.job_name = Some(name);
    }
    extend_unique(&mut request.files.copy_in, &[input.to_string()]);
    extend_unique(&mut request.files.copy_out, &[output.to_string()]);
    extend_unique(&mut request.files.copy_error_out, &[output.to_string()]);
}

fn extend_unique(list: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !list.contains(item) {
            list.push(item.clone());
        }
    }
}

fn resolve_orca(explicit: Option<&str>, config: &BuilderConfig) -> BuildResult<String> {
    let candidate = explicit
        .or(config.orca.executable.as_deref())
        .unwrap_or("orca");
    let path = find_in_path(candidate)
        .ok_or_else(|| BuildError::MissingExecutable(format!("ORCA executable {candidate}")))?;
    let absolute = std::fs::canonicalize(&path).unwrap_or(path);
    Ok(absolute.to_string_lossy().into_owned())
}

fn resolve_qchem(job: &QChemJob, config: &BuilderConfig) -> BuildResult<String> {
    if let Some(executable) = &job.executable {
        return Ok(executable.clone());
    }
    if let Some(version) = &job.version {
        return run_selector(&config.qchem.selector, Some(version));
    }
    if let Some(executable) = &config.qchem.executable {
        return Ok(executable.clone());
    }
    run_selector(&config.qchem.selector, None).map_err(|e| {
        tracing::debug!("Q-Chem selector failed: {e}");
        BuildError::MissingExecutable(
            "No path to a Q-Chem wrapper script provided, use --executable or --version".to_string(),
        )
    })
}

/// Asks the selector program which Q-Chem wrapper to use.
fn run_selector(selector: &str, version: Option<&str>) -> BuildResult<String> {
    let mut command = Command::new(selector);
    if let Some(version) = version {
        command.args(["--version", version]);
    }
    let output = command
        .output()
        .map_err(|e| BuildError::ExecutableNotDetermined(format!("{selector}: {e}")))?;
    if !output.status.success() {
        return Err(BuildError::ExecutableNotDetermined(format!(
            "{selector} exited with {}",
            output.status
        )));
    }
    let path = String::from_utf8(output.stdout)
        .map_err(|_| BuildError::ExecutableNotDetermined(format!("{selector}: output is not UTF-8")))?;
    let path = path.trim();
    if path.is_empty() {
        return Err(BuildError::ExecutableNotDetermined(format!("{selector} printed nothing")));
    }
    Ok(path.to_string())
}
