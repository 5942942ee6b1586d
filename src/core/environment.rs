use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::resources::{bytes_to_mb, format_walltime, ResourceRequest};

/// Shell variable the generated script uses for the submit directory.
pub const SUBMIT_DIR_VAR: &str = "JOB_SUBMIT_DIR";
/// Shell variable the generated script uses for the node work directory.
pub const NODE_DIR_VAR: &str = "JOB_WORK_DIR";
/// Default name of the result variable.
pub const DEFAULT_RETURN_VAR: &str = "RETURN_VALUE";

/// The queuing system flavours a script can be generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum QsysKind {
    /// Pick the first scheduler found on PATH.
    Auto,
    Torque,
    Slurm,
    /// No scheduler, the script runs in a temporary directory.
    Local,
}

/// How a concrete scheduler expresses a [`ResourceRequest`].
pub trait QueuingSystem {
    fn name(&self) -> &'static str;

    /// Directive lines placed right below the shebang.
    fn directives(&self, request: &ResourceRequest) -> Vec<String>;

    /// Shell expression for the directory the job was submitted from.
    fn submit_dir_expr(&self) -> &'static str;

    /// Shell expression for a job-private directory on the compute node.
    fn node_dir_expr(&self) -> &'static str;

    /// Program that accepts the script file, if any.
    fn submit_command(&self) -> Option<&'static str>;
}

pub struct Torque;

impl QueuingSystem for Torque {
    fn name(&self) -> &'static str {
        "torque"
    }

    fn directives(&self, request: &ResourceRequest) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(name) = &request.job_name {
            lines.push(format!("#PBS -N {}", sanitize_job_name(name)));
        }
        if let Some(queue) = &request.queue {
            lines.push(format!("#PBS -q {queue}"));
        }
        if !request.node_types.is_empty() {
            let nodes: Vec<String> = request
                .node_types
                .iter()
                .map(|n| format!("{}:ppn={}", n.no_nodes, n.no_procs))
                .collect();
            lines.push(format!("#PBS -l nodes={}", nodes.join("+")));
        }
        if let Some(mem) = request.physical_memory {
            lines.push(format!("#PBS -l mem={}mb", bytes_to_mb(mem)));
        }
        if let Some(vmem) = request.virtual_memory {
            lines.push(format!("#PBS -l vmem={}mb", bytes_to_mb(vmem)));
        }
        if let Some(walltime) = request.walltime {
            lines.push(format!("#PBS -l walltime={}", format_walltime(walltime)));
        }
        for (key, value) in &request.directives {
            lines.push(format!("#PBS -l {key}={value}"));
        }
        lines
    }

    fn submit_dir_expr(&self) -> &'static str {
        "$PBS_O_WORKDIR"
    }

    fn node_dir_expr(&self) -> &'static str {
        "${TMPDIR:-/tmp}/$PBS_JOBID"
    }

    fn submit_command(&self) -> Option<&'static str> {
        Some("qsub")
    }
}

pub struct Slurm;

impl QueuingSystem for Slurm {
    fn name(&self) -> &'static str {
        "slurm"
    }

    fn directives(&self, request: &ResourceRequest) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(name) = &request.job_name {
            lines.push(format!("#SBATCH --job-name={}", sanitize_job_name(name)));
        }
        if let Some(queue) = &request.queue {
            lines.push(format!("#SBATCH --partition={queue}"));
        }
        if !request.node_types.is_empty() {
            lines.push(format!("#SBATCH --nodes={}", request.no_nodes()));
            lines.push(format!("#SBATCH --ntasks={}", request.no_procs()));
        }
        if let Some(mem) = request.physical_memory {
            lines.push(format!("#SBATCH --mem={}M", bytes_to_mb(mem)));
        }
        if let Some(walltime) = request.walltime {
            lines.push(format!("#SBATCH --time={}", format_walltime(walltime)));
        }
        for (key, value) in &request.directives {
            lines.push(format!("#SBATCH --{key}={value}"));
        }
        lines
    }

    fn submit_dir_expr(&self) -> &'static str {
        "$SLURM_SUBMIT_DIR"
    }

    fn node_dir_expr(&self) -> &'static str {
        "${TMPDIR:-/tmp}/$SLURM_JOB_ID"
    }

    fn submit_command(&self) -> Option<&'static str> {
        Some("sbatch")
    }
}

/// Runs the script on the current machine without a scheduler.
pub struct Local;

impl QueuingSystem for Local {
    fn name(&self) -> &'static str {
        "local"
    }

    fn directives(&self, _request: &ResourceRequest) -> Vec<String> {
        Vec::new()
    }

    fn submit_dir_expr(&self) -> &'static str {
        "$PWD"
    }

    fn node_dir_expr(&self) -> &'static str {
        "$(mktemp -d)"
    }

    fn submit_command(&self) -> Option<&'static str> {
        None
    }
}

/// Read-only context handed to every hook.
pub struct Environment {
    /// Name of the variable holding the payload's exit status.
    pub return_var: String,
    /// Variable naming the directory the job was submitted from.
    pub submit_dir_var: String,
    /// Variable naming the job's work directory on the node.
    pub node_dir_var: String,
    /// Directories prepended to PATH.
    pub extra_path: Vec<String>,
    pub qsys: Box<dyn QueuingSystem>,
}

impl Environment {
    pub fn new(qsys: Box<dyn QueuingSystem>) -> Self {
        Self {
            return_var: DEFAULT_RETURN_VAR.to_string(),
            submit_dir_var: SUBMIT_DIR_VAR.to_string(),
            node_dir_var: NODE_DIR_VAR.to_string(),
            extra_path: Vec::new(),
            qsys,
        }
    }

    pub fn with_return_var(mut self, name: &str) -> Self {
        self.return_var = name.to_string();
        self
    }

    pub fn with_extra_path(mut self, dirs: Vec<String>) -> Self {
        self.extra_path = dirs;
        self
    }

    /// `$NAME` reference to the result variable.
    pub fn return_ref(&self) -> String {
        format!("${}", self.return_var)
    }

    pub fn submit_dir_ref(&self) -> String {
        format!("${}", self.submit_dir_var)
    }

    pub fn node_dir_ref(&self) -> String {
        format!("${}", self.node_dir_var)
    }
}

/// Builds the queuing system for `kind`, resolving `Auto` by looking for
/// the submit programs on PATH.
pub fn select_queuing_system(kind: QsysKind) -> Box<dyn QueuingSystem> {
    let resolved = match kind {
        QsysKind::Auto => detect_queuing_system(),
        other => other,
    };
    tracing::debug!("Using queuing system {:?}", resolved);
    match resolved {
        QsysKind::Torque => Box::new(Torque),
        QsysKind::Slurm => Box::new(Slurm),
        QsysKind::Local | QsysKind::Auto => Box::new(Local),
    }
}

fn detect_queuing_system() -> QsysKind {
    if find_in_path("sbatch").is_some() {
        QsysKind::Slurm
    } else if find_in_path("qsub").is_some() {
        QsysKind::Torque
    } else {
        QsysKind::Local
    }
}

/// Looks up an executable by name on PATH.
pub fn find_in_path(program: &str) -> Option<std::path::PathBuf> {
    if program.contains('/') {
        let path = Path::new(program);
        return path.is_file().then(|| path.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}

/// Schedulers are picky about job names: no whitespace, no slashes.
fn sanitize_job_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() || c == '/' { '_' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resources::{mb_to_bytes, NodeType};

    fn sample_request() -> ResourceRequest {
        let mut request = ResourceRequest::new();
        request.job_name = Some("water opt".to_string());
        request.set_procs(4);
        request.add_node_type(NodeType::with_procs(2));
        request.physical_memory = Some(mb_to_bytes(1000));
        request.virtual_memory = Some(mb_to_bytes(1500));
        request.walltime = Some(3600);
        request.set_directive("account", "chem");
        request
    }

    #[test]
    fn test_torque_directives() {
        let lines = Torque.directives(&sample_request());
        assert_eq!(
            lines,
            vec![
                "#PBS -N water_opt",
                "#PBS -l nodes=1:ppn=4+1:ppn=2",
                "#PBS -l mem=1000mb",
                "#PBS -l vmem=1500mb",
                "#PBS -l walltime=01:00:00",
                "#PBS -l account=chem",
            ]
        );
    }

    #[test]
    fn test_slurm_directives() {
        let lines = Slurm.directives(&sample_request());
        assert!(lines.contains(&"#SBATCH --nodes=2".to_string()));
        assert!(lines.contains(&"#SBATCH --ntasks=6".to_string()));
        assert!(lines.contains(&"#SBATCH --mem=1000M".to_string()));
        assert!(lines.contains(&"#SBATCH --account=chem".to_string()));
    }

    #[test]
    fn test_local_has_no_directives() {
        assert!(Local.directives(&sample_request()).is_empty());
        assert!(Local.submit_command().is_none());
    }

    #[test]
    fn test_environment_refs() {
        let env = Environment::new(Box::new(Local)).with_return_var("RV");
        assert_eq!(env.return_ref(), "$RV");
        assert_eq!(env.node_dir_ref(), "$JOB_WORK_DIR");
    }
}
