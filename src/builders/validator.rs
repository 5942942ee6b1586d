use std::path::{Path, PathBuf};

use crate::builders::jobs::JobKind;
use crate::builders::reporter::{Diagnostics, Origin};
use crate::core::error::BuildError;
use crate::core::resources::ResourceRequest;

/// Consistency checks run around job preparation.
pub trait JobValidator {
    /// Problems with the job as given on the commandline. Any entry aborts
    /// the build.
    fn validate_job(&self, job: &JobKind) -> Vec<String>;

    /// Non-fatal problems with the prepared resource request.
    fn validate_request(&self, request: &ResourceRequest) -> Diagnostics;
}

pub struct StandardValidator;

impl StandardValidator {
    pub fn new() -> Self {
        Self
    }

    fn check_input_file(&self, file_path: &str, issues: &mut Vec<String>) {
        if !Path::new(file_path).is_file() {
            issues.push(BuildError::FileNotFound(PathBuf::from(file_path)).to_string());
        }
    }
}

impl JobValidator for StandardValidator {
    fn validate_job(&self, job: &JobKind) -> Vec<String> {
        let mut issues = Vec::new();

        match job {
            JobKind::Command(job) => {
                if job.command.is_empty() {
                    issues.push("No command given".to_string());
                }
                for file in &job.copy_in {
                    if !Path::new(file).exists() {
                        issues.push(format!("File to copy in not found: {file}"));
                    }
                }
            }
            JobKind::Orca(job) => {
                self.check_input_file(&job.input, &mut issues);
            }
            JobKind::QChem(job) => {
                self.check_input_file(&job.input, &mut issues);
                if job.save && job.savedir.is_none() {
                    issues.push("If --save is provided a --savedir has to be set".to_string());
                }
                if job.savedir.as_deref().is_some_and(|d| d.contains('/')) {
                    issues.push("The savedir given should not be a path, just a name".to_string());
                }
            }
        }

        issues
    }

    fn validate_request(&self, request: &ResourceRequest) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();

        for file in &request.files.copy_in {
            if !Path::new(file).exists() {
                diagnostics.warn(
                    Origin::Resources,
                    format!("Input refers to {file}, which does not exist here; staging it will fail"),
                );
            }
        }
        if request.node_types.iter().any(|n| n.no_procs == 0 || n.no_nodes == 0) {
            diagnostics.warn(Origin::Resources, "A node type requests zero nodes or processors");
        }

        diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::jobs::{CommandJob, QChemJob};
    use tempfile::tempdir;

    #[test]
    fn test_qchem_savedir_rules() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("mol.in");
        std::fs::write(&input, "$rem\n$end\n").unwrap();

        let job = JobKind::QChem(QChemJob {
            input: input.to_string_lossy().into_owned(),
            save: true,
            ..Default::default()
        });
        let issues = StandardValidator::new().validate_job(&job);
        assert_eq!(issues, vec!["If --save is provided a --savedir has to be set"]);

        let job = JobKind::QChem(QChemJob {
            input: input.to_string_lossy().into_owned(),
            savedir: Some("a/b".to_string()),
            ..Default::default()
        });
        assert_eq!(StandardValidator::new().validate_job(&job).len(), 1);
    }

    #[test]
    fn test_missing_copy_in_file_is_fatal() {
        let job = JobKind::Command(CommandJob {
            command: vec!["true".to_string()],
            copy_in: vec!["/nonexistent/input.dat".to_string()],
            ..Default::default()
        });
        let issues = StandardValidator::new().validate_job(&job);
        assert_eq!(issues, vec!["File to copy in not found: /nonexistent/input.dat"]);
    }

    #[test]
    fn test_request_warns_about_missing_referenced_file() {
        let mut request = ResourceRequest::new();
        request.files.copy_in.push("/nonexistent/geom.xyz".to_string());
        let diagnostics = StandardValidator::new().validate_request(&request);
        assert_eq!(diagnostics.len(), 1);
    }
}
