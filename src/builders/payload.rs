//! The hooks that run the actual work of a job.

use std::fmt::Write as _;

use crate::builders::hooks::{indent, quote, Hook};
use crate::core::environment::Environment;
use crate::core::resources::ResourceRequest;

/// Line ORCA prints as the last line of a successful run.
pub const ORCA_SUCCESS_MARKER: &str = "****ORCA TERMINATED NORMALLY****";
/// Line Q-Chem prints as the last line of a successful run.
pub const QCHEM_SUCCESS_MARKER: &str = "Thank you very much for using Q-Chem.  Have a nice day.";

/// A plain shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPayload {
    /// Inserted verbatim, so it may use shell syntax.
    pub command: String,
    pub monitor: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrcaPayload {
    /// Absolute path, ORCA refuses parallel runs otherwise.
    pub executable: String,
    pub input: String,
    pub output: String,
    pub monitor: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QChemPayload {
    pub executable: String,
    pub input: String,
    pub output: String,
    /// Pass `-save`.
    pub save: bool,
    pub savedir: Option<String>,
    /// Pass `-np <procs>` (MPI runs).
    pub np_flag: bool,
    /// Pass `-nt <procs>` (threaded runs).
    pub nt_flag: bool,
    pub monitor: bool,
}

/// What a job runs. Chosen once when the job is set up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Command(CommandPayload),
    Orca(OrcaPayload),
    QChem(QChemPayload),
}

impl Hook for Payload {
    fn name(&self) -> &str {
        match self {
            Payload::Command(_) => "command",
            Payload::Orca(_) => "orca",
            Payload::QChem(_) => "qchem",
        }
    }

    fn generate(&self, request: &ResourceRequest, env: &Environment) -> String {
        match self {
            Payload::Command(payload) => {
                let mut script = String::from("# run payload\n");
                script.push_str(&run_captured(&payload.command, payload.monitor, env));
                script
            }
            Payload::Orca(payload) => {
                let command = format!(
                    "{} {} > {}",
                    quote(&payload.executable),
                    quote(&payload.input),
                    quote(&payload.output)
                );
                let mut script = String::from("# run ORCA\n");
                script.push_str(&run_captured(&command, payload.monitor, env));
                script.push('\n');
                script.push_str(&success_check(ORCA_SUCCESS_MARKER, &payload.output, env));
                script
            }
            Payload::QChem(payload) => qchem_script(payload, request, env),
        }
    }

    fn runs_payload(&self) -> bool {
        true
    }
}

/// Runs `command` and captures its status, optionally under `perf stat`
/// or, if perf is missing, `/usr/bin/time -v`.
fn run_captured(command: &str, monitor: bool, env: &Environment) -> String {
    let capture = format!("{}=$?\n", env.return_var);
    if !monitor {
        return format!("{command}\n{capture}");
    }

    let mut script = String::from("if command -v perf > /dev/null 2>&1; then\n");
    script.push_str(&indent(&format!("perf stat {command}\n{capture}")));
    script.push_str("else\n");
    script.push_str(&indent(&format!("/usr/bin/time -v {command}\n{capture}")));
    script.push_str("fi\n");
    script
}

/// Turns a zero status into a failure if `output` lacks `marker`.
fn success_check(marker: &str, output: &str, env: &Environment) -> String {
    format!(
        "# check that the program terminated normally\nif [ \"{ret}\" = \"0\" ] && ! grep -qF {marker} {output}; then\n    {var}=1\nfi\n",
        ret = env.return_ref(),
        var = env.return_var,
        marker = quote(marker),
        output = quote(output),
    )
}

fn qchem_script(payload: &QChemPayload, request: &ResourceRequest, env: &Environment) -> String {
    let mut args = String::new();
    if payload.save {
        args.push_str(" -save");
    }
    if payload.np_flag {
        let _ = write!(args, " -np {}", request.no_procs());
    }
    if payload.nt_flag {
        let _ = write!(args, " -nt {}", request.no_procs());
    }
    let _ = write!(args, " {} {}", quote(&payload.input), quote(&payload.output));
    if let Some(savedir) = &payload.savedir {
        let _ = write!(args, " {}", quote(savedir));
    }

    let mut script = String::from("# run Q-Chem\n");
    let _ = writeln!(script, "export QCSCRATCH=\"{}\"", env.node_dir_ref());
    let command = format!("{}{}", quote(&payload.executable), args);
    script.push_str(&run_captured(&command, payload.monitor, env));
    script.push('\n');
    script.push_str(&success_check(QCHEM_SUCCESS_MARKER, &payload.output, env));

    if let Some(savedir) = &payload.savedir {
        let dir = format!("\"$QCSCRATCH\"/{}", quote(savedir));
        script.push_str("\necho\necho ------------------------------------------------------\necho\n");
        let _ = writeln!(script, "echo \"Files in the savedir {}:\"", savedir.replace('"', ""));
        let _ = writeln!(script, "(\n    cd {dir} && ls -l | sed 's/^/    /g'\n)");
    }
    script
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::environment::Local;

    fn env() -> Environment {
        Environment::new(Box::new(Local))
    }

    #[test]
    fn test_command_payload_captures_status() {
        let payload = Payload::Command(CommandPayload {
            command: "./simulate --steps 10".to_string(),
            monitor: false,
        });
        let text = payload.generate(&ResourceRequest::new(), &env());
        assert_eq!(text, "# run payload\n./simulate --steps 10\nRETURN_VALUE=$?\n");
        assert!(payload.runs_payload());
    }

    #[test]
    fn test_monitored_command_captures_in_both_branches() {
        let payload = Payload::Command(CommandPayload {
            command: "true".to_string(),
            monitor: true,
        });
        let text = payload.generate(&ResourceRequest::new(), &env());
        assert_eq!(text.matches("RETURN_VALUE=$?").count(), 2);
        assert!(text.contains("    perf stat true\n"));
        assert!(text.contains("    /usr/bin/time -v true\n"));
    }

    #[test]
    fn test_orca_payload() {
        let payload = Payload::Orca(OrcaPayload {
            executable: "/opt/orca/orca".to_string(),
            input: "water.inp".to_string(),
            output: "water.out".to_string(),
            monitor: false,
        });
        let text = payload.generate(&ResourceRequest::new(), &env());
        assert!(text.contains("\"/opt/orca/orca\" \"water.inp\" > \"water.out\"\nRETURN_VALUE=$?\n"));
        assert!(text.contains("grep -qF \"****ORCA TERMINATED NORMALLY****\" \"water.out\""));
    }

    #[test]
    fn test_qchem_payload_flags() {
        let mut request = ResourceRequest::new();
        request.set_procs(8);
        let payload = Payload::QChem(QChemPayload {
            executable: "qchem".to_string(),
            input: "mol.in".to_string(),
            output: "mol.out".to_string(),
            save: true,
            savedir: Some("scratch".to_string()),
            np_flag: false,
            nt_flag: true,
            monitor: false,
        });
        let text = payload.generate(&request, &env());
        assert!(text.contains("export QCSCRATCH=\"$JOB_WORK_DIR\""));
        assert!(text.contains("\"qchem\" -save -nt 8 \"mol.in\" \"mol.out\" \"scratch\"\n"));
        assert!(text.contains("Have a nice day."));
        assert!(text.contains("cd \"$QCSCRATCH\"/\"scratch\""));
    }
}
