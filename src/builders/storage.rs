use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::core::environment::QueuingSystem;

/// Where a finished job script goes.
pub trait ScriptSink {
    fn emit(&mut self, script: &str) -> Result<()>;
}

pub struct StdoutSink;

impl ScriptSink for StdoutSink {
    fn emit(&mut self, script: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(script.as_bytes())
            .context("Failed to write job script to stdout")?;
        stdout.flush()?;
        Ok(())
    }
}

/// Writes the script to a file and makes it executable.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ScriptSink for FileSink {
    fn emit(&mut self, script: &str) -> Result<()> {
        fs::write(&self.path, script)
            .with_context(|| format!("Failed to write job script {}", self.path.display()))?;

        // Make executable on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = fs::metadata(&self.path)?.permissions();
            perms.set_mode(0o755);
            fs::set_permissions(&self.path, perms)?;
        }

        tracing::info!("Wrote job script to {}", self.path.display());
        Ok(())
    }
}

/// Keeps every emitted script, for tests and dry runs.
#[derive(Default)]
pub struct MemorySink {
    pub scripts: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScriptSink for MemorySink {
    fn emit(&mut self, script: &str) -> Result<()> {
        self.scripts.push(script.to_string());
        Ok(())
    }
}

/// Hands a written script to the queuing system and returns what the submit
/// program printed (usually the job id).
pub fn submit_script(path: &Path, qsys: &dyn QueuingSystem) -> Result<String> {
    let Some(program) = qsys.submit_command() else {
        anyhow::bail!("The {} queuing system has no submit command", qsys.name());
    };

    let output = Command::new(program)
        .arg(path)
        .output()
        .with_context(|| format!("Failed to run {program}"))?;
    if !output.status.success() {
        anyhow::bail!(
            "{program} failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::environment::Local;
    use tempfile::tempdir;

    #[test]
    fn test_file_sink_writes_executable_script() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("job.sh");
        let mut sink = FileSink::new(path.clone());
        sink.emit("#!/bin/sh\nexit 0\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "#!/bin/sh\nexit 0\n");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_memory_sink_collects() {
        let mut sink = MemorySink::new();
        sink.emit("a").unwrap();
        sink.emit("b").unwrap();
        assert_eq!(sink.scripts, vec!["a", "b"]);
    }

    #[test]
    fn test_local_cannot_submit() {
        let result = submit_script(Path::new("job.sh"), &Local);
        assert!(result.is_err());
    }
}
