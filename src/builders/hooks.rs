use std::fmt::Write as _;
use std::path::Path;

use crate::core::environment::Environment;
use crate::core::resources::ResourceRequest;

/// Priority used when a job type does not care where its fragment goes.
pub const DEFAULT_PRIORITY: i32 = 0;
/// Staging runs well before everything else.
pub const COPY_IN_PRIORITY: i32 = -1000;
/// Retrieval runs after the payload.
pub const COPY_OUT_PRIORITY: i32 = 1000;
/// Cleanup runs last.
pub const CLEANUP_PRIORITY: i32 = 2000;

/// A fragment of the generated job script.
pub trait Hook {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Shell text for this fragment.
    fn generate(&self, request: &ResourceRequest, env: &Environment) -> String;

    /// Whether this hook runs the actual work and assigns the result
    /// variable. A script needs at least one such hook.
    fn runs_payload(&self) -> bool {
        false
    }
}

/// The two chains a hook can be registered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Normal execution path.
    Payload,
    /// Runs once after the payload chain, only if the result is non-zero.
    Error,
}

struct Registered {
    priority: i32,
    hook: Box<dyn Hook>,
}

/// Hooks kept sorted by ascending priority; equal priorities keep their
/// registration order.
#[derive(Default)]
pub struct HookRegistry {
    payload: Vec<Registered>,
    error: Vec<Registered>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: impl Hook + 'static, phase: Phase, priority: i32) {
        tracing::debug!(hook = hook.name(), ?phase, priority, "Registering hook");
        let chain = match phase {
            Phase::Payload => &mut self.payload,
            Phase::Error => &mut self.error,
        };
        // Insert after every entry with the same priority to keep ties stable.
        let at = chain.partition_point(|r| r.priority <= priority);
        chain.insert(
            at,
            Registered {
                priority,
                hook: Box::new(hook),
            },
        );
    }

    pub fn add_payload_hook(&mut self, hook: impl Hook + 'static, priority: i32) {
        self.register(hook, Phase::Payload, priority);
    }

    pub fn add_error_hook(&mut self, hook: impl Hook + 'static, priority: i32) {
        self.register(hook, Phase::Error, priority);
    }

    /// Hooks of `phase` in rendering order.
    pub fn chain(&self, phase: Phase) -> impl Iterator<Item = &(dyn Hook + 'static)> {
        let chain = match phase {
            Phase::Payload => &self.payload,
            Phase::Error => &self.error,
        };
        chain.iter().map(|r| r.hook.as_ref())
    }

    /// Priorities of `phase` in rendering order.
    pub fn priorities(&self, phase: Phase) -> Vec<i32> {
        let chain = match phase {
            Phase::Payload => &self.payload,
            Phase::Error => &self.error,
        };
        chain.iter().map(|r| r.priority).collect()
    }

    pub fn has_payload(&self) -> bool {
        self.payload.iter().any(|r| r.hook.runs_payload())
    }
}

/// Wraps `text` in double quotes, escaping what the shell would expand.
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for c in text.chars() {
        if matches!(c, '"' | '\\' | '$' | '`') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// `"$DIR"/"file"` for relative files, the quoted file itself otherwise.
fn within(dir_ref: &str, file: &str) -> String {
    if Path::new(file).is_absolute() {
        quote(file)
    } else {
        format!("\"{dir_ref}\"/{}", quote(file))
    }
}

/// Name a file gets on the other side of a copy.
fn target_name(file: &str) -> &str {
    if Path::new(file).is_absolute() {
        Path::new(file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(file)
    } else {
        file
    }
}

/// Creates the node work directory, enters it and stages the input files.
/// A file that cannot be staged aborts the job before the payload runs.
pub struct CopyInHook {
    files: Vec<String>,
}

impl CopyInHook {
    pub fn new(files: Vec<String>) -> Self {
        Self { files }
    }
}

impl Hook for CopyInHook {
    fn name(&self) -> &str {
        "copy-in"
    }

    fn generate(&self, _request: &ResourceRequest, env: &Environment) -> String {
        let work = env.node_dir_ref();
        let submit = env.submit_dir_ref();

        let mut script = String::from("# enter work directory and stage input files\n");
        let _ = writeln!(script, "mkdir -p \"{work}\" || exit 1");
        let _ = writeln!(script, "cd \"{work}\" || exit 1");

        for file in &self.files {
            let target = target_name(file);
            if let Some(parent) = Path::new(target).parent()
                && !parent.as_os_str().is_empty()
            {
                let _ = writeln!(script, "mkdir -p {}", quote(&parent.to_string_lossy()));
            }
            let _ = writeln!(
                script,
                "if ! cp -a {} {}; then\n    echo {} >&2\n    exit 1\nfi",
                within(&submit, file),
                quote(target),
                quote(&format!("Could not stage input file {file}"))
            );
        }
        script
    }
}

/// Copies files from the work directory back to the submit directory.
/// Missing files are skipped.
pub struct CopyOutHook {
    files: Vec<String>,
    only_on_success: bool,
}

impl CopyOutHook {
    /// Copies unconditionally, for use in the error chain.
    pub fn new(files: Vec<String>) -> Self {
        Self {
            files,
            only_on_success: false,
        }
    }

    /// Copies only when the result variable is zero.
    pub fn on_success(files: Vec<String>) -> Self {
        Self {
            files,
            only_on_success: true,
        }
    }
}

impl Hook for CopyOutHook {
    fn name(&self) -> &str {
        "copy-out"
    }

    fn generate(&self, _request: &ResourceRequest, env: &Environment) -> String {
        if self.files.is_empty() {
            return String::new();
        }
        let work = env.node_dir_ref();
        let submit = env.submit_dir_ref();

        let mut body = String::new();
        for file in &self.files {
            let source = within(&work, file);
            let target = within(&submit, target_name(file));
            let _ = writeln!(
                body,
                "if [ -e {source} ]; then\n    cp -a {source} {target}\nfi"
            );
        }

        if self.only_on_success {
            let mut script = String::from("# retrieve results\n");
            let _ = writeln!(script, "if [ \"{}\" = \"0\" ]; then", env.return_ref());
            script.push_str(&indent(&body));
            script.push_str("fi\n");
            script
        } else {
            format!("# retrieve files for inspection\n{body}")
        }
    }
}

/// Removes the work directory after success and keeps it otherwise.
pub struct CleanupHook;

impl Hook for CleanupHook {
    fn name(&self) -> &str {
        "cleanup"
    }

    fn generate(&self, _request: &ResourceRequest, env: &Environment) -> String {
        let work = env.node_dir_ref();
        format!(
            "# clean up\ncd \"{submit}\"\nif [ \"{ret}\" = \"0\" ]; then\n    rm -rf \"{work}\"\nelse\n    echo \"Keeping work directory {work} for inspection\" >&2\nfi\n",
            submit = env.submit_dir_ref(),
            ret = env.return_ref(),
        )
    }
}

/// Indents every non-empty line by four spaces.
pub fn indent(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if !line.is_empty() {
            out.push_str("    ");
        }
        out.push_str(line);
        out.push('\n');
    }
    out
}
