use crate::builders::hooks::{indent, quote, HookRegistry, Phase};
use crate::core::environment::Environment;
use crate::core::error::{BuildError, BuildResult};
use crate::core::resources::ResourceRequest;

/// Turns a [`HookRegistry`] into a job script.
///
/// The script always has the same frame: shebang, scheduler directives,
/// PATH setup and directory variables, then the payload chain, then the
/// error chain guarded on the result variable, and finally an exit with
/// that variable's value.
pub struct ScriptAssembler {
    registry: HookRegistry,
}

impl ScriptAssembler {
    pub fn new(registry: HookRegistry) -> Self {
        Self { registry }
    }

    /// Renders the full script. Fails if no registered hook runs a payload.
    pub fn render(&self, request: &ResourceRequest, env: &Environment) -> BuildResult<String> {
        if !self.registry.has_payload() {
            return Err(BuildError::NoPayloadHook);
        }

        let mut script = String::from("#!/bin/sh\n");
        for directive in env.qsys.directives(request) {
            script.push_str(&directive);
            script.push('\n');
        }
        script.push('\n');
        script.push_str(&format!(
            "# generated by {} {} for {}\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env.qsys.name()
        ));
        script.push_str(&self.preamble(env));

        for hook in self.registry.chain(Phase::Payload) {
            tracing::trace!(hook = hook.name(), "Rendering payload hook");
            push_fragment(&mut script, &hook.generate(request, env));
        }

        let mut rescue = String::new();
        for hook in self.registry.chain(Phase::Error) {
            tracing::trace!(hook = hook.name(), "Rendering error hook");
            push_fragment(&mut rescue, &hook.generate(request, env));
        }
        if !rescue.is_empty() {
            script.push_str(&format!("if [ \"{}\" != \"0\" ]; then\n", env.return_ref()));
            script.push_str(&indent(rescue.trim_end()));
            script.push_str("fi\n\n");
        }

        script.push_str(&format!("exit \"{}\"\n", env.return_ref()));
        Ok(script)
    }

    fn preamble(&self, env: &Environment) -> String {
        let mut path = String::new();
        for dir in &env.extra_path {
            path.push_str(&quote(dir));
            path.push(':');
        }
        format!(
            "export PATH={path}\"$PATH\"\n{submit}=\"{submit_expr}\"\n{node}=\"{node_expr}\"\ncd \"${submit}\" || exit 1\n\n",
            submit = env.submit_dir_var,
            submit_expr = env.qsys.submit_dir_expr(),
            node = env.node_dir_var,
            node_expr = env.qsys.node_dir_expr(),
        )
    }
}

/// Appends a hook's output followed by one blank line; empty output is skipped.
fn push_fragment(script: &mut String, fragment: &str) {
    let fragment = fragment.trim_end();
    if fragment.is_empty() {
        return;
    }
    script.push_str(fragment);
    script.push_str("\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::hooks::{Hook, DEFAULT_PRIORITY};
    use crate::builders::payload::{CommandPayload, Payload};
    use crate::core::environment::{Local, Torque};

    struct Echo(&'static str);

    impl Hook for Echo {
        fn name(&self) -> &str {
            self.0
        }

        fn generate(&self, _request: &ResourceRequest, _env: &Environment) -> String {
            format!("echo {}\n", self.0)
        }
    }

    fn command(cmd: &str) -> Payload {
        Payload::Command(CommandPayload {
            command: cmd.to_string(),
            monitor: false,
        })
    }

    #[test]
    fn test_render_without_payload_fails() {
        let mut registry = HookRegistry::new();
        registry.add_payload_hook(Echo("staging"), -1000);
        let assembler = ScriptAssembler::new(registry);
        let env = Environment::new(Box::new(Local));

        let result = assembler.render(&ResourceRequest::new(), &env);
        assert!(matches!(result, Err(BuildError::NoPayloadHook)));
    }

    #[test]
    fn test_render_orders_fragments() {
        let mut registry = HookRegistry::new();
        registry.add_payload_hook(Echo("late"), 900);
        registry.add_payload_hook(Echo("early"), -1000);
        registry.add_payload_hook(command("true"), DEFAULT_PRIORITY);
        let script = ScriptAssembler::new(registry)
            .render(&ResourceRequest::new(), &Environment::new(Box::new(Local)))
            .unwrap();

        let early = script.find("echo early").unwrap();
        let payload = script.find("RETURN_VALUE=$?").unwrap();
        let late = script.find("echo late").unwrap();
        assert!(early < payload && payload < late);
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("export PATH=\"$PATH\"\n"));
        assert!(script.ends_with("exit \"$RETURN_VALUE\"\n"));
        assert!(!script.contains("!= \"0\""), "no error chain registered");
    }

    #[test]
    fn test_render_guards_error_chain() {
        let mut registry = HookRegistry::new();
        registry.add_payload_hook(command("false"), DEFAULT_PRIORITY);
        registry.add_error_hook(Echo("rescue"), 0);
        let script = ScriptAssembler::new(registry)
            .render(&ResourceRequest::new(), &Environment::new(Box::new(Local)))
            .unwrap();

        assert!(script.contains("if [ \"$RETURN_VALUE\" != \"0\" ]; then\n    echo rescue\nfi\n"));
        let guard = script.find("!= \"0\"").unwrap();
        assert!(script.find("false\n").unwrap() < guard);
    }

    #[test]
    fn test_render_places_directives_and_path() {
        let mut registry = HookRegistry::new();
        registry.add_payload_hook(command("true"), DEFAULT_PRIORITY);
        let mut request = ResourceRequest::new();
        request.job_name = Some("demo".to_string());
        let env = Environment::new(Box::new(Torque)).with_extra_path(vec!["/opt/bin".to_string()]);

        let script = ScriptAssembler::new(registry).render(&request, &env).unwrap();
        assert!(script.starts_with("#!/bin/sh\n#PBS -N demo\n"));
        assert!(script.contains("export PATH=\"/opt/bin\":\"$PATH\"\n"));
        assert!(script.contains("JOB_SUBMIT_DIR=\"$PBS_O_WORKDIR\"\n"));
    }
}
