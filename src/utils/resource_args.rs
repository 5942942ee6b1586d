use clap::{Args, Parser};

use crate::core::error::BuildError;
use crate::core::resources::{parse_memory_size, parse_walltime, ResourceRequest};

/// Resource options shared by every job subcommand.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceArgs {
    /// Name of the job in the queue
    #[arg(short = 'N', long = "job-name")]
    pub job_name: Option<String>,

    /// Number of processors (on one node)
    #[arg(long)]
    pub np: Option<u32>,

    /// Physical memory, e.g. 2G or 500 (MB)
    #[arg(long, value_parser = parse_memory_size)]
    pub mem: Option<u64>,

    /// Virtual memory, defaults to the physical memory
    #[arg(long, value_parser = parse_memory_size)]
    pub vmem: Option<u64>,

    /// Walltime as [[[d:]hh:]mm:]ss
    #[arg(long, value_parser = parse_walltime)]
    pub walltime: Option<u64>,

    /// Queue or partition to submit to
    #[arg(long)]
    pub queue: Option<String>,

    /// Extra queuing system directive, repeatable
    #[arg(long = "directive", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub directives: Vec<(String, String)>,
}

impl ResourceArgs {
    /// Writes every option that was given into `request`, replacing what is
    /// there.
    pub fn apply(&self, request: &mut ResourceRequest) {
        if let Some(name) = &self.job_name {
            request.job_name = Some(name.clone());
        }
        if let Some(np) = self.np {
            request.set_procs(np);
        }
        if let Some(mem) = self.mem {
            request.physical_memory = Some(mem);
        }
        if let Some(vmem) = self.vmem {
            request.virtual_memory = Some(vmem);
        }
        if let Some(walltime) = self.walltime {
            request.walltime = Some(walltime);
        }
        if let Some(queue) = &self.queue {
            request.queue = Some(queue.clone());
        }
        for (key, value) in &self.directives {
            request.set_directive(key, value);
        }
    }
}

/// Parser for the string passed to `-q/--qsys-args`.
#[derive(Parser, Debug)]
#[command(no_binary_name = true)]
struct OverrideArgs {
    #[command(flatten)]
    resources: ResourceArgs,
}

/// Parses override arguments like `"--np 8 --mem 4G"`.
pub fn parse_override_args(text: &str) -> Result<ResourceArgs, BuildError> {
    OverrideArgs::try_parse_from(text.split_whitespace())
        .map(|parsed| parsed.resources)
        .map_err(|e| {
            let message = e.to_string();
            let first = message.lines().next().unwrap_or_default().trim();
            BuildError::InvalidArgument(format!("in --qsys-args: {first}"))
        })
}

fn parse_key_value(text: &str) -> Result<(String, String), BuildError> {
    match text.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(BuildError::InvalidArgument(format!(
            "Expected KEY=VALUE, got {text}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resources::mb_to_bytes;

    #[test]
    fn test_parse_override_args() {
        let args = parse_override_args("--np 8 --mem 4G --directive account=chem").unwrap();
        assert_eq!(args.np, Some(8));
        assert_eq!(args.mem, Some(mb_to_bytes(4096)));
        assert_eq!(args.directives, vec![("account".to_string(), "chem".to_string())]);
    }

    #[test]
    fn test_parse_override_args_rejects_garbage() {
        assert!(parse_override_args("--np lots").is_err());
        assert!(parse_override_args("--unknown").is_err());
        assert!(parse_override_args("--walltime 300000000000000:00:00:00").is_err());
    }

    #[test]
    fn test_apply_overwrites() {
        let mut request = ResourceRequest::new();
        request.set_procs(2);
        request.physical_memory = Some(mb_to_bytes(100));

        let args = ResourceArgs {
            np: Some(16),
            job_name: Some("override".to_string()),
            ..Default::default()
        };
        args.apply(&mut request);

        assert_eq!(request.no_procs(), 16);
        assert_eq!(request.node_types.len(), 1);
        assert_eq!(request.job_name.as_deref(), Some("override"));
        assert_eq!(request.physical_memory, Some(mb_to_bytes(100)));
    }
}
