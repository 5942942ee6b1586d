use serde::{Deserialize, Serialize};

use crate::builders::reporter::{Diagnostics, Origin};
use crate::core::error::{BuildError, BuildResult};

const MB: u64 = 1024 * 1024;

/// One homogeneous group of requested compute nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeType {
    /// Number of nodes of this kind.
    pub no_nodes: u32,
    /// Processors requested on each of those nodes.
    pub no_procs: u32,
}

impl NodeType {
    /// A single node with `no_procs` processors.
    pub fn with_procs(no_procs: u32) -> Self {
        Self {
            no_nodes: 1,
            no_procs,
        }
    }
}

/// Files moved between the submit directory and the node work directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLists {
    /// Staged into the work directory before the payload runs.
    pub copy_in: Vec<String>,
    /// Copied back after a successful payload.
    pub copy_out: Vec<String>,
    /// Copied back by the error chain.
    pub copy_error_out: Vec<String>,
}

/// What a job needs from the queuing system.
///
/// The structure is filled incrementally: commandline values first, then
/// input-file directives and extracted hints fill what is still unset, and
/// finally explicit override arguments overwrite anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub job_name: Option<String>,
    pub node_types: Vec<NodeType>,
    /// Physical memory in bytes.
    pub physical_memory: Option<u64>,
    /// Virtual memory in bytes.
    pub virtual_memory: Option<u64>,
    /// Walltime in seconds.
    pub walltime: Option<u64>,
    pub queue: Option<String>,
    /// Extra queuing-system directives in the order they were given.
    pub directives: Vec<(String, String)>,
    pub files: FileLists,
}

impl ResourceRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of processors over all node-type records.
    pub fn no_procs(&self) -> u32 {
        self.node_types.iter().map(|n| n.no_nodes * n.no_procs).sum()
    }

    /// Total number of nodes over all node-type records.
    pub fn no_nodes(&self) -> u32 {
        self.node_types.iter().map(|n| n.no_nodes).sum()
    }

    pub fn add_node_type(&mut self, node: NodeType) {
        self.node_types.push(node);
    }

    /// Replaces every node-type record with a single one.
    pub fn set_procs(&mut self, no_procs: u32) {
        self.node_types = vec![NodeType::with_procs(no_procs)];
    }

    /// Raises the processor count to `wanted` by adding one record for the
    /// deficit. Returns the number of processors added, `None` if the
    /// existing allocation already covers the request.
    pub fn grow_procs_to(&mut self, wanted: u32) -> Option<u32> {
        let current = self.no_procs();
        if wanted <= current {
            return None;
        }
        let deficit = wanted - current;
        self.add_node_type(NodeType::with_procs(deficit));
        Some(deficit)
    }

    /// Sets or replaces a free-form directive, keeping its position.
    pub fn set_directive(&mut self, key: &str, value: &str) {
        match self.directives.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.directives.push((key.to_string(), value.to_string())),
        }
    }

    pub fn directive(&self, key: &str) -> Option<&str> {
        self.directives
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Enforces the memory invariant: virtual memory mirrors physical memory
    /// when unset and is never below it.
    pub fn finalize(&mut self, diagnostics: &mut Diagnostics) {
        match (self.physical_memory, self.virtual_memory) {
            (Some(physical), None) => self.virtual_memory = Some(physical),
            (Some(physical), Some(virt)) if virt < physical => {
                diagnostics.warn(
                    Origin::Resources,
                    format!(
                        "Virtual memory ({} MB) is below physical memory ({} MB), raising it to the physical memory",
                        virt / MB,
                        physical / MB
                    ),
                );
                self.virtual_memory = Some(physical);
            }
            _ => {}
        }
    }
}

/// Parses a memory size into bytes. Plain numbers are megabytes; the
/// suffixes `K`, `M`, `G` and `T` (optionally followed by `B`) are binary
/// multiples.
pub fn parse_memory_size(text: &str) -> BuildResult<u64> {
    let text = text.trim();
    let upper = text.to_ascii_uppercase();
    let trimmed = upper.strip_suffix('B').unwrap_or(&upper);
    let (digits, factor) = match trimmed.chars().last() {
        Some('K') => (&trimmed[..trimmed.len() - 1], 1024),
        Some('M') => (&trimmed[..trimmed.len() - 1], MB),
        Some('G') => (&trimmed[..trimmed.len() - 1], 1024 * MB),
        Some('T') => (&trimmed[..trimmed.len() - 1], 1024 * 1024 * MB),
        _ => (trimmed, MB),
    };
    digits
        .trim()
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(factor))
        .ok_or_else(|| BuildError::InvalidArgument(format!("Not a memory size: {text}")))
}

/// Parses `[[[d:]hh:]mm:]ss` into seconds.
pub fn parse_walltime(text: &str) -> BuildResult<u64> {
    let invalid = || BuildError::InvalidArgument(format!("Not a time interval: {text}"));
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.is_empty() || parts.len() > 4 {
        return Err(invalid());
    }

    const FACTORS: [u64; 4] = [1, 60, 3600, 86400];
    let mut seconds = 0u64;
    for (part, factor) in parts.iter().rev().zip(FACTORS) {
        let value: u64 = part.trim().parse().map_err(|_| invalid())?;
        seconds = value
            .checked_mul(factor)
            .and_then(|s| seconds.checked_add(s))
            .ok_or_else(invalid)?;
    }
    Ok(seconds)
}

/// Formats seconds as `hh:mm:ss`, hours may exceed 24.
pub fn format_walltime(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

/// Megabytes, rounded up, as queuing systems expect them.
pub fn bytes_to_mb(bytes: u64) -> u64 {
    bytes.div_ceil(MB)
}

/// Bytes for `mb` megabytes, saturating at `u64::MAX`.
pub fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(MB)
}

/// Bytes for `mb` megabytes, `None` if that does not fit a `u64`.
pub fn checked_mb_to_bytes(mb: u64) -> Option<u64> {
    mb.checked_mul(MB)
}
