use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use crate::builders::directives::{apply_directives, DirectiveParser};
use crate::builders::patterns::{quoted_words, strip_comments, strip_prefix_ignore_case};
use crate::builders::reporter::{Diagnostics, Origin};
use crate::builders::sections::{Section, SectionScanner};
use crate::core::error::{BuildError, BuildResult};
use crate::core::resources::{checked_mb_to_bytes, ResourceRequest};

/// Resource hints recovered from an input file. Folded into the
/// [`ResourceRequest`] once by [`fold_hints`] and then discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedHints {
    /// Number of processes the program will start.
    pub cpus: Option<u32>,
    /// Memory per process in MB.
    pub memory_per_cpu_mb: Option<u64>,
    /// Total memory in MB.
    pub total_memory_mb: Option<u64>,
    /// Auxiliary files the input refers to.
    pub files: Vec<String>,
}

impl ExtractedHints {
    fn raise_cpus(&mut self, n: u32) {
        self.cpus = Some(self.cpus.map_or(n, |c| c.max(n)));
    }

    fn raise_memory_per_cpu(&mut self, mb: u64) {
        self.memory_per_cpu_mb = Some(self.memory_per_cpu_mb.map_or(mb, |m| m.max(mb)));
    }

    fn add_file(&mut self, file: &str) {
        if !file.is_empty() && !self.files.iter().any(|f| f == file) {
            self.files.push(file.to_string());
        }
    }
}

/// A reader for the input format of one program.
///
/// Implementations never fail: anything they do not understand becomes a
/// diagnostic, since they parse a best-effort superset of a format they do
/// not fully know.
pub trait InputImporter {
    /// Comment prefix introducing `key=value` directive lines.
    fn directive_marker(&self) -> &str;

    /// Scans `content`, from which directive lines were already removed.
    fn extract(&self, content: &str, diagnostics: &mut Diagnostics) -> ExtractedHints;
}

/// Reads `path`, applies its directives and folds the extracted hints into
/// `request`. Only an unreadable file is an error.
pub fn import_input_file(
    importer: &dyn InputImporter,
    path: &Path,
    request: &mut ResourceRequest,
    memory_margin_mb: u64,
) -> BuildResult<Diagnostics> {
    let content = fs::read_to_string(path).map_err(|source| BuildError::InputFileUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("Scanning input file {}", path.display());

    let mut diagnostics = Diagnostics::new();
    let (directives, body) =
        DirectiveParser::new(importer.directive_marker()).split(&content, &mut diagnostics);
    apply_directives(&directives, request, &mut diagnostics);

    let hints = importer.extract(&body, &mut diagnostics);
    tracing::debug!(?hints, "Extracted hints");
    fold_hints(hints, request, memory_margin_mb, &mut diagnostics);
    Ok(diagnostics)
}

/// Merges `hints` into `request` without ever shrinking what is configured.
///
/// A larger CPU count adds one node-type record for the deficit. Memory
/// hints only apply when no physical memory is set; per-process memory is
/// scaled by the hinted CPU count (or one) and padded by `memory_margin_mb`.
pub fn fold_hints(
    hints: ExtractedHints,
    request: &mut ResourceRequest,
    memory_margin_mb: u64,
    diagnostics: &mut Diagnostics,
) {
    if let Some(cpus) = hints.cpus {
        let configured = request.no_procs();
        if request.grow_procs_to(cpus).is_none() {
            diagnostics.warn(
                Origin::InputFile,
                format!(
                    "Ignoring CPU count {cpus} from input file, since {configured} processors are already configured"
                ),
            );
        }
    }

    if let Some(per_cpu) = hints.memory_per_cpu_mb {
        let total = per_cpu
            .checked_mul(u64::from(hints.cpus.unwrap_or(1).max(1)))
            .and_then(|mb| mb.checked_add(memory_margin_mb));
        match total {
            Some(total) => set_memory_hint(request, total, "per-process memory", diagnostics),
            None => diagnostics.warn(
                Origin::InputFile,
                format!("Ignoring per-process memory of {per_cpu} MB from input file, the total is too large"),
            ),
        }
    }

    if let Some(total) = hints.total_memory_mb {
        set_memory_hint(request, total, "total memory", diagnostics);
    }

    for file in hints.files {
        if !request.files.copy_in.contains(&file) {
            request.files.copy_in.push(file);
        }
    }
}

fn set_memory_hint(
    request: &mut ResourceRequest,
    mb: u64,
    what: &str,
    diagnostics: &mut Diagnostics,
) {
    if request.physical_memory.is_some() {
        diagnostics.warn(
            Origin::InputFile,
            format!(
                "Ignoring memory of {mb} MB derived from the {what} in the input file, since physical memory is already configured"
            ),
        );
        return;
    }
    match checked_mb_to_bytes(mb) {
        Some(bytes) => request.physical_memory = Some(bytes),
        None => diagnostics.warn(
            Origin::InputFile,
            format!("Ignoring memory of {mb} MB derived from the {what} in the input file, it is too large"),
        ),
    }
}

// --- ORCA ---------------------------------------------------------------

/// Keywords after `*` that load the geometry from a file:
/// `* xyzfile <charge> <multiplicity> <file>`.
const GEOMETRY_FILE_KEYWORDS: &[&str] = &["xyzfile", "gzmtfile", "pdbfile"];
const GEOMETRY_FILE_ARITY: usize = 4;

/// Keywords after `*` that start an inline geometry block closed by `*`.
const GEOMETRY_BLOCK_KEYWORDS: &[&str] = &["xyz", "int", "internal", "gzmt", "pdb"];

/// Keywords inside a `%` section that need their own `end`.
const NESTED_BLOCK_KEYWORDS: &[&str] = &[
    "constraints",
    "scan",
    "coords",
    "newgto",
    "addgto",
    "newauxjgto",
    "newauxcgto",
    "newauxjkgto",
    "newecp",
    "pardef",
    "modify_internal",
];

static NPROCS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bnprocs\s+(\S+)").expect("nprocs pattern is valid"));
static MAXCORE_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^%\s*maxcore").expect("maxcore pattern is valid"));

/// Reader for ORCA input files.
///
/// Understands the `!` simple-input line (`PALn`), `%maxcore`, `%moinp`,
/// geometry file references and `%section ... end` blocks, of which `%pal`
/// yields the process count and every other section is searched for
/// `maxcore`.
pub struct OrcaImporter {
    directive_marker: String,
}

impl OrcaImporter {
    pub fn new(directive_marker: &str) -> Self {
        Self {
            directive_marker: directive_marker.to_string(),
        }
    }

    fn scan_simple_input(line: &str, hints: &mut ExtractedHints) {
        for word in line.trim_start_matches('!').split_whitespace() {
            if let Some(n) = strip_prefix_ignore_case(word, "pal").and_then(|d| d.parse().ok()) {
                hints.raise_cpus(n);
            }
        }
    }

    fn handle_section(section: &Section, hints: &mut ExtractedHints) {
        match section.name.as_str() {
            "pal" => {
                for caps in NPROCS.captures_iter(&section.body) {
                    if let Ok(n) = caps[1].parse::<u32>() {
                        hints.raise_cpus(n);
                    }
                }
            }
            _ => {
                let tokens: Vec<&str> = section.body.split_whitespace().collect();
                for pair in tokens.windows(2) {
                    if pair[0].eq_ignore_ascii_case("maxcore")
                        && let Ok(mb) = pair[1].parse::<u64>()
                    {
                        hints.raise_memory_per_cpu(mb);
                    }
                }
            }
        }
    }
}

impl InputImporter for OrcaImporter {
    fn directive_marker(&self) -> &str {
        &self.directive_marker
    }

    fn extract(&self, content: &str, diagnostics: &mut Diagnostics) -> ExtractedHints {
        let mut hints = ExtractedHints::default();
        let mut deferred = Vec::new();
        let mut in_geometry_block = false;

        for (index, raw) in content.lines().enumerate() {
            let stripped = strip_comments(raw, '#');
            let line = stripped.trim();

            if in_geometry_block {
                in_geometry_block = !line.starts_with('*');
                continue;
            }
            if line.is_empty() {
                continue;
            }

            if line.starts_with('!') {
                Self::scan_simple_input(line, &mut hints);
                continue;
            }

            if let Some(rest) = line.strip_prefix('*') {
                let words = quoted_words(rest, '"');
                let keyword = words.first().map(|w| w.to_ascii_lowercase());
                match keyword.as_deref() {
                    Some(k)
                        if GEOMETRY_FILE_KEYWORDS.contains(&k)
                            && words.len() == GEOMETRY_FILE_ARITY =>
                    {
                        hints.add_file(&words[GEOMETRY_FILE_ARITY - 1]);
                        continue;
                    }
                    Some(k) if GEOMETRY_BLOCK_KEYWORDS.contains(&k) => {
                        in_geometry_block = true;
                        continue;
                    }
                    _ => {}
                }
            }

            if let Some(rest) = strip_prefix_ignore_case(line, "%maxcore")
                && rest.starts_with(char::is_whitespace)
            {
                if let Ok(mb) = rest.trim().parse::<u64>() {
                    hints.raise_memory_per_cpu(mb);
                }
                continue;
            }
            if MAXCORE_LIKE.is_match(line) {
                diagnostics.warn(
                    Origin::InputFile,
                    format!(
                        "Line {} looks like a maxcore setting but is not written as \"%maxcore <MB>\", ignoring it: {line}",
                        index + 1
                    ),
                );
                continue;
            }

            if let Some(rest) = strip_prefix_ignore_case(line, "%moinp")
                && rest.starts_with(char::is_whitespace)
            {
                let words = quoted_words(rest, '"');
                if let [file] = words.as_slice() {
                    hints.add_file(file);
                    continue;
                }
            }

            deferred.push(line.to_string());
        }

        let stream = deferred.join("\n");
        let mut scanner = SectionScanner::new('%', "end", NESTED_BLOCK_KEYWORDS);
        for token in stream.split_whitespace() {
            if let Some(section) = scanner.feed(token) {
                tracing::trace!(name = %section.name, "Closed section");
                Self::handle_section(&section, &mut hints);
            }
        }

        let leftovers = scanner.finish();
        if !leftovers.ignored.is_empty() {
            diagnostics.warn(
                Origin::InputFile,
                format!(
                    "Ignored input outside of any section: {}",
                    leftovers.ignored.join(" ")
                ),
            );
        }
        if let Some(name) = leftovers.unterminated {
            diagnostics.warn(
                Origin::InputFile,
                format!("Section %{name} is never closed with \"end\", ignoring it"),
            );
        }

        hints
    }
}

// --- Q-Chem -------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QChemSection {
    Molecule,
    Rem,
    Other,
}

/// Reader for Q-Chem input files with `$section ... $end` blocks.
///
/// `$molecule` may name a geometry file via `READ <file>`; `$rem` carries
/// `threads` and `mem_total` (MB).
pub struct QChemImporter {
    directive_marker: String,
}

impl QChemImporter {
    pub fn new(directive_marker: &str) -> Self {
        Self {
            directive_marker: directive_marker.to_string(),
        }
    }

    fn rem_value<T: std::str::FromStr>(line: &str, key: &str) -> Option<T> {
        let mut words = line
            .split(|c: char| c.is_whitespace() || c == '=')
            .filter(|w| !w.is_empty());
        let found = words.next()?;
        if !found.eq_ignore_ascii_case(key) {
            return None;
        }
        words.next()?.parse().ok()
    }
}

impl InputImporter for QChemImporter {
    fn directive_marker(&self) -> &str {
        &self.directive_marker
    }

    fn extract(&self, content: &str, diagnostics: &mut Diagnostics) -> ExtractedHints {
        let mut hints = ExtractedHints::default();
        let mut section: Option<QChemSection> = None;
        let mut ignored = Vec::new();

        for raw in content.lines() {
            // `!` starts a comment running to the end of the line.
            let line = raw.split('!').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            if strip_prefix_ignore_case(line, "$end").is_some() {
                section = None;
                continue;
            }

            match section {
                None => {
                    if let Some(name) = line.strip_prefix('$') {
                        section = Some(match name.to_ascii_lowercase().as_str() {
                            "molecule" => QChemSection::Molecule,
                            "rem" => QChemSection::Rem,
                            _ => QChemSection::Other,
                        });
                    } else {
                        ignored.push(line.to_string());
                    }
                }
                Some(QChemSection::Molecule) => {
                    if let Some(rest) = strip_prefix_ignore_case(line, "read")
                        && let Some(file) = quoted_words(rest, '"').first()
                    {
                        hints.add_file(file);
                    }
                }
                Some(QChemSection::Rem) => {
                    if let Some(n) = Self::rem_value::<u32>(line, "threads") {
                        hints.raise_cpus(n);
                    } else if let Some(mb) = Self::rem_value::<u64>(line, "mem_total") {
                        hints.total_memory_mb =
                            Some(hints.total_memory_mb.map_or(mb, |m| m.max(mb)));
                    }
                }
                Some(QChemSection::Other) => {}
            }
        }

        if !ignored.is_empty() {
            diagnostics.warn(
                Origin::InputFile,
                format!("Ignored input outside of any section: {}", ignored.join(" ")),
            );
        }
        if section.is_some() {
            diagnostics.warn(Origin::InputFile, "Last section is never closed with $end");
        }
        hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resources::{mb_to_bytes, NodeType};
    use tempfile::tempdir;

    fn orca(content: &str) -> (ExtractedHints, Diagnostics) {
        let mut diagnostics = Diagnostics::new();
        let hints = OrcaImporter::new("#QSYS").extract(content, &mut diagnostics);
        (hints, diagnostics)
    }

    #[test]
    fn test_orca_simple_input_pal() {
        let (hints, diagnostics) = orca("! BP86 def2-SVP pal8 # fast # TightSCF\n");
        assert_eq!(hints.cpus, Some(8));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_orca_pal_invalid_number_is_ignored() {
        let (hints, diagnostics) = orca("! PALx Opt\n");
        assert_eq!(hints.cpus, None);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_orca_pal_section_and_maxcore() {
        let content = "%maxcore 500\n%pal\n  nprocs 12\nend\n%scf maxcore 800 end\n";
        let (hints, diagnostics) = orca(content);
        assert_eq!(hints.cpus, Some(12));
        assert_eq!(hints.memory_per_cpu_mb, Some(800));
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn test_orca_maxcore_keeps_maximum() {
        let (hints, _) = orca("%maxcore 2000\n%maxcore 1000\n%maxcore lots\n");
        assert_eq!(hints.memory_per_cpu_mb, Some(2000));
    }

    #[test]
    fn test_orca_maxcore_near_miss_warns() {
        let (hints, diagnostics) = orca("% maxcore 500\n");
        assert_eq!(hints.memory_per_cpu_mb, None);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.mentions("maxcore"));
    }

    #[test]
    fn test_orca_xyzfile_with_quoted_name() {
        let (hints, _) = orca("*xyzfile 0 1 \"my file.xyz\"\n");
        assert_eq!(hints.files, vec!["my file.xyz"]);

        let (hints, _) = orca("* XYZFILE 0 1 geom.xyz\n");
        assert_eq!(hints.files, vec!["geom.xyz"]);
    }

    #[test]
    fn test_orca_xyzfile_wrong_arity_is_not_a_file_reference() {
        let (hints, diagnostics) = orca("* xyzfile 0 geom.xyz\n");
        assert!(hints.files.is_empty());
        assert!(diagnostics.mentions("outside of any section"));
    }

    #[test]
    fn test_orca_inline_geometry_is_skipped() {
        let content = "* xyz 0 1\nO 0.0 0.0 0.0\nH %pal 0.0 0.0\n*\n%pal nprocs 2 end\n";
        let (hints, diagnostics) = orca(content);
        assert_eq!(hints.cpus, Some(2));
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn test_orca_nested_block_needs_two_ends() {
        let content = "%geom Constraints\n { B 0 1 C }\n end\n maxcore 300\nend\n";
        let (hints, diagnostics) = orca(content);
        assert_eq!(hints.memory_per_cpu_mb, Some(300));
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn test_orca_moinp_file() {
        let (hints, _) = orca("%moinp \"guess orbitals.gbw\"\n");
        assert_eq!(hints.files, vec!["guess orbitals.gbw"]);
    }

    #[test]
    fn test_orca_stray_tokens_warn() {
        let (_, diagnostics) = orca("bogus stuff\n%pal nprocs 2 end\n");
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.mentions("bogus stuff"));
    }

    #[test]
    fn test_orca_comment_hides_section() {
        let (hints, diagnostics) = orca("# %pal nprocs 16 end #\n! PAL2\n");
        assert_eq!(hints.cpus, Some(2));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_qchem_sections() {
        let content = "$molecule\nREAD geom.xyz\n$end\n\n$rem\n  threads 6\n  mem_total = 4000 ! MB\n$end\n";
        let mut diagnostics = Diagnostics::new();
        let hints = QChemImporter::new("!QSYS").extract(content, &mut diagnostics);

        assert_eq!(hints.cpus, Some(6));
        assert_eq!(hints.total_memory_mb, Some(4000));
        assert_eq!(hints.files, vec!["geom.xyz"]);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_fold_adds_deficit_node() {
        let mut request = ResourceRequest::new();
        request.set_procs(4);
        let mut diagnostics = Diagnostics::new();
        let hints = ExtractedHints {
            cpus: Some(10),
            ..Default::default()
        };
        fold_hints(hints, &mut request, 100, &mut diagnostics);

        assert_eq!(request.node_types.len(), 2);
        assert_eq!(request.node_types[1], NodeType::with_procs(6));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_fold_smaller_cpu_hint_warns() {
        let mut request = ResourceRequest::new();
        request.set_procs(4);
        let mut diagnostics = Diagnostics::new();
        for cpus in [2, 4] {
            let hints = ExtractedHints {
                cpus: Some(cpus),
                ..Default::default()
            };
            fold_hints(hints, &mut request, 100, &mut diagnostics);
        }

        assert_eq!(request.node_types.len(), 1);
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_fold_memory_scaled_by_cpus_plus_margin() {
        let mut request = ResourceRequest::new();
        let hints = ExtractedHints {
            cpus: Some(4),
            memory_per_cpu_mb: Some(500),
            ..Default::default()
        };
        fold_hints(hints, &mut request, 100, &mut Diagnostics::new());
        assert_eq!(request.physical_memory, Some(mb_to_bytes(2100)));

        let mut request = ResourceRequest::new();
        let hints = ExtractedHints {
            memory_per_cpu_mb: Some(500),
            ..Default::default()
        };
        fold_hints(hints, &mut request, 100, &mut Diagnostics::new());
        assert_eq!(request.physical_memory, Some(mb_to_bytes(600)));
    }

    #[test]
    fn test_fold_memory_does_not_override() {
        let mut request = ResourceRequest::new();
        request.physical_memory = Some(mb_to_bytes(8000));
        let mut diagnostics = Diagnostics::new();
        let hints = ExtractedHints {
            memory_per_cpu_mb: Some(500),
            ..Default::default()
        };
        fold_hints(hints, &mut request, 100, &mut diagnostics);

        assert_eq!(request.physical_memory, Some(mb_to_bytes(8000)));
        assert_eq!(diagnostics.len(), 1);
    }

    fn import(importer: &dyn InputImporter, content: &str) -> (ResourceRequest, Diagnostics) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("job.inp");
        std::fs::write(&path, content).unwrap();
        let mut request = ResourceRequest::new();
        let diagnostics = import_input_file(importer, &path, &mut request, 100).unwrap();
        (request, diagnostics)
    }

    #[test]
    fn test_huge_maxcore_is_dropped_with_warning() {
        let orca = OrcaImporter::new("#QSYS");

        let (request, diagnostics) = import(&orca, "%maxcore 20000000000000\n");
        assert_eq!(request.physical_memory, None);
        assert!(diagnostics.mentions("too large"));

        let (request, diagnostics) = import(&orca, "! PAL8\n%maxcore 3000000000000000000\n");
        assert_eq!(request.physical_memory, None);
        assert_eq!(request.no_procs(), 8);
        assert!(diagnostics.mentions("too large"));
    }

    #[test]
    fn test_huge_walltime_directive_is_dropped_with_warning() {
        let (request, diagnostics) = import(
            &OrcaImporter::new("#QSYS"),
            "#QSYS wt=300000000000000:00:00:00\n! PAL2\n",
        );
        assert_eq!(request.walltime, None);
        assert!(diagnostics.mentions("walltime"));
    }

    #[test]
    fn test_huge_qchem_mem_total_is_dropped_with_warning() {
        let (request, diagnostics) = import(
            &QChemImporter::new("!QSYS"),
            "$rem\n  mem_total 20000000000000\n$end\n",
        );
        assert_eq!(request.physical_memory, None);
        assert!(diagnostics.mentions("too large"));
    }
}
