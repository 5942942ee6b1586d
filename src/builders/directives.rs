//! `key=value` directives embedded in input-file comment lines, e.g.
//! `#QSYS wt=2:00:00 np=8`.

use crate::builders::reporter::{Diagnostics, Origin};
use crate::core::resources::{parse_memory_size, parse_walltime, ResourceRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub key: String,
    pub value: String,
    /// 1-based line number in the input file.
    pub line: usize,
}

/// Pulls directive lines out of an input file.
pub struct DirectiveParser<'a> {
    marker: &'a str,
}

impl<'a> DirectiveParser<'a> {
    pub fn new(marker: &'a str) -> Self {
        Self { marker }
    }

    /// Returns the directives found and the input with those lines removed.
    pub fn split(&self, content: &str, diagnostics: &mut Diagnostics) -> (Vec<Directive>, String) {
        let mut directives = Vec::new();
        let mut remaining = String::with_capacity(content.len());

        for (index, line) in content.lines().enumerate() {
            let Some(rest) = line.trim_start().strip_prefix(self.marker) else {
                remaining.push_str(line);
                remaining.push('\n');
                continue;
            };

            for word in rest.split_whitespace() {
                match word.split_once('=') {
                    Some((key, value)) if !key.is_empty() => directives.push(Directive {
                        key: key.to_ascii_lowercase(),
                        value: value.to_string(),
                        line: index + 1,
                    }),
                    _ => diagnostics.warn(
                        Origin::Directive,
                        format!(
                            "Ignoring malformed directive \"{word}\" on line {}, expected key=value",
                            index + 1
                        ),
                    ),
                }
            }
        }

        (directives, remaining)
    }
}

/// Fills unset fields of `request` from `directives`. Values that are
/// already set win; the directive is dropped with a warning.
pub fn apply_directives(
    directives: &[Directive],
    request: &mut ResourceRequest,
    diagnostics: &mut Diagnostics,
) {
    for directive in directives {
        let Directive { key, value, line } = directive;
        let already_set = |what: &str, diagnostics: &mut Diagnostics| {
            diagnostics.warn(
                Origin::Directive,
                format!("Ignoring {what} \"{value}\" from directive on line {line}, since it is already set"),
            )
        };
        let unparsable = |what: &str, diagnostics: &mut Diagnostics| {
            diagnostics.warn(
                Origin::Directive,
                format!("Ignoring {what} \"{value}\" from directive on line {line}, could not interpret it"),
            )
        };

        match key.as_str() {
            "name" => {
                if request.job_name.is_some() {
                    already_set("job name", diagnostics);
                } else {
                    request.job_name = Some(value.clone());
                }
            }
            "np" => match value.parse::<u32>() {
                Ok(_) if request.no_procs() > 0 => already_set("number of processors", diagnostics),
                Ok(n) if n > 0 => request.set_procs(n),
                _ => unparsable("number of processors", diagnostics),
            },
            "mem" => match parse_memory_size(value) {
                Ok(_) if request.physical_memory.is_some() => {
                    already_set("physical memory", diagnostics)
                }
                Ok(bytes) => request.physical_memory = Some(bytes),
                Err(_) => unparsable("physical memory", diagnostics),
            },
            "vmem" => match parse_memory_size(value) {
                Ok(_) if request.virtual_memory.is_some() => {
                    already_set("virtual memory", diagnostics)
                }
                Ok(bytes) => request.virtual_memory = Some(bytes),
                Err(_) => unparsable("virtual memory", diagnostics),
            },
            "wt" | "walltime" => match parse_walltime(value) {
                Ok(_) if request.walltime.is_some() => already_set("walltime", diagnostics),
                Ok(seconds) => request.walltime = Some(seconds),
                Err(_) => unparsable("walltime", diagnostics),
            },
            "queue" => {
                if request.queue.is_some() {
                    already_set("queue", diagnostics);
                } else {
                    request.queue = Some(value.clone());
                }
            }
            other => {
                if request.directive(other).is_some() {
                    already_set(&format!("directive {other}"), diagnostics);
                } else {
                    request.set_directive(other, value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::resources::mb_to_bytes;

    #[test]
    fn test_split_removes_directive_lines() {
        let content = "#QSYS np=4 wt=1:00:00\n! BP86\n  #QSYS account=chem\n";
        let mut diagnostics = Diagnostics::new();
        let (directives, rest) = DirectiveParser::new("#QSYS").split(content, &mut diagnostics);

        assert_eq!(rest, "! BP86\n");
        assert_eq!(directives.len(), 3);
        assert_eq!(directives[1].key, "wt");
        assert_eq!(directives[2].line, 3);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_split_warns_on_malformed_word() {
        let mut diagnostics = Diagnostics::new();
        let (directives, _) = DirectiveParser::new("!QSYS").split("!QSYS np 4\n", &mut diagnostics);
        assert!(directives.is_empty());
        assert_eq!(diagnostics.len(), 2);
    }

    #[test]
    fn test_apply_fills_only_unset_fields() {
        let mut diagnostics = Diagnostics::new();
        let (directives, _) = DirectiveParser::new("#QSYS")
            .split("#QSYS np=8 mem=2G wt=30:00 gres=gpu:1\n", &mut diagnostics);

        let mut request = ResourceRequest::new();
        request.set_procs(2);
        apply_directives(&directives, &mut request, &mut diagnostics);

        assert_eq!(request.no_procs(), 2);
        assert_eq!(request.physical_memory, Some(mb_to_bytes(2048)));
        assert_eq!(request.walltime, Some(1800));
        assert_eq!(request.directive("gres"), Some("gpu:1"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics.mentions("number of processors"));
    }

    #[test]
    fn test_apply_warns_on_bad_values() {
        let mut diagnostics = Diagnostics::new();
        let (directives, _) =
            DirectiveParser::new("#QSYS").split("#QSYS np=many wt=later\n", &mut diagnostics);
        let mut request = ResourceRequest::new();
        apply_directives(&directives, &mut request, &mut diagnostics);

        assert_eq!(request.no_procs(), 0);
        assert_eq!(request.walltime, None);
        assert_eq!(diagnostics.len(), 2);
    }
}
