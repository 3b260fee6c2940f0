// src/rules/input.rs

//! Input specifications and their compiled matchers.

use std::path::{Component, Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};
use regex::Regex;

use crate::config::Params;
use crate::errors::{FiledagError, Result};
use crate::rules::template::Template;

/// How a task finds its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum InputSpec {
    /// No input: a target, or an action task that runs once per run.
    #[default]
    None,
    /// One configuration-derived path, e.g. `{mapfasta}`.
    Literal(Template),
    /// Glob over the working directory; capture `1` is the file name with
    /// `suffix` (or else the last extension) removed.
    Glob {
        pattern: String,
        suffix: Option<String>,
    },
    /// Capturing regex applied to the listing of `dir`, which defaults to the
    /// literal directory prefix of the pattern.
    Regex {
        pattern: String,
        dir: Option<String>,
    },
}

impl InputSpec {
    pub fn literal(path: &str) -> Self {
        InputSpec::Literal(Template::parse(path))
    }

    pub fn glob(pattern: &str) -> Self {
        InputSpec::Glob {
            pattern: pattern.to_string(),
            suffix: None,
        }
    }

    pub fn glob_with_suffix(pattern: &str, suffix: &str) -> Self {
        InputSpec::Glob {
            pattern: pattern.to_string(),
            suffix: Some(suffix.to_string()),
        }
    }

    pub fn regex(pattern: &str) -> Self {
        InputSpec::Regex {
            pattern: pattern.to_string(),
            dir: None,
        }
    }

    /// Literal inputs must exist; patterns may legitimately match nothing.
    pub fn requires_input_by_default(&self) -> bool {
        matches!(self, InputSpec::Literal(_))
    }

    /// Compile against the resolved configuration.
    pub fn compile(&self, params: &Params) -> Result<InputMatcher> {
        match self {
            InputSpec::None => Ok(InputMatcher::None),
            InputSpec::Literal(template) => {
                let path = template
                    .render(|name| params.display(name))
                    .map_err(|e| FiledagError::ConfigError(format!("literal input '{template}': {e}")))?;
                Ok(InputMatcher::Literal(PathBuf::from(path)))
            }
            InputSpec::Glob { pattern, suffix } => {
                let glob = GlobBuilder::new(pattern)
                    .literal_separator(true)
                    .build()
                    .map_err(|e| FiledagError::ConfigError(format!("invalid glob pattern '{pattern}': {e}")))?
                    .compile_matcher();
                Ok(InputMatcher::Glob {
                    base: glob_base(pattern),
                    recursive: pattern.contains("**"),
                    glob,
                    suffix: suffix.clone(),
                })
            }
            InputSpec::Regex { pattern, dir } => {
                let regex = Regex::new(&format!("^(?:{pattern})$"))
                    .map_err(|e| FiledagError::ConfigError(format!("invalid regex '{pattern}': {e}")))?;
                let base = match dir {
                    Some(d) => PathBuf::from(d),
                    None => regex_base(pattern),
                };
                Ok(InputMatcher::Regex { base, regex })
            }
        }
    }
}

/// An [`InputSpec`] ready to be applied to a directory listing.
#[derive(Debug, Clone)]
pub enum InputMatcher {
    None,
    Literal(PathBuf),
    Glob {
        base: PathBuf,
        recursive: bool,
        glob: GlobMatcher,
        suffix: Option<String>,
    },
    Regex {
        base: PathBuf,
        regex: Regex,
    },
}

impl InputMatcher {
    /// Number of positional capture groups (excluding group 0).
    pub fn capture_count(&self) -> usize {
        match self {
            InputMatcher::None | InputMatcher::Literal(_) => 0,
            InputMatcher::Glob { .. } => 1,
            InputMatcher::Regex { regex, .. } => regex.captures_len().saturating_sub(1),
        }
    }

    pub fn capture_names(&self) -> Vec<String> {
        match self {
            InputMatcher::Regex { regex, .. } => {
                regex.capture_names().flatten().map(str::to_string).collect()
            }
            _ => Vec::new(),
        }
    }

    /// True if `name` is a capture this matcher produces.
    pub fn has_capture(&self, name: &str) -> bool {
        match name.parse::<usize>() {
            Ok(index) => index <= self.capture_count() && !matches!(self, InputMatcher::None),
            Err(_) => self.capture_names().iter().any(|n| n == name),
        }
    }
}

const GLOB_META: &[char] = &['*', '?', '[', '{'];
const REGEX_META: &[char] = &['^', '$', '*', '+', '?', '(', ')', '[', ']', '{', '}', '|'];

/// Leading directory components of a pattern that contain no metacharacters.
fn literal_prefix(pattern: &str, meta: &[char]) -> PathBuf {
    let trimmed = pattern.trim_start_matches('^');
    let mut parts: Vec<&str> = trimmed.split('/').collect();
    // The last component names the entries themselves.
    parts.pop();

    let mut base = PathBuf::new();
    for (i, part) in parts.iter().enumerate() {
        if part.contains(meta) {
            break;
        }
        if i == 0 && part.is_empty() {
            base.push("/");
        } else {
            base.push(part);
        }
    }
    base
}

fn glob_base(pattern: &str) -> PathBuf {
    literal_prefix(pattern, GLOB_META)
}

/// Directory listed for a regex input. `.` is accepted in directory names
/// (`input.dir/(.+).fastq.gz` lists `input.dir`), and escaped punctuation
/// (`input\.dir`) is read as the literal character. Scanning stops at the
/// first unescaped metacharacter or class escape such as `\w`.
fn regex_base(pattern: &str) -> PathBuf {
    let trimmed = pattern.trim_start_matches('^');
    let mut components: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut chars = trimmed.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('/') => components.push(std::mem::take(&mut current)),
                Some(next) if !next.is_ascii_alphanumeric() => current.push(next),
                _ => break,
            },
            '/' => components.push(std::mem::take(&mut current)),
            c if REGEX_META.contains(&c) => break,
            c => current.push(c),
        }
    }

    let mut base = PathBuf::new();
    for (i, part) in components.iter().enumerate() {
        if i == 0 && part.is_empty() {
            base.push("/");
        } else {
            base.push(part);
        }
    }
    base
}

/// Convert a relative path to the `/`-separated form patterns are matched on.
pub fn match_string(path: &Path) -> String {
    let parts: Vec<String> = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    let joined = parts.join("/");
    if path.has_root() {
        joined.replacen("//", "/", 1)
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_base_keeps_dotted_directories() {
        assert_eq!(regex_base("input.dir/(.+).fastq.gz"), PathBuf::from("input.dir"));
        assert_eq!(regex_base("^data/raw/(\\w+)_R1.fq"), PathBuf::from("data/raw"));
        assert_eq!(regex_base("(.+).txt"), PathBuf::new());
    }

    #[test]
    fn regex_base_reads_escaped_punctuation_literally() {
        assert_eq!(regex_base(r"input\.dir/(.+)\.fastq\.gz"), PathBuf::from("input.dir"));
        assert_eq!(regex_base(r"^run\-1\/reads\.dir/(.+)"), PathBuf::from("run-1/reads.dir"));
        assert_eq!(regex_base(r"data/\w+/(.+)\.bam"), PathBuf::from("data"));
        assert_eq!(regex_base(r"/abs/in\.d/(.+)"), PathBuf::from("/abs/in.d"));
    }

    #[test]
    fn glob_base_stops_at_wildcards() {
        assert_eq!(glob_base("input.dir/*.fastq.gz"), PathBuf::from("input.dir"));
        assert_eq!(glob_base("data/*/reads/*.bam"), PathBuf::from("data"));
        assert_eq!(glob_base("/abs/in/*.gz"), PathBuf::from("/abs/in"));
    }

    #[test]
    fn literal_input_renders_configuration_placeholders() {
        let params: Params = [("mapfasta", "/ref/hg38.fa")].into_iter().collect();
        match InputSpec::literal("{mapfasta}").compile(&params).unwrap() {
            InputMatcher::Literal(path) => assert_eq!(path, PathBuf::from("/ref/hg38.fa")),
            other => panic!("expected literal matcher, got {other:?}"),
        }
    }

    #[test]
    fn literal_input_with_unknown_key_is_a_config_error() {
        let params = Params::new();
        assert!(matches!(
            InputSpec::literal("{mapfasta}").compile(&params),
            Err(FiledagError::ConfigError(_))
        ));
    }

    #[test]
    fn regex_capture_names_and_counts() {
        let matcher = InputSpec::regex("input.dir/(?P<sample>.+)_(R[12]).fastq.gz")
            .compile(&Params::new())
            .unwrap();
        assert_eq!(matcher.capture_count(), 2);
        assert!(matcher.has_capture("sample"));
        assert!(matcher.has_capture("2"));
        assert!(!matcher.has_capture("3"));
    }

    #[test]
    fn match_string_drops_current_dir() {
        assert_eq!(match_string(Path::new("./input.dir/a.gz")), "input.dir/a.gz");
        assert_eq!(match_string(Path::new("/abs/a.gz")), "/abs/a.gz");
    }
}
