// src/rules/matches.rs

//! Concrete bindings of a task's input pattern to files on disk.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::engine::TaskName;

/// Substrings captured while matching an input pattern.
///
/// Positional captures are 1-based like regex groups; index 0 holds the whole
/// matched path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    positional: Vec<Option<String>>,
    named: BTreeMap<String, String>,
}

impl Captures {
    pub fn new(positional: Vec<Option<String>>, named: BTreeMap<String, String>) -> Self {
        Self { positional, named }
    }

    /// Look up `0`, `1`, ... or a named group. Unmatched optional groups read
    /// as empty strings.
    pub fn get(&self, name: &str) -> Option<&str> {
        match name.parse::<usize>() {
            Ok(index) => self
                .positional
                .get(index)
                .map(|v| v.as_deref().unwrap_or("")),
            Err(_) => self.named.get(name).map(String::as_str),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

/// Identifies one Match within a run: the task plus the Match id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatchKey {
    pub task: TaskName,
    pub id: String,
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.task, self.id)
    }
}

/// One concrete binding of a task's input specification.
///
/// All paths are relative to the workspace root unless they were absolute in
/// the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub task: TaskName,
    pub inputs: Vec<PathBuf>,
    pub aux: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub captures: Captures,
}

impl Match {
    /// The primary input path, or the first output for input-less tasks.
    pub fn id(&self) -> String {
        self.inputs
            .first()
            .or_else(|| self.outputs.first())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| "-".to_string())
    }

    pub fn key(&self) -> MatchKey {
        MatchKey {
            task: self.task.clone(),
            id: self.id(),
        }
    }

    /// Primary and auxiliary inputs.
    pub fn all_inputs(&self) -> impl Iterator<Item = &PathBuf> {
        self.inputs.iter().chain(self.aux.iter())
    }

    /// Value of a command-template binding, if `name` is one.
    pub fn binding(&self, name: &str) -> Option<String> {
        match name {
            "input" => self.inputs.first().map(|p| display(p)),
            "inputs" => Some(join(self.all_inputs())),
            "output" => self.outputs.first().map(|p| display(p)),
            "outputs" => Some(join(self.outputs.iter())),
            "aux" => Some(join(self.aux.iter())),
            "task" => Some(self.task.clone()),
            _ => {
                if let Some(index) = aux_index(name) {
                    return self.aux.get(index).map(|p| display(p));
                }
                self.captures.get(name).map(str::to_string)
            }
        }
    }
}

/// Names a command template may use besides captures and configuration keys.
pub const COMMAND_BINDINGS: &[&str] = &["input", "inputs", "output", "outputs", "aux", "task"];

/// `aux0`, `aux1`, ... -> index.
pub fn aux_index(name: &str) -> Option<usize> {
    name.strip_prefix("aux")
        .filter(|rest| !rest.is_empty())
        .and_then(|rest| rest.parse().ok())
}

fn display(path: &PathBuf) -> String {
    path.to_string_lossy().into_owned()
}

fn join<'a>(paths: impl Iterator<Item = &'a PathBuf>) -> String {
    paths.map(display).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Match {
        Match {
            task: "align".into(),
            inputs: vec![PathBuf::from("input.dir/s1.fastq.gz")],
            aux: vec![PathBuf::from("genome.dir/ref.fa"), PathBuf::from("genes.gtf")],
            outputs: vec![PathBuf::from("out.dir/s1.bam")],
            captures: Captures::new(
                vec![Some("input.dir/s1.fastq.gz".into()), Some("s1".into()), None],
                BTreeMap::from([("sample".to_string(), "s1".to_string())]),
            ),
        }
    }

    #[test]
    fn bindings_cover_paths_and_captures() {
        let m = sample();
        assert_eq!(m.binding("input").unwrap(), "input.dir/s1.fastq.gz");
        assert_eq!(
            m.binding("inputs").unwrap(),
            "input.dir/s1.fastq.gz genome.dir/ref.fa genes.gtf"
        );
        assert_eq!(m.binding("aux1").unwrap(), "genes.gtf");
        assert_eq!(m.binding("1").unwrap(), "s1");
        assert_eq!(m.binding("2").unwrap(), "");
        assert_eq!(m.binding("sample").unwrap(), "s1");
        assert_eq!(m.binding("samtool"), None);
    }

    #[test]
    fn key_uses_primary_input() {
        let key = sample().key();
        assert_eq!(key.to_string(), "align[input.dir/s1.fastq.gz]");
    }

    #[test]
    fn input_less_match_is_keyed_by_output() {
        let m = Match {
            task: "report".into(),
            inputs: vec![],
            aux: vec![],
            outputs: vec![PathBuf::from("report.html")],
            captures: Captures::default(),
        };
        assert_eq!(m.id(), "report.html");
    }
}
