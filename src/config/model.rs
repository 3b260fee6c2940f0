// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::config::resolver::{SiblingImport, PARAMS_FILE_NAME};
use crate::types::{HashStorageMode, StalenessMode};

/// Top-level pipeline definition as read from a TOML file.
///
/// ```toml
/// [config]
/// jobs = 4
///
/// [default]
/// threads = 1
/// memory = "4G"
///
/// [import]
/// prefix = "annotations_"
///
/// [task.reference_creation]
/// input = { path = "{mapfasta}" }
/// output = "genome.dir/reference.fasta"
/// cmd = "ln -s {input} {output}"
///
/// [target.full]
/// follows = ["reference_creation"]
/// ```
///
/// This is the unvalidated form; see [`PipelineFile`].
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawPipelineFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// Sibling configuration import, from `[import]`. Without the section the
    /// annotations import runs with its defaults.
    #[serde(default)]
    pub import: Option<ImportSection>,

    /// All tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,

    /// Dependency-only goals from `[target.<name>]`.
    #[serde(default)]
    pub target: BTreeMap<String, TargetConfig>,
}

/// A pipeline definition that passed validation.
///
/// Only constructible through `TryFrom<RawPipelineFile>` (see
/// `config::validate`), so holders can rely on inputs being well-formed,
/// `follows` naming declared tasks and resource strings parsing.
#[derive(Debug, Clone)]
pub struct PipelineFile {
    config: ConfigSection,
    default: DefaultSection,
    import: Option<ImportSection>,
    task: BTreeMap<String, TaskConfig>,
    target: BTreeMap<String, TargetConfig>,
}

impl PipelineFile {
    pub(crate) fn new_unchecked(raw: RawPipelineFile) -> Self {
        Self {
            config: raw.config,
            default: raw.default,
            import: raw.import,
            task: raw.task,
            target: raw.target,
        }
    }

    pub fn config_section(&self) -> &ConfigSection {
        &self.config
    }

    pub fn default_section(&self) -> &DefaultSection {
        &self.default
    }

    pub fn import_section(&self) -> Option<&ImportSection> {
        self.import.as_ref()
    }

    /// The sibling import to run: the annotations import unless `[import]`
    /// overrides it or turns it off with `enabled = false`.
    pub fn sibling_import(&self) -> Option<SiblingImport> {
        match &self.import {
            None => Some(SiblingImport::annotations()),
            Some(section) if !section.enabled.unwrap_or(true) => None,
            Some(section) => Some(section.to_sibling_import()),
        }
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }

    pub fn targets(&self) -> &BTreeMap<String, TargetConfig> {
        &self.target
    }
}

/// `[config]` section: orchestration settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Worker budget: how many thread slots may be busy at once.
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    #[serde(default)]
    pub staleness: StalenessMode,

    /// Where `staleness = "hash"` keeps its digests.
    #[serde(default)]
    pub hash_storage: HashStorageMode,

    /// Directory (relative to the working directory) receiving one log file
    /// per external invocation.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    /// Parameter files in increasing precedence. When absent the layered
    /// default (`<pipeline dir>/pipeline.toml`, `../pipeline.toml`,
    /// `pipeline.toml`) is used.
    #[serde(default)]
    pub sources: Option<Vec<String>>,

    /// Parameter keys that must be present after merging.
    #[serde(default)]
    pub required: Vec<String>,

    /// Prefixed (with `&&`) to the command of any task naming an
    /// execution environment, e.g. `"conda activate {environment}"`.
    #[serde(default)]
    pub environment_activate: Option<String>,
}

fn default_jobs() -> usize {
    4
}

fn default_log_dir() -> String {
    ".filedag/logs".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            jobs: default_jobs(),
            staleness: StalenessMode::default(),
            hash_storage: HashStorageMode::default(),
            log_dir: default_log_dir(),
            sources: None,
            required: Vec::new(),
            environment_activate: None,
        }
    }
}

/// `[default]` section: resource profile applied to tasks that do not set
/// their own values.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DefaultSection {
    #[serde(default)]
    pub threads: Option<u32>,

    #[serde(default)]
    pub memory: Option<String>,

    #[serde(default)]
    pub environment: Option<String>,

    #[serde(default)]
    pub timeout: Option<String>,
}

/// `[import]` section; every field falls back to the annotations import.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ImportSection {
    /// `false` skips the import entirely.
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub dir_key: Option<String>,
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub update_interface: Option<bool>,
    #[serde(default)]
    pub restrict_interface: Option<bool>,
}

impl ImportSection {
    pub fn to_sibling_import(&self) -> SiblingImport {
        let base = SiblingImport::annotations();
        SiblingImport {
            dir_key: self.dir_key.clone().unwrap_or(base.dir_key),
            document: self
                .document
                .clone()
                .unwrap_or_else(|| PARAMS_FILE_NAME.to_string()),
            prefix: self.prefix.clone().unwrap_or(base.prefix),
            update_interface: self.update_interface.unwrap_or(base.update_interface),
            restrict_interface: self.restrict_interface.unwrap_or(base.restrict_interface),
        }
    }
}

/// `input = { ... }` of a task. Exactly one of `path`, `glob` or `regex`
/// must be set (checked in validation).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct InputConfig {
    /// Literal path; may contain `{key}` configuration placeholders.
    #[serde(default)]
    pub path: Option<String>,

    /// Glob over the working directory, e.g. `"input.dir/*.fastq.gz"`.
    #[serde(default)]
    pub glob: Option<String>,

    /// Suffix stripped from a glob match's file name to form capture `\1`.
    #[serde(default)]
    pub suffix: Option<String>,

    /// Capturing regex applied to a directory listing.
    #[serde(default)]
    pub regex: Option<String>,

    /// Directory listed for `regex`; derived from the pattern when absent.
    #[serde(default)]
    pub dir: Option<String>,
}

/// One or several strings (`output = "x"` or `output = ["x", "y"]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s.clone()],
            OneOrMany::Many(v) => v.clone(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TaskConfig {
    /// Tasks that must finish all their Matches before this one starts.
    #[serde(default)]
    pub follows: Vec<String>,

    #[serde(default)]
    pub input: Option<InputConfig>,

    /// Static inputs added to every Match.
    #[serde(default)]
    pub add_inputs: Vec<String>,

    /// Output template(s); `\1` / `{1}` refer to input captures.
    #[serde(default)]
    pub output: Option<OneOrMany>,

    /// Directories created before the task's first Match runs.
    #[serde(default)]
    pub mkdir: Vec<String>,

    /// Command template run through `sh -c`.
    #[serde(default)]
    pub cmd: Option<String>,

    #[serde(default)]
    pub threads: Option<u32>,

    #[serde(default)]
    pub memory: Option<String>,

    #[serde(default)]
    pub environment: Option<String>,

    /// Wall-clock ceiling per Match, e.g. `"2h"`.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Fail the task when its input matches nothing. Defaults to true for
    /// literal inputs and false for glob/regex inputs.
    #[serde(default)]
    pub require_input: Option<bool>,
}

/// `[target.<name>]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TargetConfig {
    #[serde(default)]
    pub follows: Vec<String>,
}
