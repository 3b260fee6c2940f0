// src/rules/registry.rs

//! Static registration of tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::model::{InputConfig, PipelineFile, TaskConfig};
use crate::engine::TaskName;
use crate::errors::{FiledagError, Result};
use crate::rules::body::{CommandTemplate, TaskBody};
use crate::rules::input::InputSpec;
use crate::rules::resources::ResourceProfile;
use crate::rules::template::Template;
use crate::types::{parse_duration, MemorySize};

/// Declaration of one task, built with chained setters:
///
/// ```ignore
/// TaskDecl::new("mapping")
///     .follows(["reference_creation"])
///     .input(InputSpec::regex("input.dir/(.+).fastq.gz"))
///     .output("out.dir/\\1.dir")
///     .command("bwa mem {aux0} {input} > {output}")
/// ```
#[derive(Debug, Clone)]
pub struct TaskDecl {
    pub name: TaskName,
    pub follows: Vec<TaskName>,
    pub input: InputSpec,
    pub aux_inputs: Vec<Template>,
    pub outputs: Vec<Template>,
    pub mkdirs: Vec<Template>,
    pub resources: ResourceProfile,
    pub timeout: Option<Duration>,
    /// `None` falls back to [`InputSpec::requires_input_by_default`].
    pub require_input: Option<bool>,
    pub body: Option<Arc<dyn TaskBody>>,
}

impl TaskDecl {
    pub fn new(name: impl Into<TaskName>) -> Self {
        Self {
            name: name.into(),
            follows: Vec::new(),
            input: InputSpec::None,
            aux_inputs: Vec::new(),
            outputs: Vec::new(),
            mkdirs: Vec::new(),
            resources: ResourceProfile::default(),
            timeout: None,
            require_input: None,
            body: None,
        }
    }

    pub fn follows<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        self.follows.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn input(mut self, input: InputSpec) -> Self {
        self.input = input;
        self
    }

    pub fn aux_input(mut self, path: &str) -> Self {
        self.aux_inputs.push(Template::parse(path));
        self
    }

    pub fn output(mut self, template: &str) -> Self {
        self.outputs.push(Template::parse(template));
        self
    }

    pub fn mkdir(mut self, dir: &str) -> Self {
        self.mkdirs.push(Template::parse(dir));
        self
    }

    pub fn resources(mut self, resources: ResourceProfile) -> Self {
        self.resources = resources;
        self
    }

    pub fn threads(mut self, threads: u32) -> Self {
        self.resources.threads = threads;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn require_input(mut self, required: bool) -> Self {
        self.require_input = Some(required);
        self
    }

    pub fn body(mut self, body: impl TaskBody + 'static) -> Self {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn command(self, template: &str) -> Self {
        self.body(CommandTemplate::new(template))
    }

    /// Targets have no body, input or outputs of their own.
    pub fn is_target(&self) -> bool {
        self.body.is_none() && matches!(self.input, InputSpec::None) && self.outputs.is_empty()
    }

    pub fn requires_input(&self) -> bool {
        self.require_input
            .unwrap_or_else(|| self.input.requires_input_by_default())
    }
}

/// All declared tasks, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    decls: Vec<TaskDecl>,
    index: HashMap<TaskName, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, decl: TaskDecl) -> Result<()> {
        if self.index.contains_key(&decl.name) {
            return Err(FiledagError::DuplicateTask(decl.name));
        }
        debug!(task = %decl.name, follows = ?decl.follows, "declared task");
        self.index.insert(decl.name.clone(), self.decls.len());
        self.decls.push(decl);
        Ok(())
    }

    /// Declare a top-level target.
    pub fn target<I, S>(&mut self, name: &str, follows: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskName>,
    {
        self.declare(TaskDecl::new(name).follows(follows))
    }

    pub fn get(&self, name: &str) -> Option<&TaskDecl> {
        self.index.get(name).map(|&i| &self.decls[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskDecl> {
        self.decls.iter()
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Build the registry described by a validated pipeline file.
    pub fn from_pipeline(file: &PipelineFile) -> Result<Self> {
        let mut registry = Registry::new();
        let defaults = file.default_section();

        for (name, task) in file.tasks() {
            let resources = ResourceProfile {
                threads: task.threads.or(defaults.threads).unwrap_or(1),
                memory: task
                    .memory
                    .as_deref()
                    .or(defaults.memory.as_deref())
                    .map(|m| parse_memory(name, m))
                    .transpose()?,
                environment: task
                    .environment
                    .clone()
                    .or_else(|| defaults.environment.clone()),
            };
            let timeout = task
                .timeout
                .as_deref()
                .or(defaults.timeout.as_deref())
                .map(|t| {
                    parse_duration(t).map_err(|e| {
                        FiledagError::ConfigError(format!("task '{name}': invalid timeout: {e}"))
                    })
                })
                .transpose()?;

            registry.declare(task_decl(name, task, resources, timeout))?;
        }

        for (name, target) in file.targets() {
            registry.target(name, target.follows.iter().cloned())?;
        }

        Ok(registry)
    }
}

fn parse_memory(task: &str, value: &str) -> Result<MemorySize> {
    value
        .parse()
        .map_err(|e| FiledagError::ConfigError(format!("task '{task}': invalid memory: {e}")))
}

fn task_decl(
    name: &str,
    task: &TaskConfig,
    resources: ResourceProfile,
    timeout: Option<Duration>,
) -> TaskDecl {
    let mut decl = TaskDecl::new(name)
        .follows(task.follows.iter().cloned())
        .input(task.input.as_ref().map(input_spec).unwrap_or_default())
        .resources(resources);

    for aux in &task.add_inputs {
        decl = decl.aux_input(aux);
    }
    for output in task.output.iter().flat_map(|o| o.to_vec()) {
        decl = decl.output(&output);
    }
    for dir in &task.mkdir {
        decl = decl.mkdir(dir);
    }
    if let Some(cmd) = &task.cmd {
        decl = decl.command(cmd);
    }
    decl.timeout = timeout;
    decl.require_input = task.require_input;
    decl
}

fn input_spec(input: &InputConfig) -> InputSpec {
    if let Some(path) = &input.path {
        InputSpec::literal(path)
    } else if let Some(glob) = &input.glob {
        InputSpec::Glob {
            pattern: glob.clone(),
            suffix: input.suffix.clone(),
        }
    } else if let Some(regex) = &input.regex {
        InputSpec::Regex {
            pattern: regex.clone(),
            dir: input.dir.clone(),
        }
    } else {
        InputSpec::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = Registry::new();
        registry.declare(TaskDecl::new("a").command("true")).unwrap();
        match registry.declare(TaskDecl::new("a").command("false")) {
            Err(FiledagError::DuplicateTask(name)) => assert_eq!(name, "a"),
            other => panic!("expected DuplicateTask, got {other:?}"),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn targets_have_no_body() {
        let mut registry = Registry::new();
        registry.declare(TaskDecl::new("a").command("true")).unwrap();
        registry.target("full", ["a"]).unwrap();
        let full = registry.get("full").unwrap();
        assert!(full.is_target());
        assert_eq!(full.follows, vec!["a".to_string()]);
        assert!(!registry.get("a").unwrap().is_target());
    }

    #[test]
    fn require_input_defaults_by_input_kind() {
        assert!(TaskDecl::new("a").input(InputSpec::literal("x")).requires_input());
        assert!(!TaskDecl::new("b").input(InputSpec::glob("*.gz")).requires_input());
        assert!(TaskDecl::new("c")
            .input(InputSpec::glob("*.gz"))
            .require_input(true)
            .requires_input());
    }
}
