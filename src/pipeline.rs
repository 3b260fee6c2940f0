// src/pipeline.rs

//! Assembling a registry and a configuration mapping into a runnable
//! pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::config::loader::pipeline_dir;
use crate::config::model::PipelineFile;
use crate::config::resolver::{default_sources, resolve, ConfigSources};
use crate::config::Params;
use crate::dag::DagGraph;
use crate::engine::TaskName;
use crate::errors::{FiledagError, Result};
use crate::fs::FileSystem;
use crate::rules::matches::{aux_index, COMMAND_BINDINGS};
use crate::rules::{InputMatcher, Registry, TaskDecl, Template};

/// A declaration with its input compiled and its static paths resolved.
#[derive(Debug, Clone)]
pub struct Rule {
    pub decl: TaskDecl,
    pub matcher: InputMatcher,
    /// Auxiliary inputs, rendered against the configuration.
    pub aux: Vec<PathBuf>,
    /// Directories created before the first Match runs.
    pub mkdirs: Vec<PathBuf>,
}

impl Rule {
    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn is_target(&self) -> bool {
        self.decl.is_target()
    }
}

/// Everything a run needs that does not depend on the filesystem.
#[derive(Debug, Clone)]
pub struct Pipeline {
    rules: BTreeMap<TaskName, Rule>,
    graph: DagGraph,
    params: Arc<Params>,
}

impl Pipeline {
    /// Build the graph and check every template against what will be bound
    /// at run time. Fails on cycles, unknown `follows` and unknown
    /// placeholders, before anything runs.
    pub fn assemble(registry: Registry, params: Params) -> Result<Self> {
        let graph = DagGraph::build(&registry)?;

        let mut rules = BTreeMap::new();
        for decl in registry.iter() {
            let rule = compile_rule(decl.clone(), &params)?;
            rules.insert(decl.name.clone(), rule);
        }

        info!(
            tasks = rules.len(),
            params = params.len(),
            "pipeline assembled"
        );

        Ok(Self {
            rules,
            graph,
            params: Arc::new(params),
        })
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.get(name)
    }

    /// Rules in (rank, name) order.
    pub fn rules(&self) -> impl Iterator<Item = &Rule> {
        self.graph
            .topological_order()
            .into_iter()
            .filter_map(|name| self.rules.get(name))
    }

    /// Requested tasks plus everything they follow; no names selects all.
    pub fn selection(&self, targets: &[TaskName]) -> Result<BTreeSet<TaskName>> {
        if targets.is_empty() {
            return Ok(self.graph.tasks().map(str::to_string).collect());
        }
        self.graph.with_dependencies(targets)
    }
}

/// Resolve the configuration mapping for a pipeline file and assemble it.
pub fn load_pipeline(fs: &dyn FileSystem, file: &PipelineFile, path: &Path) -> Result<Pipeline> {
    let dir = pipeline_dir(path);
    let config = file.config_section();
    let sources = ConfigSources {
        files: match &config.sources {
            Some(list) => list.iter().map(PathBuf::from).collect(),
            None => default_sources(&dir),
        },
        sibling: file.sibling_import(),
        required: config.required.clone(),
        pipeline_dir: Some(dir),
    };
    let params = resolve(fs, &sources)?;

    if let Some(activate) = &config.environment_activate {
        let template = Template::parse(activate);
        for name in template.placeholders() {
            if name != "environment" && !params.contains_key(name) {
                return Err(FiledagError::ConfigError(format!(
                    "[config].environment_activate: unknown placeholder '{{{name}}}'"
                )));
            }
        }
    }

    let registry = Registry::from_pipeline(file)?;
    Pipeline::assemble(registry, params)
}

fn compile_rule(decl: TaskDecl, params: &Params) -> Result<Rule> {
    let name = decl.name.clone();
    let matcher = decl.input.compile(params).map_err(|e| match e {
        FiledagError::ConfigError(msg) => FiledagError::ConfigError(format!("task '{name}': {msg}")),
        other => other,
    })?;

    let render_static = |what: &str, templates: &[Template]| -> Result<Vec<PathBuf>> {
        templates
            .iter()
            .map(|t| {
                t.render(|n| params.display(n)).map(PathBuf::from).map_err(|e| {
                    FiledagError::ConfigError(format!("task '{name}': {what} '{t}': {e}"))
                })
            })
            .collect()
    };
    let aux = render_static("auxiliary input", &decl.aux_inputs)?;
    let mkdirs = render_static("mkdir", &decl.mkdirs)?;

    for output in &decl.outputs {
        for placeholder in output.placeholders() {
            if !matcher.has_capture(placeholder) && !params.contains_key(placeholder) {
                return Err(unknown_placeholder(&name, "output", placeholder));
            }
        }
    }

    if let Some(body) = &decl.body {
        for placeholder in body.placeholders() {
            let known = COMMAND_BINDINGS.contains(&placeholder.as_str())
                || aux_index(&placeholder).is_some_and(|i| i < aux.len())
                || matcher.has_capture(&placeholder)
                || params.contains_key(&placeholder);
            if !known {
                return Err(unknown_placeholder(&name, "command", &placeholder));
            }
        }
    }

    Ok(Rule {
        decl,
        matcher,
        aux,
        mkdirs,
    })
}

fn unknown_placeholder(task: &str, what: &str, name: &str) -> FiledagError {
    FiledagError::ConfigError(format!(
        "task '{task}': {what} uses unknown placeholder '{{{name}}}'"
    ))
}
