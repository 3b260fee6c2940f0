// src/engine/planner.rs

//! Turning a ready task into planned Matches.
//!
//! Planning happens when a task becomes ready, after every task it follows
//! has finished, so the staleness rule sees what upstream tasks wrote.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::model::ConfigSection;
use crate::engine::{FailureReason, PlannedMatch, TaskPlan};
use crate::errors::{FiledagError, Result};
use crate::exec::job::{log_file_name, Invocation, Job};
use crate::fs::Workspace;
use crate::pipeline::{Pipeline, Rule};
use crate::rules::{Match, Template};
use crate::staleness::{enumerate, StaleReason, Staleness, StalenessCheck};

#[derive(Debug, Clone)]
pub struct PlannerOptions {
    /// Workspace-relative directory receiving `<task>/<match>.log` files.
    pub log_dir: PathBuf,
    /// Prefixed to commands of tasks that name an execution environment.
    pub environment_activate: Option<Template>,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from(".filedag/logs"),
            environment_activate: None,
        }
    }
}

impl PlannerOptions {
    pub fn from_config(config: &ConfigSection) -> Self {
        Self {
            log_dir: PathBuf::from(&config.log_dir),
            environment_activate: config.environment_activate.as_deref().map(Template::parse),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Planner {
    pipeline: Arc<Pipeline>,
    workspace: Workspace,
    check: Arc<dyn StalenessCheck>,
    options: PlannerOptions,
}

impl Planner {
    pub fn new(
        pipeline: Arc<Pipeline>,
        workspace: Workspace,
        check: Arc<dyn StalenessCheck>,
        options: PlannerOptions,
    ) -> Self {
        Self {
            pipeline,
            workspace,
            check,
            options,
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Enumerate the Matches of `task`, check each and build jobs for the
    /// stale ones.
    pub fn plan(&self, task: &str) -> TaskPlan {
        let rule = self
            .pipeline
            .rule(task)
            .ok_or_else(|| FailureReason::Planning(format!("unknown task '{task}'")))?;
        if rule.is_target() {
            return Ok(Vec::new());
        }

        let evaluated = self
            .evaluate(rule)
            .map_err(|e| FailureReason::Planning(e.to_string()))?;
        if evaluated.is_empty() && rule.decl.requires_input() {
            warn!(task = %task, "{}", FiledagError::MissingInput(task.to_string()));
            return Err(FailureReason::MissingInput);
        }

        Ok(evaluated
            .into_iter()
            .map(|(m, staleness)| match staleness {
                Staleness::UpToDate => PlannedMatch::UpToDate(m.key()),
                Staleness::Stale(reason) => {
                    debug!(task = %task, id = %m.id(), reason = %reason, "match is stale");
                    self.job(rule, m)
                }
            })
            .collect())
    }

    /// Every Match of `task` with its staleness, without building jobs.
    pub fn preview(&self, task: &str) -> Result<Vec<(Match, Staleness)>> {
        let rule = self
            .pipeline
            .rule(task)
            .ok_or_else(|| FiledagError::TaskNotFound(task.to_string()))?;
        self.evaluate(rule)
    }

    /// Let the staleness rule remember a successful Match.
    pub fn record_success(&self, m: &Match) -> Result<()> {
        self.check.record_success(&self.workspace, m)
    }

    fn evaluate(&self, rule: &Rule) -> Result<Vec<(Match, Staleness)>> {
        let matches = enumerate(rule, &self.workspace, self.pipeline.params())?;
        Ok(matches
            .into_iter()
            .map(|m| {
                let staleness = match self.check.check(&self.workspace, &m) {
                    Ok(staleness) => staleness,
                    Err(e) => {
                        warn!(task = %m.task, id = %m.id(), error = %e, "staleness check failed; treating as stale");
                        Staleness::Stale(StaleReason::CheckFailed(e.to_string()))
                    }
                };
                (m, staleness)
            })
            .collect())
    }

    fn job(&self, rule: &Rule, m: Match) -> PlannedMatch {
        let key = m.key();
        let unrenderable = |reason: String| PlannedMatch::Unrenderable {
            key: key.clone(),
            reason,
        };

        let Some(body) = &rule.decl.body else {
            return unrenderable(format!("task '{}' has no command", rule.name()));
        };
        let params = self.pipeline.params();
        let command = match body.command(&m, params) {
            Ok(command) => command,
            Err(e) => return unrenderable(e.to_string()),
        };

        let resources = rule.decl.resources.clone();
        let command = match (&resources.environment, &self.options.environment_activate) {
            (Some(env), Some(activate)) => {
                let prefix = activate.render(|name| {
                    if name == "environment" {
                        Some(env.clone())
                    } else {
                        params.display(name)
                    }
                });
                match prefix {
                    Ok(prefix) => format!("{prefix} && {command}"),
                    Err(e) => return unrenderable(e.to_string()),
                }
            }
            _ => command,
        };

        let workdir = if self.workspace.root().as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            self.workspace.root().to_path_buf()
        };
        let log_file = self
            .options
            .log_dir
            .join(rule.name())
            .join(log_file_name(&m.id()));

        PlannedMatch::Stale(Box::new(Job {
            key,
            invocation: Invocation {
                command,
                workdir,
                env: resources.env_vars(rule.name()),
                resources,
            },
            m,
            mkdirs: rule.mkdirs.clone(),
            timeout: rule.decl.timeout,
            log_file,
        }))
    }
}
