// src/config/validate.rs

use globset::Glob;
use regex::Regex;

use crate::config::model::{InputConfig, PipelineFile, RawPipelineFile};
use crate::errors::{FiledagError, Result};
use crate::types::{parse_duration, MemorySize};

impl TryFrom<RawPipelineFile> for PipelineFile {
    type Error = FiledagError;

    fn try_from(raw: RawPipelineFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_pipeline(&raw)?;
        Ok(PipelineFile::new_unchecked(raw))
    }
}

/// Semantic checks that do not need the configuration mapping.
///
/// Cycles are reported later by the graph builder, which names every member.
fn validate_raw_pipeline(file: &RawPipelineFile) -> Result<()> {
    ensure_has_tasks(file)?;
    validate_global_config(file)?;
    validate_names(file)?;
    validate_follows(file)?;
    for (name, task) in &file.task {
        if task.cmd.as_deref().is_none_or(|c| c.trim().is_empty()) {
            return Err(FiledagError::ConfigError(format!(
                "task '{name}': `cmd` is required (use [target.{name}] for a dependency-only goal)"
            )));
        }
        if let Some(input) = &task.input {
            validate_input(name, input)?;
        }
        check_resources(name, task.memory.as_deref(), task.timeout.as_deref())?;
        if task.threads == Some(0) {
            return Err(FiledagError::ConfigError(format!(
                "task '{name}': threads must be >= 1"
            )));
        }
    }
    check_resources(
        "[default]",
        file.default.memory.as_deref(),
        file.default.timeout.as_deref(),
    )?;
    Ok(())
}

fn ensure_has_tasks(file: &RawPipelineFile) -> Result<()> {
    if file.task.is_empty() {
        return Err(FiledagError::ConfigError(
            "pipeline must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(file: &RawPipelineFile) -> Result<()> {
    if file.config.jobs == 0 {
        return Err(FiledagError::ConfigError(
            "[config].jobs must be >= 1 (got 0)".to_string(),
        ));
    }
    if file.default.threads == Some(0) {
        return Err(FiledagError::ConfigError(
            "[default].threads must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_names(file: &RawPipelineFile) -> Result<()> {
    for name in file.target.keys() {
        if file.task.contains_key(name) {
            return Err(FiledagError::DuplicateTask(name.clone()));
        }
    }
    Ok(())
}

fn validate_follows(file: &RawPipelineFile) -> Result<()> {
    let known = |n: &str| file.task.contains_key(n) || file.target.contains_key(n);
    let follows = file
        .task
        .iter()
        .map(|(name, t)| (name, &t.follows))
        .chain(file.target.iter().map(|(name, t)| (name, &t.follows)));

    for (name, deps) in follows {
        for dep in deps {
            if dep == name {
                return Err(FiledagError::ConfigError(format!(
                    "task '{name}' cannot follow itself"
                )));
            }
            if !known(dep) {
                return Err(FiledagError::ConfigError(format!(
                    "task '{name}' follows unknown task '{dep}'"
                )));
            }
        }
    }
    Ok(())
}

fn validate_input(name: &str, input: &InputConfig) -> Result<()> {
    let kinds = [input.path.is_some(), input.glob.is_some(), input.regex.is_some()]
        .iter()
        .filter(|set| **set)
        .count();
    if kinds != 1 {
        return Err(FiledagError::ConfigError(format!(
            "task '{name}': input must set exactly one of `path`, `glob` or `regex`"
        )));
    }
    if input.suffix.is_some() && input.glob.is_none() {
        return Err(FiledagError::ConfigError(format!(
            "task '{name}': `suffix` only applies to `glob` inputs"
        )));
    }
    if input.dir.is_some() && input.regex.is_none() {
        return Err(FiledagError::ConfigError(format!(
            "task '{name}': `dir` only applies to `regex` inputs"
        )));
    }
    if let Some(glob) = &input.glob {
        Glob::new(glob).map_err(|e| {
            FiledagError::ConfigError(format!("task '{name}': invalid glob '{glob}': {e}"))
        })?;
    }
    if let Some(regex) = &input.regex {
        Regex::new(regex).map_err(|e| {
            FiledagError::ConfigError(format!("task '{name}': invalid regex '{regex}': {e}"))
        })?;
    }
    Ok(())
}

fn check_resources(owner: &str, memory: Option<&str>, timeout: Option<&str>) -> Result<()> {
    if let Some(memory) = memory {
        memory
            .parse::<MemorySize>()
            .map_err(|e| FiledagError::ConfigError(format!("{owner}: invalid memory: {e}")))?;
    }
    if let Some(timeout) = timeout {
        parse_duration(timeout)
            .map_err(|e| FiledagError::ConfigError(format!("{owner}: invalid timeout: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiblingImport;

    fn parse(src: &str) -> Result<PipelineFile> {
        let raw: RawPipelineFile = toml::from_str(src)?;
        PipelineFile::try_from(raw)
    }

    #[test]
    fn minimal_pipeline_is_valid() {
        let file = parse(
            r#"
            [task.a]
            cmd = "true"
            "#,
        )
        .unwrap();
        assert_eq!(file.config_section().jobs, 4);
        assert!(file.tasks().contains_key("a"));
    }

    #[test]
    fn unknown_follows_is_rejected() {
        let err = parse(
            r#"
            [task.a]
            follows = ["ghost"]
            cmd = "true"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn input_needs_exactly_one_kind() {
        let err = parse(
            r#"
            [task.a]
            input = { glob = "*.gz", regex = "(.+).gz" }
            cmd = "true"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FiledagError::ConfigError(_)));
    }

    #[test]
    fn bad_memory_and_timeout_are_rejected() {
        assert!(parse("[task.a]\ncmd = \"x\"\nmemory = \"4X\"\n").is_err());
        assert!(parse("[task.a]\ncmd = \"x\"\ntimeout = \"10\"\n").is_err());
        assert!(parse("[default]\nmemory = \"lots\"\n[task.a]\ncmd = \"x\"\n").is_err());
    }

    #[test]
    fn overflowing_timeout_is_a_config_error() {
        let err = parse("[task.a]\ncmd = \"x\"\ntimeout = \"9999999999999999999h\"\n").unwrap_err();
        assert!(matches!(err, FiledagError::ConfigError(_)), "{err}");
    }

    #[test]
    fn target_may_not_shadow_a_task() {
        let err = parse(
            r#"
            [task.a]
            cmd = "true"
            [target.a]
            follows = []
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, FiledagError::DuplicateTask(_)));
    }

    #[test]
    fn tasks_need_a_command() {
        let err = parse("[task.a]\noutput = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("`cmd` is required"), "{err}");
    }

    #[test]
    fn zero_jobs_is_rejected() {
        assert!(parse("[config]\njobs = 0\n[task.a]\ncmd = \"x\"\n").is_err());
    }

    #[test]
    fn annotations_import_runs_unless_disabled() {
        let plain = parse("[task.a]\ncmd = \"x\"\n").unwrap();
        assert_eq!(plain.sibling_import(), Some(SiblingImport::annotations()));

        let renamed = parse("[import]\nprefix = \"gs_\"\n[task.a]\ncmd = \"x\"\n").unwrap();
        assert_eq!(renamed.sibling_import().map(|s| s.prefix), Some("gs_".to_string()));

        let off = parse("[import]\nenabled = false\n[task.a]\ncmd = \"x\"\n").unwrap();
        assert_eq!(off.sibling_import(), None);
    }
}
