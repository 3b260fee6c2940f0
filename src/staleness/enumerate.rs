// src/staleness/enumerate.rs

//! Applying input specifications to the filesystem.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::Params;
use crate::errors::{FiledagError, Result};
use crate::fs::Workspace;
use crate::pipeline::Rule;
use crate::rules::input::match_string;
use crate::rules::{Captures, InputMatcher, Match};

/// Directories never descended into when walking for recursive globs.
const SKIP_DIRS: &[&str] = &[".filedag", ".git"];

/// All Matches of `rule` against the current filesystem, sorted by primary
/// input.
///
/// - no input: one Match when the task has a body, none for a target;
/// - literal: one Match if the path exists;
/// - glob: one Match per matching entry (recursive only for `**`);
/// - regex: one Match per entry of the listed directory that matches in full.
///
/// Two Matches deriving the same output path is a configuration error.
pub fn enumerate(rule: &Rule, ws: &Workspace, params: &Params) -> Result<Vec<Match>> {
    let name = rule.name();
    let bindings: Vec<(PathBuf, Captures)> = match &rule.matcher {
        InputMatcher::None => {
            if rule.is_target() {
                Vec::new()
            } else {
                vec![(PathBuf::new(), Captures::default())]
            }
        }
        InputMatcher::Literal(path) => {
            if ws.exists(path) {
                let whole = path.to_string_lossy().into_owned();
                vec![(path.clone(), Captures::new(vec![Some(whole)], BTreeMap::new()))]
            } else {
                debug!(task = %name, path = %path.display(), "literal input does not exist");
                Vec::new()
            }
        }
        InputMatcher::Glob {
            base,
            recursive,
            glob,
            suffix,
        } => {
            let mut found = Vec::new();
            for entry in list(ws, base, *recursive)? {
                let text = match_string(&entry);
                if glob.is_match(&text) {
                    let stem = glob_stem(&entry, suffix.as_deref());
                    let captures = Captures::new(vec![Some(text), Some(stem)], BTreeMap::new());
                    found.push((entry, captures));
                }
            }
            found
        }
        InputMatcher::Regex { base, regex } => {
            let mut found = Vec::new();
            for entry in list(ws, base, false)? {
                let text = match_string(&entry);
                if let Some(caps) = regex.captures(&text) {
                    let positional = caps
                        .iter()
                        .map(|g| g.map(|g| g.as_str().to_string()))
                        .collect();
                    let named = regex
                        .capture_names()
                        .flatten()
                        .filter_map(|n| caps.name(n).map(|g| (n.to_string(), g.as_str().to_string())))
                        .collect();
                    found.push((entry, Captures::new(positional, named)));
                }
            }
            found
        }
    };

    let mut matches = Vec::with_capacity(bindings.len());
    for (input, captures) in bindings {
        let outputs = rule
            .decl
            .outputs
            .iter()
            .map(|t| {
                t.render(|n| captures.get(n).map(str::to_string).or_else(|| params.display(n)))
                    .map(PathBuf::from)
                    .map_err(|e| FiledagError::ConfigError(format!("task '{name}': output '{t}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let inputs = if input.as_os_str().is_empty() {
            Vec::new()
        } else {
            vec![input]
        };
        matches.push(Match {
            task: name.to_string(),
            inputs,
            aux: rule.aux.clone(),
            outputs,
            captures,
        });
    }
    matches.sort_by(|a, b| a.inputs.cmp(&b.inputs));

    check_unique_outputs(name, &matches)?;
    debug!(task = %name, matches = matches.len(), "enumerated matches");
    Ok(matches)
}

/// Capture `1` of a glob match: the file name without `suffix`, or without
/// its last extension.
fn glob_stem(path: &Path, suffix: Option<&str>) -> String {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Some(suffix) = suffix {
        if let Some(stripped) = file_name.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or(file_name)
}

fn list(ws: &Workspace, base: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !ws.is_dir(base) {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let mut stack = vec![base.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in ws.list_dir(&dir)? {
            let skip = entry
                .file_name()
                .is_some_and(|n| SKIP_DIRS.iter().any(|s| n == *s));
            if recursive && !skip && ws.is_dir(&entry) {
                stack.push(entry.clone());
            }
            out.push(entry);
        }
    }
    out.sort();
    Ok(out)
}

fn check_unique_outputs(task: &str, matches: &[Match]) -> Result<()> {
    let mut seen: HashMap<&PathBuf, String> = HashMap::new();
    for m in matches {
        for out in &m.outputs {
            if let Some(previous) = seen.insert(out, m.id()) {
                return Err(FiledagError::ConfigError(format!(
                    "task '{task}': inputs '{previous}' and '{}' both produce '{}'",
                    m.id(),
                    out.display()
                )));
            }
        }
    }
    Ok(())
}
