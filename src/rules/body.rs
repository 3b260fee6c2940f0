// src/rules/body.rs

//! The work a task performs for one Match.

use std::fmt;

use crate::config::Params;
use crate::rules::matches::Match;
use crate::rules::template::{Template, UnboundPlaceholder};

/// Turns a Match into the shell command that produces its outputs.
pub trait TaskBody: Send + Sync + fmt::Debug {
    /// Names the body will look up when rendering. Checked when the pipeline
    /// is assembled so missing values fail before anything runs.
    fn placeholders(&self) -> Vec<String> {
        Vec::new()
    }

    fn command(&self, m: &Match, params: &Params) -> Result<String, UnboundPlaceholder>;
}

/// Body backed by a command template (`cmd = "..."` in the pipeline file).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate(pub Template);

impl CommandTemplate {
    pub fn new(source: &str) -> Self {
        Self(Template::parse(source))
    }
}

impl TaskBody for CommandTemplate {
    fn placeholders(&self) -> Vec<String> {
        self.0.placeholders().map(str::to_string).collect()
    }

    fn command(&self, m: &Match, params: &Params) -> Result<String, UnboundPlaceholder> {
        self.0
            .render(|name| m.binding(name).or_else(|| params.display(name)))
    }
}

/// Body computed by a closure, for pipelines declared in code.
pub struct FnBody<F>(pub F);

impl<F> fmt::Debug for FnBody<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnBody(..)")
    }
}

impl<F> TaskBody for FnBody<F>
where
    F: Fn(&Match, &Params) -> Result<String, UnboundPlaceholder> + Send + Sync,
{
    fn command(&self, m: &Match, params: &Params) -> Result<String, UnboundPlaceholder> {
        (self.0)(m, params)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::rules::matches::Captures;

    #[test]
    fn command_prefers_match_bindings_over_params() {
        let body = CommandTemplate::new("{samtool} sort {input} -o {output}");
        let params: Params = [("samtool", "samtools"), ("input", "shadowed")]
            .into_iter()
            .collect();
        let m = Match {
            task: "sort".into(),
            inputs: vec![PathBuf::from("a.bam")],
            aux: vec![],
            outputs: vec![PathBuf::from("a.sorted.bam")],
            captures: Captures::default(),
        };
        assert_eq!(
            body.command(&m, &params).unwrap(),
            "samtools sort a.bam -o a.sorted.bam"
        );
        assert_eq!(body.placeholders(), vec!["samtool", "input", "output"]);
    }
}
