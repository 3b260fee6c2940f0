// src/rules/template.rs

//! Typed templates for commands and paths.
//!
//! A template is parsed once into literal and placeholder segments, so the
//! set of names it needs is known when the pipeline is assembled, long
//! before a process is launched.
//!
//! Syntax:
//! - `{name}` is a placeholder when `name` only uses `[A-Za-z0-9_.]`.
//!   Anything else between braces is kept literally, so shell and awk code
//!   such as `awk '{print $1}'` needs no escaping.
//! - `${...}` is always literal (shell parameter expansion).
//! - `{{` and `}}` produce literal braces.
//! - `\N` with a single digit is shorthand for `{N}` (a positional capture).
//!   `\10` reads as capture 1 followed by `0`; write `{10}` for captures
//!   past 9.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Raised when rendering meets a placeholder the lookup cannot satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no value for placeholder '{{{0}}}'")]
pub struct UnboundPlaceholder(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Self {
        Self {
            source: source.to_string(),
            segments: parse_segments(source),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Placeholder names in order of appearance (duplicates included).
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// True when the template has no placeholders.
    pub fn is_literal(&self) -> bool {
        self.placeholders().next().is_none()
    }

    pub fn render<F>(&self, lookup: F) -> Result<String, UnboundPlaceholder>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => return Err(UnboundPlaceholder(name.clone())),
                },
            }
        }
        Ok(out)
    }
}

impl FromStr for Template {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Template::parse(s))
    }
}

impl From<&str> for Template {
    fn from(s: &str) -> Self {
        Template::parse(s)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn parse_segments(source: &str) -> Vec<Segment> {
    let chars: Vec<char> = source.chars().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    let flush = |literal: &mut String, segments: &mut Vec<Segment>| {
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(literal)));
        }
    };

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '{' if i > 0 && chars[i - 1] == '$' => {
                literal.push('{');
                i += 1;
            }
            '{' => {
                let close = chars[i + 1..].iter().position(|&ch| ch == '}');
                match close {
                    Some(len) if len > 0 && chars[i + 1..i + 1 + len].iter().all(|&ch| is_name_char(ch)) => {
                        flush(&mut literal, &mut segments);
                        let name: String = chars[i + 1..i + 1 + len].iter().collect();
                        segments.push(Segment::Placeholder(name));
                        i += len + 2;
                    }
                    _ => {
                        literal.push('{');
                        i += 1;
                    }
                }
            }
            '\\' if chars.get(i + 1).is_some_and(|ch| ch.is_ascii_digit()) => {
                flush(&mut literal, &mut segments);
                segments.push(Segment::Placeholder(chars[i + 1].to_string()));
                i += 2;
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }

    flush(&mut literal, &mut segments);
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(t: &Template) -> Vec<&str> {
        t.placeholders().collect()
    }

    #[test]
    fn backslash_digit_is_a_positional_capture() {
        let t = Template::parse(r"out.dir/\1.dir");
        assert_eq!(names(&t), vec!["1"]);
        assert_eq!(
            t.render(|n| (n == "1").then(|| "sample1".to_string())).unwrap(),
            "out.dir/sample1.dir"
        );
    }

    #[test]
    fn backslash_takes_one_digit_and_braces_take_many() {
        let short = Template::parse(r"\10");
        assert_eq!(names(&short), vec!["1"]);
        assert_eq!(short.render(|_| Some("x".to_string())).unwrap(), "x0");

        let long = Template::parse("{10}.bam");
        assert_eq!(names(&long), vec!["10"]);
        assert_eq!(
            long.render(|n| (n == "10").then(|| "tenth".to_string())).unwrap(),
            "tenth.bam"
        );
    }

    #[test]
    fn shell_and_awk_braces_stay_literal() {
        let t = Template::parse("awk '{print $1}' {input} > ${HOME}/x && echo {{done}}");
        assert_eq!(names(&t), vec!["input"]);
        let rendered = t.render(|_| Some("in.txt".to_string())).unwrap();
        assert_eq!(rendered, "awk '{print $1}' in.txt > ${HOME}/x && echo {done}");
    }

    #[test]
    fn dotted_names_are_placeholders() {
        let t = Template::parse("{bwa.index} {samtool}");
        assert_eq!(names(&t), vec!["bwa.index", "samtool"]);
    }

    #[test]
    fn unbound_placeholder_is_reported_by_name() {
        let t = Template::parse("sprint main {reference}");
        assert_eq!(
            t.render(|_| None),
            Err(UnboundPlaceholder("reference".to_string()))
        );
    }

    #[test]
    fn unclosed_brace_is_literal() {
        let t = Template::parse("echo {oops");
        assert!(t.is_literal());
        assert_eq!(t.render(|_| None).unwrap(), "echo {oops");
    }
}
