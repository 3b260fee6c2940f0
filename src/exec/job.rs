// src/exec/job.rs

//! What the executor receives for one stale Match.

use std::path::PathBuf;
use std::time::Duration;

use crate::rules::{Match, MatchKey, ResourceProfile};

/// A fully rendered external-process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Shell command, run through `sh -c`.
    pub command: String,
    pub workdir: PathBuf,
    pub env: Vec<(String, String)>,
    pub resources: ResourceProfile,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub key: MatchKey,
    pub m: Match,
    pub invocation: Invocation,
    /// Directories to create before launching (task `mkdir` entries).
    pub mkdirs: Vec<PathBuf>,
    pub timeout: Option<Duration>,
    /// Receives the process's stdout and stderr.
    pub log_file: PathBuf,
}

/// File name for a Match's log: the Match id with path separators replaced.
/// Flattened ids carry a short digest of the original id so `a/b.fq` and
/// `a_b.fq` do not share a log.
pub fn log_file_name(id: &str) -> String {
    let cleaned: String = id
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | ' ' => '_',
            c => c,
        })
        .collect();
    let stem = cleaned.trim_start_matches('_');
    if cleaned == id {
        return format!("{stem}.log");
    }
    let digest = blake3::hash(id.as_bytes()).to_hex();
    format!("{stem}-{}.log", &digest.as_str()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_names_flatten_paths() {
        assert!(log_file_name("input.dir/s1.fastq.gz").starts_with("input.dir_s1.fastq.gz-"));
        assert!(log_file_name("/abs/ref.fa").starts_with("abs_ref.fa-"));
        assert!(log_file_name("/abs/ref.fa").ends_with(".log"));
        assert_eq!(log_file_name("ref.fa"), "ref.fa.log");
    }

    #[test]
    fn flattened_ids_do_not_collide() {
        let nested = log_file_name("a/b.fq");
        let flat = log_file_name("a_b.fq");
        assert_ne!(nested, flat);
        assert_eq!(flat, "a_b.fq.log");
        assert_eq!(nested, log_file_name("a/b.fq"));
    }
}
