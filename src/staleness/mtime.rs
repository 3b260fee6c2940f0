// src/staleness/mtime.rs

use std::time::SystemTime;

use tracing::debug;

use crate::errors::Result;
use crate::fs::Workspace;
use crate::rules::Match;
use crate::staleness::{missing_output, StaleReason, Staleness, StalenessCheck};

/// Modification-time rule.
///
/// A Match is stale when an output is missing, or when some input (primary
/// or auxiliary) is strictly newer than the oldest output. Equal timestamps
/// count as up to date.
#[derive(Debug, Clone, Copy, Default)]
pub struct MtimeCheck;

impl StalenessCheck for MtimeCheck {
    fn check(&self, ws: &Workspace, m: &Match) -> Result<Staleness> {
        if let Some(stale) = missing_output(ws, m) {
            return Ok(stale);
        }

        let mut oldest: Option<(SystemTime, &std::path::PathBuf)> = None;
        for out in &m.outputs {
            if let Some(t) = ws.modified(out)? {
                if oldest.is_none_or(|(o, _)| t < o) {
                    oldest = Some((t, out));
                }
            }
        }
        let Some((oldest, oldest_path)) = oldest else {
            return Ok(Staleness::Stale(StaleReason::NoOutputs));
        };

        for input in m.all_inputs() {
            match ws.modified(input)? {
                None => return Ok(Staleness::Stale(StaleReason::InputMissing(input.clone()))),
                Some(t) if t > oldest => {
                    debug!(
                        task = %m.task,
                        input = %input.display(),
                        output = %oldest_path.display(),
                        "input newer than output"
                    );
                    return Ok(Staleness::Stale(StaleReason::InputNewer {
                        input: input.clone(),
                        output: oldest_path.clone(),
                    }));
                }
                Some(_) => {}
            }
        }

        Ok(Staleness::UpToDate)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use crate::fs::mock::MockFileSystem;
    use crate::rules::Captures;

    fn setup() -> (MockFileSystem, Workspace, Match) {
        let fs = MockFileSystem::new();
        let ws = Workspace::new(Arc::new(fs.clone()), PathBuf::new());
        let m = Match {
            task: "t".into(),
            inputs: vec![PathBuf::from("in.txt")],
            aux: vec![PathBuf::from("ref.fa")],
            outputs: vec![PathBuf::from("out.txt")],
            captures: Captures::default(),
        };
        (fs, ws, m)
    }

    #[test]
    fn missing_output_is_stale() {
        let (fs, ws, m) = setup();
        fs.add_file("in.txt", "x");
        fs.add_file("ref.fa", "x");
        assert_eq!(
            MtimeCheck.check(&ws, &m).unwrap(),
            Staleness::Stale(StaleReason::OutputMissing(PathBuf::from("out.txt")))
        );
    }

    #[test]
    fn equal_timestamps_are_up_to_date() {
        let (fs, ws, m) = setup();
        fs.add_file_at("in.txt", "x", 5);
        fs.add_file_at("ref.fa", "x", 5);
        fs.add_file_at("out.txt", "y", 5);
        assert_eq!(MtimeCheck.check(&ws, &m).unwrap(), Staleness::UpToDate);
    }

    #[test]
    fn newer_auxiliary_input_makes_stale() {
        let (fs, ws, m) = setup();
        fs.add_file_at("in.txt", "x", 1);
        fs.add_file_at("out.txt", "y", 2);
        fs.add_file_at("ref.fa", "z", 3);
        assert!(matches!(
            MtimeCheck.check(&ws, &m).unwrap(),
            Staleness::Stale(StaleReason::InputNewer { input, .. }) if input == PathBuf::from("ref.fa")
        ));
    }

    #[test]
    fn no_outputs_is_always_stale() {
        let (_fs, ws, mut m) = setup();
        m.outputs.clear();
        assert_eq!(
            MtimeCheck.check(&ws, &m).unwrap(),
            Staleness::Stale(StaleReason::NoOutputs)
        );
    }
}
