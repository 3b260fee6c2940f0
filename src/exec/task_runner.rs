// src/exec/task_runner.rs

//! Runs one job: waits for worker slots, prepares directories, launches the
//! process and checks what it left behind.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::{FailureReason, MatchOutcome, RuntimeEvent};
use crate::exec::executor_loop::RunnerContext;
use crate::exec::job::Job;
use crate::fs::Workspace;

/// Run a single job and report exactly one `MatchCompleted` event for it.
///
/// A cancellation that arrives while the job still waits for slots reports
/// `NotStarted`; one that arrives while the process runs kills it and reports
/// `Failed(Cancelled)`.
pub(crate) async fn run_job(
    job: Job,
    ctx: RunnerContext,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let key = job.key.clone();
    let outcome = execute(job, &ctx, &mut cancel_rx).await;
    if let Err(err) = runtime_tx
        .send(RuntimeEvent::MatchCompleted {
            key: key.clone(),
            outcome,
        })
        .await
    {
        error!(job = %key, error = %err, "runtime gone; dropping completion");
    }
}

async fn execute(
    job: Job,
    ctx: &RunnerContext,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> MatchOutcome {
    let wanted = job.invocation.resources.threads.clamp(1, ctx.total_slots);
    let _permit = tokio::select! {
        permit = Arc::clone(&ctx.slots).acquire_many_owned(wanted) => match permit {
            Ok(permit) => permit,
            Err(_) => return MatchOutcome::NotStarted,
        },
        _ = &mut *cancel_rx => {
            debug!(job = %job.key, "cancelled before start");
            return MatchOutcome::NotStarted;
        }
    };

    let ws = &ctx.workspace;
    let preexisting: Vec<bool> = job.m.outputs.iter().map(|o| ws.exists(o)).collect();
    let started = Instant::now();

    let result = match launch(&job, ws, cancel_rx).await {
        Ok(()) => finish_outputs(&job, ws),
        Err(reason) => Err(reason),
    };
    let duration = started.elapsed();

    match result {
        Ok(()) => {
            info!(
                task = %job.key.task,
                id = %job.key.id,
                duration_ms = duration.as_millis() as u64,
                "match succeeded"
            );
            MatchOutcome::Succeeded { duration }
        }
        Err(reason) => {
            warn!(
                task = %job.key.task,
                id = %job.key.id,
                reason = %reason,
                duration_ms = duration.as_millis() as u64,
                log = %job.log_file.display(),
                "match failed"
            );
            remove_new_outputs(&job, ws, &preexisting);
            MatchOutcome::Failed { reason, duration }
        }
    }
}

async fn launch(
    job: &Job,
    ws: &Workspace,
    cancel_rx: &mut oneshot::Receiver<()>,
) -> Result<(), FailureReason> {
    prepare_dirs(job, ws)?;

    let log_path = ws.path(&job.log_file);
    if let Some(parent) = log_path.parent() {
        ws.fs().create_dir_all(parent).map_err(io_failure)?;
    }
    let stdout = std::fs::File::create(&log_path).map_err(|e| {
        FailureReason::Io(format!("creating log record {}: {e}", log_path.display()))
    })?;
    let stderr = stdout.try_clone().map_err(|e| {
        FailureReason::Io(format!("creating log record {}: {e}", log_path.display()))
    })?;

    let inv = &job.invocation;
    info!(
        task = %job.key.task,
        id = %job.key.id,
        cmd = %inv.command,
        threads = inv.resources.threads,
        memory = ?inv.resources.memory,
        environment = ?inv.resources.environment,
        "starting match process"
    );

    let mut cmd = shell_command(&inv.command);
    cmd.current_dir(&inv.workdir)
        .envs(inv.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| FailureReason::Io(format!("spawning process: {e}")))?;

    let limit = job.timeout;
    let deadline = async move {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        status = child.wait() => {
            let status = status.map_err(|e| FailureReason::Io(format!("waiting for process: {e}")))?;
            info!(
                task = %job.key.task,
                id = %job.key.id,
                exit_code = status.code().unwrap_or(-1),
                success = status.success(),
                "match process exited"
            );
            if status.success() {
                Ok(())
            } else {
                Err(exit_failure(status))
            }
        }

        _ = deadline => {
            let limit = limit.unwrap_or(Duration::ZERO);
            warn!(task = %job.key.task, id = %job.key.id, timeout = ?limit, "timeout exceeded; killing process");
            terminate(&mut child, job).await;
            Err(FailureReason::Timeout(limit))
        }

        _ = &mut *cancel_rx => {
            info!(task = %job.key.task, id = %job.key.id, "cancellation requested; killing process");
            terminate(&mut child, job).await;
            Err(FailureReason::Cancelled)
        }
    }
}

/// The shell runs in a process group of its own so everything it starts can
/// be killed together.
#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut c = Command::new("sh");
    c.arg("-c").arg(command).process_group(0);
    c
}

#[cfg(not(unix))]
fn shell_command(command: &str) -> Command {
    let mut c = Command::new("cmd");
    c.arg("/C").arg(command);
    c
}

/// Kill the shell and every process in its group, then reap the shell.
async fn terminate(child: &mut Child, job: &Job) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let group = format!("-{pid}");
        match Command::new("kill")
            .args(["-s", "KILL", "--", &group])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) if status.success() => {
                debug!(task = %job.key.task, id = %job.key.id, pgid = pid, "killed process group");
            }
            Ok(status) => {
                warn!(task = %job.key.task, pgid = pid, %status, "kill of process group failed");
            }
            Err(e) => {
                warn!(task = %job.key.task, pgid = pid, error = %e, "could not run kill for process group");
            }
        }
    }
    if let Err(e) = child.kill().await {
        warn!(task = %job.key.task, id = %job.key.id, error = %e, "failed to kill process");
    }
}

fn exit_failure(status: ExitStatus) -> FailureReason {
    if let Some(code) = status.code() {
        return FailureReason::Exit(code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return FailureReason::Signal(signal);
        }
    }
    FailureReason::Exit(-1)
}

/// `mkdir` entries plus the parent directory of every output.
fn prepare_dirs(job: &Job, ws: &Workspace) -> Result<(), FailureReason> {
    let parents = job
        .m
        .outputs
        .iter()
        .filter_map(|o| o.parent())
        .filter(|p| !p.as_os_str().is_empty());
    for dir in job.mkdirs.iter().map(|d| d.as_path()).chain(parents) {
        if !ws.is_dir(dir) {
            debug!(task = %job.key.task, dir = %dir.display(), "creating directory");
            ws.fs().create_dir_all(&ws.path(dir)).map_err(io_failure)?;
        }
    }
    Ok(())
}

/// Every output must exist, and none may be older than the newest input.
fn finish_outputs(job: &Job, ws: &Workspace) -> Result<(), FailureReason> {
    if let Some(missing) = job.m.outputs.iter().find(|o| !ws.exists(o)) {
        return Err(FailureReason::OutputMissing(missing.clone()));
    }

    let mut newest: Option<SystemTime> = None;
    for input in job.m.all_inputs() {
        if let Some(t) = ws.modified(input).map_err(io_failure)? {
            newest = Some(newest.map_or(t, |n| n.max(t)));
        }
    }
    let Some(newest) = newest else {
        return Ok(());
    };

    for output in &job.m.outputs {
        let older = ws
            .modified(output)
            .map_err(io_failure)?
            .is_some_and(|t| t < newest);
        if older {
            debug!(task = %job.key.task, output = %output.display(), "touching output older than inputs");
            ws.fs().touch(&ws.path(output)).map_err(io_failure)?;
        }
    }
    Ok(())
}

fn remove_new_outputs(job: &Job, ws: &Workspace, preexisting: &[bool]) {
    for (output, existed) in job.m.outputs.iter().zip(preexisting) {
        if *existed || !ws.exists(output) {
            continue;
        }
        info!(task = %job.key.task, output = %output.display(), "removing output of failed attempt");
        if let Err(e) = ws.fs().remove(&ws.path(output)) {
            warn!(task = %job.key.task, output = %output.display(), error = %e, "failed to remove output");
        }
    }
}

fn io_failure(err: anyhow::Error) -> FailureReason {
    FailureReason::Io(format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::exec::job::Invocation;
    use crate::fs::mock::MockFileSystem;
    use crate::rules::{Captures, Match, ResourceProfile};

    fn job(outputs: &[&str]) -> Job {
        let m = Match {
            task: "sort".into(),
            inputs: vec![PathBuf::from("in.bam")],
            aux: vec![],
            outputs: outputs.iter().map(PathBuf::from).collect(),
            captures: Captures::default(),
        };
        Job {
            key: m.key(),
            invocation: Invocation {
                command: "true".into(),
                workdir: PathBuf::from("."),
                env: vec![],
                resources: ResourceProfile::default(),
            },
            m,
            mkdirs: vec![PathBuf::from("tmp.dir")],
            timeout: None,
            log_file: PathBuf::from(".filedag/logs/sort/in.bam.log"),
        }
    }

    fn workspace() -> (MockFileSystem, Workspace) {
        let fs = MockFileSystem::new();
        let ws = Workspace::new(Arc::new(fs.clone()), PathBuf::new());
        (fs, ws)
    }

    #[test]
    fn output_missing_after_success_is_a_failure() {
        let (fs, ws) = workspace();
        fs.add_file("in.bam", "");
        let err = finish_outputs(&job(&["out/in.sorted.bam"]), &ws).unwrap_err();
        assert_eq!(err, FailureReason::OutputMissing(PathBuf::from("out/in.sorted.bam")));
    }

    #[test]
    fn stale_looking_outputs_are_touched() {
        let (fs, ws) = workspace();
        fs.add_file("out.bam", "");
        fs.add_file("in.bam", "");
        let job = job(&["out.bam"]);
        finish_outputs(&job, &ws).unwrap();
        let input = ws.modified(Path::new("in.bam")).unwrap().unwrap();
        let output = ws.modified(Path::new("out.bam")).unwrap().unwrap();
        assert!(output >= input);
    }

    #[test]
    fn directories_are_prepared_for_outputs() {
        let (_fs, ws) = workspace();
        prepare_dirs(&job(&["out.dir/s1/result.txt"]), &ws).unwrap();
        assert!(ws.is_dir(Path::new("tmp.dir")));
        assert!(ws.is_dir(Path::new("out.dir/s1")));
    }

    #[test]
    fn failed_attempt_removes_only_new_outputs() {
        let (fs, ws) = workspace();
        fs.add_file("old.txt", "kept");
        fs.add_file("new.txt", "partial");
        let job = job(&["old.txt", "new.txt"]);
        remove_new_outputs(&job, &ws, &[true, false]);
        assert!(ws.exists(Path::new("old.txt")));
        assert!(!ws.exists(Path::new("new.txt")));
    }
}
