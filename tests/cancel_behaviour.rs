use filedag::config::Params;
use filedag::engine::{Completion, EntryState, FailureReason};
use filedag::fs::mock::MockFileSystem;
use filedag::rules::{InputSpec, TaskDecl};
use filedag_test_utils::{init_tracing, pipeline, FakeRun, Scripted};

fn fan_out() -> Vec<TaskDecl> {
    vec![
        TaskDecl::new("quick").output("quick.txt").command("touch {output}"),
        TaskDecl::new("slow")
            .input(InputSpec::glob("data/*.csv"))
            .output("slow/{1}.out")
            .command("crunch {input} > {output}"),
        TaskDecl::new("summary")
            .follows(["quick", "slow"])
            .output("summary.txt")
            .command("cat slow/*.out > {output}"),
    ]
}

#[tokio::test]
async fn abort_cancels_in_flight_and_skips_pending() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("data/a.csv", "1");
    fs.add_file("data/b.csv", "2");

    let running = FakeRun::new(pipeline(fan_out(), Params::new()), fs)
        .outcome("slow", Scripted::Hang)
        .start(&[]);
    running.wait_for_dispatches(3).await;
    running.abort().await;
    let report = running.finish().await;

    assert_eq!(
        report.find("quick", Some("quick.txt")).map(|e| e.state.clone()),
        Some(EntryState::Succeeded(Completion::Ran))
    );
    for id in ["data/a.csv", "data/b.csv"] {
        assert_eq!(
            report.find("slow", Some(id)).map(|e| e.state.clone()),
            Some(EntryState::Failed(FailureReason::Cancelled)),
            "{id}"
        );
    }
    assert_eq!(
        report.find("summary", None).map(|e| e.state.clone()),
        Some(EntryState::Skipped)
    );
    assert_eq!(report.counts().skipped, 1);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn abort_reports_only_the_selected_tasks() {
    init_tracing();
    let fs = MockFileSystem::new();
    fs.add_file("data/a.csv", "1");

    let running = FakeRun::new(pipeline(fan_out(), Params::new()), fs)
        .outcome("slow", Scripted::Hang)
        .start(&["slow"]);
    running.wait_for_dispatches(1).await;
    running.abort().await;
    let report = running.finish().await;

    assert_eq!(report.counts().failed, 1);
    assert!(report.find("summary", None).is_none());
    assert!(report.find("quick", Some("quick.txt")).is_none());
}
