use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use filedag::config::load_and_validate;
use filedag::engine::{PlannedMatch, Planner, PlannerOptions};
use filedag::fs::mock::MockFileSystem;
use filedag::fs::RealFileSystem;
use filedag::pipeline::load_pipeline;
use filedag::staleness::MtimeCheck;
use filedag::types::StalenessMode;
use filedag_test_utils::{init_tracing, mock_workspace};

type TestResult = Result<(), Box<dyn Error>>;

fn demo(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("demos")
        .join(name)
        .join("Filedag.toml")
}

#[test]
fn rnaseq_demo_loads_and_orders_its_tasks() -> TestResult {
    init_tracing();
    let path = demo("rnaseq");
    let file = load_and_validate(&path)?;
    assert_eq!(file.config_section().staleness, StalenessMode::Mtime);
    assert_eq!(file.config_section().jobs, 4);

    let pipeline = load_pipeline(&RealFileSystem, &file, &path)?;
    assert_eq!(pipeline.params().get_str("genome"), "hg38");
    let annotations = path.with_file_name("annotations").canonicalize()?;
    assert_eq!(
        pipeline.params().get_str("annotations_interface_geneset_all_gtf"),
        annotations.join("geneset_all.gtf.gz").to_string_lossy()
    );

    let order: Vec<&str> = pipeline.rules().map(|r| r.name()).collect();
    assert_eq!(
        order,
        vec![
            "reference_creation",
            "reference_index",
            "mapping",
            "mapping_stats",
            "all"
        ]
    );

    let mapping = pipeline.rule("mapping").ok_or("mapping missing")?;
    assert_eq!(mapping.decl.resources.threads, 8);
    assert_eq!(mapping.decl.timeout, Some(Duration::from_secs(2 * 60 * 60)));
    assert_eq!(mapping.aux, vec![PathBuf::from("genome.dir/hg38.fasta")]);
    Ok(())
}

#[test]
fn rnaseq_demo_plans_mapping_jobs_in_its_environment() -> TestResult {
    init_tracing();
    let path = demo("rnaseq");
    let file = load_and_validate(&path)?;
    let pipeline = Arc::new(load_pipeline(&RealFileSystem, &file, &path)?);

    let fs = MockFileSystem::new();
    fs.add_file("genome.dir/hg38.fasta", ">chr1");
    fs.add_file("input.dir/liver.fastq.gz", "@r");
    let planner = Planner::new(
        pipeline,
        mock_workspace(&fs),
        Arc::new(MtimeCheck),
        PlannerOptions::from_config(file.config_section()),
    );

    let plan = planner.plan("mapping").map_err(|e| e.to_string())?;
    let [PlannedMatch::Stale(job)] = plan.as_slice() else {
        return Err(format!("expected one stale match, got {plan:?}").into());
    };
    assert_eq!(
        job.invocation.command,
        "conda activate mapping && bwa mem -t $FILEDAG_THREADS genome.dir/hg38.fasta \
         input.dir/liver.fastq.gz | samtools sort -o mapping.dir/liver.bam"
    );
    assert!(job
        .invocation
        .env
        .contains(&("FILEDAG_THREADS".to_string(), "8".to_string())));
    Ok(())
}
