//! End-to-end runs through the real `fl-worker` binary, with `sh` standing in
//! for the CFD solver.

use fl_engine::{EngineConfig, JobOrchestrator, CASE_DIR, FINAL_CASE_DIR};
use fl_oracle::SolverConfig;
use fl_types::{
    Algorithm, BisectionParams, CracSpec, Diagnostic, DomainConfig, GeneticParams, JobSubmission,
    RackSpec, RunId, RunStatus, DIAGNOSTIC_FILE, OPTIMIZATION_RESULT_FILE, SIMULATION_RESULT_FILE,
    WORKER_LOG_FILE,
};
use std::path::Path;
use std::time::Duration;

const POLL: Duration = Duration::from_millis(50);
const LIMIT: Duration = Duration::from_secs(60);

fn solver(script: &str) -> SolverConfig {
    SolverConfig::new("sh").with_args(["-c", script])
}

fn constant_solver(max_temperature: f64) -> SolverConfig {
    solver(&format!(
        r#"test -f regions.json && printf '{{"max_temperature": {max_temperature}}}' > results.json"#
    ))
}

fn orchestrator(root: &Path, solver: SolverConfig) -> JobOrchestrator {
    JobOrchestrator::new(
        EngineConfig::new(root)
            .with_worker_bin(env!("CARGO_BIN_EXE_fl-worker"))
            .with_solver(solver)
            .with_max_parallel(2),
    )
    .unwrap()
}

fn room() -> DomainConfig {
    DomainConfig::new([12.0, 8.0, 3.0])
        .with_rack(RackSpec::new("rack_1", [1.0, 1.0, 0.0], [0.6, 1.2, 2.0], 4000.0))
        .with_rack(RackSpec::new("rack_2", [3.1, 1.0, 0.0], [0.6, 1.2, 2.0], 4000.0))
        .with_crac(CracSpec::new("crac_1", [10.5, 6.5, 0.0], [1.0, 1.0, 2.0], 3.0))
}

async fn json(orch: &JobOrchestrator, run_id: RunId, name: &str) -> serde_json::Value {
    serde_json::from_slice(&orch.fetch_artifact(run_id, name).await.unwrap()).unwrap()
}

#[tokio::test]
async fn simulation_run_completes_with_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(dir.path(), constant_solver(301.5));

    let run_id = orch
        .submit(JobSubmission::new(room(), Algorithm::Simulation))
        .await
        .unwrap();
    assert!(matches!(
        orch.poll_status(run_id).await,
        RunStatus::Running | RunStatus::Completed
    ));

    let status = orch.wait_for_terminal(run_id, POLL, LIMIT).await.unwrap();
    assert_eq!(status, RunStatus::Completed);

    let result = json(&orch, run_id, SIMULATION_RESULT_FILE).await;
    assert_eq!(result["max_temperature"], 301.5);
    assert!(orch.run_dir(run_id).join(CASE_DIR).join("regions.json").exists());
    assert!(orch.run_dir(run_id).join(WORKER_LOG_FILE).exists());
}

#[tokio::test]
async fn bisection_run_reports_supply_temperature() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(dir.path(), constant_solver(300.0));

    let run_id = orch
        .submit(JobSubmission::new(
            room(),
            Algorithm::Bisection(BisectionParams::default()),
        ))
        .await
        .unwrap();
    assert!(matches!(
        orch.poll_status(run_id).await,
        RunStatus::RunningOptimization | RunStatus::Completed
    ));
    assert_eq!(
        orch.wait_for_terminal(run_id, POLL, LIMIT).await.unwrap(),
        RunStatus::Completed
    );

    // Every candidate meets the target, so the bracket closes on its top.
    let result = json(&orch, run_id, OPTIMIZATION_RESULT_FILE).await;
    let optimal = result["optimal_control_value"].as_f64().unwrap();
    assert!(optimal > 307.0 && optimal <= 308.15, "got {optimal}");
    assert_eq!(result["target_constraint"], 308.15);
    assert!(orch.run_dir(run_id).join(FINAL_CASE_DIR).exists());
}

#[tokio::test]
async fn genetic_run_persists_full_history() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(dir.path(), constant_solver(299.0));
    let params = GeneticParams {
        generations: 2,
        individuals_per_generation: 2,
        seed: Some(3),
        ..GeneticParams::default()
    };

    let run_id = orch
        .submit(JobSubmission::new(room(), Algorithm::Genetic(params)))
        .await
        .unwrap();
    assert_eq!(
        orch.wait_for_terminal(run_id, POLL, LIMIT).await.unwrap(),
        RunStatus::Completed
    );

    let result = json(&orch, run_id, OPTIMIZATION_RESULT_FILE).await;
    assert_eq!(result["type"], "GA");
    assert_eq!(result["initial_objective"], 299.0);
    assert_eq!(result["minimized_objective"], 299.0);
    assert_eq!(result["all_results"].as_array().unwrap().len(), 4);
    assert_eq!(result["best_assignment"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn solver_failure_is_contained() {
    let dir = tempfile::tempdir().unwrap();
    let failing = orchestrator(dir.path(), solver("echo 'mesh failed' >&2; exit 1"));
    let healthy = orchestrator(&dir.path().join("healthy"), constant_solver(298.0));

    let failed_run = failing
        .submit(JobSubmission::new(
            room(),
            Algorithm::Bisection(BisectionParams::default()),
        ))
        .await
        .unwrap();
    let healthy_run = healthy
        .submit(JobSubmission::new(room(), Algorithm::Simulation))
        .await
        .unwrap();

    assert_eq!(
        failing.wait_for_terminal(failed_run, POLL, LIMIT).await.unwrap(),
        RunStatus::Failed
    );
    let diagnostic: Diagnostic =
        serde_json::from_slice(&failing.fetch_artifact(failed_run, DIAGNOSTIC_FILE).await.unwrap())
            .unwrap();
    assert_eq!(diagnostic.run_id, failed_run);
    assert_eq!(diagnostic.kind, "oracle_execution_error");
    assert!(failing
        .fetch_artifact(failed_run, OPTIMIZATION_RESULT_FILE)
        .await
        .is_err());
    let record = failing.run_record(failed_run).await.unwrap();
    assert!(record.error.is_some());

    // The orchestrator keeps answering, and other runs are unaffected.
    assert_eq!(failing.poll_status(RunId::new()).await, RunStatus::NotFound);
    assert_eq!(
        healthy.wait_for_terminal(healthy_run, POLL, LIMIT).await.unwrap(),
        RunStatus::Completed
    );
}

#[tokio::test]
async fn hung_job_is_killed_after_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let orch = JobOrchestrator::new(
        EngineConfig::new(dir.path())
            .with_worker_bin(env!("CARGO_BIN_EXE_fl-worker"))
            .with_solver(solver("echo $$ > solver.pid; exec sleep 30"))
            .with_job_timeout_secs(2),
    )
    .unwrap();

    let run_id = orch
        .submit(JobSubmission::new(room(), Algorithm::Simulation))
        .await
        .unwrap();
    assert_eq!(
        orch.wait_for_terminal(run_id, POLL, Duration::from_secs(20))
            .await
            .unwrap(),
        RunStatus::Failed
    );
    let diagnostic = json(&orch, run_id, DIAGNOSTIC_FILE).await;
    assert_eq!(diagnostic["kind"], "job_timeout");

    #[cfg(target_os = "linux")]
    {
        let pid_file = orch.run_dir(run_id).join(CASE_DIR).join("solver.pid");
        let pid: u32 = std::fs::read_to_string(pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        assert!(
            gone_within(pid, Duration::from_secs(5)).await,
            "solver {pid} outlived its worker"
        );
    }
}

/// Whether `pid` stops being a live process within `limit`. Zombies count as
/// gone.
#[cfg(target_os = "linux")]
async fn gone_within(pid: u32, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let alive = std::fs::read_to_string(format!("/proc/{pid}/stat"))
            .ok()
            .and_then(|stat| {
                let (_, rest) = stat.rsplit_once(')')?;
                rest.trim_start().chars().next()
            })
            .is_some_and(|state| !matches!(state, 'Z' | 'X'));
        if !alive {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL).await;
    }
}

#[tokio::test]
async fn unknown_run_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(dir.path(), constant_solver(300.0));
    assert_eq!(orch.poll_status(RunId::new()).await, RunStatus::NotFound);
    assert!(orch
        .fetch_artifact(RunId::new(), SIMULATION_RESULT_FILE)
        .await
        .is_err());
}
