//! Shared helpers for orchestrator and HTTP integration tests.

use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

use labstream_api::orchestrator::RunOrchestrator;
use labstream_api::ws::ConnectionRegistry;
use labstream_core::history::RunHistory;
use labstream_core::job::{JobCatalog, JobSpec, StaticCatalog};

/// Write an executable temp script with the given body.
pub fn write_script(body: &str) -> tempfile::NamedTempFile {
    use std::io::Write;
    let mut f = tempfile::Builder::new()
        .suffix(".sh")
        .tempfile()
        .expect("create temp file");
    writeln!(f, "#!/bin/sh").expect("write shebang");
    write!(f, "{body}").expect("write body");
    let mut perms = f.as_file().metadata().expect("metadata").permissions();
    perms.set_mode(0o755);
    f.as_file().set_permissions(perms).expect("chmod");
    f
}

/// Build a job spec pointing at a script file.
pub fn job_for(id: &str, script: &tempfile::NamedTempFile) -> JobSpec {
    JobSpec {
        id: id.to_string(),
        program: script.path().to_str().expect("path").to_string(),
        args: vec![],
        working_directory: None,
        total_steps: None,
    }
}

/// Wire a registry, history, and orchestrator over the given jobs.
pub fn orchestrator_with(
    jobs: Vec<JobSpec>,
) -> (Arc<ConnectionRegistry>, Arc<RunHistory>, RunOrchestrator) {
    let registry = Arc::new(ConnectionRegistry::new());
    let history = Arc::new(RunHistory::default());
    let catalog: Arc<dyn JobCatalog> = Arc::new(StaticCatalog::new(jobs));
    let orchestrator =
        RunOrchestrator::new(Arc::clone(&registry), catalog, Arc::clone(&history));
    (registry, history, orchestrator)
}
