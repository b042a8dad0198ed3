//! Job descriptors and the catalog seam.
//!
//! How a job id maps to an executable is not this system's concern: the
//! orchestrator consumes a [`JobCatalog`] trait object supplied at wiring
//! time. [`StaticCatalog`] is the trivial in-memory implementation used by
//! the server binary and by tests.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Description of one runnable job: which executable to invoke and how.
///
/// The job contract: the executable writes human-readable lines to
/// stdout/stderr for progress, may emit one self-contained JSON record
/// per stdout line for structured output, and signals success with exit
/// code zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    /// Stable job identifier, e.g. `"network-smoke-test"`.
    pub id: String,
    /// Absolute path of the executable (script or binary).
    pub program: String,
    /// Fixed arguments passed before any run parameters.
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory for the child process (server cwd if `None`).
    #[serde(default)]
    pub working_directory: Option<String>,
    /// Declared step count, if the job reports step-wise progress.
    #[serde(default)]
    pub total_steps: Option<u32>,
}

/// Resolves job identifiers to [`JobSpec`]s.
///
/// Implemented by whatever owns job configuration (a config file, a
/// service, a test fixture). `resolve` returning `None` means the run
/// request fails before anything is spawned.
pub trait JobCatalog: Send + Sync {
    /// Look up a job by its stable identifier.
    fn resolve(&self, job_id: &str) -> Option<JobSpec>;
}

/// Fixed in-memory catalog.
pub struct StaticCatalog {
    jobs: HashMap<String, JobSpec>,
}

impl StaticCatalog {
    /// Build a catalog from a list of specs. Later duplicates win.
    pub fn new(specs: Vec<JobSpec>) -> Self {
        let jobs = specs.into_iter().map(|s| (s.id.clone(), s)).collect();
        Self { jobs }
    }

    /// Catalog with no jobs; every lookup fails.
    pub fn empty() -> Self {
        Self {
            jobs: HashMap::new(),
        }
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Whether the catalog has no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl JobCatalog for StaticCatalog {
    fn resolve(&self, job_id: &str) -> Option<JobSpec> {
        self.jobs.get(job_id).cloned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
