//! Execution backend dispatch.
//!
//! The `local` backend runs pipeline work inside a rayon thread pool. The
//! `pbs` and `slurm` backends render a batch job script from the
//! `parameters.yml` cluster profile and hand it to the scheduler's submit
//! program; the script wraps the equivalent local invocation so the work runs
//! on the allocated node.

use std::{
    fmt,
    io::Write,
    path::Path,
    process::{Command, Stdio},
    str::FromStr,
};

use tracing::{debug, info};

use crate::{config::ConfigMap, error::ClusterError};

const DEFAULT_WALLTIME: &str = "01:00:00";
const DEFAULT_MEMORY: &str = "4GB";
const DEFAULT_CORES: u64 = 1;

/// Supported cluster types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterKind {
    /// PBS batch scheduler (`qsub`).
    Pbs,
    /// Slurm batch scheduler (`sbatch`).
    Slurm,
    /// In-process thread pool.
    Local,
}

impl ClusterKind {
    /// Configuration key and display name for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pbs => "pbs",
            Self::Slurm => "slurm",
            Self::Local => "local",
        }
    }

    /// Default submit program for batch kinds.
    #[must_use]
    pub const fn submit_program(self) -> &'static str {
        match self {
            Self::Pbs => "qsub",
            Self::Slurm => "sbatch",
            Self::Local => "",
        }
    }
}

impl fmt::Display for ClusterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterKind {
    type Err = ClusterError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pbs" => Ok(Self::Pbs),
            "slurm" => Ok(Self::Slurm),
            "local" => Ok(Self::Local),
            other => Err(ClusterError::Unsupported {
                kind: other.to_owned(),
            }),
        }
    }
}

/// Per-worker resource profile read from `parameters.yml`.
#[derive(Debug, Clone)]
pub struct ClusterProfile {
    /// Queue (PBS) or partition (Slurm) to submit into.
    pub queue: Option<String>,
    /// Wall-clock limit in `HH:MM:SS` form.
    pub walltime: String,
    /// Cores per worker.
    pub cores: u64,
    /// Memory per worker, scheduler syntax (e.g. `4GB`).
    pub memory: String,
    /// Submit program override; defaults to the scheduler's own.
    pub submit_program: Option<String>,
}

impl Default for ClusterProfile {
    fn default() -> Self {
        Self {
            queue: None,
            walltime: DEFAULT_WALLTIME.to_owned(),
            cores: DEFAULT_CORES,
            memory: DEFAULT_MEMORY.to_owned(),
            submit_program: None,
        }
    }
}

impl ClusterProfile {
    /// Build the profile for `kind` from the `cluster` section of
    /// `parameters.yml`. Missing sections and keys fall back to defaults.
    #[must_use]
    pub fn from_parameters(parameters: &ConfigMap, kind: ClusterKind) -> Self {
        let cluster = parameters.mapping_or_empty("cluster");
        let profile = cluster.mapping_or_empty(kind.as_str());
        Self {
            queue: profile.str_opt("queue"),
            walltime: profile.str_or("walltime", DEFAULT_WALLTIME),
            cores: profile.u64_opt("cores").unwrap_or(DEFAULT_CORES),
            memory: profile.str_or("memory", DEFAULT_MEMORY),
            submit_program: profile.str_opt("submit_program"),
        }
    }
}

/// A started execution backend.
#[derive(Debug)]
pub enum Cluster {
    /// In-process rayon thread pool.
    Local(LocalPool),
    /// Batch scheduler backend.
    Batch(BatchCluster),
}

impl Cluster {
    /// Construct the backend for `kind` with `workers` workers.
    ///
    /// # Errors
    /// Returns [`ClusterError::Pool`] when the local thread pool cannot be
    /// built.
    pub fn start(
        kind: ClusterKind,
        workers: usize,
        profile: ClusterProfile,
    ) -> Result<Self, ClusterError> {
        match kind {
            ClusterKind::Local => {
                let pool = build_pool(workers)?;
                info!(workers, "local worker pool started");
                Ok(Self::Local(LocalPool { pool, workers }))
            }
            ClusterKind::Pbs | ClusterKind::Slurm => {
                debug!(kind = %kind, workers, "batch cluster prepared");
                Ok(Self::Batch(BatchCluster {
                    kind,
                    workers,
                    profile,
                    jobs: Vec::new(),
                }))
            }
        }
    }

    /// The cluster kind this backend was started for.
    #[must_use]
    pub const fn kind(&self) -> ClusterKind {
        match self {
            Self::Local(_) => ClusterKind::Local,
            Self::Batch(batch) => batch.kind,
        }
    }

    /// Number of workers the backend was scaled to.
    #[must_use]
    pub const fn workers(&self) -> usize {
        match self {
            Self::Local(local) => local.workers,
            Self::Batch(batch) => batch.workers,
        }
    }

    /// Resize the backend to `workers` workers.
    ///
    /// # Errors
    /// Returns [`ClusterError::Pool`] when the local pool cannot be rebuilt.
    pub fn scale(&mut self, workers: usize) -> Result<(), ClusterError> {
        match self {
            Self::Local(local) => {
                local.pool = build_pool(workers)?;
                local.workers = workers;
            }
            Self::Batch(batch) => batch.workers = workers,
        }
        Ok(())
    }

    /// Run `op` on this backend. Local backends execute inside the thread
    /// pool so rayon-parallel work inherits the configured worker count;
    /// batch backends run inline (the heavy work lives in the submitted job).
    pub fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        match self {
            Self::Local(local) => local.pool.install(op),
            Self::Batch(_) => op(),
        }
    }

    /// Release the backend. Submitted batch jobs keep running; the scheduler
    /// owns their lifecycle from submission onwards.
    pub fn close(self) {
        if let Self::Local(local) = self {
            drop(local.pool);
        }
    }
}

fn build_pool(workers: usize) -> Result<rayon::ThreadPool, ClusterError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|source| ClusterError::Pool { source })
}

/// In-process rayon thread pool backend.
pub struct LocalPool {
    pool: rayon::ThreadPool,
    workers: usize,
}

impl fmt::Debug for LocalPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalPool")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

/// Batch scheduler backend for PBS and Slurm.
#[derive(Debug)]
pub struct BatchCluster {
    kind: ClusterKind,
    workers: usize,
    profile: ClusterProfile,
    jobs: Vec<String>,
}

impl BatchCluster {
    /// Job ids returned by the scheduler for submissions so far.
    #[must_use]
    pub fn jobs(&self) -> &[String] {
        &self.jobs
    }

    /// Render the batch script that wraps `command`, writing scheduler
    /// directives for this backend's profile and log paths under `logs_dir`.
    #[must_use]
    pub fn render_script(&self, command: &str, logs_dir: &Path) -> String {
        let out = logs_dir.join("acd-ard.out");
        let err = logs_dir.join("acd-ard.err");
        let mut script = String::from("#!/bin/bash\n");
        match self.kind {
            ClusterKind::Pbs => {
                script.push_str("#PBS -N acd-ard\n");
                if let Some(queue) = &self.profile.queue {
                    script.push_str(&format!("#PBS -q {queue}\n"));
                }
                script.push_str(&format!("#PBS -l walltime={}\n", self.profile.walltime));
                script.push_str(&format!(
                    "#PBS -l ncpus={}\n",
                    self.profile.cores * self.workers as u64
                ));
                script.push_str(&format!("#PBS -l mem={}\n", self.profile.memory));
                script.push_str(&format!("#PBS -o {}\n", out.display()));
                script.push_str(&format!("#PBS -e {}\n", err.display()));
                script.push_str("cd \"$PBS_O_WORKDIR\"\n");
            }
            ClusterKind::Slurm => {
                script.push_str("#SBATCH --job-name=acd-ard\n");
                if let Some(partition) = &self.profile.queue {
                    script.push_str(&format!("#SBATCH --partition={partition}\n"));
                }
                script.push_str(&format!("#SBATCH --time={}\n", self.profile.walltime));
                script.push_str(&format!("#SBATCH --ntasks={}\n", self.workers));
                script.push_str(&format!("#SBATCH --cpus-per-task={}\n", self.profile.cores));
                script.push_str(&format!("#SBATCH --mem={}\n", self.profile.memory));
                script.push_str(&format!("#SBATCH --output={}\n", out.display()));
                script.push_str(&format!("#SBATCH --error={}\n", err.display()));
            }
            ClusterKind::Local => {}
        }
        script.push_str(command);
        script.push('\n');
        script
    }

    /// Submit the rendered script on the scheduler's standard input and
    /// record the job id the scheduler prints.
    ///
    /// # Errors
    /// Returns [`ClusterError::Spawn`] when the submit program cannot be
    /// started and [`ClusterError::Submit`] when it exits unsuccessfully.
    pub fn submit(&mut self, command: &str, logs_dir: &Path) -> Result<String, ClusterError> {
        let program = self
            .profile
            .submit_program
            .clone()
            .unwrap_or_else(|| self.kind.submit_program().to_owned());
        let script = self.render_script(command, logs_dir);

        let mut child = Command::new(&program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ClusterError::Spawn {
                program: program.clone(),
                source,
            })?;
        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(script.as_bytes())
                .map_err(|source| ClusterError::Spawn {
                    program: program.clone(),
                    source,
                })?;
        }
        let output = child
            .wait_with_output()
            .map_err(|source| ClusterError::Spawn {
                program: program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ClusterError::Submit {
                program,
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        let job_id = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        info!(scheduler = %self.kind, job_id = job_id.as_str(), "batch job submitted");
        self.jobs.push(job_id.clone());
        Ok(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("pbs", ClusterKind::Pbs)]
    #[case("PBS", ClusterKind::Pbs)]
    #[case(" slurm ", ClusterKind::Slurm)]
    #[case("local", ClusterKind::Local)]
    fn cluster_kind_parses_supported_values(#[case] raw: &str, #[case] expected: ClusterKind) {
        let kind: ClusterKind = raw.parse().expect("kind must parse");
        assert_eq!(kind, expected);
    }

    #[test]
    fn cluster_kind_rejects_unknown_values() {
        let err = "sge".parse::<ClusterKind>().expect_err("sge is not supported");
        match &err {
            ClusterError::Unsupported { kind } => assert_eq!(kind, "sge"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.code().as_str(), "CLUSTER_UNSUPPORTED_TYPE");
    }

    #[test]
    fn local_cluster_runs_work_in_pool() {
        let cluster =
            Cluster::start(ClusterKind::Local, 2, ClusterProfile::default()).expect("local pool");
        assert_eq!(cluster.workers(), 2);
        let threads = cluster.install(rayon::current_num_threads);
        assert_eq!(threads, 2);
        cluster.close();
    }

    #[test]
    fn scale_rebuilds_local_pool() {
        let mut cluster =
            Cluster::start(ClusterKind::Local, 1, ClusterProfile::default()).expect("local pool");
        cluster.scale(3).expect("scale must succeed");
        assert_eq!(cluster.workers(), 3);
        assert_eq!(cluster.install(rayon::current_num_threads), 3);
    }

    #[test]
    fn pbs_script_carries_profile_directives() {
        let profile = ClusterProfile {
            queue: Some("normal".to_owned()),
            walltime: "02:00:00".to_owned(),
            cores: 2,
            memory: "8GB".to_owned(),
            submit_program: None,
        };
        let cluster = Cluster::start(ClusterKind::Pbs, 4, profile).expect("batch cluster");
        let Cluster::Batch(batch) = &cluster else {
            panic!("pbs must yield a batch cluster");
        };
        let script = batch.render_script("acd-ard rechunk --input a.zarr", Path::new("/logs"));
        assert!(script.starts_with("#!/bin/bash\n"));
        assert!(script.contains("#PBS -q normal"));
        assert!(script.contains("#PBS -l walltime=02:00:00"));
        assert!(script.contains("#PBS -l ncpus=8"));
        assert!(script.contains("#PBS -l mem=8GB"));
        assert!(script.ends_with("acd-ard rechunk --input a.zarr\n"));
    }

    #[test]
    fn slurm_script_carries_profile_directives() {
        let cluster = Cluster::start(ClusterKind::Slurm, 2, ClusterProfile::default())
            .expect("batch cluster");
        let Cluster::Batch(batch) = &cluster else {
            panic!("slurm must yield a batch cluster");
        };
        let script = batch.render_script("acd-ard base --dataset agcd", Path::new("/logs"));
        assert!(script.contains("#SBATCH --ntasks=2"));
        assert!(script.contains("#SBATCH --time=01:00:00"));
        assert!(script.contains("#SBATCH --mem=4GB"));
    }

    #[test]
    fn submit_pipes_script_through_submit_program() {
        let dir = TempDir::new().expect("tempdir");
        let profile = ClusterProfile {
            // `cat` echoes the script back, standing in for qsub in tests.
            submit_program: Some("cat".to_owned()),
            ..ClusterProfile::default()
        };
        let cluster = Cluster::start(ClusterKind::Pbs, 1, profile).expect("batch cluster");
        let Cluster::Batch(mut batch) = cluster else {
            panic!("pbs must yield a batch cluster");
        };
        let echoed = batch
            .submit("acd-ard manifest --collection agcd", dir.path())
            .expect("submission must succeed");
        assert!(echoed.contains("#PBS -N acd-ard"));
        assert!(echoed.contains("acd-ard manifest --collection agcd"));
        assert_eq!(batch.jobs().len(), 1);
    }

    #[test]
    fn submit_reports_missing_program() {
        let dir = TempDir::new().expect("tempdir");
        let profile = ClusterProfile {
            submit_program: Some("definitely-not-a-scheduler".to_owned()),
            ..ClusterProfile::default()
        };
        let cluster = Cluster::start(ClusterKind::Slurm, 1, profile).expect("batch cluster");
        let Cluster::Batch(mut batch) = cluster else {
            panic!("slurm must yield a batch cluster");
        };
        let err = batch
            .submit("acd-ard base --dataset agcd", dir.path())
            .expect_err("missing program must fail");
        assert!(matches!(err, ClusterError::Spawn { .. }));
    }

    #[test]
    fn profile_reads_parameters_section() {
        let yaml = "cluster:\n  default_type: pbs\n  pbs:\n    queue: express\n    cores: 4\n    memory: 16GB\n";
        let map = serde_yaml::from_str::<serde_yaml::Mapping>(yaml).expect("yaml");
        let parameters = crate::config::ConfigMap::from_mapping("parameters", map);
        let profile = ClusterProfile::from_parameters(&parameters, ClusterKind::Pbs);
        assert_eq!(profile.queue.as_deref(), Some("express"));
        assert_eq!(profile.cores, 4);
        assert_eq!(profile.memory, "16GB");
        assert_eq!(profile.walltime, DEFAULT_WALLTIME);
    }
}
