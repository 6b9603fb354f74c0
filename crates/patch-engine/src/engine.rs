//! Candidate lifecycle: stage, verify, deploy with backup, drop.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use command_exec::{CommandError, CommandExecutor, RunOptions};
use tracing::{info, warn};

use crate::apply::{apply_fragments, DiffFragment};
use crate::errors::PatchError;
use crate::experience::ExperienceMemory;

/// Patch engine configuration.
#[derive(Clone, Debug)]
pub struct PatchConfig {
    /// Where staged candidates are written before approval.
    pub staging_dir: PathBuf,
    /// Syntax check template; `{file}` is substituted with the staged path.
    /// Applied to every candidate.
    pub syntax_command: Option<String>,
    /// The primary orchestrator file. Candidates targeting it also get a
    /// smoke run to catch immediate startup failures.
    pub orchestrator_file: Option<PathBuf>,
    pub smoke_command: Option<String>,
    pub smoke_timeout: Duration,
    /// Skill modules are verified by a dry import instead of a smoke run.
    pub skills_dir: Option<PathBuf>,
    pub import_command: Option<String>,
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            staging_dir: PathBuf::from("./staging"),
            syntax_command: None,
            orchestrator_file: None,
            smoke_command: None,
            smoke_timeout: Duration::from_secs(10),
            skills_dir: None,
            import_command: None,
        }
    }
}

/// A staged, not-yet-deployed patch. At most one exists at a time.
#[derive(Clone, Debug)]
pub struct PatchCandidate {
    pub target_file: PathBuf,
    pub staging_path: PathBuf,
    pub verified: bool,
}

/// Returned by a successful deploy: the new file is in place and the
/// process should be restarted by its supervisor so it takes effect.
#[derive(Clone, Debug)]
pub struct RestartRequest {
    pub deployed: PathBuf,
    pub backup: PathBuf,
}

pub struct PatchEngine {
    config: PatchConfig,
    executor: CommandExecutor,
    slot: Option<PatchCandidate>,
    experience: ExperienceMemory,
}

impl PatchEngine {
    pub fn new(config: PatchConfig, experience: ExperienceMemory) -> Self {
        Self {
            config,
            executor: CommandExecutor::new(),
            slot: None,
            experience,
        }
    }

    pub fn pending(&self) -> Option<&PatchCandidate> {
        self.slot.as_ref()
    }

    pub fn experience(&self) -> &ExperienceMemory {
        &self.experience
    }

    pub fn experience_mut(&mut self) -> &mut ExperienceMemory {
        &mut self.experience
    }

    /// Apply `fragments` to a copy of `target` and stage the result.
    /// The live file is never touched; a fragment miss aborts the whole
    /// candidate.
    pub fn create_candidate(
        &mut self,
        target: &Path,
        fragments: &[DiffFragment],
    ) -> Result<PathBuf, PatchError> {
        if self.slot.is_some() {
            return Err(PatchError::CandidatePending);
        }

        let source = fs::read_to_string(target)?;
        let patched = apply_fragments(&source, fragments)?;

        fs::create_dir_all(&self.config.staging_dir)?;
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "candidate".to_string());
        let staging_path = self.config.staging_dir.join(format!("{file_name}.staged"));
        fs::write(&staging_path, patched)?;

        info!(target = %target.display(), staged = %staging_path.display(), "patch candidate staged");
        self.slot = Some(PatchCandidate {
            target_file: target.to_path_buf(),
            staging_path: staging_path.clone(),
            verified: false,
        });
        Ok(staging_path)
    }

    /// Verify the pending candidate: syntax check always, smoke run for
    /// the orchestrator file, dry import for skill modules. On failure the
    /// candidate stays pending so the caller can drop it (recording the
    /// rejection).
    pub async fn verify(&mut self) -> Result<(), PatchError> {
        let candidate = self.slot.as_ref().ok_or(PatchError::NoCandidate)?;
        let staged = candidate.staging_path.clone();
        let target = candidate.target_file.clone();

        if let Some(template) = &self.config.syntax_command {
            self.run_stage("syntax", template, &staged, None).await?;
        }

        let is_orchestrator = self
            .config
            .orchestrator_file
            .as_deref()
            .is_some_and(|f| f == target);
        if is_orchestrator {
            if let Some(template) = &self.config.smoke_command {
                let timeout = self.config.smoke_timeout;
                self.run_stage("smoke", template, &staged, Some(timeout))
                    .await?;
            }
        } else if self
            .config
            .skills_dir
            .as_deref()
            .is_some_and(|dir| target.starts_with(dir))
        {
            if let Some(template) = &self.config.import_command {
                self.run_stage("import", template, &staged, None).await?;
            }
        }

        if let Some(candidate) = self.slot.as_mut() {
            candidate.verified = true;
        }
        info!("patch candidate verified");
        Ok(())
    }

    /// Swap the verified candidate into place: timestamped backup of the
    /// current target, overwrite, clear the slot, record acceptance. The
    /// returned request asks the external supervisor for a restart.
    pub async fn deploy(&mut self, proposal_type: &str) -> Result<RestartRequest, PatchError> {
        match self.slot.as_ref() {
            None => return Err(PatchError::NoCandidate),
            Some(candidate) if !candidate.verified => {
                return Err(PatchError::VerifyFailed {
                    stage: "deploy".into(),
                    detail: "candidate was never verified".into(),
                });
            }
            Some(_) => {}
        }
        let candidate = self.slot.take().ok_or(PatchError::NoCandidate)?;

        let backup = backup_path(&candidate.target_file);
        fs::copy(&candidate.target_file, &backup)?;
        fs::copy(&candidate.staging_path, &candidate.target_file)?;
        fs::remove_file(&candidate.staging_path)?;

        self.experience.record_accept(proposal_type)?;
        info!(
            deployed = %candidate.target_file.display(),
            backup = %backup.display(),
            "patch deployed, restart requested"
        );
        Ok(RestartRequest {
            deployed: candidate.target_file,
            backup,
        })
    }

    /// Discard the pending candidate and record the rejection.
    pub fn drop_candidate(&mut self, proposal_type: &str) -> Result<(), PatchError> {
        let candidate = self.slot.take().ok_or(PatchError::NoCandidate)?;
        if let Err(err) = fs::remove_file(&candidate.staging_path) {
            warn!(%err, "failed to remove staged candidate");
        }
        self.experience.record_reject(proposal_type)?;
        info!(target = %candidate.target_file.display(), "patch candidate dropped");
        Ok(())
    }

    async fn run_stage(
        &self,
        stage: &str,
        template: &str,
        staged: &Path,
        timeout: Option<Duration>,
    ) -> Result<(), PatchError> {
        let cmd = template.replace("{file}", &format!("\"{}\"", staged.display()));
        let mut opts = RunOptions::default();
        if let Some(timeout) = timeout {
            opts = opts.with_timeout(timeout);
        }
        match self.executor.run(&cmd, opts).await {
            Ok(_) => Ok(()),
            Err(CommandError::Failed { stderr, stdout, .. }) => Err(PatchError::VerifyFailed {
                stage: stage.to_string(),
                detail: if stderr.trim().is_empty() {
                    stdout
                } else {
                    stderr
                },
            }),
            Err(CommandError::Timeout(t)) => Err(PatchError::VerifyFailed {
                stage: stage.to_string(),
                detail: format!("timed out after {t:?}"),
            }),
            Err(err) => Err(PatchError::Command(err)),
        }
    }
}

fn backup_path(target: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%d%H%M%S");
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "target".to_string());
    target.with_file_name(format!("{file_name}.bak_{stamp}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_in(dir: &Path) -> PatchEngine {
        let config = PatchConfig {
            staging_dir: dir.join("staging"),
            syntax_command: Some("test -s {file}".to_string()),
            ..PatchConfig::default()
        };
        let experience = ExperienceMemory::load(dir.join("experience.json"));
        PatchEngine::new(config, experience)
    }

    fn fragment(search: &str, replace: &str) -> DiffFragment {
        DiffFragment {
            search: search.into(),
            replace: replace.into(),
        }
    }

    #[test]
    fn failed_apply_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("module.rs");
        fs::write(&target, "original content").unwrap();

        let mut engine = engine_in(dir.path());
        let err = engine
            .create_candidate(&target, &[fragment("missing text", "x")])
            .unwrap_err();
        assert!(matches!(err, PatchError::NoMatch { index: 0 }));
        assert_eq!(fs::read_to_string(&target).unwrap(), "original content");
        assert!(engine.pending().is_none());
    }

    #[test]
    fn only_one_candidate_may_be_pending() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("module.rs");
        fs::write(&target, "alpha beta").unwrap();

        let mut engine = engine_in(dir.path());
        engine
            .create_candidate(&target, &[fragment("alpha", "gamma")])
            .unwrap();
        let err = engine
            .create_candidate(&target, &[fragment("beta", "delta")])
            .unwrap_err();
        assert!(matches!(err, PatchError::CandidatePending));
    }

    #[tokio::test]
    async fn verify_then_deploy_backs_up_and_swaps() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("module.rs");
        fs::write(&target, "alpha beta").unwrap();

        let mut engine = engine_in(dir.path());
        let staged = engine
            .create_candidate(&target, &[fragment("alpha", "gamma")])
            .unwrap();
        assert_eq!(fs::read_to_string(&staged).unwrap(), "gamma beta");

        engine.verify().await.unwrap();
        let request = engine.deploy("tuning").await.unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "gamma beta");
        assert_eq!(fs::read_to_string(&request.backup).unwrap(), "alpha beta");
        assert!(!staged.exists());
        assert!(engine.pending().is_none());
        assert_eq!(
            engine.experience().record().last_proposal_type.as_deref(),
            Some("tuning")
        );
    }

    #[tokio::test]
    async fn deploy_refuses_unverified_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("module.rs");
        fs::write(&target, "alpha").unwrap();

        let mut engine = engine_in(dir.path());
        engine
            .create_candidate(&target, &[fragment("alpha", "beta")])
            .unwrap();
        let err = engine.deploy("tuning").await.unwrap_err();
        assert!(matches!(err, PatchError::VerifyFailed { .. }));
        // Target still untouched.
        assert_eq!(fs::read_to_string(&target).unwrap(), "alpha");
    }

    #[tokio::test]
    async fn failing_syntax_check_reports_stage() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("module.rs");
        fs::write(&target, "alpha").unwrap();

        let config = PatchConfig {
            staging_dir: dir.path().join("staging"),
            syntax_command: Some("test ! -e {file}".to_string()),
            ..PatchConfig::default()
        };
        let experience = ExperienceMemory::load(dir.path().join("experience.json"));
        let mut engine = PatchEngine::new(config, experience);

        engine
            .create_candidate(&target, &[fragment("alpha", "beta")])
            .unwrap();
        let err = engine.verify().await.unwrap_err();
        assert!(matches!(err, PatchError::VerifyFailed { ref stage, .. } if stage == "syntax"));
        // Candidate still pending; the caller decides to drop it.
        assert!(engine.pending().is_some());
    }

    #[tokio::test]
    async fn smoke_timeout_fails_orchestrator_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("orchestrator.rs");
        fs::write(&target, "alpha").unwrap();

        let config = PatchConfig {
            staging_dir: dir.path().join("staging"),
            syntax_command: None,
            orchestrator_file: Some(target.clone()),
            smoke_command: Some("sleep 5".to_string()),
            smoke_timeout: Duration::from_millis(100),
            ..PatchConfig::default()
        };
        let experience = ExperienceMemory::load(dir.path().join("experience.json"));
        let mut engine = PatchEngine::new(config, experience);

        engine
            .create_candidate(&target, &[fragment("alpha", "beta")])
            .unwrap();
        let err = engine.verify().await.unwrap_err();
        assert!(matches!(err, PatchError::VerifyFailed { ref stage, .. } if stage == "smoke"));
    }

    #[test]
    fn drop_records_rejection_and_clears_slot() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("module.rs");
        fs::write(&target, "alpha").unwrap();

        let mut engine = engine_in(dir.path());
        let staged = engine
            .create_candidate(&target, &[fragment("alpha", "beta")])
            .unwrap();
        engine.drop_candidate("logging").unwrap();

        assert!(!staged.exists());
        assert!(engine.pending().is_none());
        assert_eq!(engine.experience().avoid_list(), ["logging"]);
    }
}
