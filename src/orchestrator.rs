//! Event pipeline: inbound chat events to gated local actions.
//!
//! One orchestrator owns the synchronizer (behind an async mutex that is
//! the global send queue), the risk classifier, the approval queue, the
//! command executor and the patch engine. Every conversational turn,
//! including the autonomy loop, serializes through the synchronizer lock.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use action_gate::{extract_intents, ApprovalQueue, RiskClassifier};
use command_exec::{CommandError, CommandExecutor, RunOptions};
use golem_core_types::{ActionIntent, ChatEvent, ChannelId, RiskAssessment, RiskTier, TaskId};
use locator_heal::{KeyRing, LocatorStore, ModelDoctor, ModelDoctorConfig};
use parking_lot::Mutex;
use patch_engine::{ExperienceMemory, PatchEngine};
use response_sync::{ChatSurface, ResponseSynchronizer};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tracing::{error, info, warn};

use crate::autonomy::{parse_proposal, proposal_prompt};
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::logbook::{Direction, InteractionLog};
use crate::port::{ButtonSpec, ChatPort, Outbound};
use crate::skills::SkillCatalog;

pub struct Orchestrator<S: ChatSurface> {
    sync: AsyncMutex<ResponseSynchronizer<S>>,
    classifier: RiskClassifier,
    queue: Mutex<ApprovalQueue>,
    executor: CommandExecutor,
    patches: AsyncMutex<PatchEngine>,
    /// Category of the currently staged proposal, if any.
    pending_kind: Mutex<Option<String>>,
    port: Arc<dyn ChatPort>,
    log: InteractionLog,
    skills: SkillCatalog,
    config: EngineConfig,
}

impl<S: ChatSurface> Orchestrator<S> {
    pub fn new(
        config: EngineConfig,
        synchronizer: ResponseSynchronizer<S>,
        port: Arc<dyn ChatPort>,
    ) -> Result<Self, EngineError> {
        let classifier = RiskClassifier::new(config.policy_config())?;
        let experience = ExperienceMemory::load(config.patch.experience_path.clone());
        let patches = PatchEngine::new(config.patch_config(), experience);
        let log = InteractionLog::open(config.log.path.clone(), config.log.retention_hours)?;
        let skills = SkillCatalog::load(&config.chat.skills_dir);
        Ok(Self {
            sync: AsyncMutex::new(synchronizer),
            classifier,
            queue: Mutex::new(ApprovalQueue::new()),
            executor: CommandExecutor::new(),
            patches: AsyncMutex::new(patches),
            pending_kind: Mutex::new(None),
            port,
            log,
            skills,
            config,
        })
    }

    /// Build a synchronizer from configuration against a live browser
    /// session. Convenience for the CLI path.
    pub fn synchronizer_parts(
        config: &EngineConfig,
        surface: S,
    ) -> ResponseSynchronizer<S> {
        let store = LocatorStore::load(config.repair.locator_path.clone());
        let doctor = ModelDoctor::new(
            ModelDoctorConfig {
                endpoint: config.repair.endpoint.clone(),
                model: config.repair.model.clone(),
            },
            KeyRing::new(config.repair.api_keys.clone()),
        );
        ResponseSynchronizer::new(surface, store, Arc::new(doctor), config.sync_config())
    }

    /// Prime a fresh session: persona, directive protocol and the skill
    /// catalog, sent as a system message (settle only, no parsing).
    pub async fn prime(&self) -> Result<(), EngineError> {
        let mut priming = String::from(
            "You are Golem, a hands-on operations assistant. When an action is needed, \
             emit a fenced ```json block containing an array of directives, each with an \
             \"action\" field (exec_shell, install, read_file, write_file, request_tool, \
             multi_agent, schedule, or a skill name) and its parameters. Plain prose \
             otherwise.",
        );
        if !self.skills.is_empty() {
            priming.push_str("\n\nAvailable skills:\n");
            priming.push_str(&self.skills.summary());
        }
        let mut sync = self.sync.lock().await;
        sync.send(&priming, true).await?;
        info!("session primed");
        Ok(())
    }

    /// Main loop: inbound events plus the autonomy timer. Errors in one
    /// turn are reported to the originating channel and never stop the
    /// loop.
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<ChatEvent>) {
        let period = Duration::from_secs(self.config.autonomy.period_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick would fire a proposal at startup.
        ticker.tick().await;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    self.dispatch(event).await;
                }
                _ = ticker.tick(), if self.config.autonomy.enabled => {
                    if let Err(err) = self.autonomy_tick().await {
                        error!(%err, "autonomy round failed");
                    }
                }
            }
        }
        info!("event stream closed, orchestrator stopping");
    }

    pub async fn dispatch(&self, event: ChatEvent) {
        let (channel, result) = match event {
            ChatEvent::Message { text, channel, .. } => {
                (channel.clone(), self.handle_message(&channel, &text).await)
            }
            ChatEvent::Button { token, channel } => {
                (channel.clone(), self.handle_button(&channel, &token).await)
            }
        };
        if let Err(err) = result {
            error!(%channel, %err, "turn failed");
            self.say(&channel, format!("Something went wrong: {err}"))
                .await;
        }
    }

    async fn handle_message(&self, channel: &ChannelId, text: &str) -> Result<(), EngineError> {
        self.log.append(&channel.to_string(), Direction::Inbound, text)?;

        let reply = {
            let mut sync = self.sync.lock().await;
            sync.send(text, false).await?
        };
        self.log
            .append(&channel.to_string(), Direction::Outbound, &reply.text)?;

        let mut shown = truncate_for_chat(&reply.text, self.config.chat.reply_limit);
        if reply.truncated {
            shown.push_str("\n(reply cut off by the remote interface)");
        }
        self.say(channel, shown).await;

        let extraction = extract_intents(&reply.text);
        if let Some(problem) = &extraction.parse_error {
            warn!(%problem, "directive block present but unparseable");
            self.say(
                channel,
                "The action plan in that reply did not parse; reply understood as plain text."
                    .to_string(),
            )
            .await;
        }
        if extraction.intents.is_empty() {
            return Ok(());
        }
        self.run_steps(channel, extraction.intents, 0, false).await
    }

    async fn handle_button(&self, channel: &ChannelId, token: &str) -> Result<(), EngineError> {
        match token.split_once(':') {
            Some(("APPROVE", id)) => {
                let task = {
                    let mut queue = self.queue.lock();
                    queue.approve(&TaskId(id.to_string()))?
                };
                self.say(channel, "Approved, resuming.".to_string()).await;
                self.run_steps(&task.origin, task.steps, task.next_index, true)
                    .await
            }
            Some(("DENY", id)) => {
                let task = {
                    let mut queue = self.queue.lock();
                    queue.deny(&TaskId(id.to_string()))?
                };
                let step = task
                    .blocking_step()
                    .map(|s| s.describe())
                    .unwrap_or_else(|| "the pending step".to_string());
                self.say(&task.origin, format!("Denied: {step} was discarded."))
                    .await;
                Ok(())
            }
            Some(("INSTALL", tool)) => {
                let cmd = self.config.policy.install_command.replace("{tool}", tool);
                let output = self.run_shell(&cmd).await?;
                self.say(channel, format!("Installed `{tool}`:\n{output}"))
                    .await;
                Ok(())
            }
            None if token == "PATCH_DEPLOY" => self.deploy_pending(channel).await,
            None if token == "PATCH_DROP" => self.drop_pending(channel).await,
            _ => {
                warn!(%token, "unknown button token");
                self.say(channel, format!("Unknown action token `{token}`."))
                    .await;
                Ok(())
            }
        }
    }

    /// Walk the step list from `start`. Auto steps execute immediately;
    /// the first step needing confirmation parks the remainder and prompts;
    /// a Blocked step refuses and terminates the whole sequence.
    /// `first_approved` marks a resume, where the blocking step already
    /// has its confirmation.
    async fn run_steps(
        &self,
        channel: &ChannelId,
        steps: Vec<ActionIntent>,
        start: usize,
        first_approved: bool,
    ) -> Result<(), EngineError> {
        let mut approved = first_approved;
        for index in start..steps.len() {
            let step = &steps[index];
            let assessment = self.classifier.assess(step);
            match assessment.tier {
                RiskTier::Blocked => {
                    warn!(step = %step.describe(), reason = %assessment.reason, "step blocked");
                    self.say(
                        channel,
                        format!(
                            "Refusing to {}: {}. The remaining steps were dropped.",
                            step.describe(),
                            assessment.reason
                        ),
                    )
                    .await;
                    return Ok(());
                }
                RiskTier::Auto => {}
                RiskTier::Ask | RiskTier::Strict if approved => {}
                tier @ (RiskTier::Ask | RiskTier::Strict) => {
                    let id = {
                        let mut queue = self.queue.lock();
                        queue.enqueue(steps.clone(), index, channel.clone())
                    };
                    let warning = if tier == RiskTier::Strict {
                        "CAUTION: this is a high-risk action. "
                    } else {
                        ""
                    };
                    self.port
                        .deliver(
                            channel,
                            Outbound::Buttons {
                                text: format!(
                                    "{warning}Confirmation needed to {} ({}).",
                                    step.describe(),
                                    assessment.reason
                                ),
                                buttons: vec![
                                    ButtonSpec {
                                        label: "Approve".to_string(),
                                        token: format!("APPROVE:{id}"),
                                    },
                                    ButtonSpec {
                                        label: "Deny".to_string(),
                                        token: format!("DENY:{id}"),
                                    },
                                ],
                            },
                        )
                        .await;
                    return Ok(());
                }
            }
            // Approval covers exactly the blocking step.
            approved = false;

            match self.execute_intent(channel, step, &assessment).await {
                Ok(Some(output)) => {
                    let shown = truncate_for_chat(&output, self.config.chat.reply_limit);
                    self.say(channel, shown).await;
                }
                Ok(None) => {}
                Err(err) => {
                    self.say(
                        channel,
                        format!("Step `{}` failed: {err}", step.describe()),
                    )
                    .await;
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    async fn execute_intent(
        &self,
        channel: &ChannelId,
        intent: &ActionIntent,
        assessment: &RiskAssessment,
    ) -> Result<Option<String>, EngineError> {
        match intent {
            ActionIntent::ExecShell { cmd, .. } => Ok(Some(self.run_shell(cmd).await?)),
            ActionIntent::Install { tool, .. } => {
                let cmd = self.config.policy.install_command.replace("{tool}", tool);
                Ok(Some(self.run_shell(&cmd).await?))
            }
            ActionIntent::ReadFile { path } => {
                let resolved = resolved_or(assessment, path);
                Ok(Some(std::fs::read_to_string(resolved)?))
            }
            ActionIntent::WriteFile { path, content } => {
                let resolved = resolved_or(assessment, path);
                if let Some(parent) = resolved.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&resolved, content)?;
                Ok(Some(format!("Wrote {} bytes to {}", content.len(), resolved.display())))
            }
            ActionIntent::RequestTool { tool, reason } => {
                let admin = ChannelId(self.config.autonomy.admin_channel.clone());
                self.port
                    .deliver(
                        &admin,
                        Outbound::Buttons {
                            text: format!(
                                "The assistant requests tool `{tool}`{}",
                                reason
                                    .as_deref()
                                    .map(|r| format!(": {r}"))
                                    .unwrap_or_default()
                            ),
                            buttons: vec![ButtonSpec {
                                label: format!("Install {tool}"),
                                token: format!("INSTALL:{tool}"),
                            }],
                        },
                    )
                    .await;
                Ok(Some(format!("Tool request for `{tool}` forwarded.")))
            }
            ActionIntent::MultiAgent { preset, task } => {
                let prompt = format!(
                    "Coordinate as the `{preset}` agent team and carry out this task, \
                     reporting the combined result: {task}"
                );
                let reply = {
                    let mut sync = self.sync.lock().await;
                    sync.send(&prompt, false).await?
                };
                Ok(Some(reply.text))
            }
            ActionIntent::Schedule { task, time } => {
                match chrono::DateTime::parse_from_rfc3339(time) {
                    Ok(at) => {
                        let mut patches = self.patches.lock().await;
                        patches
                            .experience_mut()
                            .set_next_wakeup(at.with_timezone(&chrono::Utc))?;
                        Ok(Some(format!("Scheduled `{task}` for {time}.")))
                    }
                    Err(err) => Ok(Some(format!(
                        "Could not schedule `{task}`: `{time}` is not a valid timestamp ({err})."
                    ))),
                }
            }
            ActionIntent::Skill { name, args } => {
                let Some(prompt) = self.skills.prompt(name) else {
                    return Ok(Some(format!("No skill named `{name}` is installed.")));
                };
                let full = format!("{prompt}\n\nArguments: {args}");
                let reply = {
                    let mut sync = self.sync.lock().await;
                    sync.send(&full, false).await?
                };
                Ok(Some(reply.text))
            }
            ActionIntent::Unrecognized { kind, .. } => {
                warn!(%channel, %kind, "approved unrecognized intent cannot execute");
                Ok(Some(format!("Action `{kind}` is not supported.")))
            }
        }
    }

    async fn run_shell(&self, cmd: &str) -> Result<String, EngineError> {
        let opts = RunOptions::default()
            .with_cwd(self.classifier.sandbox_root().to_path_buf())
            .with_timeout(Duration::from_secs(self.config.command.timeout_secs));
        match self.executor.run(cmd, opts).await {
            Ok(stdout) => Ok(if stdout.trim().is_empty() {
                "(no output)".to_string()
            } else {
                stdout
            }),
            Err(CommandError::Failed { code, stdout, stderr }) => {
                let code = code.map_or_else(|| "unknown".to_string(), |c| c.to_string());
                Ok(format!(
                    "Command exited with status {code}.\nstdout:\n{stdout}\nstderr:\n{stderr}"
                ))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// One self-improvement round: ask for a proposal, stage and verify
    /// it, then hand the decision to the admin channel.
    pub async fn autonomy_tick(&self) -> Result<(), EngineError> {
        let avoid = {
            let patches = self.patches.lock().await;
            patches.experience().avoid_list().to_vec()
        };
        let prompt = proposal_prompt(&avoid);

        let reply = {
            let mut sync = self.sync.lock().await;
            sync.send(&prompt, false).await?
        };
        let Some(proposal) = parse_proposal(&reply.text) else {
            info!("no usable proposal this round");
            return Ok(());
        };

        let admin = ChannelId(self.config.autonomy.admin_channel.clone());
        let mut patches = self.patches.lock().await;
        let staged = match patches.create_candidate(&proposal.target, &proposal.fragments) {
            Ok(path) => path,
            Err(err) => {
                warn!(%err, "proposal did not apply");
                self.say(&admin, format!("A self-patch proposal failed to apply: {err}"))
                    .await;
                return Ok(());
            }
        };
        if let Err(err) = patches.verify().await {
            warn!(%err, "proposal failed verification");
            patches.drop_candidate(&proposal.kind)?;
            self.say(
                &admin,
                format!("A self-patch proposal failed verification and was dropped: {err}"),
            )
            .await;
            return Ok(());
        }
        *self.pending_kind.lock() = Some(proposal.kind.clone());

        self.port
            .deliver(
                &admin,
                Outbound::Attachment {
                    caption: format!(
                        "Staged self-patch ({}) for {}",
                        proposal.kind,
                        proposal.target.display()
                    ),
                    path: staged,
                },
            )
            .await;
        self.port
            .deliver(
                &admin,
                Outbound::Buttons {
                    text: "Deploy this patch? A supervised restart follows deployment."
                        .to_string(),
                    buttons: vec![
                        ButtonSpec {
                            label: "Deploy".to_string(),
                            token: "PATCH_DEPLOY".to_string(),
                        },
                        ButtonSpec {
                            label: "Drop".to_string(),
                            token: "PATCH_DROP".to_string(),
                        },
                    ],
                },
            )
            .await;
        Ok(())
    }

    async fn deploy_pending(&self, channel: &ChannelId) -> Result<(), EngineError> {
        let kind = self
            .pending_kind
            .lock()
            .take()
            .unwrap_or_else(|| "unspecified".to_string());
        let mut patches = self.patches.lock().await;
        let restart = patches.deploy(&kind).await?;
        self.say(
            channel,
            format!(
                "Patch deployed to {} (backup: {}). Requesting supervised restart.",
                restart.deployed.display(),
                restart.backup.display()
            ),
        )
        .await;
        Ok(())
    }

    async fn drop_pending(&self, channel: &ChannelId) -> Result<(), EngineError> {
        let kind = self
            .pending_kind
            .lock()
            .take()
            .unwrap_or_else(|| "unspecified".to_string());
        let mut patches = self.patches.lock().await;
        patches.drop_candidate(&kind)?;
        self.say(channel, "Patch dropped.".to_string()).await;
        Ok(())
    }

    async fn say(&self, channel: &ChannelId, text: String) {
        self.port.deliver(channel, Outbound::Text(text)).await;
    }
}

fn resolved_or(assessment: &RiskAssessment, raw: &str) -> PathBuf {
    assessment
        .resolved_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(raw))
}

/// Bound a reply for the chat channel; the full text lives in the log.
fn truncate_for_chat(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let cut: String = text.chars().take(limit).collect();
    format!("{cut}\n... (truncated; full text kept in the interaction log)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use browser_session::BrowserError;
    use locator_heal::{HealError, LocatorDoctor, LocatorRole};
    use response_sync::SyncConfig;
    use std::sync::Mutex as StdMutex;

    /// Page fake: every selector matches, polls replay a script and then
    /// stick on the last state so the stability detector can fire.
    struct FakeSurface {
        polls: StdMutex<Vec<Option<String>>>,
        sticky: StdMutex<Option<String>>,
    }

    impl FakeSurface {
        fn replying(reply: &str) -> Self {
            let mut polls = vec![Some("earlier reply".to_string())];
            polls.extend((0..50).map(|_| Some(reply.to_string())));
            Self {
                polls: StdMutex::new(polls),
                sticky: StdMutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ChatSurface for FakeSurface {
        async fn exists(&self, _selector: &str) -> Result<bool, BrowserError> {
            Ok(true)
        }
        async fn insert_text(&self, _selector: &str, _text: &str) -> Result<bool, BrowserError> {
            Ok(true)
        }
        async fn press_enter(&self, _input_selector: &str) -> Result<(), BrowserError> {
            Ok(())
        }
        async fn last_block_text(&self, _selector: &str) -> Result<Option<String>, BrowserError> {
            let mut polls = self.polls.lock().unwrap();
            if polls.is_empty() {
                return Ok(self.sticky.lock().unwrap().clone());
            }
            let next = polls.remove(0);
            *self.sticky.lock().unwrap() = next.clone();
            Ok(next)
        }
        async fn markup(&self) -> Result<String, BrowserError> {
            Ok(String::new())
        }
    }

    struct NeverDoctor;

    #[async_trait]
    impl LocatorDoctor for NeverDoctor {
        async fn diagnose(
            &self,
            _markup: &str,
            _role: LocatorRole,
        ) -> Result<Option<String>, HealError> {
            Ok(None)
        }
    }

    struct RecordingPort {
        sent: StdMutex<Vec<(ChannelId, Outbound)>>,
    }

    impl RecordingPort {
        fn new() -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
            }
        }
        fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(_, o)| match o {
                    Outbound::Text(t) => Some(t.clone()),
                    _ => None,
                })
                .collect()
        }
        fn button_tokens(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .flat_map(|(_, o)| match o {
                    Outbound::Buttons { buttons, .. } => {
                        buttons.iter().map(|b| b.token.clone()).collect()
                    }
                    _ => Vec::new(),
                })
                .collect()
        }
        fn prompts(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|(_, o)| match o {
                    Outbound::Buttons { text, .. } => Some(text.clone()),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl ChatPort for RecordingPort {
        async fn deliver(&self, channel: &ChannelId, outbound: Outbound) {
            self.sent.lock().unwrap().push((channel.clone(), outbound));
        }
    }

    fn test_config(dir: &std::path::Path) -> EngineConfig {
        let mut config = EngineConfig::default();
        config.policy.sandbox_root = dir.join("workspace");
        config.log.path = dir.join("log.jsonl");
        config.patch.staging_dir = dir.join("staging");
        config.patch.experience_path = dir.join("experience.json");
        config.chat.skills_dir = dir.join("skills");
        config.repair.locator_path = dir.join("locators.json");
        std::fs::create_dir_all(&config.policy.sandbox_root).unwrap();
        config
    }

    fn orchestrator_for(
        reply: &str,
        dir: &std::path::Path,
    ) -> (Arc<Orchestrator<FakeSurface>>, Arc<RecordingPort>) {
        let config = test_config(dir);
        let store = LocatorStore::load(config.repair.locator_path.clone());
        let sync = ResponseSynchronizer::new(
            FakeSurface::replying(reply),
            store,
            Arc::new(NeverDoctor),
            SyncConfig {
                poll_interval: Duration::from_millis(1),
                stability_threshold: 3,
                ceiling: Duration::from_millis(500),
                heal_attempts: 1,
                system_settle: Duration::from_millis(1),
            },
        );
        let port = Arc::new(RecordingPort::new());
        let orchestrator =
            Arc::new(Orchestrator::new(config, sync, port.clone() as Arc<dyn ChatPort>).unwrap());
        (orchestrator, port)
    }

    fn channel() -> ChannelId {
        ChannelId("ops".to_string())
    }

    #[tokio::test]
    async fn allow_listed_command_executes_without_a_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let reply = "Sure.\n```json\n[{\"action\": \"exec_shell\", \"cmd\": \"echo hello\"}]\n```";
        let (orchestrator, port) = orchestrator_for(reply, dir.path());

        orchestrator
            .handle_message(&channel(), "say hello")
            .await
            .unwrap();

        assert!(port.button_tokens().is_empty());
        assert!(port.texts().iter().any(|t| t.contains("hello")));
    }

    #[tokio::test]
    async fn risky_command_waits_for_approval_and_deny_discards() {
        let dir = tempfile::tempdir().unwrap();
        let reply =
            "```json\n[{\"action\": \"exec_shell\", \"cmd\": \"touch marker.txt\"}]\n```";
        let (orchestrator, port) = orchestrator_for(reply, dir.path());

        orchestrator
            .handle_message(&channel(), "make a marker file")
            .await
            .unwrap();

        let tokens = port.button_tokens();
        let approve = tokens.iter().find(|t| t.starts_with("APPROVE:")).unwrap();
        assert!(tokens.iter().any(|t| t.starts_with("DENY:")));
        // Nothing executed yet.
        assert!(!dir.path().join("workspace/marker.txt").exists());

        let deny = approve.replace("APPROVE:", "DENY:");
        orchestrator.handle_button(&channel(), &deny).await.unwrap();
        assert!(!dir.path().join("workspace/marker.txt").exists());
        assert!(port.texts().iter().any(|t| t.contains("Denied")));
    }

    #[tokio::test]
    async fn approval_resumes_and_executes_the_blocking_step() {
        let dir = tempfile::tempdir().unwrap();
        let reply =
            "```json\n[{\"action\": \"exec_shell\", \"cmd\": \"touch marker.txt\"}]\n```";
        let (orchestrator, port) = orchestrator_for(reply, dir.path());

        orchestrator
            .handle_message(&channel(), "make a marker file")
            .await
            .unwrap();
        let tokens = port.button_tokens();
        let approve = tokens.iter().find(|t| t.starts_with("APPROVE:")).unwrap();

        orchestrator
            .handle_button(&channel(), approve)
            .await
            .unwrap();
        assert!(dir.path().join("workspace/marker.txt").exists());

        // The id was consumed; reusing it is stale.
        let err = orchestrator
            .handle_button(&channel(), approve)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Gate(action_gate::GateError::StaleTask(_))
        ));
    }

    #[tokio::test]
    async fn deny_pattern_refuses_and_drops_the_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let reply = "```json\n[{\"action\": \"exec_shell\", \"cmd\": \"rm -rf /\"}, {\"action\": \"exec_shell\", \"cmd\": \"echo after\"}]\n```";
        let (orchestrator, port) = orchestrator_for(reply, dir.path());

        orchestrator
            .handle_message(&channel(), "clean up")
            .await
            .unwrap();

        assert!(port.button_tokens().is_empty());
        assert!(port.texts().iter().any(|t| t.contains("Refusing")));
        // The step after the blocked one never ran.
        assert!(!port.texts().iter().any(|t| t.contains("after")));
    }

    #[tokio::test]
    async fn scoped_recursive_delete_prompts_and_deny_discards() {
        let dir = tempfile::tempdir().unwrap();
        let reply =
            "```json\n[{\"action\": \"exec_shell\", \"cmd\": \"rm -rf important/\"}]\n```";
        let (orchestrator, port) = orchestrator_for(reply, dir.path());

        orchestrator
            .handle_message(&channel(), "remove that directory")
            .await
            .unwrap();

        // Confirmable with the strongest warning, not refused outright.
        assert!(!port.texts().iter().any(|t| t.contains("Refusing")));
        assert!(port.prompts().iter().any(|t| t.contains("CAUTION")));
        let tokens = port.button_tokens();
        let approve = tokens.iter().find(|t| t.starts_with("APPROVE:")).unwrap();
        assert!(tokens.iter().any(|t| t.starts_with("DENY:")));

        let deny = approve.replace("APPROVE:", "DENY:");
        orchestrator.handle_button(&channel(), &deny).await.unwrap();
        assert!(port.texts().iter().any(|t| t.contains("Denied")));
    }

    #[tokio::test]
    async fn unparseable_directive_block_degrades_to_plain_text_with_a_note() {
        let dir = tempfile::tempdir().unwrap();
        let reply = "Here you go.\n```json\n[{\"action\": \"exec_shell\", \"cmd\": }]\n```";
        let (orchestrator, port) = orchestrator_for(reply, dir.path());

        orchestrator
            .handle_message(&channel(), "do the thing")
            .await
            .unwrap();

        assert!(port.button_tokens().is_empty());
        assert!(port
            .texts()
            .iter()
            .any(|t| t.contains("understood as plain text")));
    }

    #[test]
    fn truncation_keeps_the_reader_informed() {
        let long = "x".repeat(50);
        let shown = truncate_for_chat(&long, 10);
        assert!(shown.starts_with("xxxxxxxxxx\n"));
        assert!(shown.contains("truncated"));
        assert_eq!(truncate_for_chat("short", 10), "short");
    }
}
