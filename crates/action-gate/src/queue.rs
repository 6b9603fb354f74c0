//! Pending tasks awaiting a human decision.

use std::collections::HashMap;

use golem_core_types::{ActionIntent, ChannelId, TaskId};
use tracing::info;

use crate::errors::GateError;

/// A multi-step sequence halted at a step that needs confirmation.
///
/// `next_index` points at the blocking step; steps before it already ran
/// and are never re-executed on resume. Tasks do not survive a process
/// restart: ids are single-use and expiry is implicit.
#[derive(Clone, Debug)]
pub struct PendingTask {
    pub id: TaskId,
    pub steps: Vec<ActionIntent>,
    pub next_index: usize,
    pub origin: ChannelId,
}

impl PendingTask {
    /// The step the approval decision is about.
    pub fn blocking_step(&self) -> Option<&ActionIntent> {
        self.steps.get(self.next_index)
    }

    /// Steps still to run once approved, starting with the blocking one.
    pub fn remaining(&self) -> &[ActionIntent] {
        &self.steps[self.next_index.min(self.steps.len())..]
    }
}

/// Named, ordered holding area for tasks pending review.
#[derive(Debug, Default)]
pub struct ApprovalQueue {
    tasks: HashMap<TaskId, PendingTask>,
}

impl ApprovalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a sequence at `next_index` and hand back the fresh task id.
    pub fn enqueue(
        &mut self,
        steps: Vec<ActionIntent>,
        next_index: usize,
        origin: ChannelId,
    ) -> TaskId {
        let id = TaskId::new();
        info!(task = %id, next_index, total = steps.len(), "task queued for approval");
        self.tasks.insert(
            id.clone(),
            PendingTask {
                id: id.clone(),
                steps,
                next_index,
                origin,
            },
        );
        id
    }

    /// Consume an approval: the task leaves the queue and execution resumes
    /// from its stored index. A second call with the same id is stale.
    pub fn approve(&mut self, id: &TaskId) -> Result<PendingTask, GateError> {
        self.tasks
            .remove(id)
            .ok_or_else(|| GateError::StaleTask(id.clone()))
    }

    /// Consume a denial: the task is discarded.
    pub fn deny(&mut self, id: &TaskId) -> Result<PendingTask, GateError> {
        self.tasks
            .remove(id)
            .ok_or_else(|| GateError::StaleTask(id.clone()))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps() -> Vec<ActionIntent> {
        vec![
            ActionIntent::ExecShell {
                cmd: "ls".into(),
                reason: None,
            },
            ActionIntent::ExecShell {
                cmd: "rm -rf important/".into(),
                reason: None,
            },
            ActionIntent::ExecShell {
                cmd: "echo done".into(),
                reason: None,
            },
        ]
    }

    #[test]
    fn approval_resumes_at_stored_index() {
        let mut queue = ApprovalQueue::new();
        let id = queue.enqueue(steps(), 1, ChannelId("chat-1".into()));

        let task = queue.approve(&id).expect("first approval succeeds");
        assert_eq!(task.next_index, 1);
        // The completed step is not part of the remainder.
        assert_eq!(task.remaining().len(), 2);
        assert!(matches!(
            task.blocking_step(),
            Some(ActionIntent::ExecShell { cmd, .. }) if cmd == "rm -rf important/"
        ));
    }

    #[test]
    fn second_approval_is_stale() {
        let mut queue = ApprovalQueue::new();
        let id = queue.enqueue(steps(), 0, ChannelId("chat-1".into()));

        queue.approve(&id).expect("first approval succeeds");
        assert!(matches!(
            queue.approve(&id),
            Err(GateError::StaleTask(stale)) if stale == id
        ));
    }

    #[test]
    fn denial_discards_the_task() {
        let mut queue = ApprovalQueue::new();
        let id = queue.enqueue(steps(), 2, ChannelId("chat-1".into()));

        queue.deny(&id).expect("denial succeeds");
        assert!(queue.is_empty());
        assert!(queue.approve(&id).is_err());
    }

    #[test]
    fn unknown_id_is_stale() {
        let mut queue = ApprovalQueue::new();
        let bogus = TaskId::new();
        assert!(queue.approve(&bogus).is_err());
    }
}
