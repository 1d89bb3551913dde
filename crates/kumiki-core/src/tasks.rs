//! Deferred work.
//!
//! Some follow-up work (registering connections for proximity lookups, showing
//! a pinned comment's bubble) waits until a load has finished. It is queued
//! here and run by [`Workspace::run_deferred_tasks`]. A task is bound to the
//! exact block instance that queued it: if that block was disposed in the
//! meantime, even if a new block reused its id, the task is skipped.

use std::collections::VecDeque;

use kumiki_types::BlockId;

use crate::icon::COMMENT;
use crate::workspace::Workspace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskAction {
    EnableConnectionTracking,
    ShowCommentBubble,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeferredTask {
    pub block: BlockId,
    pub serial: u64,
    pub action: TaskAction,
}

/// FIFO of deferred tasks.
#[derive(Clone, Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<DeferredTask>,
}

impl TaskQueue {
    pub fn push(&mut self, task: DeferredTask) {
        self.tasks.push_back(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn drain(&mut self) -> Vec<DeferredTask> {
        self.tasks.drain(..).collect()
    }
}

impl Workspace {
    /// Queue `action` for the current instance of `block`.
    pub(crate) fn defer(&mut self, block: &BlockId, action: TaskAction) {
        let Some(serial) = self.block(block).map(|b| b.serial()) else {
            return;
        };
        self.tasks.push(DeferredTask {
            block: block.clone(),
            serial,
            action,
        });
    }

    /// Run every queued task. Returns how many ran (skipped tasks excluded).
    pub fn run_deferred_tasks(&mut self) -> usize {
        let mut ran = 0;
        for task in self.tasks.drain() {
            let Some(block) = self.blocks.get_mut(&task.block).filter(|b| b.serial() == task.serial) else {
                tracing::debug!(block = %task.block, action = ?task.action, "skipping task for disposed block");
                continue;
            };
            match task.action {
                TaskAction::EnableConnectionTracking => {
                    block.render_state_mut().connection_tracking = true;
                }
                TaskAction::ShowCommentBubble => {
                    if let Some(icon) = block.icon_mut(COMMENT) {
                        icon.set_bubble_visible(true);
                    }
                }
            }
            ran += 1;
        }
        ran
    }
}
