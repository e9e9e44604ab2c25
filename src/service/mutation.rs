//! Optimistic mutations
//!
//! Likes, reposts and bookmarks share one protocol: resolve the target,
//! snapshot it, apply the flipped state locally, call the backend, then
//! either reconcile with the server's answer or restore the snapshot.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;

use crate::api::PostApi;
use crate::data::{EngagementSnapshot, Interaction, PostId, PostPatch};
use crate::error::{AppError, Result};
use crate::service::notify::Notifier;
use crate::service::resolver::ConsistencyResolver;

/// How a mutation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Server agreed with the optimistic state
    Committed(EngagementSnapshot),
    /// Server returned a different state, which replaced the optimistic one
    Reconciled(EngagementSnapshot),
    /// Request failed; the pre-mutation state was restored
    RolledBack(EngagementSnapshot),
}

impl MutationOutcome {
    /// State the post is left in
    pub fn state(&self) -> EngagementSnapshot {
        match self {
            MutationOutcome::Committed(state)
            | MutationOutcome::Reconciled(state)
            | MutationOutcome::RolledBack(state) => *state,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MutationOutcome::Committed(_) => "committed",
            MutationOutcome::Reconciled(_) => "reconciled",
            MutationOutcome::RolledBack(_) => "rolled_back",
        }
    }
}

/// One in-flight mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    pub target_id: PostId,
    pub interaction: Interaction,
    /// State when the mutation began; restored on failure
    pub previous: EngagementSnapshot,
    pub optimistic: EngagementSnapshot,
}

/// FIFO turns per target post
#[derive(Default)]
struct TargetQueue {
    turns: parking_lot::Mutex<HashMap<PostId, Arc<tokio::sync::Mutex<()>>>>,
}

impl TargetQueue {
    async fn acquire(&self, id: &PostId) -> Turn<'_> {
        let lock = self.turns.lock().entry(id.clone()).or_default().clone();
        let guard = lock.lock_owned().await;
        Turn {
            queue: self,
            id: id.clone(),
            guard: Some(guard),
        }
    }

    fn len(&self) -> usize {
        self.turns.lock().len()
    }
}

struct Turn<'a> {
    queue: &'a TargetQueue,
    id: PostId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut turns = self.queue.turns.lock();
        // nobody holds or awaits this target any more
        if turns
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            turns.remove(&self.id);
        }
    }
}

/// Runs optimistic toggles against the store and the backend
pub struct MutationCoordinator {
    api: Arc<dyn PostApi>,
    resolver: Arc<ConsistencyResolver>,
    notifier: Arc<Notifier>,
    serialize_per_target: bool,
    queue: TargetQueue,
}

impl MutationCoordinator {
    pub fn new(
        api: Arc<dyn PostApi>,
        resolver: Arc<ConsistencyResolver>,
        notifier: Arc<Notifier>,
        serialize_per_target: bool,
    ) -> Self {
        Self {
            api,
            resolver,
            notifier,
            serialize_per_target,
            queue: TargetQueue::default(),
        }
    }

    pub async fn like(&self, displayed_id: &PostId) -> Result<MutationOutcome> {
        self.toggle(displayed_id, Interaction::Like).await
    }

    pub async fn repost(&self, displayed_id: &PostId) -> Result<MutationOutcome> {
        self.toggle(displayed_id, Interaction::Repost).await
    }

    pub async fn bookmark(&self, displayed_id: &PostId) -> Result<MutationOutcome> {
        self.toggle(displayed_id, Interaction::Bookmark).await
    }

    /// Flip `interaction` on the post shown as `displayed_id`
    ///
    /// A repost acts on the post it references. Network failures are
    /// rolled back and reported through the notifier, not returned.
    ///
    /// With per-target serialization on, a toggle queued behind another
    /// one on the same post applies its optimistic state only after the
    /// earlier request settles. Each toggle then snapshots the state its
    /// predecessor left, which keeps rollbacks exact.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the post is not in the store.
    pub async fn toggle(
        &self,
        displayed_id: &PostId,
        interaction: Interaction,
    ) -> Result<MutationOutcome> {
        let target = self
            .resolver
            .store()
            .resolve_target(displayed_id)
            .ok_or(AppError::NotFound)?;
        let target_id = target.id.clone();
        let author = target.author.handle.clone();
        drop(target);

        let _turn = if self.serialize_per_target {
            Some(self.queue.acquire(&target_id).await)
        } else {
            None
        };

        let record = self.apply_optimistic(&target_id, interaction)?;
        tracing::debug!(
            post_id = %record.target_id,
            action = interaction.path(),
            active = record.optimistic.active,
            "Applied optimistic toggle"
        );

        let outcome = match self.api.toggle(&author, &target_id, interaction).await {
            Ok(response) => {
                let confirmed = EngagementSnapshot {
                    active: response.active,
                    count: response.count.or(record.optimistic.count),
                };
                if confirmed == record.optimistic {
                    MutationOutcome::Committed(confirmed)
                } else {
                    self.resolver
                        .commit(&target_id, interaction.patch(confirmed));
                    tracing::info!(
                        post_id = %target_id,
                        action = interaction.path(),
                        active = confirmed.active,
                        count = ?confirmed.count,
                        "Reconciled with server state"
                    );
                    MutationOutcome::Reconciled(confirmed)
                }
            }
            Err(error) => {
                self.resolver
                    .commit(&target_id, interaction.patch(record.previous));
                tracing::warn!(
                    %error,
                    post_id = %target_id,
                    action = interaction.path(),
                    "Toggle failed, rolled back"
                );
                self.notifier.error(interaction.failure_message());
                MutationOutcome::RolledBack(record.previous)
            }
        };

        if interaction == Interaction::Bookmark && !outcome.state().active {
            self.resolver.release_parked(&target_id);
        }

        crate::metrics::MUTATIONS_TOTAL
            .with_label_values(&[interaction.path(), outcome.label()])
            .inc();
        Ok(outcome)
    }

    /// Count a freshly created reply on its parent
    ///
    /// One-way; there is nothing to roll back because the reply already
    /// exists on the server. Returns `false` when the parent is not cached.
    pub fn record_reply(&self, parent_id: &PostId) -> bool {
        let patch = self.resolver.commit_with(parent_id, |parent| PostPatch {
            replies: Some(parent.counts.replies.saturating_add(1)),
            ..PostPatch::default()
        });
        crate::metrics::MUTATIONS_TOTAL
            .with_label_values(&["reply", "committed"])
            .inc();
        patch.is_some()
    }

    /// Targets with a queued or running mutation
    pub fn busy_targets(&self) -> usize {
        self.queue.len()
    }

    /// Snapshot and flip in one store write
    fn apply_optimistic(
        &self,
        target_id: &PostId,
        interaction: Interaction,
    ) -> Result<MutationRecord> {
        let mut previous = None;
        self.resolver
            .commit_with(target_id, |current| {
                let snapshot = interaction.snapshot(current);
                previous = Some(snapshot);
                interaction.patch(snapshot.toggled())
            })
            .ok_or(AppError::NotFound)?;
        let previous = previous.ok_or(AppError::NotFound)?;

        Ok(MutationRecord {
            target_id: target_id.clone(),
            interaction,
            previous,
            optimistic: previous.toggled(),
        })
    }
}
