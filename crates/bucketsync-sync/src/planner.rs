//! Diff planning
//!
//! [`plan`] turns two [`SideMapping`]s into a [`SyncPlan`]. Planning is a
//! pure function: the same snapshots and options always produce the same
//! operations in the same order, and applying a plan and planning again
//! yields only skips.
//!
//! ## Rules
//!
//! One-way directions treat one side as the source:
//!
//! | present on        | result                                            |
//! |-------------------|---------------------------------------------------|
//! | source only       | transfer to destination                           |
//! | destination only  | delete on destination if `delete_orphans`, else skip |
//! | both, unchanged   | skip                                              |
//! | both, changed     | transfer to destination                           |
//!
//! Bidirectional copies entries missing on either side, and for entries
//! present on both that differ, the side with the newer timestamp wins.
//! Equal timestamps cannot be resolved, so the path is skipped and reported
//! as a conflict.

use std::cmp::Ordering;

use bucketsync_core::domain::{
    FileEntry, PlanOptions, RelativePath, SideMapping, SyncDirection, SyncOperation,
};
use tracing::{debug, trace};

use crate::fingerprint::{compare, compare_symmetric};

/// Ordered output of the planner
///
/// Transfers run first, skips second and deletions last; each group is
/// sorted by path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    transfers: Vec<SyncOperation>,
    skips: Vec<SyncOperation>,
    deletions: Vec<SyncOperation>,
    conflicts: Vec<RelativePath>,
}

impl SyncPlan {
    /// Uploads and downloads
    pub fn transfers(&self) -> &[SyncOperation] {
        &self.transfers
    }

    pub fn skips(&self) -> &[SyncOperation] {
        &self.skips
    }

    /// Local and remote deletions
    pub fn deletions(&self) -> &[SyncOperation] {
        &self.deletions
    }

    /// Bidirectional paths where both sides changed at the same instant
    pub fn conflicts(&self) -> &[RelativePath] {
        &self.conflicts
    }

    /// All operations in execution order
    pub fn operations(&self) -> impl Iterator<Item = &SyncOperation> {
        self.transfers
            .iter()
            .chain(self.skips.iter())
            .chain(self.deletions.iter())
    }

    pub fn len(&self) -> usize {
        self.transfers.len() + self.skips.len() + self.deletions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true when executing the plan would change neither side
    pub fn is_noop(&self) -> bool {
        self.transfers.is_empty() && self.deletions.is_empty()
    }

    fn push(&mut self, operation: SyncOperation) {
        if operation.is_transfer() {
            self.transfers.push(operation);
        } else if operation.is_deletion() {
            self.deletions.push(operation);
        } else {
            self.skips.push(operation);
        }
    }
}

/// Plans the operations that converge `local` and `remote`
pub fn plan(local: &SideMapping, remote: &SideMapping, options: PlanOptions) -> SyncPlan {
    let mut plan = SyncPlan::default();

    // Both mappings iterate in path order; merging keeps the output sorted
    let mut locals = local.iter().peekable();
    let mut remotes = remote.iter().peekable();
    loop {
        let order = match (locals.peek(), remotes.peek()) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(l), Some(r)) => l.path.cmp(&r.path),
        };
        let pair = match order {
            Ordering::Less => (locals.next(), None),
            Ordering::Greater => (None, remotes.next()),
            Ordering::Equal => (locals.next(), remotes.next()),
        };

        match options.direction {
            SyncDirection::LocalToRemote => plan_one_way(
                &mut plan,
                pair.0,
                pair.1,
                SyncOperation::Upload,
                SyncOperation::DeleteRemote,
                options.delete_orphans,
            ),
            SyncDirection::RemoteToLocal => plan_one_way(
                &mut plan,
                pair.1,
                pair.0,
                SyncOperation::Download,
                SyncOperation::DeleteLocal,
                options.delete_orphans,
            ),
            SyncDirection::Bidirectional => plan_bidirectional(&mut plan, pair.0, pair.1),
        }
    }

    debug!(
        direction = %options.direction,
        transfers = plan.transfers.len(),
        skips = plan.skips.len(),
        deletions = plan.deletions.len(),
        conflicts = plan.conflicts.len(),
        "Plan computed"
    );
    plan
}

fn plan_one_way(
    plan: &mut SyncPlan,
    source: Option<&FileEntry>,
    destination: Option<&FileEntry>,
    transfer: fn(RelativePath) -> SyncOperation,
    delete: fn(RelativePath) -> SyncOperation,
    delete_orphans: bool,
) {
    match (source, destination) {
        (Some(src), None) => plan.push(transfer(src.path.clone())),
        (None, Some(dst)) if delete_orphans => plan.push(delete(dst.path.clone())),
        (None, Some(dst)) => plan.push(SyncOperation::Skip(dst.path.clone())),
        (Some(src), Some(dst)) => {
            let comparison = compare(src, dst);
            trace!(path = %src.path, basis = %comparison.basis, unchanged = comparison.unchanged, "Compared");
            if comparison.unchanged {
                plan.push(SyncOperation::Skip(src.path.clone()));
            } else {
                plan.push(transfer(src.path.clone()));
            }
        }
        (None, None) => {}
    }
}

fn plan_bidirectional(plan: &mut SyncPlan, local: Option<&FileEntry>, remote: Option<&FileEntry>) {
    match (local, remote) {
        (Some(l), None) => plan.push(SyncOperation::Upload(l.path.clone())),
        (None, Some(r)) => plan.push(SyncOperation::Download(r.path.clone())),
        (Some(l), Some(r)) => {
            let comparison = compare_symmetric(l, r);
            trace!(path = %l.path, basis = %comparison.basis, unchanged = comparison.unchanged, "Compared");
            if comparison.unchanged {
                plan.push(SyncOperation::Skip(l.path.clone()));
            } else if l.modified > r.modified {
                plan.push(SyncOperation::Upload(l.path.clone()));
            } else if r.modified > l.modified {
                plan.push(SyncOperation::Download(r.path.clone()));
            } else {
                debug!(path = %l.path, "Both sides changed at the same instant; leaving untouched");
                plan.conflicts.push(l.path.clone());
                plan.push(SyncOperation::Skip(l.path.clone()));
            }
        }
        (None, None) => {}
    }
}
