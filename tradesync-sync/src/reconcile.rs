//! Reconciler: decides what to push for one mapped entity.
//!
//! Pure functions, no I/O. The ERP (local) side is authoritative and the
//! marketplace is a replica: whenever the two sides differ, the local values
//! are pushed, including when both sides changed since the last sync. The
//! stored baseline fingerprint only classifies *why* the sides differ so that
//! overwritten remote edits are visible in logs and reports.

use serde::Serialize;

use tradesync_core::{Fingerprint, Snapshot, SyncField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationKind {
    /// No remote listing exists; create it from the local snapshot.
    Create,
    /// At least one syncable field differs; push the local values.
    Update,
    NoOp,
}

/// Which side moved since the last successful sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resolution {
    /// Both sides already agree.
    InSync,
    /// Never synced before, so there is nothing to compare against.
    NoBaseline,
    /// Only the local side changed.
    LocalChange,
    /// Only the remote side changed (or its listing disappeared); the remote
    /// edit is overwritten.
    RemoteDrift,
    /// Both sides changed; local wins and the remote edit is overwritten.
    Conflict,
}

impl Resolution {
    /// Whether applying the operation discards a change made on the marketplace.
    pub fn overwrites_remote_edit(self) -> bool {
        matches!(self, Resolution::RemoteDrift | Resolution::Conflict)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub kind: OperationKind,
    /// Fields that differ, in [`SyncField::all`] order. All fields for `Create`.
    pub fields_changed: Vec<SyncField>,
    pub resolution: Resolution,
    /// Values to push: always the local snapshot.
    pub payload: Snapshot,
}

impl Operation {
    pub fn is_noop(&self) -> bool {
        self.kind == OperationKind::NoOp
    }
}

/// Compute the operation that brings `remote` in line with `local`.
///
/// `baseline` is the fingerprint both sides shared after the last successful
/// sync, if any.
pub fn diff(local: &Snapshot, remote: Option<&Snapshot>, baseline: Option<&Fingerprint>) -> Operation {
    let (kind, fields_changed) = match remote {
        None => (OperationKind::Create, SyncField::all().to_vec()),
        Some(remote) => {
            let changed = local.differing_fields(remote);
            if changed.is_empty() {
                (OperationKind::NoOp, changed)
            } else {
                (OperationKind::Update, changed)
            }
        }
    };

    let resolution = if kind == OperationKind::NoOp {
        Resolution::InSync
    } else {
        classify(local, remote, baseline)
    };

    Operation {
        kind,
        fields_changed,
        resolution,
        payload: local.clone(),
    }
}

/// [`diff`] over a batch, preserving input order.
pub fn diff_all<'a, I>(inputs: I) -> Vec<Operation>
where
    I: IntoIterator<Item = (&'a Snapshot, Option<&'a Snapshot>, Option<&'a Fingerprint>)>,
{
    inputs
        .into_iter()
        .map(|(local, remote, baseline)| diff(local, remote, baseline))
        .collect()
}

fn classify(local: &Snapshot, remote: Option<&Snapshot>, baseline: Option<&Fingerprint>) -> Resolution {
    let Some(baseline) = baseline else {
        return Resolution::NoBaseline;
    };
    let local_moved = &local.fingerprint() != baseline;
    let remote_moved = remote.map_or(true, |r| &r.fingerprint() != baseline);
    match (local_moved, remote_moved) {
        (true, true) => Resolution::Conflict,
        (false, true) => Resolution::RemoteDrift,
        // (false, false) cannot differ without a digest collision; treat it as
        // a local change so the push still happens.
        _ => Resolution::LocalChange,
    }
}
