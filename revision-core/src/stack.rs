use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tracing::{info, instrument, warn};

use crate::activity::ActivityObserver;
use crate::errors::{CoreError, CoreResult};
use crate::id::DocId;
use crate::patch::{escape_keys, flatten_to_set_pairs, unescape_keys};
use crate::revision::{RevisionAction, RevisionRecord};
use crate::store::{Filter, SortDirection, Store};

/// The result of applying one revision to its master document during
/// [`RevisionStack::pop`]. Unlike the original implementation, a structural
/// problem with a revision never aborts the stack — it is reported back to
/// the caller and recorded under `meta.apply_warning` instead of being
/// swallowed.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// The revision applied cleanly.
    Applied(RevisionRecord),
    /// The revision applied, but the target document was missing or
    /// otherwise in an unexpected shape.
    AppliedWithWarning(RevisionRecord, String),
    /// The revision could not be applied; it is still marked processed so a
    /// single broken revision does not block the stack indefinitely.
    StructuralError(RevisionRecord, CoreError),
}

/// Per-(collection, master) ordered log of scheduled mutations, backed by a
/// `<collection>_revisions` store, a `<collection>` master store, and the
/// collection-wide `previews` store used only transiently by `preview`.
pub struct RevisionStack {
    masters: Store,
    revisions: Store,
    previews: Store,
    collection: String,
    observer: Option<Arc<dyn ActivityObserver>>,
}

impl RevisionStack {
    pub fn new(pool: PgPool, collection: impl Into<String>) -> Self {
        let collection = collection.into();
        let masters = Store::new(pool.clone(), collection.clone());
        let revisions = Store::new(pool.clone(), format!("{}_revisions", collection));
        let previews = Store::new(pool, "previews");
        Self {
            masters,
            revisions,
            previews,
            collection,
            observer: None,
        }
    }

    /// Attach an [`ActivityObserver`] that gets told about claims, applies,
    /// and lazy migrations as they happen against this stack.
    pub fn with_observer(mut self, observer: Arc<dyn ActivityObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn collection_name(&self) -> &str {
        &self.collection
    }

    #[instrument(skip(self))]
    pub async fn ensure_tables(&self) -> CoreResult<()> {
        self.masters.ensure_table().await?;
        self.revisions.ensure_table().await?;
        self.previews.ensure_table().await?;
        Ok(())
    }

    /// Schedule a mutation against `master_id` to take effect at `toa`
    /// (seconds since epoch). A `null` patch means `delete`; an object patch
    /// without a pre-existing `master_id` means `insert`, minting a fresh id
    /// retained as the returned revision's `master_id`.
    #[instrument(skip(self, patch))]
    pub async fn push(
        &self,
        master_id: Option<DocId>,
        patch: Option<Value>,
        toa: Option<i64>,
        meta: Value,
    ) -> CoreResult<RevisionRecord> {
        let toa = toa.unwrap_or_else(|| Utc::now().timestamp());

        let (action, resolved_master_id, stored_patch) = match (&patch, master_id) {
            (None, Some(id)) => (RevisionAction::Delete, id, None),
            (None, None) => return Err(CoreError::RevisionActionNotValid),
            (Some(Value::Object(_)), Some(id)) => {
                let mut obj = patch.unwrap();
                strip_id_fields(&mut obj);
                (RevisionAction::Update, id, Some(escape_keys(&obj)))
            }
            (Some(Value::Object(_)), None) => {
                let mut obj = patch.unwrap();
                strip_id_fields(&mut obj);
                (RevisionAction::Insert, DocId::new(), Some(escape_keys(&obj)))
            }
            _ => return Err(CoreError::RevisionActionNotValid),
        };

        if action == RevisionAction::Update {
            // Fire-and-forget, matching the original: result is intentionally
            // discarded, and this must run before the new revision below is
            // persisted or it would always see non-empty history.
            let _ = self.ensure_migrated(&resolved_master_id, toa - 1, false).await;
        }

        let record = RevisionRecord {
            id: DocId::new(),
            toa,
            processed: false,
            in_process: Some(false),
            collection: self.collection.clone(),
            master_id: resolved_master_id,
            action,
            patch: stored_patch,
            snapshot: None,
            meta,
        };

        let value = serde_json::to_value(&record)?;
        RevisionRecord::validate_shape(&value)?;
        self.revisions.insert_with_id(&record.id, value).await?;

        Ok(record)
    }

    /// Revisions for `master_id` with `processed = show_history` and
    /// `toa <= toa`, ordered ascending. By default (`show_history = false`,
    /// `toa = now`): unapplied, already-due revisions.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        master_id: &DocId,
        toa: Option<i64>,
        show_history: bool,
    ) -> CoreResult<Vec<RevisionRecord>> {
        let toa = toa.unwrap_or_else(|| Utc::now().timestamp());
        let filter = Filter::new()
            .eq("master_id", master_id.to_hex())
            .eq("processed", show_history)
            .lte("toa", toa);
        let docs = self
            .revisions
            .find(&filter, Some("toa"), SortDirection::Ascending, 0, 0)
            .await?;
        docs.into_iter()
            .map(|d| serde_json::from_value(d).map_err(CoreError::from))
            .collect()
    }

    /// The next pending, due revision for `master_id`, if any.
    #[instrument(skip(self))]
    pub async fn peek(&self, master_id: &DocId) -> CoreResult<Option<RevisionRecord>> {
        Ok(self.list(master_id, None, false).await?.into_iter().next())
    }

    /// Apply the earliest pending, due revision for `master_id`, marking it
    /// processed. Returns `None` if there is nothing to do.
    #[instrument(skip(self))]
    pub async fn pop(&self, master_id: &DocId) -> CoreResult<Option<RevisionRecord>> {
        match self.pop_outcome(master_id).await? {
            None => Ok(None),
            Some(ApplyOutcome::Applied(r)) | Some(ApplyOutcome::AppliedWithWarning(r, _)) => {
                Ok(Some(r))
            }
            Some(ApplyOutcome::StructuralError(_, e)) => Err(e),
        }
    }

    /// Like [`RevisionStack::pop`], but surfaces the full [`ApplyOutcome`]
    /// instead of collapsing it — used by the publisher, which wants to
    /// keep draining past a revision whose *apply* failed and only stop on
    /// the rarer failure to record that fact against the revision itself.
    #[instrument(skip(self))]
    pub async fn pop_outcome(&self, master_id: &DocId) -> CoreResult<Option<ApplyOutcome>> {
        let due = self.list(master_id, None, false).await?;
        let Some(revision) = due.into_iter().next() else {
            return Ok(None);
        };
        Ok(Some(self.apply_and_mark(revision).await))
    }

    async fn apply_and_mark(&self, revision: RevisionRecord) -> ApplyOutcome {
        // A failure here is logged and processing still continues to the
        // processed/snapshot bookkeeping below, so one broken revision never
        // blocks the stack.
        let (warning, snapshot) = match self.apply(&revision).await {
            Ok(snapshot) => (None, snapshot),
            Err(e) => {
                warn!(revision = %revision.id, master = %revision.master_id, error = %e, "apply failed, marking processed anyway");
                (Some(e.to_string()), None)
            }
        };

        let mut attrs = Map::new();
        attrs.insert("processed".to_string(), Value::Bool(true));
        attrs.insert("in_process".to_string(), Value::Bool(false));
        attrs.insert(
            "snapshot".to_string(),
            snapshot.clone().unwrap_or(Value::Null),
        );
        if let Some(reason) = &warning {
            let mut meta = revision.meta.as_object().cloned().unwrap_or_default();
            meta.insert("apply_warning".to_string(), Value::String(reason.clone()));
            attrs.insert("meta".to_string(), Value::Object(meta));
        }

        let outcome = match self.revisions.patch(&revision.id, &attrs).await {
            Ok(outcome) if outcome.modified > 0 => {
                let mut applied = revision;
                applied.processed = true;
                applied.in_process = Some(false);
                applied.snapshot = snapshot;
                match warning {
                    Some(w) => ApplyOutcome::AppliedWithWarning(applied, w),
                    None => ApplyOutcome::Applied(applied),
                }
            }
            Ok(_) => ApplyOutcome::StructuralError(revision.clone(), CoreError::RevisionUpdateFailed(revision.id)),
            Err(e) => ApplyOutcome::StructuralError(revision, e),
        };

        if let Some(obs) = &self.observer {
            obs.on_apply(&self.collection, &outcome);
        }
        outcome
    }

    /// Applies `revision` to the master store and returns the post-apply
    /// snapshot (or a warning string when the target was in an unexpected
    /// state but the apply still proceeded).
    async fn apply(&self, revision: &RevisionRecord) -> CoreResult<Option<Value>> {
        match revision.action {
            RevisionAction::Update => {
                let patch = revision
                    .patch
                    .clone()
                    .ok_or(CoreError::RevisionActionNotValid)?;
                let unescaped = unescape_keys(&patch);
                let mut attrs: Map<String, Value> = unescaped
                    .as_object()
                    .cloned()
                    .ok_or(CoreError::RevisionActionNotValid)?;
                attrs.remove("id");
                attrs.remove("_id");

                let outcome = self.masters.patch(&revision.master_id, &attrs).await?;
                if outcome.modified == 0 {
                    return Err(CoreError::RevisionNotFound(revision.master_id));
                }
                let snapshot = self.masters.find_by_id(&revision.master_id).await?;
                Ok(snapshot)
            }
            RevisionAction::Insert => {
                let patch = revision.patch.clone().unwrap_or(Value::Object(Map::new()));
                let unescaped = unescape_keys(&patch);
                self.masters
                    .insert_with_id(&revision.master_id, unescaped)
                    .await?;
                let snapshot = self.masters.find_by_id(&revision.master_id).await?;
                if snapshot.is_none() {
                    return Err(CoreError::DocumentRevisionInsertFailed(revision.master_id));
                }
                Ok(snapshot)
            }
            RevisionAction::Delete => {
                let outcome = self.masters.delete(&revision.master_id).await?;
                if outcome.n == 0 {
                    return Err(CoreError::DocumentRevisionDeleteFailed(revision.master_id));
                }
                Ok(None)
            }
        }
    }

    /// Claim up to `limit` due, unclaimed revisions across every master in
    /// this collection by flipping `in_process` for all of them in a single
    /// bulk update, so concurrent workers cannot race claiming the same
    /// revision one row at a time. Returns the distinct masters claimed.
    #[instrument(skip(self))]
    pub async fn claim_due(&self, now: i64, limit: u32) -> CoreResult<Vec<DocId>> {
        let filter = Filter::new()
            .eq("processed", false)
            .absent_or_false("in_process")
            .lt("toa", now);
        let due = self
            .revisions
            .find(&filter, Some("toa"), SortDirection::Ascending, 0, limit)
            .await?;

        let mut revision_ids = Vec::with_capacity(due.len());
        let mut master_ids = Vec::new();
        for raw in due {
            let revision: RevisionRecord = match serde_json::from_value(raw) {
                Ok(r) => r,
                Err(_) => continue,
            };
            revision_ids.push(revision.id);
            if !master_ids.contains(&revision.master_id) {
                master_ids.push(revision.master_id);
            }
        }

        if revision_ids.is_empty() {
            return Ok(master_ids);
        }

        let mut attrs = Map::new();
        attrs.insert("in_process".to_string(), Value::Bool(true));
        self.revisions.bulk_set(&revision_ids, &attrs).await?;

        if let Some(obs) = &self.observer {
            obs.on_claimed(&self.collection, revision_ids.len());
        }

        Ok(master_ids)
    }

    /// Build the master document that would result from applying `revision`
    /// and every earlier pending revision for its master, without
    /// persisting anything against the target or revision collections — the
    /// scratch work happens entirely in the shared `previews` store, whose
    /// temporary row is always deleted before returning.
    #[instrument(skip(self))]
    pub async fn preview(&self, revision_id: &DocId) -> CoreResult<RevisionRecord> {
        let Some(raw) = self.revisions.find_by_id(revision_id).await? else {
            return Err(CoreError::RevisionNotFound(*revision_id));
        };
        let mut revision: RevisionRecord = serde_json::from_value(raw)?;

        if revision.snapshot.is_some() {
            return Ok(revision);
        }
        if revision.action == RevisionAction::Delete {
            revision.snapshot = None;
            return Ok(revision);
        }

        let pending = self
            .list(&revision.master_id, Some(revision.toa), false)
            .await?;
        if pending.is_empty() {
            return Err(CoreError::NoRevisionsAvailable(revision.master_id));
        }

        let base = if pending[0].action == RevisionAction::Insert {
            let patch = pending[0]
                .patch
                .clone()
                .unwrap_or(Value::Object(Map::new()));
            unescape_keys(&patch)
        } else {
            self.masters
                .find_by_id(&revision.master_id)
                .await?
                .ok_or(CoreError::RevisionNotFound(revision.master_id))?
        };

        let guard = PreviewGuard::acquire(&self.previews, base).await?;
        let snapshot = guard.compute(&pending).await?;

        revision.snapshot = Some(snapshot);
        Ok(revision)
    }

    /// Lazily migrate a legacy document that has no revision history into
    /// the stack by synthesizing a historical, already-processed `insert`
    /// revision for it. No-ops if any revision already exists for
    /// `master_id`. Called both from the first `update` pushed against a
    /// master with no history and from the read-list path, so a document
    /// that predates this stack gets a history the first time anything
    /// looks at it.
    #[instrument(skip(self))]
    pub async fn ensure_migrated(
        &self,
        master_id: &DocId,
        toa: i64,
        published_by_default: bool,
    ) -> CoreResult<()> {
        if !self.list(master_id, None, true).await?.is_empty()
            || !self.list(master_id, None, false).await?.is_empty()
        {
            return Ok(());
        }
        let Some(mut existing) = self.masters.find_by_id(master_id).await? else {
            return Err(CoreError::RevisionNotFound(*master_id));
        };
        strip_id_fields(&mut existing);

        let mut snapshot = existing.clone();
        if let Some(obj) = snapshot.as_object_mut() {
            obj.insert("id".to_string(), Value::String(master_id.to_hex()));
            obj.insert("published".to_string(), Value::Bool(published_by_default));
        }

        let mut meta = Map::new();
        meta.insert(
            "comment".to_string(),
            Value::String("This document was migrated automatically.".to_string()),
        );

        let record = RevisionRecord {
            id: DocId::new(),
            toa,
            processed: true,
            in_process: Some(false),
            collection: self.collection.clone(),
            master_id: *master_id,
            action: RevisionAction::Insert,
            patch: Some(escape_keys(&existing)),
            snapshot: Some(snapshot),
            meta: Value::Object(meta),
        };
        let value = serde_json::to_value(&record)?;
        RevisionRecord::validate_shape(&value)?;
        self.revisions.insert_with_id(&record.id, value).await?;

        info!(%master_id, "lazily migrated document into the revision log");
        if let Some(obs) = &self.observer {
            obs.on_lazy_migration(&self.collection, master_id);
        }
        Ok(())
    }
}

fn strip_id_fields(value: &mut Value) {
    if let Some(obj) = value.as_object_mut() {
        obj.remove("id");
        obj.remove("_id");
    }
}

/// RAII-ish scoped acquisition of a `previews` row, guaranteeing its
/// deletion on every exit path. `Drop` issues a best-effort delete logged at
/// `warn!` if it races the explicit delete in `compute`.
struct PreviewGuard<'a> {
    store: &'a Store,
    id: Option<DocId>,
}

impl<'a> PreviewGuard<'a> {
    async fn acquire(store: &'a Store, base: Value) -> CoreResult<Self> {
        let id = store.insert(base).await?;
        Ok(Self {
            store,
            id: Some(id),
        })
    }

    async fn compute(mut self, pending: &[RevisionRecord]) -> CoreResult<Value> {
        let id = self.id.expect("acquired");
        for revision in pending {
            if revision.action != RevisionAction::Update {
                continue;
            }
            let patch = revision
                .patch
                .clone()
                .ok_or(CoreError::RevisionActionNotValid)?;
            let unescaped = unescape_keys(&patch);
            let pairs = flatten_to_set_pairs(&unescaped);
            let mut attrs = Map::new();
            for (path, value) in pairs {
                attrs.insert(path, value);
            }
            self.store.patch(&id, &attrs).await?;
        }

        let snapshot = self
            .store
            .find_by_id(&id)
            .await?
            .ok_or(CoreError::RevisionNotFound(id))?;
        self.store.delete(&id).await?;
        self.id = None;
        Ok(snapshot)
    }
}

impl Drop for PreviewGuard<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            let store = self.store.clone();
            tokio::spawn(async move {
                if let Err(e) = store.delete(&id).await {
                    warn!(%id, error = %e, "failed to clean up preview row on drop");
                }
            });
        }
    }
}
