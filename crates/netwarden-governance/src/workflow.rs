//! Change request workflow — submit, approve, reject.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use netwarden_core::epoch_millis;
use netwarden_state::*;

use crate::auth::AdminCapability;
use crate::error::{GovernanceError, GovernanceResult};
use crate::validate;

/// A change a user can ask for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Proposal {
    NewMetricCatalogEntry(CatalogDraft),
    DeleteMetric { metric_id: MetricId },
    DeleteDevice { device_id: DeviceId },
    NewTemplate(TemplateDraft),
}

/// Result of [`Governance::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "request", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Created(ChangeRequest),
    /// An identical deletion was already pending; no new request.
    Existing(ChangeRequest),
}

impl SubmitOutcome {
    pub fn request(&self) -> &ChangeRequest {
        match self {
            SubmitOutcome::Created(r) | SubmitOutcome::Existing(r) => r,
        }
    }

    pub fn into_request(self) -> ChangeRequest {
        match self {
            SubmitOutcome::Created(r) | SubmitOutcome::Existing(r) => r,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Applied,
    /// The request had already been resolved; nothing was done.
    AlreadyResolved,
}

/// Result of [`Governance::approve`] or [`Governance::reject`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub request: ChangeRequest,
    pub outcome: ResolutionOutcome,
    /// Device-level effects the poller must follow.
    pub changes: Vec<InventoryChange>,
}

impl Resolution {
    fn already_resolved(request: ChangeRequest) -> Self {
        Self {
            request,
            outcome: ResolutionOutcome::AlreadyResolved,
            changes: Vec::new(),
        }
    }
}

/// Change governance over one inventory store.
#[derive(Clone)]
pub struct Governance {
    pub(crate) store: StateStore,
}

impl Governance {
    pub fn new(store: StateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Record a proposal as a PENDING change request.
    ///
    /// New catalog entries and templates are created in PENDING state in
    /// the same transaction as their request. A deletion whose target
    /// already has a PENDING deletion of the same kind returns that
    /// request instead of creating another.
    pub fn submit(
        &self,
        requester: &str,
        proposal: Proposal,
        comment: Option<String>,
    ) -> GovernanceResult<SubmitOutcome> {
        if requester.trim().is_empty() {
            return Err(GovernanceError::Validation("requester must not be empty".into()));
        }
        match &proposal {
            Proposal::NewMetricCatalogEntry(draft) => validate::catalog(draft)?,
            Proposal::NewTemplate(draft) => {
                if draft.name.trim().is_empty() {
                    return Err(GovernanceError::Validation("template name must not be empty".into()));
                }
                if draft.entry_ids.is_empty() {
                    return Err(GovernanceError::Validation("template must list at least one catalog entry".into()));
                }
            }
            Proposal::DeleteMetric { .. } | Proposal::DeleteDevice { .. } => {}
        }

        let now = epoch_millis();
        let outcome = self.store.write(|tx| -> GovernanceResult<SubmitOutcome> {
            let action = match proposal {
                Proposal::NewMetricCatalogEntry(draft) => {
                    let entry = tx.create_catalog_entry(&draft, requester, now)?;
                    ChangeAction::NewMetricCatalogEntry { entry_id: entry.id }
                }
                Proposal::NewTemplate(draft) => {
                    for &entry_id in &draft.entry_ids {
                        if tx.get_catalog_entry(entry_id)?.is_none() {
                            return Err(GovernanceError::missing("catalog entry", entry_id));
                        }
                    }
                    let template = tx.create_template(&draft, requester, now)?;
                    ChangeAction::NewTemplate {
                        template_id: template.id,
                    }
                }
                Proposal::DeleteMetric { metric_id } => {
                    if tx.get_metric(metric_id)?.is_none() {
                        return Err(GovernanceError::missing("metric", metric_id));
                    }
                    ChangeAction::DeleteMetric { metric_id }
                }
                Proposal::DeleteDevice { device_id } => {
                    if tx.get_device(device_id)?.is_none() {
                        return Err(GovernanceError::missing("device", device_id));
                    }
                    ChangeAction::DeleteDevice { device_id }
                }
            };

            if action.is_deletion()
                && let Some(existing) = tx
                    .list_requests()?
                    .into_iter()
                    .find(|r| r.status == ReviewStatus::Pending && r.action == action)
            {
                return Ok(SubmitOutcome::Existing(existing));
            }

            let request = tx.create_request(requester, action, comment, now)?;
            Ok(SubmitOutcome::Created(request))
        })?;

        match &outcome {
            SubmitOutcome::Created(r) => {
                info!(request_id = r.id, action = r.action.name(), target = r.action.target_id(), %requester, "change request submitted");
            }
            SubmitOutcome::Existing(r) => {
                debug!(request_id = r.id, action = r.action.name(), "duplicate deletion request suppressed");
            }
        }
        Ok(outcome)
    }

    /// Approve a request and apply its side effect atomically.
    ///
    /// An already-resolved request is left untouched and reported as
    /// [`ResolutionOutcome::AlreadyResolved`]. If the side effect fails,
    /// the request stays PENDING.
    pub fn approve(&self, admin: &AdminCapability, request_id: RequestId) -> GovernanceResult<Resolution> {
        let now = epoch_millis();
        let resolution = self.store.write(|tx| -> GovernanceResult<Resolution> {
            let request = tx
                .get_request(request_id)?
                .ok_or(GovernanceError::RequestNotFound(request_id))?;
            if request.status.is_resolved() {
                return Ok(Resolution::already_resolved(request));
            }

            let mut changes = Vec::new();
            match request.action {
                ChangeAction::NewMetricCatalogEntry { entry_id } => {
                    require_catalog_entry(tx, entry_id)?;
                    tx.set_catalog_entry_status(entry_id, ReviewStatus::Approved)?;
                }
                ChangeAction::DeleteMetric { metric_id } => {
                    if !tx.delete_metric(metric_id)? {
                        debug!(metric_id, "metric already gone");
                    }
                }
                ChangeAction::DeleteDevice { device_id } => match tx.delete_device(device_id)? {
                    Some(metrics) => {
                        debug!(device_id, metrics = metrics.len(), "device and metrics deleted");
                        changes.push(InventoryChange::DeviceRemoved(device_id));
                    }
                    None => debug!(device_id, "device already gone"),
                },
                ChangeAction::NewTemplate { template_id } => {
                    require_template(tx, template_id)?;
                    tx.set_template_status(template_id, ReviewStatus::Approved)?;
                }
            }

            let request = tx.set_request_status(request_id, ReviewStatus::Approved, admin.actor(), now)?;
            Ok(Resolution {
                request,
                outcome: ResolutionOutcome::Applied,
                changes,
            })
        });

        log_resolution(request_id, admin, "approve", &resolution);
        resolution
    }

    /// Reject a request. Only proposal records (catalog entries and
    /// templates) change; the inventory is never touched.
    pub fn reject(&self, admin: &AdminCapability, request_id: RequestId) -> GovernanceResult<Resolution> {
        let now = epoch_millis();
        let resolution = self.store.write(|tx| -> GovernanceResult<Resolution> {
            let request = tx
                .get_request(request_id)?
                .ok_or(GovernanceError::RequestNotFound(request_id))?;
            if request.status.is_resolved() {
                return Ok(Resolution::already_resolved(request));
            }

            match request.action {
                ChangeAction::NewMetricCatalogEntry { entry_id } => {
                    require_catalog_entry(tx, entry_id)?;
                    tx.set_catalog_entry_status(entry_id, ReviewStatus::Rejected)?;
                }
                ChangeAction::NewTemplate { template_id } => {
                    require_template(tx, template_id)?;
                    tx.set_template_status(template_id, ReviewStatus::Rejected)?;
                }
                ChangeAction::DeleteMetric { .. } | ChangeAction::DeleteDevice { .. } => {}
            }

            let request = tx.set_request_status(request_id, ReviewStatus::Rejected, admin.actor(), now)?;
            Ok(Resolution {
                request,
                outcome: ResolutionOutcome::Applied,
                changes: Vec::new(),
            })
        });

        log_resolution(request_id, admin, "reject", &resolution);
        resolution
    }

    pub fn pending_requests(&self) -> GovernanceResult<Vec<ChangeRequest>> {
        Ok(self.store.pending_requests()?)
    }
}

fn require_catalog_entry(tx: &StoreTxn<'_>, id: CatalogEntryId) -> GovernanceResult<CatalogEntry> {
    tx.get_catalog_entry(id)?
        .ok_or(GovernanceError::missing("catalog entry", id))
}

fn require_template(tx: &StoreTxn<'_>, id: TemplateId) -> GovernanceResult<Template> {
    tx.get_template(id)?.ok_or(GovernanceError::missing("template", id))
}

fn log_resolution(
    request_id: RequestId,
    admin: &AdminCapability,
    decision: &str,
    resolution: &GovernanceResult<Resolution>,
) {
    match resolution {
        Ok(r) if r.outcome == ResolutionOutcome::AlreadyResolved => {
            debug!(request_id, decision, status = ?r.request.status, "request already resolved");
        }
        Ok(r) => {
            info!(
                request_id,
                decision,
                action = r.request.action.name(),
                target = r.request.action.target_id(),
                admin = admin.actor(),
                "change request resolved"
            );
        }
        Err(e) => warn!(request_id, decision, error = %e, "change request left pending"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authorizer;

    struct Fixture {
        gov: Governance,
        admin: AdminCapability,
    }

    fn fixture() -> Fixture {
        let store = StateStore::open_in_memory().unwrap();
        let admin = Authorizer::new(["admin"]).authorize("admin").unwrap();
        Fixture {
            gov: Governance::new(store),
            admin,
        }
    }

    fn seed_device(store: &StateStore, metrics: usize) -> (Device, Vec<Metric>) {
        store
            .write(|tx| {
                let device = tx.create_device(
                    &DeviceDraft {
                        name: "edge-rtr".into(),
                        address: "192.0.2.1".into(),
                        community: "public".into(),
                        interval_secs: 60,
                    },
                    0,
                )?;
                let metrics = (0..metrics)
                    .map(|i| {
                        tx.create_metric(
                            &MetricDraft {
                                device_id: device.id,
                                oid: format!("1.3.6.1.2.1.2.2.1.10.{i}"),
                                name: format!("ifInOctets.{i}"),
                                value_type: ValueType::Counter,
                                thresholds: Thresholds::default(),
                                alerting_enabled: true,
                                catalog_entry_id: None,
                            },
                            0,
                        )
                    })
                    .collect::<StateResult<Vec<_>>>()?;
                Ok::<_, StateError>((device, metrics))
            })
            .unwrap()
    }

    fn catalog_draft() -> CatalogDraft {
        CatalogDraft {
            oid: "1.3.6.1.2.1.1.3.0".into(),
            name: "sysUpTime".into(),
            value_type: ValueType::Integer,
        }
    }

    #[test]
    fn catalog_entry_and_request_are_created_together() {
        let f = fixture();
        let outcome = f
            .gov
            .submit("alice", Proposal::NewMetricCatalogEntry(catalog_draft()), Some("uptime".into()))
            .unwrap();
        let SubmitOutcome::Created(request) = outcome else {
            panic!("expected a new request");
        };
        assert_eq!(request.status, ReviewStatus::Pending);
        assert_eq!(request.comment.as_deref(), Some("uptime"));

        let entry_id = request.action.target_id();
        let entry = f.gov.store().get_catalog_entry(entry_id).unwrap().unwrap();
        assert_eq!(entry.status, ReviewStatus::Pending);
        assert_eq!(entry.proposed_by, "alice");

        let resolution = f.gov.approve(&f.admin, request.id).unwrap();
        assert_eq!(resolution.outcome, ResolutionOutcome::Applied);
        assert_eq!(resolution.request.status, ReviewStatus::Approved);
        assert_eq!(resolution.request.resolved_by.as_deref(), Some("admin"));
        assert!(resolution.request.resolved_at.is_some());
        let entry = f.gov.store().get_catalog_entry(entry_id).unwrap().unwrap();
        assert_eq!(entry.status, ReviewStatus::Approved);
    }

    #[test]
    fn invalid_catalog_proposal_creates_nothing() {
        let f = fixture();
        let mut draft = catalog_draft();
        draft.oid = "sysUpTime".into();
        let err = f
            .gov
            .submit("alice", Proposal::NewMetricCatalogEntry(draft), None)
            .unwrap_err();
        assert!(matches!(err, GovernanceError::Validation(_)));
        assert!(f.gov.store().list_catalog_entries().unwrap().is_empty());
        assert!(f.gov.store().list_requests().unwrap().is_empty());
    }

    #[test]
    fn rejecting_catalog_entry_marks_it_rejected() {
        let f = fixture();
        let request = f
            .gov
            .submit("alice", Proposal::NewMetricCatalogEntry(catalog_draft()), None)
            .unwrap()
            .into_request();

        let resolution = f.gov.reject(&f.admin, request.id).unwrap();
        assert_eq!(resolution.request.status, ReviewStatus::Rejected);
        let entry = f
            .gov
            .store()
            .get_catalog_entry(request.action.target_id())
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, ReviewStatus::Rejected);
    }

    #[test]
    fn approve_twice_applies_once() {
        let f = fixture();
        let (device, metrics) = seed_device(f.gov.store(), 2);
        let request = f
            .gov
            .submit("bob", Proposal::DeleteMetric { metric_id: metrics[0].id }, None)
            .unwrap()
            .into_request();

        let first = f.gov.approve(&f.admin, request.id).unwrap();
        assert_eq!(first.outcome, ResolutionOutcome::Applied);
        assert_eq!(f.gov.store().list_metrics(device.id).unwrap().len(), 1);

        let second = f.gov.approve(&f.admin, request.id).unwrap();
        assert_eq!(second.outcome, ResolutionOutcome::AlreadyResolved);
        assert_eq!(second.request, first.request);
        assert_eq!(f.gov.store().list_metrics(device.id).unwrap().len(), 1);

        // A late reject cannot flip an approved request.
        let third = f.gov.reject(&f.admin, request.id).unwrap();
        assert_eq!(third.outcome, ResolutionOutcome::AlreadyResolved);
        assert_eq!(third.request.status, ReviewStatus::Approved);
    }

    #[test]
    fn delete_device_removes_every_metric() {
        let f = fixture();
        let (device, metrics) = seed_device(f.gov.store(), 3);
        let (other, _) = seed_device(f.gov.store(), 1);
        assert_eq!(metrics.len(), 3);

        let request = f
            .gov
            .submit("bob", Proposal::DeleteDevice { device_id: device.id }, None)
            .unwrap()
            .into_request();
        let resolution = f.gov.approve(&f.admin, request.id).unwrap();

        assert_eq!(resolution.changes, vec![InventoryChange::DeviceRemoved(device.id)]);
        assert!(f.gov.store().list_metrics(device.id).unwrap().is_empty());
        for m in &metrics {
            assert!(f.gov.store().get_metric(m.id).unwrap().is_none());
        }
        let remaining: Vec<_> = f.gov.store().list_devices().unwrap().iter().map(|d| d.id).collect();
        assert_eq!(remaining, vec![other.id]);
    }

    #[test]
    fn duplicate_deletion_is_suppressed() {
        let f = fixture();
        let (device, metrics) = seed_device(f.gov.store(), 1);
        let metric_id = metrics[0].id;

        let first = f
            .gov
            .submit("bob", Proposal::DeleteMetric { metric_id }, None)
            .unwrap();
        let second = f
            .gov
            .submit("carol", Proposal::DeleteMetric { metric_id }, Some("again".into()))
            .unwrap();
        assert!(matches!(first, SubmitOutcome::Created(_)));
        assert!(matches!(second, SubmitOutcome::Existing(_)));
        assert_eq!(first.request().id, second.request().id);

        // A different action on the same numeric id is not a duplicate.
        let device_delete = f
            .gov
            .submit("bob", Proposal::DeleteDevice { device_id: device.id }, None)
            .unwrap();
        assert!(matches!(device_delete, SubmitOutcome::Created(_)));

        let pending = f.gov.pending_requests().unwrap();
        let for_metric: Vec<_> = pending
            .iter()
            .filter(|r| r.action == ChangeAction::DeleteMetric { metric_id })
            .collect();
        assert_eq!(for_metric.len(), 1);
    }

    #[test]
    fn rejected_deletion_can_be_resubmitted() {
        let f = fixture();
        let (_, metrics) = seed_device(f.gov.store(), 1);
        let metric_id = metrics[0].id;
        let first = f
            .gov
            .submit("bob", Proposal::DeleteMetric { metric_id }, None)
            .unwrap()
            .into_request();
        f.gov.reject(&f.admin, first.id).unwrap();

        let second = f.gov.submit("bob", Proposal::DeleteMetric { metric_id }, None).unwrap();
        assert!(matches!(second, SubmitOutcome::Created(ref r) if r.id != first.id));
        assert!(f.gov.store().get_metric(metric_id).unwrap().is_some());
    }

    #[test]
    fn deletion_of_missing_target_is_refused() {
        let f = fixture();
        let err = f
            .gov
            .submit("bob", Proposal::DeleteDevice { device_id: 99 }, None)
            .unwrap_err();
        assert!(matches!(err, GovernanceError::TargetNotFound { kind: "device", id: 99 }));
        assert!(f.gov.store().list_requests().unwrap().is_empty());
    }

    #[test]
    fn approving_deletion_of_vanished_target_is_a_noop() {
        let f = fixture();
        let (device, _) = seed_device(f.gov.store(), 1);
        let request = f
            .gov
            .submit("bob", Proposal::DeleteDevice { device_id: device.id }, None)
            .unwrap()
            .into_request();
        f.gov.store().delete_device(device.id).unwrap();

        let resolution = f.gov.approve(&f.admin, request.id).unwrap();
        assert_eq!(resolution.outcome, ResolutionOutcome::Applied);
        assert!(resolution.changes.is_empty());
    }

    #[test]
    fn unknown_request_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.gov.approve(&f.admin, 7),
            Err(GovernanceError::RequestNotFound(7))
        ));
        assert!(matches!(
            f.gov.reject(&f.admin, 7),
            Err(GovernanceError::RequestNotFound(7))
        ));
    }

    #[test]
    fn failed_side_effect_leaves_request_pending() {
        let f = fixture();
        // A request whose catalog entry does not exist.
        let request = f
            .gov
            .store()
            .write(|tx| {
                tx.create_request(
                    "mallory",
                    ChangeAction::NewMetricCatalogEntry { entry_id: 404 },
                    None,
                    0,
                )
            })
            .unwrap();

        let err = f.gov.approve(&f.admin, request.id).unwrap_err();
        assert!(matches!(err, GovernanceError::TargetNotFound { kind: "catalog entry", id: 404 }));
        let stored = f.gov.store().get_request(request.id).unwrap().unwrap();
        assert_eq!(stored.status, ReviewStatus::Pending);
        assert!(stored.resolved_by.is_none());
    }

    #[test]
    fn template_lifecycle() {
        let f = fixture();
        let entry = f
            .gov
            .submit("alice", Proposal::NewMetricCatalogEntry(catalog_draft()), None)
            .unwrap()
            .into_request();

        let request = f
            .gov
            .submit(
                "alice",
                Proposal::NewTemplate(TemplateDraft {
                    name: "core switch".into(),
                    entry_ids: vec![entry.action.target_id()],
                }),
                None,
            )
            .unwrap()
            .into_request();
        let template_id = request.action.target_id();
        assert_eq!(
            f.gov.store().get_template(template_id).unwrap().unwrap().status,
            ReviewStatus::Pending
        );

        f.gov.approve(&f.admin, request.id).unwrap();
        assert_eq!(
            f.gov.store().get_template(template_id).unwrap().unwrap().status,
            ReviewStatus::Approved
        );
    }

    #[test]
    fn template_with_unknown_entry_creates_nothing() {
        let f = fixture();
        let err = f
            .gov
            .submit(
                "alice",
                Proposal::NewTemplate(TemplateDraft {
                    name: "bogus".into(),
                    entry_ids: vec![12],
                }),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, GovernanceError::TargetNotFound { kind: "catalog entry", id: 12 }));
        assert!(f.gov.store().list_templates().unwrap().is_empty());
        assert!(f.gov.store().list_requests().unwrap().is_empty());
    }

    #[test]
    fn rejecting_template_marks_it_rejected() {
        let f = fixture();
        let entry = f
            .gov
            .submit("alice", Proposal::NewMetricCatalogEntry(catalog_draft()), None)
            .unwrap()
            .into_request();
        let request = f
            .gov
            .submit(
                "alice",
                Proposal::NewTemplate(TemplateDraft {
                    name: "edge".into(),
                    entry_ids: vec![entry.action.target_id()],
                }),
                None,
            )
            .unwrap()
            .into_request();

        f.gov.reject(&f.admin, request.id).unwrap();
        let template = f.gov.store().get_template(request.action.target_id()).unwrap().unwrap();
        assert_eq!(template.status, ReviewStatus::Rejected);
    }

    #[test]
    fn proposal_json_shape() {
        let proposal: Proposal = serde_json::from_value(serde_json::json!({
            "type": "DELETE_METRIC",
            "metric_id": 5
        }))
        .unwrap();
        assert_eq!(proposal, Proposal::DeleteMetric { metric_id: 5 });

        let proposal: Proposal = serde_json::from_value(serde_json::json!({
            "type": "NEW_METRIC_CATALOG_ENTRY",
            "oid": "1.3.6.1.2.1.1.3.0",
            "name": "sysUpTime",
            "value_type": "integer"
        }))
        .unwrap();
        assert!(matches!(proposal, Proposal::NewMetricCatalogEntry(ref d) if d.name == "sysUpTime"));
    }
}
