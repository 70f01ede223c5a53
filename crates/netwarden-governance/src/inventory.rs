//! Direct inventory edits: devices (administrators only) and metric
//! attachment from the approved catalog.

use serde::Serialize;
use tracing::{debug, info};

use netwarden_core::epoch_millis;
use netwarden_state::*;

use crate::auth::AdminCapability;
use crate::error::{GovernanceError, GovernanceResult};
use crate::validate;
use crate::workflow::Governance;

/// A committed mutation and the device-level changes it caused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mutation<T> {
    pub value: T,
    pub changes: Vec<InventoryChange>,
}

impl Governance {
    pub fn add_device(&self, admin: &AdminCapability, draft: DeviceDraft) -> GovernanceResult<Mutation<Device>> {
        validate::device(&draft)?;
        let device = self
            .store
            .write(|tx| -> GovernanceResult<Device> { Ok(tx.create_device(&draft, epoch_millis())?) })?;
        info!(device_id = device.id, name = %device.name, admin = admin.actor(), "device added");
        Ok(Mutation {
            changes: vec![InventoryChange::DeviceAdded(device.id)],
            value: device,
        })
    }

    /// Replace a device's editable fields. The caller should restart its
    /// poll loop so a new address or interval takes effect.
    pub fn update_device(
        &self,
        admin: &AdminCapability,
        device_id: DeviceId,
        draft: DeviceDraft,
    ) -> GovernanceResult<Mutation<Device>> {
        validate::device(&draft)?;
        let device = self.store.write(|tx| -> GovernanceResult<Device> {
            if tx.get_device(device_id)?.is_none() {
                return Err(GovernanceError::missing("device", device_id));
            }
            Ok(tx.update_device(device_id, &draft, epoch_millis())?)
        })?;
        info!(device_id, admin = admin.actor(), "device updated");
        Ok(Mutation {
            changes: vec![InventoryChange::DeviceUpdated(device_id)],
            value: device,
        })
    }

    /// Attach an APPROVED catalog entry to a device as a new metric.
    pub fn attach_metric(
        &self,
        device_id: DeviceId,
        entry_id: CatalogEntryId,
        thresholds: Thresholds,
        alerting_enabled: bool,
    ) -> GovernanceResult<Metric> {
        validate::thresholds(&thresholds)?;
        let metric = self.store.write(|tx| -> GovernanceResult<Metric> {
            if tx.get_device(device_id)?.is_none() {
                return Err(GovernanceError::missing("device", device_id));
            }
            let entry = tx
                .get_catalog_entry(entry_id)?
                .ok_or(GovernanceError::missing("catalog entry", entry_id))?;
            if entry.status != ReviewStatus::Approved {
                return Err(GovernanceError::CatalogEntryNotApproved(entry_id));
            }
            if tx.list_metrics(device_id)?.iter().any(|m| m.oid == entry.oid) {
                return Err(GovernanceError::Validation(format!(
                    "{} is already attached to device {device_id}",
                    entry.oid
                )));
            }
            Ok(tx.create_metric(&metric_from_entry(device_id, &entry, thresholds, alerting_enabled), epoch_millis())?)
        })?;
        debug!(metric_id = metric.id, device_id, entry_id, "metric attached");
        Ok(metric)
    }

    pub fn set_thresholds(&self, metric_id: MetricId, thresholds: Thresholds) -> GovernanceResult<Metric> {
        validate::thresholds(&thresholds)?;
        self.edit_metric(metric_id, |m| m.thresholds = thresholds)
    }

    pub fn set_alerting(&self, metric_id: MetricId, enabled: bool) -> GovernanceResult<Metric> {
        self.edit_metric(metric_id, |m| m.alerting_enabled = enabled)
    }

    fn edit_metric(&self, metric_id: MetricId, edit: impl FnOnce(&mut Metric)) -> GovernanceResult<Metric> {
        self.store.write(|tx| -> GovernanceResult<Metric> {
            let mut metric = tx
                .get_metric(metric_id)?
                .ok_or(GovernanceError::missing("metric", metric_id))?;
            edit(&mut metric);
            tx.put_metric(&metric)?;
            Ok(metric)
        })
    }

    /// Attach every APPROVED entry of an APPROVED template to a device.
    ///
    /// Entries that are not approved, or whose OID the device already
    /// polls, are skipped. Returns the metrics created.
    pub fn apply_template(&self, device_id: DeviceId, template_id: TemplateId) -> GovernanceResult<Vec<Metric>> {
        let created = self.store.write(|tx| -> GovernanceResult<Vec<Metric>> {
            if tx.get_device(device_id)?.is_none() {
                return Err(GovernanceError::missing("device", device_id));
            }
            let template = tx
                .get_template(template_id)?
                .ok_or(GovernanceError::missing("template", template_id))?;
            if template.status != ReviewStatus::Approved {
                return Err(GovernanceError::TemplateNotApproved(template_id));
            }

            let mut oids: Vec<String> = tx.list_metrics(device_id)?.into_iter().map(|m| m.oid).collect();
            let now = epoch_millis();
            let mut created = Vec::new();
            for &entry_id in &template.entry_ids {
                let Some(entry) = tx.get_catalog_entry(entry_id)? else {
                    continue;
                };
                if entry.status != ReviewStatus::Approved || oids.contains(&entry.oid) {
                    continue;
                }
                let draft = metric_from_entry(device_id, &entry, Thresholds::default(), true);
                let metric = tx.create_metric(&draft, now)?;
                oids.push(metric.oid.clone());
                created.push(metric);
            }
            Ok(created)
        })?;
        info!(device_id, template_id, metrics = created.len(), "template applied");
        Ok(created)
    }
}

fn metric_from_entry(
    device_id: DeviceId,
    entry: &CatalogEntry,
    thresholds: Thresholds,
    alerting_enabled: bool,
) -> MetricDraft {
    MetricDraft {
        device_id,
        oid: entry.oid.clone(),
        name: entry.name.clone(),
        value_type: entry.value_type,
        thresholds,
        alerting_enabled,
        catalog_entry_id: Some(entry.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Authorizer;
    use crate::workflow::Proposal;

    fn setup() -> (Governance, AdminCapability) {
        let gov = Governance::new(StateStore::open_in_memory().unwrap());
        let admin = Authorizer::new(["admin"]).authorize("admin").unwrap();
        (gov, admin)
    }

    fn draft(name: &str, interval_secs: u64) -> DeviceDraft {
        DeviceDraft {
            name: name.into(),
            address: "198.51.100.7".into(),
            community: "public".into(),
            interval_secs,
        }
    }

    /// Propose and approve a catalog entry, returning its id.
    fn approved_entry(gov: &Governance, admin: &AdminCapability, oid: &str, name: &str) -> CatalogEntryId {
        let request = gov
            .submit(
                "alice",
                Proposal::NewMetricCatalogEntry(CatalogDraft {
                    oid: oid.into(),
                    name: name.into(),
                    value_type: ValueType::Gauge,
                }),
                None,
            )
            .unwrap()
            .into_request();
        gov.approve(admin, request.id).unwrap();
        request.action.target_id()
    }

    #[test]
    fn add_and_update_device_report_changes() {
        let (gov, admin) = setup();
        let added = gov.add_device(&admin, draft("dist-sw", 30)).unwrap();
        assert_eq!(added.changes, vec![InventoryChange::DeviceAdded(added.value.id)]);

        let updated = gov.update_device(&admin, added.value.id, draft("dist-sw-1", 10)).unwrap();
        assert_eq!(updated.value.name, "dist-sw-1");
        assert_eq!(updated.value.interval_secs, 10);
        assert_eq!(updated.changes, vec![InventoryChange::DeviceUpdated(added.value.id)]);

        assert!(matches!(
            gov.update_device(&admin, 404, draft("x", 10)),
            Err(GovernanceError::TargetNotFound { kind: "device", id: 404 })
        ));
    }

    #[test]
    fn device_validation() {
        let (gov, admin) = setup();
        assert!(matches!(gov.add_device(&admin, draft("", 30)), Err(GovernanceError::Validation(_))));
        assert!(matches!(gov.add_device(&admin, draft("sw", 0)), Err(GovernanceError::Validation(_))));
        assert!(gov.store().list_devices().unwrap().is_empty());
    }

    #[test]
    fn only_approved_entries_attach() {
        let (gov, admin) = setup();
        let device = gov.add_device(&admin, draft("sw", 30)).unwrap().value;
        let pending = gov
            .submit(
                "alice",
                Proposal::NewMetricCatalogEntry(CatalogDraft {
                    oid: "1.3.6.1.2.1.1.3.0".into(),
                    name: "sysUpTime".into(),
                    value_type: ValueType::Integer,
                }),
                None,
            )
            .unwrap()
            .into_request()
            .action
            .target_id();

        assert!(matches!(
            gov.attach_metric(device.id, pending, Thresholds::default(), true),
            Err(GovernanceError::CatalogEntryNotApproved(id)) if id == pending
        ));

        let entry = approved_entry(&gov, &admin, "1.3.6.1.4.1.2021.11.9.0", "cpuUser");
        let thresholds = Thresholds {
            warning: Some(70.0),
            max: Some(90.0),
            ..Default::default()
        };
        let metric = gov.attach_metric(device.id, entry, thresholds, true).unwrap();
        assert_eq!(metric.oid, "1.3.6.1.4.1.2021.11.9.0");
        assert_eq!(metric.name, "cpuUser");
        assert_eq!(metric.catalog_entry_id, Some(entry));
        assert_eq!(metric.thresholds, thresholds);

        assert!(matches!(
            gov.attach_metric(device.id, entry, Thresholds::default(), true),
            Err(GovernanceError::Validation(_))
        ));
    }

    #[test]
    fn threshold_and_alerting_edits() {
        let (gov, admin) = setup();
        let device = gov.add_device(&admin, draft("sw", 30)).unwrap().value;
        let entry = approved_entry(&gov, &admin, "1.3.6.1.4.1.2021.4.6.0", "memAvailReal");
        let metric = gov.attach_metric(device.id, entry, Thresholds::default(), true).unwrap();

        let min_only = Thresholds {
            min: Some(65_536.0),
            ..Default::default()
        };
        let edited = gov.set_thresholds(metric.id, min_only).unwrap();
        assert_eq!(edited.thresholds, min_only);

        let disabled = gov.set_alerting(metric.id, false).unwrap();
        assert!(!disabled.alerting_enabled);
        assert_eq!(disabled.thresholds, min_only);
        assert!(!gov.store().get_metric(metric.id).unwrap().unwrap().alerting_enabled);

        let infinite = Thresholds {
            max: Some(f64::INFINITY),
            ..Default::default()
        };
        assert!(matches!(gov.set_thresholds(metric.id, infinite), Err(GovernanceError::Validation(_))));
        assert!(matches!(
            gov.set_alerting(999, true),
            Err(GovernanceError::TargetNotFound { kind: "metric", .. })
        ));
    }

    #[test]
    fn template_applies_approved_entries_once() {
        let (gov, admin) = setup();
        let device = gov.add_device(&admin, draft("sw", 30)).unwrap().value;
        let cpu = approved_entry(&gov, &admin, "1.3.6.1.4.1.2021.11.9.0", "cpuUser");
        let mem = approved_entry(&gov, &admin, "1.3.6.1.4.1.2021.4.6.0", "memAvailReal");
        let unreviewed = gov
            .submit(
                "alice",
                Proposal::NewMetricCatalogEntry(CatalogDraft {
                    oid: "1.3.6.1.2.1.1.3.0".into(),
                    name: "sysUpTime".into(),
                    value_type: ValueType::Integer,
                }),
                None,
            )
            .unwrap()
            .into_request()
            .action
            .target_id();

        let request = gov
            .submit(
                "alice",
                Proposal::NewTemplate(TemplateDraft {
                    name: "linux host".into(),
                    entry_ids: vec![cpu, mem, unreviewed],
                }),
                None,
            )
            .unwrap()
            .into_request();
        let template_id = request.action.target_id();

        assert!(matches!(
            gov.apply_template(device.id, template_id),
            Err(GovernanceError::TemplateNotApproved(_))
        ));
        gov.approve(&admin, request.id).unwrap();

        // cpu is already attached and must not be duplicated.
        gov.attach_metric(device.id, cpu, Thresholds::default(), true).unwrap();
        let created = gov.apply_template(device.id, template_id).unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].catalog_entry_id, Some(mem));

        assert!(gov.apply_template(device.id, template_id).unwrap().is_empty());
        assert_eq!(gov.store().list_metrics(device.id).unwrap().len(), 2);
    }
}
