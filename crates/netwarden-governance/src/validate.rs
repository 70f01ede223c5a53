use netwarden_state::{CatalogDraft, DeviceDraft, Thresholds};

use crate::error::{GovernanceError, GovernanceResult};

fn invalid(msg: impl Into<String>) -> GovernanceError {
    GovernanceError::Validation(msg.into())
}

pub(crate) fn device(draft: &DeviceDraft) -> GovernanceResult<()> {
    if draft.name.trim().is_empty() {
        return Err(invalid("device name must not be empty"));
    }
    if draft.address.trim().is_empty() {
        return Err(invalid("device address must not be empty"));
    }
    if draft.interval_secs == 0 {
        return Err(invalid("polling interval must be at least 1 second"));
    }
    Ok(())
}

/// Dotted numeric form, at least two arcs.
pub(crate) fn oid(oid: &str) -> GovernanceResult<()> {
    let arcs: Vec<&str> = oid.trim_start_matches('.').split('.').collect();
    let numeric = arcs
        .iter()
        .all(|arc| !arc.is_empty() && arc.bytes().all(|b| b.is_ascii_digit()));
    if arcs.len() < 2 || !numeric {
        return Err(invalid(format!("{oid:?} is not a dotted numeric OID")));
    }
    Ok(())
}

pub(crate) fn catalog(draft: &CatalogDraft) -> GovernanceResult<()> {
    if draft.name.trim().is_empty() {
        return Err(invalid("catalog entry name must not be empty"));
    }
    oid(&draft.oid)
}

pub(crate) fn thresholds(thresholds: &Thresholds) -> GovernanceResult<()> {
    for (field, value) in [
        ("min", thresholds.min),
        ("warning", thresholds.warning),
        ("max", thresholds.max),
    ] {
        if let Some(v) = value
            && !v.is_finite()
        {
            return Err(invalid(format!("{field} threshold must be a finite number")));
        }
    }
    Ok(())
}
