//! Administrator capability.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{GovernanceError, GovernanceResult};

/// Proof that an actor is an administrator.
///
/// Only [`Authorizer::authorize`] can create one, so holding a
/// capability is the authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCapability {
    actor: String,
}

impl AdminCapability {
    pub fn actor(&self) -> &str {
        &self.actor
    }
}

/// The configured set of administrators.
#[derive(Debug, Clone, Default)]
pub struct Authorizer {
    admins: BTreeSet<String>,
}

impl Authorizer {
    pub fn new<I, S>(admins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            admins: admins.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_admin(&self, actor: &str) -> bool {
        self.admins.contains(actor)
    }

    pub fn authorize(&self, actor: &str) -> GovernanceResult<AdminCapability> {
        if self.is_admin(actor) {
            Ok(AdminCapability {
                actor: actor.to_string(),
            })
        } else {
            debug!(%actor, "administrator capability refused");
            Err(GovernanceError::Unauthorized(actor.to_string()))
        }
    }
}
