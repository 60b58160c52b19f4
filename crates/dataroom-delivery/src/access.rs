// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Requester resolution and authorization.

use std::sync::Arc;

use tracing::{debug, instrument};

use dataroom_core::error::{DataroomError, Result};
use dataroom_core::{DataroomConfig, Requester};

use crate::ports::{ViewerDirectory, blocking};

/// Turns an authenticated email into a `Requester` and decides what it may do.
#[derive(Clone)]
pub struct AccessPolicy {
    admin_emails: Vec<String>,
    directory: Arc<dyn ViewerDirectory>,
}

impl AccessPolicy {
    pub fn new(admin_emails: Vec<String>, directory: Arc<dyn ViewerDirectory>) -> Self {
        let admin_emails = admin_emails
            .into_iter()
            .map(|e| e.trim().to_ascii_lowercase())
            .collect();
        Self {
            admin_emails,
            directory,
        }
    }

    pub fn from_config(config: &DataroomConfig, directory: Arc<dyn ViewerDirectory>) -> Self {
        Self::new(config.admin_emails.clone(), directory)
    }

    fn is_admin(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|admin| admin == email)
    }

    /// Resolve roles for `email`. Someone who is neither an administrator
    /// nor an invited investor is `Forbidden`.
    #[instrument(skip(self))]
    pub async fn resolve(&self, email: &str) -> Result<Requester> {
        let email = email.trim().to_ascii_lowercase();
        if email.is_empty() {
            return Err(DataroomError::Unauthenticated);
        }

        let directory = Arc::clone(&self.directory);
        let lookup = email.clone();
        let investor = blocking(move || directory.investor_by_email(&lookup)).await?;

        let requester = Requester {
            is_admin: self.is_admin(&email),
            email,
            investor,
        };
        match requester.role() {
            Some(role) => {
                debug!(?role, "requester resolved");
                Ok(requester)
            }
            None => Err(DataroomError::Forbidden("no dataroom role".into())),
        }
    }

    /// Document delivery additionally requires an investor to hold a status
    /// with dataroom access, unless they are also an administrator.
    pub fn authorize_delivery(requester: &Requester) -> Result<()> {
        if requester.is_admin {
            return Ok(());
        }
        match &requester.investor {
            Some(investor) if investor.status.has_dataroom_access() => Ok(()),
            Some(_) => Err(DataroomError::Forbidden("dataroom access not granted".into())),
            None => Err(DataroomError::Forbidden("no dataroom role".into())),
        }
    }

    /// Administrative operations (deletion, analytics, export).
    pub fn require_admin(requester: &Requester) -> Result<()> {
        if requester.is_admin {
            Ok(())
        } else {
            Err(DataroomError::Forbidden("administrators only".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use dataroom_core::InvestorStatus;
    use dataroom_store::Database;

    use super::*;
    use crate::fixtures;
    use crate::ports::SharedDatabase;

    fn policy(investors: &[(&str, InvestorStatus)]) -> AccessPolicy {
        let db = SharedDatabase::new(Database::open_in_memory().unwrap());
        for (email, status) in investors {
            db.lock()
                .insert_investor(&fixtures::investor(email, *status))
                .unwrap();
        }
        AccessPolicy::new(vec!["Ops@Fund.com".into()], Arc::new(db))
    }

    #[tokio::test]
    async fn roles_are_resolved_from_config_and_directory() {
        let policy = policy(&[
            ("a@x.com", InvestorStatus::Active),
            ("ops@fund.com", InvestorStatus::Active),
        ]);

        let admin = policy.resolve("OPS@fund.com").await.unwrap();
        assert!(admin.is_admin && admin.is_investor());

        let investor = policy.resolve("a@x.com").await.unwrap();
        assert!(!investor.is_admin && investor.is_investor());
    }

    #[tokio::test]
    async fn strangers_are_forbidden() {
        let policy = policy(&[]);
        assert!(matches!(
            policy.resolve("nobody@else.com").await.unwrap_err(),
            DataroomError::Forbidden(_)
        ));
        assert!(matches!(
            policy.resolve("  ").await.unwrap_err(),
            DataroomError::Unauthenticated
        ));
    }

    #[tokio::test]
    async fn delivery_gate_follows_status() {
        let policy = policy(&[
            ("invited@x.com", InvestorStatus::Invited),
            ("nda@x.com", InvestorStatus::NdaAccepted),
            ("active@x.com", InvestorStatus::Active),
            ("dropped@x.com", InvestorStatus::Dropped),
            ("revoked@x.com", InvestorStatus::Revoked),
        ]);

        for (email, allowed) in [
            ("invited@x.com", false),
            ("nda@x.com", true),
            ("active@x.com", true),
            ("dropped@x.com", false),
            ("revoked@x.com", false),
            ("ops@fund.com", true),
        ] {
            let requester = policy.resolve(email).await.unwrap();
            assert_eq!(
                AccessPolicy::authorize_delivery(&requester).is_ok(),
                allowed,
                "{email}"
            );
        }
    }

    #[tokio::test]
    async fn admin_only_operations() {
        let policy = policy(&[("a@x.com", InvestorStatus::Active)]);
        let investor = policy.resolve("a@x.com").await.unwrap();
        let admin = policy.resolve("ops@fund.com").await.unwrap();

        assert!(AccessPolicy::require_admin(&investor).is_err());
        assert!(AccessPolicy::require_admin(&admin).is_ok());
    }
}
