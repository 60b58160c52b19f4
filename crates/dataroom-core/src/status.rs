// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Investor access-state machine.
//
//   invited ──NdaAccepted──▶ nda_accepted ──DocumentAccessed──▶ active
//                                                                 │
//                         ManualSet ──▶ termsheet_sent / termsheet_signed /
//                                       docs_out / dropped
//
// The only transition driven by the delivery pipeline is
// nda_accepted → active on the first recorded access.

use serde::{Deserialize, Serialize};

/// Lifecycle of an invited investor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestorStatus {
    Invited,
    NdaAccepted,
    Active,
    TermsheetSent,
    TermsheetSigned,
    DocsOut,
    Dropped,
    /// Legacy spelling of `Dropped`, still present in older records.
    Revoked,
}

impl InvestorStatus {
    pub const ALL: [InvestorStatus; 8] = [
        Self::Invited,
        Self::NdaAccepted,
        Self::Active,
        Self::TermsheetSent,
        Self::TermsheetSigned,
        Self::DocsOut,
        Self::Dropped,
        Self::Revoked,
    ];

    /// Statuses an administrator may set by hand.
    pub const MANUAL: [InvestorStatus; 4] = [
        Self::TermsheetSent,
        Self::TermsheetSigned,
        Self::DocsOut,
        Self::Dropped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invited => "invited",
            Self::NdaAccepted => "nda_accepted",
            Self::Active => "active",
            Self::TermsheetSent => "termsheet_sent",
            Self::TermsheetSigned => "termsheet_signed",
            Self::DocsOut => "docs_out",
            Self::Dropped => "dropped",
            Self::Revoked => "revoked",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Invited => "Invited",
            Self::NdaAccepted => "NDA Accepted",
            Self::Active => "Active",
            Self::TermsheetSent => "Termsheet Sent",
            Self::TermsheetSigned => "Termsheet Signed",
            Self::DocsOut => "Docs Out",
            Self::Dropped | Self::Revoked => "Dropped",
        }
    }

    /// Everything after the NDA grants dataroom access, except dropped.
    pub fn has_dataroom_access(&self) -> bool {
        !matches!(self, Self::Invited | Self::Dropped | Self::Revoked)
    }

    pub fn is_manual(&self) -> bool {
        Self::MANUAL.contains(self)
    }
}

impl std::fmt::Display for InvestorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened to an investor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// The investor accepted the NDA.
    NdaAccepted,
    /// An access event was recorded for the investor.
    DocumentAccessed,
    /// An administrator picked a status from the manual list.
    ManualSet(InvestorStatus),
}

/// Pure transition function. Events that do not apply leave the status
/// unchanged; in particular `DocumentAccessed` only ever moves
/// `nda_accepted` to `active` and never demotes.
pub fn advance(current: InvestorStatus, event: StatusEvent) -> InvestorStatus {
    match (current, event) {
        (InvestorStatus::Invited, StatusEvent::NdaAccepted) => InvestorStatus::NdaAccepted,
        (InvestorStatus::NdaAccepted, StatusEvent::DocumentAccessed) => InvestorStatus::Active,
        (_, StatusEvent::ManualSet(target)) if target.is_manual() => target,
        (status, _) => status,
    }
}
