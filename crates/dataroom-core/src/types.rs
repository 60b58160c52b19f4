// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the dataroom delivery pipeline.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::InvestorStatus;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse from the hyphenated string form used in URLs and the database.
            pub fn parse(s: &str) -> Option<Self> {
                Uuid::parse_str(s).ok().map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identity of a stored document.
    DocumentId
);
uuid_id!(
    /// Identity of an invited investor.
    InvestorId
);
uuid_id!(
    /// Identity of one access event in the ledger.
    AccessEventId
);

/// MIME types accepted at upload time. Nothing else is ever stored.
pub const ALLOWED_UPLOAD_TYPES: [&str; 6] = [
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "video/mp4",
    "video/webm",
    "video/quicktime",
];

/// Whether `mime` is on the upload allow-list.
pub fn is_allowed_upload(mime: &str) -> bool {
    ALLOWED_UPLOAD_TYPES.contains(&mime.trim().to_ascii_lowercase().as_str())
}

/// Normalised MIME family used to select a renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MimeFamily {
    Pdf,
    Spreadsheet,
    Video,
    /// Anything else: served as-is, no watermark capability exists.
    Other,
}

impl MimeFamily {
    pub fn from_mime(mime: &str) -> Self {
        let lower = mime.trim().to_ascii_lowercase();
        // Drop parameters such as `; charset=binary`.
        let essence = lower.split(';').next().unwrap_or("").trim();

        if essence == "application/pdf" {
            Self::Pdf
        } else if essence.contains("spreadsheet") || essence.contains("excel") {
            Self::Spreadsheet
        } else if essence.starts_with("video/") {
            Self::Video
        } else {
            Self::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Spreadsheet => "spreadsheet",
            Self::Video => "video",
            Self::Other => "other",
        }
    }
}

/// Display categories, in preferred order.
pub const CATEGORIES: [&str; 5] = ["Financials", "Strategy", "Product", "Legal", "Other"];

/// Position of `category` in the display order; unknown names sort last.
pub fn category_rank(category: &str) -> usize {
    CATEGORIES
        .iter()
        .position(|known| *known == category)
        .unwrap_or(CATEGORIES.len())
}

/// Group documents by category for display. The sort is stable, so the
/// incoming order (newest first from the catalog) holds within a category.
pub fn sort_for_display(documents: &mut [Document]) {
    documents.sort_by_key(|d| category_rank(&d.category));
}

/// A stored document. Immutable once uploaded, except for deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Display name (original upload filename).
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    /// Location of the bytes, relative to the upload directory.
    pub storage_path: PathBuf,
    pub category: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    pub fn family(&self) -> MimeFamily {
        MimeFamily::from_mime(&self.mime_type)
    }
}

/// An invited investor as seen by the delivery pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestorRecord {
    pub id: InvestorId,
    pub email: String,
    pub name: Option<String>,
    pub status: InvestorStatus,
    pub nda_accepted_at: Option<DateTime<Utc>>,
}

/// Role flag of a resolved viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRole {
    Investor,
    Admin,
    Both,
}

/// Resolved identity of whoever is asking for a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Requester {
    /// Authenticated email; doubles as the visible watermark payload.
    pub email: String,
    pub is_admin: bool,
    pub investor: Option<InvestorRecord>,
}

impl Requester {
    pub fn is_investor(&self) -> bool {
        self.investor.is_some()
    }

    pub fn role(&self) -> Option<ViewerRole> {
        match (self.is_admin, self.is_investor()) {
            (true, true) => Some(ViewerRole::Both),
            (true, false) => Some(ViewerRole::Admin),
            (false, true) => Some(ViewerRole::Investor),
            (false, false) => None,
        }
    }

    /// Text burned into every watermark for this requester.
    pub fn viewer_label(&self) -> &str {
        &self.email
    }

    /// The single gate that lets protected content leave unmarked.
    ///
    /// Only an administrator who is not also an investor, and who explicitly
    /// asked for it, gets a clean copy. Everything else is watermarked.
    pub fn skip_watermark(&self, options: &DeliveryOptions) -> bool {
        self.is_admin && !self.is_investor() && options.wants_clean
    }
}

/// Where a delivery request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessAction {
    View,
    Download,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Download => "download",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "view" => Some(Self::View),
            "download" => Some(Self::Download),
            _ => None,
        }
    }
}

/// Caller intent for one delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub action: Option<AccessAction>,
    pub wants_clean: bool,
    pub client: ClientMetadata,
}

/// Optional network/client metadata recorded on access events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

/// Input to the access ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub investor_id: InvestorId,
    pub document_id: DocumentId,
    pub action: AccessAction,
    pub client: ClientMetadata,
}

/// One logged occurrence of a viewer viewing or downloading a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessEvent {
    pub id: AccessEventId,
    pub investor_id: InvestorId,
    pub document_id: DocumentId,
    pub action: AccessAction,
    pub started_at: DateTime<Utc>,
    /// Seconds, as last reported by a heartbeat. Starts at 0.
    pub duration_secs: i64,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}
