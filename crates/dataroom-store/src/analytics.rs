// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Analytics projections. Everything here is a fold over the access ledger
// plus the catalog and investor lists; nothing is stored.
//
//   views          = count(action = view)
//   downloads      = count(action = download)
//   files viewed   = distinct document ids among views
//   time spent     = sum of view durations

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use tracing::instrument;

use dataroom_core::error::Result;
use dataroom_core::{
    AccessAction, AccessEvent, AccessEventId, Document, DocumentId, InvestorId, InvestorRecord,
    InvestorStatus,
};

use crate::db::Database;

/// Default window for the daily series.
pub const DEFAULT_ACTIVITY_DAYS: i64 = 30;
/// How many events the recent-activity feed carries.
pub const RECENT_ACTIVITY_LIMIT: usize = 100;
/// Activity log page sizes.
pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestorActivity {
    pub id: InvestorId,
    pub email: String,
    pub name: Option<String>,
    pub status: InvestorStatus,
    pub nda_accepted_at: Option<DateTime<Utc>>,
    pub total_files_viewed: usize,
    /// Seconds.
    pub total_time_spent: i64,
    pub total_downloads: usize,
    pub last_active: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentActivity {
    pub id: DocumentId,
    pub name: String,
    pub category: String,
    pub unique_viewers: usize,
    pub total_views: usize,
    /// Mean view duration in seconds, rounded.
    pub avg_view_duration: i64,
    pub total_downloads: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyActivity {
    pub date: NaiveDate,
    pub views: usize,
    pub downloads: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySummary {
    pub total_investors: usize,
    /// Investors whose status currently grants dataroom access.
    pub active_investors: usize,
    pub total_files: usize,
    pub total_views: usize,
    pub total_downloads: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentViewer {
    pub email: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentFile {
    pub name: String,
    pub category: String,
}

/// One entry of the recent-activity feed, joined with its investor and file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentAccess {
    pub id: AccessEventId,
    pub action: AccessAction,
    pub started_at: DateTime<Utc>,
    pub duration: i64,
    pub investor: RecentViewer,
    pub file: RecentFile,
}

/// Everything the analytics dashboard shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub summary: ActivitySummary,
    pub investors: Vec<InvestorActivity>,
    pub files: Vec<DocumentActivity>,
    pub daily_activity: Vec<DailyActivity>,
    pub recent_activity: Vec<RecentAccess>,
}

/// One page of the full activity log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPage {
    pub logs: Vec<RecentAccess>,
    /// Matching events across all pages.
    pub total: u64,
    pub page: u64,
    pub total_pages: u64,
}

// ---------------------------------------------------------------------------
// Folds
// ---------------------------------------------------------------------------

pub fn investor_activity(
    investors: &[InvestorRecord],
    events: &[AccessEvent],
) -> Vec<InvestorActivity> {
    investors
        .iter()
        .map(|investor| {
            let own = events.iter().filter(|e| e.investor_id == investor.id);
            let mut files = HashSet::new();
            let mut time = 0;
            let mut downloads = 0;
            let mut last_active: Option<DateTime<Utc>> = None;
            for event in own {
                match event.action {
                    AccessAction::View => {
                        files.insert(event.document_id);
                        time += event.duration_secs;
                    }
                    AccessAction::Download => downloads += 1,
                }
                last_active = last_active.max(Some(event.started_at));
            }
            InvestorActivity {
                id: investor.id,
                email: investor.email.clone(),
                name: investor.name.clone(),
                status: investor.status,
                nda_accepted_at: investor.nda_accepted_at,
                total_files_viewed: files.len(),
                total_time_spent: time,
                total_downloads: downloads,
                last_active,
            }
        })
        .collect()
}

pub fn document_activity(documents: &[Document], events: &[AccessEvent]) -> Vec<DocumentActivity> {
    documents
        .iter()
        .map(|document| {
            let mut viewers = HashSet::new();
            let (mut views, mut downloads, mut time) = (0usize, 0usize, 0i64);
            for event in events.iter().filter(|e| e.document_id == document.id) {
                match event.action {
                    AccessAction::View => {
                        viewers.insert(event.investor_id);
                        views += 1;
                        time += event.duration_secs;
                    }
                    AccessAction::Download => downloads += 1,
                }
            }
            let avg_view_duration = if views == 0 {
                0
            } else {
                (time as f64 / views as f64).round() as i64
            };
            DocumentActivity {
                id: document.id,
                name: document.name.clone(),
                category: document.category.clone(),
                unique_viewers: viewers.len(),
                total_views: views,
                avg_view_duration,
                total_downloads: downloads,
            }
        })
        .collect()
}

/// Per-UTC-day counts of events started within `days` of `now`, oldest day
/// first. Days without events are omitted.
pub fn daily_activity(events: &[AccessEvent], now: DateTime<Utc>, days: i64) -> Vec<DailyActivity> {
    let since = now - Duration::days(days);
    let mut by_day: BTreeMap<NaiveDate, (usize, usize)> = BTreeMap::new();
    for event in events.iter().filter(|e| e.started_at >= since) {
        let counts = by_day.entry(event.started_at.date_naive()).or_default();
        match event.action {
            AccessAction::View => counts.0 += 1,
            AccessAction::Download => counts.1 += 1,
        }
    }
    by_day
        .into_iter()
        .map(|(date, (views, downloads))| DailyActivity {
            date,
            views,
            downloads,
        })
        .collect()
}

pub fn summarize(
    investors: &[InvestorRecord],
    documents: &[Document],
    events: &[AccessEvent],
) -> ActivitySummary {
    let views = events
        .iter()
        .filter(|e| e.action == AccessAction::View)
        .count();
    ActivitySummary {
        total_investors: investors.len(),
        active_investors: investors
            .iter()
            .filter(|i| i.status.has_dataroom_access())
            .count(),
        total_files: documents.len(),
        total_views: views,
        total_downloads: events.len() - views,
    }
}

/// The newest `limit` events that still resolve to an investor and a file.
pub fn recent_activity(
    investors: &[InvestorRecord],
    documents: &[Document],
    events: &[AccessEvent],
    limit: usize,
) -> Vec<RecentAccess> {
    let investors: HashMap<InvestorId, &InvestorRecord> =
        investors.iter().map(|i| (i.id, i)).collect();
    let documents: HashMap<DocumentId, &Document> = documents.iter().map(|d| (d.id, d)).collect();

    let mut newest: Vec<&AccessEvent> = events.iter().collect();
    newest.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    newest
        .into_iter()
        .filter_map(|event| {
            let investor = investors.get(&event.investor_id)?;
            let document = documents.get(&event.document_id)?;
            Some(RecentAccess {
                id: event.id,
                action: event.action,
                started_at: event.started_at,
                duration: event.duration_secs,
                investor: RecentViewer {
                    email: investor.email.clone(),
                    name: investor.name.clone(),
                },
                file: RecentFile {
                    name: document.name.clone(),
                    category: document.category.clone(),
                },
            })
        })
        .take(limit)
        .collect()
}

impl Database {
    /// Build the full dashboard report as of `now`.
    #[instrument(skip(self))]
    pub fn analytics_report(&self, now: DateTime<Utc>, days: i64) -> Result<AnalyticsReport> {
        let investors = self.investors()?;
        let documents = self.documents()?;
        let events = self.access_events()?;
        Ok(AnalyticsReport {
            summary: summarize(&investors, &documents, &events),
            investors: investor_activity(&investors, &events),
            files: document_activity(&documents, &events),
            daily_activity: daily_activity(&events, now, days),
            recent_activity: recent_activity(
                &investors,
                &documents,
                &events,
                RECENT_ACTIVITY_LIMIT,
            ),
        })
    }

    /// Page `page` (1-based) of the activity log, newest first, optionally
    /// restricted to one action. Out-of-range arguments are clamped.
    #[instrument(skip(self))]
    pub fn activity_page(&self, action: Option<AccessAction>, page: u64, limit: u64) -> Result<ActivityPage> {
        let page = page.max(1);
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let total = self.count_access(action)?;
        let events = self.access_events_page(action, (page - 1).saturating_mul(limit), limit)?;
        let logs = recent_activity(&self.investors()?, &self.documents()?, &events, events.len());
        Ok(ActivityPage {
            logs,
            total,
            page,
            total_pages: total.div_ceil(limit),
        })
    }
}
