// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// dataroom-store: SQLite persistence for the dataroom.
//
// One `Database` handle owns the document catalog, the investor records,
// and the append-only access ledger. Analytics and CSV export are read-only
// projections over those tables.

pub mod analytics;
pub mod db;
pub mod documents;
pub mod export;
pub mod investors;
pub mod ledger;

pub use analytics::{
    ActivityPage, ActivitySummary, AnalyticsReport, DEFAULT_ACTIVITY_DAYS, DEFAULT_PAGE_SIZE,
    DailyActivity, DocumentActivity, InvestorActivity, MAX_PAGE_SIZE, RecentAccess,
};
pub use db::Database;
pub use export::{CSV_HEADER, export_filename};
