// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Dataroom: Core types, investor status machine, and error definitions
// shared across all crates.

pub mod config;
pub mod error;
pub mod status;
pub mod types;

pub use config::DataroomConfig;
pub use error::{DataroomError, RenderError};
pub use status::{InvestorStatus, StatusEvent, advance};
pub use types::*;
