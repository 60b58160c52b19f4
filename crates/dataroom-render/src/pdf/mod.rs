// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: diagonal viewer-identity stamping.

pub mod metrics;
pub mod stamp;

pub use stamp::{PdfWatermarker, StampLayout, StampPlacement, stamp_layout};
