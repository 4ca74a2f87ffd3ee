// SPDX-FileCopyrightText: 2026 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for end-to-end load runs.
//!
//! Provides a mock order service to aim runs at and builders for small,
//! fast run configurations.

#![allow(dead_code)]

pub mod generators;
pub mod target;
