// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared HTTP utilities for Beacon.
//!
//! Provides a pre-configured HTTP client builder so every request sent by the
//! SDK carries the same User-Agent header.

mod client;

pub use client::{builder, new_client_with_timeout, user_agent};
