// Copyright (c) Contributors to the godocfs project.
// SPDX-License-Identifier: Apache-2.0

//! Common macros and argument structures for the godocfs command line

mod args;

pub use args::{Logging, configure_logging, log_filter, report_error};
