// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! CLI subsystem: conversion runner, batch driver and terminal reporting

pub mod batch;
pub mod reporter;
pub mod runner;

pub use batch::{discover, run_batch, BatchFailure, BatchReport};
pub use reporter::Reporter;
pub use runner::{output_path, Conversion, Runner, TargetFormat};
