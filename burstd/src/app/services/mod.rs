// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2026 Alex Sizykh

pub mod accounting_record;
pub mod classad;
pub mod dag_status;
pub mod deployment_request;
pub mod job_ad;
pub mod presigned;
pub mod retry;
pub mod stats;
