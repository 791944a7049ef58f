// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Counter incremented before every IAM `ListRoles` sweep.
pub const LISTROLES_ATTEMPT_COUNTER: &str = "cloudgate_aws_listroles_attempt_counter";
/// Counter incremented after a `ListRoles` sweep completes without error.
pub const LISTROLES_SUCCESS_COUNTER: &str = "cloudgate_aws_listroles_success_counter";
/// Counter incremented before every STS `AssumeRole` call.
pub const ASSUMEROLE_ATTEMPT_COUNTER: &str = "cloudgate_aws_assumerole_attempt_counter";
/// Counter incremented after an `AssumeRole` call succeeds.
pub const ASSUMEROLE_SUCCESS_COUNTER: &str = "cloudgate_aws_assumerole_success_counter";

/// Installs the process-wide Prometheus recorder and returns the handle the
/// `/metrics` route renders from. Call once at startup.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("install metrics recorder")
}
