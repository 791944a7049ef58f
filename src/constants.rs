// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Configuration constants for the broker.
//!
//! This module contains all compile-time constants used throughout the
//! service: reserved profile names, cache lifetimes, concurrency limits and
//! the AWS endpoints involved in credential minting.

use std::time::Duration;

/// Reserved profile name for the master account. The master profile's
/// credentials are used to assume the listing role in every target account.
pub const MASTER_PROFILE_NAME: &str = "broker-master";

/// Role assumed in each managed account to enumerate that account's roles,
/// unless overridden on the command line.
pub const DEFAULT_LIST_ROLES_ROLE_NAME: &str = "CPEBrokerRole";

/// Session name used when the master profile assumes the listing role.
pub const MASTER_ROLE_SESSION_NAME: &str = "brokermaster";

/// Region assigned to credential profiles that do not declare one.
pub const DEFAULT_REGION: &str = "us-west-2";

/// Minimum length of `aws_access_key_id` / `aws_secret_access_key` values;
/// shorter entries are treated as placeholders and skipped.
pub const MIN_CREDENTIAL_FIELD_LENGTH: usize = 3;

/// First line of an ASCII-armored PGP message. A credentials file starting
/// with this marker stays sealed until a passphrase arrives.
pub const PGP_ARMOR_HEADER: &str = "-----BEGIN PGP MESSAGE-----";

/// Lifetime requested for every STS `AssumeRole` call.
pub const ASSUME_ROLE_DURATION: Duration = Duration::from_secs(3600);

/// Wall-clock budget for a single account's role enumeration. Pagination
/// that has not completed by then fails with a timeout error.
pub const LIST_ROLES_TIMEOUT: Duration = Duration::from_secs(10);

/// Process-wide bound on concurrent role enumerations. Exists to protect
/// upstream IAM quota.
pub const MAX_ROLE_REQUESTS_IN_FLIGHT: usize = 10;

/// Page size requested from IAM `ListRoles`.
pub const LIST_ROLES_PAGE_SIZE: i32 = 500;

/// Positive lifetime of a user's resolved account/role authorization.
pub const USER_AUTHZ_CACHE_TTL: Duration = Duration::from_secs(300);

/// Positive lifetime of an account's enumerated role list.
pub const ACCOUNT_ROLE_CACHE_TTL: Duration = Duration::from_secs(1800);

/// Window after a failed refresh during which an expired role list keeps
/// being served without retrying the upstream.
pub const ACCOUNT_ROLE_NEGATIVE_TTL: Duration = Duration::from_secs(15);

/// Region prefix that selects the GovCloud partition and endpoints.
pub const GOV_REGION_PREFIX: &str = "us-gov-";

/// ARN prefix for roles in the standard partition.
pub const ARN_ROLE_PREFIX: &str = "arn:aws:iam";

/// ARN prefix for roles in the GovCloud partition.
pub const ARN_ROLE_PREFIX_GOV: &str = "arn:aws-us-gov:iam";

/// Federation endpoint exchanging temporary credentials for a sign-in token.
pub const FEDERATION_URL: &str = "https://signin.aws.amazon.com/federation";

/// GovCloud federation endpoint.
pub const FEDERATION_URL_GOV: &str = "https://signin.amazonaws-us-gov.com/federation";

/// Console destination for federated sign-in links.
pub const CONSOLE_DESTINATION_URL: &str = "https://console.aws.amazon.com/";

/// GovCloud console destination.
pub const CONSOLE_DESTINATION_URL_GOV: &str = "https://console.amazonaws-us-gov.com/";

/// Console session duration passed to the federation endpoint, in seconds
/// (just under 12 hours).
pub const CONSOLE_SESSION_DURATION_SECONDS: &str = "43000";

/// Timeout applied to calls against the federation endpoint and the
/// userinfo backend.
pub const OUTBOUND_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest accepted request body. The broker only ever takes small form
/// posts, so anything bigger than 1 MB is rejected with 413 before a
/// handler sees it.
pub const REQUEST_BODY_LIMIT: usize = 1024 * 1024;

/// Ceiling on end-to-end request handling; a request still in flight
/// after this long is answered with 408.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
