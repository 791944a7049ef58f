// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

pub mod application;
pub mod broker;
pub mod configuration;
pub mod constants;
pub mod errors;
pub mod models;
pub mod observability;
pub mod routes;
pub mod userinfo;
