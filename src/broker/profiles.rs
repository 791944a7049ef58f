// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::collections::HashMap;
use std::fmt;

use ini::Ini;
use zeroize::ZeroizeOnDrop;

use crate::constants;
use crate::errors::BrokerError;

/// Long-lived credentials for one profile of the credentials file.
#[derive(Clone, ZeroizeOnDrop)]
pub(crate) struct ProfileCredential {
    pub(crate) access_key_id: String,
    pub(crate) secret_access_key: String,
    #[zeroize(skip)]
    pub(crate) region: String,
}

// Custom Debug implementation to prevent accidental logging of sensitive data
impl fmt::Debug for ProfileCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileCredential")
            .field("access_key_id", &"[REDACTED]")
            .field("secret_access_key", &"[REDACTED]")
            .field("region", &self.region)
            .finish()
    }
}

pub(crate) type ProfileMap = HashMap<String, ProfileCredential>;

/// Parses INI-formatted credentials into a profile map.
///
/// A section becomes a profile iff both `aws_access_key_id` and
/// `aws_secret_access_key` are present and at least three characters long;
/// `region` defaults to [`constants::DEFAULT_REGION`]. An input yielding no
/// usable profile is an error.
pub(crate) fn parse_credentials_ini(raw: &[u8]) -> Result<ProfileMap, BrokerError> {
    let source = std::str::from_utf8(raw)
        .map_err(|err| BrokerError::Unseal(format!("credentials are not valid UTF-8: {err}")))?;
    let ini = Ini::load_from_str(source)
        .map_err(|err| BrokerError::Unseal(format!("cannot parse credentials INI: {err}")))?;

    let mut profiles = ProfileMap::new();
    for (section, properties) in ini.iter() {
        let Some(profile_name) = section else {
            continue;
        };
        let access_key_id = properties.get("aws_access_key_id").unwrap_or_default();
        let secret_access_key = properties.get("aws_secret_access_key").unwrap_or_default();
        if access_key_id.len() < constants::MIN_CREDENTIAL_FIELD_LENGTH
            || secret_access_key.len() < constants::MIN_CREDENTIAL_FIELD_LENGTH
        {
            continue;
        }
        let region = match properties.get("region") {
            Some(region) if !region.is_empty() => region.to_string(),
            _ => constants::DEFAULT_REGION.to_string(),
        };
        profiles.insert(
            profile_name.to_string(),
            ProfileCredential {
                access_key_id: access_key_id.to_string(),
                secret_access_key: secret_access_key.to_string(),
                region,
            },
        );
    }
    if profiles.is_empty() {
        return Err(BrokerError::Unseal("nothing loaded".to_string()));
    }
    Ok(profiles)
}
