// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Credentials-file loading and runtime unsealing.
//!
//! The credentials file is either plaintext INI (loaded synchronously at
//! startup) or a PGP ASCII-armored message encrypted with a symmetric
//! passphrase. In the armored case the raw bytes are retained and the
//! broker stays sealed until an operator supplies the passphrase through
//! [`Broker::process_new_unsealing_secret`].

use std::io::Cursor;

use pgp::composed::{Deserializable, Message};

use super::{Broker, MasterSts, cloud, mutex_lock};
use crate::constants;
use crate::errors::BrokerError;

impl Broker {
    /// Reads the configured credentials file.
    ///
    /// An empty path selects metadata-only mode and finishes unsealing
    /// immediately. A missing file is tolerated: the broker stays sealed
    /// until bytes arrive some other way. An armored PGP file defers
    /// unsealing until a passphrase is processed.
    pub async fn load_credentials_file(&self) -> Result<(), BrokerError> {
        if self.credentials_filename.is_empty() {
            return self.finish_unsealing().await;
        }
        let raw = match tokio::fs::read(&self.credentials_filename).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(
                    path = %self.credentials_filename,
                    %err,
                    "credentials file not readable, staying sealed"
                );
                return Ok(());
            }
        };
        if raw.starts_with(constants::PGP_ARMOR_HEADER.as_bytes()) {
            *mutex_lock(&self.raw_credentials_file) = raw;
            return Ok(());
        }
        self.load_credentials_from_bytes(&raw).await
    }

    /// Attempts to unseal with `secret` as the symmetric PGP passphrase.
    ///
    /// Returns `Ok(true)` once the broker holds usable profiles (including
    /// when it already did). Decryption is attempted exactly once per call;
    /// a wrong passphrase is an error and the caller may retry with
    /// another secret. Decrypted content that yields no profiles is also an
    /// error, so failed attempts are always observable.
    pub async fn process_new_unsealing_secret(&self, secret: &str) -> Result<bool, BrokerError> {
        let _guard = self.unseal_lock.lock().await;
        if self.credentials_filename.is_empty()
            || self.profiles.get().is_some_and(|profiles| !profiles.is_empty())
        {
            return Ok(true);
        }
        let raw = mutex_lock(&self.raw_credentials_file).clone();
        let plaintext = decrypt_armored(&raw, secret)?;
        self.load_credentials_from_bytes(&plaintext).await?;
        Ok(true)
    }

    pub(crate) async fn load_credentials_from_bytes(
        &self,
        raw: &[u8],
    ) -> Result<(), BrokerError> {
        let profiles = super::profiles::parse_credentials_ini(raw)?;
        let _ = self.profiles.set(profiles);
        self.finish_unsealing().await
    }

    /// Builds the master STS client and trips the readiness latch.
    ///
    /// Failure to obtain master credentials is logged, not surfaced: the
    /// broker simply stays sealed. The latch transitions at most once.
    pub(crate) async fn finish_unsealing(&self) -> Result<(), BrokerError> {
        if self.is_unsealed() {
            return Ok(());
        }
        let (provider, region) = match self
            .credentials_provider_for_profile(constants::MASTER_PROFILE_NAME)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                tracing::warn!(%err, "unable to get master credentials");
                return Ok(());
            }
        };
        if region.is_empty() {
            tracing::warn!("master credentials have an empty region");
            return Ok(());
        }
        let client = cloud::sts_client(provider, &region);
        let _ = self.master_sts.set(MasterSts { client, region });
        self.unsealed.send_replace(true);
        Ok(())
    }
}

/// Decodes an ASCII-armored PGP message and decrypts it with the given
/// passphrase, returning the literal plaintext.
fn decrypt_armored(raw: &[u8], secret: &str) -> Result<Vec<u8>, BrokerError> {
    let (message, _headers) = Message::from_armor_single(Cursor::new(raw))
        .map_err(|err| BrokerError::Unseal(format!("cannot decode armored message: {err}")))?;
    let decrypted = message
        .decrypt_with_password(|| secret.to_string())
        .map_err(|err| BrokerError::Unseal(format!("decryption failed: {err}")))?;
    let content = decrypted
        .get_content()
        .map_err(|err| BrokerError::Unseal(format!("cannot read decrypted message: {err}")))?;
    content.ok_or_else(|| BrokerError::Unseal("decrypted message had no content".to_string()))
}
