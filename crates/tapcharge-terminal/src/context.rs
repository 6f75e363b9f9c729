//! Injected dependencies shared by every payment attempt.

use std::path::Path;
use std::sync::Arc;
use tapcharge_core::ConfirmationPolicy;
use tapcharge_crypto::KeyPair;
use tapcharge_relay::RelayClient;

use crate::config::TerminalConfig;
use crate::error::TerminalError;

/// Signing key, relay handle and identities used by the orchestrator.
///
/// Shared read-only across attempts.
#[derive(Clone)]
pub struct PaymentContext {
    pub signer: Arc<KeyPair>,
    pub relay: Arc<dyn RelayClient>,
    /// Ledger identity credited by internal transfers.
    pub destination: String,
    /// Only confirmation records signed by this identity are trusted.
    pub ledger_identity: String,
    pub relays: Vec<String>,
    pub policy: ConfirmationPolicy,
}

impl PaymentContext {
    pub fn new(
        signer: KeyPair,
        relay: Arc<dyn RelayClient>,
        destination: impl Into<String>,
        ledger_identity: impl Into<String>,
        relays: Vec<String>,
        policy: ConfirmationPolicy,
    ) -> Self {
        Self {
            signer: Arc::new(signer),
            relay,
            destination: destination.into(),
            ledger_identity: ledger_identity.into(),
            relays,
            policy,
        }
    }

    /// Build the context from configuration.
    ///
    /// The signing key comes from `identity.signing_seed`, then
    /// `identity.keypair_path` (generated when absent), and is otherwise
    /// ephemeral.
    pub fn from_config(
        config: &TerminalConfig,
        relay: Arc<dyn RelayClient>,
    ) -> Result<Self, TerminalError> {
        let identity = &config.identity;
        if identity.destination.is_empty() {
            return Err(TerminalError::Config("identity.destination is required".into()));
        }
        if identity.ledger_identity.is_empty() {
            return Err(TerminalError::Config("identity.ledger_identity is required".into()));
        }

        let signer = if let Some(ref seed) = identity.signing_seed {
            KeyPair::from_hex(seed)?
        } else if let Some(ref path) = identity.keypair_path {
            Self::load_or_generate_keypair(path)?
        } else {
            tracing::info!("generating ephemeral signing key");
            KeyPair::generate()
        };
        tracing::info!(
            signer = %signer.public_key(),
            destination = %identity.destination,
            relays = config.relay.urls.len(),
            "payment context ready"
        );

        Ok(Self::new(
            signer,
            relay,
            identity.destination.clone(),
            identity.ledger_identity.clone(),
            config.relay.urls.clone(),
            config.confirmation.clone(),
        ))
    }

    /// Load a hex seed from disk, or generate and save a new one.
    fn load_or_generate_keypair(path: &Path) -> Result<KeyPair, TerminalError> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let keypair = KeyPair::from_hex(contents.trim())?;
            tracing::info!(path = %path.display(), "loaded signing key from disk");
            Ok(keypair)
        } else {
            let keypair = KeyPair::generate();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, keypair.to_hex())?;
            tracing::info!(path = %path.display(), "generated and saved new signing key");
            Ok(keypair)
        }
    }
}
