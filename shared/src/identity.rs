//! Client identities.
//!
//! A client keeps a random private id to itself and is known to the server
//! and its peers only by a public id derived from it with a salted SHA-256.
//! The derivation is deterministic, so the client can recognise its own
//! actions when the server echoes them back under the public id.

use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Length in hex characters of both private and public ids
pub const ID_LEN: usize = 32;

const PUBLIC_ID_SALT: &str = "puzzle-sync-public-id-v1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    #[error("action carries no identity")]
    Missing,

    #[error("malformed identity {0:?}")]
    Malformed(String),
}

/// Accepts only ids shaped like the ones [`Identity::generate`] produces
pub fn is_well_formed_id(id: &str) -> bool {
    id.len() == ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Validates an actor id and maps it to the id peers are allowed to see
pub fn public_id_for(private_id: Option<&str>) -> Result<String, IdentityError> {
    let private_id = private_id.ok_or(IdentityError::Missing)?;
    if !is_well_formed_id(private_id) {
        return Err(IdentityError::Malformed(private_id.to_string()));
    }
    Ok(derive_public_id(private_id))
}

/// One-way salted derivation of a public id
pub fn derive_public_id(private_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(PUBLIC_ID_SALT.as_bytes());
    hasher.update(private_id.as_bytes());
    hex::encode(&hasher.finalize()[..ID_LEN / 2])
}

/// The private/public id pair of one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    private_id: String,
    public_id: String,
}

impl Identity {
    pub fn generate() -> Self {
        let mut bytes = [0u8; ID_LEN / 2];
        rand::thread_rng().fill_bytes(&mut bytes);
        let private_id = hex::encode(bytes);
        let public_id = derive_public_id(&private_id);
        Self {
            private_id,
            public_id,
        }
    }

    /// Restores an identity from a previously stored private id
    pub fn from_private(private_id: impl Into<String>) -> Result<Self, IdentityError> {
        let private_id = private_id.into();
        let public_id = public_id_for(Some(&private_id))?;
        Ok(Self {
            private_id,
            public_id,
        })
    }

    pub fn private_id(&self) -> &str {
        &self.private_id
    }

    pub fn public_id(&self) -> &str {
        &self.public_id
    }
}
