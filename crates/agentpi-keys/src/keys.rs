// crates/agentpi-keys/src/keys.rs
// ============================================================================
// Module: AgentPI Key Manager
// Description: Ed25519 key-pair lifecycle, JWKS publication, and grant signing.
// Purpose: Load or generate the issuer signing key with crash-safe persistence.
// Dependencies: agentpi-core, base64, ed25519-dalek, jsonwebtoken, tempfile
// ============================================================================

//! ## Overview
//! [`KeyManager`] owns the issuer's Ed25519 signing key and its public JWKS
//! record. On startup it loads both persisted artifacts, generates a fresh
//! pair when neither exists, and refuses to start when exactly one is
//! present. New material is written to temporary files and promoted by
//! rename so a crash never leaves a half-written pair behind.
//! Invariants:
//! - `kid` is a truncated RFC 7638 thumbprint of the public JWK and is never
//!   regenerated for an existing key.
//! - Signed tokens carry `alg` and `kid` in the header and `iat`/`exp` in
//!   the payload.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Write;
use std::path::Path;

use agentpi_core::core::hashing::sha256_canonical_json;
use agentpi_core::core::time::now_unix;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ed25519_dalek::SigningKey;
use ed25519_dalek::VerifyingKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::Algorithm;
use jsonwebtoken::EncodingKey;
use jsonwebtoken::Header;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Filename of the persisted private JWK artifact.
pub const PRIVATE_KEY_FILE: &str = "private.json";

/// Filename of the persisted public JWK artifact.
pub const PUBLIC_KEY_FILE: &str = "public.json";

/// JWK key type for Ed25519 keys.
const JWK_KTY: &str = "OKP";

/// JWK curve name for Ed25519 keys.
const JWK_CRV: &str = "Ed25519";

/// JWS algorithm name advertised in the public JWK.
const JWK_ALG: &str = "EdDSA";

/// Characters of the thumbprint kept as the key identifier.
const KID_LENGTH: usize = 8;

// ============================================================================
// SECTION: JWK Types
// ============================================================================

/// Public JWK record as published in the JWKS document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    /// Key type (`OKP`).
    pub kty: String,
    /// Curve name (`Ed25519`).
    pub crv: String,
    /// Base64url public key bytes.
    pub x: String,
    /// Key identifier (truncated thumbprint).
    pub kid: String,
    /// Key usage (`sig`).
    #[serde(rename = "use")]
    pub key_use: String,
    /// Signing algorithm (`EdDSA`).
    pub alg: String,
}

/// Private JWK record persisted alongside the public artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct PrivateJwk {
    /// Key type (`OKP`).
    kty: String,
    /// Curve name (`Ed25519`).
    crv: String,
    /// Base64url public key bytes.
    x: String,
    /// Base64url private key seed bytes.
    d: String,
    /// Key identifier matching the public record.
    kid: String,
}

/// Published set of public verification keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    /// Public keys, keyed by `kid`.
    pub keys: Vec<PublicJwk>,
}

/// Required members of an RFC 7638 Ed25519 thumbprint input.
#[derive(Debug, Serialize)]
struct ThumbprintInput<'a> {
    /// Curve name.
    crv: &'a str,
    /// Key type.
    kty: &'a str,
    /// Base64url public key bytes.
    x: &'a str,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Key lifecycle and signing errors.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Exactly one of the two key artifacts exists; refusing to guess.
    #[error(
        "partial key material: {present} exists but {missing} is missing; refusing to \
         regenerate a key that outstanding grants and JWKS consumers may depend on"
    )]
    PartialKeyMaterial {
        /// Artifact that was found.
        present: String,
        /// Artifact that was not found.
        missing: String,
    },
    /// Filesystem failure while reading or writing key material.
    #[error("key storage i/o failed: {0}")]
    Io(String),
    /// A persisted artifact could not be parsed.
    #[error("key artifact malformed: {0}")]
    Malformed(String),
    /// Persisted key material is internally inconsistent.
    #[error("key material inconsistent: {0}")]
    Inconsistent(String),
    /// Token signing failed.
    #[error("grant signing failed: {0}")]
    Signing(String),
}

// ============================================================================
// SECTION: Key Manager
// ============================================================================

/// Owner of the issuer's signing key pair and its JWKS representation.
///
/// # Invariants
/// - The in-memory signing key always matches the persisted artifacts.
/// - `kid` is stable for the lifetime of the persisted key.
pub struct KeyManager {
    /// Prepared JWT encoding key (PKCS#8 form of the signing key).
    encoding_key: EncodingKey,
    /// Public JWK record served in the JWKS document.
    public_jwk: PublicJwk,
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("public_jwk", &self.public_jwk)
            .finish_non_exhaustive()
    }
}

impl KeyManager {
    /// Loads the persisted key pair or generates and persists a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::PartialKeyMaterial`] when exactly one artifact is
    /// present, [`KeyError::Malformed`] or [`KeyError::Inconsistent`] when
    /// artifacts cannot be used, and [`KeyError::Io`] on filesystem failure.
    pub fn load_or_generate(dir: &Path) -> Result<Self, KeyError> {
        fs::create_dir_all(dir).map_err(|err| KeyError::Io(err.to_string()))?;
        let private_path = dir.join(PRIVATE_KEY_FILE);
        let public_path = dir.join(PUBLIC_KEY_FILE);
        match (private_path.exists(), public_path.exists()) {
            (true, true) => Self::load(&private_path, &public_path),
            (false, false) => Self::generate(dir, &private_path, &public_path),
            (true, false) => Err(KeyError::PartialKeyMaterial {
                present: PRIVATE_KEY_FILE.to_string(),
                missing: PUBLIC_KEY_FILE.to_string(),
            }),
            (false, true) => Err(KeyError::PartialKeyMaterial {
                present: PUBLIC_KEY_FILE.to_string(),
                missing: PRIVATE_KEY_FILE.to_string(),
            }),
        }
    }

    /// Returns the stable key identifier.
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.public_jwk.kid
    }

    /// Returns the published JWKS document.
    #[must_use]
    pub fn public_jwks(&self) -> Jwks {
        Jwks {
            keys: vec![self.public_jwk.clone()],
        }
    }

    /// Signs a claim object into a compact EdDSA JWT.
    ///
    /// The payload gains `iat` (now) and `exp` (now + `ttl_seconds`); the
    /// header carries the algorithm and `kid`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Signing`] when the claims are not a JSON object
    /// or encoding fails.
    pub fn sign<T: Serialize>(&self, claims: &T, ttl_seconds: u64) -> Result<String, KeyError> {
        let value =
            serde_json::to_value(claims).map_err(|err| KeyError::Signing(err.to_string()))?;
        let Value::Object(mut payload) = value else {
            return Err(KeyError::Signing("claims must serialize to a json object".to_string()));
        };
        let now = now_unix();
        payload.insert("iat".to_string(), Value::from(now));
        payload.insert("exp".to_string(), Value::from(now + ttl_seconds));
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.public_jwk.kid.clone());
        jsonwebtoken::encode(&header, &payload, &self.encoding_key)
            .map_err(|err| KeyError::Signing(err.to_string()))
    }

    /// Loads an existing key pair from its two artifacts.
    fn load(private_path: &Path, public_path: &Path) -> Result<Self, KeyError> {
        let private_json =
            fs::read_to_string(private_path).map_err(|err| KeyError::Io(err.to_string()))?;
        let public_json =
            fs::read_to_string(public_path).map_err(|err| KeyError::Io(err.to_string()))?;
        let private_jwk: PrivateJwk =
            serde_json::from_str(&private_json).map_err(|err| KeyError::Malformed(err.to_string()))?;
        let public_jwk: PublicJwk =
            serde_json::from_str(&public_json).map_err(|err| KeyError::Malformed(err.to_string()))?;
        let signing_key = decode_signing_key(&private_jwk.d)?;
        let derived_x = encode_public_key(&signing_key.verifying_key());
        if derived_x != public_jwk.x {
            return Err(KeyError::Inconsistent(
                "public artifact does not match the private key".to_string(),
            ));
        }
        if private_jwk.kid != public_jwk.kid {
            return Err(KeyError::Inconsistent(
                "private and public artifacts carry different kids".to_string(),
            ));
        }
        let encoding_key = build_encoding_key(&signing_key)?;
        Ok(Self {
            encoding_key,
            public_jwk,
        })
    }

    /// Generates a fresh key pair and persists both artifacts atomically.
    fn generate(dir: &Path, private_path: &Path, public_path: &Path) -> Result<Self, KeyError> {
        let signing_key = SigningKey::generate(&mut OsRng);
        let x = encode_public_key(&signing_key.verifying_key());
        let kid = derive_kid(&x)?;
        let public_jwk = PublicJwk {
            kty: JWK_KTY.to_string(),
            crv: JWK_CRV.to_string(),
            x: x.clone(),
            kid: kid.clone(),
            key_use: "sig".to_string(),
            alg: JWK_ALG.to_string(),
        };
        let private_jwk = PrivateJwk {
            kty: JWK_KTY.to_string(),
            crv: JWK_CRV.to_string(),
            x,
            d: URL_SAFE_NO_PAD.encode(signing_key.to_bytes()),
            kid,
        };
        persist_pair(dir, private_path, public_path, &private_jwk, &public_jwk)?;
        let encoding_key = build_encoding_key(&signing_key)?;
        Ok(Self {
            encoding_key,
            public_jwk,
        })
    }
}

// ============================================================================
// SECTION: Key Material Helpers
// ============================================================================

/// Decodes a base64url seed into an Ed25519 signing key.
fn decode_signing_key(d: &str) -> Result<SigningKey, KeyError> {
    let seed = URL_SAFE_NO_PAD.decode(d).map_err(|err| KeyError::Malformed(err.to_string()))?;
    let seed: [u8; 32] = seed
        .try_into()
        .map_err(|_| KeyError::Malformed("private key seed must be 32 bytes".to_string()))?;
    Ok(SigningKey::from_bytes(&seed))
}

/// Encodes a verifying key as base64url JWK `x` coordinate.
fn encode_public_key(key: &VerifyingKey) -> String {
    URL_SAFE_NO_PAD.encode(key.to_bytes())
}

/// Derives the truncated RFC 7638 thumbprint used as the key identifier.
fn derive_kid(x: &str) -> Result<String, KeyError> {
    let input = ThumbprintInput {
        crv: JWK_CRV,
        kty: JWK_KTY,
        x,
    };
    let digest =
        sha256_canonical_json(&input).map_err(|err| KeyError::Malformed(err.to_string()))?;
    let mut thumbprint = URL_SAFE_NO_PAD.encode(digest);
    thumbprint.truncate(KID_LENGTH);
    Ok(thumbprint)
}

/// Builds the JWT encoding key from the signing key's PKCS#8 form.
fn build_encoding_key(signing_key: &SigningKey) -> Result<EncodingKey, KeyError> {
    let document =
        signing_key.to_pkcs8_der().map_err(|err| KeyError::Signing(err.to_string()))?;
    Ok(EncodingKey::from_ed_der(document.as_bytes()))
}

// ============================================================================
// SECTION: Crash-Safe Persistence
// ============================================================================

/// Writes both artifacts to temporary files, syncs, then promotes by rename.
fn persist_pair(
    dir: &Path,
    private_path: &Path,
    public_path: &Path,
    private_jwk: &PrivateJwk,
    public_jwk: &PublicJwk,
) -> Result<(), KeyError> {
    let private_tmp = write_temp_json(dir, private_jwk)?;
    let public_tmp = write_temp_json(dir, public_jwk)?;
    private_tmp.persist(private_path).map_err(|err| KeyError::Io(err.to_string()))?;
    public_tmp.persist(public_path).map_err(|err| KeyError::Io(err.to_string()))?;
    Ok(())
}

/// Writes a JSON artifact to a synced temporary file in the target directory.
fn write_temp_json<T: Serialize>(dir: &Path, value: &T) -> Result<NamedTempFile, KeyError> {
    let json =
        serde_json::to_string_pretty(value).map_err(|err| KeyError::Malformed(err.to_string()))?;
    let mut file = NamedTempFile::new_in(dir).map_err(|err| KeyError::Io(err.to_string()))?;
    file.write_all(json.as_bytes()).map_err(|err| KeyError::Io(err.to_string()))?;
    file.as_file().sync_all().map_err(|err| KeyError::Io(err.to_string()))?;
    Ok(file)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests;
