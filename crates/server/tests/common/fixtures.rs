//! Test fixtures for generating test data and credentials.

use archivo_core::config::AuthConfig;
use archivo_server::auth::Claims;
use bytes::Bytes;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// Boundary used by [`multipart_form`].
pub const MULTIPART_BOUNDARY: &str = "archivo-test-boundary-7MA4YWxkTrZu0gW";

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Compute SHA-256 hash of data as hex string.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

fn now_secs() -> u64 {
    OffsetDateTime::now_utc().unix_timestamp() as u64
}

/// Sign claims with the test secret.
#[allow(dead_code)]
pub fn sign_claims(claims: &Claims, algorithm: Algorithm) -> String {
    let secret = AuthConfig::for_testing().jwt_secret;
    jsonwebtoken::encode(
        &Header::new(algorithm),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .expect("Failed to sign test credential")
}

/// A credential for `sub` with role `tipo`, valid for an hour.
#[allow(dead_code)]
pub fn token_for(sub: i64, tipo: &str) -> String {
    let now = now_secs();
    sign_claims(
        &Claims {
            sub,
            tipo: tipo.to_string(),
            exp: now + 3600,
            iat: Some(now),
            nbf: None,
        },
        Algorithm::HS256,
    )
}

/// A correctly signed credential that expired an hour ago.
#[allow(dead_code)]
pub fn expired_token(sub: i64, tipo: &str) -> String {
    let now = now_secs();
    sign_claims(
        &Claims {
            sub,
            tipo: tipo.to_string(),
            exp: now - 3600,
            iat: Some(now - 7200),
            nbf: None,
        },
        Algorithm::HS256,
    )
}

/// A credential signed with a different secret.
#[allow(dead_code)]
pub fn foreign_token(sub: i64, tipo: &str) -> String {
    let claims = Claims {
        sub,
        tipo: tipo.to_string(),
        exp: now_secs() + 3600,
        iat: None,
        nbf: None,
    };
    jsonwebtoken::encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"some-other-secret"),
    )
    .expect("Failed to sign test credential")
}

/// Build a multipart upload form.
///
/// Returns the `Content-Type` header value and the encoded body. The case
/// field is written first when present.
#[allow(dead_code)]
pub fn multipart_form(case: Option<&str>, filename: &str, data: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::with_capacity(data.len() + 512);
    if let Some(case) = case {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\n\
                 Content-Disposition: form-data; name=\"id_expediente\"\r\n\r\n\
                 {case}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{MULTIPART_BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n\
             Content-Type: application/pdf\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    (
        format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
        body,
    )
}
