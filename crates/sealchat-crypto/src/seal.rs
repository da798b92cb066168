//! Sealed envelopes for chat payloads
//!
//! Public-key sealed encryption: only the holder of the recipient private key
//! can open an envelope. Each seal uses a fresh ephemeral X25519 key pair, so
//! the sender cannot open their own envelopes afterwards (the sender keeps
//! the plaintext locally instead).
//!
//! Two envelope kinds share one wire format:
//!
//! ```text
//! [version:1][ephemeral_pk:32][nonce:24][XChaCha20-Poly1305 ciphertext + tag:16]
//! ```
//!
//! - `0x01` anonymous: key = HKDF(DH(eph, recipient)). Reveals nothing about
//!   the sender and does not authenticate them.
//! - `0x02` authenticated: key = HKDF(DH(eph, recipient) || DH(sender,
//!   recipient)). Opening requires the claimed sender's public key and fails
//!   if the envelope came from anyone else.
//!
//! The header (version, ephemeral key, nonce) is bound as associated data.

use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::{
    error::CryptoError,
    keys::{KEY_SIZE, PrivateKey, PublicKey},
};

/// `XChaCha20` nonce size (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Poly1305 tag size (16 bytes)
const TAG_SIZE: usize = 16;

/// Version byte, ephemeral public key and nonce.
const HEADER_SIZE: usize = 1 + KEY_SIZE + NONCE_SIZE;

/// Bytes added to a plaintext by sealing.
pub const SEAL_OVERHEAD: usize = HEADER_SIZE + TAG_SIZE;

const ANONYMOUS_LABEL: &[u8] = b"sealchat seal v1";
const AUTHENTICATED_LABEL: &[u8] = b"sealchat authseal v1";

/// Envelope kind, encoded in the first byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Sender is not bound to the ciphertext.
    Anonymous,
    /// Sender's static key is mixed into the key schedule.
    Authenticated,
}

impl EnvelopeKind {
    fn version(self) -> u8 {
        match self {
            Self::Anonymous => 0x01,
            Self::Authenticated => 0x02,
        }
    }

    fn from_version(version: u8) -> Option<Self> {
        match version {
            0x01 => Some(Self::Anonymous),
            0x02 => Some(Self::Authenticated),
            _ => None,
        }
    }
}

/// Caller-provided randomness for one seal operation.
///
/// Both values MUST be fresh cryptographically secure random bytes in
/// production. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SealRandomness {
    /// Seed for the ephemeral X25519 secret.
    pub ephemeral_seed: [u8; KEY_SIZE],
    /// `XChaCha20` nonce.
    pub nonce: [u8; NONCE_SIZE],
}

impl std::fmt::Debug for SealRandomness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealRandomness(<redacted>)")
    }
}

/// Parsed view of an envelope.
struct Envelope<'a> {
    kind: EnvelopeKind,
    ephemeral: PublicKey,
    nonce: [u8; NONCE_SIZE],
    header: &'a [u8],
    body: &'a [u8],
}

/// Kind of an envelope, `None` if the bytes are not a recognised envelope.
pub fn envelope_kind(ciphertext: &[u8]) -> Option<EnvelopeKind> {
    ciphertext.first().copied().and_then(EnvelopeKind::from_version)
}

/// Seal `plaintext` so only the holder of `recipient`'s private key can open
/// it. The sender stays anonymous.
///
/// # Errors
///
/// - `InvalidKey` if `recipient` is a low-order point
pub fn seal(
    plaintext: &[u8],
    recipient: &PublicKey,
    randomness: SealRandomness,
) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = PrivateKey::from_bytes(randomness.ephemeral_seed);
    let ephemeral_public = ephemeral.public_key();

    let shared = agree(&ephemeral, recipient).ok_or_else(low_order_recipient)?;
    let key = derive_envelope_key(
        ANONYMOUS_LABEL,
        &[&shared],
        &[ephemeral_public.as_bytes(), recipient.as_bytes()],
    );

    seal_with_key(EnvelopeKind::Anonymous, &key, &ephemeral_public, randomness.nonce, plaintext)
}

/// Seal `plaintext` for `recipient`, binding the sender's static key.
///
/// The recipient must know the sender's public key to open the envelope
/// (see [`open_authenticated`]).
pub fn seal_authenticated(
    plaintext: &[u8],
    recipient: &PublicKey,
    sender: &PrivateKey,
    randomness: SealRandomness,
) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = PrivateKey::from_bytes(randomness.ephemeral_seed);
    let ephemeral_public = ephemeral.public_key();
    let sender_public = sender.public_key();

    let ephemeral_shared = agree(&ephemeral, recipient).ok_or_else(low_order_recipient)?;
    let static_shared = agree(sender, recipient).ok_or_else(low_order_recipient)?;
    let key = derive_envelope_key(
        AUTHENTICATED_LABEL,
        &[&ephemeral_shared, &static_shared],
        &[ephemeral_public.as_bytes(), sender_public.as_bytes(), recipient.as_bytes()],
    );

    seal_with_key(EnvelopeKind::Authenticated, &key, &ephemeral_public, randomness.nonce, plaintext)
}

/// Open an anonymous envelope with our own private key.
///
/// The matching public key is recomputed from the private key.
///
/// # Errors
///
/// - `UnsupportedEnvelope` for authenticated envelopes (use
///   [`open_authenticated`])
/// - `Decryption` if the envelope is malformed or not sealed for this key
pub fn open(ciphertext: &[u8], own: &PrivateKey) -> Result<Vec<u8>, CryptoError> {
    let envelope = parse(ciphertext)?;
    if envelope.kind != EnvelopeKind::Anonymous {
        return Err(CryptoError::UnsupportedEnvelope { version: envelope.kind.version() });
    }

    let own_public = own.public_key();
    let shared = agree(own, &envelope.ephemeral).ok_or_else(low_order_envelope)?;
    let key = derive_envelope_key(
        ANONYMOUS_LABEL,
        &[&shared],
        &[envelope.ephemeral.as_bytes(), own_public.as_bytes()],
    );

    open_with_key(&key, &envelope)
}

/// Open an authenticated envelope claimed to come from `sender`.
///
/// # Errors
///
/// - `UnsupportedEnvelope` for anonymous envelopes
/// - `Decryption` if malformed, not for us, or not sealed by `sender`
pub fn open_authenticated(
    ciphertext: &[u8],
    own: &PrivateKey,
    sender: &PublicKey,
) -> Result<Vec<u8>, CryptoError> {
    let envelope = parse(ciphertext)?;
    if envelope.kind != EnvelopeKind::Authenticated {
        return Err(CryptoError::UnsupportedEnvelope { version: envelope.kind.version() });
    }

    let own_public = own.public_key();
    let ephemeral_shared = agree(own, &envelope.ephemeral).ok_or_else(low_order_envelope)?;
    let static_shared = agree(own, sender).ok_or_else(low_order_envelope)?;
    let key = derive_envelope_key(
        AUTHENTICATED_LABEL,
        &[&ephemeral_shared, &static_shared],
        &[envelope.ephemeral.as_bytes(), sender.as_bytes(), own_public.as_bytes()],
    );

    open_with_key(&key, &envelope)
}

/// Open either envelope kind.
///
/// Authenticated envelopes require `sender`; without it they fail with
/// `Decryption`.
pub fn open_any(
    ciphertext: &[u8],
    own: &PrivateKey,
    sender: Option<&PublicKey>,
) -> Result<Vec<u8>, CryptoError> {
    match (envelope_kind(ciphertext), sender) {
        (Some(EnvelopeKind::Authenticated), Some(sender)) => {
            open_authenticated(ciphertext, own, sender)
        },
        (Some(EnvelopeKind::Authenticated), None) => Err(CryptoError::Decryption {
            reason: "sender key required for authenticated envelope".to_string(),
        }),
        _ => open(ciphertext, own),
    }
}

fn parse(ciphertext: &[u8]) -> Result<Envelope<'_>, CryptoError> {
    if ciphertext.len() < SEAL_OVERHEAD {
        return Err(CryptoError::Decryption {
            reason: format!(
                "envelope too short: {} bytes, need at least {SEAL_OVERHEAD}",
                ciphertext.len()
            ),
        });
    }

    let (header, body) = ciphertext.split_at(HEADER_SIZE);
    let kind = EnvelopeKind::from_version(header[0])
        .ok_or(CryptoError::UnsupportedEnvelope { version: header[0] })?;

    let mut ephemeral = [0u8; KEY_SIZE];
    ephemeral.copy_from_slice(&header[1..=KEY_SIZE]);

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&header[1 + KEY_SIZE..]);

    Ok(Envelope { kind, ephemeral: PublicKey::from_bytes(ephemeral), nonce, header, body })
}

/// X25519 agreement. `None` if the peer key is a low-order point.
fn agree(own: &PrivateKey, peer: &PublicKey) -> Option<Zeroizing<[u8; KEY_SIZE]>> {
    let shared = own.to_dalek().diffie_hellman(&peer.to_dalek());
    shared.was_contributory().then(|| Zeroizing::new(shared.to_bytes()))
}

/// Derive the 32-byte envelope key.
///
/// `ikm` is the concatenation of the DH outputs; `info` is the label followed
/// by every public key involved, so keys are bound to their participants.
fn derive_envelope_key(
    label: &[u8],
    shared: &[&Zeroizing<[u8; KEY_SIZE]>],
    context: &[&[u8; KEY_SIZE]],
) -> Zeroizing<[u8; 32]> {
    let mut ikm = Zeroizing::new(Vec::with_capacity(shared.len() * KEY_SIZE));
    for secret in shared {
        ikm.extend_from_slice(secret.as_slice());
    }

    let mut info = Vec::with_capacity(label.len() + context.len() * KEY_SIZE);
    info.extend_from_slice(label);
    for key in context {
        info.extend_from_slice(key.as_slice());
    }

    let hkdf = Hkdf::<Sha256>::new(None, &ikm);
    let mut key = Zeroizing::new([0u8; 32]);
    let Ok(()) = hkdf.expand(&info, &mut *key) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };

    key
}

fn seal_with_key(
    kind: EnvelopeKind,
    key: &[u8; 32],
    ephemeral_public: &PublicKey,
    nonce: [u8; NONCE_SIZE],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut out = Vec::with_capacity(SEAL_OVERHEAD + plaintext.len());
    out.push(kind.version());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&nonce);

    let cipher = XChaCha20Poly1305::new(key.into());
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce), Payload { msg: plaintext, aad: &out })
        .map_err(|_| CryptoError::Encryption { reason: "payload too large".to_string() })?;

    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open_with_key(key: &[u8; 32], envelope: &Envelope<'_>) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(
            XNonce::from_slice(&envelope.nonce),
            Payload { msg: envelope.body, aad: envelope.header },
        )
        .map_err(|_| CryptoError::Decryption { reason: "authentication failed".to_string() })
}

fn low_order_recipient() -> CryptoError {
    CryptoError::InvalidKey { reason: "recipient key is a low-order point".to_string() }
}

fn low_order_envelope() -> CryptoError {
    CryptoError::Decryption { reason: "envelope key is a low-order point".to_string() }
}
