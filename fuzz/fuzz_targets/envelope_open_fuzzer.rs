//! Fuzz target for sealed envelope opening
//!
//! Envelopes arrive from the server as base64 text and are opened with the
//! user's private key (HIGH priority)
//!
//! # Strategy
//!
//! - Raw bytes: arbitrary data through every open path
//! - Mutated envelopes: valid envelopes with one byte changed
//! - Version confusion: valid bodies behind a forged version byte
//!
//! # Invariants
//!
//! - Opening NEVER panics
//! - A mutated envelope NEVER opens
//! - An unmodified envelope opens to the sealed plaintext
//! - `open` never opens an authenticated envelope

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealchat_crypto::{
    SealRandomness, envelope_kind, generate_key_pair, open, open_any, open_authenticated, seal,
    seal_authenticated,
};

#[derive(Debug, Clone, Arbitrary)]
enum EnvelopeInput {
    RawBytes { bytes: Vec<u8> },
    Mutated { plaintext: Vec<u8>, authenticated: bool, index: u16, xor: u8 },
    ForgedVersion { plaintext: Vec<u8>, version: u8 },
}

#[derive(Debug, Clone, Arbitrary)]
struct Scenario {
    recipient_seed: [u8; 32],
    sender_seed: [u8; 32],
    ephemeral_seed: [u8; 32],
    nonce: [u8; 24],
    input: EnvelopeInput,
}

fuzz_target!(|scenario: Scenario| {
    let recipient = generate_key_pair(scenario.recipient_seed);
    let sender = generate_key_pair(scenario.sender_seed);
    let randomness =
        || SealRandomness { ephemeral_seed: scenario.ephemeral_seed, nonce: scenario.nonce };

    match scenario.input {
        EnvelopeInput::RawBytes { bytes } => {
            let _ = open(&bytes, &recipient.private_key);
            let _ = open_authenticated(&bytes, &recipient.private_key, &sender.public_key);
            let _ = open_any(&bytes, &recipient.private_key, None);
            let _ = open_any(&bytes, &recipient.private_key, Some(&sender.public_key));
            let _ = envelope_kind(&bytes);
        },

        EnvelopeInput::Mutated { plaintext, authenticated, index, xor } => {
            let sealed = if authenticated {
                seal_authenticated(
                    &plaintext,
                    &recipient.public_key,
                    &sender.private_key,
                    randomness(),
                )
            } else {
                seal(&plaintext, &recipient.public_key, randomness())
            };
            // Sealing only fails for low-order keys.
            let Ok(mut envelope) = sealed else { return };

            let opened = open_any(&envelope, &recipient.private_key, Some(&sender.public_key));
            assert_eq!(opened.as_deref(), Ok(plaintext.as_slice()), "untouched envelope must open");

            if xor == 0 {
                return;
            }
            let index = usize::from(index) % envelope.len();
            envelope[index] ^= xor;
            assert!(
                open_any(&envelope, &recipient.private_key, Some(&sender.public_key)).is_err(),
                "mutated envelope opened"
            );
        },

        EnvelopeInput::ForgedVersion { plaintext, version } => {
            let Ok(mut envelope) = seal_authenticated(
                &plaintext,
                &recipient.public_key,
                &sender.private_key,
                randomness(),
            ) else {
                return;
            };
            assert!(open(&envelope, &recipient.private_key).is_err(), "open accepted v2");

            envelope[0] = version;
            if version != 0x02 {
                assert!(
                    open_any(&envelope, &recipient.private_key, Some(&sender.public_key)).is_err(),
                    "forged version opened"
                );
            }
        },
    }
});
