//! Fuzz target for real-time event decoding
//!
//! Event names and JSON bodies come straight off the socket (HIGH priority)
//!
//! # Strategy
//!
//! - Known names with arbitrary bodies
//! - Arbitrary names with arbitrary bodies
//!
//! # Invariants
//!
//! - Decoding NEVER panics
//! - Unknown names are rejected
//! - A decoded event keeps the name it was decoded from

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sealchat_proto::InboundEvent;

const KNOWN: [&str; 4] =
    ["receive-message", "receive-media", "new-message-notification", "user-status"];

#[derive(Debug, Clone, Arbitrary)]
enum EventName {
    Known(u8),
    Other(String),
}

fuzz_target!(|input: (EventName, String)| {
    let (name, body) = input;
    let name = match name {
        EventName::Known(index) => KNOWN[usize::from(index) % KNOWN.len()].to_string(),
        EventName::Other(name) => name,
    };

    if let Ok(event) = InboundEvent::decode(&name, &body) {
        assert_eq!(event.name(), name);
    }
    if !KNOWN.contains(&name.as_str()) {
        assert!(InboundEvent::decode(&name, &body).is_err(), "unknown event {name} decoded");
    }
});
