//! Session scenarios over an in-memory backend.
//!
//! Devices share one fake backend: the real-time channel stores what it is
//! given under a server id, and the API serves it back. Each device has its
//! own storage and a seeded RNG; all of them read one shared wall clock.

use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use std::{collections::HashMap, time::Instant};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use sealchat_client::{
    Api, ClientError, Environment, Realtime, Session, SessionConfig, SessionUpdate, TransportError,
};
use sealchat_crypto::{CryptoError, PublicKey};
use sealchat_proto::{
    Chat, ChatItem, FilePayload, InboundEvent, MediaFile, Message, MessageStatus, OutboundEvent,
    StoredEncryptedMessage,
};
use sealchat_store::{KeyVaultStore, LocalStore, MemoryStorage, Storage, StorageError, VaultConfig};

const CHAT: &str = "chat-ab";
const PASSWORD: &str = "correct horse";

#[derive(Clone)]
struct Clock(Arc<Mutex<DateTime<Utc>>>);

impl Clock {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(DateTime::from_timestamp(1_790_000_000, 0).unwrap())))
    }

    fn tick(&self) -> DateTime<Utc> {
        let mut now = self.0.lock().unwrap();
        *now += TimeDelta::seconds(1);
        *now
    }
}

#[derive(Clone)]
struct TestEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    clock: Clock,
}

impl TestEnv {
    fn new(seed: u64, clock: Clock) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))), clock }
    }
}

impl Environment for TestEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_clock(&self) -> DateTime<Utc> {
        self.clock.tick()
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap().fill_bytes(buffer);
    }
}

#[derive(Default)]
struct BackendState {
    public_keys: HashMap<String, String>,
    messages: Vec<Message>,
    media: Vec<MediaFile>,
    chats: Vec<Chat>,
    next_id: u64,
    offline: bool,
}

#[derive(Clone)]
struct Backend {
    state: Arc<Mutex<BackendState>>,
    clock: Clock,
}

impl Backend {
    fn state(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap()
    }

    fn check_online(state: &BackendState) -> Result<(), TransportError> {
        if state.offline { Err(TransportError::new("backend offline")) } else { Ok(()) }
    }

    fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    fn publish_key(&self, user_id: &str, key: &PublicKey) {
        self.state().public_keys.insert(user_id.to_string(), key.to_base64());
    }

    fn mark_seen(&self, chat_id: &str) {
        for message in self.state().messages.iter_mut().filter(|m| m.chat_id == chat_id) {
            message.status = Some(MessageStatus::Seen);
        }
    }

    fn stored_messages(&self) -> Vec<Message> {
        self.state().messages.clone()
    }

    fn last_message(&self) -> Message {
        self.state().messages.last().cloned().unwrap()
    }

    fn push_message(&self, message: Message) {
        self.state().messages.push(message);
    }

    fn add_chat(&self, user1: &str, user2: &str) {
        let updated_at = self.clock.tick();
        self.state().chats.push(Chat {
            id: CHAT.to_string(),
            user1: user1.to_string(),
            user2: user2.to_string(),
            updated_at,
            last_message: None,
            last_sender_id: None,
            unread_count: None,
        });
    }
}

#[async_trait]
impl Api for Backend {
    async fn chats(&self) -> Result<Vec<Chat>, TransportError> {
        let state = self.state();
        Self::check_online(&state)?;
        Ok(state.chats.clone())
    }

    async fn messages(&self, chat_id: &str) -> Result<Vec<Message>, TransportError> {
        let state = self.state();
        Self::check_online(&state)?;
        Ok(state.messages.iter().filter(|m| m.chat_id == chat_id).cloned().collect())
    }

    async fn media(&self, chat_id: &str) -> Result<Vec<MediaFile>, TransportError> {
        let state = self.state();
        Self::check_online(&state)?;
        Ok(state.media.iter().filter(|m| m.chat_id == chat_id).cloned().collect())
    }

    async fn public_key(&self, user_id: &str) -> Result<String, TransportError> {
        let state = self.state();
        Self::check_online(&state)?;
        state
            .public_keys
            .get(user_id)
            .cloned()
            .ok_or_else(|| TransportError::new(format!("no public key for {user_id}")))
    }
}

/// Real-time channel that hands everything to the backend.
#[derive(Clone)]
struct Channel {
    backend: Backend,
}

#[async_trait]
impl Realtime for Channel {
    async fn emit(&self, event: &OutboundEvent) -> Result<(), TransportError> {
        let created_at = self.backend.clock.tick();
        let mut state = self.backend.state();
        Backend::check_online(&state)?;

        state.next_id += 1;
        let id = state.next_id;
        match event {
            OutboundEvent::SendMessage(message) => state.messages.push(Message {
                id: format!("msg-{id}"),
                status: Some(MessageStatus::Delivered),
                ..message.clone()
            }),
            OutboundEvent::SendMedia(upload) => state.media.push(MediaFile {
                id: format!("media-{id}"),
                chat_id: upload.chat_id.clone(),
                sender_id: upload.sender_id.clone(),
                receiver_id: upload.receiver_id.clone(),
                file_name: upload.file.name.clone(),
                file_type: upload.file.mime_type.clone(),
                file_size: upload.file.size,
                url: format!("/uploads/{id}/{}", upload.file.name),
                created_at,
            }),
        }
        Ok(())
    }
}

/// Storage whose message writes can be switched off.
#[derive(Clone)]
struct FlakyStorage {
    inner: MemoryStorage,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyStorage {
    fn new() -> Self {
        Self { inner: MemoryStorage::new(), fail_writes: Arc::new(AtomicBool::new(false)) }
    }

    fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl Storage for FlakyStorage {
    fn put_message(&self, record: &StoredEncryptedMessage) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Io("disk full".to_string()));
        }
        self.inner.put_message(record)
    }

    fn messages_for_chat(
        &self,
        chat_id: &str,
    ) -> Result<Vec<StoredEncryptedMessage>, StorageError> {
        self.inner.messages_for_chat(chat_id)
    }

    fn delete_message(&self, message_key: &str) -> Result<bool, StorageError> {
        self.inner.delete_message(message_key)
    }

    fn delete_messages_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        self.inner.delete_messages_before(cutoff)
    }

    fn put_meta(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.inner.put_meta(key, value)
    }

    fn get_meta(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.inner.get_meta(key)
    }

    fn delete_meta(&self, key: &str) -> Result<(), StorageError> {
        self.inner.delete_meta(key)
    }
}

type Device<S> = Session<TestEnv, S, Backend, Channel>;

fn vault_config() -> VaultConfig {
    VaultConfig { pbkdf2_iterations: 1_000 }
}

struct World {
    backend: Backend,
    clock: Clock,
}

impl World {
    fn new() -> Self {
        let clock = Clock::new();
        let backend =
            Backend { state: Arc::new(Mutex::new(BackendState::default())), clock: clock.clone() };
        Self { backend, clock }
    }

    fn device<S: Storage>(&self, seed: u64, storage: S) -> Device<S> {
        Session::new(
            TestEnv::new(seed, self.clock.clone()),
            SessionConfig::default(),
            storage,
            vault_config(),
            self.backend.clone(),
            Channel { backend: self.backend.clone() },
        )
    }

    /// Register `user` on a fresh device, publish the key and log in.
    fn signed_up<S: Storage>(&self, user: &str, seed: u64, storage: S) -> Device<S> {
        let mut device = self.device(seed, storage);
        let public_key = device.register(user, PASSWORD).unwrap();
        self.backend.publish_key(user, &public_key);
        device.login(user, PASSWORD).unwrap();
        device
    }

    fn alice(&self) -> Device<MemoryStorage> {
        self.signed_up("alice", 1, MemoryStorage::new())
    }

    fn bob(&self) -> Device<MemoryStorage> {
        self.signed_up("bob", 2, MemoryStorage::new())
    }
}

fn texts(items: &[ChatItem]) -> Vec<&str> {
    items
        .iter()
        .filter_map(ChatItem::as_message)
        .map(|m| m.plaintext.as_deref().unwrap_or_default())
        .collect()
}

fn timeline_texts<S: Storage>(device: &Device<S>) -> Vec<String> {
    texts(device.timeline(CHAT).unwrap_or_default()).into_iter().map(str::to_string).collect()
}

fn only_message<S: Storage>(device: &Device<S>) -> Message {
    let items = device.timeline(CHAT).unwrap();
    assert_eq!(items.len(), 1, "expected exactly one item, got {items:?}");
    items[0].as_message().cloned().unwrap()
}

fn local_records(storage: &MemoryStorage, user: &str) -> Vec<Message> {
    let keys = KeyVaultStore::new(storage.clone(), vault_config()).unlock(user, PASSWORD).unwrap();
    LocalStore::new(storage.clone(), keys.storage_key).load_messages(CHAT).unwrap()
}

#[tokio::test]
async fn hola_reaches_the_peer_as_ciphertext_only() {
    let world = World::new();
    let mut alice = world.alice();
    let mut bob = world.bob();

    let updates = alice.send_text(CHAT, "bob", "hola").await.unwrap();
    assert!(updates.iter().any(|u| matches!(
        u,
        SessionUpdate::Timeline { chat_id, items } if chat_id == CHAT && texts(items) == ["hola"]
    )));

    let optimistic = only_message(&alice);
    assert!(optimistic.is_optimistic());
    assert_eq!(optimistic.status, None);

    let on_server = world.backend.last_message();
    assert_eq!(on_server.plaintext, None);
    assert!(!on_server.ciphertext.contains("hola"));
    assert_eq!(on_server.nonce, optimistic.nonce);

    bob.open_chat(CHAT).await.unwrap();
    let received = only_message(&bob);
    assert_eq!(received.id, on_server.id);
    assert_eq!(received.plaintext.as_deref(), Some("hola"));
}

#[tokio::test]
async fn seen_status_flows_back_into_the_local_record() {
    let world = World::new();
    let storage = MemoryStorage::new();
    let mut alice = world.signed_up("alice", 1, storage.clone());
    world.bob();

    alice.send_text(CHAT, "bob", "hola").await.unwrap();
    world.backend.mark_seen(CHAT);
    alice.load_chat(CHAT).await.unwrap();

    let merged = only_message(&alice);
    assert_eq!(merged.plaintext.as_deref(), Some("hola"));
    assert_eq!(merged.status, Some(MessageStatus::Seen));

    let records = local_records(&storage, "alice");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, Some(MessageStatus::Seen));
    assert_eq!(records[0].plaintext.as_deref(), Some("hola"));
    assert_eq!(records[0].server_id.as_deref(), Some(world.backend.last_message().id.as_str()));
}

#[tokio::test]
async fn live_echo_updates_once_and_duplicates_are_dropped() {
    let world = World::new();
    let mut alice = world.alice();
    let mut bob = world.bob();
    bob.open_chat(CHAT).await.unwrap();

    alice.send_text(CHAT, "bob", "hola").await.unwrap();
    let delivered = world.backend.last_message();

    for _ in 0..2 {
        alice.on_inbound(InboundEvent::ReceiveMessage(delivered.clone())).await.unwrap();
        bob.on_inbound(InboundEvent::ReceiveMessage(delivered.clone())).await.unwrap();
    }

    let echoed = only_message(&alice);
    assert_eq!(echoed.status, Some(MessageStatus::Delivered));
    assert_eq!(echoed.plaintext.as_deref(), Some("hola"));
    assert_eq!(timeline_texts(&bob), ["hola"]);
}

#[tokio::test]
async fn undecryptable_message_is_localized_to_a_placeholder() {
    let world = World::new();
    let mut alice = world.alice();
    let mut bob = world.bob();

    world.backend.push_message(Message {
        id: "msg-garbage".to_string(),
        chat_id: CHAT.to_string(),
        sender_id: "bob".to_string(),
        receiver_id: "alice".to_string(),
        ciphertext: "not an envelope".to_string(),
        plaintext: None,
        created_at: world.clock.tick(),
        status: Some(MessageStatus::Delivered),
        nonce: None,
        server_id: None,
    });
    bob.send_text(CHAT, "alice", "still readable").await.unwrap();

    alice.load_chat(CHAT).await.unwrap();
    let placeholder = SessionConfig::default().decrypt_failure_placeholder;
    assert_eq!(timeline_texts(&alice), [placeholder.as_str(), "still readable"]);
}

#[tokio::test]
async fn notification_fetches_the_announced_message() {
    let world = World::new();
    let mut alice = world.alice();
    let mut bob = world.bob();
    bob.open_chat(CHAT).await.unwrap();

    alice.send_text(CHAT, "bob", "hola").await.unwrap();
    let announced = world.backend.last_message();
    bob.on_inbound(InboundEvent::NewMessageNotification {
        chat_id: CHAT.to_string(),
        message_id: announced.id.clone(),
    })
    .await
    .unwrap();

    assert_eq!(timeline_texts(&bob), ["hola"]);
    assert_eq!(
        bob.decrypt_notification(&announced.ciphertext, Some("alice")).await.unwrap(),
        "hola"
    );
    assert_eq!(
        bob.decrypt_notification("garbage", Some("alice")).await.unwrap(),
        SessionConfig::default().decrypt_failure_placeholder
    );
}

#[tokio::test]
async fn background_chat_counts_unread_until_opened() {
    let world = World::new();
    world.backend.add_chat("alice", "bob");
    let mut alice = world.alice();
    let mut bob = world.bob();
    bob.refresh_chats().await.unwrap();

    alice.send_text(CHAT, "bob", "hola").await.unwrap();
    bob.on_inbound(InboundEvent::ReceiveMessage(world.backend.last_message())).await.unwrap();

    let chat = &bob.client().unwrap().chats()[0];
    assert_eq!(chat.unread(), 1);
    assert_eq!(chat.last_message.as_deref(), Some("hola"));
    assert_eq!(chat.last_sender_id.as_deref(), Some("alice"));

    let updates = bob.open_chat(CHAT).await.unwrap();
    assert!(
        updates.iter().any(|u| matches!(u, SessionUpdate::Chats(chats) if chats[0].unread() == 0))
    );
    assert_eq!(timeline_texts(&bob), ["hola"]);
}

#[tokio::test]
async fn media_and_text_share_one_timeline() {
    let world = World::new();
    let mut alice = world.alice();
    let mut bob = world.bob();

    alice.send_text(CHAT, "bob", "look").await.unwrap();
    alice
        .send_media(
            CHAT,
            "bob",
            FilePayload {
                name: "cat.png".to_string(),
                mime_type: "image/png".to_string(),
                size: 4,
                data: "iVBO".to_string(),
            },
        )
        .await
        .unwrap();

    bob.open_chat(CHAT).await.unwrap();
    let items = bob.timeline(CHAT).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(texts(items), ["look"]);
    assert!(matches!(&items[1], ChatItem::Media(file) if file.file_name == "cat.png"));
}

#[tokio::test]
async fn presence_changes_are_reported() {
    let world = World::new();
    let mut alice = world.alice();

    let updates = alice
        .on_inbound(InboundEvent::UserStatus {
            user_id: "bob".to_string(),
            online: true,
            last_seen: None,
        })
        .await
        .unwrap();

    assert!(matches!(
        updates.as_slice(),
        [SessionUpdate::Presence { user_id, presence }] if user_id == "bob" && presence.online
    ));
    assert!(alice.client().unwrap().presence("bob").unwrap().online);
}

#[tokio::test]
async fn socket_events_are_decoded_before_use() {
    let world = World::new();
    let mut alice = world.alice();

    let updates = alice
        .on_socket_event("user-status", r#"{"userId":"bob","online":true}"#)
        .await
        .unwrap();
    assert!(matches!(updates.as_slice(), [SessionUpdate::Presence { .. }]));

    let err = alice.on_socket_event("typing", "{}").await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
    assert!(!err.is_fatal());

    let err = alice.on_socket_event("receive-message", "not json").await.unwrap_err();
    assert!(matches!(err, ClientError::Protocol(_)));
}

#[tokio::test]
async fn storage_failure_does_not_block_the_view() {
    let world = World::new();
    let storage = FlakyStorage::new();
    let mut alice = world.signed_up("alice", 1, storage.clone());
    world.bob();

    storage.fail_writes(true);
    let updates = alice.send_text(CHAT, "bob", "hola").await.unwrap();

    assert!(updates.iter().any(
        |u| matches!(u, SessionUpdate::StorageFailed { chat_id, .. } if chat_id == CHAT)
    ));
    assert_eq!(timeline_texts(&alice), ["hola"]);
    assert_eq!(world.backend.stored_messages().len(), 1);
}

#[tokio::test]
async fn offline_backend_reports_transport_failures() {
    let world = World::new();
    let mut alice = world.alice();
    world.bob();
    world.backend.set_offline(true);

    let err = alice.send_text(CHAT, "bob", "hola").await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert!(!err.is_fatal());

    let updates = alice.load_chat(CHAT).await.unwrap();
    assert!(updates.iter().any(|u| matches!(u, SessionUpdate::TransportFailed { .. })));
}

#[tokio::test]
async fn unconfirmed_message_can_be_discarded() {
    let world = World::new();
    let storage = MemoryStorage::new();
    let mut alice = world.signed_up("alice", 1, storage.clone());
    world.bob();

    // Key is cached before the channel goes down.
    alice.send_text(CHAT, "bob", "first").await.unwrap();
    world.backend.set_offline(true);

    let updates = alice.send_text(CHAT, "bob", "lost").await.unwrap();
    assert!(updates.iter().any(|u| matches!(u, SessionUpdate::TransportFailed { .. })));
    assert_eq!(timeline_texts(&alice), ["first", "lost"]);

    let pending = alice.timeline(CHAT).unwrap()[1].id().to_string();
    alice.discard_pending(CHAT, &pending).await.unwrap();

    assert_eq!(timeline_texts(&alice), ["first"]);
    let records = local_records(&storage, "alice");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].plaintext.as_deref(), Some("first"));
}

#[tokio::test]
async fn confirmed_message_cannot_be_discarded() {
    let world = World::new();
    let storage = MemoryStorage::new();
    let mut alice = world.signed_up("alice", 1, storage.clone());
    world.bob();

    alice.send_text(CHAT, "bob", "hola").await.unwrap();
    world.backend.mark_seen(CHAT);
    alice.load_chat(CHAT).await.unwrap();
    let confirmed = only_message(&alice);
    assert_eq!(confirmed.status, Some(MessageStatus::Seen));
    assert!(confirmed.is_confirmed());

    alice.discard_pending(CHAT, &confirmed.id).await.unwrap();

    assert_eq!(timeline_texts(&alice), ["hola"]);
    assert_eq!(local_records(&storage, "alice").len(), 1);
    alice.load_chat(CHAT).await.unwrap();
    assert_eq!(timeline_texts(&alice), ["hola"]);
}

#[tokio::test]
async fn own_history_survives_a_password_change() {
    let world = World::new();
    let mut alice = world.alice();
    world.bob();

    alice.send_text(CHAT, "bob", "hola").await.unwrap();
    alice.logout().await;
    alice.change_password("alice", PASSWORD, "battery staple").unwrap();

    alice.login("alice", "battery staple").unwrap();
    alice.load_chat(CHAT).await.unwrap();
    assert_eq!(timeline_texts(&alice), ["hola"]);
}

#[tokio::test]
async fn logout_forgets_keys_and_user() {
    let world = World::new();
    let mut alice = world.alice();
    world.bob();

    alice.send_text(CHAT, "bob", "hola").await.unwrap();
    assert!(!alice.key_cache().is_empty());
    assert_eq!(alice.remembered_user().unwrap().as_deref(), Some("alice"));

    let updates = alice.logout().await;

    assert_eq!(updates, [SessionUpdate::Cleared]);
    assert!(!alice.is_logged_in());
    assert!(alice.key_cache().is_empty());
    assert_eq!(alice.remembered_user().unwrap(), None);
    assert_eq!(alice.send_text(CHAT, "bob", "again").await, Err(ClientError::NotLoggedIn));
}

#[tokio::test]
async fn wrong_password_is_fatal_and_keeps_the_session_closed() {
    let world = World::new();
    let mut device = world.device(1, MemoryStorage::new());
    device.register("alice", PASSWORD).unwrap();

    let err = device.login("alice", "wrong").unwrap_err();
    assert!(matches!(
        err,
        ClientError::Storage(StorageError::Crypto(CryptoError::KeyDerivation { .. }))
    ));
    assert!(err.is_fatal());
    assert!(!device.is_logged_in());

    let err = device.login("mallory", PASSWORD).unwrap_err();
    assert!(matches!(err, ClientError::Storage(StorageError::NotFound { .. })));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn second_registration_is_rejected() {
    let world = World::new();
    let device = world.device(1, MemoryStorage::new());
    device.register("alice", PASSWORD).unwrap();

    let err = device.register("alice", "other").unwrap_err();
    assert!(matches!(err, ClientError::Storage(StorageError::AlreadyExists { .. })));
}
