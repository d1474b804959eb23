//! A fully wired story service over in-memory doubles.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use scribly_notifications::{
    DispatcherConfig, DispatcherHandle, EmailGateway, NotificationDispatcher, RetryPolicy,
};
use scribly_stories::application::command_handlers::StoryService;
use scribly_stories::application::emails::EmailComposer;
use scribly_stories::application::notifier::StoryNotifier;
use scribly_stories::application::verification::TokenCipher;

use crate::clock::ManualClock;
use crate::email::RecordingEmailGateway;
use crate::sleeper::InstantSleeper;
use crate::store::InMemoryStoryStore;

/// Key used for verification tokens in tests.
pub const TEST_TOKEN_KEY: [u8; 32] = [42; 32];

/// Website URL used for links in test emails.
pub const TEST_WEBSITE_URL: &str = "https://scribly.test";

/// Service, store, clock, and dispatcher wired together for behavioural tests.
pub struct StoryHarness {
    /// The service under test.
    pub service: Arc<StoryService>,
    /// The store behind it.
    pub store: Arc<InMemoryStoryStore>,
    /// The clock every component reads.
    pub clock: Arc<ManualClock>,
    /// The sleeper the dispatcher backs off with.
    pub sleeper: Arc<InstantSleeper>,
    /// A cipher sharing the service's key.
    pub cipher: TokenCipher,
    handle: Option<DispatcherHandle>,
}

impl StoryHarness {
    /// The instant every harness clock starts at.
    ///
    /// # Panics
    ///
    /// Never; the date is a valid literal.
    #[must_use]
    pub fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    /// A harness that records every email it sends.
    ///
    /// # Panics
    ///
    /// Panics if the test key is rejected.
    #[must_use]
    pub fn new(emails: Arc<RecordingEmailGateway>) -> Self {
        Self::with_gateway(emails)
    }

    /// A harness sending through any gateway, with the default retry budget
    /// and instant backoff.
    ///
    /// # Panics
    ///
    /// Panics if the test key is rejected.
    #[must_use]
    pub fn with_gateway(gateway: Arc<dyn EmailGateway>) -> Self {
        let store = Arc::new(InMemoryStoryStore::new());
        let clock = Arc::new(ManualClock::new(Self::start_time()));
        let sleeper = Arc::new(InstantSleeper::default());
        let cipher = TokenCipher::new(&TEST_TOKEN_KEY).unwrap();

        let notifier = Arc::new(StoryNotifier::new(
            store.clone(),
            EmailComposer::new(TEST_WEBSITE_URL),
            gateway,
            cipher.clone(),
            clock.clone(),
        ));
        let config = DispatcherConfig {
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
            ..DispatcherConfig::default()
        };
        let (dispatcher, handle) =
            NotificationDispatcher::spawn(notifier.clone(), config, sleeper.clone());
        let service = Arc::new(StoryService::new(
            store.clone(),
            clock.clone(),
            cipher.clone(),
            notifier,
            dispatcher,
        ));

        Self {
            service,
            store,
            clock,
            sleeper,
            cipher,
            handle: Some(handle),
        }
    }

    /// Waits until every announcement made so far has been delivered or
    /// dropped. Later announcements are dropped.
    pub async fn settle(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.shutdown().await;
        }
    }
}
