//! Fire-and-forget notification dispatcher.
//!
//! `announce` only enqueues. A single worker task drains the bounded queue and
//! spawns one delivery task per announcement, with at most
//! `DispatcherConfig::concurrency` deliveries in flight. Each delivery is
//! retried per the `RetryPolicy` and then dropped with an error log; nothing is
//! ever reported back to the announcer.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::email::DeliveryError;
use crate::retry::{RetryPolicy, Sleeper, retry_with_backoff};

/// Something that happened and that participants should hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Announcement {
    /// A user signed up and needs a verification email.
    UserCreated {
        /// The new user.
        user_id: Uuid,
    },
    /// A story left draft; every cowriter was added.
    CowritersAdded {
        /// The story.
        story_id: Uuid,
    },
    /// A turn was committed.
    TurnTaken {
        /// The story.
        story_id: Uuid,
        /// 1-based position of the new turn in the story's history.
        turn_number: usize,
    },
}

impl Announcement {
    /// Type name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UserCreated { .. } => "user_created",
            Self::CowritersAdded { .. } => "cowriters_added",
            Self::TurnTaken { .. } => "turn_taken",
        }
    }
}

impl fmt::Display for Announcement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserCreated { user_id } => write!(f, "user_created(user={user_id})"),
            Self::CowritersAdded { story_id } => write!(f, "cowriters_added(story={story_id})"),
            Self::TurnTaken {
                story_id,
                turn_number,
            } => write!(f, "turn_taken(story={story_id}, turn={turn_number})"),
        }
    }
}

/// The narrow callback the dispatcher runs for each announcement.
///
/// Implementations must recompute recipients and content from persisted state
/// on every call, so a retried attempt is safe even if an earlier one sent some
/// of its emails.
#[async_trait]
pub trait AnnouncementHandler: Send + Sync {
    /// Build and send the notifications for one announcement.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError` if any part of the work failed; the dispatcher
    /// retries the whole call.
    async fn handle(&self, announcement: &Announcement) -> Result<(), DeliveryError>;
}

/// Sizing and retry settings for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Retry budget per announcement.
    pub retry: RetryPolicy,
    /// Announcements that can wait in the queue before new ones are dropped.
    pub queue_capacity: usize,
    /// Deliveries allowed to run at once.
    pub concurrency: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            queue_capacity: 256,
            concurrency: 8,
        }
    }
}

/// Cheap, cloneable entry point used by the story service.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    queue: mpsc::Sender<Announcement>,
}

/// Owns the worker task. Dropping it (or calling `shutdown`) stops intake.
#[derive(Debug)]
pub struct DispatcherHandle {
    stop: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

struct DeliveryContext {
    handler: Arc<dyn AnnouncementHandler>,
    sleeper: Arc<dyn Sleeper>,
    retry: RetryPolicy,
}

impl NotificationDispatcher {
    /// Starts the worker on the current tokio runtime.
    #[must_use]
    pub fn spawn(
        handler: Arc<dyn AnnouncementHandler>,
        config: DispatcherConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> (Self, DispatcherHandle) {
        let (queue, inbox) = mpsc::channel(config.queue_capacity.max(1));
        let (stop, stop_signal) = oneshot::channel();
        let context = Arc::new(DeliveryContext {
            handler,
            sleeper,
            retry: config.retry,
        });
        let slots = Arc::new(Semaphore::new(config.concurrency.max(1)));
        let worker = tokio::spawn(run_worker(inbox, stop_signal, context, slots));

        (Self { queue }, DispatcherHandle { stop, worker })
    }

    /// Schedules notification work and returns immediately.
    ///
    /// If the queue is full or the dispatcher has shut down the announcement is
    /// dropped with a warning; notification loss never fails the caller.
    pub fn announce(&self, announcement: Announcement) {
        match self.queue.try_send(announcement) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!(announcement = %dropped, "notification queue full, dropping announcement");
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                warn!(announcement = %dropped, "notification dispatcher stopped, dropping announcement");
            }
        }
    }
}

impl DispatcherHandle {
    /// Stops accepting announcements, delivers everything already queued, and
    /// waits for in-flight deliveries to finish their retry budgets.
    pub async fn shutdown(self) {
        // The worker may already be gone; either way we just wait for it.
        let _ = self.stop.send(());
        if let Err(err) = self.worker.await {
            error!(error = %err, "notification worker terminated abnormally");
        }
    }
}

async fn run_worker(
    mut inbox: mpsc::Receiver<Announcement>,
    mut stop_signal: oneshot::Receiver<()>,
    context: Arc<DeliveryContext>,
    slots: Arc<Semaphore>,
) {
    let mut in_flight = JoinSet::new();
    let mut stopping = false;

    loop {
        tokio::select! {
            _ = &mut stop_signal, if !stopping => {
                stopping = true;
                inbox.close();
            }
            Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            next = inbox.recv() => {
                let Some(announcement) = next else { break };
                let Ok(permit) = Arc::clone(&slots).acquire_owned().await else { break };
                let context = Arc::clone(&context);
                in_flight.spawn(async move {
                    deliver(&context, &announcement).await;
                    drop(permit);
                });
            }
        }
    }

    while in_flight.join_next().await.is_some() {}
    debug!("notification worker stopped");
}

async fn deliver(context: &DeliveryContext, announcement: &Announcement) {
    let handler = context.handler.as_ref();
    let outcome = retry_with_backoff(&context.retry, context.sleeper.as_ref(), move |_| {
        handler.handle(announcement)
    })
    .await;

    match outcome {
        Ok(((), attempts)) => {
            debug!(kind = announcement.kind(), %announcement, attempts, "notification delivered");
        }
        Err(exhausted) => {
            error!(
                kind = announcement.kind(),
                %announcement,
                attempts = exhausted.attempts,
                error = %exhausted.last_error,
                "notification dropped after exhausting retries"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    struct InstantSleeper;

    #[async_trait]
    impl Sleeper for InstantSleeper {
        async fn sleep(&self, _duration: Duration) {}
    }

    /// Fails the first `failures` calls, then records successes.
    struct FlakyHandler {
        failures: u32,
        calls: AtomicU32,
        delivered: Mutex<Vec<Announcement>>,
    }

    impl FlakyHandler {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                delivered: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl AnnouncementHandler for FlakyHandler {
        async fn handle(&self, announcement: &Announcement) -> Result<(), DeliveryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(DeliveryError::Transport(format!("attempt {call} refused")));
            }
            self.delivered.lock().unwrap().push(announcement.clone());
            Ok(())
        }
    }

    fn spawn_with(handler: Arc<FlakyHandler>) -> (NotificationDispatcher, DispatcherHandle) {
        NotificationDispatcher::spawn(
            handler,
            DispatcherConfig::default(),
            Arc::new(InstantSleeper),
        )
    }

    #[tokio::test]
    async fn test_delivers_once_after_two_failures() {
        // Arrange
        let handler = Arc::new(FlakyHandler::new(2));
        let (dispatcher, handle) = spawn_with(Arc::clone(&handler));
        let announcement = Announcement::TurnTaken {
            story_id: Uuid::new_v4(),
            turn_number: 2,
        };

        // Act
        dispatcher.announce(announcement.clone());
        handle.shutdown().await;

        // Assert
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(*handler.delivered.lock().unwrap(), vec![announcement]);
    }

    #[tokio::test]
    async fn test_gives_up_after_three_attempts() {
        // Arrange
        let handler = Arc::new(FlakyHandler::new(u32::MAX));
        let (dispatcher, handle) = spawn_with(Arc::clone(&handler));

        // Act
        dispatcher.announce(Announcement::CowritersAdded {
            story_id: Uuid::new_v4(),
        });
        handle.shutdown().await;

        // Assert
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert!(handler.delivered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_announce_after_shutdown_is_dropped_silently() {
        // Arrange
        let handler = Arc::new(FlakyHandler::new(0));
        let (dispatcher, handle) = spawn_with(Arc::clone(&handler));
        handle.shutdown().await;

        // Act
        dispatcher.announce(Announcement::UserCreated {
            user_id: Uuid::new_v4(),
        });

        // Assert
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_every_queued_announcement_is_delivered_on_shutdown() {
        // Arrange
        let handler = Arc::new(FlakyHandler::new(0));
        let (dispatcher, handle) = spawn_with(Arc::clone(&handler));
        let story_id = Uuid::new_v4();

        // Act
        for turn_number in 1..=5 {
            dispatcher.announce(Announcement::TurnTaken {
                story_id,
                turn_number,
            });
        }
        handle.shutdown().await;

        // Assert
        let mut delivered: Vec<usize> = handler
            .delivered
            .lock()
            .unwrap()
            .iter()
            .filter_map(|a| match a {
                Announcement::TurnTaken { turn_number, .. } => Some(*turn_number),
                _ => None,
            })
            .collect();
        delivered.sort_unstable();
        assert_eq!(delivered, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_display_names_the_subject() {
        let story_id = Uuid::nil();
        let text = Announcement::TurnTaken {
            story_id,
            turn_number: 4,
        }
        .to_string();

        assert_eq!(text, format!("turn_taken(story={story_id}, turn=4)"));
    }
}
