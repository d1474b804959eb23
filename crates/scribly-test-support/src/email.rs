//! Test email gateways.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use scribly_notifications::{DeliveryError, Email, EmailGateway};
use uuid::Uuid;

/// Accepts every email and keeps it for inspection.
#[derive(Debug, Default)]
pub struct RecordingEmailGateway {
    sent: Mutex<Vec<Email>>,
}

impl RecordingEmailGateway {
    /// Every email sent so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn sent(&self) -> Vec<Email> {
        self.sent.lock().unwrap().clone()
    }

    /// Subjects of the emails addressed to `user_id`, in order.
    pub fn subjects_for(&self, user_id: Uuid) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|e| e.to.user_id == user_id)
            .map(|e| e.subject)
            .collect()
    }

    /// Forgets everything recorded so far.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl EmailGateway for RecordingEmailGateway {
    async fn send_email(&self, email: &Email) -> Result<(), DeliveryError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Rejects the first `failures` sends with a 503, then records like
/// `RecordingEmailGateway`.
#[derive(Debug)]
pub struct FlakyEmailGateway {
    failures: u32,
    attempts: AtomicU32,
    delivered: RecordingEmailGateway,
}

impl FlakyEmailGateway {
    /// Fails `failures` times before succeeding. `u32::MAX` never succeeds.
    #[must_use]
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
            delivered: RecordingEmailGateway::default(),
        }
    }

    /// Sends attempted, failed or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Emails that made it through.
    pub fn delivered(&self) -> Vec<Email> {
        self.delivered.sent()
    }
}

#[async_trait]
impl EmailGateway for FlakyEmailGateway {
    async fn send_email(&self, email: &Email) -> Result<(), DeliveryError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(DeliveryError::Rejected {
                status: 503,
                body: format!("provider unavailable (attempt {attempt})"),
            });
        }
        self.delivered.send_email(email).await
    }
}
