//! Shared test doubles and utilities for the Scribly backend.

mod clock;
mod email;
mod harness;
mod rng;
mod sleeper;
mod store;

pub use clock::{FixedClock, ManualClock};
pub use email::{FlakyEmailGateway, RecordingEmailGateway};
pub use harness::{StoryHarness, TEST_TOKEN_KEY, TEST_WEBSITE_URL};
pub use rng::{MockRng, SequenceRng};
pub use sleeper::InstantSleeper;
pub use store::InMemoryStoryStore;
