//! Adaptive pacing around any [`RecordFetcher`].
//!
//! Every attempt first sleeps for the controller's current interval and
//! then reports whether the server produced a usable answer. The delay is
//! taken before the request, so it reflects earlier outcomes only.
//!
//! # Example
//!
//! ```rust,no_run
//! use rangefetch_core::pacing::PacedFetcher;
//! use rangefetch_core::rate::{RateConfig, RateController};
//! # use rangefetch_core::models::{FetchOutcome, Identifier};
//! # use rangefetch_core::traits::RecordFetcher;
//! # #[derive(Clone)] struct MyFetcher;
//! # impl RecordFetcher for MyFetcher {
//! #     async fn fetch(&self, _: Identifier) -> FetchOutcome { FetchOutcome::Empty }
//! # }
//! let controller = RateController::new(RateConfig::default());
//! let fetcher = PacedFetcher::new(MyFetcher, controller);
//! ```

use crate::models::{FetchOutcome, Identifier};
use crate::rate::RateController;
use crate::traits::RecordFetcher;

/// A [`RecordFetcher`] wrapper that consults and feeds a shared [`RateController`].
#[derive(Clone)]
pub struct PacedFetcher<F> {
    inner: F,
    controller: RateController,
}

impl<F: RecordFetcher> PacedFetcher<F> {
    pub fn new(inner: F, controller: RateController) -> Self {
        Self { inner, controller }
    }

    pub fn controller(&self) -> &RateController {
        &self.controller
    }
}

impl<F: RecordFetcher> RecordFetcher for PacedFetcher<F> {
    async fn fetch(&self, id: Identifier) -> FetchOutcome {
        let delay = self.controller.next_delay().await;
        if !delay.is_zero() {
            tracing::trace!(%id, delay_ms = delay.as_millis() as u64, "Pacing request");
            tokio::time::sleep(delay).await;
        }

        let outcome = self.inner.fetch(id).await;
        self.controller
            .report_outcome(outcome.is_usable_response())
            .await;
        outcome
    }
}
