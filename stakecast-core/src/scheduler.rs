//! # Lifecycle Scheduler
//!
//! A recurring background pass that applies time-based transitions the
//! same way on every peer, independent of incoming commands: it closes
//! staking on markets past their deadline, reminds the oracle when the
//! resolution window is running out, and voids markets whose oracle never
//! showed up.
//!
//! Each pass iterates every market in the index. A failure on one market
//! is logged and does not abort the pass; the loop itself never exits on
//! error.

use crate::clock::{format_timestamp_ms, Clock};
use crate::contract::MarketContract;
use crate::error::Result;
use crate::market::MarketState;
use crate::protocol::{
    oracle_channel, send_event, staking_closed_event, ActivityEvent, Broadcast, ACTIVITY_CHANNEL,
};
use std::sync::Arc;
use std::time::Duration;

/// Pass interval.
pub const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// How long before `resolve_at` the oracle starts receiving reminders.
pub const RESOLVE_REMINDER_WINDOW_MS: i64 = 60 * 60 * 1000;

/// Recurring deadline pass over every indexed market.
pub struct LifecycleScheduler {
    contract: Arc<MarketContract>,
    broadcast: Arc<dyn Broadcast>,
    clock: Arc<dyn Clock>,
}

impl LifecycleScheduler {
    pub fn new(
        contract: Arc<MarketContract>,
        broadcast: Arc<dyn Broadcast>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            contract,
            broadcast,
            clock,
        }
    }

    /// Run passes forever on the tick interval.
    pub async fn run(self) {
        tracing::info!(interval_secs = TICK_INTERVAL.as_secs(), "lifecycle scheduler started");
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            self.tick();
        }
    }

    /// One full pass over the index.
    pub fn tick(&self) {
        let index = match self.contract.index() {
            Ok(index) => index,
            Err(err) => {
                tracing::error!(error = %err, "scheduler could not load market index");
                return;
            }
        };

        for market_id in index.keys() {
            if let Err(err) = self.process_market(market_id) {
                tracing::error!(%market_id, error = %err, "scheduler pass failed for market");
            }
        }
    }

    /// Apply due transitions and reminders to one market.
    fn process_market(&self, market_id: &str) -> Result<()> {
        // 1. Close staking once the deadline has passed.
        if let Some(market) = self.contract.close_if_due(market_id)? {
            send_event(
                self.broadcast.as_ref(),
                ACTIVITY_CHANNEL,
                &staking_closed_event(&market),
            );
        }

        let Some(market) = self.contract.get(market_id)? else {
            return Ok(());
        };

        // 2. Remind the oracle inside the window before resolve_at. This
        // re-fires on every pass inside the window; reminder state is not
        // tracked anywhere.
        let now = self.clock.now_ms();
        if market.state == MarketState::Closed
            && now > market.resolve_at - RESOLVE_REMINDER_WINDOW_MS
            && now < market.resolve_at
        {
            send_event(
                self.broadcast.as_ref(),
                &oracle_channel(&market.oracle_address),
                &ActivityEvent::ResolveReminder {
                    market_id: market.id.clone(),
                    question: market.question.clone(),
                    deadline: format_timestamp_ms(market.resolve_at),
                },
            );
        }

        // 3. Void the market if the oracle missed the deadline.
        if let Some(market) = self.contract.void_if_overdue(market_id)? {
            send_event(
                self.broadcast.as_ref(),
                ACTIVITY_CHANNEL,
                &ActivityEvent::MarketVoided {
                    market_id: market.id.clone(),
                    reason: "oracle_missed_deadline".to_string(),
                },
            );
        }

        Ok(())
    }
}
