//! Bar-by-bar replay loop.
//!
//! Per bar, in order:
//! 1. Roll the hour and day windows (daily anchor, hour extremes)
//! 2. If the risk gate permits and the hour is tradable, consult the signal
//!    feed and open a position on a resolved direction
//! 3. Update the account with the bar (stop/take-profit checks)
//!
//! Per-bar failures become `BarFault` records; the loop never aborts midway.

use tracing::{debug, info, warn, Span};

use crate::account::{Account, EntryRequest, Liquidity};
use crate::domain::{Bar, Side};
use crate::report::Summary;
use crate::signals::{resolve_direction, SignalFeed};

use super::state::{BarFault, FaultStage, ReplayConfig, ReplayError, ReplayReport, Session};

/// Drives one account through a bar sequence.
#[derive(Debug)]
pub struct Replay {
    config: ReplayConfig,
    account: Account,
    span: Span,
}

#[derive(Debug, Default)]
struct Tally {
    entries: usize,
    signals_evaluated: usize,
    bars_processed: usize,
}

impl Replay {
    pub fn new(config: ReplayConfig, account: Account) -> Self {
        Self {
            config,
            account,
            span: Span::none(),
        }
    }

    /// Parent span for replay events. The account logs under it as well.
    pub fn with_span(mut self, span: Span) -> Self {
        self.account = self.account.with_span(span.clone());
        self.span = span;
        self
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Replay `bars` against `feed`, consuming the driver.
    pub fn run(mut self, bars: &[Bar], feed: &dyn SignalFeed) -> Result<ReplayReport, ReplayError> {
        self.config.validate()?;
        check_monotonic(bars)?;

        let span = self.span.clone();
        let _guard = span.enter();
        info!(bars = bars.len(), signals = ?self.config.signals, "replay started");

        let mut session = Session::default();
        let mut tally = Tally::default();
        let mut faults = Vec::new();

        for (idx, bar) in bars.iter().enumerate() {
            if let Err(e) = bar.validate() {
                warn!(bar_index = idx, error = %e, "skipping invalid bar");
                faults.push(BarFault::new(idx, bar, FaultStage::Bar, e));
                continue;
            }

            session.begin(bar);

            match self.try_entry(idx, bar, &session, feed, &mut tally) {
                Ok(Some(side)) => {
                    tally.entries += 1;
                    debug!(bar_index = idx, %side, "entry");
                }
                Ok(None) => {}
                Err(fault) => {
                    warn!(%fault, "entry skipped");
                    faults.push(fault);
                }
            }

            if let Err(e) = self.account.update(bar) {
                warn!(bar_index = idx, error = %e, "account update failed");
                faults.push(BarFault::new(idx, bar, FaultStage::Update, e));
            }

            session.absorb(bar);
            tally.bars_processed += 1;
        }

        if self.config.close_at_end {
            if let Some(last) = bars.last() {
                if let Err(e) = self.account.close(last.close, Liquidity::Maker, last.timestamp) {
                    warn!(error = %e, "closing at end failed");
                    faults.push(BarFault::new(bars.len() - 1, last, FaultStage::Close, e));
                }
            }
        }

        let summary = Summary::from_account(&self.account);
        info!(
            trades = summary.trades,
            balance = summary.balance,
            growth_pct = summary.growth_pct,
            faults = faults.len(),
            "replay finished"
        );

        Ok(ReplayReport {
            summary,
            trades: self.account.trades().to_vec(),
            faults,
            entries: tally.entries,
            signals_evaluated: tally.signals_evaluated,
            bars_processed: tally.bars_processed,
            final_position: self.account.position().cloned(),
        })
    }

    fn try_entry(
        &mut self,
        idx: usize,
        bar: &Bar,
        session: &Session,
        feed: &dyn SignalFeed,
        tally: &mut Tally,
    ) -> Result<Option<Side>, BarFault> {
        if !self.config.gate.permits(&self.account) || !self.config.trades_in_hour(bar.hour_of_day()) {
            return Ok(None);
        }

        let snapshot = feed
            .evaluate(idx, bar)
            .map_err(|e| BarFault::new(idx, bar, FaultStage::Signal, e))?;
        tally.signals_evaluated += 1;

        let entry = bar.open;
        let Some(side) = resolve_direction(&snapshot, &self.config.signals, entry, session.anchor())
        else {
            return Ok(None);
        };

        let volatility = snapshot
            .volatility
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| {
                BarFault::new(
                    idx,
                    bar,
                    FaultStage::Volatility,
                    format!("no usable volatility ({:?})", snapshot.volatility),
                )
            })?;

        let levels = self
            .config
            .entry_levels(side, entry, volatility, session.hour_extreme(side));
        let request = EntryRequest::new(side, entry)
            .stop(levels.stop)
            .take_profit(levels.take_profit)
            .risk(self.config.risk)
            .liquidity(self.config.entry_liquidity)
            .at(bar.timestamp);

        self.account
            .open(request)
            .map_err(|e| BarFault::new(idx, bar, FaultStage::Entry, e))?;
        Ok(Some(side))
    }
}

fn check_monotonic(bars: &[Bar]) -> Result<(), ReplayError> {
    for (index, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(ReplayError::NonMonotonicBars {
                index: index + 1,
                previous: pair[0].timestamp,
                timestamp: pair[1].timestamp,
            });
        }
    }
    Ok(())
}
