//! Single decision point fed by both price streams
//!
//! Both streams push [`MarketEvent`]s into one channel. The decision loop is
//! the only writer of the snapshot: each event updates exactly one field and
//! both directions are re-evaluated under the same lock. Gas lookups and
//! emission run in their own tasks so a slow fee endpoint never stalls the
//! update path.

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use crate::{
    arbitrage::calculator::{evaluate, threshold_from_percent, SpreadSignal},
    cex::{transport::DepthVenue, CexDepthStream},
    dex::{reader::PoolReader, DexPriceStream},
    errors::{BotError, BotResult},
    gas::GasPriceCache,
    types::{
        ArbitrageSnapshot, EngineState, EngineStats, FixedPoint, MarketEvent, Opportunity,
        QuoteSide, PRICE_SCALE,
    },
    utils::print_opportunity,
};

const MARKET_EVENT_CAPACITY: usize = 1024;
const OPPORTUNITY_CAPACITY: usize = 64;

pub struct ArbitrageEngine<V: DepthVenue, R: PoolReader> {
    cex: Arc<CexDepthStream<V>>,
    dex: Arc<DexPriceStream<R>>,
    gas: Arc<GasPriceCache>,
    shared: Arc<EngineShared>,
    started: AtomicBool,
    decision_task: Mutex<Option<JoinHandle<()>>>,
}

struct EngineShared {
    threshold: FixedPoint,
    state: Mutex<EngineState>,
    snapshot: Mutex<ArbitrageSnapshot>,
    stats: Mutex<EngineStats>,
    closed: AtomicBool,
    shutdown: Notify,
}

impl<V: DepthVenue, R: PoolReader> ArbitrageEngine<V, R> {
    /// `percentage_diff_target` is in percent (`5` means 5%) and must be positive.
    pub fn new(
        cex: Arc<CexDepthStream<V>>,
        dex: Arc<DexPriceStream<R>>,
        gas: Arc<GasPriceCache>,
        percentage_diff_target: Decimal,
    ) -> BotResult<Self> {
        let threshold = threshold_from_percent(percentage_diff_target)?;
        Ok(Self {
            cex,
            dex,
            gas,
            shared: Arc::new(EngineShared::new(threshold)),
            started: AtomicBool::new(false),
            decision_task: Mutex::new(None),
        })
    }

    /// Seed from both venues, attach listeners and start deciding.
    ///
    /// Opportunities are delivered on the returned channel until [`end`](Self::end).
    pub async fn run(&self) -> BotResult<mpsc::Receiver<Opportunity>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(self.invalid_state("run"));
        }

        if let Err(e) = self.seed().await {
            // Seeding can be attempted again unless the engine was ended meanwhile.
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(self.invalid_state("run"));
        }

        let (market_tx, market_rx) = mpsc::channel(MARKET_EVENT_CAPACITY);
        let (opportunity_tx, opportunity_rx) = mpsc::channel(OPPORTUNITY_CAPACITY);

        let task = tokio::spawn(decision_loop(
            self.shared.clone(),
            self.gas.clone(),
            market_rx,
            opportunity_tx,
        ));
        *self.decision_task.lock() = Some(task);

        self.cex.listen(market_tx.clone());
        self.dex.listen(market_tx);

        self.shared.transition(EngineState::Seeded, EngineState::Live);
        info!(threshold = %self.shared.threshold, "🚀 Arbitrage engine live");
        Ok(opportunity_rx)
    }

    async fn seed(&self) -> BotResult<()> {
        let book = self.cex.get_order_book().await?;
        let dex_price = self.dex.get_exchange_prices().await?;

        if dex_price.native_in_token_units.is_zero() {
            return Err(BotError::Configuration(
                "DEX price is zero at startup, check the pool and token addresses".to_string(),
            ));
        }

        let seeded = ArbitrageSnapshot {
            dex_price: Some(dex_price),
            cex_highest_bid: book.highest_bid(PRICE_SCALE)?,
            cex_lowest_ask: book.lowest_ask(PRICE_SCALE)?,
        };
        info!(
            dex_price = %dex_price.native_in_token_units,
            highest_bid = ?seeded.cex_highest_bid.map(|p| p.to_string()),
            lowest_ask = ?seeded.cex_lowest_ask.map(|p| p.to_string()),
            "📊 Engine seeded"
        );
        *self.shared.snapshot.lock() = seeded;
        self.shared.transition(EngineState::Idle, EngineState::Seeded);
        Ok(())
    }

    /// Close both streams and the gas cache. Safe to call more than once.
    pub fn end(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.shared.state.lock() = EngineState::Closed;

        self.cex.close();
        self.dex.close();
        self.gas.close();
        self.shared.shutdown.notify_one();
        info!("🛑 Arbitrage engine stopped");
    }

    /// Wait for the decision loop to finish after [`end`](Self::end).
    pub async fn join(&self) {
        let handle = self.decision_task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "decision loop ended abnormally");
            }
        }
    }

    pub fn state(&self) -> EngineState {
        *self.shared.state.lock()
    }

    pub fn snapshot(&self) -> ArbitrageSnapshot {
        self.shared.snapshot.lock().clone()
    }

    pub fn stats(&self) -> EngineStats {
        *self.shared.stats.lock()
    }

    fn invalid_state(&self, operation: &'static str) -> BotError {
        BotError::InvalidState {
            state: self.state().to_string(),
            operation,
        }
    }
}

impl EngineShared {
    fn new(threshold: FixedPoint) -> Self {
        Self {
            threshold,
            state: Mutex::new(EngineState::Idle),
            snapshot: Mutex::new(ArbitrageSnapshot::default()),
            stats: Mutex::new(EngineStats::default()),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Move `from -> to`; a no-op if the state has moved on (e.g. to `Closed`).
    fn transition(&self, from: EngineState, to: EngineState) {
        let mut state = self.state.lock();
        if *state == from {
            *state = to;
        }
    }

    /// Update one snapshot field and evaluate both directions atomically.
    fn on_market_event(&self, event: MarketEvent) -> BotResult<Vec<SpreadSignal>> {
        let mut snapshot = self.snapshot.lock();
        match event {
            MarketEvent::Cex(quote) => {
                match quote.side {
                    QuoteSide::CexBid => snapshot.cex_highest_bid = Some(quote.value),
                    QuoteSide::CexAsk => snapshot.cex_lowest_ask = Some(quote.value),
                    QuoteSide::DexImplied => {
                        debug!("ignoring DEX-implied quote on the CEX path");
                        return Ok(Vec::new());
                    }
                }
                info!(side = ?quote.side, price = %quote.value, seq = quote.source_seq, "CEX price updated");
                self.stats.lock().cex_updates += 1;
            }
            MarketEvent::Dex(prices) => {
                let quote = prices.as_quote();
                debug!(side = ?quote.side, price = %quote.value, block = quote.source_seq, "DEX price applied");
                snapshot.dex_price = Some(prices);
                self.stats.lock().dex_updates += 1;
            }
        }
        evaluate(&snapshot, &self.threshold)
    }
}

async fn decision_loop(
    shared: Arc<EngineShared>,
    gas: Arc<GasPriceCache>,
    mut events: mpsc::Receiver<MarketEvent>,
    opportunities: mpsc::Sender<Opportunity>,
) {
    loop {
        let event = tokio::select! {
            _ = shared.shutdown.notified() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    warn!("both price streams stopped");
                    break;
                }
            },
        };

        if shared.closed.load(Ordering::SeqCst) {
            break;
        }

        let signals = match shared.on_market_event(event) {
            Ok(signals) => signals,
            Err(e) => {
                warn!(error = %e, "could not evaluate spread");
                continue;
            }
        };

        for signal in signals {
            tokio::spawn(emit_opportunity(
                shared.clone(),
                gas.clone(),
                signal,
                opportunities.clone(),
            ));
        }
    }
    debug!("decision loop stopped");
}

async fn emit_opportunity(
    shared: Arc<EngineShared>,
    gas: Arc<GasPriceCache>,
    signal: SpreadSignal,
    opportunities: mpsc::Sender<Opportunity>,
) {
    let gas_price_wei = match gas.get_fastest_price_in_wei().await {
        Ok(wei) => wei,
        Err(e) if e.is_transient() => {
            warn!(direction = %signal.direction, error = %e, "gas price unavailable, dropping opportunity");
            return;
        }
        Err(e) => {
            error!(direction = %signal.direction, error = %e, "gas price lookup failed, dropping opportunity");
            return;
        }
    };

    if shared.closed.load(Ordering::SeqCst) {
        return;
    }

    let opportunity = Opportunity {
        id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        direction: signal.direction,
        percentage_diff: signal.percentage_diff,
        cex_price: signal.cex_price,
        dex_price: signal.dex_price,
        gas_price_wei,
    };
    print_opportunity(&opportunity);
    shared.stats.lock().opportunities += 1;

    if opportunities.send(opportunity).await.is_err() {
        debug!("opportunity receiver dropped");
    }
}
