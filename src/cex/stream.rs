//! Reconnecting market-depth stream
//!
//! Keeps one websocket session alive for a single market. A watchdog closes
//! silent sessions with [`CLOSE_CODE_RECONNECT`], and the same timeout bounds
//! each connect handshake. Any close other than
//! [`CLOSE_CODE_END`] reopens the session. Frames whose final update id does
//! not advance are dropped, and only changes of the top bid or ask are
//! forwarded as quotes.

use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};
use crate::{
    cex::transport::{DepthConnection, DepthVenue, WireEvent},
    config::{CLOSE_CODE_END, CLOSE_CODE_RECONNECT, WATCHDOG_TICK_MS},
    errors::BotResult,
    network::{retry_with_backoff, RetryConfig},
    types::{
        top_of_book, DepthEvent, FixedPoint, MarketEvent, OrderBookSnapshot, Quote, QuoteSide,
        PRICE_SCALE,
    },
};

/// Reported when the transport vanished without a close frame.
pub const CLOSE_CODE_ABNORMAL: u16 = 1006;

/// Whether a session that ended with `code` should be reopened.
pub fn should_reconnect(code: u16, permanently_closed: bool) -> bool {
    !permanently_closed && code != CLOSE_CODE_END
}

/// Sequence filter and top-of-book change detector.
#[derive(Debug, Default, Clone)]
pub struct DepthFilter {
    last_seq: Option<u64>,
    highest_bid: Option<FixedPoint>,
    lowest_ask: Option<FixedPoint>,
}

impl DepthFilter {
    /// Returns the quotes to emit for `event`; stale events leave the filter untouched.
    pub fn apply(&mut self, event: &DepthEvent) -> BotResult<Vec<Quote>> {
        let seq = event.final_update_id;
        if self.last_seq.is_some_and(|last| seq <= last) {
            trace!(seq, last = ?self.last_seq, "dropping stale depth event");
            return Ok(Vec::new());
        }

        // Parse both sides before touching any state.
        let bid = top_of_book(&event.bids, PRICE_SCALE)?;
        let ask = top_of_book(&event.asks, PRICE_SCALE)?;

        self.last_seq = Some(seq);
        let mut quotes = Vec::with_capacity(2);

        if let Some(bid) = bid {
            if self.highest_bid != Some(bid) {
                self.highest_bid = Some(bid);
                quotes.push(Quote { side: QuoteSide::CexBid, value: bid, source_seq: seq });
            }
        }
        if let Some(ask) = ask {
            if self.lowest_ask != Some(ask) {
                self.lowest_ask = Some(ask);
                quotes.push(Quote { side: QuoteSide::CexAsk, value: ask, source_seq: seq });
            }
        }

        Ok(quotes)
    }

    /// Seed from a REST snapshot so frames it already covers are dropped.
    pub fn prime(&mut self, book: &OrderBookSnapshot) -> BotResult<()> {
        let bid = book.highest_bid(PRICE_SCALE)?;
        let ask = book.lowest_ask(PRICE_SCALE)?;
        self.last_seq = Some(self.last_seq.map_or(book.last_update_id, |s| s.max(book.last_update_id)));
        if bid.is_some() {
            self.highest_bid = bid;
        }
        if ask.is_some() {
            self.lowest_ask = ask;
        }
        Ok(())
    }

    pub fn last_seq(&self) -> Option<u64> {
        self.last_seq
    }
}

pub struct CexDepthStream<V: DepthVenue> {
    inner: Arc<StreamInner<V>>,
}

struct StreamInner<V: DepthVenue> {
    venue: V,
    watchdog_timeout: Duration,
    reconnect_backoff: RetryConfig,
    filter: Mutex<DepthFilter>,
    closed: AtomicBool,
    shutdown: Notify,
    connection_attempts: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<V: DepthVenue> CexDepthStream<V> {
    pub fn new(venue: V, watchdog_timeout: Duration) -> Self {
        let backoff = RetryConfig {
            max_attempts: u32::MAX,
            initial_delay_ms: 250,
            max_delay_ms: 30_000,
            exponential_base: 2.0,
        };
        Self::with_reconnect_backoff(venue, watchdog_timeout, backoff)
    }

    /// `backoff` paces reconnects whose connect attempt failed; reopening after
    /// a clean session end is immediate.
    pub fn with_reconnect_backoff(venue: V, watchdog_timeout: Duration, backoff: RetryConfig) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                venue,
                watchdog_timeout,
                reconnect_backoff: backoff,
                filter: Mutex::new(DepthFilter::default()),
                closed: AtomicBool::new(false),
                shutdown: Notify::new(),
                connection_attempts: AtomicU64::new(0),
                task: Mutex::new(None),
            }),
        }
    }

    /// One-shot snapshot of the book, used once at startup to seed state.
    pub async fn get_order_book(&self) -> BotResult<OrderBookSnapshot> {
        let venue = &self.inner.venue;
        let book = retry_with_backoff(
            || async move { venue.order_book().await.map_err(anyhow::Error::from) },
            &RetryConfig::default(),
            "order book snapshot",
        )
        .await?;

        self.inner.filter.lock().prime(&book)?;
        info!(
            stream = %venue.stream_name(),
            last_update_id = book.last_update_id,
            "📖 Order book snapshot loaded"
        );
        Ok(book)
    }

    /// Start streaming; accepted top-of-book changes are sent to `tx`.
    pub fn listen(&self, tx: mpsc::Sender<MarketEvent>) {
        if self.inner.closed.load(Ordering::SeqCst) {
            warn!("depth stream already closed, not listening");
            return;
        }
        let mut task = self.inner.task.lock();
        if task.is_some() {
            warn!("depth stream already has a listener");
            return;
        }
        let inner = self.inner.clone();
        *task = Some(tokio::spawn(inner.run(tx)));
    }

    /// Permanently close the stream. Safe to call more than once.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(stream = %self.inner.venue.stream_name(), "closing depth stream");
        // Stores a permit if the session loop is not currently waiting.
        self.inner.shutdown.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of connection attempts made so far, reconnects included.
    pub fn connection_attempts(&self) -> u64 {
        self.inner.connection_attempts.load(Ordering::SeqCst)
    }

    /// Wait for the session loop to exit after [`close`](Self::close).
    pub async fn join(&self) {
        let handle = self.inner.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "depth stream task ended abnormally");
            }
        }
    }
}

impl<V: DepthVenue> StreamInner<V> {
    async fn run(self: Arc<Self>, tx: mpsc::Sender<MarketEvent>) {
        let stream = self.venue.stream_name();
        let mut failures = 0u32;

        while !self.closed.load(Ordering::SeqCst) {
            self.connection_attempts.fetch_add(1, Ordering::SeqCst);

            // A stalled handshake is bounded by the watchdog timeout like a silent session.
            let attempt = tokio::select! {
                _ = self.shutdown.notified() => break,
                attempt = tokio::time::timeout(self.watchdog_timeout, self.venue.connect()) => attempt,
            };

            let connection = match attempt {
                Ok(Ok(connection)) => {
                    failures = 0;
                    connection
                }
                failed => {
                    let reason = match failed {
                        Ok(Err(e)) => e.to_string(),
                        _ => format!("no handshake within {:?}", self.watchdog_timeout),
                    };
                    failures = failures.saturating_add(1);
                    let delay = self.reconnect_backoff.delay_for(failures);
                    warn!(stream = %stream, error = %reason, "connect failed, retrying in {:?}", delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => continue,
                        _ = self.shutdown.notified() => break,
                    }
                }
            };

            info!(stream = %stream, "websocket connection established");
            let code = self.drive(connection, &tx).await;

            if !should_reconnect(code, self.closed.load(Ordering::SeqCst)) {
                info!(stream = %stream, code, "connection was closed");
                break;
            }
            warn!(stream = %stream, code, "connection was closed unexpectedly, reconnecting...");
        }
    }

    /// Runs one session; returns the close code that ended it.
    async fn drive(&self, mut connection: V::Connection, tx: &mpsc::Sender<MarketEvent>) -> u16 {
        let mut last_receive = Instant::now();
        let mut watchdog = tokio::time::interval(Duration::from_millis(WATCHDOG_TICK_MS));
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    connection.close(CLOSE_CODE_END).await;
                    return CLOSE_CODE_END;
                }
                _ = watchdog.tick() => {
                    if last_receive.elapsed() > self.watchdog_timeout {
                        warn!("timed out waiting for new message");
                        connection.close(CLOSE_CODE_RECONNECT).await;
                        return CLOSE_CODE_RECONNECT;
                    }
                }
                event = connection.recv() => match event {
                    WireEvent::Text(text) => {
                        last_receive = Instant::now();
                        if !self.handle_frame(&text, tx).await {
                            // Nobody is consuming updates any more.
                            self.closed.store(true, Ordering::SeqCst);
                            connection.close(CLOSE_CODE_END).await;
                            return CLOSE_CODE_END;
                        }
                    }
                    WireEvent::Error(e) => {
                        warn!(error = %e, "error received on websocket");
                    }
                    WireEvent::Closed(code) => {
                        return code.unwrap_or(CLOSE_CODE_ABNORMAL);
                    }
                }
            }
        }
    }

    /// Returns `false` once the receiving side has gone away.
    async fn handle_frame(&self, text: &str, tx: &mpsc::Sender<MarketEvent>) -> bool {
        let event: DepthEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = %e, "ignoring non-depth frame");
                return true;
            }
        };

        let quotes = match self.filter.lock().apply(&event) {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(error = %e, seq = event.final_update_id, "malformed depth event");
                return true;
            }
        };

        for quote in quotes {
            if self.closed.load(Ordering::SeqCst) {
                return true;
            }
            debug!(side = ?quote.side, price = %quote.value, seq = quote.source_seq, "CEX top of book changed");
            if tx.send(MarketEvent::Cex(quote)).await.is_err() {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(seq: u64, bid: Option<&str>, ask: Option<&str>) -> DepthEvent {
        let level = |p: &str| [p.to_string(), "1.0".to_string()];
        DepthEvent {
            event_type: "depthUpdate".into(),
            event_time: seq * 1000,
            symbol: "ETHUSDT".into(),
            first_update_id: seq,
            final_update_id: seq,
            bids: bid.map(level).into_iter().collect(),
            asks: ask.map(level).into_iter().collect(),
        }
    }

    #[test]
    fn emits_only_changed_sides() {
        let mut filter = DepthFilter::default();

        let quotes = filter.apply(&event(1, Some("3000.00"), Some("3001.00"))).unwrap();
        assert_eq!(quotes.len(), 2);

        // Same numeric value written differently is not a change.
        let quotes = filter.apply(&event(2, Some("3000.000000"), Some("3001.50"))).unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].side, QuoteSide::CexAsk);
        assert_eq!(quotes[0].value, FixedPoint::from_raw(3_001_500_000, PRICE_SCALE));
        assert_eq!(quotes[0].source_seq, 2);

        let quotes = filter.apply(&event(3, None, None)).unwrap();
        assert!(quotes.is_empty());
        assert_eq!(filter.last_seq(), Some(3));
    }

    #[test]
    fn drops_stale_and_duplicate_events() {
        let mut filter = DepthFilter::default();
        filter.apply(&event(10, Some("3000"), Some("3001"))).unwrap();

        assert!(filter.apply(&event(10, Some("2999"), Some("3002"))).unwrap().is_empty());
        assert!(filter.apply(&event(9, Some("2999"), Some("3002"))).unwrap().is_empty());
        assert_eq!(filter.last_seq(), Some(10));

        // The dropped frames did not move the reference prices.
        let quotes = filter.apply(&event(11, Some("3000"), Some("3001"))).unwrap();
        assert!(quotes.is_empty());
    }

    #[test]
    fn malformed_event_has_no_side_effects() {
        let mut filter = DepthFilter::default();
        filter.apply(&event(5, Some("3000"), Some("3001"))).unwrap();
        assert!(filter.apply(&event(6, Some("not-a-price"), Some("3002"))).is_err());
        assert_eq!(filter.last_seq(), Some(5));
        let quotes = filter.apply(&event(7, Some("3000"), Some("3002"))).unwrap();
        assert_eq!(quotes.len(), 1);
    }

    #[test]
    fn snapshot_sets_sequence_floor() {
        let mut filter = DepthFilter::default();
        let book = OrderBookSnapshot {
            last_update_id: 100,
            bids: vec![["3000.00".into(), "1".into()]],
            asks: vec![["3001.00".into(), "1".into()]],
        };
        filter.prime(&book).unwrap();
        assert!(filter.apply(&event(100, Some("1"), Some("2"))).unwrap().is_empty());
        assert!(filter.apply(&event(101, Some("3000.00"), Some("3001.00"))).unwrap().is_empty());
    }

    #[test]
    fn reconnect_decision() {
        assert!(should_reconnect(CLOSE_CODE_RECONNECT, false));
        assert!(should_reconnect(CLOSE_CODE_ABNORMAL, false));
        assert!(should_reconnect(1000, false));
        assert!(!should_reconnect(CLOSE_CODE_END, false));
        assert!(!should_reconnect(CLOSE_CODE_RECONNECT, true));
    }
}
