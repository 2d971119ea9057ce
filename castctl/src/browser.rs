//! Dual-transport discovery front end.
//!
//! Runs the SSDP search loop and the mDNS listener on their own threads and
//! funnels every observation into one [`Scanner`], which decides when an
//! identity is complete enough to announce.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use futures_util::future::{self, Either};
use futures_util::{Stream, StreamExt, pin_mut};
use tracing::{debug, info, warn};

use castssdp::SsdpClient;

use crate::describe::fetch_description;
use crate::events::ScannerEvent;
use crate::mdns_source::records_from_response;
use crate::scanner::{DiscoveryRecord, Scanner};
use crate::{CAST_SERVICE_DOMAIN, DIAL_SEARCH_TARGET, MDNS_QUERY_INTERVAL, SSDP_SEARCH_INTERVAL};

/// How long an on-demand mDNS re-query pass keeps its socket open.
const MDNS_RESCAN_WINDOW: Duration = Duration::from_secs(3);

/// Discovers cast receivers over SSDP and mDNS simultaneously.
///
/// Subscribe before calling [`start`](DeviceBrowser::start); devices found
/// between the two calls would otherwise be missed.
pub struct DeviceBrowser {
    scanner: Scanner,
    ssdp: Option<Arc<SsdpClient>>,
    mdns_stop: Option<async_std::channel::Sender<()>>,
    running: Arc<AtomicBool>,
}

impl DeviceBrowser {
    pub fn new() -> Self {
        Self::with_scanner(Scanner::new())
    }

    /// Browser feeding an externally configured scanner (tests, alternative
    /// transports).
    pub fn with_scanner(scanner: Scanner) -> Self {
        Self {
            scanner,
            ssdp: None,
            mdns_stop: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribes to device announcements.
    pub fn subscribe(&self) -> Receiver<ScannerEvent> {
        self.scanner.subscribe()
    }

    /// Spawns the discovery threads. Calling it on a running browser is a
    /// no-op.
    pub fn start(&mut self) -> std::io::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let ssdp = Arc::new(SsdpClient::new()?);
        ssdp.search(DIAL_SEARCH_TARGET, 3)?;
        self.ssdp = Some(Arc::clone(&ssdp));

        // The mDNS thread parks inside the discovery stream on a quiet
        // network; closing this channel is what wakes and releases it.
        let (stop_tx, stop_rx) = async_std::channel::bounded::<()>(1);
        self.mdns_stop = Some(stop_tx);

        info!("starting cast device discovery");

        let scanner = self.scanner.clone();
        let running = Arc::clone(&self.running);
        thread::Builder::new()
            .name("cast-ssdp".into())
            .spawn(move || ssdp_loop(ssdp, scanner, running))?;

        let scanner = self.scanner.clone();
        let running = Arc::clone(&self.running);
        thread::Builder::new()
            .name("cast-mdns".into())
            .spawn(move || mdns_loop(scanner, running, stop_rx))?;

        Ok(())
    }

    /// Re-issues discovery queries on both transports without clearing the
    /// identity table.
    ///
    /// SSDP reuses the running socket; mDNS gets a short-lived query pass
    /// of its own, since the long-lived listener only re-queries on its
    /// interval. A browser that was never started does nothing.
    pub fn rescan(&self) -> std::io::Result<()> {
        if let Some(ssdp) = &self.ssdp {
            ssdp.search(DIAL_SEARCH_TARGET, 3)?;
        }
        if self.running.load(Ordering::SeqCst) {
            let scanner = self.scanner.clone();
            thread::Builder::new()
                .name("cast-mdns-requery".into())
                .spawn(move || mdns_requery(scanner))?;
        }
        Ok(())
    }

    /// Stops the discovery threads and releases both raw sources.
    /// Already-announced devices stay usable. Idempotent.
    pub fn shutdown(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("stopping cast device discovery");
            self.ssdp = None;
            // Dropping the sender closes the channel and wakes the mDNS
            // thread out of its stream wait.
            self.mdns_stop = None;
        }
    }
}

impl Default for DeviceBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DeviceBrowser {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Receives SSDP replies, resolves their description documents and feeds the
/// scanner. Re-searches periodically so devices joining the network late are
/// still found.
fn ssdp_loop(ssdp: Arc<SsdpClient>, scanner: Scanner, running: Arc<AtomicBool>) {
    let mut last_search = Instant::now();

    while running.load(Ordering::SeqCst) {
        if last_search.elapsed() >= SSDP_SEARCH_INTERVAL {
            if let Err(e) = ssdp.search(DIAL_SEARCH_TARGET, 3) {
                warn!("SSDP re-search failed: {}", e);
            }
            last_search = Instant::now();
        }

        // recv waits up to the socket read timeout, so this loop notices
        // shutdown within a second.
        let message = match ssdp.recv() {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                warn!("SSDP receive failed: {}", e);
                continue;
            }
        };

        debug!("SSDP reply from {} for {}", message.from, message.location);
        match fetch_description(&message.location) {
            Ok(description) => {
                scanner.ingest(DiscoveryRecord::Description {
                    identity: description.identity(),
                    friendly_name: description.friendly_name.clone(),
                    address: message.from.ip().to_string(),
                });
            }
            // DIAL answers come from all sorts of devices; most rejections
            // here are simply not cast receivers.
            Err(e) => debug!("ignoring {}: {}", message.location, e),
        }
    }
}

/// Drives the long-lived mDNS discovery stream and feeds each response's
/// records to the scanner.
fn mdns_loop(scanner: Scanner, running: Arc<AtomicBool>, stop: async_std::channel::Receiver<()>) {
    let result = async_std::task::block_on(async {
        let stream = mdns::discover::all(CAST_SERVICE_DOMAIN, MDNS_QUERY_INTERVAL)?.listen();
        pump_until_stopped(stream, stop, running.as_ref(), |response| {
            ingest_response(&scanner, response)
        })
        .await;
        Ok::<_, mdns::Error>(())
    });

    if let Err(e) = result {
        warn!("mDNS discovery stopped: {}", e);
    }
}

/// One short-lived mDNS query pass for `rescan`. Answers land in the
/// reconciler, which deduplicates against the long-lived listener.
fn mdns_requery(scanner: Scanner) {
    let result = async_std::task::block_on(async {
        let stream = mdns::discover::all(CAST_SERVICE_DOMAIN, MDNS_QUERY_INTERVAL)?.listen();
        drain_for_window(stream, MDNS_RESCAN_WINDOW, |response| {
            ingest_response(&scanner, response)
        })
        .await;
        Ok::<_, mdns::Error>(())
    });

    if let Err(e) = result {
        warn!("mDNS re-query failed: {}", e);
    }
}

fn ingest_response(scanner: &Scanner, response: Result<mdns::Response, mdns::Error>) {
    match response {
        Ok(response) => {
            for record in records_from_response(&response) {
                scanner.ingest(record);
            }
        }
        Err(e) => warn!("mDNS receive failed: {}", e),
    }
}

/// Drains a discovery stream until it ends, `running` clears, or the stop
/// channel closes. The stop channel is what releases a thread parked on a
/// quiet network, where the stream alone would never yield again.
async fn pump_until_stopped<T>(
    stream: impl Stream<Item = T>,
    stop: async_std::channel::Receiver<()>,
    running: &AtomicBool,
    mut handle: impl FnMut(T),
) {
    pin_mut!(stream);
    let stop_wait = stop.recv();
    pin_mut!(stop_wait);

    loop {
        match future::select(stream.next(), stop_wait.as_mut()).await {
            Either::Left((Some(item), _)) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                handle(item);
            }
            Either::Left((None, _)) | Either::Right(_) => break,
        }
    }
}

/// Drains a stream for at most `window`, handing each item through.
async fn drain_for_window<T>(
    stream: impl Stream<Item = T>,
    window: Duration,
    mut handle: impl FnMut(T),
) {
    pin_mut!(stream);
    let started = Instant::now();

    while let Some(left) = window.checked_sub(started.elapsed()) {
        match async_std::future::timeout(left, stream.next()).await {
            Ok(Some(item)) => handle(item),
            Ok(None) | Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn rescan_before_start_is_a_noop() {
        let browser = DeviceBrowser::with_scanner(Scanner::new());
        assert!(browser.rescan().is_ok());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut browser = DeviceBrowser::with_scanner(Scanner::new());
        browser.shutdown();
        browser.shutdown();
        assert!(!browser.running.load(Ordering::SeqCst));
    }

    #[test]
    fn closing_the_stop_channel_releases_a_parked_pump() {
        let (stop_tx, stop_rx) = async_std::channel::bounded::<()>(1);
        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = unbounded::<()>();

        let worker = {
            let running = Arc::clone(&running);
            thread::spawn(move || {
                async_std::task::block_on(pump_until_stopped(
                    futures_util::stream::pending::<u32>(),
                    stop_rx,
                    running.as_ref(),
                    |_| {},
                ));
                let _ = done_tx.send(());
            })
        };

        // The stream never yields; only the channel close can wake it.
        drop(stop_tx);
        assert!(
            done_rx.recv_timeout(Duration::from_secs(2)).is_ok(),
            "pump must wake when the stop channel closes"
        );
        worker.join().unwrap();
    }

    #[test]
    fn pump_hands_items_through_in_order() {
        let (_stop_tx, stop_rx) = async_std::channel::bounded::<()>(1);
        let running = AtomicBool::new(true);
        let mut seen = Vec::new();

        async_std::task::block_on(pump_until_stopped(
            futures_util::stream::iter([1, 2, 3]),
            stop_rx,
            &running,
            |item| seen.push(item),
        ));

        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn window_drain_returns_on_a_quiet_stream() {
        let started = Instant::now();
        async_std::task::block_on(drain_for_window(
            futures_util::stream::pending::<u32>(),
            Duration::from_millis(50),
            |_: u32| {},
        ));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
