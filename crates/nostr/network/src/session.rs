//! Session builder
//!
//! A session binds one logical request to transports. It talks either to one
//! multiplexing proxy that fronts every requested relay, or to one direct
//! transport per relay. Inbound frames from every link are decoded, NIP-42
//! challenges are answered, and everything else is forwarded to the owning
//! coordinator on a single channel.

use crate::bus::{NetworkEvent, RelayErrorKind};
use crate::message::{ClientMessage, RelayMessage, unwrap_multiplexed, wrap_multiplexed};
use crate::network::NetworkContext;
use crate::pool::{ConnectionPool, PoolEntry};
use crate::transport::SocketStatus;
use crate::url::{normalize_relay_url, normalize_relay_urls};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SessionOptions {
    /// Send without waiting on boot gates. Required for AUTH traffic.
    pub bypass_auth_gate: bool,
}

/// Where a session's traffic goes.
enum SessionTarget {
    /// One transport per relay
    Direct(Vec<Arc<PoolEntry>>),
    /// One multiplexer transport carrying every relay
    Multiplexed {
        entry: Arc<PoolEntry>,
        urls: Vec<String>,
    },
}

/// Inbound traffic delivered to the coordinator owning a session.
#[derive(Debug, Clone)]
pub(crate) enum SessionMessage {
    /// A decoded message from a relay
    Relay { url: String, message: RelayMessage },
    /// Sending to a relay failed
    SendFailed { url: String, error: String },
}

/// One transport link and the relays it reaches.
struct Link {
    entry: Arc<PoolEntry>,
    urls: Vec<String>,
    multiplexed: bool,
}

pub(crate) struct Session {
    urls: Vec<String>,
    outboxes: Mutex<Vec<mpsc::UnboundedSender<Value>>>,
    readers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Session {
    /// Build a session over `urls` and start connecting.
    ///
    /// Returns the session and the receiver for its inbound traffic.
    pub(crate) fn open(
        ctx: &Arc<NetworkContext>,
        urls: &[String],
        opts: SessionOptions,
    ) -> (Self, mpsc::UnboundedReceiver<SessionMessage>) {
        let requested = if ctx.config.force_relays.is_empty() {
            urls
        } else {
            &ctx.config.force_relays[..]
        };
        let urls = normalize_relay_urls(requested);

        let target = match Self::multiplexer(ctx, &urls) {
            Some(entry) => SessionTarget::Multiplexed {
                entry,
                urls: urls.clone(),
            },
            None => SessionTarget::Direct(
                urls.iter()
                    .filter_map(|url| match ctx.pool.get(url) {
                        Ok(entry) => Some(entry),
                        Err(e) => {
                            warn!("no transport for {}: {}", url, e);
                            None
                        }
                    })
                    .collect(),
            ),
        };

        let links: Vec<Link> = match target {
            SessionTarget::Direct(entries) => entries
                .into_iter()
                .map(|entry| Link {
                    urls: vec![entry.url().to_string()],
                    entry,
                    multiplexed: false,
                })
                .collect(),
            SessionTarget::Multiplexed { entry, urls } => vec![Link {
                entry,
                urls,
                multiplexed: true,
            }],
        };

        let urls = links.iter().flat_map(|link| link.urls.clone()).collect::<Vec<_>>();
        debug!(
            "session over {} relays via {} link(s)",
            urls.len(),
            links.len()
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let mut outboxes = Vec::with_capacity(links.len());
        let mut readers = Vec::with_capacity(links.len());

        for link in links {
            let link = Arc::new(link);

            // Subscribe before connecting so no frame is missed
            let frames = link.entry.transport().frames();
            readers.push(tokio::spawn(read_link(
                Arc::clone(ctx),
                Arc::clone(&link),
                frames,
                tx.clone(),
            )));

            let capabilities = ctx.relay_info.capabilities(link.entry.url());
            if !opts.bypass_auth_gate
                && capabilities.requires_boot()
                && link.entry.transport().status() == SocketStatus::Pending
                && link.entry.gate().engage(ctx.config.boot_grace())
            {
                info!("holding traffic to {} until it boots", link.entry.url());
            }

            let transport = Arc::clone(link.entry.transport());
            tokio::spawn(async move {
                if let Err(e) = transport.connect().await {
                    warn!("failed to connect to {}: {}", transport.url(), e);
                }
            });

            let (out_tx, out_rx) = mpsc::unbounded_channel();
            outboxes.push(out_tx);
            tokio::spawn(write_link(link, out_rx, tx.clone(), opts.bypass_auth_gate));
        }

        let session = Self {
            urls,
            outboxes: Mutex::new(outboxes),
            readers: Mutex::new(readers),
            closed: AtomicBool::new(false),
        };
        (session, rx)
    }

    fn multiplexer(ctx: &NetworkContext, urls: &[String]) -> Option<Arc<PoolEntry>> {
        let mux_url = ctx.config.multiplexer_url.as_deref()?;
        if urls.len() <= 1 && !ctx.pool.has(mux_url) {
            return None;
        }

        let entry = match ctx.pool.get(mux_url) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("multiplexer unavailable: {}", e);
                return None;
            }
        };

        if entry.has_error() {
            debug!("multiplexer {} errored, connecting directly", mux_url);
            return None;
        }
        Some(entry)
    }

    /// Relays reached by this session.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Queue a message for every link. Messages sent after cleanup are dropped.
    pub fn send(&self, message: &ClientMessage) {
        let frame = match message.to_value() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("failed to encode message: {}", e);
                return;
            }
        };

        for outbox in self.outboxes.lock().iter() {
            let _ = outbox.send(frame.clone());
        }
    }

    /// Stop reading and release the links. Idempotent.
    ///
    /// Messages already queued are still delivered before the writers exit.
    pub fn cleanup(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        for reader in self.readers.lock().drain(..) {
            reader.abort();
        }
        self.outboxes.lock().clear();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cleanup();
    }
}

async fn read_link(
    ctx: Arc<NetworkContext>,
    link: Arc<Link>,
    mut frames: tokio::sync::broadcast::Receiver<Value>,
    tx: mpsc::UnboundedSender<SessionMessage>,
) {
    let accepted: HashSet<&str> = link.urls.iter().map(String::as_str).collect();

    loop {
        let frame = match frames.recv().await {
            Ok(frame) => frame,
            Err(RecvError::Lagged(skipped)) => {
                warn!("{} frames from {} were dropped", skipped, link.entry.url());
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let (url, value) = if link.multiplexed {
            match unwrap_multiplexed(frame) {
                Ok((url, value)) => match normalize_relay_url(&url) {
                    Ok(url) if accepted.contains(url.as_str()) => (url, value),
                    _ => continue,
                },
                Err(e) => {
                    debug!("bad envelope from {}: {}", link.entry.url(), e);
                    continue;
                }
            }
        } else {
            (link.entry.url().to_string(), frame)
        };

        let message = match RelayMessage::from_value(value) {
            Ok(message) => message,
            Err(e) => {
                debug!("bad message from {}: {}", url, e);
                continue;
            }
        };

        match message {
            RelayMessage::Auth { challenge } => {
                answer_challenge(&ctx, &link, &url, &challenge).await;
            }
            RelayMessage::Ok {
                event_id, success, ..
            } if ctx.pool.take_auth(&url, &event_id) => {
                let kind = if success {
                    None
                } else {
                    Some(RelayErrorKind::Forbidden)
                };
                ctx.bus.emit(NetworkEvent::ErrorClear {
                    url: url.clone(),
                    kind,
                });

                if success {
                    info!("authenticated with {}", url);
                    link.entry.gate().lift();
                    ctx.pool.mark_booted();
                } else {
                    warn!("{} refused our authentication", url);
                }
            }
            message => {
                if tx.send(SessionMessage::Relay { url, message }).is_err() {
                    break;
                }
            }
        }
    }
}

async fn answer_challenge(ctx: &NetworkContext, link: &Link, url: &str, challenge: &str) {
    ctx.bus.emit(NetworkEvent::ErrorSet {
        url: url.to_string(),
        kind: RelayErrorKind::Unauthorized,
    });

    if !ctx.pool.claim_challenge(url, challenge) {
        return;
    }
    let mut claim = ChallengeClaim {
        pool: &ctx.pool,
        url,
        challenge,
        sent: false,
    };

    let handler = ctx.auth.read().clone();
    let Some(handler) = handler else {
        debug!("no auth handler, leaving challenge from {} unanswered", url);
        return;
    };

    let Some(event) = handler.handle_challenge(url, challenge).await else {
        return;
    };

    let frame = match ClientMessage::Auth(event.clone()).to_value() {
        Ok(frame) => frame,
        Err(e) => {
            warn!("failed to encode auth event: {}", e);
            return;
        }
    };
    let frame = if link.multiplexed {
        wrap_multiplexed(&[url.to_string()], frame)
    } else {
        frame
    };

    ctx.pool.track_auth(url, &event.id);
    match link.entry.transport().send(frame).await {
        Ok(()) => claim.sent = true,
        Err(e) => {
            warn!("failed to send auth to {}: {}", url, e);
            ctx.pool.take_auth(url, &event.id);
        }
    }
}

/// A claimed challenge. Released on drop unless the AUTH was sent, which
/// includes the reader being aborted while the handler runs.
struct ChallengeClaim<'a> {
    pool: &'a ConnectionPool,
    url: &'a str,
    challenge: &'a str,
    sent: bool,
}

impl Drop for ChallengeClaim<'_> {
    fn drop(&mut self) {
        if !self.sent {
            self.pool.release_challenge(self.url, self.challenge);
        }
    }
}

async fn write_link(
    link: Arc<Link>,
    mut outbox: mpsc::UnboundedReceiver<Value>,
    tx: mpsc::UnboundedSender<SessionMessage>,
    bypass_gate: bool,
) {
    let transport = link.entry.transport();

    while let Some(frame) = outbox.recv().await {
        if !bypass_gate {
            link.entry.gate().wait(transport.watch_status()).await;
        }

        let frame = if link.multiplexed {
            wrap_multiplexed(&link.urls, frame)
        } else {
            frame
        };

        if let Err(e) = transport.send(frame).await {
            warn!("failed to send to {}: {}", transport.url(), e);
            for url in &link.urls {
                let _ = tx.send(SessionMessage::SendFailed {
                    url: url.clone(),
                    error: e.to_string(),
                });
            }
        }
    }
}
