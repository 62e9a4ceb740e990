//! Count coordinator (NIP-45)

use crate::message::{ClientMessage, RelayMessage};
use crate::network::NetworkContext;
use crate::session::{Session, SessionMessage, SessionOptions};
use crate::subscribe::generate_subscription_id;
use nostr::Filter;
use std::sync::Arc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

/// Ask the count relays and return the first answer, or 0 once the count
/// timeout passes.
pub(crate) async fn count(ctx: &Arc<NetworkContext>, filters: Vec<Filter>) -> u64 {
    if ctx.config.count_relays.is_empty() && ctx.config.force_relays.is_empty() {
        warn!("no count relays configured");
        return 0;
    }

    let deadline = Instant::now() + ctx.config.count_timeout();
    let (session, mut rx) = Session::open(ctx, &ctx.config.count_relays, SessionOptions::default());
    let subscription_id = generate_subscription_id();

    session.send(&ClientMessage::Count {
        subscription_id: subscription_id.clone(),
        filters,
    });

    let timer = sleep_until(deadline);
    tokio::pin!(timer);
    let mut open = true;

    let result = loop {
        tokio::select! {
            _ = &mut timer => {
                debug!("count {} timed out", subscription_id);
                break 0;
            }
            message = rx.recv(), if open => match message {
                Some(SessionMessage::Relay {
                    url,
                    message: RelayMessage::Count { subscription_id: id, count },
                }) if id == subscription_id => {
                    debug!("{} counted {}", url, count);
                    break count;
                }
                Some(_) => {}
                None => open = false,
            },
        }
    };

    session.send(&ClientMessage::Close { subscription_id });
    session.cleanup();
    result
}
