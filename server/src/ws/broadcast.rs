use axum::extract::ws::Message;
use futures_util::future::join_all;
use std::time::Duration;

use super::Registry;

/// Result of one fan-out pass.
#[derive(Debug, Default)]
pub struct FanOut {
    /// Recipients whose queue accepted the message.
    pub delivered: usize,
    /// Identities this pass removed from the registry after a failed send.
    pub departed: Vec<String>,
}

/// Send `msg` to every registered connection except `exclude`.
///
/// Sends run concurrently, each bounded by `timeout`. A failed send unbinds
/// that recipient and is reported in `departed`; it never stops delivery to
/// the others.
pub async fn fan_out(
    registry: &Registry,
    msg: &Message,
    exclude: Option<&str>,
    timeout: Duration,
) -> FanOut {
    let targets: Vec<_> = registry
        .snapshot()
        .into_iter()
        .filter(|(identity, _)| Some(identity.as_str()) != exclude)
        .collect();

    let sends = targets.iter().map(move |(identity, conn)| async move {
        (identity, conn, conn.send(identity, msg.clone(), timeout).await)
    });

    let mut outcome = FanOut::default();
    for (identity, conn, result) in join_all(sends).await {
        match result {
            Ok(()) => outcome.delivered += 1,
            Err(e) => {
                tracing::warn!(
                    identity = %identity,
                    connection_id = conn.id(),
                    error = %e,
                    "Broadcast send failed"
                );
                if registry.unregister_connection(identity, conn.id()) {
                    outcome.departed.push(identity.clone());
                }
            }
        }
    }
    outcome
}
