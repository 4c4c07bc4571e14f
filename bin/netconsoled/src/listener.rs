//! Netconsole UDP listener.

use anyhow::Context as _;
use netconsoled_app::GenericError;
use tokio::{net::UdpSocket, select};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{netconsole, workers::WorkerPool};

/// Largest possible UDP payload.
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Receives netconsole datagrams on `socket` and queues each decoded log on `pool`, until `shutdown` is cancelled.
///
/// Datagrams that aren't valid netconsole messages are dropped.
///
/// # Errors
///
/// If receiving from the socket fails, an error is returned.
pub async fn run(socket: UdpSocket, pool: &WorkerPool, shutdown: CancellationToken) -> Result<(), GenericError> {
    let mut buf = vec![0; MAX_DATAGRAM_SIZE];

    loop {
        let (len, peer) = select! {
            _ = shutdown.cancelled() => break,
            result = socket.recv_from(&mut buf) => result.context("failed to receive netconsole datagram")?,
        };

        match netconsole::decode(&buf[..len]) {
            Some(entry) => pool.dispatch(peer, entry).await,
            None => debug!(%peer, len, "Received datagram that is not a netconsole log. Dropping."),
        }
    }

    info!("UDP server stopped.");
    Ok(())
}
