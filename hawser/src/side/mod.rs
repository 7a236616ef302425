//! Session's [`Side`]s, either [`Client`] or [`Server`].

use futures::Future;
use futures_time::time::Duration;
use hawser_packet::{
    trans::{KexInit, NewKeys},
    Id,
};

use crate::{
    stream::{RekeyLimits, Stream, TransportPair},
    Pipe, Result,
};

pub mod client;
use client::Client;

pub mod server;
use server::Server;

mod private {
    pub trait Sealed {}

    impl Sealed for super::Client {}
    impl Sealed for super::Server {}
}

/// A side of the SSH protocol, either [`Client`] or [`Server`].
pub trait Side: private::Sealed + Send + Sync + Unpin + 'static {
    /// Get the [`Id`] for this session.
    fn id(&self) -> &Id;

    /// Get the _timeout_ applied to packet sends and receives.
    fn timeout(&self) -> Duration;

    /// Get the re-keying thresholds for this session.
    fn rekey(&self) -> RekeyLimits;

    /// Generate a [`KexInit`] message from the config.
    fn kexinit(&self) -> KexInit;

    /// Exchange the keys from the config.
    fn exchange(
        &self,
        stream: &mut Stream<impl Pipe>,
        kexinit: KexInit,
        peerkexinit: KexInit,
        peer_id: &Id,
    ) -> impl Future<Output = Result<TransportPair>> + Send;

    /// Perform the key-exchange from this side.
    fn kex(
        &self,
        stream: &mut Stream<impl Pipe>,
        peer_id: &Id,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            tracing::debug!("Starting key-exchange procedure");

            let kexinit = self.kexinit();
            stream.send(&kexinit).await?;

            // Data packets framed by the peer before it joined the
            // key-exchange are legal, hold them for the application.
            let mut deferred = Vec::new();
            let peerkexinit = loop {
                let packet = stream.recv().await?;

                match packet.to::<KexInit>() {
                    Ok(peerkexinit) => break peerkexinit,
                    Err(_) => deferred.push(packet),
                }
            };

            let transport = self.exchange(stream, kexinit, peerkexinit, peer_id).await?;

            stream.send(&NewKeys).await?;
            stream.recv().await?.to::<NewKeys>()?;

            tracing::debug!(
                "Key exchange success, negotiated algorithms:\nrx: {:?}\ntx: {:?}",
                transport.rx,
                transport.tx,
            );

            stream.with_transport(transport);

            for packet in deferred {
                stream.defer(packet);
            }

            Ok(())
        }
    }
}
