//! Round-trips a client and a server session over an in-memory pipe.

use async_compat::CompatExt;
use hawser::{
    side::{client::Client, server::Server},
    stream::RekeyLimits,
    Session,
};
use hawser_packet::trans::{ServiceAccept, ServiceRequest};
use tokio::io::BufStream;

fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}

fn keys() -> Vec<ssh_key::PrivateKey> {
    vec![
        ssh_key::PrivateKey::random(&mut rand::thread_rng(), ssh_key::Algorithm::Ed25519)
            .expect("Cannot generate private keys"),
    ]
}

#[tokio::test]
async fn it_exchanges_keys_and_messages() -> Result<(), eyre::Error> {
    init();

    let duplex = tokio::io::duplex(hawser_packet::Packet::MAX_SIZE * 4);

    tokio::try_join!(
        async {
            let server = Server {
                keys: keys(),
                ..Default::default()
            };
            let mut session = Session::new(BufStream::new(duplex.0).compat(), server).await?;

            let request: ServiceRequest = session.recv().await?.to()?;
            assert_eq!(request.service_name.as_str(), "test-service");

            session
                .send(&ServiceAccept {
                    service_name: request.service_name,
                })
                .await?;

            Ok::<_, eyre::Error>(())
        },
        async {
            let client = Client::default();
            let mut session = Session::new(BufStream::new(duplex.1).compat(), client).await?;

            session
                .send(&ServiceRequest {
                    service_name: "test-service".into(),
                })
                .await?;

            let accept: ServiceAccept = session.recv().await?.to()?;
            assert_eq!(accept.service_name.as_str(), "test-service");

            Ok::<_, eyre::Error>(())
        },
    )?;

    Ok(())
}

#[tokio::test]
async fn it_survives_rekeying_under_a_byte_limit() -> Result<(), eyre::Error> {
    init();

    const ROUNDS: usize = 64;

    // A threshold low enough to force several re-keyings mid-run.
    let rekey = RekeyLimits {
        bytes: 0x1000,
        ..Default::default()
    };

    let duplex = tokio::io::duplex(hawser_packet::Packet::MAX_SIZE * 4);

    tokio::try_join!(
        async {
            let server = Server {
                keys: keys(),
                rekey,
                ..Default::default()
            };
            let mut session = Session::new(BufStream::new(duplex.0).compat(), server).await?;

            for round in 0..ROUNDS {
                let request: ServiceRequest = session.recv().await?.to()?;
                assert_eq!(
                    request.service_name.as_str(),
                    format!("round-{round:0>128}"),
                );

                session
                    .send(&ServiceAccept {
                        service_name: request.service_name,
                    })
                    .await?;
            }

            Ok::<_, eyre::Error>(())
        },
        async {
            let client = Client {
                rekey,
                ..Default::default()
            };
            let mut session = Session::new(BufStream::new(duplex.1).compat(), client).await?;

            for round in 0..ROUNDS {
                let name = format!("round-{round:0>128}");

                session
                    .send(&ServiceRequest {
                        service_name: name.as_str().into(),
                    })
                    .await?;

                let accept: ServiceAccept = session.recv().await?.to()?;
                assert_eq!(accept.service_name.as_str(), name);
            }

            Ok::<_, eyre::Error>(())
        },
    )?;

    Ok(())
}
