//! Round-trips channels between a client and a server over an
//! in-memory pipe.

use async_compat::{Compat, CompatExt};
use futures::{AsyncReadExt, AsyncWriteExt, TryStreamExt};
use rand::RngCore;
use hawser::{
    side::{client::Client, server::Server},
    stream::RekeyLimits,
    Session,
};
use hawser_connect::{
    channel::WindowConfig,
    channel_open::{ChannelOpenContext, Response},
    Service,
};
use sha1::{Digest, Sha1};
use tokio::io::{BufStream, DuplexStream};

type IO = Compat<BufStream<DuplexStream>>;

fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();
}

fn server_config() -> Server {
    Server {
        keys: vec![
            ssh_key::PrivateKey::random(&mut rand::thread_rng(), ssh_key::Algorithm::Ed25519)
                .expect("Cannot generate private keys"),
        ],
        ..Default::default()
    }
}

fn pipe() -> (IO, IO) {
    let (one, two) = tokio::io::duplex(hawser_packet::Packet::MAX_SIZE * 16);

    (
        BufStream::new(one).compat(),
        BufStream::new(two).compat(),
    )
}

#[tokio::test]
async fn it_echoes_a_large_transfer() -> Result<(), eyre::Error> {
    init();

    const BYTES_TO_SEND: usize = 0x200000;

    let (serverside, clientside) = pipe();

    tokio::try_join!(
        async {
            let session = Session::new(serverside, server_config()).await?;
            let connect = session.handle(Service::new()).await?;

            let channel = connect
                .channel_opens()
                .try_next()
                .await?
                .expect("Disconnected before opening a channel")
                .accept()
                .await?;

            futures::io::copy(&mut channel.as_reader(), &mut channel.as_writer()).await?;
            channel.eof().await?;
            channel.close().await?;

            Ok::<_, eyre::Error>(())
        },
        async {
            let session = Session::new(clientside, Client::default()).await?;
            let connect = session.request(Service::new()).await?;

            let Response::Success(channel) =
                connect.channel_open(ChannelOpenContext::Session).await?
            else {
                panic!("Channel opening rejected server-side")
            };

            let (mut sent, mut received) = (Sha1::new(), Sha1::new());

            futures::join!(
                async {
                    let mut writer = channel.as_writer();
                    let mut remaining = BYTES_TO_SEND;

                    while remaining > 0 {
                        let mut chunk = [0u8; 0x1000];
                        rand::thread_rng().fill_bytes(&mut chunk);
                        sent.update(chunk);

                        writer.write_all(&chunk).await.expect("write failed");
                        remaining -= chunk.len();
                    }

                    writer.flush().await.expect("flush failed");
                    channel.eof().await.expect("eof failed");
                },
                async {
                    let mut reader = channel.as_reader();
                    let mut buffer = [0u8; 0x1000];

                    loop {
                        let count = reader.read(&mut buffer).await.expect("read failed");
                        if count == 0 {
                            break;
                        }

                        received.update(&buffer[..count]);
                    }
                },
            );

            channel.close().await?;

            assert_eq!(sent.finalize(), received.finalize());

            Ok::<_, eyre::Error>(())
        },
    )?;

    Ok(())
}

#[tokio::test]
async fn it_keeps_the_windows_paired_through_an_echo_loop() -> Result<(), eyre::Error> {
    init();

    const LINE: &[u8] = b"0123456789\n";
    const ROUNDS: usize = 500;

    let window = WindowConfig {
        initial: 1024,
        max_packet: 256,
    };

    let (serverside, clientside) = pipe();
    let (snapshots, mut watch) = tokio::sync::mpsc::unbounded_channel::<u32>();

    tokio::try_join!(
        async {
            let session = Session::new(serverside, server_config()).await?;
            let connect = session.handle(Service::new().window(window)).await?;

            let channel = connect
                .channel_opens()
                .try_next()
                .await?
                .expect("Disconnected before opening a channel")
                .accept()
                .await?;

            {
                let mut reader = channel.as_reader();
                let mut writer = channel.as_writer();
                let mut line = [0u8; LINE.len()];

                for _ in 0..ROUNDS {
                    reader.read_exact(&mut line).await?;
                    writer.write_all(&line).await?;
                    writer.flush().await?;

                    snapshots
                        .send(channel.local_window_size())
                        .expect("The watcher went away");
                }
            }

            channel.close().await?;

            Ok::<_, eyre::Error>(())
        },
        async {
            let session = Session::new(clientside, Client::default()).await?;
            let connect = session.request(Service::new().window(window)).await?;

            let Response::Success(channel) =
                connect.channel_open(ChannelOpenContext::Session).await?
            else {
                panic!("Channel opening rejected server-side")
            };

            {
                let mut reader = channel.as_reader();
                let mut writer = channel.as_writer();
                let mut line = [0u8; LINE.len()];

                for _ in 0..ROUNDS {
                    let before = channel.remote_window_size();

                    writer.write_all(LINE).await?;
                    writer.flush().await?;

                    // In flight: the pair differs by exactly the
                    // unacknowledged line.
                    assert_eq!(channel.remote_window_size(), before - LINE.len() as u32);

                    reader.read_exact(&mut line).await?;
                    assert_eq!(&line, LINE);

                    // Round-tripped: the peer's view of our credit and
                    // ours agree again.
                    let paired = watch.recv().await.expect("The server went away");
                    assert_eq!(channel.remote_window_size(), paired);
                }
            }

            channel.close().await?;

            Ok::<_, eyre::Error>(())
        },
    )?;

    Ok(())
}

#[tokio::test]
async fn it_closes_idempotently() -> Result<(), eyre::Error> {
    init();

    let (serverside, clientside) = pipe();

    tokio::try_join!(
        async {
            let session = Session::new(serverside, server_config()).await?;
            let connect = session.handle(Service::new()).await?;

            let channel = connect
                .channel_opens()
                .try_next()
                .await?
                .expect("Disconnected before opening a channel")
                .accept()
                .await?;

            channel.close().await?;
            assert!(channel.is_closed());

            // Closing an already closed channel performs no I/O and
            // completes immediately.
            channel.close().await?;

            Ok::<_, eyre::Error>(())
        },
        async {
            let session = Session::new(clientside, Client::default()).await?;
            let connect = session.request(Service::new()).await?;

            let Response::Success(channel) =
                connect.channel_open(ChannelOpenContext::Session).await?
            else {
                panic!("Channel opening rejected server-side")
            };

            channel.close().await?;
            channel.close().await?;

            // A closed channel refuses further writes.
            let mut writer = channel.as_writer();
            assert!(writer.write_all(b"too late").await.is_err());

            Ok::<_, eyre::Error>(())
        },
    )?;

    Ok(())
}

#[tokio::test]
async fn it_fails_a_second_concurrent_read() -> Result<(), eyre::Error> {
    init();

    let (serverside, clientside) = pipe();

    tokio::try_join!(
        async {
            let session = Session::new(serverside, server_config()).await?;
            let connect = session.handle(Service::new()).await?;

            let channel = connect
                .channel_opens()
                .try_next()
                .await?
                .expect("Disconnected before opening a channel")
                .accept()
                .await?;

            let _first = channel.as_reader();
            let mut second = channel.as_reader();

            let mut buffer = [0u8; 16];
            let err = second
                .read(&mut buffer)
                .await
                .expect_err("The conflicting read succeeded");
            assert!(err.to_string().contains("previous pending read"));

            channel.close().await?;

            Ok::<_, eyre::Error>(())
        },
        async {
            let session = Session::new(clientside, Client::default()).await?;
            let connect = session.request(Service::new()).await?;

            let Response::Success(channel) =
                connect.channel_open(ChannelOpenContext::Session).await?
            else {
                panic!("Channel opening rejected server-side")
            };

            channel.close().await?;

            Ok::<_, eyre::Error>(())
        },
    )?;

    Ok(())
}

#[tokio::test]
async fn it_transfers_across_a_forced_rekey() -> Result<(), eyre::Error> {
    init();

    const BYTES_TO_SEND: usize = 0x40000;

    // A threshold low enough to re-key several times mid-transfer.
    let rekey = RekeyLimits {
        bytes: 0x8000,
        ..Default::default()
    };

    let (serverside, clientside) = pipe();

    tokio::try_join!(
        async {
            let config = Server {
                rekey,
                ..server_config()
            };
            let session = Session::new(serverside, config).await?;
            let connect = session.handle(Service::new()).await?;

            let channel = connect
                .channel_opens()
                .try_next()
                .await?
                .expect("Disconnected before opening a channel")
                .accept()
                .await?;

            futures::io::copy(&mut channel.as_reader(), &mut channel.as_writer()).await?;
            channel.eof().await?;
            channel.close().await?;

            Ok::<_, eyre::Error>(())
        },
        async {
            let config = Client {
                rekey,
                ..Default::default()
            };
            let session = Session::new(clientside, config).await?;
            let connect = session.request(Service::new()).await?;

            let Response::Success(channel) =
                connect.channel_open(ChannelOpenContext::Session).await?
            else {
                panic!("Channel opening rejected server-side")
            };

            let (mut sent, mut received) = (Sha1::new(), Sha1::new());

            {
                let mut writer = channel.as_writer();
                let mut reader = channel.as_reader();
                let mut echoed = vec![0u8; 0x1000];

                let mut remaining = BYTES_TO_SEND;
                while remaining > 0 {
                    let mut chunk = [0u8; 0x1000];
                    rand::thread_rng().fill_bytes(&mut chunk);
                    sent.update(chunk);

                    writer.write_all(&chunk).await?;
                    writer.flush().await?;

                    reader.read_exact(&mut echoed).await?;
                    received.update(&echoed);

                    remaining -= chunk.len();
                }
            }

            channel.eof().await?;
            channel.close().await?;

            assert_eq!(sent.finalize(), received.finalize());

            Ok::<_, eyre::Error>(())
        },
    )?;

    Ok(())
}
