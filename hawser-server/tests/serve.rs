//! Serves full sessions over an in-memory pipe and drives them with a
//! real client stack.

use std::sync::Arc;

use async_compat::CompatExt;
use futures::{AsyncReadExt, AsyncWriteExt};
use hawser::{
    side::{client::Client, server::Server},
    Session,
};
use hawser_auth::{handler, handler::none, request};
use hawser_connect::{
    channel::{request::Response as RequestResponse, ChannelRequestContext},
    channel_open::{ChannelOpenContext, Response},
};
use hawser_server::{command::EchoShell, forward, Handlers};
use tokio::io::BufStream;

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

/// Whether the serving loop ended because the peer went away, the
/// expected outcome of every test here.
fn ended_by_disconnect(result: Result<(), hawser_server::Error>) -> Result<(), eyre::Error> {
    match result {
        Ok(()) => Ok(()),
        Err(hawser_server::Error::Connect(hawser_connect::Error::Transport(
            hawser::Error::Disconnected(_),
        ))) => Ok(()),
        Err(err) => Err(err.into()),
    }
}

async fn serve_side(
    io: tokio::io::DuplexStream,
    handlers: Handlers,
) -> Result<(), eyre::Error> {
    let session = Session::new(BufStream::new(io).compat(), server_config()).await?;

    let connect = session
        .handle(handler::Auth::new(hawser_connect::Service::new()).none(|_| none::Response::Accept))
        .await?;

    ended_by_disconnect(
        hawser_server::serve(Arc::new(connect), Arc::new(handlers)).await,
    )
}

async fn client_side(
    io: tokio::io::DuplexStream,
) -> Result<hawser_connect::Connect<impl hawser::Pipe, Client>, eyre::Error> {
    let session = Session::new(BufStream::new(io).compat(), Client::default()).await?;

    Ok(session
        .request(request::Auth::new("ferris", hawser_connect::Service::new()))
        .await?)
}

#[tokio::test]
async fn it_serves_an_echo_exec() -> Result<(), eyre::Error> {
    init();

    let (serverside, clientside) = tokio::io::duplex(hawser_packet::Packet::MAX_SIZE * 16);

    tokio::try_join!(
        serve_side(serverside, Handlers::new().commands(EchoShell)),
        async {
            let connect = client_side(clientside).await?;

            let Response::Success(channel) =
                connect.channel_open(ChannelOpenContext::Session).await?
            else {
                panic!("Channel opening rejected server-side")
            };

            let response = channel
                .request_wait(ChannelRequestContext::Exec {
                    command: "echo".into(),
                })
                .await?;
            assert_eq!(response, RequestResponse::Success);

            {
                let mut writer = channel.as_writer();
                writer.write_all(b"over the bollard").await?;
                writer.flush().await?;
            }
            channel.eof().await?;

            let mut echoed = Vec::new();
            channel.as_reader().read_to_end(&mut echoed).await?;
            assert_eq!(echoed, b"over the bollard");

            channel.close().await?;

            Ok(())
        },
    )?;

    Ok(())
}

#[tokio::test]
async fn it_forwards_direct_tcpip_to_an_echo_acceptor() -> Result<(), eyre::Error> {
    init();

    // A local echo acceptor standing in for the forwarding target.
    let acceptor = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let echo_port = acceptor.local_addr()?.port();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = acceptor.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                tokio::io::copy(&mut reader, &mut writer).await.ok();
            });
        }
    });

    let (serverside, clientside) = tokio::io::duplex(hawser_packet::Packet::MAX_SIZE * 16);

    tokio::try_join!(
        serve_side(
            serverside,
            Handlers::new().forwarding(forward::AllowAll),
        ),
        async {
            let connect = client_side(clientside).await?;

            for round in 0..10 {
                let Response::Success(channel) = connect
                    .channel_open(ChannelOpenContext::DirectTcpip {
                        address: "127.0.0.1".into(),
                        port: u32::from(echo_port),
                        originator_address: "127.0.0.1".into(),
                        originator_port: 0,
                    })
                    .await?
                else {
                    panic!("Forwarding rejected on round {round}")
                };

                {
                    let mut writer = channel.as_writer();
                    writer.write_all(b"socksProxyTest").await?;
                    writer.flush().await?;
                }

                let mut reply = [0u8; 14];
                channel.as_reader().read_exact(&mut reply).await?;
                assert_eq!(&reply, b"socksProxyTest");

                channel.eof().await?;
                channel.close().await?;
            }

            Ok(())
        },
    )?;

    Ok(())
}

#[tokio::test]
async fn it_refuses_forwarding_behind_the_filter() -> Result<(), eyre::Error> {
    init();

    let (serverside, clientside) = tokio::io::duplex(hawser_packet::Packet::MAX_SIZE * 16);

    tokio::try_join!(
        serve_side(serverside, Handlers::new()),
        async {
            let connect = client_side(clientside).await?;

            let response = connect
                .channel_open(ChannelOpenContext::DirectTcpip {
                    address: "127.0.0.1".into(),
                    port: 7,
                    originator_address: "127.0.0.1".into(),
                    originator_port: 0,
                })
                .await?;

            assert!(
                matches!(response, Response::Failure { .. }),
                "The default filter let a dial through",
            );

            Ok(())
        },
    )?;

    Ok(())
}

#[tokio::test]
async fn it_accepts_with_every_socket_option_set() -> Result<(), eyre::Error> {
    init();

    use hawser_server::socket::SocketOptions;

    let options = SocketOptions {
        keepalive: true,
        linger: Some(std::time::Duration::from_secs(5)),
        recv_buffer: Some(1024),
        send_buffer: Some(1024),
        reuseaddr: true,
        nodelay: true,
    };

    let listener = options.bind("127.0.0.1:0".parse()?)?;
    let addr = listener.local_addr()?;

    let accepted = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        options.apply(&stream)?;

        Ok::<_, eyre::Error>(())
    });

    tokio::time::timeout(
        std::time::Duration::from_secs(15),
        tokio::net::TcpStream::connect(addr),
    )
    .await??;

    accepted.await??;

    Ok(())
}

#[tokio::test]
async fn it_wires_the_sftp_subsystem() -> Result<(), eyre::Error> {
    init();

    let (serverside, clientside) = tokio::io::duplex(hawser_packet::Packet::MAX_SIZE * 16);

    tokio::try_join!(
        serve_side(serverside, Handlers::new().sftp(Default::default())),
        async {
            let connect = client_side(clientside).await?;

            let Response::Success(channel) =
                connect.channel_open(ChannelOpenContext::Session).await?
            else {
                panic!("Channel opening rejected server-side")
            };

            let response = channel
                .request_wait(ChannelRequestContext::Subsystem {
                    name: "sftp".into(),
                })
                .await?;
            assert_eq!(response, RequestResponse::Success);

            // A raw SFTP INIT, answered by a VERSION packet.
            {
                let mut writer = channel.as_writer();
                writer
                    .write_all(&[0, 0, 0, 5, 1, 0, 0, 0, 6])
                    .await?;
                writer.flush().await?;
            }

            let mut reader = channel.as_reader();

            let mut prefix = [0u8; 4];
            reader.read_exact(&mut prefix).await?;

            let mut body = vec![0u8; u32::from_be_bytes(prefix) as usize];
            reader.read_exact(&mut body).await?;

            assert_eq!(body[0], 2, "Expected a SSH_FXP_VERSION answer");
            assert_eq!(&body[1..5], &[0, 0, 0, 6], "Expected version 6");

            channel.close().await?;

            Ok(())
        },
    )?;

    Ok(())
}
