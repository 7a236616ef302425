//! A minimal server echoing back everything sent on a shell, the
//! smallest useful composition of the stack.

use std::net::SocketAddr;

use async_compat::CompatExt;
use clap::Parser;
use color_eyre::eyre;
use futures::TryFutureExt;
use hawser::{side::server::Server, Session};
use hawser_auth::handler::{none, Auth};
use ssh_key::PrivateKey;
use tokio::{
    net::{TcpListener, TcpStream},
    task,
};

/// An echo server: every shell and exec request echoes its input.
#[derive(Debug, Parser)]
struct Args {
    /// The address to bind the server on.
    address: SocketAddr,
}

async fn session(stream: TcpStream, keys: Vec<PrivateKey>) -> eyre::Result<()> {
    let stream = futures::io::BufReader::new(stream.compat());
    let session = Session::new(
        stream,
        Server {
            keys,
            ..Default::default()
        },
    )
    .await?;

    tracing::info!("Successfully connected to `{}`", session.peer_id());

    let authentication = Auth::new(hawser_connect::Service::new())
        .banner("Welcome, and get echo'd back\r\n")
        .none(|_| none::Response::Accept);
    let connect = std::sync::Arc::new(session.handle(authentication).await?);

    let handlers = std::sync::Arc::new(
        hawser_server::Handlers::new().commands(hawser_server::command::EchoShell),
    );

    hawser_server::serve(connect, handlers).await?;

    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Args::parse();

    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let keys = vec![PrivateKey::random(
        &mut rand::thread_rng(),
        ssh_key::Algorithm::Ed25519,
    )?];
    let listener = TcpListener::bind(args.address).await?;

    loop {
        let (stream, _addr) = listener.accept().await?;
        let keys = keys.clone();

        task::spawn(
            session(stream, keys)
                .inspect_err(|err| tracing::error!("Session ended with an error: {err:?}")),
        );
    }
}
