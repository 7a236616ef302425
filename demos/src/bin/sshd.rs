//! A development `sshd`: serves shells (echo), the `sftp` subsystem
//! and TCP/IP forwarding over real sockets.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use async_compat::CompatExt;
use clap::Parser;
use color_eyre::eyre::{self, eyre};
use futures::TryFutureExt;
use hawser::{side::server::Server, stream::RekeyLimits, Session};
use hawser_auth::{handler::none, handler::Auth, AuthorizedKeys};
use hawser_connect::channel::WindowConfig;
use hawser_server::{command::EchoShell, forward, socket::SocketOptions, Handlers};
use ssh_key::PrivateKey;
use tokio::{net::TcpListener, task};

/// A development SSH daemon.
#[derive(Debug, Parser)]
struct Args {
    /// The port to listen on.
    #[arg(short, long, default_value_t = 2222)]
    port: u16,

    /// The address to bind on.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Path to the host key, generated when missing.
    #[arg(long, default_value = "hawser_host_key")]
    host_key: PathBuf,

    /// Path to an `authorized_keys` file enabling publickey
    /// authentication; without it every peer is let in.
    #[arg(long)]
    authorized_keys: Option<PathBuf>,

    /// `key=value` configuration properties.
    #[arg(short = 'o', value_parser = parse_property)]
    options: Vec<(String, String)>,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("`{raw}` is not a `key=value` property"))
}

/// The recognized `-o` properties folded over the defaults.
#[derive(Debug, Default)]
struct Properties {
    window: WindowConfig,
    rekey: RekeyLimits,
    socket: SocketOptions,
    sftp: hawser_sftp::SftpConfig,
}

impl Properties {
    fn parse(options: &[(String, String)]) -> eyre::Result<Self> {
        let mut properties = Self::default();

        for (key, value) in options {
            let parse =
                |value: &str| -> eyre::Result<u64> { Ok(value.parse::<u64>()?) };
            let parse_bool = |value: &str| -> eyre::Result<bool> { Ok(value.parse::<bool>()?) };

            match key.as_str() {
                "window-size" => properties.window.initial = parse(value)? as u32,
                "packet-size" => properties.window.max_packet = parse(value)? as u32,
                "rekey-bytes-limit" => properties.rekey.bytes = parse(value)? as usize,
                "rekey-time-limit" => {
                    properties.rekey.time = Duration::from_secs(parse(value)?)
                }
                "socket-keepalive" => properties.socket.keepalive = parse_bool(value)?,
                "socket-linger" => {
                    properties.socket.linger = Some(Duration::from_secs(parse(value)?))
                }
                "socket-rcvbuf" => properties.socket.recv_buffer = Some(parse(value)? as u32),
                "socket-sndbuf" => properties.socket.send_buffer = Some(parse(value)? as u32),
                "socket-reuseaddr" => properties.socket.reuseaddr = parse_bool(value)?,
                "tcp-nodelay" => properties.socket.nodelay = parse_bool(value)?,
                "sftp-version" => properties.sftp.version = parse(value)? as u32,
                "sftp-handle-size" => properties.sftp.handle_size = parse(value)? as usize,
                "sftp-handle-rand-max-rounds" => {
                    properties.sftp.handle_rand_max_rounds = parse(value)? as usize
                }
                "max-open-handles-per-session" => {
                    properties.sftp.max_open_handles = Some(parse(value)? as usize)
                }
                "sftp-max-packet-length" => {
                    properties.sftp.max_packet_length = parse(value)? as u32
                }
                key => return Err(eyre!("unrecognized property `{key}`")),
            }
        }

        Ok(properties)
    }
}

fn host_key(path: &PathBuf) -> eyre::Result<PrivateKey> {
    if path.exists() {
        return Ok(PrivateKey::read_openssh_file(path)?);
    }

    let key = PrivateKey::random(&mut rand::thread_rng(), ssh_key::Algorithm::Ed25519)?;
    key.write_openssh_file(path, ssh_key::LineEnding::LF)?;

    tracing::info!("Generated a fresh host key at `{}`", path.display());

    Ok(key)
}

async fn session(
    stream: tokio::net::TcpStream,
    keys: Vec<PrivateKey>,
    properties: &Properties,
    authorized_keys: Option<&PathBuf>,
) -> eyre::Result<()> {
    let config = Server {
        keys,
        rekey: properties.rekey,
        ..Default::default()
    };

    let session = Session::new(futures::io::BufReader::new(stream.compat()), config).await?;

    tracing::info!("Successfully connected to `{}`", session.peer_id());

    let service = hawser_connect::Service::new().window(properties.window);

    let connect = match authorized_keys {
        Some(path) => {
            session
                .handle(Auth::new(service).publickey(AuthorizedKeys::new(path)))
                .await?
        }
        None => {
            session
                .handle(Auth::new(service).none(|_| none::Response::Accept))
                .await?
        }
    };

    let handlers = Handlers::new()
        .commands(EchoShell)
        .sftp(properties.sftp.clone())
        .forwarding(forward::AllowAll);

    hawser_server::serve(Arc::new(connect), Arc::new(handlers)).await?;

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

    let properties = Arc::new(Properties::parse(&args.options)?);
    let keys = vec![host_key(&args.host_key)?];

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    let listener: TcpListener = properties.socket.bind(addr)?;

    tracing::info!("Listening on `{addr}`");

    loop {
        let (stream, peer) = listener.accept().await?;
        properties.socket.apply(&stream)?;

        tracing::debug!("Accepted a connection from `{peer}`");

        let keys = keys.clone();
        let properties = properties.clone();
        let authorized_keys = args.authorized_keys.clone();

        task::spawn(async move {
            session(stream, keys, &properties, authorized_keys.as_ref())
                .inspect_err(|err| tracing::error!("Session ended with an error: {err:?}"))
                .await
        });
    }
}
