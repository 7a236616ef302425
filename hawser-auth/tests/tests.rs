//! Round-trips the authentication service between a client and a
//! server session over an in-memory pipe.

use std::io::Write;
use std::sync::atomic::Ordering;

use async_compat::CompatExt;
use hawser::{
    side::{client::Client, server::Server},
    Session,
};
use hawser_auth::{
    handler::{self, keyboard, none, password},
    request, AuthorizedKeys,
};
use tokio::io::BufStream;

mod common;
use common::Cookie;

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
async fn it_authenticates_with_none() -> Result<(), eyre::Error> {
    init();

    let duplex = tokio::io::duplex(hawser_packet::Packet::MAX_SIZE * 4);

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    tokio::try_join!(
        async {
            let server = Server {
                keys: keys(),
                ..Default::default()
            };
            let session = Session::new(BufStream::new(duplex.0).compat(), server).await?;

            session
                .handle(
                    handler::Auth::new(cookie0.clone()).none(|_| none::Response::Accept),
                )
                .await
        },
        async {
            let client = Client::default();
            let session = Session::new(BufStream::new(duplex.1).compat(), client).await?;

            session.request(request::Auth::new("user", cookie1.clone())).await
        },
    )?;

    assert!(cookie0.is_flagged(), "Authentication handling did not succeed");
    assert!(cookie1.is_flagged(), "Authentication request did not succeed");

    Ok(())
}

#[tokio::test]
async fn it_authenticates_with_password() -> Result<(), eyre::Error> {
    init();

    let duplex = tokio::io::duplex(hawser_packet::Packet::MAX_SIZE * 4);

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    tokio::try_join!(
        async {
            let server = Server {
                keys: keys(),
                ..Default::default()
            };
            let session = Session::new(BufStream::new(duplex.0).compat(), server).await?;

            session
                .handle(handler::Auth::new(cookie0.clone()).password(
                    |user: String, password: String, _| {
                        if user == "ferris" && password == "sekreet" {
                            password::Response::Accept
                        } else {
                            password::Response::Reject
                        }
                    },
                ))
                .await
        },
        async {
            let client = Client::default();
            let session = Session::new(BufStream::new(duplex.1).compat(), client).await?;

            session
                .request(request::Auth::new("ferris", cookie1.clone()).password("sekreet"))
                .await
        },
    )?;

    assert!(cookie0.is_flagged(), "Authentication handling did not succeed");
    assert!(cookie1.is_flagged(), "Authentication request did not succeed");

    Ok(())
}

#[tokio::test]
async fn it_authenticates_against_an_authorized_keys_file() -> Result<(), eyre::Error> {
    init();

    let key = ssh_key::PrivateKey::random(&mut rand::thread_rng(), ssh_key::Algorithm::Ed25519)?;

    let mut file = tempfile::NamedTempFile::new()?;
    writeln!(file, "{}", key.public_key().to_openssh()?)?;

    let store = AuthorizedKeys::new(file.path());
    let reloads = store.reload_counter();

    let duplex = tokio::io::duplex(hawser_packet::Packet::MAX_SIZE * 4);

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    tokio::try_join!(
        async {
            let server = Server {
                keys: keys(),
                ..Default::default()
            };
            let session = Session::new(BufStream::new(duplex.0).compat(), server).await?;

            session
                .handle(handler::Auth::new(cookie0.clone()).publickey(store))
                .await
        },
        async {
            let client = Client::default();
            let session = Session::new(BufStream::new(duplex.1).compat(), client).await?;

            session
                .request(request::Auth::new("ferris", cookie1.clone()).publickey(key.clone()))
                .await
        },
    )?;

    assert!(cookie0.is_flagged(), "Authentication handling did not succeed");
    assert!(cookie1.is_flagged(), "Authentication request did not succeed");

    // One reload check for the probe, one for the signed request.
    assert_eq!(reloads.load(Ordering::SeqCst), 2);

    Ok(())
}

#[tokio::test]
async fn it_authenticates_interactively() -> Result<(), eyre::Error> {
    init();

    struct Quiz;

    impl keyboard::KeyboardInteractive for Quiz {
        fn challenge(&mut self, _: String, _: String) -> keyboard::Response {
            keyboard::Response::Challenge(keyboard::Challenge {
                name: "quiz".into(),
                instruction: "Answer to continue".into(),
                prompts: vec![keyboard::Prompt {
                    prompt: "The answer to everything?".into(),
                    echo: true,
                }],
            })
        }

        fn verify(&mut self, _: String, responses: Vec<String>) -> keyboard::Response {
            if responses == ["42"] {
                keyboard::Response::Accept
            } else {
                keyboard::Response::Reject
            }
        }
    }

    let duplex = tokio::io::duplex(hawser_packet::Packet::MAX_SIZE * 4);

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    tokio::try_join!(
        async {
            let server = Server {
                keys: keys(),
                ..Default::default()
            };
            let session = Session::new(BufStream::new(duplex.0).compat(), server).await?;

            session
                .handle(handler::Auth::new(cookie0.clone()).keyboard_interactive(Quiz))
                .await
        },
        async {
            let client = Client::default();
            let session = Session::new(BufStream::new(duplex.1).compat(), client).await?;

            session
                .request(request::Auth::new("ferris", cookie1.clone()).keyboard_interactive(
                    |_instruction: String, prompts: Vec<request::Prompt>| {
                        prompts.iter().map(|_| "42".to_string()).collect()
                    },
                ))
                .await
        },
    )?;

    assert!(cookie0.is_flagged(), "Authentication handling did not succeed");
    assert!(cookie1.is_flagged(), "Authentication request did not succeed");

    Ok(())
}

#[tokio::test]
async fn it_disconnects_exhausted_clients() {
    init();

    let duplex = tokio::io::duplex(hawser_packet::Packet::MAX_SIZE * 4);

    let cookie0 = Cookie::default();
    let cookie1 = Cookie::default();

    let (server, client) = tokio::join!(
        async {
            let server = Server {
                keys: keys(),
                ..Default::default()
            };
            let session = Session::new(BufStream::new(duplex.0).compat(), server)
                .await
                .expect("Cannot open the server session");

            session
                .handle(
                    handler::Auth::new(cookie0.clone())
                        .attempts(handler::Attempts {
                            session: 2,
                            per_method: 1,
                        })
                        .password(|_, _, _| password::Response::Reject),
                )
                .await
        },
        async {
            let client = Client::default();
            let session = Session::new(BufStream::new(duplex.1).compat(), client)
                .await
                .expect("Cannot open the client session");

            session
                .request(
                    request::Auth::new("ferris", cookie1.clone())
                        .password("nope")
                        .password("still-nope")
                        .password("definitely-nope"),
                )
                .await
        },
    );

    assert!(server.is_err(), "The server accepted an exhausted session");
    assert!(client.is_err(), "The client authenticated without credentials");
    assert!(!cookie0.is_flagged());
    assert!(!cookie1.is_flagged());
}
