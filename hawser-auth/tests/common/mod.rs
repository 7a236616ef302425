//! A tiny terminal service flagging that it has been reached.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use hawser::{service, session::Session, side::Side, Pipe, Result};

#[derive(Debug, Clone, Default)]
pub struct Cookie {
    flag: Arc<AtomicBool>,
}

impl Cookie {
    pub fn is_flagged(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl service::Handler for Cookie {
    type Err = hawser::Error;
    type Ok<IO: Pipe, S: Side> = ();

    const SERVICE_NAME: &'static str = "ssh-connection";

    async fn on_request<IO, S>(&mut self, _: Session<IO, S>) -> Result<()>
    where
        IO: Pipe,
        S: Side,
    {
        self.flag.store(true, Ordering::SeqCst);

        Ok(())
    }
}

impl service::Request for Cookie {
    type Err = hawser::Error;
    type Ok<IO: Pipe, S: Side> = ();

    const SERVICE_NAME: &'static str = "ssh-connection";

    async fn on_accept<IO, S>(&mut self, _: Session<IO, S>) -> Result<()>
    where
        IO: Pipe,
        S: Side,
    {
        self.flag.store(true, Ordering::SeqCst);

        Ok(())
    }
}
