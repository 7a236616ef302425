//! The packet multiplexer routing received packets to interested
//! tasks and funneling sent packets through a single queue.

use dashmap::DashMap;
use futures::{lock::Mutex, task, FutureExt};
use hawser::{session::Session, side::Side, Pipe};
use hawser_packet::{IntoPacket, Packet};

mod interest;
pub(crate) use interest::Interest;

mod poller;
use poller::Poller;

pub(crate) mod slots;

pub(crate) struct Mux<IO: Pipe, S: Side> {
    queue: flume::Sender<Packet>,
    poller: Mutex<Poller<IO, S>>,
    interests: DashMap<Interest, task::AtomicWaker>,
}

impl<IO, S> From<Session<IO, S>> for Mux<IO, S>
where
    IO: Pipe,
    S: Side,
{
    fn from(session: Session<IO, S>) -> Self {
        let (poller, queue) = Poller::new(session);

        Self {
            queue,
            poller: poller.into(),
            interests: Default::default(),
        }
    }
}

impl<IO, S> Mux<IO, S>
where
    IO: Pipe,
    S: Side,
{
    /// Declare an interest, claiming the matching packets.
    ///
    /// # Panics
    ///
    /// Registering an interest twice is a programming error inside the
    /// crate and panics.
    pub fn register(&self, interest: Interest) {
        #[allow(clippy::panic)]
        if !self.try_register(interest) {
            panic!("Unable to register multiple concurrent interests for `{interest:?}`");
        }
    }

    /// Declare an interest, unless it is already claimed by another task.
    pub fn try_register(&self, interest: Interest) -> bool {
        use dashmap::mapref::entry::Entry;

        let registered = match self.interests.entry(interest) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Default::default());

                true
            }
        };

        if registered {
            tracing::trace!("Registered interest for `{interest:?}`");
        }

        registered
    }

    pub fn unregister(&self, interest: &Interest) {
        if let Some((interest, waker)) = self.interests.remove(interest) {
            tracing::trace!("Unregistered interest for `{interest:?}`");

            // Wake the unregistered task to signal it to finish.
            waker.wake();
        }
    }

    pub fn unregister_if(&self, filter: impl Fn(&Interest) -> bool) {
        // Collected to let go of the map references, `remove` in
        // `Self::unregister` would deadlock otherwise.
        for interest in self
            .interests
            .iter()
            .map(|interest| *interest.key())
            .filter(|interest| filter(interest))
            .collect::<Vec<_>>()
        {
            self.unregister(&interest);
        }
    }

    /// Poll for the next packet matching the `interest`, waking the
    /// rightful owner of mismatching packets; yields `None` once the
    /// interest is unregistered or the receiving side is dead.
    pub fn poll_interest(
        &self,
        cx: &mut task::Context,
        interest: &Interest,
    ) -> task::Poll<Option<hawser::Result<Packet>>> {
        if self
            .interests
            .get(interest)
            .as_deref()
            .map(|waker| waker.register(cx.waker()))
            .is_none()
        {
            tracing::trace!("{interest:?}: polled while unregistered, reporting dead");

            return task::Poll::Ready(None);
        }

        let mut poller = futures::ready!(self.poller.lock().poll_unpin(cx));
        let buffer = match futures::ready!(poller.poll_peek(cx)) {
            Ok(buffer) => buffer,
            Err(err) => return task::Poll::Ready(Some(Err(err))),
        };

        match buffer.take() {
            None => {
                tracing::trace!("{interest:?}: receiver dead, unregistering every interest");

                // Wake up every task to let them return early.
                self.unregister_if(|_| true);

                task::Poll::Ready(None)
            }
            Some(packet) => {
                let Some(packet_interest) = Interest::parse(&packet) else {
                    return task::Poll::Ready(Some(Err(hawser::Error::UnexpectedMessage)));
                };

                if interest == &packet_interest {
                    task::Poll::Ready(Some(Ok(packet)))
                } else {
                    match self.interests.get(&packet_interest).as_deref() {
                        Some(waker) => {
                            tracing::trace!(
                                "{interest:?} != {packet_interest:?}: storing the packet, waking its owner"
                            );

                            *buffer = Some(packet);
                            waker.wake();

                            task::Poll::Pending
                        }
                        None => {
                            tracing::warn!(
                                "!{packet_interest:?}: dropped {} bytes, unclaimed interest",
                                packet.payload.len(),
                            );

                            cx.waker().wake_by_ref();
                            task::Poll::Pending
                        }
                    }
                }
            }
        }
    }

    /// Queue a packet, sent on the next flush.
    pub fn push(&self, item: impl IntoPacket) {
        self.queue.send(item.into_packet()).ok();
    }

    pub fn poll_flush(&self, cx: &mut task::Context) -> task::Poll<hawser::Result<()>> {
        let mut poller = futures::ready!(self.poller.lock().poll_unpin(cx));

        poller.poll_flush(cx)
    }

    /// Queue a packet and flush the whole queue.
    pub async fn send(&self, item: impl IntoPacket) -> hawser::Result<()> {
        self.push(item);

        futures::future::poll_fn(|cx| self.poll_flush(cx)).await
    }
}
