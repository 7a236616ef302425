use futures::{future::BoxFuture, task, FutureExt};
use hawser::{session::Session, side::Side, Pipe};
use hawser_packet::Packet;

type SendFut<IO, S> = BoxFuture<'static, (hawser::Result<()>, Box<Session<IO, S>>)>;
type RecvFut<IO, S> = BoxFuture<'static, (hawser::Result<Packet>, Box<Session<IO, S>>)>;

/// What the session is currently busy with.
enum State<IO: Pipe, S: Side> {
    /// Idling, waiting for something to do.
    Idle(Option<Box<Session<IO, S>>>),

    /// Sending a queued packet.
    Sending(SendFut<IO, S>),

    /// Receiving a packet.
    Recving(RecvFut<IO, S>),
}

/// The owner of the [`Session`], alternating between flushing the
/// outbound queue and receiving packets, whichever task polls it.
pub struct Poller<IO: Pipe, S: Side> {
    state: State<IO, S>,

    /// Messages awaiting to be sent to the peer.
    queue: flume::Receiver<Packet>,

    /// Message awaiting to be taken by the interested task.
    buffer: Option<Packet>,
}

impl<IO, S> Poller<IO, S>
where
    IO: Pipe,
    S: Side,
{
    pub fn new(session: Session<IO, S>) -> (Self, flume::Sender<Packet>) {
        let (tx, rx) = flume::unbounded();

        (
            Self {
                state: State::Idle(Some(session.into())),

                queue: rx,
                buffer: None,
            },
            tx,
        )
    }

    /// Peek at the next received packet, leaving it in place for the
    /// task it is destined to.
    pub fn poll_peek(
        &mut self,
        cx: &mut task::Context,
    ) -> task::Poll<hawser::Result<&mut Option<Packet>>> {
        if self.buffer.is_none() {
            self.buffer = futures::ready!(self.poll_next(cx)).transpose()?;
        }

        task::Poll::Ready(Ok(&mut self.buffer))
    }

    fn poll_next(
        &mut self,
        cx: &mut task::Context<'_>,
    ) -> task::Poll<Option<hawser::Result<Packet>>> {
        if !matches!(self.state, State::Recving(_)) {
            // Flushing before receiving is necessary, but write-side
            // errors must not bubble up to the read side: the peer may
            // have closed the pipe for writing with messages still
            // readable in it.
            futures::ready!(self.poll_flush(cx)).ok();
        }

        match &mut self.state {
            State::Recving(fut) => {
                let (result, session) = futures::ready!(fut.poll_unpin(cx));

                tracing::trace!(
                    "Polled incoming data from peer: ^{:x?}",
                    result.as_ref().map(|packet| packet[0]),
                );

                self.state = State::Idle(Some(session));

                task::Poll::Ready(Some(result))
            }

            State::Idle(session) => {
                let Some(mut session) = session.take() else {
                    unreachable!()
                };

                if session.readable().boxed_local().poll_unpin(cx).is_ready() {
                    self.state =
                        State::Recving(async move { (session.recv().await, session) }.boxed());

                    cx.waker().wake_by_ref();
                } else {
                    self.state = State::Idle(Some(session));
                }

                task::Poll::Pending
            }

            State::Sending(_) => unreachable!(),
        }
    }

    /// Drive the outbound queue until it is empty.
    pub fn poll_flush(&mut self, cx: &mut task::Context<'_>) -> task::Poll<hawser::Result<()>> {
        match &mut self.state {
            State::Sending(fut) => {
                let (result, session) = futures::ready!(fut.poll_unpin(cx));

                self.state = State::Idle(Some(session));
                result?;

                cx.waker().wake_by_ref();
                task::Poll::Pending
            }

            State::Idle(session) => {
                let Some(mut session) = session.take() else {
                    unreachable!()
                };

                if let Ok(item) = self.queue.try_recv() {
                    self.state =
                        State::Sending(async move { (session.send(item).await, session) }.boxed());

                    cx.waker().wake_by_ref();
                    task::Poll::Pending
                } else {
                    self.state = State::Idle(Some(session));

                    task::Poll::Ready(Ok(()))
                }
            }

            State::Recving(_) => {
                // A receive is in flight, queued messages will go out
                // on the next flush once it resolves.
                cx.waker().wake_by_ref();
                task::Poll::Pending
            }
        }
    }
}
