use std::sync::atomic::{AtomicU32, Ordering};

use futures::task;

/// The flow-control sizing applied to channels we open or accept.
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    /// Credit initially granted to the peer, in bytes (default 2MiB).
    pub initial: u32,

    /// Largest data packet we accept on the channel, in bytes (default 32KiB).
    pub max_packet: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            initial: 0x20_0000,
            max_packet: 0x8000,
        }
    }
}

/// The credit granted to the *peer*: consumed by received data,
/// replenished by the `SSH_MSG_CHANNEL_WINDOW_ADJUST` messages we send.
pub struct LocalWindow {
    config: WindowConfig,
    inner: AtomicU32,
}

impl LocalWindow {
    pub fn new(config: WindowConfig) -> Self {
        Self {
            inner: config.initial.into(),
            config,
        }
    }

    pub fn size(&self) -> u32 {
        self.inner.load(Ordering::SeqCst)
    }

    /// Debit received bytes, reporting by how much the peer overflowed
    /// the window if it did.
    pub fn consume(&self, size: u32) -> Result<(), u32> {
        let previous = self
            .inner
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |window| {
                window.checked_sub(size)
            });

        match previous {
            Ok(_) => Ok(()),
            Err(window) => Err(size - window),
        }
    }

    /// The credit to hand back to the peer, once the window fell below
    /// half of its initial size.
    pub fn adjustable(&self) -> Option<u32> {
        let previous = self
            .inner
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |window| {
                if window <= self.config.initial / 2 {
                    Some(self.config.initial)
                } else {
                    None
                }
            })
            .ok();

        previous.map(|previous| self.config.initial - previous)
    }
}

/// The credit granted by the *peer*: reserved by sent data,
/// replenished by the `SSH_MSG_CHANNEL_WINDOW_ADJUST` messages it sends.
pub struct RemoteWindow {
    inner: AtomicU32,
    waker: task::AtomicWaker,
}

impl RemoteWindow {
    /// Replenish the window, saturating at `u32::MAX`, and wake the
    /// writer suspended on it.
    pub fn replenish(&self, bytes_to_add: u32) {
        let _ = self
            .inner
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |window| {
                Some(window.saturating_add(bytes_to_add))
            });

        self.waker.wake();
    }

    pub fn size(&self) -> u32 {
        self.inner.load(Ordering::SeqCst)
    }

    fn try_reserve(&self, mut amount: u32) -> Option<u32> {
        let reserved = self
            .inner
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |window| {
                if amount <= window {
                    Some(window - amount)
                } else {
                    amount = window;

                    if amount > 0 {
                        Some(0)
                    } else {
                        None
                    }
                }
            })
            .is_ok();

        reserved.then_some(amount)
    }

    /// Reserve up to `amount` bytes of sending credit, suspending the
    /// task while the window is empty.
    pub fn poll_reserve(&self, cx: &mut task::Context, amount: u32) -> task::Poll<u32> {
        if let Some(size) = self.try_reserve(amount) {
            task::Poll::Ready(size)
        } else {
            tracing::debug!("Peer channel window is empty, awaiting replenishment");

            self.waker.register(cx.waker());

            // The window may have been replenished while registering.
            match self.try_reserve(amount) {
                Some(size) => task::Poll::Ready(size),
                None => task::Poll::Pending,
            }
        }
    }
}

impl From<u32> for RemoteWindow {
    fn from(value: u32) -> Self {
        Self {
            inner: value.into(),
            waker: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_window_adjusts_below_half() {
        let window = LocalWindow::new(WindowConfig {
            initial: 1000,
            max_packet: 100,
        });

        assert!(window.consume(400).is_ok());
        assert_eq!(window.adjustable(), None);

        assert!(window.consume(200).is_ok());
        assert_eq!(window.adjustable(), Some(600));
        assert_eq!(window.size(), 1000);
    }

    #[test]
    fn local_window_reports_overflows() {
        let window = LocalWindow::new(WindowConfig {
            initial: 100,
            max_packet: 100,
        });

        assert_eq!(window.consume(150), Err(50));
    }

    #[test]
    fn remote_window_saturates() {
        let window = RemoteWindow::from(u32::MAX - 10);

        window.replenish(100);
        assert_eq!(window.size(), u32::MAX);
    }

    #[test]
    fn remote_window_reserves_what_it_can() {
        let window = RemoteWindow::from(100);

        assert_eq!(window.try_reserve(60), Some(60));
        assert_eq!(window.try_reserve(60), Some(40));
        assert_eq!(window.try_reserve(60), None);

        window.replenish(10);
        assert_eq!(window.try_reserve(60), Some(10));
    }
}
