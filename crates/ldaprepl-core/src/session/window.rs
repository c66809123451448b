//! Windowed flow control
//!
//! The sender may have at most `window` updates in flight. The receiver
//! returns credits with a window message once half of the window was
//! consumed; a sender that runs dry may ask for an update with a window-probe message.

use crate::protocol::WindowMsg;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Credits the local side may spend on outbound updates
#[derive(Debug, Clone)]
pub struct SendWindow {
    credits: Arc<Semaphore>,
}

impl SendWindow {
    /// Window starting with `size` credits
    pub fn new(size: i32) -> Self {
        Self {
            credits: Arc::new(Semaphore::new(usize::try_from(size).unwrap_or(0))),
        }
    }

    /// Wait for one credit and spend it
    pub async fn acquire(&self) -> Result<()> {
        let permit = self
            .credits
            .acquire()
            .await
            .map_err(|_| Error::session("send window closed"))?;
        permit.forget();
        Ok(())
    }

    /// Spend one credit without waiting, false when none is left
    pub fn try_acquire(&self) -> bool {
        match self.credits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Add the credits carried by a window message
    pub fn grant(&self, msg: &WindowMsg) {
        match usize::try_from(msg.num_ack()) {
            Ok(credits) if credits > 0 => {
                self.credits.add_permits(credits);
                tracing::trace!("Send window credited with {}", credits);
            }
            _ => tracing::warn!("Ignoring window message with {} credits", msg.num_ack()),
        }
    }

    /// Credits currently available
    pub fn available(&self) -> usize {
        self.credits.available_permits()
    }

    /// Wake every waiter with an error
    pub fn close(&self) {
        self.credits.close();
    }
}

/// Counts inbound updates and decides when to return credits
#[derive(Debug)]
pub struct ReceiveWindow {
    size: i32,
    threshold: i32,
    consumed: Mutex<i32>,
}

impl ReceiveWindow {
    /// Window advertised to the peer as `size`
    pub fn new(size: i32) -> Self {
        let size = size.max(1);
        Self {
            size,
            threshold: (size / 2).max(1),
            consumed: Mutex::new(0),
        }
    }

    /// Advertised size
    pub fn size(&self) -> i32 {
        self.size
    }

    /// Record one processed update; returns the window message to send back,
    /// if it is time to
    pub fn consume(&self) -> Option<WindowMsg> {
        let mut consumed = self.consumed.lock();
        *consumed += 1;
        if *consumed >= self.threshold {
            let credits = std::mem::take(&mut *consumed);
            tracing::trace!("Returning {} credits", credits);
            Some(WindowMsg::new(credits))
        } else {
            None
        }
    }

    /// Answer to a window-probe message: every credit consumed so far
    pub fn on_window_probe(&self) -> WindowMsg {
        let mut consumed = self.consumed.lock();
        WindowMsg::new(std::mem::take(&mut *consumed))
    }
}
