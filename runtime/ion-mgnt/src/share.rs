//! Share Proxy
//!
//! A second control surface that owns nothing. Once a shared resource has been
//! published, commands are handed to that resource's own handler verbatim;
//! until then they fail with `NoSuchOperation`.
//!
//! One reserved command is answered locally so that switching an already
//! shared handle into share mode through the proxy is a no-op, not an error.

use alloc::sync::Arc;
use spin::Once;
use static_assertions::assert_impl_all;
use thiserror::Error;

/// Reserved command: "enter share mode"
pub const SHARE_MODE_CMD: u32 = 0xFFFF_FFFF;

/// Answer to `SHARE_MODE_CMD`, whatever the proxy state
pub const SHARE_MODE_ACK: isize = 0;

/// Errors returned on the share control surface
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ShareError {
    #[error("no such operation")]
    NoSuchOperation,

    #[error("share proxy already bound")]
    AlreadyBound,

    #[error("shared resource error {0}")]
    Resource(i32),
}

/// Request handler of a shared object
///
/// Called concurrently from any number of callers; any serialization is the
/// implementor's business.
pub trait SharedResource: Send + Sync {
    fn ioctl(&self, cmd: u32, arg: usize) -> Result<isize, ShareError>;
}

/// Binding state of the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Unbound,
    Bound,
}

/// Forwarding control surface
pub struct ShareProxy {
    /// Published at most once, read lock-free afterwards
    resource: Once<Arc<dyn SharedResource>>,
}

assert_impl_all!(ShareProxy: Send, Sync);

impl ShareProxy {
    pub const fn new() -> Self {
        Self {
            resource: Once::new(),
        }
    }

    /// Publish the shared resource the proxy forwards to
    ///
    /// # Errors
    /// `AlreadyBound` if a resource was published before; the first binding
    /// stays in place.
    pub fn bind(&self, resource: Arc<dyn SharedResource>) -> Result<(), ShareError> {
        let mut bound = false;
        self.resource.call_once(|| {
            bound = true;
            resource
        });

        if bound {
            log::debug!("ion: share proxy bound");
            Ok(())
        } else {
            Err(ShareError::AlreadyBound)
        }
    }

    pub fn state(&self) -> ProxyState {
        if self.resource.is_completed() {
            ProxyState::Bound
        } else {
            ProxyState::Unbound
        }
    }

    pub fn is_bound(&self) -> bool {
        self.state() == ProxyState::Bound
    }

    /// Opening the surface binds nothing
    pub fn open(&self) -> Result<(), ShareError> {
        Ok(())
    }

    /// Closing the surface releases nothing
    pub fn release(&self) {}

    /// Handle one control command
    ///
    /// `SHARE_MODE_CMD` is acknowledged without touching the resource. Any
    /// other command goes to the bound resource unchanged, and its result comes
    /// back unchanged.
    pub fn ioctl(&self, cmd: u32, arg: usize) -> Result<isize, ShareError> {
        if cmd == SHARE_MODE_CMD {
            return Ok(SHARE_MODE_ACK);
        }

        match self.resource.get() {
            Some(resource) => resource.ioctl(cmd, arg),
            None => Err(ShareError::NoSuchOperation),
        }
    }
}

impl Default for ShareProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ShareProxy {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShareProxy")
            .field("state", &self.state())
            .finish()
    }
}
