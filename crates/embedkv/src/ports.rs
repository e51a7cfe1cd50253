//! Port allocation strategies.
//!
//! Every provider is `Send + Sync` and serializes `next_port()` internally, so one
//! provider can be shared by builders running on several threads.

use crate::{Error, Result};
use std::collections::VecDeque;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Produces the next port an instance should bind to.
pub trait PortProvider: Send + Sync {
    /// Returns the next port.
    fn next_port(&self) -> Result<u16>;
}

/// Hands out `base`, `base + 1`, `base + 2`, ... up to 65535, then fails.
#[derive(Debug)]
pub struct SequentialPorts {
    base: u16,
    // 65536 once every port has been handed out.
    next: AtomicU32,
}

impl SequentialPorts {
    /// Creates a provider whose first port is `base`.
    pub fn new(base: u16) -> Self {
        Self {
            base,
            next: AtomicU32::new(u32::from(base)),
        }
    }
}

impl PortProvider for SequentialPorts {
    fn next_port(&self) -> Result<u16> {
        let last = u32::from(u16::MAX);
        let claimed = self
            .next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| {
                (next <= last).then_some(next + 1)
            });

        match claimed {
            Ok(port) => Ok(port as u16),
            Err(_) => Err(Error::PortsExhausted(usize::from(u16::MAX - self.base) + 1)),
        }
    }
}

/// Consumes a fixed list front to back and fails once it is empty.
#[derive(Debug)]
pub struct PredefinedPorts {
    state: Mutex<Predefined>,
}

#[derive(Debug)]
struct Predefined {
    remaining: VecDeque<u16>,
    handed_out: usize,
}

impl PredefinedPorts {
    /// Creates a provider over `ports`, in order.
    pub fn new(ports: impl IntoIterator<Item = u16>) -> Self {
        Self {
            state: Mutex::new(Predefined {
                remaining: ports.into_iter().collect(),
                handed_out: 0,
            }),
        }
    }

    /// Number of ports not yet handed out.
    pub fn remaining(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remaining
            .len()
    }
}

impl PortProvider for PredefinedPorts {
    fn next_port(&self) -> Result<u16> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match state.remaining.pop_front() {
            Some(port) => {
                state.handed_out += 1;
                Ok(port)
            }
            None => Err(Error::PortsExhausted(state.handed_out)),
        }
    }
}

/// Asks the operating system for a free port.
///
/// The port is only known to be free when it is allocated; another process
/// may take it before the supervised instance binds it.
#[derive(Debug, Default, Clone, Copy)]
pub struct EphemeralPorts;

impl EphemeralPorts {
    pub fn new() -> Self {
        Self
    }
}

impl PortProvider for EphemeralPorts {
    fn next_port(&self) -> Result<u16> {
        // Bind to port 0 to let the OS choose, then release it.
        let listener =
            TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(Error::PortAllocation)?;
        let port = listener.local_addr().map_err(Error::PortAllocation)?.port();
        drop(listener);
        Ok(port)
    }
}
