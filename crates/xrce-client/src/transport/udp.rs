// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// UDP transport using `socket2`: one connected datagram socket per agent.

use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config::UDP_TRANSPORT_MTU;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Datagram transport to a single agent address.
pub struct UdpTransport {
    socket: socket2::Socket,
    last_error: Option<Error>,
}

impl UdpTransport {
    /// Create a socket connected to the agent at `agent_addr`.
    pub fn connect(agent_addr: SocketAddr) -> Result<Self> {
        let domain = if agent_addr.is_ipv4() {
            socket2::Domain::IPV4
        } else {
            socket2::Domain::IPV6
        };
        let socket = socket2::Socket::new(
            domain,
            socket2::Type::DGRAM,
            Some(socket2::Protocol::UDP),
        )?;
        let sa: socket2::SockAddr = agent_addr.into();
        socket.connect(&sa)?;
        Ok(Self { socket, last_error: None })
    }
}

impl Transport for UdpTransport {
    fn send_msg(&mut self, data: &[u8]) -> bool {
        match self.socket.send(data) {
            Ok(n) if n == data.len() => true,
            Ok(_) => {
                self.last_error = Some(Error::Io("short datagram send".into()));
                false
            }
            Err(e) => {
                self.last_error = Some(e.into());
                false
            }
        }
    }

    fn recv_msg(&mut self, buf: &mut [u8], timeout_ms: i32) -> Option<usize> {
        let timeout = Duration::from_millis(timeout_ms.max(1) as u64);
        if let Err(e) = self.socket.set_read_timeout(Some(timeout)) {
            self.last_error = Some(e.into());
            return None;
        }
        let uninit = unsafe {
            // socket2 wants a MaybeUninit slice; the caller's buffer is
            // already initialized.
            &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>])
        };
        match self.socket.recv(uninit) {
            Ok(n) => Some(n),
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                None
            }
            Err(e) => {
                self.last_error = Some(e.into());
                None
            }
        }
    }

    fn mtu(&self) -> usize {
        UDP_TRANSPORT_MTU
    }

    fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }
}
