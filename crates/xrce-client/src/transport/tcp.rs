// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// TCP transport: messages travel as [len_lo, len_hi] + body on one stream
// connection to the agent.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use crate::config::TCP_TRANSPORT_MTU;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Length-prefixed stream transport to a single agent.
pub struct TcpTransport {
    stream: TcpStream,
    /// Bytes read off the stream but not yet consumed as a message.
    pending: Vec<u8>,
    last_error: Option<Error>,
}

impl TcpTransport {
    pub fn connect(agent_addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(agent_addr)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream, pending: Vec::new(), last_error: None })
    }

    /// A complete message at the front of `pending`, if any.
    fn take_pending_message(&mut self, buf: &mut [u8]) -> Option<usize> {
        if self.pending.len() < 2 {
            return None;
        }
        let len = u16::from_le_bytes([self.pending[0], self.pending[1]]) as usize;
        if self.pending.len() < 2 + len {
            return None;
        }
        if len > buf.len() {
            // Message bigger than the caller's buffer: drop it whole to
            // stay frame-aligned.
            self.pending.drain(..2 + len);
            self.last_error = Some(Error::BufferTooSmall);
            return None;
        }
        buf[..len].copy_from_slice(&self.pending[2..2 + len]);
        self.pending.drain(..2 + len);
        Some(len)
    }
}

impl Transport for TcpTransport {
    fn send_msg(&mut self, data: &[u8]) -> bool {
        if data.len() > u16::MAX as usize {
            self.last_error = Some(Error::InvalidParameter);
            return false;
        }
        let prefix = (data.len() as u16).to_le_bytes();
        let result = self.stream.write_all(&prefix).and_then(|_| self.stream.write_all(data));
        match result {
            Ok(()) => true,
            Err(e) => {
                self.last_error = Some(e.into());
                false
            }
        }
    }

    fn recv_msg(&mut self, buf: &mut [u8], timeout_ms: i32) -> Option<usize> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms.max(0) as u64);
        let mut chunk = [0u8; 512];
        loop {
            if let Some(len) = self.take_pending_message(buf) {
                return Some(len);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let wait = deadline - now;
            if let Err(e) = self.stream.set_read_timeout(Some(wait.max(Duration::from_millis(1)))) {
                self.last_error = Some(e.into());
                return None;
            }
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.last_error = Some(Error::Io("connection closed by agent".into()));
                    return None;
                }
                Ok(n) => self.pending.extend_from_slice(&chunk[..n]),
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut => {}
                Err(e) => {
                    self.last_error = Some(e.into());
                    return None;
                }
            }
        }
    }

    fn mtu(&self) -> usize {
        TCP_TRANSPORT_MTU
    }

    fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }
}
