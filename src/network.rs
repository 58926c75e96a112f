// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

extern crate libc;
extern crate nix;

use std::collections::HashMap;
use std::fmt::Debug;
use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream as StdTcpStream;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use mio::net::{TcpStream, UdpSocket};
use mio::{Events, Interest, Poll, Token};

use nix::sys::socket::setsockopt;
use nix::sys::socket::sockopt::{KeepAlive, TcpKeepCount, TcpKeepIdle, TcpKeepInterval};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace};

use crate::bridge::service_types::BridgeCommandHeader;
use crate::exception::{PickPlaceException, PickPlaceResult};
use crate::shutdown::ShutdownFlag;

const CLIENT: Token = Token(1);

/// Encoded size of a [`BridgeCommandHeader`].
pub const HEADER_SIZE: usize = 12;

/// Longest time a blocking receive sleeps before it checks the shutdown flag again.
const POLL_SLICE: Duration = Duration::from_millis(10);

const MAX_UDP_PACKET: usize = 1500;

pub trait MessageCommand {
    fn get_command_message_id(&self) -> u32;
}

fn network_exception<E: ToString>(error: E) -> PickPlaceException {
    PickPlaceException::NetworkException {
        message: error.to_string(),
    }
}

/// TCP command channel and UDP state channel to the motion bridge.
pub struct Network {
    tcp_socket: TcpStream,
    udp_socket: UdpSocket,
    bridge_ip: IpAddr,
    udp_bridge_address: Option<SocketAddr>,
    udp_port: u16,
    udp_timeout: Duration,
    command_id: u32,
    pending_bytes: Vec<u8>,
    connection_closed: bool,
    received_responses: HashMap<u32, Vec<u8>>,
    poll_read: Poll,
    events: Events,
    poll_read_udp: Poll,
    events_udp: Events,
    shutdown: ShutdownFlag,
}

impl Network {
    /// Connects to the bridge and opens a UDP socket on an ephemeral port.
    /// # Arguments
    /// * `bridge_address` - IP/hostname of the bridge.
    /// * `bridge_port` - TCP command port of the bridge.
    /// * `udp_timeout` - Longest wait for a UDP packet.
    /// * `shutdown` - Flag aborting blocking receives.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::PickPlaceException::NetworkException`) if the bridge cannot be reached.
    pub fn new(
        bridge_address: &str,
        bridge_port: u16,
        udp_timeout: Duration,
        shutdown: ShutdownFlag,
    ) -> PickPlaceResult<Network> {
        let address_str = format!("{}:{}", bridge_address, bridge_port);
        let sock_address = address_str
            .to_socket_addrs()
            .map_err(network_exception)?
            .next()
            .ok_or_else(|| network_exception(format!("cannot resolve {}", address_str)))?;
        let std_stream = StdTcpStream::connect(sock_address).map_err(network_exception)?;
        std_stream.set_nodelay(true).map_err(network_exception)?;
        std_stream.set_nonblocking(true).map_err(network_exception)?;
        let mut tcp_socket = TcpStream::from_std(std_stream);
        let fd = tcp_socket.as_raw_fd();

        setsockopt(fd, KeepAlive, &true).map_err(network_exception)?;
        setsockopt(fd, TcpKeepIdle, &1).map_err(network_exception)?;
        setsockopt(fd, TcpKeepCount, &3).map_err(network_exception)?;
        setsockopt(fd, TcpKeepInterval, &1).map_err(network_exception)?;

        let udp_address = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        let mut udp_socket = UdpSocket::bind(udp_address).map_err(network_exception)?;
        let udp_port = udp_socket.local_addr().map_err(network_exception)?.port();

        let poll_read = Poll::new().map_err(network_exception)?;
        poll_read
            .registry()
            .register(&mut tcp_socket, CLIENT, Interest::READABLE)
            .map_err(network_exception)?;
        let poll_read_udp = Poll::new().map_err(network_exception)?;
        poll_read_udp
            .registry()
            .register(&mut udp_socket, CLIENT, Interest::READABLE)
            .map_err(network_exception)?;
        debug!("connected to bridge at {}", sock_address);
        Ok(Network {
            tcp_socket,
            udp_socket,
            bridge_ip: sock_address.ip(),
            udp_bridge_address: None,
            udp_port,
            udp_timeout,
            command_id: 0,
            pending_bytes: Vec::new(),
            connection_closed: false,
            received_responses: HashMap::new(),
            poll_read,
            events: Events::with_capacity(128),
            poll_read_udp,
            events_udp: Events::with_capacity(16),
            shutdown,
        })
    }

    /// Returns a fresh command ID.
    pub fn next_command_id(&mut self) -> u32 {
        let command_id = self.command_id;
        self.command_id = self.command_id.wrapping_add(1);
        command_id
    }

    pub fn tcp_send_request<T: Serialize + MessageCommand + Debug>(
        &mut self,
        request: &T,
    ) -> PickPlaceResult<u32> {
        let encoded_request = bincode::serialize(request)?;
        trace!("sending {:?}", request);
        self.tcp_socket
            .write_all(&encoded_request)
            .map_err(network_exception)?;
        Ok(request.get_command_message_id())
    }

    /// Blocks until a Response message with the given command ID has been received and returns this
    /// response.
    ///
    /// # Arguments
    /// * `command_id` - Expected command ID of the Response.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::PickPlaceException::NetworkException`) if the connection is lost or the response is malformed.
    /// * [`Interrupted`](`crate::exception::PickPlaceException::Interrupted`) if a shutdown was requested while waiting.
    pub fn tcp_blocking_receive_response<T: DeserializeOwned + Debug>(
        &mut self,
        command_id: u32,
    ) -> PickPlaceResult<T> {
        let response_bytes = self.wait_for_response_to_arrive(command_id)?;
        let response: T = bincode::deserialize(&response_bytes)?;
        trace!("received {:?}", response);
        Ok(response)
    }

    fn wait_for_response_to_arrive(&mut self, command_id: u32) -> PickPlaceResult<Vec<u8>> {
        loop {
            if let Some(response_bytes) = self.received_responses.remove(&command_id) {
                return Ok(response_bytes);
            }
            if self.connection_closed {
                return Err(network_exception("bridge closed the connection"));
            }
            self.shutdown.check()?;
            self.tcp_read_from_buffer(POLL_SLICE)?;
        }
    }

    fn tcp_read_from_buffer(&mut self, timeout: Duration) -> PickPlaceResult<()> {
        match self.poll_read.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(network_exception(e)),
        }
        let readable = self
            .events
            .iter()
            .any(|event| event.token() == CLIENT && event.is_readable());
        if !readable {
            return Ok(());
        }
        let mut buffer = [0_u8; 4096];
        loop {
            match self.tcp_socket.read(&mut buffer) {
                Ok(0) => {
                    self.connection_closed = true;
                    break;
                }
                Ok(read_bytes) => self.pending_bytes.extend_from_slice(&buffer[..read_bytes]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(network_exception(e)),
            }
        }
        self.split_received_messages()
    }

    fn split_received_messages(&mut self) -> PickPlaceResult<()> {
        while self.pending_bytes.len() >= HEADER_SIZE {
            let header: BridgeCommandHeader =
                bincode::deserialize(&self.pending_bytes[..HEADER_SIZE])?;
            let size = header.size as usize;
            if size < HEADER_SIZE {
                return Err(network_exception(format!(
                    "message {} announces {} bytes which is shorter than its header",
                    header.command_id, size
                )));
            }
            if self.pending_bytes.len() < size {
                break;
            }
            let message: Vec<u8> = self.pending_bytes.drain(..size).collect();
            self.received_responses.insert(header.command_id, message);
        }
        Ok(())
    }

    /// Discards all queued UDP packets, then waits for the next one and returns the most recent.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::PickPlaceException::NetworkException`) if no packet arrives within the UDP timeout
    /// or the packet is malformed.
    /// * [`Interrupted`](`crate::exception::PickPlaceException::Interrupted`) if a shutdown was requested while waiting.
    pub fn udp_blocking_receive_latest<T: DeserializeOwned + Debug>(&mut self) -> PickPlaceResult<T> {
        let stale = self.udp_drain()?;
        if stale.is_some() {
            trace!("discarded stale UDP packets");
        }
        let deadline = Instant::now() + self.udp_timeout;
        loop {
            self.shutdown.check()?;
            let now = Instant::now();
            if now >= deadline {
                return Err(network_exception("UDP receive: timeout"));
            }
            match self
                .poll_read_udp
                .poll(&mut self.events_udp, Some(POLL_SLICE.min(deadline - now)))
            {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(network_exception(e)),
            }
            if self.events_udp.iter().any(|event| event.is_readable()) {
                if let Some(packet) = self.udp_drain()? {
                    return Ok(bincode::deserialize(&packet)?);
                }
            }
        }
    }

    /// Reads until the socket would block and returns the last packet.
    fn udp_drain(&mut self) -> PickPlaceResult<Option<Vec<u8>>> {
        let mut latest = None;
        let mut buffer = [0_u8; MAX_UDP_PACKET];
        loop {
            match self.udp_socket.recv_from(&mut buffer) {
                Ok((read_bytes, _)) => latest = Some(buffer[..read_bytes].to_vec()),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(latest),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(network_exception(e)),
            }
        }
    }

    /// Sends `data` to the UDP command port announced by the bridge.
    pub fn udp_send<T: Serialize>(&mut self, data: &T) -> PickPlaceResult<()> {
        let address = self.udp_bridge_address.ok_or_else(|| {
            network_exception("UDP command port of the bridge is not known yet")
        })?;
        let encoded = bincode::serialize(data)?;
        let bytes_send = self
            .udp_socket
            .send_to(&encoded, address)
            .map_err(network_exception)?;
        if bytes_send != encoded.len() {
            return Err(network_exception("UDP object could not be send"));
        }
        Ok(())
    }

    pub fn set_udp_bridge_port(&mut self, port: u16) {
        self.udp_bridge_address = Some(SocketAddr::new(self.bridge_ip, port));
    }

    pub fn get_udp_port(&self) -> u16 {
        self.udp_port
    }
}
