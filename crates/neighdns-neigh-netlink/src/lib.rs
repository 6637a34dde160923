// # Netlink Neighbor Table
//
// This crate provides the rtnetlink implementation of `NeighborTable` for
// Linux systems.
//
// ## Operations
//
// 1. `list`: one `RTM_GETNEIGH` dump request for `AF_INET6`, read until
//    `NLMSG_DONE`, each `RTM_NEWNEIGH` reply parsed with `netlink-packet-route`
// 2. `set_probe_state`: one `RTM_NEWNEIGH` with `NLM_F_REPLACE` and state
//    `NUD_PROBE`, acknowledged by the kernel; the kernel then sends a unicast
//    neighbor solicitation and moves the entry to REACHABLE or FAILED
//
// Each call opens its own socket. Socket I/O is blocking and runs on the
// blocking pool, awaited immediately, so a run stays sequential.
//
// ## Privileges
//
// Dumping the table needs no privilege. Changing an entry's state needs
// CAP_NET_ADMIN; without it the kernel answers `EPERM`, which surfaces as a
// probe error.
//
// ## Platform Support
//
// On other targets every call returns a neighbor table error.

use async_trait::async_trait;
use neighdns_core::traits::{NeighborEntry, NeighborTable};
use neighdns_core::{Error, Result};
use std::net::Ipv6Addr;

/// Netlink-backed IPv6 neighbor table
#[derive(Debug, Default, Clone, Copy)]
pub struct NetlinkNeighborTable;

impl NetlinkNeighborTable {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "linux")]
#[async_trait]
impl NeighborTable for NetlinkNeighborTable {
    async fn list(&self) -> Result<Vec<NeighborEntry>> {
        let entries = tokio::task::spawn_blocking(linux::dump_neighbours)
            .await
            .map_err(|e| Error::neighbor_table(format!("Neighbor dump task failed: {}", e)))?
            .map_err(|e| Error::neighbor_table(format!("RTM_GETNEIGH dump failed: {}", e)))?;

        tracing::debug!("Neighbor dump returned {} IPv6 entries", entries.len());
        Ok(entries)
    }

    async fn set_probe_state(&self, link_index: u32, address: Ipv6Addr) -> Result<()> {
        tokio::task::spawn_blocking(move || linux::set_probe(link_index, address))
            .await
            .map_err(|e| Error::probe(address, format!("probe task failed: {}", e)))?
            .map_err(|e| Error::probe(address, e.to_string()))?;

        tracing::debug!("NUD_PROBE set for {} on link {}", address, link_index);
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
#[async_trait]
impl NeighborTable for NetlinkNeighborTable {
    async fn list(&self) -> Result<Vec<NeighborEntry>> {
        Err(Error::neighbor_table(
            "Netlink neighbor table is only supported on Linux",
        ))
    }

    async fn set_probe_state(&self, _link_index: u32, address: Ipv6Addr) -> Result<()> {
        Err(Error::probe(
            address,
            "Netlink neighbor table is only supported on Linux",
        ))
    }
}

#[cfg(target_os = "linux")]
pub use linux::parse_neighbour;

#[cfg(target_os = "linux")]
mod linux {
    use neighdns_core::traits::{MacAddress, NeighborEntry, NeighborState};
    use netlink_packet_core::{
        NetlinkHeader, NetlinkMessage, NetlinkPayload, NLM_F_ACK, NLM_F_CREATE, NLM_F_DUMP,
        NLM_F_REPLACE, NLM_F_REQUEST,
    };
    use netlink_packet_route::constants::NUD_PROBE;
    use netlink_packet_route::neighbour::Nla;
    use netlink_packet_route::{NeighbourMessage, RtnlMessage};
    use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};
    use std::io;
    use std::net::Ipv6Addr;
    use tracing::trace;

    /// Receive buffer size; a dump arrives in several datagrams of at most this size
    const RECV_BUFFER_SIZE: usize = 64 * 1024;

    const AF_INET6: u8 = libc::AF_INET6 as u8;

    /// Parse one neighbor message into an entry
    ///
    /// Returns `None` for non-IPv6 messages and for messages without a
    /// 16-byte destination. A link-layer address that is not 6 bytes long
    /// (or absent, as for INCOMPLETE entries) leaves `hardware_address` empty.
    pub fn parse_neighbour(message: &NeighbourMessage) -> Option<NeighborEntry> {
        if message.header.family != AF_INET6 {
            return None;
        }

        let mut address: Option<Ipv6Addr> = None;
        let mut hardware_address: Option<MacAddress> = None;

        for nla in &message.nlas {
            match nla {
                Nla::Destination(bytes) => {
                    address = <[u8; 16]>::try_from(bytes.as_slice()).ok().map(Ipv6Addr::from);
                }
                Nla::LinkLocalAddress(bytes) => {
                    hardware_address = MacAddress::from_slice(bytes);
                }
                _ => {}
            }
        }

        let Some(address) = address else {
            trace!("Neighbor message without IPv6 destination, skipping");
            return None;
        };

        Some(NeighborEntry::new(
            hardware_address,
            address,
            NeighborState::from_kernel(message.header.state),
            message.header.ifindex,
        ))
    }

    fn open_socket() -> io::Result<Socket> {
        let mut socket = Socket::new(NETLINK_ROUTE)?;
        socket.bind_auto()?;
        socket.connect(&SocketAddr::new(0, 0))?;
        Ok(socket)
    }

    fn send(socket: &Socket, flags: u16, sequence: u32, message: RtnlMessage) -> io::Result<()> {
        let mut header = NetlinkHeader::default();
        header.flags = flags;
        header.sequence_number = sequence;

        let mut packet = NetlinkMessage::new(header, NetlinkPayload::InnerMessage(message));
        packet.finalize();

        let mut buf = vec![0u8; packet.buffer_len()];
        packet.serialize(&mut buf);
        socket.send(&buf, 0)?;
        Ok(())
    }

    /// Read replies until `handle` returns `Some`
    ///
    /// `handle` sees every message in arrival order.
    fn receive<T>(
        socket: &Socket,
        mut handle: impl FnMut(NetlinkMessage<RtnlMessage>) -> Option<io::Result<T>>,
    ) -> io::Result<T> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let size = socket.recv(&mut &mut buf[..], 0)?;
            if size == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "netlink socket closed",
                ));
            }

            let mut offset = 0;
            while offset < size {
                let message = NetlinkMessage::<RtnlMessage>::deserialize(&buf[offset..size])
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

                let length = message.header.length as usize;
                if length == 0 {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "zero-length netlink message",
                    ));
                }
                offset += (length + 3) & !3;

                if let Some(done) = handle(message) {
                    return done;
                }
            }
        }
    }

    /// Map a netlink error payload to an OS error; `None` is a plain ack
    fn ack_result(code: Option<std::num::NonZeroI32>) -> io::Result<()> {
        match code {
            None => Ok(()),
            Some(code) => Err(io::Error::from_raw_os_error(-code.get())),
        }
    }

    /// Dump every IPv6 neighbor entry
    pub fn dump_neighbours() -> io::Result<Vec<NeighborEntry>> {
        let socket = open_socket()?;

        let mut request = NeighbourMessage::default();
        request.header.family = AF_INET6;
        send(&socket, NLM_F_REQUEST | NLM_F_DUMP, 1, RtnlMessage::GetNeighbour(request))?;

        let mut entries = Vec::new();
        receive(&socket, |message| match message.payload {
            NetlinkPayload::InnerMessage(RtnlMessage::NewNeighbour(neighbour)) => {
                if let Some(entry) = parse_neighbour(&neighbour) {
                    trace!("{} {:?} via {:?}", entry.address, entry.state, entry.hardware_address);
                    entries.push(entry);
                }
                None
            }
            NetlinkPayload::Done(_) => Some(Ok(())),
            NetlinkPayload::Error(e) => Some(ack_result(e.code)),
            _ => None,
        })?;

        Ok(entries)
    }

    /// Force an entry into NUD_PROBE so the kernel re-validates it
    pub fn set_probe(link_index: u32, address: Ipv6Addr) -> io::Result<()> {
        let socket = open_socket()?;

        let mut request = NeighbourMessage::default();
        request.header.family = AF_INET6;
        request.header.ifindex = link_index;
        request.header.state = NUD_PROBE;
        request.nlas.push(Nla::Destination(address.octets().to_vec()));

        send(
            &socket,
            NLM_F_REQUEST | NLM_F_ACK | NLM_F_CREATE | NLM_F_REPLACE,
            1,
            RtnlMessage::NewNeighbour(request),
        )?;

        receive(&socket, |message| match message.payload {
            NetlinkPayload::Error(e) => Some(ack_result(e.code)),
            NetlinkPayload::Done(_) => Some(Ok(())),
            _ => None,
        })
    }

}
