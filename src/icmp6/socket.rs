use super::packet;

use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

use std::ffi::c_int;
use std::net::Ipv6Addr;
use libc::socket;
use libc::setsockopt;
use std::os::fd::AsRawFd;
use std::sync::Arc;

use crate::interface::InterfaceId;

/// Control message buffer with the alignment `cmsghdr` needs.
#[repr(C, align(8))]
struct CmsgBuf([u8; 256]);

impl CmsgBuf {
    fn new() -> Self {
        Self([0u8; 256])
    }
}

/// ICMPv6 type filter (RFC 3542 §3.2). A set bit blocks the type.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icmp6Filter {
    data: [u32; 8],
}

impl Icmp6Filter {
    pub fn block_all() -> Self {
        Self { data: [u32::MAX; 8] }
    }

    pub fn pass_all() -> Self {
        Self { data: [0; 8] }
    }

    pub fn set_pass(&mut self, icmp6_type: u8) {
        self.data[(icmp6_type >> 5) as usize] &= !(1u32 << (icmp6_type & 31));
    }

    pub fn set_block(&mut self, icmp6_type: u8) {
        self.data[(icmp6_type >> 5) as usize] |= 1u32 << (icmp6_type & 31);
    }

    pub fn will_pass(&self, icmp6_type: u8) -> bool {
        self.data[(icmp6_type >> 5) as usize] & (1u32 << (icmp6_type & 31)) == 0
    }

    /// Router and neighbor discovery messages only.
    pub fn neighbor_discovery() -> Self {
        let mut filter = Self::block_all();
        for t in super::ndp::ROUTER_SOLICITATION..=super::ndp::REDIRECT {
            filter.set_pass(t);
        }
        filter
    }
}

#[derive(Debug)]
pub struct RawIcmp6Socket {
    socket: c_int,
}

impl RawIcmp6Socket {
    pub fn new() -> Result<Self, std::io::Error> {
        let socket = unsafe { socket(libc::AF_INET6, libc::SOCK_RAW | libc::SOCK_CLOEXEC, libc::IPPROTO_ICMPV6) };
        if socket < 0 {
            return Err(std::io::Error::last_os_error());
        }

        Ok(Self { socket })
    }

    /// A socket set up for Neighbor Discovery: ND types only, packet
    /// info and hop limit on receive, hop limit 255 on send, and no
    /// loopback of our own multicasts.
    pub fn neighbor_discovery() -> Result<Self, std::io::Error> {
        let socket = Self::new()?;
        socket.set_filter(&Icmp6Filter::neighbor_discovery())?;
        socket.set_recv_pktinfo(true)?;
        socket.set_recv_hoplimit(true)?;
        socket.set_unicast_hops(255)?;
        socket.set_multicast_hops(255)?;
        socket.set_multicast_loop(false)?;
        Ok(socket)
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<(), std::io::Error> {
        let flags = unsafe { libc::fcntl(self.socket, libc::F_GETFL, 0) };
        if flags < 0 {
            return Err(std::io::Error::last_os_error());
        }

        let oldflags = flags;

        let flags = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };

        if flags == oldflags {
            return Ok(());
        }

        let code = unsafe { libc::fcntl(self.socket, libc::F_SETFL, flags) };
        if code < 0 {
            return Err(std::io::Error::last_os_error());
        }

        Ok(())
    }

    unsafe fn setsockopt<T: Sized, O: SocketOpt>(&self, opt: O, optval: &T) -> Result<(), std::io::Error> {
        let level = opt.level();
        let optname = opt.optname();
        let code = unsafe {
            setsockopt(self.socket, level, optname, optval as *const _ as *const libc::c_void, std::mem::size_of::<T>() as libc::socklen_t)
        };
        if code < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    fn ipv6_mreq(&self, addr: Ipv6Addr, if_id: InterfaceId) -> libc::ipv6_mreq {
        libc::ipv6_mreq {
            ipv6mr_multiaddr: libc::in6_addr { s6_addr: addr.octets() },
            ipv6mr_interface: if_id.inner_unchecked(),
        }
    }

    pub fn join_multicast(&self, group: Ipv6Addr, if_id: InterfaceId) -> Result<(), std::io::Error> {
        let mreq = self.ipv6_mreq(group, if_id);
        unsafe { self.setsockopt(Ipv6Opt::IPV6_ADD_MEMBERSHIP, &mreq) }
    }

    pub fn leave_multicast(&self, group: Ipv6Addr, if_id: InterfaceId) -> Result<(), std::io::Error> {
        let mreq = self.ipv6_mreq(group, if_id);
        unsafe { self.setsockopt(Ipv6Opt::IPV6_DROP_MEMBERSHIP, &mreq) }
    }

    pub fn set_filter(&self, filter: &Icmp6Filter) -> Result<(), std::io::Error> {
        unsafe { self.setsockopt(Icmp6Opt::ICMP6_FILTER, filter) }
    }

    pub fn set_unicast_hops(&self, hops: c_int) -> Result<(), std::io::Error> {
        unsafe { self.setsockopt(Ipv6Opt::IPV6_UNICAST_HOPS, &hops) }
    }

    pub fn set_multicast_hops(&self, hops: c_int) -> Result<(), std::io::Error> {
        unsafe { self.setsockopt(Ipv6Opt::IPV6_MULTICAST_HOPS, &hops) }
    }

    pub fn set_multicast_loop(&self, loopback: bool) -> Result<(), std::io::Error> {
        let loopback: c_int = if loopback { 1 } else { 0 };
        unsafe { self.setsockopt(Ipv6Opt::IPV6_MULTICAST_LOOP, &loopback) }
    }

    pub fn set_recv_pktinfo(&self, recv_pktinfo: bool) -> Result<(), std::io::Error> {
        let recv_pktinfo: c_int = if recv_pktinfo { 1 } else { 0 };
        unsafe { self.setsockopt(Ipv6Opt::IPV6_RECVPKTINFO, &recv_pktinfo) }
    }

    pub fn set_recv_hoplimit(&self, recv_hoplimit: bool) -> Result<(), std::io::Error> {
        let recv_hoplimit: c_int = if recv_hoplimit { 1 } else { 0 };
        unsafe { self.setsockopt(Ipv6Opt::IPV6_RECVHOPLIMIT, &recv_hoplimit) }
    }

    pub fn recv(&self, packet: &mut packet::Packet) -> Result<(), std::io::Error> {
        if packet.data.len() < packet::MAX_PACKET_LEN {
            packet.data.resize(packet::MAX_PACKET_LEN, 0);
        }

        unsafe {
            let mut cmsg = CmsgBuf::new();
            let mut src: libc::sockaddr_in6 = std::mem::zeroed();
            let mut info: libc::msghdr = std::mem::zeroed();
            let len = {
                info.msg_name = &mut src as *mut _ as *mut libc::c_void;
                info.msg_namelen = std::mem::size_of_val(&src) as libc::socklen_t;

                let mut iov = [std::io::IoSliceMut::new(&mut packet.data)];
                info.msg_iov = iov.as_mut_ptr() as *mut libc::iovec;
                info.msg_iovlen = iov.len();

                info.msg_control = cmsg.0.as_mut_ptr() as *mut libc::c_void;
                info.msg_controllen = cmsg.0.len();

                let code = libc::recvmsg(self.socket, &mut info, 0);
                if code < 0 {
                    return Err(std::io::Error::last_os_error());
                }
                code as usize
            };

            packet.data_len = len.min(packet.data.len());
            packet.peer_addr = src.sin6_addr.s6_addr.into();

            packet.info = None;
            packet.hop_limit = None;

            let mut cmsg = libc::CMSG_FIRSTHDR(&info as *const libc::msghdr).as_ref();

            #[allow(clippy::cast_ptr_alignment)]
            while let Some(chdr) = cmsg {
                let data = libc::CMSG_DATA(chdr as *const _);
                match (chdr.cmsg_level, chdr.cmsg_type) {
                    (libc::IPPROTO_IPV6, libc::IPV6_PKTINFO) => {
                        let pktinfo = std::ptr::read_unaligned(data as *const libc::in6_pktinfo);
                        let dst: Ipv6Addr = pktinfo.ipi6_addr.s6_addr.into();
                        let if_id = InterfaceId::new(pktinfo.ipi6_ifindex);
                        packet.info = Some(packet::PacketInfo { addr: dst, if_id });
                    }

                    (libc::IPPROTO_IPV6, libc::IPV6_HOPLIMIT) => {
                        let hoplimit = std::ptr::read_unaligned(data as *const libc::c_int);
                        packet.hop_limit = Some(packet::PacketHopLimit { hop_limit: hoplimit as u8 });
                    }

                    _ => {
                        log::debug!("socket: ignoring control message {}/{}", chdr.cmsg_level, chdr.cmsg_type);
                    }
                }

                cmsg = libc::CMSG_NXTHDR(&info as *const libc::msghdr, chdr as *const _).as_ref();
            }
        }

        Ok(())
    }

    /// Sends `packet.data()` to `packet.peer_addr`, from the interface and
    /// source in `packet.info` and with `packet.hop_limit` when present.
    pub fn send(&self, packet: &packet::Packet) -> Result<(), std::io::Error> {
        let scope_id = match (&packet.info, is_link_scoped(&packet.peer_addr)) {
            (Some(info), true) => info.if_id.inner_unchecked(),
            _ => 0,
        };
        let dst = libc::sockaddr_in6 {
            sin6_family: libc::AF_INET6 as libc::sa_family_t,
            sin6_port: 0,
            sin6_flowinfo: 0,
            sin6_addr: libc::in6_addr { s6_addr: packet.peer_addr.octets() },
            sin6_scope_id: scope_id,
        };

        let data = packet.data();

        let mut info: libc::msghdr = unsafe { std::mem::zeroed() };
        info.msg_name = &dst as *const _ as *mut _;
        info.msg_namelen = std::mem::size_of_val(&dst) as libc::socklen_t;

        let mut iov = [libc::iovec {
            iov_base: data.as_ptr() as *mut _,
            iov_len: data.len() as libc::size_t,
        }];

        info.msg_iov = iov.as_mut_ptr() as *mut _;
        info.msg_iovlen = iov.len();

        let mut cmsg_buf = CmsgBuf::new();
        let mut cmsg_len: usize = 0;

        if packet.info.is_some() || packet.hop_limit.is_some() {
            info.msg_control = cmsg_buf.0.as_mut_ptr() as *mut _;
            info.msg_controllen = cmsg_buf.0.len();

            let mut cmsg = unsafe { libc::CMSG_FIRSTHDR(&info) };

            if let Some(pktinfo) = &packet.info {
                let size = std::mem::size_of::<libc::in6_pktinfo>() as libc::c_uint;
                let hdr = unsafe { cmsg.as_mut() }.ok_or_else(|| std::io::Error::other("control buffer too small"))?;
                hdr.cmsg_level = libc::IPPROTO_IPV6;
                hdr.cmsg_type = libc::IPV6_PKTINFO;
                hdr.cmsg_len = unsafe { libc::CMSG_LEN(size) } as usize;
                cmsg_len += unsafe { libc::CMSG_SPACE(size) } as usize;

                unsafe {
                    let data = libc::CMSG_DATA(cmsg) as *mut libc::in6_pktinfo;
                    std::ptr::write_unaligned(
                        data,
                        libc::in6_pktinfo {
                            ipi6_addr: libc::in6_addr { s6_addr: pktinfo.addr.octets() },
                            ipi6_ifindex: pktinfo.if_id.inner_unchecked(),
                        },
                    );
                    cmsg = libc::CMSG_NXTHDR(&info, cmsg);
                }
            }

            if let Some(hop_limit) = &packet.hop_limit {
                let size = std::mem::size_of::<libc::c_int>() as libc::c_uint;
                let hdr = unsafe { cmsg.as_mut() }.ok_or_else(|| std::io::Error::other("control buffer too small"))?;
                hdr.cmsg_level = libc::IPPROTO_IPV6;
                hdr.cmsg_type = libc::IPV6_HOPLIMIT;
                hdr.cmsg_len = unsafe { libc::CMSG_LEN(size) } as usize;
                cmsg_len += unsafe { libc::CMSG_SPACE(size) } as usize;

                unsafe {
                    let data = libc::CMSG_DATA(cmsg) as *mut libc::c_int;
                    std::ptr::write_unaligned(data, hop_limit.hop_limit as libc::c_int);
                }
            }
        }

        info.msg_controllen = cmsg_len;

        let code = unsafe { libc::sendmsg(self.socket, &info, 0) };
        if code < 0 {
            return Err(std::io::Error::last_os_error());
        }

        Ok(())
    }

    pub fn into_async(self) -> Result<AsyncIcmp6Socket, std::io::Error> {
        AsyncIcmp6Socket::new(self)
    }
}

fn is_link_scoped(addr: &Ipv6Addr) -> bool {
    crate::ndisc::addr::is_link_local_unicast(addr) || (addr.is_multicast() && addr.segments()[0] & 0x000f <= 2)
}

impl Drop for RawIcmp6Socket {
    fn drop(&mut self) {
        if self.socket < 0 {
            return;
        }
        unsafe { libc::close(self.socket) };
    }
}

impl AsRawFd for RawIcmp6Socket {
    fn as_raw_fd(&self) -> std::os::unix::io::RawFd {
        self.socket
    }
}

#[derive(Debug, Clone)]
pub struct AsyncIcmp6Socket {
    inner: Arc<AsyncFd<RawIcmp6Socket>>,
}

impl AsyncIcmp6Socket {
    pub(crate) fn new(socket: RawIcmp6Socket) -> Result<Self, std::io::Error> {
        socket.set_nonblocking(true)?;
        let inner = Arc::new(AsyncFd::with_interest(socket, Interest::READABLE | Interest::WRITABLE)?);
        Ok(Self { inner })
    }

    pub fn get_ref(&self) -> &RawIcmp6Socket {
        self.inner.get_ref()
    }

    pub async fn recv(&self, packet: &mut packet::Packet) -> Result<(), std::io::Error> {
        loop {
            let mut guard = self.inner.readable().await?;
            match guard.try_io(|inner| inner.get_ref().recv(packet)) {
                Ok(res) => {
                    return res;
                }

                Err(_) => continue,
            }
        }
    }

    pub async fn send(&self, packet: &packet::Packet) -> Result<(), std::io::Error> {
        loop {
            let mut guard = self.inner.writable().await?;
            match guard.try_io(|inner| inner.get_ref().send(packet)) {
                Ok(res) => {
                    return res;
                }

                Err(_) => continue,
            }
        }
    }
}

pub trait SocketOpt {
    fn level(&self) -> c_int;
    fn optname(&self) -> c_int;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv6Opt(c_int);

impl SocketOpt for Ipv6Opt {
    fn level(&self) -> c_int {
        libc::IPPROTO_IPV6
    }

    fn optname(&self) -> c_int {
        self.0
    }
}

impl Ipv6Opt {
    pub const IPV6_ADD_MEMBERSHIP: Self = Self(libc::IPV6_ADD_MEMBERSHIP);
    pub const IPV6_DROP_MEMBERSHIP: Self = Self(libc::IPV6_DROP_MEMBERSHIP);
    pub const IPV6_UNICAST_HOPS: Self = Self(libc::IPV6_UNICAST_HOPS);
    pub const IPV6_MULTICAST_HOPS: Self = Self(libc::IPV6_MULTICAST_HOPS);
    pub const IPV6_MULTICAST_LOOP: Self = Self(libc::IPV6_MULTICAST_LOOP);
    pub const IPV6_RECVPKTINFO: Self = Self(libc::IPV6_RECVPKTINFO);
    pub const IPV6_RECVHOPLIMIT: Self = Self(libc::IPV6_RECVHOPLIMIT);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icmp6Opt(c_int);

impl SocketOpt for Icmp6Opt {
    fn level(&self) -> c_int {
        libc::IPPROTO_ICMPV6
    }

    fn optname(&self) -> c_int {
        self.0
    }
}

impl Icmp6Opt {
    /// `ICMP6_FILTER` from `<netinet/icmp6.h>`.
    pub const ICMP6_FILTER: Self = Self(1);
}
