//! fpsxdp-ebpf: Packet Parser
//!
//! One bounds check per layer. Anything that fails before the port match is
//! somebody else's traffic; after the port match it is ours and malformed.

use aya_ebpf::programs::XdpContext;
use core::mem;
use fpsxdp_common::{
    INPUT_PACKET, INPUT_PACKET_SIZE, JOIN_REQUEST_PACKET, JOIN_REQUEST_PACKET_SIZE,
    PAYLOAD_OFFSET, SERVER_PORT, STATS_REQUEST_PACKET, STATS_REQUEST_PACKET_SIZE,
};
use network_types::{
    eth::{EthHdr, EtherType},
    ip::{IpProto, Ipv4Hdr},
    udp::UdpHdr,
};

/// version 4, five 32-bit words
const IPV4_NO_OPTIONS: u8 = 0x45;

pub enum Classified {
    NotOurs,
    Malformed,
    Join,
    Input,
    Stats,
}

#[inline(always)]
pub fn ptr_at<T>(ctx: &XdpContext, offset: usize) -> Option<*const T> {
    let start = ctx.data();
    let end = ctx.data_end();
    if start + offset + mem::size_of::<T>() > end {
        return None;
    }
    Some((start + offset) as *const T)
}

#[inline(always)]
pub fn ptr_at_mut<T>(ctx: &XdpContext, offset: usize) -> Option<*mut T> {
    Some(ptr_at::<T>(ctx, offset)? as *mut T)
}

/// True when `len` bytes starting at `offset` are inside the frame.
#[inline(always)]
pub fn fits(ctx: &XdpContext, offset: usize, len: usize) -> bool {
    ctx.data() + offset + len <= ctx.data_end()
}

#[inline(always)]
pub fn classify(ctx: &XdpContext) -> Classified {
    let Some(eth) = ptr_at::<EthHdr>(ctx, 0) else {
        return Classified::NotOurs;
    };
    if unsafe { (*eth).ether_type } != EtherType::Ipv4 {
        return Classified::NotOurs;
    }

    let Some(ip) = ptr_at::<Ipv4Hdr>(ctx, EthHdr::LEN) else {
        return Classified::NotOurs;
    };
    // read the raw version/IHL byte; options shift the UDP header
    let ver_ihl = unsafe { *(ip as *const u8) };
    if ver_ihl != IPV4_NO_OPTIONS || unsafe { (*ip).proto } != IpProto::Udp {
        return Classified::NotOurs;
    }

    let Some(udp) = ptr_at::<UdpHdr>(ctx, EthHdr::LEN + Ipv4Hdr::LEN) else {
        return Classified::NotOurs;
    };
    if u16::from_be(unsafe { (*udp).dest }) != SERVER_PORT {
        return Classified::NotOurs;
    }

    // --- OURS FROM HERE ---
    let Some(packet_type) = ptr_at::<u8>(ctx, PAYLOAD_OFFSET) else {
        return Classified::Malformed;
    };
    let (kind, size) = match unsafe { *packet_type } {
        JOIN_REQUEST_PACKET => (Classified::Join, JOIN_REQUEST_PACKET_SIZE),
        INPUT_PACKET => (Classified::Input, INPUT_PACKET_SIZE),
        STATS_REQUEST_PACKET => (Classified::Stats, STATS_REQUEST_PACKET_SIZE),
        _ => return Classified::Malformed,
    };
    if !fits(ctx, PAYLOAD_OFFSET, size) {
        return Classified::Malformed;
    }
    kind
}
