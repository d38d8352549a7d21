//! Packet codec over raw Ethernet frames.
//!
//! One bounds check per layer, in order: Ethernet, IPv4, UDP, the type byte,
//! then the full body for the detected type. Anything that falls short before
//! the destination port matched is not ours and goes to the stack untouched;
//! once the port matched, a short or unknown body is dropped.

use fpsxdp_common::{
    checksum::{ipv4_header_checksum, IPV4_CHECKSUM_OFFSET},
    ETH_HEADER_LEN, ETH_P_IP, INPUT_PACKET, INPUT_PACKET_SIZE, IPPROTO_UDP, IPV4_HEADER_LEN,
    JOIN_REQUEST_PACKET, JOIN_REQUEST_PACKET_SIZE, PAYLOAD_OFFSET, SERVER_PORT,
    STATS_REQUEST_PACKET, STATS_REQUEST_PACKET_SIZE, UDP_HEADER_LEN,
};

use crate::{CoreError, Result};

/// Largest frame an XDP buffer holds on a 4K page.
pub const MAX_FRAME_LEN: usize = 3520;

const ETH_DST: usize = 0;
const ETH_SRC: usize = 6;
const ETH_TYPE: usize = 12;
const MAC_LEN: usize = 6;

const IP: usize = ETH_HEADER_LEN;
const IP_VER_IHL: usize = IP;
const IP_TOT_LEN: usize = IP + 2;
const IP_PROTO: usize = IP + 9;
const IP_SADDR: usize = IP + 12;
const IP_DADDR: usize = IP + 16;
/// Version 4, IHL 5. Headers with options are left to the stack.
const IPV4_NO_OPTIONS: u8 = 0x45;

const UDP: usize = IP + IPV4_HEADER_LEN;
const UDP_SOURCE: usize = UDP;
const UDP_DEST: usize = UDP + 2;
const UDP_LEN: usize = UDP + 4;
const UDP_CHECK: usize = UDP + 6;

/// One Ethernet frame with a logical length, like an XDP buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// UDP payload. Empty if the frame ends inside the headers.
    pub fn payload(&self) -> &[u8] {
        self.bytes.get(PAYLOAD_OFFSET..).unwrap_or(&[])
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        self.bytes.get_mut(PAYLOAD_OFFSET..).unwrap_or(&mut [])
    }

    /// Moves the end of the frame by `delta` bytes. Growth is zero-filled.
    ///
    /// Like `bpf_xdp_adjust_tail`, the frame must keep its Ethernet header
    /// and may not exceed the buffer.
    pub fn resize_tail(&mut self, delta: isize) -> Result<()> {
        let len = self.bytes.len();
        let new_len = len
            .checked_add_signed(delta)
            .filter(|n| (ETH_HEADER_LEN..=MAX_FRAME_LEN).contains(n))
            .ok_or(CoreError::FrameResize { len, delta })?;
        self.bytes.resize(new_len, 0);
        Ok(())
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Join,
    Input,
    Stats,
}

impl Request {
    /// Fixed body size of the request, type byte included.
    pub const fn body_size(self) -> usize {
        match self {
            Request::Join => JOIN_REQUEST_PACKET_SIZE,
            Request::Input => INPUT_PACKET_SIZE,
            Request::Stats => STATS_REQUEST_PACKET_SIZE,
        }
    }
}

/// Why a frame addressed to the game port cannot be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Malformed {
    Empty,
    UnknownType(u8),
    Short { packet_type: u8, len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classified {
    /// Not IPv4/UDP to the game port, or cut short before the port was known.
    NotOurs,
    Malformed(Malformed),
    Request(Request),
}

/// Classifies a frame for [`SERVER_PORT`].
pub fn classify(frame: &[u8]) -> Classified {
    classify_for_port(frame, SERVER_PORT)
}

pub fn classify_for_port(frame: &[u8], port: u16) -> Classified {
    if frame.len() < ETH_HEADER_LEN || be16(frame, ETH_TYPE) != ETH_P_IP {
        return Classified::NotOurs;
    }
    if frame.len() < UDP || frame[IP_VER_IHL] != IPV4_NO_OPTIONS || frame[IP_PROTO] != IPPROTO_UDP {
        return Classified::NotOurs;
    }
    if frame.len() < PAYLOAD_OFFSET || be16(frame, UDP_DEST) != port {
        return Classified::NotOurs;
    }

    let payload = &frame[PAYLOAD_OFFSET..];
    let Some(&packet_type) = payload.first() else {
        return Classified::Malformed(Malformed::Empty);
    };
    let request = match packet_type {
        JOIN_REQUEST_PACKET => Request::Join,
        INPUT_PACKET => Request::Input,
        STATS_REQUEST_PACKET => Request::Stats,
        other => return Classified::Malformed(Malformed::UnknownType(other)),
    };
    if payload.len() < request.body_size() {
        return Classified::Malformed(Malformed::Short {
            packet_type,
            len: payload.len(),
        });
    }
    Classified::Request(request)
}

/// Turns a request frame into a response addressed back to its sender.
///
/// Swaps MACs, IPv4 addresses and UDP ports, sets both length fields for a
/// `payload_len` byte payload, clears the UDP checksum and recomputes the
/// IPv4 header checksum. Does not change the frame length.
pub fn reflect(frame: &mut [u8], payload_len: usize) -> Result<()> {
    if frame.len() < PAYLOAD_OFFSET {
        return Err(CoreError::FrameTooShort {
            needed: PAYLOAD_OFFSET,
            len: frame.len(),
        });
    }

    swap_ranges(frame, ETH_DST, ETH_SRC, MAC_LEN);

    swap_ranges(frame, IP_SADDR, IP_DADDR, 4);
    put_be16(frame, IP_TOT_LEN, (IPV4_HEADER_LEN + UDP_HEADER_LEN + payload_len) as u16);

    swap_ranges(frame, UDP_SOURCE, UDP_DEST, 2);
    put_be16(frame, UDP_LEN, (UDP_HEADER_LEN + payload_len) as u16);
    put_be16(frame, UDP_CHECK, 0);

    let mut header = [0u8; IPV4_HEADER_LEN];
    header.copy_from_slice(&frame[IP..UDP]);
    put_be16(frame, IP + IPV4_CHECKSUM_OFFSET, ipv4_header_checksum(&header));
    Ok(())
}

fn swap_ranges(frame: &mut [u8], a: usize, b: usize, len: usize) {
    debug_assert!(a + len <= b);
    let (head, tail) = frame.split_at_mut(b);
    head[a..a + len].swap_with_slice(&mut tail[..len]);
}

fn be16(frame: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([frame[at], frame[at + 1]])
}

fn put_be16(frame: &mut [u8], at: usize, value: u16) {
    frame[at..at + 2].copy_from_slice(&value.to_be_bytes());
}
