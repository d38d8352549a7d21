#![allow(dead_code)]

use fpsxdp_common::{
    ETH_P_IP, INPUT_PACKET, INPUT_PACKET_SIZE, IPPROTO_UDP, IPV4_HEADER_LEN, JOIN_REQUEST_PACKET,
    JOIN_REQUEST_PACKET_SIZE, PAYLOAD_OFFSET, SERVER_PORT, STATS_REQUEST_PACKET,
    STATS_REQUEST_PACKET_SIZE, UDP_HEADER_LEN,
};
use fpsxdp_core::Frame;

pub const CLIENT_MAC: [u8; 6] = [0x0a, 0x11, 0x22, 0x33, 0x44, 0x55];
pub const SERVER_MAC: [u8; 6] = [0x0a, 0x66, 0x77, 0x88, 0x99, 0xaa];
pub const CLIENT_IP: [u8; 4] = [192, 168, 1, 20];
pub const SERVER_IP: [u8; 4] = [192, 168, 1, 1];
pub const CLIENT_PORT: u16 = 61000;

/// Ethernet/IPv4/UDP frame from the client to `dest_port`.
pub fn frame(dest_port: u16, payload: &[u8]) -> Frame {
    let mut bytes = Vec::with_capacity(PAYLOAD_OFFSET + payload.len());
    bytes.extend_from_slice(&SERVER_MAC);
    bytes.extend_from_slice(&CLIENT_MAC);
    bytes.extend_from_slice(&ETH_P_IP.to_be_bytes());

    let total_len = (IPV4_HEADER_LEN + UDP_HEADER_LEN + payload.len()) as u16;
    bytes.push(0x45);
    bytes.push(0);
    bytes.extend_from_slice(&total_len.to_be_bytes());
    bytes.extend_from_slice(&[0, 0, 0x40, 0]);
    bytes.push(64);
    bytes.push(IPPROTO_UDP);
    bytes.extend_from_slice(&[0, 0]);
    bytes.extend_from_slice(&CLIENT_IP);
    bytes.extend_from_slice(&SERVER_IP);

    bytes.extend_from_slice(&CLIENT_PORT.to_be_bytes());
    bytes.extend_from_slice(&dest_port.to_be_bytes());
    bytes.extend_from_slice(&((UDP_HEADER_LEN + payload.len()) as u16).to_be_bytes());
    bytes.extend_from_slice(&[0, 0]);

    bytes.extend_from_slice(payload);
    Frame::new(bytes)
}

pub fn join(session_id: u64, send_time: u64) -> Frame {
    let mut body = vec![0u8; JOIN_REQUEST_PACKET_SIZE];
    body[0] = JOIN_REQUEST_PACKET;
    body[1..9].copy_from_slice(&session_id.to_le_bytes());
    body[9..17].copy_from_slice(&send_time.to_le_bytes());
    frame(SERVER_PORT, &body)
}

pub fn input(session_id: u64, sequence: u64, dt: u64) -> Frame {
    let mut body = vec![0u8; INPUT_PACKET_SIZE];
    body[0] = INPUT_PACKET;
    body[1..9].copy_from_slice(&session_id.to_le_bytes());
    body[9..17].copy_from_slice(&sequence.to_le_bytes());
    body[25..33].copy_from_slice(&dt.to_le_bytes());
    body[33..133].fill(0x7f);
    frame(SERVER_PORT, &body)
}

pub fn stats_request() -> Frame {
    let mut body = vec![0u8; STATS_REQUEST_PACKET_SIZE];
    body[0] = STATS_REQUEST_PACKET;
    frame(SERVER_PORT, &body)
}

pub fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

pub fn ip_header(frame: &Frame) -> [u8; IPV4_HEADER_LEN] {
    let mut header = [0u8; IPV4_HEADER_LEN];
    header.copy_from_slice(&frame.as_bytes()[14..14 + IPV4_HEADER_LEN]);
    header
}
