//! fpsxdp-ebpf: Request Handling
//!
//! Each handler rewrites the request in place into its response, reflects
//! the headers and trims the frame. The caller has already checked that the
//! whole request body is inside the frame.

use aya_ebpf::{
    bindings::{xdp_action, BPF_NOEXIST},
    helpers::{bpf_ktime_get_boot_ns, bpf_xdp_adjust_tail},
    programs::XdpContext,
};
use aya_log_ebpf::debug;
use core::ptr;
use fpsxdp_common::{
    checksum::ipv4_header_checksum,
    shard_index, shard_slot,
    wire::{InputData, InputHeader, JoinResponse, PlayerStatePacket, StatsPacket},
    InputEvent, SessionData, ETH_HEADER_LEN, INPUT_SIZE, IPV4_HEADER_LEN, JOIN_RESPONSE_PACKET,
    JOIN_RESPONSE_PACKET_SIZE, PAYLOAD_OFFSET, PLAYER_STATE_PACKET, PLAYER_STATE_PACKET_SIZE,
    PLAYER_STATE_SIZE, STATS_RESPONSE_PACKET, STATS_RESPONSE_PACKET_SIZE, UDP_HEADER_LEN,
};
use network_types::{eth::EthHdr, ip::Ipv4Hdr, udp::UdpHdr};

use crate::maps::{
    count_player_state_sent, player_state_shard, INPUT_EVENTS, SERVER_STATS, SESSIONS,
};
use crate::parser::{ptr_at, ptr_at_mut};

#[inline(always)]
pub fn handle_join(ctx: &XdpContext) -> u32 {
    let Some(response) = ptr_at_mut::<JoinResponse>(ctx, PAYLOAD_OFFSET) else {
        return xdp_action::XDP_DROP;
    };
    let session_id = unsafe { ptr::read_unaligned(ptr::addr_of!((*response).session_id)) };

    let session = SessionData::new();
    if SESSIONS.insert(&session_id, &session, BPF_NOEXIST as u64).is_ok() {
        debug!(ctx, "created session {:x}", session_id);
    }

    unsafe {
        (*response).packet_type = JOIN_RESPONSE_PACKET;
        ptr::write_unaligned(
            ptr::addr_of_mut!((*response).server_time),
            bpf_ktime_get_boot_ns(),
        );
    }
    answer(ctx, JOIN_RESPONSE_PACKET_SIZE)
}

#[inline(always)]
pub fn handle_input(ctx: &XdpContext) -> u32 {
    let (Some(header), Some(first)) = (
        ptr_at::<InputHeader>(ctx, PAYLOAD_OFFSET),
        ptr_at::<InputData>(ctx, PAYLOAD_OFFSET + core::mem::size_of::<InputHeader>()),
    ) else {
        return xdp_action::XDP_DROP;
    };
    let header = unsafe { ptr::read_unaligned(header) };
    let session_id = header.session_id;

    if unsafe { SESSIONS.get(&session_id) }.is_none() {
        debug!(ctx, "could not find session {:x}", session_id);
        return xdp_action::XDP_DROP;
    }

    // forwarded whether or not the echo below succeeds
    let mut event = InputEvent {
        session_id,
        sequence: header.sequence,
        t: header.t,
        dt: unsafe { ptr::read_unaligned(ptr::addr_of!((*first).dt)) },
        input: [0; INPUT_SIZE],
        _pad: [0; 4],
    };
    unsafe {
        ptr::copy_nonoverlapping(
            ptr::addr_of!((*first).input) as *const u8,
            event.input.as_mut_ptr(),
            INPUT_SIZE,
        );
    }
    INPUT_EVENTS.output(ctx, &event, 0);

    let shard = shard_index(session_id);
    let Some(states) = player_state_shard(shard) else {
        debug!(ctx, "could not find player state map for shard {}", shard);
        return xdp_action::XDP_DROP;
    };
    let slot = shard_slot(session_id);
    let Some(state) = (unsafe { states.get(&slot) }) else {
        debug!(ctx, "could not find player state for session {:x}", session_id);
        return xdp_action::XDP_DROP;
    };

    let Some(response) = ptr_at_mut::<PlayerStatePacket>(ctx, PAYLOAD_OFFSET) else {
        return xdp_action::XDP_DROP;
    };
    unsafe {
        (*response).packet_type = PLAYER_STATE_PACKET;
        ptr::copy_nonoverlapping(
            state.data.as_ptr(),
            ptr::addr_of_mut!((*response).player_state) as *mut u8,
            PLAYER_STATE_SIZE,
        );
    }

    let action = answer(ctx, PLAYER_STATE_PACKET_SIZE);
    if action == xdp_action::XDP_TX {
        count_player_state_sent();
    }
    action
}

#[inline(always)]
pub fn handle_stats(ctx: &XdpContext) -> u32 {
    let Some(stats) = SERVER_STATS.get(0) else {
        // can't happen once loaded
        return xdp_action::XDP_DROP;
    };
    let Some(packet) = ptr_at_mut::<StatsPacket>(ctx, PAYLOAD_OFFSET) else {
        return xdp_action::XDP_DROP;
    };
    unsafe {
        (*packet).packet_type = STATS_RESPONSE_PACKET;
        ptr::write_unaligned(
            ptr::addr_of_mut!((*packet).inputs_processed),
            stats.inputs_processed,
        );
        ptr::write_unaligned(
            ptr::addr_of_mut!((*packet).player_state_packets_sent),
            stats.player_state_packets_sent,
        );
    }
    answer(ctx, STATS_RESPONSE_PACKET_SIZE)
}

/// Reflects the frame back to its sender and trims it to the response.
#[inline(always)]
fn answer(ctx: &XdpContext, response_size: usize) -> u32 {
    if reflect(ctx, response_size).is_none() {
        return xdp_action::XDP_DROP;
    }
    let frame_len = ctx.data_end() - ctx.data();
    let delta = (PAYLOAD_OFFSET + response_size) as i32 - frame_len as i32;
    if delta != 0 && unsafe { bpf_xdp_adjust_tail(ctx.ctx, delta) } != 0 {
        return xdp_action::XDP_DROP;
    }
    xdp_action::XDP_TX
}

#[inline(always)]
fn reflect(ctx: &XdpContext, payload_len: usize) -> Option<()> {
    let eth = ptr_at_mut::<EthHdr>(ctx, 0)?;
    let ip = ptr_at_mut::<Ipv4Hdr>(ctx, ETH_HEADER_LEN)?;
    let udp = ptr_at_mut::<UdpHdr>(ctx, ETH_HEADER_LEN + IPV4_HEADER_LEN)?;

    unsafe {
        let mac = (*eth).src_addr;
        (*eth).src_addr = (*eth).dst_addr;
        (*eth).dst_addr = mac;

        let addr = (*ip).src_addr;
        (*ip).src_addr = (*ip).dst_addr;
        (*ip).dst_addr = addr;
        (*ip).tot_len = ((IPV4_HEADER_LEN + UDP_HEADER_LEN + payload_len) as u16).to_be();

        let port = (*udp).source;
        (*udp).source = (*udp).dest;
        (*udp).dest = port;
        (*udp).len = ((UDP_HEADER_LEN + payload_len) as u16).to_be();
        (*udp).check = 0;

        let header = ptr::read_unaligned(ip as *const [u8; IPV4_HEADER_LEN]);
        (*ip).check = ipv4_header_checksum(&header).to_be();
    }
    Some(())
}
