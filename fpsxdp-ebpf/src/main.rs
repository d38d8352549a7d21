//! fpsxdp-ebpf: the game server fast path
//!
//! runs in the driver (XDP) on whichever CPU got the packet. join, input and
//! stats requests on the game port are answered right here with XDP_TX and
//! never reach the network stack. inputs are also pushed to the control
//! plane through a perf event array, which integrates them and writes the
//! next player state back into the shard maps we echo from.

#![no_std]
#![no_main]

mod logic;
mod maps;
mod parser;

use aya_ebpf::{bindings::xdp_action, macros::xdp, programs::XdpContext};
use aya_log_ebpf::debug;

use crate::parser::Classified;

#[xdp]
pub fn fpsxdp(ctx: XdpContext) -> u32 {
    match try_fpsxdp(&ctx) {
        Ok(action) => action,
        Err(_) => xdp_action::XDP_PASS,
    }
}

#[inline(always)]
fn try_fpsxdp(ctx: &XdpContext) -> Result<u32, ()> {
    let action = match parser::classify(ctx) {
        Classified::NotOurs => xdp_action::XDP_PASS,
        Classified::Malformed => {
            debug!(ctx, "dropping malformed packet ({} bytes)", ctx.data_end() - ctx.data());
            xdp_action::XDP_DROP
        }
        Classified::Join => logic::handle_join(ctx),
        Classified::Input => logic::handle_input(ctx),
        Classified::Stats => logic::handle_stats(ctx),
    };
    Ok(action)
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    loop {}
}

#[link_section = "license"]
#[no_mangle]
static LICENSE: [u8; 4] = *b"GPL\0";
