#![forbid(unsafe_code)]
#![warn(clippy::all)]

//! Sans-IO DTLS 1.2 server engine for pre-shared key cipher suites.
//!
//! The crate performs no IO of its own. The caller owns the socket and the
//! clock, feeds received datagrams into [`Server::handle_packet`], drives
//! timers through [`Server::handle_timeout`] and drains everything the
//! engine produces via [`Server::poll_output`].
//!
//! Supported cipher suites:
//!
//! - `TLS_DHE_PSK_WITH_AES_128_CBC_SHA256`
//! - `TLS_PSK_WITH_AES_128_CBC_SHA256`
//!
//! The pre-shared key is looked up through the [`PskStore`] trait; a
//! fixed-key [`StaticPsk`] is provided for simple deployments and tests.

#[macro_use]
extern crate log;

pub mod buffer;
mod config;
pub mod crypto;
mod engine;
mod error;
mod incoming;
pub mod message;
mod psk;
mod queue;
mod rng;
mod server;
mod timer;
mod util;
mod window;

pub use config::{Config, ConfigBuilder};
pub use error::Error;
pub use psk::{PskStore, StaticPsk, MAX_PSK_IDENTITY_LEN, MAX_PSK_KEY_LEN};
pub use server::Server;

use std::fmt;
use std::time::Instant;

/// One unit of work from [`Server::poll_output`].
///
/// Poll in a loop; [`Output::Timeout`] means there is nothing further to do
/// until the given instant (or until the next packet arrives).
pub enum Output<'a> {
    /// A datagram to send to the peer.
    Packet(&'a [u8]),
    /// Decrypted application data received from the peer.
    ApplicationData(&'a [u8]),
    /// The handshake just completed.
    Connected,
    /// Nothing pending before this instant.
    Timeout(Instant),
}

impl fmt::Debug for Output<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Packet(data) => write!(f, "Packet({} bytes)", data.len()),
            Output::ApplicationData(data) => write!(f, "ApplicationData({} bytes)", data.len()),
            Output::Connected => write!(f, "Connected"),
            Output::Timeout(at) => write!(f, "Timeout({:?})", at),
        }
    }
}
