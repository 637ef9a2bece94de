//! Scan scheduler and oversampling engine for multiplexed ADCs
//!
//! Many small microcontroller ADCs convert in hardware-triggered bursts: the
//! sequencer free-runs, dumps a fixed-size group of raw samples into a
//! buffer, and raises an interrupt once per burst. This crate turns such a
//! peripheral into a multi-channel sampling service. It round-robins a
//! queue of input channels, accumulates bursts per channel, and applies an
//! oversample-and-decimate step that synthesizes up to 6 bits of resolution
//! beyond the converter's native sample width: summing `4^r` raw samples and
//! dividing by `2^r` yields one reading with `r` extra bits.
//!
//! The hardware itself stays behind the [`Converter`] trait; the crate holds
//! only the scheduling and arithmetic, so it runs (and is tested) on the
//! host as well as on target.
//!
//! ## Usage
//!
//! ```
//! use adc_scan::{Converter, Resolution, Scanner, BURST_SAMPLES};
//!
//! // Stand-in for the chip-specific converter driver.
//! struct Sequencer {
//!     running: bool,
//! }
//!
//! impl Converter for Sequencer {
//!     fn start(&mut self) {
//!         self.running = true;
//!     }
//!     fn stop(&mut self) {
//!         self.running = false;
//!     }
//!     fn read_burst(&mut self, burst: &mut [u16; BURST_SAMPLES]) {
//!         *burst = [512; BURST_SAMPLES];
//!     }
//!     fn set_active(&mut self, _channel: u8, _enabled: bool) {}
//! }
//!
//! // 16 channels, a queue 8 entries deep.
//! let mut scanner: Scanner<_, 16, 8> = Scanner::new(Sequencer { running: false });
//!
//! // Channel 3 at 12-bit resolution (2 extra bits), 16 averages:
//! // 256 raw samples per reading.
//! scanner.configure(3, Resolution::Bits12, 16, Default::default())?;
//! scanner.enqueue(3)?;
//!
//! // On target, the converter's burst interrupt calls `on_interrupt` and
//! // the main loop calls `poll`. Sixteen bursts complete one reading.
//! for _ in 0..16 {
//!     scanner.poll();
//!     scanner.on_interrupt();
//! }
//! scanner.poll();
//! assert_eq!(scanner.value(3), 2048); // 512 * 2^2
//! # Ok::<(), adc_scan::Error>(())
//! ```
//!
//! Channels update whenever [`Scanner::poll`] is called; the more often it
//! is called, the faster they update. A channel enqueued `n` times is
//! visited `n` times per rotation, so the period of one full update is
//! roughly `(4^r * a * q * t) / (16 * n)` for `a` averages, `q` total queue
//! entries and a poll interval of `t`.

#![deny(missing_docs)]
#![no_std]

pub mod channel;
pub mod converter;
pub mod queue;
pub mod scan;

pub use channel::{FormatFn, HookFn, Hooks, Resolution, Settings};
pub use converter::{Converter, BURST_SAMPLES};
pub use queue::ScanQueue;
pub use scan::Scanner;

/// Errors that may occur when configuring the scanner.
///
/// Configuration is fail-closed: a rejected call mutates nothing. Scanning
/// itself ([`Scanner::poll`] / [`Scanner::on_interrupt`]) cannot fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Channel id outside the channel table.
    InvalidChannel,
    /// The derived sample count is zero, not a multiple of the burst size,
    /// or does not fit in 16 bits.
    InvalidSampleCount,
    /// No empty slot left in the scan queue.
    QueueFull,
}
