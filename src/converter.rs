//! Contract between the scan scheduler and the sampling hardware.
//!
//! The scanner never touches registers itself. Everything chip-specific
//! (clock selection, reference wiring, pin muxing, the conversion sequencer)
//! lives behind [`Converter`], which only has to know how to run bursts of
//! automatic conversions and deliver them when its completion interrupt
//! fires.

/// Number of raw samples the peripheral delivers per completed burst.
///
/// The accumulation arithmetic assumes bursts of exactly this size; sample
/// counts are validated to be a multiple of it. Peripherals with a different
/// burst length need their interrupt threshold reconfigured to match.
pub const BURST_SAMPLES: usize = 16;

/// A burst-sampling conversion peripheral, as driven by
/// [`Scanner`](crate::Scanner).
///
/// Implementations wrap the actual hardware: on RP2040 this would be the ADC
/// in free-running mode with the FIFO interrupt threshold set to
/// [`BURST_SAMPLES`], on PIC24F the auto-convert sequencer with `SMPI`
/// interrupts every 16th conversion.
///
/// The scanner drives the peripheral from two contexts. Its completion
/// interrupt must result in a call to
/// [`Scanner::on_interrupt`](crate::Scanner::on_interrupt), which calls
/// [`stop`](Converter::stop); everything else ([`start`](Converter::start),
/// [`read_burst`](Converter::read_burst),
/// [`set_active`](Converter::set_active)) is called from the poll context
/// only. The scanner keeps at most one channel in the active sampling set at
/// a time.
pub trait Converter {
    /// Start (or restart) automatic burst sampling.
    ///
    /// Called on every poll, so this must be idempotent while a burst is
    /// already in flight.
    fn start(&mut self);

    /// Stop automatic sampling.
    ///
    /// Called from the completion interrupt. The peripheral must not begin
    /// another burst until [`start`](Converter::start) is called again; this
    /// back-pressure is what makes the scanner lossless when it is polled
    /// slowly.
    fn stop(&mut self);

    /// Copy the most recently completed burst out of the peripheral.
    ///
    /// Only called after a completion signal, while sampling is stopped, and
    /// at most once per burst.
    fn read_burst(&mut self, burst: &mut [u16; BURST_SAMPLES]);

    /// Add a channel to, or remove it from, the hardware sampling set.
    fn set_active(&mut self, channel: u8, enabled: bool);
}
