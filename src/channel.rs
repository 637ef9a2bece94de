//! Per-channel settings and accumulation state.
//!
//! Extra resolution is synthesized by oversampling: to gain `r` bits beyond
//! the native sample width, `4^r` raw samples are summed and the total is
//! divided by `2^r`. Averaging `a` such readings on top of that gives the
//! derived constants
//!
//! ```text
//! samples_required = a * 4^r
//! divisor          = a * 2^r
//! ```
//!
//! so a channel that accumulates a constant input `k` for exactly
//! `samples_required` samples reads back `k * 2^r`.

use crate::converter::BURST_SAMPLES;
use crate::Error;

/// Formatting callback: maps a decimated reading to its stored value.
pub type FormatFn = fn(u16) -> u16;

/// Lifecycle callback, invoked with the channel id it concerns.
pub type HookFn = fn(u8);

/// Output resolution of a scanned channel.
///
/// The base variant is the peripheral's native sample width (10 bits on the
/// PIC24F-class converters this was designed around); each step up costs
/// four times as many raw samples per reading. Since the derived sample
/// count must stay below 65536, higher resolutions cap the usable number of
/// averages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Resolution {
    /// Native width, no oversampling (up to 65520 averages).
    Bits10 = 0,
    /// One extra bit (up to 16380 averages).
    Bits11 = 1,
    /// Two extra bits (up to 4095 averages).
    Bits12 = 2,
    /// Three extra bits (up to 1023 averages).
    Bits13 = 3,
    /// Four extra bits (up to 255 averages).
    Bits14 = 4,
    /// Five extra bits (up to 63 averages).
    Bits15 = 5,
    /// Six extra bits (up to 15 averages).
    Bits16 = 6,
}

impl Resolution {
    /// Bits of resolution added on top of the native sample width.
    pub const fn extra_bits(self) -> u8 {
        self as u8
    }
}

/// Optional per-channel callbacks.
///
/// Each cell is an independent capability; absent cells are no-ops. The
/// hooks run synchronously: `pre_scan` in the poll path just before sampling
/// (re)starts, `post_scan` in the completion interrupt, `finished` in the
/// poll path once a reading has been produced.
#[derive(Clone, Copy, Default)]
pub struct Hooks {
    /// Formats the decimated reading before it is stored.
    pub format: Option<FormatFn>,
    /// Runs as a channel is about to be sampled (e.g. a switched sensor
    /// supply turning on).
    pub pre_scan: Option<HookFn>,
    /// Runs as a channel finishes a burst (e.g. that supply turning off).
    pub post_scan: Option<HookFn>,
    /// Runs when a new reading is ready.
    pub finished: Option<HookFn>,
}

impl Hooks {
    /// No callbacks at all.
    pub const NONE: Self = Self {
        format: None,
        pre_scan: None,
        post_scan: None,
        finished: None,
    };
}

/// Validated channel settings with their derived accumulation constants.
#[derive(Clone, Copy)]
pub struct Settings {
    resolution: Resolution,
    samples_required: u16,
    divisor: u16,
    pub(crate) hooks: Hooks,
}

impl Settings {
    /// Plain averaging of a single burst: resolution increase 0, 16
    /// averages. This is what an enqueued channel gets before it is ever
    /// explicitly configured.
    pub const DEFAULT: Self = Self {
        resolution: Resolution::Bits10,
        samples_required: BURST_SAMPLES as u16,
        divisor: BURST_SAMPLES as u16,
        hooks: Hooks::NONE,
    };

    /// Derive settings from a resolution increase and an average count.
    ///
    /// Fails with [`Error::InvalidSampleCount`] unless
    /// `averages * 4^extra_bits` is a positive multiple of
    /// [`BURST_SAMPLES`] that fits in 16 bits.
    pub fn new(resolution: Resolution, averages: u16, hooks: Hooks) -> Result<Self, Error> {
        let extra = u32::from(resolution.extra_bits());
        let samples = u32::from(averages) << (2 * extra);
        if samples == 0 || samples % BURST_SAMPLES as u32 != 0 || samples > u32::from(u16::MAX) {
            return Err(Error::InvalidSampleCount);
        }
        Ok(Self {
            resolution,
            samples_required: samples as u16,
            // averages * 2^extra <= averages * 4^extra, so this fits too
            divisor: (u32::from(averages) << extra) as u16,
            hooks,
        })
    }

    /// The configured resolution.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Raw samples accumulated per produced reading.
    pub fn samples_required(&self) -> u16 {
        self.samples_required
    }

    /// Divisor applied to the accumulated sum.
    pub fn divisor(&self) -> u16 {
        self.divisor
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Accumulation state for one physical channel.
#[derive(Clone, Copy)]
pub(crate) struct ChannelState {
    pub(crate) settings: Settings,
    running_sum: u32,
    samples_taken: u16,
    pub(crate) value: u16,
    pub(crate) has_value: bool,
}

impl ChannelState {
    pub(crate) const IDLE: Self = Self {
        settings: Settings::DEFAULT,
        running_sum: 0,
        samples_taken: 0,
        value: 0,
        has_value: false,
    };

    /// Fresh state for newly applied settings; discards any in-flight
    /// accumulation and the previous reading.
    pub(crate) fn with_settings(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::IDLE
        }
    }

    /// Fold one completed burst into the accumulator.
    ///
    /// Returns the finished reading if this burst brought the channel up to
    /// its required sample count, `None` while more bursts are needed. On
    /// completion the accumulator is reset and the (optionally formatted)
    /// reading is latched into `value`.
    pub(crate) fn accumulate(&mut self, burst: &[u16; BURST_SAMPLES]) -> Option<u16> {
        for &sample in burst {
            self.running_sum += u32::from(sample);
        }
        self.samples_taken += BURST_SAMPLES as u16;
        if self.samples_taken < self.settings.samples_required() {
            return None;
        }
        let raw = (self.running_sum / u32::from(self.settings.divisor())) as u16;
        self.value = match self.settings.hooks.format {
            Some(format) => format(raw),
            None => raw,
        };
        self.has_value = true;
        self.running_sum = 0;
        self.samples_taken = 0;
        Some(self.value)
    }
}
