//! Round-robin scan controller and decimation engine.
//!
//! [`Scanner`] owns the channel table, the scan queue and the converter, and
//! splits its work across the two execution contexts of interrupt-driven
//! sampling hardware:
//!
//! * the completion interrupt calls [`Scanner::on_interrupt`], which only
//!   stops the converter, fires the channel's post-scan hook and sets the
//!   completion flag;
//! * the host's main loop calls [`Scanner::poll`], which does everything
//!   else: it consumes a completed burst into the current channel's
//!   accumulator, rotates the queue cursor, swaps the hardware sampling set
//!   over to the next channel and restarts the converter.
//!
//! The completion flag is a single-slot event cell: the interrupt path may
//! only set it, the poll path may only clear it. Because the converter does
//! not begin another burst until the poll path restarts it, a slow poll rate
//! costs update throughput but never loses data.

use core::sync::atomic::{AtomicBool, Ordering};

use embedded_hal_0_2::adc::{Channel, OneShot};

use crate::channel::{ChannelState, Hooks, Resolution, Settings};
use crate::converter::{Converter, BURST_SAMPLES};
use crate::queue::ScanQueue;
use crate::Error;

/// Scan scheduler for a burst-sampling converter.
///
/// `CHANNELS` is the size of the channel table (ids `0..CHANNELS`), `DEPTH`
/// the scan-queue capacity. Both are fixed at construction, mirroring the
/// singleton hardware resource behind the [`Converter`].
pub struct Scanner<C, const CHANNELS: usize, const DEPTH: usize> {
    converter: C,
    channels: [ChannelState; CHANNELS],
    queue: ScanQueue<DEPTH>,
    cursor: usize,
    burst_done: AtomicBool,
    sampling: bool,
}

impl<C, const CHANNELS: usize, const DEPTH: usize> Scanner<C, CHANNELS, DEPTH>
where
    C: Converter,
{
    /// Create a scanner with an empty queue and all channels idle.
    ///
    /// No channel is sampled until at least one [`configure`](Self::configure)
    /// / [`enqueue`](Self::enqueue) pair has run and [`poll`](Self::poll) is
    /// being called.
    pub fn new(converter: C) -> Self {
        Self {
            converter,
            channels: [ChannelState::IDLE; CHANNELS],
            queue: ScanQueue::new(),
            cursor: 0,
            burst_done: AtomicBool::new(false),
            sampling: false,
        }
    }

    /// Apply settings to a channel and mark it for analog sampling.
    ///
    /// May be called again at any time to change resolution, averaging or
    /// callbacks; doing so discards any accumulation in flight for that
    /// channel along with its previous reading. On error nothing is mutated.
    pub fn configure(
        &mut self,
        channel: u8,
        resolution: Resolution,
        averages: u16,
        hooks: Hooks,
    ) -> Result<(), Error> {
        if usize::from(channel) >= CHANNELS {
            return Err(Error::InvalidChannel);
        }
        let settings = Settings::new(resolution, averages, hooks)?;
        self.configure_with(channel, settings)
    }

    /// Apply pre-built [`Settings`] to a channel and mark it for analog
    /// sampling.
    ///
    /// Same as [`configure`](Self::configure) with the derivation already
    /// done, which lets one validated settings value be shared across
    /// several channels.
    pub fn configure_with(&mut self, channel: u8, settings: Settings) -> Result<(), Error> {
        if usize::from(channel) >= CHANNELS {
            return Err(Error::InvalidChannel);
        }
        self.channels[usize::from(channel)] = ChannelState::with_settings(settings);
        self.converter.set_active(channel, true);
        Ok(())
    }

    /// Append a channel to the scan queue.
    ///
    /// A channel may be enqueued more than once; each occurrence earns it
    /// one visit per rotation, so repeats raise its update rate
    /// proportionally.
    pub fn enqueue(&mut self, channel: u8) -> Result<(), Error> {
        if usize::from(channel) >= CHANNELS {
            return Err(Error::InvalidChannel);
        }
        self.queue.push(channel).map_err(|_| Error::QueueFull)
    }

    /// Drive the scan forward. Call this from the main loop, as often as
    /// convenient; the more often it is called, the faster channels update.
    ///
    /// If a burst has completed since the last call, it is folded into the
    /// current channel's accumulator, the cursor advances and the sampling
    /// set is swapped to the next channel. In any case the current channel's
    /// pre-scan hook runs and the converter is (re)started, unless the
    /// queue is empty, in which case the scanner stays idle rather than
    /// sampling whatever the cursor happens to address.
    pub fn poll(&mut self) {
        if self.burst_done.load(Ordering::Acquire) {
            self.drain();
            self.burst_done.store(false, Ordering::Release);
        }
        if self.queue.is_empty() {
            return;
        }
        if self.queue.get(self.cursor).is_none() {
            // Only reachable if slots before the cursor were vacated; keep
            // the cursor on an occupied slot.
            self.cursor = self.queue.advance(self.cursor);
        }
        if let Some(channel) = self.queue.get(self.cursor) {
            if let Some(pre_scan) = self.channels[usize::from(channel)].settings.hooks.pre_scan {
                pre_scan(channel);
            }
        }
        self.converter.start();
        self.sampling = true;
    }

    /// Completion-signal handler. Call this from the converter's burst
    /// interrupt, and nowhere else.
    ///
    /// Deliberately minimal: stops the converter (so no burst is overwritten
    /// before [`poll`](Self::poll) consumes it), fires the current channel's
    /// post-scan hook and sets the completion flag. All accumulation
    /// arithmetic stays out of interrupt context.
    pub fn on_interrupt(&mut self) {
        self.converter.stop();
        self.sampling = false;
        if let Some(channel) = self.queue.get(self.cursor) {
            if let Some(post_scan) = self.channels[usize::from(channel)].settings.hooks.post_scan {
                post_scan(channel);
            }
        }
        self.burst_done.store(true, Ordering::Release);
    }

    /// Last completed (optionally formatted) reading for a channel.
    ///
    /// Stays constant between updates; reads 0 for a channel that has not
    /// produced a reading yet or is out of range.
    pub fn value(&self, channel: u8) -> u16 {
        self.channels
            .get(usize::from(channel))
            .map(|state| state.value)
            .unwrap_or(0)
    }

    /// Whether a channel has produced at least one reading.
    pub fn has_reading(&self, channel: u8) -> bool {
        self.channels
            .get(usize::from(channel))
            .map(|state| state.has_value)
            .unwrap_or(false)
    }

    /// Channel the queue cursor currently addresses.
    pub fn current_channel(&self) -> Option<u8> {
        self.queue.get(self.cursor)
    }

    /// Whether the converter is actively sampling.
    pub fn is_sampling(&self) -> bool {
        self.sampling
    }

    /// Release the underlying converter.
    pub fn free(self) -> C {
        self.converter
    }

    /// Consume the completed burst for the cursor's channel and rotate the
    /// sampling set to the next queue entry.
    fn drain(&mut self) {
        let mut burst = [0u16; BURST_SAMPLES];
        self.converter.read_burst(&mut burst);
        if let Some(channel) = self.queue.get(self.cursor) {
            let index = usize::from(channel);
            let completed = self.channels[index].accumulate(&burst).is_some();
            if completed {
                if let Some(finished) = self.channels[index].settings.hooks.finished {
                    finished(channel);
                }
            }
            self.converter.set_active(channel, false);
        }
        self.cursor = self.queue.advance(self.cursor);
        if let Some(next) = self.queue.get(self.cursor) {
            self.converter.set_active(next, true);
        }
    }
}

// Embedded HAL 1.0.0 has no ADC trait, so expose the 0.2 one, the seam most
// HALs still offer. `read` would-blocks until the channel has produced its
// first reading, then always yields the latest value.
impl<WORD, SRC, C, const CHANNELS: usize, const DEPTH: usize> OneShot<Scanner<C, CHANNELS, DEPTH>, WORD, SRC>
    for Scanner<C, CHANNELS, DEPTH>
where
    WORD: From<u16>,
    SRC: Channel<Scanner<C, CHANNELS, DEPTH>, ID = u8>,
    C: Converter,
{
    type Error = Error;

    fn read(&mut self, _pin: &mut SRC) -> nb::Result<WORD, Self::Error> {
        let channel = SRC::channel();
        let state = self
            .channels
            .get(usize::from(channel))
            .ok_or(nb::Error::Other(Error::InvalidChannel))?;
        if !state.has_value {
            return Err(nb::Error::WouldBlock);
        }
        Ok(state.value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    const CHANNELS: usize = 16;

    /// Scripted converter: every channel reads as a constant level, chosen
    /// as the lowest channel in the active set (hardware scan order).
    struct Mock {
        levels: [u16; CHANNELS],
        active: [bool; CHANNELS],
        running: bool,
        starts: usize,
        stops: usize,
    }

    impl Mock {
        fn flat(level: u16) -> Self {
            Self {
                levels: [level; CHANNELS],
                active: [false; CHANNELS],
                running: false,
                starts: 0,
                stops: 0,
            }
        }

        fn active_count(&self) -> usize {
            self.active.iter().filter(|&&a| a).count()
        }
    }

    impl Converter for Mock {
        fn start(&mut self) {
            self.running = true;
            self.starts += 1;
        }

        fn stop(&mut self) {
            self.running = false;
            self.stops += 1;
        }

        fn read_burst(&mut self, burst: &mut [u16; BURST_SAMPLES]) {
            let level = self
                .active
                .iter()
                .position(|&a| a)
                .map(|channel| self.levels[channel])
                .unwrap_or(0);
            *burst = [level; BURST_SAMPLES];
        }

        fn set_active(&mut self, channel: u8, enabled: bool) {
            self.active[usize::from(channel)] = enabled;
        }
    }

    type TestScanner = Scanner<Mock, CHANNELS, 8>;

    /// One converter burst: a poll to (re)start sampling, then the
    /// completion interrupt, then the poll that consumes the burst.
    fn run_bursts(scanner: &mut TestScanner, count: usize) {
        for _ in 0..count {
            scanner.poll();
            scanner.on_interrupt();
        }
        scanner.poll();
    }

    #[test]
    fn end_to_end_reading_matches_the_worked_example() {
        // 12-bit (2 extra bits), 16 averages: 256 samples of 100 sum to
        // 25600, divisor is 64, reading is 400.
        let mut scanner = TestScanner::new(Mock::flat(100));
        scanner.configure(3, Resolution::Bits12, 16, Hooks::NONE).unwrap();
        scanner.enqueue(3).unwrap();

        run_bursts(&mut scanner, 15);
        assert!(!scanner.has_reading(3));
        assert_eq!(scanner.value(3), 0);

        run_bursts(&mut scanner, 1);
        assert!(scanner.has_reading(3));
        assert_eq!(scanner.value(3), 400);

        // Stable between updates.
        assert_eq!(scanner.value(3), 400);
    }

    #[test]
    fn format_callback_shapes_the_stored_value() {
        fn double(raw: u16) -> u16 {
            raw * 2
        }
        let mut scanner = TestScanner::new(Mock::flat(100));
        let hooks = Hooks {
            format: Some(double),
            ..Hooks::NONE
        };
        scanner.configure(3, Resolution::Bits12, 16, hooks).unwrap();
        scanner.enqueue(3).unwrap();

        run_bursts(&mut scanner, 16);
        assert_eq!(scanner.value(3), 800);
    }

    #[test]
    fn finished_hook_fires_once_per_reading() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        static LAST_CHANNEL: AtomicUsize = AtomicUsize::new(usize::MAX);
        fn finished(channel: u8) {
            CALLS.fetch_add(1, Ordering::Relaxed);
            LAST_CHANNEL.store(usize::from(channel), Ordering::Relaxed);
        }

        let mut scanner = TestScanner::new(Mock::flat(10));
        let hooks = Hooks {
            finished: Some(finished),
            ..Hooks::NONE
        };
        // 64 samples per reading: 4 bursts.
        scanner.configure(5, Resolution::Bits11, 16, hooks).unwrap();
        scanner.enqueue(5).unwrap();

        run_bursts(&mut scanner, 3);
        assert_eq!(CALLS.load(Ordering::Relaxed), 0);

        run_bursts(&mut scanner, 1);
        assert_eq!(CALLS.load(Ordering::Relaxed), 1);
        assert_eq!(LAST_CHANNEL.load(Ordering::Relaxed), 5);

        run_bursts(&mut scanner, 4);
        assert_eq!(CALLS.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn repeated_queue_entries_bias_update_rate() {
        static FINISHES: [AtomicUsize; 2] = [AtomicUsize::new(0), AtomicUsize::new(0)];
        fn count(channel: u8) {
            FINISHES[usize::from(channel) - 1].fetch_add(1, Ordering::Relaxed);
        }

        let mut scanner = TestScanner::new(Mock::flat(50));
        let hooks = Hooks {
            finished: Some(count),
            ..Hooks::NONE
        };
        scanner.configure(1, Resolution::Bits10, 16, hooks).unwrap();
        scanner.configure(2, Resolution::Bits10, 16, hooks).unwrap();
        scanner.enqueue(1).unwrap();
        scanner.enqueue(1).unwrap();
        scanner.enqueue(2).unwrap();

        // Two full rotations; every burst completes a 16-sample reading.
        run_bursts(&mut scanner, 6);
        assert_eq!(FINISHES[0].load(Ordering::Relaxed), 4);
        assert_eq!(FINISHES[1].load(Ordering::Relaxed), 2);
    }

    #[test]
    fn round_robin_reads_each_channels_own_level() {
        let mut scanner = TestScanner::new(Mock::flat(0));
        {
            let mock = &mut scanner.converter;
            mock.levels[1] = 64;
            mock.levels[2] = 32;
        }
        scanner.configure(1, Resolution::Bits10, 16, Hooks::NONE).unwrap();
        scanner.configure(2, Resolution::Bits10, 16, Hooks::NONE).unwrap();
        scanner.enqueue(1).unwrap();
        scanner.enqueue(2).unwrap();

        run_bursts(&mut scanner, 4);
        assert_eq!(scanner.value(1), 64);
        assert_eq!(scanner.value(2), 32);
        // After a full rotation only the cursor's channel stays active.
        assert_eq!(scanner.free().active_count(), 1);
    }

    #[test]
    fn pre_and_post_hooks_follow_the_scan_lifecycle() {
        static PRE: AtomicUsize = AtomicUsize::new(0);
        static POST: AtomicUsize = AtomicUsize::new(0);
        fn pre_scan(_channel: u8) {
            PRE.fetch_add(1, Ordering::Relaxed);
        }
        fn post_scan(_channel: u8) {
            POST.fetch_add(1, Ordering::Relaxed);
        }

        let mut scanner = TestScanner::new(Mock::flat(1));
        let hooks = Hooks {
            pre_scan: Some(pre_scan),
            post_scan: Some(post_scan),
            ..Hooks::NONE
        };
        scanner.configure(0, Resolution::Bits10, 16, hooks).unwrap();
        scanner.enqueue(0).unwrap();

        // Polling without a completion restarts sampling and re-fires the
        // pre-scan hook, but nothing else happens.
        scanner.poll();
        scanner.poll();
        scanner.poll();
        assert_eq!(PRE.load(Ordering::Relaxed), 3);
        assert_eq!(POST.load(Ordering::Relaxed), 0);
        assert!(scanner.is_sampling());

        scanner.on_interrupt();
        assert_eq!(POST.load(Ordering::Relaxed), 1);
        assert!(!scanner.is_sampling());
        assert_eq!(scanner.free().stops, 1);
    }

    #[test]
    fn empty_queue_stays_idle() {
        let mut scanner = TestScanner::new(Mock::flat(1));
        scanner.configure(0, Resolution::Bits10, 16, Hooks::NONE).unwrap();

        scanner.poll();
        scanner.poll();
        assert!(!scanner.is_sampling());
        assert_eq!(scanner.current_channel(), None);
        let mock = scanner.free();
        assert_eq!(mock.starts, 0);
        assert!(!mock.running);
    }

    #[test]
    fn invalid_configuration_leaves_prior_state_untouched() {
        let mut scanner = TestScanner::new(Mock::flat(100));
        scanner.configure(3, Resolution::Bits12, 16, Hooks::NONE).unwrap();
        scanner.enqueue(3).unwrap();
        run_bursts(&mut scanner, 16);
        assert_eq!(scanner.value(3), 400);

        // Out-of-range channel, then a bad sample-count derivation: both
        // rejected, prior configuration and value intact.
        assert_eq!(
            scanner.configure(CHANNELS as u8, Resolution::Bits10, 16, Hooks::NONE),
            Err(Error::InvalidChannel)
        );
        assert_eq!(
            scanner.configure(3, Resolution::Bits10, 8, Hooks::NONE),
            Err(Error::InvalidSampleCount)
        );
        assert_eq!(scanner.value(3), 400);

        run_bursts(&mut scanner, 16);
        assert_eq!(scanner.value(3), 400);
    }

    #[test]
    fn reconfiguring_discards_accumulation_in_flight() {
        let mut scanner = TestScanner::new(Mock::flat(100));
        scanner.configure(3, Resolution::Bits12, 16, Hooks::NONE).unwrap();
        scanner.enqueue(3).unwrap();

        // Half a reading's worth of bursts, then start over.
        run_bursts(&mut scanner, 8);
        scanner.configure(3, Resolution::Bits12, 16, Hooks::NONE).unwrap();
        assert!(!scanner.has_reading(3));

        run_bursts(&mut scanner, 15);
        assert!(!scanner.has_reading(3));
        run_bursts(&mut scanner, 1);
        assert_eq!(scanner.value(3), 400);
    }

    #[test]
    fn shared_settings_configure_multiple_channels() {
        let mut scanner = TestScanner::new(Mock::flat(100));
        let settings = Settings::new(Resolution::Bits12, 16, Hooks::NONE).unwrap();
        scanner.configure_with(1, settings).unwrap();
        scanner.configure_with(2, settings).unwrap();
        assert_eq!(
            scanner.configure_with(CHANNELS as u8, settings),
            Err(Error::InvalidChannel)
        );

        scanner.enqueue(1).unwrap();
        run_bursts(&mut scanner, 16);
        assert_eq!(scanner.value(1), 400);
        assert!(!scanner.has_reading(2));
    }

    #[test]
    fn enqueue_validates_channel_and_capacity() {
        let mut scanner: Scanner<Mock, CHANNELS, 2> = Scanner::new(Mock::flat(0));
        assert_eq!(scanner.enqueue(CHANNELS as u8), Err(Error::InvalidChannel));
        scanner.enqueue(0).unwrap();
        scanner.enqueue(1).unwrap();
        assert_eq!(scanner.enqueue(2), Err(Error::QueueFull));
        // The failed pushes changed nothing.
        assert_eq!(scanner.current_channel(), Some(0));
    }

    #[test]
    fn one_shot_read_blocks_until_the_first_reading() {
        struct Thermistor;
        impl Channel<TestScanner> for Thermistor {
            type ID = u8;
            fn channel() -> u8 {
                3
            }
        }

        let mut scanner = TestScanner::new(Mock::flat(100));
        scanner.configure(3, Resolution::Bits12, 16, Hooks::NONE).unwrap();
        scanner.enqueue(3).unwrap();

        let mut thermistor = Thermistor;
        let early: nb::Result<u16, Error> = scanner.read(&mut thermistor);
        assert_eq!(early, Err(nb::Error::WouldBlock));

        run_bursts(&mut scanner, 16);
        assert_eq!(scanner.read(&mut thermistor), Ok(400u16));
    }
}
