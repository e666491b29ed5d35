use std::time::Duration;

use ffmpeg_next::Rational;

/// One frame at the average frame rate. Zero when the rate is unknown.
pub fn video_frame_duration(avg_frame_rate: Rational) -> Duration {
    let (num, den) = (avg_frame_rate.numerator(), avg_frame_rate.denominator());
    if num <= 0 || den <= 0 {
        return Duration::ZERO;
    }
    ticks_to_duration(i64::from(den), num as u64)
}

fn ticks_to_duration(ticks: i64, per_second: u64) -> Duration {
    let nanos = u128::try_from(ticks).unwrap_or(0) * 1_000_000_000 / u128::from(per_second);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Packet durations of one audio track, from consecutive dts values.
///
/// The first packet has no predecessor and uses its own duration. A
/// non-positive delta keeps the previous one. Counter wraparound is not
/// detected.
#[derive(Debug, Default, Clone)]
pub struct AudioClock {
    last_dts: Option<i64>,
    last_delta: i64,
}

impl AudioClock {
    /// `clock_rate` is the number of dts units per second, `packet_ticks` the
    /// packet's duration in the same units (0 when unknown).
    pub fn duration(&mut self, dts: i64, packet_ticks: i64, clock_rate: u32) -> Duration {
        match self.last_dts {
            Some(last) if dts - last > 0 => self.last_delta = dts - last,
            Some(_) => {}
            None => self.last_delta = packet_ticks.max(0),
        }
        self.last_dts = Some(dts);

        if clock_rate == 0 {
            return Duration::ZERO;
        }
        ticks_to_duration(self.last_delta, u64::from(clock_rate))
    }
}

/// Units per second of a time base, e.g. 90000 for 1/90000.
pub fn clock_rate(time_base: Rational) -> u32 {
    let (num, den) = (time_base.numerator(), time_base.denominator());
    if num <= 0 || den <= 0 {
        return 0;
    }
    u32::try_from(den / num).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_frame_duration() {
        assert_eq!(
            video_frame_duration(Rational::new(25, 1)),
            Duration::from_millis(40)
        );
        assert_eq!(
            video_frame_duration(Rational::new(30000, 1001)),
            Duration::from_nanos(33_366_666)
        );
        assert_eq!(video_frame_duration(Rational::new(0, 1)), Duration::ZERO);
    }

    #[test]
    fn test_audio_clock_keeps_last_positive_delta() {
        let mut clock = AudioClock::default();
        assert_eq!(clock.duration(960, 960, 48000), Duration::from_millis(20));
        assert_eq!(clock.duration(1920, 960, 48000), Duration::from_millis(20));
        // out of order packet
        assert_eq!(clock.duration(1920, 960, 48000), Duration::from_millis(20));
        assert_eq!(clock.duration(1000, 960, 48000), Duration::from_millis(20));
        assert_eq!(clock.duration(1480, 960, 48000), Duration::from_millis(10));
        assert_eq!(clock.duration(2000, 960, 0), Duration::ZERO);
    }

    #[test]
    fn test_audio_clock_starts_mid_stream() {
        // a live stream joined an hour in
        let start = 3600 * 90000;
        let mut clock = AudioClock::default();
        assert_eq!(
            clock.duration(start, 1920, 90000),
            Duration::from_nanos(21_333_333)
        );
        assert_eq!(
            clock.duration(start + 1920, 1920, 90000),
            Duration::from_nanos(21_333_333)
        );

        let mut unknown = AudioClock::default();
        assert_eq!(unknown.duration(start, 0, 90000), Duration::ZERO);
        assert_eq!(
            unknown.duration(start + 1800, 0, 90000),
            Duration::from_millis(20)
        );
    }

    #[test]
    fn test_clocks_are_independent() {
        let mut first = AudioClock::default();
        let mut second = AudioClock::default();
        first.duration(48000, 960, 48000);
        assert_eq!(second.duration(960, 480, 48000), Duration::from_millis(10));
        assert_eq!(first.duration(48960, 960, 48000), Duration::from_millis(20));
    }

    #[test]
    fn test_clock_rate() {
        assert_eq!(clock_rate(Rational::new(1, 90000)), 90000);
        assert_eq!(clock_rate(Rational::new(1, 48000)), 48000);
        assert_eq!(clock_rate(Rational::new(0, 0)), 0);
    }
}
