use ffmpeg_next::{Rational, codec::packet::Packet};

/// A demuxed or encoded packet together with the time base of its timestamps.
pub struct RawPacket {
    packet: Packet,
    time_base: Rational,
}

impl RawPacket {
    pub fn pts(&self) -> Option<i64> {
        self.packet.pts()
    }

    pub fn dts(&self) -> Option<i64> {
        self.packet.dts()
    }

    /// Duration in `time_base` units, 0 when unknown.
    pub fn duration(&self) -> i64 {
        self.packet.duration()
    }

    pub fn index(&self) -> usize {
        self.packet.stream()
    }

    pub fn data(&self) -> &[u8] {
        self.packet.data().unwrap_or_default()
    }

    pub fn is_key(&self) -> bool {
        self.packet.is_key()
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Rescales pts, dts and duration into `time_base`.
    pub fn rescale_ts(&mut self, time_base: Rational) {
        self.packet.rescale_ts(self.time_base, time_base);
        self.time_base = time_base;
    }

    /// Get a reference to the inner packet.
    pub fn packet(&self) -> &Packet {
        &self.packet
    }
}

impl From<(Packet, Rational)> for RawPacket {
    fn from((packet, time_base): (Packet, Rational)) -> Self {
        Self { packet, time_base }
    }
}
