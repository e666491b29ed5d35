use ffmpeg_next::{Rational, codec::Parameters, format::stream, media};

unsafe impl Send for AvStream {}
unsafe impl Sync for AvStream {}

/// Container stream description detached from the format context.
pub struct AvStream {
    index: usize,
    id: i32,
    parameters: Parameters,
    time_base: Rational,
    rate: Rational,
}

impl AvStream {
    pub fn index(&self) -> usize {
        self.index
    }

    /// Format specific identifier, the PID for MPEG-TS.
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    /// Average frame rate.
    pub fn rate(&self) -> Rational {
        self.rate
    }

    pub fn medium(&self) -> media::Type {
        self.parameters.medium()
    }

    pub fn codec_id(&self) -> ffmpeg_next::codec::Id {
        self.parameters.id()
    }

    pub fn is_video(&self) -> bool {
        self.medium() == media::Type::Video
    }

    pub fn is_audio(&self) -> bool {
        self.medium() == media::Type::Audio
    }
}

impl From<stream::Stream<'_>> for AvStream {
    fn from(stream: stream::Stream<'_>) -> Self {
        Self {
            index: stream.index(),
            id: stream.id(),
            parameters: stream.parameters(),
            time_base: stream.time_base(),
            rate: stream.avg_frame_rate(),
        }
    }
}

impl Clone for AvStream {
    fn clone(&self) -> Self {
        Self {
            index: self.index,
            id: self.id,
            parameters: self.parameters.clone(),
            time_base: self.time_base,
            rate: self.rate,
        }
    }
}
