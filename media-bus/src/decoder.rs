use ffmpeg_next::Rational;

use crate::{Drain, frame::RawFrame, packet::RawPacket, stream::AvStream};

enum DecoderType {
    Video(ffmpeg_next::codec::decoder::Video),
    Audio(ffmpeg_next::codec::decoder::Audio),
}

pub struct Decoder {
    stream: AvStream,
    inner: DecoderType,
    decoder_time_base: Rational,
}

impl Decoder {
    /// Opens a decoder for an audio or video stream, using the stream's time base.
    pub fn new(stream: &AvStream) -> anyhow::Result<Self> {
        let mut decoder_ctx = ffmpeg_next::codec::Context::new();
        unsafe {
            (*decoder_ctx.as_mut_ptr()).time_base = stream.time_base().into();
        }
        decoder_ctx.set_parameters(stream.parameters().clone())?;

        let (inner, decoder_time_base) = if stream.is_video() {
            let video_decoder = decoder_ctx.decoder().video()?;
            if video_decoder.format() == ffmpeg_next::format::Pixel::None
                || video_decoder.width() == 0
                || video_decoder.height() == 0
            {
                return Err(anyhow::anyhow!("missing codec parameters"));
            }
            let time_base = video_decoder.time_base();
            (DecoderType::Video(video_decoder), time_base)
        } else if stream.is_audio() {
            let audio_decoder = decoder_ctx.decoder().audio()?;
            let time_base = audio_decoder.time_base();
            (DecoderType::Audio(audio_decoder), time_base)
        } else {
            return Err(anyhow::anyhow!("unsupported stream type"));
        };

        Ok(Self {
            stream: stream.clone(),
            inner,
            decoder_time_base,
        })
    }

    pub fn stream(&self) -> &AvStream {
        &self.stream
    }

    pub fn time_base(&self) -> Rational {
        self.decoder_time_base
    }

    pub fn as_video(&self) -> Option<&ffmpeg_next::codec::decoder::Video> {
        match &self.inner {
            DecoderType::Video(decoder) => Some(decoder),
            DecoderType::Audio(_) => None,
        }
    }

    pub fn as_audio(&self) -> Option<&ffmpeg_next::codec::decoder::Audio> {
        match &self.inner {
            DecoderType::Audio(decoder) => Some(decoder),
            DecoderType::Video(_) => None,
        }
    }

    /// Sends a packet whose timestamps are already in the decoder time base.
    pub fn send_packet(&mut self, packet: &RawPacket) -> anyhow::Result<()> {
        match &mut self.inner {
            DecoderType::Video(decoder) => decoder.send_packet(packet.packet())?,
            DecoderType::Audio(decoder) => decoder.send_packet(packet.packet())?,
        }
        Ok(())
    }

    /// Enters draining: `receive_frame` hands out what is buffered, then `EndOfStream`.
    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        match &mut self.inner {
            DecoderType::Video(decoder) => decoder.send_eof()?,
            DecoderType::Audio(decoder) => decoder.send_eof()?,
        }
        Ok(())
    }

    pub fn receive_frame(&mut self) -> anyhow::Result<Drain<RawFrame>> {
        let result = match &mut self.inner {
            DecoderType::Video(decoder) => {
                let mut frame = ffmpeg_next::frame::Video::empty();
                decoder
                    .receive_frame(&mut frame)
                    .map(|()| RawFrame::Video(frame))
            }
            DecoderType::Audio(decoder) => {
                let mut frame = ffmpeg_next::frame::Audio::empty();
                decoder
                    .receive_frame(&mut frame)
                    .map(|()| RawFrame::Audio(frame))
            }
        };
        Drain::from_result(result)
    }
}
