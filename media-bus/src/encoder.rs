use ffmpeg_next::{
    ChannelLayout, Rational,
    codec::{Id, packet::Packet},
    format::{Pixel, Sample},
    picture,
};

use crate::{Drain, decoder::Decoder, frame::RawFrame, packet::RawPacket};

/// Encoder context settings that may be overridden before the encoder opens.
pub trait EncoderParams {
    fn set_sample_rate(&mut self, rate: u32);
    fn set_sample_format(&mut self, format: Sample);
    fn set_pixel_format(&mut self, format: Pixel);
    fn set_time_base(&mut self, time_base: Rational);
    fn set_bit_rate(&mut self, bit_rate: usize);
    fn set_gop(&mut self, gop: u32);
}

enum PendingType {
    Video(ffmpeg_next::codec::encoder::video::Video),
    Audio(ffmpeg_next::codec::encoder::audio::Audio),
}

/// An encoder context that has not been opened yet.
pub struct EncoderBuilder {
    codec: ffmpeg_next::Codec,
    inner: PendingType,
}

/// The decoder's value when the encoder supports it, otherwise the encoder's first supported value.
fn supported_or_first<T: PartialEq + Copy>(
    supported: Option<impl Iterator<Item = T>>,
    preferred: T,
) -> T {
    let Some(supported) = supported else {
        return preferred;
    };
    let supported: Vec<T> = supported.collect();
    match supported.first() {
        Some(&first) if !supported.contains(&preferred) => first,
        _ => preferred,
    }
}

/// `layout`, or FFmpeg's default layout for `channels` when the stream left it unset.
pub fn channel_layout_or_default(layout: ChannelLayout, channels: i64) -> ChannelLayout {
    if !layout.is_empty() {
        return layout;
    }
    match channels {
        1 => ChannelLayout::MONO,
        3 => ChannelLayout::_2POINT1,
        4 => ChannelLayout::_4POINT0,
        5 => ChannelLayout::_5POINT0_BACK,
        6 => ChannelLayout::_5POINT1_BACK,
        7 => ChannelLayout::_6POINT1,
        8 => ChannelLayout::_7POINT1,
        _ => ChannelLayout::STEREO,
    }
}

/// Prefers the external library encoder where FFmpeg has one for `codec_id`.
fn find_encoder(codec_id: Id) -> Option<ffmpeg_next::Codec> {
    let preferred = match codec_id {
        Id::OPUS => Some("libopus"),
        Id::H264 => Some("libx264"),
        _ => None,
    };
    preferred
        .and_then(ffmpeg_next::encoder::find_by_name)
        .or_else(|| ffmpeg_next::encoder::find(codec_id))
}

impl EncoderBuilder {
    /// Prepares an encoder for `codec_id` with parameters copied from `decoder`.
    pub fn new(codec_id: Id, decoder: &Decoder) -> anyhow::Result<Self> {
        let codec =
            find_encoder(codec_id).ok_or(anyhow::anyhow!("encoder not found: {:?}", codec_id))?;
        let mut context = ffmpeg_next::codec::Context::new_with_codec(codec);
        // FFmpeg's native Opus encoder is still flagged experimental
        unsafe {
            (*context.as_mut_ptr()).strict_std_compliance =
                ffmpeg_next::ffi::FF_COMPLIANCE_EXPERIMENTAL;
        }

        let inner = if let Some(source) = decoder.as_audio() {
            let supported = codec.audio()?;
            let mut encoder = context.encoder().audio()?;
            encoder.set_rate(supported_or_first(supported.rates(), source.rate() as i32));
            encoder.set_format(supported_or_first(supported.formats(), source.format()));
            encoder.set_channel_layout(channel_layout_or_default(
                source.channel_layout(),
                i64::from(source.channels()),
            ));
            encoder.set_time_base(decoder.time_base());
            PendingType::Audio(encoder)
        } else if let Some(source) = decoder.as_video() {
            let supported = codec.video()?;
            let mut encoder = context.encoder().video()?;
            encoder.set_width(source.width());
            encoder.set_height(source.height());
            encoder.set_aspect_ratio(source.aspect_ratio());
            encoder.set_format(supported_or_first(supported.formats(), source.format()));
            encoder.set_frame_rate(Some(decoder.stream().rate()));
            encoder.set_time_base(decoder.time_base());
            PendingType::Video(encoder)
        } else {
            return Err(anyhow::anyhow!("unsupported stream type"));
        };

        Ok(Self { codec, inner })
    }

    pub fn open(self) -> anyhow::Result<Encoder> {
        let inner = match self.inner {
            PendingType::Audio(encoder) => EncoderType::Audio(encoder.open_as(self.codec)?),
            PendingType::Video(encoder) => EncoderType::Video(encoder.open_as(self.codec)?),
        };
        let (time_base, frame_size): (Rational, u32) = match &inner {
            EncoderType::Audio(encoder) => unsafe {
                ((*encoder.as_ptr()).time_base.into(), encoder.frame_size())
            },
            EncoderType::Video(encoder) => unsafe { ((*encoder.as_ptr()).time_base.into(), 0) },
        };
        log::info!(
            "encoder opened: {} time_base={} frame_size={}",
            self.codec.name(),
            time_base,
            frame_size
        );

        Ok(Encoder {
            inner,
            encoder_time_base: time_base,
            frame_size,
        })
    }
}

impl EncoderParams for EncoderBuilder {
    fn set_sample_rate(&mut self, rate: u32) {
        if let PendingType::Audio(encoder) = &mut self.inner {
            encoder.set_rate(rate as i32);
        }
    }

    fn set_sample_format(&mut self, format: Sample) {
        if let PendingType::Audio(encoder) = &mut self.inner {
            encoder.set_format(format);
        }
    }

    fn set_pixel_format(&mut self, format: Pixel) {
        if let PendingType::Video(encoder) = &mut self.inner {
            encoder.set_format(format);
        }
    }

    fn set_time_base(&mut self, time_base: Rational) {
        match &mut self.inner {
            PendingType::Audio(encoder) => encoder.set_time_base(time_base),
            PendingType::Video(encoder) => encoder.set_time_base(time_base),
        }
    }

    fn set_bit_rate(&mut self, bit_rate: usize) {
        match &mut self.inner {
            PendingType::Audio(encoder) => encoder.set_bit_rate(bit_rate),
            PendingType::Video(encoder) => encoder.set_bit_rate(bit_rate),
        }
    }

    fn set_gop(&mut self, gop: u32) {
        if let PendingType::Video(encoder) = &mut self.inner {
            encoder.set_gop(gop);
        }
    }
}

enum EncoderType {
    Video(ffmpeg_next::codec::encoder::Video),
    Audio(ffmpeg_next::codec::encoder::Audio),
}

pub struct Encoder {
    inner: EncoderType,
    encoder_time_base: Rational,
    frame_size: u32,
}

impl Encoder {
    pub fn time_base(&self) -> Rational {
        self.encoder_time_base
    }

    /// Samples per frame expected by an audio encoder, 0 when variable.
    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn sample_rate(&self) -> u32 {
        match &self.inner {
            EncoderType::Audio(encoder) => encoder.rate(),
            EncoderType::Video(_) => 0,
        }
    }

    pub fn sample_format(&self) -> Option<Sample> {
        match &self.inner {
            EncoderType::Audio(encoder) => Some(encoder.format()),
            EncoderType::Video(_) => None,
        }
    }

    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        match &self.inner {
            EncoderType::Audio(encoder) => Some(encoder.channel_layout()),
            EncoderType::Video(_) => None,
        }
    }

    pub fn pixel_format(&self) -> Option<Pixel> {
        match &self.inner {
            EncoderType::Video(encoder) => Some(encoder.format()),
            EncoderType::Audio(_) => None,
        }
    }

    /// Audio frames are forced to the encoder frame size, since resampling
    /// changes the number of samples a filter graph hands out.
    pub fn send_frame(&mut self, frame: &mut RawFrame) -> anyhow::Result<()> {
        match (&mut self.inner, frame) {
            (EncoderType::Video(encoder), RawFrame::Video(frame)) => {
                frame.set_kind(picture::Type::None);
                encoder.send_frame(frame)?;
            }
            (EncoderType::Audio(encoder), RawFrame::Audio(frame)) => {
                // never past the samples the frame holds
                if self.frame_size > 0 && frame.samples() > self.frame_size as usize {
                    unsafe {
                        (*frame.as_mut_ptr()).nb_samples = self.frame_size as i32;
                    }
                }
                encoder.send_frame(frame)?;
            }
            _ => anyhow::bail!("invalid frame type"),
        };
        Ok(())
    }

    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        match &mut self.inner {
            EncoderType::Video(encoder) => encoder.send_eof()?,
            EncoderType::Audio(encoder) => encoder.send_eof()?,
        }
        Ok(())
    }

    /// Pulls one encoded packet, stamped with `time_base`.
    pub fn receive_packet(&mut self, time_base: Rational) -> anyhow::Result<Drain<RawPacket>> {
        let mut packet = Packet::empty();
        let result = match &mut self.inner {
            EncoderType::Video(encoder) => encoder.receive_packet(&mut packet),
            EncoderType::Audio(encoder) => encoder.receive_packet(&mut packet),
        };
        Drain::from_result(result.map(|()| RawPacket::from((packet, time_base))))
    }
}
