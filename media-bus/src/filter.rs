use ffmpeg_next::{Rational, filter, frame};

use crate::{
    Drain,
    decoder::Decoder,
    encoder::{Encoder, channel_layout_or_default},
    frame::RawFrame,
};

/// A single chain `in -> <transform> -> out` converting decoded frames into
/// the format an encoder expects.
pub struct FilterGraph {
    graph: filter::Graph,
    video: bool,
    time_base: Rational,
}

fn find(name: &str) -> anyhow::Result<filter::Filter> {
    filter::find(name).ok_or(anyhow::anyhow!("filter not found: {}", name))
}

impl FilterGraph {
    /// Builds the graph for a decoder/encoder pair: `aresample` for audio,
    /// `format` for video.
    pub fn new(decoder: &Decoder, encoder: &Encoder) -> anyhow::Result<Self> {
        let time_base = decoder.time_base();
        let mut graph = filter::Graph::new();

        let video = if let Some(source) = decoder.as_audio() {
            let layout =
                channel_layout_or_default(source.channel_layout(), i64::from(source.channels()));
            let args = audio_buffer_args(time_base, source.rate(), source.format(), layout);
            graph.add(&find("abuffer")?, "in", &args)?;
            graph.add(&find("abuffersink")?, "out", "")?;

            let mut sink = graph
                .get("out")
                .ok_or(anyhow::anyhow!("missing filter sink"))?;
            if let Some(format) = encoder.sample_format() {
                sink.set_sample_format(format);
            }
            if let Some(layout) = encoder.channel_layout() {
                sink.set_channel_layout(layout);
            }
            sink.set_sample_rate(encoder.sample_rate());

            let chain = format!("aresample={}", encoder.sample_rate());
            graph.output("in", 0)?.input("out", 0)?.parse(&chain)?;
            false
        } else if let Some(source) = decoder.as_video() {
            let args = video_buffer_args(
                source.width(),
                source.height(),
                source.format(),
                time_base,
                source.aspect_ratio(),
            );
            graph.add(&find("buffer")?, "in", &args)?;
            graph.add(&find("buffersink")?, "out", "")?;

            let format = encoder
                .pixel_format()
                .ok_or(anyhow::anyhow!("encoder has no pixel format"))?;
            let mut sink = graph
                .get("out")
                .ok_or(anyhow::anyhow!("missing filter sink"))?;
            sink.set_pixel_format(format);

            let name = format
                .descriptor()
                .map(|d| d.name())
                .ok_or(anyhow::anyhow!("unknown pixel format {:?}", format))?;
            let chain = format!("format=pix_fmts={}", name);
            graph.output("in", 0)?.input("out", 0)?.parse(&chain)?;
            true
        } else {
            return Err(anyhow::anyhow!("unsupported stream type"));
        };

        graph.validate()?;

        let mut sink = graph
            .get("out")
            .ok_or(anyhow::anyhow!("missing filter sink"))?;
        if !video && encoder.frame_size() > 0 {
            sink.sink().set_frame_size(encoder.frame_size());
        }
        let time_base =
            unsafe { Rational::from(ffmpeg_next::ffi::av_buffersink_get_time_base(sink.as_ptr())) };

        Ok(Self {
            graph,
            video,
            time_base,
        })
    }

    /// Time base of the frames handed out by `pull`.
    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn push(&mut self, frame: &RawFrame) -> anyhow::Result<()> {
        let mut source = self
            .graph
            .get("in")
            .ok_or(anyhow::anyhow!("missing filter source"))?;
        source.source().add(frame.as_frame())?;
        Ok(())
    }

    /// Marks the end of input; `pull` then drains the graph.
    pub fn flush(&mut self) -> anyhow::Result<()> {
        let mut source = self
            .graph
            .get("in")
            .ok_or(anyhow::anyhow!("missing filter source"))?;
        source.source().flush()?;
        Ok(())
    }

    pub fn pull(&mut self) -> anyhow::Result<Drain<RawFrame>> {
        let mut out_ctx = self
            .graph
            .get("out")
            .ok_or(anyhow::anyhow!("missing filter sink"))?;
        let mut sink = out_ctx.sink();
        let result = if self.video {
            let mut frame = frame::Video::empty();
            sink.frame(&mut frame).map(|()| RawFrame::Video(frame))
        } else {
            let mut frame = frame::Audio::empty();
            sink.frame(&mut frame).map(|()| RawFrame::Audio(frame))
        };
        Drain::from_result(result)
    }
}

fn audio_buffer_args(
    time_base: Rational,
    rate: u32,
    format: ffmpeg_next::format::Sample,
    layout: ffmpeg_next::ChannelLayout,
) -> String {
    format!(
        "time_base={}:sample_rate={}:sample_fmt={}:channel_layout={:#x}",
        time_base,
        rate,
        format.name(),
        layout.bits()
    )
}

fn video_buffer_args(
    width: u32,
    height: u32,
    format: ffmpeg_next::format::Pixel,
    time_base: Rational,
    aspect_ratio: Rational,
) -> String {
    let aspect_ratio = if aspect_ratio.numerator() <= 0 || aspect_ratio.denominator() <= 0 {
        Rational::new(1, 1)
    } else {
        aspect_ratio
    };
    format!(
        "video_size={}x{}:pix_fmt={}:time_base={}:pixel_aspect={}",
        width,
        height,
        ffmpeg_next::ffi::AVPixelFormat::from(format) as i32,
        time_base,
        aspect_ratio
    )
}
