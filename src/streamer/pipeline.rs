//! The blocking read -> (bypass | decode -> filter -> encode) loop of one session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use media_bus::{
    Drain,
    bsf::AnnexBFilter,
    captions::{CaptionExtractor, build_cue},
    decoder::Decoder,
    encoder::{Encoder, EncoderBuilder},
    filter::FilterGraph,
    avio::Interrupter,
    h264,
    input::{AvInput, ReadStatus},
    packet::RawPacket,
};
use tokio_util::sync::CancellationToken;

use super::timing::{AudioClock, clock_rate, video_frame_duration};
use crate::error::{Error, Result};
use crate::recipe::{Recipe, apply_options, encoder_codec_id};
use crate::session::Session;
use crate::sink::MediaSink;
use crate::types::{Codec, MediaFrameContext, MediaType, Message, Stream, StreamInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Exit {
    Cancelled,
    EndOfStream,
}

fn sink_error(err: anyhow::Error) -> Error {
    Error::Sink(format!("{:#}", err))
}

// Fields drop top to bottom: filter, encoder, then decoder.
struct Track {
    filter: Option<FilterGraph>,
    encoder: Option<Encoder>,
    decoder: Decoder,
    annexb: Option<AnnexBFilter>,
    info: Stream,
    frame_duration: Duration,
    clock: AudioClock,
    finished: bool,
}

pub(crate) struct Pipeline {
    tracks: HashMap<usize, Track>,
    input: AvInput,
    captions: CaptionExtractor,
    sink: Arc<dyn MediaSink>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Opens input, decoders, encoders and filter graphs, in that order.
    /// Whatever was opened is released again if a later step fails.
    pub(crate) fn open(session: &Session, interrupter: Interrupter) -> Result<Self> {
        let recipe = session.recipe();
        let input = AvInput::open(
            &recipe.input.url,
            recipe.input.format.as_deref(),
            recipe.input.dictionary(),
            interrupter,
        )
        .map_err(|e| Error::FormatUnavailable(format!("{}: {:#}", recipe.input.url, e)))?;

        let mut pipeline = Self {
            tracks: HashMap::new(),
            input,
            captions: CaptionExtractor::new(),
            sink: session.sink(),
            cancel: session.cancel_token(),
        };
        pipeline.prepare_input(session.server_streams())?;
        pipeline.prepare_output(recipe)?;
        pipeline.prepare_filters()?;
        Ok(pipeline)
    }

    fn prepare_input(&mut self, server: &StreamInfo) -> Result<()> {
        for stream in self.input.streams() {
            if !stream.is_video() && !stream.is_audio() {
                continue;
            }
            let info = Stream::from(stream);
            if !server.is_empty() && !server.codecs().any(|codec| codec == info.codec) {
                log::warn!(
                    "stream id={} carries {}, which the ingest was not known to offer",
                    info.id,
                    info.codec
                );
            }
            let decoder = Decoder::new(stream).map_err(|e| {
                Error::DecoderUnavailable(format!(
                    "stream {} ({:?}): {:#}",
                    stream.index(),
                    stream.codec_id(),
                    e
                ))
            })?;
            let annexb = if info.codec == Codec::H264 {
                AnnexBFilter::for_parameters(stream.parameters())
            } else {
                None
            };

            self.sink.on_stream(&info).map_err(sink_error)?;
            self.sink
                .on_metadata(&Message::stream(&info))
                .map_err(sink_error)?;

            self.tracks.insert(
                stream.index(),
                Track {
                    filter: None,
                    encoder: None,
                    decoder,
                    annexb,
                    info,
                    frame_duration: video_frame_duration(stream.rate()),
                    clock: AudioClock::default(),
                    finished: false,
                },
            );
        }
        Ok(())
    }

    fn prepare_output(&mut self, recipe: &Recipe) -> Result<()> {
        for track in self.tracks.values_mut() {
            let Some(task) = recipe.task_for(track.info.media_type) else {
                continue;
            };
            if task.is_bypass() {
                log::info!(
                    "bypass {:?} stream id={} as {}",
                    track.info.media_type,
                    track.info.id,
                    task.codec()
                );
                continue;
            }

            let codec_id = encoder_codec_id(task)?;
            let mut builder = EncoderBuilder::new(codec_id, &track.decoder)
                .map_err(|e| Error::EncoderUnavailable(format!("{}: {:#}", task.codec(), e)))?;
            apply_options(task.encoder_options(), &mut builder);
            let encoder = builder
                .open()
                .map_err(|e| Error::EncoderUnavailable(format!("{}: {:#}", task.codec(), e)))?;
            log::info!(
                "transcode {:?} stream id={} from {} to {}",
                track.info.media_type,
                track.info.id,
                track.info.codec,
                task.codec()
            );
            track.encoder = Some(encoder);
        }
        Ok(())
    }

    fn prepare_filters(&mut self) -> Result<()> {
        for track in self.tracks.values_mut() {
            let Some(encoder) = &track.encoder else {
                continue;
            };
            let filter = FilterGraph::new(&track.decoder, encoder)
                .map_err(|e| Error::Filter(format!("stream id={}: {:#}", track.info.id, e)))?;
            track.filter = Some(filter);
        }
        Ok(())
    }

    /// Runs until cancellation, end of input or the first fatal error.
    pub(crate) fn run(&mut self) -> Result<Exit> {
        let Self {
            tracks,
            input,
            captions,
            sink,
            cancel,
        } = self;
        let sink: &dyn MediaSink = &**sink;

        loop {
            if cancel.is_cancelled() {
                return Ok(Exit::Cancelled);
            }

            let mut packet = match input.read_packet() {
                Ok(ReadStatus::Packet(packet)) => packet,
                Ok(ReadStatus::TryAgain) => continue,
                Ok(ReadStatus::EndOfStream) if cancel.is_cancelled() => return Ok(Exit::Cancelled),
                Ok(ReadStatus::EndOfStream) => {
                    for track in tracks.values_mut() {
                        flush(track, sink)?;
                    }
                    return Ok(Exit::EndOfStream);
                }
                Err(_) if cancel.is_cancelled() => return Ok(Exit::Cancelled),
                Err(e) => return Err(Error::Transport(format!("read packet: {}", e))),
            };

            let Some(track) = tracks.get_mut(&packet.index()) else {
                continue;
            };
            if track.finished {
                continue;
            }
            packet.rescale_ts(track.decoder.time_base());

            if track.encoder.is_none() {
                bypass(track, &packet, captions, sink)?;
            } else {
                transcode(track, &packet, sink)?;
            }
        }
    }
}

fn bypass(
    track: &mut Track,
    packet: &RawPacket,
    captions: &mut CaptionExtractor,
    sink: &dyn MediaSink,
) -> Result<()> {
    let dts = packet.dts().unwrap_or(0);
    let pts = packet.pts().unwrap_or(dts);

    match track.info.media_type {
        MediaType::Video => {
            let reframed;
            let data = match &track.annexb {
                Some(filter) => {
                    reframed = filter.filter(packet.data(), packet.is_key());
                    &reframed[..]
                }
                None => packet.data(),
            };
            if track.info.codec == Codec::H264 {
                extract_captions(data, pts, captions, sink)?;
            }
            let ctx = MediaFrameContext {
                pts,
                dts,
                duration: track.frame_duration,
            };
            sink.on_video_frame(data, ctx).map_err(sink_error)
        }
        MediaType::Audio => {
            let ctx = MediaFrameContext {
                pts,
                dts,
                duration: track.clock.duration(
                    dts,
                    packet.duration(),
                    clock_rate(packet.time_base()),
                ),
            };
            sink.on_audio_frame(packet.data(), ctx).map_err(sink_error)
        }
        MediaType::Unknown => Ok(()),
    }
}

/// Caption problems never stop the media: bad units are skipped and decoder
/// errors are only reported.
fn extract_captions(
    data: &[u8],
    pts: i64,
    captions: &mut CaptionExtractor,
    sink: &dyn MediaSink,
) -> Result<()> {
    let units = match h264::split_units(data) {
        Ok(units) => units,
        Err(e) => {
            log::debug!("skip captions: {}", Error::from(e));
            return Ok(());
        }
    };
    match captions.extract(&units) {
        Ok(Some(text)) => {
            let message = Message::cue(&build_cue(pts, text))?;
            sink.on_metadata(&message).map_err(sink_error)?;
        }
        Ok(None) => {}
        Err(e) => sink.on_error(&Error::from(e)),
    }
    Ok(())
}

fn transcode(track: &mut Track, packet: &RawPacket, sink: &dyn MediaSink) -> Result<()> {
    track
        .decoder
        .send_packet(packet)
        .map_err(|e| e.context("send packet to decoder"))?;
    drain_decoder(track, sink)
}

/// Drains decoder, filter graph and encoder of a transcoded track at the end
/// of input, so the frames they still buffer reach the sink.
fn flush(track: &mut Track, sink: &dyn MediaSink) -> Result<()> {
    if track.encoder.is_none() {
        return Ok(());
    }
    if !track.finished {
        track.decoder.send_eof()?;
        drain_decoder(track, sink)?;
    }
    if let Some(filter) = track.filter.as_mut() {
        filter.flush()?;
    }
    drain_filter(track, sink)?;
    if let Some(encoder) = track.encoder.as_mut() {
        encoder.send_eof()?;
    }
    drain_encoder(track, sink)
}

fn drain_decoder(track: &mut Track, sink: &dyn MediaSink) -> Result<()> {
    loop {
        match track.decoder.receive_frame()? {
            Drain::Ready(frame) => {
                if let Some(filter) = track.filter.as_mut() {
                    filter.push(&frame)?;
                }
                drain_filter(track, sink)?;
            }
            Drain::TryAgain => return Ok(()),
            Drain::EndOfStream => {
                log::info!("decoder of stream id={} reached end of stream", track.info.id);
                track.finished = true;
                return Ok(());
            }
        }
    }
}

fn drain_filter(track: &mut Track, sink: &dyn MediaSink) -> Result<()> {
    loop {
        let (Some(filter), Some(encoder)) = (track.filter.as_mut(), track.encoder.as_mut()) else {
            return Ok(());
        };
        let mut filtered = match filter.pull()? {
            Drain::Ready(frame) => frame,
            Drain::TryAgain | Drain::EndOfStream => return Ok(()),
        };
        filtered.rescale_pts(filter.time_base(), encoder.time_base());
        encoder.send_frame(&mut filtered)?;
        drain_encoder(track, sink)?;
    }
}

fn drain_encoder(track: &mut Track, sink: &dyn MediaSink) -> Result<()> {
    let Some(encoder) = track.encoder.as_mut() else {
        return Ok(());
    };
    loop {
        let mut encoded = match encoder.receive_packet(encoder.time_base())? {
            Drain::Ready(packet) => packet,
            Drain::TryAgain | Drain::EndOfStream => return Ok(()),
        };
        encoded.rescale_ts(encoder.time_base());

        let dts = encoded.dts().unwrap_or(0);
        let pts = encoded.pts().unwrap_or(dts);
        match track.info.media_type {
            MediaType::Video => {
                let ctx = MediaFrameContext {
                    pts,
                    dts,
                    duration: track.frame_duration,
                };
                sink.on_video_frame(encoded.data(), ctx).map_err(sink_error)?;
            }
            MediaType::Audio => {
                let ctx = MediaFrameContext {
                    pts,
                    dts,
                    duration: track.clock.duration(
                        dts,
                        encoded.duration(),
                        encoder.sample_rate(),
                    ),
                };
                sink.on_audio_frame(encoded.data(), ctx).map_err(sink_error)?;
            }
            MediaType::Unknown => {}
        }
    }
}
