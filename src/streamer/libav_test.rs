use std::f32::consts::PI;
use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ffmpeg_next::{
    ChannelLayout, Dictionary, Packet, Rational, codec, encoder, format, frame,
    format::sample::Type,
};

use super::*;
use crate::recipe::{EncoderOption, MediaTask, OPUS_SAMPLE_RATE, Recipe};
use crate::sink::MediaSink;
use crate::types::{
    Codec, InputDescriptor, MediaFrameContext, MediaType, Message, Stream, StreamInfo,
};

type Payload = (Vec<u8>, MediaFrameContext);

#[derive(Default)]
struct RecordingSink {
    streams: Mutex<Vec<Stream>>,
    video: Mutex<Vec<Payload>>,
    audio: Mutex<Vec<Payload>>,
    metadata: Mutex<Vec<Message>>,
    errors: Mutex<Vec<String>>,
    closed: Mutex<u32>,
}

impl MediaSink for RecordingSink {
    fn on_stream(&self, stream: &Stream) -> anyhow::Result<()> {
        self.streams.lock().unwrap().push(*stream);
        Ok(())
    }

    fn on_video_frame(&self, data: &[u8], ctx: MediaFrameContext) -> anyhow::Result<()> {
        self.video.lock().unwrap().push((data.to_vec(), ctx));
        Ok(())
    }

    fn on_audio_frame(&self, data: &[u8], ctx: MediaFrameContext) -> anyhow::Result<()> {
        self.audio.lock().unwrap().push((data.to_vec(), ctx));
        Ok(())
    }

    fn on_metadata(&self, message: &Message) -> anyhow::Result<()> {
        self.metadata.lock().unwrap().push(message.clone());
        Ok(())
    }

    fn on_error(&self, error: &Error) {
        self.errors.lock().unwrap().push(error.to_string());
    }

    fn on_close(&self) {
        *self.closed.lock().unwrap() += 1;
    }
}

fn recipe(input: InputDescriptor) -> Recipe {
    Recipe {
        input,
        video: MediaTask::bypass(Codec::H264),
        audio: MediaTask::transcode(
            Codec::Opus,
            vec![
                EncoderOption::SampleRate(OPUS_SAMPLE_RATE),
                EncoderOption::TimeBase(Rational::new(1, OPUS_SAMPLE_RATE as i32)),
            ],
        ),
    }
}

fn fixture_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("live-gateway-{}-{}.ts", name, std::process::id()))
}

fn write_packets(
    encoder: &mut encoder::Encoder,
    output: &mut format::context::Output,
    index: usize,
    time_base: Rational,
) -> anyhow::Result<()> {
    let stream_time_base = output
        .stream(index)
        .map(|s| s.time_base())
        .ok_or_else(|| anyhow::anyhow!("no output stream {}", index))?;
    let mut packet = Packet::empty();
    while encoder.receive_packet(&mut packet).is_ok() {
        packet.set_stream(index);
        packet.rescale_ts(time_base, stream_time_base);
        packet.write_interleaved(output)?;
    }
    Ok(())
}

/// Writes `seconds` of 320x240 25 fps H.264 and 44.1 kHz stereo AAC as
/// MPEG-TS. Returns false when this FFmpeg build has no H.264 encoder.
fn write_fixture(path: &Path, seconds: i64) -> anyhow::Result<bool> {
    let Some(h264) = encoder::find_by_name("libx264").or_else(|| encoder::find(codec::Id::H264))
    else {
        return Ok(false);
    };
    let aac = encoder::find(codec::Id::AAC).ok_or_else(|| anyhow::anyhow!("no aac encoder"))?;
    let video_time_base = Rational::new(1, 25);
    let audio_time_base = Rational::new(1, 44100);
    let layout = ChannelLayout::STEREO;
    let sample_format = format::Sample::F32(Type::Planar);

    let mut output = format::output_as(&path, "mpegts")?;

    let mut video = codec::Context::new_with_codec(h264).encoder().video()?;
    video.set_width(320);
    video.set_height(240);
    video.set_format(format::Pixel::YUV420P);
    video.set_time_base(video_time_base);
    video.set_frame_rate(Some(Rational::new(25, 1)));
    video.set_gop(25);
    let mut options = Dictionary::new();
    options.set("preset", "ultrafast");
    options.set("tune", "zerolatency");
    let mut video = video.open_with(options)?;
    let video_index = {
        let mut stream = output.add_stream(h264)?;
        stream.set_parameters(&video);
        stream.set_time_base(video_time_base);
        stream.index()
    };

    let mut audio = codec::Context::new_with_codec(aac).encoder().audio()?;
    audio.set_rate(44100);
    audio.set_format(sample_format);
    audio.set_channel_layout(layout);
    audio.set_time_base(audio_time_base);
    audio.set_bit_rate(64000);
    let mut audio = audio.open()?;
    let audio_index = {
        let mut stream = output.add_stream(aac)?;
        stream.set_parameters(&audio);
        stream.set_time_base(audio_time_base);
        stream.index()
    };

    output.write_header()?;

    let frame_size = audio.frame_size() as usize;
    let mut samples_written = 0i64;
    for n in 0..seconds * 25 {
        let mut picture = frame::Video::new(format::Pixel::YUV420P, 320, 240);
        picture.data_mut(0).fill((n * 8 % 256) as u8);
        picture.data_mut(1).fill(128);
        picture.data_mut(2).fill(128);
        picture.set_pts(Some(n));
        video.send_frame(&picture)?;
        write_packets(&mut video, &mut output, video_index, video_time_base)?;

        // audio up to the end of this picture
        while samples_written < (n + 1) * 44100 / 25 {
            let mut tone = frame::Audio::new(sample_format, frame_size, layout);
            tone.set_rate(44100);
            for plane in 0..2 {
                let data = tone.data_mut(plane);
                for (i, sample) in data.chunks_exact_mut(4).take(frame_size).enumerate() {
                    let t = (samples_written + i as i64) as f32 / 44100.0;
                    let value = 0.2 * (2.0 * PI * 440.0 * t).sin();
                    sample.copy_from_slice(&value.to_ne_bytes());
                }
            }
            tone.set_pts(Some(samples_written));
            audio.send_frame(&tone)?;
            write_packets(&mut audio, &mut output, audio_index, audio_time_base)?;
            samples_written += frame_size as i64;
        }
    }

    video.send_eof()?;
    write_packets(&mut video, &mut output, video_index, video_time_base)?;
    audio.send_eof()?;
    write_packets(&mut audio, &mut output, audio_index, audio_time_base)?;
    output.write_trailer()?;
    Ok(true)
}

/// Frame duration coded in an Opus TOC byte.
fn opus_frame_duration(toc: u8) -> Duration {
    let config = toc >> 3;
    let micros = match config {
        0..=11 => [10_000, 20_000, 40_000, 60_000][usize::from(config % 4)],
        12..=15 => [10_000, 20_000][usize::from(config % 2)],
        _ => [2_500, 5_000, 10_000, 20_000][usize::from(config % 4)],
    };
    Duration::from_micros(micros)
}

#[test]
fn test_matches() {
    let streamer = LibavStreamer;
    assert!(streamer.matches(&RequestParams::srt("localhost", 40052, "key")));
    assert!(streamer.matches(&RequestParams::url("rtmp://localhost/live", "key")));
    assert!(!streamer.matches(&RequestParams::url("http://localhost/a.ts", "key")));
}

#[test]
fn test_opus_frame_duration() {
    // CELT fullband 20 ms, SILK wideband 60 ms, hybrid fullband 10 ms
    assert_eq!(opus_frame_duration(0xf8), Duration::from_millis(20));
    assert_eq!(opus_frame_duration(0x58), Duration::from_millis(60));
    assert_eq!(opus_frame_duration(0x70), Duration::from_millis(10));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let sink = Arc::new(RecordingSink::default());
    let session = Session::new(
        recipe(InputDescriptor::default()),
        StreamInfo::default(),
        sink.clone(),
    );
    session.cancel();

    LibavStreamer.stream(session).await;

    assert_eq!(*sink.closed.lock().unwrap(), 1);
    assert!(sink.errors.lock().unwrap().is_empty());
    assert!(sink.video.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unopenable_input_reports_error_then_close() -> anyhow::Result<()> {
    media_bus::init()?;
    let sink = Arc::new(RecordingSink::default());
    let input = InputDescriptor {
        url: "/nonexistent/live-gateway.ts".to_string(),
        format: Some("mpegts".to_string()),
        ..Default::default()
    };
    let session = Session::new(recipe(input), StreamInfo::default(), sink.clone());

    LibavStreamer.stream(session).await;

    let errors = sink.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("input format unavailable"));
    assert_eq!(*sink.closed.lock().unwrap(), 1);
    Ok(())
}

#[tokio::test]
async fn test_stream_h264_aac_to_opus() -> anyhow::Result<()> {
    media_bus::init()?;
    let path = fixture_path("stream");
    if !write_fixture(&path, 2)? {
        println!("no H.264 encoder in this FFmpeg build, skip");
        return Ok(());
    }

    let sink = Arc::new(RecordingSink::default());
    let input = InputDescriptor {
        url: path.display().to_string(),
        format: Some("mpegts".to_string()),
        ..Default::default()
    };
    let server = StreamInfo::new(vec![
        Stream {
            codec: Codec::H264,
            media_type: MediaType::Video,
            id: 256,
            index: 0,
        },
        Stream {
            codec: Codec::Aac,
            media_type: MediaType::Audio,
            id: 257,
            index: 1,
        },
    ]);
    let session = Session::new(recipe(input), server, sink.clone());

    LibavStreamer.stream(session).await;
    std::fs::remove_file(&path)?;

    let errors = sink.errors.lock().unwrap();
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    assert_eq!(*sink.closed.lock().unwrap(), 1);

    let codecs: Vec<_> = sink.streams.lock().unwrap().iter().map(|s| s.codec).collect();
    assert!(codecs.contains(&Codec::H264));
    assert!(codecs.contains(&Codec::Aac));
    assert!(sink.metadata.lock().unwrap().len() >= codecs.len());

    let video = sink.video.lock().unwrap();
    assert!(video.len() >= 25, "only {} video frames", video.len());
    for (data, ctx) in video.iter() {
        assert!(
            data.starts_with(&[0, 0, 1]) || data.starts_with(&[0, 0, 0, 1]),
            "video payload is not Annex-B: {:02x?}",
            &data[..data.len().min(8)]
        );
        assert!(ctx.duration > Duration::ZERO);
    }
    assert!(video.windows(2).all(|w| w[0].1.dts <= w[1].1.dts));

    // 20 ms Opus frames at 48 kHz; the codecs' buffered tail is flushed at
    // the end of input, so all 2 s of the recording come out
    let audio = sink.audio.lock().unwrap();
    let total: Duration = audio.iter().map(|(_, ctx)| ctx.duration).sum();
    assert!(total >= Duration::from_secs(2), "only {:?} of audio", total);
    for (data, ctx) in audio.iter() {
        assert!(!data.is_empty());
        assert_eq!(opus_frame_duration(data[0]), Duration::from_millis(20));
        assert_eq!(ctx.duration, Duration::from_millis(20));
    }
    assert!(audio.windows(2).all(|w| w[1].1.dts - w[0].1.dts == 960));
    Ok(())
}

#[tokio::test]
async fn test_cancel_while_read_blocked() -> anyhow::Result<()> {
    media_bus::init()?;
    let path = fixture_path("stalled");
    if !write_fixture(&path, 2)? {
        println!("no H.264 encoder in this FFmpeg build, skip");
        return Ok(());
    }
    let bytes = std::fs::read(&path)?;
    std::fs::remove_file(&path)?;

    // sends the whole recording, then keeps the connection open and silent
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let (release, stalled) = std::sync::mpsc::channel::<()>();
    let feeder = std::thread::spawn(move || -> std::io::Result<()> {
        let (mut socket, _) = listener.accept()?;
        socket.write_all(&bytes)?;
        let _ = stalled.recv_timeout(Duration::from_secs(30));
        Ok(())
    });

    let sink = Arc::new(RecordingSink::default());
    let mut input = InputDescriptor {
        url: format!("tcp://{}", addr),
        format: Some("mpegts".to_string()),
        ..Default::default()
    };
    input.options.insert("analyzeduration".to_string(), "500000".to_string());
    input.options.insert("probesize".to_string(), "32768".to_string());
    // far longer than the test may take
    input.options.insert("rw_timeout".to_string(), "30000000".to_string());
    let session = Session::new(recipe(input), StreamInfo::default(), sink.clone());
    let cancel = session.cancel_token();
    let streaming = tokio::spawn(async move { LibavStreamer.stream(session).await });

    let started = Instant::now();
    while sink.video.lock().unwrap().is_empty() {
        assert!(started.elapsed() < Duration::from_secs(10), "no media received");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // the reader drains the socket and then blocks
    tokio::time::sleep(Duration::from_millis(500)).await;
    let cancelled_at = Instant::now();
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(3), streaming).await??;
    assert!(cancelled_at.elapsed() < Duration::from_secs(3));

    let errors = sink.errors.lock().unwrap();
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    assert_eq!(*sink.closed.lock().unwrap(), 1);

    drop(release);
    feeder.join().unwrap()?;
    Ok(())
}
