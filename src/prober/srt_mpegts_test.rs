use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use media_bus::ts::{SYNC_BYTE, TS_PACKET_SIZE};

use super::*;
use crate::error::Error;
use crate::types::MediaType;

const PMT_PID: u16 = 0x1000;

fn ts_packet(pid: u16, unit_start: bool, payload: &[u8]) -> Vec<u8> {
    let flags = if unit_start { 0x40 } else { 0x00 };
    let mut packet = vec![SYNC_BYTE, flags | (pid >> 8) as u8, pid as u8, 0x10];
    packet.extend_from_slice(payload);
    packet.resize(TS_PACKET_SIZE, 0xff);
    packet
}

/// CRC-32/MPEG-2 of a PSI section.
fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in data {
        crc ^= u32::from(byte) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04c1_1db7
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn psi_packet(pid: u16, mut section: Vec<u8>) -> Vec<u8> {
    let crc = crc32(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    let mut payload = vec![0x00];
    payload.extend(section);
    ts_packet(pid, true, &payload)
}

fn pat() -> Vec<u8> {
    psi_packet(
        0,
        vec![
            0x00, 0xb0, 13, 0x00, 0x01, 0xc1, 0x00, 0x00, 0x00, 0x01,
            0xe0 | (PMT_PID >> 8) as u8, PMT_PID as u8,
        ],
    )
}

fn pmt(streams: &[(u8, u16)]) -> Vec<u8> {
    let length = 9 + 5 * streams.len() + 4;
    let mut section = vec![
        0x02, 0xb0 | (length >> 8) as u8, length as u8, 0x00, 0x01, 0xc1, 0x00, 0x00, 0xe1,
        0x00, 0xf0, 0x00,
    ];
    for &(stream_type, pid) in streams {
        section.extend_from_slice(&[stream_type, 0xe0 | (pid >> 8) as u8, pid as u8, 0xf0, 0x00]);
    }
    psi_packet(PMT_PID, section)
}

/// One SRT payload: 7 TS packets, PSI first then media.
fn payload(with_psi: bool) -> Vec<u8> {
    let mut data = Vec::new();
    if with_psi {
        data.extend(pat());
        data.extend(pmt(&[(0x1b, 256), (0x0f, 257)]));
    }
    while data.len() < 7 * TS_PACKET_SIZE {
        let pid = if data.len() / TS_PACKET_SIZE % 2 == 0 { 256 } else { 257 };
        data.extend(ts_packet(pid, false, &[0xaa; 8]));
    }
    data
}

/// Plays `reads` in order, then reports `tail` forever.
struct ScriptedConnection {
    reads: VecDeque<Result<Vec<u8>>>,
    repeat: Option<Vec<u8>>,
    count: Arc<AtomicUsize>,
}

impl ScriptedConnection {
    fn new(reads: Vec<Result<Vec<u8>>>) -> Self {
        Self {
            reads: reads.into(),
            repeat: None,
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn repeating(data: Vec<u8>) -> Self {
        Self {
            reads: VecDeque::new(),
            repeat: Some(data),
            count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl IngestConnection for ScriptedConnection {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let next = match self.reads.pop_front() {
            Some(read) => read?,
            None => match &self.repeat {
                Some(data) => data.clone(),
                None => return Ok(0),
            },
        };
        buf[..next.len()].copy_from_slice(&next);
        Ok(next.len())
    }
}

fn expected() -> StreamInfo {
    StreamInfo::new(vec![
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
    ])
}

#[tokio::test]
async fn test_probe_h264_aac() -> anyhow::Result<()> {
    let mut reads = vec![Ok(payload(true))];
    reads.extend((1..120).map(|_| Ok(payload(false))));
    let info = probe(
        Box::new(ScriptedConnection::new(reads)),
        CancellationToken::new(),
        120,
        1316,
    )
    .await?;
    assert_eq!(info, expected());
    Ok(())
}

#[tokio::test]
async fn test_probe_window_is_bounded() -> anyhow::Result<()> {
    let connection = ScriptedConnection::repeating(payload(true));
    let count = connection.count.clone();
    let info = probe(Box::new(connection), CancellationToken::new(), 120, 1316).await?;
    assert_eq!(info, expected());
    assert_eq!(count.load(Ordering::SeqCst), 120);
    Ok(())
}

#[tokio::test]
async fn test_probe_is_repeatable() -> anyhow::Result<()> {
    let first = probe(
        Box::new(ScriptedConnection::repeating(payload(true))),
        CancellationToken::new(),
        120,
        1316,
    )
    .await?;
    let second = probe(
        Box::new(ScriptedConnection::repeating(payload(true))),
        CancellationToken::new(),
        120,
        1316,
    )
    .await?;
    assert_eq!(first, second);
    Ok(())
}

#[tokio::test]
async fn test_read_error_returns_partial_info() -> anyhow::Result<()> {
    let connection = ScriptedConnection::new(vec![
        Ok(payload(true)),
        Err(Error::Transport("connection reset".to_string())),
        Ok(payload(false)),
    ]);
    let info = probe(Box::new(connection), CancellationToken::new(), 120, 1316).await?;
    assert_eq!(info, expected());
    Ok(())
}

#[tokio::test]
async fn test_no_metadata_is_empty() -> anyhow::Result<()> {
    let connection = ScriptedConnection::repeating(payload(false));
    let info = probe(Box::new(connection), CancellationToken::new(), 10, 1316).await?;
    assert!(info.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_demux_error_fails_probe() {
    // not a transport stream at all
    let connection = ScriptedConnection::new(vec![Ok(vec![0u8; 1316])]);
    let result = probe(Box::new(connection), CancellationToken::new(), 120, 1316).await;
    assert!(matches!(result, Err(Error::Demux(_))));
}

#[tokio::test]
async fn test_cancelled_probe_stops_reading() -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let connection = ScriptedConnection::repeating(payload(true));
    let count = connection.count.clone();
    let info = probe(Box::new(connection), cancel, 120, 1316).await?;
    assert!(info.is_empty());
    assert_eq!(count.load(Ordering::SeqCst), 0);
    Ok(())
}

struct ScriptedTransport;

#[async_trait]
impl IngestTransport for ScriptedTransport {
    async fn connect(
        &self,
        params: &RequestParams,
        _cancel: CancellationToken,
    ) -> Result<Box<dyn IngestConnection>> {
        params.validate()?;
        Ok(Box::new(ScriptedConnection::repeating(payload(true))))
    }
}

#[tokio::test]
async fn test_prober_through_transport() -> anyhow::Result<()> {
    let prober = SrtMpegTsProber::new(Arc::new(GatewayConfig::default()), Arc::new(ScriptedTransport));
    let params = RequestParams::srt("127.0.0.1", 40052, "stream-id");
    assert!(prober.matches(&params));
    assert!(!prober.matches(&RequestParams::url("rtmp://host/app", "key")));

    let info = prober.stream_info(&params, &InputDescriptor::default()).await?;
    assert_eq!(info, expected());

    let invalid = RequestParams::srt("127.0.0.1", 0, "stream-id");
    assert!(matches!(
        prober.stream_info(&invalid, &InputDescriptor::default()).await,
        Err(Error::InvalidParams(_))
    ));
    Ok(())
}
