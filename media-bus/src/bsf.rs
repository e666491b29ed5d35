use bytes::{Bytes, BytesMut};
use ffmpeg_next::codec::Parameters;

/// Annex B start code (4-byte)
const START_CODE: &[u8] = &[0x00, 0x00, 0x00, 0x01];

/// Reads extradata from codec parameters via the raw AVCodecParameters pointer.
/// Returns None if extradata is null or empty.
fn get_extradata(codec_params: &Parameters) -> Option<&[u8]> {
    unsafe {
        let p = codec_params.as_ptr() as *const ffmpeg_next::ffi::AVCodecParameters;
        let extradata_ptr = (*p).extradata;
        if extradata_ptr.is_null() {
            return None;
        }
        let size = (*p).extradata_size;
        if size <= 0 {
            return None;
        }
        Some(std::slice::from_raw_parts(extradata_ptr, size as usize))
    }
}

/// Check if packet data is in Annex B format by looking at the start codes.
pub fn is_annexb_packet(data: &[u8]) -> bool {
    data.starts_with(&[0x00, 0x00, 0x00, 0x01]) || data.starts_with(&[0x00, 0x00, 0x01])
}

/// Parameter sets and NAL length size from an `avcC` decoder configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvcConfig {
    pub length_size: usize,
    pub parameter_sets: Vec<Bytes>,
}

impl AvcConfig {
    pub fn parse(record: &[u8]) -> Option<Self> {
        if record.len() < 7 || record[0] != 0x01 {
            return None;
        }
        let length_size = usize::from(record[4] & 0x03) + 1;

        let mut parameter_sets = Vec::new();
        let mut pos = 5;
        // SPS count is 5 bits, PPS count a full byte
        for mask in [0x1f, 0xff] {
            let count = *record.get(pos)? & mask;
            pos += 1;
            for _ in 0..count {
                let len = usize::from(u16::from_be_bytes([*record.get(pos)?, *record.get(pos + 1)?]));
                pos += 2;
                parameter_sets.push(Bytes::copy_from_slice(record.get(pos..pos + len)?));
                pos += len;
            }
        }

        Some(Self {
            length_size,
            parameter_sets,
        })
    }
}

/// Reframes length-prefixed H.264 packets with start codes, prepending the
/// SPS/PPS of the configuration record to every key frame.
pub struct AnnexBFilter {
    config: AvcConfig,
}

impl AnnexBFilter {
    /// Returns None when the stream is already Annex B (no `avcC` extradata).
    pub fn for_parameters(codec_params: &Parameters) -> Option<Self> {
        let extradata = get_extradata(codec_params)?;
        if is_annexb_packet(extradata) {
            return None;
        }
        AvcConfig::parse(extradata).map(|config| Self { config })
    }

    pub fn filter(&self, data: &[u8], is_key: bool) -> Bytes {
        if data.is_empty() || is_annexb_packet(data) {
            return Bytes::copy_from_slice(data);
        }

        let mut out = BytesMut::with_capacity(data.len() + 64);
        if is_key {
            for set in &self.config.parameter_sets {
                out.extend_from_slice(START_CODE);
                out.extend_from_slice(set);
            }
        }
        out.extend_from_slice(&convert_avcc_to_annexb(data, self.config.length_size));
        out.freeze()
    }
}

/// Converts length-prefixed NAL units to start-code framing.
pub fn convert_avcc_to_annexb(avcc: &[u8], length_size: usize) -> Bytes {
    let mut out = BytesMut::new();
    let mut i = 0;
    while i + length_size <= avcc.len() {
        let len = avcc[i..i + length_size]
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
        i += length_size;
        if len == 0 || i + len > avcc.len() {
            break;
        }
        out.extend_from_slice(START_CODE);
        out.extend_from_slice(&avcc[i..i + len]);
        i += len;
    }
    out.freeze()
}
