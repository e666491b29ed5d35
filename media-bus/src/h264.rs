//! H.264 Annex-B unit parsing.
//!
//! Only the parts needed to reach SEI payloads are decoded: the one byte
//! unit header, emulation-prevention removal and the SEI message header.

const START_CODE: [u8; 3] = [0x00, 0x00, 0x01];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BitstreamError {
    #[error("empty unit after start code")]
    EmptyUnit,
    #[error("forbidden zero bit is set in unit header 0x{0:02x}")]
    ForbiddenZeroBit(u8),
}

/// Unit types from Table 7-1 of the H.264 standard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum NalUnitType {
    Unspecified = 0,
    CodedSliceNonIdr = 1,
    CodedSliceDataPartitionA = 2,
    CodedSliceDataPartitionB = 3,
    CodedSliceDataPartitionC = 4,
    CodedSliceIdr = 5,
    Sei = 6,
    Sps = 7,
    Pps = 8,
    AccessUnitDelimiter = 9,
    EndOfSequence = 10,
    EndOfStream = 11,
    FillerData = 12,
    SpsExtension = 13,
    PrefixNalUnit = 14,
    SubsetSps = 15,
    DepthParameterSet = 16,
    Reserved17 = 17,
    Reserved18 = 18,
    CodedSliceAuxiliary = 19,
    CodedSliceExtension = 20,
    CodedSliceExtensionDepthView = 21,
    Reserved22 = 22,
    Reserved23 = 23,
    Unspecified24 = 24,
    Unspecified25 = 25,
    Unspecified26 = 26,
    Unspecified27 = 27,
    Unspecified28 = 28,
    Unspecified29 = 29,
    Unspecified30 = 30,
    Unspecified31 = 31,
}

impl From<u8> for NalUnitType {
    fn from(value: u8) -> Self {
        use NalUnitType::*;
        match value & 0x1f {
            0 => Unspecified,
            1 => CodedSliceNonIdr,
            2 => CodedSliceDataPartitionA,
            3 => CodedSliceDataPartitionB,
            4 => CodedSliceDataPartitionC,
            5 => CodedSliceIdr,
            6 => Sei,
            7 => Sps,
            8 => Pps,
            9 => AccessUnitDelimiter,
            10 => EndOfSequence,
            11 => EndOfStream,
            12 => FillerData,
            13 => SpsExtension,
            14 => PrefixNalUnit,
            15 => SubsetSps,
            16 => DepthParameterSet,
            17 => Reserved17,
            18 => Reserved18,
            19 => CodedSliceAuxiliary,
            20 => CodedSliceExtension,
            21 => CodedSliceExtensionDepthView,
            22 => Reserved22,
            23 => Reserved23,
            24 => Unspecified24,
            25 => Unspecified25,
            26 => Unspecified26,
            27 => Unspecified27,
            28 => Unspecified28,
            29 => Unspecified29,
            30 => Unspecified30,
            _ => Unspecified31,
        }
    }
}

/// Payload type and size of the first message in an SEI unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeiHeader {
    pub payload_type: u32,
    pub payload_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    ref_idc: u8,
    unit_type: NalUnitType,
    header: u8,
    rbsp: Vec<u8>,
    sei: Option<SeiHeader>,
}

impl NalUnit {
    pub fn ref_idc(&self) -> u8 {
        self.ref_idc
    }

    pub fn unit_type(&self) -> NalUnitType {
        self.unit_type
    }

    pub fn header(&self) -> u8 {
        self.header
    }

    /// Unit body with emulation-prevention bytes removed.
    pub fn rbsp(&self) -> &[u8] {
        &self.rbsp
    }

    pub fn sei(&self) -> Option<SeiHeader> {
        self.sei
    }
}

/// Splits an Annex-B buffer on `00 00 01` and parses every segment after the
/// first start code. Bytes before the first start code are dropped.
pub fn split_units(data: &[u8]) -> Result<Vec<NalUnit>, BitstreamError> {
    let starts = start_code_offsets(data);
    let mut units = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let body = start + START_CODE.len();
        let end = starts.get(i + 1).copied().unwrap_or(data.len());
        units.push(parse_unit(&data[body..end])?);
    }
    Ok(units)
}

fn start_code_offsets(data: &[u8]) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut i = 0;
    while i + START_CODE.len() <= data.len() {
        if data[i..i + START_CODE.len()] == START_CODE {
            offsets.push(i);
            i += START_CODE.len();
        } else {
            i += 1;
        }
    }
    offsets
}

pub fn parse_unit(data: &[u8]) -> Result<NalUnit, BitstreamError> {
    let Some(&header) = data.first() else {
        return Err(BitstreamError::EmptyUnit);
    };
    if header & 0x80 != 0 {
        return Err(BitstreamError::ForbiddenZeroBit(header));
    }

    let unit_type = NalUnitType::from(header);
    let rbsp = unescape_rbsp(&data[1..]);
    let sei = (unit_type == NalUnitType::Sei).then(|| parse_sei_header(&rbsp));

    Ok(NalUnit {
        ref_idc: (header >> 5) & 0x03,
        unit_type,
        header,
        rbsp,
        sei,
    })
}

/// Replaces every `00 00 03` with `00 00`.
fn unescape_rbsp(body: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(body.len());
    let mut i = 0;
    while i < body.len() {
        if i + 2 < body.len() && body[i] == 0x00 && body[i + 1] == 0x00 && body[i + 2] == 0x03 {
            rbsp.extend_from_slice(&body[i..i + 2]);
            i += 3;
        } else {
            rbsp.push(body[i]);
            i += 1;
        }
    }
    rbsp
}

/// Reads the base-255 coded payload type followed by the payload size.
/// A field cut short by the end of the buffer keeps what was accumulated.
pub fn parse_sei_header(rbsp: &[u8]) -> SeiHeader {
    let mut bytes = rbsp.iter().copied();
    let payload_type = read_sei_value(&mut bytes);
    let payload_size = read_sei_value(&mut bytes);
    SeiHeader {
        payload_type,
        payload_size,
    }
}

fn read_sei_value(bytes: &mut impl Iterator<Item = u8>) -> u32 {
    let mut value = 0u32;
    for byte in bytes {
        value += u32::from(byte);
        if byte != 0xff {
            break;
        }
    }
    value
}
