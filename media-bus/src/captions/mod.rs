//! Closed caption extraction from H.264 SEI units.

mod cea608;

pub use cea608::Cea608Decoder;

use serde::{Deserialize, Serialize};

use crate::h264::{NalUnit, NalUnitType};

/// `user_data_registered_itu_t_t35`, the SEI payload carrying ATSC captions.
pub const SEI_USER_DATA_REGISTERED: u32 = 4;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CaptionError {
    #[error("unexpected caption payload byte 0x{byte:02x} at offset {offset}")]
    UnexpectedHeader { offset: usize, byte: u8 },
}

/// Byte-fed caption decoder.
pub trait CaptionDecoder: Send {
    /// Called before the first byte of each SEI payload.
    fn begin_payload(&mut self) {}

    /// Feeds one payload byte. Returns true once a caption is ready to render.
    fn decode(&mut self, byte: u8) -> Result<bool, CaptionError>;

    fn rendered_text(&self) -> String;
}

pub struct CaptionExtractor<D = Cea608Decoder> {
    decoder: D,
}

impl CaptionExtractor<Cea608Decoder> {
    pub fn new() -> Self {
        Self::with_decoder(Cea608Decoder::new())
    }
}

impl Default for CaptionExtractor<Cea608Decoder> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: CaptionDecoder> CaptionExtractor<D> {
    pub fn with_decoder(decoder: D) -> Self {
        Self { decoder }
    }

    /// Returns the first caption completed by the SEI units of one access unit.
    pub fn extract(&mut self, units: &[NalUnit]) -> Result<Option<String>, CaptionError> {
        for unit in units {
            if unit.unit_type() != NalUnitType::Sei {
                continue;
            }
            match unit.sei() {
                Some(sei) if sei.payload_type == SEI_USER_DATA_REGISTERED => {}
                _ => continue,
            }
            // skip payload type and payload size
            let Some(payload) = unit.rbsp().get(2..) else {
                continue;
            };

            self.decoder.begin_payload();
            for &byte in payload {
                if self.decoder.decode(byte)? {
                    return Ok(Some(self.decoder.rendered_text()));
                }
            }
        }
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Cue {
    #[serde(rename = "Type")]
    pub kind: String,
    pub start_time: i64,
    pub text: String,
}

pub fn build_cue(pts: i64, text: impl Into<String>) -> Cue {
    Cue {
        kind: "captions".to_string(),
        start_time: pts,
        text: text.into(),
    }
}
