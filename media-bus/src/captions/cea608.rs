//! CEA-608 caption decoding over ATSC A/53 `cc_data`.

use super::{CaptionDecoder, CaptionError};

/// itu_t_t35 country code, provider code, `GA94` and user_data_type_code 3.
const GA94_HEADER: [u8; 8] = [0xb5, 0x00, 0x31, b'G', b'A', b'9', b'4', 0x03];
/// Offsets in `GA94_HEADER` that must match for the payload to be well formed.
const MANDATORY_HEADER_BYTES: usize = 3;

const PROCESS_CC_DATA: u8 = 0x40;
const CC_VALID: u8 = 0x04;
const CC_TYPE_FIELD_1: u8 = 0x00;
/// Set in the first byte of control codes addressed to data channel 2.
const CHANNEL_2: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Payload {
    Header(usize),
    Count,
    EmData(u8),
    Triplet { remaining: u8, filled: usize },
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    PopOn,
    RollUp,
    PaintOn,
}

/// Decodes channel 1 of field 1 into plain text.
///
/// Pop-on captions become ready on end-of-caption, roll-up and paint-on
/// captions on every carriage return. Styling, positioning and XDS are
/// ignored beyond starting a new line for each preamble address code.
pub struct Cea608Decoder {
    payload: Payload,
    triplet: [u8; 3],
    mode: Mode,
    memory: String,
    displayed: String,
    last_control: Option<(u8, u8)>,
    // text belongs to the channel of the last control code
    channel_1: bool,
}

impl Cea608Decoder {
    pub fn new() -> Self {
        Self {
            payload: Payload::Ignore,
            triplet: [0; 3],
            mode: Mode::PopOn,
            memory: String::new(),
            displayed: String::new(),
            last_control: None,
            channel_1: true,
        }
    }

    fn decode_pair(&mut self, first: u8, second: u8) -> bool {
        let (first, second) = (first & 0x7f, second & 0x7f);
        if first == 0 && second == 0 {
            return false;
        }

        if (0x10..=0x1f).contains(&first) {
            // control codes are transmitted twice
            if self.last_control == Some((first, second)) {
                self.last_control = None;
                return false;
            }
            self.last_control = Some((first, second));
            self.channel_1 = first & CHANNEL_2 == 0;
            if !self.channel_1 {
                return false;
            }
            return self.control(first & !CHANNEL_2, second);
        }
        self.last_control = None;

        if first >= 0x20 && self.channel_1 {
            self.memory.push(basic_char(first));
            if second >= 0x20 {
                self.memory.push(basic_char(second));
            }
        }
        false
    }

    fn control(&mut self, first: u8, second: u8) -> bool {
        match (first, second) {
            (0x14, 0x20) => self.mode = Mode::PopOn,
            (0x14, 0x21) => {
                self.memory.pop();
            }
            (0x14, 0x25..=0x27) => self.mode = Mode::RollUp,
            (0x14, 0x29) => self.mode = Mode::PaintOn,
            (0x14, 0x2c) => self.displayed.clear(),
            (0x14, 0x2d) if self.mode != Mode::PopOn => return self.flip(),
            (0x14, 0x2e) => self.memory.clear(),
            (0x14, 0x2f) => return self.flip(),
            (0x11, 0x20..=0x2f) => self.memory.push(' '),
            (0x11, 0x30..=0x3f) => self.memory.push(special_char(second)),
            (_, 0x40..=0x7f) => {
                if !self.memory.is_empty() && !self.memory.ends_with('\n') {
                    self.memory.push('\n');
                }
            }
            _ => {}
        }
        false
    }

    fn flip(&mut self) -> bool {
        let text = std::mem::take(&mut self.memory);
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.displayed = text.to_string();
        true
    }
}

impl Default for Cea608Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptionDecoder for Cea608Decoder {
    fn begin_payload(&mut self) {
        self.payload = Payload::Header(0);
    }

    fn decode(&mut self, byte: u8) -> Result<bool, CaptionError> {
        match self.payload {
            Payload::Header(offset) => {
                if byte != GA94_HEADER[offset] {
                    if offset < MANDATORY_HEADER_BYTES {
                        return Err(CaptionError::UnexpectedHeader { offset, byte });
                    }
                    // other registered user data, e.g. bar data or AFD
                    self.payload = Payload::Ignore;
                } else if offset + 1 == GA94_HEADER.len() {
                    self.payload = Payload::Count;
                } else {
                    self.payload = Payload::Header(offset + 1);
                }
            }
            Payload::Count => {
                self.payload = if byte & PROCESS_CC_DATA == 0 {
                    Payload::Ignore
                } else {
                    Payload::EmData(byte & 0x1f)
                };
            }
            Payload::EmData(count) => {
                self.payload = Payload::Triplet {
                    remaining: count,
                    filled: 0,
                };
            }
            Payload::Triplet { remaining: 0, .. } => self.payload = Payload::Ignore,
            Payload::Triplet { remaining, filled } => {
                self.triplet[filled] = byte;
                if filled < 2 {
                    self.payload = Payload::Triplet {
                        remaining,
                        filled: filled + 1,
                    };
                    return Ok(false);
                }

                self.payload = Payload::Triplet {
                    remaining: remaining - 1,
                    filled: 0,
                };
                let [marker, first, second] = self.triplet;
                if marker & CC_VALID != 0 && marker & 0x03 == CC_TYPE_FIELD_1 {
                    return Ok(self.decode_pair(first, second));
                }
            }
            Payload::Ignore => {}
        }
        Ok(false)
    }

    fn rendered_text(&self) -> String {
        self.displayed.clone()
    }
}

fn basic_char(code: u8) -> char {
    match code {
        0x2a => 'á',
        0x5c => 'é',
        0x5e => 'í',
        0x5f => 'ó',
        0x60 => 'ú',
        0x7b => 'ç',
        0x7c => '÷',
        0x7d => 'Ñ',
        0x7e => 'ñ',
        0x7f => '█',
        _ => char::from(code),
    }
}

fn special_char(code: u8) -> char {
    const SPECIAL: [char; 16] = [
        '®', '°', '½', '¿', '™', '¢', '£', '♪', 'à', ' ', 'è', 'â', 'ê', 'î', 'ô', 'û',
    ];
    SPECIAL[usize::from(code & 0x0f)]
}
