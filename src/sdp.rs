//! Client codec support from a WebRTC offer.

use crate::types::{Codec, MediaType, Stream, StreamInfo};

/// Collects the codecs of every `a=rtpmap` line, one stream per codec.
pub fn client_stream_info(sdp: &str) -> StreamInfo {
    let mut streams = Vec::new();
    let mut media_type = MediaType::Unknown;
    for line in sdp.lines().map(str::trim) {
        if let Some(media) = line.strip_prefix("m=") {
            media_type = match media.split_whitespace().next() {
                Some("video") => MediaType::Video,
                Some("audio") => MediaType::Audio,
                _ => MediaType::Unknown,
            };
            continue;
        }

        // a=rtpmap:<payload type> <encoding name>/<clock rate>[/<channels>]
        let Some(rtpmap) = line.strip_prefix("a=rtpmap:") else {
            continue;
        };
        let Some(encoding) = rtpmap
            .split_whitespace()
            .nth(1)
            .and_then(|e| e.split('/').next())
        else {
            continue;
        };
        let codec = Codec::from_rtp_encoding(encoding);
        if codec == Codec::Unknown || codec.media_type() != media_type {
            continue;
        }
        streams.push(Stream {
            codec,
            media_type,
            id: 0,
            index: 0,
        });
    }
    StreamInfo::dedup_by_codec(streams)
}

#[cfg(test)]
mod tests {
    use super::*;

    const OFFER: &str = "v=0\r\n\
        o=- 46117317 2 IN IP4 127.0.0.1\r\n\
        s=-\r\n\
        m=video 9 UDP/TLS/RTP/SAVPF 96 97 102 103 45\r\n\
        a=rtpmap:96 VP8/90000\r\n\
        a=rtpmap:97 rtx/90000\r\n\
        a=rtpmap:102 H264/90000\r\n\
        a=rtpmap:103 H264/90000\r\n\
        a=rtpmap:45 AV1/90000\r\n\
        m=audio 9 UDP/TLS/RTP/SAVPF 111 0\r\n\
        a=rtpmap:111 opus/48000/2\r\n\
        a=rtpmap:0 PCMU/8000\r\n\
        m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n";

    #[test]
    fn test_client_codecs() {
        let info = client_stream_info(OFFER);
        let codecs: Vec<Codec> = info.codecs().collect();
        assert_eq!(codecs, vec![Codec::Vp8, Codec::H264, Codec::Av1, Codec::Opus]);
        assert_eq!(info.video_streams().count(), 3);
        assert_eq!(info.audio_streams().count(), 1);
    }

    #[test]
    fn test_empty_offer() {
        assert!(client_stream_info("").is_empty());
        assert!(client_stream_info("v=0\r\na=rtpmap:96 VP8/90000\r\n").is_empty());
    }
}
