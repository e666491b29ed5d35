use ffmpeg_next::{Rational, frame, util::mathematics::Rescale};

/// A decoded or filtered frame.
pub enum RawFrame {
    Video(frame::Video),
    Audio(frame::Audio),
}

impl RawFrame {
    pub fn rescale_pts(&mut self, from: Rational, to: Rational) {
        if from == to {
            return;
        }
        let frame: &mut frame::Frame = match self {
            RawFrame::Video(frame) => &mut **frame,
            RawFrame::Audio(frame) => &mut **frame,
        };
        let pts = frame.pts().map(|pts| pts.rescale(from, to));
        frame.set_pts(pts);
    }

    pub fn as_frame(&self) -> &frame::Frame {
        match self {
            RawFrame::Video(frame) => &**frame,
            RawFrame::Audio(frame) => &**frame,
        }
    }
}
