//! MPEG-TS program specific information.
//!
//! Frames a byte stream into 188 byte packets and runs them through
//! `mpeg2ts-reader`'s PAT/PMT filters, which reassemble sections across
//! packets and check their CRC. PES payloads are ignored: the only thing
//! needed from the container while probing is the list of elementary streams.

use bytes::{Buf, BytesMut};
use mpeg2ts_reader::demultiplex;

use self::context::PsiContext;

pub const TS_PACKET_SIZE: usize = 188;
pub const SYNC_BYTE: u8 = 0x47;

/// Bytes without a sync byte after which the input is not treated as MPEG-TS.
const MAX_UNSYNCED: usize = 5 * TS_PACKET_SIZE;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DemuxError {
    #[error("lost sync: {dropped} bytes without a 0x47 packet start")]
    LostSync { dropped: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementaryStream {
    pub pid: u16,
    pub stream_type: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxData {
    /// `(program_number, pmt_pid)` pairs, the network PID excluded.
    Pat { programs: Vec<(u16, u16)> },
    Pmt {
        program_number: u16,
        streams: Vec<ElementaryStream>,
    },
}

mod context {
    use std::collections::HashMap;

    use mpeg2ts_reader::{demultiplex, psi};

    use super::ElementaryStream;

    mpeg2ts_reader::packet_filter_switch! {
        PsiFilterSwitch<PsiContext> {
            Pat: demultiplex::PatPacketFilter<PsiContext>,
            Pmt: demultiplex::PmtPacketFilter<PsiContext>,
            Null: demultiplex::NullPacketFilter<PsiContext>,
        }
    }

    /// Collects what the PAT and PMT filters announce while a packet is pushed.
    #[derive(Default)]
    pub struct PsiContext {
        changeset: demultiplex::FilterChangeset<PsiFilterSwitch>,
        pub(super) programs: HashMap<u16, u16>,
        pub(super) new_programs: Vec<(u16, u16)>,
        pub(super) new_streams: Vec<(u16, ElementaryStream)>,
    }

    impl demultiplex::DemuxContext for PsiContext {
        type F = PsiFilterSwitch;

        fn filter_changeset(&mut self) -> &mut demultiplex::FilterChangeset<Self::F> {
            &mut self.changeset
        }

        fn construct(&mut self, req: demultiplex::FilterRequest<'_, '_>) -> Self::F {
            match req {
                demultiplex::FilterRequest::ByPid(psi::pat::PAT_PID) => {
                    PsiFilterSwitch::Pat(demultiplex::PatPacketFilter::default())
                }
                demultiplex::FilterRequest::Pmt {
                    pid,
                    program_number,
                } => {
                    self.programs.insert(u16::from(pid), program_number);
                    self.new_programs.push((program_number, u16::from(pid)));
                    PsiFilterSwitch::Pmt(demultiplex::PmtPacketFilter::new(pid, program_number))
                }
                demultiplex::FilterRequest::ByStream {
                    program_pid,
                    stream_type,
                    stream_info,
                    ..
                } => {
                    self.new_streams.push((
                        u16::from(program_pid),
                        ElementaryStream {
                            pid: u16::from(stream_info.elementary_pid()),
                            stream_type: stream_type.0,
                        },
                    ));
                    PsiFilterSwitch::Null(demultiplex::NullPacketFilter::default())
                }
                _ => PsiFilterSwitch::Null(demultiplex::NullPacketFilter::default()),
            }
        }
    }
}

pub struct TsDemuxer {
    pending: BytesMut,
    unsynced: usize,
    context: PsiContext,
    demux: demultiplex::Demultiplex<PsiContext>,
}

impl Default for TsDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl TsDemuxer {
    pub fn new() -> Self {
        let mut context = PsiContext::default();
        let demux = demultiplex::Demultiplex::new(&mut context);
        Self {
            pending: BytesMut::new(),
            unsynced: 0,
            context,
            demux,
        }
    }

    /// Appends a chunk of the transport stream and returns the tables it
    /// completed. Partial packets are kept until the next call.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<DemuxData>, DemuxError> {
        self.pending.extend_from_slice(chunk);

        let mut tables = Vec::new();
        loop {
            match self.pending.iter().position(|&b| b == SYNC_BYTE) {
                Some(0) => {}
                Some(skip) => {
                    log::debug!("ts resync, dropped {} bytes", skip);
                    self.pending.advance(skip);
                    self.lost(skip)?;
                }
                None => {
                    let dropped = self.pending.len();
                    self.pending.clear();
                    self.lost(dropped)?;
                    break;
                }
            }
            if self.pending.len() < TS_PACKET_SIZE {
                break;
            }

            let packet = self.pending.split_to(TS_PACKET_SIZE);
            self.unsynced = 0;
            self.demux.push(&mut self.context, &packet);
            self.collect(&mut tables);
        }
        Ok(tables)
    }

    fn lost(&mut self, dropped: usize) -> Result<(), DemuxError> {
        self.unsynced += dropped;
        if self.unsynced > MAX_UNSYNCED {
            return Err(DemuxError::LostSync {
                dropped: self.unsynced,
            });
        }
        Ok(())
    }

    // A packet belongs to one PID, so it completes at most one table.
    fn collect(&mut self, tables: &mut Vec<DemuxData>) {
        if !self.context.new_programs.is_empty() {
            tables.push(DemuxData::Pat {
                programs: std::mem::take(&mut self.context.new_programs),
            });
        }
        let Some(&(pmt_pid, _)) = self.context.new_streams.first() else {
            return;
        };
        let streams = std::mem::take(&mut self.context.new_streams)
            .into_iter()
            .map(|(_, es)| es)
            .collect();
        tables.push(DemuxData::Pmt {
            program_number: self.context.programs.get(&pmt_pid).copied().unwrap_or(0),
            streams,
        });
    }
}

#[cfg(test)]
#[path = "ts_test.rs"]
pub(crate) mod ts_test;
