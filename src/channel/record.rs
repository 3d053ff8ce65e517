//! Resting place for [Record] & its wire formats -- see [Framing]

use crate::errors::{LogError, Result};


/// The unit appended to -- and tailed from -- the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    /// An ordinary payload byte
    Data(u8),
    /// The producer won't append anything else
    EndOfStream,
}

/// Type tag of a tagged DATA frame
const DATA_TAG: u8 = 0x01;
/// Type tag of a tagged END-OF-STREAM frame (ASCII EOT)
const END_OF_STREAM_TAG: u8 = 0x04;

/// How [Record]s are laid out in the log file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// One raw byte per record, no framing at all.\
    /// If `sentinel` is given, a record with that payload is both data and the end of the run
    /// -- an explicit [Record::EndOfStream] can't be represented and is not written.
    Raw { sentinel: Option<u8> },
    /// Two bytes per record: `[tag, payload]` -- `[0x01, payload]` for data, `[0x04, 0x00]` for the end of the stream.\
    /// The payload range is free of reserved values.
    Tagged,
}

impl Framing {

    /// The biggest frame any of the framings may produce
    pub const MAX_FRAME_LEN: usize = 2;

    /// Lays `record` out in `buffer`, returning the bytes to be appended -- possibly none, see [Framing::Raw]
    pub fn encode(self, record: Record, buffer: &mut [u8; Self::MAX_FRAME_LEN]) -> &[u8] {
        match (self, record) {
            (Framing::Raw { .. }, Record::Data(payload)) => {
                buffer[0] = payload;
                &buffer[..1]
            },
            (Framing::Raw { .. }, Record::EndOfStream) => &buffer[..0],
            (Framing::Tagged, Record::Data(payload)) => {
                *buffer = [DATA_TAG, payload];
                &buffer[..]
            },
            (Framing::Tagged, Record::EndOfStream) => {
                *buffer = [END_OF_STREAM_TAG, 0];
                &buffer[..]
            },
        }
    }
}


/// What feeding one more byte to the [RecordDecoder] yielded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// the byte started a frame that is still incomplete
    Incomplete,
    Record(Record),
    /// a [Framing::Raw] sentinel: this data record is also the last one
    LastRecord(u8),
}

/// Reassembles [Record]s out of the bytes tailed from the log.\
/// Reads may split frames at any point: partial frames are kept until the remaining bytes arrive.
#[derive(Debug)]
pub struct RecordDecoder {
    framing:     Framing,
    pending_tag: Option<u8>,
}

impl RecordDecoder {

    pub fn new(framing: Framing) -> Self {
        Self { framing, pending_tag: None }
    }

    /// Feeds the log byte found at `offset`
    pub fn feed(&mut self, byte: u8, offset: u64) -> Result<Decoded> {
        match self.framing {
            Framing::Raw { sentinel } if sentinel == Some(byte) => Ok(Decoded::LastRecord(byte)),
            Framing::Raw { .. } => Ok(Decoded::Record(Record::Data(byte))),
            Framing::Tagged => match self.pending_tag.take() {
                None if byte == DATA_TAG || byte == END_OF_STREAM_TAG => {
                    self.pending_tag = Some(byte);
                    Ok(Decoded::Incomplete)
                },
                None => Err(LogError::Corrupt { offset, tag: byte }),
                Some(DATA_TAG) => Ok(Decoded::Record(Record::Data(byte))),
                Some(_end_of_stream) => Ok(Decoded::Record(Record::EndOfStream)),
            },
        }
    }

    /// tells if the bytes fed so far ended in the middle of a frame
    pub fn has_partial_frame(&self) -> bool {
        self.pending_tag.is_some()
    }

}


/// Unit tests the [record](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;

    fn decode_all(framing: Framing, bytes: &[u8]) -> Vec<Decoded> {
        let mut decoder = RecordDecoder::new(framing);
        bytes.iter().enumerate()
            .map(|(offset, byte)| decoder.feed(*byte, offset as u64).expect("decoding shouldn't fail"))
            .filter(|decoded| *decoded != Decoded::Incomplete)
            .collect()
    }

    /// the raw framing is the payload itself -- and the sentinel is reported as data + end of stream
    #[cfg_attr(not(doc),test)]
    fn raw_framing() {
        let mut buffer = [0; Framing::MAX_FRAME_LEN];
        let framing = Framing::Raw { sentinel: Some(127) };
        assert_eq!(framing.encode(Record::Data(42), &mut buffer), &[42]);
        assert_eq!(framing.encode(Record::EndOfStream, &mut buffer), &[] as &[u8], "raw framing has no end-of-stream frame");
        assert_eq!(decode_all(framing, &[0, 126, 127]),
                   vec![Decoded::Record(Record::Data(0)), Decoded::Record(Record::Data(126)), Decoded::LastRecord(127)]);
        // without a sentinel, no value is special
        assert_eq!(decode_all(Framing::Raw { sentinel: None }, &[127, 255]),
                   vec![Decoded::Record(Record::Data(127)), Decoded::Record(Record::Data(255))]);
    }

    /// tagged frames don't reserve any payload value
    #[cfg_attr(not(doc),test)]
    fn tagged_framing() {
        let mut log = Vec::new();
        let mut buffer = [0; Framing::MAX_FRAME_LEN];
        for record in [Record::Data(127), Record::Data(DATA_TAG), Record::Data(END_OF_STREAM_TAG), Record::EndOfStream] {
            log.extend_from_slice(Framing::Tagged.encode(record, &mut buffer));
        }
        assert_eq!(log, vec![0x01, 127, 0x01, 0x01, 0x01, 0x04, 0x04, 0x00]);
        assert_eq!(decode_all(Framing::Tagged, &log),
                   vec![Decoded::Record(Record::Data(127)),
                        Decoded::Record(Record::Data(DATA_TAG)),
                        Decoded::Record(Record::Data(END_OF_STREAM_TAG)),
                        Decoded::Record(Record::EndOfStream)]);
    }

    /// frames split across reads are held until completed
    #[cfg_attr(not(doc),test)]
    fn split_frames() {
        let mut decoder = RecordDecoder::new(Framing::Tagged);
        assert_eq!(decoder.feed(DATA_TAG, 0).unwrap(), Decoded::Incomplete);
        assert!(decoder.has_partial_frame(), "the tag alone is a partial frame");
        assert_eq!(decoder.feed(9, 1).unwrap(), Decoded::Record(Record::Data(9)));
        assert!(!decoder.has_partial_frame(), "the frame should be complete");
    }

    #[cfg_attr(not(doc),test)]
    fn unknown_tag() {
        let mut decoder = RecordDecoder::new(Framing::Tagged);
        match decoder.feed(0x7f, 10) {
            Err(LogError::Corrupt { offset, tag }) => assert_eq!((offset, tag), (10, 0x7f)),
            other => panic!("an unknown tag should be reported as corruption -- got {other:?}"),
        }
    }

}
