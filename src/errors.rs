//! Error types for both ends of the log channel & for the harnesses

use std::io;
use thiserror::Error;


/// Everything that may go wrong while producing to or tailing the log file.\
/// Notice an empty read is not here: it is the normal "writer didn't catch up yet" condition,
/// reported as a transient outcome by [crate::LogReader::poll()] and never surfaced as an error.
#[derive(Debug, Error)]
pub enum LogError {

    /// The log file could not be opened -- fatal: the caller is not expected to retry
    #[error("could not open log file '{path}': {source}")]
    FileOpen {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The reader could not reposition itself at its offset cursor -- fatal for the reader
    #[error("could not seek the log file to offset {offset}: {source}")]
    Seek {
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// A non-transient failure of the `read` syscall
    #[error("could not read the log file at offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: io::Error,
    },

    /// Appending a record failed -- the writer doesn't recover from storage errors mid-run
    #[error("could not append record #{record} to the log file: {source}")]
    Write {
        record: u64,
        #[source]
        source: io::Error,
    },

    /// A tagged frame carried an unknown type tag
    #[error("corrupt log: unknown frame tag {tag:#04x} at offset {offset}")]
    Corrupt {
        offset: u64,
        tag:    u8,
    },

    /// The OS refused to start one of a harness' threads
    #[error("could not spawn the {role} thread: {source}")]
    Spawn {
        role: &'static str,
        #[source]
        source: io::Error,
    },

    /// Consumed records could not be written out
    #[error("could not output consumed record #{record}: {source}")]
    Output {
        record: u64,
        #[source]
        source: io::Error,
    },

    /// Record indexes are single bytes: a run must have between 1 and 256 of them
    #[error("{records} records can't be indexed by a single byte: between 1 and 256 records are supported")]
    RecordCount {
        records: usize,
    },

    /// The handshake benchmark didn't produce & consume every record exactly once
    #[error("completion invariant violated: produced {produced} and consumed {consumed} records, where {expected} (each exactly once) were expected")]
    InvariantViolation {
        produced: usize,
        consumed: usize,
        expected: usize,
    },
}

pub type Result<T> = std::result::Result<T, LogError>;
