//! Live signal processing: batch decoding, live buffering and estimate history

pub mod parser;
pub mod buffer;
pub mod history;

pub use parser::{BatchParser, ParseError, ScanRecord};
pub use buffer::{
    ApReading, BatchIngestion, IncrementalIngestion, IngestError, IngestOutcome,
    IngestionStrategy, LiveSignalBuffer, RawIngest,
};
pub use history::PositionHistory;
