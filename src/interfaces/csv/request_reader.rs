use crate::application::service::SubmitRequest;
use crate::error::{HubError, Result};
use std::io::Read;

/// Reads submissions from a CSV source with the header
/// `external_id,source_system,target_system,payload`.
///
/// Headers and fields are trimmed. A payload containing commas must be quoted, with the
/// opening quote directly after the delimiter.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    /// Creates a new `RequestReader` from any `Read` source (e.g., File, Stdin).
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes one submission per row; a bad row yields an error and the
    /// iterator continues with the next one.
    pub fn requests(self) -> impl Iterator<Item = Result<SubmitRequest>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(HubError::from))
    }
}
