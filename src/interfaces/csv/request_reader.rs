use crate::domain::protocol::DataRequest;
use crate::error::{AdapterError, Result};
use std::io::Read;

/// Reads data requests from a CSV source with the header `key,asset,provider`.
///
/// Whitespace around fields is trimmed and malformed rows surface as errors
/// without stopping the stream.
pub struct RequestReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> RequestReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes one request per row.
    pub fn requests(self) -> impl Iterator<Item = Result<DataRequest>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(AdapterError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::protocol::AssetId;

    #[test]
    fn test_reader_valid_stream() {
        let data = "key, asset, provider\nk1, asset-42, http://p1\nk2, asset-7, http://p2";
        let reader = RequestReader::new(data.as_bytes());
        let results: Vec<Result<DataRequest>> = reader.requests().collect();

        assert_eq!(results.len(), 2);
        let first = results[0].as_ref().unwrap();
        assert_eq!(first.key.as_str(), "k1");
        assert_eq!(first.asset_id, AssetId::new("asset-42"));
        assert_eq!(results[1].as_ref().unwrap().provider, "http://p2");
    }

    #[test]
    fn test_reader_short_row_is_an_error() {
        let data = "key, asset, provider\nk1, asset-42\nk2, asset-7, http://p2";
        let reader = RequestReader::new(data.as_bytes());
        let results: Vec<Result<DataRequest>> = reader.requests().collect();

        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }
}
