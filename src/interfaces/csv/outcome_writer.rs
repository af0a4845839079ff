use crate::application::results::ResultStatus;
use crate::domain::case::CorrelationKey;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One output row per request.
#[derive(Debug, Serialize, PartialEq)]
pub struct OutcomeRecord {
    pub key: String,
    pub status: &'static str,
    pub detail: String,
}

impl OutcomeRecord {
    pub fn new(key: &CorrelationKey, status: &ResultStatus) -> Self {
        let (status, detail) = match status {
            ResultStatus::Pending => ("pending", String::new()),
            ResultStatus::Success(reference) => ("success", reference.endpoint.clone()),
            ResultStatus::Error(reason) => ("error", reason.to_string()),
        };
        Self {
            key: key.to_string(),
            status,
            detail,
        }
    }
}

/// Writes outcomes as CSV (`key,status,detail`) or as JSON lines.
pub struct OutcomeWriter<W: Write> {
    format: OutputFormat<W>,
}

enum OutputFormat<W: Write> {
    Csv(csv::Writer<W>),
    Json(W),
}

impl<W: Write> OutcomeWriter<W> {
    pub fn csv(sink: W) -> Self {
        Self {
            format: OutputFormat::Csv(csv::Writer::from_writer(sink)),
        }
    }

    pub fn json(sink: W) -> Self {
        Self {
            format: OutputFormat::Json(sink),
        }
    }

    pub fn write(&mut self, record: &OutcomeRecord) -> Result<()> {
        match &mut self.format {
            OutputFormat::Csv(writer) => writer.serialize(record)?,
            OutputFormat::Json(sink) => {
                serde_json::to_writer(&mut *sink, record)?;
                writeln!(sink)?;
            }
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        match &mut self.format {
            OutputFormat::Csv(writer) => writer.flush()?,
            OutputFormat::Json(sink) => sink.flush()?,
        }
        Ok(())
    }
}
