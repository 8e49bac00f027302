use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, info_span, warn};

use crate::config::PipelineSettings;
use crate::error::PipelineError;
use crate::sanitize;
use crate::transform::FieldTransform;

use super::line::LineTransformer;
use super::pool::{LinePool, PendingLine};
use super::progress::{ProgressEvent, ProgressReporter};
use super::request::TransformRequest;

/// Written in place of a line whose worker failed outright.
pub const LINE_ERROR_SENTINEL: &str = "ERROR_PROCESSING_LINE";

/// Line counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineCounts {
    /// Data lines submitted for transformation.
    pub total_lines: u64,
    pub processed_lines: u64,
    /// Lines with at least one failed field, plus failed lines.
    pub error_count: u64,
    pub header_written: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub output_path: PathBuf,
    pub counts: LineCounts,
}

/// Streams a delimited file through a per-run line worker pool.
///
/// At most `chunk_size` lines are in flight between the reader and the
/// writer. Each full chunk is drained in submission order, so output order
/// always matches input order.
pub struct ChunkedPipeline {
    transform: Arc<dyn FieldTransform>,
    settings: PipelineSettings,
}

impl ChunkedPipeline {
    pub fn new(transform: Arc<dyn FieldTransform>, settings: PipelineSettings) -> Self {
        Self {
            transform,
            settings,
        }
    }

    /// Transforms `input` into `output`.
    ///
    /// On error the output file is left partially written and must be discarded.
    pub fn run(
        &self,
        request: &TransformRequest,
        input: &Path,
        output: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineOutcome, PipelineError> {
        let _span = info_span!(
            "pipeline",
            mode = %request.mode,
            policy = %request.policy,
            input = %sanitize::redact_path(input),
        )
        .entered();

        let reader = File::open(input).map_err(|e| PipelineError::OpenInput {
            path: input.to_path_buf(),
            source: e,
        })?;
        let writer = File::create(output).map_err(|e| PipelineError::CreateOutput {
            path: output.to_path_buf(),
            source: e,
        })?;

        let counts = self.run_streams(
            request,
            BufReader::new(reader),
            BufWriter::new(writer),
            progress,
        )?;

        info!(
            total = counts.total_lines,
            errors = counts.error_count,
            "Pipeline finished"
        );

        Ok(PipelineOutcome {
            output_path: output.to_path_buf(),
            counts,
        })
    }

    /// Core loop over arbitrary streams.
    pub fn run_streams<R: BufRead, W: Write>(
        &self,
        request: &TransformRequest,
        mut reader: R,
        mut writer: W,
        progress: &dyn ProgressReporter,
    ) -> Result<LineCounts, PipelineError> {
        let transformer = Arc::new(LineTransformer::new(Arc::clone(&self.transform), request));
        let pool = LinePool::spawn(transformer, self.settings.workers)?;

        let chunk_size = self.settings.chunk_size.max(1);
        let mut chunk: Vec<PendingLine> = Vec::with_capacity(chunk_size);
        let mut counts = LineCounts::default();
        let mut header_pending = request.skip_header;

        let mut buf = Vec::new();

        while let Some(line) = read_line(&mut reader, &mut buf)? {
            if line.trim().is_empty() {
                continue;
            }

            if header_pending {
                header_pending = false;
                write_line(&mut writer, &line)?;
                counts.header_written = true;
                continue;
            }

            chunk.push(pool.submit(counts.total_lines, line)?);
            counts.total_lines += 1;

            if chunk.len() >= chunk_size {
                drain_chunk(&mut chunk, &mut writer, &mut counts, progress)?;
            }
        }

        progress.report(ProgressEvent::InputExhausted {
            total_lines: counts.total_lines,
        });

        drain_chunk(&mut chunk, &mut writer, &mut counts, progress)?;
        // A header-only input never reaches a drain.
        writer.flush().map_err(PipelineError::WriteOutput)?;

        pool.wait();
        Ok(counts)
    }
}

/// Reads the next raw line without its `\n` or `\r\n` terminator.
///
/// Bytes that are not valid UTF-8 become U+FFFD so a single badly encoded
/// line cannot stop the run.
fn read_line<R: BufRead>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Result<Option<String>, PipelineError> {
    buf.clear();
    let read = reader
        .read_until(b'\n', buf)
        .map_err(PipelineError::ReadInput)?;
    if read == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }

    Ok(Some(String::from_utf8_lossy(buf).into_owned()))
}

/// Writes every pending line in submission order, then flushes.
fn drain_chunk<W: Write>(
    chunk: &mut Vec<PendingLine>,
    writer: &mut W,
    counts: &mut LineCounts,
    progress: &dyn ProgressReporter,
) -> Result<(), PipelineError> {
    if chunk.is_empty() {
        return Ok(());
    }

    let mut processed = 0u64;
    let mut errors = 0u64;

    for pending in chunk.drain(..) {
        let index = pending.index();
        let line = match pending.wait() {
            Some(result) => {
                if result.field_error {
                    errors += 1;
                }
                result.line
            }
            None => {
                warn!(line = index, "Line worker failed, writing error marker");
                errors += 1;
                LINE_ERROR_SENTINEL.to_string()
            }
        };

        write_line(writer, &line)?;
        processed += 1;
    }

    writer.flush().map_err(PipelineError::WriteOutput)?;

    counts.processed_lines += processed;
    counts.error_count += errors;
    debug!(processed, errors, "Chunk drained");
    progress.report(ProgressEvent::ChunkDrained { processed, errors });

    Ok(())
}

fn write_line<W: Write>(writer: &mut W, line: &str) -> Result<(), PipelineError> {
    writer
        .write_all(line.as_bytes())
        .and_then(|_| writer.write_all(b"\n"))
        .map_err(PipelineError::WriteOutput)
}
