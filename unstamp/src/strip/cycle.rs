use std::borrow::Cow;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{trace, warn};

use super::matcher::{transform_line, TimestampPattern};
use crate::cancel::CancellationFlag;
use crate::config::EncodingMode;
use crate::errors::{UnstampError, UnstampResult};
use crate::progress::ProgressTracker;
use crate::results::CycleResult;

const BUFFER_CAPACITY: usize = 65536;

/// Decodes one raw line according to the encoding mode
fn decode_line<'a>(
    bytes: &'a [u8],
    path: &Path,
    line_number: u64,
    encoding_mode: EncodingMode,
) -> UnstampResult<Cow<'a, str>> {
    match encoding_mode {
        EncodingMode::FailFast => match std::str::from_utf8(bytes) {
            Ok(valid) => Ok(Cow::Borrowed(valid)),
            Err(_) => {
                // Only rebuild an owned copy on the error path, to get a FromUtf8Error.
                let err = match String::from_utf8(bytes.to_vec()) {
                    Ok(_) => unreachable!("from_utf8 already rejected these bytes"),
                    Err(e) => e,
                };
                Err(UnstampError::encoding_error(path, line_number, err))
            }
        },
        EncodingMode::Lossy => {
            let cow = String::from_utf8_lossy(bytes);
            if let Cow::Owned(_) = cow {
                warn!(
                    "Invalid UTF-8 replaced in {} at line {}",
                    path.display(),
                    line_number
                );
            }
            Ok(cow)
        }
    }
}

/// Appends the next raw line, terminator included, to `buf`.
///
/// A line ends at `\n`, `\r\n` or a lone `\r`. Returns the number of bytes
/// read, 0 at end of input.
fn read_raw_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize> {
    let mut read = 0;
    let mut pending_cr = false;

    loop {
        let (done, used) = {
            let available = match reader.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if available.is_empty() {
                return Ok(read);
            }

            if pending_cr {
                // a `\r` closed the previous chunk; only a following `\n` belongs to it
                if available[0] == b'\n' {
                    buf.push(b'\n');
                    (true, 1)
                } else {
                    (true, 0)
                }
            } else {
                match available.iter().position(|&b| b == b'\n' || b == b'\r') {
                    Some(i) if available[i] == b'\n' => {
                        buf.extend_from_slice(&available[..=i]);
                        (true, i + 1)
                    }
                    Some(i) if i + 1 < available.len() => {
                        let end = if available[i + 1] == b'\n' { i + 2 } else { i + 1 };
                        buf.extend_from_slice(&available[..end]);
                        (true, end)
                    }
                    Some(i) => {
                        buf.extend_from_slice(&available[..=i]);
                        pending_cr = true;
                        (false, i + 1)
                    }
                    None => {
                        buf.extend_from_slice(available);
                        (false, available.len())
                    }
                }
            }
        };

        reader.consume(used);
        read += used;
        if done {
            return Ok(read);
        }
    }
}

/// Splits a raw line into its content and terminator.
///
/// A final line without a terminator gets `\n`, so every written line ends
/// with one.
fn split_terminator(raw: &[u8]) -> (&[u8], &'static [u8]) {
    if let Some(content) = raw.strip_suffix(b"\r\n") {
        (content, b"\r\n")
    } else if let Some(content) = raw.strip_suffix(b"\n") {
        (content, b"\n")
    } else if let Some(content) = raw.strip_suffix(b"\r") {
        (content, b"\r")
    } else {
        (raw, b"\n")
    }
}

/// Counts the lines of `path`, stopping early if cancellation is requested.
///
/// A trailing line without a terminator counts as a line.
pub fn count_lines(path: &Path, cancel: &CancellationFlag) -> UnstampResult<u64> {
    let file = File::open(path).map_err(|e| UnstampError::from_open(path, e))?;
    let mut reader = BufReader::with_capacity(BUFFER_CAPACITY, file);
    let mut buf = Vec::with_capacity(256);
    let mut count = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        buf.clear();
        if read_raw_line(&mut reader, &mut buf)? == 0 {
            break;
        }
        count += 1;
    }

    Ok(count)
}

/// Everything a cycle needs besides its input and output
pub struct CycleContext<'a> {
    pub pattern: &'a TimestampPattern,
    pub encoding_mode: EncodingMode,
    pub cancel: &'a CancellationFlag,
    pub tracker: &'a ProgressTracker<'a>,
    /// Line count from the analysis pass, used only to normalize progress
    pub total_lines: u64,
    /// 1-based index of this cycle
    pub cycle: u32,
    pub max_cycles: u32,
}

/// Streams `reader` through the line transformer into `writer`.
///
/// Returns early, with the counts so far, as soon as cancellation is
/// observed; the output is then incomplete and must be discarded. `source`
/// is only used in error messages.
pub fn strip_lines<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
    source: &Path,
    ctx: &CycleContext<'_>,
) -> UnstampResult<CycleResult> {
    let mut result = CycleResult::default();
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        if read_raw_line(&mut reader, &mut buf)? == 0 {
            break;
        }

        if ctx.cancel.is_cancelled() {
            trace!(
                "Cancellation observed in cycle {} after {} lines",
                ctx.cycle,
                result.processed_lines
            );
            return Ok(result);
        }

        let (content, terminator) = split_terminator(&buf);
        let line = decode_line(
            content,
            source,
            result.processed_lines + 1,
            ctx.encoding_mode,
        )?;
        let stripped = transform_line(&line, ctx.pattern);

        writer.write_all(stripped.cleaned_line.as_bytes())?;
        writer.write_all(terminator)?;

        result.processed_lines += 1;
        if stripped.was_modified {
            result.modified_lines += 1;
        }

        ctx.tracker.report(
            result.processed_lines,
            ctx.total_lines,
            ctx.cycle,
            ctx.max_cycles,
            result.made_changes(),
        );
    }

    writer.flush()?;
    Ok(result)
}

/// Runs one cycle from `input` into a freshly created `output`.
///
/// On a completed (not cancelled) pass the output is flushed and synced to
/// disk, so it is safe to promote over the input.
pub fn run_cycle(input: &Path, output: &Path, ctx: &CycleContext<'_>) -> UnstampResult<CycleResult> {
    let reader = File::open(input).map_err(|e| UnstampError::from_open(input, e))?;
    let writer = File::create(output).map_err(|e| UnstampError::from_open(output, e))?;

    let reader = BufReader::with_capacity(BUFFER_CAPACITY, reader);
    let mut writer = BufWriter::with_capacity(BUFFER_CAPACITY, writer);

    let result = strip_lines(reader, &mut writer, input, ctx)?;

    if !ctx.cancel.is_cancelled() {
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
    }

    Ok(result)
}
