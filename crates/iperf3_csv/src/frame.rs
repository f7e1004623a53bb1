use std::io::Read;

use tracing::debug;

use crate::config::IngestLimits;
use crate::error::{ConvertError, FrameError};
use crate::reader::{BoundedLine, SyncBoundedLineReader};

/// The text of one top-level JSON object, from its opening `{` line to its
/// closing `}` line.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawFrame(String);

impl RawFrame {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RawFrame {
    fn from(text: String) -> Self {
        Self(text)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FrameRecord {
    /// Line number of the opening brace.
    pub first_line: usize,
    /// Line number of the closing brace.
    pub last_line: usize,
    pub outcome: Result<RawFrame, FrameError>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Marker {
    Open,
    Close,
}

enum FrameState {
    Outside,
    Inside {
        first_line: usize,
        text: String,
        poisoned: Option<FrameError>,
    },
}

/// Reassembles brace-delimited objects out of a line stream.
///
/// Framing only looks at newline-terminated lines holding a `{` or `}` in
/// the first column and nothing after it but whitespace (so `\r\n` endings
/// work). Indented braces belong to nested values and never open or close a
/// frame, so the producer must print the outer braces unindented on lines of
/// their own.
/// Lines outside a frame are dropped. A second `{` line restarts the frame,
/// and a frame still open at end of input is dropped without being reported.
pub struct FrameExtractor<R: Read> {
    lines: SyncBoundedLineReader<R>,
    limits: IngestLimits,
    state: FrameState,
    finished: bool,
}

impl<R: Read> FrameExtractor<R> {
    pub fn new(reader: R, limits: IngestLimits) -> Self {
        Self {
            lines: SyncBoundedLineReader::new(reader, limits.max_line_bytes),
            limits,
            state: FrameState::Outside,
            finished: false,
        }
    }

    #[cfg(test)]
    fn is_inside_frame(&self) -> bool {
        matches!(self.state, FrameState::Inside { .. })
    }

    fn open(&mut self, line_number: usize) {
        if let FrameState::Inside { first_line, .. } = self.state {
            debug!(
                first_line,
                restart_line = line_number,
                "dropping unterminated frame restarted by a new opening brace"
            );
        }
        self.state = FrameState::Inside {
            first_line: line_number,
            text: String::from("{"),
            poisoned: None,
        };
    }

    fn close(&mut self, line_number: usize) -> Option<FrameRecord> {
        let FrameState::Inside {
            first_line,
            mut text,
            poisoned,
        } = std::mem::replace(&mut self.state, FrameState::Outside)
        else {
            return None;
        };

        let outcome = match poisoned {
            Some(err) => Err(err),
            None => {
                text.push('}');
                Ok(RawFrame(text))
            }
        };
        debug!(first_line, last_line = line_number, "frame completed");
        Some(FrameRecord {
            first_line,
            last_line: line_number,
            outcome,
        })
    }

    fn poison(&mut self, err: FrameError) {
        if let FrameState::Inside { text, poisoned, .. } = &mut self.state {
            if poisoned.is_none() {
                *poisoned = Some(err);
                *text = String::new();
            }
        }
    }

    fn append(&mut self, line_number: usize, bytes: Vec<u8>) {
        let max_frame_bytes = self.limits.max_frame_bytes;
        let FrameState::Inside { text, poisoned, .. } = &mut self.state else {
            return;
        };
        if poisoned.is_some() {
            return;
        }

        let failure = if text.len() + bytes.len() + 1 > max_frame_bytes {
            FrameError::FrameTooLarge { max_frame_bytes }
        } else {
            match String::from_utf8(bytes) {
                Ok(line) => {
                    text.push_str(&line);
                    text.push('\n');
                    return;
                }
                Err(_) => FrameError::InvalidUtf8 { line_number },
            }
        };
        *poisoned = Some(failure);
        *text = String::new();
    }
}

fn classify(bytes: &[u8], terminated: bool) -> Option<Marker> {
    if !terminated {
        return None;
    }
    match trim_ascii_end(bytes) {
        b"{" => Some(Marker::Open),
        b"}" => Some(Marker::Close),
        _ => None,
    }
}

// Leading whitespace is kept: an indented brace belongs to a nested value.
fn trim_ascii_end(mut bytes: &[u8]) -> &[u8] {
    while let [rest @ .., last] = bytes {
        if !last.is_ascii_whitespace() {
            break;
        }
        bytes = rest;
    }
    bytes
}

impl<R: Read> Iterator for FrameExtractor<R> {
    type Item = Result<FrameRecord, ConvertError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let Some(next) = self.lines.next() else {
                self.finished = true;
                if let FrameState::Inside { first_line, .. } = self.state {
                    debug!(first_line, "discarding unterminated frame at end of input");
                    self.state = FrameState::Outside;
                }
                return None;
            };

            match next {
                BoundedLine::IoError {
                    line_number,
                    source,
                } => {
                    self.finished = true;
                    return Some(Err(ConvertError::Source {
                        line_number,
                        source,
                    }));
                }
                BoundedLine::LineTooLong {
                    line_number,
                    observed_bytes,
                    max_line_bytes,
                    ..
                } => self.poison(FrameError::LineTooLong {
                    line_number,
                    observed_bytes,
                    max_line_bytes,
                }),
                BoundedLine::Line {
                    line_number,
                    bytes,
                    terminated,
                } => match classify(&bytes, terminated) {
                    Some(Marker::Open) => self.open(line_number),
                    Some(Marker::Close) => {
                        if let Some(record) = self.close(line_number) {
                            return Some(Ok(record));
                        }
                    }
                    None => self.append(line_number, bytes),
                },
            }
        }
    }
}
