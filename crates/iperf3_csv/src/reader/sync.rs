use std::io::{self, Read};

const CHUNK_SIZE_BYTES: usize = 8192;

/// One physical line of input, or the reason it could not be delivered.
#[derive(Debug)]
pub enum BoundedLine {
    Line {
        line_number: usize,
        /// Line content without the trailing `\n`.
        bytes: Vec<u8>,
        /// `false` only for a final line cut off by end of input.
        terminated: bool,
    },
    LineTooLong {
        line_number: usize,
        observed_bytes: usize,
        max_line_bytes: usize,
        terminated: bool,
    },
    IoError {
        line_number: usize,
        source: io::Error,
    },
}

/// Splits a byte stream into `\n`-terminated lines without ever holding more
/// than `max_line_bytes` of a single line in memory.
///
/// Reads are issued in fixed-size chunks and each line is handed out as soon
/// as its terminator is seen, so a live producer is consumed line by line.
pub struct SyncBoundedLineReader<R: Read> {
    reader: R,
    max_line_bytes: usize,
    buffer: Box<[u8; CHUNK_SIZE_BYTES]>,
    buffer_pos: usize,
    buffer_len: usize,
    current_line: Vec<u8>,
    observed_bytes: usize,
    discard_mode: bool,
    line_number: usize,
    done: bool,
}

impl<R: Read> SyncBoundedLineReader<R> {
    pub fn new(reader: R, max_line_bytes: usize) -> Self {
        Self {
            reader,
            max_line_bytes,
            buffer: Box::new([0u8; CHUNK_SIZE_BYTES]),
            buffer_pos: 0,
            buffer_len: 0,
            current_line: Vec::new(),
            observed_bytes: 0,
            discard_mode: false,
            line_number: 0,
            done: false,
        }
    }

    fn fill_buffer(&mut self) -> io::Result<usize> {
        self.buffer_pos = 0;
        loop {
            match self.reader.read(&mut self.buffer[..]) {
                Ok(n) => {
                    self.buffer_len = n;
                    return Ok(n);
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.buffer_len = 0;
                    return Err(err);
                }
            }
        }
    }

    fn finish_line(&mut self, terminated: bool) -> BoundedLine {
        self.line_number += 1;
        let line_number = self.line_number;

        let line = if self.discard_mode {
            BoundedLine::LineTooLong {
                line_number,
                observed_bytes: self.observed_bytes,
                max_line_bytes: self.max_line_bytes,
                terminated,
            }
        } else {
            BoundedLine::Line {
                line_number,
                bytes: std::mem::take(&mut self.current_line),
                terminated,
            }
        };
        self.reset_line_state();
        line
    }

    fn reset_line_state(&mut self) {
        self.current_line.clear();
        self.observed_bytes = 0;
        self.discard_mode = false;
    }

    fn observe_bytes(&mut self, additional: usize) {
        self.observed_bytes = self.observed_bytes.saturating_add(additional);
        if self.observed_bytes > self.max_line_bytes && !self.discard_mode {
            self.discard_mode = true;
            self.current_line = Vec::new();
        }
    }
}

impl<R: Read> Iterator for SyncBoundedLineReader<R> {
    type Item = BoundedLine;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if self.buffer_pos >= self.buffer_len {
                match self.fill_buffer() {
                    Ok(0) => {
                        self.done = true;
                        if self.discard_mode || !self.current_line.is_empty() {
                            return Some(self.finish_line(false));
                        }
                        return None;
                    }
                    Ok(_) => {}
                    Err(source) => {
                        self.done = true;
                        return Some(BoundedLine::IoError {
                            line_number: self.line_number + 1,
                            source,
                        });
                    }
                }
            }

            let available = &self.buffer[self.buffer_pos..self.buffer_len];
            let newline_idx = available.iter().position(|b| *b == b'\n');
            let take = newline_idx.unwrap_or(available.len());

            self.observe_bytes(take);
            if !self.discard_mode {
                let segment = &self.buffer[self.buffer_pos..self.buffer_pos + take];
                self.current_line.extend_from_slice(segment);
            }

            match newline_idx {
                Some(idx) => {
                    self.buffer_pos += idx + 1;
                    return Some(self.finish_line(true));
                }
                None => self.buffer_pos = self.buffer_len,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingReader {
        served: bool,
    }

    impl Read for FailingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if !self.served {
                self.served = true;
                buf[..3].copy_from_slice(b"ok\n");
                return Ok(3);
            }
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))
        }
    }

    #[test]
    fn oversized_line_is_discarded_and_iteration_continues() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"ok\n");
        bytes.extend_from_slice(&vec![b'a'; 50]);
        bytes.extend_from_slice(b"\nnext\n");

        let reader = SyncBoundedLineReader::new(std::io::Cursor::new(bytes), 16);
        let lines: Vec<_> = reader.collect();

        assert!(matches!(lines[0], BoundedLine::Line { .. }));
        assert!(matches!(
            lines[1],
            BoundedLine::LineTooLong {
                line_number: 2,
                observed_bytes: 50,
                ..
            }
        ));
        assert!(matches!(lines[2], BoundedLine::Line { line_number: 3, .. }));
    }

    #[test]
    fn final_line_without_newline_is_reported_unterminated() {
        let reader = SyncBoundedLineReader::new(std::io::Cursor::new(b"{\r\n}".to_vec()), 64);
        let lines: Vec<_> = reader.collect();

        assert_eq!(lines.len(), 2);
        match &lines[0] {
            BoundedLine::Line {
                bytes, terminated, ..
            } => {
                assert_eq!(bytes, b"{\r");
                assert!(*terminated);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &lines[1] {
            BoundedLine::Line {
                bytes, terminated, ..
            } => {
                assert_eq!(bytes, b"}");
                assert!(!*terminated);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn read_failure_ends_iteration_with_io_error() {
        let mut reader = SyncBoundedLineReader::new(FailingReader { served: false }, 64);

        assert!(matches!(reader.next(), Some(BoundedLine::Line { line_number: 1, .. })));
        match reader.next() {
            Some(BoundedLine::IoError {
                line_number,
                source,
            }) => {
                assert_eq!(line_number, 2);
                assert_eq!(source.kind(), io::ErrorKind::BrokenPipe);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(reader.next().is_none());
    }

    #[test]
    fn lines_spanning_chunk_boundaries_are_joined() {
        let long = "x".repeat(CHUNK_SIZE_BYTES + 10);
        let input = format!("{long}\nshort\n");
        let reader = SyncBoundedLineReader::new(std::io::Cursor::new(input.into_bytes()), 1 << 20);
        let lines: Vec<_> = reader.collect();

        match &lines[0] {
            BoundedLine::Line { bytes, .. } => assert_eq!(bytes.len(), CHUNK_SIZE_BYTES + 10),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(lines[1], BoundedLine::Line { line_number: 2, .. }));
    }
}
