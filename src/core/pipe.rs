/*!
 * Bounded in-memory pipe with progress reporting
 *
 * The patcher writes the reconstructed stream into the pipe; the consumer
 * drains it into the output file. The pipe is bounded, so a slow consumer
 * blocks the patch writer, which in turn caps the reorder buffer. Reads
 * publish progress events on a side channel that consumers may ignore.
 */

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};

/// Progress event emitted as reconstructed bytes flow through the pipe
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressReport {
    /// Bytes delivered to the consumer so far
    pub received: u64,

    /// Fraction of the total delivered, in `[0, 1]`
    pub done_percent: f32,

    /// Delivery rate in bytes per second
    pub speed: f32,
}

struct PipeState {
    buffer: VecDeque<u8>,
    writer_closed: bool,
    reader_closed: bool,
}

struct PipeShared {
    state: Mutex<PipeState>,
    readable: Condvar,
    writable: Condvar,
    capacity: usize,
}

/// Producer end handed to the patcher
pub struct PipeWriter {
    shared: Arc<PipeShared>,
}

/// Consumer end feeding the output file
pub struct PipeReader {
    shared: Arc<PipeShared>,
    total: u64,
    received: u64,
    started: Instant,
    reports: Sender<ProgressReport>,
}

/// Create a bounded pipe plus its progress report channel
pub fn pipe_with_report(
    total_bytes: u64,
    capacity: usize,
) -> (PipeReader, PipeWriter, Receiver<ProgressReport>) {
    let shared = Arc::new(PipeShared {
        state: Mutex::new(PipeState {
            buffer: VecDeque::with_capacity(capacity.min(64 * 1024)),
            writer_closed: false,
            reader_closed: false,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
        capacity,
    });
    let (report_tx, report_rx) = bounded(64);

    let reader = PipeReader {
        shared: Arc::clone(&shared),
        total: total_bytes,
        received: 0,
        started: Instant::now(),
        reports: report_tx,
    };
    let writer = PipeWriter { shared };
    (reader, writer, report_rx)
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if state.reader_closed {
                return Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "pipe reader closed",
                ));
            }
            let room = self.shared.capacity - state.buffer.len();
            if room > 0 {
                let n = room.min(buf.len());
                state.buffer.extend(&buf[..n]);
                self.shared.readable.notify_one();
                return Ok(n);
            }
            state = self.shared.writable.wait(state).unwrap();
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.writer_closed = true;
        self.shared.readable.notify_all();
    }
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = {
            let mut state = self.shared.state.lock().unwrap();
            loop {
                if !state.buffer.is_empty() {
                    let n = state.buffer.len().min(buf.len());
                    for slot in buf.iter_mut().take(n) {
                        *slot = state.buffer.pop_front().expect("buffer underflow");
                    }
                    self.shared.writable.notify_one();
                    break n;
                }
                if state.writer_closed {
                    return Ok(0);
                }
                state = self.shared.readable.wait(state).unwrap();
            }
        };

        self.received += n as u64;
        self.publish_report();
        Ok(n)
    }
}

impl PipeReader {
    fn publish_report(&self) {
        let done_percent = if self.total == 0 {
            1.0
        } else {
            (self.received as f64 / self.total as f64) as f32
        };
        let elapsed = self.started.elapsed().as_secs_f64().max(1e-6);
        let report = ProgressReport {
            received: self.received,
            done_percent,
            speed: (self.received as f64 / elapsed) as f32,
        };
        // Dropping a report when the consumer lags keeps memory bounded
        let _ = self.reports.try_send(report);
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock().unwrap();
        state.reader_closed = true;
        self.shared.writable.notify_all();
    }
}
