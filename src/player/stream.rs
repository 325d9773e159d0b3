//! Progressive network source for the decoder.
//!
//! A fetch thread appends the response body to a [`StreamBuffer`] while the
//! decoder reads it through a [`BufferedStream`]. Reads past the buffered
//! end wait for more data, so playback starts as soon as the container
//! header has arrived. Seeking within the file always works; a forward seek
//! past the buffered end waits like a read.
//!
//! The fetch stops early when its load is superseded or when the reader
//! has been dropped.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use symphonia::core::io::MediaSource;

/// How long a blocked read sleeps before checking whether its load is
/// still current.
const READ_WAIT: Duration = Duration::from_millis(100);

/// Size of one network read.
const FETCH_CHUNK: usize = 64 * 1024;

#[derive(Debug, Default)]
struct BufferState {
    data: Vec<u8>,
    complete: bool,
    error: Option<String>,
}

/// Bytes received so far for one load.
pub struct StreamBuffer {
    state: Mutex<BufferState>,
    ready: Condvar,
    content_length: Option<u64>,
    is_current: Box<dyn Fn() -> bool + Send + Sync>,
}

impl StreamBuffer {
    /// `is_current` reports whether the load this buffer belongs to is
    /// still the one being played.
    pub fn new(
        content_length: Option<u64>,
        is_current: impl Fn() -> bool + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(BufferState::default()),
            ready: Condvar::new(),
            content_length,
            is_current: Box::new(is_current),
        })
    }

    /// A reader positioned at the start.
    pub fn reader(self: &Arc<Self>) -> BufferedStream {
        BufferedStream {
            buffer: Arc::clone(self),
            position: 0,
        }
    }

    pub fn buffered(&self) -> usize {
        self.state.lock().data.len()
    }

    fn append(&self, bytes: &[u8]) {
        self.state.lock().data.extend_from_slice(bytes);
        self.ready.notify_all();
    }

    fn finish(&self, result: Result<(), String>) {
        {
            let mut state = self.state.lock();
            match result {
                Ok(()) => state.complete = true,
                Err(message) => state.error = Some(message),
            }
        }
        self.ready.notify_all();
    }

    /// Total size when the server said or the transfer has finished.
    fn total_len(&self) -> Option<u64> {
        let state = self.state.lock();
        if state.complete {
            Some(state.data.len() as u64)
        } else {
            self.content_length
        }
    }
}

/// Copy `body` into `buffer` until it ends, fails or is no longer wanted.
pub fn fill(buffer: &Arc<StreamBuffer>, mut body: impl Read) {
    let mut chunk = vec![0u8; FETCH_CHUNK];
    loop {
        // Only this function holds a reference: the reader is gone.
        if Arc::strong_count(buffer) == 1 {
            tracing::debug!(target: "playback", bytes = buffer.buffered(), "Reader dropped, stopping fetch");
            buffer.finish(Err("reader dropped".to_string()));
            return;
        }
        if !(buffer.is_current)() {
            tracing::debug!(target: "playback", bytes = buffer.buffered(), "Load superseded, stopping fetch");
            buffer.finish(Err("load superseded".to_string()));
            return;
        }

        match body.read(&mut chunk) {
            Ok(0) => {
                tracing::debug!(target: "playback", bytes = buffer.buffered(), "Source fetched");
                buffer.finish(Ok(()));
                return;
            }
            Ok(n) => buffer.append(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                tracing::warn!(target: "playback", error = %e, "Source fetch failed");
                buffer.finish(Err(e.to_string()));
                return;
            }
        }
    }
}

/// Read/seek view of a [`StreamBuffer`].
pub struct BufferedStream {
    buffer: Arc<StreamBuffer>,
    position: u64,
}

impl Read for BufferedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let mut state = self.buffer.state.lock();
        loop {
            let len = state.data.len() as u64;
            if self.position < len {
                let start = self.position as usize;
                let n = buf.len().min(state.data.len() - start);
                buf[..n].copy_from_slice(&state.data[start..start + n]);
                self.position += n as u64;
                return Ok(n);
            }
            if let Some(message) = &state.error {
                return Err(io::Error::other(message.clone()));
            }
            if state.complete {
                return Ok(0);
            }
            if !(self.buffer.is_current)() {
                return Err(io::Error::new(io::ErrorKind::ConnectionAborted, "load superseded"));
            }
            self.buffer.ready.wait_for(&mut state, READ_WAIT);
        }
    }
}

impl Seek for BufferedStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let total = self.buffer.total_len().ok_or_else(|| {
                    io::Error::new(io::ErrorKind::Unsupported, "stream length unknown")
                })?;
                total.checked_add_signed(delta)
            }
        };
        let target = target.ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
        })?;
        self.position = target;
        Ok(target)
    }
}

impl MediaSource for BufferedStream {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.buffer.total_len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use super::*;

    /// Yields its chunks one read at a time with a pause in between.
    struct SlowBody {
        chunks: Vec<Vec<u8>>,
        pause: Duration,
    }

    impl Read for SlowBody {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.chunks.is_empty() {
                return Ok(0);
            }
            thread::sleep(self.pause);
            let chunk = self.chunks.remove(0);
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    fn spawn_fill(buffer: &Arc<StreamBuffer>, body: impl Read + Send + 'static) -> thread::JoinHandle<()> {
        let buffer = Arc::clone(buffer);
        thread::spawn(move || fill(&buffer, body))
    }

    #[test]
    fn test_reads_wait_for_data() {
        let buffer = StreamBuffer::new(Some(6), || true);
        let mut reader = buffer.reader();
        let fetch = spawn_fill(
            &buffer,
            SlowBody {
                chunks: vec![b"abc".to_vec(), b"def".to_vec()],
                pause: Duration::from_millis(20),
            },
        );

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        fetch.join().unwrap();

        assert_eq!(out, b"abcdef");
        assert_eq!(reader.byte_len(), Some(6));
    }

    #[test]
    fn test_seek_back_and_from_end() {
        let buffer = StreamBuffer::new(None, || true);
        let mut reader = buffer.reader();
        spawn_fill(&buffer, io::Cursor::new(b"0123456789".to_vec()))
            .join()
            .unwrap();

        let mut two = [0u8; 2];
        reader.seek(SeekFrom::Start(8)).unwrap();
        reader.read_exact(&mut two).unwrap();
        assert_eq!(&two, b"89");

        reader.seek(SeekFrom::Current(-6)).unwrap();
        reader.read_exact(&mut two).unwrap();
        assert_eq!(&two, b"45");

        assert_eq!(reader.seek(SeekFrom::End(-1)).unwrap(), 9);
        assert!(reader.seek(SeekFrom::Current(-20)).is_err());
    }

    #[test]
    fn test_fetch_error_reaches_reader() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }

        let buffer = StreamBuffer::new(None, || true);
        let mut reader = buffer.reader();
        spawn_fill(&buffer, Broken).join().unwrap();

        let mut byte = [0u8; 1];
        assert!(reader.read(&mut byte).is_err());
    }

    #[test]
    fn test_superseded_load_stops_fetch_and_reader() {
        let current = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&current);
        let buffer = StreamBuffer::new(None, move || flag.load(Ordering::SeqCst));
        let mut reader = buffer.reader();
        let fetch = spawn_fill(&buffer, io::repeat(7).take(u64::MAX));

        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte).unwrap();
        current.store(false, Ordering::SeqCst);
        fetch.join().unwrap();

        let mut rest = Vec::new();
        assert!(reader.read_to_end(&mut rest).is_err());
    }

    #[test]
    fn test_dropped_reader_stops_fetch() {
        let buffer = StreamBuffer::new(None, || true);
        let reader = buffer.reader();
        let fetch = spawn_fill(&buffer, io::repeat(0).take(u64::MAX));

        drop(reader);
        drop(buffer);
        // Returns only because the reader is gone.
        fetch.join().unwrap();
    }
}
