//! Wire parameters of an outbound API request.

use std::io::{Cursor, Read};
use std::sync::{Arc, Mutex};

use crate::types::WikiResult;

/// A single name/value or name/file pair sent with a request.
#[derive(Debug, Clone)]
pub enum HttpQueryParameter {
    Value { name: String, value: String },
    File { name: String, payload: Arc<FilePayload> },
}

impl HttpQueryParameter {
    pub fn value(name: impl Into<String>, value: impl Into<String>) -> Self {
        HttpQueryParameter::Value {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn file(name: impl Into<String>, source: impl Read + Send + 'static) -> Self {
        HttpQueryParameter::File {
            name: name.into(),
            payload: Arc::new(FilePayload::new(source)),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            HttpQueryParameter::Value { name, .. } | HttpQueryParameter::File { name, .. } => name,
        }
    }
}

impl std::fmt::Display for HttpQueryParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpQueryParameter::Value { name, value } => write!(f, "{name}={value}"),
            HttpQueryParameter::File { name, .. } => write!(f, "{name}=<file>"),
        }
    }
}

enum PayloadState {
    Pending(Box<dyn Read + Send>),
    Buffered(Arc<[u8]>),
}

/// File contents read at most once from the caller's source.
///
/// The first access drains the source into an owned buffer and drops the
/// source; every later access, such as a retried request, starts again from
/// the beginning of that buffer.
pub struct FilePayload {
    state: Mutex<PayloadState>,
}

impl FilePayload {
    pub fn new(source: impl Read + Send + 'static) -> Self {
        Self {
            state: Mutex::new(PayloadState::Pending(Box::new(source))),
        }
    }

    /// The full contents, buffering them on first access.
    pub fn contents(&self) -> WikiResult<Arc<[u8]>> {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let bytes: Arc<[u8]> = match &mut *state {
            PayloadState::Buffered(bytes) => return Ok(Arc::clone(bytes)),
            PayloadState::Pending(source) => {
                let mut buffer = Vec::new();
                source.read_to_end(&mut buffer)?;
                tracing::debug!(bytes = buffer.len(), "buffered file payload");
                buffer.into()
            }
        };

        // dropping the pending state releases the caller's source
        *state = PayloadState::Buffered(Arc::clone(&bytes));
        Ok(bytes)
    }

    /// A reader positioned at the start of the buffered contents.
    pub fn reader(&self) -> WikiResult<Cursor<Arc<[u8]>>> {
        Ok(Cursor::new(self.contents()?))
    }

    pub fn is_buffered(&self) -> bool {
        self.state
            .lock()
            .map(|s| matches!(*s, PayloadState::Buffered(_)))
            .unwrap_or(false)
    }
}

impl std::fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePayload")
            .field("buffered", &self.is_buffered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A source that counts how many times it is read from.
    struct CountingReader {
        inner: Cursor<Vec<u8>>,
        reads: Arc<AtomicUsize>,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.read(buf)
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(HttpQueryParameter::value("titles", "A|B").to_string(), "titles=A|B");
        let file = HttpQueryParameter::file("file", Cursor::new(b"data".to_vec()));
        assert_eq!(file.to_string(), "file=<file>");
        assert_eq!(file.name(), "file");
    }

    #[test]
    fn test_payload_reads_source_once() {
        let reads = Arc::new(AtomicUsize::new(0));
        let payload = FilePayload::new(CountingReader {
            inner: Cursor::new(b"hello".to_vec()),
            reads: Arc::clone(&reads),
        });
        assert!(!payload.is_buffered());

        assert_eq!(&*payload.contents().unwrap(), b"hello");
        let after_first = reads.load(Ordering::SeqCst);
        assert!(payload.is_buffered());

        assert_eq!(&*payload.contents().unwrap(), b"hello");
        assert_eq!(reads.load(Ordering::SeqCst), after_first);
    }

    #[test]
    fn test_reader_rewinds() {
        let payload = FilePayload::new(Cursor::new(b"abc".to_vec()));

        let mut first = String::new();
        payload.reader().unwrap().read_to_string(&mut first).unwrap();
        let mut second = String::new();
        payload.reader().unwrap().read_to_string(&mut second).unwrap();

        assert_eq!(first, "abc");
        assert_eq!(second, "abc");
    }

    #[test]
    fn test_cloned_parameter_shares_buffer() {
        let param = HttpQueryParameter::file("file", Cursor::new(b"xyz".to_vec()));
        let copy = param.clone();

        if let (HttpQueryParameter::File { payload: a, .. }, HttpQueryParameter::File { payload: b, .. }) =
            (&param, &copy)
        {
            a.contents().unwrap();
            assert!(b.is_buffered());
        } else {
            panic!("expected file parameters");
        }
    }
}
