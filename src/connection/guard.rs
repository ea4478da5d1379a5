use crate::transport::Abort;

/// Owns a transport stream while the open handshake runs.
///
/// Unless [`disarm`](AbortOnFailure::disarm) hands the stream on, the stream is aborted
/// when the guard goes away. That covers handshake errors, timeouts, and a caller
/// dropping the bootstrap future part way through.
#[derive(Debug)]
pub(crate) struct AbortOnFailure<IO: Abort> {
    stream: Option<IO>,
}

impl<IO: Abort> AbortOnFailure<IO> {
    pub(crate) fn new(stream: IO) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    pub(crate) fn stream_mut(&mut self) -> Option<&mut IO> {
        self.stream.as_mut()
    }

    /// Success: release the stream to the caller without aborting it.
    pub(crate) fn disarm(mut self) -> Option<IO> {
        self.stream.take()
    }

    /// Abort the stream now. Failures are logged, never returned.
    pub(crate) fn abort(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(error) = stream.abort() {
                tracing::warn!("transport abort failed: {error}");
            }
        }
    }
}

impl<IO: Abort> Drop for AbortOnFailure<IO> {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::debug!("open interrupted, aborting transport");
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Debug, Default, Clone)]
    struct Counting(Arc<AtomicUsize>);

    impl Abort for Counting {
        fn abort(&mut self) -> io::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::other("already gone"))
        }

        fn is_aborted(&self) -> bool {
            self.0.load(Ordering::SeqCst) > 0
        }
    }

    #[test]
    fn drop_aborts_once() {
        let counter = Counting::default();
        let mut guard = AbortOnFailure::new(counter.clone());
        guard.abort();
        drop(guard);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn disarm_skips_abort() {
        let counter = Counting::default();
        let guard = AbortOnFailure::new(counter.clone());
        assert!(guard.disarm().is_some());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn plain_drop_aborts() {
        let counter = Counting::default();
        drop(AbortOnFailure::new(counter.clone()));
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
    }
}
