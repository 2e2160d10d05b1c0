//! Streaming firmware download into the spare flash slot.
//!
//! The transfer is an explicit state machine: [`FlashSession::step`] moves at
//! most one chunk from the network into flash and returns, and
//! [`FlashWriter::write`] drives it, checking the deadline before every slice
//! and yielding to the scheduler after it. The outcome is all-or-nothing: the
//! flash transaction is either finalized after every byte arrived and
//! verified, or aborted so the running image stays the boot target.

use sha2::{Digest, Sha256};

use crate::config::{OtaConfig, MAX_CHUNK_SIZE};
use crate::error::ErrorKind;
use crate::io::{FlashTarget, FlashUpdate, HttpConnection, HttpRequest, Platform};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Request sent, waiting for the response head.
    Downloading,
    /// Flash transaction open, bytes streaming in.
    Writing,
    /// All bytes written, integrity check and boot switch in progress.
    Verifying,
}

/// Receives phase changes and progress from the write loop.
pub trait WriteObserver {
    fn on_phase(&mut self, _phase: Phase) {}

    /// Only called when the percentage changed.
    fn on_progress(&mut self, percent: u8);
}

/// What one slice of work did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// `percent` is set when the whole-number percentage moved.
    Wrote { bytes: usize, percent: Option<u8> },
    /// Nothing was buffered on the stream.
    Idle,
    Complete,
}

/// The image to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSource<'a> {
    pub url: &'a str,
    /// Absolute ceiling, checked against the live `Content-Length`.
    pub max_size: usize,
    pub sha256: Option<&'a str>,
}

/// An open flash transaction fed from the network.
pub struct FlashSession<U: FlashUpdate> {
    update: U,
    content_length: usize,
    bytes_written: usize,
    last_percent: Option<u8>,
    chunk_len: usize,
    hasher: Sha256,
}

impl<U: FlashUpdate> FlashSession<U> {
    pub fn new(update: U, content_length: usize, chunk_len: usize) -> Self {
        Self {
            update,
            content_length,
            bytes_written: 0,
            last_percent: None,
            chunk_len: chunk_len.clamp(1, MAX_CHUNK_SIZE),
            hasher: Sha256::new(),
        }
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn is_complete(&self) -> bool {
        self.bytes_written >= self.content_length
    }

    /// Moves at most one chunk from `conn` into flash.
    pub fn step<C: HttpConnection>(&mut self, conn: &mut C) -> Result<Step, ErrorKind> {
        if self.is_complete() {
            return Ok(Step::Complete);
        }

        let mut buf = [0u8; MAX_CHUNK_SIZE];
        let want = self.chunk_len.min(self.content_length - self.bytes_written);
        let read = match conn.read(&mut buf[..want]) {
            Ok(n) => n.min(want),
            Err(e) => {
                // A stalled or broken stream ends in the download timeout
                log::warn!("Stream read failed at {} bytes: {}", self.bytes_written, e);
                0
            }
        };
        if read == 0 {
            return Ok(Step::Idle);
        }

        let chunk = &buf[..read];
        let accepted = self
            .update
            .write(chunk)
            .map_err(|e| ErrorKind::WriteError { reason: e.to_string() })?;
        if accepted != read {
            return Err(ErrorKind::WriteError {
                reason: format!("flash accepted {} of {} bytes", accepted, read),
            });
        }

        self.hasher.update(chunk);
        self.bytes_written += read;

        let percent = (self.bytes_written as u64 * 100 / self.content_length as u64) as u8;
        let changed = if self.last_percent != Some(percent) {
            self.last_percent = Some(percent);
            Some(percent)
        } else {
            None
        };

        Ok(Step::Wrote { bytes: read, percent: changed })
    }

    /// Discards the partial image.
    pub fn abort(self) {
        log::warn!(
            "Aborting flash transaction after {}/{} bytes",
            self.bytes_written,
            self.content_length
        );
        self.update.abort();
    }

    /// Checks the digest (when one is expected) and hands the image to the
    /// flashing subsystem, which verifies it and marks it bootable.
    pub fn finish(self, expected_sha256: Option<&str>) -> Result<(), ErrorKind> {
        let FlashSession { update, bytes_written, content_length, hasher, .. } = self;

        if bytes_written != content_length {
            update.abort();
            return Err(ErrorKind::VerificationFailed {
                reason: format!("incomplete image: {}/{} bytes", bytes_written, content_length),
            });
        }

        if let Some(expected) = expected_sha256 {
            let actual = format!("{:x}", hasher.finalize());
            if !actual.eq_ignore_ascii_case(expected) {
                log::error!("SHA-256 mismatch: expected {}, got {}", expected, actual);
                update.abort();
                return Err(ErrorKind::VerificationFailed {
                    reason: "SHA-256 mismatch".to_string(),
                });
            }
            log::info!("SHA-256 verified: {}", actual);
        }

        update
            .finalize()
            .map_err(|e| ErrorKind::VerificationFailed { reason: e.to_string() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashWriter {
    chunk_len: usize,
    download_timeout_ms: u64,
    idle_delay_ms: u32,
    user_agent: String,
}

impl FlashWriter {
    pub fn new(chunk_len: usize, download_timeout_ms: u64, idle_delay_ms: u32) -> Self {
        Self {
            chunk_len: chunk_len.clamp(1, MAX_CHUNK_SIZE),
            download_timeout_ms,
            idle_delay_ms,
            user_agent: String::new(),
        }
    }

    pub fn from_config(config: &OtaConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            ..Self::new(config.chunk_len(), config.download_timeout_ms(), config.idle_delay_ms)
        }
    }

    /// Downloads `source` into a new flash transaction and finalizes it.
    ///
    /// `Ok` means the new image is verified and selected for the next boot;
    /// restarting is left to the caller. Every `Err` leaves the running
    /// image as the boot target.
    pub fn write<C, F, P, O>(
        &self,
        conn: &mut C,
        flash: &mut F,
        platform: &mut P,
        source: ImageSource<'_>,
        observer: &mut O,
    ) -> Result<(), ErrorKind>
    where
        C: HttpConnection,
        F: FlashTarget,
        P: Platform,
        O: WriteObserver,
    {
        observer.on_phase(Phase::Downloading);
        log::info!("Starting firmware download: {}", source.url);

        let mut request = HttpRequest::get(source.url, self.download_timeout_ms).follow_redirects();
        if !self.user_agent.is_empty() {
            request = request.header("User-Agent", &self.user_agent);
        }

        let status = conn
            .get(&request)
            .map_err(|e| ErrorKind::ConnectionFailed { reason: e.to_string() })?;
        if status != 200 {
            conn.close();
            log::error!("Download failed: HTTP {}", status);
            return Err(ErrorKind::DownloadFailed { code: status });
        }

        let content_length = match conn.content_length() {
            Some(len) if len > 0 => len as u64,
            other => {
                conn.close();
                log::error!("Invalid content length: {:?}", other);
                return Err(ErrorKind::InvalidContentLength);
            }
        };
        log::info!("Firmware size: {} bytes", content_length);

        if content_length > source.max_size as u64 {
            conn.close();
            log::error!("Firmware exceeds {} byte limit", source.max_size);
            return Err(ErrorKind::FirmwareTooLarge);
        }
        let content_length = content_length as usize;

        let update = match flash.begin(content_length) {
            Ok(update) => update,
            Err(e) => {
                conn.close();
                log::error!("Flash begin failed: {}", e);
                return Err(ErrorKind::FlashOpenError { reason: e.to_string() });
            }
        };

        observer.on_phase(Phase::Writing);
        let mut session = FlashSession::new(update, content_length, self.chunk_len);
        let started = platform.uptime_ms();

        while !session.is_complete() {
            if platform.uptime_ms().saturating_sub(started) > self.download_timeout_ms {
                log::error!(
                    "Download timeout after {} ms ({}/{} bytes)",
                    self.download_timeout_ms,
                    session.bytes_written(),
                    content_length
                );
                session.abort();
                conn.close();
                return Err(ErrorKind::DownloadTimeout);
            }

            match session.step(conn) {
                Ok(Step::Wrote { percent: Some(percent), .. }) => {
                    if percent % 10 == 0 {
                        log::info!("Progress: {}%", percent);
                    } else {
                        log::debug!("Progress: {}%", percent);
                    }
                    observer.on_progress(percent);
                }
                Ok(Step::Wrote { percent: None, .. }) | Ok(Step::Complete) => {}
                Ok(Step::Idle) => platform.idle(self.idle_delay_ms),
                Err(e) => {
                    log::error!("{}", e);
                    session.abort();
                    conn.close();
                    return Err(e);
                }
            }

            platform.yield_now();
        }

        conn.close();
        observer.on_phase(Phase::Verifying);
        log::info!("Download complete, verifying image");

        session.finish(source.sha256)?;
        log::info!("Image verified and set as boot target");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{FlashFault, TransportError};

    // Feeds `total` bytes of 0xAB, `per_read` at a time
    struct Stream {
        status: u16,
        length: Option<i64>,
        remaining: usize,
        per_read: usize,
        closed: bool,
    }

    impl Stream {
        fn ok(total: usize, per_read: usize) -> Self {
            Self { status: 200, length: Some(total as i64), remaining: total, per_read, closed: false }
        }
    }

    impl HttpConnection for Stream {
        fn get(&mut self, _request: &HttpRequest<'_>) -> Result<u16, TransportError> {
            Ok(self.status)
        }

        fn content_length(&self) -> Option<i64> {
            self.length
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let n = self.per_read.min(self.remaining).min(buf.len());
            buf[..n].fill(0xAB);
            self.remaining -= n;
            Ok(n)
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[derive(Default)]
    struct Flash {
        written: Vec<u8>,
        short_write: bool,
        finalized: bool,
        aborted: bool,
    }

    struct Txn<'a>(&'a mut Flash);

    impl FlashUpdate for Txn<'_> {
        fn write(&mut self, data: &[u8]) -> Result<usize, FlashFault> {
            if self.0.short_write {
                return Ok(data.len() - 1);
            }
            self.0.written.extend_from_slice(data);
            Ok(data.len())
        }

        fn finalize(self) -> Result<(), FlashFault> {
            self.0.finalized = true;
            Ok(())
        }

        fn abort(self) {
            self.0.aborted = true;
        }
    }

    impl FlashTarget for Flash {
        type Update<'a> = Txn<'a>;

        fn free_space(&self) -> usize {
            1_500_000
        }

        fn begin(&mut self, _size: usize) -> Result<Txn<'_>, FlashFault> {
            Ok(Txn(self))
        }
    }

    #[derive(Default)]
    struct Clock {
        now: u64,
        yields: usize,
    }

    impl Platform for Clock {
        fn network_connected(&self) -> bool {
            true
        }

        fn uptime_ms(&self) -> u64 {
            self.now
        }

        fn yield_now(&mut self) {
            self.yields += 1;
        }

        fn idle(&mut self, ms: u32) {
            self.now += u64::from(ms);
        }

        fn restart(&mut self) {}
    }

    #[derive(Default)]
    struct Recorder {
        phases: Vec<Phase>,
        progress: Vec<u8>,
    }

    impl WriteObserver for Recorder {
        fn on_phase(&mut self, phase: Phase) {
            self.phases.push(phase);
        }

        fn on_progress(&mut self, percent: u8) {
            self.progress.push(percent);
        }
    }

    fn source(max_size: usize) -> ImageSource<'static> {
        ImageSource { url: "https://fw.example/firmware.bin", max_size, sha256: None }
    }

    #[test]
    fn test_successful_transfer_reports_each_percent_once() {
        let writer = FlashWriter::new(1024, 180_000, 10);
        let mut conn = Stream::ok(100_000, 1000);
        let mut flash = Flash::default();
        let mut clock = Clock::default();
        let mut recorder = Recorder::default();

        writer
            .write(&mut conn, &mut flash, &mut clock, source(3_000_000), &mut recorder)
            .unwrap();

        assert_eq!(recorder.progress, (1..=100).collect::<Vec<u8>>());
        assert_eq!(recorder.phases, vec![Phase::Downloading, Phase::Writing, Phase::Verifying]);
        assert_eq!(flash.written.len(), 100_000);
        assert!(flash.finalized);
        assert!(!flash.aborted);
        assert!(conn.closed);
        assert_eq!(clock.yields, 100);
    }

    #[test]
    fn test_non_200_is_download_failed() {
        let writer = FlashWriter::new(1024, 180_000, 10);
        let mut conn = Stream { status: 404, ..Stream::ok(10, 10) };
        let mut flash = Flash::default();
        let result = writer.write(&mut conn, &mut flash, &mut Clock::default(), source(100), &mut Recorder::default());
        assert_eq!(result, Err(ErrorKind::DownloadFailed { code: 404 }));
        assert!(flash.written.is_empty());
    }

    #[test]
    fn test_missing_or_zero_length_is_rejected() {
        let writer = FlashWriter::new(1024, 180_000, 10);
        for length in [None, Some(0), Some(-1)] {
            let mut conn = Stream { length, ..Stream::ok(10, 10) };
            let result = writer.write(
                &mut conn,
                &mut Flash::default(),
                &mut Clock::default(),
                source(100),
                &mut Recorder::default(),
            );
            assert_eq!(result, Err(ErrorKind::InvalidContentLength));
        }
    }

    #[test]
    fn test_live_length_over_ceiling_is_too_large() {
        let writer = FlashWriter::new(1024, 180_000, 10);
        let mut conn = Stream::ok(3_000_001, 1024);
        let mut flash = Flash::default();
        let result = writer.write(&mut conn, &mut flash, &mut Clock::default(), source(3_000_000), &mut Recorder::default());
        assert_eq!(result, Err(ErrorKind::FirmwareTooLarge));
        assert!(flash.written.is_empty());
    }

    #[test]
    fn test_short_flash_write_aborts() {
        let writer = FlashWriter::new(1024, 180_000, 10);
        let mut conn = Stream::ok(5000, 1000);
        let mut flash = Flash { short_write: true, ..Flash::default() };
        let result = writer.write(&mut conn, &mut flash, &mut Clock::default(), source(10_000), &mut Recorder::default());
        assert!(matches!(result, Err(ErrorKind::WriteError { .. })));
        assert!(flash.aborted);
        assert!(!flash.finalized);
    }

    #[test]
    fn test_stalled_stream_times_out_and_aborts() {
        let writer = FlashWriter::new(1024, 1_000, 10);
        let mut conn = Stream { remaining: 2000, ..Stream::ok(5000, 1000) };
        let mut flash = Flash::default();
        let mut clock = Clock::default();
        let result = writer.write(&mut conn, &mut flash, &mut clock, source(10_000), &mut Recorder::default());
        assert_eq!(result, Err(ErrorKind::DownloadTimeout));
        assert!(flash.aborted);
        assert!(!flash.finalized);
        assert!(clock.now > 1_000);
        assert_eq!(flash.written.len(), 2000);
    }

    #[test]
    fn test_digest_mismatch_is_not_finalized() {
        let writer = FlashWriter::new(1024, 180_000, 10);
        let mut conn = Stream::ok(2048, 512);
        let mut flash = Flash::default();
        let source = ImageSource { sha256: Some("00"), ..source(10_000) };
        let result = writer.write(&mut conn, &mut flash, &mut Clock::default(), source, &mut Recorder::default());
        assert!(matches!(result, Err(ErrorKind::VerificationFailed { .. })));
        assert!(flash.aborted);
        assert!(!flash.finalized);
    }

    #[test]
    fn test_matching_digest_finalizes() {
        let expected = format!("{:x}", Sha256::digest(vec![0xABu8; 2048]));
        let writer = FlashWriter::new(1024, 180_000, 10);
        let mut conn = Stream::ok(2048, 512);
        let mut flash = Flash::default();
        let source = ImageSource { sha256: Some(&expected), ..source(10_000) };
        writer
            .write(&mut conn, &mut flash, &mut Clock::default(), source, &mut Recorder::default())
            .unwrap();
        assert!(flash.finalized);
    }

    #[test]
    fn test_session_never_reads_past_content_length() {
        let mut conn = Stream::ok(10_000, 1024);
        let mut flash = Flash::default();
        let mut session = FlashSession::new(Txn(&mut flash), 1500, 1024);
        assert_eq!(session.step(&mut conn).unwrap(), Step::Wrote { bytes: 1024, percent: Some(68) });
        assert_eq!(session.step(&mut conn).unwrap(), Step::Wrote { bytes: 476, percent: Some(100) });
        assert_eq!(session.step(&mut conn).unwrap(), Step::Complete);
        session.finish(None).unwrap();
        assert_eq!(flash.written.len(), 1500);
    }
}
