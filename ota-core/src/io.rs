//! Seams between the update manager and the device.
//!
//! The firmware implements these on top of ESP-IDF (HTTP client, OTA
//! partitions, FreeRTOS); tests implement them with recording doubles.

use core::fmt;

/// Failure inside the HTTP transport (connect, TLS, socket).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failure reported by the flashing subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashFault(pub String);

impl fmt::Display for FlashFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub headers: Vec<(&'a str, &'a str)>,
    pub timeout_ms: u64,
    pub follow_redirects: bool,
}

impl<'a> HttpRequest<'a> {
    pub fn get(url: &'a str, timeout_ms: u64) -> Self {
        Self {
            url,
            headers: Vec::new(),
            timeout_ms,
            follow_redirects: false,
        }
    }

    pub fn header(mut self, name: &'a str, value: &'a str) -> Self {
        self.headers.push((name, value));
        self
    }

    pub fn follow_redirects(mut self) -> Self {
        self.follow_redirects = true;
        self
    }
}

/// One HTTP exchange at a time, modelled on a blocking client connection.
pub trait HttpConnection {
    /// Sends a GET and waits for the response head. Returns the status code.
    fn get(&mut self, request: &HttpRequest<'_>) -> Result<u16, TransportError>;

    /// `Content-Length` of the current response, if the server sent one.
    fn content_length(&self) -> Option<i64>;

    /// Reads buffered body bytes. `Ok(0)` means nothing is available right
    /// now, not end of stream; callers that know the length keep polling.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;

    /// Releases the current response.
    fn close(&mut self);

    /// Reads the whole body of a small response (manifests).
    ///
    /// With a `Content-Length` this idles on `Ok(0)` until every byte has
    /// arrived or `timeout_ms` has passed. Without one, the first `Ok(0)`
    /// ends the body.
    fn read_to_end<P: Platform>(
        &mut self,
        platform: &mut P,
        limit: usize,
        timeout_ms: u64,
        idle_ms: u32,
    ) -> Result<Vec<u8>, TransportError> {
        let expected = self
            .content_length()
            .and_then(|len| usize::try_from(len).ok());
        if let Some(expected) = expected {
            if expected > limit {
                return Err(TransportError(format!("body of {} bytes exceeds {} bytes", expected, limit)));
            }
        }

        let mut body = Vec::new();
        let mut buf = [0u8; 512];
        let started = platform.uptime_ms();
        loop {
            if expected.is_some_and(|expected| body.len() >= expected) {
                break;
            }
            let n = self.read(&mut buf)?;
            if n == 0 {
                let Some(expected) = expected else {
                    break;
                };
                if platform.uptime_ms().saturating_sub(started) > timeout_ms {
                    return Err(TransportError(format!(
                        "body timed out after {} of {} bytes",
                        body.len(),
                        expected
                    )));
                }
                platform.idle(idle_ms);
                continue;
            }
            if body.len() + n > limit {
                return Err(TransportError(format!("body exceeds {} bytes", limit)));
            }
            body.extend_from_slice(&buf[..n]);
        }
        Ok(body)
    }
}

/// Spare firmware slot.
pub trait FlashTarget {
    type Update<'a>: FlashUpdate
    where
        Self: 'a;

    /// Bytes available in the update slot.
    fn free_space(&self) -> usize;

    /// Opens a write transaction sized for `size` bytes.
    fn begin(&mut self, size: usize) -> Result<Self::Update<'_>, FlashFault>;
}

/// An open flash transaction. Consumed by `finalize` or `abort`, so an
/// image can only become bootable through `finalize`.
pub trait FlashUpdate {
    /// Returns how many bytes the flash accepted.
    fn write(&mut self, data: &[u8]) -> Result<usize, FlashFault>;

    /// Verifies the image and marks it as the next boot target.
    fn finalize(self) -> Result<(), FlashFault>;

    /// Drops the partial image; the running image stays the boot target.
    fn abort(self);
}

/// Cooperative scheduling hooks of the single device task.
pub trait Platform {
    fn network_connected(&self) -> bool;

    /// Milliseconds since boot.
    fn uptime_ms(&self) -> u64;

    /// Services the watchdog and lets other tasks run.
    fn yield_now(&mut self);

    /// Sleeps briefly when there is nothing to do.
    fn idle(&mut self, ms: u32);

    /// Restarts into the boot partition. Does not return on the device.
    fn restart(&mut self);
}

/// Receives download progress, 0-100. Called synchronously from the
/// write loop, so it must return quickly.
pub trait ProgressSink {
    fn on_progress(&mut self, percent: u8);
}

impl<F: FnMut(u8)> ProgressSink for F {
    fn on_progress(&mut self, percent: u8) {
        self(percent)
    }
}
