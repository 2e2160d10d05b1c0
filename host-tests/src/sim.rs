//! Simulated device collaborators for host-side update scenarios

use std::collections::HashMap;

use ota_core::io::{FlashFault, FlashTarget, FlashUpdate, HttpConnection, HttpRequest, Platform, TransportError};

/// One canned response.
#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub body: Vec<u8>,
    /// Overrides the advertised `Content-Length` (defaults to the body size).
    pub content_length: Option<Option<i64>>,
    /// Bytes handed out per read.
    pub per_read: usize,
    /// Stop delivering bytes after this many have been read.
    pub stall_after: Option<usize>,
    /// Empty reads (`Ok(0)`) served after every non-empty one.
    pub gap_reads: usize,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_length: None,
            per_read: usize::MAX,
            stall_after: None,
            gap_reads: 0,
        }
    }

    pub fn status(status: u16) -> Self {
        Self { status, ..Self::ok(Vec::new()) }
    }

    pub fn image(len: usize, per_read: usize) -> Self {
        Self { per_read, ..Self::ok(vec![0xE9; len]) }
    }

    /// Body arrives `per_read` bytes at a time with `gap_reads` empty reads in between.
    pub fn bursty(body: impl Into<Vec<u8>>, per_read: usize, gap_reads: usize) -> Self {
        Self { per_read, gap_reads, ..Self::ok(body) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub follow_redirects: bool,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP server keyed by URL. Unknown URLs answer 404.
#[derive(Debug, Default)]
pub struct SimulatedServer {
    routes: HashMap<String, Route>,
    pub requests: Vec<RecordedRequest>,
    open: Option<OpenResponse>,
}

#[derive(Debug)]
struct OpenResponse {
    route: Route,
    pos: usize,
    pending_gaps: usize,
}

impl SimulatedServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, route: Route) -> Self {
        self.routes.insert(url.to_string(), route);
        self
    }

    pub fn requested(&self, url: &str) -> bool {
        self.requests.iter().any(|r| r.url == url)
    }

    /// Replaces the response for `url`, e.g. between two attempts.
    pub fn set_route(&mut self, url: &str, route: Route) {
        self.routes.insert(url.to_string(), route);
    }
}

impl HttpConnection for SimulatedServer {
    fn get(&mut self, request: &HttpRequest<'_>) -> Result<u16, TransportError> {
        self.requests.push(RecordedRequest {
            url: request.url.to_string(),
            headers: request
                .headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_string()))
                .collect(),
            follow_redirects: request.follow_redirects,
        });

        let route = self
            .routes
            .get(request.url)
            .cloned()
            .unwrap_or_else(|| Route::status(404));
        let status = route.status;
        self.open = Some(OpenResponse { route, pos: 0, pending_gaps: 0 });
        Ok(status)
    }

    fn content_length(&self) -> Option<i64> {
        let route = &self.open.as_ref()?.route;
        match route.content_length {
            Some(advertised) => advertised,
            None => Some(route.body.len() as i64),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let Some(open) = self.open.as_mut() else {
            return Ok(0);
        };
        if open.pending_gaps > 0 {
            open.pending_gaps -= 1;
            return Ok(0);
        }
        let route = &open.route;
        let end = route.stall_after.unwrap_or(usize::MAX).min(route.body.len());
        let n = buf.len().min(route.per_read).min(end.saturating_sub(open.pos));
        buf[..n].copy_from_slice(&route.body[open.pos..open.pos + n]);
        open.pos += n;
        if n > 0 {
            open.pending_gaps = route.gap_reads;
        }
        Ok(n)
    }

    fn close(&mut self) {
        self.open = None;
    }
}

/// Spare flash slot that records what happened to it.
#[derive(Debug)]
pub struct SimulatedFlash {
    pub free_space: usize,
    pub fail_begin: Option<String>,
    pub fail_finalize: Option<String>,
    pub begins: usize,
    pub written: usize,
    pub aborted: bool,
    /// Set only by a successful finalize.
    pub boot_candidate: bool,
}

impl SimulatedFlash {
    pub fn new(free_space: usize) -> Self {
        Self {
            free_space,
            fail_begin: None,
            fail_finalize: None,
            begins: 0,
            written: 0,
            aborted: false,
            boot_candidate: false,
        }
    }
}

pub struct SimulatedUpdate<'a> {
    flash: &'a mut SimulatedFlash,
    size: usize,
}

impl FlashUpdate for SimulatedUpdate<'_> {
    fn write(&mut self, data: &[u8]) -> Result<usize, FlashFault> {
        if self.flash.written + data.len() > self.size {
            return Err(FlashFault("write past end of image".to_string()));
        }
        self.flash.written += data.len();
        Ok(data.len())
    }

    fn finalize(self) -> Result<(), FlashFault> {
        if let Some(reason) = self.flash.fail_finalize.clone() {
            return Err(FlashFault(reason));
        }
        self.flash.boot_candidate = true;
        Ok(())
    }

    fn abort(self) {
        self.flash.aborted = true;
    }
}

impl FlashTarget for SimulatedFlash {
    type Update<'a> = SimulatedUpdate<'a>;

    fn free_space(&self) -> usize {
        self.free_space
    }

    fn begin(&mut self, size: usize) -> Result<SimulatedUpdate<'_>, FlashFault> {
        if let Some(reason) = self.fail_begin.clone() {
            return Err(FlashFault(reason));
        }
        self.begins += 1;
        self.written = 0;
        self.aborted = false;
        Ok(SimulatedUpdate { flash: self, size })
    }
}

/// Clock that only moves when the code under test idles.
#[derive(Debug, Default)]
pub struct SimulatedPlatform {
    pub offline: bool,
    pub now_ms: u64,
    pub yields: usize,
    pub restarts: usize,
}

impl SimulatedPlatform {
    pub fn online() -> Self {
        Self::default()
    }
}

impl Platform for SimulatedPlatform {
    fn network_connected(&self) -> bool {
        !self.offline
    }

    fn uptime_ms(&self) -> u64 {
        self.now_ms
    }

    fn yield_now(&mut self) {
        self.yields += 1;
    }

    fn idle(&mut self, ms: u32) {
        self.now_ms += u64::from(ms);
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }
}
