//! Host implementations of the update seams: reqwest for HTTP, a local
//! file standing in for the spare flash slot, and a wall-clock platform.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ota_core::io::{FlashFault, FlashTarget, FlashUpdate, HttpConnection, HttpRequest, Platform, TransportError};
use reqwest::blocking::{Client, Response};
use reqwest::redirect::Policy;

#[derive(Default)]
pub struct ReqwestConnection {
    response: Option<Response>,
}

impl HttpConnection for ReqwestConnection {
    fn get(&mut self, request: &HttpRequest<'_>) -> Result<u16, TransportError> {
        self.close();

        let client = Client::builder()
            .timeout(Duration::from_millis(request.timeout_ms))
            .redirect(if request.follow_redirects { Policy::limited(10) } else { Policy::none() })
            .build()
            .map_err(|e| TransportError(e.to_string()))?;

        let mut builder = client.get(request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, *value);
        }

        let response = builder.send().map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        log::debug!("GET {} -> {}", request.url, status);
        self.response = Some(response);
        Ok(status)
    }

    fn content_length(&self) -> Option<i64> {
        self.response
            .as_ref()?
            .content_length()
            .and_then(|len| i64::try_from(len).ok())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.response.as_mut() {
            Some(response) => response.read(buf).map_err(|e| TransportError(e.to_string())),
            None => Ok(0),
        }
    }

    fn close(&mut self) {
        self.response = None;
    }
}

/// Writes the image to `<path>.part` and renames it into place on finalize.
pub struct FileSlot {
    path: PathBuf,
    capacity: usize,
}

impl FileSlot {
    pub fn new(path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self { path: path.into(), capacity }
    }

    fn part_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".part");
        PathBuf::from(name)
    }
}

impl FlashTarget for FileSlot {
    type Update<'a> = FileUpdate<'a>;

    fn free_space(&self) -> usize {
        self.capacity
    }

    fn begin(&mut self, size: usize) -> Result<FileUpdate<'_>, FlashFault> {
        if size > self.capacity {
            return Err(FlashFault(format!("{} bytes do not fit in {} byte slot", size, self.capacity)));
        }
        let part = self.part_path();
        let file = File::create(&part).map_err(|e| FlashFault(format!("{}: {}", part.display(), e)))?;
        Ok(FileUpdate { target: &self.path, part, file })
    }
}

pub struct FileUpdate<'a> {
    target: &'a Path,
    part: PathBuf,
    file: File,
}

impl FlashUpdate for FileUpdate<'_> {
    fn write(&mut self, data: &[u8]) -> Result<usize, FlashFault> {
        self.file.write_all(data).map_err(|e| FlashFault(e.to_string()))?;
        Ok(data.len())
    }

    fn finalize(mut self) -> Result<(), FlashFault> {
        self.file.flush().map_err(|e| FlashFault(e.to_string()))?;
        drop(self.file);
        fs::rename(&self.part, self.target).map_err(|e| FlashFault(e.to_string()))
    }

    fn abort(self) {
        drop(self.file);
        if let Err(e) = fs::remove_file(&self.part) {
            log::warn!("Could not remove {}: {}", self.part.display(), e);
        }
    }
}

pub struct HostPlatform {
    started: Instant,
    restart_requested: bool,
}

impl HostPlatform {
    pub fn new() -> Self {
        Self { started: Instant::now(), restart_requested: false }
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }
}

impl Default for HostPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for HostPlatform {
    fn network_connected(&self) -> bool {
        true
    }

    fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn yield_now(&mut self) {}

    fn idle(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }

    fn restart(&mut self) {
        self.restart_requested = true;
    }
}
