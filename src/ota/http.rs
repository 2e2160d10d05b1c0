// HTTP(S) transport for the update manager on top of the ESP-IDF client

use std::time::Duration;

use esp_idf_svc::http::client::{Configuration as HttpConfig, EspHttpConnection, FollowRedirectsPolicy};
use embedded_svc::http::Method;
use ota_core::io::{HttpConnection, HttpRequest, TransportError};

const BUFFER_SIZE: usize = 4096;

/// Opens a fresh connection per request, since timeout and redirect policy
/// are fixed when the ESP-IDF client is created.
pub struct EspHttp {
    connection: Option<EspHttpConnection>,
}

impl EspHttp {
    pub fn new() -> Self {
        Self { connection: None }
    }
}

impl HttpConnection for EspHttp {
    fn get(&mut self, request: &HttpRequest<'_>) -> Result<u16, TransportError> {
        self.close();

        let config = HttpConfig {
            buffer_size: Some(BUFFER_SIZE),
            buffer_size_tx: Some(1024),
            timeout: Some(Duration::from_millis(request.timeout_ms)),
            follow_redirects_policy: if request.follow_redirects {
                FollowRedirectsPolicy::FollowAll
            } else {
                FollowRedirectsPolicy::FollowNone
            },
            crt_bundle_attach: Some(esp_idf_sys::esp_crt_bundle_attach),
            ..Default::default()
        };

        let mut connection = EspHttpConnection::new(&config).map_err(esp_error)?;
        connection
            .initiate_request(Method::Get, request.url, &request.headers)
            .map_err(esp_error)?;
        connection.initiate_response().map_err(esp_error)?;

        let status = connection.status();
        log::debug!("GET {} -> {}", request.url, status);
        self.connection = Some(connection);
        Ok(status)
    }

    fn content_length(&self) -> Option<i64> {
        self.connection
            .as_ref()?
            .header("Content-Length")
            .and_then(|value| value.trim().parse().ok())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.connection.as_mut() {
            Some(connection) => connection.read(buf).map_err(esp_error),
            None => Ok(0),
        }
    }

    fn close(&mut self) {
        self.connection = None;
    }
}

fn esp_error(e: esp_idf_sys::EspError) -> TransportError {
    TransportError(format!("{:?}", e))
}
