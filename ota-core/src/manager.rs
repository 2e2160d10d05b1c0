//! Update Manager - the public state machine for firmware updates.
//!
//! Owns the collaborators (HTTP connection, flash slot, platform hooks) and
//! the single [`UpdateStatus`]. Runs synchronously inside the device loop;
//! other duties are suspended while an update is being written.
//!
//! ```text
//! Idle -> CheckingManifest -> UpToDate | UpdateAvailable
//! UpdateAvailable -> Downloading -> Writing -> Verifying -> Rebooting
//! any non-terminal state -> Failed(e) -> Idle
//! ```

use core::fmt;

use crate::config::OtaConfig;
use crate::error::ErrorKind;
use crate::io::{FlashTarget, HttpConnection, Platform, ProgressSink};
use crate::manifest::{ManifestClient, UpdateDescriptor};
use crate::preflight::PreflightValidator;
use crate::version;
use crate::writer::{FlashWriter, ImageSource, Phase, WriteObserver};

/// Delay before restarting so the last log lines reach the console.
const RESTART_DELAY_MS: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UpdateState {
    #[default]
    Idle,
    CheckingManifest,
    UpToDate,
    UpdateAvailable,
    Downloading,
    Writing,
    Verifying,
    Rebooting,
    Failed(ErrorKind),
}

impl fmt::Display for UpdateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateState::Idle => write!(f, "Idle"),
            UpdateState::CheckingManifest => write!(f, "Checking"),
            UpdateState::UpToDate => write!(f, "Up to date"),
            UpdateState::UpdateAvailable => write!(f, "Update available"),
            UpdateState::Downloading => write!(f, "Downloading"),
            UpdateState::Writing => write!(f, "Writing"),
            UpdateState::Verifying => write!(f, "Verifying"),
            UpdateState::Rebooting => write!(f, "Rebooting"),
            UpdateState::Failed(e) => write!(f, "Failed: {}", e),
        }
    }
}

/// Read-only snapshot handed to the UI and messaging layers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateStatus {
    state: UpdateState,
    last_error: Option<ErrorKind>,
    descriptor: Option<UpdateDescriptor>,
    progress_percent: u8,
}

impl UpdateStatus {
    pub fn state(&self) -> &UpdateState {
        &self.state
    }

    pub fn last_error(&self) -> Option<&ErrorKind> {
        self.last_error.as_ref()
    }

    pub fn descriptor(&self) -> Option<&UpdateDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    fn transition(&mut self, next: UpdateState) {
        log::debug!("Update state: {} -> {}", self.state, next);
        self.state = next;
    }
}

/// Mirrors writer phases and progress into the status, then forwards
/// progress to the registered sink.
struct StatusObserver<'a> {
    status: &'a mut UpdateStatus,
    sink: Option<&'a mut (dyn ProgressSink + 'static)>,
}

impl WriteObserver for StatusObserver<'_> {
    fn on_phase(&mut self, phase: Phase) {
        let next = match phase {
            Phase::Downloading => UpdateState::Downloading,
            Phase::Writing => UpdateState::Writing,
            Phase::Verifying => UpdateState::Verifying,
        };
        self.status.transition(next);
    }

    fn on_progress(&mut self, percent: u8) {
        let percent = percent.min(100).max(self.status.progress_percent);
        self.status.progress_percent = percent;
        if let Some(sink) = self.sink.as_mut() {
            sink.on_progress(percent);
        }
    }
}

pub struct UpdateManager<C, F, P> {
    config: OtaConfig,
    current_version: String,
    conn: C,
    flash: F,
    platform: P,
    status: UpdateStatus,
    progress: Option<Box<dyn ProgressSink>>,
}

impl<C, F, P> UpdateManager<C, F, P>
where
    C: HttpConnection,
    F: FlashTarget,
    P: Platform,
{
    pub fn new(config: OtaConfig, current_version: impl Into<String>, conn: C, flash: F, platform: P) -> Self {
        let current_version = current_version.into();
        log::info!("Firmware version: {}", current_version);
        Self {
            config,
            current_version,
            conn,
            flash,
            platform,
            status: UpdateStatus::default(),
            progress: None,
        }
    }

    /// Registers the sink that receives download progress (0-100).
    pub fn set_progress_sink(&mut self, sink: impl ProgressSink + 'static) {
        self.progress = Some(Box::new(sink));
    }

    /// Fetches the manifest and records whether it is newer than the
    /// running firmware. Any previous descriptor and error are discarded first.
    pub fn check_for_update(&mut self) -> bool {
        self.status = UpdateStatus::default();
        self.status.transition(UpdateState::CheckingManifest);

        let fetched = ManifestClient::new(&self.config).fetch(&mut self.conn, &mut self.platform);
        let descriptor = match fetched {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.fail(e);
                return false;
            }
        };

        log::info!(
            "Current: {}, Latest: {}",
            self.current_version,
            descriptor.version_label()
        );

        let newer = version::is_newer(descriptor.version_label(), &self.current_version);
        self.status.descriptor = Some(descriptor);

        if newer {
            log::info!("Update available!");
            self.status.transition(UpdateState::UpdateAvailable);
        } else {
            log::info!("Already up to date");
            self.status.transition(UpdateState::UpToDate);
        }
        newer
    }

    /// Installs the update found by the last check.
    ///
    /// Returns `false` with `last_error` set when anything fails; the running
    /// firmware is left untouched. On success the device restarts and, on
    /// hardware, this never returns.
    pub fn perform_update(&mut self) -> bool {
        if self.status.state != UpdateState::UpdateAvailable {
            self.fail(ErrorKind::NoUpdateAvailable);
            return false;
        }
        let Some(descriptor) = self.status.descriptor.clone() else {
            self.fail(ErrorKind::NoUpdateAvailable);
            return false;
        };

        if !self.platform.network_connected() {
            self.fail(ErrorKind::NetworkUnavailable);
            return false;
        }

        self.status.progress_percent = 0;
        self.status.last_error = None;

        let preflight = PreflightValidator::from_config(&self.config);
        if let Err(e) = preflight.validate(&descriptor, self.flash.free_space()) {
            self.fail(e);
            return false;
        }

        log::info!(
            "Installing {} from {}",
            descriptor.version_label(),
            descriptor.firmware_url()
        );

        let writer = FlashWriter::from_config(&self.config);
        let source = ImageSource {
            url: descriptor.firmware_url(),
            max_size: self.config.max_firmware_size,
            sha256: descriptor.sha256(),
        };
        let mut observer = StatusObserver {
            status: &mut self.status,
            sink: self.progress.as_deref_mut(),
        };
        let written = writer.write(
            &mut self.conn,
            &mut self.flash,
            &mut self.platform,
            source,
            &mut observer,
        );

        if let Err(e) = written {
            self.fail(e);
            return false;
        }

        self.status.transition(UpdateState::Rebooting);
        log::info!("Update successful! Rebooting...");
        self.platform.idle(RESTART_DELAY_MS);
        self.platform.restart();
        true
    }

    fn fail(&mut self, error: ErrorKind) {
        log::error!("Update failed: {}", error);
        self.status.transition(UpdateState::Failed(error.clone()));
        self.status.last_error = Some(error);
        self.status.transition(UpdateState::Idle);
    }

    pub fn status(&self) -> &UpdateStatus {
        &self.status
    }

    pub fn state(&self) -> &UpdateState {
        &self.status.state
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn is_update_available(&self) -> bool {
        self.status.state == UpdateState::UpdateAvailable
    }

    /// Version label of the last fetched manifest.
    pub fn latest_version(&self) -> Option<&str> {
        self.status.descriptor.as_ref().map(|d| d.version_label())
    }

    pub fn release_notes(&self) -> &str {
        self.status
            .descriptor
            .as_ref()
            .map(|d| d.release_notes())
            .unwrap_or_default()
    }

    pub fn is_critical_update(&self) -> bool {
        self.status
            .descriptor
            .as_ref()
            .is_some_and(|d| d.is_critical())
    }

    pub fn last_error(&self) -> Option<&ErrorKind> {
        self.status.last_error.as_ref()
    }

    pub fn progress_percent(&self) -> u8 {
        self.status.progress_percent
    }

    pub fn config(&self) -> &OtaConfig {
        &self.config
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.conn
    }
}
