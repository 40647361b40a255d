//! Audio device lookup and blocking device work

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait};

use crate::{Error, Result};

/// How often a blocking device loop checks whether it should stop
pub(crate) const STOP_POLL: Duration = Duration::from_millis(50);

/// Raises a shared stop flag when dropped
#[derive(Debug, Default)]
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// Run device work on the blocking pool
///
/// `work` receives a stop flag. The flag is raised when the returned future
/// completes or is dropped, so a timed-out or cancelled caller releases the
/// device as soon as `work` next checks it.
pub(crate) async fn run_blocking<T, F>(work: F) -> std::result::Result<T, tokio::task::JoinError>
where
    F: FnOnce(&AtomicBool) -> T + Send + 'static,
    T: Send + 'static,
{
    let guard = StopOnDrop::default();
    let stop = Arc::clone(&guard.0);
    let result = tokio::task::spawn_blocking(move || work(&stop)).await;
    drop(guard);
    result
}

/// Sleep for `duration` in short steps
///
/// Returns `false` if `stop` was raised before the time was up.
pub(crate) fn sleep_unless_stopped(stop: &AtomicBool, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return true;
        }
        std::thread::sleep(left.min(STOP_POLL));
    }
}

/// Index of the device called `wanted`
///
/// An exact name wins; otherwise the first name containing `wanted`,
/// ignoring case.
fn match_device_name<S: AsRef<str>>(names: &[S], wanted: &str) -> Option<usize> {
    names.iter().position(|n| n.as_ref() == wanted).or_else(|| {
        let wanted = wanted.to_lowercase();
        names
            .iter()
            .position(|n| n.as_ref().to_lowercase().contains(&wanted))
    })
}

/// Names of the available input devices
///
/// # Errors
///
/// Returns error if the audio host cannot enumerate devices
pub fn list_input_devices() -> Result<Vec<String>> {
    let devices = cpal::default_host()
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Names of the available output devices
///
/// # Errors
///
/// Returns error if the audio host cannot enumerate devices
pub fn list_output_devices() -> Result<Vec<String>> {
    let devices = cpal::default_host()
        .output_devices()
        .map_err(|e| Error::Audio(e.to_string()))?;
    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// The input device named `name`, or the default one
pub(crate) fn input_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        let devices: Vec<cpal::Device> = host
            .input_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .collect();
        if let Some(device) = pick(devices, name) {
            return Ok(device);
        }
        tracing::warn!(device = name, "input device not found, using default");
    }
    host.default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))
}

/// The output device named `name`, or the default one
pub(crate) fn output_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = name {
        let devices: Vec<cpal::Device> = host
            .output_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .collect();
        if let Some(device) = pick(devices, name) {
            return Ok(device);
        }
        tracing::warn!(device = name, "output device not found, using default");
    }
    host.default_output_device()
        .ok_or_else(|| Error::Audio("no output device available".to_string()))
}

fn pick(devices: Vec<cpal::Device>, wanted: &str) -> Option<cpal::Device> {
    let names: Vec<String> = devices
        .iter()
        .map(|d| d.name().unwrap_or_default())
        .collect();
    let index = match_device_name(&names, wanted)?;
    devices.into_iter().nth(index)
}
