//! Webcam capture through V4L2.
//!
use anyhow::{anyhow, Context, Result};
use rscam::{Camera, Config, Frame};

/// Capture closure owning the started camera. Dropping it releases the device.
pub type CaptureFn = Box<dyn Fn() -> Option<Frame> + Send + Sync>;

/// Camera selection and negotiation parameters.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    pub device: String,
    /// Capture resolution, camera maximum when `None`.
    pub resolution: Option<(u32, u32)>,
    /// Frame interval as (numerator, denominator), camera maximum when `None`.
    pub frame_rate: Option<(u32, u32)>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_owned(),
            resolution: None,
            frame_rate: None,
        }
    }
}

/// Open the configured video device and start an MJPG capture.
///
/// Fails when the device is missing or not accessible to this user, or when
/// the camera rejects the negotiated parameters.
pub fn get_capture_fn(config: &CameraConfig) -> Result<CaptureFn> {
    let format = b"MJPG";
    let mut cam = Camera::new(&config.device)
        .with_context(|| format!("opening video device {}", config.device))?;
    log_supported_formats(&cam);

    let resolution = config
        .resolution
        .map(Ok)
        .unwrap_or_else(|| get_max_resolution(&cam, format))?;

    let frame_rate = config
        .frame_rate
        .map(Ok)
        .unwrap_or_else(|| get_max_frame_rate(&cam, format, resolution))?;

    cam.start(&Config {
        interval: frame_rate,
        resolution,
        format,
        ..Default::default()
    })
    .with_context(|| {
        format!(
            "starting capture on {} at {}x{}",
            config.device, resolution.0, resolution.1
        )
    })?;

    log::info!(
        "Using camera {} at {}x{}",
        config.device,
        resolution.0,
        resolution.1
    );

    let callback = move || cam.capture().ok();
    Ok(Box::new(callback))
}

/// Get the maximum supported resolution for the given format.
fn get_max_resolution(cam: &Camera, format: &[u8]) -> Result<(u32, u32)> {
    let resolution_info = cam.resolutions(format)?;
    log::debug!("Found resolutions: {:?}", &resolution_info);
    match resolution_info {
        rscam::ResolutionInfo::Discretes(resolutions) => resolutions
            .iter()
            .map(|res| (res, res.0 * res.1))
            .max_by(|a, b| a.1.cmp(&b.1))
            .map(|(res, _num_pixels)| *res),
        rscam::ResolutionInfo::Stepwise {
            min: _,
            max,
            step: _,
        } => Some(max),
    }
    .ok_or_else(|| anyhow!("no resolution found"))
}

/// Get the maximum supported frame rate for the given format and resolution.
fn get_max_frame_rate(cam: &Camera, format: &[u8], resolution: (u32, u32)) -> Result<(u32, u32)> {
    let interval_info = cam.intervals(format, resolution)?;
    log::debug!("Found frame rates: {:?}", &interval_info);
    match interval_info {
        rscam::IntervalInfo::Discretes(frame_rates) => frame_rates
            .iter()
            // Intervals are (numerator, denominator), rate is denominator/numerator
            .map(|(numerator, denominator)| ((numerator, denominator), denominator / numerator))
            .max_by(|a, b| a.1.cmp(&b.1))
            .map(|((&n, &d), _rate)| (n, d)),
        rscam::IntervalInfo::Stepwise {
            min: _,
            max,
            step: _,
        } => Some(max),
    }
    .ok_or_else(|| anyhow!("no frame rate found"))
}

fn log_supported_formats(cam: &Camera) {
    let formats: Vec<_> = cam.formats().filter_map(|format| format.ok()).collect();
    log::debug!("Supported formats: {:?}", formats);
}
