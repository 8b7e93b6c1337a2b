//! Real audio capture using CPAL (Cross-Platform Audio Library).
//!
//! Wraps the device callback as a [`FrameSource`]: device buffers of any
//! size are cut into fixed-duration frames and handed to the registered
//! frame handler on the real-time thread.

use crate::audio::source::{FrameFormat, FrameHandler, FrameOutcome, FrameSource, FrameSplitter};
use crate::error::{MicgateError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Run a closure with stderr temporarily redirected to /dev/null.
///
/// This suppresses noisy ALSA/JACK/PipeWire messages that CPAL triggers
/// when probing audio backends. The messages are harmless but confusing to users.
///
/// # Safety
/// Uses `libc::dup`/`libc::dup2` to save and restore file descriptor 2 (stderr).
/// Safe as long as no other thread is concurrently manipulating fd 2.
fn with_suppressed_stderr<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    unsafe {
        let saved_fd = libc::dup(2);
        let devnull = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY);
        if saved_fd >= 0 && devnull >= 0 {
            libc::dup2(devnull, 2);
            libc::close(devnull);
        }

        let result = f();

        if saved_fd >= 0 {
            libc::dup2(saved_fd, 2);
            libc::close(saved_fd);
        }

        result
    }
}

/// Preferred device names for GNOME/PipeWire environments.
const PREFERRED_DEVICES: &[&str] = &["pipewire", "pulse", "PulseAudio"];

/// Device name patterns to filter out (not useful for voice input).
const FILTERED_PATTERNS: &[&str] = &[
    "surround",
    "front:",
    "rear:",
    "center:",
    "side:",
    "Digital Output",
    "HDMI",
    "S/PDIF",
];

fn should_filter_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    FILTERED_PATTERNS
        .iter()
        .any(|pattern| lower.contains(&pattern.to_lowercase()))
}

fn is_preferred_device(name: &str) -> bool {
    let lower = name.to_lowercase();
    PREFERRED_DEVICES
        .iter()
        .any(|pref| lower.contains(&pref.to_lowercase()))
}

/// List all available audio input devices with filtering and recommendations.
///
/// Preferred devices are marked with "\[recommended\]"; obviously unusable
/// devices (surround channels, HDMI, etc.) are filtered out.
///
/// # Errors
/// Returns `MicgateError::AudioCapture` if device enumeration fails.
pub fn list_devices() -> Result<Vec<String>> {
    let (host, devices) = with_suppressed_stderr(|| {
        let host = cpal::default_host();
        let devices = host.input_devices();
        (host, devices)
    });
    let _ = host; // keep host alive while iterating devices
    let devices = devices.map_err(|e| MicgateError::AudioCapture {
        message: format!("Failed to enumerate input devices: {}", e),
    })?;

    let mut device_names = Vec::new();
    for device in devices {
        if let Ok(name) = device.name() {
            if should_filter_device(&name) {
                continue;
            }
            if is_preferred_device(&name) {
                device_names.push(format!("{} [recommended]", name));
            } else {
                device_names.push(name);
            }
        }
    }

    Ok(device_names)
}

/// Get the best default input device, preferring PipeWire/PulseAudio so the
/// desktop's device selection is respected.
///
/// # Errors
/// Returns `MicgateError::AudioDeviceNotFound` if no input device is available.
fn get_best_default_device() -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Ok(devices) = host.input_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_input_device()
            .ok_or_else(|| MicgateError::AudioDeviceNotFound {
                device: "default".to_string(),
            })
    })
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is only touched while holding `&mut CpalFrameSource`,
/// so access is serialized on one thread at a time.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// State shared with the device callback.
///
/// The callback's only side effect is splitting the device buffer and
/// forwarding frames; once `active` drops to false (stop requested or the
/// handler returned [`FrameOutcome::Stop`]) no further frames are forwarded,
/// even if the backend keeps firing.
struct PipeState {
    splitter: FrameSplitter,
    handler: FrameHandler,
    active: bool,
}

impl PipeState {
    fn feed(&mut self, samples: &[i16]) {
        if !self.active {
            return;
        }
        for frame in self.splitter.push(samples) {
            if (self.handler)(frame) == FrameOutcome::Stop {
                self.active = false;
                return;
            }
        }
    }
}

/// Real frame source backed by a CPAL input stream.
///
/// Captures 16-bit PCM mono at the configured rate. Tries the i16 format
/// first, then f32 with software conversion; PipeWire/PulseAudio resample
/// transparently to the requested rate.
pub struct CpalFrameSource {
    device: cpal::Device,
    format: FrameFormat,
    stream: Option<SendableStream>,
    pipe: Option<Arc<Mutex<PipeState>>>,
}

impl CpalFrameSource {
    /// Opens a device by name, or the best default when `device_name` is
    /// `None`.
    ///
    /// # Errors
    /// Returns `MicgateError::AudioDeviceNotFound` for unknown devices and
    /// `MicgateError::InvalidFrameFormat` for bad frame geometry.
    pub fn new(device_name: Option<&str>, format: FrameFormat) -> Result<Self> {
        format.validate()?;

        let device = with_suppressed_stderr(|| {
            let host = cpal::default_host();

            if let Some(name) = device_name {
                let devices = host
                    .input_devices()
                    .map_err(|e| MicgateError::AudioCapture {
                        message: format!("Failed to enumerate devices: {}", e),
                    })?;

                for dev in devices {
                    if let Ok(dev_name) = dev.name()
                        && dev_name == name
                    {
                        return Ok(dev);
                    }
                }

                Err(MicgateError::AudioDeviceNotFound {
                    device: name.to_string(),
                })
            } else {
                get_best_default_device()
            }
        })?;

        Ok(Self {
            device,
            format,
            stream: None,
            pipe: None,
        })
    }

    fn build_stream(&self, pipe: Arc<Mutex<PipeState>>) -> Result<SendableStream> {
        let config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(self.format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let err_callback = |err| {
            tracing::warn!("audio stream error: {}", err);
        };

        // i16 first — PipeWire/PulseAudio convert transparently.
        let state = Arc::clone(&pipe);
        if let Ok(stream) = self.device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if let Ok(mut state) = state.lock() {
                    state.feed(data);
                }
            },
            err_callback,
            None,
        ) {
            return Ok(SendableStream(stream));
        }

        // f32 fallback for devices that only expose float formats.
        let state = Arc::clone(&pipe);
        self.device
            .build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let converted: Vec<i16> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                        .collect();
                    if let Ok(mut state) = state.lock() {
                        state.feed(&converted);
                    }
                },
                err_callback,
                None,
            )
            .map(SendableStream)
            .map_err(|e| MicgateError::AudioCapture {
                message: format!(
                    "No supported sample format at {}Hz mono: {}",
                    self.format.sample_rate, e
                ),
            })
    }
}

impl FrameSource for CpalFrameSource {
    fn register(&mut self, handler: FrameHandler) -> Result<()> {
        if self.stream.is_some() {
            return Err(MicgateError::AudioCapture {
                message: "handler already registered".to_string(),
            });
        }

        let pipe = Arc::new(Mutex::new(PipeState {
            splitter: FrameSplitter::new(self.format)?,
            handler,
            active: false,
        }));

        let stream = self.build_stream(Arc::clone(&pipe))?;
        // Some backends start delivering on build; delivery is gated by
        // `active` until start() flips it.
        if let Err(e) = stream.0.pause() {
            debug!("pause after build not supported: {}", e);
        }

        self.pipe = Some(pipe);
        self.stream = Some(stream);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        let stream = self.stream.as_ref().ok_or(MicgateError::AudioCapture {
            message: "no handler registered".to_string(),
        })?;

        if let Some(pipe) = &self.pipe
            && let Ok(mut state) = pipe.lock()
        {
            state.active = true;
        }

        stream.0.play().map_err(|e| MicgateError::AudioCapture {
            message: format!("Failed to start audio stream: {}", e),
        })
    }

    fn stop(&mut self) -> Result<()> {
        // Gate forwarding first so no frame slips out after stop returns.
        if let Some(pipe) = &self.pipe
            && let Ok(mut state) = pipe.lock()
        {
            state.active = false;
        }

        if let Some(stream) = &self.stream {
            stream.0.pause().map_err(|e| MicgateError::AudioCapture {
                message: format!("Failed to stop audio stream: {}", e),
            })?;
        }
        Ok(())
    }

    fn format(&self) -> FrameFormat {
        self.format
    }
}
