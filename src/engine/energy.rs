//! Energy-gated speech burst engine
//!
//! Captures the default microphone and fires keyword index 0 whenever a burst
//! of speech is followed by enough silence. Stands in for a vendor keyword
//! spotter on machines that do not have one.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use secrecy::ExposeSecret;

use super::{DetectionCallback, DetectorEngine, EngineConfig, EngineError, EngineSession};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Minimum duration of speech to trigger (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// Audio processing chunk size (100ms at 16kHz)
const CHUNK_SIZE: usize = 1600;

/// RMS threshold at zero sensitivity
const BASE_THRESHOLD: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BurstState {
    Idle,
    Speaking,
}

/// Segments audio into speech bursts by RMS energy
#[derive(Debug)]
pub struct SpeechBurstDetector {
    threshold: f32,
    state: BurstState,
    speech_samples: usize,
    silence_counter: usize,
}

impl SpeechBurstDetector {
    /// Create a detector; higher sensitivity lowers the energy threshold
    #[must_use]
    pub fn new(sensitivity: f32) -> Self {
        let threshold = BASE_THRESHOLD * (1.0 - sensitivity.clamp(0.0, 0.95));
        Self {
            threshold,
            state: BurstState::Idle,
            speech_samples: 0,
            silence_counter: 0,
        }
    }

    /// Feed a chunk; returns true once per completed burst
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = calculate_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            BurstState::Idle => {
                if is_speech {
                    self.state = BurstState::Speaking;
                    self.speech_samples = samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected");
                }
            }
            BurstState::Speaking => {
                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES {
                    let complete = self.speech_samples > MIN_SPEECH_SAMPLES;
                    self.reset();
                    if complete {
                        tracing::debug!("speech burst complete");
                    }
                    return complete;
                }
            }
        }

        false
    }

    /// Reset detector to idle state
    pub const fn reset(&mut self) {
        self.state = BurstState::Idle;
        self.speech_samples = 0;
        self.silence_counter = 0;
    }

    /// Check if currently inside a burst
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.state == BurstState::Speaking
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Microphone-backed engine using [`SpeechBurstDetector`]
#[derive(Debug, Default)]
pub struct EnergyTriggerEngine;

impl EnergyTriggerEngine {
    /// Create the engine
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DetectorEngine for EnergyTriggerEngine {
    fn name(&self) -> &str {
        "energy-trigger"
    }

    fn initialize(&self, config: &EngineConfig) -> Result<Box<dyn EngineSession>, EngineError> {
        let credential = config.credential.expose_secret();
        if credential.trim().is_empty() || credential.chars().any(char::is_whitespace) {
            return Err(EngineError::InvalidCredential);
        }

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| {
                EngineError::EngineUnavailable("no input device available".to_string())
            })?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| EngineError::EngineUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| {
                EngineError::EngineUnavailable("no suitable audio config found".to_string())
            })?;

        let stream_config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            keyword = %config.keyword,
            "audio capture initialized"
        );

        Ok(Box::new(EnergySession {
            device,
            config: stream_config,
            sensitivity: config.sensitivity,
            stream: None,
        }))
    }
}

struct EnergySession {
    device: cpal::Device,
    config: StreamConfig,
    sensitivity: f32,
    stream: Option<Stream>,
}

impl EngineSession for EnergySession {
    fn start(&mut self, on_detect: DetectionCallback) -> Result<(), EngineError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut detector = SpeechBurstDetector::new(self.sensitivity);
        let mut pending: Vec<f32> = Vec::with_capacity(CHUNK_SIZE * 2);

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    pending.extend_from_slice(data);
                    while pending.len() >= CHUNK_SIZE {
                        let chunk: Vec<f32> = pending.drain(..CHUNK_SIZE).collect();
                        if detector.process(&chunk) {
                            on_detect(0);
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| EngineError::EngineUnavailable(e.to_string()))?;

        stream
            .play()
            .map_err(|e| EngineError::EngineUnavailable(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    fn dispose(&mut self) {
        self.stop();
    }
}
