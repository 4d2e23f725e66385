//! Transmit chain: QPSK phase synthesis, phase-continuous FSK dither,
//! passband composition and the AWGN channel.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info};

use crate::bits::string_to_bits;
use crate::config::{ProtocolConfig, SimulationConfig};
use crate::error::{ModemError, Result};
use crate::filters::{butter4_lowpass, filtfilt};
use crate::framing::build_full_bitstream;
use crate::ldpc::LdpcMatrices;

/// Gray-coded pi/4-offset QPSK phases, indexed by symbol.
pub const QPSK_PHASE_MAP: [f64; 4] = [
    PI / 2.0 + PI / 4.0,
    PI / 4.0,
    PI + PI / 4.0,
    3.0 * PI / 2.0 + PI / 4.0,
];

/// Forward Gray map: bit pair to symbol index.
pub fn qpsk_symbol(b0: u8, b1: u8) -> usize {
    match (b0, b1) {
        (0, 0) => 0,
        (0, 1) => 1,
        (1, 1) => 2,
        _ => 3,
    }
}

/// Inverse Gray map: symbol index to bit pair.
pub fn qpsk_bits(symbol: usize) -> (u8, u8) {
    match symbol {
        0 => (0, 0),
        1 => (0, 1),
        2 => (1, 1),
        _ => (1, 0),
    }
}

/// Artifacts produced by the modulation stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncodingResult {
    /// Passband signal after the AWGN channel.
    pub noisy_signal: Vec<f64>,
    /// Passband signal before noise.
    pub clean_signal: Vec<f64>,
    /// Full framed transmit bit stream.
    pub qpsk_bitstream: Vec<u8>,
    /// Raw payload bits before framing.
    pub payload_bits: Vec<u8>,
    pub qpsk_phase_map: [f64; 4],
    pub total_frames: usize,
    pub duration_seconds: f64,
    pub num_samples: usize,
    /// Seed behind the noise draw; `None` when the caller supplied its own
    /// generator.
    pub noise_seed: Option<u64>,
}

/// Encode a plaintext string into a noisy modulated audio stream.
pub fn generate_modulated_signal(
    sim: &SimulationConfig,
    protocol: &ProtocolConfig,
    matrices: &LdpcMatrices,
    plaintext: Option<&str>,
    rng: Option<&mut StdRng>,
) -> Result<EncodingResult> {
    let layout = &protocol.frame_layout;
    let text = plaintext.unwrap_or(&sim.plaintext_source);
    let payload_bits = string_to_bits(text);
    info!(
        chars = text.len(),
        bits = payload_bits.len(),
        "modulating plaintext"
    );

    let (qpsk_bitstream, total_frames) = build_full_bitstream(&payload_bits, protocol, matrices)?;

    let sample_rate = sim.sample_rate as f64;
    let sps = sim.samples_per_symbol(protocol);
    let spb = sim.samples_per_fsk_bit(protocol);
    let duration_seconds =
        (total_frames * layout.total_symbols) as f64 / protocol.qpsk_symbol_rate;
    let duration_seconds = duration_seconds.max(1.0);
    let num_samples = (duration_seconds * sample_rate) as usize;
    debug!(duration_seconds, num_samples, "signal dimensions");

    // FSK source: the payload tiled to the signal duration, zeros when empty.
    let fsk_bits_needed = (duration_seconds * protocol.fsk_bit_rate).ceil() as usize;
    let fsk_bits: Vec<u8> = if payload_bits.is_empty() {
        vec![0; fsk_bits_needed]
    } else {
        (0..fsk_bits_needed)
            .map(|i| payload_bits[i % payload_bits.len()])
            .collect()
    };

    // QPSK phases with zero-order hold, padded or truncated to the signal.
    let mut phase_raw = Vec::with_capacity(num_samples);
    for pair in qpsk_bitstream.chunks_exact(2) {
        let phase = QPSK_PHASE_MAP[qpsk_symbol(pair[0], pair[1])];
        phase_raw.extend(std::iter::repeat_n(phase, sps));
    }
    phase_raw.resize(num_samples, 0.0);

    // Bandlimit sin/cos separately and rebuild the phase; filtering the
    // angle directly would smear its 2 pi wraps.
    let (b, a) = butter4_lowpass(protocol.qpsk_bandwidth_hz, sample_rate);
    let smooth_sin = filtfilt(&b, &a, &phase_raw.iter().map(|p| p.sin()).collect::<Vec<_>>());
    let smooth_cos = filtfilt(&b, &a, &phase_raw.iter().map(|p| p.cos()).collect::<Vec<_>>());

    let deviation = protocol.fsk_freq_deviation_hz();
    let mut clean_signal = Vec::with_capacity(num_samples);
    let mut freq_accum = 0.0f64;
    for n in 0..num_samples {
        let bit = fsk_bits[(n / spb).min(fsk_bits.len() - 1)];
        freq_accum += protocol.carrier_freq_hz + (bit as f64 * 2.0 - 1.0) * deviation;
        let fsk_phase = 2.0 * PI * freq_accum / sample_rate;
        let qpsk_phase = smooth_sin[n].atan2(smooth_cos[n]);
        clean_signal.push((fsk_phase + qpsk_phase).sin());
    }

    debug!(snr_db = sim.snr_db, "applying AWGN channel");
    let signal_power = clean_signal.iter().map(|v| v * v).sum::<f64>() / num_samples as f64;
    let noise_power = signal_power / f64::powf(10.0, sim.snr_db / 10.0);
    let normal = Normal::new(0.0, noise_power.sqrt())
        .map_err(|e| ModemError::InvalidArgument(format!("bad noise distribution: {e}")))?;

    let mut local_rng;
    let (rng, noise_seed) = match rng {
        Some(external) => (external, None),
        None => {
            let seed = sim.rng_seed.unwrap_or_else(|| rand::rng().random());
            local_rng = StdRng::seed_from_u64(seed);
            (&mut local_rng, Some(seed))
        }
    };
    let noisy_signal: Vec<f64> = clean_signal
        .iter()
        .map(|&v| v + normal.sample(rng))
        .collect();

    info!("modulation complete, noisy signal ready for transmission");
    Ok(EncodingResult {
        noisy_signal,
        clean_signal,
        qpsk_bitstream,
        payload_bits,
        qpsk_phase_map: QPSK_PHASE_MAP,
        total_frames,
        duration_seconds,
        num_samples,
        noise_seed,
    })
}
