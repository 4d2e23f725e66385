//! Receive chain: complex down-conversion, root-raised-cosine matched
//! filtering, FSK dither removal, timing/carrier recovery, symbol slicing,
//! frame synchronization and aggregate LDPC decoding.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info, warn};

use crate::bits::{bits_to_str, hex_to_bits, pack_bits};
use crate::config::{ProtocolConfig, SimulationConfig};
use crate::error::{ModemError, Result};
use crate::filters::{fir_filter, rrc_taps};
use crate::ldpc::LdpcMatrices;
use crate::recovery::{LoopGains, RecoveryOutput, timing_and_carrier_recovery};
use crate::send::{EncodingResult, QPSK_PHASE_MAP, qpsk_bits};

/// Matched filter length; the group delay is half of this minus one sample.
const RRC_NUM_TAPS: usize = 101;
const RRC_BETA: f64 = 0.35;

/// Frames logged in full at debug level.
const TRACE_FRAMES: usize = 3;

/// Intermediate arrays captured during demodulation for plotting and
/// debugging by external tooling.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DemodulationDiagnostics {
    pub received_symbols_i: Vec<f64>,
    pub received_symbols_q: Vec<f64>,
    pub timing_error: Vec<f64>,
    pub nco_freq_offset: Vec<f64>,
    /// Demodulated bits of the slow FSK layer (the tiled payload).
    pub fsk_bit_decisions: Vec<u8>,
}

/// Outputs of the demodulation and decoding stage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DemodulationResult {
    /// Sliced bit stream, padded or truncated to the transmitted length.
    pub demodulated_bitstream: Vec<u8>,
    /// Recovered payload bits after LDPC decoding, truncated to the
    /// original payload length.
    pub decoded_bitstream: Vec<u8>,
    pub recovered_message: String,
    pub pre_fec_errors: usize,
    pub pre_fec_ber: f64,
    pub post_fec_errors: usize,
    pub post_fec_ber: f64,
    pub diagnostics: DemodulationDiagnostics,
}

/// Multiply the passband signal down to complex baseband.
pub fn downmix(signal: &[f64], carrier_freq_hz: f64, sample_rate: f64) -> Vec<Complex64> {
    let w = 2.0 * PI * carrier_freq_hz / sample_rate;
    signal
        .iter()
        .enumerate()
        .map(|(n, &v)| v * Complex64::from_polar(1.0, -w * n as f64))
        .collect()
}

/// Estimate the FSK dither sequence from the matched-filtered baseband and
/// reconstruct its phase ramp.
///
/// The dither rotates the constellation by `2 pi deviation / f_s` per
/// sample, far too fast for the symbol-rate carrier loop to follow. Each
/// FSK bit is decided from the sign of the summed baseband phase increments
/// over the middle third of every QPSK symbol interval; those windows avoid
/// the smoothed symbol transitions, so each telescoped increment measures
/// the dither rotation plus only endpoint noise. The decided bits and the
/// known deviation then give the exact phase ramp to remove.
fn estimate_fsk_dither(
    baseband: &[Complex64],
    samples_per_symbol: usize,
    samples_per_bit: usize,
    group_delay: usize,
    deviation_hz: f64,
    sample_rate: f64,
) -> (Vec<u8>, Vec<f64>) {
    let n = baseband.len();
    if n <= group_delay || deviation_hz == 0.0 {
        return (Vec::new(), vec![0.0; n]);
    }
    let num_bits = (n - group_delay).div_ceil(samples_per_bit).max(1);
    let mut increment_sums = vec![0.0f64; num_bits];

    let num_symbols = (n - group_delay) / samples_per_symbol;
    for s in 0..num_symbols {
        let lo = s * samples_per_symbol + group_delay + samples_per_symbol / 3;
        let hi = s * samples_per_symbol + group_delay + 2 * samples_per_symbol / 3;
        if hi >= n {
            break;
        }
        let increment = (baseband[hi] * baseband[lo].conj()).arg();
        let bit_index = (s * samples_per_symbol + samples_per_symbol / 2) / samples_per_bit;
        if bit_index < num_bits {
            increment_sums[bit_index] += increment;
        }
    }

    let bits: Vec<u8> = increment_sums.iter().map(|&v| (v > 0.0) as u8).collect();

    let mut ramp = Vec::with_capacity(n);
    let mut accum = 0.0f64;
    let step = 2.0 * PI * deviation_hz / sample_rate;
    for i in 0..n {
        let bit_index = (i.saturating_sub(group_delay) / samples_per_bit).min(num_bits - 1);
        accum += (bits[bit_index] as f64 * 2.0 - 1.0) * step;
        ramp.push(accum);
    }
    (bits, ramp)
}

/// Slice recovered symbols to bits: nearest constellation phase, then the
/// inverse Gray map.
pub fn slice_symbols(symbols: &[Complex64]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(symbols.len() * 2);
    for symbol in symbols {
        let phase = symbol.arg();
        let mut best = 0usize;
        let mut best_distance = f64::INFINITY;
        for (k, &map_phase) in QPSK_PHASE_MAP.iter().enumerate() {
            let distance = Complex64::from_polar(1.0, phase - map_phase).arg().abs();
            if distance < best_distance {
                best_distance = distance;
                best = k;
            }
        }
        let (b0, b1) = qpsk_bits(best);
        bits.push(b0);
        bits.push(b1);
    }
    bits
}

/// Locate the first occurrence of the sync pattern in the demodulated
/// stream.
pub fn find_frame_sync(bits: &[u8], sync_bits: &[u8]) -> Result<usize> {
    if bits.len() >= sync_bits.len() {
        if let Some(pos) = bits
            .windows(sync_bits.len())
            .position(|window| window == sync_bits)
        {
            return Ok(pos);
        }
    }
    Err(ModemError::FrameSyncLost)
}

/// Demodulate the noisy passband signal and recover the payload.
pub fn demodulate_and_decode(
    encoding: &EncodingResult,
    matrices: &LdpcMatrices,
    sim: &SimulationConfig,
    protocol: &ProtocolConfig,
    gains: &LoopGains,
) -> Result<DemodulationResult> {
    let layout = &protocol.frame_layout;
    let sample_rate = sim.sample_rate as f64;
    let sps = sample_rate / protocol.qpsk_symbol_rate;
    let group_delay = (RRC_NUM_TAPS - 1) / 2;

    let baseband_raw = downmix(&encoding.noisy_signal, protocol.carrier_freq_hz, sample_rate);
    let taps = rrc_taps(RRC_NUM_TAPS, sps, RRC_BETA);
    let baseband = fir_filter(&taps, &baseband_raw);

    let (fsk_bit_decisions, dither_ramp) = estimate_fsk_dither(
        &baseband,
        sim.samples_per_symbol(protocol),
        sim.samples_per_fsk_bit(protocol),
        group_delay,
        protocol.fsk_freq_deviation_hz(),
        sample_rate,
    );
    let derotated: Vec<Complex64> = baseband
        .iter()
        .zip(&dither_ramp)
        .map(|(v, &phase)| v * Complex64::from_polar(1.0, -phase))
        .collect();

    debug!("performing timing and carrier recovery");
    let start_index = sps / 2.0 + group_delay as f64;
    let RecoveryOutput {
        symbols,
        timing_error,
        nco_freq_offset_hz,
    } = timing_and_carrier_recovery(&derotated, sps, sample_rate, start_index, gains);

    let diagnostics = DemodulationDiagnostics {
        received_symbols_i: symbols.iter().map(|s| s.re).collect(),
        received_symbols_q: symbols.iter().map(|s| s.im).collect(),
        timing_error,
        nco_freq_offset: nco_freq_offset_hz,
        fsk_bit_decisions,
    };

    let mut demodulated_bitstream = slice_symbols(&symbols);
    demodulated_bitstream.resize(encoding.qpsk_bitstream.len(), 0);

    let pre_fec_errors = demodulated_bitstream
        .iter()
        .zip(&encoding.qpsk_bitstream)
        .filter(|(a, b)| a != b)
        .count();
    let pre_fec_ber = pre_fec_errors as f64 / encoding.qpsk_bitstream.len().max(1) as f64;
    info!(pre_fec_errors, pre_fec_ber, "pre-FEC bit error rate");

    let sync_bits = hex_to_bits(&protocol.sync_sequence_hex, layout.sync_symbols * 2)?;
    let sync_location = find_frame_sync(&demodulated_bitstream, &sync_bits).inspect_err(|_| {
        warn!("sync pattern not found in demodulated stream");
    })?;
    debug!(sync_location, "frame sync acquired");

    let aligned = &demodulated_bitstream[sync_location..];
    let frame_bits = layout.frame_bits();
    let codeword_offset = layout.codeword_offset_bits();
    let num_frames = aligned.len() / frame_bits;

    let mut decoded_bitstream = Vec::with_capacity(num_frames * matrices.message_bits);
    for frame_idx in 0..num_frames {
        let frame = &aligned[frame_idx * frame_bits..(frame_idx + 1) * frame_bits];
        let codeword = &frame[codeword_offset..codeword_offset + matrices.codeword_bits];
        let message = matrices.decode(codeword, sim.snr_db);
        if frame_idx < TRACE_FRAMES {
            debug!(
                "[RX] frame {}/{} noisy payload={}... corrected={}...",
                frame_idx + 1,
                num_frames,
                bits_to_str(&codeword[..matrices.message_bits], 32),
                bits_to_str(&message, 32),
            );
        }
        decoded_bitstream.extend_from_slice(&message);
    }

    decoded_bitstream.truncate(encoding.payload_bits.len());
    let post_fec_errors = decoded_bitstream
        .iter()
        .zip(&encoding.payload_bits)
        .filter(|(a, b)| a != b)
        .count()
        + encoding
            .payload_bits
            .len()
            .saturating_sub(decoded_bitstream.len());
    let post_fec_ber = post_fec_errors as f64 / encoding.payload_bits.len().max(1) as f64;
    info!(post_fec_errors, post_fec_ber, "post-FEC bit error rate");

    let recovered_bytes = pack_bits(&decoded_bitstream);
    let recovered_message = String::from_utf8_lossy(&recovered_bytes)
        .trim_end_matches('\0')
        .to_string();

    Ok(DemodulationResult {
        demodulated_bitstream,
        decoded_bitstream,
        recovered_message,
        pre_fec_errors,
        pre_fec_ber,
        post_fec_errors,
        post_fec_ber,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slicer_inverts_forward_map() {
        use crate::send::{QPSK_PHASE_MAP, qpsk_symbol};
        for b0 in 0..2u8 {
            for b1 in 0..2u8 {
                let symbol = qpsk_symbol(b0, b1);
                let point = Complex64::from_polar(1.0, QPSK_PHASE_MAP[symbol]);
                assert_eq!(slice_symbols(&[point]), vec![b0, b1]);
            }
        }
    }

    #[test]
    fn slicer_tolerates_rotation_inside_decision_region() {
        for symbol in 0..4usize {
            for offset in [-0.6, -0.2, 0.2, 0.6] {
                let point = Complex64::from_polar(1.0, QPSK_PHASE_MAP[symbol] + offset);
                let (b0, b1) = qpsk_bits(symbol);
                assert_eq!(slice_symbols(&[point]), vec![b0, b1]);
            }
        }
    }

    #[test]
    fn sync_search_finds_first_occurrence() {
        let sync = hex_to_bits("A5A5A5A5", 32).unwrap();
        let mut stream = vec![0u8; 40];
        stream.extend_from_slice(&sync);
        stream.extend(vec![1u8; 20]);
        assert_eq!(find_frame_sync(&stream, &sync).unwrap(), 40);
    }

    #[test]
    fn missing_sync_is_fatal() {
        let sync = hex_to_bits("A5A5A5A5", 32).unwrap();
        let stream = vec![0u8; 256];
        assert!(matches!(
            find_frame_sync(&stream, &sync),
            Err(ModemError::FrameSyncLost)
        ));
        // Too-short stream is equally lost.
        assert!(matches!(
            find_frame_sync(&stream[..16], &sync),
            Err(ModemError::FrameSyncLost)
        ));
    }

    #[test]
    fn downmix_strips_carrier() {
        let fs = 48_000.0;
        let fc = 12_000.0;
        let signal: Vec<f64> = (0..4800)
            .map(|n| (2.0 * PI * fc * n as f64 / fs).cos())
            .collect();
        let baseband = downmix(&signal, fc, fs);
        // cos(wc n) * e^{-j wc n} = 1/2 + image at -2 wc; the DC part is
        // the constant 0.5.
        let mean = baseband.iter().sum::<Complex64>() / baseband.len() as f64;
        assert!((mean.re - 0.5).abs() < 0.01);
        assert!(mean.im.abs() < 0.01);
    }
}
