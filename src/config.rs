//! Protocol and simulation configuration records.
//!
//! All records are plain immutable values; derived quantities are exposed as
//! methods so a record can never hold inconsistent state.

use serde::{Deserialize, Serialize};

/// Symbol layout of a single frame. Two bits per QPSK symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    pub total_symbols: usize,
    pub sync_symbols: usize,
    pub target_id_symbols: usize,
    pub command_type_symbols: usize,
    pub data_payload_symbols: usize,
    pub ecc_symbols: usize,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            total_symbols: 128,
            sync_symbols: 16,
            target_id_symbols: 16,
            command_type_symbols: 16,
            data_payload_symbols: 64,
            ecc_symbols: 16,
        }
    }
}

impl FrameLayout {
    /// Systematic (message) bits per codeword.
    pub fn message_bits(&self) -> usize {
        self.data_payload_symbols * 2
    }

    pub fn ecc_bits(&self) -> usize {
        self.ecc_symbols * 2
    }

    pub fn codeword_bits(&self) -> usize {
        self.message_bits() + self.ecc_bits()
    }

    pub fn frame_bits(&self) -> usize {
        self.total_symbols * 2
    }

    /// Bit offset of the codeword within a frame (after sync, target id and
    /// command fields).
    pub fn codeword_offset_bits(&self) -> usize {
        (self.sync_symbols + self.target_id_symbols + self.command_type_symbols) * 2
    }

    /// Field widths must add up to the frame.
    pub fn is_consistent(&self) -> bool {
        self.sync_symbols
            + self.target_id_symbols
            + self.command_type_symbols
            + self.data_payload_symbols
            + self.ecc_symbols
            == self.total_symbols
    }
}

/// Constants of the Raman Whisper modulation protocol.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub carrier_freq_hz: f64,
    /// QPSK symbol rate in symbols per second.
    pub qpsk_symbol_rate: f64,
    /// Cutoff of the phase-smoothing lowpass.
    pub qpsk_bandwidth_hz: f64,
    pub fsk_bit_rate: f64,
    pub fsk_freq_zero_hz: f64,
    pub fsk_freq_one_hz: f64,
    pub command_opcode: u32,
    pub frame_layout: FrameLayout,
    pub sync_sequence_hex: String,
    pub target_id_hex: String,
    pub max_frames: usize,
    pub current_frame_shift: u32,
    pub total_frames_shift: u32,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            carrier_freq_hz: 12_000.0,
            qpsk_symbol_rate: 16.0,
            qpsk_bandwidth_hz: 20.0,
            fsk_bit_rate: 1.0,
            fsk_freq_zero_hz: 11_999.0,
            fsk_freq_one_hz: 12_001.0,
            command_opcode: 0x0001,
            frame_layout: FrameLayout::default(),
            sync_sequence_hex: "A5A5A5A5".to_string(),
            target_id_hex: "DEADBEEF".to_string(),
            max_frames: 256,
            current_frame_shift: 16,
            total_frames_shift: 24,
        }
    }
}

impl ProtocolConfig {
    /// FSK tone offset from the carrier ("one" tone is above, "zero" below).
    pub fn fsk_freq_deviation_hz(&self) -> f64 {
        self.fsk_freq_one_hz - self.carrier_freq_hz
    }
}

/// Parameters of the regular LDPC code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdpcConfig {
    /// Column weight (checks per message bit).
    pub dv: usize,
    /// Row weight of the target Gallager profile. The systematic
    /// construction does not take this as an input: its identity block
    /// fixes the achieved row weight at `k * dv / (n - k) + 1`.
    pub dc: usize,
    /// Seed for the deterministic matrix construction.
    pub seed: u64,
}

impl Default for LdpcConfig {
    fn default() -> Self {
        Self {
            dv: 2,
            dc: 10,
            seed: 42,
        }
    }
}

/// On-the-wire sample format tag. The core always produces `f64` samples;
/// the tag travels with the config for collaborators that write containers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    #[default]
    Float,
    Int16,
}

/// User-facing configuration for one end-to-end run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub snr_db: f64,
    pub plaintext_source: String,
    /// Noise seed; drawn from OS entropy when `None` and recorded in the
    /// encoding result.
    pub rng_seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            sample_format: SampleFormat::Float,
            snr_db: 3.0,
            plaintext_source: "This is a longer message demonstrating the protocol-compliant, \
                rate-4/5 LDPC error correction. This signal simulates reception through a \
                physically accurate AWGN channel where noise is added post-modulation. The \
                decoder will now attempt to recover this exact message."
                .to_string(),
            rng_seed: None,
        }
    }
}

impl SimulationConfig {
    /// Samples per QPSK symbol.
    pub fn samples_per_symbol(&self, protocol: &ProtocolConfig) -> usize {
        ((self.sample_rate as f64 / protocol.qpsk_symbol_rate).round() as usize).max(1)
    }

    /// Samples per FSK bit.
    pub fn samples_per_fsk_bit(&self, protocol: &ProtocolConfig) -> usize {
        ((self.sample_rate as f64 / protocol.fsk_bit_rate).round() as usize).max(1)
    }
}
