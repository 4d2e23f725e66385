//! Software modem for the dual-layer "Raman Whisper" acoustic signaling
//! protocol.
//!
//! A short text payload is framed, LDPC-coded, modulated onto a 12 kHz
//! carrier as pi/4-offset QPSK with a slow FSK frequency dither, passed
//! through an AWGN channel and demodulated back to text. The whole pipeline
//! is batch, single threaded and a pure function of (configs, plaintext,
//! RNG seed).
//!
//! ```no_run
//! use raman_whisper::{SimulationConfig, run_simulation};
//!
//! let sim = SimulationConfig {
//!     snr_db: 20.0,
//!     rng_seed: Some(1),
//!     ..SimulationConfig::default()
//! };
//! let result = run_simulation(Some(sim), None, None, Some("Chimera!"), None).unwrap();
//! assert_eq!(result.demodulation.recovered_message, "Chimera!");
//! ```

pub mod bits;
pub mod config;
pub mod error;
pub mod filters;
pub mod framing;
pub mod ldpc;
pub mod logging;
pub mod pipeline;
pub mod recovery;
pub mod recv;
pub mod send;

pub use config::{FrameLayout, LdpcConfig, ProtocolConfig, SampleFormat, SimulationConfig};
pub use error::{ModemError, Result};
pub use framing::build_full_bitstream;
pub use ldpc::{LdpcMatrices, create_matrices};
pub use pipeline::{SimulationResult, run_simulation};
pub use recovery::{LoopGains, RecoveryOutput, timing_and_carrier_recovery};
pub use recv::{
    DemodulationDiagnostics, DemodulationResult, demodulate_and_decode, find_frame_sync,
};
pub use send::{EncodingResult, generate_modulated_signal};
