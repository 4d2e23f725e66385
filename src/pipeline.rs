//! End-to-end convenience wrapper: matrices, encode, channel, decode.

use rand::rngs::StdRng;
use tracing::info;

use crate::config::{LdpcConfig, ProtocolConfig, SimulationConfig};
use crate::error::Result;
use crate::ldpc::{LdpcMatrices, create_matrices};
use crate::recovery::LoopGains;
use crate::recv::{DemodulationResult, demodulate_and_decode};
use crate::send::{EncodingResult, generate_modulated_signal};

/// Aggregated outputs of one encode -> channel -> decode run.
#[derive(Clone, Debug)]
pub struct SimulationResult {
    pub encoding: EncodingResult,
    pub demodulation: DemodulationResult,
    pub matrices: LdpcMatrices,
}

/// Run the full pipeline. Any `None` argument falls back to its default
/// configuration; `plaintext` falls back to the one in the simulation
/// config. A run is a pure function of (configs, plaintext, RNG seed).
pub fn run_simulation(
    sim: Option<SimulationConfig>,
    protocol: Option<ProtocolConfig>,
    ldpc: Option<LdpcConfig>,
    plaintext: Option<&str>,
    rng: Option<&mut StdRng>,
) -> Result<SimulationResult> {
    let sim = sim.unwrap_or_default();
    let protocol = protocol.unwrap_or_default();
    let ldpc = ldpc.unwrap_or_default();

    let matrices = create_matrices(&protocol, &ldpc)?;
    let encoding = generate_modulated_signal(&sim, &protocol, &matrices, plaintext, rng)?;
    let demodulation =
        demodulate_and_decode(&encoding, &matrices, &sim, &protocol, &LoopGains::default())?;

    info!(
        recovered_chars = demodulation.recovered_message.len(),
        post_fec_ber = demodulation.post_fec_ber,
        "simulation complete"
    );
    Ok(SimulationResult {
        encoding,
        demodulation,
        matrices,
    })
}
