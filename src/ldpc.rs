//! Rate-4/5 regular LDPC code: construction, encoding and soft decoding.
//!
//! The parity-check matrix is built directly in systematic form
//! `H = [A | I]` so that `G = [I | A^T]` satisfies `G * H^T = 0` by
//! construction. `A` assigns every message column one check row per band
//! through a seeded quasi-cyclic schedule with distinct offsets, which keeps
//! any two message columns from sharing more than one check (girth >= 6).
//! A plain Gallager matrix cannot be used here: with column weight 2 its two
//! band sums coincide, the matrix is rank deficient and no column
//! permutation yields a systematic form. The identity block also pins the
//! row weight: each check takes `k * dv / (n - k)` band edges plus its
//! identity bit (9 for the default layout), so `dc` in the configuration is
//! the Gallager profile target, not an independent knob.
//!
//! Matrix rows are bit-packed into `u64` words; encoding and syndrome
//! evaluation are XOR/popcount over packed rows.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::config::{LdpcConfig, ProtocolConfig};
use crate::error::{ModemError, Result};

/// Dense binary matrix with bit-packed rows.
#[derive(Clone, Debug)]
pub struct BitMatrix {
    rows: usize,
    cols: usize,
    words_per_row: usize,
    data: Vec<u64>,
}

impl BitMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        let words_per_row = cols.div_ceil(64);
        Self {
            rows,
            cols,
            words_per_row,
            data: vec![0; rows * words_per_row],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn set(&mut self, r: usize, c: usize, value: bool) {
        let word = r * self.words_per_row + c / 64;
        let mask = 1u64 << (c % 64);
        if value {
            self.data[word] |= mask;
        } else {
            self.data[word] &= !mask;
        }
    }

    pub fn get(&self, r: usize, c: usize) -> bool {
        (self.data[r * self.words_per_row + c / 64] >> (c % 64)) & 1 == 1
    }

    pub fn row(&self, r: usize) -> &[u64] {
        &self.data[r * self.words_per_row..(r + 1) * self.words_per_row]
    }

    /// XOR row `r` into an external word buffer.
    pub fn xor_row_into(&self, r: usize, acc: &mut [u64]) {
        for (a, w) in acc.iter_mut().zip(self.row(r)) {
            *a ^= w;
        }
    }

    /// Parity of the AND of row `r` with a packed word buffer.
    pub fn row_dot_parity(&self, r: usize, words: &[u64]) -> u8 {
        let ones: u32 = self
            .row(r)
            .iter()
            .zip(words)
            .map(|(a, b)| (a & b).count_ones())
            .sum();
        (ones & 1) as u8
    }
}

/// Pack 0/1 bits into `u64` words, LSB of word 0 first.
pub fn pack_words(bits: &[u8]) -> Vec<u64> {
    let mut words = vec![0u64; bits.len().div_ceil(64)];
    for (i, &b) in bits.iter().enumerate() {
        if b != 0 {
            words[i / 64] |= 1u64 << (i % 64);
        }
    }
    words
}

/// Parity-check and generator matrices plus the Tanner graph adjacency used
/// by the decoder. Built once per configuration, shared read-only afterwards.
#[derive(Clone, Debug)]
pub struct LdpcMatrices {
    pub h: BitMatrix,
    pub g: BitMatrix,
    pub message_bits: usize,
    pub codeword_bits: usize,
    /// Columns participating in each check row.
    check_adj: Vec<Vec<usize>>,
    /// `(check, slot)` pairs for each variable column.
    var_adj: Vec<Vec<(usize, usize)>>,
}

/// Decoder iteration cap. Early exit on a zero syndrome.
const MAX_ITERATIONS: usize = 50;

/// Hard-decision inputs carry limited information no matter the channel;
/// the assumed noise variance is clamped so single-bit errors stay above the
/// belief-propagation flip threshold.
const HARD_INPUT_VARIANCE_CAP: f64 = 0.25;

/// Build `(H, G)` for the frame layout in `protocol` using the seeded
/// construction in `config`.
pub fn create_matrices(protocol: &ProtocolConfig, config: &LdpcConfig) -> Result<LdpcMatrices> {
    let layout = &protocol.frame_layout;
    let k = layout.message_bits();
    let n = layout.codeword_bits();
    let m = n - k;

    debug!(
        k,
        n,
        dv = config.dv,
        dc = config.dc,
        seed = config.seed,
        "generating LDPC matrices"
    );

    if config.dv == 0 || m % config.dv != 0 {
        return Err(ModemError::InvalidArgument(format!(
            "check count {m} is not divisible into {} bands",
            config.dv
        )));
    }
    let band_rows = m / config.dv;
    if band_rows == 0 || k % band_rows != 0 {
        return Err(ModemError::InvalidArgument(format!(
            "message width {k} does not balance over {band_rows} rows per band"
        )));
    }
    let per_row = k / band_rows;
    if per_row > band_rows {
        return Err(ModemError::InvalidArgument(format!(
            "band of {band_rows} rows cannot host {per_row} distinct offsets"
        )));
    }
    // Row weight is fixed by the shape, not by `dc`: every row takes
    // `k * dv / m` band edges plus its identity bit.
    let row_weight = per_row + 1;
    debug!(
        row_weight,
        target_dc = config.dc,
        "systematic construction row weight"
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut h = BitMatrix::zeros(m, n);

    // Message columns are enumerated as (base row, schedule slot) pairs in a
    // shuffled order. Band 0 takes the base row directly; each further band
    // applies a shuffled row map to the base row shifted by a per-slot
    // offset. Distinct offsets within a band guarantee that two columns
    // never share two check rows.
    let mut pairs: Vec<(usize, usize)> = (0..per_row)
        .flat_map(|t| (0..band_rows).map(move |i| (i, t)))
        .collect();
    pairs.shuffle(&mut rng);

    for (col, &(i, _)) in pairs.iter().enumerate() {
        h.set(i, col, true);
    }
    for band in 1..config.dv {
        let mut offsets: Vec<usize> = (0..band_rows).collect();
        offsets.shuffle(&mut rng);
        offsets.truncate(per_row);
        let mut row_map: Vec<usize> = (0..band_rows).collect();
        row_map.shuffle(&mut rng);
        for (col, &(i, t)) in pairs.iter().enumerate() {
            let row = row_map[(i + offsets[t]) % band_rows];
            h.set(band * band_rows + row, col, true);
        }
    }
    for j in 0..m {
        h.set(j, k + j, true);
    }

    // G = [I_k | A^T] mod 2, with A the first k columns of H.
    let mut g = BitMatrix::zeros(k, n);
    for i in 0..k {
        g.set(i, i, true);
        for j in 0..m {
            if h.get(j, i) {
                g.set(i, k + j, true);
            }
        }
    }
    if g.rows() != k || g.cols() != n {
        return Err(ModemError::MatrixShape {
            rows: g.rows(),
            cols: g.cols(),
            k,
            n,
        });
    }

    let check_adj: Vec<Vec<usize>> = (0..m)
        .map(|i| (0..n).filter(|&j| h.get(i, j)).collect())
        .collect();
    let mut var_adj: Vec<Vec<(usize, usize)>> = vec![Vec::new(); n];
    for (i, cols) in check_adj.iter().enumerate() {
        for (slot, &j) in cols.iter().enumerate() {
            var_adj[j].push((i, slot));
        }
    }

    Ok(LdpcMatrices {
        h,
        g,
        message_bits: k,
        codeword_bits: n,
        check_adj,
        var_adj,
    })
}

impl LdpcMatrices {
    /// Systematic encoding: the codeword is the XOR of the generator rows
    /// selected by the message bits, so `codeword[..k] == message`.
    pub fn encode(&self, message: &[u8]) -> Vec<u8> {
        assert_eq!(message.len(), self.message_bits);
        let mut acc = vec![0u64; self.codeword_bits.div_ceil(64)];
        for (i, &bit) in message.iter().enumerate() {
            if bit != 0 {
                self.g.xor_row_into(i, &mut acc);
            }
        }
        (0..self.codeword_bits)
            .map(|j| (acc[j / 64] >> (j % 64) & 1) as u8)
            .collect()
    }

    /// Syndrome test against `H` for a packed codeword.
    pub fn syndrome_is_zero(&self, codeword: &[u8]) -> bool {
        let words = pack_words(codeword);
        (0..self.h.rows()).all(|r| self.h.row_dot_parity(r, &words) == 0)
    }

    /// Log-domain belief propagation over `H`.
    ///
    /// `received` holds hard bit decisions; `snr_db` scales the prior
    /// log-likelihood ratios. Returns the `message_bits` recovered bits.
    /// If the syndrome has not cleared after the iteration cap the received
    /// systematic bits are handed back unchanged; the condition is reported
    /// through the bit error rate, not as an error.
    pub fn decode(&self, received: &[u8], snr_db: f64) -> Vec<u8> {
        assert_eq!(received.len(), self.codeword_bits);
        let n = self.codeword_bits;
        let m = n - self.message_bits;

        let sigma2 = f64::powf(10.0, -snr_db / 10.0).min(HARD_INPUT_VARIANCE_CAP);
        let llr: Vec<f64> = received
            .iter()
            .map(|&b| 2.0 * (1.0 - 2.0 * b as f64) / sigma2)
            .collect();

        // Messages from check i to its slot-th neighbour.
        let mut check_msg: Vec<Vec<f64>> = self
            .check_adj
            .iter()
            .map(|cols| vec![0.0; cols.len()])
            .collect();
        let mut totals = llr.clone();

        for _ in 0..MAX_ITERATIONS {
            for (j, total) in totals.iter_mut().enumerate() {
                *total = llr[j]
                    + self.var_adj[j]
                        .iter()
                        .map(|&(i, slot)| check_msg[i][slot])
                        .sum::<f64>();
            }

            let hard: Vec<u8> = totals.iter().map(|&z| (z < 0.0) as u8).collect();
            let satisfied = (0..m).all(|i| {
                self.check_adj[i]
                    .iter()
                    .fold(0u8, |acc, &j| acc ^ hard[j])
                    == 0
            });
            if satisfied {
                return hard[..self.message_bits].to_vec();
            }

            for (cols, msgs) in self.check_adj.iter().zip(check_msg.iter_mut()) {
                // Extrinsic inputs snapshotted before any slot is updated.
                let incoming: Vec<f64> = cols
                    .iter()
                    .zip(msgs.iter())
                    .map(|(&j, &msg)| (totals[j] - msg).clamp(-38.0, 38.0))
                    .collect();
                for slot in 0..cols.len() {
                    let mut product = 1.0f64;
                    for (other, &v) in incoming.iter().enumerate() {
                        if other != slot {
                            product *= (v / 2.0).tanh();
                        }
                    }
                    msgs[slot] =
                        2.0 * product.clamp(-0.999_999_999_999, 0.999_999_999_999).atanh();
                }
            }
        }

        debug!("LDPC decoder did not converge, returning hard decisions");
        received[..self.message_bits].to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn defaults() -> (ProtocolConfig, LdpcConfig) {
        (ProtocolConfig::default(), LdpcConfig::default())
    }

    fn random_message(rng: &mut StdRng, k: usize) -> Vec<u8> {
        (0..k).map(|_| rng.random_range(0..=1u8)).collect()
    }

    #[test]
    fn generator_annihilates_parity_checks() {
        let (protocol, _) = defaults();
        for seed in [0u64, 1, 7, 42, 123, 2024] {
            let config = LdpcConfig {
                seed,
                ..LdpcConfig::default()
            };
            let matrices = create_matrices(&protocol, &config).unwrap();
            for i in 0..matrices.g.rows() {
                let row: Vec<u8> = (0..matrices.codeword_bits)
                    .map(|j| matrices.g.get(i, j) as u8)
                    .collect();
                assert!(
                    matrices.syndrome_is_zero(&row),
                    "G row {i} fails H for seed {seed}"
                );
            }
        }
    }

    #[test]
    fn construction_weights_match_systematic_profile() {
        let (protocol, config) = defaults();
        let matrices = create_matrices(&protocol, &config).unwrap();
        let k = matrices.message_bits;
        let n = matrices.codeword_bits;
        let m = n - k;

        // Every check row carries k * dv / m band edges plus one identity
        // bit; dc = 10 from the profile is not reachable in systematic form.
        let row_weight = k * config.dv / m + 1;
        assert_eq!(row_weight, 9);
        for i in 0..m {
            let ones = (0..n).filter(|&j| matrices.h.get(i, j)).count();
            assert_eq!(ones, row_weight, "row {i}");
        }
        // Message columns have weight dv, parity columns weight 1.
        for j in 0..n {
            let ones = (0..m).filter(|&i| matrices.h.get(i, j)).count();
            let expected = if j < k { config.dv } else { 1 };
            assert_eq!(ones, expected, "column {j}");
        }
    }

    #[test]
    fn construction_is_deterministic() {
        let (protocol, config) = defaults();
        let a = create_matrices(&protocol, &config).unwrap();
        let b = create_matrices(&protocol, &config).unwrap();
        for i in 0..a.h.rows() {
            assert_eq!(a.h.row(i), b.h.row(i));
        }
    }

    #[test]
    fn encoding_is_systematic() {
        let (protocol, config) = defaults();
        let matrices = create_matrices(&protocol, &config).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..20 {
            let message = random_message(&mut rng, matrices.message_bits);
            let codeword = matrices.encode(&message);
            assert_eq!(codeword.len(), matrices.codeword_bits);
            assert_eq!(&codeword[..matrices.message_bits], &message[..]);
            assert!(matrices.syndrome_is_zero(&codeword));
        }
    }

    #[test]
    fn clean_codeword_decodes_immediately() {
        let (protocol, config) = defaults();
        let matrices = create_matrices(&protocol, &config).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let message = random_message(&mut rng, matrices.message_bits);
        let codeword = matrices.encode(&message);
        assert_eq!(matrices.decode(&codeword, 3.0), message);
    }

    #[test]
    fn single_bit_errors_are_corrected() {
        let (protocol, config) = defaults();
        let matrices = create_matrices(&protocol, &config).unwrap();
        let mut rng = StdRng::seed_from_u64(13);
        for trial in 0..20 {
            let message = random_message(&mut rng, matrices.message_bits);
            let mut codeword = matrices.encode(&message);
            let pos = rng.random_range(0..matrices.message_bits);
            codeword[pos] ^= 1;
            assert_eq!(
                matrices.decode(&codeword, 3.0),
                message,
                "trial {trial}: error at {pos} not corrected"
            );
        }
    }

    #[test]
    fn divergence_returns_received_hard_bits() {
        let (protocol, config) = defaults();
        let matrices = create_matrices(&protocol, &config).unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let message = random_message(&mut rng, matrices.message_bits);
        let mut codeword = matrices.encode(&message);
        // Heavy damage: a third of the codeword flipped. Whatever the
        // decoder does it must stay deterministic and return k bits.
        for pos in (0..matrices.codeword_bits).step_by(3) {
            codeword[pos] ^= 1;
        }
        let first = matrices.decode(&codeword, 3.0);
        let second = matrices.decode(&codeword, 3.0);
        assert_eq!(first.len(), matrices.message_bits);
        assert_eq!(first, second);
    }

    #[test]
    fn decode_at_high_snr_is_stable() {
        // LLR magnitudes saturate tanh; no NaN or panic allowed.
        let (protocol, config) = defaults();
        let matrices = create_matrices(&protocol, &config).unwrap();
        let mut rng = StdRng::seed_from_u64(19);
        let message = random_message(&mut rng, matrices.message_bits);
        let mut codeword = matrices.encode(&message);
        codeword[matrices.codeword_bits - 1] ^= 1;
        let decoded = matrices.decode(&codeword, 100.0);
        assert_eq!(decoded, message);
    }
}
