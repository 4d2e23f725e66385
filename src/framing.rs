//! Frame assembly: payload chunks are LDPC-encoded and wrapped with the
//! sync, target-id and command header fields.

use tracing::debug;

use crate::bits::{bits_to_str, hex_to_bits, int_to_bits};
use crate::config::ProtocolConfig;
use crate::error::{ModemError, Result};
use crate::ldpc::LdpcMatrices;

/// Frames logged in full at debug level before the stream goes quiet.
const TRACE_FRAMES: usize = 3;

/// Build the complete transmit bit stream for `payload_bits`.
///
/// Each frame carries one `message_bits` chunk of the payload (zero padded
/// at the tail) encoded to a systematic codeword, prefixed by the constant
/// sync and target-id words and the per-frame command word. Returns the
/// stream and the number of frames.
pub fn build_full_bitstream(
    payload_bits: &[u8],
    protocol: &ProtocolConfig,
    matrices: &LdpcMatrices,
) -> Result<(Vec<u8>, usize)> {
    let layout = &protocol.frame_layout;
    let k = matrices.message_bits;
    let total_frames = payload_bits.len().div_ceil(k).max(1);

    if total_frames > protocol.max_frames {
        return Err(ModemError::ProtocolOverflow {
            required: total_frames,
            max: protocol.max_frames,
        });
    }
    debug!(total_frames, "payload framed");

    let sync_bits = hex_to_bits(&protocol.sync_sequence_hex, layout.sync_symbols * 2)?;
    let target_id_bits = hex_to_bits(&protocol.target_id_hex, layout.target_id_symbols * 2)?;

    let mut stream = Vec::with_capacity(total_frames * layout.frame_bits());
    for frame_idx in 0..total_frames {
        let command = protocol.command_opcode as u64
            | (frame_idx as u64) << protocol.current_frame_shift
            | (total_frames as u64) << protocol.total_frames_shift;
        let command_bits = int_to_bits(command, layout.command_type_symbols * 2)?;

        let start = frame_idx * k;
        let end = ((frame_idx + 1) * k).min(payload_bits.len());
        let mut chunk = payload_bits[start..end].to_vec();
        chunk.resize(k, 0);
        let codeword = matrices.encode(&chunk);

        if frame_idx < TRACE_FRAMES {
            debug!(
                "[TX] frame {}/{} command=0x{:08X} payload={}... ecc={}",
                frame_idx + 1,
                total_frames,
                command,
                bits_to_str(&codeword[..k], 32),
                bits_to_str(&codeword[k..], 32),
            );
        }

        stream.extend_from_slice(&sync_bits);
        stream.extend_from_slice(&target_id_bits);
        stream.extend_from_slice(&command_bits);
        stream.extend_from_slice(&codeword);
    }

    Ok((stream, total_frames))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::string_to_bits;
    use crate::config::LdpcConfig;
    use crate::ldpc::create_matrices;

    fn setup() -> (ProtocolConfig, LdpcMatrices) {
        let protocol = ProtocolConfig::default();
        let matrices = create_matrices(&protocol, &LdpcConfig::default()).unwrap();
        (protocol, matrices)
    }

    #[test]
    fn frame_header_is_constant_and_codeword_valid() {
        let (protocol, matrices) = setup();
        let payload = string_to_bits("frame layout check, three frames of text please!");
        let (stream, total) = build_full_bitstream(&payload, &protocol, &matrices).unwrap();
        assert_eq!(total, 3);
        assert_eq!(stream.len(), total * 256);

        let sync = hex_to_bits("A5A5A5A5", 32).unwrap();
        let target = hex_to_bits("DEADBEEF", 32).unwrap();
        for frame_idx in 0..total {
            let frame = &stream[frame_idx * 256..(frame_idx + 1) * 256];
            assert_eq!(&frame[..32], &sync[..]);
            assert_eq!(&frame[32..64], &target[..]);
            let command = protocol.command_opcode as u64
                | (frame_idx as u64) << 16
                | (total as u64) << 24;
            assert_eq!(&frame[64..96], &int_to_bits(command, 32).unwrap()[..]);
            assert!(matrices.syndrome_is_zero(&frame[96..256]));
        }
    }

    #[test]
    fn payload_survives_in_systematic_region() {
        let (protocol, matrices) = setup();
        let payload = string_to_bits("0123456789ABCDEF");
        let (stream, total) = build_full_bitstream(&payload, &protocol, &matrices).unwrap();
        assert_eq!(total, 1);
        assert_eq!(&stream[96..96 + payload.len()], &payload[..]);
    }

    #[test]
    fn empty_payload_yields_single_frame() {
        let (protocol, matrices) = setup();
        let (stream, total) = build_full_bitstream(&[], &protocol, &matrices).unwrap();
        assert_eq!(total, 1);
        assert_eq!(stream.len(), 256);
        // Zero message encodes to the all-zero codeword.
        assert!(stream[96..256].iter().all(|&b| b == 0));
    }

    #[test]
    fn oversize_payload_is_fatal() {
        let (protocol, matrices) = setup();
        let payload = vec![0u8; 257 * 128];
        match build_full_bitstream(&payload, &protocol, &matrices) {
            Err(ModemError::ProtocolOverflow { required, max }) => {
                assert_eq!(required, 257);
                assert_eq!(max, 256);
            }
            other => panic!("expected ProtocolOverflow, got {other:?}"),
        }
    }
}
