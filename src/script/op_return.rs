//! OP_RETURN builder: `OP_FALSE OP_RETURN "wrootz" <action> <data>`.
//!
//! `Builder::push_slice` already chooses the minimal pushdata opcode
//! (direct push, `OP_PUSHDATA1/2/4`) based on operand size, so this is a
//! thin assembly step rather than a hand-rolled encoder.

use bitcoin::blockdata::opcodes::all::{OP_PUSHBYTES_0, OP_RETURN};
use bitcoin::blockdata::script::Builder;
use bitcoin::ScriptBuf;

const PROTOCOL_TAG: &[u8] = b"wrootz";

pub fn build_op_return(action: &str, data: &[u8]) -> ScriptBuf {
    Builder::new()
        .push_opcode(OP_PUSHBYTES_0)
        .push_opcode(OP_RETURN)
        .push_slice(PROTOCOL_TAG)
        .push_slice(action.as_bytes())
        .push_slice(data)
        .into_script()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_payload_uses_direct_push() {
        let script = build_op_return("transfer", b"short");
        // OP_FALSE, OP_RETURN, then 3 direct pushes each with a 1-byte
        // length prefix (no OP_PUSHDATA1/2/4 needed below 76 bytes).
        assert_eq!(script.as_bytes()[0], OP_PUSHBYTES_0.to_u8());
        assert_eq!(script.as_bytes()[1], OP_RETURN.to_u8());
    }

    #[test]
    fn large_payload_uses_pushdata1() {
        let data = vec![0u8; 100];
        let script = build_op_return("inscribe", &data);
        assert!(script.as_bytes().windows(2).any(|w| w[0] == 0x4c));
    }
}
