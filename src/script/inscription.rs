//! Inscription-envelope detector.
//!
//! Recognises the standard ord envelope `OP_FALSE OP_IF "ord" ...
//! OP_ENDIF <p2pkh>` and extracts the content-type field and the trailing
//! P2PKH pubkey hash, per spec.md §4.2/§9. Non-standard envelope variants
//! are deliberately unrecognised.

use bitcoin::blockdata::opcodes::all as opcodes;
use bitcoin::blockdata::script::{Instruction, Script};

const ORD_TAG: &[u8] = b"ord";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InscriptionEnvelope {
    pub content_type: String,
    pub pkh: [u8; 20],
}

/// Returns `Some` only for the standard
/// `OP_FALSE OP_IF "ord" OP_1 <content-type> OP_0 <content> OP_ENDIF <p2pkh>`
/// envelope shape.
pub fn detect_inscription(script: &Script) -> Option<InscriptionEnvelope> {
    let mut instructions = script.instructions();

    expect_op(&mut instructions, opcodes::OP_PUSHBYTES_0.to_u8())?;
    expect_op(&mut instructions, opcodes::OP_IF.to_u8())?;
    expect_push(&mut instructions, ORD_TAG)?;
    expect_op(&mut instructions, opcodes::OP_PUSHNUM_1.to_u8())?;
    let content_type = next_push(&mut instructions)?;
    expect_op(&mut instructions, opcodes::OP_PUSHBYTES_0.to_u8())?;
    let _content = next_push(&mut instructions)?;
    expect_op(&mut instructions, opcodes::OP_ENDIF.to_u8())?;

    expect_op(&mut instructions, opcodes::OP_DUP.to_u8())?;
    expect_op(&mut instructions, opcodes::OP_HASH160.to_u8())?;
    let pkh = next_push(&mut instructions)?;
    expect_op(&mut instructions, opcodes::OP_EQUALVERIFY.to_u8())?;
    expect_op(&mut instructions, opcodes::OP_CHECKSIG.to_u8())?;

    if pkh.len() != 20 {
        return None;
    }
    let mut pkh_arr = [0u8; 20];
    pkh_arr.copy_from_slice(&pkh);

    let content_type = String::from_utf8(content_type).ok()?;

    Some(InscriptionEnvelope {
        content_type,
        pkh: pkh_arr,
    })
}

type Instructions<'a> = bitcoin::blockdata::script::Instructions<'a>;

fn expect_op(instructions: &mut Instructions, expected: u8) -> Option<()> {
    match instructions.next()? {
        Ok(Instruction::Op(opcode)) if opcode.to_u8() == expected => Some(()),
        _ => None,
    }
}

fn expect_push(instructions: &mut Instructions, expected: &[u8]) -> Option<()> {
    match instructions.next()? {
        Ok(Instruction::PushBytes(bytes)) if bytes.as_bytes() == expected => Some(()),
        _ => None,
    }
}

fn next_push(instructions: &mut Instructions) -> Option<Vec<u8>> {
    match instructions.next()? {
        Ok(Instruction::PushBytes(bytes)) => Some(bytes.as_bytes().to_vec()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::blockdata::script::Builder;

    fn envelope(content_type: &[u8], content: &[u8], pkh: [u8; 20]) -> bitcoin::ScriptBuf {
        Builder::new()
            .push_opcode(opcodes::OP_PUSHBYTES_0)
            .push_opcode(opcodes::OP_IF)
            .push_slice(ORD_TAG)
            .push_opcode(opcodes::OP_PUSHNUM_1)
            .push_slice(content_type)
            .push_opcode(opcodes::OP_PUSHBYTES_0)
            .push_slice(content)
            .push_opcode(opcodes::OP_ENDIF)
            .push_opcode(opcodes::OP_DUP)
            .push_opcode(opcodes::OP_HASH160)
            .push_slice(pkh)
            .push_opcode(opcodes::OP_EQUALVERIFY)
            .push_opcode(opcodes::OP_CHECKSIG)
            .into_script()
    }

    #[test]
    fn detects_standard_envelope() {
        let pkh = [7u8; 20];
        let script = envelope(b"text/plain", b"hello world", pkh);
        let found = detect_inscription(&script).unwrap();
        assert_eq!(found.content_type, "text/plain");
        assert_eq!(found.pkh, pkh);
    }

    #[test]
    fn rejects_plain_p2pkh() {
        let script = Builder::new()
            .push_opcode(opcodes::OP_DUP)
            .push_opcode(opcodes::OP_HASH160)
            .push_slice([0u8; 20])
            .push_opcode(opcodes::OP_EQUALVERIFY)
            .push_opcode(opcodes::OP_CHECKSIG)
            .into_script();
        assert!(detect_inscription(&script).is_none());
    }
}
