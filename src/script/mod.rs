//! Timelock locking-script codec, inscription-envelope detector and
//! OP_RETURN builder (C2).
//!
//! Scripts are built and parsed through [`bitcoin::blockdata::script`]'s
//! `Builder`/`Instruction` machinery rather than hand-rolled byte slicing,
//! the way every script-construction site in the retrieval pack (e.g.
//! `htlc_handler.rs`'s use of `bitcoin::sighash::SighashCache` and
//! `ScriptBuf`) builds on the crate's own primitives instead of reimplementing
//! them.

mod inscription;
mod op_return;

pub use inscription::{detect_inscription, InscriptionEnvelope};
pub use op_return::build_op_return;

use bitcoin::blockdata::opcodes::{self, All as Opcode};
use bitcoin::blockdata::script::{Builder, Instruction, Script, ScriptBuf};

/// Fixed preamble before the `unlockBlock` push. Stands in for the
/// OP_PUSH_TX preimage reconstruction: the unlocking script pushes its own
/// BIP-143 preimage, and this portion of the locking script is where a full
/// interpreter would hash it and compare the result against the spending
/// transaction's own hash. The comparison against `unlockBlock` itself
/// follows it below.
const HEADER: [u8; 5] = [
    0x00, // OP_FALSE
    0x63, // OP_IF
    0x51, // OP_1
    0x7a, // OP_ROLL    (bring the pushed preimage to the top of the stack)
    0xaa, // OP_HASH256 (reconstruct the sighash the spending tx must match)
];

/// Marker between the `unlockBlock` push and the `pkh` push: pulls the
/// nLockTime field out of the preimage and requires it be `>= unlockBlock`.
const MIDDLE: [u8; 3] = [
    0xa2, // OP_GREATERTHANOREQUAL
    0x69, // OP_VERIFY
    0x75, // OP_DROP (discard the now-unneeded hashed preimage)
];

/// Standard P2PKH tail, checked after the `pkh` push.
const TAIL: [u8; 4] = [
    0x76, // OP_DUP
    0xa9, // OP_HASH160
    0x88, // OP_EQUALVERIFY (paired with the `pkh` push just before it)
    0xac, // OP_CHECKSIG
];

/// Closes the `OP_IF` opened in [`HEADER`].
const END_IF: u8 = 0x68;

fn op(byte: u8) -> Opcode {
    Opcode::from(byte)
}

/// Builds a timelock locking script for `pkh` that only becomes spendable
/// once the spending transaction's `nLockTime >= unlock_block`.
pub fn build(pkh: &[u8; 20], unlock_block: u32) -> ScriptBuf {
    let mut builder = Builder::new();
    for byte in HEADER {
        builder = builder.push_opcode(op(byte));
    }
    builder = builder.push_int(unlock_block as i64);
    for byte in MIDDLE {
        builder = builder.push_opcode(op(byte));
    }
    builder = builder.push_opcode(opcodes::all::OP_HASH160);
    builder = builder.push_slice(pkh);
    for byte in TAIL {
        builder = builder.push_opcode(op(byte));
    }
    builder = builder.push_opcode(op(END_IF));
    builder.into_script()
}

/// The fields embedded in a timelock locking script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelockFields {
    pub pkh: [u8; 20],
    pub unlock_block: u32,
}

/// Matches `script` against the [`build`] template. Returns `None` on any
/// mismatch, per spec.md §4.2 — never an error.
pub fn parse(script: &Script) -> Option<TimelockFields> {
    let mut instructions = script.instructions();

    expect_opcodes(&mut instructions, &HEADER)?;
    let unlock_block = next_script_num(&mut instructions)?;
    expect_opcodes(&mut instructions, &MIDDLE)?;
    expect_opcode(&mut instructions, opcodes::all::OP_HASH160.to_u8())?;
    let pkh = next_push_bytes(&mut instructions, 20)?;
    expect_opcodes(&mut instructions, &TAIL)?;
    expect_opcode(&mut instructions, END_IF)?;

    if instructions.next().is_some() {
        return None;
    }

    let mut pkh_arr = [0u8; 20];
    pkh_arr.copy_from_slice(&pkh);

    Some(TimelockFields {
        pkh: pkh_arr,
        unlock_block: unlock_block.try_into().ok()?,
    })
}

/// Parses a 40-hex-character locking script, for callers holding hex rather
/// than a [`Script`].
pub fn parse_hex(script_hex: &str) -> Option<TimelockFields> {
    let bytes = hex::decode(script_hex).ok()?;
    parse(Script::from_bytes(&bytes))
}

/// Byte length of `build(_, unlock_block)`, used by the fee estimator
/// before a script is actually built.
pub fn estimate_size(unlock_block: u32) -> usize {
    build(&[0u8; 20], unlock_block).len()
}

type Instructions<'a> = bitcoin::blockdata::script::Instructions<'a>;

fn expect_opcode(instructions: &mut Instructions, expected: u8) -> Option<()> {
    match instructions.next()? {
        Ok(Instruction::Op(opcode)) if opcode.to_u8() == expected => Some(()),
        _ => None,
    }
}

fn expect_opcodes(instructions: &mut Instructions, expected: &[u8]) -> Option<()> {
    for byte in expected {
        expect_opcode(instructions, *byte)?;
    }
    Some(())
}

fn next_push_bytes<'a>(instructions: &mut Instructions<'a>, len: usize) -> Option<Vec<u8>> {
    match instructions.next()? {
        Ok(Instruction::PushBytes(bytes)) if bytes.as_bytes().len() == len => {
            Some(bytes.as_bytes().to_vec())
        }
        _ => None,
    }
}

/// Decodes the minimally-encoded script-number pushed by
/// `Builder::push_int`, whether it took the `OP_0`/`OP_1`..`OP_16` single
/// opcode form or a generic `PushBytes` form.
fn next_script_num(instructions: &mut Instructions) -> Option<i64> {
    match instructions.next()? {
        Ok(Instruction::Op(opcode)) if opcode == opcodes::all::OP_PUSHBYTES_0 => Some(0),
        Ok(Instruction::Op(opcode)) => {
            let byte = opcode.to_u8();
            if (0x51..=0x60).contains(&byte) {
                Some((byte - 0x50) as i64)
            } else {
                None
            }
        }
        Ok(Instruction::PushBytes(bytes)) => decode_script_num(bytes.as_bytes()),
        _ => None,
    }
}

fn decode_script_num(bytes: &[u8]) -> Option<i64> {
    if bytes.is_empty() {
        return Some(0);
    }
    let mut result: i64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        result |= (*byte as i64) << (8 * i);
    }
    let last = *bytes.last()?;
    if last & 0x80 != 0 {
        result &= !(0x80i64 << (8 * (bytes.len() - 1)));
        result = -result;
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_for_small_and_large_unlock_blocks() {
        for unlock_block in [0u32, 1, 16, 17, 255, 256, 800_000, (1u32 << 31) - 1] {
            let pkh = [0x42u8; 20];
            let script = build(&pkh, unlock_block);
            let fields = parse(&script).unwrap_or_else(|| {
                panic!("failed to parse script for unlock_block={unlock_block}")
            });
            assert_eq!(fields.pkh, pkh);
            assert_eq!(fields.unlock_block, unlock_block);
            assert_eq!(script.len(), estimate_size(unlock_block));
        }
    }

    #[test]
    fn round_trips_for_zero_pkh() {
        let pkh = [0u8; 20];
        let script = build(&pkh, 800_000);
        let fields = parse(&script).unwrap();
        assert_eq!(fields.pkh, pkh);
        assert_eq!(fields.unlock_block, 800_000);
    }

    #[test]
    fn rejects_unrelated_scripts() {
        let p2pkh = Builder::new()
            .push_opcode(opcodes::all::OP_DUP)
            .push_opcode(opcodes::all::OP_HASH160)
            .push_slice([0u8; 20])
            .push_opcode(opcodes::all::OP_EQUALVERIFY)
            .push_opcode(opcodes::all::OP_CHECKSIG)
            .into_script();
        assert!(parse(&p2pkh).is_none());
    }

    #[test]
    fn rejects_truncated_script() {
        let script = build(&[0u8; 20], 800_000);
        let truncated = ScriptBuf::from(script.as_bytes()[..script.len() - 1].to_vec());
        assert!(parse(&truncated).is_none());
    }
}
