//! 32-bit x86 encodings

/// Length of [`jmp_abs`]
pub const JMP_ABS_LEN: usize = 10;

/// Generates `jmp dword ptr [source + 6]` followed by `target`.
///
/// 32-bit x86 has no RIP-relative addressing, so the pointer operand holds the absolute address of the stored target.
pub fn jmp_abs(source: u32, target: u32) -> [u8; JMP_ABS_LEN] {
    let mut code = [0u8; JMP_ABS_LEN];
    code[0] = 0xff;
    code[1] = 0x25;
    code[2..6].copy_from_slice(&source.wrapping_add(6).to_le_bytes());
    code[6..].copy_from_slice(&target.to_le_bytes());
    code
}
