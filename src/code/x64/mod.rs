//! x86-64 encodings

/// Length of [`jmp_abs`]
pub const JMP_ABS_LEN: usize = 14;

/// `jmp qword ptr [rip + 0]`
const JMP_RIP: [u8; 6] = [0xff, 0x25, 0x00, 0x00, 0x00, 0x00];

/// Generates an absolute jump to `target` that works from any address: the destination is stored right after the
/// instruction and read through a zero RIP-relative displacement
pub fn jmp_abs(target: u64) -> [u8; JMP_ABS_LEN] {
    let mut code = [0u8; JMP_ABS_LEN];
    code[..JMP_RIP.len()].copy_from_slice(&JMP_RIP);
    code[JMP_RIP.len()..].copy_from_slice(&target.to_le_bytes());
    code
}
