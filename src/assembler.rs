//! Native x86_64 template provider.
//!
//! Assembles the prologue/body/epilogue triple at runtime with dynasm instead
//! of shipping hand-encoded tables. The generated triple mirrors the shape of
//! the historical template: the prologue seeds a set of stack slots from the
//! input argument and fixed constants, the body performs one round of
//! deterministic arithmetic over those slots, and the epilogue loads the
//! result slot and returns.
//!
//! The body chunk reads and writes only fixed rbp-relative slots and contains
//! no branches, so it is valid to repeat any number of times. With zero
//! repetitions the result slot still holds the value seeded by the prologue.

use crate::error::{HarnessError, Result};
use crate::template::{CodeTemplate, CodeTemplateProvider};
use dynasmrt::{dynasm, x64::Assembler, DynasmApi};

// Stack-slot layout, rbp-relative:
//   -4  a (input)     -8  b    -12 c    -16 d
//   -20 e (scratch)   -24 result
const LOCAL_FRAME_BYTES: i32 = 32;

/// Produces an executable System V AMD64 template for
/// `extern "C" fn(i32) -> i32`.
pub struct NativeX64Provider;

impl CodeTemplateProvider for NativeX64Provider {
    fn template(&self) -> Result<CodeTemplate> {
        Ok(CodeTemplate::new(
            prologue_bytes()?,
            body_bytes()?,
            epilogue_bytes()?,
        ))
    }
}

fn new_assembler() -> Result<Assembler> {
    // The assembler allocates a small executable scratch buffer of its own.
    Assembler::new().map_err(|e| HarnessError::AllocationFailure {
        size: 0,
        errno: e.raw_os_error(),
    })
}

fn prologue_bytes() -> Result<Vec<u8>> {
    let mut ops = new_assembler()?;
    dynasm!(ops
        ; .arch x64
        ; push rbp
        ; mov rbp, rsp
        ; sub rsp, LOCAL_FRAME_BYTES
        ; mov DWORD [rbp - 8], 0x12334
        ; mov DWORD [rbp - 12], 0x3456
        ; mov DWORD [rbp - 16], 0x7896
        ; mov DWORD [rbp - 24], 0
        ; mov [rbp - 4], edi
    );
    finalize(ops)
}

fn body_bytes() -> Result<Vec<u8>> {
    let mut ops = new_assembler()?;
    dynasm!(ops
        ; .arch x64
        // d = b * a * c
        ; mov ecx, [rbp - 8]
        ; imul ecx, [rbp - 4]
        ; imul ecx, [rbp - 12]
        ; mov [rbp - 16], ecx
        // a = a * b
        ; mov ecx, [rbp - 4]
        ; imul ecx, [rbp - 8]
        ; mov [rbp - 4], ecx
        // b = b * c
        ; mov edx, [rbp - 8]
        ; imul edx, [rbp - 12]
        ; mov [rbp - 8], edx
        // c = b * a
        ; mov eax, [rbp - 8]
        ; imul eax, [rbp - 4]
        ; mov [rbp - 12], eax
        // a = a ^ b
        ; mov ecx, [rbp - 4]
        ; xor ecx, [rbp - 8]
        ; mov [rbp - 4], ecx
        // b = b | (a ^ c)
        ; mov edx, [rbp - 4]
        ; xor edx, [rbp - 12]
        ; or edx, [rbp - 8]
        ; mov [rbp - 8], edx
        // c = b >> 5
        ; mov ecx, [rbp - 8]
        ; sar ecx, 5
        ; mov [rbp - 12], ecx
        // e = a + b + c
        ; mov eax, [rbp - 4]
        ; add eax, [rbp - 8]
        ; add eax, [rbp - 12]
        ; mov [rbp - 20], eax
        // result = e / 1000 + a
        ; cdq
        ; mov ecx, 1000
        ; idiv ecx
        ; add eax, [rbp - 4]
        ; mov [rbp - 24], eax
    );
    finalize(ops)
}

fn epilogue_bytes() -> Result<Vec<u8>> {
    let mut ops = new_assembler()?;
    dynasm!(ops
        ; .arch x64
        ; mov eax, [rbp - 24]
        ; mov rsp, rbp
        ; pop rbp
        ; ret
    );
    finalize(ops)
}

fn finalize(ops: Assembler) -> Result<Vec<u8>> {
    // No labels are emitted, so finalization cannot leave relocations
    // unresolved.
    match ops.finalize() {
        Ok(buf) => Ok(buf.to_vec()),
        Err(_) => Err(HarnessError::AllocationFailure {
            size: 0,
            errno: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_pieces_are_nonempty() {
        let template = NativeX64Provider.template().unwrap();
        assert!(!template.prologue().is_empty());
        assert!(!template.body().is_empty());
        assert!(!template.epilogue().is_empty());
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let a = NativeX64Provider.template().unwrap();
        let b = NativeX64Provider.template().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_epilogue_ends_with_ret() {
        let template = NativeX64Provider.template().unwrap();
        assert_eq!(template.epilogue().last(), Some(&0xc3));
    }
}
