//! Code templates: the fixed byte sequences stamped into a region.
//!
//! A template is three opaque byte strings with known lengths. The generator
//! never interprets or validates their content; swapping templates is the
//! sanctioned way to benchmark a different code pattern. The only semantic
//! requirement is on the assembled whole: prologue + repeated body + epilogue
//! must form a function taking one integer and returning one integer at the
//! region's first byte.

use crate::error::Result;

/// Three immutable byte sequences: prologue, repeatable body chunk, epilogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTemplate {
    prologue: Vec<u8>,
    body: Vec<u8>,
    epilogue: Vec<u8>,
}

impl CodeTemplate {
    pub fn new(prologue: Vec<u8>, body: Vec<u8>, epilogue: Vec<u8>) -> Self {
        Self {
            prologue,
            body,
            epilogue,
        }
    }

    pub fn prologue(&self) -> &[u8] {
        &self.prologue
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn epilogue(&self) -> &[u8] {
        &self.epilogue
    }
}

/// Capability that produces the template to stamp.
///
/// Keeps the region and generation code agnostic to how the bytes were
/// produced: hand-assembled tables, runtime assembly, cross-compiled blobs.
pub trait CodeTemplateProvider {
    fn template(&self) -> Result<CodeTemplate>;
}

/// The historical hand-encoded template carried over from this tool's
/// earlier revisions.
///
/// These are 32-bit x86 encodings (stack-slot arithmetic relative to ebp) and
/// are not executable on x86_64; they are kept for size parity with earlier
/// benchmark numbers and for exercising the generator. Use
/// [`crate::assembler::NativeX64Provider`] for a template that actually runs.
pub mod legacy_x86 {
    use super::{CodeTemplate, CodeTemplateProvider};
    use crate::error::Result;

    /// push ebp; mov ebp, esp; reserve locals; seed b/c/d constants; a = input.
    pub const PROLOGUE: [u8; 33] = [
        0x55, 0x8b, 0xec, 0x83, 0xec, 0x1c, 0xc7, 0x45, 0xf8, 0x34, 0x23, 0x01,
        0x00, 0xc7, 0x45, 0xf4, 0x56, 0x34, 0x00, 0x00, 0xc7, 0x45, 0xec, 0x96,
        0x78, 0x00, 0x00, 0x8b, 0x45, 0x08, 0x89, 0x45, 0xfc,
    ];

    /// One round of deterministic stack-slot arithmetic (imul/xor/or/sar/idiv
    /// over the locals seeded by the prologue). Self-contained: safe to
    /// repeat any number of times.
    pub const BODY: [u8; 146] = [
        0x8b, 0x4d, 0xfc, 0x0f, 0xaf, 0x4d, 0xf8, 0x89, 0x4d, 0xfc, 0x8b, 0x55,
        0xf8, 0x0f, 0xaf, 0x55, 0xf4, 0x89, 0x55, 0xf8, 0x8b, 0x45, 0xf8, 0x0f,
        0xaf, 0x45, 0xfc, 0x89, 0x45, 0xf4, 0x8b, 0x4d, 0xf8, 0x0f, 0xaf, 0x4d,
        0xfc, 0x0f, 0xaf, 0x4d, 0xf4, 0x89, 0x4d, 0xec, 0x8b, 0x55, 0xfc, 0x33,
        0x55, 0xf8, 0x89, 0x55, 0xfc, 0x8b, 0x45, 0xfc, 0x33, 0x45, 0xf4, 0x0b,
        0x45, 0xf8, 0x89, 0x45, 0xf8, 0x8b, 0x4d, 0xfc, 0x6b, 0xc9, 0x64, 0x8b,
        0x55, 0xf8, 0xd3, 0xfa, 0x89, 0x55, 0xf4, 0x8b, 0x45, 0xfc, 0x03, 0x45,
        0xf8, 0x03, 0x45, 0xf4, 0x89, 0x45, 0xf0, 0x8b, 0x4d, 0xf0, 0x2b, 0x4d,
        0xfc, 0x2b, 0x4d, 0xf8, 0x8b, 0x55, 0xf4, 0x6b, 0xd2, 0x64, 0x2b, 0xca,
        0x89, 0x4d, 0xfc, 0x8b, 0x45, 0xf0, 0x99, 0xb9, 0xe8, 0x03, 0x00, 0x00,
        0xf7, 0xf9, 0x8b, 0x55, 0xfc, 0x6b, 0xd2, 0x64, 0x03, 0xc2, 0x89, 0x45,
        0xe4, 0x8b, 0x45, 0xf8, 0x0f, 0xaf, 0x45, 0xf4, 0x03, 0x45, 0xfc, 0x89,
        0x45, 0xe8,
    ];

    /// mov eax, [result slot]; mov esp, ebp; pop ebp; ret.
    pub const EPILOGUE: [u8; 7] = [0x8b, 0x45, 0xe8, 0x8b, 0xe5, 0x5d, 0xc3];

    pub struct LegacyX86Template;

    impl CodeTemplateProvider for LegacyX86Template {
        fn template(&self) -> Result<CodeTemplate> {
            Ok(CodeTemplate::new(
                PROLOGUE.to_vec(),
                BODY.to_vec(),
                EPILOGUE.to_vec(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::legacy_x86::LegacyX86Template;
    use super::*;

    #[test]
    fn test_legacy_template_lengths() {
        let template = LegacyX86Template.template().unwrap();
        assert_eq!(template.prologue().len(), 33);
        assert_eq!(template.body().len(), 146);
        assert_eq!(template.epilogue().len(), 7);
    }

    #[test]
    fn test_legacy_template_is_stable() {
        let a = LegacyX86Template.template().unwrap();
        let b = LegacyX86Template.template().unwrap();
        assert_eq!(a, b);
    }
}
