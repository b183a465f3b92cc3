//! Deterministic code image generation.
//!
//! Pure byte stamping: prologue at offset 0, the body chunk repeated as many
//! whole times as the budget allows, then the epilogue. Nothing here inspects
//! the bytes being copied.

use crate::exec_memory::ExecRegion;
use crate::template::CodeTemplate;
use tracing::debug;

/// How much tail margin to reserve when computing the body-copy budget.
///
/// Earlier revisions of this tool reserved a margin unrelated to the
/// epilogue's actual length, and benchmark numbers published from them depend
/// on that budget. The policy is an explicit part of the API so the choice is
/// visible rather than silently corrected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MarginPolicy {
    /// Reserve `prologue_len` bytes of tail margin (historical behavior,
    /// keeps parity with earlier benchmark numbers).
    #[default]
    PrologueLength,
    /// Reserve the epilogue's true byte length.
    EpilogueLength,
}

impl MarginPolicy {
    fn margin(self, template: &CodeTemplate) -> usize {
        match self {
            MarginPolicy::PrologueLength => template.prologue().len(),
            MarginPolicy::EpilogueLength => template.epilogue().len(),
        }
    }
}

/// Shape of a generated image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLayout {
    pub bytes_written: usize,
    pub body_repetitions: usize,
}

/// Fills an executable region from a template.
pub struct CodeImageGenerator {
    policy: MarginPolicy,
}

impl CodeImageGenerator {
    pub fn new(policy: MarginPolicy) -> Self {
        Self { policy }
    }

    /// Writes prologue, repeated body, epilogue into `region`.
    ///
    /// The body is copied while `(budget - offset) > body_len`, where the
    /// budget is the region size minus the policy's tail margin; each copy
    /// advances the offset by exactly `body_len`. Two calls on equally-sized
    /// fresh regions with the same template produce byte-identical images.
    ///
    /// Panics if the final offset is not strictly less than the region size.
    /// That is a fatal safety net for template/region-size mismatches that
    /// must never occur in a valid configuration, not a recoverable error.
    pub fn fill(&self, region: &mut ExecRegion, template: &CodeTemplate) -> ImageLayout {
        let body_len = template.body().len();
        let budget = region.size().saturating_sub(self.policy.margin(template));

        let mut offset = 0;
        region.write_at(offset, template.prologue());
        offset += template.prologue().len();

        let mut body_repetitions = 0;
        while budget.saturating_sub(offset) > body_len {
            region.write_at(offset, template.body());
            offset += body_len;
            body_repetitions += 1;
        }

        region.write_at(offset, template.epilogue());
        offset += template.epilogue().len();

        assert!(
            offset < region.size(),
            "generated image ({} bytes) must end short of the region ({} bytes)",
            offset,
            region.size()
        );

        debug!(
            bytes_written = offset,
            body_repetitions,
            region_size = region.size(),
            "generated code image"
        );

        ImageLayout {
            bytes_written: offset,
            body_repetitions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec_memory::ExecRegion;
    use crate::template::CodeTemplate;

    fn synthetic_template(prologue: usize, body: usize, epilogue: usize) -> CodeTemplate {
        CodeTemplate::new(vec![0xaa; prologue], vec![0xbb; body], vec![0xcc; epilogue])
    }

    #[test]
    fn test_ten_page_region_layout() {
        // 10 pages, 33-byte prologue, 139-byte body, 7-byte epilogue: the
        // historical margin yields floor((40960 - 33 - 33) / 139) = 294
        // body copies and 33 + 294*139 + 7 = 40906 bytes written.
        let template = synthetic_template(33, 139, 7);
        let mut region = ExecRegion::acquire(40960).unwrap();

        let layout = CodeImageGenerator::new(MarginPolicy::PrologueLength)
            .fill(&mut region, &template);

        assert_eq!(layout.body_repetitions, 294);
        assert_eq!(layout.bytes_written, 40906);
        assert!(layout.bytes_written < region.size());
    }

    #[test]
    fn test_written_length_matches_closed_form() {
        for (size, p, b, e) in [
            (4096usize, 33usize, 139usize, 7usize),
            (8192, 16, 100, 16),
            (4096, 6, 9, 3),
        ] {
            let template = synthetic_template(p, b, e);
            let mut region = ExecRegion::acquire(size).unwrap();
            let layout = CodeImageGenerator::new(MarginPolicy::PrologueLength)
                .fill(&mut region, &template);

            let k = (size - p - p) / b;
            assert_eq!(layout.body_repetitions, k, "size={}", size);
            assert_eq!(layout.bytes_written, p + k * b + e, "size={}", size);
            assert!(layout.bytes_written < size);
        }
    }

    #[test]
    fn test_corrected_margin_reserves_epilogue_length() {
        // Sized so the two policies disagree: budget differs by p - e = 26
        // bytes, which straddles one body chunk here.
        let template = synthetic_template(33, 30, 7);
        let size = 33 + 4 * 30 + 33; // prologue + 4 bodies + historical margin

        let mut region = ExecRegion::acquire(size).unwrap();
        let historical = CodeImageGenerator::new(MarginPolicy::PrologueLength)
            .fill(&mut region, &template);

        let mut region = ExecRegion::acquire(size).unwrap();
        let corrected = CodeImageGenerator::new(MarginPolicy::EpilogueLength)
            .fill(&mut region, &template);

        assert!(corrected.body_repetitions > historical.body_repetitions);
        assert!(corrected.bytes_written < size);
    }

    #[test]
    fn test_fill_is_idempotent_across_fresh_regions() {
        let template = synthetic_template(33, 139, 7);

        let mut first = ExecRegion::acquire(4096).unwrap();
        let mut second = ExecRegion::acquire(4096).unwrap();

        let generator = CodeImageGenerator::new(MarginPolicy::default());
        let a = generator.fill(&mut first, &template);
        let b = generator.fill(&mut second, &template);

        assert_eq!(a, b);
        assert_eq!(
            &first.as_slice()[..a.bytes_written],
            &second.as_slice()[..b.bytes_written]
        );
    }

    #[test]
    fn test_image_sections_land_in_order() {
        let template = synthetic_template(4, 8, 2);
        let mut region = ExecRegion::acquire(64).unwrap();

        let layout = CodeImageGenerator::new(MarginPolicy::PrologueLength)
            .fill(&mut region, &template);

        let image = &region.as_slice()[..layout.bytes_written];
        assert_eq!(&image[..4], &[0xaa; 4]);
        assert_eq!(&image[4..12], &[0xbb; 8]);
        assert_eq!(&image[layout.bytes_written - 2..], &[0xcc; 2]);
    }
}
