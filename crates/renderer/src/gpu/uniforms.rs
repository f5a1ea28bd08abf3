use bytemuck::{Pod, Zeroable};

use crate::compositor::UniformValue;
use crate::shader::{Location, ProgramInfo, Symbol};

/// Bytes reserved per draw in the shared uniform buffer. Matches the
/// guaranteed `min_uniform_buffer_offset_alignment` upper bound.
pub(crate) const UNIFORM_SLOT: usize = 256;

/// One draw's worth of uniform bytes, laid out by the program's reflection.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct UniformSlot {
    pub bytes: [u8; UNIFORM_SLOT],
}

unsafe impl Zeroable for UniformSlot {}
unsafe impl Pod for UniformSlot {}

impl Default for UniformSlot {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Places each value at its reflected offset.
///
/// Values whose symbol did not resolve, or whose size disagrees with the
/// reflected member, are skipped with a trace log.
pub(crate) fn pack_uniforms(info: &ProgramInfo, values: &[(Symbol, UniformValue)]) -> UniformSlot {
    let mut slot = UniformSlot::default();
    for (symbol, value) in values {
        let Location::Uniform { offset, size } = info.location(*symbol) else {
            tracing::trace!(program = %info.kind(), ?symbol, "uniform not present; skipped");
            continue;
        };
        let data = value_bytes(value);
        let start = offset as usize;
        let end = start + data.len();
        if data.len() != size as usize || end > UNIFORM_SLOT {
            tracing::trace!(
                program = %info.kind(),
                ?symbol,
                expected = size,
                actual = data.len(),
                "uniform size mismatch; skipped"
            );
            continue;
        }
        slot.bytes[start..end].copy_from_slice(&data);
    }
    slot
}

fn value_bytes(value: &UniformValue) -> Vec<u8> {
    match value {
        UniformValue::Float(value) => bytemuck::bytes_of(value).to_vec(),
        UniformValue::Vec4(value) => bytemuck::cast_slice(value).to_vec(),
        UniformValue::Mat4(value) => bytemuck::cast_slice(&value.to_cols_array()).to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::{ProgramKind, ProgramTable};
    use glam::Mat4;

    fn read_f32(slot: &UniformSlot, offset: usize) -> f32 {
        f32::from_ne_bytes(slot.bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn ticker_values_land_at_reflected_offsets() {
        let table = ProgramTable::reflect_builtin();
        let info = table.get(ProgramKind::Ticker).unwrap();
        let slot = pack_uniforms(
            info,
            &[
                (Symbol::MvpMatrix, UniformValue::Mat4(Mat4::from_scale([2.0, 3.0, 4.0].into()))),
                (Symbol::ScrollOffset, UniformValue::Float(0.25)),
                (Symbol::SmoothFactor, UniformValue::Float(0.3)),
                (Symbol::Repeat, UniformValue::Float(16.0)),
            ],
        );
        assert_eq!(read_f32(&slot, 0), 2.0);
        assert_eq!(read_f32(&slot, 20), 3.0);
        assert_eq!(read_f32(&slot, 64), 0.25);
        assert_eq!(read_f32(&slot, 68), 0.3);
        assert_eq!(read_f32(&slot, 72), 16.0);
    }

    #[test]
    fn unknown_or_mistyped_values_are_skipped() {
        let table = ProgramTable::reflect_builtin();
        let info = table.get(ProgramKind::Flat).unwrap();
        let slot = pack_uniforms(
            info,
            &[
                (Symbol::Progress, UniformValue::Float(9.0)),
                (Symbol::Color, UniformValue::Float(9.0)),
            ],
        );
        assert_eq!(slot, UniformSlot::default());

        let slot = pack_uniforms(info, &[(Symbol::Color, UniformValue::Vec4([0.0, 0.0, 1.0, 0.5]))]);
        assert_eq!(read_f32(&slot, 64 + 8), 1.0);
        assert_eq!(read_f32(&slot, 64 + 12), 0.5);
    }
}
