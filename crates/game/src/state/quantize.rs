use glam::{Quat, Vec3};

use crate::constants::{ROTATION_BITS, UNITS_PER_METER};
use crate::net::bitstream::{BitReader, BitWriter, StreamError};

const ROTATION_MAXIMUM: u32 = (1 << ROTATION_BITS) - 1;
const ROTATION_BOUND: f32 = std::f32::consts::FRAC_1_SQRT_2;

#[inline]
pub fn quantize_meters(value: f32, min: i32, max: i32) -> i32 {
    let scaled = (value * UNITS_PER_METER as f32).round();
    if scaled.is_nan() {
        return 0.clamp(min, max);
    }
    (scaled as i32).clamp(min, max)
}

#[inline]
pub fn dequantize_meters(value: i32) -> f32 {
    value as f32 / UNITS_PER_METER as f32
}

pub fn quantize_vec3(value: Vec3, min: [i32; 3], max: [i32; 3]) -> [i32; 3] {
    [
        quantize_meters(value.x, min[0], max[0]),
        quantize_meters(value.y, min[1], max[1]),
        quantize_meters(value.z, min[2], max[2]),
    ]
}

pub fn dequantize_vec3(value: [i32; 3]) -> Vec3 {
    Vec3::new(
        dequantize_meters(value[0]),
        dequantize_meters(value[1]),
        dequantize_meters(value[2]),
    )
}

/// Maps `[0, 1]` onto `bits` unsigned bits.
pub fn quantize_unit(value: f32, bits: u32) -> u32 {
    let maximum = ((1u64 << bits) - 1) as u32;
    let scaled = (value.clamp(0.0, 1.0) * maximum as f32).round();
    (scaled as u32).min(maximum)
}

pub fn dequantize_unit(value: u32, bits: u32) -> f32 {
    let maximum = ((1u64 << bits) - 1) as u32;
    value.min(maximum) as f32 / maximum as f32
}

pub fn write_vec3(
    writer: &mut BitWriter,
    value: [i32; 3],
    min: [i32; 3],
    max: [i32; 3],
) -> Result<(), StreamError> {
    for axis in 0..3 {
        writer.write_int(value[axis], min[axis], max[axis])?;
    }
    Ok(())
}

pub fn read_vec3(
    reader: &mut BitReader,
    min: [i32; 3],
    max: [i32; 3],
) -> Result<[i32; 3], StreamError> {
    Ok([
        reader.read_int(min[0], max[0])?,
        reader.read_int(min[1], max[1])?,
        reader.read_int(min[2], max[2])?,
    ])
}

/// Smallest-three rotation: the index of the dropped component plus the
/// other three, each in `ROTATION_BITS` over `[-1/sqrt2, 1/sqrt2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QuantizedRotation {
    pub largest: u8,
    pub a: u32,
    pub b: u32,
    pub c: u32,
}

impl Default for QuantizedRotation {
    fn default() -> Self {
        Self::from_quat(Quat::IDENTITY)
    }
}

#[inline]
fn quantize_component(value: f32) -> u32 {
    let normalized = (value.clamp(-ROTATION_BOUND, ROTATION_BOUND) + ROTATION_BOUND)
        / (2.0 * ROTATION_BOUND);
    ((normalized * ROTATION_MAXIMUM as f32).round() as u32).min(ROTATION_MAXIMUM)
}

#[inline]
fn dequantize_component(value: u32) -> f32 {
    value.min(ROTATION_MAXIMUM) as f32 / ROTATION_MAXIMUM as f32 * (2.0 * ROTATION_BOUND)
        - ROTATION_BOUND
}

impl QuantizedRotation {
    pub fn from_quat(rotation: Quat) -> Self {
        let components = [rotation.x, rotation.y, rotation.z, rotation.w];

        let mut largest = 0;
        for index in 1..4 {
            if components[index].abs() > components[largest].abs() {
                largest = index;
            }
        }

        let sign = if components[largest] < 0.0 { -1.0 } else { 1.0 };
        let mut rest = [0u32; 3];
        let mut slot = 0;
        for (index, component) in components.iter().enumerate() {
            if index != largest {
                rest[slot] = quantize_component(component * sign);
                slot += 1;
            }
        }

        Self {
            largest: largest as u8,
            a: rest[0],
            b: rest[1],
            c: rest[2],
        }
    }

    pub fn to_quat(&self) -> Quat {
        let a = dequantize_component(self.a);
        let b = dequantize_component(self.b);
        let c = dequantize_component(self.c);
        let d = (1.0 - a * a - b * b - c * c).max(0.0).sqrt();

        let [x, y, z, w] = match self.largest & 3 {
            0 => [d, a, b, c],
            1 => [a, d, b, c],
            2 => [a, b, d, c],
            _ => [a, b, c, d],
        };

        let length = (x * x + y * y + z * z + w * w).sqrt();
        if length > 0.0 {
            Quat::from_xyzw(x / length, y / length, z / length, w / length)
        } else {
            Quat::IDENTITY
        }
    }

    pub fn write(&self, writer: &mut BitWriter) -> Result<(), StreamError> {
        writer.write_bits(self.largest as u32, 2)?;
        writer.write_bits(self.a, ROTATION_BITS)?;
        writer.write_bits(self.b, ROTATION_BITS)?;
        writer.write_bits(self.c, ROTATION_BITS)
    }

    pub fn read(reader: &mut BitReader) -> Result<Self, StreamError> {
        Ok(Self {
            largest: reader.read_bits(2)? as u8,
            a: reader.read_bits(ROTATION_BITS)?,
            b: reader.read_bits(ROTATION_BITS)?,
            c: reader.read_bits(ROTATION_BITS)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{POSITION_MAXIMUM, POSITION_MINIMUM};
    use rand::{Rng, SeedableRng, rngs::StdRng};

    // Two quaternions are the same rotation if |dot| is near 1.
    fn angle_between(a: Quat, b: Quat) -> f32 {
        2.0 * a.dot(b).abs().min(1.0).acos()
    }

    const ANGULAR_EPSILON: f32 = 0.01;

    #[test]
    fn test_meters_roundtrip() {
        assert_eq!(quantize_meters(1.0, -8191, 8191), 512);
        assert_eq!(quantize_meters(-0.5, -8191, 8191), -256);
        assert_eq!(dequantize_meters(512), 1.0);
        assert_eq!(quantize_meters(1000.0, -8191, 8191), 8191);
        assert_eq!(quantize_meters(-1000.0, -512, 8191), -512);
        assert_eq!(quantize_meters(f32::NAN, -512, 8191), 0);
    }

    #[test]
    fn test_vec3_clamped() {
        let q = quantize_vec3(Vec3::new(0.25, -5.0, 100.0), POSITION_MINIMUM, POSITION_MAXIMUM);
        assert_eq!(q, [128, -512, 8191]);
        assert_eq!(dequantize_vec3([128, 0, 512]), Vec3::new(0.25, 0.0, 1.0));
    }

    #[test]
    fn test_unit_roundtrip() {
        assert_eq!(quantize_unit(0.0, 8), 0);
        assert_eq!(quantize_unit(1.0, 8), 255);
        assert_eq!(quantize_unit(2.0, 8), 255);
        assert!((dequantize_unit(quantize_unit(0.5, 8), 8) - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_axis_aligned_rotations() {
        let cases = [
            Quat::IDENTITY,
            Quat::from_xyzw(1.0, 0.0, 0.0, 0.0),
            Quat::from_xyzw(0.0, 1.0, 0.0, 0.0),
            Quat::from_xyzw(0.0, 0.0, 1.0, 0.0),
            Quat::from_xyzw(0.0, 0.0, 0.0, -1.0),
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Quat::from_rotation_x(std::f32::consts::PI),
            Quat::from_xyzw(0.5, 0.5, 0.5, 0.5),
        ];
        for q in cases {
            let restored = QuantizedRotation::from_quat(q).to_quat();
            assert!(angle_between(q, restored) < ANGULAR_EPSILON, "{q:?} -> {restored:?}");
            assert!((restored.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_random_rotations() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10_000 {
            let q = Quat::from_xyzw(
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            );
            if q.length_squared() < 1e-4 {
                continue;
            }
            let q = q.normalize();
            let restored = QuantizedRotation::from_quat(q).to_quat();
            assert!(angle_between(q, restored) < ANGULAR_EPSILON);
        }
    }

    #[test]
    fn test_double_cover_canonical() {
        let q = Quat::from_rotation_z(0.7);
        assert_eq!(QuantizedRotation::from_quat(q), QuantizedRotation::from_quat(-q));
    }

    #[test]
    fn test_rotation_wire() {
        let q = QuantizedRotation::from_quat(Quat::from_rotation_x(0.3));
        let mut writer = BitWriter::new(16);
        q.write(&mut writer).unwrap();
        assert_eq!(writer.bits_written(), 2 + 3 * ROTATION_BITS as usize);
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(QuantizedRotation::read(&mut reader).unwrap(), q);
    }
}
