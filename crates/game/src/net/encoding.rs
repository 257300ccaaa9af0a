//! Per-object encoding tiers and their wire form.

use super::bitstream::{BitReader, BitWriter, StreamError};
use super::delta::Baseline;
use crate::constants::{
    ANGULAR_VELOCITY_MAXIMUM, LINEAR_VELOCITY_MAXIMUM, MAX_BASELINE_DIFFERENCE, MAX_CLIENTS,
    NUM_CUBES, POSITION_DELTA_MEDIUM_BITS, POSITION_DELTA_SMALL_BITS, POSITION_MAXIMUM,
    POSITION_MINIMUM, PREDICTION_POSITION_DELTA_MAXIMUM, PREDICTION_VELOCITY_DELTA_MAXIMUM,
    VELOCITY_DELTA_MEDIUM_BITS, VELOCITY_DELTA_SMALL_BITS,
};
use crate::state::object::{
    ANGULAR_VELOCITY_MAXIMUM3, ANGULAR_VELOCITY_MINIMUM3, LINEAR_VELOCITY_MAXIMUM3,
    LINEAR_VELOCITY_MINIMUM3,
};
use crate::state::quantize::{read_vec3, write_vec3};
use crate::state::{ObjectDelta, ObjectState, QuantizedRotation, predict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingTier {
    NotChanged,
    PerfectPrediction,
    PredictionDelta,
    BaselineDelta,
    Absolute,
}

/// How one object's motion is carried in a packet. Baselines are named by the
/// sequence of the packet that carried them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectEncoding {
    NotChanged {
        baseline: u16,
    },
    PerfectPrediction {
        baseline: u16,
        rotation: QuantizedRotation,
    },
    PredictionDelta {
        baseline: u16,
        rotation: QuantizedRotation,
        delta: ObjectDelta,
    },
    BaselineDelta {
        baseline: u16,
        active: bool,
        rotation: QuantizedRotation,
        delta: ObjectDelta,
    },
    Absolute(ObjectState),
}

impl ObjectEncoding {
    pub fn tier(&self) -> EncodingTier {
        match self {
            Self::NotChanged { .. } => EncodingTier::NotChanged,
            Self::PerfectPrediction { .. } => EncodingTier::PerfectPrediction,
            Self::PredictionDelta { .. } => EncodingTier::PredictionDelta,
            Self::BaselineDelta { .. } => EncodingTier::BaselineDelta,
            Self::Absolute(_) => EncodingTier::Absolute,
        }
    }

    pub fn baseline(&self) -> Option<u16> {
        match *self {
            Self::NotChanged { baseline }
            | Self::PerfectPrediction { baseline, .. }
            | Self::PredictionDelta { baseline, .. }
            | Self::BaselineDelta { baseline, .. } => Some(baseline),
            Self::Absolute(_) => None,
        }
    }

    /// Picks the cheapest tier that reproduces `current` exactly.
    ///
    /// `baseline` is the receiver's acknowledged reference, if any. It is only
    /// used when both the packet distance and the frame distance fit the
    /// baseline window.
    pub fn choose(
        current: &ObjectState,
        baseline: Option<&Baseline>,
        sequence: u16,
        frame_number: u32,
    ) -> Self {
        let Some(baseline) = baseline.filter(|b| baseline_usable(b, sequence, frame_number)) else {
            return Self::Absolute(current.motion());
        };
        let reference = &baseline.state;

        if current.same_motion(reference) {
            return Self::NotChanged {
                baseline: baseline.sequence,
            };
        }

        let baseline_delta = ObjectDelta::between(current, reference);

        if current.active && reference.active {
            let frames = frame_number.wrapping_sub(baseline.frame_number);
            let predicted = predict(reference, frames);
            let prediction_delta = ObjectDelta::between(current, &predicted);

            if prediction_delta == ObjectDelta::default() {
                return Self::PerfectPrediction {
                    baseline: baseline.sequence,
                    rotation: current.rotation,
                };
            }

            if prediction_delta.within(
                PREDICTION_POSITION_DELTA_MAXIMUM,
                PREDICTION_VELOCITY_DELTA_MAXIMUM,
            ) && prediction_delta.magnitude() < baseline_delta.magnitude()
            {
                return Self::PredictionDelta {
                    baseline: baseline.sequence,
                    rotation: current.rotation,
                    delta: prediction_delta,
                };
            }
        }

        Self::BaselineDelta {
            baseline: baseline.sequence,
            active: current.active,
            rotation: current.rotation,
            delta: baseline_delta,
        }
    }

    /// Rebuilds the motion part of the state from its reference. The caller
    /// supplies the baseline named by [`ObjectEncoding::baseline`].
    ///
    /// Returns `None` without a baseline, or when the baseline is further
    /// behind `frame_number` than the baseline window allows.
    pub fn reconstruct(
        &self,
        baseline: Option<&Baseline>,
        frame_number: u32,
    ) -> Option<ObjectState> {
        if let Some(baseline) = baseline
            && !frame_in_window(baseline, frame_number)
        {
            return None;
        }
        let mut state = match (*self, baseline) {
            (Self::Absolute(state), _) => state,
            (Self::NotChanged { .. }, Some(baseline)) => baseline.state,
            (Self::PerfectPrediction { rotation, .. }, Some(baseline)) => {
                let frames = frame_number.wrapping_sub(baseline.frame_number);
                ObjectState {
                    rotation,
                    ..predict(&baseline.state, frames)
                }
            }
            (Self::PredictionDelta { rotation, delta, .. }, Some(baseline)) => {
                let frames = frame_number.wrapping_sub(baseline.frame_number);
                ObjectState {
                    rotation,
                    ..delta.apply(&predict(&baseline.state, frames))
                }
            }
            (
                Self::BaselineDelta {
                    active,
                    rotation,
                    delta,
                    ..
                },
                Some(baseline),
            ) => ObjectState {
                active,
                rotation,
                ..delta.apply(&baseline.state)
            },
            (_, None) => return None,
        };
        state.canonicalize();
        Some(state)
    }
}

/// True when `frame_number` is at most `MAX_BASELINE_DIFFERENCE` frames past
/// the baseline. Bounds the predictor's step count on both ends.
pub fn frame_in_window(baseline: &Baseline, frame_number: u32) -> bool {
    frame_number.wrapping_sub(baseline.frame_number) <= MAX_BASELINE_DIFFERENCE as u32
}

fn baseline_usable(baseline: &Baseline, sequence: u16, frame_number: u32) -> bool {
    let sequence_offset = sequence.wrapping_sub(baseline.sequence);
    (1..=MAX_BASELINE_DIFFERENCE).contains(&sequence_offset)
        && frame_in_window(baseline, frame_number)
}

/// One object's entry in a state update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectUpdate {
    pub id: u16,
    pub authority_index: u8,
    pub ownership_sequence: u16,
    pub authority_sequence: u16,
    pub encoding: ObjectEncoding,
}

impl ObjectUpdate {
    pub fn write(&self, writer: &mut BitWriter, sequence: u16) -> Result<(), StreamError> {
        writer.write_unsigned(self.id as u32, 0, NUM_CUBES as u32 - 1)?;
        writer.write_unsigned(self.authority_index as u32, 0, MAX_CLIENTS as u32)?;
        writer.write_u16(self.ownership_sequence)?;
        writer.write_u16(self.authority_sequence)?;

        let Some(baseline) = self.encoding.baseline() else {
            writer.write_bool(false)?;
            if let ObjectEncoding::Absolute(state) = &self.encoding {
                write_absolute(writer, state)?;
            }
            return Ok(());
        };

        writer.write_bool(true)?;
        writer.write_unsigned(
            sequence.wrapping_sub(baseline) as u32,
            1,
            MAX_BASELINE_DIFFERENCE as u32,
        )?;

        match &self.encoding {
            ObjectEncoding::NotChanged { .. } => writer.write_bool(false),
            ObjectEncoding::PerfectPrediction { rotation, .. } => {
                writer.write_bool(true)?;
                writer.write_bool(true)?;
                rotation.write(writer)
            }
            ObjectEncoding::PredictionDelta {
                rotation, delta, ..
            } => {
                writer.write_bool(true)?;
                writer.write_bool(false)?;
                writer.write_bool(true)?;
                rotation.write(writer)?;
                write_delta_fields(
                    writer,
                    delta,
                    true,
                    [PREDICTION_POSITION_DELTA_MAXIMUM; 3],
                    PREDICTION_VELOCITY_DELTA_MAXIMUM,
                    PREDICTION_VELOCITY_DELTA_MAXIMUM,
                )
            }
            ObjectEncoding::BaselineDelta {
                active,
                rotation,
                delta,
                ..
            } => {
                writer.write_bool(true)?;
                writer.write_bool(false)?;
                writer.write_bool(false)?;
                writer.write_bool(*active)?;
                rotation.write(writer)?;
                write_delta_fields(
                    writer,
                    delta,
                    *active,
                    position_span(),
                    2 * LINEAR_VELOCITY_MAXIMUM,
                    2 * ANGULAR_VELOCITY_MAXIMUM,
                )
            }
            ObjectEncoding::Absolute(_) => Ok(()),
        }
    }

    pub fn read(reader: &mut BitReader, sequence: u16) -> Result<Self, StreamError> {
        let id = reader.read_unsigned(0, NUM_CUBES as u32 - 1)? as u16;
        let authority_index = reader.read_unsigned(0, MAX_CLIENTS as u32)? as u8;
        let ownership_sequence = reader.read_u16()?;
        let authority_sequence = reader.read_u16()?;

        let encoding = if !reader.read_bool()? {
            ObjectEncoding::Absolute(read_absolute(reader)?)
        } else {
            let offset = reader.read_unsigned(1, MAX_BASELINE_DIFFERENCE as u32)? as u16;
            let baseline = sequence.wrapping_sub(offset);
            if !reader.read_bool()? {
                ObjectEncoding::NotChanged { baseline }
            } else if reader.read_bool()? {
                ObjectEncoding::PerfectPrediction {
                    baseline,
                    rotation: QuantizedRotation::read(reader)?,
                }
            } else if reader.read_bool()? {
                let rotation = QuantizedRotation::read(reader)?;
                let delta = read_delta_fields(
                    reader,
                    true,
                    [PREDICTION_POSITION_DELTA_MAXIMUM; 3],
                    PREDICTION_VELOCITY_DELTA_MAXIMUM,
                    PREDICTION_VELOCITY_DELTA_MAXIMUM,
                )?;
                ObjectEncoding::PredictionDelta {
                    baseline,
                    rotation,
                    delta,
                }
            } else {
                let active = reader.read_bool()?;
                let rotation = QuantizedRotation::read(reader)?;
                let delta = read_delta_fields(
                    reader,
                    active,
                    position_span(),
                    2 * LINEAR_VELOCITY_MAXIMUM,
                    2 * ANGULAR_VELOCITY_MAXIMUM,
                )?;
                ObjectEncoding::BaselineDelta {
                    baseline,
                    active,
                    rotation,
                    delta,
                }
            }
        };

        Ok(Self {
            id,
            authority_index,
            ownership_sequence,
            authority_sequence,
            encoding,
        })
    }

    /// Authority fields as an otherwise empty state, for arbitration.
    pub fn authority(&self) -> ObjectState {
        ObjectState {
            authority_index: self.authority_index,
            authority_sequence: self.authority_sequence,
            ownership_sequence: self.ownership_sequence,
            ..Default::default()
        }
    }
}

fn position_span() -> [i32; 3] {
    [
        POSITION_MAXIMUM[0] - POSITION_MINIMUM[0],
        POSITION_MAXIMUM[1] - POSITION_MINIMUM[1],
        POSITION_MAXIMUM[2] - POSITION_MINIMUM[2],
    ]
}

fn write_absolute(writer: &mut BitWriter, state: &ObjectState) -> Result<(), StreamError> {
    writer.write_bool(state.active)?;
    write_vec3(writer, state.position, POSITION_MINIMUM, POSITION_MAXIMUM)?;
    state.rotation.write(writer)?;
    if state.active {
        write_vec3(
            writer,
            state.linear_velocity,
            LINEAR_VELOCITY_MINIMUM3,
            LINEAR_VELOCITY_MAXIMUM3,
        )?;
        write_vec3(
            writer,
            state.angular_velocity,
            ANGULAR_VELOCITY_MINIMUM3,
            ANGULAR_VELOCITY_MAXIMUM3,
        )?;
    }
    Ok(())
}

fn read_absolute(reader: &mut BitReader) -> Result<ObjectState, StreamError> {
    let active = reader.read_bool()?;
    let position = read_vec3(reader, POSITION_MINIMUM, POSITION_MAXIMUM)?;
    let rotation = QuantizedRotation::read(reader)?;
    let (linear_velocity, angular_velocity) = if active {
        (
            read_vec3(reader, LINEAR_VELOCITY_MINIMUM3, LINEAR_VELOCITY_MAXIMUM3)?,
            read_vec3(reader, ANGULAR_VELOCITY_MINIMUM3, ANGULAR_VELOCITY_MAXIMUM3)?,
        )
    } else {
        ([0; 3], [0; 3])
    };
    Ok(ObjectState {
        active,
        position,
        rotation,
        linear_velocity,
        angular_velocity,
        ..Default::default()
    })
}

fn write_delta_fields(
    writer: &mut BitWriter,
    delta: &ObjectDelta,
    with_velocity: bool,
    position_bound: [i32; 3],
    linear_bound: i32,
    angular_bound: i32,
) -> Result<(), StreamError> {
    for axis in 0..3 {
        write_delta(
            writer,
            delta.position[axis],
            POSITION_DELTA_SMALL_BITS,
            POSITION_DELTA_MEDIUM_BITS,
            position_bound[axis],
        )?;
    }
    if with_velocity {
        for axis in 0..3 {
            write_delta(
                writer,
                delta.linear_velocity[axis],
                VELOCITY_DELTA_SMALL_BITS,
                VELOCITY_DELTA_MEDIUM_BITS,
                linear_bound,
            )?;
        }
        for axis in 0..3 {
            write_delta(
                writer,
                delta.angular_velocity[axis],
                VELOCITY_DELTA_SMALL_BITS,
                VELOCITY_DELTA_MEDIUM_BITS,
                angular_bound,
            )?;
        }
    }
    Ok(())
}

fn read_delta_fields(
    reader: &mut BitReader,
    with_velocity: bool,
    position_bound: [i32; 3],
    linear_bound: i32,
    angular_bound: i32,
) -> Result<ObjectDelta, StreamError> {
    let mut delta = ObjectDelta::default();
    for axis in 0..3 {
        delta.position[axis] = read_delta(
            reader,
            POSITION_DELTA_SMALL_BITS,
            POSITION_DELTA_MEDIUM_BITS,
            position_bound[axis],
        )?;
    }
    if with_velocity {
        for axis in 0..3 {
            delta.linear_velocity[axis] = read_delta(
                reader,
                VELOCITY_DELTA_SMALL_BITS,
                VELOCITY_DELTA_MEDIUM_BITS,
                linear_bound,
            )?;
        }
        for axis in 0..3 {
            delta.angular_velocity[axis] = read_delta(
                reader,
                VELOCITY_DELTA_SMALL_BITS,
                VELOCITY_DELTA_MEDIUM_BITS,
                angular_bound,
            )?;
        }
    }
    Ok(delta)
}

/// Signed value in three escalating widths, one flag bit per level:
/// `|v| <= small`, then `small < |v| <= small + 2^medium_bits`, then the full
/// `[-bound, bound]` range.
pub fn write_delta(
    writer: &mut BitWriter,
    value: i32,
    small_bits: u32,
    medium_bits: u32,
    bound: i32,
) -> Result<(), StreamError> {
    let small_limit = (1 << (small_bits - 1)) - 1;
    let medium_limit = small_limit + (1 << medium_bits);
    let magnitude = value.abs();

    if magnitude <= small_limit {
        writer.write_bool(true)?;
        return writer.write_int(value, -small_limit, small_limit);
    }
    writer.write_bool(false)?;

    if magnitude <= medium_limit {
        writer.write_bool(true)?;
        writer.write_bool(value < 0)?;
        return writer.write_bits((magnitude - small_limit - 1) as u32, medium_bits);
    }
    writer.write_bool(false)?;
    writer.write_int(value, -bound, bound)
}

pub fn read_delta(
    reader: &mut BitReader,
    small_bits: u32,
    medium_bits: u32,
    bound: i32,
) -> Result<i32, StreamError> {
    let small_limit = (1 << (small_bits - 1)) - 1;

    if reader.read_bool()? {
        return reader.read_int(-small_limit, small_limit);
    }
    if reader.read_bool()? {
        let negative = reader.read_bool()?;
        let magnitude = reader.read_bits(medium_bits)? as i32 + small_limit + 1;
        return Ok(if negative { -magnitude } else { magnitude });
    }
    reader.read_int(-bound, bound)
}
