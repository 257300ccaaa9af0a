pub const MAX_CLIENTS: usize = 4;
pub const SERVER_SLOT: usize = 0;
pub const NUM_CUBES: usize = 64;

pub const TICK_RATE: u32 = 60;
pub const MAX_PACKET_SIZE: usize = 4096;
pub const DEFAULT_PORT: u16 = 27016;

pub const UNITS_PER_METER_BITS: u32 = 9;
pub const UNITS_PER_METER: i32 = 1 << UNITS_PER_METER_BITS;

pub const POSITION_MINIMUM_XZ: i32 = -(16 * UNITS_PER_METER - 1);
pub const POSITION_MAXIMUM_XZ: i32 = 16 * UNITS_PER_METER - 1;
pub const POSITION_MINIMUM_Y: i32 = -UNITS_PER_METER;
pub const POSITION_MAXIMUM_Y: i32 = 16 * UNITS_PER_METER - 1;

pub const POSITION_MINIMUM: [i32; 3] = [POSITION_MINIMUM_XZ, POSITION_MINIMUM_Y, POSITION_MINIMUM_XZ];
pub const POSITION_MAXIMUM: [i32; 3] = [POSITION_MAXIMUM_XZ, POSITION_MAXIMUM_Y, POSITION_MAXIMUM_XZ];

pub const LINEAR_VELOCITY_MAXIMUM: i32 = 16 * UNITS_PER_METER - 1;
pub const ANGULAR_VELOCITY_MAXIMUM: i32 = 32 * UNITS_PER_METER - 1;

pub const ROTATION_BITS: u32 = 9;
pub const TRIGGER_BITS: u32 = 8;

/// Held objects sit within a meter of the hand that holds them.
pub const LOCAL_POSITION_BOUND: i32 = UNITS_PER_METER;

pub const MAX_BASELINE_DIFFERENCE: u16 = 255;

pub const POSITION_DELTA_SMALL_BITS: u32 = 5;
pub const POSITION_DELTA_MEDIUM_BITS: u32 = 8;
pub const VELOCITY_DELTA_SMALL_BITS: u32 = 5;
pub const VELOCITY_DELTA_MEDIUM_BITS: u32 = 9;

pub const PREDICTION_POSITION_DELTA_MAXIMUM: i32 = 255;
pub const PREDICTION_VELOCITY_DELTA_MAXIMUM: i32 = 511;

pub const DELTA_BUFFER_SIZE: usize = 256;
pub const SEQUENCE_BUFFER_SIZE: usize = 1024;
pub const JITTER_BUFFER_SIZE: usize = 256;

pub const MAX_STRING_LENGTH: usize = 64;

pub const fn authority_index_for_slot(slot: usize) -> u8 {
    (slot + 1) as u8
}

pub const fn slot_for_authority_index(index: u8) -> Option<usize> {
    if index == 0 {
        None
    } else {
        Some(index as usize - 1)
    }
}
