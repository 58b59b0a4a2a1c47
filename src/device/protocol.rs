use crate::device::constants::{VALUE_OFF, VALUE_ON};
use crate::error::DeviceError;

pub fn encode_state(state: bool) -> [u8; 1] {
    if state { VALUE_ON } else { VALUE_OFF }
}

/// Decodes an LED or button characteristic value. The peripheral always sends exactly one byte,
/// anything non-zero is "on" / "pressed".
pub fn decode_state(value: &[u8]) -> Result<bool, DeviceError> {
    match value {
        [byte] => Ok(*byte != 0x00),
        _ => Err(DeviceError::InvalidValue { length: value.len() }),
    }
}
