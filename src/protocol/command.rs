//! Command encoding for the NEX protocol.
//!
//! Commands reuse the message header of the notification stream:
//! ```text
//! [AA AA AA AA] [length code] [00 00] [opcode] [arguments...]
//! ```
//! where the length code counts itself, the two reserved bytes, the opcode
//! and the arguments.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{Datelike, Timelike};

use crate::error::FrameError;
use crate::protocol::frame::{HEADER_LEN, MESSAGE_MAGIC};

/// Command opcodes sent to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandOpcode {
    /// Keep the link alive without changing anything.
    NoOp = 0x0D,
    /// Switch the element off.
    TurnOff = 0x82,
    /// Set the clock and request a status block.
    Hello = 0x83,
    /// Switch the element on at a target temperature.
    TurnOn = 0x84,
}

impl From<CommandOpcode> for u8 {
    fn from(cmd: CommandOpcode) -> Self {
        cmd as Self
    }
}

/// Builds a complete command frame.
fn encode_command(opcode: CommandOpcode, args: &[u8]) -> Bytes {
    // code byte + two reserved bytes + opcode
    let length_code = 4 + args.len() as u8;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + 3 + args.len());
    buf.put_slice(&MESSAGE_MAGIC);
    buf.put_u8(length_code);
    buf.put_u16(0);
    buf.put_u8(opcode.into());
    buf.put_slice(args);
    buf.freeze()
}

/// Packs a value below 100 as two decimal digits, one per nibble.
const fn bcd(value: u32) -> u8 {
    let value = value % 100;
    (((value / 10) << 4) | (value % 10)) as u8
}

/// Encodes the hello handshake carrying the local time.
///
/// Fields are `SS MM HH DD 0W MO YY`, each two decimal digits. The device
/// numbers weekdays Monday=1 through Sunday=7.
#[must_use]
pub fn encode_hello<T: Datelike + Timelike>(now: &T) -> Bytes {
    let weekday = match now.weekday().num_days_from_sunday() {
        0 => 7,
        day => day,
    };

    let clock = [
        bcd(now.second()),
        bcd(now.minute()),
        bcd(now.hour()),
        bcd(now.day()),
        bcd(weekday),
        bcd(now.month()),
        bcd(now.year().rem_euclid(100).unsigned_abs()),
    ];
    encode_command(CommandOpcode::Hello, &clock)
}

/// Encodes a turn-on command with the target temperature in whole degrees.
///
/// # Errors
///
/// Returns `FrameError::TemperatureOutOfRange` if the rounded temperature does
/// not fit in one byte.
pub fn encode_turn_on(target_temp: f64) -> Result<Bytes, FrameError> {
    let rounded = target_temp.round();
    if !(0.0..=f64::from(u8::MAX)).contains(&rounded) {
        return Err(FrameError::TemperatureOutOfRange { value: target_temp });
    }
    // Range checked above
    #[allow(clippy::cast_sign_loss)]
    let degrees = rounded as u8;
    Ok(encode_command(CommandOpcode::TurnOn, &[degrees]))
}

/// Encodes a turn-off command.
#[must_use]
pub fn encode_turn_off() -> Bytes {
    encode_command(CommandOpcode::TurnOff, &[0x00])
}

/// Encodes a command that does nothing.
#[must_use]
pub fn encode_no_op() -> Bytes {
    encode_command(CommandOpcode::NoOp, &[])
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(year: i32, month: u32, day: u32, h: u32, m: u32, s: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(year, month, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_hello_weekday() {
        // 2024-03-13 was a Wednesday
        let frame = encode_hello(&at(2024, 3, 13, 21, 45, 7));
        assert_eq!(hex::encode(&frame), "aaaaaaaa0b00008307452113030324");
    }

    #[test]
    fn test_hello_sunday_is_seven() {
        // 2024-03-17 was a Sunday
        let frame = encode_hello(&at(2024, 3, 17, 8, 5, 59));
        assert_eq!(hex::encode(&frame), "aaaaaaaa0b00008359050817070324");
        assert_eq!(frame[12], 0x07);
    }

    #[test]
    fn test_hello_monday_is_one() {
        let frame = encode_hello(&at(2024, 3, 18, 0, 0, 0));
        assert_eq!(frame[12], 0x01);
    }

    #[test]
    fn test_turn_on() {
        let frame = encode_turn_on(75.0).unwrap();
        assert_eq!(hex::encode(&frame), "aaaaaaaa050000844b");

        let frame = encode_turn_on(59.6).unwrap();
        assert_eq!(frame.last(), Some(&0x3c));
    }

    #[test]
    fn test_turn_on_out_of_range() {
        assert!(matches!(
            encode_turn_on(300.0),
            Err(FrameError::TemperatureOutOfRange { .. })
        ));
        assert!(encode_turn_on(-4.0).is_err());
        assert!(encode_turn_on(f64::NAN).is_err());
    }

    #[test]
    fn test_fixed_commands() {
        assert_eq!(hex::encode(encode_turn_off()), "aaaaaaaa0500008200");
        assert_eq!(hex::encode(encode_no_op()), "aaaaaaaa0400000d");
    }

    #[test]
    fn test_opcode_values() {
        assert_eq!(u8::from(CommandOpcode::Hello), 0x83);
        assert_eq!(u8::from(CommandOpcode::TurnOn), 0x84);
        assert_eq!(u8::from(CommandOpcode::TurnOff), 0x82);
        assert_eq!(u8::from(CommandOpcode::NoOp), 0x0D);
    }
}
