//! UEFI Dependency Expression (DEPEX) support
//!
//! This crate decodes the opcode stream of a dependency expression section into [`Opcode`]s and renders it
//! in readable form. Expressions are captured as found; they are not evaluated.
//!
//! ## Example
//!
//! ```rust
//! use efipe_depex::{Depex, Opcode};
//!
//! let depex = Depex::from([0x06u8, 0x08].as_slice());
//! assert_eq!(depex.opcodes(), &[Opcode::True, Opcode::End]);
//! assert_eq!(depex.to_string(), "TRUE END");
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation. All rights reserved.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::{fmt, mem};

use uuid::Uuid;

/// The size of a GUID in bytes
const GUID_SIZE: usize = mem::size_of::<Uuid>();

/// A UEFI dependency expression (DEPEX) opcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opcode {
    /// If present, this must be the first and only opcode,
    /// may be used by DXE and SMM drivers.
    Before(Uuid),
    /// If present, this must be the first and only opcode,
    /// may be used by DXE and SMM drivers.
    After(Uuid),
    /// A Push opcode is followed by a GUID.
    Push(Uuid),
    /// A logical AND operation of the two operands on the top
    /// of the stack.
    And,
    /// A logical OR operation of the two operands on the top
    /// of the stack.
    Or,
    /// A logical NOT operation of the operand on the top of
    /// the stack.
    Not,
    /// Pushes a true value onto the stack.
    True,
    /// Pushes a false value onto the stack.
    False,
    /// The End opcode is the last opcode in the expression.
    End,
    /// If present, this must be the first opcode in the expression.
    /// Used to schedule on request.
    Sor,
    /// An unrecognized opcode; carries the raw value.
    Unknown(u8),
    /// A known opcode with an unexpected payload length.
    Malformed {
        /// The unhandled opcode value.
        opcode: u8,
        /// The length of the payload sent with the opcode.
        len: usize,
    },
}

/// Converts a little-endian encoded GUID to a UUID.
fn uuid_from_slice(slice: Option<&[u8]>) -> Option<Uuid> {
    Uuid::from_slice_le(slice?).ok()
}

impl<'a> From<&'a [u8]> for Opcode {
    /// Creates an Opcode from a byte slice.
    ///
    /// `bytes` must not be empty.
    fn from(bytes: &'a [u8]) -> Self {
        match bytes[0] {
            0x00 => match uuid_from_slice(bytes.get(1..GUID_SIZE + 1)) {
                Some(uuid) => Opcode::Before(uuid),
                None => Opcode::Malformed { opcode: 0x00, len: bytes.len() - 1 },
            },
            0x01 => match uuid_from_slice(bytes.get(1..GUID_SIZE + 1)) {
                Some(uuid) => Opcode::After(uuid),
                None => Opcode::Malformed { opcode: 0x01, len: bytes.len() - 1 },
            },
            0x02 => match uuid_from_slice(bytes.get(1..GUID_SIZE + 1)) {
                Some(uuid) => Opcode::Push(uuid),
                None => Opcode::Malformed { opcode: 0x02, len: bytes.len() - 1 },
            },
            0x03 => Opcode::And,
            0x04 => Opcode::Or,
            0x05 => Opcode::Not,
            0x06 => Opcode::True,
            0x07 => Opcode::False,
            0x08 => Opcode::End,
            0x09 => Opcode::Sor,
            other => Opcode::Unknown(other),
        }
    }
}

impl Opcode {
    /// Number of bytes this opcode occupies in the encoded expression.
    fn byte_size(&self) -> usize {
        match *self {
            Opcode::Before(_) | Opcode::After(_) | Opcode::Push(_) => 1 + GUID_SIZE,
            // A truncated operand runs to the end of the expression.
            Opcode::Malformed { len, .. } => 1 + len,
            _ => 1,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::Before(uuid) => write!(f, "BEFORE {uuid:X}"),
            Opcode::After(uuid) => write!(f, "AFTER {uuid:X}"),
            Opcode::Push(uuid) => write!(f, "PUSH {uuid:X}"),
            Opcode::And => f.write_str("AND"),
            Opcode::Or => f.write_str("OR"),
            Opcode::Not => f.write_str("NOT"),
            Opcode::True => f.write_str("TRUE"),
            Opcode::False => f.write_str("FALSE"),
            Opcode::End => f.write_str("END"),
            Opcode::Sor => f.write_str("SOR"),
            Opcode::Unknown(opcode) => write!(f, "UNKNOWN({opcode:#04x})"),
            Opcode::Malformed { opcode, len } => write!(f, "MALFORMED({opcode:#04x}, {len} bytes)"),
        }
    }
}

/// A UEFI dependency expression (DEPEX)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Depex {
    expression: Vec<Opcode>,
}

impl From<&[u8]> for Depex {
    fn from(value: &[u8]) -> Self {
        let expression: Vec<Opcode> = DepexParser::new(value).collect();
        log::trace!("decoded {} depex opcode(s) from {} byte(s)", expression.len(), value.len());
        Self { expression }
    }
}

impl From<Vec<u8>> for Depex {
    fn from(value: Vec<u8>) -> Self {
        Self::from(value.as_slice())
    }
}

impl Depex {
    /// The opcodes of the expression, in encoded order.
    pub fn opcodes(&self) -> &[Opcode] {
        &self.expression
    }

    pub fn is_empty(&self) -> bool {
        self.expression.is_empty()
    }
}

impl fmt::Display for Depex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, opcode) in self.expression.iter().enumerate() {
            if index != 0 {
                f.write_str(" ")?;
            }
            write!(f, "{opcode}")?;
        }
        Ok(())
    }
}

struct DepexParser<'a> {
    expression: &'a [u8],
    index: usize,
}

impl<'a> DepexParser<'a> {
    fn new(expression: &'a [u8]) -> Self {
        Self { expression, index: 0 }
    }
}

impl Iterator for DepexParser<'_> {
    type Item = Opcode;

    /// Iterates over the DEPEX expression, returning the next Opcode.
    fn next(&mut self) -> Option<Opcode> {
        if self.index >= self.expression.len() {
            return None;
        }

        let opcode = Opcode::from(&self.expression[self.index..]);
        self.index += opcode.byte_size();
        Some(opcode)
    }
}

#[cfg(test)]
mod tests {
    use core::str::FromStr;

    use super::*;

    const DEVICE_PATH_PROTOCOL_GUID_BYTES: [u8; 16] =
        [0x4E, 0xBE, 0x79, 0x03, 0x06, 0xD7, 0x7D, 0x43, 0xB0, 0x37, 0xED, 0xB8, 0x2F, 0xB7, 0x72, 0xA4];

    fn push(guid: &[u8; 16]) -> Vec<u8> {
        let mut bytes = vec![0x02];
        bytes.extend_from_slice(guid);
        bytes
    }

    #[test]
    fn malformed_opcodes_should_generate_correct_malformed_opcode_enum_variant() {
        // Verify "Before" opcode with no GUID
        assert_eq!(Opcode::from([0x00u8].as_slice()), Opcode::Malformed { opcode: 0x00, len: 0 });
        assert_eq!(
            Opcode::from([0x00u8, 0x01u8, 0x02u8, 0x03u8].as_slice()),
            Opcode::Malformed { opcode: 0x00, len: 3 }
        );

        // Verify "After" opcode with no GUID
        assert_eq!(Opcode::from([0x01u8].as_slice()), Opcode::Malformed { opcode: 0x01, len: 0 });

        // Verify "Push" opcode with a truncated GUID
        assert_eq!(
            Opcode::from([0x02u8, 0x01u8, 0x02u8, 0x03u8].as_slice()),
            Opcode::Malformed { opcode: 0x02, len: 3 }
        );
    }

    #[test]
    fn malformed_opcode_should_end_the_expression() {
        let depex = Depex::from(vec![0x06, 0x02, 0x03, 0x04]);
        assert_eq!(depex.opcodes(), &[Opcode::True, Opcode::Malformed { opcode: 0x02, len: 2 }]);
    }

    #[test]
    fn guid_operands_should_decode_little_endian() {
        let depex = Depex::from(push(&DEVICE_PATH_PROTOCOL_GUID_BYTES));
        let uuid = Uuid::from_str("0379be4e-d706-437d-b037-edb82fb772a4").unwrap();
        assert_eq!(depex.opcodes(), &[Opcode::Push(uuid)]);
    }

    #[test]
    fn expression_should_decode_in_order() {
        let mut bytes = push(&DEVICE_PATH_PROTOCOL_GUID_BYTES);
        bytes.extend(push(&[0x11; 16]));
        bytes.extend([0x04, 0x05, 0x07, 0x03, 0x08]);
        let depex = Depex::from(bytes);
        let opcodes = depex.opcodes();
        assert_eq!(opcodes.len(), 7);
        assert!(matches!(opcodes[1], Opcode::Push(_)));
        assert_eq!(&opcodes[2..], &[Opcode::Or, Opcode::Not, Opcode::False, Opcode::And, Opcode::End]);
    }

    #[test]
    fn depex_should_render_readable_text() {
        let mut bytes = push(&DEVICE_PATH_PROTOCOL_GUID_BYTES);
        bytes.extend([0x06, 0x03, 0x08]);
        assert_eq!(Depex::from(bytes).to_string(), "PUSH 0379BE4E-D706-437D-B037-EDB82FB772A4 TRUE AND END");
        assert_eq!(Depex::from([0x42u8].as_slice()).to_string(), "UNKNOWN(0x42)");
        assert_eq!(Depex::default().to_string(), "");
    }

    #[test]
    fn unknown_opcodes_should_be_preserved() {
        let depex = Depex::from(vec![0x0A, 0x06, 0x08]);
        assert_eq!(depex.opcodes(), &[Opcode::Unknown(0x0A), Opcode::True, Opcode::End]);
    }

    #[test]
    fn before_and_after_should_carry_their_guid() -> Result<(), uuid::Error> {
        let uuid = Uuid::from_str("0379be4e-d706-437d-b037-edb82fb772a4")?;

        let mut bytes = vec![0x00];
        bytes.extend(DEVICE_PATH_PROTOCOL_GUID_BYTES);
        bytes.push(0x08);
        assert_eq!(Depex::from(bytes).opcodes(), &[Opcode::Before(uuid), Opcode::End]);

        let mut bytes = vec![0x01];
        bytes.extend(DEVICE_PATH_PROTOCOL_GUID_BYTES);
        assert_eq!(Depex::from(bytes).to_string(), "AFTER 0379BE4E-D706-437D-B037-EDB82FB772A4");
        Ok(())
    }
}
