//! Contract opcodes
//!
//! Instruction set of the transaction-data VM. Literal pushes take their
//! one-byte operand from the byte directly before the opcode, so `0x02 0x0a`
//! pushes the integer 2.

/// Opcodes for the contract VM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    /// Push the preceding byte as an integer
    PushInt = 0x0a,
    /// Add top two integers
    Add = 0x0b,
    /// Push the preceding byte as a byte
    PushByte = 0x0c,
    /// Pop a count `n`, then `n` bytes, and push them as one byte string
    Pack = 0x0d,
    /// Subtract top from second
    Sub = 0x0e,
    /// Pop key then value and write the value to contract state
    Store = 0x0f,
    /// Pop key and push the stored value
    Get = 0x10,
    /// Multiply top two integers
    Mul = 0x11,
    /// Divide second by top
    Div = 0x12,
}

impl OpCode {
    /// Convert byte to opcode
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x0a => Some(OpCode::PushInt),
            0x0b => Some(OpCode::Add),
            0x0c => Some(OpCode::PushByte),
            0x0d => Some(OpCode::Pack),
            0x0e => Some(OpCode::Sub),
            0x0f => Some(OpCode::Store),
            0x10 => Some(OpCode::Get),
            0x11 => Some(OpCode::Mul),
            0x12 => Some(OpCode::Div),
            _ => None,
        }
    }

    /// Whether the opcode consumes the literal byte in front of it
    pub fn takes_literal(&self) -> bool {
        matches!(self, OpCode::PushInt | OpCode::PushByte)
    }

    pub fn name(&self) -> &'static str {
        match self {
            OpCode::PushInt => "PUSHINT",
            OpCode::Add => "ADD",
            OpCode::PushByte => "PUSHBYTE",
            OpCode::Pack => "PACK",
            OpCode::Sub => "SUB",
            OpCode::Store => "STORE",
            OpCode::Get => "GET",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_from_byte() {
        for byte in 0x0a..=0x12u8 {
            let op = OpCode::from_byte(byte).unwrap();
            assert_eq!(op as u8, byte);
        }
        assert_eq!(OpCode::from_byte(0x00), None);
        assert_eq!(OpCode::from_byte(0xff), None);
    }

    #[test]
    fn test_literal_opcodes() {
        assert!(OpCode::PushInt.takes_literal());
        assert!(OpCode::PushByte.takes_literal());
        assert!(!OpCode::Pack.takes_literal());
        assert!(!OpCode::Store.takes_literal());
    }
}
