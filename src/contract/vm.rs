//! Contract virtual machine
//!
//! A small stack machine that runs a transaction's `data` bytes against a
//! key/value [`State`]. Execution is deterministic and either runs to the
//! end of the code or fails with a [`VmError`].

use crate::contract::opcodes::OpCode;
use crate::contract::state::State;
use thiserror::Error;

/// Operand stack capacity
pub const STACK_CAPACITY: usize = 128;

// =============================================================================
// VM Errors
// =============================================================================

/// VM execution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VmError {
    #[error("Stack overflow")]
    StackOverflow,
    #[error("Stack underflow")]
    StackUnderflow,
    #[error("Invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),
    #[error("Missing operand for {0} at offset {1}")]
    MissingOperand(&'static str, usize),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow")]
    Overflow,
    #[error("Type mismatch: expected {0}")]
    TypeMismatch(&'static str),
    #[error("Key not found: {0}")]
    KeyNotFound(String),
}

/// A stack value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i64),
    Byte(u8),
    Bytes(Vec<u8>),
}

impl Value {
    fn into_int(self) -> Result<i64, VmError> {
        match self {
            Value::Int(n) => Ok(n),
            _ => Err(VmError::TypeMismatch("integer")),
        }
    }

    fn into_byte(self) -> Result<u8, VmError> {
        match self {
            Value::Byte(b) => Ok(b),
            _ => Err(VmError::TypeMismatch("byte")),
        }
    }

    fn into_bytes(self) -> Result<Vec<u8>, VmError> {
        match self {
            Value::Bytes(bytes) => Ok(bytes),
            _ => Err(VmError::TypeMismatch("bytes")),
        }
    }
}

/// Decode a little-endian integer written by `Store`
pub fn decode_int(bytes: &[u8]) -> Option<i64> {
    Some(i64::from_le_bytes(bytes.try_into().ok()?))
}

/// The contract virtual machine
pub struct VM<'a> {
    code: &'a [u8],
    pc: usize,
    stack: Vec<Value>,
    state: &'a mut State,
}

impl<'a> VM<'a> {
    pub fn new(code: &'a [u8], state: &'a mut State) -> Self {
        Self {
            code,
            pc: 0,
            stack: Vec::with_capacity(STACK_CAPACITY),
            state,
        }
    }

    /// Run until the end of the code
    pub fn run(&mut self) -> Result<(), VmError> {
        while self.pc < self.code.len() {
            self.step()?;
        }
        Ok(())
    }

    /// Values left on the stack, bottom first
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn pop(&mut self) -> Result<Value, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    fn push(&mut self, value: Value) -> Result<(), VmError> {
        if self.stack.len() >= STACK_CAPACITY {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(value);
        Ok(())
    }

    fn binary(&mut self, f: impl Fn(i64, i64) -> Result<i64, VmError>) -> Result<(), VmError> {
        let b = self.pop()?.into_int()?;
        let a = self.pop()?.into_int()?;
        self.push(Value::Int(f(a, b)?))
    }

    fn step(&mut self) -> Result<(), VmError> {
        let byte = self.code[self.pc];

        // A byte followed by a literal push is that push's operand
        match self.code.get(self.pc + 1).copied().and_then(OpCode::from_byte) {
            Some(OpCode::PushInt) => {
                self.pc += 2;
                return self.push(Value::Int(i64::from(byte)));
            }
            Some(OpCode::PushByte) => {
                self.pc += 2;
                return self.push(Value::Byte(byte));
            }
            _ => {}
        }

        let op = OpCode::from_byte(byte).ok_or(VmError::InvalidOpcode(byte))?;
        self.pc += 1;

        match op {
            OpCode::PushInt | OpCode::PushByte => {
                return Err(VmError::MissingOperand(op.name(), self.pc - 1));
            }
            OpCode::Pack => {
                let count = self.pop()?.into_int()?;
                let count = usize::try_from(count).map_err(|_| VmError::TypeMismatch("count"))?;
                if count > self.stack.len() {
                    return Err(VmError::StackUnderflow);
                }
                // Bytes are laid out in pop order
                let mut bytes = Vec::with_capacity(count);
                for _ in 0..count {
                    bytes.push(self.pop()?.into_byte()?);
                }
                self.push(Value::Bytes(bytes))?;
            }
            OpCode::Add => self.binary(|a, b| a.checked_add(b).ok_or(VmError::Overflow))?,
            OpCode::Sub => self.binary(|a, b| a.checked_sub(b).ok_or(VmError::Overflow))?,
            OpCode::Mul => self.binary(|a, b| a.checked_mul(b).ok_or(VmError::Overflow))?,
            OpCode::Div => self.binary(|a, b| {
                if b == 0 {
                    return Err(VmError::DivisionByZero);
                }
                a.checked_div(b).ok_or(VmError::Overflow)
            })?,
            OpCode::Store => {
                let key = self.pop()?.into_bytes()?;
                let value = self.pop()?.into_int()?;
                self.state.put(key, value.to_le_bytes().to_vec());
            }
            OpCode::Get => {
                let key = self.pop()?.into_bytes()?;
                let value = self
                    .state
                    .get(&key)
                    .ok_or_else(|| VmError::KeyNotFound(String::from_utf8_lossy(&key).into_owned()))?
                    .to_vec();
                self.push(Value::Bytes(value))?;
            }
        }
        Ok(())
    }
}

/// Bytecode assembly helpers
pub mod asm {
    use super::OpCode;

    /// Integer literals are a single byte, so 0..=255
    pub fn push_int(code: &mut Vec<u8>, n: u8) {
        code.push(n);
        code.push(OpCode::PushInt as u8);
    }

    pub fn push_byte(code: &mut Vec<u8>, b: u8) {
        code.push(b);
        code.push(OpCode::PushByte as u8);
    }

    /// Push `key` so that `Pack` rebuilds it in its original order
    ///
    /// Keys are at most 255 bytes; longer keys are truncated.
    pub fn push_key(code: &mut Vec<u8>, key: &[u8]) {
        let key = &key[..key.len().min(u8::MAX as usize)];
        for b in key.iter().rev() {
            push_byte(code, *b);
        }
        push_int(code, key.len() as u8);
        code.push(OpCode::Pack as u8);
    }

    /// `key = value` as a complete program
    pub fn store_int(key: &[u8], value: u8) -> Vec<u8> {
        let mut code = Vec::new();
        push_int(&mut code, value);
        push_key(&mut code, key);
        code.push(OpCode::Store as u8);
        code
    }
}
