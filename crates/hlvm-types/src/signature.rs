//! Native primitive signatures
//!
//! A native function advertises its call shape as a short string over a
//! closed alphabet, for example `Pid_v` for `(i32, f64) -> void`:
//!
//! ```text
//! v void     c i8      s i16     i i32     f f32     d f64
//! b bool     B bytes   X dynamic O object  A array   T type
//! R<t>  reference to t         N<t>  nullable t
//! P<args>_<ret>  function (also the form of a whole signature)
//! ```
//!
//! Virtual, open dynamic object, abstract and enum types have no letter of
//! their own and are passed as dynamic (`X`).

use crate::error::{SignatureError, TypeError};
use crate::registry::TypeRegistry;
use crate::ty::{HlType, TypeId};
use std::fmt;

/// One type in a native signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigType {
    /// `v`
    Void,
    /// `c`
    I8,
    /// `s`
    I16,
    /// `i`
    I32,
    /// `f`
    F32,
    /// `d`
    F64,
    /// `b`
    Bool,
    /// `B`
    Bytes,
    /// `X`
    Dyn,
    /// `P..._.`
    Fun(Box<Signature>),
    /// `O`
    Obj,
    /// `A`
    Array,
    /// `T`
    Type,
    /// `R` + inner
    Ref(Box<SigType>),
    /// `N` + inner
    Null(Box<SigType>),
}

impl SigType {
    /// Signature shape of a registered type
    pub fn of(registry: &TypeRegistry, id: TypeId) -> Result<Self, TypeError> {
        Ok(match registry.ty(id)? {
            HlType::Void => SigType::Void,
            HlType::I8 => SigType::I8,
            HlType::I16 => SigType::I16,
            HlType::I32 => SigType::I32,
            HlType::F32 => SigType::F32,
            HlType::F64 => SigType::F64,
            HlType::Bool => SigType::Bool,
            HlType::Bytes => SigType::Bytes,
            HlType::Dyn
            | HlType::Virtual(_)
            | HlType::DynObj
            | HlType::Abstract(_)
            | HlType::Enum(_) => SigType::Dyn,
            HlType::Fun(_) => SigType::Fun(Box::new(Signature::of(registry, id)?)),
            HlType::Obj(_) => SigType::Obj,
            HlType::Array(_) => SigType::Array,
            HlType::Type => SigType::Type,
            HlType::Ref(t) => SigType::Ref(Box::new(SigType::of(registry, *t)?)),
            HlType::Null(t) => SigType::Null(Box::new(SigType::of(registry, *t)?)),
        })
    }

    fn parse(input: &[u8], pos: &mut usize) -> Result<Self, SignatureError> {
        let c = *input.get(*pos).ok_or(SignatureError::UnexpectedEnd)?;
        let at = *pos;
        *pos += 1;
        Ok(match c {
            b'v' => SigType::Void,
            b'c' => SigType::I8,
            b's' => SigType::I16,
            b'i' => SigType::I32,
            b'f' => SigType::F32,
            b'd' => SigType::F64,
            b'b' => SigType::Bool,
            b'B' => SigType::Bytes,
            b'X' => SigType::Dyn,
            b'O' => SigType::Obj,
            b'A' => SigType::Array,
            b'T' => SigType::Type,
            b'R' => SigType::Ref(Box::new(SigType::parse(input, pos)?)),
            b'N' => SigType::Null(Box::new(SigType::parse(input, pos)?)),
            b'P' => SigType::Fun(Box::new(Signature::parse_body(input, pos)?)),
            other => {
                return Err(SignatureError::InvalidCode {
                    code: other as char,
                    pos: at,
                })
            }
        })
    }
}

impl fmt::Display for SigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigType::Void => f.write_str("v"),
            SigType::I8 => f.write_str("c"),
            SigType::I16 => f.write_str("s"),
            SigType::I32 => f.write_str("i"),
            SigType::F32 => f.write_str("f"),
            SigType::F64 => f.write_str("d"),
            SigType::Bool => f.write_str("b"),
            SigType::Bytes => f.write_str("B"),
            SigType::Dyn => f.write_str("X"),
            SigType::Fun(sig) => write!(f, "{}", sig),
            SigType::Obj => f.write_str("O"),
            SigType::Array => f.write_str("A"),
            SigType::Type => f.write_str("T"),
            SigType::Ref(t) => write!(f, "R{}", t),
            SigType::Null(t) => write!(f, "N{}", t),
        }
    }
}

/// Call shape of a native function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Argument shapes
    pub args: Vec<SigType>,
    /// Return shape
    pub ret: SigType,
}

impl Signature {
    /// Signature of a registered function type
    pub fn of(registry: &TypeRegistry, fun: TypeId) -> Result<Self, TypeError> {
        let f = registry.fun(fun)?;
        let args = f
            .args
            .iter()
            .map(|&a| SigType::of(registry, a))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Signature {
            args,
            ret: SigType::of(registry, f.ret)?,
        })
    }

    /// Parse a signature string such as `PiX_d`
    pub fn parse(s: &str) -> Result<Self, SignatureError> {
        let input = s.as_bytes();
        let mut pos = 0;
        match input.first() {
            Some(b'P') => pos += 1,
            Some(&c) => {
                return Err(SignatureError::InvalidCode {
                    code: c as char,
                    pos: 0,
                })
            }
            None => return Err(SignatureError::UnexpectedEnd),
        }
        let sig = Self::parse_body(input, &mut pos)?;
        if pos != input.len() {
            return Err(SignatureError::Trailing(pos));
        }
        Ok(sig)
    }

    fn parse_body(input: &[u8], pos: &mut usize) -> Result<Self, SignatureError> {
        let mut args = Vec::new();
        loop {
            match input.get(*pos) {
                None => return Err(SignatureError::UnexpectedEnd),
                Some(b'_') => {
                    *pos += 1;
                    break;
                }
                Some(_) => args.push(SigType::parse(input, pos)?),
            }
        }
        let ret = SigType::parse(input, pos)?;
        Ok(Signature { args, ret })
    }

    /// Number of arguments
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("P")?;
        for arg in &self.args {
            write!(f, "{}", arg)?;
        }
        write!(f, "_{}", self.ret)
    }
}
