//! Output-dtype and casting policies used by the dispatcher.

use std::fmt;
use std::str::FromStr;

use crate::dtype::DType;
use crate::{ReduceError, Result};

/// How the dispatcher chooses the output dtype of `apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputPolicy {
    /// Dtype of the first input.
    Same,
    /// Promotion of both input dtypes.
    Promoted,
    /// The configured default dtype.
    Default,
    Bool,
    Numeric,
    Real,
    FloatingPoint,
    RealFloatingPoint,
    ComplexFloatingPoint,
    /// Accumulation dtype of the promoted inputs.
    Accumulation,
}

impl OutputPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputPolicy::Same => "same",
            OutputPolicy::Promoted => "promoted",
            OutputPolicy::Default => "default",
            OutputPolicy::Bool => "bool",
            OutputPolicy::Numeric => "numeric",
            OutputPolicy::Real => "real",
            OutputPolicy::FloatingPoint => "floating_point",
            OutputPolicy::RealFloatingPoint => "real_floating_point",
            OutputPolicy::ComplexFloatingPoint => "complex_floating_point",
            OutputPolicy::Accumulation => "accumulation",
        }
    }
}

impl fmt::Display for OutputPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputPolicy {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "same" => OutputPolicy::Same,
            "promoted" => OutputPolicy::Promoted,
            "default" => OutputPolicy::Default,
            "bool" | "boolean" => OutputPolicy::Bool,
            "numeric" => OutputPolicy::Numeric,
            "real" => OutputPolicy::Real,
            "floating_point" => OutputPolicy::FloatingPoint,
            "real_floating_point" => OutputPolicy::RealFloatingPoint,
            "complex_floating_point" => OutputPolicy::ComplexFloatingPoint,
            "accumulation" => OutputPolicy::Accumulation,
            _ => {
                return Err(ReduceError::UnknownPolicy {
                    kind: "output",
                    value: s.to_string(),
                })
            }
        })
    }
}

/// How each primary input is cast before the kernel sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CastingPolicy {
    /// Inputs are passed through unchanged.
    #[default]
    None,
    /// Cast to the promotion of both inputs.
    Promoted,
    /// Cast to the output dtype.
    Output,
    /// Cast to the input's accumulation dtype.
    Accumulation,
}

impl CastingPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CastingPolicy::None => "none",
            CastingPolicy::Promoted => "promoted",
            CastingPolicy::Output => "output",
            CastingPolicy::Accumulation => "accumulation",
        }
    }
}

impl fmt::Display for CastingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CastingPolicy {
    type Err = ReduceError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "none" => CastingPolicy::None,
            "promoted" => CastingPolicy::Promoted,
            "output" => CastingPolicy::Output,
            "accumulation" => CastingPolicy::Accumulation,
            _ => {
                return Err(ReduceError::UnknownPolicy {
                    kind: "casting",
                    value: s.to_string(),
                })
            }
        })
    }
}

/// Output and casting policy pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Policies {
    pub output: OutputPolicy,
    pub casting: CastingPolicy,
}

impl Policies {
    pub fn new(output: OutputPolicy, casting: CastingPolicy) -> Self {
        Self { output, casting }
    }

    /// Parse both policies from their string tags.
    pub fn parse(output: &str, casting: &str) -> Result<Self> {
        Ok(Self {
            output: output.parse()?,
            casting: casting.parse()?,
        })
    }
}

impl Default for Policies {
    fn default() -> Self {
        Self::new(OutputPolicy::Same, CastingPolicy::None)
    }
}

fn int_bits(dtype: DType) -> usize {
    match dtype {
        DType::Int8 | DType::Uint8 => 8,
        DType::Int16 | DType::Uint16 => 16,
        DType::Int32 | DType::Uint32 => 32,
        _ => 0,
    }
}

fn signed_with_bits(bits: usize) -> DType {
    match bits {
        8 => DType::Int8,
        16 => DType::Int16,
        32 => DType::Int32,
        _ => DType::Float64,
    }
}

fn unsigned_with_bits(bits: usize) -> DType {
    match bits {
        8 => DType::Uint8,
        16 => DType::Uint16,
        _ => DType::Uint32,
    }
}

/// Real dtype of the components of a complex dtype; real dtypes map to themselves.
fn component_dtype(dtype: DType) -> DType {
    match dtype {
        DType::Complex128 => DType::Float64,
        DType::Complex64 => DType::Float32,
        other => other,
    }
}

/// Smallest dtype both `a` and `b` convert to without losing range.
pub fn promote_dtypes(a: DType, b: DType) -> DType {
    if a == b {
        return a;
    }
    match (a, b) {
        (DType::Generic, _) | (_, DType::Generic) => DType::Generic,
        (DType::Bool, other) | (other, DType::Bool) => other,
        _ if a.is_complex() || b.is_complex() => {
            match promote_dtypes(component_dtype(a), component_dtype(b)) {
                DType::Float32 => DType::Complex64,
                _ => DType::Complex128,
            }
        }
        (DType::Float64, _) | (_, DType::Float64) => DType::Float64,
        (DType::Float32, other) | (other, DType::Float32) => {
            if int_bits(other) <= 16 {
                DType::Float32
            } else {
                DType::Float64
            }
        }
        _ => {
            let (ba, bb) = (int_bits(a), int_bits(b));
            match (a.is_signed_integer(), b.is_signed_integer()) {
                (true, true) => signed_with_bits(ba.max(bb)),
                (false, false) => unsigned_with_bits(ba.max(bb)),
                (signed_a, _) => {
                    let (s, u) = if signed_a { (ba, bb) } else { (bb, ba) };
                    if s > u {
                        signed_with_bits(s)
                    } else {
                        signed_with_bits(2 * u)
                    }
                }
            }
        }
    }
}

/// Dtype a running reduction over `dtype` accumulates in.
pub fn accumulation_dtype(dtype: DType) -> DType {
    match dtype {
        DType::Bool | DType::Int8 | DType::Int16 | DType::Int32 => DType::Int32,
        DType::Uint8 | DType::Uint16 | DType::Uint32 => DType::Uint32,
        other => other,
    }
}

fn default_real_floating(default_dtype: DType) -> DType {
    if default_dtype.is_real_floating() {
        default_dtype
    } else {
        DType::Float64
    }
}

/// Output dtype for inputs `x` and `y` under `policy`.
pub fn resolve_output_dtype(policy: OutputPolicy, x: DType, y: DType, default_dtype: DType) -> DType {
    let promoted = promote_dtypes(x, y);
    match policy {
        OutputPolicy::Same => x,
        OutputPolicy::Promoted => promoted,
        OutputPolicy::Default => default_dtype,
        OutputPolicy::Bool => DType::Bool,
        OutputPolicy::Numeric => {
            if promoted.is_numeric() {
                promoted
            } else {
                default_dtype
            }
        }
        OutputPolicy::Real => {
            if promoted.is_real() {
                promoted
            } else {
                default_dtype
            }
        }
        OutputPolicy::FloatingPoint => {
            if promoted.is_floating() {
                promoted
            } else if default_dtype.is_floating() {
                default_dtype
            } else {
                DType::Float64
            }
        }
        OutputPolicy::RealFloatingPoint => {
            if promoted.is_floating() {
                component_dtype(promoted)
            } else {
                default_real_floating(default_dtype)
            }
        }
        OutputPolicy::ComplexFloatingPoint => match promoted {
            DType::Complex128 | DType::Complex64 => promoted,
            DType::Float32 => DType::Complex64,
            _ => DType::Complex128,
        },
        OutputPolicy::Accumulation => accumulation_dtype(promoted),
    }
}

/// Dtype the input `this` must be cast to, given the other input and the output.
pub fn resolve_casting_dtype(policy: CastingPolicy, this: DType, other: DType, output: DType) -> DType {
    match policy {
        CastingPolicy::None => this,
        CastingPolicy::Promoted => promote_dtypes(this, other),
        CastingPolicy::Output => output,
        CastingPolicy::Accumulation => accumulation_dtype(this),
    }
}
