use std::fmt::{self, Debug};

use num_complex::{Complex, Complex32, Complex64};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::linalg::Field;
use crate::persistence::ArchivedFloat;

/// Element type of a signal's data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Complex64,
    Complex128,
}

impl DType {
    /// Floating point or complex.
    pub fn is_inexact(self) -> bool {
        matches!(
            self,
            DType::Float32 | DType::Float64 | DType::Complex64 | DType::Complex128
        )
    }

    pub fn is_complex(self) -> bool {
        matches!(self, DType::Complex64 | DType::Complex128)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::UInt32 => "uint32",
            DType::UInt64 => "uint64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
        };
        f.write_str(name)
    }
}

/// A type that can be stored in a `Signal`.
///
/// `Field` is the scalar the learning results are computed in. Integer
/// elements map to `f64` only so that the type is nameable; the engine
/// rejects them before any conversion happens.
pub trait Element:
    Copy + PartialEq + Debug + Send + Sync + Serialize + DeserializeOwned + 'static
{
    type Field: Field;

    const DTYPE: DType;

    /// Archive representation, see `persistence`.
    type Archived: Serialize + DeserializeOwned;

    fn to_field(self) -> Self::Field;

    fn archive(self) -> Self::Archived;

    fn restore(archived: Self::Archived) -> Self;
}

macro_rules! integer_element {
    ($($ty:ty => $dtype:ident),* $(,)?) => {
        $(
            impl Element for $ty {
                type Field = f64;
                const DTYPE: DType = DType::$dtype;
                type Archived = $ty;

                fn to_field(self) -> f64 {
                    self as f64
                }

                fn archive(self) -> $ty {
                    self
                }

                fn restore(archived: $ty) -> Self {
                    archived
                }
            }
        )*
    };
}

integer_element!(
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
);

impl Element for f32 {
    type Field = f64;
    const DTYPE: DType = DType::Float32;
    type Archived = ArchivedFloat;

    fn to_field(self) -> f64 {
        f64::from(self)
    }

    fn archive(self) -> ArchivedFloat {
        ArchivedFloat(f64::from(self))
    }

    fn restore(archived: ArchivedFloat) -> Self {
        archived.0 as f32
    }
}

impl Element for f64 {
    type Field = f64;
    const DTYPE: DType = DType::Float64;
    type Archived = ArchivedFloat;

    fn to_field(self) -> f64 {
        self
    }

    fn archive(self) -> ArchivedFloat {
        ArchivedFloat(self)
    }

    fn restore(archived: ArchivedFloat) -> Self {
        archived.0
    }
}

impl Element for Complex32 {
    type Field = Complex64;
    const DTYPE: DType = DType::Complex64;
    type Archived = (ArchivedFloat, ArchivedFloat);

    fn to_field(self) -> Complex64 {
        Complex::new(f64::from(self.re), f64::from(self.im))
    }

    fn archive(self) -> Self::Archived {
        (ArchivedFloat(f64::from(self.re)), ArchivedFloat(f64::from(self.im)))
    }

    fn restore((re, im): Self::Archived) -> Self {
        Complex::new(re.0 as f32, im.0 as f32)
    }
}

impl Element for Complex64 {
    type Field = Complex64;
    const DTYPE: DType = DType::Complex128;
    type Archived = (ArchivedFloat, ArchivedFloat);

    fn to_field(self) -> Complex64 {
        self
    }

    fn archive(self) -> Self::Archived {
        (ArchivedFloat(self.re), ArchivedFloat(self.im))
    }

    fn restore((re, im): Self::Archived) -> Self {
        Complex::new(re.0, im.0)
    }
}
