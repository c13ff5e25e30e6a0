//! JSON archives of learning results and whole signals.
//!
//! Arrays are written as `{"dim": [..], "data": [..]}` with row-major data;
//! missing optional keys read back as unset, so an archive written before a
//! BSS run loads without its `bss_*` entries. JSON has no literal for
//! non-finite numbers, so NaN and infinities are written as the strings
//! `"NaN"`, `"inf"` and `"-inf"`.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{Array, Dimension, IxDyn, ShapeError};
use serde::de::{self, DeserializeOwned, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Result;
use crate::learning_results::LearningResults;
use crate::linalg::Field;
use crate::signal::{Element, Signal};

/// A float as stored in an archive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ArchivedFloat(pub f64);

impl Serialize for ArchivedFloat {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let x = self.0;
        if x.is_finite() {
            serializer.serialize_f64(x)
        } else if x.is_nan() {
            serializer.serialize_str("NaN")
        } else if x > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }
}

struct ArchivedFloatVisitor;

impl Visitor<'_> for ArchivedFloatVisitor {
    type Value = ArchivedFloat;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number or one of \"NaN\", \"inf\", \"-inf\"")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<ArchivedFloat, E> {
        Ok(ArchivedFloat(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<ArchivedFloat, E> {
        Ok(ArchivedFloat(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<ArchivedFloat, E> {
        Ok(ArchivedFloat(v as f64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<ArchivedFloat, E> {
        match v {
            "NaN" => Ok(ArchivedFloat(f64::NAN)),
            "inf" => Ok(ArchivedFloat(f64::INFINITY)),
            "-inf" => Ok(ArchivedFloat(f64::NEG_INFINITY)),
            _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
        }
    }
}

impl<'de> Deserialize<'de> for ArchivedFloat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ArchivedFloatVisitor)
    }
}

#[derive(Serialize, Deserialize)]
struct ArchivedArray<R> {
    dim: Vec<usize>,
    data: Vec<R>,
}

impl<R> ArchivedArray<R> {
    fn from_array<E, D>(array: &Array<E, D>) -> Self
    where
        E: Element<Archived = R>,
        D: Dimension,
    {
        Self {
            dim: array.shape().to_vec(),
            data: array.iter().map(|&x| x.archive()).collect(),
        }
    }

    fn into_array<E, D>(self) -> std::result::Result<Array<E, D>, ShapeError>
    where
        E: Element<Archived = R>,
        D: Dimension,
    {
        let data = self.data.into_iter().map(E::restore).collect();
        Array::from_shape_vec(IxDyn(&self.dim), data)?.into_dimensionality::<D>()
    }
}

/// `#[serde(with = ..)]` codec for an array field.
pub(crate) mod array {
    use super::*;

    pub fn serialize<E, D, S>(array: &Array<E, D>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        E: Element,
        D: Dimension,
        S: Serializer,
    {
        ArchivedArray::from_array(array).serialize(serializer)
    }

    pub fn deserialize<'de, E, D, De>(deserializer: De) -> std::result::Result<Array<E, D>, De::Error>
    where
        E: Element,
        D: Dimension,
        De: Deserializer<'de>,
    {
        ArchivedArray::<E::Archived>::deserialize(deserializer)?
            .into_array()
            .map_err(de::Error::custom)
    }
}

/// `#[serde(with = ..)]` codec for an optional array field.
pub(crate) mod optional_array {
    use super::*;

    pub fn serialize<E, D, S>(array: &Option<Array<E, D>>, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        E: Element,
        D: Dimension,
        S: Serializer,
    {
        array.as_ref().map(ArchivedArray::from_array).serialize(serializer)
    }

    pub fn deserialize<'de, E, D, De>(deserializer: De) -> std::result::Result<Option<Array<E, D>>, De::Error>
    where
        E: Element,
        D: Dimension,
        De: Deserializer<'de>,
    {
        Option::<ArchivedArray<E::Archived>>::deserialize(deserializer)?
            .map(ArchivedArray::into_array)
            .transpose()
            .map_err(de::Error::custom)
    }
}

fn write_json<V: Serialize>(value: &V, path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, value)?;
    writer.flush()?;
    tracing::debug!(path = %path.display(), "archive written");
    Ok(())
}

fn read_json<V: DeserializeOwned>(path: &Path) -> Result<V> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

impl<T: Field> LearningResults<T> {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(self, path.as_ref())
    }

    /// Replaces every field with the archived values.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        *self = read_json(path.as_ref())?;
        Ok(())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}

impl<A: Element> Signal<A> {
    /// Writes data, axes, title and learning results.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        write_json(self, path.as_ref())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}
