use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::volume::VolumeError;

/// Axes of a regular grid. S, T and R are the grid-space x, y and z.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    S,
    T,
    R,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::S, Axis::T, Axis::R];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Axis::S => "S",
            Axis::T => "T",
            Axis::R => "R",
        };
        f.write_str(name)
    }
}

/// How values are carried from a source grid onto a target grid.
///
/// Parsed case-insensitively from the engine keys `"nearest neighbour"`
/// (alias `"enclosing voxel"`), `"tri-linear"` and `"tri-cubic"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum ResampleMethod {
    #[default]
    NearestNeighbour,
    Trilinear,
    Tricubic,
}

impl ResampleMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResampleMethod::NearestNeighbour => "nearest neighbour",
            ResampleMethod::Trilinear => "tri-linear",
            ResampleMethod::Tricubic => "tri-cubic",
        }
    }
}

impl fmt::Display for ResampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResampleMethod {
    type Err = VolumeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nearest neighbour" | "nearest neighbor" | "enclosing voxel" => {
                Ok(ResampleMethod::NearestNeighbour)
            }
            "tri-linear" | "trilinear" => Ok(ResampleMethod::Trilinear),
            "tri-cubic" | "tricubic" => Ok(ResampleMethod::Tricubic),
            _ => Err(VolumeError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl TryFrom<String> for ResampleMethod {
    type Error = VolumeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl Serialize for ResampleMethod {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Element type of a scalar column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    UInt8,
    Int32,
    Float16,
    Float32,
    #[default]
    Float64,
}

impl DataType {
    pub fn is_integer(&self) -> bool {
        matches!(self, DataType::UInt8 | DataType::Int32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parsing_is_case_insensitive() {
        assert_eq!(
            "Tri-Linear".parse::<ResampleMethod>().unwrap(),
            ResampleMethod::Trilinear
        );
        assert_eq!(
            "Enclosing Voxel".parse::<ResampleMethod>().unwrap(),
            ResampleMethod::NearestNeighbour
        );
        assert_eq!(
            " tri-cubic ".parse::<ResampleMethod>().unwrap(),
            ResampleMethod::Tricubic
        );
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let err = "sinc".parse::<ResampleMethod>().unwrap_err();
        assert!(matches!(err, VolumeError::UnsupportedMethod(ref m) if m == "sinc"));
    }
}
