//! Values bound as parameters and read back from result sets
//!
//! Reads are lenient: numbers convert between widths, text parses into
//! numbers, booleans and dates, and anything that does not fit reads as
//! `None`. [`DatabaseValue::coerce_null`] maps the "no value" sentinels
//! (blank text, numeric minimums, the minimum date) to `Null` before a value
//! is bound.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Text layouts tried when a string column is read as a date/time
const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

/// Layout used when a date/time is rendered as text
const DATETIME_DISPLAY: &str = "%Y-%m-%d %H:%M:%S%.f";

/// A single column or parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    /// Date and time without zone
    DateTime(NaiveDateTime),
}

impl DatabaseValue {
    /// Integral view shared by the integer accessors
    fn integral(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Int(n) => Some(i64::from(*n)),
            Self::Long(n) => Some(*n),
            Self::Float(x) => Some(*x as i64),
            Self::Double(x) => Some(*x as i64),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Floating view shared by the float accessors
    fn real(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(f64::from(*n)),
            Self::Long(n) => Some(*n as f64),
            Self::Float(x) => Some(f64::from(*x)),
            Self::Double(x) => Some(*x),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Booleans, non-zero integers, and `Y`/`N`, `true`/`false`, `1`/`0`,
    /// `yes`/`no` text in any case
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(_) | Self::Long(_) => self.integral().map(|n| n != 0),
            Self::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" | "true" | "1" => Some(true),
                "n" | "no" | "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// `None` when the value does not fit in 32 bits
    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Float(x) => Some(*x as i32),
            Self::Double(x) => Some(*x as i32),
            _ => self.integral().and_then(|n| i32::try_from(n).ok()),
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        self.integral()
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(x) => Some(*x),
            Self::String(s) => s.trim().parse().ok(),
            _ => self.real().map(|x| x as f32),
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        self.real()
    }

    /// Date/time values as is; text parsed from the common layouts, with a
    /// bare `YYYY-MM-DD` read as midnight
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            Self::String(s) => {
                let text = s.trim();
                DATETIME_FORMATS
                    .iter()
                    .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
                    .or_else(|| {
                        NaiveDate::parse_from_str(text, "%Y-%m-%d")
                            .ok()
                            .and_then(|d| d.and_hms_opt(0, 0, 0))
                    })
            }
            _ => None,
        }
    }

    /// Borrowed text, only for `String` values
    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Display text; `Null` reads as an empty string
    pub fn as_string(&self) -> String {
        self.to_string()
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::String(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null or an empty string. Clause builders skip absent values.
    pub fn is_absent(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Map "no value" sentinels to `Null`.
    ///
    /// Blank or whitespace-only strings, the minimum value of each numeric type
    /// and the minimum date/time all become `Null`. Applied to every parameter
    /// value before it is bound.
    pub fn coerce_null(self) -> Self {
        let absent = match &self {
            Self::String(s) => s.trim().is_empty(),
            Self::Int(n) => *n == i32::MIN,
            Self::Long(n) => *n == i64::MIN,
            Self::Float(x) => *x == f32::MIN,
            Self::Double(x) => *x == f64::MIN,
            Self::DateTime(dt) => *dt == NaiveDateTime::MIN,
            _ => false,
        };
        if absent {
            Self::Null
        } else {
            self
        }
    }

    /// Short name of the variant, used in type mismatch errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
            Self::DateTime(_) => "datetime",
        }
    }
}

impl fmt::Display for DatabaseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(n) => write!(f, "{}", n),
            Self::Long(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Double(x) => write!(f, "{}", x),
            Self::String(s) => f.write_str(s),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_DISPLAY)),
        }
    }
}

macro_rules! value_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for DatabaseValue {
                fn from(v: $source) -> Self {
                    Self::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int,
    u32 => Long,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => String,
    &str => String,
    &String => String,
    Vec<u8> => Bytes,
    NaiveDateTime => DateTime,
}

/// `'\0'` is the "no character" sentinel and converts to `Null`
impl From<char> for DatabaseValue {
    fn from(c: char) -> Self {
        match c {
            '\0' => Self::Null,
            c => Self::String(c.to_string()),
        }
    }
}

/// Midnight of the given day
impl From<NaiveDate> for DatabaseValue {
    fn from(d: NaiveDate) -> Self {
        d.and_hms_opt(0, 0, 0).map_or(Self::Null, Self::DateTime)
    }
}

impl<T: Into<DatabaseValue>> From<Option<T>> for DatabaseValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
