// RDB - Remote Program Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// A value bound to a variable in a program's run context.
///
/// The statement language is scoped down to scalars; what matters for the
/// coordinator is only that values have a stable textual representation,
/// since every response that surfaces a value renders it as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Signed integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    Str(String),
    /// Boolean
    Bool(bool),
}

/// The mutable name-to-value bindings produced by one run of a program.
///
/// A `BTreeMap` keeps variable listings in responses deterministic.
pub type ValContext = BTreeMap<String, Value>;

impl Value {
    /// Short name of the value's type, used in interpreter error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bool(_) => "bool",
        }
    }
}

impl fmt::Display for Value {
    /// Renders the value the way the wire protocol shows it: integers and
    /// floats as written, booleans capitalized, strings single-quoted with
    /// backslash escapes. Floats always carry a decimal point so that
    /// `4.0` stays distinguishable from the integer `4`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => {
                if v.is_finite() && v.fract() == 0.0 {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Self::Str(s) => {
                write!(f, "'")?;
                for c in s.chars() {
                    match c {
                        '\'' => write!(f, "\\'")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        _ => write!(f, "{c}")?,
                    }
                }
                write!(f, "'")
            }
            Self::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_int_and_float() {
        assert_eq!(Value::Int(3).to_string(), "3");
        assert_eq!(Value::Float(3.5).to_string(), "3.5");
        // Whole floats keep their decimal point
        assert_eq!(Value::Float(4.0).to_string(), "4.0");
    }

    #[test]
    fn test_display_str_is_quoted() {
        assert_eq!(Value::from("hi").to_string(), "'hi'");
        assert_eq!(Value::from("it's").to_string(), "'it\\'s'");
    }

    #[test]
    fn test_display_bool() {
        assert_eq!(Value::Bool(true).to_string(), "True");
        assert_eq!(Value::Bool(false).to_string(), "False");
    }

}
