//! Command parameters
//!
//! Parameters are created by name and value, have their value run through
//! [`DatabaseValue::coerce_null`], and are consumed by the command that binds
//! them.

use super::value::DatabaseValue;

/// Direction of a bound parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterDirection {
    #[default]
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

/// Declared parameter type, for providers that need one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Boolean,
    Int32,
    Int64,
    Double,
    String,
    DateTime,
    Binary,
}

/// A named value bound to a command
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: DatabaseValue,
    direction: ParameterDirection,
    param_type: Option<ParamType>,
    size: Option<usize>,
}

impl Parameter {
    /// Input parameter. Any leading `@`, `:` or `?` in `name` is dropped.
    pub fn new(name: impl AsRef<str>, value: impl Into<DatabaseValue>) -> Self {
        Self {
            name: normalize_name(name.as_ref()).to_string(),
            value: value.into().coerce_null(),
            direction: ParameterDirection::Input,
            param_type: None,
            size: None,
        }
    }

    /// Parameter with a declared type. Binary parameters take their size from
    /// the byte length of the value.
    pub fn typed(name: impl AsRef<str>, param_type: ParamType, value: impl Into<DatabaseValue>) -> Self {
        let mut param = Self::new(name, value);
        param.param_type = Some(param_type);
        if param_type == ParamType::Binary {
            param.size = param.value.as_bytes().map(<[u8]>::len);
        }
        param
    }

    #[must_use]
    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &DatabaseValue {
        &self.value
    }

    pub fn direction(&self) -> ParameterDirection {
        self.direction
    }

    pub fn param_type(&self) -> Option<ParamType> {
        self.param_type
    }

    pub fn size(&self) -> Option<usize> {
        self.size
    }

    /// Whether the value travels to the server
    pub fn is_input(&self) -> bool {
        matches!(
            self.direction,
            ParameterDirection::Input | ParameterDirection::InputOutput
        )
    }

    pub fn into_value(self) -> DatabaseValue {
        self.value
    }
}

/// Strip a provider prefix from a parameter name
pub fn normalize_name(name: &str) -> &str {
    name.trim_start_matches(['@', ':', '?'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_name_prefix_is_dropped() {
        assert_eq!(Parameter::new("@id", 1).name(), "id");
        assert_eq!(Parameter::new(":id", 1).name(), "id");
        assert_eq!(Parameter::new("id", 1).name(), "id");
    }

    #[test]
    fn test_parameter_value_is_coerced() {
        assert!(Parameter::new("p", "  ").value().is_null());
        assert!(Parameter::new("p", i32::MIN).value().is_null());
        assert_eq!(Parameter::new("p", "x").value(), &DatabaseValue::from("x"));
    }

    #[test]
    fn test_binary_parameter_size() {
        let p = Parameter::typed("blob", ParamType::Binary, vec![1u8, 2, 3]);
        assert_eq!(p.size(), Some(3));
        assert_eq!(p.param_type(), Some(ParamType::Binary));
        assert!(p.is_input());
    }

    #[test]
    fn test_output_parameter_is_not_input() {
        let p = Parameter::new("out", DatabaseValue::Null).with_direction(ParameterDirection::Output);
        assert!(!p.is_input());
    }
}
