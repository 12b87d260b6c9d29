//! Record payloads exchanged by the integration-test hub.
//!
//! Field names are the ones clients put on the wire, so they keep their
//! capitalised spelling.

use std::fmt;

use hubcore::FromValue;
use hubcore::IntoValue;
use hubcore::Type;
use hubcore::Value;
use hubcore::value;

const FIRST_NAME: &str = "FirstName";
const LAST_NAME: &str = "LastName";
const GREETING_TEXT: &str = "GreetingText";

/// A person's name, as sent by a client asking to be greeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonName {
    pub first_name: String,
    pub last_name: String,
}

impl PersonName {
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self { first_name: first_name.into(), last_name: last_name.into() }
    }

    /// The parameter shape accepted by methods taking a `PersonName`.
    pub fn shape() -> Type {
        Type::record([(FIRST_NAME, Type::String), (LAST_NAME, Type::String)])
    }

    pub fn greet(self) -> Greeting {
        let greeting_text = format!("Hello {} {}", self.first_name, self.last_name);
        Greeting { first_name: self.first_name, last_name: self.last_name, greeting_text }
    }
}

impl fmt::Display for PersonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first_name, self.last_name)
    }
}

impl FromValue for PersonName {
    fn from_value(value: Value) -> value::Result<Self> {
        let mut fields = value::into_record(value)?;
        Ok(Self {
            first_name: value::take_field(&mut fields, FIRST_NAME)?,
            last_name: value::take_field(&mut fields, LAST_NAME)?,
        })
    }
}

impl IntoValue for PersonName {
    fn into_value(self) -> Value {
        Value::record([(FIRST_NAME, Value::String(self.first_name)), (LAST_NAME, Value::String(self.last_name))])
    }
}

/// The reply to a `PersonName`: the name echoed back with a greeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    pub first_name: String,
    pub last_name: String,
    pub greeting_text: String,
}

impl FromValue for Greeting {
    fn from_value(value: Value) -> value::Result<Self> {
        let mut fields = value::into_record(value)?;
        Ok(Self {
            first_name: value::take_field(&mut fields, FIRST_NAME)?,
            last_name: value::take_field(&mut fields, LAST_NAME)?,
            greeting_text: value::take_field(&mut fields, GREETING_TEXT)?,
        })
    }
}

impl IntoValue for Greeting {
    fn into_value(self) -> Value {
        Value::record([
            (FIRST_NAME, Value::String(self.first_name)),
            (LAST_NAME, Value::String(self.last_name)),
            (GREETING_TEXT, Value::String(self.greeting_text)),
        ])
    }
}
