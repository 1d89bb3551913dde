//! Connection and input kinds.
//!
//! A block exposes up to four kinds of connection. Two face "down/right"
//! (superior: they hold children) and two face "up/left" (inferior: they
//! attach the block to a parent):
//!
//! | Superior          | Inferior            | Pair carries            |
//! |-------------------|---------------------|-------------------------|
//! | `InputValue`      | `OutputValue`       | an expression value     |
//! | `NextStatement`   | `PreviousStatement` | a statement sequence    |
//!
//! Statement *inputs* (e.g. the body of a loop) are `NextStatement`
//! connections owned by an input rather than by the block itself.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// The kind of a live connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum ConnectionType {
    /// Value input on a parent block.
    #[strum(serialize = "input_value", serialize = "value")]
    InputValue,
    /// Output plug on a value block.
    #[strum(serialize = "output_value", serialize = "output")]
    OutputValue,
    /// Next connection (block-level) or statement input (input-level).
    #[strum(serialize = "next_statement", serialize = "next", serialize = "statement")]
    NextStatement,
    /// Previous connection on a statement block.
    #[strum(serialize = "previous_statement", serialize = "previous")]
    PreviousStatement,
}

impl ConnectionType {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionType::InputValue => "input_value",
            ConnectionType::OutputValue => "output_value",
            ConnectionType::NextStatement => "next_statement",
            ConnectionType::PreviousStatement => "previous_statement",
        }
    }

    /// The kind a connection must have to pair with this one.
    pub fn opposite(&self) -> Self {
        match self {
            ConnectionType::InputValue => ConnectionType::OutputValue,
            ConnectionType::OutputValue => ConnectionType::InputValue,
            ConnectionType::NextStatement => ConnectionType::PreviousStatement,
            ConnectionType::PreviousStatement => ConnectionType::NextStatement,
        }
    }

    /// Does this connection face down/right (i.e. hold children)?
    pub fn is_superior(&self) -> bool {
        matches!(self, ConnectionType::InputValue | ConnectionType::NextStatement)
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The kind of an input row on a block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum InputType {
    /// Accepts a value block (owns an `InputValue` connection).
    Value,
    /// Accepts a statement stack (owns a `NextStatement` connection).
    Statement,
    /// Fields only, no connection.
    #[default]
    Dummy,
}

impl InputType {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Value => "value",
            InputType::Statement => "statement",
            InputType::Dummy => "dummy",
        }
    }

    /// The connection an input of this kind owns, if any.
    pub fn connection_type(&self) -> Option<ConnectionType> {
        match self {
            InputType::Value => Some(ConnectionType::InputValue),
            InputType::Statement => Some(ConnectionType::NextStatement),
            InputType::Dummy => None,
        }
    }
}

impl std::fmt::Display for InputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
