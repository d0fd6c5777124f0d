// SPDX-FileCopyrightText: 2026 Botwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Server-Sent Events record type and line-separator configuration.

use std::str::FromStr;

use botwire_core::BotwireError;

/// One SSE record. All fields are optional on the encode side; a decoded
/// record always carries an event name (`message` when the wire omitted
/// one).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSentEvent {
    pub event: Option<String>,
    pub data: Option<String>,
    pub id: Option<String>,
    pub retry: Option<u64>,
}

impl ServerSentEvent {
    /// Record with an event name and a data payload, the common case.
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: Some(event.into()),
            data: Some(data.into()),
            ..Self::default()
        }
    }

    /// Record with only a data payload (decodes as `message`).
    pub fn data_only(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            ..Self::default()
        }
    }
}

/// Line terminator used on the encode side. Decoding always accepts all
/// three.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Separator {
    #[default]
    CrLf,
    Cr,
    Lf,
}

impl Separator {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CrLf => "\r\n",
            Self::Cr => "\r",
            Self::Lf => "\n",
        }
    }
}

impl FromStr for Separator {
    type Err = BotwireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "\r\n" => Ok(Self::CrLf),
            "\r" => Ok(Self::Cr),
            "\n" => Ok(Self::Lf),
            other => Err(BotwireError::InvalidParameter(format!(
                "invalid SSE separator: {other:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_round_trip() {
        for sep in [Separator::CrLf, Separator::Cr, Separator::Lf] {
            assert_eq!(sep.as_str().parse::<Separator>().unwrap(), sep);
        }
    }

    #[test]
    fn separator_rejects_other_strings() {
        assert!("\n\n".parse::<Separator>().is_err());
        assert!("".parse::<Separator>().is_err());
        assert!("|".parse::<Separator>().is_err());
    }

    #[test]
    fn default_separator_is_crlf() {
        assert_eq!(Separator::default(), Separator::CrLf);
    }
}
