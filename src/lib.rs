// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Parsers for the output of `go test`. Two front ends are provided: a
//! [text](crate::text) parser for the free-form verbose stream and a
//! [json](crate::json) parser for the newline-delimited event stream
//! produced by `go test -json`. Both front ends converge on the same
//! normalized [`Report`](crate::types::report::Report) shape, so a
//! downstream formatter can treat them uniformly.

pub mod types {
    pub mod benchmark;
    pub mod event;
    pub mod report;
    pub mod test;
}

pub mod json;
pub mod text;

use std::fmt::Debug;
use std::str::FromStr;

use thiserror::Error as ThisError;

use crate::types::report::Report;

#[derive(ThisError)]
pub enum Error {
    #[error("IO Error: {}", _0)]
    IO(#[from] std::io::Error),
    #[error("Malformed record on line {}: {}", _0, _1)]
    MalformedRecord(usize, serde_json::Error),
    #[error("Parser '{}' is not valid", _0)]
    UnknownParser(String),
}

impl Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

/// Selects one of the two parser front ends.
///
/// The set of valid names is fixed: `"text"` and `"json"`, matched
/// case-insensitively via [`FromStr`]. Anything else is an
/// [`Error::UnknownParser`] for the caller to surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parser {
    /// Free-form verbose text, as printed by `go test -v`.
    Text,
    /// Newline-delimited JSON events, as emitted by `go test -json`.
    Json,
}

impl FromStr for Parser {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.to_ascii_lowercase().as_str() {
            "text" => Ok(Parser::Text),
            "json" => Ok(Parser::Json),
            _ => Err(Error::UnknownParser(name.to_string())),
        }
    }
}

impl Parser {
    /// Read the input stream to completion and produce a report.
    ///
    /// `package_name` is used whenever the input itself does not frame a
    /// package, e.g. output from a compiled test binary run directly.
    #[cfg(feature = "sync")]
    pub fn parse_sync<R: std::io::BufRead>(
        &self,
        reader: R,
        package_name: &str,
    ) -> Result<Report, Error> {
        match self {
            Parser::Text => text::parse_sync(reader, package_name),
            Parser::Json => json::parse_sync(reader, package_name),
        }
    }

    /// Asynchronous version of [`Parser::parse_sync`].
    #[cfg(feature = "async")]
    pub async fn parse<R: tokio::io::AsyncBufRead + Unpin>(
        &self,
        reader: R,
        package_name: &str,
    ) -> Result<Report, Error> {
        match self {
            Parser::Text => text::parse(reader, package_name).await,
            Parser::Json => json::parse(reader, package_name).await,
        }
    }
}
