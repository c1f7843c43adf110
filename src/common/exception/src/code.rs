// Copyright 2024 PPDS Authors
//
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

use std::fmt;

/// Generates one tuple-style constructor per `(Variant, "Query.Code")` pair,
/// plus a `code()` accessor. Keeps the variant list in one place the way the
/// teacher's generated `ErrorCode` does, without pulling in its build-time
/// codegen crate.
macro_rules! build_exceptions {
    ($( $variant:ident => $code:expr ),+ $(,)?) => {
        #[derive(thiserror::Error, Debug, Clone)]
        pub enum ErrorCode {
            $(
                #[error("{0}")]
                $variant(String),
            )+
        }

        impl ErrorCode {
            pub fn code(&self) -> &'static str {
                match self {
                    $( ErrorCode::$variant(_) => $code, )+
                }
            }
        }
    };
}

build_exceptions! {
    ParseError => "Query.ParseError",
    DmlBlocked => "Query.DmlBlocked",
    AggregateLimitExceeded => "Query.AggregateLimitExceeded",
    MemoryLimitExceeded => "Query.MemoryLimitExceeded",
    ConfirmationRequired => "Query.ConfirmationRequired",
    Throttled => "Query.Throttled",
    RemoteError => "Query.RemoteError",
    Cancelled => "Query.Cancelled",
    Internal => "Query.Internal",
    BadArguments => "Query.BadArguments",
    Unimplemented => "Query.Unimplemented",
}

impl ErrorCode {
    pub fn message(&self) -> String {
        match self {
            ErrorCode::ParseError(m)
            | ErrorCode::DmlBlocked(m)
            | ErrorCode::AggregateLimitExceeded(m)
            | ErrorCode::MemoryLimitExceeded(m)
            | ErrorCode::ConfirmationRequired(m)
            | ErrorCode::Throttled(m)
            | ErrorCode::RemoteError(m)
            | ErrorCode::Cancelled(m)
            | ErrorCode::Internal(m)
            | ErrorCode::BadArguments(m)
            | ErrorCode::Unimplemented(m) => m.clone(),
        }
    }

    pub fn from_string(msg: impl Into<String>) -> Self {
        ErrorCode::Internal(msg.into())
    }

    /// True for errors that must never be swallowed by a retry/catch handler
    /// (spec §7 "Cancelled — never wrapped, always re-raised").
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ErrorCode::Cancelled(_))
    }
}

/// Shape callers see at the service boundary (spec §7: "callers see
/// `{error_code, message, inner}`").
#[derive(Debug, Clone, serde::Serialize)]
pub struct ServiceError {
    pub error_code: &'static str,
    pub message: String,
    pub inner: Option<String>,
}

impl From<&ErrorCode> for ServiceError {
    fn from(e: &ErrorCode) -> Self {
        ServiceError {
            error_code: e.code(),
            message: e.message(),
            inner: None,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_stable() {
        let e = ErrorCode::AggregateLimitExceeded("too many rows".to_string());
        assert_eq!(e.code(), "Query.AggregateLimitExceeded");
        assert_eq!(e.message(), "too many rows");
    }

    #[test]
    fn cancelled_is_flagged() {
        assert!(ErrorCode::Cancelled("stop".into()).is_cancelled());
        assert!(!ErrorCode::Internal("oops".into()).is_cancelled());
    }
}
