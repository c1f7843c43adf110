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

use ppds_common_exception::ErrorCode;
use ppds_common_exception::Result;

/// Cooperative cancellation shared by every plan node (spec §5): checked once
/// per row and at every suspension point (remote call, queue send/receive,
/// rate-controller wait).
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(tokio_util::sync::CancellationToken);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(tokio_util::sync::CancellationToken::new())
    }

    pub fn child_token(&self) -> Self {
        CancellationToken(self.0.child_token())
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Returns `Err(ErrorCode::Cancelled)` if cancellation has been
    /// requested; otherwise `Ok(())`. Never wrapped by callers (spec §7).
    pub fn check(&self) -> Result<()> {
        if self.0.is_cancelled() {
            Err(ErrorCode::Cancelled("operation was cancelled".to_string()))
        } else {
            Ok(())
        }
    }

    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_passes_until_cancelled() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(token.check().is_err());
        assert!(token.is_cancelled());
    }

    #[test]
    fn child_token_cancelled_with_parent() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        parent.cancel();
        assert!(child.is_cancelled());
    }
}
