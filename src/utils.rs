// Copyright 2025 RustFS Team
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

pub mod percentage;
pub mod quantity;

use std::sync::{Mutex, MutexGuard};

/// Locks `lock`, recovering the inner state if a previous holder panicked.
pub(crate) fn lock_unpoisoned<'a, T>(lock: &'a Mutex<T>, lock_name: &'static str) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(lock = lock_name, "mutex poisoned; continuing with inner state");
            poisoned.into_inner()
        }
    }
}
